//! Integer constant evaluation for clause arguments.
//!
//! Only what C calls an integral constant expression is accepted: literals,
//! `const` integer variables with constant initializers, and arithmetic,
//! bitwise, comparison and logical operators over those.

use crate::frontend::ast::{BinaryOp, Decl, Expr, ExprKind, Param, TypeSpec, UnaryOp};
use crate::utils::errors::{DiagKind, Diagnostic};
use crate::utils::location::Span;
use std::collections::HashMap;

/// Coarse type class of a declared variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Floating,
    Other,
}

impl ValueKind {
    fn of(ty: &TypeSpec) -> ValueKind {
        if ty.is_integral() {
            ValueKind::Integer
        } else if ty.is_floating() {
            ValueKind::Floating
        } else {
            ValueKind::Other
        }
    }
}

/// What the evaluator knows about a variable.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub kind: ValueKind,
    pub is_const: bool,
    /// Array or pointer
    pub indirect: bool,
    /// Value of a `const` integer with a constant initializer
    pub value: Option<i64>,
}

/// Lexical scopes of variable declarations, innermost last.
#[derive(Debug, Clone)]
pub struct Scopes {
    frames: Vec<HashMap<String, VarInfo>>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    /// Scopes with only the file scope open.
    pub fn new() -> Self {
        Self { frames: vec![HashMap::new()] }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn declare(&mut self, name: impl Into<String>, info: VarInfo) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), info);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&VarInfo> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Declare every name of a declaration, folding constant initializers.
    pub fn declare_decl(&mut self, decl: &Decl) {
        let kind = ValueKind::of(&decl.ty);
        for declarator in &decl.declarators {
            let indirect = declarator.is_indirect();
            let value = if decl.ty.is_const && kind == ValueKind::Integer && !indirect {
                declarator.init.as_ref().and_then(|init| eval_int(init, self).ok())
            } else {
                None
            };
            let info = VarInfo { kind, is_const: decl.ty.is_const, indirect, value };
            self.declare(declarator.name.clone(), info);
        }
    }

    pub fn declare_param(&mut self, param: &Param) {
        if param.declarator.name.is_empty() {
            return;
        }
        let info = VarInfo {
            kind: ValueKind::of(&param.ty),
            is_const: param.ty.is_const,
            indirect: param.declarator.is_indirect(),
            value: None,
        };
        self.declare(param.declarator.name.clone(), info);
    }
}

/// Why an expression is not an integer constant.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Float(Span),
    Undeclared(String, Span),
    NotConstant(Span),
    DivisionByZero(Span),
    Overflow(Span),
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::Float(span)
            | EvalError::Undeclared(_, span)
            | EvalError::NotConstant(span)
            | EvalError::DivisionByZero(span)
            | EvalError::Overflow(span) => *span,
        }
    }

    /// Turn into a diagnostic for the argument of `clause`.
    pub fn into_diagnostic(self, clause: &str) -> Diagnostic {
        let span = self.span();
        let kind = match self {
            EvalError::Float(_) => DiagKind::ExpectsInt(clause.to_string()),
            EvalError::Undeclared(name, _) => DiagKind::UndeclaredIdentifier(name),
            EvalError::NotConstant(_) => DiagKind::NotConstant,
            EvalError::DivisionByZero(_) => DiagKind::DivisionByZero,
            EvalError::Overflow(_) => DiagKind::ConstantOverflow,
        };
        Diagnostic::new(kind, span)
    }
}

/// Evaluate an integral constant expression.
pub fn eval_int(expr: &Expr, scopes: &Scopes) -> Result<i64, EvalError> {
    let span = expr.span;
    match &expr.kind {
        ExprKind::IntLiteral(v) => i64::try_from(*v).map_err(|_| EvalError::Overflow(span)),
        ExprKind::FloatLiteral(_) => Err(EvalError::Float(span)),
        ExprKind::CharLiteral(text) => char_value(text).ok_or(EvalError::NotConstant(span)),
        ExprKind::BoolLiteral(b) => Ok(*b as i64),
        ExprKind::Variable(name) => {
            let info = scopes
                .lookup(name)
                .ok_or_else(|| EvalError::Undeclared(name.clone(), span))?;
            match (info.kind, info.value) {
                (ValueKind::Floating, _) => Err(EvalError::Float(span)),
                (ValueKind::Integer, Some(v)) if info.is_const => Ok(v),
                _ => Err(EvalError::NotConstant(span)),
            }
        }
        ExprKind::Grouped(inner) => eval_int(inner, scopes),
        ExprKind::Unary { op, operand } => {
            let v = eval_int(operand, scopes)?;
            match op {
                UnaryOp::Neg => v.checked_neg().ok_or(EvalError::Overflow(span)),
                UnaryOp::Plus => Ok(v),
                UnaryOp::Not => Ok((v == 0) as i64),
                UnaryOp::BitNot => Ok(!v),
                _ => Err(EvalError::NotConstant(span)),
            }
        }
        ExprKind::Binary { op: BinaryOp::And, left, right } => {
            if eval_int(left, scopes)? == 0 {
                return Ok(0);
            }
            Ok((eval_int(right, scopes)? != 0) as i64)
        }
        ExprKind::Binary { op: BinaryOp::Or, left, right } => {
            if eval_int(left, scopes)? != 0 {
                return Ok(1);
            }
            Ok((eval_int(right, scopes)? != 0) as i64)
        }
        ExprKind::Binary { op, left, right } => {
            let l = eval_int(left, scopes)?;
            let r = eval_int(right, scopes)?;
            binary(*op, l, r, span)
        }
        ExprKind::Ternary { condition, then_expr, else_expr } => {
            if eval_int(condition, scopes)? != 0 {
                eval_int(then_expr, scopes)
            } else {
                eval_int(else_expr, scopes)
            }
        }
        ExprKind::StringLiteral(_)
        | ExprKind::Index { .. }
        | ExprKind::Member { .. }
        | ExprKind::Call { .. }
        | ExprKind::Postfix { .. }
        | ExprKind::Assign { .. } => Err(EvalError::NotConstant(span)),
    }
}

fn binary(op: BinaryOp, l: i64, r: i64, span: Span) -> Result<i64, EvalError> {
    let overflow = EvalError::Overflow(span);
    match op {
        BinaryOp::Add => l.checked_add(r).ok_or(overflow),
        BinaryOp::Sub => l.checked_sub(r).ok_or(overflow),
        BinaryOp::Mul => l.checked_mul(r).ok_or(overflow),
        BinaryOp::Div | BinaryOp::Mod if r == 0 => Err(EvalError::DivisionByZero(span)),
        BinaryOp::Div => l.checked_div(r).ok_or(overflow),
        BinaryOp::Mod => l.checked_rem(r).ok_or(overflow),
        BinaryOp::Shl | BinaryOp::Shr if !(0..64).contains(&r) => Err(overflow),
        BinaryOp::Shl => l.checked_shl(r as u32).ok_or(overflow),
        BinaryOp::Shr => l.checked_shr(r as u32).ok_or(overflow),
        BinaryOp::BitAnd => Ok(l & r),
        BinaryOp::BitOr => Ok(l | r),
        BinaryOp::BitXor => Ok(l ^ r),
        BinaryOp::Eq => Ok((l == r) as i64),
        BinaryOp::Ne => Ok((l != r) as i64),
        BinaryOp::Lt => Ok((l < r) as i64),
        BinaryOp::Le => Ok((l <= r) as i64),
        BinaryOp::Gt => Ok((l > r) as i64),
        BinaryOp::Ge => Ok((l >= r) as i64),
        BinaryOp::And => Ok((l != 0 && r != 0) as i64),
        BinaryOp::Or => Ok((l != 0 || r != 0) as i64),
    }
}

/// Value of a character literal such as `'a'` or `'\n'`.
fn char_value(text: &str) -> Option<i64> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    let c = match chars.next()? {
        '\\' => match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            _ => return None,
        },
        c => c,
    };
    if chars.next().is_some() {
        return None;
    }
    Some(c as i64)
}
