//! Abstract Syntax Tree (AST) for the C-family host language.
//!
//! The tree is deliberately shallow: it keeps enough of C to find loops,
//! their nesting, the constants visible at a directive, and the statements
//! pragmas attach to. Consecutive pragma lines are grouped with the statement
//! that follows them in [`StmtKind::Annotated`].

use crate::transform::directive::Directive;
use crate::transform::legacy::LegacyPragma;
use crate::utils::location::Span;
use crate::utils::pretty::format_list;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A complete translation unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Top-level items in source order
    pub items: Vec<Item>,
    /// Source span
    pub span: Span,
}

impl TranslationUnit {
    /// Find a function definition by name.
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.items.iter().find_map(|item| match item {
            Item::Function(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// All functions in source order, including methods.
    pub fn functions(&self) -> Vec<&Function> {
        let mut functions = Vec::new();
        for item in &self.items {
            match item {
                Item::Function(f) => functions.push(f),
                Item::Record(r) => functions.extend(r.members.iter().filter_map(|m| match m {
                    RecordMember::Method(f) => Some(f),
                    _ => None,
                })),
                Item::Decl(_) | Item::Pragmas(_) => {}
            }
        }
        functions
    }
}

/// A top-level item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Function(Function),
    Decl(Decl),
    Record(Record),
    /// Pragmas at file scope
    Pragmas(PragmaGroup),
}

/// Pragma lines with nothing to attach to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PragmaGroup {
    pub pragmas: Vec<Pragma>,
    pub span: Span,
}

/// A `struct` or `class` definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub kind: RecordKind,
    pub name: String,
    pub members: Vec<RecordMember>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Struct,
    Class,
}

impl RecordKind {
    /// Name of the declaration context, as used in diagnostics.
    pub fn context_name(&self) -> &'static str {
        match self {
            RecordKind::Struct => "struct declaration",
            RecordKind::Class => "class declaration",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Struct => write!(f, "struct"),
            RecordKind::Class => write!(f, "class"),
        }
    }
}

/// A member of a record body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecordMember {
    Field(Decl),
    Method(Function),
    /// `public:` and friends
    Access(String),
    Pragmas(PragmaGroup),
}

/// A function definition or prototype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    /// Return type
    pub return_type: TypeSpec,
    /// Function name
    pub name: String,
    /// Parameters
    pub params: Vec<Param>,
    /// Function body (None for a prototype)
    pub body: Option<Block>,
    /// Source span
    pub span: Span,
}

/// A function parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub ty: TypeSpec,
    pub declarator: Declarator,
}

/// A declaration: one type specifier, one or more declarators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decl {
    pub ty: TypeSpec,
    pub declarators: Vec<Declarator>,
    pub span: Span,
}

/// One declared name with its pointer and array modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declarator {
    pub name: String,
    /// Number of `*` before the name
    pub pointer: usize,
    /// Array dimensions (None for `[]`)
    pub dims: Vec<Option<Expr>>,
    /// Initializer
    pub init: Option<Expr>,
    pub span: Span,
}

impl Declarator {
    /// Arrays and pointers can be packed.
    pub fn is_indirect(&self) -> bool {
        self.pointer > 0 || !self.dims.is_empty()
    }
}

impl fmt::Display for Declarator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", "*".repeat(self.pointer), self.name)?;
        for dim in &self.dims {
            match dim {
                Some(size) => write!(f, "[{}]", size)?,
                None => write!(f, "[]")?,
            }
        }
        if let Some(init) = &self.init {
            write!(f, " = {}", init)?;
        }
        Ok(())
    }
}

/// A type specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub is_static: bool,
    pub is_const: bool,
    pub base: BaseType,
}

/// The base of a type specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseType {
    Void,
    Bool,
    /// Integer types, spelled as written (`unsigned long`)
    Integer(String),
    /// `float` or `double`
    Floating(String),
    Record(RecordKind, String),
    /// A typedef name
    Named(String),
}

impl TypeSpec {
    /// Check if this is an integral type.
    pub fn is_integral(&self) -> bool {
        matches!(self.base, BaseType::Integer(_) | BaseType::Bool)
    }

    /// Check if this is a floating-point type.
    pub fn is_floating(&self) -> bool {
        matches!(self.base, BaseType::Floating(_))
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            write!(f, "static ")?;
        }
        if self.is_const {
            write!(f, "const ")?;
        }
        write!(f, "{}", self.base)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Void => write!(f, "void"),
            BaseType::Bool => write!(f, "bool"),
            BaseType::Integer(name) | BaseType::Floating(name) | BaseType::Named(name) => {
                write!(f, "{}", name)
            }
            BaseType::Record(kind, name) => write!(f, "{} {}", kind, name),
        }
    }
}

/// A pragma attached to the statement stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Pragma {
    /// `#pragma clang transform ...`
    Transform(Directive),
    /// `#pragma unroll`, `#pragma clang loop ...`, `#pragma omp simd` and relatives
    Legacy(LegacyPragma),
}

impl Pragma {
    pub fn span(&self) -> Span {
        match self {
            Pragma::Transform(d) => d.span,
            Pragma::Legacy(l) => l.span,
        }
    }
}

impl fmt::Display for Pragma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pragma::Transform(d) => write!(f, "{}", d),
            Pragma::Legacy(l) => write!(f, "{}", l),
        }
    }
}

/// A block of statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Statements in the block
    pub statements: Vec<Stmt>,
    /// Source span
    pub span: Span,
}

/// Identifies a source loop. Assigned in pre-order as loops are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopId(pub u32);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// A statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    /// The kind of statement
    pub kind: StmtKind,
    /// Source span
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The loop this statement is, if any.
    pub fn as_loop(&self) -> Option<&Loop> {
        match &self.kind {
            StmtKind::Loop(l) => Some(l),
            _ => None,
        }
    }
}

/// The kind of a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression statement: `expr;`
    Expr(Expr),
    /// Local declaration
    Decl(Decl),
    /// Compound statement: `{ stmts }`
    Block(Block),
    /// `if (cond) stmt else stmt`
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// `for`, `while` or `do`/`while`
    Loop(Loop),
    /// `return expr;`
    Return(Option<Expr>),
    Break,
    Continue,
    /// Empty statement (just a semicolon)
    Empty,
    /// Pragma lines followed by the statement they precede.
    /// `stmt` is None when the pragmas end the block.
    Annotated {
        pragmas: Vec<Pragma>,
        stmt: Option<Box<Stmt>>,
    },
}

/// A loop statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loop {
    pub id: LoopId,
    pub kind: LoopKind,
    pub body: Box<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoopKind {
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Expr>,
    },
    While {
        condition: Expr,
    },
    DoWhile {
        condition: Expr,
    },
}

impl LoopKind {
    pub fn is_for(&self) -> bool {
        matches!(self, LoopKind::For { .. })
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            LoopKind::For { .. } => "for",
            LoopKind::While { .. } => "while",
            LoopKind::DoWhile { .. } => "do",
        }
    }
}

/// An assignment operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `*=`
    MulAssign,
    /// `/=`
    DivAssign,
    /// `%=`
    ModAssign,
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Assign => write!(f, "="),
            AssignOp::AddAssign => write!(f, "+="),
            AssignOp::SubAssign => write!(f, "-="),
            AssignOp::MulAssign => write!(f, "*="),
            AssignOp::DivAssign => write!(f, "/="),
            AssignOp::ModAssign => write!(f, "%="),
        }
    }
}

/// An expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    /// The kind of expression
    pub kind: ExprKind,
    /// Source span
    pub span: Span,
}

impl Expr {
    /// Create a new expression.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Create an integer literal.
    pub fn int_lit(value: u64, span: Span) -> Self {
        Self::new(ExprKind::IntLiteral(value), span)
    }

    /// Create a variable reference.
    pub fn var(name: impl Into<String>, span: Span) -> Self {
        Self::new(ExprKind::Variable(name.into()), span)
    }

    /// Strip any enclosing parentheses.
    pub fn ungrouped(&self) -> &Expr {
        match &self.kind {
            ExprKind::Grouped(inner) => inner.ungrouped(),
            _ => self,
        }
    }

    /// The variable named at the root of an lvalue (`a`, `a[i]`, `a.b`).
    pub fn base_variable(&self) -> Option<&str> {
        match &self.ungrouped().kind {
            ExprKind::Variable(name) => Some(name),
            ExprKind::Index { base, .. } | ExprKind::Member { base, .. } => base.base_variable(),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::IntLiteral(v) => write!(f, "{}", v),
            ExprKind::FloatLiteral(text)
            | ExprKind::CharLiteral(text)
            | ExprKind::StringLiteral(text) => write!(f, "{}", text),
            ExprKind::BoolLiteral(b) => write!(f, "{}", b),
            ExprKind::Variable(name) => write!(f, "{}", name),
            ExprKind::Index { base, index } => write!(f, "{}[{}]", base, index),
            ExprKind::Member { base, field, arrow } => {
                write!(f, "{}{}{}", base, if *arrow { "->" } else { "." }, field)
            }
            ExprKind::Call { callee, args } => write!(f, "{}({})", callee, format_list(args, ", ")),
            ExprKind::Unary { op, operand } => write!(f, "{}{}", op, operand),
            ExprKind::Postfix { op, operand } => write!(f, "{}{}", operand, op),
            ExprKind::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
            ExprKind::Assign { op, target, value } => write!(f, "{} {} {}", target, op, value),
            ExprKind::Ternary { condition, then_expr, else_expr } => {
                write!(f, "{} ? {} : {}", condition, then_expr, else_expr)
            }
            ExprKind::Grouped(inner) => write!(f, "({})", inner),
        }
    }
}

/// The kind of an expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal
    IntLiteral(u64),
    /// Floating-point literal, as written
    FloatLiteral(String),
    /// Character literal, as written including quotes
    CharLiteral(String),
    /// String literal, as written including quotes
    StringLiteral(String),
    /// `true` / `false`
    BoolLiteral(bool),

    /// Variable reference
    Variable(String),

    /// Subscript: `a[i]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },

    /// Member access: `a.b` or `a->b`
    Member {
        base: Box<Expr>,
        field: String,
        arrow: bool,
    },

    /// Function call: `f(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    /// Prefix operation: `op operand`
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// `x++` / `x--`
    Postfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },

    /// Binary operation: `left op right`
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Assignment: `target op value`
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },

    /// Ternary conditional: `cond ? then : else`
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Grouped expression (parenthesized)
    Grouped(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Bitwise
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// Get the precedence of this operator (higher binds tighter).
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `*p`
    Deref,
    /// `&x`
    AddrOf,
    /// `++x`
    PreInc,
    /// `--x`
    PreDec,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Deref => "*",
            UnaryOp::AddrOf => "&",
            UnaryOp::PreInc => "++",
            UnaryOp::PreDec => "--",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    Inc,
    Dec,
}

impl fmt::Display for PostfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostfixOp::Inc => write!(f, "++"),
            PostfixOp::Dec => write!(f, "--"),
        }
    }
}

/// Visitor trait for traversing the AST.
pub trait AstVisitor {
    /// Visit a translation unit.
    fn visit_unit(&mut self, unit: &TranslationUnit) {
        for item in &unit.items {
            self.visit_item(item);
        }
    }

    /// Visit a top-level item.
    fn visit_item(&mut self, item: &Item) {
        match item {
            Item::Function(func) => self.visit_function(func),
            Item::Decl(_) => {}
            Item::Record(record) => {
                for member in &record.members {
                    match member {
                        RecordMember::Method(func) => self.visit_function(func),
                        RecordMember::Pragmas(group) => self.visit_pragmas(&group.pragmas),
                        RecordMember::Field(_) | RecordMember::Access(_) => {}
                    }
                }
            }
            Item::Pragmas(group) => self.visit_pragmas(&group.pragmas),
        }
    }

    /// Visit a function.
    fn visit_function(&mut self, func: &Function) {
        if let Some(body) = &func.body {
            self.visit_block(body);
        }
    }

    /// Visit a block.
    fn visit_block(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.visit_stmt(stmt);
        }
    }

    /// Visit a run of pragmas.
    fn visit_pragmas(&mut self, pragmas: &[Pragma]) {
        for pragma in pragmas {
            self.visit_pragma(pragma);
        }
    }

    /// Visit a single pragma.
    fn visit_pragma(&mut self, _pragma: &Pragma) {}

    /// Visit a loop.
    fn visit_loop(&mut self, lp: &Loop) {
        if let LoopKind::For { init: Some(init), .. } = &lp.kind {
            self.visit_stmt(init);
        }
        self.visit_stmt(&lp.body);
    }

    /// Visit a statement.
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.visit_block(block),
            StmtKind::If { then_branch, else_branch, .. } => {
                self.visit_stmt(then_branch);
                if let Some(else_b) = else_branch {
                    self.visit_stmt(else_b);
                }
            }
            StmtKind::Loop(lp) => self.visit_loop(lp),
            StmtKind::Annotated { pragmas, stmt } => {
                self.visit_pragmas(pragmas);
                if let Some(s) = stmt {
                    self.visit_stmt(s);
                }
            }
            StmtKind::Expr(_)
            | StmtKind::Decl(_)
            | StmtKind::Return(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Empty => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
            Span::dummy(),
        )
    }

    #[test]
    fn test_type_display() {
        let ty = TypeSpec {
            is_static: true,
            is_const: true,
            base: BaseType::Integer("unsigned int".into()),
        };
        assert_eq!(ty.to_string(), "static const unsigned int");
        assert!(ty.is_integral());
        assert!(!ty.is_floating());
    }

    #[test]
    fn test_expr_display() {
        let grouped = Expr::new(
            ExprKind::Grouped(Box::new(bin(BinaryOp::Add, Expr::var("N", Span::dummy()), Expr::int_lit(1, Span::dummy())))),
            Span::dummy(),
        );
        let expr = bin(BinaryOp::Mul, grouped, Expr::int_lit(2, Span::dummy()));
        assert_eq!(expr.to_string(), "(N + 1) * 2");
    }

    #[test]
    fn test_base_variable() {
        let index = Expr::new(
            ExprKind::Index {
                base: Box::new(Expr::var("A", Span::dummy())),
                index: Box::new(Expr::var("i", Span::dummy())),
            },
            Span::dummy(),
        );
        assert_eq!(index.base_variable(), Some("A"));
        assert_eq!(Expr::int_lit(3, Span::dummy()).base_variable(), None);
    }

    #[test]
    fn test_declarator_display() {
        let decl = Declarator {
            name: "buf".into(),
            pointer: 1,
            dims: vec![Some(Expr::int_lit(16, Span::dummy())), None],
            init: None,
            span: Span::dummy(),
        };
        assert_eq!(decl.to_string(), "*buf[16][]");
        assert!(decl.is_indirect());
    }
}
