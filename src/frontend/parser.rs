//! Parser for the C-family host language.
//!
//! This module implements a recursive descent parser that converts a stream
//! of tokens into an AST. Host syntax errors are collected per statement and
//! reported together; problems inside `#pragma` lines never abort the parse
//! and are recorded as diagnostics instead (see `frontend::pragma`).

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{Diagnostics, ParseError, ParseErrorKind};
use crate::utils::location::Span;
use anyhow::Result;

/// Result of an internal parse step.
pub(super) type PResult<T> = std::result::Result<T, ParseError>;

/// A parser for the host language.
pub struct Parser {
    pub(super) tokens: Vec<Token>,
    pub(super) pos: usize,
    pub(super) diagnostics: Diagnostics,
    errors: Vec<ParseError>,
    next_loop_id: u32,
}

impl Parser {
    /// Tokenize `source` and create a parser over it.
    pub fn new(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self::from_tokens(tokens))
    }

    /// Create a parser over an existing token stream.
    pub fn from_tokens(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| !t.is_eof()).unwrap_or(true) {
            let span = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, span, String::new()));
        }
        Self {
            tokens,
            pos: 0,
            diagnostics: Diagnostics::new(),
            errors: Vec::new(),
            next_loop_id: 0,
        }
    }

    /// Directive diagnostics gathered so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Consume the parser, returning its directive diagnostics.
    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Parse a complete translation unit.
    pub fn parse_unit(&mut self) -> Result<TranslationUnit> {
        let start = self.current().span;
        let mut unit = TranslationUnit::default();

        while !self.is_at_end() {
            match self.parse_item() {
                Ok(Some(item)) => unit.items.push(item),
                Ok(None) => {}
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        unit.span = start.merge(&self.previous().span);

        if let Some(first) = self.errors.first() {
            let count = self.errors.len();
            for e in &self.errors[1..] {
                log::debug!("additional syntax error: {}", e);
            }
            return Err(anyhow::Error::new(first.clone())
                .context(format!("{} syntax error(s) in translation unit", count)));
        }

        Ok(unit)
    }

    fn parse_item(&mut self) -> PResult<Option<Item>> {
        if self.check(TokenKind::Hash) {
            let start = self.current().span;
            let pragmas = self.parse_pragma_run();
            if pragmas.is_empty() {
                return Ok(None);
            }
            let span = start.merge(&self.previous().span);
            return Ok(Some(Item::Pragmas(PragmaGroup { pragmas, span })));
        }
        if self.match_token(TokenKind::Semicolon) {
            return Ok(None);
        }
        if self.starts_record_definition() {
            return Ok(Some(Item::Record(self.parse_record()?)));
        }

        let start = self.current().span;
        let ty = self.parse_type_spec()?;
        if self.match_token(TokenKind::Semicolon) {
            // `struct S;`
            return Ok(None);
        }
        let pointer = self.parse_pointers();
        let name_tok = self.consume(TokenKind::Identifier, "Expected declarator name")?;
        let name = name_tok.lexeme.clone();
        let name_span = name_tok.span;

        if self.check(TokenKind::LeftParen) {
            return Ok(Some(Item::Function(self.parse_function_rest(ty, name, start)?)));
        }

        let decl = self.parse_declaration_rest(ty, pointer, name, name_span, start)?;
        Ok(Some(Item::Decl(decl)))
    }

    fn starts_record_definition(&self) -> bool {
        matches!(self.current().kind, TokenKind::Struct | TokenKind::Class)
            && self.peek_kind(1) == TokenKind::Identifier
            && self.peek_kind(2) == TokenKind::LeftBrace
    }

    fn parse_record(&mut self) -> PResult<Record> {
        let start = self.current().span;
        let kind = if self.match_token(TokenKind::Class) {
            RecordKind::Class
        } else {
            self.consume(TokenKind::Struct, "Expected 'struct' or 'class'")?;
            RecordKind::Struct
        };
        let name = self.consume_identifier("Expected record name")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after record name")?;

        let mut members = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.parse_record_member() {
                Ok(Some(member)) => members.push(member),
                Ok(None) => {}
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize_statement();
                }
            }
        }

        self.consume(TokenKind::RightBrace, "Expected '}' after record body")?;
        self.consume(TokenKind::Semicolon, "Expected ';' after record definition")?;

        Ok(Record {
            kind,
            name,
            members,
            span: start.merge(&self.previous().span),
        })
    }

    fn parse_record_member(&mut self) -> PResult<Option<RecordMember>> {
        if self.check(TokenKind::Hash) {
            let start = self.current().span;
            let pragmas = self.parse_pragma_run();
            if pragmas.is_empty() {
                return Ok(None);
            }
            let span = start.merge(&self.previous().span);
            return Ok(Some(RecordMember::Pragmas(PragmaGroup { pragmas, span })));
        }
        if self.match_token(TokenKind::Semicolon) {
            return Ok(None);
        }
        if self.check(TokenKind::Identifier) && self.peek_kind(1) == TokenKind::Colon {
            let access = self.advance().lexeme.clone();
            self.advance();
            return Ok(Some(RecordMember::Access(access)));
        }

        let start = self.current().span;
        let ty = self.parse_type_spec()?;
        let pointer = self.parse_pointers();
        let name_tok = self.consume(TokenKind::Identifier, "Expected member name")?;
        let name = name_tok.lexeme.clone();
        let name_span = name_tok.span;

        if self.check(TokenKind::LeftParen) {
            return Ok(Some(RecordMember::Method(self.parse_function_rest(ty, name, start)?)));
        }
        let decl = self.parse_declaration_rest(ty, pointer, name, name_span, start)?;
        Ok(Some(RecordMember::Field(decl)))
    }

    fn parse_function_rest(&mut self, return_type: TypeSpec, name: String, start: Span) -> PResult<Function> {
        self.consume(TokenKind::LeftParen, "Expected '(' after function name")?;
        let params = self.parse_parameters()?;
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;

        let body = if self.match_token(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_block()?)
        };

        Ok(Function {
            return_type,
            name,
            params,
            body,
            span: start.merge(&self.previous().span),
        })
    }

    fn parse_parameters(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();

        // `f(void)`
        if self.check(TokenKind::Void) && self.peek_kind(1) == TokenKind::RightParen {
            self.advance();
            return Ok(params);
        }

        if !self.check(TokenKind::RightParen) {
            loop {
                params.push(self.parse_parameter()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        Ok(params)
    }

    fn parse_parameter(&mut self) -> PResult<Param> {
        let start = self.current().span;
        let ty = self.parse_type_spec()?;
        let pointer = self.parse_pointers();
        let name = if self.check(TokenKind::Identifier) {
            self.advance().lexeme.clone()
        } else {
            String::new()
        };
        let dims = self.parse_array_dims()?;

        Ok(Param {
            ty,
            declarator: Declarator {
                name,
                pointer,
                dims,
                init: None,
                span: start.merge(&self.previous().span),
            },
        })
    }

    /// Parse a type specifier: qualifiers, then a builtin, record or typedef name.
    fn parse_type_spec(&mut self) -> PResult<TypeSpec> {
        let mut is_static = false;
        let mut is_const = false;
        let mut words: Vec<&'static str> = Vec::new();
        let mut base: Option<BaseType> = None;

        loop {
            match self.current().kind {
                TokenKind::Static => is_static = true,
                TokenKind::Const => is_const = true,
                TokenKind::Unsigned | TokenKind::Signed | TokenKind::Short | TokenKind::Long
                | TokenKind::Int | TokenKind::CharType | TokenKind::FloatType | TokenKind::Double => {
                    words.push(self.current().kind.name());
                }
                TokenKind::Void if base.is_none() && words.is_empty() => base = Some(BaseType::Void),
                TokenKind::Bool if base.is_none() && words.is_empty() => base = Some(BaseType::Bool),
                TokenKind::Struct | TokenKind::Class if base.is_none() && words.is_empty() => {
                    let kind = if self.check(TokenKind::Struct) {
                        RecordKind::Struct
                    } else {
                        RecordKind::Class
                    };
                    self.advance();
                    let name = self.consume_identifier("Expected record name")?;
                    base = Some(BaseType::Record(kind, name));
                    continue;
                }
                TokenKind::Identifier if base.is_none() && words.is_empty() => {
                    base = Some(BaseType::Named(self.current().lexeme.clone()));
                }
                _ => break,
            }
            self.advance();
        }

        let base = match base {
            Some(base) => base,
            None if words.iter().any(|w| *w == "float" || *w == "double") => {
                BaseType::Floating(words.join(" "))
            }
            None if !words.is_empty() => BaseType::Integer(words.join(" ")),
            None => return Err(self.error(ParseErrorKind::ExpectedType, "Expected type specifier")),
        };

        Ok(TypeSpec { is_static, is_const, base })
    }

    fn parse_pointers(&mut self) -> usize {
        let mut count = 0;
        while self.match_token(TokenKind::Star) {
            count += 1;
            // `int *const p`
            self.match_token(TokenKind::Const);
        }
        count
    }

    fn parse_array_dims(&mut self) -> PResult<Vec<Option<Expr>>> {
        let mut dims = Vec::new();
        while self.match_token(TokenKind::LeftBracket) {
            if self.match_token(TokenKind::RightBracket) {
                dims.push(None);
            } else {
                dims.push(Some(self.parse_expression()?));
                self.consume(TokenKind::RightBracket, "Expected ']' after array dimension")?;
            }
        }
        Ok(dims)
    }

    /// Parse the declarators of a declaration whose first name is already consumed.
    fn parse_declaration_rest(
        &mut self,
        ty: TypeSpec,
        pointer: usize,
        name: String,
        name_span: Span,
        start: Span,
    ) -> PResult<Decl> {
        let mut declarators = vec![self.parse_declarator_tail(pointer, name, name_span)?];
        while self.match_token(TokenKind::Comma) {
            let pointer = self.parse_pointers();
            let tok = self.consume(TokenKind::Identifier, "Expected declarator name")?;
            let (name, span) = (tok.lexeme.clone(), tok.span);
            declarators.push(self.parse_declarator_tail(pointer, name, span)?);
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after declaration")?;

        Ok(Decl {
            ty,
            declarators,
            span: start.merge(&self.previous().span),
        })
    }

    fn parse_declarator_tail(&mut self, pointer: usize, name: String, start: Span) -> PResult<Declarator> {
        let dims = self.parse_array_dims()?;
        let init = if self.match_token(TokenKind::Equal) {
            Some(self.parse_initializer()?)
        } else {
            None
        };
        Ok(Declarator {
            name,
            pointer,
            dims,
            init,
            span: start.merge(&self.previous().span),
        })
    }

    /// An initializer; brace lists are kept as a call-shaped placeholder.
    fn parse_initializer(&mut self) -> PResult<Expr> {
        if !self.check(TokenKind::LeftBrace) {
            return self.parse_expression();
        }
        let start = self.advance().span;
        let mut args = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            args.push(self.parse_initializer()?);
            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after initializer list")?;
        let span = start.merge(&self.previous().span);
        Ok(Expr::new(
            ExprKind::Call { callee: Box::new(Expr::var("", start)), args },
            span,
        ))
    }

    pub(super) fn parse_block(&mut self) -> PResult<Block> {
        let start = self.current().span;
        self.consume(TokenKind::LeftBrace, "Expected '{'")?;

        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize_statement();
                }
            }
        }

        self.consume(TokenKind::RightBrace, "Expected '}'")?;

        Ok(Block {
            statements,
            span: start.merge(&self.previous().span),
        })
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let start = self.current().span;

        if self.check(TokenKind::Hash) {
            let pragmas = self.parse_pragma_run();
            let at_end = self.check(TokenKind::RightBrace) || self.is_at_end();
            if pragmas.is_empty() {
                if at_end {
                    return Ok(Stmt::new(StmtKind::Empty, start));
                }
                return self.parse_statement();
            }
            let stmt = if at_end {
                None
            } else {
                Some(Box::new(self.parse_statement()?))
            };
            let kind = StmtKind::Annotated { pragmas, stmt };
            return Ok(Stmt::new(kind, start.merge(&self.previous().span)));
        }

        let kind = match self.current().kind {
            TokenKind::For => self.parse_for_statement()?,
            TokenKind::While => self.parse_while_statement()?,
            TokenKind::Do => self.parse_do_statement()?,
            TokenKind::If => self.parse_if_statement()?,
            TokenKind::Return => self.parse_return_statement()?,
            TokenKind::Break => {
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';' after 'break'")?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.consume(TokenKind::Semicolon, "Expected ';' after 'continue'")?;
                StmtKind::Continue
            }
            TokenKind::LeftBrace => StmtKind::Block(self.parse_block()?),
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Empty
            }
            _ if self.starts_declaration() => StmtKind::Decl(self.parse_local_declaration()?),
            _ => {
                let expr = self.parse_expression()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after expression")?;
                StmtKind::Expr(expr)
            }
        };

        Ok(Stmt::new(kind, start.merge(&self.previous().span)))
    }

    /// A declaration starts with a type keyword, or with `Name name`.
    fn starts_declaration(&self) -> bool {
        let kind = self.current().kind;
        kind.is_type_specifier()
            || (kind == TokenKind::Identifier && self.peek_kind(1) == TokenKind::Identifier)
    }

    fn parse_local_declaration(&mut self) -> PResult<Decl> {
        let start = self.current().span;
        let ty = self.parse_type_spec()?;
        let pointer = self.parse_pointers();
        let tok = self.consume(TokenKind::Identifier, "Expected variable name")?;
        let (name, name_span) = (tok.lexeme.clone(), tok.span);
        self.parse_declaration_rest(ty, pointer, name, name_span, start)
    }

    fn next_loop_id(&mut self) -> LoopId {
        let id = LoopId(self.next_loop_id);
        self.next_loop_id += 1;
        id
    }

    fn parse_for_statement(&mut self) -> PResult<StmtKind> {
        let start = self.consume(TokenKind::For, "Expected 'for'")?.span;
        let id = self.next_loop_id();
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'")?;

        let init = if self.match_token(TokenKind::Semicolon) {
            None
        } else if self.starts_declaration() {
            let decl_start = self.current().span;
            let decl = self.parse_local_declaration()?;
            Some(Box::new(Stmt::new(StmtKind::Decl(decl), decl_start.merge(&self.previous().span))))
        } else {
            let expr_start = self.current().span;
            let expr = self.parse_expression()?;
            self.consume(TokenKind::Semicolon, "Expected ';' after for-loop initializer")?;
            Some(Box::new(Stmt::new(StmtKind::Expr(expr), expr_start.merge(&self.previous().span))))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for-loop condition")?;

        let step = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RightParen, "Expected ')' after for-loop header")?;

        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::Loop(Loop {
            id,
            kind: LoopKind::For { init, condition, step },
            body,
            span: start.merge(&self.previous().span),
        }))
    }

    fn parse_while_statement(&mut self) -> PResult<StmtKind> {
        let start = self.consume(TokenKind::While, "Expected 'while'")?.span;
        let id = self.next_loop_id();
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after while condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(StmtKind::Loop(Loop {
            id,
            kind: LoopKind::While { condition },
            body,
            span: start.merge(&self.previous().span),
        }))
    }

    fn parse_do_statement(&mut self) -> PResult<StmtKind> {
        let start = self.consume(TokenKind::Do, "Expected 'do'")?.span;
        let id = self.next_loop_id();
        let body = Box::new(self.parse_statement()?);
        self.consume(TokenKind::While, "Expected 'while' after do body")?;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after do-while condition")?;
        self.consume(TokenKind::Semicolon, "Expected ';' after do-while")?;
        Ok(StmtKind::Loop(Loop {
            id,
            kind: LoopKind::DoWhile { condition },
            body,
            span: start.merge(&self.previous().span),
        }))
    }

    fn parse_if_statement(&mut self) -> PResult<StmtKind> {
        self.consume(TokenKind::If, "Expected 'if'")?;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')' after if condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.match_token(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StmtKind::If { condition, then_branch, else_branch })
    }

    fn parse_return_statement(&mut self) -> PResult<StmtKind> {
        self.consume(TokenKind::Return, "Expected 'return'")?;
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after return")?;
        Ok(StmtKind::Return(value))
    }

    // Expression parsing with precedence climbing

    /// Parse an assignment expression (the comma operator is not supported).
    pub(super) fn parse_expression(&mut self) -> PResult<Expr> {
        let target = self.parse_ternary()?;
        let op = match self.current().kind {
            TokenKind::Equal => AssignOp::Assign,
            TokenKind::PlusEqual => AssignOp::AddAssign,
            TokenKind::MinusEqual => AssignOp::SubAssign,
            TokenKind::StarEqual => AssignOp::MulAssign,
            TokenKind::SlashEqual => AssignOp::DivAssign,
            TokenKind::PercentEqual => AssignOp::ModAssign,
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_expression()?;
        let span = target.span.merge(&value.span);
        Ok(Expr::new(
            ExprKind::Assign { op, target: Box::new(target), value: Box::new(value) },
            span,
        ))
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let condition = self.parse_binary(1)?;
        if !self.match_token(TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.parse_expression()?;
        self.consume(TokenKind::Colon, "Expected ':' in conditional expression")?;
        let else_expr = self.parse_ternary()?;
        let span = condition.span.merge(&else_expr.span);
        Ok(Expr::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
        let op = match kind {
            TokenKind::PipePipe => BinaryOp::Or,
            TokenKind::AmpAmp => BinaryOp::And,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::Amp => BinaryOp::BitAnd,
            TokenKind::EqualEqual => BinaryOp::Eq,
            TokenKind::BangEqual => BinaryOp::Ne,
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEqual => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::GreaterEqual => BinaryOp::Ge,
            TokenKind::LessLess => BinaryOp::Shl,
            TokenKind::GreaterGreater => BinaryOp::Shr,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(op) = Self::binary_op(self.current().kind) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let start = self.current().span;
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Star => UnaryOp::Deref,
            TokenKind::Amp => UnaryOp::AddrOf,
            TokenKind::PlusPlus => UnaryOp::PreInc,
            TokenKind::MinusMinus => UnaryOp::PreDec,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let span = start.merge(&operand.span);
        Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span))
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RightBracket, "Expected ']'")?;
                    let span = expr.span.merge(&self.previous().span);
                    expr = Expr::new(ExprKind::Index { base: Box::new(expr), index: Box::new(index) }, span);
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    self.consume(TokenKind::RightParen, "Expected ')'")?;
                    let span = expr.span.merge(&self.previous().span);
                    expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args }, span);
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.advance().kind == TokenKind::Arrow;
                    let field = self.consume_identifier("Expected member name")?;
                    let span = expr.span.merge(&self.previous().span);
                    expr = Expr::new(ExprKind::Member { base: Box::new(expr), field, arrow }, span);
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if self.advance().kind == TokenKind::PlusPlus {
                        PostfixOp::Inc
                    } else {
                        PostfixOp::Dec
                    };
                    let span = expr.span.merge(&self.previous().span);
                    expr = Expr::new(ExprKind::Postfix { op, operand: Box::new(expr) }, span);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let start = self.current().span;

        match self.current().kind {
            TokenKind::Integer => {
                let value = parse_int_literal(&self.current().lexeme).ok_or_else(|| {
                    self.error(ParseErrorKind::ExpectedExpression, "Integer literal is too large")
                })?;
                self.advance();
                Ok(Expr::int_lit(value, start))
            }
            TokenKind::Float => {
                let text = self.advance().lexeme.clone();
                Ok(Expr::new(ExprKind::FloatLiteral(text), start))
            }
            TokenKind::Char => {
                let text = self.advance().lexeme.clone();
                Ok(Expr::new(ExprKind::CharLiteral(text), start))
            }
            TokenKind::String => {
                let text = self.advance().lexeme.clone();
                Ok(Expr::new(ExprKind::StringLiteral(text), start))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(true), start))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::BoolLiteral(false), start))
            }
            TokenKind::Identifier => {
                let name = self.advance().lexeme.clone();
                Ok(Expr::var(name, start))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "Expected ')'")?;
                Ok(Expr::new(ExprKind::Grouped(Box::new(inner)), start.merge(&self.previous().span)))
            }
            _ => Err(self.error(ParseErrorKind::ExpectedExpression, "Expected expression")),
        }
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(args)
    }

    // Helper methods

    pub(super) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(super) fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    pub(super) fn peek_kind(&self, ahead: usize) -> TokenKind {
        self.tokens
            .get(self.pos + ahead)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub(super) fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.current().is_eof()
    }

    /// Move past the current token and return it. Never moves past EOF.
    pub(super) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    pub(super) fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> PResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(ParseErrorKind::ExpectedToken, message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> PResult<String> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance().lexeme.clone())
        } else {
            Err(self.error(ParseErrorKind::ExpectedIdentifier, message))
        }
    }

    fn error(&self, kind: ParseErrorKind, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            span: self.current().span,
            kind,
            found: Some(self.current().kind.name().to_string()),
        }
    }

    fn synchronize(&mut self) {
        // Always advance at least once to avoid infinite loops
        if !self.is_at_end() {
            self.advance();
        }

        while !self.is_at_end() {
            if matches!(self.previous().kind, TokenKind::Semicolon | TokenKind::RightBrace) {
                return;
            }
            if self.check(TokenKind::Hash) {
                return;
            }
            self.advance();
        }
    }

    fn synchronize_statement(&mut self) {
        if !self.is_at_end() && !self.check(TokenKind::RightBrace) {
            self.advance();
        }
        while !self.is_at_end() && !self.check(TokenKind::RightBrace) {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.current().kind {
                TokenKind::For | TokenKind::If | TokenKind::While | TokenKind::Do
                | TokenKind::Return | TokenKind::Hash | TokenKind::LeftBrace => return,
                _ => {}
            }
            self.advance();
        }
    }
}

/// Value of a C integer literal, ignoring `u`/`l` suffixes.
fn parse_int_literal(text: &str) -> Option<u64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<TranslationUnit> {
        Parser::new(source)?.parse_unit()
    }

    fn body(unit: &TranslationUnit, name: &str) -> Vec<Stmt> {
        unit.find_function(name).unwrap().body.as_ref().unwrap().statements.clone()
    }

    #[test]
    fn test_empty_function() {
        let unit = parse("void f(void) {}").unwrap();
        let f = unit.find_function("f").unwrap();
        assert!(f.params.is_empty());
        assert!(f.body.as_ref().unwrap().statements.is_empty());
    }

    #[test]
    fn test_prototype_and_params() {
        let unit = parse("int g(int n, double *a, float b[16]);").unwrap();
        let g = unit.find_function("g").unwrap();
        assert!(g.body.is_none());
        assert_eq!(g.params.len(), 3);
        assert!(g.params[1].declarator.is_indirect());
        assert!(g.params[2].declarator.is_indirect());
        assert!(g.params[2].ty.is_floating());
    }

    #[test]
    fn test_for_loop_with_declaration() {
        let unit = parse("void f(int n) { for (int i = 0; i < n; i += 1) ; }").unwrap();
        let stmts = body(&unit, "f");
        let lp = stmts[0].as_loop().unwrap();
        assert_eq!(lp.id, LoopId(0));
        match &lp.kind {
            LoopKind::For { init: Some(init), condition: Some(_), step: Some(_) } => {
                assert!(matches!(init.kind, StmtKind::Decl(_)));
            }
            other => panic!("unexpected loop kind {:?}", other),
        }
    }

    #[test]
    fn test_loop_ids_are_preorder() {
        let src = "void f() { for (;;) { while (1) {} } do {} while (0); }";
        let unit = parse(src).unwrap();
        let stmts = body(&unit, "f");
        let outer = stmts[0].as_loop().unwrap();
        assert_eq!(outer.id, LoopId(0));
        match &outer.body.kind {
            StmtKind::Block(b) => assert_eq!(b.statements[0].as_loop().unwrap().id, LoopId(1)),
            _ => panic!("expected block"),
        }
        assert_eq!(stmts[1].as_loop().unwrap().id, LoopId(2));
    }

    #[test]
    fn test_precedence() {
        let unit = parse("int x = 1 + 2 * 3 << 1;").unwrap();
        match &unit.items[0] {
            Item::Decl(d) => {
                let init = d.declarators[0].init.as_ref().unwrap();
                assert_eq!(init.to_string(), "1 + 2 * 3 << 1");
                match &init.kind {
                    ExprKind::Binary { op, .. } => assert_eq!(*op, BinaryOp::Shl),
                    _ => panic!("expected binary"),
                }
            }
            _ => panic!("expected declaration"),
        }
    }

    #[test]
    fn test_record_with_access() {
        let src = "class C { public: int a[4]; void m() { for (;;) {} } };";
        let unit = parse(src).unwrap();
        match &unit.items[0] {
            Item::Record(r) => {
                assert_eq!(r.kind, RecordKind::Class);
                assert!(matches!(r.members[0], RecordMember::Access(_)));
                assert!(matches!(r.members[1], RecordMember::Field(_)));
                assert!(matches!(r.members[2], RecordMember::Method(_)));
            }
            _ => panic!("expected record"),
        }
        assert_eq!(unit.functions().len(), 1);
    }

    #[test]
    fn test_pragma_annotates_next_statement() {
        let src = "void f() {\n#pragma clang transform unroll\nfor (;;) {}\n}";
        let unit = parse(src).unwrap();
        let stmts = body(&unit, "f");
        match &stmts[0].kind {
            StmtKind::Annotated { pragmas, stmt } => {
                assert_eq!(pragmas.len(), 1);
                assert!(stmt.as_ref().unwrap().as_loop().is_some());
            }
            _ => panic!("expected annotated statement"),
        }
    }

    #[test]
    fn test_pragma_at_block_end() {
        let src = "void f() {\n#pragma unroll\n}";
        let unit = parse(src).unwrap();
        match &body(&unit, "f")[0].kind {
            StmtKind::Annotated { stmt, .. } => assert!(stmt.is_none()),
            _ => panic!("expected annotated statement"),
        }
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = parse("void f() { for (;; }").unwrap_err();
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_int_literals() {
        assert_eq!(parse_int_literal("0x10"), Some(16));
        assert_eq!(parse_int_literal("017"), Some(15));
        assert_eq!(parse_int_literal("42u"), Some(42));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("99999999999999999999"), None);
    }
}
