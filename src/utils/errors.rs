//! Error and diagnostic types.
//!
//! Two families live here. Host-language failures ([`LexerError`],
//! [`ParseError`]) abort parsing of the translation unit. Directive problems
//! are never fatal to the unit: they become [`Diagnostic`]s whose text comes
//! from the [`DiagKind`] catalogue. The catalogue wording is part of the
//! external contract and tests match on it.

use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error during lexical analysis.
#[derive(Error, Debug, Clone)]
pub struct LexerError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of lexer error
    pub kind: LexerErrorKind,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerErrorKind {
    /// Unexpected character
    UnexpectedChar,
    /// Unterminated string or character literal
    UnterminatedString,
    /// Unknown escape sequence
    InvalidEscape,
    /// Invalid number literal
    InvalidNumber,
    /// Unterminated block comment
    UnterminatedComment,
}

/// Error while parsing host-language (non-directive) syntax.
#[derive(Error, Debug, Clone)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// What was found
    pub found: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Expected a specific token
    ExpectedToken,
    /// Expected an expression
    ExpectedExpression,
    /// Expected an identifier
    ExpectedIdentifier,
    /// Expected a type
    ExpectedType,
    /// Wrapped lexer failure
    Lexer,
}

impl From<LexerError> for ParseError {
    fn from(err: LexerError) -> Self {
        Self {
            message: err.message,
            span: err.span,
            kind: ParseErrorKind::Lexer,
            found: None,
        }
    }
}

/// Catalogue of every diagnostic the directive subsystem can produce.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagKind {
    // Clause parser
    #[error("unknown transformation '{0}'")]
    UnknownTransform(String),
    #[error("expected a transformation name after '#pragma clang transform'")]
    ExpectedTransformName,
    #[error("unknown clause name '{0}'")]
    UnknownClause(String),
    #[error("expected clause name")]
    ExpectedClauseName,
    #[error("clause '{clause}' is not valid for '{transform}' transformation")]
    ClauseNotAllowed { clause: String, transform: String },
    #[error("expected '(' after '{0}'")]
    ExpectedLParen(String),
    #[error("expected ')'")]
    ExpectedRParen,
    #[error("expected expression")]
    ExpectedExpression,
    #[error("expected identifier")]
    ExpectedIdentifier,
    #[error("invalid allocation kind '{0}'; expected 'alloca' or 'malloc'")]
    InvalidAllocationKind(String),
    #[error("'{0}' clause specified multiple times; it can only be used once")]
    DuplicateClause(String),
    #[error("'{first}' and '{second}' clauses specified multiple times; they are mutually exclusive")]
    ConflictingClauses { first: String, second: String },
    #[error("'{transform}' transformation requires a '{clause}' clause")]
    MissingClause { transform: String, clause: String },
    #[error("unknown loop hint option '{0}'")]
    UnknownLoopHint(String),
    #[error("invalid argument '{argument}' for loop hint '{option}'")]
    InvalidHintArgument { option: String, argument: String },
    #[error("unknown pragma ignored")]
    UnknownPragma,

    // Resolver / binder
    #[error("this pragma cannot appear in {0}")]
    PragmaInDeclContext(String),
    #[error("expected loop after transformation pragma")]
    ExpectedLoopAfterTransform,
    #[error("expected a for, while, or do-while loop to follow '{0}'")]
    ExpectedLoopToFollow(String),
    #[error("statement after '#pragma omp simd' must be a for loop")]
    OmpSimdNotFor,
    #[error("cannot combine '{0}' with other transformations")]
    CannotCombine(String),
    #[error("transformation did not find its loop to transform")]
    LoopNotFound,
    #[error("unroll-and-jam requires exactly one nested loop")]
    UnrollAndJamNestedCount,
    #[error("inner loop of unroll-and-jam is not the innermost")]
    UnrollAndJamNotInnermost,
    #[error("{transform} requires a perfect loop nest of depth {depth}")]
    NestTooShallow { transform: String, depth: usize },
    #[error("duplicate loop id '{0}'")]
    DuplicateLoopId(String),
    #[error("loop already has loop id '{0}'")]
    LoopAlreadyNamed(String),
    #[error("use of undeclared loop id '{0}'")]
    UndeclaredLoopId(String),
    #[error("loop id '{0}' does not name a loop in the transformed nest")]
    LoopIdNotInNest(String),
    #[error("loop id '{0}' appears multiple times in permutation")]
    RepeatedPermutationId(String),

    // Semantic validator
    #[error("'{clause}' clause expects {expected} loop ids, but {found} were given")]
    IdCountMismatch { clause: String, expected: usize, found: usize },
    #[error("{0} factor must be at least two")]
    FactorTooSmall(String),
    #[error("argument to '{0}' clause must be a positive integer")]
    NonPositiveArgument(String),
    #[error("argument to '{0}' clause is out of range")]
    ArgumentOutOfRange(String),
    #[error("'{0}' clause expects an int")]
    ExpectsInt(String),
    #[error("use of undeclared identifier '{0}'")]
    UndeclaredIdentifier(String),
    #[error("expression is not an integral constant expression")]
    NotConstant,
    #[error("division by zero in constant expression")]
    DivisionByZero,
    #[error("integer overflow in constant expression")]
    ConstantOverflow,
    #[error("'array' clause expects an array variable")]
    ExpectsArray,
    #[error("invalid value '{0}'; must be positive")]
    InvalidHintValue(i64),
    #[error("the pass structure currently is not able to apply the transformations in this order")]
    PassOrder,
}

impl DiagKind {
    /// Default severity for this kind of diagnostic.
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagKind::UnknownPragma | DiagKind::PassOrder => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Compilation continues, the request is still emitted.
    Warning,
    /// The offending directive or chain is dropped.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic produced by the directive subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// What went wrong
    pub kind: DiagKind,
    /// Primary span
    pub span: Span,
    /// Additional notes
    pub notes: Vec<String>,
}

impl Diagnostic {
    /// Create a diagnostic with the kind's default severity.
    pub fn new(kind: DiagKind, span: Span) -> Self {
        Self {
            severity: kind.default_severity(),
            kind,
            span,
            notes: Vec::new(),
        }
    }

    /// Add a note to the diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// The catalogue message.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.span.start_line, self.span.start_column, self.severity, self.kind
        )?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics for one translation unit.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a diagnostic.
    pub fn report(&mut self, diag: Diagnostic) {
        log::debug!("{}", diag);
        self.items.push(diag);
    }

    /// Shorthand for reporting a kind at a span.
    pub fn emit(&mut self, kind: DiagKind, span: Span) {
        self.report(Diagnostic::new(kind, span));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Consume the sink, returning diagnostics in source order.
    pub fn into_sorted(mut self) -> Vec<Diagnostic> {
        self.items.sort_by(|a, b| a.span.source_order(&b.span));
        self.items
    }
}
