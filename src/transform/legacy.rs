//! The older loop-hint pragmas.
//!
//! These predate `#pragma clang transform` and attach flat hints to a single
//! loop rather than building a chain. They are parsed and bound alongside
//! transform directives so the two systems can be checked against each other.

use crate::frontend::ast::Expr;
use crate::transform::directive::LoopName;
use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyKind {
    /// `#pragma unroll [N]`
    Unroll,
    /// `#pragma nounroll`
    NoUnroll,
    /// `#pragma unroll_and_jam [N]`
    UnrollAndJam,
    /// `#pragma nounroll_and_jam`
    NoUnrollAndJam,
    /// `#pragma clang loop option(arg)...`
    ClangLoop,
    /// `#pragma omp simd`
    OmpSimd,
}

impl LegacyKind {
    /// The pragma text up to its arguments.
    pub fn introducer(self) -> &'static str {
        match self {
            LegacyKind::Unroll => "#pragma unroll",
            LegacyKind::NoUnroll => "#pragma nounroll",
            LegacyKind::UnrollAndJam => "#pragma unroll_and_jam",
            LegacyKind::NoUnrollAndJam => "#pragma nounroll_and_jam",
            LegacyKind::ClangLoop => "#pragma clang loop",
            LegacyKind::OmpSimd => "#pragma omp simd",
        }
    }

    /// Whether the pragma may carry an optional count.
    pub fn takes_count(self) -> bool {
        matches!(self, LegacyKind::Unroll | LegacyKind::UnrollAndJam)
    }
}

/// Argument of an on/off hint option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HintState {
    Enable,
    Disable,
    /// Only valid for `unroll`
    Full,
}

impl HintState {
    pub fn name(self) -> &'static str {
        match self {
            HintState::Enable => "enable",
            HintState::Disable => "disable",
            HintState::Full => "full",
        }
    }

    pub fn from_name(name: &str) -> Option<HintState> {
        match name {
            "enable" => Some(HintState::Enable),
            "disable" => Some(HintState::Disable),
            "full" => Some(HintState::Full),
            _ => None,
        }
    }
}

/// One option of `#pragma clang loop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoopHintOption {
    Vectorize(HintState),
    VectorizeWidth(Expr),
    Interleave(HintState),
    InterleaveCount(Expr),
    Unroll(HintState),
    UnrollCount(Expr),
    Distribute(HintState),
    Id(LoopName),
}

/// Shape of an option's argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionArg {
    /// `enable` / `disable`
    Toggle,
    /// `enable` / `disable` / `full`
    ToggleOrFull,
    /// An integer expression
    Count,
    /// A loop name
    Name,
}

impl LoopHintOption {
    /// Spelling of the option.
    pub fn name(&self) -> &'static str {
        match self {
            LoopHintOption::Vectorize(_) => "vectorize",
            LoopHintOption::VectorizeWidth(_) => "vectorize_width",
            LoopHintOption::Interleave(_) => "interleave",
            LoopHintOption::InterleaveCount(_) => "interleave_count",
            LoopHintOption::Unroll(_) => "unroll",
            LoopHintOption::UnrollCount(_) => "unroll_count",
            LoopHintOption::Distribute(_) => "distribute",
            LoopHintOption::Id(_) => "id",
        }
    }

    /// The argument shape an option name takes, or None for unknown options.
    pub fn arg_of(name: &str) -> Option<OptionArg> {
        match name {
            "vectorize" | "interleave" | "distribute" => Some(OptionArg::Toggle),
            "unroll" => Some(OptionArg::ToggleOrFull),
            "vectorize_width" | "interleave_count" | "unroll_count" => Some(OptionArg::Count),
            "id" => Some(OptionArg::Name),
            _ => None,
        }
    }

    /// Build a toggle option from its name.
    pub fn toggle(name: &str, state: HintState) -> Option<LoopHintOption> {
        match (name, state) {
            ("vectorize", HintState::Enable | HintState::Disable) => Some(LoopHintOption::Vectorize(state)),
            ("interleave", HintState::Enable | HintState::Disable) => Some(LoopHintOption::Interleave(state)),
            ("distribute", HintState::Enable | HintState::Disable) => Some(LoopHintOption::Distribute(state)),
            ("unroll", _) => Some(LoopHintOption::Unroll(state)),
            _ => None,
        }
    }

    /// Build a count option from its name.
    pub fn count(name: &str, value: Expr) -> Option<LoopHintOption> {
        match name {
            "vectorize_width" => Some(LoopHintOption::VectorizeWidth(value)),
            "interleave_count" => Some(LoopHintOption::InterleaveCount(value)),
            "unroll_count" => Some(LoopHintOption::UnrollCount(value)),
            _ => None,
        }
    }
}

impl fmt::Display for LoopHintOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopHintOption::Vectorize(s)
            | LoopHintOption::Interleave(s)
            | LoopHintOption::Unroll(s)
            | LoopHintOption::Distribute(s) => write!(f, "{}({})", self.name(), s.name()),
            LoopHintOption::VectorizeWidth(e)
            | LoopHintOption::InterleaveCount(e)
            | LoopHintOption::UnrollCount(e) => write!(f, "{}({})", self.name(), e),
            LoopHintOption::Id(name) => write!(f, "id({})", name),
        }
    }
}

/// A parsed legacy hint pragma.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyPragma {
    pub kind: LegacyKind,
    /// Count of `#pragma unroll N` / `#pragma unroll_and_jam N`
    pub count: Option<Expr>,
    /// Whether the count was written as `(N)`
    pub count_parenthesized: bool,
    /// Options of `#pragma clang loop`
    pub options: Vec<LoopHintOption>,
    pub span: Span,
}

impl LegacyPragma {
    pub fn new(kind: LegacyKind, span: Span) -> Self {
        Self { kind, count: None, count_parenthesized: false, options: Vec::new(), span }
    }

    pub fn with_count(mut self, count: Expr, parenthesized: bool) -> Self {
        self.count = Some(count);
        self.count_parenthesized = parenthesized;
        self
    }

    pub fn with_options(mut self, options: Vec<LoopHintOption>) -> Self {
        self.options = options;
        self
    }

    pub fn introducer(&self) -> &'static str {
        self.kind.introducer()
    }

    /// A `clang loop` pragma that only names its loop.
    pub fn is_naming_only(&self) -> bool {
        self.kind == LegacyKind::ClangLoop
            && !self.options.is_empty()
            && self.options.iter().all(|o| matches!(o, LoopHintOption::Id(_)))
    }

    /// The loop name given by an `id(...)` option, if any.
    pub fn loop_id(&self) -> Option<&LoopName> {
        self.options.iter().find_map(|o| match o {
            LoopHintOption::Id(name) => Some(name),
            _ => None,
        })
    }

    /// Options that are hints rather than names.
    pub fn hint_options(&self) -> impl Iterator<Item = &LoopHintOption> {
        self.options.iter().filter(|o| !matches!(o, LoopHintOption::Id(_)))
    }
}

impl fmt::Display for LegacyPragma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.introducer())?;
        if let Some(count) = &self.count {
            if self.count_parenthesized {
                write!(f, "({})", count)?;
            } else {
                write!(f, " {}", count)?;
            }
        }
        for option in &self.options {
            write!(f, " {}", option)?;
        }
        Ok(())
    }
}

/// A legacy hint after its arguments were evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopHint {
    UnrollEnable,
    UnrollDisable,
    UnrollFull,
    UnrollCount(u32),
    UnrollAndJamEnable,
    UnrollAndJamDisable,
    UnrollAndJamCount(u32),
    VectorizeEnable(bool),
    VectorizeWidth(u32),
    InterleaveEnable(bool),
    InterleaveCount(u32),
    DistributeEnable(bool),
}
