//! # looptrans - Loop-Transformation Directives
//!
//! Parses `#pragma clang transform` directives in C-family source, binds them
//! to the loops they precede, validates their arguments and emits a followup
//! metadata tree per transformed loop. The older hint pragmas
//! (`#pragma unroll`, `#pragma clang loop`, `#pragma omp simd`) are handled
//! alongside so the two systems can be checked against each other.
//!
//! ## Architecture
//!
//! ```text
//! Source → Frontend (lexer, parser, pragma clauses) → Binder → Resolver → Emitter → Metadata
//! ```
//!
//! ## Example
//!
//! ```rust
//! let source = r#"
//! void scale(int n, double *a) {
//! #pragma clang transform unroll partial(4)
//!     for (int i = 0; i < n; i++)
//!         a[i] *= 2;
//! }
//! "#;
//!
//! let result = looptrans::compile(source).unwrap();
//! assert!(result.diagnostics.is_empty());
//! let f = result.metadata.function("scale").unwrap();
//! assert_eq!(f.loops.len(), 1);
//! ```

#![warn(clippy::all)]

pub mod frontend;
pub mod transform;
pub mod analysis;
pub mod codegen;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::frontend::{Parsed, ParseError, TranslationUnit};
    pub use crate::transform::{Directive, LegacyPragma, Transform, TransformKind};
    pub use crate::analysis::{FunctionBinding, LoopState};
    pub use crate::codegen::{LoopAnnotation, MetadataValue, ModuleMetadata, TransformBundle};
    pub use crate::utils::errors::{DiagKind, Diagnostic, Severity};
    pub use crate::utils::pretty::PrettyPrint;
    pub use crate::{compile, compile_with, Compilation, DirectiveConfig};
}

use crate::codegen::ModuleMetadata;
use crate::frontend::TranslationUnit;
use crate::utils::errors::{Diagnostic, Severity};
use anyhow::Result;

/// Configuration for directive processing.
#[derive(Debug, Clone)]
pub struct DirectiveConfig {
    /// Warn when a chain asks for passes in an order the pipeline cannot honor
    pub pass_order_warnings: bool,
    /// Promote every warning to an error
    pub warnings_as_errors: bool,
    /// Mark transformed loops with `llvm.loop.disable_nonforced`
    pub disable_nonforced: bool,
    /// Emit attributes for legacy hint pragmas
    pub legacy_metadata: bool,
}

impl Default for DirectiveConfig {
    fn default() -> Self {
        Self {
            pass_order_warnings: true,
            warnings_as_errors: false,
            disable_nonforced: true,
            legacy_metadata: true,
        }
    }
}

impl DirectiveConfig {
    pub fn with_pass_order_warnings(mut self, enabled: bool) -> Self {
        self.pass_order_warnings = enabled;
        self
    }

    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }

    pub fn with_disable_nonforced(mut self, enabled: bool) -> Self {
        self.disable_nonforced = enabled;
        self
    }

    pub fn with_legacy_metadata(mut self, enabled: bool) -> Self {
        self.legacy_metadata = enabled;
        self
    }
}

/// The result of processing one translation unit.
#[derive(Debug)]
pub struct Compilation {
    pub unit: TranslationUnit,
    /// Diagnostics in source order
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: ModuleMetadata,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    /// Catalogue messages of all diagnostics, in source order.
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(Diagnostic::message).collect()
    }
}

/// Parse source code into an AST with its pragma diagnostics.
pub fn parse(source: &str) -> Result<frontend::Parsed> {
    frontend::parse(source)
}

/// Process a translation unit with the default configuration.
pub fn compile(source: &str) -> Result<Compilation> {
    compile_with(source, &DirectiveConfig::default())
}

/// Full pipeline: parse, bind, resolve and emit metadata.
pub fn compile_with(source: &str, config: &DirectiveConfig) -> Result<Compilation> {
    let parsed = frontend::parse(source)?;
    let mut diagnostics = parsed.diagnostics;
    let mut functions = analysis::analyze(&parsed.unit, config, &mut diagnostics);
    let metadata = codegen::emit_module(&mut functions, config);
    log::info!(
        "{} function(s), {} annotated loop(s), {} diagnostic(s)",
        functions.len(),
        metadata.loop_count(),
        diagnostics.len()
    );

    let mut diagnostics = diagnostics.into_sorted();
    if config.warnings_as_errors {
        for diag in &mut diagnostics {
            diag.severity = Severity::Error;
        }
    }
    Ok(Compilation { unit: parsed.unit, diagnostics, metadata })
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
