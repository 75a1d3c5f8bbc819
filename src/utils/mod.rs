//! Utility modules shared by the directive pipeline.
//!
//! This module contains common utilities used throughout the codebase:
//! - Error types and the diagnostic catalogue
//! - Source location tracking
//! - Loop-name interning
//! - Pretty printing

pub mod errors;
pub mod location;
pub mod intern;
pub mod pretty;

// Re-exports
pub use errors::*;
pub use location::{SourceLocation, SourceMap, Span};
pub use intern::{Symbol, SymbolInterner};
