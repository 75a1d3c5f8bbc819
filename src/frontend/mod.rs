//! Frontend: Lexer, Parser, and AST for the C-family host language.
//!
//! This module turns source text into a [`TranslationUnit`] with pragma
//! lines already parsed into directives and grouped with the statement that
//! follows them.
//!
//! ## Directive syntax
//!
//! ```text
//! #pragma clang transform unroll partial(4)
//! #pragma clang transform tile sizes(32, 32) floor_ids(i1, j1)
//! #pragma clang loop id(i)
//! for (int i = 0; i < N; i++)
//!     ...
//! ```

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod pragma;
pub mod printer;

// Re-exports
pub use lexer::Lexer;
pub use parser::Parser;
pub use ast::*;
pub use token::{Token, TokenKind};
pub use printer::print_unit;
pub use crate::utils::errors::ParseError;

use crate::utils::errors::Diagnostics;
use anyhow::Result;

/// A parsed translation unit with the diagnostics raised by its pragma lines.
#[derive(Debug)]
pub struct Parsed {
    pub unit: TranslationUnit,
    pub diagnostics: Diagnostics,
}

/// Parse source code into an AST.
pub fn parse(source: &str) -> Result<Parsed> {
    let mut parser = Parser::new(source)?;
    let unit = parser.parse_unit()?;
    Ok(Parsed { unit, diagnostics: parser.into_diagnostics() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let source = r#"
            void test(int n, float *A) {
                for (int i = 0; i < n; i++) {
                    A[i] = i;
                }
            }
        "#;
        let parsed = parse(source).unwrap();
        assert_eq!(parsed.unit.functions().len(), 1);
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_lexer_error_is_fatal() {
        assert!(parse("void f() { @ }").is_err());
    }
}
