//! Parsing of `#pragma` lines.
//!
//! The lexer delivers a pragma as `Hash pragma <words...> Eod`. Each line
//! yields at most one [`Pragma`]; a line that fails to parse is reported,
//! skipped up to its `Eod`, and leaves the surrounding code untouched.

use crate::frontend::ast::{Expr, Pragma};
use crate::frontend::parser::Parser;
use crate::frontend::token::{Token, TokenKind};
use crate::transform::clause::{schema_of, ArgShape, ClauseKind};
use crate::transform::directive::{AllocationKind, ClauseValues, Directive, LoopName, Transform};
use crate::transform::legacy::{HintState, LegacyKind, LegacyPragma, LoopHintOption, OptionArg};
use crate::transform::registry::{kind_of, TransformKind};
use crate::utils::errors::{DiagKind, Diagnostic};
use crate::utils::location::Span;

type PragmaResult<T> = Result<T, Diagnostic>;

/// Pragmas that are accepted and ignored without comment.
const SILENT_PRAGMAS: &[&str] = &["once", "mark", "region", "endregion", "GCC", "pack", "message", "STDC"];

impl Parser {
    /// Parse consecutive pragma lines. Lines that fail are dropped.
    pub(super) fn parse_pragma_run(&mut self) -> Vec<Pragma> {
        let mut pragmas = Vec::new();
        while self.check(TokenKind::Hash) {
            if let Some(pragma) = self.parse_pragma() {
                pragmas.push(pragma);
            }
        }
        pragmas
    }

    fn parse_pragma(&mut self) -> Option<Pragma> {
        let hash = self.advance().span;
        // the lexer only opens a directive for `#pragma`
        self.advance();

        let word = self.current().lexeme.clone();
        let result = match word.as_str() {
            "clang" => match self.peek_lexeme(1).map(str::to_string).as_deref() {
                Some("transform") => {
                    self.advance();
                    self.parse_transform(hash).map(|d| Some(Pragma::Transform(d)))
                }
                Some("loop") => {
                    self.advance();
                    self.parse_clang_loop(hash).map(|l| Some(Pragma::Legacy(l)))
                }
                Some("diagnostic") => Ok(None),
                _ => Err(Diagnostic::new(DiagKind::UnknownPragma, self.current().span)),
            },
            "unroll" => self.parse_counted_hint(hash, LegacyKind::Unroll).map(Some),
            "nounroll" => self.parse_counted_hint(hash, LegacyKind::NoUnroll).map(Some),
            "unroll_and_jam" => self.parse_counted_hint(hash, LegacyKind::UnrollAndJam).map(Some),
            "nounroll_and_jam" => self.parse_counted_hint(hash, LegacyKind::NoUnrollAndJam).map(Some),
            "omp" => {
                if self.peek_lexeme(1) == Some("simd") {
                    self.advance();
                    let simd = self.advance().span;
                    let pragma = LegacyPragma::new(LegacyKind::OmpSimd, hash.merge(&simd));
                    Ok(Some(Pragma::Legacy(pragma)))
                } else {
                    Ok(None)
                }
            }
            w if SILENT_PRAGMAS.contains(&w) => Ok(None),
            _ if self.check(TokenKind::Eod) => Ok(None),
            _ => Err(Diagnostic::new(DiagKind::UnknownPragma, self.current().span)),
        };

        self.skip_to_eod();
        match result {
            Ok(pragma) => {
                if let Some(p) = &pragma {
                    log::trace!("parsed pragma `{}`", p);
                }
                pragma
            }
            Err(diag) => {
                self.diagnostics.report(diag);
                None
            }
        }
    }

    /// `#pragma clang transform <keyword> <clause>*`, positioned at `transform`.
    fn parse_transform(&mut self, hash: Span) -> PragmaResult<Directive> {
        self.advance();
        if !self.current().is_word() {
            return Err(Diagnostic::new(DiagKind::ExpectedTransformName, self.current().span));
        }
        let keyword = self.advance().clone();
        let kind = kind_of(&keyword.lexeme);
        if kind == TransformKind::Unknown {
            return Err(Diagnostic::new(DiagKind::UnknownTransform(keyword.lexeme), keyword.span));
        }

        let schema = schema_of(kind);
        let mut values = ClauseValues::default();
        let mut clauses: Vec<ClauseKind> = Vec::new();

        while !self.check(TokenKind::Eod) && !self.is_at_end() {
            if !self.current().is_word() {
                return Err(Diagnostic::new(DiagKind::ExpectedClauseName, self.current().span));
            }
            let tok = self.advance().clone();
            let clause = ClauseKind::from_name(&tok.lexeme)
                .ok_or_else(|| Diagnostic::new(DiagKind::UnknownClause(tok.lexeme.clone()), tok.span))?;

            if !schema.allows(clause) {
                let kind = DiagKind::ClauseNotAllowed {
                    clause: clause.name().to_string(),
                    transform: kind.keyword().to_string(),
                };
                return Err(Diagnostic::new(kind, tok.span));
            }
            if clauses.contains(&clause) {
                return Err(Diagnostic::new(DiagKind::DuplicateClause(clause.name().to_string()), tok.span));
            }
            if let Some(other) = schema.exclusive_with(clause).filter(|c| clauses.contains(c)) {
                let kind = DiagKind::ConflictingClauses {
                    first: other.name().to_string(),
                    second: clause.name().to_string(),
                };
                return Err(Diagnostic::new(kind, tok.span));
            }

            self.parse_clause_args(clause, &mut values)?;
            clauses.push(clause);
        }

        let span = hash.merge(&self.previous().span);
        if let Some(missing) = schema.required.iter().find(|c| !clauses.contains(*c)) {
            let kind = DiagKind::MissingClause {
                transform: kind.keyword().to_string(),
                clause: missing.name().to_string(),
            };
            return Err(Diagnostic::new(kind, span));
        }

        let transform = Transform::assemble(kind, values)
            .ok_or_else(|| Diagnostic::new(DiagKind::ExpectedExpression, span))?;
        Ok(Directive::new(transform, clauses, span))
    }

    fn parse_clause_args(&mut self, clause: ClauseKind, values: &mut ClauseValues) -> PragmaResult<()> {
        let shape = clause.arg_shape();
        if !shape.takes_arguments() {
            if clause == ClauseKind::Full {
                values.full = true;
            }
            return Ok(());
        }

        self.expect_lparen(clause.name())?;
        match shape {
            ArgShape::Int | ArgShape::Expr => {
                let expr = self.parse_pragma_expr()?;
                match clause {
                    ClauseKind::Partial => values.partial = Some(expr),
                    ClauseKind::Factor => values.factor = Some(expr),
                    ClauseKind::Width => values.width = Some(expr),
                    ClauseKind::Array => values.array = Some(expr),
                    _ => {}
                }
            }
            ArgShape::IntList => {
                values.sizes = self.parse_pragma_list(Self::parse_pragma_expr)?;
            }
            ArgShape::Ident => {
                values.reversed_id = Some(self.parse_loop_name()?);
            }
            ArgShape::IdentList => {
                let names = self.parse_pragma_list(Self::parse_loop_name)?;
                match clause {
                    ClauseKind::FloorIds => values.floor_ids = names,
                    ClauseKind::TileIds => values.tile_ids = names,
                    ClauseKind::Permutation => values.permutation = names,
                    _ => {}
                }
            }
            ArgShape::AllocKind => {
                if !self.current().is_word() {
                    return Err(Diagnostic::new(DiagKind::ExpectedIdentifier, self.current().span));
                }
                let tok = self.advance().clone();
                let kind = AllocationKind::from_name(&tok.lexeme)
                    .ok_or_else(|| Diagnostic::new(DiagKind::InvalidAllocationKind(tok.lexeme.clone()), tok.span))?;
                values.allocate = Some(kind);
            }
            ArgShape::None => {}
        }
        self.expect_rparen()
    }

    /// `#pragma clang loop <option>(<arg>)...`, positioned at `loop`.
    fn parse_clang_loop(&mut self, hash: Span) -> PragmaResult<LegacyPragma> {
        self.advance();
        let mut options = Vec::new();

        loop {
            if self.check(TokenKind::Eod) && !options.is_empty() {
                break;
            }
            if !self.current().is_word() {
                return Err(Diagnostic::new(DiagKind::ExpectedIdentifier, self.current().span));
            }
            let tok = self.advance().clone();
            let name = tok.lexeme.as_str();
            let arg = LoopHintOption::arg_of(name)
                .ok_or_else(|| Diagnostic::new(DiagKind::UnknownLoopHint(name.to_string()), tok.span))?;
            self.expect_lparen(name)?;

            let option = match arg {
                OptionArg::Toggle | OptionArg::ToggleOrFull => {
                    if !self.current().is_word() {
                        return Err(Diagnostic::new(DiagKind::ExpectedIdentifier, self.current().span));
                    }
                    let value = self.advance().clone();
                    HintState::from_name(&value.lexeme)
                        .and_then(|state| LoopHintOption::toggle(name, state))
                        .ok_or_else(|| invalid_hint_argument(name, &value))?
                }
                OptionArg::Count => {
                    let expr = self.parse_pragma_expr()?;
                    LoopHintOption::count(name, expr)
                        .ok_or_else(|| Diagnostic::new(DiagKind::UnknownLoopHint(name.to_string()), tok.span))?
                }
                OptionArg::Name => LoopHintOption::Id(self.parse_loop_name()?),
            };
            self.expect_rparen()?;
            options.push(option);
        }

        let span = hash.merge(&self.previous().span);
        Ok(LegacyPragma::new(LegacyKind::ClangLoop, span).with_options(options))
    }

    /// `#pragma unroll [N | (N)]` and its relatives, positioned at the keyword.
    fn parse_counted_hint(&mut self, hash: Span, kind: LegacyKind) -> PragmaResult<Pragma> {
        self.advance();
        let mut pragma = LegacyPragma::new(kind, hash);

        if kind.takes_count() && !self.check(TokenKind::Eod) {
            if self.match_token(TokenKind::LeftParen) {
                let count = self.parse_pragma_expr()?;
                self.expect_rparen()?;
                pragma = pragma.with_count(count, true);
            } else {
                let count = self.parse_pragma_expr()?;
                pragma = pragma.with_count(count, false);
            }
        }

        pragma.span = hash.merge(&self.previous().span);
        Ok(Pragma::Legacy(pragma))
    }

    fn parse_pragma_expr(&mut self) -> PragmaResult<Expr> {
        if matches!(self.current().kind, TokenKind::RightParen | TokenKind::Eod | TokenKind::Comma) {
            return Err(Diagnostic::new(DiagKind::ExpectedExpression, self.current().span));
        }
        match self.parse_expression() {
            Ok(expr) => Ok(expr),
            Err(_) => Err(Diagnostic::new(DiagKind::ExpectedExpression, self.current().span)),
        }
    }

    fn parse_loop_name(&mut self) -> PragmaResult<LoopName> {
        if !self.check(TokenKind::Identifier) {
            return Err(Diagnostic::new(DiagKind::ExpectedIdentifier, self.current().span));
        }
        let tok = self.advance();
        Ok(LoopName::new(tok.lexeme.clone(), tok.span))
    }

    fn parse_pragma_list<T>(&mut self, item: fn(&mut Self) -> PragmaResult<T>) -> PragmaResult<Vec<T>> {
        let mut items = vec![item(self)?];
        while self.match_token(TokenKind::Comma) {
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn expect_lparen(&mut self, clause: &str) -> PragmaResult<()> {
        if self.match_token(TokenKind::LeftParen) {
            Ok(())
        } else {
            Err(Diagnostic::new(DiagKind::ExpectedLParen(clause.to_string()), self.current().span))
        }
    }

    fn expect_rparen(&mut self) -> PragmaResult<()> {
        if self.match_token(TokenKind::RightParen) {
            Ok(())
        } else {
            Err(Diagnostic::new(DiagKind::ExpectedRParen, self.current().span))
        }
    }

    fn peek_lexeme(&self, ahead: usize) -> Option<&str> {
        self.tokens.get(self.pos + ahead).map(|t| t.lexeme.as_str())
    }

    /// Skip the rest of the directive line, including its `Eod`.
    fn skip_to_eod(&mut self) {
        while !self.check(TokenKind::Eod) && !self.is_at_end() {
            self.advance();
        }
        self.match_token(TokenKind::Eod);
    }
}

fn invalid_hint_argument(option: &str, value: &Token) -> Diagnostic {
    let kind = DiagKind::InvalidHintArgument {
        option: option.to_string(),
        argument: value.lexeme.clone(),
    };
    Diagnostic::new(kind, value.span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{StmtKind, TranslationUnit};
    use crate::utils::errors::Diagnostics;

    fn parse_pragmas(lines: &str) -> (Vec<Pragma>, Diagnostics) {
        let src = format!("void f() {{\n{}\nfor (;;) {{}}\n}}\n", lines);
        let mut parser = Parser::new(&src).unwrap();
        let unit: TranslationUnit = parser.parse_unit().unwrap();
        let body = unit.find_function("f").unwrap().body.as_ref().unwrap();
        let pragmas = match &body.statements[0].kind {
            StmtKind::Annotated { pragmas, .. } => pragmas.clone(),
            _ => Vec::new(),
        };
        (pragmas, parser.into_diagnostics())
    }

    fn first_error(lines: &str) -> String {
        let (_, diags) = parse_pragmas(lines);
        let message = diags.iter().next().map(|d| d.message()).unwrap_or_default();
        message
    }

    #[test]
    fn test_bare_transform() {
        let (pragmas, diags) = parse_pragmas("#pragma clang transform distribute");
        assert!(diags.is_empty());
        match &pragmas[0] {
            Pragma::Transform(d) => assert_eq!(d.kind(), TransformKind::Distribute),
            _ => panic!("expected transform"),
        }
    }

    #[test]
    fn test_tile_clauses() {
        let (pragmas, diags) =
            parse_pragmas("#pragma clang transform tile sizes(32, N + 1) floor_ids(a, b) tile_ids(c, d)");
        assert!(diags.is_empty());
        match &pragmas[0] {
            Pragma::Transform(d) => match &d.transform {
                Transform::Tile { sizes, floor_ids, tile_ids } => {
                    assert_eq!(sizes.len(), 2);
                    assert_eq!(sizes[1].to_string(), "N + 1");
                    assert_eq!(floor_ids[1].name, "b");
                    assert_eq!(tile_ids[0].name, "c");
                }
                other => panic!("unexpected transform {:?}", other),
            },
            _ => panic!("expected transform"),
        }
    }

    #[test]
    fn test_directive_span_covers_line() {
        let (pragmas, _) = parse_pragmas("#pragma clang transform unroll partial(4)");
        let span = pragmas[0].span();
        assert_eq!(span.start_line, 2);
        assert_eq!(span.start_column, 1);
        assert_eq!(span.end_column, 42);
    }

    #[test]
    fn test_clause_errors() {
        assert_eq!(
            first_error("#pragma clang transform"),
            "expected a transformation name after '#pragma clang transform'"
        );
        assert_eq!(first_error("#pragma clang transform fuse"), "unknown transformation 'fuse'");
        assert_eq!(first_error("#pragma clang transform unroll bogus"), "unknown clause name 'bogus'");
        assert_eq!(
            first_error("#pragma clang transform unroll width(4)"),
            "clause 'width' is not valid for 'unroll' transformation"
        );
        assert_eq!(first_error("#pragma clang transform unroll partial 4"), "expected '(' after 'partial'");
        assert_eq!(first_error("#pragma clang transform unroll partial(4"), "expected ')'");
        assert_eq!(first_error("#pragma clang transform unroll partial()"), "expected expression");
        assert_eq!(first_error("#pragma clang transform reverse reversed_id()"), "expected identifier");
        assert_eq!(first_error("#pragma clang transform unroll 4"), "expected clause name");
    }

    #[test]
    fn test_multiplicity_errors() {
        assert!(first_error("#pragma clang transform unroll full full").contains("specified multiple times"));
        assert!(first_error("#pragma clang transform unroll partial(4) partial(4)")
            .contains("specified multiple times"));
        assert_eq!(
            first_error("#pragma clang transform unroll full partial(4)"),
            "'full' and 'partial' clauses specified multiple times; they are mutually exclusive"
        );
    }

    #[test]
    fn test_required_clauses() {
        assert_eq!(
            first_error("#pragma clang transform tile"),
            "'tile' transformation requires a 'sizes' clause"
        );
        assert_eq!(
            first_error("#pragma clang transform pack allocate(malloc)"),
            "'pack' transformation requires a 'array' clause"
        );
        assert_eq!(
            first_error("#pragma clang transform pack array(A) allocate(heap)"),
            "invalid allocation kind 'heap'; expected 'alloca' or 'malloc'"
        );
    }

    #[test]
    fn test_failed_pragma_is_dropped_but_others_survive() {
        let (pragmas, diags) =
            parse_pragmas("#pragma clang transform fuse\n#pragma clang transform unroll");
        assert_eq!(diags.len(), 1);
        assert_eq!(pragmas.len(), 1);
    }

    #[test]
    fn test_legacy_counts() {
        let (pragmas, diags) = parse_pragmas("#pragma unroll 4\n#pragma unroll_and_jam(2)\n#pragma nounroll");
        assert!(diags.is_empty());
        let text: Vec<String> = pragmas.iter().map(|p| p.to_string()).collect();
        assert_eq!(text, vec!["#pragma unroll 4", "#pragma unroll_and_jam(2)", "#pragma nounroll"]);
    }

    #[test]
    fn test_clang_loop_options() {
        let (pragmas, diags) =
            parse_pragmas("#pragma clang loop vectorize(enable) vectorize_width(4) id(outer)");
        assert!(diags.is_empty());
        match &pragmas[0] {
            Pragma::Legacy(l) => {
                assert_eq!(l.options.len(), 3);
                assert_eq!(l.loop_id().unwrap().name, "outer");
            }
            _ => panic!("expected legacy pragma"),
        }
        assert_eq!(first_error("#pragma clang loop fuse(enable)"), "unknown loop hint option 'fuse'");
        assert_eq!(
            first_error("#pragma clang loop vectorize(full)"),
            "invalid argument 'full' for loop hint 'vectorize'"
        );
        assert_eq!(first_error("#pragma clang loop"), "expected identifier");
    }

    #[test]
    fn test_omp_simd_and_unknown() {
        let (pragmas, diags) = parse_pragmas("#pragma omp simd safelen(4)\n#pragma weird thing\n#pragma once");
        assert_eq!(pragmas.len(), 1);
        assert_eq!(pragmas[0].to_string(), "#pragma omp simd");
        assert_eq!(diags.len(), 1);
        let diag = diags.iter().next().unwrap();
        assert!(diag.is_warning());
        assert_eq!(diag.message(), "unknown pragma ignored");
    }
}
