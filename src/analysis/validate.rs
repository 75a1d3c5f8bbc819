//! Semantic validation of directives and legacy hints.
//!
//! Clause arguments are evaluated against the scopes visible at the pragma
//! and range-checked. A directive that fails is reported once and removed
//! from its chain; the rest of the chain is still attempted.

use crate::analysis::consteval::{eval_int, Scopes};
use crate::frontend::ast::Expr;
use crate::transform::directive::{AllocationKind, Directive, Transform};
use crate::transform::legacy::{HintState, LegacyKind, LegacyPragma, LoopHint, LoopHintOption};
use crate::utils::errors::{DiagKind, Diagnostic};
use serde::{Deserialize, Serialize};

/// Evaluated clause arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformParams {
    Unroll { full: bool, factor: Option<u32> },
    UnrollAndJam { factor: Option<u32> },
    Distribute,
    Vectorize { width: Option<u32> },
    Interleave { factor: Option<u32> },
    VectorizeInterleave { width: Option<u32>, factor: Option<u32> },
    Tile { sizes: Vec<u32> },
    Interchange,
    Reverse,
    Pack { array: String, allocate: Option<AllocationKind> },
    ParallelizeThread,
}

/// A directive whose arguments passed validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundDirective {
    pub directive: Directive,
    pub params: TransformParams,
}

impl BoundDirective {
    pub fn keyword(&self) -> &'static str {
        self.directive.kind().keyword()
    }
}

/// Evaluate a clause argument as a positive `u32`.
fn positive(expr: &Expr, clause: &str, scopes: &Scopes) -> Result<u32, Diagnostic> {
    let value = eval_int(expr, scopes).map_err(|e| e.into_diagnostic(clause))?;
    if value <= 0 {
        return Err(Diagnostic::new(DiagKind::NonPositiveArgument(clause.to_string()), expr.span));
    }
    u32::try_from(value)
        .map_err(|_| Diagnostic::new(DiagKind::ArgumentOutOfRange(clause.to_string()), expr.span))
}

fn optional_positive(expr: &Option<Expr>, clause: &str, scopes: &Scopes) -> Result<Option<u32>, Diagnostic> {
    expr.as_ref().map(|e| positive(e, clause, scopes)).transpose()
}

/// Evaluate an unroll factor, which must be at least two.
fn unroll_factor(
    expr: &Option<Expr>,
    directive: &Directive,
    scopes: &Scopes,
) -> Result<Option<u32>, Diagnostic> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    let value = eval_int(expr, scopes).map_err(|e| e.into_diagnostic("partial"))?;
    if value < 2 {
        let name = directive.kind().display_name().to_string();
        return Err(Diagnostic::new(DiagKind::FactorTooSmall(name), expr.span));
    }
    u32::try_from(value)
        .map(Some)
        .map_err(|_| Diagnostic::new(DiagKind::ArgumentOutOfRange("partial".into()), expr.span))
}

/// Validate one directive against the scopes at its position.
pub fn validate_directive(directive: &Directive, scopes: &Scopes) -> Result<BoundDirective, Diagnostic> {
    let params = match &directive.transform {
        Transform::Unroll { full, partial } => TransformParams::Unroll {
            full: *full,
            factor: unroll_factor(partial, directive, scopes)?,
        },
        Transform::UnrollAndJam { partial } => TransformParams::UnrollAndJam {
            factor: unroll_factor(partial, directive, scopes)?,
        },
        Transform::Distribute => TransformParams::Distribute,
        Transform::Vectorize { width } => TransformParams::Vectorize {
            width: optional_positive(width, "width", scopes)?,
        },
        Transform::Interleave { factor } => TransformParams::Interleave {
            factor: optional_positive(factor, "factor", scopes)?,
        },
        Transform::VectorizeInterleave { width, factor } => TransformParams::VectorizeInterleave {
            width: optional_positive(width, "width", scopes)?,
            factor: optional_positive(factor, "factor", scopes)?,
        },
        Transform::Tile { sizes, floor_ids, tile_ids } => {
            let sizes = sizes
                .iter()
                .map(|e| positive(e, "sizes", scopes))
                .collect::<Result<Vec<_>, _>>()?;
            for (clause, ids) in [("floor_ids", floor_ids), ("tile_ids", tile_ids)] {
                if !ids.is_empty() && ids.len() != sizes.len() {
                    let kind = DiagKind::IdCountMismatch {
                        clause: clause.to_string(),
                        expected: sizes.len(),
                        found: ids.len(),
                    };
                    return Err(Diagnostic::new(kind, directive.span));
                }
            }
            TransformParams::Tile { sizes }
        }
        Transform::Interchange { .. } => TransformParams::Interchange,
        Transform::Reverse { .. } => TransformParams::Reverse,
        Transform::Pack { array, allocate } => TransformParams::Pack {
            array: packed_array(array, scopes)?,
            allocate: *allocate,
        },
        Transform::ParallelizeThread => TransformParams::ParallelizeThread,
    };
    log::trace!("validated `{}`", directive);
    Ok(BoundDirective { directive: directive.clone(), params })
}

/// The variable an `array(...)` clause packs.
fn packed_array(array: &Expr, scopes: &Scopes) -> Result<String, Diagnostic> {
    let name = array
        .base_variable()
        .ok_or_else(|| Diagnostic::new(DiagKind::ExpectsArray, array.span))?;
    let info = scopes
        .lookup(name)
        .ok_or_else(|| Diagnostic::new(DiagKind::UndeclaredIdentifier(name.to_string()), array.span))?;
    if !info.indirect {
        return Err(Diagnostic::new(DiagKind::ExpectsArray, array.span));
    }
    Ok(name.to_string())
}

/// Evaluate a legacy hint count, which must be positive.
fn hint_count(expr: &Expr, clause: &str, scopes: &Scopes) -> Result<u32, Diagnostic> {
    let value = eval_int(expr, scopes).map_err(|e| e.into_diagnostic(clause))?;
    if value <= 0 {
        return Err(Diagnostic::new(DiagKind::InvalidHintValue(value), expr.span));
    }
    u32::try_from(value)
        .map_err(|_| Diagnostic::new(DiagKind::ArgumentOutOfRange(clause.to_string()), expr.span))
}

/// Evaluate the hints of a legacy pragma. Loop names are not hints and are skipped.
pub fn evaluate_hints(pragma: &LegacyPragma, scopes: &Scopes) -> Result<Vec<LoopHint>, Diagnostic> {
    let mut hints = Vec::new();
    match pragma.kind {
        LegacyKind::Unroll => match &pragma.count {
            Some(count) => hints.push(LoopHint::UnrollCount(hint_count(count, "unroll", scopes)?)),
            None => hints.push(LoopHint::UnrollEnable),
        },
        LegacyKind::NoUnroll => hints.push(LoopHint::UnrollDisable),
        LegacyKind::UnrollAndJam => match &pragma.count {
            Some(count) => {
                hints.push(LoopHint::UnrollAndJamCount(hint_count(count, "unroll_and_jam", scopes)?))
            }
            None => hints.push(LoopHint::UnrollAndJamEnable),
        },
        LegacyKind::NoUnrollAndJam => hints.push(LoopHint::UnrollAndJamDisable),
        LegacyKind::OmpSimd => hints.push(LoopHint::VectorizeEnable(true)),
        LegacyKind::ClangLoop => {
            for option in pragma.hint_options() {
                let hint = match option {
                    LoopHintOption::Vectorize(state) => LoopHint::VectorizeEnable(*state == HintState::Enable),
                    LoopHintOption::Interleave(state) => LoopHint::InterleaveEnable(*state == HintState::Enable),
                    LoopHintOption::Distribute(state) => LoopHint::DistributeEnable(*state == HintState::Enable),
                    LoopHintOption::Unroll(HintState::Enable) => LoopHint::UnrollEnable,
                    LoopHintOption::Unroll(HintState::Disable) => LoopHint::UnrollDisable,
                    LoopHintOption::Unroll(HintState::Full) => LoopHint::UnrollFull,
                    LoopHintOption::VectorizeWidth(e) => {
                        LoopHint::VectorizeWidth(hint_count(e, option.name(), scopes)?)
                    }
                    LoopHintOption::InterleaveCount(e) => {
                        LoopHint::InterleaveCount(hint_count(e, option.name(), scopes)?)
                    }
                    LoopHintOption::UnrollCount(e) => {
                        LoopHint::UnrollCount(hint_count(e, option.name(), scopes)?)
                    }
                    LoopHintOption::Id(_) => continue,
                };
                hints.push(hint);
            }
        }
    }
    Ok(hints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{Item, Pragma, StmtKind};
    use crate::frontend::parser::Parser;

    /// Parse `globals` followed by a function whose body holds one pragma
    /// before a loop, and return the pragma with the global scopes.
    fn pragma_in(globals: &str, pragma: &str) -> (Pragma, Scopes) {
        let src = format!("{}\nvoid f(void) {{\n{}\nfor (;;) ;\n}}\n", globals, pragma);
        let unit = Parser::new(&src).unwrap().parse_unit().unwrap();
        let mut scopes = Scopes::new();
        let mut found = None;
        for item in &unit.items {
            match item {
                Item::Decl(d) => scopes.declare_decl(d),
                Item::Function(f) => {
                    let stmt = &f.body.as_ref().unwrap().statements[0];
                    if let StmtKind::Annotated { pragmas, .. } = &stmt.kind {
                        found = Some(pragmas[0].clone());
                    }
                }
                _ => {}
            }
        }
        (found.unwrap(), scopes)
    }

    fn check(globals: &str, pragma: &str) -> Result<BoundDirective, Diagnostic> {
        match pragma_in(globals, pragma) {
            (Pragma::Transform(d), scopes) => validate_directive(&d, &scopes),
            _ => panic!("not a transform directive"),
        }
    }

    fn hints(globals: &str, pragma: &str) -> Result<Vec<LoopHint>, Diagnostic> {
        match pragma_in(globals, pragma) {
            (Pragma::Legacy(l), scopes) => evaluate_hints(&l, &scopes),
            _ => panic!("not a legacy pragma"),
        }
    }

    #[test]
    fn test_unroll_factor_bounds() {
        for bad in ["0", "1"] {
            let err = check("", &format!("#pragma clang transform unroll partial({})", bad)).unwrap_err();
            assert_eq!(err.message(), "unroll factor must be at least two");
        }
        let ok = check("", "#pragma clang transform unroll partial(2)").unwrap();
        assert_eq!(ok.params, TransformParams::Unroll { full: false, factor: Some(2) });
    }

    #[test]
    fn test_unroll_and_jam_factor_name() {
        let err = check("", "#pragma clang transform unrollandjam partial(1)").unwrap_err();
        assert_eq!(err.message(), "unroll-and-jam factor must be at least two");
    }

    #[test]
    fn test_constant_arguments() {
        let ok = check("const int W = 4;", "#pragma clang transform vectorize width(W * 2)").unwrap();
        assert_eq!(ok.params, TransformParams::Vectorize { width: Some(8) });

        let err = check("int w = 4;", "#pragma clang transform vectorize width(w)").unwrap_err();
        assert_eq!(err.message(), "expression is not an integral constant expression");

        let err = check("", "#pragma clang transform interleave factor(2.0)").unwrap_err();
        assert_eq!(err.message(), "'factor' clause expects an int");

        let err = check("", "#pragma clang transform unroll partial(K)").unwrap_err();
        assert_eq!(err.message(), "use of undeclared identifier 'K'");
    }

    #[test]
    fn test_positive_and_range() {
        let err = check("", "#pragma clang transform tile sizes(4, 0)").unwrap_err();
        assert_eq!(err.message(), "argument to 'sizes' clause must be a positive integer");

        let err = check("", "#pragma clang transform vectorize width(4294967296)").unwrap_err();
        assert_eq!(err.message(), "argument to 'width' clause is out of range");
    }

    #[test]
    fn test_tile_id_counts() {
        let err = check("", "#pragma clang transform tile sizes(4, 4) floor_ids(a)").unwrap_err();
        assert_eq!(err.message(), "'floor_ids' clause expects 2 loop ids, but 1 were given");

        let ok = check("", "#pragma clang transform tile sizes(8, 16) tile_ids(x, y)").unwrap();
        assert_eq!(ok.params, TransformParams::Tile { sizes: vec![8, 16] });
    }

    #[test]
    fn test_pack_array() {
        let ok = check("double A[64];", "#pragma clang transform pack array(A[0]) allocate(malloc)").unwrap();
        assert_eq!(
            ok.params,
            TransformParams::Pack { array: "A".into(), allocate: Some(AllocationKind::Malloc) }
        );

        let err = check("int n;", "#pragma clang transform pack array(n)").unwrap_err();
        assert_eq!(err.message(), "'array' clause expects an array variable");

        let err = check("", "#pragma clang transform pack array(B)").unwrap_err();
        assert_eq!(err.message(), "use of undeclared identifier 'B'");
    }

    #[test]
    fn test_legacy_hints() {
        assert_eq!(hints("", "#pragma unroll 4").unwrap(), vec![LoopHint::UnrollCount(4)]);
        assert_eq!(hints("", "#pragma nounroll").unwrap(), vec![LoopHint::UnrollDisable]);
        assert_eq!(hints("", "#pragma omp simd").unwrap(), vec![LoopHint::VectorizeEnable(true)]);
        assert_eq!(
            hints("", "#pragma clang loop vectorize(enable) interleave_count(2) id(i)").unwrap(),
            vec![LoopHint::VectorizeEnable(true), LoopHint::InterleaveCount(2)]
        );
        let err = hints("", "#pragma unroll(0)").unwrap_err();
        assert_eq!(err.message(), "invalid value '0'; must be positive");
        let err = hints("", "#pragma clang loop unroll_count(-2)").unwrap_err();
        assert_eq!(err.message(), "invalid value '-2'; must be positive");
    }
}
