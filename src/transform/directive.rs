//! Typed directive objects.
//!
//! A [`Directive`] is one parsed `#pragma clang transform` line. Its
//! [`Transform`] carries the clause arguments of that kind; the pipeline
//! attributes (stage, input and output counts, followup slots) are derived
//! from the variant and never stored.

use crate::frontend::ast::Expr;
use crate::transform::clause::ClauseKind;
use crate::transform::registry::TransformKind;
use crate::utils::location::Span;
use crate::utils::pretty::format_list;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-assigned loop name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopName {
    pub name: String,
    pub span: Span,
}

impl LoopName {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span }
    }
}

impl fmt::Display for LoopName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Storage for a packed array copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationKind {
    Alloca,
    Malloc,
}

impl AllocationKind {
    pub fn name(self) -> &'static str {
        match self {
            AllocationKind::Alloca => "alloca",
            AllocationKind::Malloc => "malloc",
        }
    }

    pub fn from_name(name: &str) -> Option<AllocationKind> {
        match name {
            "alloca" => Some(AllocationKind::Alloca),
            "malloc" => Some(AllocationKind::Malloc),
            _ => None,
        }
    }
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A requested transformation with its clause arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Transform {
    Unroll {
        full: bool,
        partial: Option<Expr>,
    },
    UnrollAndJam {
        partial: Option<Expr>,
    },
    Distribute,
    Vectorize {
        width: Option<Expr>,
    },
    Interleave {
        factor: Option<Expr>,
    },
    VectorizeInterleave {
        width: Option<Expr>,
        factor: Option<Expr>,
    },
    Tile {
        sizes: Vec<Expr>,
        floor_ids: Vec<LoopName>,
        tile_ids: Vec<LoopName>,
    },
    Interchange {
        permutation: Vec<LoopName>,
    },
    Reverse {
        reversed_id: Option<LoopName>,
    },
    Pack {
        array: Expr,
        allocate: Option<AllocationKind>,
    },
    ParallelizeThread,
}

/// Clause arguments collected while parsing, before the variant is known to be complete.
#[derive(Debug, Clone, Default)]
pub struct ClauseValues {
    pub full: bool,
    pub partial: Option<Expr>,
    pub factor: Option<Expr>,
    pub width: Option<Expr>,
    pub sizes: Vec<Expr>,
    pub floor_ids: Vec<LoopName>,
    pub tile_ids: Vec<LoopName>,
    pub permutation: Vec<LoopName>,
    pub reversed_id: Option<LoopName>,
    pub array: Option<Expr>,
    pub allocate: Option<AllocationKind>,
}

impl Transform {
    /// Build the variant for `kind`. Returns None for `Unknown` or when a
    /// mandatory argument is absent.
    pub fn assemble(kind: TransformKind, values: ClauseValues) -> Option<Transform> {
        let transform = match kind {
            TransformKind::Unknown => return None,
            TransformKind::Unroll => Transform::Unroll { full: values.full, partial: values.partial },
            TransformKind::UnrollAndJam => Transform::UnrollAndJam { partial: values.partial },
            TransformKind::Distribute => Transform::Distribute,
            TransformKind::Vectorize => Transform::Vectorize { width: values.width },
            TransformKind::Interleave => Transform::Interleave { factor: values.factor },
            TransformKind::VectorizeInterleave => Transform::VectorizeInterleave {
                width: values.width,
                factor: values.factor,
            },
            TransformKind::Tile => {
                if values.sizes.is_empty() {
                    return None;
                }
                Transform::Tile {
                    sizes: values.sizes,
                    floor_ids: values.floor_ids,
                    tile_ids: values.tile_ids,
                }
            }
            TransformKind::Interchange => {
                if values.permutation.is_empty() {
                    return None;
                }
                Transform::Interchange { permutation: values.permutation }
            }
            TransformKind::Reverse => Transform::Reverse { reversed_id: values.reversed_id },
            TransformKind::Pack => Transform::Pack {
                array: values.array?,
                allocate: values.allocate,
            },
            TransformKind::ParallelizeThread => Transform::ParallelizeThread,
        };
        Some(transform)
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::Unroll { .. } => TransformKind::Unroll,
            Transform::UnrollAndJam { .. } => TransformKind::UnrollAndJam,
            Transform::Distribute => TransformKind::Distribute,
            Transform::Vectorize { .. } => TransformKind::Vectorize,
            Transform::Interleave { .. } => TransformKind::Interleave,
            Transform::VectorizeInterleave { .. } => TransformKind::VectorizeInterleave,
            Transform::Tile { .. } => TransformKind::Tile,
            Transform::Interchange { .. } => TransformKind::Interchange,
            Transform::Reverse { .. } => TransformKind::Reverse,
            Transform::Pack { .. } => TransformKind::Pack,
            Transform::ParallelizeThread => TransformKind::ParallelizeThread,
        }
    }
}

/// The role of a generated loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FollowupRole {
    Unrolled,
    Outer,
    Inner,
    Vectorized,
    All,
    Floor,
    Tile,
    Interchanged,
    Reversed,
    Packed,
}

impl FollowupRole {
    pub fn name(self) -> &'static str {
        match self {
            FollowupRole::Unrolled => "unrolled",
            FollowupRole::Outer => "outer",
            FollowupRole::Inner => "inner",
            FollowupRole::Vectorized => "vectorized",
            FollowupRole::All => "all",
            FollowupRole::Floor => "floor",
            FollowupRole::Tile => "tile",
            FollowupRole::Interchanged => "interchanged",
            FollowupRole::Reversed => "reversed",
            FollowupRole::Packed => "packed",
        }
    }
}

/// A named output position of a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowupSlot {
    pub role: FollowupRole,
    /// Depth within a generated nest, for nest-shaped roles
    pub position: Option<usize>,
}

impl FollowupSlot {
    pub fn single(role: FollowupRole) -> Self {
        Self { role, position: None }
    }

    pub fn nested(role: FollowupRole, position: usize) -> Self {
        Self { role, position: Some(position) }
    }

    /// Suffix appended to the transformation's metadata prefix.
    pub fn key_suffix(&self) -> String {
        match self.position {
            Some(depth) => format!("followup_{}.{}", self.role.name(), depth),
            None => format!("followup_{}", self.role.name()),
        }
    }
}

impl fmt::Display for FollowupSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(depth) => write!(f, "{}[{}]", self.role.name(), depth),
            None => write!(f, "{}", self.role.name()),
        }
    }
}

/// One parsed `#pragma clang transform` line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub transform: Transform,
    /// Clauses in the order they were written
    pub clauses: Vec<ClauseKind>,
    pub span: Span,
}

impl Directive {
    pub fn new(transform: Transform, clauses: Vec<ClauseKind>, span: Span) -> Self {
        Self { transform, clauses, span }
    }

    pub fn kind(&self) -> TransformKind {
        self.transform.kind()
    }

    /// Position in the backend pass pipeline, for kinds that have one.
    pub fn pipeline_stage(&self) -> Option<u32> {
        match &self.transform {
            Transform::Distribute => Some(1),
            Transform::Vectorize { .. }
            | Transform::Interleave { .. }
            | Transform::VectorizeInterleave { .. } => Some(2),
            Transform::UnrollAndJam { .. } => Some(3),
            Transform::Unroll { partial: Some(_), .. } => Some(4),
            Transform::Unroll { .. } => Some(0),
            Transform::Tile { .. }
            | Transform::Interchange { .. }
            | Transform::Reverse { .. }
            | Transform::Pack { .. }
            | Transform::ParallelizeThread => None,
        }
    }

    /// Number of loops consumed, starting at the target loop.
    pub fn loop_inputs(&self) -> usize {
        match &self.transform {
            Transform::UnrollAndJam { .. } => 2,
            Transform::Tile { sizes, .. } => sizes.len(),
            Transform::Interchange { permutation } => permutation.len(),
            _ => 1,
        }
    }

    /// Number of loops produced.
    pub fn loop_outputs(&self) -> usize {
        match &self.transform {
            Transform::Unroll { full: true, .. } | Transform::ParallelizeThread => 0,
            Transform::UnrollAndJam { .. } => 2,
            Transform::Tile { sizes, .. } => 2 * sizes.len(),
            Transform::Interchange { permutation } => permutation.len(),
            _ => 1,
        }
    }

    /// Output slots in order. The first slot is the primary one.
    pub fn followup_slots(&self) -> Vec<FollowupSlot> {
        match &self.transform {
            Transform::Unroll { full: true, .. } | Transform::ParallelizeThread => Vec::new(),
            Transform::Unroll { .. } => vec![FollowupSlot::single(FollowupRole::Unrolled)],
            Transform::UnrollAndJam { .. } => vec![
                FollowupSlot::single(FollowupRole::Outer),
                FollowupSlot::single(FollowupRole::Inner),
            ],
            Transform::Vectorize { .. }
            | Transform::Interleave { .. }
            | Transform::VectorizeInterleave { .. } => {
                vec![FollowupSlot::single(FollowupRole::Vectorized)]
            }
            Transform::Distribute => vec![FollowupSlot::single(FollowupRole::All)],
            Transform::Tile { sizes, .. } => (0..sizes.len())
                .map(|d| FollowupSlot::nested(FollowupRole::Floor, d))
                .chain((0..sizes.len()).map(|d| FollowupSlot::nested(FollowupRole::Tile, d)))
                .collect(),
            Transform::Interchange { permutation } => (0..permutation.len())
                .map(|d| FollowupSlot::nested(FollowupRole::Interchanged, d))
                .collect(),
            Transform::Reverse { .. } => vec![FollowupSlot::single(FollowupRole::Reversed)],
            Transform::Pack { .. } => vec![FollowupSlot::single(FollowupRole::Packed)],
        }
    }

    /// Whether the backend pass also has a catch-all `followup_all` slot
    /// that is separate from the output slots.
    pub fn has_catch_all(&self) -> bool {
        self.loop_outputs() > 0
            && matches!(
                self.transform,
                Transform::Unroll { .. }
                    | Transform::UnrollAndJam { .. }
                    | Transform::Vectorize { .. }
                    | Transform::Interleave { .. }
                    | Transform::VectorizeInterleave { .. }
            )
    }

    /// Names given to output slots by clauses, one entry per slot.
    pub fn output_names(&self) -> Vec<Option<&LoopName>> {
        match &self.transform {
            Transform::Tile { sizes, floor_ids, tile_ids } => (0..sizes.len())
                .map(|d| floor_ids.get(d))
                .chain((0..sizes.len()).map(|d| tile_ids.get(d)))
                .collect(),
            Transform::Reverse { reversed_id } => vec![reversed_id.as_ref()],
            _ => vec![None; self.loop_outputs()],
        }
    }

    /// Every loop name this directive defines.
    pub fn defined_names(&self) -> Vec<&LoopName> {
        self.output_names().into_iter().flatten().collect()
    }

    /// Source text of one clause.
    fn clause_text(&self, clause: ClauseKind) -> Option<String> {
        let name = clause.name();
        let text = match (&self.transform, clause) {
            (Transform::Unroll { full: true, .. }, ClauseKind::Full) => name.to_string(),
            (Transform::Unroll { partial: Some(e), .. }, ClauseKind::Partial)
            | (Transform::UnrollAndJam { partial: Some(e) }, ClauseKind::Partial)
            | (Transform::Vectorize { width: Some(e) }, ClauseKind::Width)
            | (Transform::VectorizeInterleave { width: Some(e), .. }, ClauseKind::Width)
            | (Transform::Interleave { factor: Some(e) }, ClauseKind::Factor)
            | (Transform::VectorizeInterleave { factor: Some(e), .. }, ClauseKind::Factor)
            | (Transform::Pack { array: e, .. }, ClauseKind::Array) => format!("{}({})", name, e),
            (Transform::Tile { sizes, .. }, ClauseKind::Sizes) => {
                format!("{}({})", name, format_list(sizes, ", "))
            }
            (Transform::Tile { floor_ids: ids, .. }, ClauseKind::FloorIds)
            | (Transform::Tile { tile_ids: ids, .. }, ClauseKind::TileIds)
            | (Transform::Interchange { permutation: ids }, ClauseKind::Permutation) => {
                format!("{}({})", name, format_list(ids, ", "))
            }
            (Transform::Reverse { reversed_id: Some(id) }, ClauseKind::ReversedId) => {
                format!("{}({})", name, id)
            }
            (Transform::Pack { allocate: Some(kind), .. }, ClauseKind::Allocate) => {
                format!("{}({})", name, kind)
            }
            _ => return None,
        };
        Some(text)
    }
}

/// Whether `next` may be applied after `first` given the fixed pass order.
/// Kinds without a stage are always compatible.
pub fn pass_order_compatible(first: &Directive, next: &Directive) -> bool {
    match (first.pipeline_stage(), next.pipeline_stage()) {
        (Some(a), Some(b)) => b >= a,
        _ => true,
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#pragma clang transform {}", self.kind().keyword())?;
        for clause in &self.clauses {
            if let Some(text) = self.clause_text(*clause) {
                write!(f, " {}", text)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: u64) -> Expr {
        Expr::int_lit(v, Span::dummy())
    }

    fn name(s: &str) -> LoopName {
        LoopName::new(s, Span::dummy())
    }

    fn directive(transform: Transform, clauses: Vec<ClauseKind>) -> Directive {
        Directive::new(transform, clauses, Span::dummy())
    }

    #[test]
    fn test_pipeline_stages() {
        let full = directive(Transform::Unroll { full: true, partial: None }, vec![ClauseKind::Full]);
        let partial = directive(
            Transform::Unroll { full: false, partial: Some(int(4)) },
            vec![ClauseKind::Partial],
        );
        let bare = directive(Transform::Unroll { full: false, partial: None }, vec![]);
        assert_eq!(full.pipeline_stage(), Some(0));
        assert_eq!(partial.pipeline_stage(), Some(4));
        assert_eq!(bare.pipeline_stage(), Some(0));
        assert_eq!(directive(Transform::Distribute, vec![]).pipeline_stage(), Some(1));
        assert_eq!(directive(Transform::ParallelizeThread, vec![]).pipeline_stage(), None);
    }

    #[test]
    fn test_full_unroll_has_no_outputs() {
        let full = directive(Transform::Unroll { full: true, partial: None }, vec![ClauseKind::Full]);
        assert_eq!(full.loop_inputs(), 1);
        assert_eq!(full.loop_outputs(), 0);
        assert!(full.followup_slots().is_empty());
        assert!(!full.has_catch_all());
    }

    #[test]
    fn test_tile_slots_and_names() {
        let tile = directive(
            Transform::Tile {
                sizes: vec![int(32), int(8)],
                floor_ids: vec![name("fi"), name("fj")],
                tile_ids: vec![],
            },
            vec![ClauseKind::Sizes, ClauseKind::FloorIds],
        );
        assert_eq!(tile.loop_inputs(), 2);
        assert_eq!(tile.loop_outputs(), 4);
        let slots = tile.followup_slots();
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0].key_suffix(), "followup_floor.0");
        assert_eq!(slots[3].key_suffix(), "followup_tile.1");
        let names: Vec<_> = tile.output_names().iter().map(|n| n.map(|n| n.name.clone())).collect();
        assert_eq!(names, vec![Some("fi".into()), Some("fj".into()), None, None]);
        assert_eq!(tile.defined_names().len(), 2);
    }

    #[test]
    fn test_unroll_and_jam_shape() {
        let uaj = directive(Transform::UnrollAndJam { partial: None }, vec![]);
        assert_eq!(uaj.loop_inputs(), 2);
        let slots = uaj.followup_slots();
        assert_eq!(slots[0].role, FollowupRole::Outer);
        assert_eq!(slots[1].role, FollowupRole::Inner);
        assert!(uaj.has_catch_all());
    }

    #[test]
    fn test_distribute_all_is_an_output() {
        let dist = directive(Transform::Distribute, vec![]);
        assert_eq!(dist.followup_slots(), vec![FollowupSlot::single(FollowupRole::All)]);
        assert!(!dist.has_catch_all());
    }

    #[test]
    fn test_pass_order() {
        let dist = directive(Transform::Distribute, vec![]);
        let vec = directive(Transform::Vectorize { width: None }, vec![]);
        let bare = directive(Transform::Unroll { full: false, partial: None }, vec![]);
        let tile = directive(
            Transform::Tile { sizes: vec![int(4)], floor_ids: vec![], tile_ids: vec![] },
            vec![ClauseKind::Sizes],
        );
        // vectorize applied first, distribute next
        assert!(!pass_order_compatible(&vec, &dist));
        assert!(pass_order_compatible(&dist, &vec));
        assert!(pass_order_compatible(&bare, &dist));
        assert!(pass_order_compatible(&vec, &tile));
    }

    #[test]
    fn test_display_keeps_clause_order() {
        let d = directive(
            Transform::Tile {
                sizes: vec![int(4), int(8)],
                floor_ids: vec![name("a"), name("b")],
                tile_ids: vec![name("c"), name("d")],
            },
            vec![ClauseKind::TileIds, ClauseKind::Sizes, ClauseKind::FloorIds],
        );
        assert_eq!(
            d.to_string(),
            "#pragma clang transform tile tile_ids(c, d) sizes(4, 8) floor_ids(a, b)"
        );
        let p = directive(
            Transform::Pack { array: Expr::var("A", Span::dummy()), allocate: Some(AllocationKind::Malloc) },
            vec![ClauseKind::Array, ClauseKind::Allocate],
        );
        assert_eq!(p.to_string(), "#pragma clang transform pack array(A) allocate(malloc)");
    }

    #[test]
    fn test_assemble_requires_mandatory_arguments() {
        assert!(Transform::assemble(TransformKind::Pack, ClauseValues::default()).is_none());
        assert!(Transform::assemble(TransformKind::Tile, ClauseValues::default()).is_none());
        assert!(Transform::assemble(TransformKind::Unknown, ClauseValues::default()).is_none());
        let t = Transform::assemble(TransformKind::Distribute, ClauseValues::default()).unwrap();
        assert_eq!(t.kind(), TransformKind::Distribute);
    }
}
