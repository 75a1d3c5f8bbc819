//! Clause registry and per-transformation clause schemas.

use crate::transform::registry::TransformKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A clause that may follow a transformation keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClauseKind {
    Full,
    Partial,
    Factor,
    Width,
    Sizes,
    FloorIds,
    TileIds,
    Permutation,
    ReversedId,
    Array,
    Allocate,
}

/// What a clause takes between its parentheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// Bare clause, no parentheses
    None,
    /// One integer expression
    Int,
    /// Comma-separated integer expressions
    IntList,
    /// One loop name
    Ident,
    /// Comma-separated loop names
    IdentList,
    /// One arbitrary expression
    Expr,
    /// `alloca` or `malloc`
    AllocKind,
}

impl ArgShape {
    pub fn takes_arguments(self) -> bool {
        self != ArgShape::None
    }
}

const ALL_CLAUSES: [ClauseKind; 11] = [
    ClauseKind::Full,
    ClauseKind::Partial,
    ClauseKind::Factor,
    ClauseKind::Width,
    ClauseKind::Sizes,
    ClauseKind::FloorIds,
    ClauseKind::TileIds,
    ClauseKind::Permutation,
    ClauseKind::ReversedId,
    ClauseKind::Array,
    ClauseKind::Allocate,
];

impl ClauseKind {
    /// Spelling in source.
    pub fn name(self) -> &'static str {
        match self {
            ClauseKind::Full => "full",
            ClauseKind::Partial => "partial",
            ClauseKind::Factor => "factor",
            ClauseKind::Width => "width",
            ClauseKind::Sizes => "sizes",
            ClauseKind::FloorIds => "floor_ids",
            ClauseKind::TileIds => "tile_ids",
            ClauseKind::Permutation => "permutation",
            ClauseKind::ReversedId => "reversed_id",
            ClauseKind::Array => "array",
            ClauseKind::Allocate => "allocate",
        }
    }

    pub fn from_name(name: &str) -> Option<ClauseKind> {
        ALL_CLAUSES.iter().copied().find(|clause| clause.name() == name)
    }

    pub fn arg_shape(self) -> ArgShape {
        match self {
            ClauseKind::Full => ArgShape::None,
            ClauseKind::Partial | ClauseKind::Factor | ClauseKind::Width => ArgShape::Int,
            ClauseKind::Sizes => ArgShape::IntList,
            ClauseKind::FloorIds | ClauseKind::TileIds | ClauseKind::Permutation => ArgShape::IdentList,
            ClauseKind::ReversedId => ArgShape::Ident,
            ClauseKind::Array => ArgShape::Expr,
            ClauseKind::Allocate => ArgShape::AllocKind,
        }
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which clauses a transformation accepts.
#[derive(Debug, Clone, Copy)]
pub struct ClauseSchema {
    /// Clauses that may appear
    pub allowed: &'static [ClauseKind],
    /// Pairs that may not appear together
    pub exclusive: &'static [(ClauseKind, ClauseKind)],
    /// Clauses that must appear
    pub required: &'static [ClauseKind],
}

impl ClauseSchema {
    const EMPTY: ClauseSchema = ClauseSchema { allowed: &[], exclusive: &[], required: &[] };

    pub fn allows(&self, clause: ClauseKind) -> bool {
        self.allowed.contains(&clause)
    }

    /// The clause that `clause` is mutually exclusive with, if any.
    pub fn exclusive_with(&self, clause: ClauseKind) -> Option<ClauseKind> {
        self.exclusive.iter().find_map(|&(a, b)| {
            if a == clause {
                Some(b)
            } else if b == clause {
                Some(a)
            } else {
                None
            }
        })
    }
}

/// The clause schema of a transformation kind.
pub fn schema_of(kind: TransformKind) -> ClauseSchema {
    use ClauseKind::*;
    match kind {
        TransformKind::Unroll => ClauseSchema {
            allowed: &[Full, Partial],
            exclusive: &[(Full, Partial)],
            required: &[],
        },
        TransformKind::UnrollAndJam => ClauseSchema { allowed: &[Partial], ..ClauseSchema::EMPTY },
        TransformKind::Vectorize => ClauseSchema { allowed: &[Width], ..ClauseSchema::EMPTY },
        TransformKind::Interleave => ClauseSchema { allowed: &[Factor], ..ClauseSchema::EMPTY },
        TransformKind::VectorizeInterleave => {
            ClauseSchema { allowed: &[Width, Factor], ..ClauseSchema::EMPTY }
        }
        TransformKind::Tile => ClauseSchema {
            allowed: &[Sizes, FloorIds, TileIds],
            exclusive: &[],
            required: &[Sizes],
        },
        TransformKind::Interchange => ClauseSchema {
            allowed: &[Permutation],
            exclusive: &[],
            required: &[Permutation],
        },
        TransformKind::Reverse => ClauseSchema { allowed: &[ReversedId], ..ClauseSchema::EMPTY },
        TransformKind::Pack => ClauseSchema {
            allowed: &[Array, Allocate],
            exclusive: &[],
            required: &[Array],
        },
        TransformKind::Distribute | TransformKind::ParallelizeThread | TransformKind::Unknown => {
            ClauseSchema::EMPTY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_names_round_trip() {
        for clause in ALL_CLAUSES {
            assert_eq!(ClauseKind::from_name(clause.name()), Some(clause));
        }
        assert_eq!(ClauseKind::from_name("unknown"), None);
    }

    #[test]
    fn test_unroll_schema() {
        let schema = schema_of(TransformKind::Unroll);
        assert!(schema.allows(ClauseKind::Full));
        assert!(!schema.allows(ClauseKind::Width));
        assert_eq!(schema.exclusive_with(ClauseKind::Partial), Some(ClauseKind::Full));
        assert!(schema.required.is_empty());
    }

    #[test]
    fn test_required_clauses() {
        assert_eq!(schema_of(TransformKind::Tile).required, &[ClauseKind::Sizes]);
        assert_eq!(schema_of(TransformKind::Interchange).required, &[ClauseKind::Permutation]);
        assert_eq!(schema_of(TransformKind::Pack).required, &[ClauseKind::Array]);
        assert!(schema_of(TransformKind::Distribute).allowed.is_empty());
    }

    #[test]
    fn test_arg_shapes() {
        assert!(!ClauseKind::Full.arg_shape().takes_arguments());
        assert_eq!(ClauseKind::Sizes.arg_shape(), ArgShape::IntList);
        assert_eq!(ClauseKind::ReversedId.arg_shape(), ArgShape::Ident);
    }
}
