//! Directive registry: transformation keywords, kind tags and display names.
//!
//! The list of kinds is written exactly once, in the `transform_kinds!`
//! invocation below. The enum, the keyword and display-name tables and the
//! ordered kind table are all generated from it, so they cannot drift apart.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

macro_rules! transform_kinds {
    ($( $variant:ident => $keyword:literal, $display:literal; )+) => {
        /// Kind tag of a loop transformation directive.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum TransformKind {
            /// Sentinel for keywords that are not in the registry
            Unknown,
            $( $variant, )+
        }

        impl TransformKind {
            /// Every real kind, in registry order.
            const TABLE: &'static [TransformKind] = &[ $( TransformKind::$variant, )+ ];

            /// The keyword that follows `#pragma clang transform`.
            pub fn keyword(self) -> &'static str {
                match self {
                    TransformKind::Unknown => "<unknown>",
                    $( TransformKind::$variant => $keyword, )+
                }
            }

            /// Human-readable name used in diagnostics.
            pub fn display_name(self) -> &'static str {
                match self {
                    TransformKind::Unknown => "unknown transformation",
                    $( TransformKind::$variant => $display, )+
                }
            }
        }
    };
}

transform_kinds! {
    Unroll => "unroll", "unroll";
    UnrollAndJam => "unrollandjam", "unroll-and-jam";
    Distribute => "distribute", "distribute";
    Vectorize => "vectorize", "vectorize";
    Interleave => "interleave", "interleave";
    VectorizeInterleave => "vectorize_interleave", "vectorize-interleave";
    Tile => "tile", "tile";
    Interchange => "interchange", "interchange";
    Reverse => "reverse", "reverse";
    Pack => "pack", "pack";
    ParallelizeThread => "parallelize_thread", "parallelize-thread";
}

static KEYWORDS: Lazy<HashMap<&'static str, TransformKind>> =
    Lazy::new(|| TransformKind::all().map(|kind| (kind.keyword(), kind)).collect());

impl TransformKind {
    /// The last real kind.
    pub const LAST: TransformKind = Self::TABLE[Self::TABLE.len() - 1];

    /// Iterate over real kinds in registry order.
    pub fn all() -> impl Iterator<Item = TransformKind> {
        Self::TABLE.iter().copied()
    }

    /// Position in the registry; `Unknown` is zero.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`TransformKind::index`].
    pub fn from_index(index: usize) -> Option<TransformKind> {
        match index {
            0 => Some(TransformKind::Unknown),
            i => Self::TABLE.get(i - 1).copied(),
        }
    }

    pub fn is_unknown(self) -> bool {
        self == TransformKind::Unknown
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// Look up a transformation keyword. Unknown keywords map to `Unknown`.
pub fn kind_of(keyword: &str) -> TransformKind {
    KEYWORDS.get(keyword).copied().unwrap_or(TransformKind::Unknown)
}

/// The keyword for a kind.
pub fn keyword_of(kind: TransformKind) -> &'static str {
    kind.keyword()
}

/// The display name for a kind.
pub fn display_name_of(kind: TransformKind) -> &'static str {
    kind.display_name()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip() {
        for kind in TransformKind::all() {
            assert_eq!(kind_of(keyword_of(kind)), kind);
        }
        assert_eq!(TransformKind::all().count(), 11);
    }

    #[test]
    fn test_unknown_keyword() {
        assert_eq!(kind_of("unrol"), TransformKind::Unknown);
        assert_eq!(kind_of(""), TransformKind::Unknown);
        assert!(kind_of("fuse").is_unknown());
    }

    #[test]
    fn test_index_bounds() {
        assert_eq!(TransformKind::Unknown.index(), 0);
        assert_eq!(TransformKind::LAST, TransformKind::ParallelizeThread);
        for kind in TransformKind::all() {
            let index = kind.index();
            assert!(index > TransformKind::Unknown.index());
            assert!(index <= TransformKind::LAST.index());
            assert_eq!(TransformKind::from_index(index), Some(kind));
        }
        assert_eq!(TransformKind::from_index(TransformKind::LAST.index() + 1), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(display_name_of(TransformKind::UnrollAndJam), "unroll-and-jam");
        assert_eq!(TransformKind::VectorizeInterleave.to_string(), "vectorize_interleave");
    }
}
