//! Loop transformation directives.
//!
//! The registry and clause tables describe what can be written after
//! `#pragma clang transform`; [`Directive`] is one parsed line of it, and
//! [`LegacyPragma`] covers the older hint pragmas.

pub mod registry;
pub mod clause;
pub mod directive;
pub mod legacy;

pub use registry::{display_name_of, keyword_of, kind_of, TransformKind};
pub use clause::{schema_of, ArgShape, ClauseKind, ClauseSchema};
pub use directive::{
    pass_order_compatible, AllocationKind, ClauseValues, Directive, FollowupRole, FollowupSlot,
    LoopName, Transform,
};
pub use legacy::{HintState, LegacyKind, LegacyPragma, LoopHint, LoopHintOption};
