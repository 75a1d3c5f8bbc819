//! Semantic analysis of loop-transformation pragmas.
//!
//! Binding attaches pragma runs to loops and validates clause arguments;
//! resolution applies each loop's chain to the per-function loop graph.

pub mod consteval;
pub mod validate;
pub mod nest;
pub mod binder;
pub mod resolve;

pub use binder::{bind_unit, FunctionBinding, LoopBinding};
pub use consteval::{eval_int, EvalError, Scopes};
pub use nest::{AppId, Application, Consumer, LoopGraph, LoopNode, LoopState, NodeId, NodeOrigin};
pub use resolve::resolve_function;
pub use validate::{evaluate_hints, validate_directive, BoundDirective, TransformParams};

use crate::frontend::ast::TranslationUnit;
use crate::utils::errors::Diagnostics;
use crate::DirectiveConfig;

/// Bind and resolve every function of a translation unit.
pub fn analyze(unit: &TranslationUnit, config: &DirectiveConfig, diags: &mut Diagnostics) -> Vec<FunctionBinding> {
    let mut functions = bind_unit(unit, diags);
    for function in &mut functions {
        resolve_function(function, config, diags);
    }
    functions
}
