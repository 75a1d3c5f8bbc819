//! Metadata generation from resolved directives.

pub mod metadata;
pub mod emitter;
pub mod llvm;

pub use emitter::{emit_function, emit_module};
pub use metadata::{
    AnnotatedLoop, FollowupBundle, FunctionMetadata, LoopAnnotation, MetadataAttr, MetadataValue,
    ModuleMetadata, TransformBundle,
};

use crate::utils::pretty::PrettyPrint;
use anyhow::Result;

/// Output format for metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Indented annotation trees
    Tree,
    /// Numbered LLVM-style metadata nodes
    Llvm,
    /// JSON
    Json,
}

/// Render metadata in the given format.
pub fn render(metadata: &ModuleMetadata, format: Format) -> Result<String> {
    match format {
        Format::Tree => Ok(metadata.pretty()),
        Format::Llvm => Ok(llvm::render(metadata)),
        Format::Json => {
            let mut json = serde_json::to_string_pretty(metadata)?;
            json.push('\n');
            Ok(json)
        }
    }
}
