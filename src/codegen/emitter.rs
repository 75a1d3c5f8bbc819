//! Metadata emission from resolved loop graphs.

use crate::analysis::binder::{FunctionBinding, LoopBinding};
use crate::analysis::nest::{Application, Consumer, LoopGraph, LoopState, NodeId};
use crate::analysis::validate::TransformParams;
use crate::codegen::metadata::*;
use crate::transform::directive::FollowupRole;
use crate::DirectiveConfig;

/// Build the annotation trees of every function.
pub fn emit_module(functions: &mut [FunctionBinding], config: &DirectiveConfig) -> ModuleMetadata {
    let functions = functions.iter_mut().map(|f| emit_function(f, config)).collect();
    ModuleMetadata { functions }
}

/// Build the annotation trees of one function. Loops that end up with an
/// annotation move to [`LoopState::Emitted`].
pub fn emit_function(function: &mut FunctionBinding, config: &DirectiveConfig) -> FunctionMetadata {
    let emitter = Emitter { graph: &function.graph, config };
    let mut loops = Vec::new();
    for binding in &mut function.loops {
        let Some(annotation) = emitter.source_loop(binding) else {
            continue;
        };
        if binding.state == LoopState::Validated {
            binding.state = LoopState::Emitted;
        }
        loops.push(AnnotatedLoop { id: binding.id, line: binding.span.start_line, annotation });
    }
    log::debug!("emitted {} annotated loop(s) for `{}`", loops.len(), function.name);
    FunctionMetadata { name: function.name.clone(), loops }
}

struct Emitter<'a> {
    graph: &'a LoopGraph,
    config: &'a DirectiveConfig,
}

impl<'a> Emitter<'a> {
    fn name_of(&self, node: NodeId) -> Option<String> {
        let symbol = self.graph.node(node).name?;
        self.graph.names.resolve(symbol).map(str::to_string)
    }

    fn source_loop(&self, binding: &LoopBinding) -> Option<LoopAnnotation> {
        let mut annotation = self.annotate(binding.node);
        if self.config.legacy_metadata {
            annotation.hints = binding.hints.iter().flat_map(hint_attrs).collect();
        }
        (!annotation.is_empty()).then_some(annotation)
    }

    /// Annotation of any node: its name and whatever consumed it.
    fn annotate(&self, node: NodeId) -> LoopAnnotation {
        let name = self.name_of(node);
        match self.graph.node(node).consumed_by {
            Some(Consumer::Root(app)) => LoopAnnotation {
                name,
                disable_nonforced: self.config.disable_nonforced,
                transform: Some(self.bundle(self.graph.application(app))),
                hints: Vec::new(),
            },
            Some(Consumer::Member(_)) => LoopAnnotation {
                name,
                disable_nonforced: self.config.disable_nonforced,
                ..LoopAnnotation::default()
            },
            None => LoopAnnotation { name, ..LoopAnnotation::default() },
        }
    }

    fn bundle(&self, app: &Application) -> TransformBundle {
        let directive = &app.directive.directive;
        let prefix = key_prefix(directive.kind());
        let mut followups = Vec::new();

        for (slot, output) in directive.followup_slots().iter().zip(&app.outputs) {
            let node = self.graph.node(*output);
            if node.consumed_by.is_none() && node.name.is_none() {
                continue;
            }
            let mut annotation = self.annotate(*output);
            annotation.disable_nonforced = self.config.disable_nonforced;
            followups.push(FollowupBundle { key: format!("{}.{}", prefix, slot.key_suffix()), annotation });
        }

        if directive.has_catch_all() {
            let all = FollowupRole::All.name();
            followups.push(FollowupBundle {
                key: format!("{}.followup_{}", prefix, all),
                annotation: LoopAnnotation {
                    disable_nonforced: self.config.disable_nonforced,
                    ..LoopAnnotation::default()
                },
            });
        }

        TransformBundle { kind: directive.kind(), attrs: transform_attrs(app), followups }
    }
}

/// The attributes requesting one transformation.
fn transform_attrs(app: &Application) -> Vec<MetadataAttr> {
    use MetadataValue::{Int, IntList, Str};
    let prefix = key_prefix(app.directive.directive.kind());
    let key = |suffix: &str| format!("{}.{}", prefix, suffix);
    let mut attrs = vec![MetadataAttr::flag(key("enable"))];

    match &app.directive.params {
        TransformParams::Unroll { full, factor } => {
            if *full {
                attrs.push(MetadataAttr::flag(key("full")));
            }
            if let Some(factor) = factor {
                attrs.push(MetadataAttr::new(key("count"), Int(*factor)));
            }
        }
        TransformParams::UnrollAndJam { factor } => {
            if let Some(factor) = factor {
                attrs.push(MetadataAttr::new(key("count"), Int(*factor)));
            }
        }
        TransformParams::Vectorize { width } => {
            if let Some(width) = width {
                attrs.push(MetadataAttr::new(key("width"), Int(*width)));
            }
            attrs.push(MetadataAttr::new("llvm.loop.interleave.count", Int(1)));
        }
        TransformParams::Interleave { factor } => {
            attrs.push(MetadataAttr::new(key("width"), Int(1)));
            if let Some(factor) = factor {
                attrs.push(MetadataAttr::new("llvm.loop.interleave.count", Int(*factor)));
            }
        }
        TransformParams::VectorizeInterleave { width, factor } => {
            if let Some(width) = width {
                attrs.push(MetadataAttr::new(key("width"), Int(*width)));
            }
            if let Some(factor) = factor {
                attrs.push(MetadataAttr::new("llvm.loop.interleave.count", Int(*factor)));
            }
        }
        TransformParams::Tile { sizes } => {
            attrs.push(MetadataAttr::new(key("depth"), Int(sizes.len() as u32)));
            attrs.push(MetadataAttr::new(key("size"), IntList(sizes.clone())));
        }
        TransformParams::Interchange => {
            let permutation = app.permutation.iter().map(|&i| i as u32).collect();
            attrs.push(MetadataAttr::new(key("depth"), Int(app.members.len() as u32)));
            attrs.push(MetadataAttr::new(key("permutation"), IntList(permutation)));
        }
        TransformParams::Pack { array, allocate } => {
            attrs.push(MetadataAttr::new(key("array"), Str(array.clone())));
            if let Some(allocate) = allocate {
                attrs.push(MetadataAttr::new(key("allocate"), Str(allocate.name().to_string())));
            }
        }
        TransformParams::Distribute | TransformParams::Reverse | TransformParams::ParallelizeThread => {}
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::frontend::parse;
    use crate::utils::errors::Diagnostics;

    fn emit_with(src: &str, config: &DirectiveConfig) -> (Vec<FunctionBinding>, ModuleMetadata) {
        let parsed = parse(src).unwrap();
        let mut diags = Diagnostics::new();
        let mut functions = analyze(&parsed.unit, config, &mut diags);
        assert!(!diags.has_errors(), "{:?}", diags);
        let metadata = emit_module(&mut functions, config);
        (functions, metadata)
    }

    fn emit(src: &str) -> ModuleMetadata {
        emit_with(src, &DirectiveConfig::default()).1
    }

    #[test]
    fn test_partial_unroll() {
        let src = "void f(int n) {\n#pragma clang transform unroll partial(4)\nfor (int i = 0; i < n; i++) ;\n}\n";
        let metadata = emit(src);
        let ann = &metadata.function("f").unwrap().loops[0].annotation;
        assert!(ann.disable_nonforced);
        let bundle = ann.transform.as_ref().unwrap();
        assert_eq!(
            bundle.attrs,
            vec![
                MetadataAttr::flag("llvm.loop.unroll.enable"),
                MetadataAttr::new("llvm.loop.unroll.count", MetadataValue::Int(4)),
            ]
        );
        // the unrolled loop is unconsumed and unnamed, so only the catch-all remains
        let keys: Vec<_> = bundle.followups.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["llvm.loop.unroll.followup_all"]);
        assert!(bundle.followups[0].annotation.disable_nonforced);
    }

    #[test]
    fn test_chain_nests_followups() {
        let src = r#"
void f(int n) {
#pragma clang transform unroll partial(2)
#pragma clang transform reverse reversed_id(r)
    for (int i = 0; i < n; i++) ;
}
"#;
        let metadata = emit(src);
        let ann = &metadata.functions[0].loops[0].annotation;
        assert_eq!(ann.transform.as_ref().unwrap().kind.keyword(), "reverse");
        let reversed = ann.followup(&["llvm.loop.reverse.followup_reversed"]).unwrap();
        assert_eq!(reversed.name.as_deref(), Some("r"));
        assert!(reversed.disable_nonforced);
        assert_eq!(reversed.attr("llvm.loop.unroll.count"), Some(&MetadataValue::Int(2)));
    }

    #[test]
    fn test_tile_followups_and_members() {
        let src = r#"
void f(int n) {
#pragma clang transform tile sizes(32, 8) floor_ids(fi, fj)
    for (int i = 0; i < n; i++)
#pragma clang loop id(j)
        for (int j = 0; j < n; j++) ;
}
"#;
        let (functions, metadata) = emit_with(src, &DirectiveConfig::default());
        let f = &metadata.functions[0];
        assert_eq!(f.loops.len(), 2);
        let outer = &f.loops[0].annotation;
        let bundle = outer.transform.as_ref().unwrap();
        assert_eq!(outer.attr("llvm.loop.tile.size"), Some(&MetadataValue::IntList(vec![32, 8])));
        assert_eq!(outer.attr("llvm.loop.tile.depth"), Some(&MetadataValue::Int(2)));
        let keys: Vec<_> = bundle.followups.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["llvm.loop.tile.followup_floor.0", "llvm.loop.tile.followup_floor.1"]);

        // the inner member keeps its name and is marked as transformed
        let inner = &f.loops[1].annotation;
        assert_eq!(inner.name.as_deref(), Some("j"));
        assert!(inner.disable_nonforced);
        assert!(inner.transform.is_none());
        assert_eq!(functions[0].loops[0].state, LoopState::Emitted);
    }

    #[test]
    fn test_name_only_and_hints() {
        let src = r#"
void f(int n) {
#pragma clang loop id(a)
    for (int i = 0; i < n; i++) ;
#pragma clang loop vectorize(enable) vectorize_width(4)
    for (int j = 0; j < n; j++) ;
    for (int k = 0; k < n; k++) ;
}
"#;
        let metadata = emit(src);
        let f = &metadata.functions[0];
        assert_eq!(f.loops.len(), 2);
        assert_eq!(
            f.loops[0].annotation,
            LoopAnnotation { name: Some("a".into()), ..LoopAnnotation::default() }
        );
        let hinted = &f.loops[1].annotation;
        assert!(!hinted.disable_nonforced);
        assert_eq!(hinted.hints.len(), 2);
        assert_eq!(hinted.attr("llvm.loop.vectorize.width"), Some(&MetadataValue::Int(4)));

        let quiet = DirectiveConfig::default().with_legacy_metadata(false);
        assert_eq!(emit_with(src, &quiet).1.functions[0].loops.len(), 1);
    }

    #[test]
    fn test_interchange_attrs() {
        let src = r#"
void f(int n) {
#pragma clang loop id(i)
#pragma clang transform interchange permutation(j, i)
    for (int i = 0; i < n; i++)
#pragma clang loop id(j)
        for (int j = 0; j < n; j++) ;
}
"#;
        let metadata = emit(src);
        let outer = &metadata.functions[0].loops[0].annotation;
        assert_eq!(outer.name.as_deref(), Some("i"));
        assert_eq!(outer.attr("llvm.loop.interchange.depth"), Some(&MetadataValue::Int(2)));
        assert_eq!(
            outer.attr("llvm.loop.interchange.permutation"),
            Some(&MetadataValue::IntList(vec![1, 0]))
        );
        let first = outer.followup(&["llvm.loop.interchange.followup_interchanged.0"]).unwrap();
        assert_eq!(first.name.as_deref(), Some("j"));
    }

    #[test]
    fn test_distribute_has_no_separate_catch_all() {
        let src = "void f(int n) {\n#pragma clang transform distribute\nfor (int i = 0; i < n; i++) ;\n}\n";
        let metadata = emit(src);
        let bundle = metadata.functions[0].loops[0].annotation.transform.clone().unwrap();
        assert!(bundle.followups.is_empty());
        assert_eq!(bundle.attrs, vec![MetadataAttr::flag("llvm.loop.distribute.enable")]);
    }
}
