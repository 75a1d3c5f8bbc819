//! LLVM-style textual rendering of loop metadata.
//!
//! Every loop annotation becomes a self-referential `distinct` node whose
//! operands are attribute nodes. Identical attribute nodes are shared.

use crate::codegen::metadata::*;
use crate::utils::pretty::CodeFormatter;
use std::collections::HashMap;

/// Render a module's metadata as numbered nodes.
pub fn render(metadata: &ModuleMetadata) -> String {
    let mut renderer = Renderer::default();
    let mut roots = Vec::new();
    for function in &metadata.functions {
        for lp in &function.loops {
            let node = renderer.loop_node(&lp.annotation);
            roots.push(format!("; {} {} (line {}): !{}", function.name, lp.id, lp.line, node));
        }
    }

    let mut f = CodeFormatter::default_indent();
    for root in &roots {
        f.writeln(root);
    }
    if !roots.is_empty() {
        f.newline();
    }
    for (id, node) in renderer.nodes.iter().enumerate() {
        f.writeln(&format!("!{} = {}", id, node));
    }
    f.finish()
}

#[derive(Default)]
struct Renderer {
    nodes: Vec<String>,
    /// Attribute node text to its number
    shared: HashMap<String, usize>,
}

impl Renderer {
    fn reserve(&mut self) -> usize {
        self.nodes.push(String::new());
        self.nodes.len() - 1
    }

    fn shared_node(&mut self, text: String) -> usize {
        if let Some(&id) = self.shared.get(&text) {
            return id;
        }
        let id = self.reserve();
        self.nodes[id] = text.clone();
        self.shared.insert(text, id);
        id
    }

    fn attr_node(&mut self, key: &str, value: Option<&MetadataValue>) -> usize {
        let text = match value {
            Some(value) => format!("!{{!\"{}\", {}}}", key, value_text(value)),
            None => format!("!{{!\"{}\"}}", key),
        };
        self.shared_node(text)
    }

    fn loop_node(&mut self, annotation: &LoopAnnotation) -> usize {
        let id = self.reserve();
        let mut operands = vec![id];
        if let Some(name) = &annotation.name {
            operands.push(self.attr_node(LOOP_ID, Some(&MetadataValue::Str(name.clone()))));
        }
        if annotation.disable_nonforced {
            operands.push(self.attr_node(DISABLE_NONFORCED, None));
        }
        for attr in &annotation.hints {
            operands.push(self.attr_node(&attr.key, Some(&attr.value)));
        }
        if let Some(bundle) = &annotation.transform {
            for attr in &bundle.attrs {
                operands.push(self.attr_node(&attr.key, Some(&attr.value)));
            }
            for followup in &bundle.followups {
                let target = self.loop_node(&followup.annotation);
                let text = format!("!{{!\"{}\", !{}}}", followup.key, target);
                let node = self.reserve();
                self.nodes[node] = text;
                operands.push(node);
            }
        }
        let list: Vec<String> = operands.iter().map(|o| format!("!{}", o)).collect();
        self.nodes[id] = format!("distinct !{{{}}}", list.join(", "));
        id
    }
}

fn value_text(value: &MetadataValue) -> String {
    match value {
        MetadataValue::Bool(b) => format!("i1 {}", b),
        MetadataValue::Int(v) => format!("i32 {}", v),
        MetadataValue::Str(s) => format!("!\"{}\"", s),
        MetadataValue::IntList(values) => {
            values.iter().map(|v| format!("i32 {}", v)).collect::<Vec<_>>().join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::LoopId;
    use crate::transform::registry::TransformKind;

    fn module(annotation: LoopAnnotation) -> ModuleMetadata {
        ModuleMetadata {
            functions: vec![FunctionMetadata {
                name: "f".into(),
                loops: vec![AnnotatedLoop { id: LoopId(0), line: 3, annotation }],
            }],
        }
    }

    #[test]
    fn test_render_unroll() {
        let annotation = LoopAnnotation {
            transform: Some(TransformBundle {
                kind: TransformKind::Unroll,
                attrs: vec![
                    MetadataAttr::flag("llvm.loop.unroll.enable"),
                    MetadataAttr::new("llvm.loop.unroll.count", MetadataValue::Int(4)),
                ],
                followups: vec![FollowupBundle {
                    key: "llvm.loop.unroll.followup_all".into(),
                    annotation: LoopAnnotation::forced_only(),
                }],
            }),
            ..LoopAnnotation::forced_only()
        };
        let text = render(&module(annotation));
        let expected = "\
; f loop0 (line 3): !0

!0 = distinct !{!0, !1, !2, !3, !5}
!1 = !{!\"llvm.loop.disable_nonforced\"}
!2 = !{!\"llvm.loop.unroll.enable\", i1 true}
!3 = !{!\"llvm.loop.unroll.count\", i32 4}
!4 = distinct !{!4, !1}
!5 = !{!\"llvm.loop.unroll.followup_all\", !4}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_render_name_and_list() {
        let annotation = LoopAnnotation {
            name: Some("i".into()),
            hints: vec![MetadataAttr::new("llvm.loop.tile.size", MetadataValue::IntList(vec![32, 8]))],
            ..LoopAnnotation::default()
        };
        let text = render(&module(annotation));
        assert!(text.contains("!1 = !{!\"llvm.loop.id\", !\"i\"}\n"));
        assert!(text.contains("!2 = !{!\"llvm.loop.tile.size\", i32 32, i32 8}\n"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&ModuleMetadata::default()), "");
    }
}
