//! Loop metadata produced for the backend.
//!
//! Each annotated source loop gets a [`LoopAnnotation`]. A transformed loop
//! carries a [`TransformBundle`], whose followups describe the generated
//! loops, recursively. The result is one rooted tree per source loop.

use crate::frontend::ast::LoopId;
use crate::transform::legacy::LoopHint;
use crate::transform::registry::TransformKind;
use crate::utils::pretty::{field_doc, format_list, nested_doc, PrettyPrint};
use pretty::BoxDoc;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LOOP_ID: &str = "llvm.loop.id";
pub const DISABLE_NONFORCED: &str = "llvm.loop.disable_nonforced";

/// Key prefix of a transformation's attributes and followups.
pub fn key_prefix(kind: TransformKind) -> &'static str {
    match kind {
        TransformKind::Unroll => "llvm.loop.unroll",
        TransformKind::UnrollAndJam => "llvm.loop.unroll_and_jam",
        TransformKind::Vectorize | TransformKind::Interleave | TransformKind::VectorizeInterleave => {
            "llvm.loop.vectorize"
        }
        TransformKind::Distribute => "llvm.loop.distribute",
        TransformKind::Tile => "llvm.loop.tile",
        TransformKind::Interchange => "llvm.loop.interchange",
        TransformKind::Reverse => "llvm.loop.reverse",
        TransformKind::Pack => "llvm.data.pack",
        TransformKind::ParallelizeThread => "llvm.loop.parallelize_thread",
        TransformKind::Unknown => "llvm.loop",
    }
}

/// Value of a metadata attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(u32),
    Str(String),
    IntList(Vec<u32>),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Str(s) => write!(f, "\"{}\"", s),
            MetadataValue::IntList(values) => write!(f, "[{}]", format_list(values, ", ")),
        }
    }
}

/// One `(key, value)` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttr {
    pub key: String,
    pub value: MetadataValue,
}

impl MetadataAttr {
    pub fn new(key: impl Into<String>, value: MetadataValue) -> Self {
        Self { key: key.into(), value }
    }

    pub fn flag(key: impl Into<String>) -> Self {
        Self::new(key, MetadataValue::Bool(true))
    }
}

impl fmt::Display for MetadataAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.key, self.value)
    }
}

/// Attributes of one flat legacy hint.
pub fn hint_attrs(hint: &LoopHint) -> Vec<MetadataAttr> {
    use MetadataValue::{Bool, Int};
    match *hint {
        LoopHint::UnrollEnable => vec![MetadataAttr::flag("llvm.loop.unroll.enable")],
        LoopHint::UnrollDisable => vec![MetadataAttr::flag("llvm.loop.unroll.disable")],
        LoopHint::UnrollFull => vec![MetadataAttr::flag("llvm.loop.unroll.full")],
        LoopHint::UnrollCount(n) => vec![MetadataAttr::new("llvm.loop.unroll.count", Int(n))],
        LoopHint::UnrollAndJamEnable => vec![MetadataAttr::flag("llvm.loop.unroll_and_jam.enable")],
        LoopHint::UnrollAndJamDisable => vec![MetadataAttr::flag("llvm.loop.unroll_and_jam.disable")],
        LoopHint::UnrollAndJamCount(n) => {
            vec![MetadataAttr::new("llvm.loop.unroll_and_jam.count", Int(n))]
        }
        LoopHint::VectorizeEnable(on) => vec![MetadataAttr::new("llvm.loop.vectorize.enable", Bool(on))],
        LoopHint::VectorizeWidth(n) => vec![MetadataAttr::new("llvm.loop.vectorize.width", Int(n))],
        LoopHint::InterleaveEnable(true) => vec![MetadataAttr::flag("llvm.loop.vectorize.enable")],
        LoopHint::InterleaveEnable(false) => {
            vec![MetadataAttr::new("llvm.loop.interleave.count", Int(1))]
        }
        LoopHint::InterleaveCount(n) => vec![MetadataAttr::new("llvm.loop.interleave.count", Int(n))],
        LoopHint::DistributeEnable(on) => {
            vec![MetadataAttr::new("llvm.loop.distribute.enable", Bool(on))]
        }
    }
}

/// Annotation of one loop, source or generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopAnnotation {
    /// `llvm.loop.id`
    pub name: Option<String>,
    /// `llvm.loop.disable_nonforced`
    pub disable_nonforced: bool,
    pub transform: Option<TransformBundle>,
    /// Flat attributes from legacy hints
    pub hints: Vec<MetadataAttr>,
}

impl LoopAnnotation {
    /// The annotation of a loop that must not be touched by heuristics.
    pub fn forced_only() -> Self {
        Self { disable_nonforced: true, ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && !self.disable_nonforced && self.transform.is_none() && self.hints.is_empty()
    }

    /// Look up a followup by its full key, descending through bundles.
    /// `path` is a list of keys from this loop downwards.
    pub fn followup(&self, path: &[&str]) -> Option<&LoopAnnotation> {
        let (first, rest) = match path.split_first() {
            Some(split) => split,
            None => return Some(self),
        };
        let bundle = self.transform.as_ref()?;
        let next = bundle.followups.iter().find(|f| f.key == *first)?;
        next.annotation.followup(rest)
    }

    /// The attribute value for `key` in this loop's own bundle or hints.
    pub fn attr(&self, key: &str) -> Option<&MetadataValue> {
        self.transform
            .iter()
            .flat_map(|t| t.attrs.iter())
            .chain(self.hints.iter())
            .find(|a| a.key == key)
            .map(|a| &a.value)
    }
}

/// A transformation request with its generated loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformBundle {
    pub kind: TransformKind,
    pub attrs: Vec<MetadataAttr>,
    pub followups: Vec<FollowupBundle>,
}

/// The annotation of one generated loop, keyed like `llvm.loop.tile.followup_floor.0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupBundle {
    pub key: String,
    pub annotation: LoopAnnotation,
}

/// Metadata of one annotated source loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedLoop {
    pub id: LoopId,
    /// Line of the loop keyword
    pub line: usize,
    pub annotation: LoopAnnotation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub name: String,
    /// Annotated source loops in source order
    pub loops: Vec<AnnotatedLoop>,
}

impl FunctionMetadata {
    pub fn loop_at_line(&self, line: usize) -> Option<&LoopAnnotation> {
        self.loops.iter().find(|l| l.line == line).map(|l| &l.annotation)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub functions: Vec<FunctionMetadata>,
}

impl ModuleMetadata {
    pub fn function(&self, name: &str) -> Option<&FunctionMetadata> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Total number of annotated source loops.
    pub fn loop_count(&self) -> usize {
        self.functions.iter().map(|f| f.loops.len()).sum()
    }
}

impl PrettyPrint for LoopAnnotation {
    fn to_doc(&self) -> BoxDoc<'_> {
        let mut children = Vec::new();
        if let Some(name) = &self.name {
            children.push(field_doc(LOOP_ID, name.clone()));
        }
        if self.disable_nonforced {
            children.push(BoxDoc::text(DISABLE_NONFORCED));
        }
        for attr in &self.hints {
            children.push(BoxDoc::text(attr.to_string()));
        }
        if let Some(bundle) = &self.transform {
            children.push(bundle.to_doc());
        }
        nested_doc("loop".to_string(), children, 2)
    }
}

impl PrettyPrint for TransformBundle {
    fn to_doc(&self) -> BoxDoc<'_> {
        let mut children: Vec<BoxDoc<'_>> = self.attrs.iter().map(|a| BoxDoc::text(a.to_string())).collect();
        for followup in &self.followups {
            let header = format!("{}:", followup.key);
            children.push(nested_doc(header, vec![followup.annotation.to_doc()], 2));
        }
        nested_doc(format!("transform {}", self.kind.keyword()), children, 2)
    }
}

impl PrettyPrint for ModuleMetadata {
    fn to_doc(&self) -> BoxDoc<'_> {
        let functions: Vec<_> = self
            .functions
            .iter()
            .map(|func| {
                let loops = func
                    .loops
                    .iter()
                    .map(|l| nested_doc(format!("{} (line {})", l.id, l.line), vec![l.annotation.to_doc()], 2))
                    .collect();
                nested_doc(format!("function {}", func.name), loops, 2)
            })
            .collect();
        BoxDoc::intersperse(functions, BoxDoc::hardline()).append(BoxDoc::hardline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unroll_bundle() -> TransformBundle {
        TransformBundle {
            kind: TransformKind::Unroll,
            attrs: vec![
                MetadataAttr::flag("llvm.loop.unroll.enable"),
                MetadataAttr::new("llvm.loop.unroll.count", MetadataValue::Int(4)),
            ],
            followups: vec![FollowupBundle {
                key: "llvm.loop.unroll.followup_unrolled".into(),
                annotation: LoopAnnotation { name: Some("u".into()), ..LoopAnnotation::forced_only() },
            }],
        }
    }

    #[test]
    fn test_followup_lookup() {
        let ann = LoopAnnotation { transform: Some(unroll_bundle()), ..LoopAnnotation::forced_only() };
        let inner = ann.followup(&["llvm.loop.unroll.followup_unrolled"]).unwrap();
        assert_eq!(inner.name.as_deref(), Some("u"));
        assert!(ann.followup(&["llvm.loop.unroll.followup_all"]).is_none());
        assert_eq!(ann.attr("llvm.loop.unroll.count"), Some(&MetadataValue::Int(4)));
    }

    #[test]
    fn test_pretty_tree() {
        let ann = LoopAnnotation { transform: Some(unroll_bundle()), ..LoopAnnotation::forced_only() };
        let text = ann.pretty();
        let expected = "loop\n  llvm.loop.disable_nonforced\n  transform unroll\n    llvm.loop.unroll.enable = true\n    llvm.loop.unroll.count = 4\n    llvm.loop.unroll.followup_unrolled:\n      loop\n        llvm.loop.id: u\n        llvm.loop.disable_nonforced";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_module_tree() {
        let function = |name: &str, line: usize| FunctionMetadata {
            name: name.into(),
            loops: vec![AnnotatedLoop {
                id: LoopId(0),
                line,
                annotation: LoopAnnotation { name: Some("i".into()), ..LoopAnnotation::default() },
            }],
        };
        let module = ModuleMetadata { functions: vec![function("f", 3), function("g", 9)] };
        let text = module.pretty();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "function f");
        assert!(lines[1].ends_with("(line 3)"));
        assert_eq!(lines[2], "    loop");
        assert_eq!(lines[3], "      llvm.loop.id: i");
        assert_eq!(lines[4], "function g");
        assert_eq!(module.loop_count(), 2);
    }

    #[test]
    fn test_hint_attrs() {
        assert_eq!(
            hint_attrs(&LoopHint::InterleaveEnable(false)),
            vec![MetadataAttr::new("llvm.loop.interleave.count", MetadataValue::Int(1))]
        );
        assert_eq!(hint_attrs(&LoopHint::UnrollFull)[0].key, "llvm.loop.unroll.full");
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(MetadataAttr::new("k", MetadataValue::IntList(vec![1, 0]))).unwrap();
        assert_eq!(value, serde_json::json!({ "key": "k", "value": [1, 0] }));
    }
}
