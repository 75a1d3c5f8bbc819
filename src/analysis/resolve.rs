//! Chain resolution.
//!
//! For each function, the loop-name table is built first so that references
//! may precede definitions. Chains are then applied to the loop graph with
//! source loops in pre-order, and within a chain the directive closest to
//! the loop first. Each later directive applies to the primary output of the
//! one before it. A chain that fails to locate a loop is rolled back as a
//! whole and its loop keeps default heuristics.

use crate::analysis::binder::{FunctionBinding, LoopBinding};
use crate::analysis::nest::{Consumer, LoopGraph, LoopState, NodeId};
use crate::analysis::validate::BoundDirective;
use crate::transform::directive::{pass_order_compatible, LoopName, Transform};
use crate::transform::registry::TransformKind;
use crate::utils::errors::{DiagKind, Diagnostic, Diagnostics};
use crate::utils::intern::Symbol;
use crate::utils::location::Span;
use crate::DirectiveConfig;
use std::collections::{HashMap, HashSet};

/// Where a loop name is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NameSite {
    /// `#pragma clang loop id(...)` on a source loop
    Source { index: usize },
    /// An output-naming clause: loop, position in its chain, output slot
    Output { index: usize, directive: usize, slot: usize },
}

/// Per-function table of loop names.
#[derive(Debug, Default)]
pub struct NameTable {
    defined: HashMap<Symbol, NameSite>,
    /// Output slots whose name survived duplicate checking
    accepted_outputs: HashSet<NameSite>,
}

impl NameTable {
    /// Collect every definition of `function` in source order.
    /// Later duplicates are reported and ignored.
    fn build(function: &mut FunctionBinding, diags: &mut Diagnostics) -> Self {
        let mut sites: Vec<(&LoopName, NameSite)> = Vec::new();
        for (index, binding) in function.loops.iter().enumerate() {
            if let Some(name) = &binding.name {
                sites.push((name, NameSite::Source { index }));
            }
            for (directive, bound) in binding.chain.iter().enumerate() {
                for (slot, name) in bound.directive.output_names().into_iter().enumerate() {
                    if let Some(name) = name {
                        sites.push((name, NameSite::Output { index, directive, slot }));
                    }
                }
            }
        }
        sites.sort_by(|a, b| a.0.span.source_order(&b.0.span));

        let mut table = NameTable::default();
        let mut first_spans: HashMap<Symbol, Span> = HashMap::new();
        let mut source_names = Vec::new();
        for (name, site) in sites {
            let symbol = function.graph.names.intern(&name.name);
            if let Some(previous) = first_spans.get(&symbol) {
                let diag = Diagnostic::new(DiagKind::DuplicateLoopId(name.name.clone()), name.span)
                    .with_note(format!("previous definition at {}", previous));
                diags.report(diag);
                continue;
            }
            first_spans.insert(symbol, name.span);
            table.defined.insert(symbol, site);
            match site {
                NameSite::Source { index } => source_names.push((index, symbol)),
                NameSite::Output { .. } => {
                    table.accepted_outputs.insert(site);
                }
            }
        }
        for (index, symbol) in source_names {
            let node = function.loops[index].node;
            function.graph.node_mut(node).name = Some(symbol);
        }
        table
    }

    pub fn is_defined(&self, symbol: Symbol) -> bool {
        self.defined.contains_key(&symbol)
    }

    pub fn len(&self) -> usize {
        self.defined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defined.is_empty()
    }
}

/// Resolve every chain of `function`.
pub fn resolve_function(function: &mut FunctionBinding, config: &DirectiveConfig, diags: &mut Diagnostics) {
    let table = NameTable::build(function, diags);
    log::debug!("`{}`: {} loop name(s)", function.name, table.len());

    // loops whose only directive is a full unroll leave no loop level behind
    let vanishing: HashSet<NodeId> = function
        .loops
        .iter()
        .filter(|b| b.state == LoopState::Pending)
        .filter(|b| {
            matches!(b.chain.as_slice(), [only] if matches!(only.directive.transform, Transform::Unroll { full: true, .. }))
        })
        .map(|b| b.node)
        .collect();

    for index in 0..function.loops.len() {
        let binding = &mut function.loops[index];
        if binding.state != LoopState::Pending {
            continue;
        }
        match apply_chain(&mut function.graph, binding, index, &table, &vanishing, config) {
            Ok(warnings) => {
                binding.state = LoopState::Bound;
                for warning in warnings {
                    diags.report(warning);
                }
            }
            Err(diag) => {
                diags.report(diag);
                binding.state = LoopState::Failed;
            }
        }
        log::trace!("{}: {}", binding.id, binding.state);
    }

    check_combined_hints(function, diags);
}

/// Apply the chain of one loop. Returns the ordering warnings on success.
fn apply_chain(
    graph: &mut LoopGraph,
    binding: &mut LoopBinding,
    index: usize,
    table: &NameTable,
    vanishing: &HashSet<NodeId>,
    config: &DirectiveConfig,
) -> Result<Vec<Diagnostic>, Diagnostic> {
    let checkpoint = graph.checkpoint();
    let mut applications = Vec::new();
    let mut warnings = Vec::new();
    let mut target = Some(binding.node);
    let mut previous: Option<&BoundDirective> = None;

    // closest to the loop first
    for (position, bound) in binding.chain.iter().enumerate().rev() {
        let step = target
            .filter(|node| !graph.is_consumed(*node))
            .ok_or_else(|| Diagnostic::new(DiagKind::LoopNotFound, bound.directive.span))
            .and_then(|node| locate_nest(graph, node, bound, vanishing))
            .and_then(|members| {
                let permutation = permutation_of(graph, &members, bound, table)?;
                Ok((members, permutation))
            });
        let (members, permutation) = match step {
            Ok(step) => step,
            Err(diag) => {
                graph.rollback(checkpoint);
                return Err(diag);
            }
        };

        if let Some(previous) = previous {
            if config.pass_order_warnings && !pass_order_compatible(&previous.directive, &bound.directive) {
                warnings.push(Diagnostic::new(DiagKind::PassOrder, bound.directive.span));
            }
        }

        let names = output_names(graph, &members, &permutation, bound, index, position, table);
        let app = graph.apply(bound.clone(), members, permutation, names);
        target = graph.application(app).primary_output();
        applications.push(app);
        previous = Some(bound);
    }

    binding.applications = applications;
    Ok(warnings)
}

/// The loops a directive consumes, outermost first.
fn locate_nest(
    graph: &LoopGraph,
    root: NodeId,
    bound: &BoundDirective,
    vanishing: &HashSet<NodeId>,
) -> Result<Vec<NodeId>, Diagnostic> {
    let span = bound.directive.span;
    let members = match bound.directive.kind() {
        TransformKind::UnrollAndJam => {
            let inner = match graph.node(root).children.as_slice() {
                [only] => *only,
                _ => return Err(Diagnostic::new(DiagKind::UnrollAndJamNestedCount, span)),
            };
            if !is_innermost(graph, inner, vanishing) {
                return Err(Diagnostic::new(DiagKind::UnrollAndJamNotInnermost, span));
            }
            vec![root, inner]
        }
        TransformKind::Tile | TransformKind::Interchange => {
            let depth = bound.directive.loop_inputs();
            graph.perfect_nest(root, depth).ok_or_else(|| {
                let kind = DiagKind::NestTooShallow { transform: bound.keyword().to_string(), depth };
                Diagnostic::new(kind, span)
            })?
        }
        _ => vec![root],
    };
    if members.iter().skip(1).any(|m| graph.is_consumed(*m)) {
        return Err(Diagnostic::new(DiagKind::LoopNotFound, span));
    }
    Ok(members)
}

/// True when every loop below `node` is fully unrolled by its own directive.
fn is_innermost(graph: &LoopGraph, node: NodeId, vanishing: &HashSet<NodeId>) -> bool {
    graph
        .node(node)
        .children
        .iter()
        .all(|child| vanishing.contains(child) && is_innermost(graph, *child, vanishing))
}

/// Resolve an interchange permutation to original nest indices.
fn permutation_of(
    graph: &LoopGraph,
    members: &[NodeId],
    bound: &BoundDirective,
    table: &NameTable,
) -> Result<Vec<usize>, Diagnostic> {
    let Transform::Interchange { permutation } = &bound.directive.transform else {
        return Ok(Vec::new());
    };
    let mut indices = Vec::with_capacity(permutation.len());
    for name in permutation {
        let symbol = graph.names.get(&name.name).filter(|s| table.is_defined(*s));
        let Some(symbol) = symbol else {
            return Err(Diagnostic::new(DiagKind::UndeclaredLoopId(name.name.clone()), name.span));
        };
        let position = members
            .iter()
            .position(|m| graph.node(*m).name == Some(symbol))
            .ok_or_else(|| Diagnostic::new(DiagKind::LoopIdNotInNest(name.name.clone()), name.span))?;
        if indices.contains(&position) {
            return Err(Diagnostic::new(DiagKind::RepeatedPermutationId(name.name.clone()), name.span));
        }
        indices.push(position);
    }
    Ok(indices)
}

/// Names for the outputs of one application.
///
/// Clause-given names apply when they survived the name table. Interchanged
/// loops keep the names of the loops they came from and a packed loop keeps
/// its input's name; these are not new definitions.
fn output_names(
    graph: &LoopGraph,
    members: &[NodeId],
    permutation: &[usize],
    bound: &BoundDirective,
    index: usize,
    directive: usize,
    table: &NameTable,
) -> Vec<Option<Symbol>> {
    match &bound.directive.transform {
        Transform::Interchange { .. } => {
            permutation.iter().map(|&i| graph.node(members[i]).name).collect()
        }
        Transform::Pack { .. } => vec![graph.node(members[0]).name],
        _ => bound
            .directive
            .output_names()
            .into_iter()
            .enumerate()
            .map(|(slot, name)| {
                let site = NameSite::Output { index, directive, slot };
                name.filter(|_| table.accepted_outputs.contains(&site))
                    .and_then(|name| graph.names.get(&name.name))
            })
            .collect(),
    }
}

/// Legacy hints on a loop that a transformation consumed as an inner nest
/// member cannot be honored. Everything else that got this far is validated.
fn check_combined_hints(function: &mut FunctionBinding, diags: &mut Diagnostics) {
    for binding in &mut function.loops {
        let consumed = function.graph.node(binding.node).consumed_by;
        if !binding.legacy.is_empty() && matches!(consumed, Some(Consumer::Member(_))) {
            for pragma in &binding.legacy {
                diags.emit(DiagKind::CannotCombine(pragma.introducer().to_string()), pragma.span);
            }
            binding.legacy.clear();
            binding.hints.clear();
            binding.state = LoopState::Failed;
            continue;
        }
        if binding.state == LoopState::Bound {
            binding.state = LoopState::Validated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::binder::bind_unit;
    use crate::analysis::nest::NodeOrigin;
    use crate::frontend::parse;

    fn resolve_with(src: &str, config: &DirectiveConfig) -> (Vec<FunctionBinding>, Vec<String>) {
        let parsed = parse(src).unwrap();
        let mut diags = parsed.diagnostics;
        let mut functions = bind_unit(&parsed.unit, &mut diags);
        for function in &mut functions {
            resolve_function(function, config, &mut diags);
        }
        let messages = diags.into_sorted().iter().map(|d| d.message()).collect();
        (functions, messages)
    }

    fn resolve(src: &str) -> (Vec<FunctionBinding>, Vec<String>) {
        resolve_with(src, &DirectiveConfig::default())
    }

    fn diag_notes(src: &str) -> Vec<String> {
        let parsed = parse(src).unwrap();
        let mut diags = parsed.diagnostics;
        for function in &mut bind_unit(&parsed.unit, &mut diags) {
            resolve_function(function, &DirectiveConfig::default(), &mut diags);
        }
        diags.into_sorted().into_iter().flat_map(|d| d.notes).collect()
    }

    #[test]
    fn test_full_unroll_leaves_nothing() {
        let src = r#"
void f(int n) {
#pragma clang transform unroll
#pragma clang transform unroll full
    for (int i = 0; i < 8; i++) ;
}
"#;
        let (functions, messages) = resolve(src);
        assert_eq!(messages, vec!["transformation did not find its loop to transform"]);
        let lp = &functions[0].loops[0];
        assert_eq!(lp.state, LoopState::Failed);
        assert!(lp.applications.is_empty());
        assert!(functions[0].graph.applications.is_empty());
    }

    #[test]
    fn test_unroll_and_jam_shapes() {
        let zero = "void f(int n) {\n#pragma clang transform unrollandjam\nfor (int i = 0; i < n; i++) ;\n}\n";
        assert_eq!(resolve(zero).1, vec!["unroll-and-jam requires exactly one nested loop"]);

        let two = r#"
void f(int n) {
#pragma clang transform unrollandjam
    for (int i = 0; i < n; i++) {
        for (int j = 0; j < n; j++) ;
        for (int k = 0; k < n; k++) ;
    }
}
"#;
        assert_eq!(resolve(two).1, vec!["unroll-and-jam requires exactly one nested loop"]);

        let three = r#"
void f(int n) {
#pragma clang transform unrollandjam partial(2)
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++)
            for (int k = 0; k < n; k++) ;
}
"#;
        assert_eq!(resolve(three).1, vec!["inner loop of unroll-and-jam is not the innermost"]);
    }

    #[test]
    fn test_unroll_and_jam_over_fully_unrolled_loop() {
        let src = r#"
void f(int n) {
#pragma clang transform unrollandjam partial(2)
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++)
#pragma clang transform unroll full
            for (int k = 0; k < 4; k++) ;
}
"#;
        let (functions, messages) = resolve(src);
        assert!(messages.is_empty(), "{:?}", messages);
        let f = &functions[0];
        assert_eq!(f.loops[0].state, LoopState::Validated);
        assert_eq!(f.loops[2].state, LoopState::Validated);
        let jam = f.graph.application(f.loops[0].applications[0]);
        assert_eq!(jam.members, vec![f.loops[0].node, f.loops[1].node]);
        assert_eq!(f.graph.node(f.loops[2].node).consumed_by, Some(Consumer::Root(f.loops[2].applications[0])));

        let partial = r#"
void f(int n) {
#pragma clang transform unrollandjam partial(2)
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++)
#pragma clang transform unroll partial(2)
            for (int k = 0; k < n; k++) ;
}
"#;
        assert_eq!(resolve(partial).1, vec!["inner loop of unroll-and-jam is not the innermost"]);
    }

    #[test]
    fn test_interchange_permutation() {
        let src = r#"
void f(int n) {
#pragma clang loop id(i)
#pragma clang transform interchange permutation(j, i)
    for (int i = 0; i < n; i++)
#pragma clang loop id(j)
        for (int j = 0; j < n; j++) ;
}
"#;
        let (functions, messages) = resolve(src);
        assert!(messages.is_empty(), "{:?}", messages);
        let f = &functions[0];
        let app = f.graph.application(f.loops[0].applications[0]);
        assert_eq!(app.members.len(), 2);
        assert_eq!(app.permutation, vec![1, 0]);
        let names: Vec<_> = app
            .outputs
            .iter()
            .map(|o| f.graph.names.resolve(f.graph.node(*o).name.unwrap()).unwrap())
            .collect();
        assert_eq!(names, vec!["j", "i"]);
        assert_eq!(f.loops[0].state, LoopState::Validated);
    }

    #[test]
    fn test_interchange_name_errors() {
        let undeclared = r#"
void f(int n) {
#pragma clang loop id(i)
#pragma clang transform interchange permutation(x, i)
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++) ;
}
"#;
        assert_eq!(resolve(undeclared).1, vec!["use of undeclared loop id 'x'"]);

        let repeated = r#"
void f(int n) {
#pragma clang loop id(i)
#pragma clang transform interchange permutation(i, i)
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++) ;
}
"#;
        assert_eq!(resolve(repeated).1, vec!["loop id 'i' appears multiple times in permutation"]);

        let outside = r#"
void f(int n) {
#pragma clang loop id(i)
#pragma clang transform interchange permutation(k, i)
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++) ;
#pragma clang loop id(k)
    for (int k = 0; k < n; k++) ;
}
"#;
        assert_eq!(
            resolve(outside).1,
            vec!["loop id 'k' does not name a loop in the transformed nest"]
        );
    }

    #[test]
    fn test_tile_then_interchange_floor_loops() {
        let src = r#"
void f(int n) {
#pragma clang transform interchange permutation(b, a)
#pragma clang transform tile sizes(4, 8) floor_ids(a, b)
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++) ;
}
"#;
        let (functions, messages) = resolve(src);
        assert!(messages.is_empty(), "{:?}", messages);
        let f = &functions[0];
        let apps = &f.loops[0].applications;
        assert_eq!(apps.len(), 2);
        let interchange = f.graph.application(apps[1]);
        assert_eq!(interchange.permutation, vec![1, 0]);
        assert!(matches!(
            f.graph.node(interchange.root).origin,
            NodeOrigin::Followup { application, .. } if application == apps[0]
        ));
    }

    #[test]
    fn test_nest_too_shallow() {
        let src = "void f(int n) {\n#pragma clang transform tile sizes(4, 4)\nfor (int i = 0; i < n; i++) ;\n}\n";
        assert_eq!(resolve(src).1, vec!["tile requires a perfect loop nest of depth 2"]);
    }

    #[test]
    fn test_duplicate_names() {
        let src = r#"
void f(int n) {
#pragma clang transform tile sizes(4) floor_ids(x)
    for (int i = 0; i < n; i++) ;
#pragma clang loop id(x)
    for (int j = 0; j < n; j++) ;
}
"#;
        let (functions, messages) = resolve(src);
        assert_eq!(messages, vec!["duplicate loop id 'x'"]);
        let notes = diag_notes(src);
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("previous definition at 3:"), "{:?}", notes);
        // the source loop loses the name, the earlier floor loop keeps it
        let f = &functions[0];
        assert_eq!(f.graph.node(f.loops[1].node).name, None);
    }

    #[test]
    fn test_inner_loop_consumed_by_outer_nest() {
        let src = r#"
void f(int n) {
#pragma clang transform tile sizes(4, 4)
    for (int i = 0; i < n; i++)
#pragma clang transform reverse
        for (int j = 0; j < n; j++) ;
}
"#;
        let (functions, messages) = resolve(src);
        assert_eq!(messages, vec!["transformation did not find its loop to transform"]);
        assert_eq!(functions[0].loops[0].state, LoopState::Validated);
        assert_eq!(functions[0].loops[1].state, LoopState::Failed);
    }

    #[test]
    fn test_cannot_combine_hints() {
        let src = r#"
void f(int n) {
#pragma clang transform unrollandjam
    for (int i = 0; i < n; i++)
#pragma unroll 4
        for (int j = 0; j < n; j++) ;
}
"#;
        let (functions, messages) = resolve(src);
        assert_eq!(messages, vec!["cannot combine '#pragma unroll' with other transformations"]);
        assert!(functions[0].loops[1].hints.is_empty());
    }

    #[test]
    fn test_pass_order_warning() {
        let warns = r#"
void f(int n) {
#pragma clang transform distribute
#pragma clang transform vectorize
    for (int i = 0; i < n; i++) ;
}
"#;
        assert_eq!(
            resolve(warns).1,
            vec!["the pass structure currently is not able to apply the transformations in this order"]
        );
        let quiet = DirectiveConfig::default().with_pass_order_warnings(false);
        assert!(resolve_with(warns, &quiet).1.is_empty());

        let fine = r#"
void f(int n) {
#pragma clang transform distribute
#pragma clang transform unroll
    for (int i = 0; i < n; i++) ;
}
"#;
        assert!(resolve(fine).1.is_empty());
    }
}
