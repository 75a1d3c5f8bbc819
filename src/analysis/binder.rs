//! Binding pragmas to loops.
//!
//! Walks every function body in source order, keeping the constant scopes
//! current so directive arguments see exactly the declarations before them.
//! Each pragma run is checked against the statement it precedes, split into
//! a transform chain, legacy hints and loop names, and attached to the loop.
//! Pragmas outside function bodies are rejected here.

use crate::analysis::consteval::Scopes;
use crate::analysis::nest::{AppId, LoopGraph, LoopState, NodeId};
use crate::analysis::validate::{evaluate_hints, validate_directive, BoundDirective};
use crate::frontend::ast::*;
use crate::transform::directive::{Directive, LoopName};
use crate::transform::legacy::{LegacyKind, LegacyPragma, LoopHint};
use crate::utils::errors::{DiagKind, Diagnostics};
use crate::utils::location::Span;

/// Everything attached to one source loop.
#[derive(Debug, Clone)]
pub struct LoopBinding {
    pub id: LoopId,
    pub node: NodeId,
    pub span: Span,
    /// Name from `#pragma clang loop id(...)`
    pub name: Option<LoopName>,
    /// Validated transform directives, in textual order
    pub chain: Vec<BoundDirective>,
    /// Legacy pragmas whose hints were accepted
    pub legacy: Vec<LegacyPragma>,
    pub hints: Vec<LoopHint>,
    /// Applications of the chain, closest directive first
    pub applications: Vec<AppId>,
    pub state: LoopState,
}

impl LoopBinding {
    fn new(lp: &Loop, node: NodeId) -> Self {
        Self {
            id: lp.id,
            node,
            span: lp.span,
            name: None,
            chain: Vec::new(),
            legacy: Vec::new(),
            hints: Vec::new(),
            applications: Vec::new(),
            state: LoopState::Unbound,
        }
    }

    pub fn has_pragmas(&self) -> bool {
        self.name.is_some() || !self.chain.is_empty() || !self.hints.is_empty()
    }
}

/// The loops of one function body and their graph.
#[derive(Debug, Clone)]
pub struct FunctionBinding {
    pub name: String,
    pub graph: LoopGraph,
    /// Source loops in pre-order; `loops[i].node == NodeId(i)`
    pub loops: Vec<LoopBinding>,
}

impl FunctionBinding {
    pub fn loop_by_id(&self, id: LoopId) -> Option<&LoopBinding> {
        self.loops.iter().find(|l| l.id == id)
    }
}

/// A pragma run after the transform/legacy mixing rules were applied.
#[derive(Debug, Default)]
struct PragmaStack<'a> {
    transforms: Vec<&'a Directive>,
    /// Legacy pragmas that carry hints
    legacy: Vec<&'a LegacyPragma>,
    /// `clang loop` pragmas that only name the loop
    naming: Vec<&'a LegacyPragma>,
}

impl<'a> PragmaStack<'a> {
    /// Loop names given by the run, in source order.
    fn names(&self) -> Vec<&'a LoopName> {
        let mut names: Vec<&'a LoopName> = self
            .naming
            .iter()
            .chain(self.legacy.iter())
            .copied()
            .filter_map(LegacyPragma::loop_id)
            .collect();
        names.sort_by(|a, b| a.span.source_order(&b.span));
        names
    }

    fn is_empty(&self) -> bool {
        self.transforms.is_empty() && self.legacy.is_empty() && self.naming.is_empty()
    }
}

/// Bind every function body of `unit`.
pub fn bind_unit(unit: &TranslationUnit, diags: &mut Diagnostics) -> Vec<FunctionBinding> {
    let mut scopes = Scopes::new();
    let mut functions = Vec::new();
    for item in &unit.items {
        match item {
            Item::Decl(decl) => scopes.declare_decl(decl),
            Item::Function(func) => {
                if let Some(binding) = bind_function(func, func.name.clone(), &mut scopes, diags) {
                    functions.push(binding);
                }
            }
            Item::Record(record) => {
                for member in &record.members {
                    match member {
                        RecordMember::Pragmas(group) => {
                            reject_pragmas(&group.pragmas, record.kind.context_name(), diags)
                        }
                        RecordMember::Method(func) => {
                            let name = format!("{}::{}", record.name, func.name);
                            if let Some(binding) = bind_function(func, name, &mut scopes, diags) {
                                functions.push(binding);
                            }
                        }
                        RecordMember::Field(_) | RecordMember::Access(_) => {}
                    }
                }
            }
            Item::Pragmas(group) => reject_pragmas(&group.pragmas, "file scope", diags),
        }
    }
    functions
}

fn reject_pragmas(pragmas: &[Pragma], context: &str, diags: &mut Diagnostics) {
    for pragma in pragmas {
        diags.emit(DiagKind::PragmaInDeclContext(context.to_string()), pragma.span());
    }
}

fn bind_function(
    func: &Function,
    name: String,
    scopes: &mut Scopes,
    diags: &mut Diagnostics,
) -> Option<FunctionBinding> {
    let body = func.body.as_ref()?;
    scopes.push();
    for param in &func.params {
        scopes.declare_param(param);
    }
    let mut binder = Binder {
        scopes: &mut *scopes,
        diags: &mut *diags,
        graph: LoopGraph::new(),
        loops: Vec::new(),
    };
    binder.walk_block(body, None);
    let Binder { graph, loops, .. } = binder;
    scopes.pop();

    log::debug!("bound `{}`: {} loop(s)", name, loops.len());
    Some(FunctionBinding { name, graph, loops })
}

struct Binder<'a> {
    scopes: &'a mut Scopes,
    diags: &'a mut Diagnostics,
    graph: LoopGraph,
    loops: Vec<LoopBinding>,
}

impl<'a> Binder<'a> {
    fn walk_block(&mut self, block: &Block, parent: Option<NodeId>) {
        self.scopes.push();
        for stmt in &block.statements {
            self.walk_stmt(stmt, parent);
        }
        self.scopes.pop();
    }

    fn walk_stmt(&mut self, stmt: &Stmt, parent: Option<NodeId>) {
        match &stmt.kind {
            StmtKind::Decl(decl) => self.scopes.declare_decl(decl),
            StmtKind::Block(block) => self.walk_block(block, parent),
            StmtKind::If { then_branch, else_branch, .. } => {
                self.walk_scoped(then_branch, parent);
                if let Some(else_branch) = else_branch {
                    self.walk_scoped(else_branch, parent);
                }
            }
            StmtKind::Loop(lp) => {
                self.walk_loop(lp, parent);
            }
            StmtKind::Annotated { pragmas, stmt } => self.bind_annotated(pragmas, stmt.as_deref(), parent),
            StmtKind::Expr(_)
            | StmtKind::Return(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Empty => {}
        }
    }

    fn walk_scoped(&mut self, stmt: &Stmt, parent: Option<NodeId>) {
        self.scopes.push();
        self.walk_stmt(stmt, parent);
        self.scopes.pop();
    }

    /// Add a loop to the graph and walk its body. Returns its index in `loops`.
    fn walk_loop(&mut self, lp: &Loop, parent: Option<NodeId>) -> usize {
        let node = self.graph.add_source(lp.id, lp.span, parent);
        let index = self.loops.len();
        self.loops.push(LoopBinding::new(lp, node));

        self.scopes.push();
        if let LoopKind::For { init: Some(init), .. } = &lp.kind {
            self.walk_stmt(init, parent);
        }
        self.walk_stmt(&lp.body, Some(node));
        self.scopes.pop();
        index
    }

    /// Split a pragma run and apply the mixing rules between transform
    /// directives and legacy hints.
    fn sort_pragmas<'p>(&mut self, pragmas: &'p [Pragma]) -> PragmaStack<'p> {
        let last_transform = pragmas.iter().rposition(|p| matches!(p, Pragma::Transform(_)));
        let mut stack = PragmaStack::default();
        let mut first_legacy = None;

        for (i, pragma) in pragmas.iter().enumerate() {
            match pragma {
                Pragma::Transform(d) => stack.transforms.push(d),
                Pragma::Legacy(l) if l.is_naming_only() => stack.naming.push(l),
                Pragma::Legacy(l) => {
                    if last_transform.is_some_and(|t| t > i) {
                        self.diags
                            .emit(DiagKind::ExpectedLoopToFollow(l.introducer().to_string()), l.span);
                        continue;
                    }
                    first_legacy.get_or_insert(i);
                    stack.legacy.push(l);
                }
            }
        }

        // A transform above a surviving legacy pragma drops the whole chain.
        if let Some(first) = first_legacy {
            if let Some(Pragma::Transform(d)) =
                pragmas[..first].iter().rev().find(|p| matches!(p, Pragma::Transform(_)))
            {
                self.diags.emit(
                    DiagKind::ExpectedLoopToFollow("#pragma clang transform".to_string()),
                    d.span,
                );
                stack.transforms.clear();
            }
        }
        stack
    }

    fn bind_annotated(&mut self, pragmas: &[Pragma], follower: Option<&Stmt>, parent: Option<NodeId>) {
        let stack = self.sort_pragmas(pragmas);
        let lp = match follower.and_then(Stmt::as_loop) {
            Some(lp) => lp,
            None => {
                self.reject_stack(&stack);
                if let Some(stmt) = follower {
                    self.walk_stmt(stmt, parent);
                }
                return;
            }
        };

        let mut legacy = Vec::new();
        let mut hints = Vec::new();
        for pragma in &stack.legacy {
            if pragma.kind == LegacyKind::OmpSimd && !lp.kind.is_for() {
                self.diags.emit(DiagKind::OmpSimdNotFor, pragma.span);
                continue;
            }
            match evaluate_hints(pragma, self.scopes) {
                Ok(h) => {
                    hints.extend(h);
                    legacy.push((*pragma).clone());
                }
                Err(diag) => self.diags.report(diag),
            }
        }

        let mut chain = Vec::new();
        for directive in &stack.transforms {
            match validate_directive(directive, self.scopes) {
                Ok(bound) => chain.push(bound),
                Err(diag) => self.diags.report(diag),
            }
        }
        let chain_lost = !stack.transforms.is_empty() && chain.is_empty();

        let index = self.walk_loop(lp, parent);
        let names = stack.names();
        let diags = &mut *self.diags;
        let binding = &mut self.loops[index];
        for name in names {
            match &binding.name {
                Some(existing) => {
                    diags.emit(DiagKind::LoopAlreadyNamed(existing.name.clone()), name.span)
                }
                None => binding.name = Some(name.clone()),
            }
        }
        binding.chain = chain;
        binding.legacy = legacy;
        binding.hints = hints;
        binding.state = if chain_lost {
            LoopState::Failed
        } else if stack.is_empty() {
            LoopState::Unbound
        } else {
            LoopState::Pending
        };
        log::trace!("{} at line {}: {}", binding.id, binding.span.start_line, binding.state);
    }

    /// Report every pragma of a run that does not precede a loop.
    fn reject_stack(&mut self, stack: &PragmaStack<'_>) {
        if let Some(closest) = stack.transforms.last() {
            self.diags.emit(DiagKind::ExpectedLoopAfterTransform, closest.span);
        }
        let mut legacy: Vec<&LegacyPragma> = stack.legacy.iter().chain(stack.naming.iter()).copied().collect();
        legacy.sort_by(|a, b| a.span.source_order(&b.span));
        for pragma in legacy {
            let kind = if pragma.kind == LegacyKind::OmpSimd {
                DiagKind::OmpSimdNotFor
            } else {
                DiagKind::ExpectedLoopToFollow(pragma.introducer().to_string())
            };
            self.diags.emit(kind, pragma.span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;

    fn bind(src: &str) -> (Vec<FunctionBinding>, Vec<String>) {
        let parsed = parse(src).unwrap();
        let mut diags = parsed.diagnostics;
        let functions = bind_unit(&parsed.unit, &mut diags);
        let messages = diags.into_sorted().iter().map(|d| d.message()).collect();
        (functions, messages)
    }

    #[test]
    fn test_loops_in_preorder() {
        let src = r#"
void f(int n) {
    for (int i = 0; i < n; i++)
        for (int j = 0; j < n; j++)
            ;
    while (n) n--;
}
"#;
        let (functions, messages) = bind(src);
        assert!(messages.is_empty());
        let f = &functions[0];
        assert_eq!(f.loops.len(), 3);
        for (i, binding) in f.loops.iter().enumerate() {
            assert_eq!(binding.node, NodeId(i));
        }
        assert_eq!(f.graph.node(NodeId(0)).children, vec![NodeId(1)]);
        assert!(f.graph.node(NodeId(2)).children.is_empty());
    }

    #[test]
    fn test_chain_and_name_attached() {
        let src = r#"
void f(int n) {
#pragma clang loop id(outer)
#pragma clang transform unroll partial(4)
#pragma clang transform reverse
    for (int i = 0; i < n; i++) ;
}
"#;
        let (functions, messages) = bind(src);
        assert!(messages.is_empty(), "{:?}", messages);
        let lp = &functions[0].loops[0];
        assert_eq!(lp.name.as_ref().unwrap().name, "outer");
        assert_eq!(lp.chain.len(), 2);
        assert_eq!(lp.chain[0].keyword(), "unroll");
        assert_eq!(lp.state, LoopState::Pending);
    }

    #[test]
    fn test_block_scoped_constants() {
        let src = r#"
void f(int n) {
    const int U = 4;
#pragma clang transform unroll partial(U)
    for (int i = 0; i < n; i++) ;
}
void g(int n) {
#pragma clang transform unroll partial(U)
    for (int i = 0; i < n; i++) ;
}
"#;
        let (functions, messages) = bind(src);
        assert_eq!(messages, vec!["use of undeclared identifier 'U'"]);
        assert_eq!(functions[0].loops[0].chain.len(), 1);
        assert_eq!(functions[1].loops[0].state, LoopState::Failed);
    }

    #[test]
    fn test_no_loop_follows() {
        let src = r#"
void f(int n) {
#pragma clang transform unroll
#pragma clang transform vectorize
    n = 1;
    {
#pragma unroll
    }
}
"#;
        let (_, messages) = bind(src);
        assert_eq!(
            messages,
            vec![
                "expected loop after transformation pragma",
                "expected a for, while, or do-while loop to follow '#pragma unroll'",
            ]
        );
    }

    #[test]
    fn test_omp_simd_needs_for() {
        let src = r#"
void f(int n) {
#pragma omp simd
    while (n) n--;
}
"#;
        let (functions, messages) = bind(src);
        assert_eq!(messages, vec!["statement after '#pragma omp simd' must be a for loop"]);
        assert!(functions[0].loops[0].hints.is_empty());
    }

    #[test]
    fn test_legacy_above_transform() {
        let src = r#"
void f(int n) {
#pragma unroll 4
#pragma clang transform unroll partial(2)
    for (int i = 0; i < n; i++) ;
}
"#;
        let (functions, messages) = bind(src);
        assert_eq!(messages, vec!["expected a for, while, or do-while loop to follow '#pragma unroll'"]);
        let lp = &functions[0].loops[0];
        assert_eq!(lp.chain.len(), 1);
        assert!(lp.hints.is_empty());
    }

    #[test]
    fn test_transform_above_legacy() {
        let src = r#"
void f(int n) {
#pragma clang transform unroll partial(2)
#pragma unroll 4
    for (int i = 0; i < n; i++) ;
}
"#;
        let (functions, messages) = bind(src);
        assert_eq!(
            messages,
            vec!["expected a for, while, or do-while loop to follow '#pragma clang transform'"]
        );
        let lp = &functions[0].loops[0];
        assert!(lp.chain.is_empty());
        assert_eq!(lp.hints, vec![LoopHint::UnrollCount(4)]);
    }

    #[test]
    fn test_decl_context_pragmas() {
        let src = r#"
#pragma clang transform unroll
int x;
class C {
#pragma clang transform tile sizes(4)
    int y;
};
"#;
        let (functions, messages) = bind(src);
        assert!(functions.is_empty());
        assert_eq!(
            messages,
            vec![
                "this pragma cannot appear in file scope",
                "this pragma cannot appear in class declaration",
            ]
        );
    }

    #[test]
    fn test_second_loop_id() {
        let src = r#"
void f(int n) {
#pragma clang loop id(a)
#pragma clang loop id(b)
    for (int i = 0; i < n; i++) ;
}
"#;
        let (functions, messages) = bind(src);
        assert_eq!(messages, vec!["loop already has loop id 'a'"]);
        assert_eq!(functions[0].loops[0].name.as_ref().unwrap().name, "a");
    }
}
