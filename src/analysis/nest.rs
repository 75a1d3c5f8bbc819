//! Per-function loop graph.
//!
//! Nodes are source loops and the loops generated by applied directives.
//! Children give the nest shape. A node is consumed at most once, either as
//! the root of an application or as an inner member of its nest. Generated
//! loops inherit the children of the nest they replace, so later directives
//! can walk into them.

use crate::analysis::validate::BoundDirective;
use crate::frontend::ast::LoopId;
use crate::transform::directive::FollowupSlot;
use crate::utils::intern::{Symbol, SymbolInterner};
use crate::utils::location::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub usize);

/// Where a loop node comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrigin {
    Source(LoopId),
    Followup { application: AppId, slot: FollowupSlot },
}

/// How an application consumed a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumer {
    /// The loop the directive was applied to
    Root(AppId),
    /// A deeper loop of the directive's nest
    Member(AppId),
}

#[derive(Debug, Clone)]
pub struct LoopNode {
    pub origin: NodeOrigin,
    pub name: Option<Symbol>,
    pub children: Vec<NodeId>,
    pub consumed_by: Option<Consumer>,
    pub span: Span,
}

/// One directive applied to a located nest.
#[derive(Debug, Clone)]
pub struct Application {
    pub directive: BoundDirective,
    pub root: NodeId,
    /// Consumed loops, outermost first; `members[0] == root`
    pub members: Vec<NodeId>,
    /// Generated loops, one per followup slot
    pub outputs: Vec<NodeId>,
    /// Interchange only: original nest index of each new position
    pub permutation: Vec<usize>,
}

impl Application {
    /// The output the next directive of the chain applies to.
    pub fn primary_output(&self) -> Option<NodeId> {
        self.outputs.first().copied()
    }
}

/// Processing state of a source loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// No pragma attached
    Unbound,
    /// Pragmas attached, awaiting resolution
    Pending,
    /// Every directive of the chain found its loops
    Bound,
    /// Nest and ordering checks passed
    Validated,
    /// Metadata produced
    Emitted,
    Failed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Unbound => "unbound",
            LoopState::Pending => "pending",
            LoopState::Bound => "bound",
            LoopState::Validated => "validated",
            LoopState::Emitted => "emitted",
            LoopState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Position to roll back to when a chain fails.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    nodes: usize,
    applications: usize,
    journal: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LoopGraph {
    pub nodes: Vec<LoopNode>,
    pub applications: Vec<Application>,
    /// Loop names of this function
    pub names: SymbolInterner,
    /// Nodes marked consumed since the start, in order
    journal: Vec<NodeId>,
}

impl LoopGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &LoopNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut LoopNode {
        &mut self.nodes[id.0]
    }

    pub fn application(&self, id: AppId) -> &Application {
        &self.applications[id.0]
    }

    /// Add a source loop under `parent` (None for an outermost loop).
    pub fn add_source(&mut self, id: LoopId, span: Span, parent: Option<NodeId>) -> NodeId {
        let node = NodeId(self.nodes.len());
        self.nodes.push(LoopNode {
            origin: NodeOrigin::Source(id),
            name: None,
            children: Vec::new(),
            consumed_by: None,
            span,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(node);
        }
        node
    }

    pub fn is_consumed(&self, id: NodeId) -> bool {
        self.node(id).consumed_by.is_some()
    }

    /// Walk `depth` perfectly nested loops starting at `root`.
    /// Every level above the last must have exactly one child.
    pub fn perfect_nest(&self, root: NodeId, depth: usize) -> Option<Vec<NodeId>> {
        let mut nest = vec![root];
        while nest.len() < depth {
            let last = nest[nest.len() - 1];
            match self.node(last).children.as_slice() {
                [only] => nest.push(*only),
                _ => return None,
            }
        }
        Some(nest)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.nodes.len(),
            applications: self.applications.len(),
            journal: self.journal.len(),
        }
    }

    /// Undo everything done since `cp`.
    pub fn rollback(&mut self, cp: Checkpoint) {
        for node in self.journal.drain(cp.journal..) {
            self.nodes[node.0].consumed_by = None;
        }
        self.nodes.truncate(cp.nodes);
        self.applications.truncate(cp.applications);
    }

    /// Apply `directive` to the nest `members`, creating its output loops.
    ///
    /// Nest-shaped outputs form a new perfect nest (for tile, the floor loops
    /// above the tile loops). The innermost output takes over the children of
    /// the innermost consumed loop.
    pub fn apply(
        &mut self,
        directive: BoundDirective,
        members: Vec<NodeId>,
        permutation: Vec<usize>,
        output_names: Vec<Option<Symbol>>,
    ) -> AppId {
        let app = AppId(self.applications.len());
        let root = members[0];
        for (i, member) in members.iter().enumerate() {
            self.nodes[member.0].consumed_by =
                Some(if i == 0 { Consumer::Root(app) } else { Consumer::Member(app) });
            self.journal.push(*member);
        }

        let slots = directive.directive.followup_slots();
        let inner_children = members
            .last()
            .map(|m| self.node(*m).children.clone())
            .unwrap_or_default();
        let span = self.node(root).span;

        let mut outputs = Vec::with_capacity(slots.len());
        for (i, slot) in slots.iter().enumerate() {
            let node = NodeId(self.nodes.len());
            self.nodes.push(LoopNode {
                origin: NodeOrigin::Followup { application: app, slot: *slot },
                name: output_names.get(i).copied().flatten(),
                children: Vec::new(),
                consumed_by: None,
                span,
            });
            outputs.push(node);
        }

        for pair in outputs.windows(2) {
            self.nodes[pair[0].0].children.push(pair[1]);
        }
        if let Some(last) = outputs.last() {
            self.nodes[last.0].children = inner_children;
        }

        log::trace!(
            "applied `{}` to {} loop(s), {} output(s)",
            directive.keyword(),
            members.len(),
            outputs.len()
        );
        self.applications.push(Application { directive, root, members, outputs, permutation });
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::validate::TransformParams;
    use crate::frontend::ast::Expr;
    use crate::transform::directive::{Directive, FollowupRole, Transform};

    fn tile(depth: usize) -> BoundDirective {
        let sizes = (0..depth).map(|_| Expr::int_lit(4, Span::dummy())).collect();
        BoundDirective {
            directive: Directive::new(
                Transform::Tile { sizes, floor_ids: vec![], tile_ids: vec![] },
                vec![],
                Span::dummy(),
            ),
            params: TransformParams::Tile { sizes: vec![4; depth] },
        }
    }

    fn reverse() -> BoundDirective {
        BoundDirective {
            directive: Directive::new(Transform::Reverse { reversed_id: None }, vec![], Span::dummy()),
            params: TransformParams::Reverse,
        }
    }

    /// A chain of `depth` perfectly nested source loops.
    fn nest(graph: &mut LoopGraph, depth: usize) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut parent = None;
        for i in 0..depth {
            let node = graph.add_source(LoopId(i as u32), Span::dummy(), parent);
            ids.push(node);
            parent = Some(node);
        }
        ids
    }

    #[test]
    fn test_perfect_nest() {
        let mut graph = LoopGraph::new();
        let ids = nest(&mut graph, 3);
        assert_eq!(graph.perfect_nest(ids[0], 3), Some(ids.clone()));
        assert_eq!(graph.perfect_nest(ids[0], 4), None);
        graph.add_source(LoopId(9), Span::dummy(), Some(ids[0]));
        assert_eq!(graph.perfect_nest(ids[0], 2), None);
        assert_eq!(graph.perfect_nest(ids[0], 1), Some(vec![ids[0]]));
    }

    #[test]
    fn test_tile_outputs_form_nest() {
        let mut graph = LoopGraph::new();
        let ids = nest(&mut graph, 3);
        let app = graph.apply(tile(2), ids[..2].to_vec(), vec![], vec![]);
        let outputs = graph.application(app).outputs.clone();
        assert_eq!(outputs.len(), 4);
        assert_eq!(graph.perfect_nest(outputs[0], 4), Some(outputs.clone()));
        // the untouched third loop now sits under the innermost tile loop
        assert_eq!(graph.node(outputs[3]).children, vec![ids[2]]);
        assert_eq!(graph.node(ids[0]).consumed_by, Some(Consumer::Root(app)));
        assert_eq!(graph.node(ids[1]).consumed_by, Some(Consumer::Member(app)));
        assert_eq!(graph.node(outputs[2]).origin, NodeOrigin::Followup { application: app, slot: FollowupSlot::nested(FollowupRole::Tile, 0) });
    }

    #[test]
    fn test_rollback() {
        let mut graph = LoopGraph::new();
        let ids = nest(&mut graph, 1);
        let cp = graph.checkpoint();
        let first = graph.apply(reverse(), vec![ids[0]], vec![], vec![]);
        let out = graph.application(first).outputs[0];
        graph.apply(reverse(), vec![out], vec![], vec![]);
        assert!(graph.is_consumed(ids[0]));
        graph.rollback(cp);
        assert!(!graph.is_consumed(ids[0]));
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.applications.is_empty());
    }
}
