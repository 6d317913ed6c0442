//! Hierarchy builder.
//!
//! Turns a flat, parent-referencing source set into a forest annotated with
//! depth-derived roles, plus a topological order in which every parent
//! precedes its children.
//!
//! Parent links form a petgraph [`DiGraph`] with edges pointing from parent
//! to child. Parents outside the input set make their children roots.
//! Cycles are the strongly connected components of that graph; each is
//! broken by demoting one member to a root, and the demoted node is flagged
//! so the report can surface it. The final order is a depth-first walk of
//! the repaired forest. Both passes are iterative, so deep or malformed
//! hierarchies cannot overflow the stack.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::Serialize;
use tracing::warn;

use crate::model::{Role, SourceEntity};

/// Parent → child links; node `i` is input entity `i`.
type ParentGraph<'a> = DiGraph<&'a str, ()>;

/// How depth maps to roles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyShape {
    /// Depth 0 → root container; deeper nodes with children → sub-container;
    /// childless deeper nodes → leaf.
    #[default]
    Nested,
    /// Root containers and leaves only: depth 0 or having children → root
    /// container, everything else → leaf attached to its direct parent.
    TwoLevel,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyOptions {
    pub shape: HierarchyShape,
    /// Depth assigned to source roots. Non-zero when the target supplies a
    /// fixed outer container (a single configured book).
    pub base_depth: usize,
}

/// A source entity annotated with its position in the target hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyNode {
    /// Position of the entity in the input slice.
    pub index: usize,
    pub external_id: String,
    /// Effective parent: in scope, not a cycle edge.
    pub parent: Option<String>,
    pub depth: usize,
    pub role: Role,
    pub has_children: bool,
    /// The node's parent link closed a cycle and was dropped.
    pub cycle_detected: bool,
}

/// A parent-graph cycle found while building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    /// Members in parent-link order, starting from the demoted node.
    pub members: Vec<String>,
    /// The member turned into a root.
    pub demoted: String,
}

/// Built hierarchy: nodes in topological order.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    nodes: Vec<HierarchyNode>,
    positions: HashMap<String, usize>,
    cycles: Vec<Cycle>,
}

impl Hierarchy {
    /// Nodes, parents strictly before children.
    #[must_use]
    pub fn nodes(&self) -> &[HierarchyNode] {
        &self.nodes
    }

    #[must_use]
    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<&HierarchyNode> {
        self.positions.get(external_id).map(|&pos| &self.nodes[pos])
    }

    /// Position of a node in the topological order.
    #[must_use]
    pub fn position(&self, external_id: &str) -> Option<usize> {
        self.positions.get(external_id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Build the hierarchy for one scope.
///
/// Entities are expected to have unique external ids; if an id repeats, the
/// first occurrence is the one other entities attach to.
#[must_use]
pub fn build(entities: &[SourceEntity], options: HierarchyOptions) -> Hierarchy {
    let mut by_id: HashMap<&str, usize> = HashMap::with_capacity(entities.len());
    for (idx, entity) in entities.iter().enumerate() {
        by_id.entry(entity.external_id.as_str()).or_insert(idx);
    }

    let mut parent: Vec<Option<usize>> = entities
        .iter()
        .map(|e| e.parent().and_then(|p| by_id.get(p).copied()))
        .collect();

    let mut cycle_flag = vec![false; entities.len()];
    let cycles = break_cycles(entities, &link_graph(entities, &parent), &mut parent, &mut cycle_flag);

    // Acyclic now; edges were added in child input order, so the walk
    // visits siblings in input order too.
    let forest = link_graph(entities, &parent);
    let mut depth = vec![0usize; entities.len()];
    let mut order = Vec::with_capacity(entities.len());
    let mut dfs = Dfs::empty(&forest);
    for root in (0..entities.len()).filter(|&idx| parent[idx].is_none()) {
        dfs.move_to(NodeIndex::new(root));
        while let Some(node) = dfs.next(&forest) {
            let idx = node.index();
            depth[idx] = parent[idx].map_or(options.base_depth, |p| depth[p] + 1);
            order.push(idx);
        }
    }

    let mut nodes = Vec::with_capacity(order.len());
    let mut positions = HashMap::with_capacity(order.len());
    for idx in order {
        let has_children = forest.neighbors(NodeIndex::new(idx)).next().is_some();
        let role = role_for(options.shape, depth[idx], has_children);
        positions.insert(entities[idx].external_id.clone(), nodes.len());
        nodes.push(HierarchyNode {
            index: idx,
            external_id: entities[idx].external_id.clone(),
            parent: parent[idx].map(|p| entities[p].external_id.clone()),
            depth: depth[idx],
            role,
            has_children,
            cycle_detected: cycle_flag[idx],
        });
    }

    Hierarchy {
        nodes,
        positions,
        cycles,
    }
}

fn link_graph<'a>(entities: &'a [SourceEntity], parent: &[Option<usize>]) -> ParentGraph<'a> {
    let mut graph = DiGraph::with_capacity(entities.len(), entities.len());
    for entity in entities {
        graph.add_node(entity.external_id.as_str());
    }
    for (child, p) in parent.iter().enumerate() {
        if let Some(p) = *p {
            graph.add_edge(NodeIndex::new(p), NodeIndex::new(child), ());
        }
    }
    graph
}

/// Role for a node; never `LeafItem` when the node has children.
#[must_use]
pub const fn role_for(shape: HierarchyShape, depth: usize, has_children: bool) -> Role {
    match shape {
        HierarchyShape::Nested => {
            if depth == 0 {
                Role::RootContainer
            } else if has_children {
                Role::SubContainer
            } else {
                Role::LeafItem
            }
        }
        HierarchyShape::TwoLevel => {
            if depth == 0 || has_children {
                Role::RootContainer
            } else {
                Role::LeafItem
            }
        }
    }
}

/// Demote the earliest input member of every cycle in `links`.
///
/// Each node has at most one parent, so a cycle is a strongly connected
/// component with more than one node, or a single node linked to itself.
/// Cycles are reported in order of their demoted member.
fn break_cycles(
    entities: &[SourceEntity],
    links: &ParentGraph<'_>,
    parent: &mut [Option<usize>],
    flagged: &mut [bool],
) -> Vec<Cycle> {
    let mut found: Vec<(usize, usize)> = tarjan_scc(links)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|&n| links.contains_edge(n, n)))
        .filter_map(|scc| scc.iter().map(|n| n.index()).min().map(|victim| (victim, scc.len())))
        .collect();
    found.sort_unstable();

    let mut cycles = Vec::with_capacity(found.len());
    for (victim, size) in found {
        let mut members = Vec::with_capacity(size);
        let mut node = victim;
        for _ in 0..size {
            members.push(entities[node].external_id.clone());
            match parent[node] {
                Some(next) => node = next,
                None => break,
            }
        }
        parent[victim] = None;
        flagged[victim] = true;

        warn!(
            demoted = %entities[victim].external_id,
            members = ?members,
            "Parent cycle detected; treating entity as a root"
        );
        cycles.push(Cycle {
            members,
            demoted: entities[victim].external_id.clone(),
        });
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, parent: Option<&str>) -> SourceEntity {
        let e = SourceEntity::new(id, id, "Page");
        match parent {
            Some(p) => e.with_parent(p),
            None => e,
        }
    }

    fn ids(h: &Hierarchy) -> Vec<&str> {
        h.nodes().iter().map(|n| n.external_id.as_str()).collect()
    }

    fn nested() -> HierarchyOptions {
        HierarchyOptions::default()
    }

    #[test]
    fn test_roles_nested() {
        let entities = vec![
            entity("space-home", None),
            entity("guide", Some("space-home")),
            entity("install", Some("guide")),
            entity("faq", Some("space-home")),
        ];
        let h = build(&entities, nested());
        assert_eq!(h.get("space-home").unwrap().role, Role::RootContainer);
        assert_eq!(h.get("guide").unwrap().role, Role::SubContainer);
        assert_eq!(h.get("install").unwrap().role, Role::LeafItem);
        assert_eq!(h.get("faq").unwrap().role, Role::LeafItem);
        assert_eq!(h.get("install").unwrap().depth, 2);
    }

    #[test]
    fn test_roles_two_level() {
        let entities = vec![
            entity("E1", None),
            entity("S1", Some("E1")),
            entity("T1", Some("S1")),
            entity("T2", Some("E1")),
        ];
        let h = build(
            &entities,
            HierarchyOptions {
                shape: HierarchyShape::TwoLevel,
                base_depth: 0,
            },
        );
        assert_eq!(h.get("E1").unwrap().role, Role::RootContainer);
        // Has a child, so it cannot be a leaf.
        assert_eq!(h.get("S1").unwrap().role, Role::RootContainer);
        assert_eq!(h.get("T1").unwrap().role, Role::LeafItem);
        assert_eq!(h.get("T1").unwrap().parent.as_deref(), Some("S1"));
        assert!(h.nodes().iter().all(|n| n.role != Role::SubContainer));
    }

    #[test]
    fn test_base_depth_shifts_roots() {
        let entities = vec![entity("a", None), entity("b", Some("a")), entity("c", None)];
        let h = build(
            &entities,
            HierarchyOptions {
                shape: HierarchyShape::Nested,
                base_depth: 1,
            },
        );
        assert_eq!(h.get("a").unwrap().role, Role::SubContainer);
        assert_eq!(h.get("b").unwrap().role, Role::LeafItem);
        assert_eq!(h.get("c").unwrap().role, Role::LeafItem);
        assert_eq!(h.get("b").unwrap().depth, 2);
    }

    #[test]
    fn test_parent_before_child() {
        // Children listed before their parents in input.
        let entities = vec![
            entity("leaf", Some("mid")),
            entity("mid", Some("top")),
            entity("other", None),
            entity("top", None),
        ];
        let h = build(&entities, nested());
        for node in h.nodes() {
            if let Some(parent) = &node.parent {
                assert!(h.position(parent).unwrap() < h.position(&node.external_id).unwrap());
            }
        }
        assert_eq!(ids(&h), vec!["other", "top", "mid", "leaf"]);
    }

    #[test]
    fn test_out_of_scope_parent_is_root() {
        let entities = vec![entity("child", Some("missing"))];
        let h = build(&entities, nested());
        let node = h.get("child").unwrap();
        assert_eq!(node.parent, None);
        assert_eq!(node.depth, 0);
        assert!(!node.cycle_detected);
    }

    #[test]
    fn test_two_node_cycle_terminates() {
        let entities = vec![entity("A", Some("B")), entity("B", Some("A"))];
        let h = build(&entities, nested());
        assert_eq!(h.len(), 2);
        assert_eq!(h.cycles().len(), 1);
        let a = h.get("A").unwrap();
        assert!(a.cycle_detected);
        assert_eq!(a.parent, None);
        assert_eq!(h.get("B").unwrap().parent.as_deref(), Some("A"));
        assert_eq!(ids(&h), vec!["A", "B"]);
    }

    #[test]
    fn test_self_parent_is_cycle() {
        let entities = vec![entity("A", Some("A"))];
        let h = build(&entities, nested());
        assert!(h.get("A").unwrap().cycle_detected);
        assert_eq!(h.cycles()[0].members, vec!["A".to_string()]);
    }

    #[test]
    fn test_cycle_with_tail() {
        // D hangs off a three-node cycle B → C → E → B.
        let entities = vec![
            entity("D", Some("B")),
            entity("B", Some("C")),
            entity("C", Some("E")),
            entity("E", Some("B")),
        ];
        let h = build(&entities, nested());
        assert_eq!(h.cycles().len(), 1);
        assert_eq!(h.cycles()[0].demoted, "B");
        assert_eq!(h.cycles()[0].members, vec!["B", "C", "E"]);
        assert_eq!(h.len(), 4);
        assert_eq!(ids(&h), vec!["B", "D", "E", "C"]);
        assert!(!h.get("D").unwrap().cycle_detected);
    }

    #[test]
    fn test_separate_cycles_each_demote_one_member() {
        let entities = vec![
            entity("X", Some("Y")),
            entity("Y", Some("X")),
            entity("P", Some("Q")),
            entity("Q", Some("P")),
            entity("R", Some("P")),
        ];
        let h = build(&entities, nested());
        let demoted: Vec<&str> = h.cycles().iter().map(|c| c.demoted.as_str()).collect();
        assert_eq!(demoted, vec!["X", "P"]);
        assert_eq!(h.cycles()[1].members, vec!["P", "Q"]);
        assert_eq!(ids(&h), vec!["X", "Y", "P", "Q", "R"]);
        assert_eq!(h.get("R").unwrap().depth, 1);
        assert!(!h.get("R").unwrap().cycle_detected);
        assert!(!h.get("Q").unwrap().cycle_detected);
    }

    #[test]
    fn test_deep_chain_is_iterative() {
        let mut entities = vec![entity("n0", None)];
        for i in 1..20_000 {
            entities.push(entity(&format!("n{i}"), Some(&format!("n{}", i - 1))));
        }
        let h = build(&entities, nested());
        assert_eq!(h.len(), 20_000);
        assert_eq!(h.get("n19999").unwrap().depth, 19_999);
    }

    #[test]
    fn test_role_monotonicity() {
        let entities = vec![
            entity("r", None),
            entity("a", Some("r")),
            entity("b", Some("a")),
            entity("c", Some("b")),
            entity("d", Some("r")),
        ];
        for shape in [HierarchyShape::Nested, HierarchyShape::TwoLevel] {
            let h = build(&entities, HierarchyOptions { shape, base_depth: 0 });
            for node in h.nodes() {
                if node.has_children {
                    assert_ne!(node.role, Role::LeafItem, "{}", node.external_id);
                }
            }
        }
    }
}
