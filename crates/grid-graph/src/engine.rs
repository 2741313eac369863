use std::collections::{HashMap, HashSet};

use grid_domain::{Edge, StateGuid};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction as PgDirection;

use crate::error::GraphError;

/// Direction for [`DepGraph::topological_layers`]: `Upstream` walks toward
/// producers (the root's own dependencies), `Downstream` walks toward
/// consumers (states that depend on the root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upstream,
    Downstream,
}

/// One longest-path layer: all states at the same distance from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub level: usize,
    pub states: Vec<StateGuid>,
}

/// In-memory DAG built from a snapshot of edges (C5).
///
/// The graph is a multigraph in the sense that two producers may each have
/// an edge into the same consumer and vice versa, but parallel edges on the
/// exact same (from, to) pair never arise because the store enforces the
/// `(from_state, from_output, to_state)` uniqueness invariant before an edge
/// reaches this type — `DepGraph` itself does not deduplicate.
pub struct DepGraph {
    graph: DiGraph<StateGuid, ()>,
    index: HashMap<StateGuid, NodeIndex>,
}

impl DepGraph {
    /// Build a graph from every edge currently committed to the store, plus
    /// any states that have no edges at all (so `would_create_cycle` and
    /// friends also work for states with no edges yet).
    pub fn build(edges: &[Edge], all_states: &[StateGuid]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        let mut ensure_node = |graph: &mut DiGraph<StateGuid, ()>,
                                index: &mut HashMap<StateGuid, NodeIndex>,
                                guid: StateGuid| {
            *index.entry(guid).or_insert_with(|| graph.add_node(guid))
        };

        for &guid in all_states {
            ensure_node(&mut graph, &mut index, guid);
        }
        for edge in edges {
            let from = ensure_node(&mut graph, &mut index, edge.from_state);
            let to = ensure_node(&mut graph, &mut index, edge.to_state);
            graph.add_edge(from, to, ());
        }

        DepGraph { graph, index }
    }

    /// Is `from` reachable from `to` in the current committed graph? If so,
    /// inserting a new edge `from -> to` would close a cycle.
    pub fn would_create_cycle(&self, from: StateGuid, to: StateGuid) -> bool {
        let (Some(&from_idx), Some(&to_idx)) = (self.index.get(&from), self.index.get(&to))
        else {
            return false;
        };
        if from_idx == to_idx {
            return true;
        }
        let mut dfs = Dfs::new(&self.graph, to_idx);
        while let Some(visited) = dfs.next(&self.graph) {
            if visited == from_idx {
                return true;
            }
        }
        false
    }

    /// Longest-path topological layering from `root` in the given direction
    /// (§4.5). States unreachable from `root` are excluded. The root is
    /// always layer 0.
    pub fn topological_layers(
        &self,
        root: StateGuid,
        direction: Direction,
    ) -> Result<Vec<Layer>, GraphError> {
        let root_idx = *self
            .index
            .get(&root)
            .ok_or(GraphError::UnknownState(root))?;

        let (movement, predecessor_dir) = match direction {
            Direction::Downstream => (PgDirection::Outgoing, PgDirection::Incoming),
            Direction::Upstream => (PgDirection::Incoming, PgDirection::Outgoing),
        };

        // Reachable set, including the root itself.
        let mut reachable: HashSet<NodeIndex> = HashSet::new();
        reachable.insert(root_idx);
        let mut dfs = Dfs::new(&self.graph, root_idx);
        while let Some(n) = dfs.next_with_dir(&self.graph, movement) {
            reachable.insert(n);
        }

        let forward_topo = petgraph::algo::toposort(&self.graph, None)
            .map_err(|_| GraphError::InconsistentGraph("cycle detected in committed graph".into()))?;

        let order: Vec<NodeIndex> = match direction {
            Direction::Downstream => forward_topo.into_iter().filter(|n| reachable.contains(n)).collect(),
            Direction::Upstream => forward_topo
                .into_iter()
                .rev()
                .filter(|n| reachable.contains(n))
                .collect(),
        };

        let mut dist: HashMap<NodeIndex, usize> = HashMap::new();
        dist.insert(root_idx, 0);

        for node in &order {
            if *node == root_idx {
                continue;
            }
            let mut best: Option<usize> = None;
            for pred in self.graph.neighbors_directed(*node, predecessor_dir) {
                if let Some(&d) = dist.get(&pred) {
                    best = Some(best.map_or(d + 1, |b: usize| b.max(d + 1)));
                }
            }
            if let Some(d) = best {
                dist.insert(*node, d);
            }
        }

        let mut by_level: HashMap<usize, Vec<StateGuid>> = HashMap::new();
        for (idx, level) in &dist {
            by_level.entry(*level).or_default().push(self.graph[*idx]);
        }

        let mut levels: Vec<usize> = by_level.keys().copied().collect();
        levels.sort_unstable();

        Ok(levels
            .into_iter()
            .map(|level| {
                let mut states = by_level.remove(&level).unwrap_or_default();
                states.sort_by_key(|s| s.0);
                Layer { level, states }
            })
            .collect())
    }
}
