//! Kahn's-algorithm topological ordering.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use flowsmith_types::Graph;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopoOrder {
    pub order: Vec<String>,
    /// `true` when some nodes never reached in-degree zero.
    pub has_cycle: bool,
}

impl TopoOrder {
    /// Node ids left out of `order`, in declaration order.
    pub fn unsorted(&self, graph: &Graph) -> Vec<String> {
        graph
            .nodes
            .iter()
            .filter(|n| !self.order.contains(&n.id))
            .map(|n| n.id.clone())
            .collect()
    }
}

/// Order node ids so every edge points forward.
///
/// The ready queue is seeded in node declaration order and successors are
/// enqueued in edge order, so the result is deterministic for a given graph.
/// Edges naming unknown nodes are skipped, and a repeated node id is
/// ordered once.
pub fn topological_sort(graph: &Graph) -> TopoOrder {
    let mut in_degree: HashMap<&str, usize> =
        graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in &graph.edges {
        let (source, target) = (edge.source.as_str(), edge.target.as_str());
        if !in_degree.contains_key(source) {
            continue;
        }
        let Some(degree) = in_degree.get_mut(target) else {
            continue;
        };
        *degree += 1;
        successors.entry(source).or_default().push(target);
    }

    let mut seeded = HashSet::with_capacity(in_degree.len());
    let mut queue: VecDeque<&str> = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0 && seeded.insert(*id))
        .collect();
    let mut order = Vec::with_capacity(graph.nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for &next in successors.get(id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    let has_cycle = order.len() != in_degree.len();
    if has_cycle {
        tracing::debug!(sorted = order.len(), total = in_degree.len(), "Topological sort incomplete");
    }
    TopoOrder { order, has_cycle }
}
