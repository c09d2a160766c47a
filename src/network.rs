use std::{cmp::Ordering, collections::BinaryHeap, fmt};

use indexmap::{IndexMap, IndexSet};

use crate::value::format_number;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    pub name: String,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub weight: f64,
    pub directed: bool,
}

impl Edge {
    pub fn connects(&self, from: &str) -> Option<&str> {
        if self.from == from {
            Some(&self.to)
        } else if !self.directed && self.to == from {
            Some(&self.from)
        } else {
            None
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.directed { "->" } else { "--" };
        write!(
            f,
            "({}) {arrow}[{}] ({})",
            self.from,
            format_number(self.weight),
            self.to
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    nodes: IndexSet<String>,
    edges: Vec<Edge>,
}

impl Network {
    /// Builds a network from explicit nodes and edges; edge endpoints are
    /// added as nodes when missing.
    pub fn new(nodes: impl IntoIterator<Item = Node>, edges: Vec<Edge>) -> Self {
        let mut set: IndexSet<String> = nodes.into_iter().map(|node| node.name).collect();
        for edge in &edges {
            set.insert(edge.from.clone());
            set.insert(edge.to.clone());
        }
        Self { nodes: set, edges }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes.iter().map(String::as_str)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains(name)
    }

    pub fn neighbors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.edges
            .iter()
            .filter_map(move |edge| edge.connects(name).map(|next| (next, edge.weight)))
    }

    pub fn degree(&self, name: &str) -> usize {
        self.edges
            .iter()
            .filter(|edge| edge.from == name || edge.to == name)
            .count()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "network of {} nodes and {} edges",
            self.nodes.len(),
            self.edges.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathEntry {
    pub weight: f64,
    pub path: Vec<String>,
}

/// Shortest-path back end consumed by `paths!`.
pub trait PathFinder {
    /// Paths from `start` to every reachable node, or `None` when `start`
    /// is not in the network.
    fn shortest_paths(&self, network: &Network, start: &str) -> Option<IndexMap<String, PathEntry>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dijkstra;

#[derive(Debug, PartialEq)]
struct Frontier {
    cost: f64,
    node: usize,
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PathFinder for Dijkstra {
    fn shortest_paths(&self, network: &Network, start: &str) -> Option<IndexMap<String, PathEntry>> {
        let origin = network.nodes.get_index_of(start)?;
        let count = network.nodes.len();
        let mut dist = vec![f64::INFINITY; count];
        let mut prev: Vec<Option<usize>> = vec![None; count];
        let mut heap = BinaryHeap::new();
        dist[origin] = 0.0;
        heap.push(Frontier {
            cost: 0.0,
            node: origin,
        });
        while let Some(Frontier { cost, node }) = heap.pop() {
            if cost > dist[node] {
                continue;
            }
            let name = &network.nodes[node];
            for (next, weight) in network.neighbors(name) {
                let Some(index) = network.nodes.get_index_of(next) else {
                    continue;
                };
                let candidate = cost + weight;
                if candidate < dist[index] {
                    dist[index] = candidate;
                    prev[index] = Some(node);
                    heap.push(Frontier {
                        cost: candidate,
                        node: index,
                    });
                }
            }
        }
        let mut paths = IndexMap::new();
        for (index, name) in network.nodes.iter().enumerate() {
            if !dist[index].is_finite() {
                continue;
            }
            let mut path = vec![name.clone()];
            let mut cursor = prev[index];
            while let Some(step) = cursor {
                path.push(network.nodes[step].clone());
                cursor = prev[step];
            }
            path.reverse();
            paths.insert(
                name.clone(),
                PathEntry {
                    weight: dist[index],
                    path,
                },
            );
        }
        Some(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, weight: f64) -> Edge {
        Edge {
            from: from.into(),
            to: to.into(),
            weight,
            directed: false,
        }
    }

    #[test]
    fn dijkstra_prefers_cheaper_detour() {
        let network = Network::new(
            Vec::new(),
            vec![edge("A", "B", 5.0), edge("A", "C", 1.0), edge("C", "B", 1.0)],
        );
        let paths = Dijkstra.shortest_paths(&network, "A").expect("A exists");
        let to_b = &paths["B"];
        assert_eq!(to_b.weight, 2.0);
        assert_eq!(to_b.path, vec!["A", "C", "B"]);
    }

    #[test]
    fn unreachable_nodes_are_omitted() {
        let network = Network::new(vec![Node::new("Z")], vec![edge("A", "B", 1.0)]);
        let paths = Dijkstra.shortest_paths(&network, "A").expect("A exists");
        assert!(!paths.contains_key("Z"));
        assert!(Dijkstra.shortest_paths(&network, "Q").is_none());
    }

    #[test]
    fn directed_edges_are_one_way() {
        let mut e = edge("A", "B", 1.0);
        e.directed = true;
        let network = Network::new(Vec::new(), vec![e]);
        assert_eq!(network.neighbors("B").count(), 0);
        assert_eq!(network.degree("B"), 1);
    }
}
