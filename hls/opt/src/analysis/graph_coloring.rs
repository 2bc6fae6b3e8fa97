use itertools::Itertools;
use petgraph::graph::{NodeIndex, UnGraph};
use std::{collections::HashMap, fmt, hash::Hash};

/// Conflict graph whose nodes can be greedily colored so that no two
/// conflicting nodes share a color.
pub struct GraphColoring<T: Eq + Hash> {
    graph: UnGraph<T, ()>,
    index_map: HashMap<T, NodeIndex>,
}

impl<T: Eq + Hash> Default for GraphColoring<T> {
    fn default() -> Self {
        GraphColoring {
            graph: UnGraph::new_undirected(),
            index_map: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> GraphColoring<T> {
    pub fn add_node(&mut self, item: T) -> NodeIndex {
        if let Some(node) = self.index_map.get(&item) {
            return *node;
        }
        let node = self.graph.add_node(item.clone());
        self.index_map.insert(item, node);
        node
    }

    pub fn insert_conflict(&mut self, a: T, b: T) {
        let a_node = self.add_node(a.clone());
        if a == b {
            return;
        }
        let b_node = self.add_node(b);
        self.graph.update_edge(a_node, b_node, ());
    }

    pub fn has_conflict(&self, a: &T, b: &T) -> bool {
        match (self.index_map.get(a), self.index_map.get(b)) {
            (Some(x), Some(y)) => self.graph.contains_edge(*x, *y),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Visits the nodes in `ordering` and gives each the smallest color not
    /// used by an already colored neighbor. Colors are numbered from zero.
    /// Nodes missing from `ordering` stay uncolored.
    pub fn color_greedy_with(
        &self,
        ordering: impl Iterator<Item = T>,
    ) -> HashMap<T, usize> {
        let mut coloring: HashMap<T, usize> = HashMap::new();
        for item in ordering {
            let Some(node) = self.index_map.get(&item) else {
                continue;
            };
            let taken: Vec<usize> = self
                .graph
                .neighbors(*node)
                .filter_map(|nbr| coloring.get(&self.graph[nbr]).copied())
                .sorted()
                .dedup()
                .collect();
            let color = taken
                .iter()
                .enumerate()
                .find(|(i, c)| i != *c)
                .map_or(taken.len(), |(i, _)| i);
            coloring.insert(item, color);
        }
        coloring
    }
}

impl<T: Eq + Hash + fmt::Display> fmt::Display for GraphColoring<T> {
    /// Graphviz rendering of the conflict graph.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {{")?;
        for node in self.graph.node_indices() {
            writeln!(f, "  {};", self.graph[node])?;
        }
        for (a, b) in self
            .graph
            .edge_indices()
            .filter_map(|idx| self.graph.edge_endpoints(idx))
        {
            writeln!(f, "  {} -- {};", self.graph[a], self.graph[b])?;
        }
        write!(f, "}}")
    }
}
