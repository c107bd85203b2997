use crate::Grid;
use anyhow::{anyhow, Result};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// Groups buses into components connected through closed branches.
///
/// Components are sorted by decreasing size; ties keep the order of the
/// first bus of each component. Bus ids inside a component keep insertion
/// order.
pub fn connected_components(grid: &Grid) -> Result<Vec<Vec<String>>> {
    let graph = grid.graph();
    if graph.node_count() == 0 {
        return Err(anyhow!("grid has no buses"));
    }
    let mut sets = UnionFind::<usize>::new(graph.node_count());
    for edge in graph.edge_references() {
        if edge.weight().is_connected() {
            sets.union(edge.source().index(), edge.target().index());
        }
    }

    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<String>> = Vec::new();
    for node in graph.node_indices() {
        let root = sets.find(node.index());
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(graph[node].id.clone());
    }
    // stable sort keeps first-seen order among equal sizes
    components.sort_by(|a, b| b.len().cmp(&a.len()));
    Ok(components)
}

/// Buses of the main synchronous component (the largest one).
pub fn main_component_buses(grid: &Grid) -> Result<HashSet<String>> {
    let components = connected_components(grid)?;
    Ok(components
        .into_iter()
        .next()
        .map(|buses| buses.into_iter().collect())
        .unwrap_or_default())
}
