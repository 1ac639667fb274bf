//! ---
//! mtwin_section: "03-graph-scheduling"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Connection graph build, validation, and scheduling order."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use tracing::debug;

use crate::graph::DependencyGraph;
use crate::{GraphError, Result};

/// Compute the per-tick evaluation order with Kahn's algorithm.
///
/// Components with equal dependency depth are drained in creation order, so
/// the order is stable across runs of the same snapshot. A cycle leaves
/// nodes with nonzero in-degree; every component still unordered is named
/// in the error.
pub fn compute_order(graph: &DependencyGraph) -> Result<Vec<String>> {
    let petgraph = graph.petgraph();
    let ids: Vec<&str> = graph.component_ids().collect();
    let positions: HashMap<&str, usize> = ids
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position))
        .collect();

    // in-degree per creation index
    let mut in_degree: Vec<usize> = Vec::with_capacity(ids.len());
    for id in &ids {
        let index = graph.node_index(id).expect("node exists for component id");
        in_degree.push(
            petgraph
                .neighbors_directed(index, Direction::Incoming)
                .count(),
        );
    }

    // ready set keyed by creation index; BTreeSet pops the oldest first
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(position, _)| position)
        .collect();

    let mut order = Vec::with_capacity(ids.len());
    while let Some(position) = ready.iter().next().copied() {
        ready.remove(&position);
        let id = ids[position];
        order.push(id.to_owned());

        let index = graph.node_index(id).expect("node exists for component id");
        for successor in petgraph.neighbors_directed(index, Direction::Outgoing) {
            let successor_id = petgraph[successor].as_str();
            let successor_position = positions[successor_id];
            in_degree[successor_position] -= 1;
            if in_degree[successor_position] == 0 {
                ready.insert(successor_position);
            }
        }
    }

    if order.len() != ids.len() {
        let members: Vec<String> = ids
            .iter()
            .enumerate()
            .filter(|(position, _)| in_degree[*position] > 0)
            .map(|(_, id)| (*id).to_owned())
            .collect();
        return Err(GraphError::CycleDetected { members });
    }

    debug!(components = order.len(), "evaluation order computed");
    Ok(order)
}
