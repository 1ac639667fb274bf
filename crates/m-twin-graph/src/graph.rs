//! ---
//! mtwin_section: "03-graph-scheduling"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Connection graph build, validation, and scheduling order."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::collections::HashSet;

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use m_twin_model::{BindingDirection, BindingSpec, ComponentSpec, ConnectionSpec};

use crate::{GraphError, PortDirection, Result};

/// Adjacency view of a model snapshot, derived at session start and never
/// persisted. Nodes are components; edges are connections (source →
/// target). Read bindings contribute no edge: externally fed ports are
/// always "ready".
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: IndexMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build and validate the graph. Invariants enforced here:
    /// every connection endpoint exists and names a declared port, each
    /// input port has at most one writer (connection or read binding, never
    /// both), and write bindings source declared output ports.
    pub fn build(
        components: &[ComponentSpec],
        connections: &[ConnectionSpec],
        bindings: &[BindingSpec],
    ) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes: IndexMap<String, NodeIndex> = IndexMap::new();
        for spec in components {
            if nodes.contains_key(&spec.id) {
                return Err(GraphError::DuplicateComponent {
                    component: spec.id.clone(),
                });
            }
            let index = graph.add_node(spec.id.clone());
            nodes.insert(spec.id.clone(), index);
        }

        let spec_by_id: IndexMap<&str, &ComponentSpec> =
            components.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut fed_inputs: HashSet<(String, String)> = HashSet::new();
        for connection in connections {
            let referrer = format!(
                "connection {}.{} -> {}.{}",
                connection.source_component,
                connection.source_port,
                connection.target_component,
                connection.target_port
            );
            let source = lookup(&spec_by_id, &connection.source_component, referrer.clone())?;
            let target = lookup(&spec_by_id, &connection.target_component, referrer)?;
            ensure_port(
                source,
                &connection.source_port,
                PortDirection::Output,
            )?;
            ensure_port(target, &connection.target_port, PortDirection::Input)?;

            let key = (
                connection.target_component.clone(),
                connection.target_port.clone(),
            );
            if !fed_inputs.insert(key) {
                return Err(GraphError::DuplicateInputWriter {
                    component: connection.target_component.clone(),
                    port: connection.target_port.clone(),
                });
            }

            let from = nodes[&connection.source_component];
            let to = nodes[&connection.target_component];
            // parallel port pairs between the same components collapse to
            // one ordering edge
            graph.update_edge(from, to, ());
        }

        let mut bound_ports: HashSet<(String, String)> = HashSet::new();
        for binding in bindings {
            let referrer = format!("binding for tag '{}'", binding.address);
            let component = lookup(&spec_by_id, &binding.component, referrer)?;
            let key = (binding.component.clone(), binding.port.clone());
            if !bound_ports.insert(key) {
                return Err(GraphError::ConflictingBindings {
                    component: binding.component.clone(),
                    port: binding.port.clone(),
                });
            }
            match binding.direction {
                BindingDirection::Read => {
                    ensure_port(component, &binding.port, PortDirection::Input)?;
                    if fed_inputs.contains(&(binding.component.clone(), binding.port.clone())) {
                        return Err(GraphError::BindingShadowsConnection {
                            component: binding.component.clone(),
                            port: binding.port.clone(),
                        });
                    }
                }
                BindingDirection::Write => {
                    ensure_port(component, &binding.port, PortDirection::Output)?;
                }
            }
        }

        debug!(
            components = nodes.len(),
            edges = graph.edge_count(),
            "dependency graph built"
        );
        Ok(Self { graph, nodes })
    }

    /// Component ids in creation order.
    pub fn component_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<String, ()> {
        &self.graph
    }

    pub(crate) fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.nodes.get(id).copied()
    }
}

fn lookup<'a>(
    specs: &IndexMap<&str, &'a ComponentSpec>,
    id: &str,
    referrer: String,
) -> Result<&'a ComponentSpec> {
    specs
        .get(id)
        .copied()
        .ok_or_else(|| GraphError::UnknownComponent {
            component: id.to_owned(),
            referrer,
        })
}

fn ensure_port(spec: &ComponentSpec, port: &str, direction: PortDirection) -> Result<()> {
    let known = match direction {
        PortDirection::Input => spec.input_ports(),
        PortDirection::Output => spec.output_ports(),
    };
    if known.iter().any(|candidate| candidate == port) {
        return Ok(());
    }
    Err(GraphError::UnknownPort {
        component: spec.id.clone(),
        port: port.to_owned(),
        direction,
    })
}
