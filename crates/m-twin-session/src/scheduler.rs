//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Session lifecycle, tick scheduling, and status surface."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::trace;

use m_twin_bridge::CommunicationBridge;
use m_twin_model::{ComponentKind, ComponentStepError, PortValue};

use crate::session::SessionCore;
use crate::status::BindingStatus;

/// Advance every component exactly once, in the cached topological order.
///
/// Cross-component reads observe the outputs committed by the *previous*
/// tick: all outputs are snapshotted before the first step, so the
/// topological tie-break affects only a component's own input freshness,
/// never what downstream consumers see. The tick counter advances only
/// after the last component has stepped and pushed its write bindings; on
/// any step error the whole tick is discarded and the caller faults the
/// session.
pub(crate) fn run_tick(
    core: &mut SessionCore,
    bridge: Option<&dyn CommunicationBridge>,
) -> std::result::Result<Vec<BindingStatus>, ComponentStepError> {
    let dt = core.config.tick_interval;

    // outputs committed by the previous tick, visible to every component
    let mut committed: HashMap<(String, String), PortValue> = HashMap::new();
    for (id, component) in &core.components {
        for (port, value) in component.outputs() {
            committed.insert((id.clone(), port.clone()), value.clone());
        }
    }

    let order = core.order.clone();
    let mut binding_states = Vec::new();
    for id in &order {
        // (a) gather inputs: connections first, then external reads
        let mut inputs: IndexMap<String, PortValue> = IndexMap::new();
        if let Some(connections) = core.inbound.get(id) {
            for connection in connections {
                let key = (
                    connection.source_component.clone(),
                    connection.source_port.clone(),
                );
                if let Some(value) = committed.get(&key) {
                    inputs.insert(connection.target_port.clone(), value.clone());
                }
            }
        }
        if let Some(bridge) = bridge {
            if let Some(bindings) = core.read_bindings.get(id) {
                for binding in bindings {
                    let reading = bridge.read_cache(&binding.address);
                    // the session's own threshold applies on top of
                    // whatever the bridge considers stale
                    let stale = reading.stale
                        || reading
                            .age
                            .map(|age| age > core.config.staleness_threshold)
                            .unwrap_or(true);
                    binding_states.push(BindingStatus {
                        tag: binding.address.clone(),
                        component: binding.component.clone(),
                        port: binding.port.clone(),
                        direction: binding.direction,
                        stale,
                        age_ms: reading.age.map(|age| age.as_millis() as u64),
                    });
                    // the last known value is served even when stale
                    if let Some(value) = reading.value {
                        inputs.insert(binding.port.clone(), value);
                    }
                }
            }
        }

        // (b) + (c) step and commit
        let component = core
            .components
            .get_mut(id)
            .expect("ordered component exists in the session core");
        let bounded = component.kind() == ComponentKind::ForeignModel;
        let started = Instant::now();
        component.step(inputs, dt)?;
        if bounded {
            let elapsed = started.elapsed();
            if elapsed > core.config.foreign_step_timeout {
                return Err(ComponentStepError::Timeout {
                    component: id.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    limit_ms: core.config.foreign_step_timeout.as_millis() as u64,
                });
            }
        }

        // (d) hand write-bound outputs to the bridge
        if let Some(bridge) = bridge {
            if let Some(bindings) = core.write_bindings.get(id) {
                for binding in bindings {
                    if let Some(value) = component.output(&binding.port) {
                        bridge.write_value(&binding.address, value.clone());
                    }
                    binding_states.push(BindingStatus {
                        tag: binding.address.clone(),
                        component: binding.component.clone(),
                        port: binding.port.clone(),
                        direction: binding.direction,
                        stale: false,
                        age_ms: None,
                    });
                }
            }
        }
    }

    core.tick += 1;
    trace!(session = %core.id, tick = core.tick, "tick committed");
    Ok(binding_states)
}
