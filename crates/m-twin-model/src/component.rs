//! ---
//! mtwin_section: "02-model-components"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Component model: kinds, values, snapshots, step functions."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::foreign::ForeignRuntimeHost;
use crate::kinds::KindState;
use crate::snapshot::ComponentSpec;
use crate::value::PortValue;
use crate::{ComponentStepError, Result};

/// Component kinds supported by the simulation core. New kinds require a
/// new variant and a matching state/step arm in `kinds`, not new call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Sensor,
    Heater,
    Actuator,
    Valve,
    ForeignModel,
}

impl ComponentKind {
    /// Returns all component kinds supported by the runtime.
    pub const fn all() -> &'static [ComponentKind] {
        &[
            ComponentKind::Sensor,
            ComponentKind::Heater,
            ComponentKind::Actuator,
            ComponentKind::Valve,
            ComponentKind::ForeignModel,
        ]
    }

    /// Canonical slug used in snapshots and status payloads.
    pub fn slug(self) -> &'static str {
        match self {
            ComponentKind::Sensor => "sensor",
            ComponentKind::Heater => "heater",
            ComponentKind::Actuator => "actuator",
            ComponentKind::Valve => "valve",
            ComponentKind::ForeignModel => "foreign_model",
        }
    }

    /// Input port names fixed by the kind. Foreign models declare their
    /// ports per instance; see [`ComponentSpec::input_ports`].
    pub fn input_ports(self) -> &'static [&'static str] {
        match self {
            ComponentKind::Sensor => &[],
            ComponentKind::Heater => &["command", "ambient"],
            ComponentKind::Actuator | ComponentKind::Valve => &["command"],
            ComponentKind::ForeignModel => &[],
        }
    }

    /// Output port names fixed by the kind.
    pub fn output_ports(self) -> &'static [&'static str] {
        match self {
            ComponentKind::Sensor => &["value"],
            ComponentKind::Heater => &["temperature"],
            ComponentKind::Actuator | ComponentKind::Valve => &["position"],
            ComponentKind::ForeignModel => &[],
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Lifecycle of a component instance within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentLifecycle {
    Uninitialized,
    Initialized,
    Stepping,
    Disposed,
}

impl fmt::Display for ComponentLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentLifecycle::Uninitialized => "uninitialized",
            ComponentLifecycle::Initialized => "initialized",
            ComponentLifecycle::Stepping => "stepping",
            ComponentLifecycle::Disposed => "disposed",
        };
        f.write_str(label)
    }
}

/// Runtime instance of a component: frozen spec, current port values, and
/// kind-specific internal state opaque to the scheduler.
#[derive(Debug)]
pub struct Component {
    spec: ComponentSpec,
    lifecycle: ComponentLifecycle,
    inputs: IndexMap<String, PortValue>,
    outputs: IndexMap<String, PortValue>,
    state: KindState,
}

impl Component {
    /// Instantiate a component from its spec. Foreign models are resolved
    /// through the provided runtime host.
    pub fn from_spec(spec: ComponentSpec, host: &dyn ForeignRuntimeHost) -> Result<Self> {
        let state = KindState::from_spec(&spec, host)?;
        Ok(Self {
            spec,
            lifecycle: ComponentLifecycle::Uninitialized,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            state,
        })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.spec.kind
    }

    pub fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    pub fn lifecycle(&self) -> ComponentLifecycle {
        self.lifecycle
    }

    /// Latest inputs the component observed, for status snapshots.
    pub fn inputs(&self) -> &IndexMap<String, PortValue> {
        &self.inputs
    }

    /// Committed outputs from the last completed tick.
    pub fn outputs(&self) -> &IndexMap<String, PortValue> {
        &self.outputs
    }

    pub fn output(&self, port: &str) -> Option<&PortValue> {
        self.outputs.get(port)
    }

    /// Seed initial outputs so downstream components read a defined value on
    /// the very first tick, and mark the component ready to step.
    pub fn initialize(&mut self) {
        self.outputs = self.state.initial_outputs(&self.spec);
        self.lifecycle = ComponentLifecycle::Initialized;
    }

    /// Advance the component by one tick. `inputs` holds the values gathered
    /// by the scheduler for this tick; outputs are committed on success.
    pub fn step(
        &mut self,
        inputs: IndexMap<String, PortValue>,
        dt: Duration,
    ) -> std::result::Result<(), ComponentStepError> {
        if self.lifecycle != ComponentLifecycle::Initialized {
            return Err(ComponentStepError::NotSteppable {
                component: self.spec.id.clone(),
                state: self.lifecycle.to_string(),
            });
        }
        self.lifecycle = ComponentLifecycle::Stepping;
        let result = self.state.step(&self.spec, &inputs, dt);
        self.lifecycle = ComponentLifecycle::Initialized;
        let outputs = result?;
        self.inputs = inputs;
        self.outputs = outputs;
        Ok(())
    }

    /// Release kind-specific resources. Foreign runtimes are freed here;
    /// the component can no longer step afterwards.
    pub fn dispose(&mut self) {
        if self.lifecycle == ComponentLifecycle::Disposed {
            return;
        }
        self.state.dispose();
        self.lifecycle = ComponentLifecycle::Disposed;
        debug!(component = %self.spec.id, kind = %self.spec.kind, "component disposed");
    }
}
