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
use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use m_twin_common::config::{SessionDefaults, SessionMode};
use m_twin_model::{BindingDirection, BindingSpec, Component, ConnectionSpec};

/// Lifetime state of a simulation session.
///
/// `Stopped` and `Faulted` are both terminal: a faulted session records why
/// it died and a new session must be created to run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Running,
    Paused,
    Stopped,
    Faulted,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Faulted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Running => "running",
            LifecycleState::Paused => "paused",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Faulted => "faulted",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired run state, carried from the manager to the tick loop over a
/// watch channel and observed at tick boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunCommand {
    Run,
    Pause,
    Stop,
}

/// Effective per-session timing and mode settings, frozen at creation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub tick_interval: Duration,
    pub staleness_threshold: Duration,
    pub foreign_step_timeout: Duration,
}

impl SessionConfig {
    pub fn from_defaults(
        defaults: &SessionDefaults,
        mode: SessionMode,
        tick_interval: Option<Duration>,
    ) -> Self {
        Self {
            mode,
            tick_interval: tick_interval.unwrap_or(defaults.tick_interval),
            staleness_threshold: defaults.staleness_threshold,
            foreign_step_timeout: defaults.foreign_step_timeout,
        }
    }
}

/// Mutable heart of a running session, owned exclusively by its tick task.
/// Everything observers see goes through published status snapshots.
pub(crate) struct SessionCore {
    pub id: Uuid,
    pub config: SessionConfig,
    /// Components in creation order; the map key is the component id.
    pub components: IndexMap<String, Component>,
    /// Connections grouped by target component for input gathering.
    pub inbound: HashMap<String, Vec<ConnectionSpec>>,
    /// Read-direction bindings grouped by target component.
    pub read_bindings: HashMap<String, Vec<BindingSpec>>,
    /// Write-direction bindings grouped by source component.
    pub write_bindings: HashMap<String, Vec<BindingSpec>>,
    /// Cached topological evaluation order.
    pub order: Vec<String>,
    /// Count of fully committed ticks.
    pub tick: u64,
}

impl SessionCore {
    pub(crate) fn new(
        id: Uuid,
        config: SessionConfig,
        components: IndexMap<String, Component>,
        connections: &[ConnectionSpec],
        bindings: &[BindingSpec],
        order: Vec<String>,
    ) -> Self {
        let mut inbound: HashMap<String, Vec<ConnectionSpec>> = HashMap::new();
        for connection in connections {
            inbound
                .entry(connection.target_component.clone())
                .or_default()
                .push(connection.clone());
        }
        let mut read_bindings: HashMap<String, Vec<BindingSpec>> = HashMap::new();
        let mut write_bindings: HashMap<String, Vec<BindingSpec>> = HashMap::new();
        for binding in bindings {
            let per_component = match binding.direction {
                BindingDirection::Read => &mut read_bindings,
                BindingDirection::Write => &mut write_bindings,
            };
            per_component
                .entry(binding.component.clone())
                .or_default()
                .push(binding.clone());
        }
        Self {
            id,
            config,
            components,
            inbound,
            read_bindings,
            write_bindings,
            order,
            tick: 0,
        }
    }

    /// Release every component's resources; called once when the session
    /// leaves the running world, on clean stop and on fault alike.
    pub(crate) fn dispose(&mut self) {
        for component in self.components.values_mut() {
            component.dispose();
        }
    }
}
