//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Session lifecycle, tick scheduling, and status surface."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use m_twin_common::config::SessionMode;
use m_twin_model::{
    BindingDirection, BindingSpec, Component, ComponentKind, ComponentLifecycle, ModelSnapshot,
    PortValue,
};

use crate::session::LifecycleState;

/// Immutable status snapshot published by a session after every committed
/// tick. Observers only ever see whole ticks.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub lifecycle: LifecycleState,
    pub mode: SessionMode,
    /// Set while HIL endpoints are unreachable; the session keeps ticking
    /// with externally fed inputs flagged stale.
    pub degraded: bool,
    /// Last fully committed tick.
    pub tick: u64,
    pub tick_interval_ms: u64,
    /// Wall-clock time the loop is behind (positive) or ahead of the tick
    /// counter's accounting. Only meaningful while running in HIL mode.
    pub drift_ms: i64,
    pub started_at: Option<DateTime<Utc>>,
    /// Fault detail when `lifecycle` is `faulted`.
    pub error: Option<String>,
    pub components: Vec<ComponentStatus>,
    pub bindings: Vec<BindingStatus>,
}

impl SessionStatus {
    /// Status of a freshly created session: declared components, no port
    /// traffic yet.
    pub(crate) fn created(
        session_id: Uuid,
        mode: SessionMode,
        tick_interval_ms: u64,
        snapshot: &ModelSnapshot,
    ) -> Self {
        let components = snapshot
            .components
            .iter()
            .map(|spec| ComponentStatus {
                id: spec.id.clone(),
                name: spec.name.clone(),
                kind: spec.kind,
                lifecycle: ComponentLifecycle::Uninitialized,
                inputs: IndexMap::new(),
                outputs: IndexMap::new(),
            })
            .collect();
        let bindings = snapshot
            .bindings
            .iter()
            .map(BindingStatus::declared)
            .collect();
        Self {
            session_id,
            lifecycle: LifecycleState::Created,
            mode,
            degraded: false,
            tick: 0,
            tick_interval_ms,
            drift_ms: 0,
            started_at: None,
            error: None,
            components,
            bindings,
        }
    }
}

/// Per-component port snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub id: String,
    pub name: String,
    pub kind: ComponentKind,
    pub lifecycle: ComponentLifecycle,
    pub inputs: IndexMap<String, PortValue>,
    pub outputs: IndexMap<String, PortValue>,
}

impl ComponentStatus {
    pub(crate) fn of(component: &Component) -> Self {
        Self {
            id: component.id().to_owned(),
            name: component.name().to_owned(),
            kind: component.kind(),
            lifecycle: component.lifecycle(),
            inputs: component.inputs().clone(),
            outputs: component.outputs().clone(),
        }
    }
}

/// Per-binding freshness as observed during the last committed tick.
#[derive(Debug, Clone, Serialize)]
pub struct BindingStatus {
    pub tag: String,
    pub component: String,
    pub port: String,
    pub direction: BindingDirection,
    /// Stale is not an error: the consuming component still received the
    /// last known value. Downstream consumers decide their own tolerance.
    pub stale: bool,
    pub age_ms: Option<u64>,
}

impl BindingStatus {
    pub(crate) fn declared(binding: &BindingSpec) -> Self {
        Self {
            tag: binding.address.clone(),
            component: binding.component.clone(),
            port: binding.port.clone(),
            direction: binding.direction,
            stale: binding.direction == BindingDirection::Read,
            age_ms: None,
        }
    }
}
