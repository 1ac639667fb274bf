//! ---
//! mtwin_section: "02-model-components"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Component model: kinds, values, snapshots, step functions."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
//! Component model for the M-TWIN simulation runtime.
//!
//! A model is a set of typed components connected by named ports. Each kind
//! carries its own state variant and a pure step function
//! `(inputs, properties, state, dt) -> (outputs, state)`; the scheduler in
//! `m-twin-session` dispatches through a single match per tick.

pub mod component;
pub mod foreign;
pub mod kinds;
pub mod snapshot;
pub mod value;

/// Shared result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while loading a model snapshot or instantiating components.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Raised when a model snapshot file cannot be read.
    #[error("unable to read model snapshot {path}: {source}")]
    SnapshotIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Raised when a model snapshot fails to deserialize.
    #[error("failed to parse model snapshot {path}: {source}")]
    SnapshotParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// Raised when a component property is missing or has the wrong shape.
    #[error("component '{component}' property '{property}': {detail}")]
    InvalidProperty {
        component: String,
        property: String,
        detail: String,
    },
    /// Raised when a foreign-model component has no runtime host to load it.
    #[error("component '{component}' requires a foreign runtime host: {detail}")]
    ForeignRuntimeUnavailable { component: String, detail: String },
}

/// Errors raised while advancing a component within a tick. Any of these
/// aborts the in-progress tick and faults the owning session.
#[derive(Debug, thiserror::Error)]
pub enum ComponentStepError {
    /// A foreign runtime failed to advance.
    #[error("component '{component}' foreign runtime fault: {detail}")]
    ForeignRuntime { component: String, detail: String },
    /// A step ran past the configured bound. The step itself is not
    /// preemptible; the overrun is detected after it returns.
    #[error("component '{component}' step took {elapsed_ms} ms, exceeding the {limit_ms} ms bound")]
    Timeout {
        component: String,
        elapsed_ms: u64,
        limit_ms: u64,
    },
    /// The component is not in a steppable lifecycle state.
    #[error("component '{component}' cannot step while {state}")]
    NotSteppable { component: String, state: String },
}

pub use component::{Component, ComponentKind, ComponentLifecycle};
pub use foreign::{ForeignRuntime, ForeignRuntimeError, ForeignRuntimeHost, NoForeignRuntimes};
pub use snapshot::{BindingDirection, BindingSpec, ComponentSpec, ConnectionSpec, ModelSnapshot};
pub use value::PortValue;
