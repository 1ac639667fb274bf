//! ---
//! mtwin_section: "02-model-components"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Component model: kinds, values, snapshots, step functions."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
//! Foreign-model runtime seam. The internals of the external model format
//! (FMU or otherwise) live behind [`ForeignRuntime`]; the session supplies a
//! [`ForeignRuntimeHost`] that resolves component specs to runtime
//! instances. The core remains testable against scripted fakes.

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;

use crate::snapshot::ComponentSpec;
use crate::value::PortValue;
use crate::{ModelError, Result};

/// Failure reported by an external model runtime while advancing.
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct ForeignRuntimeError {
    detail: String,
}

impl ForeignRuntimeError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// One instantiated external model. Inputs and outputs are keyed by the
/// runtime's own variable names; port mapping happens in the caller.
pub trait ForeignRuntime: Send + fmt::Debug {
    /// Advance the model by `dt`, returning its output variables.
    fn advance(
        &mut self,
        inputs: &IndexMap<String, PortValue>,
        dt: Duration,
    ) -> std::result::Result<IndexMap<String, PortValue>, ForeignRuntimeError>;

    /// Release the runtime's resources. Called exactly once on session stop
    /// or fault; `advance` is never called afterwards.
    fn dispose(&mut self);
}

/// Resolves a foreign-model component spec to a runtime instance at session
/// creation.
pub trait ForeignRuntimeHost: Send + Sync {
    fn instantiate(&self, spec: &ComponentSpec) -> Result<Box<dyn ForeignRuntime>>;
}

/// Default host for deployments without an external model runtime: any
/// foreign-model component is a configuration-time failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForeignRuntimes;

impl ForeignRuntimeHost for NoForeignRuntimes {
    fn instantiate(&self, spec: &ComponentSpec) -> Result<Box<dyn ForeignRuntime>> {
        Err(ModelError::ForeignRuntimeUnavailable {
            component: spec.id.clone(),
            detail: "no foreign runtime host configured".to_owned(),
        })
    }
}
