//! ---
//! mtwin_section: "02-model-components"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Component model: kinds, values, snapshots, step functions."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::ComponentKind;
use crate::{ModelError, Result};

fn default_protocol() -> String {
    "opcua".to_owned()
}

/// Read-only description of a machine model, loaded once at session
/// creation. Later edits to the underlying definition never affect a
/// running session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
}

impl ModelSnapshot {
    /// Load a snapshot from a JSON document on disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ModelError::SnapshotIo {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ModelError::SnapshotParse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse a snapshot from an in-memory JSON document.
    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|source| ModelError::SnapshotParse {
            path: "<inline>".to_owned(),
            source,
        })
    }

    pub fn component(&self, id: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.id == id)
    }
}

/// Declared component: identity, kind, and an immutable property bag.
/// Creation order is the position in the snapshot's component list and is
/// the tie-break for scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub id: String,
    pub name: String,
    pub kind: ComponentKind,
    #[serde(default)]
    pub properties: IndexMap<String, Value>,
}

impl ComponentSpec {
    pub fn prop_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    pub fn prop_f64_or(&self, key: &str, default: f64) -> f64 {
        self.prop_f64(key).unwrap_or(default)
    }

    pub fn prop_u64_or(&self, key: &str, default: u64) -> u64 {
        self.properties
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or(default)
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// String-to-string map property, used for foreign-model port maps.
    pub fn prop_map(&self, key: &str) -> Result<IndexMap<String, String>> {
        let Some(value) = self.properties.get(key) else {
            return Ok(IndexMap::new());
        };
        let Some(object) = value.as_object() else {
            return Err(ModelError::InvalidProperty {
                component: self.id.clone(),
                property: key.to_owned(),
                detail: "expected an object of port -> variable names".to_owned(),
            });
        };
        let mut map = IndexMap::new();
        for (port, variable) in object {
            let Some(variable) = variable.as_str() else {
                return Err(ModelError::InvalidProperty {
                    component: self.id.clone(),
                    property: key.to_owned(),
                    detail: format!("mapping for port '{}' must be a string", port),
                });
            };
            map.insert(port.clone(), variable.to_owned());
        }
        Ok(map)
    }

    /// Input port names for this component. Built-in kinds have fixed
    /// ports; foreign models declare theirs through the `inputs` map.
    pub fn input_ports(&self) -> Vec<String> {
        match self.kind {
            ComponentKind::ForeignModel => self
                .prop_map("inputs")
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default(),
            kind => kind.input_ports().iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    /// Output port names for this component.
    pub fn output_ports(&self) -> Vec<String> {
        match self.kind {
            ComponentKind::ForeignModel => self
                .prop_map("outputs")
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default(),
            kind => kind
                .output_ports()
                .iter()
                .map(|p| (*p).to_owned())
                .collect(),
        }
    }
}

/// Directed edge between two component ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub source_component: String,
    pub source_port: String,
    pub target_component: String,
    pub target_port: String,
}

/// Direction of data flow for an external binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingDirection {
    /// Hardware feeds the bound input port.
    Read,
    /// The bound output port is transmitted to hardware.
    Write,
}

/// Declared link between a component port and an external hardware tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingSpec {
    pub component: String,
    pub port: String,
    pub direction: BindingDirection,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// External tag address (e.g. an OPC UA node id).
    pub address: String,
    /// Server endpoint the tag lives on; bindings without an endpoint fall
    /// back to the bridge's default.
    #[serde(default)]
    pub endpoint: Option<String>,
}
