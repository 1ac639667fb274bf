//! ---
//! mtwin_section: "02-model-components"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Component model: kinds, values, snapshots, step functions."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Value carried by a component port or an external tag.
///
/// Untagged on the wire so that snapshot JSON and status payloads read as
/// plain scalars. Variant order matters: integers must be tried before
/// floats so `5` survives a round trip as an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PortValue {
    /// Numeric view of the value; integers coerce losslessly enough for
    /// simulation arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PortValue::Float(v) => Some(*v),
            PortValue::Integer(v) => Some(*v as f64),
            PortValue::Bool(_) | PortValue::Text(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PortValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PortValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for PortValue {
    fn from(value: f64) -> Self {
        PortValue::Float(value)
    }
}

impl From<i64> for PortValue {
    fn from(value: i64) -> Self {
        PortValue::Integer(value)
    }
}

impl From<bool> for PortValue {
    fn from(value: bool) -> Self {
        PortValue::Bool(value)
    }
}

impl From<&str> for PortValue {
    fn from(value: &str) -> Self {
        PortValue::Text(value.to_owned())
    }
}

impl std::fmt::Display for PortValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortValue::Bool(v) => write!(f, "{}", v),
            PortValue::Integer(v) => write!(f, "{}", v),
            PortValue::Float(v) => write!(f, "{}", v),
            PortValue::Text(v) => f.write_str(v),
        }
    }
}
