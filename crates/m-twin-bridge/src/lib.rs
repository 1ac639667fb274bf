//! ---
//! mtwin_section: "04-hil-bridge"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Binding cache and communication bridge contract."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
//! Hardware-in-the-loop seam.
//!
//! The scheduler never talks to a protocol client directly: it reads and
//! writes the [`BindingCache`], and the bridge implementation moves values
//! between the cache and the external system on its own clock. A stalled
//! bridge therefore degrades reads to staleness flags instead of blocking
//! the tick loop.

pub mod bridge;
pub mod cache;

/// Shared result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by communication bridge implementations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Raised when a transport is not yet implemented.
    #[error("communication transport not yet implemented: {0}")]
    Unimplemented(&'static str),
    /// An external endpoint could not be reached at connect time. The
    /// session treats this as Degraded, not fatal.
    #[error("endpoint '{endpoint}' unreachable: {detail}")]
    Unavailable { endpoint: String, detail: String },
}

pub use bridge::{CommunicationBridge, ConnectionHealth, InMemoryBridge, OpcUaBridge, TagWrite};
pub use cache::{BindingCache, CacheReading};
