//! ---
//! mtwin_section: "04-hil-bridge"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Binding cache and communication bridge contract."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use m_twin_model::{BindingDirection, BindingSpec, PortValue};

use crate::cache::{BindingCache, CacheReading};
use crate::{BridgeError, Result};

/// Health of one external endpoint as observed by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    Connected,
    Reconnecting,
    Disconnected,
}

impl ConnectionHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionHealth::Connected => "connected",
            ConnectionHealth::Reconnecting => "reconnecting",
            ConnectionHealth::Disconnected => "disconnected",
        }
    }
}

/// A value the scheduler handed to the bridge for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct TagWrite {
    pub tag: String,
    pub value: PortValue,
}

/// Contract between the scheduler and the communication subsystem.
///
/// `read_cache` and `write_value` must never block on I/O: reads serve the
/// latest cached value, writes are fire-and-forget enqueues whose delivery
/// (and retry) is the bridge's own concern. The bridge reports transmit
/// failures through its own side channel, never back into the tick loop.
#[async_trait]
pub trait CommunicationBridge: Send + Sync {
    /// Establish connections for the given bindings and size the cache.
    /// Called once at session start, before the first tick.
    async fn connect(&self, bindings: &[BindingSpec]) -> Result<()>;

    /// Latest cached value for `tag`; "no data yet" before the first
    /// observation.
    fn read_cache(&self, tag: &str) -> CacheReading;

    /// Enqueue a value for transmission to `tag`.
    fn write_value(&self, tag: &str, value: PortValue);

    /// Health of `endpoint`, or of the default endpoint when `None`.
    fn connection_health(&self, endpoint: Option<&str>) -> ConnectionHealth;

    /// Release protocol resources. Called once on session stop or fault.
    async fn shutdown(&self);

    /// Human-readable transport name for logging.
    fn name(&self) -> &'static str;
}

/// In-memory bridge backed directly by a [`BindingCache`].
///
/// Serves two roles: the test double for the session crate, and a loopback
/// transport for validating models without hardware. The "hardware side"
/// is driven through [`InMemoryBridge::inject`], mirroring how a protocol
/// subscription callback would land on its own task.
pub struct InMemoryBridge {
    staleness_threshold: Duration,
    cache: RwLock<Option<Arc<BindingCache>>>,
    outbox: Mutex<VecDeque<TagWrite>>,
    health: Mutex<ConnectionHealth>,
}

impl InMemoryBridge {
    pub fn new(staleness_threshold: Duration) -> Self {
        Self {
            staleness_threshold,
            cache: RwLock::new(None),
            outbox: Mutex::new(VecDeque::new()),
            health: Mutex::new(ConnectionHealth::Connected),
        }
    }

    /// Simulate a data change arriving from hardware for a read-direction
    /// tag.
    pub fn inject(&self, tag: &str, value: PortValue) -> bool {
        match self.cache.read().as_ref() {
            Some(cache) => cache.write(tag, value),
            None => false,
        }
    }

    /// Drain everything the scheduler has asked the bridge to transmit.
    pub fn drain_writes(&self) -> Vec<TagWrite> {
        self.outbox.lock().drain(..).collect()
    }

    /// Override the reported endpoint health.
    pub fn set_health(&self, health: ConnectionHealth) {
        *self.health.lock() = health;
    }
}

#[async_trait]
impl CommunicationBridge for InMemoryBridge {
    async fn connect(&self, bindings: &[BindingSpec]) -> Result<()> {
        let read_tags = bindings
            .iter()
            .filter(|binding| binding.direction == BindingDirection::Read)
            .map(|binding| binding.address.clone());
        let cache = Arc::new(BindingCache::new(read_tags, self.staleness_threshold));
        debug!(tags = cache.tags().count(), "in-memory bridge connected");
        *self.cache.write() = Some(cache);
        Ok(())
    }

    fn read_cache(&self, tag: &str) -> CacheReading {
        match self.cache.read().as_ref() {
            Some(cache) => cache.read(tag),
            None => CacheReading {
                value: None,
                age: None,
                stale: true,
            },
        }
    }

    fn write_value(&self, tag: &str, value: PortValue) {
        let mut outbox = self.outbox.lock();
        outbox.push_back(TagWrite {
            tag: tag.to_owned(),
            value,
        });
    }

    fn connection_health(&self, _endpoint: Option<&str>) -> ConnectionHealth {
        *self.health.lock()
    }

    async fn shutdown(&self) {
        *self.cache.write() = None;
        self.outbox.lock().clear();
        debug!("in-memory bridge shut down");
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Placeholder OPC UA transport. Protocol internals plug in here; until
/// then any HIL session configured against it degrades at start.
pub struct OpcUaBridge;

#[async_trait]
impl CommunicationBridge for OpcUaBridge {
    async fn connect(&self, _bindings: &[BindingSpec]) -> Result<()> {
        Err(BridgeError::Unimplemented("opc ua transport"))
    }

    fn read_cache(&self, tag: &str) -> CacheReading {
        warn!(tag, "read against unimplemented opc ua transport");
        CacheReading {
            value: None,
            age: None,
            stale: true,
        }
    }

    fn write_value(&self, tag: &str, _value: PortValue) {
        warn!(tag, "write against unimplemented opc ua transport dropped");
    }

    fn connection_health(&self, _endpoint: Option<&str>) -> ConnectionHealth {
        ConnectionHealth::Disconnected
    }

    async fn shutdown(&self) {}

    fn name(&self) -> &'static str {
        "opcua"
    }
}
