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
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use m_twin_bridge::{CommunicationBridge, ConnectionHealth};
use m_twin_common::config::{SessionDefaults, SessionMode};
use m_twin_common::time::tick_drift_ms;
use m_twin_graph::{compute_order, DependencyGraph};
use m_twin_model::{Component, ForeignRuntimeHost, ModelSnapshot, NoForeignRuntimes};

use crate::scheduler::run_tick;
use crate::session::{LifecycleState, RunCommand, SessionConfig, SessionCore};
use crate::status::{BindingStatus, ComponentStatus, SessionStatus};
use crate::{Result, SessionError};

/// Owns every simulation session in the process. There is no process-wide
/// current-session state: every operation names its session explicitly.
pub struct SessionManager {
    defaults: SessionDefaults,
    bridge: Option<Arc<dyn CommunicationBridge>>,
    foreign_host: Arc<dyn ForeignRuntimeHost>,
    sessions: RwLock<HashMap<Uuid, Arc<SessionEntry>>>,
}

struct SessionEntry {
    snapshot: ModelSnapshot,
    config: SessionConfig,
    status: RwLock<SessionStatus>,
    control: watch::Sender<RunCommand>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            defaults,
            bridge: None,
            foreign_host: Arc::new(NoForeignRuntimes),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Attach the communication bridge used by HIL sessions. Without one,
    /// HIL sessions start Degraded and tick on stale inputs.
    pub fn with_bridge(mut self, bridge: Arc<dyn CommunicationBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Attach the host that materializes foreign-model components.
    pub fn with_foreign_host(mut self, host: Arc<dyn ForeignRuntimeHost>) -> Self {
        self.foreign_host = host;
        self
    }

    /// Freeze a model snapshot into a new session. Nothing is validated or
    /// executed yet; `start` performs the configuration checks.
    pub fn create(
        &self,
        snapshot: ModelSnapshot,
        mode: SessionMode,
        tick_interval: Option<Duration>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let config = SessionConfig::from_defaults(&self.defaults, mode, tick_interval);
        let status = SessionStatus::created(
            id,
            mode,
            config.tick_interval.as_millis() as u64,
            &snapshot,
        );
        let (control, _) = watch::channel(RunCommand::Run);
        let entry = Arc::new(SessionEntry {
            snapshot,
            config,
            status: RwLock::new(status),
            control,
            task: tokio::sync::Mutex::new(None),
        });
        self.sessions.write().insert(id, entry);
        info!(session = %id, mode = ?mode, "session created");
        id
    }

    /// Validate the frozen snapshot and launch the tick loop. Configuration
    /// errors (cycles, conflicting writers, invalid bindings) surface here,
    /// before any tick executes; in HIL mode unreachable endpoints degrade
    /// the session instead of failing it.
    pub async fn start(&self, id: Uuid) -> Result<()> {
        let entry = self.entry(id)?;
        {
            let status = entry.status.read();
            if status.lifecycle != LifecycleState::Created {
                return Err(SessionError::InvalidTransition {
                    operation: "start",
                    state: status.lifecycle,
                });
            }
        }

        let core = build_core(
            id,
            entry.config.clone(),
            &entry.snapshot,
            self.foreign_host.as_ref(),
        )?;

        let mut degraded = false;
        let bridge = if entry.config.mode.is_hil() {
            match &self.bridge {
                Some(bridge) => {
                    if let Err(err) = bridge.connect(&entry.snapshot.bindings).await {
                        warn!(session = %id, error = %err, "bridge connect failed; session starts degraded");
                        degraded = true;
                    }
                    Some(Arc::clone(bridge))
                }
                None => {
                    warn!(session = %id, "hil session without a configured bridge; session starts degraded");
                    degraded = true;
                    None
                }
            }
        } else {
            None
        };
        let endpoints = binding_endpoints(&entry.snapshot);
        if let Some(bridge) = &bridge {
            if !endpoints_healthy(bridge.as_ref(), &endpoints) {
                degraded = true;
            }
        }

        {
            let mut status = entry.status.write();
            if status.lifecycle != LifecycleState::Created {
                return Err(SessionError::InvalidTransition {
                    operation: "start",
                    state: status.lifecycle,
                });
            }
            status.lifecycle = LifecycleState::Running;
            status.degraded = degraded;
            status.started_at = Some(Utc::now());
            status.components = core.components.values().map(ComponentStatus::of).collect();
        }

        let _ = entry.control.send(RunCommand::Run);
        let receiver = entry.control.subscribe();
        let loop_entry = Arc::clone(&entry);
        let handle = tokio::spawn(run_session(
            core, loop_entry, bridge, receiver, endpoints, degraded,
        ));
        *entry.task.lock().await = Some(handle);
        info!(session = %id, degraded, "session started");
        Ok(())
    }

    /// Request a pause; honored at the next tick boundary.
    pub fn pause(&self, id: Uuid) -> Result<()> {
        let entry = self.entry(id)?;
        self.ensure_active(&entry, "pause")?;
        let _ = entry.control.send(RunCommand::Pause);
        Ok(())
    }

    /// Resume a paused session.
    pub fn resume(&self, id: Uuid) -> Result<()> {
        let entry = self.entry(id)?;
        self.ensure_active(&entry, "resume")?;
        let _ = entry.control.send(RunCommand::Run);
        Ok(())
    }

    /// Stop the session and wait for its loop to exit. The request is
    /// honored at the next tick boundary; the observed tick counter is the
    /// last fully committed tick. Stopping an already terminal session is a
    /// no-op, and a never-started session transitions straight to Stopped.
    pub async fn stop(&self, id: Uuid) -> Result<()> {
        let entry = self.entry(id)?;
        {
            let mut status = entry.status.write();
            match status.lifecycle {
                LifecycleState::Created => {
                    status.lifecycle = LifecycleState::Stopped;
                    info!(session = %id, "session stopped before ever running");
                    return Ok(());
                }
                LifecycleState::Stopped | LifecycleState::Faulted => return Ok(()),
                LifecycleState::Running | LifecycleState::Paused => {}
            }
        }
        let _ = entry.control.send(RunCommand::Stop);
        let handle = entry.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(session = %id, error = %err, "session task join error");
            }
        }
        Ok(())
    }

    /// Latest published status snapshot.
    pub fn status(&self, id: Uuid) -> Result<SessionStatus> {
        let entry = self.entry(id)?;
        let status = entry.status.read().clone();
        Ok(status)
    }

    /// Status of every known session.
    pub fn list(&self) -> Vec<SessionStatus> {
        let sessions = self.sessions.read();
        let mut statuses: Vec<SessionStatus> = sessions
            .values()
            .map(|entry| entry.status.read().clone())
            .collect();
        statuses.sort_by_key(|status| status.session_id);
        statuses
    }

    /// Stop every session; used by the daemon on shutdown.
    pub async fn shutdown_all(&self) {
        let ids: Vec<Uuid> = self.sessions.read().keys().copied().collect();
        for id in ids {
            if let Err(err) = self.stop(id).await {
                warn!(session = %id, error = %err, "failed to stop session during shutdown");
            }
        }
    }

    fn entry(&self, id: Uuid) -> Result<Arc<SessionEntry>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound { session: id })
    }

    fn ensure_active(&self, entry: &SessionEntry, operation: &'static str) -> Result<()> {
        let lifecycle = entry.status.read().lifecycle;
        match lifecycle {
            LifecycleState::Running | LifecycleState::Paused => Ok(()),
            state => Err(SessionError::InvalidTransition { operation, state }),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.read().len())
            .finish_non_exhaustive()
    }
}

/// Materialize a snapshot into a validated, initialized session core.
/// Graph and binding invariants are enforced here, so a core that builds is
/// a core that can run.
pub(crate) fn build_core(
    id: Uuid,
    config: SessionConfig,
    snapshot: &ModelSnapshot,
    host: &dyn ForeignRuntimeHost,
) -> Result<SessionCore> {
    let graph = DependencyGraph::build(
        &snapshot.components,
        &snapshot.connections,
        &snapshot.bindings,
    )?;
    let order = compute_order(&graph)?;

    let mut components = IndexMap::new();
    for spec in &snapshot.components {
        let mut component = Component::from_spec(spec.clone(), host)?;
        component.initialize();
        components.insert(spec.id.clone(), component);
    }
    Ok(SessionCore::new(
        id,
        config,
        components,
        &snapshot.connections,
        &snapshot.bindings,
        order,
    ))
}

fn binding_endpoints(snapshot: &ModelSnapshot) -> Vec<Option<String>> {
    let mut endpoints: Vec<Option<String>> = Vec::new();
    for binding in &snapshot.bindings {
        if !endpoints.contains(&binding.endpoint) {
            endpoints.push(binding.endpoint.clone());
        }
    }
    endpoints
}

fn endpoints_healthy(bridge: &dyn CommunicationBridge, endpoints: &[Option<String>]) -> bool {
    endpoints
        .iter()
        .all(|endpoint| bridge.connection_health(endpoint.as_deref()) == ConnectionHealth::Connected)
}

/// Per-session tick loop. Owns the mutable core exclusively; everything
/// observers see goes through the published status snapshot, updated only
/// after a tick fully commits.
async fn run_session(
    mut core: SessionCore,
    entry: Arc<SessionEntry>,
    bridge: Option<Arc<dyn CommunicationBridge>>,
    mut control: watch::Receiver<RunCommand>,
    endpoints: Vec<Option<String>>,
    initially_degraded: bool,
) {
    let started = Instant::now();
    let hil = core.config.mode.is_hil();
    let mut interval = tokio::time::interval(core.config.tick_interval);
    // an overrunning tick delays the next one; ticks are never dropped
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut degraded = initially_degraded;

    loop {
        let command = *control.borrow_and_update();
        match command {
            RunCommand::Stop => break,
            RunCommand::Pause => {
                publish(&entry, &core, LifecycleState::Paused, degraded, 0, None, None);
                debug!(session = %core.id, tick = core.tick, "session paused");
                if control.changed().await.is_err() {
                    break;
                }
                continue;
            }
            RunCommand::Run => {}
        }

        if hil {
            tokio::select! {
                changed = control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }
        } else {
            // pure mode runs as fast as possible but stays cooperative
            tokio::task::yield_now().await;
        }

        if hil {
            if let Some(bridge) = &bridge {
                let healthy = endpoints_healthy(bridge.as_ref(), &endpoints);
                if healthy == degraded {
                    degraded = !healthy;
                    info!(session = %core.id, degraded, "hil link health changed");
                }
            }
        }

        match run_tick(&mut core, bridge.as_deref()) {
            Ok(binding_states) => {
                let drift = if hil {
                    tick_drift_ms(started, core.config.tick_interval, core.tick)
                } else {
                    0
                };
                publish(
                    &entry,
                    &core,
                    LifecycleState::Running,
                    degraded,
                    drift,
                    Some(binding_states),
                    None,
                );
            }
            Err(err) => {
                error!(session = %core.id, error = %err, "tick aborted; session faulted");
                core.dispose();
                if let Some(bridge) = &bridge {
                    bridge.shutdown().await;
                }
                publish(
                    &entry,
                    &core,
                    LifecycleState::Faulted,
                    degraded,
                    0,
                    None,
                    Some(err.to_string()),
                );
                return;
            }
        }
    }

    core.dispose();
    if let Some(bridge) = &bridge {
        bridge.shutdown().await;
    }
    publish(
        &entry,
        &core,
        LifecycleState::Stopped,
        degraded,
        0,
        None,
        None,
    );
    info!(session = %core.id, tick = core.tick, "session stopped");
}

fn publish(
    entry: &SessionEntry,
    core: &SessionCore,
    lifecycle: LifecycleState,
    degraded: bool,
    drift_ms: i64,
    bindings: Option<Vec<BindingStatus>>,
    error: Option<String>,
) {
    let mut status = entry.status.write();
    status.lifecycle = lifecycle;
    status.degraded = degraded;
    status.tick = core.tick;
    status.drift_ms = drift_ms;
    status.error = error;
    status.components = core.components.values().map(ComponentStatus::of).collect();
    if let Some(bindings) = bindings {
        status.bindings = bindings;
    }
}
