//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Session lifecycle, tick scheduling, and status surface."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use m_twin_bridge::{CommunicationBridge, ConnectionHealth, InMemoryBridge};
use m_twin_common::config::{SessionDefaults, SessionMode};
use m_twin_model::{
    ForeignRuntime, ForeignRuntimeError, ForeignRuntimeHost, ModelSnapshot, PortValue,
};
use m_twin_session::{LifecycleState, SessionError, SessionManager};

fn sensor_heater_snapshot() -> ModelSnapshot {
    ModelSnapshot::from_json(
        r#"{
            "components": [
                {"id": "s1", "name": "setpoint", "kind": "sensor",
                 "properties": {"frequency": 0.0, "amplitude": 0.0, "offset": 50.0}},
                {"id": "h1", "name": "heater", "kind": "heater",
                 "properties": {"thermal_mass": 10.0, "heat_loss": 0.0,
                                "initial_temperature": 20.0}}
            ],
            "connections": [
                {"source_component": "s1", "source_port": "value",
                 "target_component": "h1", "target_port": "command"}
            ]
        }"#,
    )
    .unwrap()
}

fn manager() -> SessionManager {
    SessionManager::new(SessionDefaults::default())
}

async fn wait_for<F>(mut predicate: F, timeout: Duration)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pure_session_runs_pauses_and_stops_cleanly() {
    let manager = manager();
    let id = manager.create(sensor_heater_snapshot(), SessionMode::Pure, None);
    assert_eq!(
        manager.status(id).unwrap().lifecycle,
        LifecycleState::Created
    );

    manager.start(id).await.unwrap();
    wait_for(
        || manager.status(id).unwrap().tick >= 3,
        Duration::from_secs(2),
    )
    .await;
    let running = manager.status(id).unwrap();
    assert_eq!(running.lifecycle, LifecycleState::Running);
    assert!(!running.degraded);

    manager.pause(id).unwrap();
    wait_for(
        || manager.status(id).unwrap().lifecycle == LifecycleState::Paused,
        Duration::from_secs(2),
    )
    .await;
    let paused_tick = manager.status(id).unwrap().tick;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(manager.status(id).unwrap().tick, paused_tick);

    manager.resume(id).unwrap();
    wait_for(
        || manager.status(id).unwrap().tick > paused_tick,
        Duration::from_secs(2),
    )
    .await;

    manager.stop(id).await.unwrap();
    let stopped = manager.status(id).unwrap();
    assert_eq!(stopped.lifecycle, LifecycleState::Stopped);

    // tick counter is frozen at the last fully committed tick
    let final_tick = stopped.tick;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.status(id).unwrap().tick, final_tick);

    // terminal means terminal
    assert!(matches!(
        manager.start(id).await,
        Err(SessionError::InvalidTransition { .. })
    ));
    assert!(manager.stop(id).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_tick_propagation_delay_between_connected_components() {
    let manager = manager();
    let id = manager.create(
        sensor_heater_snapshot(),
        SessionMode::Hil,
        Some(Duration::from_millis(20)),
    );
    manager.start(id).await.unwrap();
    wait_for(
        || manager.status(id).unwrap().tick >= 1,
        Duration::from_secs(2),
    )
    .await;
    manager.pause(id).unwrap();
    wait_for(
        || manager.status(id).unwrap().lifecycle == LifecycleState::Paused,
        Duration::from_secs(2),
    )
    .await;

    let status = manager.status(id).unwrap();
    let ticks = status.tick as f64;
    let heater = status
        .components
        .iter()
        .find(|component| component.id == "h1")
        .unwrap();
    let temperature = heater
        .outputs
        .get("temperature")
        .and_then(PortValue::as_f64)
        .unwrap();
    // constant sensor at 50, thermal mass 10, dt = 20ms:
    // temp = 20 + 50 * 0.02 / 10 per tick, one tick behind is invisible for
    // a constant source, so the closed form holds exactly
    let expected = 20.0 + ticks * 50.0 * 0.02 / 10.0;
    assert!(
        (temperature - expected).abs() < 1e-9,
        "temperature {temperature} != expected {expected} at tick {ticks}"
    );

    manager.stop(id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cyclic_graphs_never_reach_running() {
    let snapshot = ModelSnapshot::from_json(
        r#"{
            "components": [
                {"id": "a1", "name": "a", "kind": "actuator"},
                {"id": "v1", "name": "v", "kind": "valve"}
            ],
            "connections": [
                {"source_component": "a1", "source_port": "position",
                 "target_component": "v1", "target_port": "command"},
                {"source_component": "v1", "source_port": "position",
                 "target_component": "a1", "target_port": "command"}
            ]
        }"#,
    )
    .unwrap();
    let manager = manager();
    let id = manager.create(snapshot, SessionMode::Pure, None);

    let err = manager.start(id).await.unwrap_err();
    assert!(matches!(err, SessionError::Configuration(_)));
    assert_eq!(
        manager.status(id).unwrap().lifecycle,
        LifecycleState::Created
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hil_without_bridge_starts_degraded_but_ticks() {
    let snapshot = sensor_heater_snapshot();
    let manager = manager();
    let id = manager.create(snapshot, SessionMode::Hil, Some(Duration::from_millis(10)));
    manager.start(id).await.unwrap();

    wait_for(
        || manager.status(id).unwrap().tick >= 2,
        Duration::from_secs(2),
    )
    .await;
    let status = manager.status(id).unwrap();
    assert_eq!(status.lifecycle, LifecycleState::Running);
    assert!(status.degraded);

    manager.stop(id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hil_session_reads_hardware_and_transmits_outputs() {
    let snapshot = ModelSnapshot::from_json(
        r#"{
            "components": [
                {"id": "h1", "name": "heater", "kind": "heater",
                 "properties": {"thermal_mass": 1.0, "heat_loss": 0.0,
                                "initial_temperature": 20.0}}
            ],
            "bindings": [
                {"component": "h1", "port": "command", "direction": "read",
                 "address": "plc.heater.command"},
                {"component": "h1", "port": "temperature", "direction": "write",
                 "address": "plc.heater.temperature"}
            ]
        }"#,
    )
    .unwrap();

    let bridge = Arc::new(InMemoryBridge::new(Duration::from_secs(5)));
    let manager = SessionManager::new(SessionDefaults::default())
        .with_bridge(bridge.clone() as Arc<dyn CommunicationBridge>);
    let id = manager.create(snapshot, SessionMode::Hil, Some(Duration::from_millis(10)));
    manager.start(id).await.unwrap();
    assert!(!manager.status(id).unwrap().degraded);

    bridge.inject("plc.heater.command", PortValue::Float(10.0));
    wait_for(
        || {
            manager
                .status(id)
                .unwrap()
                .components
                .iter()
                .find(|component| component.id == "h1")
                .and_then(|component| component.outputs.get("temperature"))
                .and_then(PortValue::as_f64)
                .map(|temperature| temperature > 20.0)
                .unwrap_or(false)
        },
        Duration::from_secs(2),
    )
    .await;

    let writes = bridge.drain_writes();
    assert!(!writes.is_empty());
    assert!(writes
        .iter()
        .all(|write| write.tag == "plc.heater.temperature"));

    // read binding staleness is surfaced per tick in the status
    let status = manager.status(id).unwrap();
    let read_state = status
        .bindings
        .iter()
        .find(|binding| binding.tag == "plc.heater.command")
        .unwrap();
    assert!(!read_state.stale);

    // a dropped link degrades the session instead of stopping it
    bridge.set_health(ConnectionHealth::Disconnected);
    wait_for(
        || manager.status(id).unwrap().degraded,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(
        manager.status(id).unwrap().lifecycle,
        LifecycleState::Running
    );

    manager.stop(id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_share_no_state() {
    let manager = manager();
    let hot = ModelSnapshot::from_json(
        r#"{
            "components": [
                {"id": "h1", "name": "heater", "kind": "heater",
                 "properties": {"thermal_mass": 1.0, "initial_temperature": 100.0}}
            ]
        }"#,
    )
    .unwrap();
    let cold = ModelSnapshot::from_json(
        r#"{
            "components": [
                {"id": "h1", "name": "heater", "kind": "heater",
                 "properties": {"thermal_mass": 1.0, "initial_temperature": -40.0}}
            ]
        }"#,
    )
    .unwrap();

    let hot_id = manager.create(hot, SessionMode::Pure, None);
    let cold_id = manager.create(cold, SessionMode::Pure, None);
    manager.start(hot_id).await.unwrap();
    manager.start(cold_id).await.unwrap();

    wait_for(
        || {
            manager.status(hot_id).unwrap().tick >= 2 && manager.status(cold_id).unwrap().tick >= 2
        },
        Duration::from_secs(2),
    )
    .await;

    let temperature = |id: uuid::Uuid| -> f64 {
        let status = manager.status(id).unwrap();
        let component = status
            .components
            .iter()
            .find(|component| component.id == "h1")
            .unwrap();
        component
            .outputs
            .get("temperature")
            .and_then(PortValue::as_f64)
            .unwrap()
    };
    // same component id in both sessions, fully independent state
    assert!(temperature(hot_id) >= 99.0);
    assert!(temperature(cold_id) <= -39.0);

    manager.stop(hot_id).await.unwrap();
    manager.stop(cold_id).await.unwrap();
}

#[derive(Debug)]
struct FaultyRuntime;

impl ForeignRuntime for FaultyRuntime {
    fn advance(
        &mut self,
        _inputs: &IndexMap<String, PortValue>,
        _dt: Duration,
    ) -> Result<IndexMap<String, PortValue>, ForeignRuntimeError> {
        Err(ForeignRuntimeError::new("solver diverged"))
    }

    fn dispose(&mut self) {}
}

struct FaultyHost;

impl ForeignRuntimeHost for FaultyHost {
    fn instantiate(
        &self,
        _spec: &m_twin_model::ComponentSpec,
    ) -> m_twin_model::Result<Box<dyn ForeignRuntime>> {
        Ok(Box::new(FaultyRuntime))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn foreign_fault_discards_the_tick_and_faults_the_session() {
    let snapshot = ModelSnapshot::from_json(
        r#"{
            "components": [
                {"id": "f1", "name": "plant", "kind": "foreign_model",
                 "properties": {"inputs": {}, "outputs": {"y": "plant.y"}}}
            ]
        }"#,
    )
    .unwrap();
    let manager =
        SessionManager::new(SessionDefaults::default()).with_foreign_host(Arc::new(FaultyHost));
    let id = manager.create(snapshot, SessionMode::Pure, None);
    manager.start(id).await.unwrap();

    wait_for(
        || manager.status(id).unwrap().lifecycle == LifecycleState::Faulted,
        Duration::from_secs(2),
    )
    .await;
    let status = manager.status(id).unwrap();
    // the first tick never committed
    assert_eq!(status.tick, 0);
    let error = status.error.unwrap();
    assert!(error.contains("solver diverged"));

    // faulted is terminal and distinct from stopped
    assert!(matches!(
        manager.resume(id),
        Err(SessionError::InvalidTransition { .. })
    ));
    assert!(manager.stop(id).await.is_ok());
    assert_eq!(
        manager.status(id).unwrap().lifecycle,
        LifecycleState::Faulted
    );
}
