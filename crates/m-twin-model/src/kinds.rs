//! ---
//! mtwin_section: "02-model-components"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Component model: kinds, values, snapshots, step functions."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::f64::consts::PI;
use std::time::Duration;

use indexmap::IndexMap;
use rand::prelude::*;
use rand_distr::Normal;

use crate::component::ComponentKind;
use crate::foreign::{ForeignRuntime, ForeignRuntimeHost};
use crate::snapshot::ComponentSpec;
use crate::value::PortValue;
use crate::{ComponentStepError, Result};

const DEFAULT_SENSOR_FREQUENCY_HZ: f64 = 0.1;
const DEFAULT_SENSOR_AMPLITUDE: f64 = 1.0;
const DEFAULT_SENSOR_SEED: u64 = 0xA11CE;
const DEFAULT_THERMAL_MASS: f64 = 10.0;
const DEFAULT_AMBIENT_TEMP: f64 = 20.0;
const DEFAULT_ACTUATOR_SLEW: f64 = 10.0;
const DEFAULT_ACTUATOR_MAX: f64 = 100.0;
const DEFAULT_VALVE_SLEW: f64 = 1.0;
const DEFAULT_VALVE_MAX: f64 = 1.0;

/// Kind-specific state plus its step function. A single match per call site
/// dispatches over the closed set of kinds.
#[derive(Debug)]
pub enum KindState {
    Sensor(SensorState),
    Heater(HeaterState),
    Actuator(ActuatorState),
    Valve(ActuatorState),
    Foreign(ForeignState),
}

impl KindState {
    pub(crate) fn from_spec(spec: &ComponentSpec, host: &dyn ForeignRuntimeHost) -> Result<Self> {
        let state = match spec.kind {
            ComponentKind::Sensor => KindState::Sensor(SensorState::from_spec(spec)),
            ComponentKind::Heater => KindState::Heater(HeaterState::from_spec(spec)),
            ComponentKind::Actuator => KindState::Actuator(ActuatorState::from_spec(
                spec,
                DEFAULT_ACTUATOR_SLEW,
                DEFAULT_ACTUATOR_MAX,
            )),
            ComponentKind::Valve => KindState::Valve(ActuatorState::from_spec(
                spec,
                DEFAULT_VALVE_SLEW,
                DEFAULT_VALVE_MAX,
            )),
            ComponentKind::ForeignModel => KindState::Foreign(ForeignState::from_spec(spec, host)?),
        };
        Ok(state)
    }

    /// Outputs visible to downstream components before the first tick.
    pub(crate) fn initial_outputs(&self, spec: &ComponentSpec) -> IndexMap<String, PortValue> {
        let mut outputs = IndexMap::new();
        match self {
            KindState::Sensor(_) => {
                outputs.insert("value".to_owned(), spec.prop_f64_or("offset", 0.0).into());
            }
            KindState::Heater(state) => {
                outputs.insert("temperature".to_owned(), state.temperature.into());
            }
            KindState::Actuator(state) | KindState::Valve(state) => {
                outputs.insert("position".to_owned(), state.position.into());
            }
            KindState::Foreign(_) => {}
        }
        outputs
    }

    /// Pure per-tick step: `(inputs, properties, state, dt) -> outputs`,
    /// mutating `self` into the post-tick state.
    pub(crate) fn step(
        &mut self,
        spec: &ComponentSpec,
        inputs: &IndexMap<String, PortValue>,
        dt: Duration,
    ) -> std::result::Result<IndexMap<String, PortValue>, ComponentStepError> {
        match self {
            KindState::Sensor(state) => Ok(state.step(spec, dt)),
            KindState::Heater(state) => Ok(state.step(spec, inputs, dt)),
            KindState::Actuator(state) | KindState::Valve(state) => {
                Ok(state.step(spec, inputs, dt))
            }
            KindState::Foreign(state) => state.step(spec, inputs, dt),
        }
    }

    pub(crate) fn dispose(&mut self) {
        if let KindState::Foreign(state) = self {
            state.runtime.dispose();
        }
    }
}

/// Sine-wave measurement source with optional seeded Gaussian noise.
#[derive(Debug)]
pub struct SensorState {
    elapsed: f64,
    rng: StdRng,
    noise: Option<Normal<f64>>,
}

impl SensorState {
    fn from_spec(spec: &ComponentSpec) -> Self {
        let sigma = spec.prop_f64_or("noise_sigma", 0.0);
        let noise = (sigma > 0.0).then(|| Normal::new(0.0, sigma).expect("sigma checked positive"));
        Self {
            elapsed: 0.0,
            rng: StdRng::seed_from_u64(spec.prop_u64_or("seed", DEFAULT_SENSOR_SEED)),
            noise,
        }
    }

    fn step(&mut self, spec: &ComponentSpec, dt: Duration) -> IndexMap<String, PortValue> {
        self.elapsed += dt.as_secs_f64();
        let frequency = spec.prop_f64_or("frequency", DEFAULT_SENSOR_FREQUENCY_HZ);
        let amplitude = spec.prop_f64_or("amplitude", DEFAULT_SENSOR_AMPLITUDE);
        let offset = spec.prop_f64_or("offset", 0.0);
        let noise = self
            .noise
            .as_ref()
            .map(|dist| dist.sample(&mut self.rng))
            .unwrap_or(0.0);
        let value = offset + amplitude * (2.0 * PI * frequency * self.elapsed).sin() + noise;
        IndexMap::from([("value".to_owned(), value.into())])
    }
}

/// First-order thermal integrator.
#[derive(Debug)]
pub struct HeaterState {
    temperature: f64,
}

impl HeaterState {
    fn from_spec(spec: &ComponentSpec) -> Self {
        let ambient = spec.prop_f64_or("ambient_temp", DEFAULT_AMBIENT_TEMP);
        Self {
            temperature: spec.prop_f64_or("initial_temperature", ambient),
        }
    }

    fn step(
        &mut self,
        spec: &ComponentSpec,
        inputs: &IndexMap<String, PortValue>,
        dt: Duration,
    ) -> IndexMap<String, PortValue> {
        let command = inputs
            .get("command")
            .and_then(PortValue::as_f64)
            .unwrap_or(0.0);
        let ambient = inputs
            .get("ambient")
            .and_then(PortValue::as_f64)
            .unwrap_or_else(|| spec.prop_f64_or("ambient_temp", DEFAULT_AMBIENT_TEMP));
        let thermal_mass = spec
            .prop_f64_or("thermal_mass", DEFAULT_THERMAL_MASS)
            .max(f64::EPSILON);
        let heat_loss = spec.prop_f64_or("heat_loss", 0.0);

        let loss = heat_loss * (self.temperature - ambient);
        self.temperature += (command - loss) * dt.as_secs_f64() / thermal_mass;
        if let Some(max) = spec.prop_f64("max_temperature") {
            self.temperature = self.temperature.min(max);
        }
        if let Some(min) = spec.prop_f64("min_temperature") {
            self.temperature = self.temperature.max(min);
        }
        IndexMap::from([("temperature".to_owned(), self.temperature.into())])
    }
}

/// Slew-limited position follower shared by actuators and valves. Physical
/// actuation lag: the position moves toward the command at a bounded rate
/// and saturates at the configured bounds.
#[derive(Debug)]
pub struct ActuatorState {
    position: f64,
    default_slew: f64,
    default_max: f64,
}

impl ActuatorState {
    fn from_spec(spec: &ComponentSpec, default_slew: f64, default_max: f64) -> Self {
        let min = spec.prop_f64_or("min_position", 0.0);
        Self {
            position: spec.prop_f64_or("initial_position", min),
            default_slew,
            default_max,
        }
    }

    fn step(
        &mut self,
        spec: &ComponentSpec,
        inputs: &IndexMap<String, PortValue>,
        dt: Duration,
    ) -> IndexMap<String, PortValue> {
        let min = spec.prop_f64_or("min_position", 0.0);
        let max = spec.prop_f64_or("max_position", self.default_max);
        let slew = spec.prop_f64_or("slew_rate", self.default_slew).abs();

        let target = inputs
            .get("command")
            .and_then(PortValue::as_f64)
            .unwrap_or(self.position)
            .clamp(min, max);
        let max_delta = slew * dt.as_secs_f64();
        let delta = (target - self.position).clamp(-max_delta, max_delta);
        self.position = (self.position + delta).clamp(min, max);
        IndexMap::from([("position".to_owned(), self.position.into())])
    }
}

/// Name-mapped delegation to an external model runtime.
#[derive(Debug)]
pub struct ForeignState {
    pub(crate) runtime: Box<dyn ForeignRuntime>,
    input_map: IndexMap<String, String>,
    output_map: IndexMap<String, String>,
}

impl ForeignState {
    fn from_spec(spec: &ComponentSpec, host: &dyn ForeignRuntimeHost) -> Result<Self> {
        let input_map = spec.prop_map("inputs")?;
        let output_map = spec.prop_map("outputs")?;
        let runtime = host.instantiate(spec)?;
        Ok(Self {
            runtime,
            input_map,
            output_map,
        })
    }

    fn step(
        &mut self,
        spec: &ComponentSpec,
        inputs: &IndexMap<String, PortValue>,
        dt: Duration,
    ) -> std::result::Result<IndexMap<String, PortValue>, ComponentStepError> {
        let mut foreign_inputs = IndexMap::new();
        for (port, variable) in &self.input_map {
            if let Some(value) = inputs.get(port) {
                foreign_inputs.insert(variable.clone(), value.clone());
            }
        }
        let foreign_outputs =
            self.runtime
                .advance(&foreign_inputs, dt)
                .map_err(|err| ComponentStepError::ForeignRuntime {
                    component: spec.id.clone(),
                    detail: err.to_string(),
                })?;
        let mut outputs = IndexMap::new();
        for (port, variable) in &self.output_map {
            if let Some(value) = foreign_outputs.get(variable) {
                outputs.insert(port.clone(), value.clone());
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::NoForeignRuntimes;

    fn spec(json: &str) -> ComponentSpec {
        serde_json::from_str(json).unwrap()
    }

    fn step_once(
        state: &mut KindState,
        spec: &ComponentSpec,
        inputs: &[(&str, f64)],
        dt_secs: f64,
    ) -> IndexMap<String, PortValue> {
        let inputs: IndexMap<String, PortValue> = inputs
            .iter()
            .map(|(port, value)| ((*port).to_owned(), (*value).into()))
            .collect();
        state
            .step(spec, &inputs, Duration::from_secs_f64(dt_secs))
            .unwrap()
    }

    #[test]
    fn heater_integrates_command_over_thermal_mass() {
        let spec = spec(
            r#"{"id": "h1", "name": "heater", "kind": "heater",
                "properties": {"thermal_mass": 10.0, "heat_loss": 0.0,
                               "initial_temperature": 20.0}}"#,
        );
        let mut state = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();

        let outputs = step_once(&mut state, &spec, &[("command", 100.0)], 1.0);
        assert_eq!(outputs.get("temperature"), Some(&PortValue::Float(30.0)));

        for _ in 0..4 {
            step_once(&mut state, &spec, &[("command", 100.0)], 1.0);
        }
        let outputs = step_once(&mut state, &spec, &[("command", 100.0)], 1.0);
        // temp = 20 + 10 * N after N ticks of command=100 with no loss
        assert_eq!(outputs.get("temperature"), Some(&PortValue::Float(80.0)));
    }

    #[test]
    fn heater_saturates_at_max_temperature() {
        let spec = spec(
            r#"{"id": "h1", "name": "heater", "kind": "heater",
                "properties": {"thermal_mass": 1.0, "initial_temperature": 20.0,
                               "max_temperature": 25.0}}"#,
        );
        let mut state = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();
        let outputs = step_once(&mut state, &spec, &[("command", 1000.0)], 1.0);
        assert_eq!(outputs.get("temperature"), Some(&PortValue::Float(25.0)));
    }

    #[test]
    fn heater_losses_pull_toward_ambient() {
        let spec = spec(
            r#"{"id": "h1", "name": "heater", "kind": "heater",
                "properties": {"thermal_mass": 1.0, "heat_loss": 0.5,
                               "initial_temperature": 40.0, "ambient_temp": 20.0}}"#,
        );
        let mut state = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();
        // no command: dT = -0.5 * (40 - 20) * 1 / 1 = -10
        let outputs = step_once(&mut state, &spec, &[], 1.0);
        assert_eq!(outputs.get("temperature"), Some(&PortValue::Float(30.0)));
    }

    #[test]
    fn actuator_slews_toward_command_and_saturates() {
        let spec = spec(
            r#"{"id": "a1", "name": "axis", "kind": "actuator",
                "properties": {"slew_rate": 5.0, "max_position": 12.0}}"#,
        );
        let mut state = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();

        // command far above the bound: slew limits each tick, then saturation
        let outputs = step_once(&mut state, &spec, &[("command", 50.0)], 1.0);
        assert_eq!(outputs.get("position"), Some(&PortValue::Float(5.0)));
        let outputs = step_once(&mut state, &spec, &[("command", 50.0)], 1.0);
        assert_eq!(outputs.get("position"), Some(&PortValue::Float(10.0)));
        let outputs = step_once(&mut state, &spec, &[("command", 50.0)], 1.0);
        assert_eq!(outputs.get("position"), Some(&PortValue::Float(12.0)));
    }

    #[test]
    fn actuator_holds_position_without_a_command() {
        let spec = spec(
            r#"{"id": "a1", "name": "axis", "kind": "actuator",
                "properties": {"initial_position": 3.0}}"#,
        );
        let mut state = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();
        let outputs = step_once(&mut state, &spec, &[], 1.0);
        assert_eq!(outputs.get("position"), Some(&PortValue::Float(3.0)));
    }

    #[test]
    fn sensor_without_noise_is_deterministic() {
        let spec = spec(
            r#"{"id": "s1", "name": "probe", "kind": "sensor",
                "properties": {"frequency": 0.25, "amplitude": 2.0, "offset": 10.0}}"#,
        );
        let mut state = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();
        // t = 1s, sin(2*pi*0.25) = 1
        let outputs = step_once(&mut state, &spec, &[], 1.0);
        let value = outputs.get("value").and_then(PortValue::as_f64).unwrap();
        assert!((value - 12.0).abs() < 1e-9);
    }

    #[test]
    fn seeded_sensor_noise_reproduces() {
        let spec = spec(
            r#"{"id": "s1", "name": "probe", "kind": "sensor",
                "properties": {"noise_sigma": 0.5, "seed": 42}}"#,
        );
        let mut first = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();
        let mut second = KindState::from_spec(&spec, &NoForeignRuntimes).unwrap();
        for _ in 0..5 {
            let a = step_once(&mut first, &spec, &[], 1.0);
            let b = step_once(&mut second, &spec, &[], 1.0);
            assert_eq!(a.get("value"), b.get("value"));
        }
    }
}
