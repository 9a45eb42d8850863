//! Scenario files.
//!
//! A [`ScenarioConfig`] describes a whole run as plain records: devices,
//! the application graph, sensors, actuators, placement and run
//! parameters. It loads from YAML or JSON and turns into a ready-to-run
//! [`Controller`].
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   name: two-tier
//!   horizon: 100
//!   seed: 7
//!
//! devices:
//!   - name: cloud
//!     mips: 44800
//!     power: { model: linear, busy: 1648, idle: 1332 }
//!   - name: edge
//!     parent: cloud
//!     uplink_latency: 4
//!     mips: 1600
//!
//! application:
//!   id: app
//!   modules:
//!     - { name: detector, mips: 10 }
//!   sensor_types: [TempSensor]
//!   edges:
//!     - { src: TempSensor, dst: detector, tuple_type: TEMP, kind: sensor, size: 500, cpu_length: 1000 }
//!   loops:
//!     - [TEMP, detector]
//!
//! sensors:
//!   - name: t-0
//!     sensor_type: TempSensor
//!     device: edge
//!     latency: 1
//!     distribution: { type: deterministic, interval: 5 }
//!
//! placement:
//!   strategy: edgeward
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::application::{AppEdge, Application, ResourceDemand};
use crate::controller::{Controller, SimulationParams};
use crate::distribution::IntervalDistribution;
use crate::entity::{Actuator, Sensor};
use crate::error::{GraphError, SimResult, TopologyError};
use crate::kernel::QueueDiscipline;
use crate::placement::{EdgewardPlacement, MappingPlacement, ModuleMapping, PlacementStrategy};
use crate::power::{PowerSpec, ProvisionerSpec};
use crate::topology::{DeviceSpec, Topology};
use crate::types::{Direction, EdgeKind, SimTime};

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Run parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationSection {
    /// Scenario name
    #[serde(default = "default_name")]
    pub name: String,

    /// Generators stop after this time
    #[serde(default = "default_horizon")]
    pub horizon: SimTime,

    /// RNG seed
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Process in-flight tuples after the horizon
    #[serde(default = "default_drain")]
    pub drain: bool,

    /// Upper bound for draining
    #[serde(default)]
    pub drain_limit: Option<SimTime>,

    /// Device queue discipline
    #[serde(default)]
    pub queue: QueueDiscipline,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    "simulation".to_string()
}

fn default_horizon() -> SimTime {
    1000.0
}

fn default_seed() -> u64 {
    42
}

fn default_drain() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            horizon: default_horizon(),
            seed: default_seed(),
            drain: default_drain(),
            drain_limit: None,
            queue: QueueDiscipline::default(),
            log_level: default_log_level(),
        }
    }
}

impl SimulationSection {
    /// Converts to controller parameters.
    pub fn to_params(&self) -> SimulationParams {
        SimulationParams {
            name: self.name.clone(),
            horizon: self.horizon,
            seed: self.seed,
            drain: self.drain,
            drain_limit: self.drain_limit,
            queue: self.queue,
        }
    }
}

/// A device and its link to the parent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,

    /// Parent device; exactly one device (the root) has none
    #[serde(default)]
    pub parent: Option<String>,

    /// Latency of the link to the parent
    #[serde(default)]
    pub uplink_latency: SimTime,

    pub mips: f64,

    #[serde(default)]
    pub ram: Option<u64>,

    /// Unbounded when absent
    #[serde(default)]
    pub uplink_bandwidth: Option<f64>,

    /// Unbounded when absent
    #[serde(default)]
    pub downlink_bandwidth: Option<f64>,

    #[serde(default)]
    pub rate_per_mips: f64,

    #[serde(default)]
    pub power: PowerSpec,

    #[serde(default)]
    pub provisioner: ProvisionerSpec,
}

impl DeviceConfig {
    fn to_spec(&self) -> DeviceSpec {
        let mut spec = DeviceSpec::new(self.name.clone(), self.mips)
            .with_bandwidth(
                self.uplink_bandwidth.unwrap_or(f64::INFINITY),
                self.downlink_bandwidth.unwrap_or(f64::INFINITY),
            )
            .with_rate_per_mips(self.rate_per_mips)
            .with_power(self.power.clone())
            .with_provisioner(self.provisioner.clone());
        if let Some(ram) = self.ram {
            spec = spec.with_ram(ram);
        }
        spec
    }
}

/// A module declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub mips: f64,
    #[serde(default)]
    pub ram: u64,
}

/// A data-flow edge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub src: String,
    pub dst: String,
    pub tuple_type: String,
    pub kind: EdgeKind,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub cpu_length: f64,
    /// Defaults to down for actuator edges and up otherwise
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub periodicity: Option<SimTime>,
    #[serde(default)]
    pub deadline: Option<SimTime>,
}

impl EdgeConfig {
    fn to_edge(&self) -> AppEdge {
        let mut edge = AppEdge::new(
            self.src.clone(),
            self.dst.clone(),
            self.tuple_type.clone(),
            self.kind,
        )
        .with_size(self.size)
        .with_cpu_length(self.cpu_length);
        if let Some(direction) = self.direction {
            edge = edge.with_direction(direction);
        }
        edge.periodicity = self.periodicity;
        edge.deadline = self.deadline;
        edge
    }
}

/// A selectivity mapping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectivityConfig {
    pub module: String,
    pub input: String,
    pub output: String,
    pub fraction: f64,
}

/// The application graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub sensor_types: Vec<String>,
    #[serde(default)]
    pub actuator_types: Vec<String>,
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
    #[serde(default)]
    pub selectivities: Vec<SelectivityConfig>,
    #[serde(default)]
    pub loops: Vec<Vec<String>>,
}

/// A sensor instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub sensor_type: String,
    /// Gateway device name
    pub device: String,
    #[serde(default)]
    pub latency: SimTime,
    pub distribution: IntervalDistribution,
}

/// An actuator instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub name: String,
    pub actuator_type: String,
    /// Gateway device name
    pub device: String,
    #[serde(default)]
    pub latency: SimTime,
}

/// Placement strategy selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlacementKind {
    Mapping,
    #[default]
    Edgeward,
}

/// Placement configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlacementConfig {
    #[serde(default)]
    pub strategy: PlacementKind,

    /// Fixed assignments; pinned first under edge-ward placement
    #[serde(default)]
    pub mapping: ModuleMapping,
}

impl PlacementConfig {
    /// Instantiates the configured strategy.
    pub fn strategy(&self) -> Box<dyn PlacementStrategy> {
        match self.strategy {
            PlacementKind::Mapping => Box::new(MappingPlacement::new(self.mapping.clone())),
            PlacementKind::Edgeward => {
                Box::new(EdgewardPlacement::new().with_mapping(self.mapping.clone()))
            }
        }
    }
}

/// Complete scenario configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationSection,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub sensors: Vec<SensorConfig>,

    #[serde(default)]
    pub actuators: Vec<ActuatorConfig>,

    #[serde(default)]
    pub placement: PlacementConfig,
}

impl ScenarioConfig {
    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: ScenarioConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: ScenarioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Checks the records for problems the builders would not catch early.
    ///
    /// Structural problems (cycles, unknown graph entities, placement) are
    /// reported later with their own error types.
    pub fn validate(&self) -> ConfigResult<()> {
        let sim = &self.simulation;
        if !(sim.horizon.is_finite() && sim.horizon > 0.0) {
            return Err(ConfigError::Validation(format!(
                "Horizon must be a positive number, got {}",
                sim.horizon
            )));
        }
        if !LOG_LEVELS.contains(&sim.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown log level: {}",
                sim.log_level
            )));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate device name: {}",
                    device.name
                )));
            }
            if !(device.mips > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "Device {} must have positive mips",
                    device.name
                )));
            }
            if device.uplink_latency < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Device {} has a negative uplink latency",
                    device.name
                )));
            }
            let bandwidths = [device.uplink_bandwidth, device.downlink_bandwidth];
            if bandwidths.iter().flatten().any(|&b| !(b > 0.0)) {
                return Err(ConfigError::Validation(format!(
                    "Device {} must have positive bandwidths",
                    device.name
                )));
            }
        }
        for device in &self.devices {
            if let Some(parent) = &device.parent {
                if !names.contains(parent.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "Device {} references unknown parent {}",
                        device.name, parent
                    )));
                }
            }
        }

        for sensor in &self.sensors {
            if !names.contains(sensor.device.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Sensor {} references unknown device {}",
                    sensor.name, sensor.device
                )));
            }
            if sensor.latency < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Sensor {} has a negative latency",
                    sensor.name
                )));
            }
            sensor.distribution.validate().map_err(|e| {
                ConfigError::Validation(format!("Sensor {}: {}", sensor.name, e))
            })?;
        }
        for actuator in &self.actuators {
            if !names.contains(actuator.device.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Actuator {} references unknown device {}",
                    actuator.name, actuator.device
                )));
            }
        }

        if self.placement.strategy == PlacementKind::Mapping && self.placement.mapping.is_empty() {
            return Err(ConfigError::Validation(
                "Mapping placement requires a non-empty mapping".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the device tree.
    pub fn build_topology(&self) -> Result<Topology, TopologyError> {
        let mut topology = Topology::new();
        for device in &self.devices {
            topology.add_device(device.to_spec())?;
        }
        for device in &self.devices {
            if let Some(parent) = &device.parent {
                let child = lookup(&topology, &device.name)?;
                let parent = lookup(&topology, parent)?;
                topology.set_parent(child, parent, device.uplink_latency)?;
            }
        }
        topology.validate()?;
        Ok(topology)
    }

    /// Builds the application graph.
    pub fn build_application(&self) -> Result<Application, GraphError> {
        let spec = &self.application;
        let id = if spec.id.is_empty() {
            self.simulation.name.clone()
        } else {
            spec.id.clone()
        };
        let mut app = Application::new(id);

        for name in &spec.sensor_types {
            app.add_sensor_type(name.clone())?;
        }
        for name in &spec.actuator_types {
            app.add_actuator_type(name.clone())?;
        }
        for module in &spec.modules {
            app.add_module(
                module.name.clone(),
                ResourceDemand::mips(module.mips).with_ram(module.ram),
            )?;
        }
        for edge in &spec.edges {
            app.add_edge(edge.to_edge())?;
        }
        for s in &spec.selectivities {
            app.add_selectivity(&s.module, &s.input, &s.output, s.fraction)?;
        }
        for sequence in &spec.loops {
            app.add_loop(sequence.clone())?;
        }
        app.validate()?;
        Ok(app)
    }

    /// Builds sensors and actuators bound to `topology`.
    pub fn build_entities(
        &self,
        topology: &Topology,
    ) -> Result<(Vec<Sensor>, Vec<Actuator>), TopologyError> {
        let sensors = self
            .sensors
            .iter()
            .map(|s| {
                Ok(Sensor::new(
                    s.name.clone(),
                    s.sensor_type.clone(),
                    lookup(topology, &s.device)?,
                    s.latency,
                    s.distribution.clone(),
                ))
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;

        let actuators = self
            .actuators
            .iter()
            .map(|a| {
                Ok(Actuator::new(
                    a.name.clone(),
                    a.actuator_type.clone(),
                    lookup(topology, &a.device)?,
                    a.latency,
                ))
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;

        Ok((sensors, actuators))
    }

    /// Builds a controller with the application already submitted.
    pub fn into_controller(self) -> SimResult<Controller> {
        self.validate()?;
        let topology = self.build_topology()?;
        let application = self.build_application()?;
        let (sensors, actuators) = self.build_entities(&topology)?;

        let mut controller = Controller::new(topology, sensors, actuators)
            .with_params(self.simulation.to_params());
        let strategy = self.placement.strategy();
        controller.submit(application, strategy.as_ref())?;
        Ok(controller)
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Finds a device configuration by name.
    pub fn find_device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.name == name)
    }
}

fn lookup(topology: &Topology, name: &str) -> Result<usize, TopologyError> {
    topology
        .device_by_name(name)
        .ok_or_else(|| TopologyError::UnknownDevice(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    const TWO_TIER: &str = r#"
simulation:
  name: two-tier
  horizon: 50
  seed: 3
  log_level: debug

devices:
  - name: cloud
    mips: 1000
    power: { model: linear, busy: 100, idle: 80 }
  - name: edge
    parent: cloud
    uplink_latency: 2
    mips: 100
    uplink_bandwidth: 1000

application:
  id: app
  modules:
    - { name: detector, mips: 10 }
  sensor_types: [S]
  edges:
    - { src: S, dst: detector, tuple_type: RAW, kind: sensor, size: 100, cpu_length: 50 }
  loops:
    - [RAW, detector]

sensors:
  - name: s-0
    sensor_type: S
    device: edge
    latency: 1
    distribution: { type: deterministic, interval: 5 }
"#;

    #[test]
    fn test_default_config() {
        let config = ScenarioConfig::default();
        assert_eq!(config.simulation.horizon, 1000.0);
        assert_eq!(config.simulation.seed, 42);
        assert!(config.simulation.drain);
        assert_eq!(config.placement.strategy, PlacementKind::Edgeward);
    }

    #[test]
    fn test_yaml_parsing() {
        let config = ScenarioConfig::from_yaml(TWO_TIER).unwrap();
        assert_eq!(config.simulation.name, "two-tier");
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.find_device("edge").and_then(|d| d.parent.clone()), Some("cloud".into()));
        assert_eq!(config.application.edges[0].kind, EdgeKind::Sensor);
        assert_eq!(
            config.sensors[0].distribution,
            IntervalDistribution::deterministic(5.0)
        );
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "simulation": { "horizon": 10 },
            "devices": [ { "name": "cloud", "mips": 100 } ],
            "placement": { "strategy": "mapping", "mapping": { "m": ["cloud"] } }
        }"#;
        let config = ScenarioConfig::from_json(json).unwrap();
        assert_eq!(config.simulation.horizon, 10.0);
        assert_eq!(config.placement.strategy, PlacementKind::Mapping);
        assert_eq!(config.placement.mapping.devices_for("m"), &["cloud".to_string()]);
    }

    #[test]
    fn test_validation_errors() {
        let duplicate = "devices:\n  - { name: a, mips: 1 }\n  - { name: a, mips: 1 }\n";
        assert!(matches!(
            ScenarioConfig::from_yaml(duplicate),
            Err(ConfigError::Validation(_))
        ));

        let bad_parent = "devices:\n  - { name: a, mips: 1, parent: zzz }\n";
        assert!(ScenarioConfig::from_yaml(bad_parent).is_err());

        let bad_horizon = "simulation: { horizon: -1 }\n";
        assert!(ScenarioConfig::from_yaml(bad_horizon).is_err());

        let bad_level = "simulation: { log_level: loud }\n";
        assert!(ScenarioConfig::from_yaml(bad_level).is_err());
    }

    #[test]
    fn test_unknown_format() {
        assert!(matches!(
            ScenarioConfig::from_file("scenario.toml"),
            Err(ConfigError::UnknownFormat(ext)) if ext == "toml"
        ));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = ScenarioConfig::from_yaml(TWO_TIER).unwrap();
        let json = config.to_json().unwrap();
        let restored = ScenarioConfig::from_json(&json).unwrap();
        assert_eq!(restored.devices.len(), 2);
        assert_eq!(restored.application.loops, config.application.loops);

        let yaml = config.to_yaml().unwrap();
        let restored = ScenarioConfig::from_yaml(&yaml).unwrap();
        assert_eq!(restored.sensors[0].name, "s-0");
    }

    #[test]
    fn test_into_controller_runs() {
        let config = ScenarioConfig::from_yaml(TWO_TIER).unwrap();
        let mut controller = config.into_controller().unwrap();
        assert_eq!(controller.placement().map(|p| p.devices_for("detector").to_vec()), Some(vec![1]));

        let results = controller.run().unwrap();
        assert_eq!(results.metadata.name, "two-tier");
        assert_eq!(results.loops[0].completed, 10);
        assert!(results.device("cloud").map(|d| d.energy > 0.0).unwrap_or(false));
    }

    #[test]
    fn test_topology_errors_surface() {
        let yaml = r#"
devices:
  - { name: a, mips: 1 }
  - { name: b, mips: 1 }
"#;
        let config = ScenarioConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.into_controller(),
            Err(SimError::Topology(TopologyError::MissingParent(_)))
        ));
    }
}
