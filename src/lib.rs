//! # Kiri Fog Simulation Framework
//!
//! A discrete-event simulator for fog and edge computing hierarchies.
//! Applications are directed data-flow graphs of modules fed by sensors and
//! feeding actuators; they are placed onto a tree of devices running from
//! the cloud down to the edge, and the engine measures how long control
//! loops take, how busy each device is and how much energy it draws.
//!
//! ## Design Principles
//!
//! - **Tree Topology**: Devices form a rooted tree. Each device owns the
//!   link to its parent, with latency and per-direction bandwidth.
//! - **Data-Flow Applications**: Modules, typed edges, selectivities and
//!   latency-tracked loops describe what the application does.
//! - **Pluggable Placement**: Fixed mappings and edge-ward greedy placement
//!   implement the same [`PlacementStrategy`] trait.
//! - **Single Timeline**: One event queue ordered by time, then by
//!   scheduling order. Runs are deterministic for a given seed.
//!
//! ## Features
//!
//! - `parallel` - Run parameter sweeps on a rayon thread pool
//!
//! ## Quick Start
//!
//! ```rust
//! use kiri::application::{AppEdge, Application, ResourceDemand};
//! use kiri::distribution::IntervalDistribution;
//! use kiri::entity::Sensor;
//! use kiri::placement::EdgewardPlacement;
//! use kiri::topology::{DeviceSpec, Topology};
//! use kiri::types::EdgeKind;
//! use kiri::{Controller, SimulationParams};
//!
//! let mut topo = Topology::new();
//! let cloud = topo.add_device(DeviceSpec::new("cloud", 1000.0)).unwrap();
//! let edge = topo.add_device(DeviceSpec::new("edge", 100.0)).unwrap();
//! topo.set_parent(edge, cloud, 2.0).unwrap();
//!
//! let mut app = Application::new("monitor");
//! app.add_sensor_type("Temp").unwrap();
//! app.add_module("filter", ResourceDemand::mips(10.0)).unwrap();
//! app.add_edge(AppEdge::new("Temp", "filter", "TEMP", EdgeKind::Sensor).with_cpu_length(50.0))
//!     .unwrap();
//! app.add_loop(vec!["TEMP".into(), "filter".into()]).unwrap();
//!
//! let sensor = Sensor::new("t0", "Temp", edge, 1.0, IntervalDistribution::deterministic(5.0));
//! let mut controller = Controller::new(topo, vec![sensor], Vec::new())
//!     .with_params(SimulationParams::default().with_horizon(50.0));
//! controller.submit(app, &EdgewardPlacement::new()).unwrap();
//!
//! let results = controller.run().unwrap();
//! println!("{}", results.summary());
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use kiri::config::ScenarioConfig;
//!
//! let config = ScenarioConfig::from_file("scenario.yaml")?;
//! kiri::init_logging(&config.simulation.log_level);
//! let results = config.into_controller()?.run()?;
//! ```

pub mod types;
pub mod error;
pub mod power;
pub mod topology;
pub mod application;
pub mod distribution;
pub mod entity;
pub mod placement;
pub mod tuple;
pub mod event;
pub mod link;
pub mod loops;
pub mod kernel;
pub mod controller;
pub mod config;
pub mod stats;
pub mod sweep;

/// Crate version recorded in run metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use types::{ActuatorId, DeviceId, Direction, EdgeKind, LoopId, SensorId, SimTime, TupleId};
pub use error::{GraphError, PlacementError, RuntimeError, SimError, SimResult, TopologyError};
pub use topology::{DeviceSpec, Topology};
pub use application::{AppEdge, Application, ResourceDemand};
pub use distribution::{IntervalDistribution, TransmitDistribution};
pub use entity::{Actuator, Sensor};
pub use placement::{EdgewardPlacement, MappingPlacement, ModuleMapping, Placement, PlacementStrategy};
pub use kernel::{Kernel, KernelConfig, QueueDiscipline};
pub use controller::{Controller, RunState, SimulationParams};
pub use config::{ConfigError, ScenarioConfig};
pub use stats::{SimulationResults, Timer};
pub use sweep::SweepRunner;

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// kiri::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
