//! Shared scenario builders for the integration tests.

#![allow(dead_code)]

use kiri::application::{AppEdge, Application, ResourceDemand};
use kiri::distribution::IntervalDistribution;
use kiri::entity::{Actuator, Sensor};
use kiri::placement::{MappingPlacement, ModuleMapping};
use kiri::topology::{DeviceSpec, Topology};
use kiri::types::EdgeKind;
use kiri::{Controller, SimulationParams};

/// Fixed latencies on the sense-to-actuate path of [`three_tier`].
pub const SENSOR_LATENCY: f64 = 1.0;
pub const EDGE_LATENCY: f64 = 2.0;
pub const GATEWAY_LATENCY: f64 = 10.0;
pub const ACTUATOR_LATENCY: f64 = 1.0;

/// Sum of every fixed link latency a loop instance crosses.
pub fn fixed_path_latency() -> f64 {
    SENSOR_LATENCY + 2.0 * (EDGE_LATENCY + GATEWAY_LATENCY) + ACTUATOR_LATENCY
}

/// cloud(1000 MIPS) <- gateway(500) <- edge(100).
pub fn topology() -> Topology {
    let mut topo = Topology::new();
    let cloud = topo
        .add_device(DeviceSpec::new("cloud", 1000.0).with_power(kiri::power::PowerSpec::linear(100.0, 80.0)))
        .unwrap();
    let gw = topo.add_device(DeviceSpec::new("gateway", 500.0)).unwrap();
    let edge = topo
        .add_device(DeviceSpec::new("edge", 100.0).with_rate_per_mips(0.01))
        .unwrap();
    topo.set_parent(gw, cloud, GATEWAY_LATENCY).unwrap();
    topo.set_parent(edge, gw, EDGE_LATENCY).unwrap();
    topo
}

/// Sensor -> detect -> decide -> actuator, with one tracked loop.
pub fn application(detect_cpu: f64) -> Application {
    let mut app = Application::new("control");
    app.add_sensor_type("S").unwrap();
    app.add_actuator_type("A").unwrap();
    app.add_module("detect", ResourceDemand::mips(10.0)).unwrap();
    app.add_module("decide", ResourceDemand::mips(10.0)).unwrap();
    app.add_edge(
        AppEdge::new("S", "detect", "RAW", EdgeKind::Sensor)
            .with_size(100.0)
            .with_cpu_length(detect_cpu),
    )
    .unwrap();
    app.add_edge(
        AppEdge::new("detect", "decide", "EVT", EdgeKind::Module)
            .with_size(50.0)
            .with_cpu_length(100.0),
    )
    .unwrap();
    app.add_edge(AppEdge::new("decide", "A", "CMD", EdgeKind::Actuator).with_size(10.0))
        .unwrap();
    app.add_selectivity("detect", "RAW", "EVT", 1.0).unwrap();
    app.add_selectivity("decide", "EVT", "CMD", 1.0).unwrap();
    app.add_loop(vec!["RAW".into(), "detect".into(), "decide".into(), "A".into()])
        .unwrap();
    app
}

/// detect on the edge, decide in the cloud.
pub fn split_mapping() -> MappingPlacement {
    let mut mapping = ModuleMapping::new();
    mapping.add_module_to_device("detect", "edge");
    mapping.add_module_to_device("decide", "cloud");
    MappingPlacement::new(mapping)
}

/// A controller over [`topology`] with one sensor and one actuator on the
/// edge device.
pub fn controller(interval: f64, horizon: f64) -> Controller {
    let topo = topology();
    let edge = topo.device_by_name("edge").unwrap();
    let sensors = vec![Sensor::new(
        "s-0",
        "S",
        edge,
        SENSOR_LATENCY,
        IntervalDistribution::deterministic(interval),
    )];
    let actuators = vec![Actuator::new("a-0", "A", edge, ACTUATOR_LATENCY)];
    Controller::new(topo, sensors, actuators)
        .with_params(SimulationParams::default().with_horizon(horizon))
}
