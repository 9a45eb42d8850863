//! Run-control tests for the controller.
//!
//! Verifies lifecycle errors, construction-time failures and how a
//! dispatch error halts a running simulation.

mod common;

use kiri::application::{AppEdge, Application, ResourceDemand};
use kiri::error::{GraphError, PlacementError, RuntimeError, SimError, TopologyError};
use kiri::placement::{EdgewardPlacement, Placement, PlacementContext, PlacementStrategy};
use kiri::topology::{DeviceSpec, Topology};
use kiri::types::EdgeKind;
use kiri::{Controller, RunState};

/// Places nothing at all.
struct EmptyPlacement;

impl PlacementStrategy for EmptyPlacement {
    fn assign(&self, _ctx: &PlacementContext<'_>) -> Result<Placement, PlacementError> {
        Ok(Placement::new())
    }

    fn name(&self) -> &'static str {
        "empty"
    }
}

#[test]
fn test_stop_before_start_has_no_side_effects() {
    let mut controller = common::controller(5.0, 50.0);
    assert_eq!(controller.stop().unwrap_err(), RuntimeError::NotRunning);
    assert_eq!(controller.start().unwrap_err(), RuntimeError::NotSubmitted);
    assert_eq!(controller.state(), RunState::Idle);
    assert!(controller.results().is_none());
    assert_eq!(controller.sensors().len(), 1);
}

#[test]
fn test_double_start_fails() {
    let mut controller = common::controller(5.0, 50.0);
    controller
        .submit(common::application(100.0), &common::split_mapping())
        .unwrap();
    controller.start().unwrap();
    assert_eq!(controller.start().unwrap_err(), RuntimeError::AlreadyRunning);
    assert_eq!(controller.state(), RunState::Running);

    controller.run_until(20.0).unwrap();
    let results = controller.stop().unwrap();
    assert_eq!(results.final_time, 20.0);
    assert_eq!(controller.start().unwrap_err(), RuntimeError::Finished);
}

#[test]
fn test_invalid_topology_rejected_at_submit() {
    let mut topo = Topology::new();
    topo.add_device(DeviceSpec::new("a", 10.0)).unwrap();
    topo.add_device(DeviceSpec::new("b", 10.0)).unwrap();
    let mut controller = Controller::new(topo, vec![], vec![]);

    let err = controller
        .submit(common::application(100.0), &EdgewardPlacement::new())
        .unwrap_err();
    assert!(matches!(err, SimError::Topology(TopologyError::MissingParent(_))));
    assert_eq!(controller.state(), RunState::Idle);
}

#[test]
fn test_infeasible_placement_rejected() {
    let mut app = Application::new("heavy");
    app.add_sensor_type("S").unwrap();
    app.add_actuator_type("A").unwrap();
    app.add_module("m", ResourceDemand::mips(5000.0)).unwrap();
    app.add_edge(AppEdge::new("S", "m", "RAW", EdgeKind::Sensor)).unwrap();

    let mut controller = common::controller(5.0, 50.0);
    let err = controller.submit(app, &EdgewardPlacement::new()).unwrap_err();
    assert!(matches!(
        err,
        SimError::Placement(PlacementError::InfeasiblePlacement { .. })
    ));
    assert!(controller.placement().is_none());
}

#[test]
fn test_unknown_actuator_type_rejected() {
    // No declaration for the actuator type the controller's actuator uses
    let mut bare = Application::new("bare");
    bare.add_sensor_type("S").unwrap();
    bare.add_module("detect", ResourceDemand::mips(1.0)).unwrap();
    bare.add_edge(AppEdge::new("S", "detect", "RAW", EdgeKind::Sensor))
        .unwrap();

    let mut controller = common::controller(5.0, 50.0);
    let err = controller.submit(bare, &EdgewardPlacement::new()).unwrap_err();
    assert!(matches!(err, SimError::Graph(GraphError::UnknownEntity(name)) if name == "A"));

    assert_eq!(controller.state(), RunState::Idle);
    assert!(controller
        .submit(common::application(100.0), &common::split_mapping())
        .is_ok());
}

#[test]
fn test_zero_interval_sensor_rejected_at_submit() {
    let mut controller = common::controller(0.0, 50.0);
    let err = controller
        .submit(common::application(100.0), &common::split_mapping())
        .unwrap_err();
    assert!(matches!(err, SimError::Graph(GraphError::InvalidEntity { name, .. }) if name == "s-0"));
    assert_eq!(controller.state(), RunState::Idle);
    assert!(controller.placement().is_none());
    assert_eq!(controller.start().unwrap_err(), RuntimeError::NotSubmitted);
}

#[test]
fn test_dispatch_error_halts_run() {
    let mut controller = common::controller(5.0, 50.0);
    controller
        .submit(common::application(100.0), &EmptyPlacement)
        .unwrap();

    let err = controller.run().unwrap_err();
    assert_eq!(err, RuntimeError::UnplacedModule("detect".into()));
    assert_eq!(controller.state(), RunState::Finished);

    let results = controller.results().unwrap();
    assert_eq!(results.metadata.placement, "empty");
    assert_eq!(results.final_time, 6.0);
    assert_eq!(results.aborted.len(), 1);
}

#[test]
fn test_missing_actuator_instance_is_no_route() {
    let topo = common::topology();
    let edge = topo.device_by_name("edge").unwrap();
    let sensors = vec![kiri::Sensor::new(
        "s",
        "S",
        edge,
        1.0,
        kiri::IntervalDistribution::deterministic(5.0),
    )];
    let mut controller = Controller::new(topo, sensors, vec![]);
    controller
        .submit(common::application(100.0), &common::split_mapping())
        .unwrap();

    match controller.run() {
        Err(RuntimeError::NoRoute { target, .. }) => assert_eq!(target, "A"),
        other => panic!("unexpected outcome: {:?}", other.map(|r| r.completed())),
    }
    assert_eq!(controller.state(), RunState::Finished);
}
