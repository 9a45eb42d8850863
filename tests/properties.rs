//! Property-based tests for topology, selectivity and placement.

use proptest::prelude::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use kiri::application::{AppEdge, Application, ResourceDemand, Selectivity};
use kiri::distribution::IntervalDistribution;
use kiri::entity::Sensor;
use kiri::error::TopologyError;
use kiri::placement::{
    EdgewardPlacement, MappingPlacement, ModuleMapping, PlacementContext, PlacementStrategy,
};
use kiri::topology::{DeviceSpec, Topology};
use kiri::types::EdgeKind;

/// Parent links of a plain model, used as the reference for cycle checks.
fn model_reaches(parents: &[Option<usize>], from: usize, target: usize) -> bool {
    let mut current = Some(from);
    let mut steps = 0;
    while let Some(d) = current {
        if d == target {
            return true;
        }
        current = parents[d];
        steps += 1;
        if steps > parents.len() {
            return false;
        }
    }
    false
}

fn chain_application(demands: &[f64]) -> Application {
    let mut app = Application::new("chain");
    app.add_sensor_type("S").unwrap();
    for (i, &mips) in demands.iter().enumerate() {
        app.add_module(format!("m{}", i), ResourceDemand::mips(mips)).unwrap();
    }
    app.add_edge(AppEdge::new("S", "m0", "T0", EdgeKind::Sensor)).unwrap();
    for i in 1..demands.len() {
        app.add_edge(AppEdge::new(
            format!("m{}", i - 1),
            format!("m{}", i),
            format!("T{}", i),
            EdgeKind::Module,
        ))
        .unwrap();
    }
    app
}

fn chain_topology(capacities: &[f64]) -> Topology {
    let mut topo = Topology::new();
    let mut previous = None;
    for (i, &mips) in capacities.iter().enumerate() {
        let id = topo.add_device(DeviceSpec::new(format!("d{}", i), mips)).unwrap();
        if let Some(parent) = previous {
            topo.set_parent(id, parent, 1.0).unwrap();
        }
        previous = Some(id);
    }
    topo
}

proptest! {
    #[test]
    fn test_cycle_only_on_back_edges(
        n in 2usize..10,
        links in prop::collection::vec((0usize..10, 0usize..10), 1..30),
    ) {
        let mut topo = Topology::new();
        for i in 0..n {
            topo.add_device(DeviceSpec::new(format!("d{}", i), 100.0)).unwrap();
        }
        let mut parents: Vec<Option<usize>> = vec![None; n];

        for (child, parent) in links {
            let (child, parent) = (child % n, parent % n);
            let back_edge = model_reaches(&parents, parent, child);

            match topo.set_parent(child, parent, 1.0) {
                Err(TopologyError::Cycle { .. }) => prop_assert!(back_edge),
                Ok(()) => {
                    prop_assert!(!back_edge);
                    parents[child] = Some(parent);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }

            for d in 0..n {
                let path = topo.path_to_root(d);
                prop_assert!(path.len() <= n);
                let mut sorted = path.clone();
                sorted.sort_unstable();
                sorted.dedup();
                prop_assert_eq!(sorted.len(), path.len());
            }
        }
    }

    #[test]
    fn test_selectivity_converges(fraction in 0.0f64..=1.0, seed in any::<u64>()) {
        let selectivity = Selectivity::new(fraction);
        let mut rng = Pcg64::seed_from_u64(seed);
        let trials = 4000;
        let total: u32 = (0..trials).map(|_| selectivity.sample(&mut rng)).sum();
        let observed = total as f64 / trials as f64;
        prop_assert!((observed - fraction).abs() < 0.05, "observed {} for {}", observed, fraction);
    }

    #[test]
    fn test_edgeward_respects_capacity(
        capacities in prop::collection::vec(10.0f64..2000.0, 2..5),
        demands in prop::collection::vec(1.0f64..800.0, 1..5),
    ) {
        let topo = chain_topology(&capacities);
        let app = chain_application(&demands);
        let leaf = capacities.len() - 1;
        let sensors = vec![Sensor::new("s", "S", leaf, 0.0, IntervalDistribution::deterministic(1.0))];
        let ctx = PlacementContext {
            topology: &topo,
            application: &app,
            sensors: &sensors,
            actuators: &[],
        };

        if let Ok(placement) = EdgewardPlacement::new().assign(&ctx) {
            for device in 0..capacities.len() {
                let used: f64 = placement
                    .modules_on(device)
                    .iter()
                    .filter_map(|m| app.module(m))
                    .map(|m| m.demand.mips)
                    .sum();
                prop_assert!(used <= capacities[device] + 1e-9);
            }
            for i in 0..demands.len() {
                let name = format!("m{}", i);
                prop_assert!(placement.contains(&name));
            }
        }
    }

    #[test]
    fn test_mapping_round_trips(assignment in prop::collection::vec(0usize..3, 1..5)) {
        let topo = chain_topology(&[1000.0, 500.0, 100.0]);
        let demands = vec![1.0; assignment.len()];
        let app = chain_application(&demands);

        let mut mapping = ModuleMapping::new();
        for (i, &device) in assignment.iter().enumerate() {
            mapping.add_module_to_device(format!("m{}", i), format!("d{}", device));
        }
        let ctx = PlacementContext {
            topology: &topo,
            application: &app,
            sensors: &[],
            actuators: &[],
        };
        let placement = MappingPlacement::new(mapping).assign(&ctx).unwrap();

        prop_assert_eq!(placement.len(), assignment.len());
        for (i, &device) in assignment.iter().enumerate() {
            prop_assert_eq!(placement.devices_for(&format!("m{}", i)), &[device][..]);
        }
    }
}
