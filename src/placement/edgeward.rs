//! Greedy edge-ward placement.
//!
//! For every device with sensors attached, the modules reachable from those
//! sensors are placed, in data-flow order, on the device nearest the data
//! that is at or above their upstream modules and still has room. Modules
//! that no sensor feeds go on the root.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::{
    topological_order, Allocations, ModuleMapping, Placement, PlacementContext, PlacementStrategy,
};
use crate::application::Application;
use crate::error::PlacementError;
use crate::types::{DeviceId, EdgeKind};

/// Places modules as close to the data sources as capacity allows.
#[derive(Clone, Debug, Default)]
pub struct EdgewardPlacement {
    pinned: ModuleMapping,
}

impl EdgewardPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the mapped modules before greedy placement runs.
    pub fn with_mapping(mut self, mapping: ModuleMapping) -> Self {
        self.pinned = mapping;
        self
    }
}

/// Modules reachable from the given sensor types along data-flow edges.
fn reachable_modules(app: &Application, sensor_types: &BTreeSet<&str>) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<&str> = app
        .edges()
        .iter()
        .filter(|e| e.kind == EdgeKind::Sensor && sensor_types.contains(e.src.as_str()))
        .map(|e| e.dst.as_str())
        .collect();

    while let Some(module) = queue.pop_front() {
        if !seen.insert(module.to_string()) {
            continue;
        }
        for edge in app.edges() {
            if edge.kind == EdgeKind::Module && edge.src == module {
                queue.push_back(edge.dst.as_str());
            }
        }
    }
    seen
}

impl PlacementStrategy for EdgewardPlacement {
    fn assign(&self, ctx: &PlacementContext<'_>) -> Result<Placement, PlacementError> {
        let topology = ctx.topology;
        let app = ctx.application;
        let order = topological_order(app)?;

        let mut placement = Placement::new();
        let mut alloc = Allocations::new(topology.len());
        self.pinned.apply(ctx, &mut placement, &mut alloc)?;
        let pinned: HashSet<&str> = self.pinned.iter().map(|(m, _)| m).collect();

        let leaves: BTreeSet<DeviceId> = ctx.sensors.iter().map(|s| s.gateway).collect();

        for &leaf in &leaves {
            let leaf_name = topology
                .device(leaf)
                .map(|d| d.name().to_string())
                .ok_or_else(|| PlacementError::UnknownDevice(format!("#{}", leaf)))?;
            let sensor_types: BTreeSet<&str> = ctx
                .sensors
                .iter()
                .filter(|s| s.gateway == leaf)
                .map(|s| s.sensor_type.as_str())
                .collect();
            let reachable = reachable_modules(app, &sensor_types);
            let path = topology.path_to_root(leaf);

            // Index on `path` where each module ended up for this leaf
            let mut position: HashMap<&str, usize> = HashMap::new();

            for module in order.iter().filter(|m| reachable.contains(*m)) {
                let floor = app
                    .edges()
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Module && &e.dst == module)
                    .filter_map(|e| position.get(e.src.as_str()).copied())
                    .max()
                    .unwrap_or(0);

                if pinned.contains(module.as_str()) {
                    if let Some(i) = (floor..path.len()).find(|&i| placement.hosts(path[i], module)) {
                        position.insert(module.as_str(), i);
                    }
                    continue;
                }

                let demand = match app.module(module) {
                    Some(m) => &m.demand,
                    None => return Err(PlacementError::UnknownModule(module.clone())),
                };

                // Closest to the source first, then more remaining MIPS, then lower id
                let mut candidates: Vec<(usize, f64, DeviceId)> = (floor..path.len())
                    .filter(|&i| {
                        placement.hosts(path[i], module) || alloc.fits(topology, path[i], demand)
                    })
                    .map(|i| (i, alloc.remaining_mips(topology, path[i]), path[i]))
                    .collect();
                candidates.sort_by(|a, b| {
                    a.0.cmp(&b.0)
                        .then_with(|| b.1.total_cmp(&a.1))
                        .then_with(|| a.2.cmp(&b.2))
                });

                let Some(&(i, _, device)) = candidates.first() else {
                    return Err(PlacementError::InfeasiblePlacement {
                        module: module.clone(),
                        leaf: leaf_name,
                    });
                };

                if placement.add(module, device) {
                    alloc.reserve(device, demand);
                    tracing::debug!(
                        module = module.as_str(),
                        device = device,
                        leaf = leaf_name.as_str(),
                        "Placed module instance"
                    );
                }
                position.insert(module.as_str(), i);
            }
        }

        // Modules no sensor feeds go on the root
        let root = topology
            .root()
            .ok_or_else(|| PlacementError::UnknownDevice("root".to_string()))?;
        for module in &order {
            if placement.contains(module) {
                continue;
            }
            let demand = match app.module(module) {
                Some(m) => &m.demand,
                None => continue,
            };
            if !alloc.fits(topology, root, demand) {
                return Err(PlacementError::InfeasiblePlacement {
                    module: module.clone(),
                    leaf: topology.device(root).map(|d| d.name().to_string()).unwrap_or_default(),
                });
            }
            placement.add(module, root);
            alloc.reserve(root, demand);
            tracing::debug!(module = module.as_str(), "Placed unfed module on the root");
        }

        Ok(placement)
    }

    fn name(&self) -> &'static str {
        "edgeward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{AppEdge, ResourceDemand};
    use crate::distribution::IntervalDistribution;
    use crate::entity::Sensor;
    use crate::topology::{DeviceSpec, Topology};

    /// cloud(1000) -> gw(300) -> edge(100), sensor on edge
    fn fixture(edge_mips: f64) -> (Topology, Vec<Sensor>) {
        let mut topo = Topology::new();
        let cloud = topo.add_device(DeviceSpec::new("cloud", 1000.0)).unwrap();
        let gw = topo.add_device(DeviceSpec::new("gw", 300.0)).unwrap();
        let edge = topo.add_device(DeviceSpec::new("edge", edge_mips)).unwrap();
        topo.set_parent(gw, cloud, 10.0).unwrap();
        topo.set_parent(edge, gw, 2.0).unwrap();
        let sensors = vec![Sensor::new(
            "s",
            "S",
            edge,
            1.0,
            IntervalDistribution::deterministic(5.0),
        )];
        (topo, sensors)
    }

    fn chain(demands: &[f64]) -> Application {
        let mut app = Application::new("chain");
        app.add_sensor_type("S").unwrap();
        for (i, &d) in demands.iter().enumerate() {
            app.add_module(format!("m{}", i), ResourceDemand::mips(d)).unwrap();
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

    fn assign(topo: &Topology, app: &Application, sensors: &[Sensor]) -> Result<Placement, PlacementError> {
        EdgewardPlacement::new().assign(&PlacementContext {
            topology: topo,
            application: app,
            sensors,
            actuators: &[],
        })
    }

    #[test]
    fn test_places_at_the_edge_when_it_fits() {
        let (topo, sensors) = fixture(100.0);
        let app = chain(&[40.0, 40.0]);
        let p = assign(&topo, &app, &sensors).unwrap();
        assert_eq!(p.devices_for("m0"), &[2]);
        assert_eq!(p.devices_for("m1"), &[2]);
    }

    #[test]
    fn test_promotes_to_parent() {
        let (topo, sensors) = fixture(100.0);
        let app = chain(&[80.0, 80.0, 500.0]);
        let p = assign(&topo, &app, &sensors).unwrap();
        assert_eq!(p.devices_for("m0"), &[2]);
        assert_eq!(p.devices_for("m1"), &[1]);
        assert_eq!(p.devices_for("m2"), &[0]);
    }

    #[test]
    fn test_downstream_never_below_upstream() {
        let (topo, sensors) = fixture(100.0);
        // m0 does not fit the edge, m1 would, but must not sit below m0
        let app = chain(&[200.0, 10.0]);
        let p = assign(&topo, &app, &sensors).unwrap();
        assert_eq!(p.devices_for("m0"), &[1]);
        assert_eq!(p.devices_for("m1"), &[1]);
    }

    #[test]
    fn test_infeasible() {
        let (topo, sensors) = fixture(100.0);
        let app = chain(&[5000.0]);
        assert_eq!(
            assign(&topo, &app, &sensors),
            Err(PlacementError::InfeasiblePlacement {
                module: "m0".into(),
                leaf: "edge".into()
            })
        );
    }

    #[test]
    fn test_unfed_module_goes_to_root() {
        let (topo, sensors) = fixture(100.0);
        let mut app = chain(&[10.0]);
        app.add_module("report", ResourceDemand::mips(10.0)).unwrap();
        let p = assign(&topo, &app, &sensors).unwrap();
        assert_eq!(p.devices_for("report"), &[0]);
    }

    #[test]
    fn test_pinned_modules_respected() {
        let (topo, sensors) = fixture(100.0);
        let app = chain(&[10.0, 10.0]);
        let mut mapping = ModuleMapping::new();
        mapping.add_module_to_device("m0", "gw");
        let p = EdgewardPlacement::new()
            .with_mapping(mapping)
            .assign(&PlacementContext {
                topology: &topo,
                application: &app,
                sensors: &sensors,
                actuators: &[],
            })
            .unwrap();
        assert_eq!(p.devices_for("m0"), &[1]);
        // m1 cannot drop below its pinned upstream
        assert_eq!(p.devices_for("m1"), &[1]);
    }
}
