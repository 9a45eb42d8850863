//! Module placement: binding application modules to devices.
//!
//! A [`PlacementStrategy`] turns a [`PlacementContext`] into a
//! [`Placement`]. Two strategies are provided:
//!
//! - [`MappingPlacement`]: an explicit module to device mapping
//! - [`EdgewardPlacement`]: greedy placement close to the data sources
//!
//! Placement runs once when an application is submitted; the result is
//! immutable for the rest of the run.

mod edgeward;
mod mapping;

pub use edgeward::EdgewardPlacement;
pub use mapping::{MappingPlacement, ModuleMapping};

use std::collections::{HashMap, HashSet, VecDeque};

use crate::application::{Application, ResourceDemand};
use crate::entity::{Actuator, Sensor};
use crate::error::PlacementError;
use crate::power::ResourceProvisioner;
use crate::topology::Topology;
use crate::types::{DeviceId, EdgeKind};

/// Everything a strategy may look at.
#[derive(Clone, Copy)]
pub struct PlacementContext<'a> {
    pub topology: &'a Topology,
    pub application: &'a Application,
    pub sensors: &'a [Sensor],
    pub actuators: &'a [Actuator],
}

/// Strategy that maps modules onto devices.
pub trait PlacementStrategy {
    /// Computes a placement, or explains why none exists.
    fn assign(&self, ctx: &PlacementContext<'_>) -> Result<Placement, PlacementError>;

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;
}

/// Module to device bindings, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Placement {
    entries: Vec<(String, Vec<DeviceId>)>,
    index: HashMap<String, usize>,
}

impl Placement {
    /// Creates an empty placement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an instance of `module` to `device`.
    ///
    /// Returns false if that binding already existed.
    pub fn add(&mut self, module: &str, device: DeviceId) -> bool {
        let slot = match self.index.get(module) {
            Some(&i) => i,
            None => {
                self.entries.push((module.to_string(), Vec::new()));
                self.index.insert(module.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        let devices = &mut self.entries[slot].1;
        if devices.contains(&device) {
            return false;
        }
        devices.push(device);
        true
    }

    /// Devices hosting an instance of `module`.
    pub fn devices_for(&self, module: &str) -> &[DeviceId] {
        self.index
            .get(module)
            .map(|&i| self.entries[i].1.as_slice())
            .unwrap_or(&[])
    }

    /// Returns true if `module` has at least one instance.
    pub fn contains(&self, module: &str) -> bool {
        !self.devices_for(module).is_empty()
    }

    /// Returns true if `device` hosts an instance of `module`.
    pub fn hosts(&self, device: DeviceId, module: &str) -> bool {
        self.devices_for(module).contains(&device)
    }

    /// Modules with an instance on `device`, in insertion order.
    pub fn modules_on(&self, device: DeviceId) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, devices)| devices.contains(&device))
            .map(|(m, _)| m.as_str())
            .collect()
    }

    /// Iterates over `(module, devices)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DeviceId])> {
        self.entries.iter().map(|(m, d)| (m.as_str(), d.as_slice()))
    }

    /// Number of placed modules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is placed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Running per-device resource allocations.
#[derive(Clone, Debug)]
pub(crate) struct Allocations {
    mips: Vec<f64>,
    ram: Vec<f64>,
}

impl Allocations {
    pub(crate) fn new(devices: usize) -> Self {
        Self {
            mips: vec![0.0; devices],
            ram: vec![0.0; devices],
        }
    }

    /// Remaining MIPS as seen by the device's provisioner.
    pub(crate) fn remaining_mips(&self, topology: &Topology, device: DeviceId) -> f64 {
        topology
            .device(device)
            .map(|d| d.spec.provisioner.capacity_for(d.spec.capacity.mips, self.mips[device]))
            .unwrap_or(0.0)
    }

    /// Returns true if `demand` fits on `device`.
    pub(crate) fn fits(&self, topology: &Topology, device: DeviceId, demand: &ResourceDemand) -> bool {
        let Some(d) = topology.device(device) else {
            return false;
        };
        let ram_left = d
            .spec
            .provisioner
            .capacity_for(d.spec.capacity.ram as f64, self.ram[device]);
        self.remaining_mips(topology, device) >= demand.mips && ram_left >= demand.ram as f64
    }

    pub(crate) fn reserve(&mut self, device: DeviceId, demand: &ResourceDemand) {
        self.mips[device] += demand.mips;
        self.ram[device] += demand.ram as f64;
    }
}

/// Modules referenced as an endpoint of some edge.
pub(crate) fn modules_in_use(app: &Application) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut used = Vec::new();
    for edge in app.edges() {
        for name in [edge.src.as_str(), edge.dst.as_str()] {
            if app.is_module(name) && seen.insert(name) {
                used.push(name);
            }
        }
    }
    used
}

/// Orders modules along the data flow using Kahn's algorithm.
///
/// Every module appears after all modules feeding it. Ties keep name order.
pub(crate) fn topological_order(app: &Application) -> Result<Vec<String>, PlacementError> {
    let names: Vec<&str> = app.modules().map(|m| m.name.as_str()).collect();

    // Edge: src -> dst (src must be placed before dst)
    let mut adj: HashMap<&str, Vec<&str>> = names.iter().map(|&n| (n, Vec::new())).collect();
    let mut in_degree: HashMap<&str, usize> = names.iter().map(|&n| (n, 0)).collect();

    for edge in app.edges().iter().filter(|e| e.kind == EdgeKind::Module) {
        if let Some(out) = adj.get_mut(edge.src.as_str()) {
            out.push(edge.dst.as_str());
        }
        if let Some(deg) = in_degree.get_mut(edge.dst.as_str()) {
            *deg += 1;
        }
    }

    let mut queue: VecDeque<&str> = names
        .iter()
        .copied()
        .filter(|n| in_degree.get(n) == Some(&0))
        .collect();

    let mut order = Vec::with_capacity(names.len());
    while let Some(module) = queue.pop_front() {
        order.push(module.to_string());
        for &next in adj.get(module).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(deg) = in_degree.get_mut(next) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(next);
                }
            }
        }
    }

    if order.len() != names.len() {
        return Err(PlacementError::CyclicDataflow);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{AppEdge, ResourceDemand};

    #[test]
    fn test_placement_dedup_and_order() {
        let mut p = Placement::new();
        assert!(p.add("b", 1));
        assert!(p.add("a", 0));
        assert!(!p.add("b", 1));
        assert!(p.add("b", 2));

        let modules: Vec<_> = p.iter().map(|(m, _)| m).collect();
        assert_eq!(modules, vec!["b", "a"]);
        assert_eq!(p.devices_for("b"), &[1, 2]);
        assert_eq!(p.modules_on(1), vec!["b"]);
        assert!(p.devices_for("zzz").is_empty());
    }

    #[test]
    fn test_topological_order() {
        let mut app = Application::new("t");
        for m in ["c", "b", "a"] {
            app.add_module(m, ResourceDemand::mips(1.0)).unwrap();
        }
        app.add_edge(AppEdge::new("c", "b", "X", EdgeKind::Module)).unwrap();
        app.add_edge(AppEdge::new("b", "a", "Y", EdgeKind::Module)).unwrap();
        assert_eq!(topological_order(&app).unwrap(), vec!["c", "b", "a"]);

        app.add_edge(AppEdge::new("a", "c", "Z", EdgeKind::Module)).unwrap();
        assert_eq!(topological_order(&app), Err(PlacementError::CyclicDataflow));
    }
}
