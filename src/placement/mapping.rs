//! Fixed module to device mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{modules_in_use, Allocations, Placement, PlacementContext, PlacementStrategy};
use crate::error::PlacementError;

/// Explicit module to device assignments, by name.
///
/// # Example
///
/// ```
/// use kiri::placement::ModuleMapping;
///
/// let mut mapping = ModuleMapping::new();
/// mapping.add_module_to_device("user_interface", "cloud");
/// mapping.add_module_to_device("detector", "m-0-0");
/// mapping.add_module_to_device("detector", "m-0-1");
/// assert_eq!(mapping.devices_for("detector").len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleMapping {
    assignments: BTreeMap<String, Vec<String>>,
}

impl ModuleMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an instance of `module` on the named device.
    pub fn add_module_to_device(&mut self, module: impl Into<String>, device: impl Into<String>) {
        let device = device.into();
        let devices = self.assignments.entry(module.into()).or_default();
        if !devices.contains(&device) {
            devices.push(device);
        }
    }

    /// Device names requested for `module`.
    pub fn devices_for(&self, module: &str) -> &[String] {
        self.assignments
            .get(module)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterates over `(module, device names)` pairs in module order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.assignments
            .iter()
            .map(|(m, d)| (m.as_str(), d.as_slice()))
    }

    /// Returns true if the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Resolves names into `placement`, reserving resources in `alloc`.
    ///
    /// Assignments that overflow a device are kept and logged.
    pub(crate) fn apply(
        &self,
        ctx: &PlacementContext<'_>,
        placement: &mut Placement,
        alloc: &mut Allocations,
    ) -> Result<(), PlacementError> {
        for (module, devices) in self.iter() {
            let demand = &ctx
                .application
                .module(module)
                .ok_or_else(|| PlacementError::UnknownModule(module.to_string()))?
                .demand;

            for name in devices {
                let device = ctx
                    .topology
                    .device_by_name(name)
                    .ok_or_else(|| PlacementError::UnknownDevice(name.clone()))?;

                if !placement.add(module, device) {
                    continue;
                }
                if !alloc.fits(ctx.topology, device, demand) {
                    tracing::warn!(
                        module = module,
                        device = name.as_str(),
                        "Mapped module exceeds the device's remaining capacity"
                    );
                }
                alloc.reserve(device, demand);
            }
        }
        Ok(())
    }
}

/// Places modules exactly where a [`ModuleMapping`] says.
#[derive(Clone, Debug, Default)]
pub struct MappingPlacement {
    mapping: ModuleMapping,
}

impl MappingPlacement {
    pub fn new(mapping: ModuleMapping) -> Self {
        Self { mapping }
    }
}

impl PlacementStrategy for MappingPlacement {
    fn assign(&self, ctx: &PlacementContext<'_>) -> Result<Placement, PlacementError> {
        let mut placement = Placement::new();
        let mut alloc = Allocations::new(ctx.topology.len());
        self.mapping.apply(ctx, &mut placement, &mut alloc)?;

        if let Some(missing) = modules_in_use(ctx.application)
            .into_iter()
            .find(|m| !placement.contains(m))
        {
            return Err(PlacementError::UnassignedModule(missing.to_string()));
        }

        tracing::debug!(modules = placement.len(), "Fixed mapping resolved");
        Ok(placement)
    }

    fn name(&self) -> &'static str {
        "mapping"
    }
}
