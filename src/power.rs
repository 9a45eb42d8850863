//! Power and resource-provisioning strategies for devices.
//!
//! Devices carry tagged configuration ([`PowerSpec`], [`ProvisionerSpec`])
//! rather than subclass variants. The kernel and the placement engine only
//! talk to the [`PowerModel`] and [`ResourceProvisioner`] traits, so new
//! curves or overbooking policies plug in without touching either.

use serde::{Deserialize, Serialize};

/// Maps processor utilization to instantaneous power draw.
pub trait PowerModel {
    /// Power draw in watts at `utilization` (clamped to `[0, 1]`).
    fn power_at(&self, utilization: f64) -> f64;
}

/// Decides how much of a resource is still available for allocation.
pub trait ResourceProvisioner {
    /// Remaining capacity given the device's `total` capacity and the amount
    /// already `allocated` to placed module instances.
    fn capacity_for(&self, total: f64, allocated: f64) -> f64;
}

/// Power model configuration for a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PowerSpec {
    /// Linear interpolation between idle and busy draw.
    Linear { busy: f64, idle: f64 },
    /// Constant draw regardless of load.
    Constant { watts: f64 },
}

impl PowerSpec {
    /// Creates a linear power model.
    pub fn linear(busy: f64, idle: f64) -> Self {
        PowerSpec::Linear { busy, idle }
    }
}

impl Default for PowerSpec {
    fn default() -> Self {
        PowerSpec::Constant { watts: 0.0 }
    }
}

impl PowerModel for PowerSpec {
    fn power_at(&self, utilization: f64) -> f64 {
        let u = utilization.clamp(0.0, 1.0);
        match *self {
            PowerSpec::Linear { busy, idle } => idle + (busy - idle) * u,
            PowerSpec::Constant { watts } => watts,
        }
    }
}

/// Provisioner configuration for a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ProvisionerSpec {
    /// Allocations may not exceed the physical capacity.
    #[default]
    Simple,
    /// Capacity is inflated by `ratio` before allocations are subtracted.
    Overbooking { ratio: f64 },
}

impl ResourceProvisioner for ProvisionerSpec {
    fn capacity_for(&self, total: f64, allocated: f64) -> f64 {
        let provisioned = match *self {
            ProvisionerSpec::Simple => total,
            ProvisionerSpec::Overbooking { ratio } => total * ratio.max(0.0),
        };
        (provisioned - allocated).max(0.0)
    }
}
