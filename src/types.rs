//! Core type definitions for the simulation engine.
//!
//! This module defines the fundamental identifiers and enums shared by the
//! topology, application graph, placement and kernel layers.

use serde::{Deserialize, Serialize};

/// Simulation time unit.
///
/// Time is continuous: latencies, service times (`cpu_length / mips`) and
/// transfer times (`size / bandwidth`) are fractional. The scenario files
/// conventionally express it in milliseconds.
pub type SimTime = f64;

/// Identifier of a device in the topology.
///
/// Devices are numbered densely in insertion order, so the id doubles as an
/// index into per-device runtime state.
pub type DeviceId = usize;

/// Identifier of a sensor within a controller.
pub type SensorId = usize;

/// Identifier of an actuator within a controller.
pub type ActuatorId = usize;

/// Identifier of a declared application loop (its index in the application).
pub type LoopId = usize;

/// Identifier of a single tuple instance.
pub type TupleId = u64;

/// Direction in which a tuple travels through the device tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Toward the root (cloud).
    #[default]
    Up,
    /// Toward the leaves (edge devices, actuators).
    Down,
}

/// Semantic kind of a data-flow edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Sensor-originated: a sensor type feeds a module.
    Sensor,
    /// Inter-module.
    Module,
    /// Module output consumed by an actuator.
    Actuator,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_default_is_up() {
        assert_eq!(Direction::default(), Direction::Up);
    }

    #[test]
    fn test_enum_serialization() {
        assert_eq!(serde_json::to_string(&Direction::Down).unwrap(), "\"down\"");
        let kind: EdgeKind = serde_json::from_str("\"actuator\"").unwrap();
        assert_eq!(kind, EdgeKind::Actuator);
    }
}
