//! Tuples: the discrete messages that flow through the simulation.

use serde::{Deserialize, Serialize};

use crate::application::AppEdge;
use crate::types::{ActuatorId, DeviceId, Direction, EdgeKind, LoopId, SimTime, TupleId};

/// Where a tuple is headed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A module instance on a device
    Module(DeviceId),
    /// An actuator
    Actuator(ActuatorId),
}

/// Membership of a tuple in a running loop instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopTag {
    /// Declared loop
    pub loop_id: LoopId,
    /// Instance within the tracker
    pub instance: u64,
    /// Index of the loop element this tuple is heading to
    pub next: usize,
}

/// A single message instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tuple {
    pub id: TupleId,
    pub tuple_type: String,
    /// Source entity (sensor type or module)
    pub src: String,
    /// Destination entity (module or actuator type)
    pub dst: String,
    pub kind: EdgeKind,
    pub direction: Direction,
    /// Network size in bytes
    pub size: f64,
    /// Processing length in million instructions
    pub cpu_length: f64,
    pub created_at: SimTime,
    /// Absolute deadline; infinite when the edge declares none
    pub deadline: SimTime,
    /// Device where the originating data entered the network
    pub origin: DeviceId,
    /// Resolved destination, set when the tuple is routed
    pub target: Option<Target>,
    pub loop_tags: Vec<LoopTag>,
}

impl Tuple {
    /// Instantiates a tuple for `edge`.
    pub fn from_edge(id: TupleId, edge: &AppEdge, now: SimTime, origin: DeviceId) -> Self {
        Self {
            id,
            tuple_type: edge.tuple_type.clone(),
            src: edge.src.clone(),
            dst: edge.dst.clone(),
            kind: edge.kind,
            direction: edge.direction,
            size: edge.size,
            cpu_length: edge.cpu_length,
            created_at: now,
            deadline: edge.deadline.map_or(SimTime::INFINITY, |d| now + d),
            origin,
            target: None,
            loop_tags: Vec::new(),
        }
    }
}
