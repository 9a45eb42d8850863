//! Event definitions and the global event queue.
//!
//! Every state change in a run is driven by an [`Event`] popped from the
//! [`EventQueue`]. Events are ordered by time, and events at the same time
//! by the order in which they were scheduled, so runs are deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::tuple::Tuple;
use crate::types::{ActuatorId, DeviceId, SensorId, SimTime};

/// Where a newly created tuple enters the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// Emitted by a sensor; travels the sensor link to its gateway
    Sensor(SensorId),
    /// Emitted by a module instance on a device
    Device(DeviceId),
}

/// What happens when an event fires.
#[derive(Clone, Debug)]
pub enum EventKind {
    /// A sensor emits and schedules its next transmission
    SensorTick { sensor: SensorId },
    /// A tuple comes into existence and is routed
    TupleCreated { tuple: Tuple, source: Source },
    /// A tuple reaches a device
    TupleArrived { tuple: Tuple, device: DeviceId },
    /// The device finishes the job it was running
    ProcessingComplete { device: DeviceId },
    /// A module instance emits on a periodic edge
    PeriodicEmit { edge: usize, device: DeviceId },
    /// A tuple reaches an actuator
    ActuatorArrival { tuple: Tuple, actuator: ActuatorId },
}

impl EventKind {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::SensorTick { .. } => "sensor_tick",
            EventKind::TupleCreated { .. } => "tuple_created",
            EventKind::TupleArrived { .. } => "tuple_arrived",
            EventKind::ProcessingComplete { .. } => "processing_complete",
            EventKind::PeriodicEmit { .. } => "periodic_emit",
            EventKind::ActuatorArrival { .. } => "actuator_arrival",
        }
    }
}

/// A scheduled event.
#[derive(Clone, Debug)]
pub struct Event {
    /// The simulation time at which this event occurs
    pub time: SimTime,
    /// Scheduling order, breaks ties between equal times
    pub seq: u64,
    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    // Reversed so the max-heap pops the earliest event first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered priority queue of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Event>,
    next_seq: u64,
    peak: usize,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `kind` at `time`.
    pub fn schedule(&mut self, time: SimTime, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Event { time, seq, kind });
        self.peak = self.peak.max(self.heap.len());
    }

    /// Removes and returns the earliest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop()
    }

    /// Removes the earliest event if it is due at or before `limit`.
    pub fn pop_until(&mut self, limit: SimTime) -> Option<Event> {
        match self.peek_time() {
            Some(t) if t <= limit => self.heap.pop(),
            _ => None,
        }
    }

    /// Time of the earliest pending event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|e| e.time)
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Largest number of events pending at once.
    pub fn peak_len(&self) -> usize {
        self.peak
    }

    /// Total events ever scheduled.
    pub fn scheduled(&self) -> u64 {
        self.next_seq
    }
}
