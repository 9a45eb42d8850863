//! Loop instance tracking.
//!
//! Each traversal of a declared application loop is an instance with a
//! small state machine:
//!
//! ```text
//! Pending --(creating event dispatched)--> InFlight --(reaches last element)--> Completed
//!    |                                        |
//!    +-------------------+--------------------+
//!                        v
//!                     Aborted (filtered out, or the run ended first)
//! ```
//!
//! An instance may be carried by several tuples at once when an output
//! fans out. It completes on the first carrier that reaches the end and is
//! aborted as filtered once its last carrier disappears.

use serde::{Deserialize, Serialize};

use crate::application::AppLoop;
use crate::types::{LoopId, SimTime};

/// Why an instance did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The run stopped while the instance was open
    SimulationEnded,
    /// Every carrying tuple was consumed without reaching the end
    Filtered,
}

/// Lifecycle state of a loop instance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LoopState {
    Pending,
    InFlight,
    Completed { latency: SimTime },
    Aborted(AbortReason),
}

impl LoopState {
    /// Returns true once the instance can no longer change.
    pub fn is_closed(&self) -> bool {
        matches!(self, LoopState::Completed { .. } | LoopState::Aborted(_))
    }
}

#[derive(Clone, Debug)]
struct Instance {
    loop_id: LoopId,
    started_at: SimTime,
    state: LoopState,
    carriers: u32,
}

/// An instance that did not complete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AbortedInstance {
    pub loop_id: LoopId,
    pub instance: u64,
    pub started_at: SimTime,
    pub reason: AbortReason,
}

/// Tracks every loop instance of a run.
#[derive(Clone, Debug, Default)]
pub struct LoopTracker {
    instances: Vec<Instance>,
    /// Completed latencies per loop
    latencies: Vec<Vec<SimTime>>,
    aborted: Vec<AbortedInstance>,
}

impl LoopTracker {
    /// Creates a tracker for `loop_count` declared loops.
    pub fn new(loop_count: usize) -> Self {
        Self {
            instances: Vec::new(),
            latencies: vec![Vec::new(); loop_count],
            aborted: Vec::new(),
        }
    }

    /// Opens a pending instance and returns its id.
    pub fn start(&mut self, loop_id: LoopId, now: SimTime) -> u64 {
        self.instances.push(Instance {
            loop_id,
            started_at: now,
            state: LoopState::Pending,
            carriers: 0,
        });
        (self.instances.len() - 1) as u64
    }

    /// Marks a pending instance as in flight.
    pub fn activate(&mut self, instance: u64) {
        if let Some(inst) = self.get_mut(instance) {
            if inst.state == LoopState::Pending {
                inst.state = LoopState::InFlight;
            }
        }
    }

    /// Records one more tuple carrying the instance.
    pub fn add_carrier(&mut self, instance: u64) {
        if let Some(inst) = self.get_mut(instance) {
            inst.carriers += 1;
        }
    }

    /// Records that a carrying tuple was consumed.
    ///
    /// The instance is aborted as filtered when its last carrier goes away
    /// before it completed.
    pub fn release_carrier(&mut self, instance: u64) {
        let Some(inst) = self.get_mut(instance) else {
            return;
        };
        inst.carriers = inst.carriers.saturating_sub(1);
        if inst.carriers == 0 && !inst.state.is_closed() {
            self.abort(instance, AbortReason::Filtered);
        }
    }

    /// Closes the instance with `latency = now - start`.
    ///
    /// Returns the latency, or `None` if the instance was already closed.
    pub fn complete(&mut self, instance: u64, now: SimTime) -> Option<SimTime> {
        let inst = self.get_mut(instance)?;
        if inst.state.is_closed() {
            return None;
        }
        let latency = now - inst.started_at;
        inst.state = LoopState::Completed { latency };
        let loop_id = inst.loop_id;
        if let Some(samples) = self.latencies.get_mut(loop_id) {
            samples.push(latency);
        }
        Some(latency)
    }

    /// Aborts every open instance.
    pub fn finalize(&mut self) {
        for instance in 0..self.instances.len() as u64 {
            if !self.instances[instance as usize].state.is_closed() {
                self.abort(instance, AbortReason::SimulationEnded);
            }
        }
    }

    /// State of an instance.
    pub fn state(&self, instance: u64) -> Option<LoopState> {
        self.instances.get(instance as usize).map(|i| i.state)
    }

    /// Completed latencies of a loop, in completion order.
    pub fn latencies(&self, loop_id: LoopId) -> &[SimTime] {
        self.latencies.get(loop_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Instances that did not complete.
    pub fn aborted(&self) -> &[AbortedInstance] {
        &self.aborted
    }

    /// Number of aborted instances of one loop.
    pub fn aborted_count(&self, loop_id: LoopId) -> usize {
        self.aborted.iter().filter(|a| a.loop_id == loop_id).count()
    }

    /// Number of instances currently open.
    pub fn open_count(&self) -> usize {
        self.instances.iter().filter(|i| !i.state.is_closed()).count()
    }

    /// Summarizes one declared loop.
    pub fn summarize(&self, loop_id: LoopId, declared: &AppLoop) -> LoopSummary {
        LoopSummary::from_samples(
            loop_id,
            declared.sequence.clone(),
            self.latencies(loop_id),
            self.aborted_count(loop_id),
        )
    }

    fn abort(&mut self, instance: u64, reason: AbortReason) {
        let Some(inst) = self.instances.get_mut(instance as usize) else {
            return;
        };
        inst.state = LoopState::Aborted(reason);
        tracing::warn!(
            loop_id = inst.loop_id,
            instance = instance,
            reason = ?reason,
            "Loop instance aborted"
        );
        self.aborted.push(AbortedInstance {
            loop_id: inst.loop_id,
            instance,
            started_at: inst.started_at,
            reason,
        });
    }

    fn get_mut(&mut self, instance: u64) -> Option<&mut Instance> {
        self.instances.get_mut(instance as usize)
    }
}

/// Latency statistics of one declared loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub loop_id: LoopId,
    pub sequence: Vec<String>,
    pub completed: usize,
    pub aborted: usize,
    pub mean: Option<SimTime>,
    pub min: Option<SimTime>,
    pub max: Option<SimTime>,
    pub p50: Option<SimTime>,
    pub p95: Option<SimTime>,
    pub p99: Option<SimTime>,
}

impl LoopSummary {
    /// Builds a summary from raw latency samples.
    pub fn from_samples(
        loop_id: LoopId,
        sequence: Vec<String>,
        samples: &[SimTime],
        aborted: usize,
    ) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = if sorted.is_empty() {
            None
        } else {
            Some(sorted.iter().sum::<f64>() / sorted.len() as f64)
        };

        Self {
            loop_id,
            sequence,
            completed: sorted.len(),
            aborted,
            mean,
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }

    /// The loop rendered as `a -> b -> c`.
    pub fn label(&self) -> String {
        self.sequence.join(" -> ")
    }
}

/// Nearest-rank percentile of already sorted samples.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}
