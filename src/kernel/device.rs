//! Per-device processing state.
//!
//! A device runs one job at a time. Waiting jobs sit in a queue ordered by
//! the configured [`QueueDiscipline`]. Busy and idle periods are integrated
//! as they end, so energy and utilization are exact at any instant.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::power::PowerModel;
use crate::topology::DeviceSpec;
use crate::tuple::Tuple;
use crate::types::SimTime;

/// Order in which a busy device serves waiting tuples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueDiscipline {
    /// First come, first served
    #[default]
    Fifo,
    /// Earliest absolute deadline first, arrival order on ties
    EarliestDeadline,
}

/// A tuple waiting for or receiving service.
#[derive(Clone, Debug)]
pub struct Job {
    pub tuple: Tuple,
    pub arrival: u64,
}

impl Job {
    fn deadline(&self) -> SimTime {
        self.tuple.deadline
    }
}

struct DeadlineJob(Job);

impl PartialEq for DeadlineJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DeadlineJob {}

impl PartialOrd for DeadlineJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeadlineJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .deadline()
            .total_cmp(&self.0.deadline())
            .then_with(|| other.0.arrival.cmp(&self.0.arrival))
    }
}

enum ProcessingQueue {
    Fifo(VecDeque<Job>),
    Deadline(BinaryHeap<DeadlineJob>),
}

impl ProcessingQueue {
    fn new(discipline: QueueDiscipline) -> Self {
        match discipline {
            QueueDiscipline::Fifo => ProcessingQueue::Fifo(VecDeque::new()),
            QueueDiscipline::EarliestDeadline => ProcessingQueue::Deadline(BinaryHeap::new()),
        }
    }

    fn push(&mut self, job: Job) {
        match self {
            ProcessingQueue::Fifo(q) => q.push_back(job),
            ProcessingQueue::Deadline(q) => q.push(DeadlineJob(job)),
        }
    }

    fn pop(&mut self) -> Option<Job> {
        match self {
            ProcessingQueue::Fifo(q) => q.pop_front(),
            ProcessingQueue::Deadline(q) => q.pop().map(|j| j.0),
        }
    }

    fn len(&self) -> usize {
        match self {
            ProcessingQueue::Fifo(q) => q.len(),
            ProcessingQueue::Deadline(q) => q.len(),
        }
    }
}

/// Runtime state of one device.
pub struct DeviceState {
    mips: f64,
    busy_power: f64,
    idle_power: f64,
    rate_per_mips: f64,
    queue: ProcessingQueue,
    running: Option<Job>,
    last_change: SimTime,
    next_arrival: u64,
    pub busy_time: SimTime,
    pub energy: f64,
    pub mi_executed: f64,
    pub processed: u64,
    pub peak_queue: usize,
}

impl DeviceState {
    pub fn new(spec: &DeviceSpec, discipline: QueueDiscipline) -> Self {
        Self {
            mips: spec.capacity.mips,
            busy_power: spec.power.power_at(1.0),
            idle_power: spec.power.power_at(0.0),
            rate_per_mips: spec.rate_per_mips,
            queue: ProcessingQueue::new(discipline),
            running: None,
            last_change: 0.0,
            next_arrival: 0,
            busy_time: 0.0,
            energy: 0.0,
            mi_executed: 0.0,
            processed: 0,
            peak_queue: 0,
        }
    }

    /// Service time of a tuple on this device.
    pub fn service_time(&self, tuple: &Tuple) -> SimTime {
        if tuple.cpu_length <= 0.0 {
            0.0
        } else if self.mips > 0.0 {
            tuple.cpu_length / self.mips
        } else {
            SimTime::INFINITY
        }
    }

    /// Returns true while a job is in service.
    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Queues a tuple for processing.
    ///
    /// Returns the completion time if the device was idle and service
    /// started immediately.
    pub fn submit(&mut self, tuple: Tuple, now: SimTime) -> Option<SimTime> {
        let job = Job {
            tuple,
            arrival: self.next_arrival,
        };
        self.next_arrival += 1;

        if self.running.is_some() {
            self.queue.push(job);
            self.peak_queue = self.peak_queue.max(self.queue.len());
            return None;
        }
        Some(self.begin(job, now))
    }

    /// Finishes the running job and starts the next waiting one.
    ///
    /// Returns the finished job and, if another job started, its completion
    /// time.
    pub fn complete(&mut self, now: SimTime) -> (Option<Job>, Option<SimTime>) {
        self.account(now);
        let finished = self.running.take();
        if let Some(job) = &finished {
            self.processed += 1;
            self.mi_executed += job.tuple.cpu_length.max(0.0);
        }
        let next = self.queue.pop().map(|job| self.begin(job, now));
        (finished, next)
    }

    /// Integrates busy/idle time up to `now`.
    pub fn account(&mut self, now: SimTime) {
        let dt = (now - self.last_change).max(0.0);
        if self.running.is_some() {
            self.busy_time += dt;
            self.energy += dt * self.busy_power;
        } else {
            self.energy += dt * self.idle_power;
        }
        self.last_change = now.max(self.last_change);
    }

    /// Processing cost so far.
    pub fn cost(&self) -> f64 {
        self.rate_per_mips * self.mi_executed
    }

    /// Number of jobs waiting.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn begin(&mut self, job: Job, now: SimTime) -> SimTime {
        self.account(now);
        let done = now + self.service_time(&job.tuple);
        self.running = Some(job);
        done
    }
}
