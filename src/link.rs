//! Network links between a device and its parent.
//!
//! Every tree edge carries two independent channels, one per
//! [`Direction`]. A channel transmits one tuple at a time: a transfer
//! starts once the channel is free, occupies it for `size / bandwidth`,
//! and is delivered `latency` after its last byte leaves.
//!
//! # Example
//!
//! ```
//! use kiri::link::Link;
//! use kiri::types::Direction;
//!
//! let mut link = Link::new(3, Direction::Up, 100.0, 1.0);
//! // Two transfers submitted together serialize on the channel
//! assert_eq!(link.transmit(0.0, 200.0), 3.0);
//! assert_eq!(link.transmit(0.0, 300.0), 6.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{DeviceId, Direction, SimTime};

/// One direction of the link between `child` and its parent.
#[derive(Clone, Debug)]
pub struct Link {
    /// Lower endpoint of the link
    pub child: DeviceId,
    pub direction: Direction,
    /// Bytes per time unit; infinite for an unconstrained link
    pub bandwidth: f64,
    pub latency: SimTime,
    free_at: SimTime,
    bytes: f64,
    transfers: u64,
    busy_time: SimTime,
    queued_time: SimTime,
}

impl Link {
    pub fn new(child: DeviceId, direction: Direction, bandwidth: f64, latency: SimTime) -> Self {
        Self {
            child,
            direction,
            bandwidth,
            latency,
            free_at: 0.0,
            bytes: 0.0,
            transfers: 0,
            busy_time: 0.0,
            queued_time: 0.0,
        }
    }

    /// Transmission time for `size` bytes, excluding propagation latency.
    pub fn serialization_time(&self, size: f64) -> SimTime {
        if self.bandwidth.is_infinite() || size <= 0.0 {
            0.0
        } else if self.bandwidth > 0.0 {
            size / self.bandwidth
        } else {
            SimTime::INFINITY
        }
    }

    /// Sends `size` bytes at `now` and returns the arrival time.
    pub fn transmit(&mut self, now: SimTime, size: f64) -> SimTime {
        let start = now.max(self.free_at);
        let duration = self.serialization_time(size);
        self.free_at = start + duration;

        self.queued_time += start - now;
        self.busy_time += duration;
        self.bytes += size.max(0.0);
        self.transfers += 1;

        self.free_at + self.latency
    }

    /// Snapshot of the link's counters.
    pub fn summary(&self, name: String, elapsed: SimTime) -> LinkSummary {
        LinkSummary {
            name,
            direction: self.direction,
            transfers: self.transfers,
            bytes: self.bytes,
            busy_time: self.busy_time,
            utilization: if elapsed > 0.0 {
                (self.busy_time / elapsed).min(1.0)
            } else {
                0.0
            },
            mean_queueing: if self.transfers > 0 {
                self.queued_time / self.transfers as f64
            } else {
                0.0
            },
        }
    }

    /// Number of transfers so far.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }
}

/// Per-link traffic statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkSummary {
    /// `child->parent` for up links, `parent->child` for down links
    pub name: String,
    pub direction: Direction,
    pub transfers: u64,
    pub bytes: f64,
    pub busy_time: SimTime,
    pub utilization: f64,
    /// Average wait for the channel before transmission started
    pub mean_queueing: SimTime,
}
