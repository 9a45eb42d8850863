//! Run results and their export formats.
//!
//! A finished run produces a [`SimulationResults`] record: loop latency
//! summaries, per-device utilization and energy, per-link traffic and the
//! list of loop instances that never completed. It exports to JSON, CSV
//! and a human-readable text summary.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

use crate::link::LinkSummary;
use crate::loops::{AbortedInstance, LoopSummary};
use crate::types::SimTime;

/// Results of a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationResults {
    /// Run metadata
    pub metadata: RunMetadata,

    /// Simulation time when the run was finalized
    pub final_time: SimTime,

    /// Kernel counters
    pub counters: KernelCounters,

    /// One entry per declared loop
    pub loops: Vec<LoopSummary>,

    /// One entry per device
    pub devices: Vec<DeviceSummary>,

    /// One entry per used link direction
    pub links: Vec<LinkSummary>,

    /// Sum of `size * latency` over every hop
    pub network_usage: f64,

    /// Loop instances that did not complete
    pub aborted: Vec<AbortedInstance>,

    /// Wall-clock timing
    pub timing: TimingStats,
}

/// Metadata about the run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Scenario name
    pub name: String,

    /// Crate version that produced the results
    pub version: String,

    /// Placement strategy used
    pub placement: String,

    /// RNG seed
    pub seed: u64,

    /// Start time (wall clock)
    pub start_time: Option<String>,

    /// End time (wall clock)
    pub end_time: Option<String>,
}

/// Event and tuple counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelCounters {
    pub events_processed: u64,
    pub events_scheduled: u64,
    pub peak_event_queue: usize,
    pub tuples_created: u64,
    pub tuples_processed: u64,
    pub actuator_deliveries: u64,
}

/// Per-device statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub name: String,
    pub level: usize,
    pub busy_time: SimTime,
    /// Busy fraction of the elapsed simulation time
    pub utilization: f64,
    /// Energy in watt time units
    pub energy: f64,
    /// `rate_per_mips * MI executed`
    pub cost: f64,
    pub tuples_processed: u64,
    pub peak_queue: usize,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Events processed per second
    pub events_per_second: f64,
}

impl SimulationResults {
    /// Total completed loop instances.
    pub fn completed(&self) -> usize {
        self.loops.iter().map(|l| l.completed).sum()
    }

    /// Summary of one loop.
    pub fn loop_summary(&self, loop_id: usize) -> Option<&LoopSummary> {
        self.loops.iter().find(|l| l.loop_id == loop_id)
    }

    /// Summary of a device by name.
    pub fn device(&self, name: &str) -> Option<&DeviceSummary> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Total energy over all devices.
    pub fn total_energy(&self) -> f64 {
        self.devices.iter().map(|d| d.energy).sum()
    }

    /// Records the start time.
    pub fn record_start(&mut self) {
        self.metadata.start_time = Some(chrono_now());
    }

    /// Records the end time.
    pub fn record_end(&mut self) {
        self.metadata.end_time = Some(chrono_now());
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;
        if wall_time_ms > 0.0 {
            self.timing.events_per_second =
                self.counters.events_processed as f64 / (wall_time_ms / 1000.0);
        }
    }

    /// Exports results to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports results to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports per-loop statistics to CSV.
    pub fn loops_to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("loop_id,sequence,completed,aborted,mean,min,max,p50,p95,p99\n");

        let cell = |v: Option<f64>| v.map(|x| format!("{:.4}", x)).unwrap_or_default();
        for l in &self.loops {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{}\n",
                l.loop_id,
                l.sequence.join(" "),
                l.completed,
                l.aborted,
                cell(l.mean),
                cell(l.min),
                cell(l.max),
                cell(l.p50),
                cell(l.p95),
                cell(l.p99),
            ));
        }
        csv
    }

    /// Exports per-device statistics to CSV.
    pub fn devices_to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str("device,level,busy_time,utilization,energy,cost,tuples_processed,peak_queue\n");

        for d in &self.devices {
            csv.push_str(&format!(
                "{},{},{:.4},{:.6},{:.4},{:.4},{},{}\n",
                d.name,
                d.level,
                d.busy_time,
                d.utilization,
                d.energy,
                d.cost,
                d.tuples_processed,
                d.peak_queue,
            ));
        }
        csv
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Results ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        writeln!(w, "Placement: {}", self.metadata.placement)?;
        writeln!(w, "Final simulation time: {:.3}", self.final_time)?;
        writeln!(w, "Events processed: {}", self.counters.events_processed)?;
        writeln!(w, "Tuples created: {}", self.counters.tuples_created)?;
        writeln!(w)?;

        writeln!(w, "--- Loops ---")?;
        for l in &self.loops {
            match l.mean {
                Some(mean) => writeln!(
                    w,
                    "[{}] {}: {} completed, {} aborted, mean {:.3}, p95 {:.3}",
                    l.loop_id,
                    l.label(),
                    l.completed,
                    l.aborted,
                    mean,
                    l.p95.unwrap_or(mean)
                )?,
                None => writeln!(
                    w,
                    "[{}] {}: no completions, {} aborted",
                    l.loop_id,
                    l.label(),
                    l.aborted
                )?,
            }
        }
        writeln!(w)?;

        writeln!(w, "--- Devices ---")?;
        for d in &self.devices {
            writeln!(
                w,
                "{} (level {}): utilization {:.2}%, energy {:.2}, cost {:.2}",
                d.name,
                d.level,
                d.utilization * 100.0,
                d.energy,
                d.cost
            )?;
        }
        writeln!(w)?;

        writeln!(w, "Network usage: {:.2}", self.network_usage)?;
        writeln!(w, "Aborted loop instances: {}", self.aborted.len())?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Returns current timestamp as string.
fn chrono_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::AbortReason;

    fn sample() -> SimulationResults {
        let mut results = SimulationResults::default();
        results.metadata.name = "Summary Test".into();
        results.final_time = 100.0;
        results.loops.push(LoopSummary::from_samples(
            0,
            vec!["TEMP".into(), "detector".into()],
            &[2.0, 4.0],
            1,
        ));
        results.devices.push(DeviceSummary {
            name: "cloud".into(),
            level: 0,
            busy_time: 25.0,
            utilization: 0.25,
            energy: 10.0,
            cost: 1.5,
            tuples_processed: 12,
            peak_queue: 2,
        });
        results.aborted.push(AbortedInstance {
            loop_id: 0,
            instance: 3,
            started_at: 99.0,
            reason: AbortReason::SimulationEnded,
        });
        results
    }

    #[test]
    fn test_json_export() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("Summary Test"));
        assert!(json.contains("simulation_ended"));

        let back: SimulationResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back.loops[0].completed, 2);
    }

    #[test]
    fn test_csv_export() {
        let results = sample();
        let loops = results.loops_to_csv();
        assert!(loops.starts_with("loop_id,"));
        assert!(loops.contains("0,TEMP detector,2,1,3.0000,2.0000,4.0000"));

        let devices = results.devices_to_csv();
        assert!(devices.contains("cloud,0,25.0000,0.250000,10.0000,1.5000,12,2"));
    }

    #[test]
    fn test_summary_output() {
        let results = sample();
        let summary = results.summary();
        assert!(summary.contains("Summary Test"));
        assert!(summary.contains("TEMP -> detector"));
        assert!(summary.contains("Aborted loop instances: 1"));
        assert_eq!(results.completed(), 2);
        assert_eq!(results.total_energy(), 10.0);
        assert!(results.device("cloud").is_some());
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }
}
