//! Parameter sweeps over independent scenarios.
//!
//! Every scenario gets its own controller and kernel; nothing is shared
//! between runs except the result sink. With the `parallel` feature the
//! runs execute on a rayon pool, otherwise one after another.
//!
//! # Feature Flag
//!
//! ```toml
//! [dependencies]
//! kiri = { version = "0.1", features = ["parallel"] }
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use parking_lot::Mutex;

use crate::config::ScenarioConfig;
use crate::error::SimResult;
use crate::stats::SimulationResults;

/// Outcome of one scenario in a sweep.
pub type SweepOutcome = SimResult<SimulationResults>;

/// Runs a batch of scenarios.
///
/// # Example
///
/// ```ignore
/// use kiri::sweep::SweepRunner;
///
/// let base = kiri::config::ScenarioConfig::from_file("scenario.yaml")?;
/// let outcomes = SweepRunner::with_seeds(base, 0..8).with_threads(4).run();
/// ```
#[derive(Debug, Default)]
pub struct SweepRunner {
    scenarios: Vec<ScenarioConfig>,
    /// Number of worker threads (0 = auto)
    num_threads: usize,
}

impl SweepRunner {
    /// Creates an empty sweep.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replicates `base` once per seed. Run names get the seed appended.
    pub fn with_seeds(base: ScenarioConfig, seeds: impl IntoIterator<Item = u64>) -> Self {
        let scenarios = seeds
            .into_iter()
            .map(|seed| {
                let mut scenario = base.clone();
                scenario.simulation.seed = seed;
                scenario.simulation.name = format!("{}-{}", base.simulation.name, seed);
                scenario
            })
            .collect();
        Self {
            scenarios,
            num_threads: 0,
        }
    }

    /// Sets the number of worker threads.
    ///
    /// Only has an effect with the `parallel` feature.
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Adds a scenario.
    pub fn add(&mut self, scenario: ScenarioConfig) {
        self.scenarios.push(scenario);
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Returns true if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Runs every scenario. Outcomes are in insertion order.
    pub fn run(self) -> Vec<SweepOutcome> {
        let total = self.scenarios.len();
        tracing::info!(scenarios = total, threads = self.num_threads, "Sweep started");

        let sink = Mutex::new(Vec::with_capacity(total));
        self.execute(&sink);

        let mut outcomes = sink.into_inner();
        outcomes.sort_by_key(|(index, _)| *index);

        let failed = outcomes.iter().filter(|(_, o)| o.is_err()).count();
        tracing::info!(scenarios = total, failed = failed, "Sweep finished");
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn execute(self, sink: &Mutex<Vec<(usize, SweepOutcome)>>) {
        for (index, scenario) in self.scenarios.into_iter().enumerate() {
            let outcome = run_scenario(scenario);
            sink.lock().push((index, outcome));
        }
    }

    #[cfg(feature = "parallel")]
    fn execute(self, sink: &Mutex<Vec<(usize, SweepOutcome)>>) {
        let scenarios = self.scenarios;
        let work = move || {
            scenarios
                .into_par_iter()
                .enumerate()
                .for_each(|(index, scenario)| {
                    let outcome = run_scenario(scenario);
                    sink.lock().push((index, outcome));
                });
        };

        if self.num_threads == 0 {
            return work();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                tracing::warn!(error = %e, "Could not build sweep thread pool, using the global one");
                work()
            }
        }
    }
}

fn run_scenario(scenario: ScenarioConfig) -> SweepOutcome {
    let name = scenario.simulation.name.clone();
    let mut controller = scenario.into_controller()?;
    let results = controller.run()?;
    tracing::debug!(
        name = name.as_str(),
        completed = results.completed(),
        "Sweep run finished"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    fn scenario(interval: f64) -> ScenarioConfig {
        let yaml = format!(
            r#"
simulation: {{ name: sweep, horizon: 20 }}
devices:
  - {{ name: cloud, mips: 1000 }}
  - {{ name: edge, parent: cloud, uplink_latency: 1, mips: 100 }}
application:
  id: app
  modules: [ {{ name: m, mips: 1 }} ]
  sensor_types: [S]
  edges:
    - {{ src: S, dst: m, tuple_type: RAW, kind: sensor, size: 10, cpu_length: 10 }}
  loops: [ [RAW, m] ]
sensors:
  - {{ name: s, sensor_type: S, device: edge, distribution: {{ type: deterministic, interval: {} }} }}
"#,
            interval
        );
        ScenarioConfig::from_yaml(&yaml).unwrap()
    }

    #[test]
    fn test_outcomes_in_input_order() {
        let mut sweep = SweepRunner::new().with_threads(2);
        sweep.add(scenario(10.0));
        sweep.add(scenario(5.0));
        sweep.add(scenario(2.0));
        assert_eq!(sweep.len(), 3);

        let completed: Vec<usize> = sweep
            .run()
            .into_iter()
            .map(|o| o.unwrap().completed())
            .collect();
        assert_eq!(completed, vec![2, 4, 10]);
    }

    #[test]
    fn test_seed_replication() {
        let outcomes = SweepRunner::with_seeds(scenario(5.0), [1, 2, 3]).run();
        let names: Vec<String> = outcomes
            .iter()
            .map(|o| o.as_ref().unwrap().metadata.name.clone())
            .collect();
        assert_eq!(names, vec!["sweep-1", "sweep-2", "sweep-3"]);
        assert_eq!(outcomes[1].as_ref().unwrap().metadata.seed, 2);
    }

    #[test]
    fn test_failed_scenario_does_not_stop_sweep() {
        let mut broken = scenario(5.0);
        broken.devices[1].parent = None;

        let mut sweep = SweepRunner::new();
        sweep.add(broken);
        sweep.add(scenario(5.0));

        let outcomes = sweep.run();
        assert!(matches!(outcomes[0], Err(SimError::Topology(_))));
        assert!(outcomes[1].is_ok());
    }

    #[test]
    fn test_empty_sweep() {
        let sweep = SweepRunner::new();
        assert!(sweep.is_empty());
        assert!(sweep.run().is_empty());
    }
}
