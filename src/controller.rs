//! Simulation controller (orchestrator).
//!
//! The [`Controller`] owns the topology and the leaf entities, accepts one
//! application at a time, runs placement, and drives the kernel through its
//! lifecycle:
//!
//! ```text
//! Idle --submit--> Submitted --start--> Running --stop--> Finished
//! ```
//!
//! Run-control errors leave the controller exactly as it was.
//!
//! # Example
//!
//! ```
//! use kiri::application::{AppEdge, Application, ResourceDemand};
//! use kiri::controller::{Controller, SimulationParams};
//! use kiri::distribution::IntervalDistribution;
//! use kiri::entity::Sensor;
//! use kiri::placement::EdgewardPlacement;
//! use kiri::topology::{DeviceSpec, Topology};
//! use kiri::types::EdgeKind;
//!
//! let mut topology = Topology::new();
//! let cloud = topology.add_device(DeviceSpec::new("cloud", 1000.0)).unwrap();
//! let edge = topology.add_device(DeviceSpec::new("edge", 100.0)).unwrap();
//! topology.set_parent(edge, cloud, 2.0).unwrap();
//!
//! let sensors = vec![Sensor::new("s", "S", edge, 1.0, IntervalDistribution::deterministic(5.0))];
//! let mut controller = Controller::new(topology, sensors, vec![])
//!     .with_params(SimulationParams::default().with_horizon(50.0));
//!
//! let mut app = Application::new("demo");
//! app.add_sensor_type("S").unwrap();
//! app.add_module("m", ResourceDemand::mips(10.0)).unwrap();
//! app.add_edge(AppEdge::new("S", "m", "RAW", EdgeKind::Sensor).with_cpu_length(10.0)).unwrap();
//! app.add_loop(vec!["RAW".into(), "m".into()]).unwrap();
//!
//! controller.submit(app, &EdgewardPlacement::new()).unwrap();
//! let results = controller.run().unwrap();
//! assert_eq!(results.loops[0].completed, 10);
//! ```

use serde::{Deserialize, Serialize};

use crate::application::Application;
use crate::entity::{Actuator, Sensor};
use crate::error::{GraphError, RuntimeError, SimResult, TopologyError};
use crate::kernel::{Kernel, KernelConfig, QueueDiscipline};
use crate::placement::{Placement, PlacementContext, PlacementStrategy};
use crate::stats::{SimulationResults, Timer};
use crate::topology::Topology;
use crate::types::SimTime;

/// Run parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Scenario name used in results
    pub name: String,
    /// Generators stop after this time
    pub horizon: SimTime,
    /// Seed of the run's random number generator
    pub seed: u64,
    /// Process in-flight events after the horizon
    pub drain: bool,
    /// Upper bound for draining; unbounded when absent
    pub drain_limit: Option<SimTime>,
    /// Device queue discipline
    pub queue: QueueDiscipline,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            name: "simulation".to_string(),
            horizon: 1000.0,
            seed: 42,
            drain: true,
            drain_limit: None,
            queue: QueueDiscipline::Fifo,
        }
    }
}

impl SimulationParams {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_horizon(mut self, horizon: SimTime) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_drain(mut self, drain: bool, limit: Option<SimTime>) -> Self {
        self.drain = drain;
        self.drain_limit = limit;
        self
    }

    pub fn with_queue(mut self, queue: QueueDiscipline) -> Self {
        self.queue = queue;
        self
    }
}

/// Lifecycle state of a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Nothing submitted yet
    Idle,
    /// Application placed, kernel built
    Submitted,
    Running,
    /// Results available; a new submission starts over
    Finished,
}

/// Wires topology, entities, application and placement into a kernel.
pub struct Controller {
    topology: Topology,
    /// Held here until a submission moves them into the kernel
    sensors: Vec<Sensor>,
    actuators: Vec<Actuator>,
    params: SimulationParams,
    state: RunState,
    kernel: Option<Kernel>,
    placement_name: &'static str,
    timer: Option<Timer>,
    results: Option<SimulationResults>,
}

impl Controller {
    /// Creates a controller over a topology and its leaf entities.
    pub fn new(topology: Topology, sensors: Vec<Sensor>, actuators: Vec<Actuator>) -> Self {
        Self {
            topology,
            sensors,
            actuators,
            params: SimulationParams::default(),
            state: RunState::Idle,
            kernel: None,
            placement_name: "",
            timer: None,
            results: None,
        }
    }

    /// Sets the run parameters.
    pub fn with_params(mut self, params: SimulationParams) -> Self {
        self.params = params;
        self
    }

    /// Validates everything, places `application` and builds the kernel.
    ///
    /// Replaces a previous submission unless a run is in progress.
    pub fn submit(
        &mut self,
        application: Application,
        strategy: &dyn PlacementStrategy,
    ) -> SimResult<&Placement> {
        if self.state == RunState::Running {
            return Err(RuntimeError::AlreadyRunning.into());
        }

        self.topology.validate()?;
        application.validate()?;
        self.check_bindings(&application)?;

        let placement = strategy.assign(&PlacementContext {
            topology: &self.topology,
            application: &application,
            sensors: self.sensors(),
            actuators: &self.actuators,
        })?;

        tracing::info!(
            application = application.id(),
            strategy = strategy.name(),
            modules = placement.len(),
            "Application placed"
        );
        for (module, devices) in placement.iter() {
            tracing::debug!(module = module, devices = ?devices, "Placement");
        }

        let sensors = match self.kernel.take() {
            Some(kernel) => kernel.into_sensors(),
            None => std::mem::take(&mut self.sensors),
        };
        let kernel = Kernel::new(
            self.topology.clone(),
            application,
            placement,
            sensors,
            self.actuators.clone(),
            KernelConfig {
                horizon: self.params.horizon,
                seed: self.params.seed,
                discipline: self.params.queue,
            },
        );
        self.placement_name = strategy.name();
        self.state = RunState::Submitted;
        Ok(self.kernel.insert(kernel).placement())
    }

    /// Starts the submitted run.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        match self.state {
            RunState::Idle => Err(RuntimeError::NotSubmitted),
            RunState::Running => Err(RuntimeError::AlreadyRunning),
            RunState::Finished => Err(RuntimeError::Finished),
            RunState::Submitted => {
                let kernel = self.kernel.as_mut().ok_or(RuntimeError::NotSubmitted)?;
                self.timer = Some(Timer::start());
                kernel.start();
                self.state = RunState::Running;
                tracing::info!(name = self.params.name.as_str(), "Simulation started");
                Ok(())
            }
        }
    }

    /// Advances a running simulation to `time`.
    ///
    /// A dispatch error halts the run: the kernel is finalized, the partial
    /// results are kept and the error is returned.
    pub fn run_until(&mut self, time: SimTime) -> Result<(), RuntimeError> {
        let kernel = self.running_kernel()?;
        if let Err(e) = kernel.run_until(time) {
            self.halt(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Starts, runs to the horizon, drains if configured and stops.
    pub fn run(&mut self) -> Result<SimulationResults, RuntimeError> {
        self.start()?;
        self.run_until(self.params.horizon)?;

        if self.params.drain {
            let limit = self.params.drain_limit;
            let kernel = self.running_kernel()?;
            if let Err(e) = kernel.drain(limit) {
                self.halt(&e);
                return Err(e);
            }
        }
        self.stop()
    }

    /// Stops the run and finalizes statistics.
    ///
    /// Open loop instances are reported as aborted.
    pub fn stop(&mut self) -> Result<SimulationResults, RuntimeError> {
        self.running_kernel()?;
        let results = self.finish();
        Ok(results)
    }

    /// Results of the last finished run.
    pub fn results(&self) -> Option<&SimulationResults> {
        self.results.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.kernel.as_ref().map_or(0.0, Kernel::now)
    }

    /// Placement of the submitted application.
    pub fn placement(&self) -> Option<&Placement> {
        self.kernel.as_ref().map(Kernel::placement)
    }

    /// The run parameters.
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// The device tree.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The sensors, wherever they currently live.
    pub fn sensors(&self) -> &[Sensor] {
        match &self.kernel {
            Some(kernel) => kernel.sensors(),
            None => &self.sensors,
        }
    }

    /// The actuators.
    pub fn actuators(&self) -> &[Actuator] {
        &self.actuators
    }

    fn running_kernel(&mut self) -> Result<&mut Kernel, RuntimeError> {
        if self.state != RunState::Running {
            return Err(RuntimeError::NotRunning);
        }
        self.kernel.as_mut().ok_or(RuntimeError::NotRunning)
    }

    fn halt(&mut self, error: &RuntimeError) {
        tracing::error!(error = %error, "Simulation halted");
        self.finish();
    }

    fn finish(&mut self) -> SimulationResults {
        let mut results = match self.kernel.as_mut() {
            Some(kernel) => kernel.finalize(),
            None => SimulationResults::default(),
        };

        results.metadata.name = self.params.name.clone();
        results.metadata.version = crate::VERSION.to_string();
        results.metadata.placement = self.placement_name.to_string();
        results.metadata.seed = self.params.seed;
        results.record_end();
        if let Some(timer) = self.timer.take() {
            results.compute_timing(timer.elapsed_ms());
        }

        self.state = RunState::Finished;
        tracing::info!(
            final_time = results.final_time,
            completed = results.completed(),
            aborted = results.aborted.len(),
            "Simulation finished"
        );
        self.results = Some(results.clone());
        results
    }

    fn check_bindings(&self, application: &Application) -> SimResult<()> {
        for sensor in self.sensors() {
            if self.topology.device(sensor.gateway).is_none() {
                return Err(TopologyError::UnknownDevice(format!("#{}", sensor.gateway)).into());
            }
            if !application.is_sensor_type(&sensor.sensor_type) {
                return Err(GraphError::UnknownEntity(sensor.sensor_type.clone()).into());
            }
            sensor.validate().map_err(|reason| GraphError::InvalidEntity {
                name: sensor.name.clone(),
                reason,
            })?;
        }
        for actuator in &self.actuators {
            if self.topology.device(actuator.gateway).is_none() {
                return Err(TopologyError::UnknownDevice(format!("#{}", actuator.gateway)).into());
            }
            if !application.is_actuator_type(&actuator.actuator_type) {
                return Err(GraphError::UnknownEntity(actuator.actuator_type.clone()).into());
            }
            if !(actuator.latency >= 0.0 && actuator.latency.is_finite()) {
                return Err(GraphError::InvalidEntity {
                    name: actuator.name.clone(),
                    reason: format!("latency must be non-negative, got {}", actuator.latency),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{AppEdge, ResourceDemand};
    use crate::distribution::IntervalDistribution;
    use crate::error::{PlacementError, SimError};
    use crate::placement::{MappingPlacement, ModuleMapping};
    use crate::topology::DeviceSpec;
    use crate::types::EdgeKind;

    fn controller() -> Controller {
        let mut topology = Topology::new();
        let cloud = topology.add_device(DeviceSpec::new("cloud", 1000.0)).unwrap();
        let edge = topology.add_device(DeviceSpec::new("edge", 100.0)).unwrap();
        topology.set_parent(edge, cloud, 2.0).unwrap();
        let sensors = vec![Sensor::new("s", "S", edge, 1.0, IntervalDistribution::deterministic(5.0))];
        Controller::new(topology, sensors, vec![])
            .with_params(SimulationParams::default().with_horizon(20.0))
    }

    fn app() -> Application {
        let mut app = Application::new("t");
        app.add_sensor_type("S").unwrap();
        app.add_module("m", ResourceDemand::mips(10.0)).unwrap();
        app.add_edge(AppEdge::new("S", "m", "RAW", EdgeKind::Sensor).with_cpu_length(10.0))
            .unwrap();
        app.add_loop(vec!["RAW".into(), "m".into()]).unwrap();
        app
    }

    fn mapping(device: &str) -> MappingPlacement {
        let mut mapping = ModuleMapping::new();
        mapping.add_module_to_device("m", device);
        MappingPlacement::new(mapping)
    }

    #[test]
    fn test_stop_before_start() {
        let mut c = controller();
        assert_eq!(c.stop().unwrap_err(), RuntimeError::NotRunning);
        assert_eq!(c.state(), RunState::Idle);
        assert!(c.results().is_none());

        c.submit(app(), &mapping("cloud")).unwrap();
        assert_eq!(c.stop().unwrap_err(), RuntimeError::NotRunning);
        assert_eq!(c.state(), RunState::Submitted);
    }

    #[test]
    fn test_double_start() {
        let mut c = controller();
        assert_eq!(c.start(), Err(RuntimeError::NotSubmitted));

        c.submit(app(), &mapping("edge")).unwrap();
        c.start().unwrap();
        assert_eq!(c.start(), Err(RuntimeError::AlreadyRunning));
        assert_eq!(c.state(), RunState::Running);

        let results = c.stop().unwrap();
        assert_eq!(c.start(), Err(RuntimeError::Finished));
        assert_eq!(c.results().map(|r| r.final_time), Some(results.final_time));
    }

    #[test]
    fn test_submit_while_running() {
        let mut c = controller();
        c.submit(app(), &mapping("edge")).unwrap();
        c.start().unwrap();
        assert!(matches!(
            c.submit(app(), &mapping("edge")),
            Err(SimError::Runtime(RuntimeError::AlreadyRunning))
        ));
        assert_eq!(c.state(), RunState::Running);
    }

    #[test]
    fn test_failed_submit_keeps_state() {
        let mut c = controller();
        c.submit(app(), &mapping("edge")).unwrap();

        let err = c.submit(app(), &mapping("nowhere")).unwrap_err();
        assert!(matches!(
            err,
            SimError::Placement(PlacementError::UnknownDevice(_))
        ));
        assert_eq!(c.state(), RunState::Submitted);
        assert_eq!(c.placement().map(|p| p.devices_for("m").to_vec()), Some(vec![1]));
        assert_eq!(c.sensors().len(), 1);
    }

    #[test]
    fn test_unknown_sensor_type() {
        let mut c = controller();
        let mut app = Application::new("other");
        app.add_sensor_type("X").unwrap();
        assert!(matches!(
            c.submit(app, &mapping("edge")),
            Err(SimError::Graph(GraphError::UnknownEntity(_)))
        ));
        assert_eq!(c.state(), RunState::Idle);
    }

    #[test]
    fn test_run_and_resubmit() {
        let mut c = controller();
        c.submit(app(), &mapping("edge")).unwrap();
        let results = c.run().unwrap();
        // ticks at 5, 10, 15, 20
        assert_eq!(results.loops[0].completed, 4);
        assert_eq!(results.metadata.placement, "mapping");

        c.submit(app(), &mapping("cloud")).unwrap();
        let results = c.run().unwrap();
        assert_eq!(results.loops[0].completed, 4);
        assert_eq!(c.state(), RunState::Finished);
    }

    #[test]
    fn test_incremental_run() {
        let mut c = controller();
        c.submit(app(), &mapping("edge")).unwrap();
        assert_eq!(c.run_until(5.0), Err(RuntimeError::NotRunning));

        c.start().unwrap();
        c.run_until(7.0).unwrap();
        assert_eq!(c.now(), 7.0);
        c.run_until(12.0).unwrap();
        let results = c.stop().unwrap();
        assert_eq!(results.loops[0].completed, 2);
        assert_eq!(results.final_time, 12.0);
    }
}
