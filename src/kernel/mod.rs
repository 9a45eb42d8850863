//! The event-driven simulation kernel.
//!
//! The kernel owns the runtime state of a submitted scenario: device
//! processors, link channels, the loop tracker and the global event queue.
//! It is strictly single-threaded; every state change happens while an
//! event is dispatched.
//!
//! # Event flow
//!
//! 1. A `SensorTick` creates one tuple per sensor edge and schedules the
//!    next tick.
//! 2. `TupleCreated` activates the tuple's loop instances and routes it.
//! 3. The tuple travels hop by hop; each hop serializes on the link channel
//!    and raises `TupleArrived` at the next device.
//! 4. At its target device the tuple queues for processing; at its target
//!    actuator it raises `ActuatorArrival`.
//! 5. `ProcessingComplete` synthesizes the module's outputs, which start
//!    again at step 2.

mod device;

pub use device::{DeviceState, QueueDiscipline};

use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::application::Application;
use crate::entity::{Actuator, Sensor};
use crate::error::RuntimeError;
use crate::event::{Event, EventKind, EventQueue, Source};
use crate::link::Link;
use crate::loops::LoopTracker;
use crate::placement::Placement;
use crate::stats::{DeviceSummary, KernelCounters, SimulationResults};
use crate::topology::Topology;
use crate::tuple::{LoopTag, Target, Tuple};
use crate::types::{ActuatorId, DeviceId, Direction, EdgeKind, SensorId, SimTime, TupleId};

/// Kernel parameters.
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// No sensor tick or periodic emission is scheduled after this time
    pub horizon: SimTime,
    /// Seed of the run's random number generator
    pub seed: u64,
    pub discipline: QueueDiscipline,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            horizon: 1000.0,
            seed: 42,
            discipline: QueueDiscipline::Fifo,
        }
    }
}

/// Runtime state of one submitted scenario.
pub struct Kernel {
    topology: Topology,
    application: Application,
    placement: Placement,
    sensors: Vec<Sensor>,
    actuators: Vec<Actuator>,
    config: KernelConfig,

    queue: EventQueue,
    now: SimTime,
    rng: Pcg64,
    devices: Vec<DeviceState>,
    /// Two channels per device: index `2 * child` up, `2 * child + 1` down
    links: Vec<Link>,
    loops: LoopTracker,
    next_tuple: TupleId,
    counters: KernelCounters,
    network_usage: f64,
}

impl Kernel {
    /// Builds the runtime state for a placed application.
    pub fn new(
        topology: Topology,
        application: Application,
        placement: Placement,
        sensors: Vec<Sensor>,
        actuators: Vec<Actuator>,
        config: KernelConfig,
    ) -> Self {
        let devices = topology
            .devices()
            .iter()
            .map(|d| DeviceState::new(&d.spec, config.discipline))
            .collect();

        let links = topology
            .devices()
            .iter()
            .flat_map(|d| {
                let cap = &d.spec.capacity;
                [
                    Link::new(d.id, Direction::Up, cap.uplink_bandwidth, d.uplink_latency),
                    Link::new(d.id, Direction::Down, cap.downlink_bandwidth, d.uplink_latency),
                ]
            })
            .collect();

        let loops = LoopTracker::new(application.loops().len());
        let rng = Pcg64::seed_from_u64(config.seed);

        Self {
            topology,
            application,
            placement,
            sensors,
            actuators,
            config,
            queue: EventQueue::new(),
            now: 0.0,
            rng,
            devices,
            links,
            loops,
            next_tuple: 0,
            counters: KernelCounters::default(),
            network_usage: 0.0,
        }
    }

    /// Schedules the first sensor ticks and periodic emissions.
    pub fn start(&mut self) {
        let horizon = self.config.horizon;

        for (id, sensor) in self.sensors.iter_mut().enumerate() {
            let first = self.now + sensor.next_interval(&mut self.rng);
            if first <= horizon {
                self.queue.schedule(first, EventKind::SensorTick { sensor: id });
            }
        }

        for (edge, app_edge) in self.application.periodic_edges() {
            let Some(period) = app_edge.periodicity else {
                continue;
            };
            for &device in self.placement.devices_for(&app_edge.src) {
                if self.now + period <= horizon {
                    self.queue
                        .schedule(self.now + period, EventKind::PeriodicEmit { edge, device });
                }
            }
        }

        tracing::info!(
            application = self.application.id(),
            sensors = self.sensors.len(),
            pending = self.queue.len(),
            horizon = horizon,
            "Kernel started"
        );
    }

    /// Processes every event due at or before `limit`, then moves the clock
    /// to `limit`.
    pub fn run_until(&mut self, limit: SimTime) -> Result<(), RuntimeError> {
        while let Some(event) = self.queue.pop_until(limit) {
            self.dispatch(event)?;
        }
        if limit.is_finite() {
            self.now = self.now.max(limit);
        }
        Ok(())
    }

    /// Processes the remaining in-flight events, optionally only up to
    /// `limit`. The clock stays at the last processed event.
    pub fn drain(&mut self, limit: Option<SimTime>) -> Result<(), RuntimeError> {
        loop {
            let event = match limit {
                Some(l) => self.queue.pop_until(l),
                None => self.queue.pop(),
            };
            let Some(event) = event else {
                break;
            };
            self.dispatch(event)?;
        }
        tracing::debug!(now = self.now, pending = self.queue.len(), "Drain finished");
        Ok(())
    }

    /// Closes accounting, aborts open loop instances and builds the
    /// results. Metadata is left for the caller.
    pub fn finalize(&mut self) -> SimulationResults {
        let now = self.now;
        for device in &mut self.devices {
            device.account(now);
        }
        self.loops.finalize();

        let loops = self
            .application
            .loops()
            .iter()
            .enumerate()
            .map(|(id, declared)| self.loops.summarize(id, declared))
            .collect();

        let devices = self
            .topology
            .devices()
            .iter()
            .zip(&self.devices)
            .map(|(d, state)| DeviceSummary {
                name: d.name().to_string(),
                level: self.topology.level(d.id),
                busy_time: state.busy_time,
                utilization: if now > 0.0 {
                    (state.busy_time / now).min(1.0)
                } else {
                    0.0
                },
                energy: state.energy,
                cost: state.cost(),
                tuples_processed: state.processed,
                peak_queue: state.peak_queue,
            })
            .collect();

        let links = self
            .links
            .iter()
            .filter(|l| l.transfers() > 0)
            .map(|l| l.summary(self.link_name(l), now))
            .collect();

        let mut counters = self.counters.clone();
        counters.events_scheduled = self.queue.scheduled();
        counters.peak_event_queue = self.queue.peak_len();

        tracing::info!(
            final_time = now,
            events = counters.events_processed,
            aborted = self.loops.aborted().len(),
            "Kernel finalized"
        );

        SimulationResults {
            final_time: now,
            counters,
            loops,
            devices,
            links,
            network_usage: self.network_usage,
            aborted: self.loops.aborted().to_vec(),
            ..Default::default()
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// The loop tracker.
    pub fn loops(&self) -> &LoopTracker {
        &self.loops
    }

    /// The placement the kernel runs with.
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// The submitted application.
    pub fn application(&self) -> &Application {
        &self.application
    }

    /// The sensors driving the run.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Releases the sensors so they can be reused by a later submission.
    pub fn into_sensors(self) -> Vec<Sensor> {
        self.sensors
    }

    fn dispatch(&mut self, event: Event) -> Result<(), RuntimeError> {
        self.now = event.time;
        self.counters.events_processed += 1;
        tracing::trace!(time = self.now, kind = event.kind.label(), "Dispatch");

        match event.kind {
            EventKind::SensorTick { sensor } => self.on_sensor_tick(sensor),
            EventKind::TupleCreated { tuple, source } => self.on_tuple_created(tuple, source),
            EventKind::TupleArrived { tuple, device } => self.on_tuple_arrived(tuple, device),
            EventKind::ProcessingComplete { device } => self.on_processing_complete(device),
            EventKind::PeriodicEmit { edge, device } => self.on_periodic_emit(edge, device),
            EventKind::ActuatorArrival { tuple, actuator } => {
                self.on_actuator_arrival(tuple, actuator);
                Ok(())
            }
        }
    }

    fn on_sensor_tick(&mut self, sensor: SensorId) -> Result<(), RuntimeError> {
        let gateway = self.sensors[sensor].gateway;
        let sensor_type = self.sensors[sensor].sensor_type.clone();

        let edges: Vec<usize> = self
            .application
            .sensor_edges(&sensor_type)
            .map(|(i, _)| i)
            .collect();

        for edge in edges {
            let mut tuple = self.make_tuple(edge, gateway);
            self.tag_loops(&mut tuple, &[], &sensor_type);
            self.queue.schedule(
                self.now,
                EventKind::TupleCreated {
                    tuple,
                    source: Source::Sensor(sensor),
                },
            );
        }

        let next = self.now + self.sensors[sensor].next_interval(&mut self.rng);
        if next <= self.config.horizon {
            self.queue.schedule(next, EventKind::SensorTick { sensor });
        }
        Ok(())
    }

    fn on_periodic_emit(&mut self, edge: usize, device: DeviceId) -> Result<(), RuntimeError> {
        let Some(app_edge) = self.application.edge(edge) else {
            return Ok(());
        };
        let src = app_edge.src.clone();
        let period = app_edge.periodicity;

        let mut tuple = self.make_tuple(edge, device);
        self.tag_loops(&mut tuple, &[], &src);
        self.queue.schedule(
            self.now,
            EventKind::TupleCreated {
                tuple,
                source: Source::Device(device),
            },
        );

        if let Some(period) = period {
            let next = self.now + period;
            if next <= self.config.horizon {
                self.queue.schedule(next, EventKind::PeriodicEmit { edge, device });
            }
        }
        Ok(())
    }

    fn on_tuple_created(&mut self, tuple: Tuple, source: Source) -> Result<(), RuntimeError> {
        for tag in &tuple.loop_tags {
            self.loops.activate(tag.instance);
        }

        match source {
            Source::Sensor(sensor) => {
                let (gateway, latency) = {
                    let s = &self.sensors[sensor];
                    (s.gateway, s.latency)
                };
                self.network_usage += tuple.size * latency;
                self.queue.schedule(
                    self.now + latency,
                    EventKind::TupleArrived {
                        tuple,
                        device: gateway,
                    },
                );
                Ok(())
            }
            Source::Device(device) => self.route(tuple, device),
        }
    }

    fn on_tuple_arrived(&mut self, tuple: Tuple, device: DeviceId) -> Result<(), RuntimeError> {
        if tuple.target.is_none() {
            self.route(tuple, device)
        } else {
            self.forward(tuple, device)
        }
    }

    fn on_processing_complete(&mut self, device: DeviceId) -> Result<(), RuntimeError> {
        let (finished, next) = self.devices[device].complete(self.now);
        if let Some(done) = next {
            self.queue
                .schedule(done, EventKind::ProcessingComplete { device });
        }
        let Some(job) = finished else {
            return Ok(());
        };
        self.counters.tuples_processed += 1;

        let input = job.tuple;
        let module = input.dst.clone();
        let emissions: Vec<(usize, u32)> = self
            .application
            .outputs_for(&module, &input.tuple_type, &mut self.rng)
            .map(|e| (e.index, e.count))
            .collect();

        for (edge, count) in emissions {
            for _ in 0..count {
                let mut tuple = self.make_tuple(edge, input.origin);
                self.tag_loops(&mut tuple, &input.loop_tags, &module);
                self.queue.schedule(
                    self.now,
                    EventKind::TupleCreated {
                        tuple,
                        source: Source::Device(device),
                    },
                );
            }
        }

        for tag in &input.loop_tags {
            self.loops.release_carrier(tag.instance);
        }
        Ok(())
    }

    fn on_actuator_arrival(&mut self, tuple: Tuple, actuator: ActuatorId) {
        self.counters.actuator_deliveries += 1;
        tracing::trace!(
            actuator = self.actuators[actuator].name.as_str(),
            tuple_type = tuple.tuple_type.as_str(),
            "Actuator received tuple"
        );
        self.complete_loops(&tuple);
        for tag in &tuple.loop_tags {
            self.loops.release_carrier(tag.instance);
        }
    }

    /// Resolves the tuple's destination(s) from `at` and sends it on.
    fn route(&mut self, mut tuple: Tuple, at: DeviceId) -> Result<(), RuntimeError> {
        let targets = self.resolve_targets(&tuple, at)?;
        let (last, rest) = match targets.split_last() {
            Some(split) => split,
            None => return Ok(()),
        };

        for &target in rest {
            let mut copy = tuple.clone();
            copy.id = self.next_tuple_id();
            copy.target = Some(target);
            for tag in &copy.loop_tags {
                self.loops.add_carrier(tag.instance);
            }
            self.forward(copy, at)?;
        }

        tuple.target = Some(*last);
        self.forward(tuple, at)
    }

    fn resolve_targets(&self, tuple: &Tuple, at: DeviceId) -> Result<Vec<Target>, RuntimeError> {
        if tuple.kind == EdgeKind::Actuator {
            for ancestor in self.topology.path_to_root(tuple.origin) {
                let found: Vec<Target> = self
                    .actuators
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| {
                        a.actuator_type == tuple.dst && self.topology.is_ancestor(ancestor, a.gateway)
                    })
                    .map(|(id, _)| Target::Actuator(id))
                    .collect();
                if !found.is_empty() {
                    return Ok(found);
                }
            }
            return Err(RuntimeError::NoRoute {
                tuple_type: tuple.tuple_type.clone(),
                target: tuple.dst.clone(),
                from: at,
            });
        }

        let distance = |a: DeviceId, b: DeviceId| self.topology.hops(a, b).unwrap_or(usize::MAX);
        self.placement
            .devices_for(&tuple.dst)
            .iter()
            .copied()
            .min_by_key(|&d| (distance(at, d), distance(tuple.origin, d), d))
            .map(|d| vec![Target::Module(d)])
            .ok_or_else(|| RuntimeError::UnplacedModule(tuple.dst.clone()))
    }

    /// Moves a routed tuple one hop toward its target, or delivers it.
    fn forward(&mut self, tuple: Tuple, at: DeviceId) -> Result<(), RuntimeError> {
        let target_device = match tuple.target {
            Some(Target::Module(d)) => d,
            Some(Target::Actuator(a)) => self.actuators[a].gateway,
            None => return self.route(tuple, at),
        };

        if at == target_device {
            self.deliver(tuple, at);
            return Ok(());
        }

        let next = self
            .topology
            .next_hop(at, target_device)
            .ok_or_else(|| RuntimeError::NoRoute {
                tuple_type: tuple.tuple_type.clone(),
                target: tuple.dst.clone(),
                from: at,
            })?;

        let link = if self.topology.parent(at) == Some(next) {
            2 * at
        } else {
            2 * next + 1
        };
        let arrival = self.links[link].transmit(self.now, tuple.size);
        self.network_usage += tuple.size * self.links[link].latency;
        self.queue.schedule(arrival, EventKind::TupleArrived { tuple, device: next });
        Ok(())
    }

    fn deliver(&mut self, tuple: Tuple, device: DeviceId) {
        match tuple.target {
            Some(Target::Actuator(actuator)) => {
                let latency = self.actuators[actuator].latency;
                self.network_usage += tuple.size * latency;
                self.queue.schedule(
                    self.now + latency,
                    EventKind::ActuatorArrival { tuple, actuator },
                );
            }
            _ => {
                self.complete_loops(&tuple);
                if let Some(done) = self.devices[device].submit(tuple, self.now) {
                    self.queue
                        .schedule(done, EventKind::ProcessingComplete { device });
                }
            }
        }
    }

    /// Completes the loop instances this tuple finishes by arriving at its
    /// destination.
    fn complete_loops(&mut self, tuple: &Tuple) {
        for tag in &tuple.loop_tags {
            let Some(declared) = self.application.loops().get(tag.loop_id) else {
                continue;
            };
            let last = declared.last_index();
            if tag.next == last && declared.sequence[last] == tuple.dst {
                if let Some(latency) = self.loops.complete(tag.instance, self.now) {
                    tracing::debug!(
                        loop_id = tag.loop_id,
                        instance = tag.instance,
                        latency = latency,
                        "Loop instance completed"
                    );
                }
            }
        }
    }

    /// Tags a new tuple with the loop instances it continues or starts.
    ///
    /// `inputs` are the tags of the tuple whose processing emitted it and
    /// `emitter` the emitting entity.
    fn tag_loops(&mut self, tuple: &mut Tuple, inputs: &[LoopTag], emitter: &str) {
        for (loop_id, declared) in self.application.loops().iter().enumerate() {
            let seq = &declared.sequence;
            let mut continued = false;

            for tag in inputs.iter().filter(|t| t.loop_id == loop_id) {
                let k = tag.next;
                if k + 1 < seq.len() && seq[k] == emitter && seq[k + 1] == tuple.dst {
                    tuple.loop_tags.push(LoopTag {
                        loop_id,
                        instance: tag.instance,
                        next: k + 1,
                    });
                    self.loops.add_carrier(tag.instance);
                    continued = true;
                }
            }

            let head = declared.head();
            if !continued && (tuple.src == head || tuple.tuple_type == head) && seq[1] == tuple.dst {
                let instance = self.loops.start(loop_id, self.now);
                self.loops.add_carrier(instance);
                tuple.loop_tags.push(LoopTag {
                    loop_id,
                    instance,
                    next: 1,
                });
            }
        }
    }

    fn make_tuple(&mut self, edge: usize, origin: DeviceId) -> Tuple {
        let id = self.next_tuple_id();
        self.counters.tuples_created += 1;
        Tuple::from_edge(id, &self.application.edges()[edge], self.now, origin)
    }

    fn next_tuple_id(&mut self) -> TupleId {
        let id = self.next_tuple;
        self.next_tuple += 1;
        id
    }

    fn link_name(&self, link: &Link) -> String {
        let child = self
            .topology
            .device(link.child)
            .map(|d| d.name())
            .unwrap_or("?");
        let parent = self
            .topology
            .parent(link.child)
            .and_then(|p| self.topology.device(p))
            .map(|d| d.name())
            .unwrap_or("?");
        match link.direction {
            Direction::Up => format!("{}->{}", child, parent),
            Direction::Down => format!("{}->{}", parent, child),
        }
    }
}
