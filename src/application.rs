//! Application graph: modules, data-flow edges, selectivities and loops.
//!
//! An application is a directed data-flow graph. Sensor types feed modules,
//! modules feed each other, and modules drive actuator types. Each edge
//! carries a named tuple type with a network size and a CPU length. How many
//! tuples a module emits on an output edge per input tuple is governed by a
//! [`Selectivity`]; latency-critical paths are declared as [`AppLoop`]s.
//!
//! # Example
//!
//! ```
//! use kiri::application::{AppEdge, Application, ResourceDemand};
//! use kiri::types::EdgeKind;
//!
//! let mut app = Application::new("demo");
//! app.add_sensor_type("TempSensor").unwrap();
//! app.add_module("detector", ResourceDemand::mips(10.0)).unwrap();
//! app.add_edge(
//!     AppEdge::new("TempSensor", "detector", "TEMP", EdgeKind::Sensor)
//!         .with_size(500.0)
//!         .with_cpu_length(1000.0),
//! )
//! .unwrap();
//! app.add_loop(vec!["TEMP".into(), "detector".into()]).unwrap();
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::types::{Direction, EdgeKind, LoopId, SimTime};

/// Resources a module instance reserves on its host device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceDemand {
    /// Processing capacity in MIPS
    pub mips: f64,
    /// Memory
    #[serde(default)]
    pub ram: u64,
}

impl ResourceDemand {
    /// Demand expressed purely in MIPS.
    pub fn mips(mips: f64) -> Self {
        Self { mips, ram: 0 }
    }

    /// Sets the RAM demand.
    pub fn with_ram(mut self, ram: u64) -> Self {
        self.ram = ram;
        self
    }
}

/// A logical processing stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppModule {
    /// Module name
    pub name: String,
    /// Resource demand per instance
    pub demand: ResourceDemand,
}

/// A directed data-flow edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppEdge {
    /// Source entity (sensor type or module)
    pub src: String,
    /// Destination entity (module or actuator type)
    pub dst: String,
    /// Tuple type carried on this edge
    pub tuple_type: String,
    /// Average tuple size in bytes
    #[serde(default)]
    pub size: f64,
    /// Processing length in million instructions
    #[serde(default)]
    pub cpu_length: f64,
    /// Travel direction
    #[serde(default)]
    pub direction: Direction,
    /// Semantic kind
    pub kind: EdgeKind,
    /// When set, every instance of `src` emits on this edge with this period
    #[serde(default)]
    pub periodicity: Option<SimTime>,
    /// Relative deadline used by deadline-ordered processing queues
    #[serde(default)]
    pub deadline: Option<SimTime>,
}

impl AppEdge {
    /// Creates an edge with zero size and length.
    ///
    /// Actuator edges default to [`Direction::Down`], all others to
    /// [`Direction::Up`].
    pub fn new(
        src: impl Into<String>,
        dst: impl Into<String>,
        tuple_type: impl Into<String>,
        kind: EdgeKind,
    ) -> Self {
        let direction = match kind {
            EdgeKind::Actuator => Direction::Down,
            _ => Direction::Up,
        };
        Self {
            src: src.into(),
            dst: dst.into(),
            tuple_type: tuple_type.into(),
            size: 0.0,
            cpu_length: 0.0,
            direction,
            kind,
            periodicity: None,
            deadline: None,
        }
    }

    /// Sets the average tuple size in bytes.
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    /// Sets the processing length in million instructions.
    pub fn with_cpu_length(mut self, cpu_length: f64) -> Self {
        self.cpu_length = cpu_length;
        self
    }

    /// Sets the travel direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Makes the edge periodic.
    pub fn periodic(mut self, period: SimTime) -> Self {
        self.periodicity = Some(period);
        self
    }

    /// Sets a relative deadline for tuples on this edge.
    pub fn with_deadline(mut self, deadline: SimTime) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Expected number of output tuples per input tuple.
///
/// A fraction `f < 1` is a Bernoulli draw with probability `f`. A fraction
/// `f >= 1` emits `floor(f)` tuples plus a Bernoulli draw on the remainder,
/// so the long-run mean is always `f`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selectivity {
    /// Mean output tuples per input tuple
    pub fraction: f64,
}

impl Selectivity {
    /// Creates a fractional selectivity.
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }

    /// Draws the number of tuples to emit for one input tuple.
    pub fn sample<R: RngCore + ?Sized>(&self, rng: &mut R) -> u32 {
        let whole = self.fraction.trunc();
        let remainder = self.fraction - whole;
        let extra = remainder > 0.0 && rng.gen_bool(remainder);
        whole as u32 + u32::from(extra)
    }
}

/// A latency-tracked path through the application.
///
/// Elements name modules, sensor types, actuator types or tuple types. A
/// traversal starts when a tuple whose source or type matches the first
/// element heads for the second, and completes when a tuple carrying it
/// reaches the last element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppLoop {
    /// Ordered identifiers
    pub sequence: Vec<String>,
}

impl AppLoop {
    /// First element of the loop.
    pub fn head(&self) -> &str {
        &self.sequence[0]
    }

    /// Index of the last element.
    pub fn last_index(&self) -> usize {
        self.sequence.len() - 1
    }

    /// Human-readable label, e.g. `TEMP -> detector -> hub`.
    pub fn label(&self) -> String {
        self.sequence.join(" -> ")
    }
}

/// One output edge selected for a processed tuple.
#[derive(Clone, Copy, Debug)]
pub struct Emission<'a> {
    /// Index of the edge within the application
    pub index: usize,
    /// The edge to emit on
    pub edge: &'a AppEdge,
    /// How many tuples to emit
    pub count: u32,
}

/// The application data-flow graph.
#[derive(Clone, Debug)]
pub struct Application {
    id: String,
    modules: BTreeMap<String, AppModule>,
    sensor_types: BTreeSet<String>,
    actuator_types: BTreeSet<String>,
    edges: Vec<AppEdge>,
    tuple_types: BTreeSet<String>,
    /// (module, input type) -> [(output type, selectivity)]
    selectivities: HashMap<(String, String), Vec<(String, Selectivity)>>,
    loops: Vec<AppLoop>,
}

impl Application {
    /// Creates an empty application.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            modules: BTreeMap::new(),
            sensor_types: BTreeSet::new(),
            actuator_types: BTreeSet::new(),
            edges: Vec::new(),
            tuple_types: BTreeSet::new(),
            selectivities: HashMap::new(),
            loops: Vec::new(),
        }
    }

    /// Returns the application id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Declares a module.
    pub fn add_module(
        &mut self,
        name: impl Into<String>,
        demand: ResourceDemand,
    ) -> Result<(), GraphError> {
        let name = name.into();
        self.ensure_unique(&name)?;
        self.modules.insert(name.clone(), AppModule { name, demand });
        Ok(())
    }

    /// Declares a sensor type that can originate tuples.
    pub fn add_sensor_type(&mut self, name: impl Into<String>) -> Result<(), GraphError> {
        let name = name.into();
        self.ensure_unique(&name)?;
        self.sensor_types.insert(name);
        Ok(())
    }

    /// Declares an actuator type that can consume tuples.
    pub fn add_actuator_type(&mut self, name: impl Into<String>) -> Result<(), GraphError> {
        let name = name.into();
        self.ensure_unique(&name)?;
        self.actuator_types.insert(name);
        Ok(())
    }

    /// Adds a data-flow edge and returns its index.
    pub fn add_edge(&mut self, edge: AppEdge) -> Result<usize, GraphError> {
        self.ensure_known(&edge.src)?;
        self.ensure_known(&edge.dst)?;

        let (src_ok, dst_ok) = match edge.kind {
            EdgeKind::Sensor => (self.is_sensor_type(&edge.src), self.is_module(&edge.dst)),
            EdgeKind::Module => (self.is_module(&edge.src), self.is_module(&edge.dst)),
            EdgeKind::Actuator => (self.is_module(&edge.src), self.is_actuator_type(&edge.dst)),
        };
        if !src_ok || !dst_ok {
            return Err(GraphError::InvalidEdge {
                src: edge.src,
                dst: edge.dst,
                reason: format!("endpoints do not match a {:?} edge", edge.kind),
            });
        }
        if edge.size < 0.0 || edge.cpu_length < 0.0 {
            return Err(GraphError::InvalidEdge {
                src: edge.src,
                dst: edge.dst,
                reason: "size and cpu length must be non-negative".to_string(),
            });
        }
        if matches!(edge.periodicity, Some(p) if !(p > 0.0)) {
            return Err(GraphError::InvalidEdge {
                src: edge.src,
                dst: edge.dst,
                reason: "periodicity must be positive".to_string(),
            });
        }

        self.tuple_types.insert(edge.tuple_type.clone());
        self.edges.push(edge);
        Ok(self.edges.len() - 1)
    }

    /// Declares how many `output` tuples `module` emits per `input` tuple.
    pub fn add_selectivity(
        &mut self,
        module: &str,
        input: &str,
        output: &str,
        fraction: f64,
    ) -> Result<(), GraphError> {
        if !self.is_module(module) {
            return Err(GraphError::UnknownEntity(module.to_string()));
        }
        if !fraction.is_finite() || fraction < 0.0 {
            return Err(GraphError::MalformedSelectivity {
                module: module.to_string(),
                input: input.to_string(),
                output: output.to_string(),
                reason: format!("fraction {} is not a non-negative number", fraction),
            });
        }
        if fraction > f64::from(u32::MAX) {
            return Err(GraphError::MalformedSelectivity {
                module: module.to_string(),
                input: input.to_string(),
                output: output.to_string(),
                reason: format!("fraction {} exceeds {} tuples per input", fraction, u32::MAX),
            });
        }

        let outputs = self
            .selectivities
            .entry((module.to_string(), input.to_string()))
            .or_default();
        outputs.retain(|(o, _)| o != output);
        outputs.push((output.to_string(), Selectivity::new(fraction)));
        Ok(())
    }

    /// Declares a latency-tracked loop and returns its id.
    ///
    /// Tuple types are resolved against edges added so far.
    pub fn add_loop(&mut self, sequence: Vec<String>) -> Result<LoopId, GraphError> {
        if sequence.len() < 2 {
            return Err(GraphError::MalformedLoop(format!(
                "loop needs at least two elements, got {:?}",
                sequence
            )));
        }
        for element in &sequence {
            if !self.is_entity(element) && !self.tuple_types.contains(element) {
                return Err(GraphError::UnknownEntity(element.clone()));
            }
        }
        self.loops.push(AppLoop { sequence });
        Ok(self.loops.len() - 1)
    }

    /// Cross-checks selectivities against edges.
    ///
    /// Every selectivity output must be emitted by some edge of its module.
    pub fn validate(&self) -> Result<(), GraphError> {
        for ((module, input), outputs) in &self.selectivities {
            for (output, _) in outputs {
                let emitted = self
                    .edges
                    .iter()
                    .any(|e| &e.src == module && &e.tuple_type == output);
                if !emitted {
                    return Err(GraphError::MalformedSelectivity {
                        module: module.clone(),
                        input: input.clone(),
                        output: output.clone(),
                        reason: "no edge of this module carries the output type".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Lazily selects the output edges for one processed tuple.
    ///
    /// Walks the module's outgoing edges and, for each edge whose tuple type
    /// has a selectivity mapping from `input_type`, draws the emission count.
    /// Edges with a zero count are skipped.
    pub fn outputs_for<'a, R: RngCore + ?Sized>(
        &'a self,
        module: &'a str,
        input_type: &str,
        rng: &'a mut R,
    ) -> impl Iterator<Item = Emission<'a>> + 'a {
        let mappings = self
            .selectivities
            .get(&(module.to_string(), input_type.to_string()))
            .map(|v| v.as_slice())
            .unwrap_or(&[]);

        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.src == module && e.kind != EdgeKind::Sensor)
            .filter_map(move |(index, edge)| {
                let (_, selectivity) = mappings.iter().find(|(o, _)| *o == edge.tuple_type)?;
                let count = selectivity.sample(&mut *rng);
                (count > 0).then_some(Emission { index, edge, count })
            })
    }

    /// Edges originating from a sensor type, with their indices.
    pub fn sensor_edges<'a>(
        &'a self,
        sensor_type: &'a str,
    ) -> impl Iterator<Item = (usize, &'a AppEdge)> + 'a {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.kind == EdgeKind::Sensor && e.src == sensor_type)
    }

    /// Periodic edges with their indices.
    pub fn periodic_edges(&self) -> impl Iterator<Item = (usize, &AppEdge)> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.periodicity.is_some())
    }

    /// Returns a module by name.
    pub fn module(&self, name: &str) -> Option<&AppModule> {
        self.modules.get(name)
    }

    /// Returns all modules in name order.
    pub fn modules(&self) -> impl Iterator<Item = &AppModule> {
        self.modules.values()
    }

    /// Returns all edges.
    pub fn edges(&self) -> &[AppEdge] {
        &self.edges
    }

    /// Returns an edge by index.
    pub fn edge(&self, index: usize) -> Option<&AppEdge> {
        self.edges.get(index)
    }

    /// Returns all loops.
    pub fn loops(&self) -> &[AppLoop] {
        &self.loops
    }

    /// Returns true if `name` is a declared module.
    pub fn is_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Returns true if `name` is a declared sensor type.
    pub fn is_sensor_type(&self, name: &str) -> bool {
        self.sensor_types.contains(name)
    }

    /// Returns true if `name` is a declared actuator type.
    pub fn is_actuator_type(&self, name: &str) -> bool {
        self.actuator_types.contains(name)
    }

    fn is_entity(&self, name: &str) -> bool {
        self.is_module(name) || self.is_sensor_type(name) || self.is_actuator_type(name)
    }

    fn ensure_known(&self, name: &str) -> Result<(), GraphError> {
        if self.is_entity(name) {
            Ok(())
        } else {
            Err(GraphError::UnknownEntity(name.to_string()))
        }
    }

    fn ensure_unique(&self, name: &str) -> Result<(), GraphError> {
        if self.is_entity(name) {
            Err(GraphError::DuplicateEntity(name.to_string()))
        } else {
            Ok(())
        }
    }
}
