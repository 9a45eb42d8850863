//! Error taxonomy for the simulation engine.
//!
//! Errors are split by the layer that raises them. Construction-time errors
//! (topology, graph, placement) are fatal and surface before a run starts;
//! [`RuntimeError`] covers run control and misconfiguration discovered while
//! events are being dispatched.

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::DeviceId;

/// Errors raised while building or validating the device tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("device name already in use: {0}")]
    DuplicateId(String),

    #[error("making {parent} the parent of {child} would create a cycle")]
    Cycle { child: String, parent: String },

    #[error("device {0} has no parent but is not the root")]
    MissingParent(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("invalid device {name}: {reason}")]
    InvalidDevice { name: String, reason: String },

    #[error("topology has no devices")]
    Empty,
}

/// Errors raised while building the application graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("unknown entity referenced: {0}")]
    UnknownEntity(String),

    #[error("entity declared twice: {0}")]
    DuplicateEntity(String),

    #[error("invalid edge {src} -> {dst}: {reason}")]
    InvalidEdge {
        src: String,
        dst: String,
        reason: String,
    },

    #[error("malformed selectivity for {module} ({input} -> {output}): {reason}")]
    MalformedSelectivity {
        module: String,
        input: String,
        output: String,
        reason: String,
    },

    #[error("malformed loop: {0}")]
    MalformedLoop(String),

    #[error("invalid sensor or actuator {name}: {reason}")]
    InvalidEntity { name: String, reason: String },
}

/// Errors raised by placement strategies.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("module {0} is used by an edge but has no placement")]
    UnassignedModule(String),

    #[error("no device on the path from {leaf} to the root can host module {module}")]
    InfeasiblePlacement { module: String, leaf: String },

    #[error("placement references unknown device: {0}")]
    UnknownDevice(String),

    #[error("placement references unknown module: {0}")]
    UnknownModule(String),

    #[error("module data flow contains a cycle")]
    CyclicDataflow,
}

/// Errors raised by run control or during event dispatch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("simulation is already running")]
    AlreadyRunning,

    #[error("simulation is not running")]
    NotRunning,

    #[error("no application has been submitted")]
    NotSubmitted,

    #[error("simulation has already finished")]
    Finished,

    #[error("tuple for module {0} has no placed instance")]
    UnplacedModule(String),

    #[error("no route for {tuple_type} tuple to {target} from device {from}")]
    NoRoute {
        tuple_type: String,
        target: String,
        from: DeviceId,
    },
}

/// Top-level error type wrapping every layer.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TopologyError::Cycle {
            child: "a".into(),
            parent: "b".into(),
        };
        assert_eq!(
            err.to_string(),
            "making b the parent of a would create a cycle"
        );

        let err = PlacementError::UnassignedModule("detector".into());
        assert!(err.to_string().contains("detector"));
    }

    #[test]
    fn test_sim_error_conversion() {
        fn fails() -> SimResult<()> {
            let inner: Result<(), RuntimeError> = Err(RuntimeError::NotRunning);
            inner?;
            Ok(())
        }

        match fails() {
            Err(SimError::Runtime(RuntimeError::NotRunning)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
