//! Error handling for netexp-rs
//!
//! This module defines the error taxonomy shared by the codec, the stream
//! composer, the config serializer and the experiment driver, together with a
//! Result alias for use throughout the crate.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::types::CoreAddr;

/// Which per-core (or per-array) capacity limit was exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    /// Generator records on one core
    Sources,
    /// Consumer records on one core
    Sinks,
    /// Routing-table entries on one chip
    Routes,
    /// Width or height of the core-map grid
    Dimension,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapacityKind::Sources => "sources",
            CapacityKind::Sinks => "sinks",
            CapacityKind::Routes => "routes",
            CapacityKind::Dimension => "dimension",
        };
        f.write_str(name)
    }
}

/// Main error type for netexp-rs operations
#[derive(Error, Debug)]
pub enum NetExpError {
    /// A router timeout that the exponent/mantissa encoding cannot represent
    #[error("A timeout of {requested} cannot be used. You could use {nearest} instead")]
    InvalidTimeoutValue { requested: u32, nearest: u32 },

    /// Every routing algorithm was tried and some destinations remain
    #[error("Unable to route to {} destination(s): {}", .0.len(), format_cores(.0))]
    UnroutableDestinations(Vec<CoreAddr>),

    /// A generator/consumer type tag the firmware contract does not define
    #[error("Unsupported {kind} variant (tag {tag})")]
    UnsupportedVariant { kind: &'static str, tag: u32 },

    /// A registry or table is larger than the firmware statically allocates
    #[error("Too many {kind}: {actual} exceeds the maximum of {max}")]
    CapacityExceeded {
        kind: CapacityKind,
        actual: usize,
        max: usize,
    },

    /// One or more cores timed out or reported failure
    #[error("Experiment failed on {} core(s): {}", .0.len(), format_cores(.0))]
    ExperimentExecutionFailed(BTreeSet<CoreAddr>),

    /// A driver operation was invoked out of protocol order
    #[error("Cannot {operation} while the driver is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// An experiment parameter outside its allowed range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The monitor core was given a traffic role
    #[error("Core {0} is a monitor core and cannot source or sink traffic")]
    MonitorCore(CoreAddr),

    /// A core which is not part of the topology
    #[error("Core {0} is not part of the topology")]
    UnknownCore(CoreAddr),

    /// A binary record that could not be parsed
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Errors related to node memory access
    #[error("Memory access error at {node} address 0x{address:08X}: {message}")]
    MemoryAccess {
        node: CoreAddr,
        address: u32,
        message: String,
    },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<NetExpError>,
    },
}

fn format_cores<'a>(cores: impl IntoIterator<Item = &'a CoreAddr>) -> String {
    cores
        .into_iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl NetExpError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NetExpError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &NetExpError {
        match self {
            NetExpError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// The cores reported bad by a failed run, if this is such an error
    pub fn bad_cores(&self) -> Option<&BTreeSet<CoreAddr>> {
        match self.root() {
            NetExpError::ExperimentExecutionFailed(cores) => Some(cores),
            _ => None,
        }
    }
}

/// Result type alias for netexp-rs operations
pub type Result<T> = std::result::Result<T, NetExpError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
