//! Backend module for node-array access
//!
//! The driver only ever talks to the node array through the [`Transport`]
//! trait. Every operation names the core it goes through explicitly, so no
//! operation depends on node selection left behind by another.
//!
//! # Components
//!
//! - [`Transport`] - Read/write/start interface to a node array
//! - [`TransportStats`] - Traffic counters kept by implementations
//! - [`SimulatedNodeArray`] - In-memory array for testing without hardware
//!   (feature-gated)

#[cfg(feature = "simulated-array")]
pub mod simulated;
pub mod transport;

#[cfg(feature = "simulated-array")]
pub use simulated::{CoreBehaviour, SimulatedMemory, SimulatedNodeArray, TransportOp};
pub use transport::{Transport, TransportStats};

#[cfg(test)]
pub use transport::MockTransport;
