//! # netexp-rs: Packet-Routing Experiments on Node Arrays
//!
//! Drives traffic experiments on an array of networked chips, each with a
//! router and several processing cores. Streams of packets are composed into
//! routes, every core's part of the experiment is serialized into fixed
//! binary records, and the records are loaded, run, polled and read back into
//! a result tree.
//!
//! ## Architecture
//!
//! - **Experiment**: Topology, streams and timing ([`NetworkExperiment`])
//! - **Routing**: Pluggable routing algorithms and per-chip table generation
//! - **Protocol**: Byte-exact records shared with the node firmware
//! - **Driver**: The load → run → poll → collect state machine
//! - **Backend**: The [`Transport`](backend::Transport) trait and a simulated
//!   node array
//! - **Results**: The reconstructed per-chip, per-core, per-stream counters
//!
//! ## Example
//!
//! ```ignore
//! use netexp_rs::{
//!     backend::SimulatedNodeArray, Consumer, DimensionOrderRouter, DriverConfig, Generator,
//!     NetworkExperiment, Topology,
//! };
//!
//! fn main() -> netexp_rs::Result<()> {
//!     let mut experiment = NetworkExperiment::new(Topology::rectangular(2, 2, 16));
//!     experiment.add_stream(
//!         source,
//!         Generator::bernoulli(0.1)?,
//!         &[(destination, Consumer::Instant)],
//!         &[&DimensionOrderRouter],
//!     )?;
//!     experiment.set_router_timeout(512)?;
//!
//!     let mut array = SimulatedNodeArray::new(experiment.topology());
//!     let results = experiment.run(&mut array, &DriverConfig::default(), &[])?;
//!     println!("Arrived: {}", results.total_arrived());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod experiment;
pub mod protocol;
pub mod results;
pub mod routing;
pub mod timeout;
pub mod topology;
pub mod traffic;
pub mod types;

// Re-export commonly used types
pub use config::{DriverConfig, ExperimentFile};
pub use driver::{DriverState, ExperimentDriver, PollOutcome};
pub use error::{NetExpError, Result};
pub use experiment::{NetworkExperiment, TrafficPattern};
pub use results::ExperimentResults;
pub use routing::{DimensionOrderRouter, RoutingAlgorithm};
pub use timeout::RouterTimeout;
pub use topology::Topology;
pub use traffic::{Consumer, Generator};
pub use types::{ChipCoord, CoreAddr, RoutingKey};
