//! Routing algorithms and routing-table generation
//!
//! Routing algorithms compute node sequences from a source core to a set of
//! destination cores. They are pure: an algorithm never touches experiment
//! state, and reports destinations it cannot reach by handing them back as
//! unrouted rather than failing. The stream composer chains several
//! algorithms, passing each one whatever the previous ones left unrouted.
//!
//! # Components
//!
//! - [`RoutingAlgorithm`] - The algorithm contract
//! - [`DimensionOrderRouter`] - X-then-Y mesh routing
//! - [`routing_table`] - Per-chip router table generation from routes

pub mod dimension_order;
pub mod table;

pub use dimension_order::DimensionOrderRouter;
pub use table::routing_table;

use crate::topology::Topology;
use crate::types::{CoreAddr, NodeSequence};

/// Result of one routing pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingOutcome {
    /// Paths found by this pass
    pub node_sequences: Vec<NodeSequence>,
    /// Destinations this pass could not reach
    pub unrouted: Vec<CoreAddr>,
}

impl RoutingOutcome {
    /// An outcome that routes nothing
    pub fn unrouted(destinations: &[CoreAddr]) -> Self {
        Self {
            node_sequences: Vec::new(),
            unrouted: destinations.to_vec(),
        }
    }
}

/// A routing algorithm usable by the stream composer
pub trait RoutingAlgorithm {
    /// Route from `source` to each of `destinations`
    fn route(
        &self,
        source: CoreAddr,
        destinations: &[CoreAddr],
        topology: &Topology,
    ) -> RoutingOutcome;

    /// Short name for log output
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> RoutingAlgorithm for F
where
    F: Fn(CoreAddr, &[CoreAddr], &Topology) -> RoutingOutcome,
{
    fn route(
        &self,
        source: CoreAddr,
        destinations: &[CoreAddr],
        topology: &Topology,
    ) -> RoutingOutcome {
        self(source, destinations, topology)
    }
}
