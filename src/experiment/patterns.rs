//! Canned stream patterns
//!
//! Helpers that add one stream per application core in the topology, all
//! using the same generator and instant consumers.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::routing::RoutingAlgorithm;
use crate::traffic::{Consumer, Generator};
use crate::types::{CoreAddr, RoutingKey};

use super::NetworkExperiment;

/// How sources are connected to destinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    /// Every core sends to every core, itself included
    #[default]
    AllToAll,
    /// Every core sends to the core with the same id on every chip
    SameCore,
}

impl TrafficPattern {
    /// Destinations of the stream sourced at `source`
    pub fn destinations(&self, source: CoreAddr, cores: &[CoreAddr]) -> Vec<CoreAddr> {
        match self {
            TrafficPattern::AllToAll => cores.to_vec(),
            TrafficPattern::SameCore => cores
                .iter()
                .copied()
                .filter(|core| core.core == source.core)
                .collect(),
        }
    }
}

/// Keys of the streams added by one pattern, with their intended fan-out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternStreams {
    pub keys: Vec<RoutingKey>,
    /// Total destinations over all streams
    pub destinations: usize,
}

impl PatternStreams {
    /// Mean destinations per stream
    pub fn fanout(&self) -> f64 {
        if self.keys.is_empty() {
            0.0
        } else {
            self.destinations as f64 / self.keys.len() as f64
        }
    }
}

impl NetworkExperiment {
    /// Add one stream per core of the topology, connected by `pattern`
    ///
    /// Stops at the first stream that cannot be added; streams added before
    /// it are kept.
    pub fn add_pattern(
        &mut self,
        pattern: TrafficPattern,
        generator: Generator,
        routing_algorithms: &[&dyn RoutingAlgorithm],
    ) -> Result<PatternStreams> {
        let cores: Vec<CoreAddr> = self.topology.cores().collect();
        let mut streams = PatternStreams::default();

        for &source in &cores {
            let destinations: Vec<_> = pattern
                .destinations(source, &cores)
                .into_iter()
                .map(|core| (core, Consumer::Instant))
                .collect();

            let key = self.add_stream(source, generator, &destinations, routing_algorithms)?;
            streams.keys.push(key);
            streams.destinations += destinations.len();
        }

        tracing::info!(
            "Added {:?} pattern: {} stream(s), intended fan-out {:.2}",
            pattern,
            streams.keys.len(),
            streams.fanout()
        );
        Ok(streams)
    }
}
