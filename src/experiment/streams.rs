//! Stream composition
//!
//! A stream joins one source core to any number of destination cores under a
//! single routing key. Routing is attempted with each algorithm in turn, each
//! one given only the destinations its predecessors failed to reach.

use crate::error::{NetExpError, Result};
use crate::routing::RoutingAlgorithm;
use crate::traffic::{Consumer, Generator};
use crate::types::{CoreAddr, Route, RoutingKey};

use super::NetworkExperiment;

impl NetworkExperiment {
    /// Add a stream and return its routing key
    ///
    /// Keys are handed out sequentially from 0 and only once routing has
    /// succeeded; a failed call leaves the experiment untouched. A stream with
    /// no destinations is valid and registers only its source. Every
    /// destination must be an application core of the topology, whatever the
    /// routing algorithms would make of it.
    pub fn add_stream(
        &mut self,
        source: CoreAddr,
        generator: Generator,
        destinations: &[(CoreAddr, Consumer)],
        routing_algorithms: &[&dyn RoutingAlgorithm],
    ) -> Result<RoutingKey> {
        self.topology.check_traffic_core(source)?;
        for &(destination, _) in destinations {
            self.topology.check_traffic_core(destination)?;
        }

        let mut unrouted: Vec<CoreAddr> = destinations.iter().map(|&(core, _)| core).collect();
        let mut node_sequences = Vec::new();
        let mut algorithms = routing_algorithms.iter();

        while !unrouted.is_empty() {
            let Some(algorithm) = algorithms.next() else {
                tracing::warn!(
                    "Stream from {} has {} unroutable destination(s)",
                    source,
                    unrouted.len()
                );
                return Err(NetExpError::UnroutableDestinations(unrouted));
            };

            let outcome = algorithm.route(source, &unrouted, &self.topology);
            tracing::trace!(
                "{} routing from {}: {} path(s), {} left",
                algorithm.name(),
                source,
                outcome.node_sequences.len(),
                outcome.unrouted.len()
            );
            node_sequences.extend(outcome.node_sequences);
            unrouted = outcome.unrouted;
        }

        let key = self.routes.len() as RoutingKey;
        let mut route = Route::new(key);
        for sequence in node_sequences {
            route.add_node_sequence(sequence);
        }
        self.routes.push(route);

        self.registries
            .entry(source)
            .or_default()
            .add_generator(key, generator);
        for &(destination, consumer) in destinations {
            self.registries
                .entry(destination)
                .or_default()
                .add_consumer(key, consumer);
        }

        tracing::debug!(
            "Added stream {} from {} to {} destination(s)",
            key,
            source,
            destinations.len()
        );
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{routing_table, DimensionOrderRouter, RoutingOutcome};
    use crate::topology::Topology;
    use crate::types::{ChipCoord, Hop, RouteTarget};

    fn core(x: u32, y: u32, c: u8) -> CoreAddr {
        CoreAddr::new(ChipCoord::new(x, y), c)
    }

    fn bernoulli() -> Generator {
        Generator::Bernoulli { probability: 0.1 }
    }

    /// Routes nothing
    fn refuse_all(_: CoreAddr, destinations: &[CoreAddr], _: &Topology) -> RoutingOutcome {
        RoutingOutcome::unrouted(destinations)
    }

    /// Delivers locally to anything, ignoring the topology
    fn teleport(_: CoreAddr, destinations: &[CoreAddr], _: &Topology) -> RoutingOutcome {
        RoutingOutcome {
            node_sequences: destinations
                .iter()
                .map(|d| vec![Hop::new(d.chip, RouteTarget::Core(d.core))])
                .collect(),
            unrouted: Vec::new(),
        }
    }

    #[test]
    fn test_keys_are_sequential() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(2, 2, 4));
        let router = DimensionOrderRouter;

        for expected in 0..5 {
            let dests = [(core(1, 1, 2), Consumer::Instant)];
            let key = experiment
                .add_stream(core(0, 0, 1), bernoulli(), &dests, &[&router])
                .unwrap();
            assert_eq!(key, expected);
        }
        assert_eq!(experiment.routes().len(), 5);
    }

    #[test]
    fn test_empty_destinations() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(1, 1, 2));
        let key = experiment
            .add_stream(core(0, 0, 1), bernoulli(), &[], &[])
            .unwrap();

        assert_eq!(key, 0);
        assert!(experiment.route(key).unwrap().node_sequences.is_empty());
        assert_eq!(
            experiment.registry(core(0, 0, 1)).unwrap().num_generators(),
            1
        );
        assert!(experiment
            .registries()
            .all(|(_, registry)| registry.num_consumers() == 0));
    }

    #[test]
    fn test_fallback_chain() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(2, 1, 2));
        let dests = [
            (core(0, 0, 2), Consumer::Instant),
            (core(1, 0, 1), Consumer::Instant),
        ];
        let algorithms: [&dyn RoutingAlgorithm; 2] = [&refuse_all, &DimensionOrderRouter];

        let key = experiment
            .add_stream(core(0, 0, 1), bernoulli(), &dests, &algorithms)
            .unwrap();

        assert_eq!(experiment.route(key).unwrap().node_sequences.len(), 2);
        assert!(experiment.registry(core(1, 0, 1)).unwrap().consumer(key).is_some());
    }

    #[test]
    fn test_chain_accumulates_partial_results() {
        let mut topology = Topology::rectangular(3, 1, 2);
        topology.remove_chip(ChipCoord::new(1, 0));
        let mut experiment = NetworkExperiment::new(topology);

        // Dimension order cannot cross the hole; the second pass takes the rest
        let dests = [
            (core(0, 0, 2), Consumer::Instant),
            (core(2, 0, 1), Consumer::Instant),
        ];
        let algorithms: [&dyn RoutingAlgorithm; 2] = [&DimensionOrderRouter, &teleport];
        let key = experiment
            .add_stream(core(0, 0, 1), bernoulli(), &dests, &algorithms)
            .unwrap();

        let route = experiment.route(key).unwrap();
        assert_eq!(route.node_sequences.len(), 2);
        assert_eq!(
            route.node_sequences[1],
            vec![Hop::new(ChipCoord::new(2, 0), RouteTarget::Core(1))]
        );
    }

    #[test]
    fn test_unroutable_leaves_no_trace() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(2, 1, 2));
        let dests = [(core(1, 0, 1), Consumer::Instant)];

        let err = experiment
            .add_stream(core(0, 0, 1), bernoulli(), &dests, &[&refuse_all])
            .unwrap_err();
        assert!(matches!(
            err,
            NetExpError::UnroutableDestinations(ref left) if left == &vec![core(1, 0, 1)]
        ));
        assert!(experiment.routes().is_empty());
        assert_eq!(experiment.registries().count(), 0);

        // The key is not consumed by the failure
        let key = experiment
            .add_stream(core(0, 0, 1), bernoulli(), &dests, &[&DimensionOrderRouter])
            .unwrap();
        assert_eq!(key, 0);
    }

    #[test]
    fn test_monitor_cores_rejected() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(1, 1, 2));
        let router = DimensionOrderRouter;

        assert!(matches!(
            experiment.add_stream(core(0, 0, 0), bernoulli(), &[], &[&router]),
            Err(NetExpError::MonitorCore(_))
        ));
        assert!(matches!(
            experiment.add_stream(
                core(0, 0, 1),
                bernoulli(),
                &[(core(0, 0, 0), Consumer::Instant)],
                &[&router]
            ),
            Err(NetExpError::MonitorCore(_))
        ));
    }

    #[test]
    fn test_destination_outside_topology_rejected() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(1, 1, 2));
        let dests = [
            (core(0, 0, 1), Consumer::Instant),
            (core(5, 5, 1), Consumer::Instant),
        ];

        // Even an algorithm willing to deliver anywhere never sees it
        let err = experiment
            .add_stream(core(0, 0, 2), bernoulli(), &dests, &[&teleport])
            .unwrap_err();
        assert!(matches!(err, NetExpError::UnknownCore(c) if c == core(5, 5, 1)));
        assert!(experiment.routes().is_empty());
        assert_eq!(experiment.registries().count(), 0);
    }

    #[test]
    fn test_unaddressable_destination_rejected() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(1, 1, 40));
        let dests = [(core(0, 0, 26), Consumer::Instant)];

        let err = experiment
            .add_stream(core(0, 0, 1), bernoulli(), &dests, &[&DimensionOrderRouter])
            .unwrap_err();
        assert!(matches!(err, NetExpError::UnknownCore(_)));
        assert!(routing_table(ChipCoord::new(0, 0), experiment.routes()).is_empty());
    }
}
