//! Dimension-order routing
//!
//! Packets first travel East/West until the destination column is reached,
//! then North/South to the destination row, and are finally delivered to the
//! destination core. Only the four axis-aligned links are used.

use crate::topology::Topology;
use crate::types::{ChipCoord, CoreAddr, Hop, Link, NodeSequence, RouteTarget};

use super::{RoutingAlgorithm, RoutingOutcome};

/// X-then-Y routing over the mesh links
#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionOrderRouter;

impl DimensionOrderRouter {
    pub fn new() -> Self {
        Self
    }

    /// The path from `source` to `destination`, or `None` if it leaves the
    /// topology
    fn path(
        &self,
        source: ChipCoord,
        destination: CoreAddr,
        topology: &Topology,
    ) -> Option<NodeSequence> {
        let mut sequence = Vec::new();
        let mut here = source;

        while here != destination.chip {
            let link = if here.x < destination.chip.x {
                Link::East
            } else if here.x > destination.chip.x {
                Link::West
            } else if here.y < destination.chip.y {
                Link::North
            } else {
                Link::South
            };

            sequence.push(Hop::new(here, RouteTarget::Link(link)));
            here = here.neighbour(link)?;
            if !topology.contains_chip(here) {
                return None;
            }
        }

        sequence.push(Hop::new(here, RouteTarget::Core(destination.core)));
        Some(sequence)
    }
}

impl RoutingAlgorithm for DimensionOrderRouter {
    fn route(
        &self,
        source: CoreAddr,
        destinations: &[CoreAddr],
        topology: &Topology,
    ) -> RoutingOutcome {
        let mut outcome = RoutingOutcome::default();

        if !topology.contains_chip(source.chip) {
            return RoutingOutcome::unrouted(destinations);
        }

        for &destination in destinations {
            let path = if topology.contains_core(destination) {
                self.path(source.chip, destination, topology)
            } else {
                None
            };

            match path {
                Some(sequence) => outcome.node_sequences.push(sequence),
                None => outcome.unrouted.push(destination),
            }
        }

        outcome
    }

    fn name(&self) -> &str {
        "dimension-order"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(x: u32, y: u32, c: u8) -> CoreAddr {
        CoreAddr::new(ChipCoord::new(x, y), c)
    }

    #[test]
    fn test_local_delivery() {
        let topology = Topology::rectangular(1, 1, 4);
        let outcome = DimensionOrderRouter.route(core(0, 0, 1), &[core(0, 0, 3)], &topology);

        assert!(outcome.unrouted.is_empty());
        assert_eq!(
            outcome.node_sequences,
            vec![vec![Hop::new(ChipCoord::new(0, 0), RouteTarget::Core(3))]]
        );
    }

    #[test]
    fn test_x_before_y() {
        let topology = Topology::rectangular(3, 3, 2);
        let outcome = DimensionOrderRouter.route(core(2, 0, 1), &[core(0, 2, 2)], &topology);

        let targets: Vec<_> = outcome.node_sequences[0]
            .iter()
            .map(|hop| (hop.chip, hop.target))
            .collect();
        assert_eq!(
            targets,
            vec![
                (ChipCoord::new(2, 0), RouteTarget::Link(Link::West)),
                (ChipCoord::new(1, 0), RouteTarget::Link(Link::West)),
                (ChipCoord::new(0, 0), RouteTarget::Link(Link::North)),
                (ChipCoord::new(0, 1), RouteTarget::Link(Link::North)),
                (ChipCoord::new(0, 2), RouteTarget::Core(2)),
            ]
        );
    }

    #[test]
    fn test_missing_destination_is_unrouted() {
        let topology = Topology::rectangular(2, 1, 2);
        let missing = core(5, 5, 1);
        let outcome =
            DimensionOrderRouter.route(core(0, 0, 1), &[core(1, 0, 1), missing], &topology);

        assert_eq!(outcome.node_sequences.len(), 1);
        assert_eq!(outcome.unrouted, vec![missing]);
    }

    #[test]
    fn test_hole_in_path_is_unrouted() {
        let mut topology = Topology::rectangular(3, 1, 2);
        topology.remove_chip(ChipCoord::new(1, 0));

        let outcome = DimensionOrderRouter.route(core(0, 0, 1), &[core(2, 0, 1)], &topology);
        assert!(outcome.node_sequences.is_empty());
        assert_eq!(outcome.unrouted, vec![core(2, 0, 1)]);
    }
}
