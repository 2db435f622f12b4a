//! Core data types for netexp-rs
//!
//! This module contains the fundamental data structures shared by the
//! composer, serializer and driver for addressing nodes and describing the
//! physical paths that packets take through the array.
//!
//! # Main Types
//!
//! - [`ChipCoord`] - (x, y) position of a chip in the array
//! - [`CoreAddr`] - A single core on a chip; core 0 is the monitor
//! - [`Link`] - One of the six inter-chip links leaving a router
//! - [`NodeSequence`] - An ordered list of router hops ending at a core
//! - [`Route`] - A routing key and every node sequence that carries it
//!
//! # Route Words
//!
//! A router forwards a packet to any combination of its six links and its
//! local cores. [`RouteTarget::route_bit`] gives the bit in a route word for
//! each target: links occupy bits 0-5, core `n` occupies bit `6 + n`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing key assigned to a stream
pub type RoutingKey = u32;

/// Core number within a chip
pub type CoreId = u8;

/// The core id reserved for the monitor processor
pub const MONITOR_CORE: CoreId = 0;

/// Highest application core id a route word can address (bit `6 + id`)
pub const MAX_CORE_ID: CoreId = 25;

/// Coordinate of a chip in the array
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ChipCoord {
    pub x: u32,
    pub y: u32,
}

impl ChipCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The neighbouring chip over `link`, if it has a non-negative coordinate
    pub fn neighbour(&self, link: Link) -> Option<ChipCoord> {
        let (dx, dy) = link.offset();
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        Some(ChipCoord::new(x, y))
    }
}

impl fmt::Display for ChipCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Address of one core: the chip it lives on and its core id
///
/// Every transport operation takes one of these explicitly; there is no
/// implicitly selected node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CoreAddr {
    pub chip: ChipCoord,
    pub core: CoreId,
}

impl CoreAddr {
    pub const fn new(chip: ChipCoord, core: CoreId) -> Self {
        Self { chip, core }
    }

    /// The monitor core of `chip`
    pub const fn monitor(chip: ChipCoord) -> Self {
        Self {
            chip,
            core: MONITOR_CORE,
        }
    }

    /// Returns true for the reserved monitor core
    pub fn is_monitor(&self) -> bool {
        self.core == MONITOR_CORE
    }
}

impl fmt::Display for CoreAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.chip.x, self.chip.y, self.core)
    }
}

/// The six inter-chip links of a router, in route-word bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Link {
    East,
    NorthEast,
    North,
    West,
    SouthWest,
    South,
}

impl Link {
    pub const ALL: [Link; 6] = [
        Link::East,
        Link::NorthEast,
        Link::North,
        Link::West,
        Link::SouthWest,
        Link::South,
    ];

    /// (dx, dy) travelled when leaving over this link
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Link::East => (1, 0),
            Link::NorthEast => (1, 1),
            Link::North => (0, 1),
            Link::West => (-1, 0),
            Link::SouthWest => (-1, -1),
            Link::South => (0, -1),
        }
    }

    /// Bit index of this link in a route word
    pub fn index(&self) -> u32 {
        match self {
            Link::East => 0,
            Link::NorthEast => 1,
            Link::North => 2,
            Link::West => 3,
            Link::SouthWest => 4,
            Link::South => 5,
        }
    }
}

/// Where a router sends a packet at one hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteTarget {
    /// Forward to a neighbouring chip
    Link(Link),
    /// Deliver to a local core
    Core(CoreId),
}

impl RouteTarget {
    /// The bit this target sets in a route word
    ///
    /// Cores above [`MAX_CORE_ID`] have no bit and contribute nothing.
    pub fn route_bit(&self) -> u32 {
        match self {
            RouteTarget::Link(link) => 1 << link.index(),
            RouteTarget::Core(core) => 1u32.checked_shl(6 + u32::from(*core)).unwrap_or(0),
        }
    }
}

/// A single router hop: the chip doing the forwarding and where it forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hop {
    pub chip: ChipCoord,
    pub target: RouteTarget,
}

impl Hop {
    pub fn new(chip: ChipCoord, target: RouteTarget) -> Self {
        Self { chip, target }
    }
}

/// An ordered path from the source chip to one destination core
pub type NodeSequence = Vec<Hop>;

/// A routing key together with every path contributed by the routing passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub routing_key: RoutingKey,
    pub node_sequences: Vec<NodeSequence>,
}

impl Route {
    /// Create a route with no paths yet
    pub fn new(routing_key: RoutingKey) -> Self {
        Self {
            routing_key,
            node_sequences: Vec::new(),
        }
    }

    /// Append a path; existing paths are never modified
    pub fn add_node_sequence(&mut self, sequence: NodeSequence) {
        self.node_sequences.push(sequence);
    }

    /// The route word this route needs in `chip`'s router, zero if it never
    /// passes through
    pub fn route_word(&self, chip: ChipCoord) -> u32 {
        self.node_sequences
            .iter()
            .flatten()
            .filter(|hop| hop.chip == chip)
            .fold(0, |word, hop| word | hop.target.route_bit())
    }
}
