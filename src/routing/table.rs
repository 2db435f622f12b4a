//! Routing-table generation
//!
//! Each chip's router needs one entry per routing key whose route passes
//! through it. Keys are matched exactly, so every entry carries a full mask.

use crate::protocol::RoutingTableEntry;
use crate::types::{ChipCoord, Route};

/// Mask matching a routing key exactly
pub const EXACT_MATCH_MASK: u32 = 0xFFFF_FFFF;

/// Build the router table for `chip`, one entry per route that visits it
///
/// Entries come out in ascending key order. Routes that never pass through
/// `chip` contribute nothing.
pub fn routing_table(chip: ChipCoord, routes: &[Route]) -> Vec<RoutingTableEntry> {
    let mut entries: Vec<_> = routes
        .iter()
        .filter_map(|route| {
            let word = route.route_word(chip);
            (word != 0).then_some(RoutingTableEntry {
                key: route.routing_key,
                mask: EXACT_MATCH_MASK,
                route: word,
            })
        })
        .collect();
    entries.sort_by_key(|entry| entry.key);
    entries
}
