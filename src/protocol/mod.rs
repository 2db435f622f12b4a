//! Binary configuration protocol shared with the node firmware
//!
//! Every record is little-endian with fixed-width fields. Each chip's SDRAM
//! holds a core-map table followed by one fixed-size config slot per
//! application core:
//!
//! ```text
//! SDRAM_BASE
//! +------------------------------+
//! | core map (CORE_MAP_SIZE)     |
//! +------------------------------+  <- core_config_address(1)
//! | root block                   |
//! | MAX_SOURCES generator slots  |
//! | MAX_SINKS consumer slots     |
//! | MAX_ROUTES table-entry slots |
//! +------------------------------+  <- core_config_address(2)
//! | ...                          |
//! ```
//!
//! Records are packed back to back inside a slot: the root block, then the
//! used generator records, then the used consumer records, then (on the
//! table-loader core only) the routing-table entries. The firmware reads the
//! counts in the root block to find each section.

pub mod core_map;
pub mod records;
pub mod serializer;

pub use core_map::{pack_core_map, unpack_core_map, CoreMap};
pub use records::{
    CompletionState, ConsumerRecord, CoreRecords, GeneratorRecord, RootBlock, RoutingTableEntry,
};
pub use serializer::{build_core_records, check_capacity, RunParameters};

use crate::types::{CoreId, MONITOR_CORE};

/// Maximum generator records per core
pub const MAX_SOURCES: usize = 256;

/// Maximum consumer records per core
pub const MAX_SINKS: usize = 256;

/// Maximum routing-table entries per chip
pub const MAX_ROUTES: usize = 1000;

/// Maximum width/height of the core-map grid
pub const MAX_DIMENSION: usize = 24;

/// Start of the uncached SDRAM window holding the core map and configs
pub const SDRAM_BASE: u32 = 0x7000_0000;

/// Where the executable image is staged before being started
pub const APP_IMAGE_ADDRESS: u32 = 0x6780_0000;

/// Size of the core-map table: width, height and a fixed grid of bitmasks
pub const CORE_MAP_SIZE: usize = (MAX_DIMENSION * MAX_DIMENSION + 2) * 4;

/// Bytes reserved for one core's configuration
pub const CORE_CONFIG_STRIDE: usize = RootBlock::SIZE
    + MAX_SOURCES * GeneratorRecord::SIZE
    + MAX_SINKS * ConsumerRecord::SIZE
    + MAX_ROUTES * RoutingTableEntry::SIZE;

/// Address of the core-map table
pub fn core_map_address() -> u32 {
    SDRAM_BASE
}

/// Address of the configuration slot for application core `core`
///
/// Slots start at core 1. The monitor core has no slot and must never be
/// passed here.
pub fn core_config_address(core: CoreId) -> u32 {
    debug_assert!(core != MONITOR_CORE, "the monitor core has no config slot");
    let slot = usize::from(core.saturating_sub(1));
    SDRAM_BASE + (CORE_MAP_SIZE + slot * CORE_CONFIG_STRIDE) as u32
}

/// Bytes occupied by a root block plus the given generator/consumer records
pub fn records_span(num_sources: usize, num_sinks: usize) -> usize {
    RootBlock::SIZE + num_sources * GeneratorRecord::SIZE + num_sinks * ConsumerRecord::SIZE
}
