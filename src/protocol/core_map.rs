//! Core-map table
//!
//! The firmware learns which cores on which chips take part in the
//! experiment from a grid of per-chip bitmasks. The table is a `width` and
//! `height` header followed by one 32-bit mask per chip at index
//! `y * width + x`, zero-padded to [`CORE_MAP_SIZE`](super::CORE_MAP_SIZE).

use std::collections::BTreeMap;

use crate::error::{CapacityKind, NetExpError, Result};
use crate::topology::Topology;
use crate::types::ChipCoord;

use super::{CORE_MAP_SIZE, MAX_DIMENSION};

/// Chip coordinate to active-core bitmask
pub type CoreMap = BTreeMap<ChipCoord, u32>;

/// Pack the active cores of `topology` into a core-map table
pub fn pack_core_map(topology: &Topology) -> Result<Vec<u8>> {
    let width = topology.width();
    let height = topology.height();
    for extent in [width, height] {
        if extent as usize > MAX_DIMENSION {
            return Err(NetExpError::CapacityExceeded {
                kind: CapacityKind::Dimension,
                actual: extent as usize,
                max: MAX_DIMENSION,
            });
        }
    }

    let mut out = Vec::with_capacity(CORE_MAP_SIZE);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    for y in 0..height {
        for x in 0..width {
            let mask = topology.core_mask(ChipCoord::new(x, y));
            out.extend_from_slice(&mask.to_le_bytes());
        }
    }
    out.resize(CORE_MAP_SIZE, 0);
    Ok(out)
}

/// Parse a core-map table, returning every chip with a non-zero mask
pub fn unpack_core_map(bytes: &[u8]) -> Result<CoreMap> {
    let word = |index: usize| -> Result<u32> {
        bytes
            .get(index * 4..index * 4 + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| {
                NetExpError::MalformedRecord(format!("core map truncated at word {}", index))
            })
    };

    let width = word(0)?;
    let height = word(1)?;
    if width as usize > MAX_DIMENSION || height as usize > MAX_DIMENSION {
        return Err(NetExpError::MalformedRecord(format!(
            "core map claims a {}x{} board",
            width, height
        )));
    }
    let mut map = CoreMap::new();
    for y in 0..height {
        for x in 0..width {
            let mask = word(2 + (y * width + x) as usize)?;
            if mask != 0 {
                map.insert(ChipCoord::new(x, y), mask);
            }
        }
    }
    Ok(map)
}
