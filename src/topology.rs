//! Node-array topology
//!
//! A minimal model of the array the experiment runs on: which chips exist and
//! which application cores on each chip take part. Monitor cores are never
//! members of a topology.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{NetExpError, Result};
use crate::types::{ChipCoord, CoreAddr, CoreId, MAX_CORE_ID, MONITOR_CORE};

/// Chips of the array and the active application cores on each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    chips: BTreeMap<ChipCoord, BTreeSet<CoreId>>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// A fully populated `width` x `height` board with application cores
    /// `1..=cores_per_chip` on every chip
    ///
    /// `cores_per_chip` is capped at [`MAX_CORE_ID`].
    pub fn rectangular(width: u32, height: u32, cores_per_chip: u8) -> Self {
        if cores_per_chip > MAX_CORE_ID {
            tracing::warn!(
                "Only cores 1..={} can be addressed, ignoring the other {}",
                MAX_CORE_ID,
                cores_per_chip - MAX_CORE_ID
            );
        }
        let cores_per_chip = cores_per_chip.min(MAX_CORE_ID);

        let mut topology = Self::new();
        for y in 0..height {
            for x in 0..width {
                topology.add_chip(ChipCoord::new(x, y), 1..=cores_per_chip);
            }
        }
        topology
    }

    /// Add (or extend) a chip with the given application cores
    ///
    /// The monitor core is ignored if present, as is any core above
    /// [`MAX_CORE_ID`].
    pub fn add_chip(&mut self, chip: ChipCoord, cores: impl IntoIterator<Item = CoreId>) {
        let active = self.chips.entry(chip).or_default();
        for core in cores {
            if core > MAX_CORE_ID {
                tracing::warn!("Ignoring core {} on {}: no route bit", core, chip);
            } else if core != MONITOR_CORE {
                active.insert(core);
            }
        }
    }

    /// Remove a chip, e.g. to model a faulty node
    pub fn remove_chip(&mut self, chip: ChipCoord) -> bool {
        self.chips.remove(&chip).is_some()
    }

    /// Remove a single core, returning whether it was present
    pub fn remove_core(&mut self, core: CoreAddr) -> bool {
        self.chips
            .get_mut(&core.chip)
            .is_some_and(|cores| cores.remove(&core.core))
    }

    /// Chips in ascending coordinate order
    pub fn chips(&self) -> impl Iterator<Item = ChipCoord> + '_ {
        self.chips.keys().copied()
    }

    /// Active cores of `chip` in ascending id order
    pub fn cores_on(&self, chip: ChipCoord) -> impl Iterator<Item = CoreAddr> + '_ {
        self.chips
            .get(&chip)
            .into_iter()
            .flatten()
            .map(move |&core| CoreAddr::new(chip, core))
    }

    /// Every active core, chip by chip
    pub fn cores(&self) -> impl Iterator<Item = CoreAddr> + '_ {
        self.chips
            .iter()
            .flat_map(|(&chip, cores)| cores.iter().map(move |&core| CoreAddr::new(chip, core)))
    }

    pub fn contains_chip(&self, chip: ChipCoord) -> bool {
        self.chips.contains_key(&chip)
    }

    pub fn contains_core(&self, core: CoreAddr) -> bool {
        self.chips
            .get(&core.chip)
            .is_some_and(|cores| cores.contains(&core.core))
    }

    /// Bitmask of the active cores on `chip` (bit n set for core n)
    pub fn core_mask(&self, chip: ChipCoord) -> u32 {
        self.cores_on(chip)
            .fold(0, |mask, core| mask | (1u32 << core.core))
    }

    /// Number of columns spanned by the chips (max x + 1)
    pub fn width(&self) -> u32 {
        self.chips.keys().map(|c| c.x + 1).max().unwrap_or(0)
    }

    /// Number of rows spanned by the chips (max y + 1)
    pub fn height(&self) -> u32 {
        self.chips.keys().map(|c| c.y + 1).max().unwrap_or(0)
    }

    pub fn num_chips(&self) -> usize {
        self.chips.len()
    }

    pub fn num_cores(&self) -> usize {
        self.chips.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Check that `core` may carry traffic
    pub fn check_traffic_core(&self, core: CoreAddr) -> Result<()> {
        if core.is_monitor() {
            return Err(NetExpError::MonitorCore(core));
        }
        if !self.contains_core(core) {
            return Err(NetExpError::UnknownCore(core));
        }
        Ok(())
    }
}
