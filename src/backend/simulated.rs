//! Simulated node array for testing
//!
//! This module provides an in-memory node array that can stand in for real
//! hardware. It models each chip's SDRAM and image memory, and a firmware
//! that runs instantly when started: each started core parses its config
//! slot, applies its configured [`CoreBehaviour`], optionally lets a firmware
//! hook fill in result counters, and writes its records back.
//!
//! # Example
//!
//! ```ignore
//! use netexp_rs::backend::{CoreBehaviour, SimulatedNodeArray};
//!
//! let mut array = SimulatedNodeArray::new(experiment.topology())
//!     .with_firmware(|_core, records| {
//!         for sink in &mut records.consumers {
//!             sink.packets_arrived = 90;
//!         }
//!     });
//! array.set_behaviour(stuck_core, CoreBehaviour::Hang);
//!
//! let results = experiment.run(&mut array, &DriverConfig::default(), &[])?;
//! ```
//!
//! # Enabling
//!
//! The simulated array is available when the `simulated-array` feature is
//! enabled (it is on by default).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::error::{NetExpError, Result};
use crate::protocol::{
    core_config_address, records_span, CompletionState, CoreRecords, RootBlock,
    RoutingTableEntry, APP_IMAGE_ADDRESS, CORE_CONFIG_STRIDE, CORE_MAP_SIZE, SDRAM_BASE,
};
use crate::topology::Topology;
use crate::types::{ChipCoord, CoreAddr, CoreId};

use super::transport::{Transport, TransportStats};

/// Highest core id a simulated chip provides a config slot for
pub const SIMULATED_MAX_CORE: CoreId = 17;

/// Default size of the image memory on each chip (64 KiB)
pub const DEFAULT_IMAGE_CAPACITY: usize = 64 * 1024;

/// What a simulated core does when started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreBehaviour {
    /// Run the firmware hook and report success
    #[default]
    Complete,
    /// Never leave the running state
    Hang,
    /// Report failure
    Fail,
    /// Report an arbitrary completion-state value
    Report(u32),
}

/// One operation seen by the simulated array, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Write {
        node: CoreAddr,
        address: u32,
        length: usize,
    },
    Read {
        node: CoreAddr,
        address: u32,
        length: usize,
    },
    Start {
        chip: ChipCoord,
        core_mask: u32,
    },
    Wait(Duration),
}

/// Memory that can be read/written in fixed regions
#[derive(Debug, Default)]
pub struct SimulatedMemory {
    /// Memory regions mapped by base address
    regions: BTreeMap<u32, Vec<u8>>,
}

impl SimulatedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zero-filled memory region
    pub fn add_region(&mut self, base_address: u32, size: usize) {
        self.regions.insert(base_address, vec![0u8; size]);
    }

    /// Write data to memory, returning false if it does not fit a region
    pub fn write(&mut self, address: u32, data: &[u8]) -> bool {
        let address = u64::from(address);
        for (&base, region) in &mut self.regions {
            let base = u64::from(base);
            let end = base + region.len() as u64;
            if address >= base && address + data.len() as u64 <= end {
                let offset = (address - base) as usize;
                region[offset..offset + data.len()].copy_from_slice(data);
                return true;
            }
        }
        false
    }

    /// Read data from memory, or `None` if the span is not inside a region
    pub fn read(&self, address: u32, size: usize) -> Option<Vec<u8>> {
        let address = u64::from(address);
        for (&base, region) in &self.regions {
            let base = u64::from(base);
            let end = base + region.len() as u64;
            if address >= base && address + size as u64 <= end {
                let offset = (address - base) as usize;
                return Some(region[offset..offset + size].to_vec());
            }
        }
        None
    }
}

type FirmwareHook = Box<dyn FnMut(CoreAddr, &mut CoreRecords) + Send>;

/// In-memory node array implementing [`Transport`]
pub struct SimulatedNodeArray {
    chips: BTreeMap<ChipCoord, SimulatedMemory>,
    behaviours: HashMap<CoreAddr, CoreBehaviour>,
    firmware: Option<FirmwareHook>,
    log: Vec<TransportOp>,
    stats: TransportStats,
    /// If true, `wait` really sleeps
    real_time: bool,
}

impl fmt::Debug for SimulatedNodeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedNodeArray")
            .field("chips", &self.chips.len())
            .field("behaviours", &self.behaviours)
            .field("firmware", &self.firmware.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl SimulatedNodeArray {
    /// Create an array with memory for every chip in `topology`
    pub fn new(topology: &Topology) -> Self {
        Self::with_image_capacity(topology, DEFAULT_IMAGE_CAPACITY)
    }

    /// Create an array whose image memory holds `image_capacity` bytes
    pub fn with_image_capacity(topology: &Topology, image_capacity: usize) -> Self {
        let sdram_size = CORE_MAP_SIZE + usize::from(SIMULATED_MAX_CORE) * CORE_CONFIG_STRIDE;
        let chips = topology
            .chips()
            .map(|chip| {
                let mut memory = SimulatedMemory::new();
                memory.add_region(SDRAM_BASE, sdram_size);
                memory.add_region(APP_IMAGE_ADDRESS, image_capacity);
                (chip, memory)
            })
            .collect();

        Self {
            chips,
            behaviours: HashMap::new(),
            firmware: None,
            log: Vec::new(),
            stats: TransportStats::default(),
            real_time: false,
        }
    }

    /// Install a hook that fills in result counters for completing cores
    pub fn with_firmware<F>(mut self, hook: F) -> Self
    where
        F: FnMut(CoreAddr, &mut CoreRecords) + Send + 'static,
    {
        self.firmware = Some(Box::new(hook));
        self
    }

    /// Make `wait` actually sleep
    pub fn with_real_time(mut self, enabled: bool) -> Self {
        self.real_time = enabled;
        self
    }

    /// Configure how a core behaves when started
    pub fn set_behaviour(&mut self, core: CoreAddr, behaviour: CoreBehaviour) {
        self.behaviours.insert(core, behaviour);
    }

    /// Every operation performed so far, in order
    pub fn log(&self) -> &[TransportOp] {
        &self.log
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Direct access to a chip's memory, bypassing the log
    pub fn memory(&self, chip: ChipCoord) -> Option<&SimulatedMemory> {
        self.chips.get(&chip)
    }

    pub fn memory_mut(&mut self, chip: ChipCoord) -> Option<&mut SimulatedMemory> {
        self.chips.get_mut(&chip)
    }

    fn chip_memory(&mut self, node: CoreAddr, address: u32) -> Result<&mut SimulatedMemory> {
        self.chips
            .get_mut(&node.chip)
            .ok_or_else(|| NetExpError::MemoryAccess {
                node,
                address,
                message: "No such chip in the simulated array".to_string(),
            })
    }

    /// Run the firmware for one core
    fn run_core(&mut self, core: CoreAddr) -> Result<()> {
        let address = core_config_address(core.core);
        let memory = self.chip_memory(core, address)?;
        let root_bytes = memory
            .read(address, RootBlock::SIZE)
            .ok_or_else(|| NetExpError::MemoryAccess {
                node: core,
                address,
                message: "Config slot outside simulated SDRAM".to_string(),
            })?;
        let root = RootBlock::decode(&root_bytes)?;
        let span = records_span(root.num_sources as usize, root.num_sinks as usize)
            + root.num_router_entries as usize * RoutingTableEntry::SIZE;

        let behaviour = self.behaviours.get(&core).copied().unwrap_or_default();
        let parsed = self
            .chip_memory(core, address)?
            .read(address, span)
            .map(|bytes| CoreRecords::decode(&bytes, true));

        let final_state = match (behaviour, parsed) {
            (CoreBehaviour::Hang, _) => return Ok(()),
            (CoreBehaviour::Fail, _) => CompletionState::Failure,
            (CoreBehaviour::Report(raw), _) => CompletionState::from_raw(raw),
            (CoreBehaviour::Complete, Some(Ok(mut records))) => {
                if let Some(hook) = self.firmware.as_mut() {
                    hook(core, &mut records);
                }
                records.root.completion_state = CompletionState::Success;
                let bytes = records.encode();
                self.chip_memory(core, address)?.write(address, &bytes);
                return Ok(());
            }
            (CoreBehaviour::Complete, _) => {
                tracing::warn!("Simulated core {} could not parse its config", core);
                CompletionState::Failure
            }
        };

        let state_address = address + RootBlock::COMPLETION_STATE_OFFSET as u32;
        self.chip_memory(core, state_address)?
            .write(state_address, &final_state.to_raw().to_le_bytes());
        Ok(())
    }
}

impl Transport for SimulatedNodeArray {
    fn write_bytes(&mut self, node: CoreAddr, address: u32, data: &[u8]) -> Result<()> {
        self.log.push(TransportOp::Write {
            node,
            address,
            length: data.len(),
        });

        if self.chip_memory(node, address)?.write(address, data) {
            self.stats.record_write(data.len());
            Ok(())
        } else {
            self.stats.record_failure();
            Err(NetExpError::MemoryAccess {
                node,
                address,
                message: format!("{} byte write outside simulated memory", data.len()),
            })
        }
    }

    fn read_bytes(&mut self, node: CoreAddr, address: u32, length: usize) -> Result<Vec<u8>> {
        self.log.push(TransportOp::Read {
            node,
            address,
            length,
        });

        match self.chip_memory(node, address)?.read(address, length) {
            Some(bytes) => {
                self.stats.record_read(length);
                Ok(bytes)
            }
            None => {
                self.stats.record_failure();
                Err(NetExpError::MemoryAccess {
                    node,
                    address,
                    message: format!("{} byte read outside simulated memory", length),
                })
            }
        }
    }

    fn start_app(&mut self, chip: ChipCoord, core_mask: u32) -> Result<()> {
        self.log.push(TransportOp::Start { chip, core_mask });
        tracing::debug!("Simulated start on {} with mask 0x{:08X}", chip, core_mask);

        for core in 1..=SIMULATED_MAX_CORE {
            if core_mask & (1 << core) != 0 {
                self.run_core(CoreAddr::new(chip, core))?;
            }
        }
        Ok(())
    }

    fn wait(&mut self, duration: Duration) {
        self.log.push(TransportOp::Wait(duration));
        if self.real_time {
            std::thread::sleep(duration);
        }
    }
}
