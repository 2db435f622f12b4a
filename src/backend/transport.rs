//! Transport trait for node-array access
//!
//! This module provides the interface the driver uses to reach the node
//! array, enabling both real connections and the simulated array used in
//! tests. Every call names the core it addresses; implementations must not
//! rely on any node selected by an earlier call.

use std::time::Duration;

use crate::error::Result;
use crate::types::{ChipCoord, CoreAddr};

/// Running totals of transport traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Number of read operations
    pub reads: u64,
    /// Number of write operations
    pub writes: u64,
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
    /// Number of failed operations
    pub failures: u64,
}

impl TransportStats {
    pub fn record_read(&mut self, bytes: usize) {
        self.reads += 1;
        self.bytes_read += bytes as u64;
    }

    pub fn record_write(&mut self, bytes: usize) {
        self.writes += 1;
        self.bytes_written += bytes as u64;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Synchronous access to the memory and processors of a node array
///
/// # Example
///
/// ```ignore
/// fn read_state(transport: &mut dyn Transport, core: CoreAddr) -> Result<Vec<u8>> {
///     transport.read_bytes(core, core_config_address(core.core), 4)
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Write `data` to `address` through `node`
    fn write_bytes(&mut self, node: CoreAddr, address: u32, data: &[u8]) -> Result<()>;

    /// Read `length` bytes from `address` through `node`
    fn read_bytes(&mut self, node: CoreAddr, address: u32, length: usize) -> Result<Vec<u8>>;

    /// Load the staged executable image on `chip` and start it on every core
    /// whose bit is set in `core_mask`
    fn start_app(&mut self, chip: ChipCoord, core_mask: u32) -> Result<()>;

    /// Block for `duration`
    ///
    /// Real connections simply sleep; simulated arrays may skip the wait.
    fn wait(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
