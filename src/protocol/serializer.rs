//! Per-core config serialization
//!
//! Turns a core's generator/consumer registry plus the experiment timing into
//! the records loaded into its config slot. Capacity is checked before any
//! record is built, so an oversized core produces no bytes at all.

use crate::error::{CapacityKind, NetExpError, Result};
use crate::experiment::CoreRegistry;
use crate::timeout::RouterTimeout;

use super::records::{
    CompletionState, ConsumerRecord, CoreRecords, GeneratorRecord, RootBlock, RoutingTableEntry,
};
use super::{MAX_ROUTES, MAX_SINKS, MAX_SOURCES};

/// Timing parameters shared by every core in an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParameters {
    pub tick_microseconds: u32,
    pub warmup_ticks: u32,
    pub duration_ticks: u32,
    pub timeout: RouterTimeout,
}

/// Verify a core's registry and table fit the firmware's static allocation
pub fn check_capacity(registry: &CoreRegistry, num_router_entries: usize) -> Result<()> {
    let limits = [
        (CapacityKind::Sources, registry.num_generators(), MAX_SOURCES),
        (CapacityKind::Sinks, registry.num_consumers(), MAX_SINKS),
        (CapacityKind::Routes, num_router_entries, MAX_ROUTES),
    ];

    for (kind, actual, max) in limits {
        if actual > max {
            return Err(NetExpError::CapacityExceeded { kind, actual, max });
        }
    }
    Ok(())
}

/// Build the records for one core
///
/// `table` is only non-empty for the chip's table-loader core. Consumer
/// records come out in ascending routing-key order, which the firmware relies
/// on to look keys up.
pub fn build_core_records(
    params: &RunParameters,
    seed: u32,
    registry: &CoreRegistry,
    table: &[RoutingTableEntry],
) -> Result<CoreRecords> {
    check_capacity(registry, table.len())?;

    let generators: Vec<_> = registry
        .generators()
        .map(|(key, generator)| GeneratorRecord::new(key, generator))
        .collect();

    let consumers: Vec<_> = registry
        .consumers()
        .map(|(key, _consumer)| ConsumerRecord::new(key))
        .collect();
    debug_assert!(consumers
        .windows(2)
        .all(|pair| pair[0].routing_key < pair[1].routing_key));

    let root = RootBlock {
        completion_state: CompletionState::Running,
        seed,
        tick_microseconds: params.tick_microseconds,
        warmup_ticks: params.warmup_ticks,
        duration_ticks: params.duration_ticks,
        timeout_exponent: u16::from(params.timeout.exponent()),
        timeout_mantissa: u16::from(params.timeout.mantissa()),
        dropped_packets: 0,
        forwarded_packets: 0,
        num_sources: generators.len() as u32,
        num_sinks: consumers.len() as u32,
        num_router_entries: table.len() as u32,
    };

    Ok(CoreRecords {
        root,
        generators,
        consumers,
        table: table.to_vec(),
    })
}
