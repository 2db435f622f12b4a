//! Simulated-array helpers

use netexp_rs::backend::{SimulatedNodeArray, TransportOp};
use netexp_rs::protocol::{
    core_config_address, records_span, CoreRecords, RootBlock, RoutingTableEntry,
};
use netexp_rs::{CoreAddr, NetworkExperiment};

/// Firmware counters written by [`fixed_counter_array`]
#[derive(Debug, Clone, Copy)]
pub struct Counters {
    pub generated: u32,
    pub sent: u32,
    pub arrived: u32,
}

/// An array whose firmware writes the same counters for every record
pub fn fixed_counter_array(
    experiment: &NetworkExperiment,
    counters: Counters,
) -> SimulatedNodeArray {
    SimulatedNodeArray::new(experiment.topology()).with_firmware(move |_, records| {
        for source in &mut records.generators {
            source.packets_generated = counters.generated;
            source.packets_sent = counters.sent;
        }
        for sink in &mut records.consumers {
            sink.packets_arrived = counters.arrived;
        }
    })
}

/// Decode the records currently held in a core's config slot
pub fn read_slot(array: &SimulatedNodeArray, core: CoreAddr) -> CoreRecords {
    let memory = array.memory(core.chip).expect("chip is simulated");
    let address = core_config_address(core.core);
    let header = memory.read(address, RootBlock::SIZE).expect("slot is mapped");
    let root = RootBlock::decode(&header).expect("slot holds a root block");

    let span = records_span(root.num_sources as usize, root.num_sinks as usize)
        + root.num_router_entries as usize * RoutingTableEntry::SIZE;
    let bytes = memory.read(address, span).expect("slot is mapped");
    CoreRecords::decode(&bytes, true).expect("slot holds valid records")
}

/// Config-slot writes made through `core`
pub fn config_writes(array: &SimulatedNodeArray, core: CoreAddr) -> usize {
    array
        .log()
        .iter()
        .filter(|op| {
            matches!(op, TransportOp::Write { node, address, .. }
                if *node == core && *address == core_config_address(core.core))
        })
        .count()
}
