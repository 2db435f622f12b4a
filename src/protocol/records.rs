//! Fixed-width binary records
//!
//! Field order and widths follow the firmware's structure definitions
//! exactly. Result counters are written as zero and filled in by the firmware
//! while the experiment runs.

use crate::error::{NetExpError, Result};
use crate::traffic::{Generator, GENERATOR_PAYLOAD_SIZE};
use crate::types::RoutingKey;

/// Firmware-reported status of one core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionState {
    /// Still executing (also the value written at load time)
    #[default]
    Running,
    /// Finished and results are valid
    Success,
    /// The firmware gave up
    Failure,
    /// A value outside the protocol
    Other(u32),
}

impl CompletionState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => CompletionState::Running,
            1 => CompletionState::Success,
            2 => CompletionState::Failure,
            other => CompletionState::Other(other),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            CompletionState::Running => 0,
            CompletionState::Success => 1,
            CompletionState::Failure => 2,
            CompletionState::Other(raw) => raw,
        }
    }
}

/// Little-endian cursor over a record buffer
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let end = self.offset + N;
        let slice = self.bytes.get(self.offset..end).ok_or_else(|| {
            NetExpError::MalformedRecord(format!(
                "{} needs bytes {}..{} but only {} are available",
                what,
                self.offset,
                end,
                self.bytes.len()
            ))
        })?;
        self.offset = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.take::<4>(what).map(u32::from_le_bytes)
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        self.take::<2>(what).map(u16::from_le_bytes)
    }
}

/// Per-core header: timing, router timeout, router counters and record counts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootBlock {
    pub completion_state: CompletionState,
    pub seed: u32,
    pub tick_microseconds: u32,
    pub warmup_ticks: u32,
    pub duration_ticks: u32,
    pub timeout_exponent: u16,
    pub timeout_mantissa: u16,
    /// (Result) packets dropped by this chip's router
    pub dropped_packets: u32,
    /// (Result) packets forwarded by this chip's router
    pub forwarded_packets: u32,
    pub num_sources: u32,
    pub num_sinks: u32,
    pub num_router_entries: u32,
}

impl RootBlock {
    pub const SIZE: usize = 44;

    /// Offset of the completion-state word within the block
    pub const COMPLETION_STATE_OFFSET: usize = 0;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.completion_state.to_raw().to_le_bytes());
        out.extend_from_slice(&self.seed.to_le_bytes());
        out.extend_from_slice(&self.tick_microseconds.to_le_bytes());
        out.extend_from_slice(&self.warmup_ticks.to_le_bytes());
        out.extend_from_slice(&self.duration_ticks.to_le_bytes());
        out.extend_from_slice(&self.timeout_exponent.to_le_bytes());
        out.extend_from_slice(&self.timeout_mantissa.to_le_bytes());
        out.extend_from_slice(&self.dropped_packets.to_le_bytes());
        out.extend_from_slice(&self.forwarded_packets.to_le_bytes());
        out.extend_from_slice(&self.num_sources.to_le_bytes());
        out.extend_from_slice(&self.num_sinks.to_le_bytes());
        out.extend_from_slice(&self.num_router_entries.to_le_bytes());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            completion_state: CompletionState::from_raw(reader.u32("completion_state")?),
            seed: reader.u32("seed")?,
            tick_microseconds: reader.u32("tick_microseconds")?,
            warmup_ticks: reader.u32("warmup_ticks")?,
            duration_ticks: reader.u32("duration_ticks")?,
            timeout_exponent: reader.u16("timeout_exponent")?,
            timeout_mantissa: reader.u16("timeout_mantissa")?,
            dropped_packets: reader.u32("dropped_packets")?,
            forwarded_packets: reader.u32("forwarded_packets")?,
            num_sources: reader.u32("num_sources")?,
            num_sinks: reader.u32("num_sinks")?,
            num_router_entries: reader.u32("num_router_entries")?,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut Reader::new(bytes))
    }
}

/// One traffic generator on a source core
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorRecord {
    pub routing_key: RoutingKey,
    pub generator: Generator,
    /// (Result) packets the generator decided to emit
    pub packets_generated: u32,
    /// (Result) packets actually injected into the network
    pub packets_sent: u32,
}

impl GeneratorRecord {
    pub const SIZE: usize = 16 + GENERATOR_PAYLOAD_SIZE;

    pub fn new(routing_key: RoutingKey, generator: Generator) -> Self {
        Self {
            routing_key,
            generator,
            packets_generated: 0,
            packets_sent: 0,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.routing_key.to_le_bytes());
        out.extend_from_slice(&self.generator.type_tag().to_le_bytes());
        out.extend_from_slice(&self.generator.payload());
        out.extend_from_slice(&self.packets_generated.to_le_bytes());
        out.extend_from_slice(&self.packets_sent.to_le_bytes());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let routing_key = reader.u32("routing_key")?;
        let tag = reader.u32("type_tag")?;
        let payload = reader.take::<GENERATOR_PAYLOAD_SIZE>("variant_payload")?;
        Ok(Self {
            routing_key,
            generator: Generator::from_record(tag, &payload)?,
            packets_generated: reader.u32("packets_generated")?,
            packets_sent: reader.u32("packets_sent")?,
        })
    }
}

/// One packet counter on a sink core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerRecord {
    pub routing_key: RoutingKey,
    /// (Result) packets which arrived with this key
    pub packets_arrived: u32,
}

impl ConsumerRecord {
    pub const SIZE: usize = 8;

    pub fn new(routing_key: RoutingKey) -> Self {
        Self {
            routing_key,
            packets_arrived: 0,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.routing_key.to_le_bytes());
        out.extend_from_slice(&self.packets_arrived.to_le_bytes());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            routing_key: reader.u32("routing_key")?,
            packets_arrived: reader.u32("packets_arrived")?,
        })
    }
}

/// One router table row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingTableEntry {
    pub key: u32,
    pub mask: u32,
    pub route: u32,
}

impl RoutingTableEntry {
    pub const SIZE: usize = 12;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.key.to_le_bytes());
        out.extend_from_slice(&self.mask.to_le_bytes());
        out.extend_from_slice(&self.route.to_le_bytes());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            key: reader.u32("key")?,
            mask: reader.u32("mask")?,
            route: reader.u32("route")?,
        })
    }
}

/// Everything loaded into one core's config slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoreRecords {
    pub root: RootBlock,
    pub generators: Vec<GeneratorRecord>,
    pub consumers: Vec<ConsumerRecord>,
    pub table: Vec<RoutingTableEntry>,
}

impl CoreRecords {
    /// Number of bytes [`encode`](Self::encode) produces
    pub fn encoded_len(&self) -> usize {
        super::records_span(self.generators.len(), self.consumers.len())
            + self.table.len() * RoutingTableEntry::SIZE
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.root.encode(&mut out);
        for record in &self.generators {
            record.encode(&mut out);
        }
        for record in &self.consumers {
            record.encode(&mut out);
        }
        for entry in &self.table {
            entry.encode(&mut out);
        }
        out
    }

    /// Parse a config slot read back from a core
    ///
    /// Section lengths come from the counts in the root block. Routing-table
    /// entries are only parsed when `with_table` is set, since results are
    /// normally read back without them.
    pub fn decode(bytes: &[u8], with_table: bool) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let root = RootBlock::read(&mut reader)?;

        let generators = (0..root.num_sources)
            .map(|_| GeneratorRecord::read(&mut reader))
            .collect::<Result<Vec<_>>>()?;
        let consumers = (0..root.num_sinks)
            .map(|_| ConsumerRecord::read(&mut reader))
            .collect::<Result<Vec<_>>>()?;
        let table = if with_table {
            (0..root.num_router_entries)
                .map(|_| RoutingTableEntry::read(&mut reader))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            root,
            generators,
            consumers,
            table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_root() -> RootBlock {
        RootBlock {
            completion_state: CompletionState::Running,
            seed: 0xDEAD_BEEF,
            tick_microseconds: 1000,
            warmup_ticks: 1000,
            duration_ticks: 2000,
            timeout_exponent: 4,
            timeout_mantissa: 1,
            num_sources: 1,
            num_sinks: 2,
            num_router_entries: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_root_block_layout() {
        let mut out = Vec::new();
        sample_root().encode(&mut out);

        assert_eq!(out.len(), RootBlock::SIZE);
        assert_eq!(&out[0..4], &[0, 0, 0, 0]);
        assert_eq!(&out[4..8], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&out[8..12], &1000u32.to_le_bytes());
        // e and m are 16-bit fields
        assert_eq!(&out[20..24], &[4, 0, 1, 0]);
        assert_eq!(&out[32..36], &1u32.to_le_bytes());
        assert_eq!(&out[36..40], &2u32.to_le_bytes());
    }

    #[test]
    fn test_generator_record_layout() {
        let record = GeneratorRecord::new(5, Generator::Bernoulli { probability: 0.25 });
        let mut out = Vec::new();
        record.encode(&mut out);

        assert_eq!(out.len(), GeneratorRecord::SIZE);
        assert_eq!(&out[0..4], &5u32.to_le_bytes());
        assert_eq!(&out[4..8], &0u32.to_le_bytes());
        assert_eq!(&out[8..12], &0.25f32.to_le_bytes());
        assert_eq!(&out[12..20], &[0; 8]);
    }

    #[test]
    fn test_core_records_decode_uses_counts() {
        let records = CoreRecords {
            root: sample_root(),
            generators: vec![GeneratorRecord::new(0, Generator::Bernoulli { probability: 1.0 })],
            consumers: vec![ConsumerRecord::new(1), ConsumerRecord::new(4)],
            table: vec![RoutingTableEntry {
                key: 0,
                mask: 0xFFFF_FFFF,
                route: 1 << 7,
            }],
        };
        let bytes = records.encode();
        assert_eq!(bytes.len(), records.encoded_len());

        assert_eq!(CoreRecords::decode(&bytes, true).unwrap(), records);

        let span = records_span_of(&records);
        let without_table = CoreRecords::decode(&bytes[..span], false).unwrap();
        assert!(without_table.table.is_empty());
        assert_eq!(without_table.consumers, records.consumers);
    }

    fn records_span_of(records: &CoreRecords) -> usize {
        crate::protocol::records_span(records.generators.len(), records.consumers.len())
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let mut out = Vec::new();
        sample_root().encode(&mut out);
        // Root claims one generator and two consumers but none follow
        let err = CoreRecords::decode(&out, false).unwrap_err();
        assert!(matches!(err, NetExpError::MalformedRecord(_)));
    }

    #[test]
    fn test_unknown_generator_tag_is_unsupported() {
        let mut root = sample_root();
        root.num_sinks = 0;
        root.num_router_entries = 0;
        let mut out = Vec::new();
        root.encode(&mut out);
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&9u32.to_le_bytes());
        out.extend_from_slice(&[0; 12]);

        let err = CoreRecords::decode(&out, false).unwrap_err();
        assert!(matches!(err, NetExpError::UnsupportedVariant { tag: 9, .. }));
    }

    #[test]
    fn test_completion_state_raw() {
        assert_eq!(CompletionState::from_raw(0), CompletionState::Running);
        assert_eq!(CompletionState::from_raw(1), CompletionState::Success);
        assert_eq!(CompletionState::from_raw(2), CompletionState::Failure);
        assert_eq!(CompletionState::from_raw(42), CompletionState::Other(42));
        assert_eq!(CompletionState::Other(42).to_raw(), 42);
    }
}
