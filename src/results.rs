//! Experiment results
//!
//! The tree reconstructed from the records read back after a run:
//! chip → router counters plus core → per-stream source and sink counters.
//! Router counters are only meaningful from a chip's table-loader core and
//! are absent when that core was excluded from collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{NetExpError, Result};
use crate::protocol::{CoreRecords, RootBlock};
use crate::types::{ChipCoord, CoreAddr, CoreId, RoutingKey};

/// Router counters of one chip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterResults {
    pub dropped_packets: u32,
    pub forwarded_packets: u32,
    pub num_router_entries: u32,
}

impl RouterResults {
    pub fn from_root(root: &RootBlock) -> Self {
        Self {
            dropped_packets: root.dropped_packets,
            forwarded_packets: root.forwarded_packets,
            num_router_entries: root.num_router_entries,
        }
    }
}

/// Counters of one generator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResults {
    pub packets_generated: u32,
    pub packets_sent: u32,
}

/// Counters of one consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkResults {
    pub packets_arrived: u32,
}

/// Source and sink counters of one core, keyed by routing key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreResults {
    pub sources: BTreeMap<RoutingKey, SourceResults>,
    pub sinks: BTreeMap<RoutingKey, SinkResults>,
}

impl CoreResults {
    pub fn from_records(records: &CoreRecords) -> Self {
        let sources = records
            .generators
            .iter()
            .map(|record| {
                (
                    record.routing_key,
                    SourceResults {
                        packets_generated: record.packets_generated,
                        packets_sent: record.packets_sent,
                    },
                )
            })
            .collect();
        let sinks = records
            .consumers
            .iter()
            .map(|record| {
                (
                    record.routing_key,
                    SinkResults {
                        packets_arrived: record.packets_arrived,
                    },
                )
            })
            .collect();
        Self { sources, sinks }
    }
}

/// Results of one chip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipResults {
    /// `None` if the table-loader core was not collected
    pub router: Option<RouterResults>,
    pub cores: BTreeMap<CoreId, CoreResults>,
}

/// Per-stream totals across every core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamResults {
    pub packets_generated: u64,
    pub packets_sent: u64,
    pub packets_arrived: u64,
    /// Number of sinks that reported for this stream
    pub num_sinks: usize,
}

/// Full result tree of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub collected_at: DateTime<Utc>,
    #[serde(with = "chip_entries")]
    pub chips: BTreeMap<ChipCoord, ChipResults>,
}

impl Default for ExperimentResults {
    fn default() -> Self {
        Self::new()
    }
}

impl ExperimentResults {
    /// An empty tree stamped with the current time
    pub fn new() -> Self {
        Self {
            collected_at: Utc::now(),
            chips: BTreeMap::new(),
        }
    }

    pub fn chip(&self, chip: ChipCoord) -> Option<&ChipResults> {
        self.chips.get(&chip)
    }

    pub fn core(&self, core: CoreAddr) -> Option<&CoreResults> {
        self.chip(core.chip)?.cores.get(&core.core)
    }

    /// Record the results of one core
    pub fn insert_core(&mut self, core: CoreAddr, results: CoreResults) {
        self.chips
            .entry(core.chip)
            .or_default()
            .cores
            .insert(core.core, results);
    }

    pub fn set_router(&mut self, chip: ChipCoord, router: RouterResults) {
        self.chips.entry(chip).or_default().router = Some(router);
    }

    fn routers(&self) -> impl Iterator<Item = &RouterResults> {
        self.chips.values().filter_map(|chip| chip.router.as_ref())
    }

    fn cores(&self) -> impl Iterator<Item = &CoreResults> {
        self.chips.values().flat_map(|chip| chip.cores.values())
    }

    fn sources(&self) -> impl Iterator<Item = (RoutingKey, &SourceResults)> {
        self.cores()
            .flat_map(|core| core.sources.iter().map(|(&key, source)| (key, source)))
    }

    fn sinks(&self) -> impl Iterator<Item = (RoutingKey, &SinkResults)> {
        self.cores()
            .flat_map(|core| core.sinks.iter().map(|(&key, sink)| (key, sink)))
    }

    // ==================== Totals ====================

    pub fn total_dropped(&self) -> u64 {
        self.routers().map(|r| u64::from(r.dropped_packets)).sum()
    }

    pub fn total_forwarded(&self) -> u64 {
        self.routers().map(|r| u64::from(r.forwarded_packets)).sum()
    }

    pub fn total_generated(&self) -> u64 {
        self.sources()
            .map(|(_, s)| u64::from(s.packets_generated))
            .sum()
    }

    pub fn total_sent(&self) -> u64 {
        self.sources().map(|(_, s)| u64::from(s.packets_sent)).sum()
    }

    pub fn total_arrived(&self) -> u64 {
        self.sinks().map(|(_, s)| u64::from(s.packets_arrived)).sum()
    }

    /// Arrivals per packet sent, or `None` if nothing was sent
    pub fn actual_fanout(&self) -> Option<f64> {
        let sent = self.total_sent();
        (sent > 0).then(|| self.total_arrived() as f64 / sent as f64)
    }

    // ==================== Counts ====================

    pub fn num_chips(&self) -> usize {
        self.chips.len()
    }

    pub fn num_cores(&self) -> usize {
        self.cores().count()
    }

    pub fn num_sources(&self) -> usize {
        self.sources().count()
    }

    pub fn num_sinks(&self) -> usize {
        self.sinks().count()
    }

    pub fn num_router_entries(&self) -> u64 {
        self.routers().map(|r| u64::from(r.num_router_entries)).sum()
    }

    // ==================== Streams ====================

    /// Counters of one stream summed over every core that reported it
    pub fn stream(&self, key: RoutingKey) -> Option<StreamResults> {
        self.streams().remove(&key)
    }

    /// Counters of every stream, by routing key
    pub fn streams(&self) -> BTreeMap<RoutingKey, StreamResults> {
        let mut streams: BTreeMap<RoutingKey, StreamResults> = BTreeMap::new();
        for (key, source) in self.sources() {
            let stream = streams.entry(key).or_default();
            stream.packets_generated += u64::from(source.packets_generated);
            stream.packets_sent += u64::from(source.packets_sent);
        }
        for (key, sink) in self.sinks() {
            let stream = streams.entry(key).or_default();
            stream.packets_arrived += u64::from(sink.packets_arrived);
            stream.num_sinks += 1;
        }
        streams
    }

    // ==================== Persistence ====================

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            NetExpError::Serialization(format!("Failed to serialize results: {}", e))
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| NetExpError::Serialization(format!("Failed to parse results: {}", e)))
    }

    /// Save results to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_json()?).map_err(|e| {
            NetExpError::Config(format!("Failed to write results file {:?}: {}", path, e))
        })
    }

    /// Load results saved by [`save`](Self::save)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NetExpError::Config(format!("Failed to read results file {:?}: {}", path, e))
        })?;
        Self::from_json(&content)
    }
}

/// JSON object keys must be strings, so chips are stored as a list of
/// `{ "chip": {x, y}, "results": ... }` entries instead.
mod chip_entries {
    use super::*;
    use serde::{Deserializer, Serializer};

    #[derive(Serialize)]
    struct EntryRef<'a> {
        chip: ChipCoord,
        results: &'a ChipResults,
    }

    #[derive(Deserialize)]
    struct Entry {
        chip: ChipCoord,
        results: ChipResults,
    }

    pub fn serialize<S: Serializer>(
        chips: &BTreeMap<ChipCoord, ChipResults>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(
            chips
                .iter()
                .map(|(&chip, results)| EntryRef { chip, results }),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<BTreeMap<ChipCoord, ChipResults>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.chip, entry.results))
            .collect())
    }
}
