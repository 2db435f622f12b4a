//! Per-core generator and consumer registries

use std::collections::BTreeMap;

use crate::traffic::{Consumer, Generator};
use crate::types::RoutingKey;

/// The traffic roles one core plays, keyed by routing key
///
/// Both maps are ordered by key so serialization never depends on the order
/// streams were added in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreRegistry {
    generators: BTreeMap<RoutingKey, Generator>,
    consumers: BTreeMap<RoutingKey, Consumer>,
}

impl CoreRegistry {
    /// Register this core as the source of `key`, replacing any earlier entry
    pub fn add_generator(&mut self, key: RoutingKey, generator: Generator) -> Option<Generator> {
        self.generators.insert(key, generator)
    }

    /// Register this core as a sink of `key`, replacing any earlier entry
    pub fn add_consumer(&mut self, key: RoutingKey, consumer: Consumer) -> Option<Consumer> {
        self.consumers.insert(key, consumer)
    }

    /// Generators in ascending key order
    pub fn generators(&self) -> impl Iterator<Item = (RoutingKey, Generator)> + '_ {
        self.generators.iter().map(|(&key, &gen)| (key, gen))
    }

    /// Consumers in ascending key order
    pub fn consumers(&self) -> impl Iterator<Item = (RoutingKey, Consumer)> + '_ {
        self.consumers.iter().map(|(&key, &con)| (key, con))
    }

    pub fn generator(&self, key: RoutingKey) -> Option<&Generator> {
        self.generators.get(&key)
    }

    pub fn consumer(&self, key: RoutingKey) -> Option<&Consumer> {
        self.consumers.get(&key)
    }

    pub fn num_generators(&self) -> usize {
        self.generators.len()
    }

    pub fn num_consumers(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty() && self.consumers.is_empty()
    }
}
