//! Test data builders for creating experiments

use netexp_rs::{
    Consumer, CoreAddr, DimensionOrderRouter, Generator, NetworkExperiment, RoutingKey, Topology,
};

/// Builder for small experiments on a rectangular board
pub struct ExperimentBuilder {
    topology: Topology,
    tick_period: f64,
    warmup: f64,
    duration: f64,
    router_timeout: u32,
    streams: Vec<(CoreAddr, f32, Vec<CoreAddr>)>,
}

impl ExperimentBuilder {
    pub fn new(width: u32, height: u32, cores_per_chip: u8) -> Self {
        Self {
            topology: Topology::rectangular(width, height, cores_per_chip),
            tick_period: 0.001,
            warmup: 0.0,
            duration: 0.0,
            router_timeout: 512,
            streams: Vec::new(),
        }
    }

    pub fn timing(mut self, tick_period: f64, warmup: f64, duration: f64) -> Self {
        self.tick_period = tick_period;
        self.warmup = warmup;
        self.duration = duration;
        self
    }

    pub fn router_timeout(mut self, cycles: u32) -> Self {
        self.router_timeout = cycles;
        self
    }

    /// Add a Bernoulli stream delivered to instant consumers
    pub fn stream(mut self, source: CoreAddr, probability: f32, destinations: &[CoreAddr]) -> Self {
        self.streams
            .push((source, probability, destinations.to_vec()));
        self
    }

    /// Build the experiment, returning the key of every stream in order
    pub fn build(self) -> (NetworkExperiment, Vec<RoutingKey>) {
        let mut experiment = NetworkExperiment::new(self.topology);
        experiment.set_tick_period(self.tick_period).unwrap();
        experiment.set_warmup(self.warmup).unwrap();
        experiment.set_duration(self.duration).unwrap();
        experiment.set_router_timeout(self.router_timeout).unwrap();

        let keys = self
            .streams
            .into_iter()
            .map(|(source, probability, destinations)| {
                let destinations: Vec<_> = destinations
                    .into_iter()
                    .map(|d| (d, Consumer::Instant))
                    .collect();
                experiment
                    .add_stream(
                        source,
                        Generator::bernoulli(probability).unwrap(),
                        &destinations,
                        &[&DimensionOrderRouter],
                    )
                    .unwrap()
            })
            .collect();
        (experiment, keys)
    }
}
