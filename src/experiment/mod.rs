//! Network experiment definition
//!
//! A [`NetworkExperiment`] holds everything needed to generate the per-core
//! configuration for a run: the topology, the streams (routes plus per-core
//! generator/consumer registries) and the timing parameters.
//!
//! # Timing
//!
//! Time is kept in whole ticks internally, as the firmware counts it. The
//! seconds-based setters convert on the way in; changing the tick period
//! re-scales the stored warmup and duration so their length in seconds is
//! unchanged.
//!
//! # Example
//!
//! ```ignore
//! use netexp_rs::{NetworkExperiment, Topology, Generator, Consumer, DimensionOrderRouter};
//!
//! let mut experiment = NetworkExperiment::new(Topology::rectangular(2, 2, 16));
//! let key = experiment.add_stream(
//!     source,
//!     Generator::bernoulli(0.1)?,
//!     &[(destination, Consumer::Instant)],
//!     &[&DimensionOrderRouter],
//! )?;
//!
//! experiment.set_tick_period(0.001)?;
//! experiment.set_router_timeout(512)?;
//! experiment.set_warmup(1.0)?;
//! experiment.set_duration(1.0)?;
//! ```

pub mod patterns;
pub mod registry;
mod streams;

pub use patterns::{PatternStreams, TrafficPattern};
pub use registry::CoreRegistry;

use std::collections::BTreeMap;

use crate::backend::Transport;
use crate::config::DriverConfig;
use crate::driver::ExperimentDriver;
use crate::error::{NetExpError, Result};
use crate::protocol::RunParameters;
use crate::results::ExperimentResults;
use crate::timeout::RouterTimeout;
use crate::topology::Topology;
use crate::types::{CoreAddr, Route, RoutingKey};

/// Default tick length in microseconds
pub const DEFAULT_TICK_MICROSECONDS: u32 = 1000;

/// A packet-routing experiment on a node array
#[derive(Debug, Clone)]
pub struct NetworkExperiment {
    topology: Topology,
    tick_microseconds: u32,
    warmup_ticks: u32,
    duration_ticks: u32,
    router_timeout: RouterTimeout,
    /// Indexed by routing key
    routes: Vec<Route>,
    registries: BTreeMap<CoreAddr, CoreRegistry>,
}

impl NetworkExperiment {
    /// Create an experiment with no streams and default timing
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            tick_microseconds: DEFAULT_TICK_MICROSECONDS,
            warmup_ticks: 1,
            duration_ticks: 1,
            router_timeout: RouterTimeout::default(),
            routes: Vec::new(),
            registries: BTreeMap::new(),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Every route, in key order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, key: RoutingKey) -> Option<&Route> {
        self.routes.get(key as usize)
    }

    /// Registry of a core, if it takes part in any stream
    pub fn registry(&self, core: CoreAddr) -> Option<&CoreRegistry> {
        self.registries.get(&core)
    }

    /// Every core with a registry, in core order
    pub fn registries(&self) -> impl Iterator<Item = (CoreAddr, &CoreRegistry)> + '_ {
        self.registries.iter().map(|(&core, registry)| (core, registry))
    }

    pub fn num_streams(&self) -> usize {
        self.routes.len()
    }

    // ==================== Timing ====================

    /// Tick length in seconds
    pub fn tick_period(&self) -> f64 {
        f64::from(self.tick_microseconds) / 1_000_000.0
    }

    /// Set the tick length in seconds (at least one microsecond)
    pub fn set_tick_period(&mut self, seconds: f64) -> Result<()> {
        let micros = seconds_to_micros(seconds, "tick period")?;
        if micros < 1 || micros > u64::from(u32::MAX) {
            return Err(NetExpError::InvalidParameter(format!(
                "Tick period of {} s must be between 1 us and {} us",
                seconds,
                u32::MAX
            )));
        }

        let warmup = self.warmup();
        let duration = self.duration();
        self.tick_microseconds = micros as u32;
        self.set_warmup(warmup)?;
        self.set_duration(duration)
    }

    pub fn tick_microseconds(&self) -> u32 {
        self.tick_microseconds
    }

    /// Warmup length in seconds
    pub fn warmup(&self) -> f64 {
        f64::from(self.warmup_ticks) * self.tick_period()
    }

    /// Set the warmup length in seconds, rounded down to whole ticks
    pub fn set_warmup(&mut self, seconds: f64) -> Result<()> {
        self.warmup_ticks = self.seconds_to_ticks(seconds, "warmup")?;
        Ok(())
    }

    pub fn warmup_ticks(&self) -> u32 {
        self.warmup_ticks
    }

    /// Measured run length in seconds
    pub fn duration(&self) -> f64 {
        f64::from(self.duration_ticks) * self.tick_period()
    }

    /// Set the measured run length in seconds, rounded down to whole ticks
    pub fn set_duration(&mut self, seconds: f64) -> Result<()> {
        self.duration_ticks = self.seconds_to_ticks(seconds, "duration")?;
        Ok(())
    }

    pub fn duration_ticks(&self) -> u32 {
        self.duration_ticks
    }

    /// Router wait timeout in cycles
    pub fn router_timeout(&self) -> u32 {
        self.router_timeout.value()
    }

    /// Set the router wait timeout; it must be exactly representable
    pub fn set_router_timeout(&mut self, cycles: u32) -> Result<()> {
        self.router_timeout = RouterTimeout::encode(cycles)?;
        Ok(())
    }

    pub fn encoded_router_timeout(&self) -> RouterTimeout {
        self.router_timeout
    }

    /// Timing parameters as written into every root block
    pub fn run_parameters(&self) -> RunParameters {
        RunParameters {
            tick_microseconds: self.tick_microseconds,
            warmup_ticks: self.warmup_ticks,
            duration_ticks: self.duration_ticks,
            timeout: self.router_timeout,
        }
    }

    fn seconds_to_ticks(&self, seconds: f64, what: &str) -> Result<u32> {
        let ticks = seconds_to_micros(seconds, what)? / u64::from(self.tick_microseconds);
        u32::try_from(ticks).map_err(|_| {
            NetExpError::InvalidParameter(format!("{} of {} s is too many ticks", what, seconds))
        })
    }

    // ==================== Running ====================

    /// Load, run, poll and collect in one go
    ///
    /// Fails with `ExperimentExecutionFailed` if any core times out or
    /// reports failure. Use an [`ExperimentDriver`] directly to collect the
    /// remaining cores' results in that case.
    pub fn run<T: Transport>(
        &self,
        transport: &mut T,
        config: &DriverConfig,
        app_image: &[u8],
    ) -> Result<ExperimentResults> {
        ExperimentDriver::new(transport, self, config.clone()).execute(app_image)
    }
}

fn seconds_to_micros(seconds: f64, what: &str) -> Result<u64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(NetExpError::InvalidParameter(format!(
            "{} must be a non-negative number of seconds, got {}",
            what, seconds
        )));
    }
    Ok((seconds * 1_000_000.0).round() as u64)
}
