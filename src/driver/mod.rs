//! Experiment driver
//!
//! Runs an experiment against a node array in four strictly ordered steps:
//!
//! 1. [`load_core_map`](ExperimentDriver::load_core_map) - write the
//!    active-core grid once
//! 2. [`load_configs`](ExperimentDriver::load_configs) - write every core's
//!    config record, routing tables going to one core per chip
//! 3. [`run_app`](ExperimentDriver::run_app) - stage the image, start every
//!    chip and wait out the run
//! 4. [`poll`](ExperimentDriver::poll) then
//!    [`collect_results`](ExperimentDriver::collect_results)
//!
//! Calling a step out of order fails with `InvalidState` without touching the
//! transport. If polling finds bad cores the driver moves to `Failed`, from
//! which the remaining cores can still be collected.
//!
//! # Example
//!
//! ```ignore
//! let mut driver = ExperimentDriver::new(&mut array, &experiment, config);
//! driver.load_core_map()?;
//! driver.load_configs()?;
//! driver.run_app(&image)?;
//! match driver.poll() {
//!     Ok(_) => driver.collect_results(&BTreeSet::new()),
//!     Err(e) => {
//!         let bad = e.bad_cores().cloned().unwrap_or_default();
//!         driver.collect_results(&bad)
//!     }
//! }
//! ```

pub mod poll;

pub use poll::{poll_core, PollOutcome, PollPolicy, PollReport};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crate::backend::Transport;
use crate::config::DriverConfig;
use crate::error::{NetExpError, Result};
use crate::experiment::{CoreRegistry, NetworkExperiment};
use crate::protocol::{
    build_core_records, core_config_address, core_map_address, pack_core_map, records_span,
    CoreRecords, APP_IMAGE_ADDRESS,
};
use crate::results::{CoreResults, ExperimentResults, RouterResults};
use crate::routing::routing_table;
use crate::types::{ChipCoord, CoreAddr};

/// Where the driver is in the load/run/poll/collect sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverState {
    #[default]
    Idle,
    CoreMapLoaded,
    ConfigLoaded,
    Running,
    Completed,
    Failed,
    Collected,
}

impl DriverState {
    pub fn name(&self) -> &'static str {
        match self {
            DriverState::Idle => "idle",
            DriverState::CoreMapLoaded => "core map loaded",
            DriverState::ConfigLoaded => "config loaded",
            DriverState::Running => "running",
            DriverState::Completed => "completed",
            DriverState::Failed => "failed",
            DriverState::Collected => "collected",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drives one experiment through a transport
pub struct ExperimentDriver<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    experiment: &'a NetworkExperiment,
    config: DriverConfig,
    state: DriverState,
    rng: StdRng,
    /// The core carrying each chip's routing table
    table_loaders: BTreeMap<ChipCoord, CoreAddr>,
    last_poll: Option<PollReport>,
}

impl<'a, T: Transport + ?Sized> ExperimentDriver<'a, T> {
    pub fn new(
        transport: &'a mut T,
        experiment: &'a NetworkExperiment,
        config: DriverConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            transport,
            experiment,
            config,
            state: DriverState::Idle,
            rng,
            table_loaders: BTreeMap::new(),
            last_poll: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The table-loader core chosen for each chip by `load_configs`
    pub fn table_loaders(&self) -> &BTreeMap<ChipCoord, CoreAddr> {
        &self.table_loaders
    }

    /// Outcomes of the last `poll`, available even when it failed
    pub fn poll_report(&self) -> Option<&PollReport> {
        self.last_poll.as_ref()
    }

    fn expect_state(&self, operation: &'static str, allowed: &[DriverState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(NetExpError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    /// Write the active-core grid through the monitor of the lowest chip
    pub fn load_core_map(&mut self) -> Result<()> {
        self.expect_state("load_core_map", &[DriverState::Idle])?;

        let topology = self.experiment.topology();
        let chip = topology.chips().next().ok_or_else(|| {
            NetExpError::InvalidParameter("Topology has no chips to load".to_string())
        })?;
        let packed = pack_core_map(topology)?;

        tracing::info!(
            "Loading core map for {}x{} board via {}",
            topology.width(),
            topology.height(),
            chip
        );
        self.transport
            .write_bytes(CoreAddr::monitor(chip), core_map_address(), &packed)?;

        self.state = DriverState::CoreMapLoaded;
        Ok(())
    }

    /// Write every core's config record
    ///
    /// A core whose records fail to build gets no write at all, but cores
    /// already written stay written.
    pub fn load_configs(&mut self) -> Result<()> {
        self.expect_state("load_configs", &[DriverState::CoreMapLoaded])?;

        let experiment = self.experiment;
        let topology = experiment.topology();
        let params = experiment.run_parameters();
        let empty = CoreRegistry::default();
        self.table_loaders.clear();

        for chip in topology.chips() {
            let table = routing_table(chip, experiment.routes());
            let Some(loader) = topology.cores_on(chip).next() else {
                continue;
            };
            self.table_loaders.insert(chip, loader);
            tracing::debug!(
                "Chip {}: {} routing entries loaded by core {}",
                chip,
                table.len(),
                loader.core
            );

            for core in topology.cores_on(chip) {
                let registry = experiment.registry(core).unwrap_or(&empty);
                let entries = if core == loader { &table[..] } else { &[] };
                let seed: u32 = self.rng.gen();

                let records = build_core_records(&params, seed, registry, entries)
                    .inspect_err(|e| tracing::error!("Cannot build config for {}: {}", core, e))?;
                let bytes = records.encode();

                tracing::debug!(
                    "Writing {} byte config to {} ({} sources, {} sinks)",
                    bytes.len(),
                    core,
                    records.generators.len(),
                    records.consumers.len()
                );
                self.transport
                    .write_bytes(core, core_config_address(core.core), &bytes)?;
            }
        }

        tracing::info!(
            "Loaded configs for {} cores on {} chips",
            topology.num_cores(),
            topology.num_chips()
        );
        self.state = DriverState::ConfigLoaded;
        Ok(())
    }

    /// Stage `image` on every chip, start all active cores and block until
    /// the run should be over
    pub fn run_app(&mut self, image: &[u8]) -> Result<()> {
        self.expect_state("run_app", &[DriverState::ConfigLoaded])?;

        let topology = self.experiment.topology();
        let chips: Vec<(ChipCoord, u32)> = topology
            .chips()
            .map(|chip| (chip, topology.core_mask(chip)))
            .filter(|&(_, mask)| mask != 0)
            .collect();

        for &(chip, _) in &chips {
            self.transport
                .write_bytes(CoreAddr::monitor(chip), APP_IMAGE_ADDRESS, image)?;
        }

        // Nothing can be cancelled from here on
        self.state = DriverState::Running;
        for &(chip, mask) in &chips {
            tracing::debug!("Starting {} with core mask 0x{:08X}", chip, mask);
            self.transport.start_app(chip, mask)?;
        }

        let run_time = self.run_time();
        tracing::info!(
            "Started {} chips, waiting {:.3} s for the run to finish",
            chips.len(),
            run_time.as_secs_f64()
        );
        self.transport.wait(run_time);
        Ok(())
    }

    /// Warmup plus duration plus the grace period, saturating on overflow
    pub fn run_time(&self) -> Duration {
        let experiment = self.experiment;
        let ticks = u64::from(experiment.warmup_ticks()) + u64::from(experiment.duration_ticks());
        let micros = ticks.saturating_mul(u64::from(experiment.tick_microseconds()));
        Duration::from_micros(micros).saturating_add(self.config.grace_period())
    }

    /// Poll every core until it completes, fails or times out
    ///
    /// Fails with `ExperimentExecutionFailed` carrying every bad core; the
    /// full report stays available through [`poll_report`](Self::poll_report).
    pub fn poll(&mut self) -> Result<PollReport> {
        self.expect_state("poll", &[DriverState::Running])?;

        let policy = PollPolicy {
            interval: self.config.poll_interval(),
            retries: self.config.poll_retries,
        };
        let mut report = PollReport::default();
        for core in self.experiment.topology().cores() {
            let outcome = poll_core(&mut *self.transport, core, policy)?;
            if !outcome.is_success() {
                tracing::warn!("Core {} did not complete: {:?}", core, outcome);
            }
            report.push(core, outcome);
        }

        let bad_cores = report.bad_cores();
        self.last_poll = Some(report.clone());
        if bad_cores.is_empty() {
            tracing::info!("All {} cores completed", report.outcomes.len());
            self.state = DriverState::Completed;
            Ok(report)
        } else {
            tracing::warn!("{} core(s) failed", bad_cores.len());
            self.state = DriverState::Failed;
            Err(NetExpError::ExperimentExecutionFailed(bad_cores))
        }
    }

    /// Read back and parse every core's records, skipping `exclude`
    ///
    /// Only the span that was written is read. Router counters come from each
    /// chip's table-loader core.
    pub fn collect_results(&mut self, exclude: &BTreeSet<CoreAddr>) -> Result<ExperimentResults> {
        self.expect_state(
            "collect_results",
            &[DriverState::Completed, DriverState::Failed],
        )?;

        let experiment = self.experiment;
        let empty = CoreRegistry::default();
        let mut results = ExperimentResults::new();

        for core in experiment.topology().cores() {
            if exclude.contains(&core) {
                tracing::debug!("Skipping excluded core {}", core);
                continue;
            }

            let registry = experiment.registry(core).unwrap_or(&empty);
            let length = records_span(registry.num_generators(), registry.num_consumers());
            let bytes = self
                .transport
                .read_bytes(core, core_config_address(core.core), length)?;
            let records = CoreRecords::decode(&bytes, false)
                .map_err(|e| e.with_context(format!("Results of core {}", core)))?;

            if self.table_loaders.get(&core.chip) == Some(&core) {
                results.set_router(core.chip, RouterResults::from_root(&records.root));
            }
            results.insert_core(core, CoreResults::from_records(&records));
        }

        tracing::info!(
            "Collected results from {} cores on {} chips",
            results.num_cores(),
            results.num_chips()
        );
        self.state = DriverState::Collected;
        Ok(results)
    }

    /// Run every step and collect, failing if any core went bad
    pub fn execute(&mut self, image: &[u8]) -> Result<ExperimentResults> {
        self.load_core_map()?;
        self.load_configs()?;
        self.run_app(image)?;
        self.poll()?;
        self.collect_results(&BTreeSet::new())
    }
}

#[cfg(all(test, feature = "simulated-array"))]
mod tests {
    use super::*;
    use crate::backend::{CoreBehaviour, MockTransport, SimulatedNodeArray, TransportOp};
    use crate::error::CapacityKind;
    use crate::protocol::{CompletionState, MAX_SOURCES};
    use crate::routing::DimensionOrderRouter;
    use crate::topology::Topology;
    use crate::traffic::{Consumer, Generator};

    fn core(x: u32, y: u32, c: u8) -> CoreAddr {
        CoreAddr::new(ChipCoord::new(x, y), c)
    }

    fn is_write_to(op: &TransportOp, address_matches: impl Fn(u32) -> bool) -> bool {
        matches!(op, TransportOp::Write { address, .. } if address_matches(*address))
    }

    fn first(log: &[TransportOp], pred: impl Fn(&TransportOp) -> bool) -> usize {
        log.iter().position(|op| pred(op)).unwrap()
    }

    fn config() -> DriverConfig {
        DriverConfig::default().with_seed(42).with_poll(10, 3)
    }

    fn two_chip_experiment() -> NetworkExperiment {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(2, 1, 2));
        experiment
            .add_stream(
                core(0, 0, 1),
                Generator::Bernoulli { probability: 0.5 },
                &[
                    (core(1, 0, 2), Consumer::Instant),
                    (core(0, 0, 2), Consumer::Instant),
                ],
                &[&DimensionOrderRouter],
            )
            .unwrap();
        experiment
    }

    #[test]
    fn test_out_of_order_calls() {
        let experiment = two_chip_experiment();
        let mut transport = MockTransport::new();
        transport.expect_write_bytes().never();
        transport.expect_read_bytes().never();
        transport.expect_start_app().never();

        let mut driver = ExperimentDriver::new(&mut transport, &experiment, config());
        for err in [
            driver.load_configs().unwrap_err(),
            driver.run_app(&[]).unwrap_err(),
            driver.poll().unwrap_err(),
            driver.collect_results(&BTreeSet::new()).unwrap_err(),
        ] {
            assert!(matches!(
                err,
                NetExpError::InvalidState { state: "idle", .. }
            ));
        }
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_protocol_order() {
        let experiment = two_chip_experiment();
        let mut array = SimulatedNodeArray::new(experiment.topology());
        {
            let mut driver = ExperimentDriver::new(&mut array, &experiment, config());
            driver.execute(b"image").unwrap();
            assert_eq!(driver.state(), DriverState::Collected);
        }

        let log = array.log();
        let core_map = first(log, |op| is_write_to(op, |a| a == core_map_address()));
        let first_config = first(log, |op| is_write_to(op, |a| a == core_config_address(1)));
        let last_config = log
            .iter()
            .rposition(|op| is_write_to(op, |a| a >= core_config_address(1)))
            .unwrap();
        let first_image = first(log, |op| is_write_to(op, |a| a == APP_IMAGE_ADDRESS));
        let first_start = first(log, |op| matches!(op, TransportOp::Start { .. }));
        let run_wait = first(log, |op| matches!(op, TransportOp::Wait(_)));
        let first_read = first(log, |op| matches!(op, TransportOp::Read { .. }));

        assert_eq!(core_map, 0);
        assert!(core_map < first_config);
        assert!(last_config < first_image);
        assert!(first_image < first_start);
        assert!(first_start < run_wait);
        assert!(run_wait < first_read);

        // The core map is written exactly once
        let core_map_writes = log
            .iter()
            .filter(|op| is_write_to(op, |a| a == core_map_address()))
            .count();
        assert_eq!(core_map_writes, 1);
    }

    #[test]
    fn test_table_only_on_loader_core() {
        let experiment = two_chip_experiment();
        let mut array = SimulatedNodeArray::new(experiment.topology());
        let mut driver = ExperimentDriver::new(&mut array, &experiment, config());
        driver.load_core_map().unwrap();
        driver.load_configs().unwrap();
        assert_eq!(driver.table_loaders()[&ChipCoord::new(1, 0)], core(1, 0, 1));

        let memory = array.memory(ChipCoord::new(0, 0)).unwrap();
        let loader = memory.read(core_config_address(1), 64).unwrap();
        let other = memory.read(core_config_address(2), 64).unwrap();
        let loader = CoreRecords::decode(&loader, false).unwrap();
        let other = CoreRecords::decode(&other, false).unwrap();

        assert_eq!(loader.root.num_router_entries, 1);
        assert_eq!(other.root.num_router_entries, 0);
        assert_eq!(loader.root.completion_state, CompletionState::Running);
        assert_ne!(loader.root.seed, other.root.seed);
    }

    #[test]
    fn test_seed_makes_configs_reproducible() {
        let experiment = two_chip_experiment();
        let snapshot = || {
            let mut array = SimulatedNodeArray::new(experiment.topology());
            let mut driver = ExperimentDriver::new(&mut array, &experiment, config());
            driver.load_core_map().unwrap();
            driver.load_configs().unwrap();
            array
                .memory(ChipCoord::new(1, 0))
                .unwrap()
                .read(core_config_address(2), 64)
                .unwrap()
        };
        assert_eq!(snapshot(), snapshot());
    }

    #[test]
    fn test_capacity_failure_writes_nothing_for_core() {
        let mut experiment = NetworkExperiment::new(Topology::rectangular(1, 1, 2));
        for _ in 0..=MAX_SOURCES {
            experiment
                .add_stream(
                    core(0, 0, 2),
                    Generator::Bernoulli { probability: 0.1 },
                    &[],
                    &[],
                )
                .unwrap();
        }

        let mut transport = MockTransport::new();
        transport
            .expect_write_bytes()
            .withf(|node, address, _| {
                *node == CoreAddr::monitor(ChipCoord::new(0, 0)) && *address == core_map_address()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        // Core 1 precedes the oversized core and is still written
        transport
            .expect_write_bytes()
            .withf(|node, address, _| *node == core(0, 0, 1) && *address == core_config_address(1))
            .times(1)
            .returning(|_, _, _| Ok(()));
        transport
            .expect_write_bytes()
            .withf(|node, _, _| *node == core(0, 0, 2))
            .never();

        let mut driver = ExperimentDriver::new(&mut transport, &experiment, config());
        driver.load_core_map().unwrap();
        let err = driver.load_configs().unwrap_err();

        assert!(matches!(
            err,
            NetExpError::CapacityExceeded {
                kind: CapacityKind::Sources,
                actual: 257,
                max: 256,
            }
        ));
        assert_eq!(driver.state(), DriverState::CoreMapLoaded);
    }

    #[test]
    fn test_run_time_waits_for_whole_run() {
        let mut experiment = two_chip_experiment();
        experiment.set_warmup(1.0).unwrap();
        experiment.set_duration(2.0).unwrap();

        let mut array = SimulatedNodeArray::new(experiment.topology());
        let mut driver = ExperimentDriver::new(&mut array, &experiment, DriverConfig::default());
        assert_eq!(driver.run_time(), Duration::from_secs(5));

        driver.load_core_map().unwrap();
        driver.load_configs().unwrap();
        driver.run_app(&[]).unwrap();
        assert_eq!(driver.state(), DriverState::Running);
        assert!(array
            .log()
            .contains(&TransportOp::Wait(Duration::from_secs(5))));
    }

    #[test]
    fn test_run_time_saturates() {
        let mut experiment = two_chip_experiment();
        experiment.set_tick_period(f64::from(u32::MAX) / 1e6).unwrap();
        experiment.set_warmup(1e13).unwrap();
        experiment.set_duration(1e13).unwrap();

        let mut array = SimulatedNodeArray::new(experiment.topology());
        let driver = ExperimentDriver::new(&mut array, &experiment, DriverConfig::default());
        assert_eq!(
            driver.run_time(),
            Duration::from_micros(u64::MAX) + DriverConfig::default().grace_period()
        );
    }

    #[test]
    fn test_failed_cores_then_partial_collection() {
        let experiment = two_chip_experiment();
        let mut array = SimulatedNodeArray::new(experiment.topology());
        array.set_behaviour(core(0, 0, 1), CoreBehaviour::Fail);
        array.set_behaviour(core(1, 0, 2), CoreBehaviour::Hang);

        let mut driver = ExperimentDriver::new(&mut array, &experiment, config());
        driver.load_core_map().unwrap();
        driver.load_configs().unwrap();
        driver.run_app(&[]).unwrap();

        let err = driver.poll().unwrap_err();
        let bad = err.bad_cores().unwrap().clone();
        assert_eq!(
            bad,
            BTreeSet::from([core(0, 0, 1), core(1, 0, 2)])
        );
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(
            driver.poll_report().unwrap().outcome(core(1, 0, 2)),
            Some(PollOutcome::TimedOut)
        );

        let results = driver.collect_results(&bad).unwrap();
        assert_eq!(results.num_cores(), 2);
        // Chip (0, 0) lost its table loader
        assert!(results.chip(ChipCoord::new(0, 0)).unwrap().router.is_none());
        assert!(results.chip(ChipCoord::new(1, 0)).unwrap().router.is_some());
        assert_eq!(driver.state(), DriverState::Collected);
    }

    #[test]
    fn test_empty_topology() {
        let experiment = NetworkExperiment::new(Topology::new());
        let mut array = SimulatedNodeArray::new(experiment.topology());
        let mut driver = ExperimentDriver::new(&mut array, &experiment, config());
        assert!(matches!(
            driver.load_core_map(),
            Err(NetExpError::InvalidParameter(_))
        ));
    }
}
