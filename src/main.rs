//! netexp - Network Experiment Runner
//!
//! Loads an experiment file, composes its traffic pattern on a rectangular
//! board and runs it against the simulated node array, whose firmware
//! delivers every packet it sends.
//!
//! Usage: `netexp <experiment.toml> [results.json]`

use anyhow::{bail, Context};
use netexp_rs::config::EXPERIMENT_FILE_EXTENSION;
use netexp_rs::traffic::Generator;
use netexp_rs::{
    backend::SimulatedNodeArray, protocol::CoreRecords, ExperimentDriver, ExperimentFile,
    NetworkExperiment, RoutingKey,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,netexp_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        bail!("usage: netexp <experiment.toml> [results.json]");
    };
    let output_path = args.next().map(PathBuf::from);

    if config_path.extension().and_then(|e| e.to_str()) != Some(EXPERIMENT_FILE_EXTENSION) {
        tracing::warn!("{:?} does not look like an experiment file", config_path);
    }

    let file = ExperimentFile::load(&config_path)
        .with_context(|| format!("Failed to load experiment {:?}", config_path))?;
    let experiment = file.build().context("Failed to compose experiment")?;
    let image = file.driver.load_app_image()?;

    tracing::info!(
        "Running {} streams on {} cores ({} ticks of {} us)",
        experiment.num_streams(),
        experiment.topology().num_cores(),
        experiment.duration_ticks(),
        experiment.tick_microseconds()
    );

    let expected = expected_sent(&experiment);
    let mut array = SimulatedNodeArray::new(experiment.topology())
        .with_firmware(move |_core, records| ideal_firmware(&expected, records));

    let mut driver = ExperimentDriver::new(&mut array, &experiment, file.driver.clone());
    driver.load_core_map()?;
    driver.load_configs()?;
    driver.run_app(&image)?;
    let bad_cores = match driver.poll() {
        Ok(_) => BTreeSet::new(),
        Err(e) => match e.bad_cores() {
            Some(bad) => {
                tracing::warn!("Collecting without {} bad core(s)", bad.len());
                bad.clone()
            }
            None => return Err(e.into()),
        },
    };
    let results = driver.collect_results(&bad_cores)?;

    let sources: usize = experiment.registries().map(|(_, r)| r.num_generators()).sum();
    let sinks: usize = experiment.registries().map(|(_, r)| r.num_consumers()).sum();

    tracing::info!("Total dropped:   {}", results.total_dropped());
    tracing::info!("Total forwarded: {}", results.total_forwarded());
    tracing::info!("Total generated: {}", results.total_generated());
    tracing::info!("Total sent:      {}", results.total_sent());
    tracing::info!("Total arrived:   {}", results.total_arrived());
    if sources > 0 {
        tracing::info!("Intended fanout: {:.3}", sinks as f64 / sources as f64);
    }
    match results.actual_fanout() {
        Some(fanout) => tracing::info!("Actual fanout:   {:.3}", fanout),
        None => tracing::info!("Actual fanout:   n/a (nothing sent)"),
    }

    if let Some(path) = output_path {
        results
            .save(&path)
            .with_context(|| format!("Failed to save results to {:?}", path))?;
        tracing::info!("Results written to {:?}", path);
    }

    Ok(())
}

/// Packets each stream's source should send over the whole run
fn expected_sent(experiment: &NetworkExperiment) -> BTreeMap<RoutingKey, u32> {
    let ticks = experiment.duration_ticks() as f32;
    experiment
        .registries()
        .flat_map(|(_, registry)| registry.generators())
        .map(|(key, generator)| {
            let Generator::Bernoulli { probability } = generator;
            (key, (probability * ticks).round() as u32)
        })
        .collect()
}

/// Lossless firmware model: every generated packet is sent and arrives at
/// every sink, and each loader core counts one forward per table entry hit
fn ideal_firmware(expected: &BTreeMap<RoutingKey, u32>, records: &mut CoreRecords) {
    let sent = |key: RoutingKey| expected.get(&key).copied().unwrap_or(0);

    for source in &mut records.generators {
        source.packets_generated = sent(source.routing_key);
        source.packets_sent = source.packets_generated;
    }
    for sink in &mut records.consumers {
        sink.packets_arrived = sent(sink.routing_key);
    }
    records.root.forwarded_packets = records.table.iter().map(|entry| sent(entry.key)).sum();
}
