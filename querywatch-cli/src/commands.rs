use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use opentelemetry::KeyValue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

use querywatch_config::PipelineConfig;
use querywatch_core::events::{ConsistencyLevel, QueryKind, RawEvent, TopicBus};
use querywatch_core::intake::Admission;
use querywatch_engine::{Pipeline, Registry, StartReport, Supervisor};
use querywatch_telemetry::{EventLogger, PipelineMetrics};

use crate::facts::ProcessFacts;

#[derive(Parser)]
#[command(name = "querywatch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline until interrupted
    Run(RunArgs),
    /// Validate a configuration without starting it
    Check(CheckArgs),
    /// Feed seeded random queries through the pipeline
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(short, long)]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[arg(short, long)]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(short, long)]
    pub config: PathBuf,
    /// Total number of events across all producers
    #[arg(long, default_value_t = 10_000)]
    pub events: usize,
    /// Concurrent producer threads
    #[arg(long, default_value_t = 4)]
    pub producers: usize,
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

fn load(path: &Path) -> anyhow::Result<PipelineConfig> {
    PipelineConfig::load_from_path(path)
        .with_context(|| format!("loading configuration from {}", path.display()))
}

fn start(config: PipelineConfig) -> anyhow::Result<Pipeline> {
    let metrics = PipelineMetrics::new();
    let (pipeline, report) = Pipeline::builder()
        .metrics(metrics.clone())
        .facts(Arc::new(ProcessFacts::new(metrics)))
        .start(config)?;
    log_report(&report);
    Ok(pipeline)
}

fn log_report(report: &StartReport) {
    info!(
        modules = ?report.modules,
        reporters = ?report.reporters,
        "Units started"
    );
    for disabled in &report.disabled {
        warn!(unit = %disabled.unit, error = %disabled.error, "Unit disabled");
    }
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut pipeline = start(load(&args.config)?)?;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = signal(SignalKind::hangup())?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = hangup.recv() => {
                    info!(config = %args.config.display(), "Reloading configuration");
                    match load(&args.config).and_then(|c| Ok(pipeline.reload(c)?)) {
                        Ok(report) => log_report(&report),
                        Err(e) => error!(error = %format!("{e:#}"), "Reload failed"),
                    }
                }
            }
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    pipeline.stop();
    Ok(())
}

pub fn check(args: CheckArgs) -> anyhow::Result<()> {
    let config = load(&args.config)?;
    let supervisor = Supervisor::new(
        Registry::with_defaults(),
        Arc::new(TopicBus::new()),
        Some(Arc::new(ProcessFacts::new(PipelineMetrics::new()))),
        PipelineMetrics::new(),
    );
    let prepared = supervisor.prepare(config)?;
    let config = prepared.config();

    println!(
        "intake: workers={} overflow_at={} relax_at={}",
        config.intake.workers, config.intake.overflow_at, config.intake.relax_at
    );
    for reporter in &config.reporters {
        println!("reporter {} ({})", reporter.name(), reporter.reporter);
    }
    for module in &config.modules {
        println!(
            "module {} ({}) -> [{}]",
            module.measurement,
            module.module,
            module.reporters.join(", ")
        );
    }

    let disabled = prepared.disabled();
    for unit in disabled {
        println!("disabled {}: {}", unit.unit, unit.error);
    }
    if !disabled.is_empty() {
        bail!("{} unit(s) would not start", disabled.len());
    }
    println!("configuration OK");
    Ok(())
}

const LEVELS: [ConsistencyLevel; 4] = [
    ConsistencyLevel::One,
    ConsistencyLevel::Quorum,
    ConsistencyLevel::LocalQuorum,
    ConsistencyLevel::All,
];

fn random_event(rng: &mut StdRng) -> RawEvent {
    let kind = QueryKind::ALL[rng.random_range(0..QueryKind::ALL.len())];
    let table = format!("t{}", rng.random_range(0..8));
    let statement = match kind {
        QueryKind::Write => format!("INSERT INTO ks.{table} (id, v) VALUES (?, ?)"),
        _ => format!("SELECT * FROM ks.{table} WHERE id = ?"),
    };
    let event = RawEvent::new(kind, "ks", table)
        .with_duration(rng.random_range(0..60))
        .with_client(format!("10.0.0.{}", rng.random_range(1..255)))
        .with_statement(statement)
        .with_consistency(LEVELS[rng.random_range(0..LEVELS.len())]);
    if rng.random_bool(0.01) {
        event.internal()
    } else {
        event
    }
}

pub fn simulate(args: SimulateArgs) -> anyhow::Result<()> {
    if args.producers == 0 {
        bail!("at least one producer is required");
    }
    let pipeline = Arc::new(start(load(&args.config)?)?);
    let started = Instant::now();

    let per_producer = args.events / args.producers;
    let remainder = args.events % args.producers;
    let producers: Vec<_> = (0..args.producers)
        .map(|p| {
            let pipeline = Arc::clone(&pipeline);
            let count = per_producer + usize::from(p < remainder);
            let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(p as u64));
            std::thread::Builder::new()
                .name(format!("producer-{p}"))
                .spawn(move || {
                    let mut admitted = [0usize; 3];
                    for _ in 0..count {
                        match pipeline.report(random_event(&mut rng)) {
                            Admission::Accepted => admitted[0] += 1,
                            Admission::Dropped => admitted[1] += 1,
                            Admission::Filtered => admitted[2] += 1,
                        }
                    }
                    admitted
                })
        })
        .collect::<Result<_, _>>()?;

    let mut totals = [0usize; 3];
    for producer in producers {
        let admitted = producer
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
        for (total, n) in totals.iter_mut().zip(admitted) {
            *total += n;
        }
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while pipeline.queue_depth() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let elapsed = started.elapsed();

    EventLogger::log_event(
        "simulation_complete",
        vec![
            KeyValue::new("events", args.events as i64),
            KeyValue::new("seed", args.seed as i64),
            KeyValue::new("elapsed_ms", elapsed.as_millis() as i64),
        ],
    );
    println!(
        "events={} accepted={} dropped={} filtered={} undelivered={} elapsed={:?}",
        args.events,
        totals[0],
        totals[1],
        totals[2],
        pipeline.bus().undelivered(),
        elapsed
    );
    println!("{}", pipeline.metrics().gather_metrics()?);

    let mut pipeline = Arc::into_inner(pipeline)
        .ok_or_else(|| anyhow::anyhow!("pipeline still shared after producers exited"))?;
    pipeline.stop();
    Ok(())
}
