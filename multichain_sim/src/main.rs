//! Multichain Simulator CLI
//!
//! Simulate random-walk reputation gathering over a multichain ledger and
//! compare every node's local ranking against the global ground truth.

use clap::Parser;
use multichain_env::{LedgerReader, RankingOracle, SledLedger, VolumeOracle};
use multichain_sim::scenarios::{LedgerGenerator, TopologyId};
use multichain_sim::{
    ExperimentRunner, FileSink, Measurement, MemorySink, PageRankOracle, RunReport, SimConfig,
    SimError, SimExport,
};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Multichain random-walk reputation simulator
#[derive(Parser, Debug)]
#[command(name = "multichain-sim")]
#[command(about = "Deterministic simulation of multichain random-walk reputation", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Logical time after which the run stops
    #[arg(short = 'H', long, default_value = "100000")]
    horizon: u64,

    /// Logical time between two checkpoint measurements
    #[arg(short, long, default_value = "10000")]
    checkpoint_interval: u64,

    /// Log every dispatched event
    #[arg(short, long)]
    verbose: bool,

    /// Continue walks from the current position instead of the origin
    #[arg(long)]
    persistent: bool,

    /// Weight hops by the local ranking
    #[arg(long)]
    directed: bool,

    /// Probability of teleporting back to the origin before a hop
    #[arg(short, long, default_value = "0.1")]
    teleport: f64,

    /// Load only the first N ledger blocks
    #[arg(long)]
    block_limit: Option<usize>,

    /// Path of a sled multichain ledger (a synthetic ledger is generated otherwise)
    #[arg(short, long)]
    ledger: Option<String>,

    /// Persist the generated synthetic ledger to a sled database at this path
    #[arg(long)]
    save_ledger: Option<String>,

    /// Synthetic topology (full_mesh, star, ring, random)
    #[arg(long, default_value = "random")]
    topology: String,

    /// Number of synthetic identities
    #[arg(short, long, default_value = "10")]
    identities: usize,

    /// Ground-truth oracle (pagerank, volume)
    #[arg(long, default_value = "pagerank")]
    oracle: String,

    /// Directory for blocks.dat, ranking.dat and load.dat
    #[arg(long)]
    log_dir: Option<String>,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// JSON output for scripting
    #[arg(long)]
    json: bool,

    /// Export the report and all measurements to a JSON file
    #[arg(long)]
    export: Option<String>,
}

/// Opens the ledger named on the command line, or generates one.
fn open_ledger(args: &Args, seed: u64) -> Result<(String, Box<dyn LedgerReader>), SimError> {
    if let Some(path) = &args.ledger {
        let ledger = SledLedger::open(path)?;
        return Ok((path.clone(), Box::new(ledger)));
    }

    let topology: TopologyId = args.topology.parse().map_err(SimError::Config)?;
    info!(
        "Generating {} ledger with {} identities: {}",
        topology.name(),
        args.identities,
        topology.description()
    );
    let ledger = LedgerGenerator::new(seed, args.identities).generate(topology);

    if let Some(path) = &args.save_ledger {
        let store = SledLedger::create(path)?;
        let written = store.import(&ledger)?;
        store.flush()?;
        info!("Saved {} blocks to {}", written, path);
    }
    Ok((topology.name().to_string(), Box::new(ledger)))
}

fn select_oracle(args: &Args) -> Result<Box<dyn RankingOracle>, SimError> {
    match args.oracle.to_lowercase().as_str() {
        "pagerank" => Ok(Box::new(PageRankOracle::new(args.teleport))),
        "volume" => Ok(Box::new(VolumeOracle)),
        other => Err(SimError::config(format!("Unknown oracle: {}", other))),
    }
}

/// Runs one seed, teeing measurements into the log directory if requested.
fn run_seed(
    runner: &ExperimentRunner,
    args: &Args,
    seed: u64,
) -> Result<(RunReport, Vec<Measurement>), SimError> {
    let mut memory = MemorySink::new();

    let report = match &args.log_dir {
        Some(dir) => {
            let mut dir = PathBuf::from(dir);
            if args.seeds > 1 {
                dir = dir.join(format!("seed-{}", seed));
            }
            let mut files = FileSink::create(&dir)?;
            runner.run_seed(seed, &mut (&mut memory, &mut files))?
        }
        None => runner.run_seed(seed, &mut memory)?,
    };

    Ok((report, memory.measurements))
}

fn run(args: &Args, base_seed: u64) -> Result<Vec<RunReport>, SimError> {
    if args.export.is_some() && args.seeds > 1 {
        return Err(SimError::config("--export only supports a single seed"));
    }

    let config = SimConfig::default()
        .with_seed(base_seed)
        .with_horizon(args.horizon)
        .with_checkpoint_interval(args.checkpoint_interval)
        .with_verbose(args.verbose)
        .with_persistent_walking(args.persistent)
        .with_directed_walking(args.directed)
        .with_teleport_probability(args.teleport)
        .with_block_limit(args.block_limit);
    config.validate()?;

    let (source, ledger) = open_ledger(args, base_seed)?;
    let oracle = select_oracle(args)?;
    let runner = ExperimentRunner::new(config, ledger.as_ref(), oracle.as_ref())?;

    let mut reports = Vec::with_capacity(args.seeds);
    for offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(offset as u64);
        let (report, measurements) = run_seed(&runner, args, seed)?;

        if !args.json {
            info!(
                "✓ {} (seed={}) {} at t={} | {} messages | mean deviation {:.4}",
                source,
                seed,
                report.termination,
                report.final_time,
                report.messages_delivered,
                report.mean_final_deviation
            );
        }

        if let Some(path) = &args.export {
            SimExport::new(&source, report.clone(), measurements).write_to_file(path)?;
            info!("Exported run to {}", path);
        }

        reports.push(report);
    }
    Ok(reports)
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("Multichain Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let reports = match run(&args, base_seed) {
        Ok(reports) => reports,
        Err(e) => {
            error!("✗ Simulation failed: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        let summary = serde_json::json!({
            "total": reports.len(),
            "results": reports,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to encode summary: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        let mean = reports.iter().map(|r| r.mean_final_deviation).sum::<f64>()
            / reports.len().max(1) as f64;
        info!("✅ {} run(s) finished, mean final deviation {:.4}", reports.len(), mean);
    }
}
