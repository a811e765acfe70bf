//! Stride Simulator CLI
//!
//! Run deterministic tracking scenarios against the stride core.

use clap::Parser;
use std::path::PathBuf;
use stride_sim::scenarios::ScenarioId;
use stride_sim::{ScenarioResult, ScenarioRunner, SessionExport, SimConfig, SimError};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Stride Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "stride-sim")]
#[command(about = "Run deterministic GPS tracking scenarios for stride", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Scenario to run (loop, noisy_device, handover, pause_resume, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated run length in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the recorded route (.gpx for GPX, anything else for JSON)
    #[arg(long)]
    export: Option<PathBuf>,

    /// JSON file with a full simulation config; flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(verbose: bool) -> Result<(), SimError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => tracing::subscriber::set_global_default(builder.finish()),
    };
    result.map_err(|e| SimError::config(format!("failed to set tracing subscriber: {e}")))
}

fn load_config(args: &Args) -> Result<SimConfig, SimError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        } else {
            seed
        };
    }
    if let Some(duration) = args.duration {
        config.duration_secs = duration;
    }

    config.validate()?;
    Ok(config)
}

fn parse_scenarios(name: &str) -> Result<Vec<ScenarioId>, SimError> {
    if name == "all" {
        return Ok(ScenarioId::all());
    }
    name.parse::<ScenarioId>()
        .map(|id| vec![id])
        .map_err(|e| SimError::config(format!("{e} (available: loop, noisy_device, handover, pause_resume, all)")))
}

fn run(args: Args) -> Result<bool, SimError> {
    let config = load_config(&args)?;
    let scenarios = parse_scenarios(&args.scenario)?;

    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        return Err(SimError::config("--export only supports a single scenario and seed"));
    }

    if !args.json {
        info!("Stride Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();

    for seed_offset in 0..args.seeds {
        let seed = config.seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::from_config(config.clone().with_seed(seed));

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            all_results.push(result);
        }
    }

    if let (Some(path), Some(result)) = (&args.export, all_results.first()) {
        SessionExport::from_result(result).write_to_file(path)?;
        info!("Exported {} route points to {}", result.route_points, path.display());
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed_count == 0)
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    // Exit with proper code for CI
    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    }
}
