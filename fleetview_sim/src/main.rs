//! FleetView Feed Simulator CLI
//!
//! Run deterministic feed scenarios against the live view.

use clap::Parser;
use fleetview_sim::{ScenarioId, ScenarioResult, ScenarioRunner, SimExport};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// FleetView deterministic feed simulation CLI
#[derive(Parser, Debug)]
#[command(name = "fleetview-sim")]
#[command(about = "Run deterministic feed scenarios for FleetView", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady, batch_loss, supersede, reconnect, legacy, malformed, zoom_sweep, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Fleet size
    #[arg(long, default_value = "200")]
    vehicles: usize,

    /// Records per batched part
    #[arg(short, long, default_value = "100")]
    batch_size: usize,

    /// Updates published per scenario
    #[arg(short, long, default_value = "5")]
    updates: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export rendered frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("FleetView Feed Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }
        let scenario = scenarios[0];
        let result = runner(&args, base_seed).with_export(true).run(scenario);

        let mut export = SimExport::new(scenario.name(), base_seed);
        for frame in result.frames.iter().cloned() {
            export.add_frame(frame);
        }
        export.finalize(result.passed, result.failure_reason.clone());

        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {:?}", e),
        }
        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner(&args, seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "time_secs": r.final_time_secs,
                    "entities": r.final_entity_count,
                    "updates_applied": r.metrics.updates_applied,
                    "anomalies": r.metrics.anomalies,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
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

    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn runner(args: &Args, seed: u64) -> ScenarioRunner {
    ScenarioRunner::new(seed, args.vehicles)
        .with_batch_size(args.batch_size)
        .with_updates(args.updates)
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | applied={} warnings={} renders={}",
            result.scenario.name(),
            result.seed,
            result.metrics.updates_applied,
            result.metrics.anomalies,
            result.metrics.renders
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
