//! blobtrack simulator CLI
//!
//! Replays recorded detection frames through the tracker, or runs synthetic
//! scenarios against a seeded ground truth oracle.

use blobtrack_core::{TrackerConfig, TrackerMetrics, TrackerNode};
use blobtrack_sim::scenarios::ScenarioId;
use blobtrack_sim::{JsonLinesSink, JsonLinesSource, ScenarioResult, ScenarioRunner, SimError};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, BufReader};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Exit code for configuration and I/O failures.
const EXIT_SETUP: i32 = 2;

/// blobtrack multi-object blob tracker
#[derive(Parser, Debug)]
#[command(name = "blobtrack-sim")]
#[command(about = "Track blobs from recorded detections or synthetic scenarios", long_about = None)]
struct Args {
    /// Tracker configuration (JSON); built-in constant-velocity model if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detection frames to replay (JSON lines); runs scenarios if omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Snapshot output for replay (JSON lines); stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Scenario to run (single_blob, dropout, crossing, crowd, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Frames per scenario
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Export per-frame ground truth and tracks to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// JSON summary for CI parsing
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Logs go to stderr so replay snapshots can own stdout.
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let config = match &args.config {
        Some(path) => TrackerConfig::from_path(path),
        None => Ok(TrackerConfig::default()),
    };
    let config = config.unwrap_or_else(|e| {
        error!("{}", e);
        std::process::exit(EXIT_SETUP);
    });

    let code = match &args.input {
        Some(input) => run_replay(&args, config, input),
        None => run_scenarios(&args, config),
    };
    std::process::exit(code);
}

fn run_replay(args: &Args, config: TrackerConfig, input: &Path) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return EXIT_SETUP;
        }
    };

    let result = runtime.block_on(async {
        match &args.output {
            Some(path) => {
                let file = tokio::fs::File::create(path)
                    .await
                    .map_err(|e| SimError::io(path.display().to_string(), e))?;
                replay(config, input, file).await
            }
            None => replay(config, input, tokio::io::stdout()).await,
        }
    });

    match result {
        Ok(metrics) => {
            info!(
                "Replayed {} frames: {} tracks born, {} destroyed, match rate {:.2}",
                metrics.frames,
                metrics.born,
                metrics.destroyed,
                metrics.match_rate()
            );
            if args.json {
                match serde_json::to_string_pretty(&metrics) {
                    Ok(summary) => eprintln!("{}", summary),
                    Err(e) => error!("Failed to encode summary: {}", e),
                }
            }
            0
        }
        Err(e) => {
            error!("Replay failed: {}", e);
            EXIT_SETUP
        }
    }
}

async fn replay<W>(config: TrackerConfig, input: &Path, writer: W) -> Result<TrackerMetrics, SimError>
where
    W: AsyncWrite + Unpin + Send,
{
    let file = tokio::fs::File::open(input)
        .await
        .map_err(|e| SimError::io(input.display().to_string(), e))?;
    let source = JsonLinesSource::new(BufReader::new(file));
    let sink = JsonLinesSink::new(writer);

    let node = TrackerNode::new(config, source, sink)?;
    Ok(node.run().await?)
}

fn run_scenarios(args: &Args, config: TrackerConfig) -> i32 {
    if !args.json {
        info!("blobtrack simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                error!("{}", SimError::UnknownScenario(e));
                error!("Available scenarios: single_blob, dropout, crossing, crowd, all");
                return EXIT_SETUP;
            }
        }
    };

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let runner = ScenarioRunner::new(seed).with_frames(args.frames).with_config(config);

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            error!("--export only supports a single scenario, not 'all'");
            return EXIT_SETUP;
        }
        return match runner.run_with_export(scenarios[0]) {
            Ok((result, export)) => {
                if let Err(e) = export.write_to_file(export_path) {
                    error!("Failed to write export: {}", e);
                    return EXIT_SETUP;
                }
                info!("Exported {} frames to {}", export.frames.len(), export_path);
                report(args, &[result])
            }
            Err(e) => {
                error!("{} aborted: {}", scenarios[0].name(), e);
                EXIT_SETUP
            }
        };
    }

    let mut results = Vec::new();
    for scenario in scenarios {
        match runner.run(scenario) {
            Ok(result) => results.push(result),
            Err(e) => {
                error!("{} aborted: {}", scenario.name(), e);
                return EXIT_SETUP;
            }
        }
    }
    report(args, &results)
}

/// Prints results and returns the exit code.
fn report(args: &Args, results: &[ScenarioResult]) -> i32 {
    let failed: Vec<&ScenarioResult> = results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": results.len(),
            "passed": results.len() - failed.len(),
            "failed": failed.len(),
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.total_frames,
                    "time_secs": r.final_time_secs,
                    "id_switches": r.id_switches,
                    "peak_tracks": r.peak_tracks,
                    "rms_error": r.rms_error,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        for r in results {
            if r.passed {
                info!(
                    "✓ {} (seed={}) PASSED | switches={} peak={} rms={:.2}",
                    r.scenario.name(),
                    r.seed,
                    r.id_switches,
                    r.peak_tracks,
                    r.rms_error.unwrap_or(f64::NAN)
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    r.scenario.name(),
                    r.seed,
                    r.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", results.len());
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), results.len());
        }
    }

    if failed.is_empty() {
        0
    } else {
        1
    }
}
