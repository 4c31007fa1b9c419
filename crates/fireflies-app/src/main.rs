use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fireflies_app::{GardenCommand, GardenManager, JobOutcome, ResultReceiver};
use fireflies_core::{GardenConfig, SwarmSummary, Vec2};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "fireflies-app",
    version,
    about = "Run the firefly garden headless and report on the swarm"
)]
struct Cli {
    /// JSON configuration file; defaults apply to anything it omits.
    #[arg(long, env = "FIREFLIES_CONFIG")]
    config: Option<PathBuf>,
    /// How long to run the garden, in seconds.
    #[arg(long, env = "FIREFLIES_SECONDS", default_value_t = 10.0)]
    seconds: f64,
    /// Snapshot polling period in milliseconds.
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
    /// Lanterns placed at random positions on start.
    #[arg(long, default_value_t = 0)]
    lanterns: usize,
    /// Write the run report as JSON to this path.
    #[arg(long, env = "FIREFLIES_REPORT")]
    report: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Population cap.
    #[arg(long)]
    max: Option<usize>,
    /// Population the auto-spawner aims for.
    #[arg(long)]
    target: Option<usize>,
    /// Fireflies spawned at start.
    #[arg(long)]
    initial: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let manager = GardenManager::new(config).context("invalid garden configuration")?;
    manager.start().context("failed to start garden")?;

    let report = drive(&manager, &cli).await;
    manager.stop().await;
    let report = report.finish(&manager);

    info!(
        final_count = report.summary.final_count,
        peak_count = report.summary.peak_count,
        spawned_total = report.summary.spawned_total,
        dropped_states = report.summary.dropped_states,
        analyses = report.analyses.len(),
        wind = report.summary.final_wind,
        "garden run complete"
    );
    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn build_config(cli: &Cli) -> Result<GardenConfig> {
    let mut config = match &cli.config {
        Some(path) => GardenConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => GardenConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(max) = cli.max {
        config.population.max = max;
    }
    if let Some(target) = cli.target {
        config.population.target = target;
    }
    if let Some(initial) = cli.initial {
        config.population.initial = initial;
    }
    Ok(config)
}

/// Poll the running garden until the deadline, playing a short command script.
async fn drive(manager: &GardenManager, cli: &Cli) -> RunReport {
    let config = manager.config().clone();
    let mut rng = config.seeded_rng();
    for _ in 0..cli.lanterns {
        let point = Vec2::random_in(&mut rng, config.world.width, config.world.height);
        if !manager.add_lantern(point) {
            warn!(max = config.lantern.max, "lantern cap reached");
            break;
        }
    }

    let run_for = Duration::from_secs_f64(cli.seconds.max(0.0));
    let poll = Duration::from_millis(cli.poll_ms.max(1));
    let centre = Vec2::new(config.world.width / 2.0, config.world.height / 2.0);
    let script = [
        GardenCommand::SetAttraction(centre),
        GardenCommand::CycleWind,
        GardenCommand::ClearAttraction,
    ];
    let results = manager.analysis_results();
    let mut report = RunReport::new(cli.seconds, config.rng_seed);

    let started = Instant::now();
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut next_script = 0;
    let mut next_analysis = Duration::from_secs(1);
    loop {
        ticker.tick().await;
        let elapsed = started.elapsed();
        if elapsed >= run_for {
            break;
        }

        manager.update_lanterns(poll.as_secs_f32());
        let snapshot = manager.snapshot();
        report.samples.push(Sample {
            elapsed_ms: elapsed.as_millis() as u64,
            count: snapshot.len(),
            population: manager.population(),
            wind: manager.wind_direction_name(),
        });

        // Commands fire at quarter marks of the run.
        let due = run_for.mul_f64((next_script + 1) as f64 / (script.len() + 1) as f64);
        if next_script < script.len() && elapsed >= due {
            if !manager.enqueue(script[next_script]) {
                warn!(command = ?script[next_script], "scripted command dropped");
            }
            next_script += 1;
        }

        if elapsed >= next_analysis {
            if !manager.submit_analysis() {
                warn!("analysis job rejected");
            }
            next_analysis += Duration::from_secs(1);
        }
        report.collect(&results);
    }

    if let Err(err) = manager.wait_for_analysis().await {
        warn!(error = %err, "analysis jobs did not settle");
    }
    report.collect(&results);
    report
}

#[derive(Debug, Clone, Serialize)]
struct Sample {
    elapsed_ms: u64,
    count: usize,
    population: usize,
    wind: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
struct RunSummary {
    sample_count: usize,
    peak_count: usize,
    final_count: usize,
    spawned_total: u64,
    dropped_states: u64,
    dropped_results: u64,
    failed_analyses: usize,
    lanterns: usize,
    final_wind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct RunReport {
    seconds: f64,
    seed: Option<u64>,
    samples: Vec<Sample>,
    analyses: Vec<SwarmSummary>,
    summary: RunSummary,
}

impl RunReport {
    fn new(seconds: f64, seed: Option<u64>) -> Self {
        Self {
            seconds,
            seed,
            samples: Vec::new(),
            analyses: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    fn collect(&mut self, results: &ResultReceiver<SwarmSummary>) {
        while let Ok(result) = results.try_recv() {
            match result.outcome {
                JobOutcome::Completed(summary) => self.analyses.push(summary),
                JobOutcome::Failed(reason) => {
                    warn!(job_id = result.job_id, %reason, "analysis failed");
                    self.summary.failed_analyses += 1;
                }
            }
        }
    }

    fn finish(mut self, manager: &GardenManager) -> Self {
        self.summary = RunSummary {
            sample_count: self.samples.len(),
            peak_count: self.samples.iter().map(|s| s.count).max().unwrap_or(0),
            final_count: self.samples.last().map_or(0, |s| s.count),
            spawned_total: manager.spawned_total(),
            dropped_states: manager.dropped_states(),
            dropped_results: manager.dropped_results(),
            failed_analyses: self.summary.failed_analyses,
            lanterns: manager.lanterns().len(),
            final_wind: manager.wind_direction_name(),
        };
        self
    }

    fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).context("failed to serialize run report")?;
        Ok(())
    }
}
