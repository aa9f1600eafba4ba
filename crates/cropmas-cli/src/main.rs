//! `cropmas`: locate and outline plants on segmented crop-field images.
//!
//! `run` simulates one image; `batch` walks a manifest of images and writes
//! per-image reports, an aggregate result file and a run log.

mod batch;
mod input;
mod scoring;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cropmas_core::{ActivityMap, AreaMethod, SimulationConfig, SimulationController, SimulationReport};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::input::Label;
use crate::scoring::DetectionScore;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cropmas", about = "Multi-agent plant localization on segmented field images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate a single image
    Run {
        /// Segmented image; pixels brighter than 220 are plant
        #[arg(long)]
        image: PathBuf,

        /// JSON list of crop rows, each a list of [x, y] seeds
        #[arg(long)]
        seeds: PathBuf,

        /// Optional JSON list of labelled plants ({id, x, y}) to score against
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Report destination (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        sim: SimArgs,
    },

    /// Simulate every image listed in a manifest
    Batch {
        /// JSON manifest: {"images": [{name, image, seeds, labels?, field_offset?}]}
        #[arg(long)]
        manifest: PathBuf,

        /// Output directory (created if absent)
        #[arg(short, long, default_value = "cropmas_output")]
        output_dir: PathBuf,

        /// Log failed images and continue instead of aborting the batch
        #[arg(long)]
        keep_going: bool,

        #[command(flatten)]
        sim: SimArgs,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AreaArg {
    Polygon,
    ActivePixels,
}

impl From<AreaArg> for AreaMethod {
    fn from(a: AreaArg) -> Self {
        match a {
            AreaArg::Polygon => AreaMethod::Polygon,
            AreaArg::ActivePixels => AreaMethod::ActivePixels,
        }
    }
}

/// Simulation settings: an optional JSON file, then flag overrides.
#[derive(Args, Debug, Clone, Default)]
struct SimArgs {
    /// JSON configuration file (every field optional)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    half_size: Option<i32>,

    #[arg(long)]
    step: Option<i32>,

    #[arg(long)]
    fuse_factor: Option<f64>,

    #[arg(long)]
    fill_factor: Option<f64>,

    #[arg(long)]
    search_steps: Option<usize>,

    #[arg(long)]
    growth_steps: Option<usize>,

    #[arg(long, value_enum)]
    area_method: Option<AreaArg>,

    #[arg(long)]
    coerce_x: bool,

    #[arg(long)]
    coerce_y: bool,

    #[arg(long)]
    remove_outlier_rows: bool,

    #[arg(long)]
    edge_exploration: bool,

    #[arg(long)]
    extensive_init: bool,
}

impl SimArgs {
    fn resolve(&self) -> Result<SimulationConfig> {
        let mut config = input::load_config(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate().context("Invalid simulation settings")?;
        Ok(config)
    }

    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(v) = self.half_size {
            config.half_size = v;
        }
        if let Some(v) = self.step {
            config.step = v;
        }
        if let Some(v) = self.fuse_factor {
            config.fuse_factor = v;
        }
        if let Some(v) = self.fill_factor {
            config.fill_factor = v;
        }
        if let Some(v) = self.search_steps {
            config.search_steps = v;
        }
        if let Some(v) = self.growth_steps {
            config.growth_steps = v;
        }
        if let Some(v) = self.area_method {
            config.area_method = v.into();
        }
        config.coerce_x |= self.coerce_x;
        config.coerce_y |= self.coerce_y;
        config.remove_outlier_rows |= self.remove_outlier_rows;
        config.edge_exploration |= self.edge_exploration;
        config.extensive_init |= self.extensive_init;
    }
}

// ── Single run ───────────────────────────────────────────────────────────────

/// Simulation report plus the optional detection score.
#[derive(Serialize)]
struct RunOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<DetectionScore>,
    #[serde(flatten)]
    report: SimulationReport,
}

fn simulate(
    image: &ActivityMap,
    seeds: &[Vec<(i32, i32)>],
    labels: Option<&[Label]>,
    config: SimulationConfig,
) -> Result<RunOutput> {
    let half = config.half_size;
    let report = SimulationController::new(image, seeds, config)?.run();
    let score = labels.map(|labels| {
        let leaders: Vec<(i32, i32)> = report.plant_positions().collect();
        scoring::score(&leaders, half, labels)
    });
    Ok(RunOutput { score, report })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Cannot write {}", path.display()))
}

fn run_single(image: &Path, seeds: &Path, labels: Option<&Path>, output: Option<&Path>, sim: &SimArgs) -> Result<()> {
    let config = sim.resolve()?;
    let activity = input::load_activity(image)?;
    let seeds = input::load_seeds(seeds)?;
    let labels = labels.map(input::load_labels).transpose()?;
    info!(image = %image.display(), width = activity.width(), height = activity.height(), rows = seeds.len(), "simulating");

    let out = simulate(&activity, &seeds, labels.as_deref(), config)?;
    if let Some(score) = &out.score {
        info!(tp = score.true_positives, fn_ = score.false_negatives, fp = score.false_positives, "scored");
    }
    match output {
        Some(path) => {
            write_json(path, &out)?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{}", serde_json::to_string_pretty(&out)?),
    }
    Ok(())
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { image, seeds, labels, output, sim } => {
            run_single(&image, &seeds, labels.as_deref(), output.as_deref(), &sim)
        }
        Command::Batch { manifest, output_dir, keep_going, sim } => {
            let config = sim.resolve()?;
            let manifest = input::load_manifest(&manifest)?;
            batch::run(&manifest, &output_dir, &config, keep_going)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_settings() {
        let sim = SimArgs {
            half_size: Some(12),
            fuse_factor: Some(0.4),
            area_method: Some(AreaArg::ActivePixels),
            coerce_y: true,
            ..SimArgs::default()
        };
        let mut config = SimulationConfig { coerce_x: true, ..SimulationConfig::default() };
        sim.apply(&mut config);
        assert_eq!(config.half_size, 12);
        assert_eq!(config.fuse_factor, 0.4);
        assert_eq!(config.area_method, AreaMethod::ActivePixels);
        // Boolean flags only switch options on.
        assert!(config.coerce_x && config.coerce_y);
        assert_eq!(config.step, 5);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let sim = SimArgs { fuse_factor: Some(2.0), ..SimArgs::default() };
        assert!(sim.resolve().is_err());
    }

    #[test]
    fn simulate_scores_against_labels() {
        let mut image = ActivityMap::new(200, 200, 0).unwrap();
        image.fill_rect(45, 45, 55, 55, 255);
        image.fill_rect(45, 125, 55, 135, 255);
        let seeds = vec![vec![(50, 50), (50, 130)]];
        let labels = vec![
            Label { id: "a".into(), x: 50, y: 50 },
            Label { id: "b".into(), x: 50, y: 130 },
            Label { id: "c".into(), x: 150, y: 150 },
        ];
        let config = SimulationConfig { half_size: 10, ..SimulationConfig::default() };
        let out = simulate(&image, &seeds, Some(&labels), config).unwrap();
        let score = out.score.unwrap();
        assert_eq!(score.true_positives, 2);
        assert_eq!(score.false_negatives, 1);
        assert_eq!(score.false_positives, 0);
    }
}
