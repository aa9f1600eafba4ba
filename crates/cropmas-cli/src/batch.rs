//! Batch driver: one simulation per manifest entry.
//!
//! A failing image is logged with its name. Without `--keep-going` the error
//! is re-raised after the log is written.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use cropmas_core::SimulationConfig;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::input::{self, ManifestEntry};
use crate::scoring::DetectionScore;
use crate::{simulate, write_json};

/// Per-image summary written to the aggregate result file.
#[derive(Debug, Serialize)]
struct ImageSummary {
    leaders: usize,
    inter_plant_spacing: i32,
    leader_counts: Vec<usize>,
    search_exhausted: bool,
    growth_exhausted: bool,
    seconds_per_search_step: Vec<f64>,
    seconds_per_growth_step: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<DetectionScore>,
}

/// Suffix naming the enabled row options, so runs with different options
/// can share an output directory.
pub fn run_tag(config: &SimulationConfig) -> String {
    let mut tag = String::new();
    for (on, part) in [
        (config.coerce_x, "_cX"),
        (config.coerce_y, "_cY"),
        (config.remove_outlier_rows, "_rmR"),
        (config.edge_exploration, "_REE"),
        (config.extensive_init, "_EXT"),
    ] {
        if on {
            tag.push_str(part);
        }
    }
    tag
}

fn run_entry(entry: &ManifestEntry, config: &SimulationConfig, out_dir: &Path, tag: &str) -> Result<(ImageSummary, Vec<String>)> {
    let image = input::load_activity(&entry.image)?;
    let seeds = input::load_seeds(&entry.seeds)?;
    let labels = entry.labels.as_deref().map(input::load_labels).transpose()?;
    let mut config = config.clone();
    if let Some(offset) = entry.field_offset {
        config.field_offset = offset;
    }

    let out = simulate(&image, &seeds, labels.as_deref(), config)?;
    write_json(&out_dir.join(format!("{}{tag}.json", entry.name)), &out)?;
    let nested: Vec<&Vec<(i32, i32)>> = out.report.rows.iter().map(|r| &r.positions).collect();
    write_json(&out_dir.join("nested_positions").join(format!("{}{tag}.json", entry.name)), &nested)?;

    let report = &out.report;
    let detected = out.score.as_ref().map(|s| s.detected.clone()).unwrap_or_default();
    let summary = ImageSummary {
        leaders: report.leader_count(),
        inter_plant_spacing: report.inter_plant_spacing,
        leader_counts: report.leader_counts.clone(),
        search_exhausted: report.search_exhausted,
        growth_exhausted: report.growth_exhausted,
        seconds_per_search_step: report.search_timings.iter().map(|t| t.total()).collect(),
        seconds_per_growth_step: report.growth_timings.iter().map(|t| t.total()).collect(),
        score: out.score,
    };
    Ok((summary, detected))
}

pub fn run(manifest: &input::Manifest, out_dir: &Path, config: &SimulationConfig, keep_going: bool) -> Result<()> {
    fs::create_dir_all(out_dir.join("nested_positions"))
        .with_context(|| format!("Cannot create {}", out_dir.display()))?;
    let tag = run_tag(config);
    let total = manifest.images.len();

    let mut results: BTreeMap<String, ImageSummary> = BTreeMap::new();
    // How many images detected each labelled plant.
    let mut whole_field: BTreeMap<String, usize> = BTreeMap::new();
    let mut log: Vec<String> = Vec::new();
    let mut failure = None;

    for (i, entry) in manifest.images.iter().enumerate() {
        info!(image = %entry.name, "simulation {}/{}", i + 1, total);
        match run_entry(entry, config, out_dir, &tag) {
            Ok((summary, detected)) => {
                if summary.search_exhausted || summary.growth_exhausted {
                    warn!(image = %entry.name, "step budget exhausted");
                    log.push(format!(
                        "Simulation for image {}/{total}, named {}, reached the maximum number of steps",
                        i + 1,
                        entry.name
                    ));
                }
                for id in detected {
                    *whole_field.entry(id).or_default() += 1;
                }
                results.insert(entry.name.clone(), summary);
            }
            Err(err) => {
                error!(image = %entry.name, "simulation failed: {err:#}");
                log.push(format!("Simulation for image {}/{total}, named {}, failed: {err:#}", i + 1, entry.name));
                if !keep_going {
                    failure = Some(err.context(format!("Simulation failed for {}", entry.name)));
                    break;
                }
            }
        }
    }

    write_json(&out_dir.join(format!("results{tag}.json")), &results)?;
    write_json(&out_dir.join(format!("whole_field{tag}.json")), &whole_field)?;
    let log_path = out_dir.join(format!("log{tag}.txt"));
    fs::write(&log_path, log.join("\n")).with_context(|| format!("Cannot write {}", log_path.display()))?;
    info!(done = results.len(), total, out = %out_dir.display(), "batch finished");

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_lists_enabled_options_in_order() {
        assert_eq!(run_tag(&SimulationConfig::default()), "");
        let config = SimulationConfig { coerce_y: true, edge_exploration: true, ..SimulationConfig::default() };
        assert_eq!(run_tag(&config), "_cY_REE");
    }
}
