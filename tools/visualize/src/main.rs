//! Diagnostic visualizer: runs one simulation and writes a PNG overlay of
//! seeds, leader anchors and leader borders on top of the activity image.
//! Not part of the main pipeline; no tests.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cropmas_core::director::seeds_from_json;
use cropmas_core::report::LeaderReport;
use cropmas_core::{ActivityMap, SimulationConfig, SimulationController};
use image::{Rgb, RgbImage};

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Overlay simulated leaders on a segmented image")]
struct Args {
    #[arg(long)]
    image: PathBuf,

    /// JSON list of crop rows, each a list of [x, y] seeds
    #[arg(long)]
    seeds: PathBuf,

    /// Optional JSON simulation configuration
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "data/debug/overlay.png")]
    output: PathBuf,
}

// ── Colour helpers ───────────────────────────────────────────────────────────

const SEED: Rgb<u8> = Rgb([255, 140, 0]);
const ANCHOR: Rgb<u8> = Rgb([220, 30, 30]);
const BORDER: Rgb<u8> = Rgb([0, 120, 255]);
const FROZEN_BORDER: Rgb<u8> = Rgb([40, 200, 80]);

/// Active pixels dimmed to grey so overlays stay readable.
fn background(map: &ActivityMap) -> RgbImage {
    let mut img = RgbImage::new(map.width() as u32, map.height() as u32);
    for r in 0..map.height() {
        for c in 0..map.width() {
            let v = if map.is_active(c as i32, r as i32) { 150 } else { 20 };
            img.put_pixel(c as u32, r as u32, Rgb([v, v, v]));
        }
    }
    img
}

fn plot(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn cross(img: &mut RgbImage, (x, y): (i32, i32), arm: i32, color: Rgb<u8>) {
    for d in -arm..=arm {
        plot(img, x + d, y, color);
        plot(img, x, y + d, color);
    }
}

/// Bresenham segment.
fn line(img: &mut RgbImage, (x0, y0): (i32, i32), (x1, y1): (i32, i32), color: Rgb<u8>) {
    let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
    let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
    let (mut x, mut y, mut err) = (x0, y0, dx + dy);
    loop {
        plot(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Closed border ring in image coordinates.
fn ring(leader: &LeaderReport) -> Vec<(i32, i32)> {
    let b = &leader.borders;
    let mut pts: Vec<(i32, i32)> = b.north.clone();
    pts.extend(b.east.iter().rev());
    pts.extend(b.south.iter().rev());
    pts.extend(b.west.iter());
    pts.into_iter().map(|(lx, ly)| (leader.x + lx, leader.y + ly)).collect()
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();

    let luma = image::open(&args.image)
        .with_context(|| format!("Cannot open {}", args.image.display()))?
        .to_luma8();
    let (w, h) = luma.dimensions();
    let map = ActivityMap::from_raw(w as usize, h as usize, luma.into_raw())?;

    let seeds_text = fs::read_to_string(&args.seeds).with_context(|| format!("Cannot read {}", args.seeds.display()))?;
    let seeds = seeds_from_json(&seeds_text).context("Failed to parse seeds")?;

    let config = match &args.config {
        Some(p) => SimulationConfig::from_json(&fs::read_to_string(p)?)?,
        None => SimulationConfig::default(),
    };

    println!("Running simulation ({w}×{h}, {} rows)…", seeds.len());
    let report = SimulationController::new(&map, &seeds, config)?.run();
    println!(
        "{} leaders, spacing {} px, {} search + {} growth steps",
        report.leader_count(),
        report.inter_plant_spacing,
        report.search_steps_run,
        report.growth_steps_run
    );

    let mut img = background(&map);
    for &(x, y) in seeds.iter().flatten() {
        cross(&mut img, (x, y), 2, SEED);
    }
    for leader in report.rows.iter().flat_map(|r| r.leaders.iter()) {
        let color = if leader.fixed { FROZEN_BORDER } else { BORDER };
        let pts = ring(leader);
        for (a, b) in pts.iter().zip(pts.iter().cycle().skip(1)) {
            line(&mut img, *a, *b, color);
        }
        cross(&mut img, (leader.x, leader.y), 4, ANCHOR);
    }

    if let Some(dir) = args.output.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    img.save(&args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}
