//! The director owns every row, fans each per-step command out to them and
//! handles the cross-row concerns: outlier rows, duplicate rows and the
//! global inter-plant spacing estimate.

use std::time::Instant;

use tracing::debug;

use crate::activity::ActivityMap;
use crate::config::SimulationConfig;
use crate::error::{MasError, Result};
use crate::report::{GrowthStepTiming, SearchStepTiming};
use crate::row::{Row, HISTOGRAM_BINS};
use crate::stats::{mean, RowStatistics};

/// Groups of inter-row spacings are "different" below this p-value.
pub const OUTLIER_P_VALUE: f64 = 1e-4;

/// Spacing estimates below this many pixels are treated as noise.
pub const MIN_PLAUSIBLE_SPACING: i32 = 5;

/// Parse seed rows written as nested `[x, y]` pairs, one list per crop row.
pub fn seeds_from_json(text: &str) -> Result<Vec<Vec<(i32, i32)>>> {
    let rows: Vec<Vec<[i32; 2]>> = serde_json::from_str(text)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(|[x, y]| (x, y)).collect())
        .collect())
}

fn timed(f: impl FnOnce()) -> f64 {
    let t0 = Instant::now();
    f();
    t0.elapsed().as_secs_f64()
}

#[derive(Debug, Clone)]
pub struct Director {
    rows: Vec<Row>,
    config: SimulationConfig,
    spacing: i32,
}

impl Director {
    /// One row per non-empty seed sequence.
    pub fn new(seeds_per_row: &[Vec<(i32, i32)>], image: &ActivityMap, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let footprint = 2 * config.half_size as usize + 1;
        if image.width() < footprint || image.height() < footprint {
            return Err(MasError::ImageTooSmall {
                width: image.width(),
                height: image.height(),
                half_size: config.half_size,
            });
        }
        let params = config.leader_params();
        let rows: Vec<Row> = seeds_per_row
            .iter()
            .filter(|seeds| !seeds.is_empty())
            .map(|seeds| Row::new(seeds, image, params))
            .collect();
        if rows.is_empty() {
            return Err(MasError::NoRows);
        }
        Ok(Self { rows, config, spacing: 0 })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current global inter-plant spacing estimate.
    pub fn spacing(&self) -> i32 {
        self.spacing
    }

    pub fn leader_count(&self) -> usize {
        self.rows.iter().map(Row::len).sum()
    }

    pub fn fixed_leader_count(&self) -> usize {
        self.rows.iter().map(Row::fixed_leader_count).sum()
    }

    fn fill_step(&self) -> i32 {
        (1.1 * self.config.fuse_factor * self.spacing as f64) as i32
    }

    // ── Row pruning ─────────────────────────────────────────────────────────

    /// Drop rows that sit in abnormally narrow inter-row gaps and carry far
    /// fewer seeds than average. Returns the removed row indices.
    pub fn remove_outlier_rows(&mut self, stats: &dyn RowStatistics) -> Vec<usize> {
        if self.rows.len() < 3 {
            return Vec::new();
        }
        let starts: Vec<f64> = self.rows.iter().map(|r| r.seeds()[0].0 as f64).collect();
        let counts: Vec<usize> = self.rows.iter().map(|r| r.seeds().len()).collect();
        let mean_count = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        let gaps: Vec<f64> = starts.windows(2).map(|w| w[1] - w[0]).collect();

        let labels = stats.cluster(&gaps, 2);
        let group = |g: usize| -> Vec<f64> {
            gaps.iter()
                .zip(&labels)
                .filter(|(_, l)| **l == g)
                .map(|(d, _)| *d)
                .collect()
        };
        let (g0, g1) = (group(0), group(1));
        if g0.is_empty() || g1.is_empty() {
            return Vec::new();
        }
        let p_value = stats.means_differ(&g0, &g1);
        debug!(p_value, "inter-row spacing groups compared");
        if !(p_value < OUTLIER_P_VALUE) {
            return Vec::new();
        }

        let narrow = if mean(&g0) <= mean(&g1) { 0 } else { 1 };
        let narrow_gaps: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == narrow)
            .map(|(i, _)| i)
            .collect();
        let removed = outlier_candidates(&narrow_gaps, &counts, mean_count);
        for &r in removed.iter().rev() {
            self.rows.remove(r);
        }
        removed
    }

    // ── Spacing ─────────────────────────────────────────────────────────────

    pub fn update_histograms(&mut self) {
        for row in &mut self.rows {
            row.update_histogram();
        }
    }

    /// Merge the row histograms bin by bin and take the left edge of the
    /// first modal bin, stepping up past implausibly small values.
    pub fn summarize_inter_plant_spacing(&mut self) -> i32 {
        if self.rows.is_empty() {
            return self.spacing;
        }
        let mut counts = [0usize; HISTOGRAM_BINS];
        let mut edges = [0f64; HISTOGRAM_BINS + 1];
        for row in &self.rows {
            let h = row.histogram();
            counts.iter_mut().zip(h.counts).for_each(|(c, v)| *c += v);
            edges.iter_mut().zip(h.edges).for_each(|(e, v)| *e += v);
        }
        edges.iter_mut().for_each(|e| *e /= self.rows.len() as f64);

        let peak = counts.iter().copied().max().unwrap_or(0);
        let mut idx = counts.iter().position(|&c| c == peak).unwrap_or(0);
        let mut spacing = edges[idx] as i32;
        while idx < HISTOGRAM_BINS && spacing < MIN_PLAUSIBLE_SPACING {
            idx += 1;
            spacing = edges[idx] as i32;
        }
        debug!(spacing, "inter-plant spacing summarized");
        self.spacing = spacing;
        spacing
    }

    // ── Row-level commands ──────────────────────────────────────────────────

    /// Merge consecutive rows whose mean X are closer than one half-size;
    /// the merged row restarts from the union of both rows' seeds.
    pub fn check_row_proximity(&mut self, image: &ActivityMap) -> usize {
        let params = self.config.leader_params();
        let mut merged = 0;
        let mut i = 0;
        while i + 1 < self.rows.len() {
            let gap = (self.rows[i].row_mean_x() - self.rows[i + 1].row_mean_x()).abs();
            if gap < self.config.half_size {
                let mut seeds = self.rows[i].seeds().to_vec();
                seeds.extend_from_slice(self.rows[i + 1].seeds());
                seeds.sort_by_key(|&(x, y)| (y, x));
                debug!(row = i, gap, "merging neighbouring rows");
                self.rows.splice(i..=i + 1, std::iter::once(Row::new(&seeds, image, params)));
                merged += 1;
            }
            i += 1;
        }
        merged
    }

    pub fn edge_exploration(&mut self, image: &ActivityMap) {
        let step = self.fill_step();
        for row in &mut self.rows {
            row.edge_exploration(step, image);
        }
    }

    pub fn extensive_init(&mut self, image: &ActivityMap) {
        let step = self.fill_step();
        for row in &mut self.rows {
            row.extensive_init(step, image);
        }
    }

    /// Destroy low-consensus leaders, then drop rows left without any.
    pub fn destroy_low_activity(&mut self) -> usize {
        let destroyed = self.rows.iter_mut().map(Row::destroy_low_activity).sum();
        self.rows.retain(|r| !r.is_empty());
        destroyed
    }

    /// One search step: consensus, optional X/Y coercion, move, fuse/fill,
    /// destroy, row proximity, spacing histograms. The order is fixed.
    pub fn search_step(&mut self, image: &ActivityMap) -> SearchStepTiming {
        let (reference, fuse, fill) = (self.spacing as f64, self.config.fuse_factor, self.config.fill_factor);
        let mut timing = SearchStepTiming::default();

        timing.consensus = timed(|| self.rows.iter_mut().for_each(|r| r.consensus(image)));
        if self.config.coerce_x {
            timing.coerce_x = timed(|| self.rows.iter_mut().for_each(Row::correct_x));
        }
        if self.config.coerce_y {
            timing.coerce_y = timed(|| self.rows.iter_mut().for_each(Row::correct_y));
        }
        timing.move_leaders = timed(|| self.rows.iter_mut().for_each(|r| r.move_to_active_points(image)));
        timing.fuse_or_fill = timed(|| {
            self.rows
                .iter_mut()
                .for_each(|r| r.fuse_or_fill(reference, fuse, fill, image))
        });
        let mut destroyed = 0;
        timing.destroy = timed(|| destroyed = self.destroy_low_activity());
        let mut merged = 0;
        timing.proximity = timed(|| merged = self.check_row_proximity(image));
        timing.spacing = timed(|| self.update_histograms());

        debug!(
            rows = self.rows.len(),
            leaders = self.leader_count(),
            destroyed,
            merged,
            "search step"
        );
        timing
    }

    // ── Growth ──────────────────────────────────────────────────────────────

    pub fn switch_to_growth(&mut self, image: &ActivityMap) {
        for row in &mut self.rows {
            row.switch_to_perimeter(image);
        }
    }

    /// One growth step: border growth, neighbour overlap, areas.
    pub fn growth_step(&mut self, image: &ActivityMap) -> GrowthStepTiming {
        let method = self.config.area_method;
        let mut timing = GrowthStepTiming::default();
        timing.growth = timed(|| self.rows.iter_mut().for_each(|r| r.grow(image)));
        let mut resolved = 0;
        timing.overlap = timed(|| {
            resolved = self.rows.iter_mut().map(Row::resolve_neighbor_overlap).sum::<usize>()
        });
        timing.area = timed(|| self.rows.iter_mut().for_each(|r| r.compute_areas(image, method)));
        debug!(fixed = self.fixed_leader_count(), resolved, "growth step");
        timing
    }
}

/// Rows to delete given the sorted indices of narrow gaps (gap `d` lies
/// between rows `d` and `d + 1`).
///
/// Two consecutive narrow gaps squeeze the row they share. An isolated
/// narrow gap blames whichever of its two rows is sparse, first one first.
/// A row is only removed when its seed count is under half the mean.
pub fn outlier_candidates(narrow_gaps: &[usize], counts: &[usize], mean_count: f64) -> Vec<usize> {
    let sparse = |r: usize| r < counts.len() && (counts[r] as f64) < 0.5 * mean_count;
    let mut out = Vec::new();
    let mut k = 0;
    while k < narrow_gaps.len() {
        let d = narrow_gaps[k];
        if k + 1 < narrow_gaps.len() && narrow_gaps[k + 1] == d + 1 {
            if sparse(d + 1) {
                out.push(d + 1);
            }
            k += 2;
            continue;
        }
        if sparse(d) {
            out.push(d);
        } else if sparse(d + 1) {
            out.push(d + 1);
        }
        k += 1;
    }
    out.sort_unstable();
    out.dedup();
    out
}
