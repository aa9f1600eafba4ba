//! Row coordination: one ordered line of leaders along a crop row.
//!
//! Rows run along the image y axis. The coordinator keeps the leaders'
//! consecutive y distances (`inter_plant_diffs`) in lock-step with the
//! leader list through every fuse, fill and destroy.

#[cfg(feature = "threading")]
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::activity::ActivityMap;
use crate::config::{AreaMethod, LeaderParams};
use crate::leader::{Border, Leader};

/// Leaders whose latest consensus falls below this are destroyed.
pub const DESTROY_THRESHOLD: f64 = 0.05;

pub const HISTOGRAM_BINS: usize = 10;

// ── Spacing histogram ────────────────────────────────────────────────────────

/// Ten equal-width bins over the observed spacing range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpacingHistogram {
    pub counts: [usize; HISTOGRAM_BINS],
    pub edges: [f64; HISTOGRAM_BINS + 1],
}

impl SpacingHistogram {
    /// Bins span `[min, max]`, widened to `[v - 0.5, v + 0.5]` when every
    /// value is `v` and defaulting to `[0, 1]` when there are none. The last
    /// bin is closed on the right.
    pub fn from_values(values: &[i32]) -> Self {
        let (lo, hi) = match (values.iter().min(), values.iter().max()) {
            (Some(&lo), Some(&hi)) if lo < hi => (lo as f64, hi as f64),
            (Some(&v), _) => (v as f64 - 0.5, v as f64 + 0.5),
            _ => (0.0, 1.0),
        };
        let width = (hi - lo) / HISTOGRAM_BINS as f64;
        let mut edges: [f64; HISTOGRAM_BINS + 1] = std::array::from_fn(|i| lo + width * i as f64);
        edges[HISTOGRAM_BINS] = hi;

        let mut counts = [0; HISTOGRAM_BINS];
        for &v in values {
            let v = v as f64;
            let mut idx = (((v - lo) / (hi - lo)) * HISTOGRAM_BINS as f64) as usize;
            idx = idx.min(HISTOGRAM_BINS - 1);
            if idx > 0 && v < edges[idx] {
                idx -= 1;
            } else if idx + 1 < HISTOGRAM_BINS && v >= edges[idx + 1] {
                idx += 1;
            }
            counts[idx] += 1;
        }
        Self { counts, edges }
    }
}

// ── Row ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Row {
    seeds: Vec<(i32, i32)>,
    leaders: Vec<Leader>,
    inter_plant_diffs: Vec<i32>,
    row_mean_x: i32,
    extensive: bool,
    params: LeaderParams,
    histogram: SpacingHistogram,
}

impl Row {
    /// One leader per seed, in seed order.
    pub fn new(seeds: &[(i32, i32)], image: &ActivityMap, params: LeaderParams) -> Self {
        let leaders = seeds.iter().map(|&(x, y)| Leader::new(x, y, image, params)).collect();
        let mut row = Self {
            seeds: seeds.to_vec(),
            leaders,
            inter_plant_diffs: Vec::new(),
            row_mean_x: seeds.first().map_or(0, |s| s.0),
            extensive: false,
            params,
            histogram: SpacingHistogram::from_values(&[]),
        };
        row.recompute_diffs();
        row.recompute_row_mean_x();
        row.update_histogram();
        row
    }

    pub fn seeds(&self) -> &[(i32, i32)] {
        &self.seeds
    }

    pub fn leaders(&self) -> &[Leader] {
        &self.leaders
    }

    pub fn len(&self) -> usize {
        self.leaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaders.is_empty()
    }

    pub fn inter_plant_diffs(&self) -> &[i32] {
        &self.inter_plant_diffs
    }

    pub fn row_mean_x(&self) -> i32 {
        self.row_mean_x
    }

    pub fn is_extensive(&self) -> bool {
        self.extensive
    }

    pub fn histogram(&self) -> &SpacingHistogram {
        &self.histogram
    }

    pub fn fixed_leader_count(&self) -> usize {
        self.leaders.iter().filter(|l| l.is_fixed()).count()
    }

    fn diff_at(&self, k: usize) -> i32 {
        (self.leaders[k].y() - self.leaders[k + 1].y()).abs()
    }

    fn recompute_diffs(&mut self) {
        self.inter_plant_diffs = (0..self.leaders.len().saturating_sub(1))
            .map(|k| self.diff_at(k))
            .collect();
    }

    fn check_invariant(&self) {
        debug_assert_eq!(
            self.inter_plant_diffs.len(),
            self.leaders.len().saturating_sub(1),
            "inter-plant diffs out of step with leaders"
        );
    }

    fn new_bound_leader(&self, x: i32, y: i32, image: &ActivityMap) -> Leader {
        let mut leader = Leader::new(x, y, image, self.params);
        leader.set_used_as_filling_bound(true);
        leader
    }

    // ── Search-phase passes ─────────────────────────────────────────────────

    pub fn consensus(&mut self, image: &ActivityMap) {
        #[cfg(feature = "threading")]
        self.leaders.par_iter_mut().for_each(|l| {
            l.consensus(image);
        });
        #[cfg(not(feature = "threading"))]
        self.leaders.iter_mut().for_each(|l| {
            l.consensus(image);
        });
    }

    /// Mean active-point X over the row. Kept unchanged for an empty row.
    pub fn recompute_row_mean_x(&mut self) {
        if self.leaders.is_empty() {
            return;
        }
        let sum: f64 = self.leaders.iter().map(|l| l.active_point().0 as f64).sum();
        self.row_mean_x = (sum / self.leaders.len() as f64) as i32;
    }

    pub fn majority_left_of_mean(&self) -> bool {
        let left = self
            .leaders
            .iter()
            .filter(|l| l.active_point().0 < self.row_mean_x)
            .count();
        left as f64 / self.leaders.len() as f64 > 0.5
    }

    /// Clamp active points on the minority side of the row onto its mean X.
    pub fn correct_x(&mut self) {
        if self.leaders.is_empty() {
            return;
        }
        self.recompute_row_mean_x();
        let left = self.majority_left_of_mean();
        let mean_x = self.row_mean_x;
        for leader in &mut self.leaders {
            let (ax, ay) = leader.active_point();
            if (left && ax > mean_x) || (!left && ax < mean_x) {
                leader.set_active_point(mean_x, ay);
            }
        }
    }

    pub fn majority_moving_up(&self) -> bool {
        let up = self
            .leaders
            .iter()
            .filter(|l| l.active_point().1 - l.y() > 0)
            .count();
        up as f64 / self.leaders.len() as f64 > 0.5
    }

    /// Mean vertical move of the leaders moving with `direction` (±1),
    /// counting leaders that stay put.
    pub fn mean_majority_y_move(&self, direction: i32) -> f64 {
        let moves: Vec<i32> = self
            .leaders
            .iter()
            .map(|l| l.active_point().1 - l.y())
            .filter(|dy| direction * dy >= 0)
            .collect();
        if moves.is_empty() {
            return 0.0;
        }
        moves.iter().sum::<i32>() as f64 / moves.len() as f64
    }

    /// Replace minority-direction vertical moves by the mean majority move.
    pub fn correct_y(&mut self) {
        if self.leaders.is_empty() {
            return;
        }
        let up = self.majority_moving_up();
        let shift = self.mean_majority_y_move(if up { 1 } else { -1 }) as i32;
        for leader in &mut self.leaders {
            let (ax, ay) = leader.active_point();
            let dy = ay - leader.y();
            if (up && dy < 0) || (!up && dy > 0) {
                leader.set_active_point(ax, leader.y() + shift);
            }
        }
    }

    pub fn move_to_active_points(&mut self, image: &ActivityMap) {
        for leader in &mut self.leaders {
            leader.move_to_active_point(image);
        }
        self.recompute_diffs();
        self.check_invariant();
    }

    // ── Topology ────────────────────────────────────────────────────────────

    /// Replace leaders `i..=j` by one leader at their centroid.
    ///
    /// The new leader is an edge patrol only if both endpoints were.
    pub fn fuse(&mut self, i: usize, j: usize, image: &ActivityMap) {
        if i >= j || j >= self.leaders.len() {
            return;
        }
        let group = &self.leaders[i..=j];
        let n = group.len() as f64;
        let cx = group.iter().map(|l| l.x() as f64).sum::<f64>() / n;
        let cy = group.iter().map(|l| l.y() as f64).sum::<f64>() / n;
        let bound = self.leaders[i].used_as_filling_bound() && self.leaders[j].used_as_filling_bound();

        let mut fused = Leader::new(cx as i32, cy as i32, image, self.params);
        fused.set_used_as_filling_bound(bound);
        debug!(from = ?(self.leaders[i].y(), self.leaders[j].y()), to = fused.y(), "fusing leaders");

        self.leaders.splice(i..=j, std::iter::once(fused));
        self.inter_plant_diffs.drain(i..j);
        for k in [i.checked_sub(1), Some(i)].into_iter().flatten() {
            if k + 1 < self.leaders.len() {
                self.inter_plant_diffs[k] = self.diff_at(k);
            }
        }
        self.check_invariant();
    }

    /// Insert edge-patrol leaders every `step` pixels strictly between the
    /// adjacent leaders `i` and `j = i + 1`, at the row's mean X.
    ///
    /// Skipped when both leaders already bound a filled gap. Returns the
    /// number of inserted leaders.
    pub fn fill(&mut self, i: usize, j: usize, step: i32, image: &ActivityMap) -> usize {
        debug_assert_eq!(j, i + 1, "fill only spans adjacent leaders");
        if step <= 0 || j >= self.leaders.len() {
            return 0;
        }
        if self.leaders[i].used_as_filling_bound() && self.leaders[j].used_as_filling_bound() {
            return 0;
        }
        let (y_start, y_end) = (self.leaders[i].y(), self.leaders[j].y());
        let mut added = Vec::new();
        let mut y = y_start;
        while y + step < y_end {
            y += step;
            added.push(self.new_bound_leader(self.row_mean_x, y, image));
        }
        self.leaders[i].set_used_as_filling_bound(true);
        self.leaders[j].set_used_as_filling_bound(true);

        let count = added.len();
        if count > 0 {
            debug!(y_start, y_end, count, step, "filling gap");
            self.leaders.splice(j..j, added);
            let fresh: Vec<i32> = (i..=i + count).map(|k| self.diff_at(k)).collect();
            self.inter_plant_diffs.splice(i..=i, fresh);
        }
        self.check_invariant();
        count
    }

    /// Single scan over consecutive pairs: fuse pairs that are too close,
    /// otherwise fill gaps that are too wide (never in extensive mode).
    pub fn fuse_or_fill(&mut self, reference: f64, fuse_factor: f64, fill_factor: f64, image: &ActivityMap) {
        let fill_step = (1.1 * fuse_factor * reference) as i32;
        let mut i = 0;
        while i + 1 < self.leaders.len() {
            let diff = self.inter_plant_diffs[i] as f64;
            let (a, b) = (&self.leaders[i], &self.leaders[i + 1]);
            let half = a.half_size().min(b.half_size());
            let coincide = (a.x() - b.x()).abs() < half && (a.y() - b.y()).abs() < half;
            if diff < fuse_factor * reference || coincide {
                self.fuse(i, i + 1, image);
            } else if !self.extensive && diff > fill_factor * reference {
                self.fill(i, i + 1, fill_step, image);
            }
            i += 1;
        }
    }

    /// Remove every leader whose latest consensus is below
    /// [`DESTROY_THRESHOLD`]. Returns how many were removed.
    pub fn destroy_low_activity(&mut self) -> usize {
        let before = self.leaders.len();
        self.leaders.retain(|l| l.latest_score() >= DESTROY_THRESHOLD);
        self.recompute_diffs();
        self.check_invariant();
        before - self.leaders.len()
    }

    /// Patrol the row ends: add edge-patrol leaders every `step` pixels
    /// beyond the last leader up to the image bottom, and before the first
    /// one down to row 0.
    pub fn edge_exploration(&mut self, step: i32, image: &ActivityMap) {
        if step <= 0 || self.leaders.is_empty() {
            return;
        }
        let height = image.height() as i32;
        let mut y = self.leaders.iter().map(Leader::y).max().unwrap_or(0);
        let mut added = Vec::new();
        while y + step < height {
            y += step;
            added.push(self.new_bound_leader(self.row_mean_x, y, image));
        }
        let mut y = self.leaders.iter().map(Leader::y).min().unwrap_or(0);
        while y - step > 0 {
            y -= step;
            added.push(self.new_bound_leader(self.row_mean_x, y, image));
        }
        debug!(added = added.len(), step, "edge exploration");
        self.leaders.extend(added);
        self.leaders.sort_by_key(Leader::y);
        self.recompute_diffs();
        self.check_invariant();
    }

    /// Discard the seeded leaders and cover the whole row with edge-patrol
    /// leaders every `step` pixels. Fill is disabled from then on.
    pub fn extensive_init(&mut self, step: i32, image: &ActivityMap) {
        if step <= 0 {
            return;
        }
        self.extensive = true;
        let height = image.height() as i32;
        let mut leaders = Vec::new();
        let mut y = 0;
        while y + step < height {
            y += step;
            leaders.push(self.new_bound_leader(self.row_mean_x, y, image));
        }
        self.leaders = leaders;
        self.recompute_diffs();
        self.check_invariant();
    }

    /// Recompute spacings and their histogram.
    pub fn update_histogram(&mut self) {
        self.recompute_diffs();
        self.histogram = SpacingHistogram::from_values(&self.inter_plant_diffs);
    }

    // ── Growth-phase passes ─────────────────────────────────────────────────

    pub fn switch_to_perimeter(&mut self, image: &ActivityMap) {
        for leader in &mut self.leaders {
            leader.switch_to_perimeter(image);
        }
    }

    pub fn grow(&mut self, image: &ActivityMap) {
        #[cfg(feature = "threading")]
        self.leaders.par_iter_mut().for_each(|l| l.manage_border_growth(image));
        #[cfg(not(feature = "threading"))]
        self.leaders.iter_mut().for_each(|l| l.manage_border_growth(image));
    }

    /// Push back facing north/south borders of consecutive leaders that
    /// interpenetrate. Pairs already flagged are left alone. Returns the
    /// number of pairs corrected.
    pub fn resolve_neighbor_overlap(&mut self) -> usize {
        let mut resolved = 0;
        for i in 1..self.leaders.len() {
            let (head, tail) = self.leaders.split_at_mut(i);
            let (lower, upper) = (&mut head[i - 1], &mut tail[0]);
            if lower.border(Border::North).has_overlap() || upper.border(Border::South).has_overlap() {
                continue;
            }
            if lower.resolve_overlap_with_neighbor(upper, Border::North, Border::South) {
                resolved += 1;
            }
        }
        resolved
    }

    pub fn compute_areas(&mut self, image: &ActivityMap, method: AreaMethod) {
        for leader in &mut self.leaders {
            leader.compute_area(image, method);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LeaderParams {
        LeaderParams { half_size: 10, step: 5, ..LeaderParams::default() }
    }

    fn blank() -> ActivityMap {
        ActivityMap::new(200, 400, 0).unwrap()
    }

    fn ys(row: &Row) -> Vec<i32> {
        row.leaders().iter().map(Leader::y).collect()
    }

    fn assert_diffs_consistent(row: &Row) {
        assert_eq!(row.inter_plant_diffs().len(), row.len().saturating_sub(1));
        let expected: Vec<i32> = row.leaders().windows(2).map(|w| (w[0].y() - w[1].y()).abs()).collect();
        assert_eq!(row.inter_plant_diffs(), expected.as_slice());
    }

    #[test]
    fn histogram_follows_equal_width_bins() {
        let h = SpacingHistogram::from_values(&[10, 20, 30]);
        assert_eq!(h.edges[0], 10.0);
        assert_eq!(h.edges[10], 30.0);
        assert_eq!(h.counts[0], 1);
        assert_eq!(h.counts[5], 1);
        assert_eq!(h.counts[9], 1);

        let single = SpacingHistogram::from_values(&[40, 40, 40]);
        assert_eq!(single.edges[0], 39.5);
        assert_eq!(single.counts[5], 3);

        let empty = SpacingHistogram::from_values(&[]);
        assert_eq!(empty.edges[10], 1.0);
        assert_eq!(empty.counts.iter().sum::<usize>(), 0);
    }

    #[test]
    fn initialization_preserves_seed_order() {
        let image = blank();
        let row = Row::new(&[(100, 300), (100, 100), (104, 200)], &image, params());
        assert_eq!(ys(&row), vec![300, 100, 200]);
        assert_eq!(row.inter_plant_diffs(), &[200, 100]);
        assert_eq!(row.row_mean_x(), 101);
    }

    /// Fillers are spaced by `1.1 x fuse x ref`, not by `ref` itself, so the
    /// 160 px gap takes six fillers instead of four.
    #[test]
    fn wide_gap_is_filled_between_its_bounds() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 140), (100, 300)], &image, params());

        // 100 -> 140 is neither below 0.5 x 40 nor above 1.5 x 40.
        row.fuse_or_fill(40.0, 0.5, 1.5, &image);
        // Fill step is floor(1.1 x 0.5 x 40) = 22. The last filler lands
        // 6 px from the far bound and is fused with it later in the pass.
        assert_eq!(ys(&row), vec![100, 140, 162, 184, 206, 228, 250, 272, 297]);
        assert!(row.leaders()[1..].iter().all(Leader::used_as_filling_bound));
        assert!(!row.leaders()[0].used_as_filling_bound());
        assert_diffs_consistent(&row);
    }

    /// Bounds are excluded: a 40 px step over a 160 px gap leaves three
    /// interior leaders.
    #[test]
    fn fill_inserts_leaders_strictly_between() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 140), (100, 300)], &image, params());
        assert_eq!(row.fill(1, 2, 40, &image), 3);
        assert_eq!(ys(&row), vec![100, 140, 180, 220, 260, 300]);
        assert_eq!(row.inter_plant_diffs(), &[40, 40, 40, 40, 40]);
        // Both bounds are now patrolled: a second fill is refused.
        assert_eq!(row.fill(4, 5, 10, &image), 0);
        assert_diffs_consistent(&row);
    }

    #[test]
    fn close_leaders_fuse_at_centroid() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 110), (100, 200)], &image, params());
        row.fuse_or_fill(40.0, 0.5, 1.5, &image);
        assert_eq!(ys(&row), vec![105, 200]);
        assert_eq!(row.inter_plant_diffs(), &[95]);
        assert!(!row.leaders()[0].used_as_filling_bound());
    }

    #[test]
    fn fuse_in_the_middle_recomputes_both_neighbour_spacings() {
        let image = blank();
        let mut row = Row::new(&[(100, 50), (100, 100), (100, 120), (100, 200)], &image, params());
        row.fuse(1, 2, &image);
        assert_eq!(ys(&row), vec![50, 110, 200]);
        assert_eq!(row.inter_plant_diffs(), &[60, 90]);
        assert_diffs_consistent(&row);
    }

    #[test]
    fn fused_leader_inherits_bound_only_from_both_ends() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 104), (100, 300), (100, 304)], &image, params());
        row.leaders[0].set_used_as_filling_bound(true);
        row.leaders[2].set_used_as_filling_bound(true);
        row.leaders[3].set_used_as_filling_bound(true);
        row.fuse(2, 3, &image);
        row.fuse(0, 1, &image);
        assert!(!row.leaders()[0].used_as_filling_bound());
        assert!(row.leaders()[1].used_as_filling_bound());
    }

    #[test]
    fn near_coincident_leaders_fuse_regardless_of_spacing() {
        let image = blank();
        // dy = 8 exceeds 0.5 x 10 but both deltas are under the half-size.
        let mut row = Row::new(&[(100, 100), (105, 108)], &image, params());
        row.fuse_or_fill(10.0, 0.5, 1.5, &image);
        assert_eq!(row.len(), 1);
        assert_eq!((row.leaders()[0].x(), row.leaders()[0].y()), (102, 104));
    }

    #[test]
    fn singleton_row_is_left_alone() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 102)], &image, params());
        row.fuse_or_fill(40.0, 0.5, 1.5, &image);
        assert_eq!(row.len(), 1);
        let before = (row.leaders()[0].x(), row.leaders()[0].y());
        row.fuse_or_fill(40.0, 0.5, 1.5, &image);
        row.fuse_or_fill(1.0, 0.5, 1.5, &image);
        assert_eq!(row.len(), 1);
        assert_eq!((row.leaders()[0].x(), row.leaders()[0].y()), before);
        assert!(row.inter_plant_diffs().is_empty());
    }

    #[test]
    fn inactive_leaders_are_destroyed() {
        let mut image = blank();
        image.fill_rect(90, 190, 110, 210, 255);
        let mut row = Row::new(&[(100, 100), (100, 200), (100, 300)], &image, params());
        row.consensus(&image);
        assert_eq!(row.destroy_low_activity(), 2);
        assert_eq!(ys(&row), vec![200]);
        assert_diffs_consistent(&row);
    }

    #[test]
    fn edge_exploration_reaches_both_image_ends() {
        let image = blank();
        let mut row = Row::new(&[(100, 150), (100, 200)], &image, params());
        row.edge_exploration(40, &image);
        assert_eq!(ys(&row), vec![30, 70, 110, 150, 200, 240, 280, 320, 360]);
        assert_diffs_consistent(&row);
        // Seeded leaders are not marked; explorers are.
        let marked = row.leaders().iter().filter(|l| l.used_as_filling_bound()).count();
        assert_eq!(marked, row.len() - 2);
    }

    #[test]
    fn extensive_mode_never_fills() {
        let image = blank();
        let mut row = Row::new(&[(100, 100)], &image, params());
        row.extensive_init(100, &image);
        assert!(row.is_extensive());
        assert_eq!(ys(&row), vec![100, 200, 300]);
        row.leaders.remove(1);
        row.recompute_diffs();
        row.leaders[0].set_used_as_filling_bound(false);
        row.fuse_or_fill(40.0, 0.5, 1.5, &image);
        assert_eq!(ys(&row), vec![100, 300]);
    }

    #[test]
    fn x_coercion_clamps_minority_side() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 150), (100, 200)], &image, params());
        row.leaders[0].set_active_point(90, 100);
        row.leaders[1].set_active_point(92, 150);
        row.leaders[2].set_active_point(130, 200);
        row.correct_x();
        // Mean 104: two leaders on the left, so the right one is clamped.
        assert_eq!(row.row_mean_x(), 104);
        assert_eq!(row.leaders()[2].active_point(), (104, 200));
        assert_eq!(row.leaders()[0].active_point(), (90, 100));
    }

    #[test]
    fn y_coercion_replaces_minority_moves() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 150), (100, 200)], &image, params());
        row.leaders[0].set_active_point(100, 104);
        row.leaders[1].set_active_point(100, 157);
        row.leaders[2].set_active_point(100, 190);
        assert!(row.majority_moving_up());
        assert_eq!(row.mean_majority_y_move(1), 5.5);
        row.correct_y();
        assert_eq!(row.leaders()[2].active_point(), (100, 205));
        assert_eq!(row.leaders()[1].active_point(), (100, 157));
    }

    #[test]
    fn row_overlap_is_resolved_once() {
        let image = blank();
        let mut row = Row::new(&[(100, 100), (100, 115)], &image, params());
        row.switch_to_perimeter(&image);
        assert_eq!(row.resolve_neighbor_overlap(), 1);
        let north = row.leaders()[0].border_line(Border::North);
        let south = row.leaders()[1].border_line(Border::South);
        assert!(north < south, "{north} >= {south}");
        assert_eq!(row.resolve_neighbor_overlap(), 0);
    }
}
