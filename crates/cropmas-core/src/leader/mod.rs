//! Leader agents: one candidate plant each, supervising a set of samplers.
//!
//! During the search phase a leader samples a full square grid around its
//! anchor and drifts toward the mean of its active samplers. In the growth
//! phase the grid is replaced by four independent borders that expand or
//! shrink until they settle on the plant's outline.

pub mod border;
pub mod polygon;

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, trace};

use crate::activity::ActivityMap;
use crate::config::{AreaMethod, LeaderParams};
use crate::sampler::Sampler;

pub use border::{Border, BorderState};

/// Fraction of frozen samplers above which the whole leader freezes.
pub const FREEZE_RATIO: f64 = 0.9;

/// Corners visited after each border pass, as (north/south, east/west).
const CORNERS: [(Border, Border); 4] = [
    (Border::North, Border::West),
    (Border::North, Border::East),
    (Border::South, Border::West),
    (Border::South, Border::East),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    Grid,
    Perimeter,
}

#[derive(Debug, Clone)]
pub struct Leader {
    x: i32,
    y: i32,
    params: LeaderParams,
    mode: SamplingMode,
    grid: Vec<Sampler>,
    borders: [BorderState; 4],
    fixed: bool,
    fixed_sampler_count: usize,
    decision_score: f64,
    score_history: Vec<f64>,
    active_point: (i32, i32),
    area: f64,
    used_as_filling_bound: bool,
    position_history: Vec<(i32, i32)>,
    field_position_history: Vec<(i32, i32)>,
}

/// Move `(x, y)` so that a square of half-size `half` around it stays inside
/// a `width` x `height` frame.
pub fn clamp_anchor(x: i32, y: i32, half: i32, width: usize, height: usize) -> (i32, i32) {
    let clamp = |v: i32, extent: usize| {
        let mut v = v;
        if v - half < 0 {
            v = half;
        }
        let last = extent as i32 - 1;
        if v + half > last {
            v = last - half;
        }
        v
    };
    (clamp(x, width), clamp(y, height))
}

/// Offsets `-half, -half + step, ...` ending exactly on `+half`.
fn lattice(half: i32, step: i32) -> Vec<i32> {
    let mut offsets: Vec<i32> = (-half..half).step_by(step.max(1) as usize).collect();
    offsets.push(half);
    offsets
}

/// Mutable access to two distinct borders at once.
fn pair_mut(borders: &mut [BorderState; 4], a: usize, b: usize) -> (&mut BorderState, &mut BorderState) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = borders.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = borders.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

fn end_of<T: Copy + Default>(items: &[T], at_start: bool) -> T {
    let item = if at_start { items.first() } else { items.last() };
    item.copied().unwrap_or_default()
}

impl Leader {
    /// Create a leader around `(x, y)` in grid mode.
    ///
    /// The anchor is clamped so the whole sampler square fits in the frame;
    /// callers are expected to reject images smaller than one footprint.
    pub fn new(x: i32, y: i32, image: &ActivityMap, params: LeaderParams) -> Self {
        let (x, y) = clamp_anchor(x, y, params.half_size, image.width(), image.height());
        let offsets = lattice(params.half_size, params.step);
        let grid = offsets
            .iter()
            .flat_map(|&i| offsets.iter().map(move |&j| (i, j)))
            .map(|(i, j)| Sampler::new(x, y, i, j, image))
            .collect();
        let [ox, oy] = params.field_offset;
        let mut leader = Self {
            x,
            y,
            params,
            mode: SamplingMode::Grid,
            grid,
            borders: Default::default(),
            fixed: false,
            fixed_sampler_count: 0,
            decision_score: 0.0,
            score_history: Vec::new(),
            active_point: (x, y),
            area: 0.0,
            used_as_filling_bound: false,
            position_history: vec![(x, y)],
            field_position_history: vec![(x + ox, y + oy)],
        };
        leader.reset_border_distances();
        let tally = leader.tally(image);
        leader.record_score(tally.score());
        leader
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn params(&self) -> &LeaderParams {
        &self.params
    }

    pub fn half_size(&self) -> i32 {
        self.params.half_size
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn fixed_sampler_count(&self) -> usize {
        self.fixed_sampler_count
    }

    pub fn decision_score(&self) -> f64 {
        self.decision_score
    }

    pub fn score_history(&self) -> &[f64] {
        &self.score_history
    }

    /// Most recent recorded consensus, 0 before any evaluation.
    pub fn latest_score(&self) -> f64 {
        self.score_history.last().copied().unwrap_or(0.0)
    }

    pub fn active_point(&self) -> (i32, i32) {
        self.active_point
    }

    pub fn set_active_point(&mut self, x: i32, y: i32) {
        self.active_point = (x, y);
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn used_as_filling_bound(&self) -> bool {
        self.used_as_filling_bound
    }

    pub fn set_used_as_filling_bound(&mut self, bound: bool) {
        self.used_as_filling_bound = bound;
    }

    pub fn position_history(&self) -> &[(i32, i32)] {
        &self.position_history
    }

    pub fn field_position_history(&self) -> &[(i32, i32)] {
        &self.field_position_history
    }

    pub fn border(&self, border: Border) -> &BorderState {
        &self.borders[border.index()]
    }

    /// Extremal local coordinate of each border, indexed by [`Border::index`].
    pub fn border_distances(&self) -> [i32; 4] {
        [0, 1, 2, 3].map(|i| self.borders[i].distance)
    }

    pub fn samplers(&self) -> impl Iterator<Item = &Sampler> + '_ {
        self.grid
            .iter()
            .chain(self.borders.iter().flat_map(|b| b.samplers.iter()))
    }

    fn samplers_mut(&mut self) -> impl Iterator<Item = &mut Sampler> + '_ {
        self.grid
            .iter_mut()
            .chain(self.borders.iter_mut().flat_map(|b| b.samplers.iter_mut()))
    }

    pub fn sampler_count(&self) -> usize {
        self.grid.len() + self.borders.iter().map(|b| b.samplers.len()).sum::<usize>()
    }

    /// True if `(px, py)` falls inside the nominal scanning square.
    pub fn covers(&self, px: i32, py: i32) -> bool {
        let half = self.params.half_size;
        (px - self.x).abs() <= half && (py - self.y).abs() <= half
    }

    /// Global axis coordinate of a border line.
    pub fn border_line(&self, border: Border) -> i32 {
        border.axis((self.x, self.y)) + self.borders[border.index()].distance
    }

    // ── Consensus ───────────────────────────────────────────────────────────

    fn tally(&mut self, image: &ActivityMap) -> Tally {
        let mut tally = Tally::default();
        for s in self.samplers_mut() {
            let on = s.probe(image);
            if s.is_outside_frame() {
                continue;
            }
            tally.in_frame += 1;
            if on {
                let (gx, gy) = s.global();
                tally.active += 1;
                tally.sum_x += gx as i64;
                tally.sum_y += gy as i64;
            }
        }
        tally
    }

    fn record_score(&mut self, score: Option<f64>) {
        self.decision_score = score.unwrap_or(0.0);
        self.score_history.push(self.decision_score);
    }

    /// Fraction of in-frame samplers currently active.
    ///
    /// Returns `None` when every sampler is out of frame; the recorded
    /// decision score is then 0. The active point moves to the mean position
    /// of the active samplers, and stays put when none is active.
    pub fn consensus(&mut self, image: &ActivityMap) -> Option<f64> {
        let tally = self.tally(image);
        let score = tally.score();
        self.record_score(score);
        if tally.active > 0 {
            let n = tally.active as i64;
            self.active_point = ((tally.sum_x / n) as i32, (tally.sum_y / n) as i32);
        }
        score
    }

    // ── Movement ────────────────────────────────────────────────────────────

    pub fn move_to(&mut self, x: i32, y: i32, image: &ActivityMap) {
        self.x = x;
        self.y = y;
        let [ox, oy] = self.params.field_offset;
        self.position_history.push((x, y));
        self.field_position_history.push((x + ox, y + oy));
        for s in self.samplers_mut() {
            s.move_with(x, y, image);
        }
    }

    pub fn move_to_active_point(&mut self, image: &ActivityMap) {
        let (x, y) = self.active_point;
        self.move_to(x, y, image);
    }

    // ── Growth ──────────────────────────────────────────────────────────────

    fn reset_border_distances(&mut self) {
        let half = self.params.half_size;
        for border in Border::ALL {
            self.borders[border.index()].distance = border.sign() * half;
        }
    }

    /// Replace the search grid by four border lines at the nominal half-size.
    pub fn switch_to_perimeter(&mut self, image: &ActivityMap) {
        let half = self.params.half_size;
        let offsets = lattice(half, self.params.step);
        let (x, y) = (self.x, self.y);
        let line = |f: &dyn Fn(i32) -> (i32, i32)| -> Vec<Sampler> {
            offsets
                .iter()
                .map(|&o| {
                    let (lx, ly) = f(o);
                    Sampler::new(x, y, lx, ly, image)
                })
                .collect()
        };
        self.borders = [
            BorderState { samplers: line(&|o| (o, half)), ..BorderState::default() },
            BorderState { samplers: line(&|o| (o, -half)), ..BorderState::default() },
            BorderState { samplers: line(&|o| (half, o)), ..BorderState::default() },
            BorderState { samplers: line(&|o| (-half, o)), ..BorderState::default() },
        ];
        self.grid.clear();
        self.reset_border_distances();
        self.fixed = false;
        self.fixed_sampler_count = 0;
        self.mode = SamplingMode::Perimeter;
    }

    /// One growth step over all four borders. No-op once the leader is
    /// frozen or while it is still in grid mode.
    pub fn manage_border_growth(&mut self, image: &ActivityMap) {
        if self.fixed || self.mode != SamplingMode::Perimeter {
            return;
        }
        let (reach, shrink) = (self.params.exploration_reach, self.params.shrink_reach);
        let frozen: usize = Border::ALL
            .iter()
            .map(|&b| self.borders[b.index()].advance(b, image, reach, shrink))
            .sum();

        for (vertical, side) in CORNERS {
            self.reshape_corner(vertical, side, image);
        }
        for border in Border::ALL {
            self.borders[border.index()].refresh_distance(border);
        }

        self.fixed_sampler_count = self.samplers().filter(|s| s.is_fixed()).count();
        let total = self.sampler_count();
        if total > 0 && self.fixed_sampler_count as f64 / total as f64 > FREEZE_RATIO {
            self.fixed = true;
        }
        trace!(x = self.x, y = self.y, frozen, total, fixed = self.fixed, "growth step");
    }

    /// Trim or extend the two borders meeting at a corner.
    ///
    /// When both corner samplers want to shrink, each border loses its corner
    /// sampler (down to a floor). Otherwise a positive score on either side
    /// extends the other border up to the moved corner.
    fn reshape_corner(&mut self, vertical: Border, side: Border, image: &ActivityMap) {
        let floor = ((0.25 * self.params.half_size as f64) as usize).max(1);
        let step = self.params.step.max(1) as usize;
        let (x, y) = (self.x, self.y);
        let (v, h) = pair_mut(&mut self.borders, vertical.index(), side.index());
        if v.samplers.is_empty() || h.samplers.is_empty() {
            return;
        }
        // North/south lines run west→east, east/west lines run south→north.
        let v_at_start = side == Border::West;
        let h_at_start = vertical == Border::South;
        let v_score = end_of(&v.end_scores, v_at_start);
        let h_score = end_of(&h.end_scores, h_at_start);

        if v_score < 0 && h_score < 0 {
            for (state, at_start) in [(v, v_at_start), (h, h_at_start)] {
                if state.samplers.len() <= floor {
                    continue;
                }
                if at_start {
                    state.samplers.remove(0);
                } else {
                    state.samplers.pop();
                }
            }
            return;
        }

        let (vx, vy) = end_of(&v.local_positions(), v_at_start);
        let (hx, hy) = end_of(&h.local_positions(), h_at_start);

        if v_score > 0 {
            let mut extension: Vec<Sampler> = (0..(vy - hy).abs())
                .step_by(step)
                .map(|k| Sampler::new(x, y, hx, vy - vertical.sign() * k, image))
                .collect();
            extension.sort_by_key(|s| s.local().1);
            splice_end(&mut h.samplers, extension, h_at_start);
        }
        if h_score > 0 {
            let mut extension: Vec<Sampler> = (0..(vx - hx).abs())
                .step_by(step)
                .map(|k| Sampler::new(x, y, hx - side.sign() * k, vy, image))
                .collect();
            extension.sort_by_key(|s| s.local().0);
            splice_end(&mut v.samplers, extension, v_at_start);
        }
    }

    // ── Overlap ─────────────────────────────────────────────────────────────

    /// Push back two facing borders that cross each other.
    ///
    /// `this_border` of `self` faces `other_border` of `other`. Every sampler
    /// beyond the other border line retreats by half its crossing depth plus
    /// one and is frozen there; both borders get their overlap flag. Returns
    /// whether any crossing was found.
    pub fn resolve_overlap_with_neighbor(&mut self, other: &mut Leader, this_border: Border, other_border: Border) -> bool {
        debug_assert_eq!(other_border, this_border.opposite());
        let this_line = self.border_line(this_border);
        let other_line = other.border_line(other_border);
        if this_border.sign() * (this_line - other_line) <= 0 {
            return false;
        }
        debug!(
            this = ?(self.x, self.y),
            other = ?(other.x, other.y),
            depth = (this_line - other_line).abs(),
            "resolving leader overlap"
        );
        self.retreat(this_border, other_line);
        other.retreat(other_border, this_line);
        true
    }

    fn retreat(&mut self, border: Border, limit: i32) {
        let sign = border.sign();
        let (nx, ny) = border.normal();
        let state = &mut self.borders[border.index()];
        let mut reached = Vec::new();
        for s in state.samplers.iter_mut() {
            let depth = sign * (border.axis(s.global()) - limit);
            if depth <= 0 {
                continue;
            }
            let back = depth / 2 + 1;
            s.shift(-nx * back, -ny * back);
            s.fixed = true;
            reached.push(border.axis(s.local()));
        }
        let extreme = if sign > 0 { reached.iter().max() } else { reached.iter().min() };
        if let Some(&d) = extreme {
            state.distance = d;
        }
        state.overlap = true;
        self.fixed_sampler_count = self.samplers().filter(|s| s.is_fixed()).count();
    }

    // ── Area ────────────────────────────────────────────────────────────────

    /// Closed border polygon in local coordinates: north, east reversed,
    /// south reversed, west.
    pub fn polygon(&self) -> Vec<(i32, i32)> {
        let line = |b: Border| self.borders[b.index()].local_positions();
        let mut ring = line(Border::North);
        ring.extend(line(Border::East).into_iter().rev());
        ring.extend(line(Border::South).into_iter().rev());
        ring.extend(line(Border::West));
        polygon::dedup_ring(&mut ring);
        ring
    }

    pub fn polygon_area(&self) -> f64 {
        polygon::shoelace_area(&self.polygon())
    }

    /// Count active pixels enclosed by the border polygon.
    ///
    /// Breadth-first fill over the border's bounding box, seeded from points
    /// stepped inward from the longest border. A cell counts when it is
    /// active and a ray cast from either of two origins just outside the
    /// south-west corner places it inside the polygon.
    pub fn active_area(&self, image: &ActivityMap) -> usize {
        const QUEUED: u8 = 1;
        const COUNTED: u8 = 2;

        let [north, south, east, west] = self.border_distances();
        let (rows, cols) = (north - south, east - west);
        if rows <= 0 || cols <= 0 {
            return 0;
        }
        let ring: Vec<(i32, i32)> = self
            .polygon()
            .into_iter()
            .map(|(lx, ly)| (lx + self.x, ly + self.y))
            .collect();
        let (ax, ay) = (self.x + west, self.y + south);
        let origins = [(ax - 1, ay), (ax, ay - 1)];

        let seed_border = Border::ALL
            .into_iter()
            .rev()
            .max_by_key(|b| self.borders[b.index()].samplers.len())
            .unwrap_or(Border::North);
        let span = match seed_border {
            Border::North | Border::South => rows,
            Border::East | Border::West => cols,
        };
        let (nx, ny) = seed_border.normal();
        let step = self.params.step.max(1);
        let seeds = &self.borders[seed_border.index()].samplers;
        let mut queue = VecDeque::new();
        if seeds.len() > 2 {
            for s in &seeds[1..seeds.len() - 1] {
                let (gx, gy) = s.global();
                for k in (step..span).step_by(step as usize) {
                    queue.push_back((gx - nx * k, gy - ny * k));
                }
            }
        }

        let index = |cx: i32, cy: i32| -> Option<usize> {
            let (r, c) = (cy - ay, cx - ax);
            (r >= 0 && c >= 0 && r < rows && c < cols).then(|| (r * cols + c) as usize)
        };
        let mut marks = vec![0u8; (rows * cols) as usize];
        let mut area = 0;
        while let Some((cx, cy)) = queue.pop_front() {
            let Some(idx) = index(cx, cy) else { continue };
            if marks[idx] == COUNTED || !image.is_active(cx, cy) {
                continue;
            }
            if !origins.iter().any(|&o| polygon::ray_cast(&ring, o, (cx, cy))) {
                continue;
            }
            marks[idx] = COUNTED;
            area += 1;
            for (dx, dy) in [(0, 1), (0, -1), (1, 0), (-1, 0)] {
                let (qx, qy) = (cx + dx, cy + dy);
                if let Some(q) = index(qx, qy) {
                    if marks[q] == 0 {
                        marks[q] = QUEUED;
                        queue.push_back((qx, qy));
                    }
                }
            }
        }
        area
    }

    /// Recompute and store the area with the requested method.
    pub fn compute_area(&mut self, image: &ActivityMap, method: AreaMethod) -> f64 {
        self.area = match method {
            AreaMethod::Polygon => self.polygon_area(),
            AreaMethod::ActivePixels => self.active_area(image) as f64,
        };
        self.area
    }
}

fn splice_end(samplers: &mut Vec<Sampler>, extension: Vec<Sampler>, at_start: bool) {
    if at_start {
        samplers.splice(0..0, extension);
    } else {
        samplers.extend(extension);
    }
}

#[derive(Debug, Default)]
struct Tally {
    active: usize,
    in_frame: usize,
    sum_x: i64,
    sum_y: i64,
}

impl Tally {
    fn score(&self) -> Option<f64> {
        (self.in_frame > 0).then(|| self.active as f64 / self.in_frame as f64)
    }
}
