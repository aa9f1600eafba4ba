//! Per-border state of a leader's perimeter and the scoring rules that move
//! its samplers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activity::ActivityMap;
use crate::sampler::Sampler;

/// One side of a leader's quadrilateral region.
///
/// North and south lines run west→east; east and west lines run south→north.
/// "North" is the direction of increasing image row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Border {
    North,
    South,
    East,
    West,
}

impl Border {
    pub const ALL: [Border; 4] = [Border::North, Border::South, Border::East, Border::West];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Outward unit normal `(dx, dy)`.
    #[inline]
    pub fn normal(self) -> (i32, i32) {
        match self {
            Border::North => (0, 1),
            Border::South => (0, -1),
            Border::East => (1, 0),
            Border::West => (-1, 0),
        }
    }

    /// +1 when the border's extent grows with its axis coordinate.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Border::North | Border::East => 1,
            Border::South | Border::West => -1,
        }
    }

    #[inline]
    pub fn opposite(self) -> Border {
        match self {
            Border::North => Border::South,
            Border::South => Border::North,
            Border::East => Border::West,
            Border::West => Border::East,
        }
    }

    /// The coordinate a border moves along: y for north/south, x for east/west.
    #[inline]
    pub fn axis(self, (x, y): (i32, i32)) -> i32 {
        match self {
            Border::North | Border::South => y,
            Border::East | Border::West => x,
        }
    }
}

/// Samplers and bookkeeping for one border.
#[derive(Debug, Clone, Default)]
pub struct BorderState {
    pub(crate) samplers: Vec<Sampler>,
    /// Extremal local axis coordinate reached by the border.
    pub(crate) distance: i32,
    /// Set once the border has retreated from a neighbouring leader.
    pub(crate) overlap: bool,
    /// Movement scores of the last growth step, after clamping.
    pub(crate) end_scores: Vec<i32>,
}

impl BorderState {
    pub fn samplers(&self) -> &[Sampler] {
        &self.samplers
    }

    pub fn distance(&self) -> i32 {
        self.distance
    }

    pub fn has_overlap(&self) -> bool {
        self.overlap
    }

    pub fn local_positions(&self) -> Vec<(i32, i32)> {
        self.samplers.iter().map(Sampler::local).collect()
    }

    /// Recompute the extremal distance from the samplers actually present.
    pub(crate) fn refresh_distance(&mut self, border: Border) {
        let coords = self.samplers.iter().map(|s| border.axis(s.local()));
        let extreme = if border.sign() > 0 { coords.max() } else { coords.min() };
        if let Some(d) = extreme {
            self.distance = d;
        }
    }

    /// One independent movement pass along the border's outward normal.
    ///
    /// Samplers with neither own nor propagated evidence freeze; all others
    /// move by their clamped combined score. Returns how many samplers froze.
    pub(crate) fn advance(&mut self, border: Border, image: &ActivityMap, reach: i32, shrink_reach: i32) -> usize {
        let dir = border.normal();
        let mut scores: Vec<i32> = self
            .samplers
            .iter()
            .map(|s| s.exploration_score(image, dir, reach, shrink_reach))
            .collect();

        pull_toward_anchors(&mut self.samplers, &mut scores, border, image, reach, shrink_reach);
        let propagated = propagate_scores(&scores);

        let mut frozen = 0;
        let mut end_scores = Vec::with_capacity(scores.len());
        for (i, s) in self.samplers.iter_mut().enumerate() {
            let combined = scores[i] + propagated[i];
            if scores[i] == 0 && propagated[i] == 0 {
                if !s.fixed {
                    s.fixed = true;
                    frozen += 1;
                }
                end_scores.push(combined);
                continue;
            }
            let step = clamp_movement(border, s.local(), combined, self.distance, self.overlap);
            s.apply_offset(dir.0 * step, dir.1 * step);
            end_scores.push(step);
        }
        self.end_scores = end_scores;
        frozen
    }
}

/// Spread positive scores to neighbours: a sampler scoring `s > 0` adds
/// `s - j` to the samplers `j` positions away on both sides, for `j < s`.
pub fn propagate_scores(scores: &[i32]) -> Vec<i32> {
    let n = scores.len();
    let mut out = vec![0; n];
    for (i, &score) in scores.iter().enumerate() {
        if score <= 0 {
            continue;
        }
        for j in 1..score as usize {
            let bonus = score - j as i32;
            if i + j < n {
                out[i + j] += bonus;
            }
            if j <= i {
                out[i - j] += bonus;
            }
        }
    }
    out
}

/// Force maximal-shrink neighbours of an anchored sampler (fixed, or on an
/// active cell) to move toward the anchor's level instead of collapsing.
fn pull_toward_anchors(
    samplers: &mut [Sampler],
    scores: &mut [i32],
    border: Border,
    image: &ActivityMap,
    reach: i32,
    shrink_reach: i32,
) {
    let n = samplers.len();
    for i in 0..n {
        let anchored = samplers[i].is_fixed() || samplers[i].probe(image);
        if !anchored {
            continue;
        }
        let level = border.axis(samplers[i].global());
        for k in [i.wrapping_sub(1), i + 1] {
            if k >= n || scores[k] != -shrink_reach {
                continue;
            }
            let towards = level - border.axis(samplers[k].global());
            if towards > 0 {
                scores[k] = border.sign() * reach;
            } else if towards < 0 {
                scores[k] = -border.sign() * reach;
            }
        }
    }
}

/// Clamp a movement score for a sampler at local position `local`.
///
/// With an overlap flag the sampler may not pass the recorded border
/// distance. Independently, a sampler may never reach or cross the leader's
/// own centre line; such a move is replaced by no move at all.
pub fn clamp_movement(border: Border, local: (i32, i32), score: i32, distance: i32, overlap: bool) -> i32 {
    let sign = border.sign();
    let coord = border.axis(local);
    let mut score = score;
    if overlap {
        let excess = sign * (coord + sign * score - distance);
        if excess > 0 {
            score -= excess;
        }
    }
    if sign * (coord + sign * score) <= 0 {
        debug!(?border, coord, score, "move past leader centre clamped to zero");
        score = 0;
    }
    score
}
