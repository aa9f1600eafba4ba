//! Point probes anchored to a leader.

use serde::Serialize;

use crate::activity::ActivityMap;

/// A single probe. Its global position is the owning leader's anchor plus a
/// local offset; once `fixed`, neither part of the position changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sampler {
    local_x: i32,
    local_y: i32,
    global_x: i32,
    global_y: i32,
    pub(crate) fixed: bool,
    outside_frame: bool,
    active: bool,
}

impl Sampler {
    pub fn new(leader_x: i32, leader_y: i32, local_x: i32, local_y: i32, image: &ActivityMap) -> Self {
        let mut s = Self {
            local_x,
            local_y,
            global_x: leader_x + local_x,
            global_y: leader_y + local_y,
            fixed: false,
            outside_frame: false,
            active: false,
        };
        s.outside_frame = !image.contains(s.global_x, s.global_y);
        s
    }

    #[inline]
    pub fn local(&self) -> (i32, i32) {
        (self.local_x, self.local_y)
    }

    #[inline]
    pub fn global(&self) -> (i32, i32) {
        (self.global_x, self.global_y)
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    #[inline]
    pub fn is_outside_frame(&self) -> bool {
        self.outside_frame
    }

    /// Last observed activity.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Observe the image at the current global position.
    pub fn probe(&mut self, image: &ActivityMap) -> bool {
        self.outside_frame = !image.contains(self.global_x, self.global_y);
        self.active = !self.outside_frame && image.is_active(self.global_x, self.global_y);
        self.active
    }

    /// Growth (positive) or shrink (negative) evidence along `dir`.
    ///
    /// Counts the run of consecutive active cells at distances `1..=reach`
    /// ahead. If that run is empty, counts the run of consecutive inactive
    /// cells at distances `1..=shrink_reach` behind and negates it. An
    /// out-of-frame cell ends either run.
    pub fn exploration_score(&self, image: &ActivityMap, dir: (i32, i32), reach: i32, shrink_reach: i32) -> i32 {
        if self.outside_frame {
            return 0;
        }
        let (dx, dy) = dir;
        let grow = (1..=reach)
            .take_while(|&k| image.is_active(self.global_x + k * dx, self.global_y + k * dy))
            .count() as i32;
        if grow > 0 {
            return grow;
        }
        let shrink = (1..=shrink_reach)
            .take_while(|&k| image.is_inactive(self.global_x - k * dx, self.global_y - k * dy))
            .count() as i32;
        -shrink
    }

    /// Follow the owning leader to a new anchor.
    pub fn move_with(&mut self, leader_x: i32, leader_y: i32, image: &ActivityMap) {
        if !self.fixed {
            self.global_x = leader_x + self.local_x;
            self.global_y = leader_y + self.local_y;
        }
        self.outside_frame = !image.contains(self.global_x, self.global_y);
    }

    /// Shift local and global positions together. No-op once fixed.
    pub fn apply_offset(&mut self, dx: i32, dy: i32) {
        if !self.fixed {
            self.shift(dx, dy);
        }
    }

    /// Shift regardless of the fixed flag. Only overlap resolution may move
    /// a frozen sampler.
    pub(crate) fn shift(&mut self, dx: i32, dy: i32) {
        self.local_x += dx;
        self.local_y += dy;
        self.global_x += dx;
        self.global_y += dy;
    }
}
