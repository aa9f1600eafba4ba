//! Simulation parameters.
//!
//! `SimulationConfig` is the user-facing knob set (JSON-friendly, every field
//! defaulted). `LeaderParams` is the subset each leader needs at construction.

use serde::{Deserialize, Serialize};

use crate::error::{MasError, Result};

/// How a leader's area is measured at the end of each growth step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AreaMethod {
    /// Shoelace area of the border polygon, in square pixels.
    #[default]
    Polygon,
    /// Count of active pixels enclosed by the border polygon.
    ActivePixels,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Distance from a leader anchor to its outermost sampler layer, in pixels.
    pub half_size: i32,
    /// Distance between two consecutive samplers, in pixels.
    pub step: i32,
    /// How far (in pixels) a border sampler looks outward for active cells.
    pub exploration_reach: i32,
    /// How far (in pixels) a border sampler looks inward for inactive cells.
    pub shrink_reach: i32,
    /// Fraction of the reference spacing under which two leaders fuse.
    pub fuse_factor: f64,
    /// Fraction of the reference spacing above which a gap gets filled.
    pub fill_factor: f64,
    /// Step budget of the search phase.
    pub search_steps: usize,
    /// Step budget of the growth phase.
    pub growth_steps: usize,
    /// Offset added to anchor positions to express them in field coordinates.
    pub field_offset: [i32; 2],
    /// Clamp minority-side active points onto the row mean X.
    pub coerce_x: bool,
    /// Replace minority-direction vertical moves by the mean majority move.
    pub coerce_y: bool,
    /// Run the clustering + significance test on inter-row spacing first.
    pub remove_outlier_rows: bool,
    /// Patrol the row ends beyond the first and last seeds.
    pub edge_exploration: bool,
    /// Replace seeded leaders by a regular patrol covering each whole row.
    pub extensive_init: bool,
    pub area_method: AreaMethod,
    /// Growth stops once this fraction of leaders is frozen.
    pub growth_stop_fraction: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            half_size: 50,
            step: 5,
            exploration_reach: 4,
            shrink_reach: 2,
            fuse_factor: 0.5,
            fill_factor: 1.5,
            search_steps: 10,
            growth_steps: 10,
            field_offset: [0, 0],
            coerce_x: false,
            coerce_y: false,
            remove_outlier_rows: false,
            edge_exploration: false,
            extensive_init: false,
            area_method: AreaMethod::Polygon,
            growth_stop_fraction: 1.0,
        }
    }
}

impl SimulationConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| MasError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(MasError::InvalidConfig(msg));
        if self.half_size <= 0 {
            return fail(format!("half_size must be positive, got {}", self.half_size));
        }
        if self.step <= 0 {
            return fail(format!("step must be positive, got {}", self.step));
        }
        if self.exploration_reach <= 0 || self.shrink_reach <= 0 {
            return fail(format!(
                "exploration/shrink reach must be positive, got {}/{}",
                self.exploration_reach, self.shrink_reach
            ));
        }
        if !(self.fuse_factor > 0.0) || !(self.fill_factor > 0.0) {
            return fail(format!(
                "fuse/fill factors must be positive, got {}/{}",
                self.fuse_factor, self.fill_factor
            ));
        }
        if self.fuse_factor >= self.fill_factor {
            return fail(format!(
                "fuse_factor ({}) must be below fill_factor ({})",
                self.fuse_factor, self.fill_factor
            ));
        }
        if !(self.growth_stop_fraction > 0.0 && self.growth_stop_fraction <= 1.0) {
            return fail(format!(
                "growth_stop_fraction must lie in (0, 1], got {}",
                self.growth_stop_fraction
            ));
        }
        Ok(())
    }

    pub fn leader_params(&self) -> LeaderParams {
        LeaderParams {
            half_size: self.half_size,
            step: self.step,
            exploration_reach: self.exploration_reach,
            shrink_reach: self.shrink_reach,
            field_offset: self.field_offset,
        }
    }
}

/// Construction parameters shared by every leader of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderParams {
    pub half_size: i32,
    pub step: i32,
    pub exploration_reach: i32,
    pub shrink_reach: i32,
    pub field_offset: [i32; 2],
}

impl Default for LeaderParams {
    fn default() -> Self {
        SimulationConfig::default().leader_params()
    }
}
