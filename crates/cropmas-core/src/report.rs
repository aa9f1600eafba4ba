//! Plain records describing a finished simulation, ready for serialization.

use serde::Serialize;

use crate::leader::{Border, Leader};
use crate::row::Row;

/// Seconds spent in each pass of one search step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchStepTiming {
    pub consensus: f64,
    pub coerce_x: f64,
    pub coerce_y: f64,
    pub move_leaders: f64,
    pub fuse_or_fill: f64,
    pub destroy: f64,
    pub proximity: f64,
    pub spacing: f64,
}

impl SearchStepTiming {
    pub fn total(&self) -> f64 {
        self.consensus
            + self.coerce_x
            + self.coerce_y
            + self.move_leaders
            + self.fuse_or_fill
            + self.destroy
            + self.proximity
            + self.spacing
    }
}

/// Seconds spent in each pass of one growth step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GrowthStepTiming {
    pub growth: f64,
    pub overlap: f64,
    pub area: f64,
}

impl GrowthStepTiming {
    pub fn total(&self) -> f64 {
        self.growth + self.overlap + self.area
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BorderReport {
    pub north: Vec<(i32, i32)>,
    pub south: Vec<(i32, i32)>,
    pub east: Vec<(i32, i32)>,
    pub west: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderReport {
    pub x: i32,
    pub y: i32,
    pub position_history: Vec<(i32, i32)>,
    pub field_position_history: Vec<(i32, i32)>,
    /// Local sampler coordinates per border.
    pub borders: BorderReport,
    /// North, south, east, west.
    pub border_distances: [i32; 4],
    pub area: f64,
    pub decision_score: f64,
    pub fixed: bool,
    pub used_as_filling_bound: bool,
}

impl From<&Leader> for LeaderReport {
    fn from(leader: &Leader) -> Self {
        let line = |b: Border| leader.border(b).local_positions();
        Self {
            x: leader.x(),
            y: leader.y(),
            position_history: leader.position_history().to_vec(),
            field_position_history: leader.field_position_history().to_vec(),
            borders: BorderReport {
                north: line(Border::North),
                south: line(Border::South),
                east: line(Border::East),
                west: line(Border::West),
            },
            border_distances: leader.border_distances(),
            area: leader.area(),
            decision_score: leader.decision_score(),
            fixed: leader.is_fixed(),
            used_as_filling_bound: leader.used_as_filling_bound(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    pub row_mean_x: i32,
    pub leader_count: usize,
    pub positions: Vec<(i32, i32)>,
    pub leaders: Vec<LeaderReport>,
}

impl From<&Row> for RowReport {
    fn from(row: &Row) -> Self {
        Self {
            row_mean_x: row.row_mean_x(),
            leader_count: row.len(),
            positions: row.leaders().iter().map(|l| (l.x(), l.y())).collect(),
            leaders: row.leaders().iter().map(LeaderReport::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Global inter-plant spacing estimate, in pixels.
    pub inter_plant_spacing: i32,
    /// Total leader count after initialization and after every step.
    pub leader_counts: Vec<usize>,
    pub search_steps_run: usize,
    pub growth_steps_run: usize,
    pub search_exhausted: bool,
    pub growth_exhausted: bool,
    pub search_timings: Vec<SearchStepTiming>,
    pub growth_timings: Vec<GrowthStepTiming>,
    pub rows: Vec<RowReport>,
}

impl SimulationReport {
    pub fn leader_count(&self) -> usize {
        self.rows.iter().map(|r| r.leader_count).sum()
    }

    /// Anchor positions of every leader, row by row.
    pub fn plant_positions(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.rows.iter().flat_map(|r| r.positions.iter().copied())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
