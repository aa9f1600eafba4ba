//! Multi-agent plant localization and segmentation over a binary activity
//! image of a crop field.
//!
//! Seeds predicted along crop rows become leaders. A search phase moves,
//! fuses, fills and destroys leaders until the row topology settles; a
//! growth phase then fits four borders around each plant.

pub mod activity;
pub mod config;
pub mod director;
pub mod error;
pub mod leader;
pub mod report;
pub mod row;
pub mod sampler;
pub mod simulation;
pub mod stats;

pub use activity::ActivityMap;
pub use config::{AreaMethod, LeaderParams, SimulationConfig};
pub use director::Director;
pub use error::{MasError, Result};
pub use leader::{Border, Leader};
pub use report::SimulationReport;
pub use row::Row;
pub use sampler::Sampler;
pub use simulation::{Phase, SimulationController, SimulationState};
pub use stats::{KMeansTTest, RowStatistics};
