//! Simulation controller: `Idle → Searching → Growing → Done`.
//!
//! Phase bookkeeping lives in [`SimulationState`], a plain value advanced by
//! pure transitions. The controller owns the director, runs one step at a
//! time and feeds the resulting leader counts back into the state.

use tracing::{debug, info, warn};

use crate::activity::ActivityMap;
use crate::config::SimulationConfig;
use crate::director::Director;
use crate::error::Result;
use crate::report::{GrowthStepTiming, RowReport, SearchStepTiming, SimulationReport};
use crate::stats::{KMeansTTest, RowStatistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Searching,
    Growing,
    Done,
}

/// What the controller should do after a search step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDecision {
    Continue,
    /// Leader count unchanged once: re-estimate the spacing and go on.
    Resummarize,
    /// Leader count unchanged twice in a row: leave the search phase.
    Stable,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationState {
    pub phase: Phase,
    pub search_steps_run: usize,
    pub growth_steps_run: usize,
    pub search_exhausted: bool,
    pub growth_exhausted: bool,
    /// Set after a first unchanged leader count, cleared by any change.
    pub re_evaluated: bool,
    pub leader_counts: Vec<usize>,
}

impl SimulationState {
    pub fn begin_search(mut self, leader_count: usize) -> Self {
        self.phase = Phase::Searching;
        self.leader_counts.push(leader_count);
        self
    }

    pub fn after_search_step(mut self, leader_count: usize) -> (Self, SearchDecision) {
        let unchanged = self.leader_counts.last() == Some(&leader_count);
        self.leader_counts.push(leader_count);
        self.search_steps_run += 1;
        let decision = match (unchanged, self.re_evaluated) {
            (false, _) => {
                self.re_evaluated = false;
                SearchDecision::Continue
            }
            (true, false) => {
                self.re_evaluated = true;
                SearchDecision::Resummarize
            }
            (true, true) => SearchDecision::Stable,
        };
        (self, decision)
    }

    pub fn begin_growth(mut self, search_exhausted: bool) -> Self {
        self.search_exhausted = search_exhausted;
        self.phase = Phase::Growing;
        self
    }

    /// Returns `true` once growth is over: no leaders left, or at least
    /// `stop_fraction` of them frozen.
    pub fn after_growth_step(mut self, leader_count: usize, fixed_count: usize, stop_fraction: f64) -> (Self, bool) {
        self.leader_counts.push(leader_count);
        self.growth_steps_run += 1;
        let done = leader_count == 0 || fixed_count as f64 / leader_count as f64 >= stop_fraction;
        (self, done)
    }

    pub fn finish(mut self, growth_exhausted: bool) -> Self {
        self.growth_exhausted = growth_exhausted;
        self.phase = Phase::Done;
        self
    }
}

pub struct SimulationController<'a> {
    image: &'a ActivityMap,
    director: Director,
    state: SimulationState,
    statistics: Box<dyn RowStatistics + Send + Sync>,
    search_timings: Vec<SearchStepTiming>,
    growth_timings: Vec<GrowthStepTiming>,
}

impl<'a> SimulationController<'a> {
    pub fn new(image: &'a ActivityMap, seeds_per_row: &[Vec<(i32, i32)>], config: SimulationConfig) -> Result<Self> {
        let director = Director::new(seeds_per_row, image, config)?;
        Ok(Self {
            image,
            director,
            state: SimulationState::default(),
            statistics: Box::new(KMeansTTest::default()),
            search_timings: Vec::new(),
            growth_timings: Vec::new(),
        })
    }

    /// Swap the statistics used for outlier-row pruning.
    pub fn with_statistics(mut self, statistics: Box<dyn RowStatistics + Send + Sync>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn director(&self) -> &Director {
        &self.director
    }

    fn config(&self) -> &SimulationConfig {
        self.director.config()
    }

    /// Prune and initialize the rows, then iterate search steps until the
    /// leader count is stable or the budget runs out.
    pub fn run_search(&mut self) {
        let image = self.image;
        let config = self.config().clone();
        info!(rows = self.director.rows().len(), leaders = self.director.leader_count(), "search phase started");

        if config.remove_outlier_rows {
            let removed = self.director.remove_outlier_rows(self.statistics.as_ref());
            if !removed.is_empty() {
                info!(?removed, "outlier rows removed");
            }
        }
        self.director.update_histograms();
        self.director.summarize_inter_plant_spacing();
        if config.extensive_init {
            self.director.extensive_init(image);
        } else if config.edge_exploration {
            self.director.edge_exploration(image);
        }
        self.director.update_histograms();

        self.state = std::mem::take(&mut self.state).begin_search(self.director.leader_count());
        let mut stable = false;
        for step in 0..config.search_steps {
            let timing = self.director.search_step(image);
            self.search_timings.push(timing);
            let (state, decision) = std::mem::take(&mut self.state).after_search_step(self.director.leader_count());
            self.state = state;
            debug!(step, leaders = self.director.leader_count(), ?decision, "search step done");
            match decision {
                SearchDecision::Continue => {}
                SearchDecision::Resummarize => {
                    self.director.summarize_inter_plant_spacing();
                }
                SearchDecision::Stable => {
                    stable = true;
                    break;
                }
            }
        }
        if !stable {
            warn!(steps = config.search_steps, "search budget exhausted before the leader count settled");
        }
        self.state = std::mem::take(&mut self.state).begin_growth(!stable);
        info!(
            steps = self.state.search_steps_run,
            leaders = self.director.leader_count(),
            spacing = self.director.spacing(),
            "search phase finished"
        );
    }

    /// Switch to perimeter sampling and grow borders until enough leaders
    /// are frozen or the budget runs out.
    pub fn run_growth(&mut self) {
        let image = self.image;
        let (steps, stop_fraction) = (self.config().growth_steps, self.config().growth_stop_fraction);
        info!(leaders = self.director.leader_count(), "growth phase started");

        self.director.switch_to_growth(image);
        let mut done = false;
        for _ in 0..steps {
            let timing = self.director.growth_step(image);
            self.growth_timings.push(timing);
            let (state, finished) = std::mem::take(&mut self.state).after_growth_step(
                self.director.leader_count(),
                self.director.fixed_leader_count(),
                stop_fraction,
            );
            self.state = state;
            if finished {
                done = true;
                break;
            }
        }
        if !done {
            warn!(
                steps,
                fixed = self.director.fixed_leader_count(),
                leaders = self.director.leader_count(),
                "growth budget exhausted before leaders froze"
            );
        }
        self.state = std::mem::take(&mut self.state).finish(!done);
        info!(steps = self.state.growth_steps_run, fixed = self.director.fixed_leader_count(), "growth phase finished");
    }

    /// Run both phases and return the final report.
    pub fn run(mut self) -> SimulationReport {
        self.run_search();
        self.run_growth();
        self.report()
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            inter_plant_spacing: self.director.spacing(),
            leader_counts: self.state.leader_counts.clone(),
            search_steps_run: self.state.search_steps_run,
            growth_steps_run: self.state.growth_steps_run,
            search_exhausted: self.state.search_exhausted,
            growth_exhausted: self.state.growth_exhausted,
            search_timings: self.search_timings.clone(),
            growth_timings: self.growth_timings.clone(),
            rows: self.director.rows().iter().map(RowReport::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_plants() -> ActivityMap {
        let mut image = ActivityMap::new(300, 300, 0).unwrap();
        image.fill_rect(90, 90, 110, 110, 255);
        image.fill_rect(90, 190, 110, 210, 255);
        image
    }

    fn config() -> SimulationConfig {
        SimulationConfig { half_size: 10, search_steps: 10, growth_steps: 10, ..SimulationConfig::default() }
    }

    #[test]
    fn search_transitions() {
        let state = SimulationState::default().begin_search(3);
        assert_eq!(state.phase, Phase::Searching);

        let (state, d) = state.after_search_step(4);
        assert_eq!(d, SearchDecision::Continue);
        let (state, d) = state.after_search_step(4);
        assert_eq!(d, SearchDecision::Resummarize);
        // A change clears the re-evaluation flag.
        let (state, d) = state.after_search_step(5);
        assert_eq!(d, SearchDecision::Continue);
        assert!(!state.re_evaluated);
        let (state, d) = state.after_search_step(5);
        assert_eq!(d, SearchDecision::Resummarize);
        let (state, d) = state.after_search_step(5);
        assert_eq!(d, SearchDecision::Stable);
        assert_eq!(state.search_steps_run, 5);
        assert_eq!(state.leader_counts, vec![3, 4, 4, 5, 5, 5]);
    }

    #[test]
    fn growth_transitions() {
        let state = SimulationState::default().begin_search(4).begin_growth(true);
        assert_eq!(state.phase, Phase::Growing);
        assert!(state.search_exhausted);

        let (state, done) = state.after_growth_step(4, 3, 1.0);
        assert!(!done);
        let (state, done) = state.after_growth_step(4, 4, 1.0);
        assert!(done);
        let (state, done) = state.after_growth_step(0, 0, 1.0);
        assert!(done);
        let state = state.finish(false);
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(state.growth_steps_run, 3);

        let (_, done) = SimulationState::default().after_growth_step(4, 3, 0.75);
        assert!(done);
    }

    #[test]
    fn stable_leader_count_ends_search_early() {
        let image = two_plants();
        let seeds = vec![vec![(100, 100), (100, 200)]];
        let mut controller = SimulationController::new(&image, &seeds, config()).unwrap();
        controller.run_search();

        let state = controller.state();
        assert_eq!(state.phase, Phase::Growing);
        assert_eq!(state.search_steps_run, 2);
        assert!(!state.search_exhausted);
        assert_eq!(state.leader_counts, vec![2, 2, 2]);
        assert_eq!(controller.director().spacing(), 100);
    }

    #[test]
    fn leader_on_bare_soil_is_destroyed() {
        let mut image = ActivityMap::new(300, 300, 0).unwrap();
        image.fill_rect(90, 90, 110, 110, 255);
        let seeds = vec![vec![(100, 100), (100, 250)]];
        let mut controller = SimulationController::new(&image, &seeds, config()).unwrap();
        controller.run_search();

        let rows = controller.director().rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        assert_eq!((rows[0].leaders()[0].x(), rows[0].leaders()[0].y()), (100, 100));
        assert_eq!(controller.state().leader_counts[..2], [2, 1]);
    }

    #[test]
    fn full_run_freezes_on_a_single_plant() {
        let mut image = ActivityMap::new(100, 100, 0).unwrap();
        image.fill_rect(40, 40, 60, 60, 255);
        let config = SimulationConfig { half_size: 20, growth_steps: 30, ..config() };
        let report = SimulationController::new(&image, &[vec![(50, 50)]], config).unwrap().run();

        assert!(!report.search_exhausted);
        assert!(!report.growth_exhausted);
        assert!(report.growth_steps_run < 30);
        assert_eq!(report.leader_count(), 1);
        let leader = &report.rows[0].leaders[0];
        assert!(leader.fixed);
        assert_eq!(leader.border_distances, [11, -11, 11, -11]);
        assert!(leader.area > 0.0);
        assert_eq!(report.search_timings.len(), report.search_steps_run);
        assert_eq!(report.growth_timings.len(), report.growth_steps_run);
        assert!(report.to_json_pretty().unwrap().contains("\"inter_plant_spacing\""));
    }

    #[test]
    fn statistics_can_be_swapped() {
        struct NeverDifferent;
        impl RowStatistics for NeverDifferent {
            fn cluster(&self, values: &[f64], _k: usize) -> Vec<usize> {
                (0..values.len()).map(|i| i % 2).collect()
            }
            fn means_differ(&self, _a: &[f64], _b: &[f64]) -> f64 {
                1.0
            }
        }
        let image = ActivityMap::new(400, 300, 0).unwrap();
        let seeds: Vec<_> = [50, 150, 160, 250].iter().map(|&x| vec![(x, 100)]).collect();
        let config = SimulationConfig { remove_outlier_rows: true, search_steps: 0, ..config() };
        let mut controller = SimulationController::new(&image, &seeds, config)
            .unwrap()
            .with_statistics(Box::new(NeverDifferent));
        controller.run_search();
        // Not significant: the squeezed row at 160 survives.
        assert_eq!(controller.director().rows().len(), 4);
        assert!(controller.state().search_exhausted);
    }
}
