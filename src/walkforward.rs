//! Walk-forward evaluation: a rolling train/test window slid across the time
//! axis, preserving temporal order.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Race;
use crate::error::BacktestError;
use crate::sim::{Replay, SimulationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardParams {
    pub train_period_days: i64,
    pub test_period_days: i64,
    pub step_days: i64,
}
impl Default for WalkForwardParams {
    fn default() -> Self {
        Self {
            train_period_days: 180,
            test_period_days: 30,
            step_days: 30,
        }
    }
}
impl WalkForwardParams {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.train_period_days <= 0 || self.test_period_days <= 0 || self.step_days <= 0 {
            anyhow::bail!("walk-forward periods must be positive");
        }
        Ok(())
    }
}

/// One test window's replay, tagged with its date ranges. Train windows are
/// half-open `[start, end)`, as are test windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowResult {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub result: SimulationResult,
}

pub struct WalkForward<'a> {
    replay: Replay<'a>,
    params: WalkForwardParams,
}
impl<'a> WalkForward<'a> {
    pub fn new(replay: Replay<'a>, params: WalkForwardParams) -> Self {
        Self { replay, params }
    }

    /// Slides the window across the race history. Train-window parameter
    /// optimisation is an extension point; the same strategy configuration is
    /// used for every window.
    pub fn run(&self, races: &[&Race]) -> Result<Vec<WindowResult>, BacktestError> {
        let mut order = races.to_vec();
        order.sort_by_key(|race| race.sort_key());
        let (Some(first), Some(last)) = (order.first(), order.last()) else {
            return Ok(vec![]);
        };
        let first_date = first.date();
        let last_date = last.date();

        let train = Duration::days(self.params.train_period_days);
        let test = Duration::days(self.params.test_period_days);
        let step = Duration::days(self.params.step_days);

        let mut windows = vec![];
        let mut cursor = first_date + train;
        while cursor + test <= last_date + Duration::days(1) {
            let test_end = cursor + test;
            let test_races: Vec<&Race> = order
                .iter()
                .copied()
                .filter(|race| race.date() >= cursor && race.date() < test_end)
                .collect();
            debug!(
                "window {cursor}..{test_end}: {} races",
                test_races.len()
            );
            let result = self.replay.run(&test_races)?;
            windows.push(WindowResult {
                train_start: cursor - train,
                train_end: cursor,
                test_start: cursor,
                test_end,
                result,
            });
            cursor = cursor + step;
        }
        Ok(windows)
    }
}
