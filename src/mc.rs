//! Monte Carlo drivers wrapping the single-pass replay: bootstrap resampling
//! and probability-based synthetic settlement.

use std::hash::Hasher;

use rayon::prelude::*;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tinyrand::{Probability, Rand, Seeded, StdRand};
use tracing::debug;

use crate::data::Race;
use crate::error::BacktestError;
use crate::metrics::{self, MonteCarloSummary};
use crate::settle::Settlement;
use crate::sim::{CancelToken, Replay};
use crate::ticket::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McMethod {
    Bootstrap,
    ProbabilityBased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloResult {
    pub num_trials: usize,
    pub seed: u64,
    /// Final fund per trial, in trial order. Identical across runs and across
    /// degrees of parallelism for the same inputs and seed.
    pub final_funds: Vec<f64>,
    pub summary: MonteCarloSummary,
    pub histories: Option<Vec<Vec<f64>>>,
    pub cancelled: bool,
}

/// Runs `num_trials` independent replays. Each trial derives its own RNG from
/// the master seed, so worker scheduling cannot perturb the draws.
pub struct MonteCarlo<'a> {
    replay: Replay<'a>,
    num_trials: usize,
    seed: u64,
    keep_histories: bool,
    target_fund: Option<f64>,
    cancel: Option<CancelToken>,
}
impl<'a> MonteCarlo<'a> {
    pub fn new(replay: Replay<'a>, num_trials: usize, seed: u64) -> Self {
        Self {
            replay,
            num_trials,
            seed,
            keep_histories: false,
            target_fund: None,
            cancel: None,
        }
    }

    pub fn with_histories(mut self) -> Self {
        self.keep_histories = true;
        self
    }

    pub fn with_target_fund(mut self, target_fund: f64) -> Self {
        self.target_fund = Some(target_fund);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// On each trial, draws `|races|` races with replacement and replays the
    /// resample. Resampling targets the empirical distribution of per-race
    /// outcomes, not a time series.
    pub fn run_bootstrap(&self, races: &[&Race]) -> Result<MonteCarloResult, BacktestError> {
        self.run_trials(|trial| {
            let mut rand = StdRand::seed(child_seed(self.seed, trial));
            let resample: Vec<&Race> = (0..races.len())
                .map(|_| races[random_index(&mut rand, races.len())])
                .collect();
            self.replay.run(&resample)
        })
    }

    /// Replays the races in original order, substituting a synthetic hit/miss
    /// drawn with the estimated probability for each ticket. The estimator is
    /// pluggable; this driver fixes only its contract.
    pub fn run_probability(
        &self,
        races: &[&Race],
        estimator: &(impl Fn(&Ticket, &Race) -> f64 + Sync),
    ) -> Result<MonteCarloResult, BacktestError> {
        self.run_trials(|trial| {
            let mut rand = StdRand::seed(child_seed(self.seed, trial));
            let mut settle = |ticket: &Ticket, race: &Race| -> Result<Settlement, BacktestError> {
                let p = estimator(ticket, race).clamp(0.0, 1.0);
                let hit = rand.next_bool(Probability::new(p));
                Ok(Settlement {
                    hit,
                    payout: if hit {
                        (ticket.amount as f64 * ticket.odds).trunc() as u64
                    } else {
                        0
                    },
                })
            };
            self.replay.run_with(races, &mut settle)
        })
    }

    fn run_trials(
        &self,
        trial: impl Fn(u64) -> Result<crate::sim::SimulationResult, BacktestError> + Sync,
    ) -> Result<MonteCarloResult, BacktestError> {
        let outcomes: Result<Vec<_>, BacktestError> = (0..self.num_trials as u64)
            .into_par_iter()
            .map(|index| {
                if self
                    .cancel
                    .as_ref()
                    .map_or(false, CancelToken::is_cancelled)
                {
                    return Ok(None);
                }
                trial(index).map(Some)
            })
            .collect();
        let outcomes = outcomes?;

        let cancelled = outcomes.iter().any(Option::is_none);
        let completed: Vec<_> = outcomes.into_iter().flatten().collect();
        debug!(
            "{} of {} trials completed",
            completed.len(),
            self.num_trials
        );
        let final_funds: Vec<f64> = completed
            .iter()
            .map(|result| *result.fund_history.last().unwrap_or(&result.initial_fund))
            .collect();
        let summary = metrics::summarise_trials(
            &final_funds,
            self.replay.initial_fund(),
            self.target_fund,
        );
        Ok(MonteCarloResult {
            num_trials: self.num_trials,
            seed: self.seed,
            final_funds,
            summary,
            histories: self
                .keep_histories
                .then(|| completed.into_iter().map(|result| result.fund_history).collect()),
            cancelled,
        })
    }
}

/// Deterministic per-trial seed, independent of worker scheduling.
fn child_seed(master_seed: u64, trial: u64) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_u64(master_seed);
    hasher.write_u64(trial);
    hasher.finish()
}

#[inline(always)]
fn random_index(rand: &mut impl Rand, bound: usize) -> usize {
    let random = rand.next_u64() as f64 / u64::MAX as f64;
    ((random * bound as f64) as usize).min(bound - 1)
}

/// The implied win probability already used by Kelly sizing; serves as the
/// default estimator for probability-based trials.
pub fn implied_probability(ticket: &Ticket, _race: &Race) -> f64 {
    (ticket.expected_value / ticket.odds).clamp(0.01, 0.99)
}
