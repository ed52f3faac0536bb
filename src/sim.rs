//! The chronological single-pass replay: filter, generate, size, deduct,
//! settle, credit, record, in exactly that order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::bankroll::{Bankroll, Constraints, Staking};
use crate::data::Race;
use crate::error::BacktestError;
use crate::filter::{FilterConfig, Gate};
use crate::metrics::{self, SimulationMetrics};
use crate::settle::{self, Settlement};
use crate::strategy::Strategy;
use crate::ticket::{BetRecord, Ticket};

const DAYS_PER_YEAR: f64 = 365.25;

/// Cooperative cancellation flag, checked between races and between Monte
/// Carlo trials, never inside a ticket loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}
impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every race was replayed.
    Completed,
    /// The fund fell to the stop-loss floor.
    StopLoss,
    /// The fund could no longer cover a minimum bet.
    FundsExhausted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub initial_fund: f64,
    /// The fund after each settled ticket, prepended by the initial fund.
    pub fund_history: Vec<f64>,
    pub bet_history: Vec<BetRecord>,
    pub metrics: SimulationMetrics,
    pub stop: StopReason,
    pub cancelled: bool,
}

pub struct Replay<'a> {
    strategy: &'a Strategy,
    filter: &'a FilterConfig,
    staking: Staking,
    constraints: Constraints,
    initial_fund: f64,
    var_alpha: f64,
    cancel: Option<CancelToken>,
}
impl<'a> Replay<'a> {
    pub fn new(
        strategy: &'a Strategy,
        filter: &'a FilterConfig,
        staking: Staking,
        constraints: Constraints,
        initial_fund: f64,
    ) -> Self {
        Self {
            strategy,
            filter,
            staking,
            constraints,
            initial_fund,
            var_alpha: 0.95,
            cancel: None,
        }
    }

    pub fn initial_fund(&self) -> f64 {
        self.initial_fund
    }

    pub fn with_var_alpha(mut self, alpha: f64) -> Self {
        self.var_alpha = alpha;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Replays the races in chronological order, settling each ticket against
    /// the realised result.
    pub fn run(&self, races: &[&Race]) -> Result<SimulationResult, BacktestError> {
        self.run_with(races, &mut settle::evaluate)
    }

    /// Replays with a caller-supplied settlement function; the probability
    /// mode of the Monte Carlo driver substitutes synthetic outcomes here.
    pub(crate) fn run_with(
        &self,
        races: &[&Race],
        settle: &mut dyn FnMut(&Ticket, &Race) -> Result<Settlement, BacktestError>,
    ) -> Result<SimulationResult, BacktestError> {
        let mut order = races.to_vec();
        order.sort_by_key(|race| race.sort_key());

        let mut bankroll = Bankroll::new(
            self.staking.clone(),
            self.constraints.clone(),
            self.initial_fund,
        );
        let mut fund_history = vec![self.initial_fund];
        let mut bet_history: Vec<BetRecord> = vec![];
        let stop_floor = self.initial_fund * self.constraints.stop_loss_threshold;
        let mut stop = StopReason::Completed;
        let mut current_day: Option<NaiveDate> = None;
        let mut day_spent = 0u64;

        'races: for race in &order {
            if self
                .cancel
                .as_ref()
                .map_or(false, CancelToken::is_cancelled)
            {
                stop = StopReason::Cancelled;
                break;
            }
            if current_day != Some(race.date()) {
                current_day = Some(race.date());
                day_spent = 0;
            }
            let tier_multiplier = match self.filter.gate(race) {
                Gate::Reject { reason } => {
                    debug!("skipping {}: {reason}", race.id());
                    continue;
                }
                Gate::Accept { tier_multiplier } => tier_multiplier,
            };

            let mut race_spent = 0u64;
            for candidate in self.strategy.generate_tickets(race) {
                let stake = bankroll.size(&candidate, tier_multiplier, race_spent, day_spent);
                if stake == 0 {
                    continue;
                }
                let mut ticket = candidate;
                ticket.amount = stake;

                let fund_before = bankroll.fund();
                bankroll.deduct(stake);
                race_spent += stake;
                day_spent += stake;

                let settlement = settle(&ticket, race)?;
                bankroll.credit(settlement.payout);
                let fund_after = bankroll.fund();

                bet_history.push(BetRecord {
                    race_id: race.id(),
                    race_date: race.date(),
                    ticket,
                    hit: settlement.hit,
                    payout: settlement.payout,
                    fund_before,
                    fund_after,
                });
                fund_history.push(fund_after);

                if fund_after < self.constraints.min_bet as f64 {
                    stop = StopReason::FundsExhausted;
                    break 'races;
                }
                if self.constraints.stop_loss_threshold > 0.0 && fund_after <= stop_floor {
                    stop = StopReason::StopLoss;
                    break 'races;
                }
            }
        }

        let metrics = metrics::compute(
            self.initial_fund,
            &fund_history,
            &bet_history,
            elapsed_years(&order),
            self.var_alpha,
        );
        Ok(SimulationResult {
            initial_fund: self.initial_fund,
            fund_history,
            bet_history,
            metrics,
            stop,
            cancelled: stop == StopReason::Cancelled,
        })
    }
}

fn elapsed_years(order: &[&Race]) -> f64 {
    match (order.first(), order.last()) {
        (Some(first), Some(last)) => {
            (last.date() - first.date()).num_days() as f64 / DAYS_PER_YEAR
        }
        _ => 0.0,
    }
}
