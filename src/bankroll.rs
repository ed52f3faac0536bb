//! Stake sizing under global constraints.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BacktestError;
use crate::ticket::{Ticket, BET_UNIT};

const KELLY_PROB_FLOOR: f64 = 0.01;
const KELLY_PROB_CEIL: f64 = 0.99;

#[derive(Debug, Clone, PartialEq)]
pub enum Staking {
    Fixed { bet_amount: u64 },
    Percentage { bet_percentage: f64 },
    Kelly { kelly_fraction: f64 },
}

/// A staking method as it appears in configuration: a name plus a free-form
/// params record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingSpec {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FixedParams {
    bet_amount: u64,
}

#[derive(Debug, Deserialize)]
struct PercentageParams {
    bet_percentage: f64,
}

#[derive(Debug, Deserialize)]
struct KellyParams {
    kelly_fraction: f64,
}

impl Staking {
    pub const KNOWN: [&'static str; 3] = ["fixed", "percentage", "kelly"];

    pub fn from_spec(spec: &StakingSpec) -> Result<Self, BacktestError> {
        match spec.method.as_str() {
            "fixed" => {
                let params: FixedParams = staking_params(spec)?;
                Ok(Staking::Fixed {
                    bet_amount: params.bet_amount,
                })
            }
            "percentage" => {
                let params: PercentageParams = staking_params(spec)?;
                Ok(Staking::Percentage {
                    bet_percentage: params.bet_percentage,
                })
            }
            "kelly" => {
                let params: KellyParams = staking_params(spec)?;
                Ok(Staking::Kelly {
                    kelly_fraction: params.kelly_fraction,
                })
            }
            other => Err(BacktestError::BankrollUnknown {
                name: other.to_string(),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self {
            Staking::Fixed { bet_amount } => {
                if *bet_amount == 0 {
                    anyhow::bail!("fixed bet amount cannot be zero");
                }
            }
            Staking::Percentage { bet_percentage } => {
                if !(0.0..=1.0).contains(bet_percentage) || *bet_percentage == 0.0 {
                    anyhow::bail!(
                        "bet percentage must lie in (0, 1], got {bet_percentage}"
                    );
                }
            }
            Staking::Kelly { kelly_fraction } => {
                if !(0.0..=1.0).contains(kelly_fraction) || *kelly_fraction == 0.0 {
                    anyhow::bail!(
                        "kelly fraction must lie in (0, 1], got {kelly_fraction}"
                    );
                }
            }
        }
        Ok(())
    }
}

fn staking_params<P: DeserializeOwned>(spec: &StakingSpec) -> Result<P, BacktestError> {
    serde_json::from_value(spec.params.clone()).map_err(|err| {
        BacktestError::BankrollParamInvalid {
            reason: format!("{}: {err}", spec.method),
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub min_bet: u64,
    pub max_bet_per_ticket: u64,
    pub max_bet_per_race: u64,
    pub max_bet_per_day: u64,
    pub stop_loss_threshold: f64,
}
impl Default for Constraints {
    fn default() -> Self {
        Self {
            min_bet: BET_UNIT,
            max_bet_per_ticket: u64::MAX,
            max_bet_per_race: u64::MAX,
            max_bet_per_day: u64::MAX,
            stop_loss_threshold: 0.0,
        }
    }
}
impl Constraints {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.min_bet < BET_UNIT {
            anyhow::bail!("minimum bet cannot be below {BET_UNIT}");
        }
        if !(0.0..1.0).contains(&self.stop_loss_threshold) {
            anyhow::bail!(
                "stop-loss threshold must lie in [0, 1), got {}",
                self.stop_loss_threshold
            );
        }
        Ok(())
    }
}

/// Sizes tickets against the current fund. Stateless apart from the fund
/// itself; per-race and per-day spend ledgers are owned by the replay and
/// passed in.
#[derive(Debug, Clone)]
pub struct Bankroll {
    staking: Staking,
    constraints: Constraints,
    fund: f64,
}
impl Bankroll {
    pub fn new(staking: Staking, constraints: Constraints, initial_fund: f64) -> Self {
        Self {
            staking,
            constraints,
            fund: initial_fund,
        }
    }

    pub fn fund(&self) -> f64 {
        self.fund
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn deduct(&mut self, stake: u64) {
        self.fund -= stake as f64;
    }

    pub fn credit(&mut self, payout: u64) {
        self.fund += payout as f64;
    }

    /// Computes the stake for one candidate ticket; `0` means skip. The
    /// composite weight rides on the ticket itself; the tier multiplier comes
    /// from the race filter.
    pub fn size(&self, ticket: &Ticket, tier_multiplier: f64, race_spent: u64, day_spent: u64) -> u64 {
        let base = match &self.staking {
            Staking::Fixed { bet_amount } => *bet_amount as f64,
            Staking::Percentage { bet_percentage } => self.fund * bet_percentage,
            Staking::Kelly { kelly_fraction } => {
                let Some(kelly) = kelly_stake_fraction(ticket.odds, ticket.expected_value) else {
                    return 0;
                };
                self.fund * kelly_fraction * kelly
            }
        };

        let scaled = base * ticket.weight * tier_multiplier;
        if !scaled.is_finite() || scaled <= 0.0 {
            return 0;
        }
        let mut stake = floor_to_unit(scaled as u64);
        stake = stake.min(self.constraints.max_bet_per_ticket);
        stake = stake.min(self.constraints.max_bet_per_race.saturating_sub(race_spent));
        stake = stake.min(self.constraints.max_bet_per_day.saturating_sub(day_spent));
        stake = stake.min(self.fund.max(0.0) as u64);
        stake = floor_to_unit(stake);
        if stake < self.constraints.min_bet {
            debug!(
                "sized {} ticket to {stake} yen, under the {} minimum; skipping",
                ticket.kind, self.constraints.min_bet
            );
            return 0;
        }
        stake
    }
}

/// The fraction of the fund the full Kelly bet would stake, or `None` when
/// the edge does not justify a bet.
fn kelly_stake_fraction(odds: f64, expected_value: f64) -> Option<f64> {
    let b = odds - 1.0;
    if b <= 0.0 {
        return None;
    }
    let p = (expected_value / odds).clamp(KELLY_PROB_FLOOR, KELLY_PROB_CEIL);
    let fraction = (p * b - (1.0 - p)) / b;
    if fraction <= 0.0 {
        None
    } else {
        Some(fraction)
    }
}

fn floor_to_unit(stake: u64) -> u64 {
    stake / BET_UNIT * BET_UNIT
}
