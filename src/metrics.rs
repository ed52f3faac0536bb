//! Risk/return metrics over fund and bet histories, the Monte Carlo summary,
//! and the Go/No-Go judgement.

use serde::Serialize;

use crate::ticket::BetRecord;

/// A trial "goes bankrupt" when it finishes below this share of the initial
/// fund.
pub const BANKRUPTCY_RATIO: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationMetrics {
    pub total_bets: usize,
    pub hits: usize,
    pub hit_rate: f64,
    pub total_invested: u64,
    pub total_payout: u64,
    pub roi: f64,
    pub recovery_rate: f64,
    pub final_fund: f64,
    pub cagr: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub sharpe: f64,
    pub sortino: f64,
    pub var: f64,
    pub cvar: f64,
    pub max_consecutive_losses: usize,
    pub estimated_odds_tickets: usize,
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self {
            total_bets: 0,
            hits: 0,
            hit_rate: 0.0,
            total_invested: 0,
            total_payout: 0,
            roi: 0.0,
            recovery_rate: 0.0,
            final_fund: 0.0,
            cagr: 0.0,
            max_drawdown: 0.0,
            max_drawdown_duration: 0,
            sharpe: 0.0,
            sortino: 0.0,
            var: 0.0,
            cvar: 0.0,
            max_consecutive_losses: 0,
            estimated_odds_tickets: 0,
        }
    }
}

/// Derives the full metric set from one replay's histories. `years` is the
/// elapsed span of the replayed races; `alpha` the VaR confidence level.
pub fn compute(
    initial_fund: f64,
    fund_history: &[f64],
    bet_history: &[BetRecord],
    years: f64,
    alpha: f64,
) -> SimulationMetrics {
    let total_bets = bet_history.len();
    let hits = bet_history.iter().filter(|record| record.hit).count();
    let total_invested: u64 = bet_history.iter().map(|record| record.ticket.amount).sum();
    let total_payout: u64 = bet_history.iter().map(|record| record.payout).sum();
    let roi = if total_invested == 0 {
        0.0
    } else {
        100.0 * total_payout as f64 / total_invested as f64
    };
    let final_fund = fund_history.last().copied().unwrap_or(initial_fund);

    let returns: Vec<f64> = bet_history
        .iter()
        .map(|record| (record.fund_after - record.fund_before) / record.fund_before)
        .collect();

    let (max_drawdown, max_drawdown_duration) = max_drawdown(fund_history);
    let (var, cvar) = value_at_risk(&returns, alpha);

    SimulationMetrics {
        total_bets,
        hits,
        hit_rate: if total_bets == 0 {
            0.0
        } else {
            100.0 * hits as f64 / total_bets as f64
        },
        total_invested,
        total_payout,
        roi,
        recovery_rate: roi,
        final_fund,
        cagr: cagr(initial_fund, final_fund, years),
        max_drawdown,
        max_drawdown_duration,
        sharpe: sharpe(&returns),
        sortino: sortino(&returns),
        var,
        cvar,
        max_consecutive_losses: max_consecutive_losses(bet_history),
        estimated_odds_tickets: bet_history
            .iter()
            .filter(|record| record.ticket.estimated_odds)
            .count(),
    }
}

fn cagr(initial: f64, fin: f64, years: f64) -> f64 {
    if initial <= 0.0 || fin <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    (fin / initial).powf(1.0 / years) - 1.0
}

/// Largest peak-to-trough fall as a percentage of the peak, plus the index
/// distance from the peak to the trough.
fn max_drawdown(fund_history: &[f64]) -> (f64, usize) {
    let mut peak = f64::MIN;
    let mut peak_index = 0;
    let mut worst = 0.0;
    let mut worst_duration = 0;
    for (index, &fund) in fund_history.iter().enumerate() {
        if fund > peak {
            peak = fund;
            peak_index = index;
        } else if peak > 0.0 {
            let drawdown = (peak - fund) / peak * 100.0;
            if drawdown > worst {
                worst = drawdown;
                worst_duration = index - peak_index;
            }
        }
    }
    (worst, worst_duration)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64]) -> f64 {
    let mean = mean(values);
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let deviation = stddev(returns);
    if deviation == 0.0 {
        return 0.0;
    }
    mean(returns) / deviation
}

/// Downside-only counterpart of Sharpe. Infinite when no bet lost money.
fn sortino(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.is_empty() {
        return f64::INFINITY;
    }
    let downside = stddev(&negatives);
    if downside == 0.0 {
        return f64::INFINITY;
    }
    mean(returns) / downside
}

/// `(VaR, CVaR)` at confidence `alpha`: the `(1 - alpha)` percentile of
/// returns and the mean of everything at or below it.
fn value_at_risk(returns: &[f64], alpha: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let var = percentile(&sorted, 1.0 - alpha);
    let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= var).collect();
    let cvar = if tail.is_empty() { var } else { mean(&tail) };
    (var, cvar)
}

/// Quantile by rank over an ascending-sorted slice.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    let index = f64::ceil(quantile * sorted.len() as f64 - 1.0).max(0.0) as usize;
    sorted[index.min(sorted.len() - 1)]
}

fn max_consecutive_losses(bet_history: &[BetRecord]) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for record in bet_history {
        if record.hit {
            run = 0;
        } else {
            run += 1;
            longest = longest.max(run);
        }
    }
    longest
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,
    pub bankruptcy_prob: f64,
    pub target_prob: Option<f64>,
}

/// Aggregates per-trial final funds. Order independent: the result depends
/// only on the multiset of outcomes.
pub fn summarise_trials(
    final_funds: &[f64],
    initial_fund: f64,
    target_fund: Option<f64>,
) -> MonteCarloSummary {
    if final_funds.is_empty() {
        return MonteCarloSummary {
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            percentile_5: 0.0,
            percentile_25: 0.0,
            percentile_75: 0.0,
            percentile_95: 0.0,
            bankruptcy_prob: 0.0,
            target_prob: target_fund.map(|_| 0.0),
        };
    }
    let mut sorted = final_funds.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let trials = final_funds.len() as f64;
    let bankrupt = final_funds
        .iter()
        .filter(|&&fund| fund < initial_fund * BANKRUPTCY_RATIO)
        .count();
    MonteCarloSummary {
        mean: mean(final_funds),
        median: percentile(&sorted, 0.5),
        std_dev: stddev(final_funds),
        percentile_5: percentile(&sorted, 0.05),
        percentile_25: percentile(&sorted, 0.25),
        percentile_75: percentile(&sorted, 0.75),
        percentile_95: percentile(&sorted, 0.95),
        bankruptcy_prob: bankrupt as f64 / trials,
        target_prob: target_fund.map(|target| {
            final_funds.iter().filter(|&&fund| fund >= target).count() as f64 / trials
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Judgement {
    pub go: bool,
    pub reasons_for: Vec<String>,
    pub reasons_against: Vec<String>,
}

const GO_MAX_BANKRUPTCY: f64 = 0.05;
const GO_MIN_ROI: f64 = 150.0;
const GO_MAX_DRAWDOWN: f64 = 50.0;
const NO_GO_BANKRUPTCY: f64 = 0.10;
const NO_GO_ROI: f64 = 120.0;
const NO_GO_CONSECUTIVE_LOSSES: usize = 30;

/// The deployment verdict. Any no-go condition vetoes; otherwise all go
/// conditions must hold.
pub fn judge(metrics: &SimulationMetrics, bankruptcy_prob: Option<f64>) -> Judgement {
    let bankruptcy = bankruptcy_prob.unwrap_or(0.0);
    let mut reasons_for = vec![];
    let mut reasons_against = vec![];

    if bankruptcy >= NO_GO_BANKRUPTCY {
        reasons_against.push(format!(
            "bankruptcy probability {:.1}% at or above {:.0}%",
            bankruptcy * 100.0,
            NO_GO_BANKRUPTCY * 100.0
        ));
    }
    if metrics.roi < NO_GO_ROI {
        reasons_against.push(format!(
            "ROI {:.1}% below {NO_GO_ROI:.0}%",
            metrics.roi
        ));
    }
    if metrics.max_consecutive_losses >= NO_GO_CONSECUTIVE_LOSSES {
        reasons_against.push(format!(
            "{} consecutive losses at or above {NO_GO_CONSECUTIVE_LOSSES}",
            metrics.max_consecutive_losses
        ));
    }

    if bankruptcy <= GO_MAX_BANKRUPTCY {
        reasons_for.push(format!(
            "bankruptcy probability {:.1}% within {:.0}%",
            bankruptcy * 100.0,
            GO_MAX_BANKRUPTCY * 100.0
        ));
    }
    if metrics.roi >= GO_MIN_ROI {
        reasons_for.push(format!("ROI {:.1}% at or above {GO_MIN_ROI:.0}%", metrics.roi));
    }
    if metrics.max_drawdown <= GO_MAX_DRAWDOWN {
        reasons_for.push(format!(
            "max drawdown {:.1}% within {GO_MAX_DRAWDOWN:.0}%",
            metrics.max_drawdown
        ));
    }

    let go = reasons_against.is_empty() && reasons_for.len() == 3;
    Judgement {
        go,
        reasons_for,
        reasons_against,
    }
}

#[cfg(test)]
mod tests;
