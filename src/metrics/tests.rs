use super::*;
use crate::ticket::{Ticket, TicketKind};
use assert_float_eq::*;
use chrono::NaiveDate;

fn record(hit: bool, amount: u64, payout: u64, fund_before: f64) -> BetRecord {
    let mut ticket = Ticket::new(TicketKind::Win, vec![1], 2.0, "test", 1.0);
    ticket.amount = amount;
    BetRecord {
        race_id: "tokyo_2024_20240128_11".into(),
        race_date: NaiveDate::from_ymd_opt(2024, 1, 28).unwrap(),
        ticket,
        hit,
        payout,
        fund_before,
        fund_after: fund_before - amount as f64 + payout as f64,
    }
}

/// Walks a fund through a sequence of (hit, amount, payout) outcomes.
fn histories(initial: f64, outcomes: &[(bool, u64, u64)]) -> (Vec<f64>, Vec<BetRecord>) {
    let mut fund = initial;
    let mut fund_history = vec![initial];
    let mut bet_history = vec![];
    for &(hit, amount, payout) in outcomes {
        let record = record(hit, amount, payout, fund);
        fund = record.fund_after;
        fund_history.push(fund);
        bet_history.push(record);
    }
    (fund_history, bet_history)
}

#[test]
fn zero_input_defaults() {
    let metrics = compute(100_000.0, &[100_000.0], &[], 1.0, 0.95);
    assert_eq!(0, metrics.total_bets);
    assert_eq!(0.0, metrics.roi);
    assert_eq!(0.0, metrics.hit_rate);
    assert_eq!(0.0, metrics.sharpe);
    assert_eq!(0.0, metrics.sortino);
    assert_eq!(0.0, metrics.max_drawdown);
    assert_eq!(0.0, metrics.cagr);
    assert_eq!(100_000.0, metrics.final_fund);
}

#[test]
fn roi_of_a_single_winning_bet() {
    let (fund_history, bet_history) = histories(100_000.0, &[(true, 1000, 4000)]);
    let metrics = compute(100_000.0, &fund_history, &bet_history, 1.0, 0.95);
    assert_f64_near!(400.0, metrics.roi);
    assert_f64_near!(400.0, metrics.recovery_rate);
    assert_f64_near!(100.0, metrics.hit_rate);
    assert_f64_near!(103_000.0, metrics.final_fund);
}

#[test]
fn roi_of_a_single_losing_bet() {
    let (fund_history, bet_history) = histories(100_000.0, &[(false, 1000, 0)]);
    let metrics = compute(100_000.0, &fund_history, &bet_history, 1.0, 0.95);
    assert_f64_near!(0.0, metrics.roi);
    assert_f64_near!(99_000.0, metrics.final_fund);
}

#[test]
fn cagr_annualises_growth() {
    let (fund_history, bet_history) = histories(100_000.0, &[(true, 1000, 101_000)]);
    let metrics = compute(100_000.0, &fund_history, &bet_history, 2.0, 0.95);
    // fund doubles over two years
    assert_float_relative_eq!(2.0_f64.sqrt() - 1.0, metrics.cagr, 1e-9);

    let zero_years = compute(100_000.0, &fund_history, &bet_history, 0.0, 0.95);
    assert_eq!(0.0, zero_years.cagr);
}

#[test]
fn drawdown_over_a_known_trajectory() {
    let fund_history = [100.0, 120.0, 90.0, 130.0, 65.0];
    let (worst, duration) = {
        let metrics = compute(100.0, &fund_history, &[], 1.0, 0.95);
        (metrics.max_drawdown, metrics.max_drawdown_duration)
    };
    assert_f64_near!(50.0, worst);
    assert_eq!(1, duration);
}

#[test]
fn monotonic_history_has_no_drawdown() {
    let fund_history = [100.0, 110.0, 125.0, 180.0];
    let metrics = compute(100.0, &fund_history, &[], 1.0, 0.95);
    assert_eq!(0.0, metrics.max_drawdown);
    assert_eq!(0, metrics.max_drawdown_duration);
}

#[test]
fn sharpe_needs_dispersion() {
    let (fund_history, bet_history) = histories(100_000.0, &[(true, 1000, 2000)]);
    let single = compute(100_000.0, &fund_history, &bet_history, 1.0, 0.95);
    assert_eq!(0.0, single.sharpe);

    let (fund_history, bet_history) =
        histories(100_000.0, &[(true, 1000, 2000), (false, 1000, 0)]);
    let mixed = compute(100_000.0, &fund_history, &bet_history, 1.0, 0.95);
    assert!(mixed.sharpe.is_finite());
    assert!(mixed.sharpe != 0.0);
}

#[test]
fn sortino_is_infinite_without_losses() {
    let (fund_history, bet_history) =
        histories(100_000.0, &[(true, 1000, 2000), (true, 1000, 3000)]);
    let metrics = compute(100_000.0, &fund_history, &bet_history, 1.0, 0.95);
    assert!(metrics.sortino.is_infinite());

    let (fund_history, bet_history) = histories(
        100_000.0,
        &[(true, 1000, 4000), (false, 1000, 0), (false, 2000, 0)],
    );
    let metrics = compute(100_000.0, &fund_history, &bet_history, 1.0, 0.95);
    assert!(metrics.sortino.is_finite());
}

#[test]
fn var_and_cvar_capture_the_loss_tail() {
    // 20 bets with per-bet returns -0.10, -0.09, ..., 0.09 in scrambled order
    let mut outcomes = vec![];
    let mut fund = 1_000_000.0;
    let mut returns = vec![];
    for step in -10i64..10 {
        let amount = 10_000u64;
        let payout = (amount as i64 + step * (fund / 1000.0) as i64).max(0) as u64;
        let record = record(step >= 0, amount, payout, fund);
        returns.push((record.fund_after - record.fund_before) / record.fund_before);
        outcomes.push(record);
        fund = outcomes.last().unwrap().fund_after;
    }
    let fund_history: Vec<f64> = std::iter::once(1_000_000.0)
        .chain(outcomes.iter().map(|record| record.fund_after))
        .collect();
    let metrics = compute(1_000_000.0, &fund_history, &outcomes, 1.0, 0.95);
    let mut sorted = returns.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    // the 5th-percentile return is the worst of 20
    assert_f64_near!(sorted[0], metrics.var);
    assert!(metrics.cvar <= metrics.var);
}

#[test]
fn consecutive_losses_track_the_longest_run() {
    let (fund_history, bet_history) = histories(
        100_000.0,
        &[
            (true, 1000, 2000),
            (false, 1000, 0),
            (false, 1000, 0),
            (false, 1000, 0),
            (true, 1000, 5000),
            (false, 1000, 0),
            (false, 1000, 0),
        ],
    );
    let metrics = compute(100_000.0, &fund_history, &bet_history, 1.0, 0.95);
    assert_eq!(3, metrics.max_consecutive_losses);
    assert_eq!(7, metrics.total_bets);
    assert_eq!(2, metrics.hits);
}

#[test]
fn trial_summary_statistics() {
    let final_funds = [50_000.0, 150_000.0, 5_000.0, 100_000.0, 200_000.0];
    let summary = summarise_trials(&final_funds, 100_000.0, Some(150_000.0));
    assert_f64_near!(101_000.0, summary.mean);
    assert_f64_near!(100_000.0, summary.median);
    // one of five trials finished under 10% of the initial fund
    assert_f64_near!(0.2, summary.bankruptcy_prob);
    assert_f64_near!(0.4, summary.target_prob.unwrap());
}

#[test]
fn trial_summary_is_order_independent() {
    let a = summarise_trials(&[1.0, 2.0, 3.0, 4.0], 100.0, None);
    let b = summarise_trials(&[4.0, 2.0, 1.0, 3.0], 100.0, None);
    assert_eq!(a, b);
}

#[test]
fn empty_trials_summarise_to_zero() {
    let summary = summarise_trials(&[], 100_000.0, None);
    assert_eq!(0.0, summary.mean);
    assert_eq!(0.0, summary.bankruptcy_prob);
}

#[test]
fn judgement_goes_when_all_conditions_hold() {
    let metrics = SimulationMetrics {
        roi: 180.0,
        max_drawdown: 22.0,
        max_consecutive_losses: 6,
        ..Default::default()
    };
    let judgement = judge(&metrics, Some(0.02));
    assert!(judgement.go);
    assert_eq!(3, judgement.reasons_for.len());
    assert!(judgement.reasons_against.is_empty());
}

#[test]
fn judgement_vetoes_on_any_no_go_condition() {
    let metrics = SimulationMetrics {
        roi: 160.0,
        max_drawdown: 20.0,
        max_consecutive_losses: 6,
        ..Default::default()
    };
    // go conditions all hold, but bankruptcy is disqualifying
    let judgement = judge(&metrics, Some(0.12));
    assert!(!judgement.go);
    assert!(!judgement.reasons_against.is_empty());
}

#[test]
fn judgement_withholds_go_between_thresholds() {
    let metrics = SimulationMetrics {
        roi: 135.0, // above the 120 veto, below the 150 go bar
        max_drawdown: 20.0,
        max_consecutive_losses: 6,
        ..Default::default()
    };
    let judgement = judge(&metrics, Some(0.02));
    assert!(!judgement.go);
    assert!(judgement.reasons_against.is_empty());
    assert_eq!(2, judgement.reasons_for.len());
}
