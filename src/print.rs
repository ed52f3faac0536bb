//! Console tabulation of results.

use ordinalizer::Ordinal;
use stanza::style::{HAlign, Header, MinWidth, Styles};
use stanza::table::{Cell, Col, Row, Table};
use strum::{EnumCount, IntoEnumIterator};

use crate::dataset::DatasetReport;
use crate::metrics::{Judgement, MonteCarloSummary, SimulationMetrics};
use crate::ticket::{BetRecord, TicketKind};

fn two_column(header: (&str, &str)) -> Table {
    Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(24))),
            Col::new(Styles::default().with(MinWidth(14)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec![header.0.into(), header.1.into()],
        ))
}

fn metric_row(name: &str, value: String) -> Row {
    Row::new(
        Styles::default(),
        vec![
            name.to_string().into(),
            Cell::new(Styles::default().with(HAlign::Right), value.into()),
        ],
    )
}

pub fn tabulate_metrics(metrics: &SimulationMetrics) -> Table {
    let mut table = two_column(("Metric", "Value"));
    table.push_row(metric_row("Total bets", format!("{}", metrics.total_bets)));
    table.push_row(metric_row("Hits", format!("{}", metrics.hits)));
    table.push_row(metric_row("Hit rate", format!("{:.2}%", metrics.hit_rate)));
    table.push_row(metric_row(
        "Total invested",
        format!("{} yen", metrics.total_invested),
    ));
    table.push_row(metric_row(
        "Total payout",
        format!("{} yen", metrics.total_payout),
    ));
    table.push_row(metric_row("ROI", format!("{:.2}%", metrics.roi)));
    table.push_row(metric_row(
        "Final fund",
        format!("{:.0} yen", metrics.final_fund),
    ));
    table.push_row(metric_row("CAGR", format!("{:.4}", metrics.cagr)));
    table.push_row(metric_row(
        "Max drawdown",
        format!("{:.2}%", metrics.max_drawdown),
    ));
    table.push_row(metric_row(
        "Drawdown duration",
        format!("{} bets", metrics.max_drawdown_duration),
    ));
    table.push_row(metric_row("Sharpe", format!("{:.4}", metrics.sharpe)));
    table.push_row(metric_row("Sortino", format!("{:.4}", metrics.sortino)));
    table.push_row(metric_row("VaR", format!("{:.4}", metrics.var)));
    table.push_row(metric_row("CVaR", format!("{:.4}", metrics.cvar)));
    table.push_row(metric_row(
        "Max consecutive losses",
        format!("{}", metrics.max_consecutive_losses),
    ));
    if metrics.estimated_odds_tickets > 0 {
        table.push_row(metric_row(
            "Tickets on estimated odds",
            format!("{}", metrics.estimated_odds_tickets),
        ));
    }
    table
}

pub fn tabulate_mc_summary(summary: &MonteCarloSummary) -> Table {
    let mut table = two_column(("Trial statistic", "Value"));
    table.push_row(metric_row("Mean final fund", format!("{:.0}", summary.mean)));
    table.push_row(metric_row(
        "Median final fund",
        format!("{:.0}", summary.median),
    ));
    table.push_row(metric_row("Std dev", format!("{:.0}", summary.std_dev)));
    table.push_row(metric_row(
        "5th percentile",
        format!("{:.0}", summary.percentile_5),
    ));
    table.push_row(metric_row(
        "25th percentile",
        format!("{:.0}", summary.percentile_25),
    ));
    table.push_row(metric_row(
        "75th percentile",
        format!("{:.0}", summary.percentile_75),
    ));
    table.push_row(metric_row(
        "95th percentile",
        format!("{:.0}", summary.percentile_95),
    ));
    table.push_row(metric_row(
        "Bankruptcy probability",
        format!("{:.2}%", summary.bankruptcy_prob * 100.0),
    ));
    if let Some(target_prob) = summary.target_prob {
        table.push_row(metric_row(
            "Target achievement",
            format!("{:.2}%", target_prob * 100.0),
        ));
    }
    table
}

pub fn tabulate_judgement(judgement: &Judgement) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(10))),
            Col::new(Styles::default().with(MinWidth(48))),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec![
                "Decision".into(),
                (if judgement.go { "GO" } else { "NO-GO" }).into(),
            ],
        ));
    for reason in &judgement.reasons_for {
        table.push_row(Row::new(
            Styles::default(),
            vec!["for".into(), reason.clone().into()],
        ));
    }
    for reason in &judgement.reasons_against {
        table.push_row(Row::new(
            Styles::default(),
            vec!["against".into(), reason.clone().into()],
        ));
    }
    table
}

/// Per-kind tallies over the bet history, one row per ticket kind that saw
/// action.
pub fn tabulate_kind_breakdown(bet_history: &[BetRecord]) -> Table {
    let mut bets = [0usize; TicketKind::COUNT];
    let mut hits = [0usize; TicketKind::COUNT];
    let mut staked = [0u64; TicketKind::COUNT];
    let mut paid = [0u64; TicketKind::COUNT];
    for record in bet_history {
        let ordinal = record.ticket.kind.ordinal();
        bets[ordinal] += 1;
        if record.hit {
            hits[ordinal] += 1;
        }
        staked[ordinal] += record.ticket.amount;
        paid[ordinal] += record.payout;
    }

    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(12))),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(8)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec![
                "Kind".into(),
                "Bets".into(),
                "Hits".into(),
                "Staked".into(),
                "Paid".into(),
            ],
        ));
    for kind in TicketKind::iter() {
        let ordinal = kind.ordinal();
        if bets[ordinal] == 0 {
            continue;
        }
        table.push_row(Row::new(
            Styles::default(),
            vec![
                format!("{kind}").into(),
                Cell::new(
                    Styles::default().with(HAlign::Right),
                    format!("{}", bets[ordinal]).into(),
                ),
                Cell::new(
                    Styles::default().with(HAlign::Right),
                    format!("{}", hits[ordinal]).into(),
                ),
                Cell::new(
                    Styles::default().with(HAlign::Right),
                    format!("{}", staked[ordinal]).into(),
                ),
                Cell::new(
                    Styles::default().with(HAlign::Right),
                    format!("{}", paid[ordinal]).into(),
                ),
            ],
        ));
    }
    table
}

pub fn tabulate_compare(runs: &[(String, SimulationMetrics)]) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(26))),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec![
                "Strategy".into(),
                "Bets".into(),
                "Hit rate".into(),
                "ROI".into(),
                "Max DD".into(),
                "Final fund".into(),
            ],
        ));
    for (name, metrics) in runs {
        table.push_row(Row::new(
            Styles::default().with(HAlign::Right),
            vec![
                Cell::new(Styles::default(), name.clone().into()),
                format!("{}", metrics.total_bets).into(),
                format!("{:.2}%", metrics.hit_rate).into(),
                format!("{:.2}%", metrics.roi).into(),
                format!("{:.2}%", metrics.max_drawdown).into(),
                format!("{:.0}", metrics.final_fund).into(),
            ],
        ));
    }
    table
}

pub fn tabulate_dataset_report(report: &DatasetReport) -> Table {
    let mut table = two_column(("Dataset", "Count"));
    table.push_row(metric_row("Rows read", format!("{}", report.rows_read)));
    table.push_row(metric_row(
        "Rows skipped",
        format!("{}", report.rows_skipped),
    ));
    table.push_row(metric_row(
        "Races loaded",
        format!("{}", report.races_loaded),
    ));
    table.push_row(metric_row(
        "Races skipped",
        format!("{}", report.races_skipped),
    ));
    table
}
