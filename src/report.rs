//! Report writers: per-run JSON, fund/bet history CSVs and a human-readable
//! summary.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use stanza::renderer::console::Console;
use stanza::renderer::Renderer;
use tracing::info;

use crate::config::{Config, OutputConfig};
use crate::csv::{CsvWriter, Record};
use crate::error::BacktestError;
use crate::file::WriteJsonFile;
use crate::mc::MonteCarloResult;
use crate::metrics::Judgement;
use crate::print;
use crate::sim::SimulationResult;

/// The per-run JSON document: metrics, verdict and the configuration
/// snapshot that produced them.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub result: &'a SimulationResult,
    pub judgement: &'a Judgement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<&'a MonteCarloResult>,
    pub config: &'a Config,
}

pub struct ReportWriter<'a> {
    output: &'a OutputConfig,
}
impl<'a> ReportWriter<'a> {
    pub fn new(output: &'a OutputConfig) -> Self {
        Self { output }
    }

    /// Writes every enabled format; returns the paths produced.
    pub fn write(
        &self,
        config: &Config,
        result: &SimulationResult,
        judgement: &Judgement,
        monte_carlo: Option<&MonteCarloResult>,
    ) -> Result<Vec<PathBuf>, BacktestError> {
        let directory = &self.output.directory;
        fs::create_dir_all(directory).map_err(|source| BacktestError::OutputWriteFailed {
            path: directory.clone(),
            source,
        })?;

        let mut written = vec![];
        if self.output.formats.json {
            let path = directory.join("run.json");
            RunReport {
                result,
                judgement,
                monte_carlo,
                config,
            }
            .write_json_file(&path)
            .map_err(|source| BacktestError::OutputWriteFailed {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        if self.output.formats.csv {
            written.push(self.write_fund_history(result)?);
            written.push(self.write_bet_history(result)?);
        }
        if self.output.formats.txt {
            written.push(self.write_summary(result, judgement, monte_carlo)?);
        }
        for path in &written {
            info!("wrote {}", path.display());
        }
        Ok(written)
    }

    fn write_fund_history(&self, result: &SimulationResult) -> Result<PathBuf, BacktestError> {
        let path = self.output.directory.join("fund_history.csv");
        let failed = |source| BacktestError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        let mut writer = CsvWriter::create(&path).map_err(failed)?;
        writer
            .append([
                "date",
                "race_id",
                "fund_before",
                "stake",
                "payout",
                "fund_after",
                "cumulative_profit",
                "drawdown",
            ])
            .map_err(failed)?;
        let mut peak = result.initial_fund;
        for record in &result.bet_history {
            peak = peak.max(record.fund_after);
            let drawdown = if peak > 0.0 {
                (peak - record.fund_after) / peak * 100.0
            } else {
                0.0
            };
            writer
                .append(Record::with_values([
                    format!("{}", record.race_date),
                    record.race_id.clone(),
                    format!("{:.0}", record.fund_before),
                    format!("{}", record.ticket.amount),
                    format!("{}", record.payout),
                    format!("{:.0}", record.fund_after),
                    format!("{:.0}", record.fund_after - result.initial_fund),
                    format!("{drawdown:.4}"),
                ]))
                .map_err(failed)?;
        }
        writer.flush().map_err(failed)?;
        Ok(path)
    }

    fn write_bet_history(&self, result: &SimulationResult) -> Result<PathBuf, BacktestError> {
        let path = self.output.directory.join("bet_history.csv");
        let failed = |source| BacktestError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        let mut writer = CsvWriter::create(&path).map_err(failed)?;
        writer
            .append([
                "date",
                "race_id",
                "strategy",
                "kind",
                "horse_numbers",
                "odds",
                "amount",
                "is_hit",
                "payout",
                "weight",
                "estimated_odds",
            ])
            .map_err(failed)?;
        for record in &result.bet_history {
            let numbers = record
                .ticket
                .numbers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("-");
            writer
                .append(Record::with_values([
                    format!("{}", record.race_date),
                    record.race_id.clone(),
                    record.ticket.strategy.clone(),
                    format!("{}", record.ticket.kind),
                    numbers,
                    format!("{}", record.ticket.odds),
                    format!("{}", record.ticket.amount),
                    format!("{}", record.hit),
                    format!("{}", record.payout),
                    format!("{}", record.ticket.weight),
                    format!("{}", record.ticket.estimated_odds),
                ]))
                .map_err(failed)?;
        }
        writer.flush().map_err(failed)?;
        Ok(path)
    }

    fn write_summary(
        &self,
        result: &SimulationResult,
        judgement: &Judgement,
        monte_carlo: Option<&MonteCarloResult>,
    ) -> Result<PathBuf, BacktestError> {
        let path = self.output.directory.join("summary.txt");
        let failed = |source| BacktestError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        let renderer = Console::default();
        let mut file = fs::File::create(&path).map_err(failed)?;
        writeln!(
            file,
            "{}",
            renderer.render(&print::tabulate_metrics(&result.metrics))
        )
        .map_err(failed)?;
        writeln!(
            file,
            "{}",
            renderer.render(&print::tabulate_kind_breakdown(&result.bet_history))
        )
        .map_err(failed)?;
        if let Some(monte_carlo) = monte_carlo {
            writeln!(
                file,
                "{}",
                renderer.render(&print::tabulate_mc_summary(&monte_carlo.summary))
            )
            .map_err(failed)?;
        }
        writeln!(
            file,
            "{}",
            renderer.render(&print::tabulate_judgement(judgement))
        )
        .map_err(failed)?;
        Ok(path)
    }
}
