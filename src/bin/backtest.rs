use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use stanza::renderer::console::Console;
use stanza::renderer::Renderer;
use stanza::style::{Header, MinWidth, Styles};
use stanza::table::{Col, Row, Table};
use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};

use furlong::bankroll::Staking;
use furlong::config::{Config, SimulationType};
use furlong::data::Race;
use furlong::dataset;
use furlong::error::BacktestError;
use furlong::file::WriteJsonFile;
use furlong::mc::{self, McMethod, MonteCarlo, MonteCarloResult};
use furlong::metrics;
use furlong::print;
use furlong::report::ReportWriter;
use furlong::sim::Replay;
use furlong::strategy::Strategy;
use furlong::ticket::TicketKind;
use furlong::walkforward::WalkForward;

#[derive(Debug, clap::Parser)]
#[clap(name = "backtest", about = "Backtests horse-race wagering strategies")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute the configured simulation over a dataset
    Run {
        /// configuration file
        #[clap(short = 'c', long)]
        config: PathBuf,

        /// tab-separated race dataset
        #[clap(short = 'd', long)]
        data: PathBuf,
    },
    /// Validate a dataset without simulating
    Validate {
        /// tab-separated race dataset
        data: PathBuf,
    },
    /// Replay one dataset under several strategy configurations
    Compare {
        /// configuration files, one per strategy
        #[clap(short = 'c', long, num_args = 1..)]
        configs: Vec<PathBuf>,

        /// tab-separated race dataset
        #[clap(short = 'd', long)]
        data: PathBuf,
    },
    /// Print the available strategies, staking methods and ticket kinds
    List,
}

fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    debug!("args: {args:?}");
    if let Err(err) = dispatch(args) {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
    Ok(())
}

fn dispatch(args: Args) -> Result<(), BacktestError> {
    match args.command {
        Command::Run { config, data } => run(&config, &data),
        Command::Validate { data } => validate(&data),
        Command::Compare { configs, data } => compare(&configs, &data),
        Command::List => {
            list();
            Ok(())
        }
    }
}

fn load_races(data: &Path) -> Result<Vec<Race>, BacktestError> {
    let start_time = Instant::now();
    let (races, report) = dataset::read_races(data)?;
    info!(
        "loaded {} races ({} rows) in {:.3}s",
        report.races_loaded,
        report.rows_read,
        start_time.elapsed().as_millis() as f64 / 1_000.
    );
    if report.rows_skipped > 0 || report.races_skipped > 0 {
        warn!(
            "dropped {} rows and {} races; rerun `validate` for details",
            report.rows_skipped, report.races_skipped
        );
    }
    Ok(races)
}

fn run(config_path: &Path, data: &Path) -> Result<(), BacktestError> {
    let config = Config::load(config_path)?;
    let races = load_races(data)?;
    let refs: Vec<&Race> = races.iter().collect();
    let strategy = config.build_strategy()?;
    let staking = config.build_staking()?;
    info!("replaying with strategy '{}'", strategy.name());

    let alpha = config
        .monte_carlo
        .as_ref()
        .map(|monte_carlo| monte_carlo.confidence_level)
        .unwrap_or(0.95);
    let replay = || {
        Replay::new(
            &strategy,
            &config.race_filter,
            staking.clone(),
            config.fund_management.constraints.clone(),
            config.simulation.initial_fund,
        )
        .with_var_alpha(alpha)
    };

    match config.simulation.sim_type {
        SimulationType::Simple => {
            let result = replay().run(&refs)?;
            let judgement = metrics::judge(&result.metrics, None);
            render(&result.metrics, None, &judgement, &result.bet_history);
            ReportWriter::new(&config.output).write(&config, &result, &judgement, None)?;
        }
        SimulationType::MonteCarlo => {
            let mc_config = config.monte_carlo()?;
            let result = replay().run(&refs)?;

            let mut driver = MonteCarlo::new(
                replay(),
                mc_config.num_trials,
                config.simulation.random_seed,
            );
            if let Some(target_fund) = mc_config.target_fund {
                driver = driver.with_target_fund(target_fund);
            }
            if mc_config.keep_histories {
                driver = driver.with_histories();
            }
            let trials: MonteCarloResult = match mc_config.method {
                McMethod::Bootstrap => driver.run_bootstrap(&refs)?,
                McMethod::ProbabilityBased => {
                    driver.run_probability(&refs, &mc::implied_probability)?
                }
            };
            let judgement =
                metrics::judge(&result.metrics, Some(trials.summary.bankruptcy_prob));
            render(
                &result.metrics,
                Some(&trials),
                &judgement,
                &result.bet_history,
            );
            ReportWriter::new(&config.output).write(&config, &result, &judgement, Some(&trials))?;
        }
        SimulationType::WalkForward => {
            let params = config.walk_forward()?.clone();
            let windows = WalkForward::new(replay(), params).run(&refs)?;
            info!("{} walk-forward windows", windows.len());
            let rows: Vec<_> = windows
                .iter()
                .map(|window| {
                    (
                        format!("{}..{}", window.test_start, window.test_end),
                        window.result.metrics.clone(),
                    )
                })
                .collect();
            info!(
                "\n{}",
                Console::default().render(&print::tabulate_compare(&rows))
            );
            let path = config.output.directory.join("walk_forward.json");
            std::fs::create_dir_all(&config.output.directory).map_err(|source| {
                BacktestError::OutputWriteFailed {
                    path: config.output.directory.clone(),
                    source,
                }
            })?;
            windows
                .write_json_file(&path)
                .map_err(|source| BacktestError::OutputWriteFailed {
                    path: path.clone(),
                    source,
                })?;
            info!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn render(
    metrics: &metrics::SimulationMetrics,
    trials: Option<&MonteCarloResult>,
    judgement: &metrics::Judgement,
    bet_history: &[furlong::ticket::BetRecord],
) {
    let renderer = Console::default();
    info!("\n{}", renderer.render(&print::tabulate_metrics(metrics)));
    if !bet_history.is_empty() {
        info!(
            "\n{}",
            renderer.render(&print::tabulate_kind_breakdown(bet_history))
        );
    }
    if let Some(trials) = trials {
        info!(
            "\n{}",
            renderer.render(&print::tabulate_mc_summary(&trials.summary))
        );
    }
    info!("\n{}", renderer.render(&print::tabulate_judgement(judgement)));
}

fn validate(data: &Path) -> Result<(), BacktestError> {
    let (races, report) = dataset::read_races(data)?;
    info!(
        "\n{}",
        Console::default().render(&print::tabulate_dataset_report(&report))
    );
    for problem in &report.problems {
        warn!("{problem}");
    }
    let without_results = races
        .iter()
        .filter(|race| race.winner().is_none())
        .count();
    if without_results > 0 {
        warn!("{without_results} races have no finishing order");
    }
    Ok(())
}

fn compare(configs: &[PathBuf], data: &Path) -> Result<(), BacktestError> {
    let races = load_races(data)?;
    let refs: Vec<&Race> = races.iter().collect();
    let mut runs = vec![];
    for config_path in configs {
        let config = Config::load(config_path)?;
        let strategy = config.build_strategy()?;
        let staking = config.build_staking()?;
        let result = Replay::new(
            &strategy,
            &config.race_filter,
            staking,
            config.fund_management.constraints.clone(),
            config.simulation.initial_fund,
        )
        .run(&refs)?;
        runs.push((strategy.name().to_string(), result.metrics));
    }
    runs.sort_by(|a, b| b.1.roi.total_cmp(&a.1.roi));
    info!(
        "\n{}",
        Console::default().render(&print::tabulate_compare(&runs))
    );
    Ok(())
}

fn list() {
    let mut strategies = Table::default()
        .with_cols(vec![Col::new(Styles::default().with(MinWidth(28)))])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec!["Strategy".into()],
        ));
    for name in Strategy::KNOWN {
        strategies.push_row(Row::from([name]));
    }

    let mut staking = Table::default()
        .with_cols(vec![Col::new(Styles::default().with(MinWidth(28)))])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec!["Staking method".into()],
        ));
    for name in Staking::KNOWN {
        staking.push_row(Row::from([name]));
    }

    let mut kinds = Table::default()
        .with_cols(vec![Col::new(Styles::default().with(MinWidth(28)))])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec!["Ticket kind".into()],
        ));
    for kind in TicketKind::iter() {
        kinds.push_row(Row::new(Styles::default(), vec![kind.to_string().into()]));
    }

    let renderer = Console::default();
    info!("\n{}", renderer.render(&strategies));
    info!("\n{}", renderer.render(&staking));
    info!("\n{}", renderer.render(&kinds));
}
