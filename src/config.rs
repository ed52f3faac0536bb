//! The configuration document driving a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bankroll::{Constraints, Staking, StakingSpec};
use crate::error::BacktestError;
use crate::file::ReadJsonFile;
use crate::filter::FilterConfig;
use crate::mc::McMethod;
use crate::strategy::{Composite, Strategy, StrategySpec};
use crate::walkforward::WalkForwardParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationType {
    Simple,
    MonteCarlo,
    WalkForward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(rename = "type")]
    pub sim_type: SimulationType,
    pub initial_fund: f64,
    #[serde(default = "default_seed")]
    pub random_seed: u64,
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McConfig {
    pub num_trials: usize,
    pub method: McMethod,
    pub confidence_level: f64,
    pub target_fund: Option<f64>,
    pub keep_histories: bool,
}
impl Default for McConfig {
    fn default() -> Self {
        Self {
            num_trials: 1000,
            method: McMethod::Bootstrap,
            confidence_level: 0.95,
            target_fund: None,
            keep_histories: false,
        }
    }
}
impl McConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.num_trials == 0 {
            anyhow::bail!("the number of trials cannot be zero");
        }
        if !(0.0..1.0).contains(&self.confidence_level) || self.confidence_level == 0.0 {
            anyhow::bail!(
                "confidence level must lie in (0, 1), got {}",
                self.confidence_level
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSpec {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub enabled: bool,
    pub strategies: Vec<WeightedSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundConfig {
    #[serde(flatten)]
    pub staking: StakingSpec,
    #[serde(default)]
    pub constraints: Constraints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Formats {
    pub json: bool,
    pub csv: bool,
    pub txt: bool,
}
impl Default for Formats {
    fn default() -> Self {
        Self {
            json: true,
            csv: true,
            txt: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub formats: Formats,
    pub charts: bool,
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            formats: Formats::default(),
            charts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub monte_carlo: Option<McConfig>,
    #[serde(default)]
    pub walk_forward: Option<WalkForwardParams>,
    pub strategy: StrategySpec,
    #[serde(default)]
    pub composite_strategy: CompositeConfig,
    pub fund_management: FundConfig,
    #[serde(default)]
    pub race_filter: FilterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}
impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BacktestError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BacktestError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let config: Config =
            Config::read_json_file(path).map_err(|err| BacktestError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        config
            .fund_management
            .constraints
            .validate()
            .map_err(|err| BacktestError::BankrollParamInvalid {
                reason: err.to_string(),
            })?;
        config.build_staking()?;
        config
            .validate()
            .map_err(|err| BacktestError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.simulation.initial_fund <= 0.0 {
            anyhow::bail!(
                "initial fund must be positive, got {}",
                self.simulation.initial_fund
            );
        }
        if let Some(monte_carlo) = &self.monte_carlo {
            monte_carlo.validate()?;
        }
        if let Some(walk_forward) = &self.walk_forward {
            walk_forward.validate()?;
        }
        if self.composite_strategy.enabled && self.composite_strategy.strategies.is_empty() {
            anyhow::bail!("composite strategy enabled with no sub-strategies");
        }
        Ok(())
    }

    /// The strategy this run bets with: the composite when enabled, otherwise
    /// the single configured strategy.
    pub fn build_strategy(&self) -> Result<Strategy, BacktestError> {
        if self.composite_strategy.enabled {
            let mut entries = vec![];
            for weighted in &self.composite_strategy.strategies {
                let strategy = Strategy::from_spec(&StrategySpec {
                    name: weighted.name.clone(),
                    params: weighted.params.clone(),
                })?;
                entries.push((strategy, weighted.weight));
            }
            let composite =
                Composite::new(entries).map_err(|err| BacktestError::StrategyParamInvalid {
                    name: "composite".into(),
                    reason: err.to_string(),
                })?;
            Ok(Strategy::Composite(composite))
        } else {
            Strategy::from_spec(&self.strategy)
        }
    }

    /// The staking method this run sizes with, constructed and range-checked
    /// from the configured name + params record.
    pub fn build_staking(&self) -> Result<Staking, BacktestError> {
        let staking = Staking::from_spec(&self.fund_management.staking)?;
        staking
            .validate()
            .map_err(|err| BacktestError::BankrollParamInvalid {
                reason: err.to_string(),
            })?;
        Ok(staking)
    }

    pub fn monte_carlo(&self) -> Result<&McConfig, BacktestError> {
        self.monte_carlo
            .as_ref()
            .ok_or(BacktestError::ConfigMissing {
                section: "monte_carlo".into(),
            })
    }

    pub fn walk_forward(&self) -> Result<&WalkForwardParams, BacktestError> {
        self.walk_forward
            .as_ref()
            .ok_or(BacktestError::ConfigMissing {
                section: "walk_forward".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> serde_json::Value {
        json!({
            "simulation": {"type": "simple", "initial_fund": 100000.0},
            "strategy": {"name": "favorite_win", "params": {"top_n": 2}},
            "fund_management": {"method": "fixed", "params": {"bet_amount": 1000}}
        })
    }

    #[test]
    fn minimal_document_decodes_with_defaults() {
        let config: Config = serde_json::from_value(minimal()).unwrap();
        assert_eq!(SimulationType::Simple, config.simulation.sim_type);
        assert_eq!(42, config.simulation.random_seed);
        assert_eq!("fixed", config.fund_management.staking.method);
        assert_eq!(
            Staking::Fixed { bet_amount: 1000 },
            config.build_staking().unwrap()
        );
        assert_eq!(100, config.fund_management.constraints.min_bet);
        assert_eq!(12, config.race_filter.min_horse_count);
        assert!(config.output.formats.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_document_decodes() {
        let config: Config = serde_json::from_value(json!({
            "simulation": {"type": "monte_carlo", "initial_fund": 500000.0, "random_seed": 7},
            "monte_carlo": {"num_trials": 2000, "method": "bootstrap", "confidence_level": 0.99},
            "walk_forward": {"train_period_days": 90, "test_period_days": 14, "step_days": 14},
            "strategy": {"name": "box_quinella", "params": {"box_size": 5}},
            "composite_strategy": {
                "enabled": true,
                "strategies": [
                    {"name": "favorite_win", "weight": 2.0},
                    {"name": "longshot_win", "weight": 1.0, "params": {"upset_threshold": 0.2}}
                ]
            },
            "fund_management": {
                "method": "kelly",
                "params": {"kelly_fraction": 0.25},
                "constraints": {
                    "min_bet": 100,
                    "max_bet_per_ticket": 5000,
                    "max_bet_per_race": 10000,
                    "max_bet_per_day": 30000,
                    "stop_loss_threshold": 0.5
                }
            },
            "race_filter": {"min_horse_count": 10, "surface": "turf"},
            "output": {"directory": "out", "formats": {"json": true, "csv": false, "txt": true}}
        }))
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(2000, config.monte_carlo().unwrap().num_trials);
        assert_eq!(
            Staking::Kelly {
                kelly_fraction: 0.25
            },
            config.build_staking().unwrap()
        );
        let strategy = config.build_strategy().unwrap();
        assert_eq!("composite", strategy.name());
    }

    #[test]
    fn composite_disabled_builds_the_single_strategy() {
        let config: Config = serde_json::from_value(minimal()).unwrap();
        assert_eq!("favorite_win", config.build_strategy().unwrap().name());
    }

    #[test]
    fn missing_sections_are_reported() {
        let config: Config = serde_json::from_value(minimal()).unwrap();
        assert!(matches!(
            config.monte_carlo(),
            Err(BacktestError::ConfigMissing { .. })
        ));
        assert!(matches!(
            config.walk_forward(),
            Err(BacktestError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn validation_rejects_degenerate_documents() {
        let mut bad_fund = minimal();
        bad_fund["simulation"]["initial_fund"] = json!(0.0);
        let config: Config = serde_json::from_value(bad_fund).unwrap();
        assert!(config.validate().is_err());

        let mut bad_composite = minimal();
        bad_composite["composite_strategy"] = json!({"enabled": true, "strategies": []});
        let config: Config = serde_json::from_value(bad_composite).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_staking_method_surfaces_from_build() {
        let mut unknown = minimal();
        unknown["fund_management"]["method"] = json!("martingale");
        let config: Config = serde_json::from_value(unknown).unwrap();
        assert!(matches!(
            config.build_staking(),
            Err(BacktestError::BankrollUnknown { .. })
        ));
    }

    #[test]
    fn malformed_staking_params_surface_from_build() {
        let mut invalid = minimal();
        invalid["fund_management"]["params"] = json!({"bet_amount": "all-in"});
        let config: Config = serde_json::from_value(invalid).unwrap();
        assert!(matches!(
            config.build_staking(),
            Err(BacktestError::BankrollParamInvalid { .. })
        ));

        let mut out_of_range = minimal();
        out_of_range["fund_management"]["params"] = json!({"bet_amount": 0});
        let config: Config = serde_json::from_value(out_of_range).unwrap();
        assert!(matches!(
            config.build_staking(),
            Err(BacktestError::BankrollParamInvalid { .. })
        ));
    }

    #[test]
    fn unknown_strategy_surfaces_from_build() {
        let mut unknown = minimal();
        unknown["strategy"] = json!({"name": "martingale"});
        let config: Config = serde_json::from_value(unknown).unwrap();
        assert!(matches!(
            config.build_strategy(),
            Err(BacktestError::StrategyUnknown { .. })
        ));
    }

    #[test]
    fn missing_config_file_is_not_found() {
        let result = Config::load("does/not/exist.json");
        assert!(matches!(result, Err(BacktestError::ConfigNotFound { .. })));
    }
}
