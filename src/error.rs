//! The failure taxonomy shared by the library and the CLI.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("dataset not found: {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("dataset {path} is not valid tab-separated data: {reason}")]
    DatasetInvalidFormat { path: PathBuf, reason: String },

    #[error("dataset {path} is missing required column '{column}'")]
    DatasetMissingColumn { path: PathBuf, column: String },

    #[error("invalid value in {path}, row {row}: {reason}")]
    DatasetInvalidValue {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("config not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("config {path} could not be decoded: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("config is missing required section '{section}'")]
    ConfigMissing { section: String },

    #[error("unknown strategy '{name}'")]
    StrategyUnknown { name: String },

    #[error("invalid parameters for strategy '{name}': {reason}")]
    StrategyParamInvalid { name: String, reason: String },

    #[error("unknown staking method '{name}'")]
    BankrollUnknown { name: String },

    #[error("invalid staking parameters: {reason}")]
    BankrollParamInvalid { reason: String },

    #[error("race {race_id} has no finishing order")]
    ResultUnavailable { race_id: String },

    #[error("could not write output {path}: {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BacktestError {
    /// Process exit code reported by the CLI for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            BacktestError::DatasetNotFound { .. }
            | BacktestError::DatasetInvalidFormat { .. }
            | BacktestError::DatasetMissingColumn { .. }
            | BacktestError::DatasetInvalidValue { .. } => 2,
            BacktestError::ConfigNotFound { .. }
            | BacktestError::ConfigInvalid { .. }
            | BacktestError::ConfigMissing { .. } => 3,
            BacktestError::StrategyUnknown { .. }
            | BacktestError::StrategyParamInvalid { .. } => 4,
            BacktestError::BankrollUnknown { .. }
            | BacktestError::BankrollParamInvalid { .. } => 5,
            BacktestError::ResultUnavailable { .. } => 6,
            BacktestError::OutputWriteFailed { .. } => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_group_by_kind() {
        assert_eq!(
            2,
            BacktestError::DatasetNotFound {
                path: "races.tsv".into()
            }
            .exit_code()
        );
        assert_eq!(
            3,
            BacktestError::ConfigMissing {
                section: "simulation".into()
            }
            .exit_code()
        );
        assert_eq!(
            4,
            BacktestError::StrategyUnknown {
                name: "martingale".into()
            }
            .exit_code()
        );
        assert_eq!(
            5,
            BacktestError::BankrollUnknown {
                name: "martingale".into()
            }
            .exit_code()
        );
        assert_eq!(
            6,
            BacktestError::ResultUnavailable {
                race_id: "tokyo_2024_20240128_11".into()
            }
            .exit_code()
        );
    }

    #[test]
    fn messages_name_the_offending_input() {
        let err = BacktestError::DatasetInvalidValue {
            path: "races.tsv".into(),
            row: 42,
            reason: "win_odds must be positive".into(),
        };
        assert_eq!(
            "invalid value in races.tsv, row 42: win_odds must be positive",
            err.to_string()
        );
    }
}
