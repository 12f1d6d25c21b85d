use thiserror::Error;

/// A simulation configuration that was rejected before any trial ran.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("initial balance must be a positive finite number, got {0}")]
    InitialBalance(f64),
    #[error("drift must be finite, got {0}")]
    Drift(f64),
    #[error("volatility must be >= 0 and finite, got {0}")]
    Volatility(f64),
    #[error("horizon must be at least one year")]
    Horizon,
    #[error("trial count must be at least 1")]
    Trials,
    #[error("withdrawal rate must be between 0 and 1, got {0}")]
    WithdrawalRate(f64),
    #[error("fixed withdrawal amount must be positive and finite, got {0}")]
    WithdrawalAmount(f64),
    #[error("inflation rate must be finite and > -1, got {0}")]
    Inflation(f64),
    #[error("withdrawal start year must be >= 1")]
    WithdrawalStartYear,
    #[error("percentile must be between 0 and 100, got {0}")]
    Percentile(f64),
    #[error("{field} is required for the {policy} withdrawal policy")]
    MissingPolicyField {
        field: &'static str,
        policy: &'static str,
    },
    #[error("invalid config file: {0}")]
    ConfigFile(String),
}
