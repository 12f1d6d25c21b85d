mod diagnostics;
mod engine;
mod error;
mod sampler;
mod stats;
mod types;
mod withdrawal;

pub use diagnostics::{GbmDiagnostics, NormalDiagnostics, gbm_diagnostics, normal_diagnostics};
pub use engine::{run_monte_carlo, run_monte_carlo_with, simulate_trial};
pub use error::ConfigError;
pub use sampler::{NormalSampler, derive_seed, trial_rng};
pub use stats::{
    DEFAULT_PERCENTILES, aggregate, mean, percentile, sample_std_dev, summarize_series,
};
pub use types::{
    AggregateResult, PercentileValue, SeriesSummary, SimulationConfig, Trial, WithdrawalPolicy,
    YearResult, YearSummary,
};
pub use withdrawal::{WithdrawalState, apply_withdrawal};
