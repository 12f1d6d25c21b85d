use rand::Rng;
use serde::Serialize;

use super::engine::run_monte_carlo;
use super::error::ConfigError;
use super::sampler::NormalSampler;
use super::stats::{mean, sample_std_dev};
use super::types::SimulationConfig;

const TERMINAL_MEAN_REL_TOL: f64 = 0.02;
const LOG_RETURN_ABS_TOL: f64 = 0.01;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalDiagnostics {
    pub draws: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub within_one_sigma: f64,
    pub within_two_sigma: f64,
}

impl NormalDiagnostics {
    pub fn passed(&self) -> bool {
        self.mean.abs() < 0.01
            && (self.std_dev - 1.0).abs() < 0.01
            && (self.within_one_sigma - 0.683).abs() < 0.02
            && (self.within_two_sigma - 0.954).abs() < 0.01
    }
}

pub fn normal_diagnostics<R: Rng>(
    sampler: &mut NormalSampler<R>,
    draws: usize,
) -> NormalDiagnostics {
    let values = (0..draws).map(|_| sampler.sample()).collect::<Vec<_>>();
    let fraction_within = |k: f64| {
        values.iter().filter(|z| z.abs() <= k).count() as f64 / draws.max(1) as f64
    };

    NormalDiagnostics {
        draws,
        mean: mean(&values),
        std_dev: sample_std_dev(&values),
        within_one_sigma: fraction_within(1.0),
        within_two_sigma: fraction_within(2.0),
    }
}

/// One-year GBM run compared against its closed-form moments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GbmDiagnostics {
    pub trials: u32,
    pub drift: f64,
    pub volatility: f64,
    pub mean_terminal: f64,
    pub expected_terminal: f64,
    pub terminal_relative_error: f64,
    pub mean_log_return: f64,
    pub expected_log_return: f64,
    pub log_return_error: f64,
    pub passed: bool,
}

pub fn gbm_diagnostics(
    initial_balance: f64,
    drift: f64,
    volatility: f64,
    trials: u32,
    seed: u64,
) -> Result<GbmDiagnostics, ConfigError> {
    let config = SimulationConfig {
        initial_balance,
        drift,
        volatility,
        horizon_years: 1,
        withdrawal: None,
        withdrawal_start_year: 1,
        trials,
        seed,
    };
    let results = run_monte_carlo(&config)?;

    let terminals = results.iter().map(|t| t.final_balance()).collect::<Vec<_>>();
    let log_returns = results
        .iter()
        .flat_map(|t| t.years.iter().map(|y| y.log_return))
        .collect::<Vec<_>>();

    let mean_terminal = mean(&terminals);
    let expected_terminal = initial_balance * drift.exp();
    let terminal_relative_error = (mean_terminal - expected_terminal).abs() / expected_terminal;
    let mean_log_return = mean(&log_returns);
    let expected_log_return = drift - 0.5 * volatility * volatility;
    let log_return_error = (mean_log_return - expected_log_return).abs();

    Ok(GbmDiagnostics {
        trials,
        drift,
        volatility,
        mean_terminal,
        expected_terminal,
        terminal_relative_error,
        mean_log_return,
        expected_log_return,
        log_return_error,
        passed: terminal_relative_error < TERMINAL_MEAN_REL_TOL
            && log_return_error < LOG_RETURN_ABS_TOL,
    })
}
