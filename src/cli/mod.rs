use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::core::{ConfigError, SimulationConfig, WithdrawalPolicy};
use crate::history::{HistoricalReturns, load_historical_returns};
use crate::report::{DiagnosticSettings, build_report, render_json, render_text};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliWithdrawalPolicy {
    None,
    Percentage,
    FixedInflation,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum FileWithdrawalPolicy {
    #[serde(alias = "off")]
    None,
    #[serde(alias = "percent", alias = "pct")]
    Percentage,
    #[serde(
        alias = "fixedInflation",
        alias = "fixed_inflation",
        alias = "fixed-with-inflation",
        alias = "fixedWithInflation"
    )]
    FixedInflation,
}

impl From<FileWithdrawalPolicy> for CliWithdrawalPolicy {
    fn from(value: FileWithdrawalPolicy) -> Self {
        match value {
            FileWithdrawalPolicy::None => CliWithdrawalPolicy::None,
            FileWithdrawalPolicy::Percentage => CliWithdrawalPolicy::Percentage,
            FileWithdrawalPolicy::FixedInflation => CliWithdrawalPolicy::FixedInflation,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "firesim",
    about = "Monte Carlo retirement projection (GBM returns + withdrawal policies)"
)]
pub struct Cli {
    #[arg(long, default_value_t = 1_000_000.0)]
    pub initial_balance: f64,
    #[arg(long, default_value_t = 7.0, help = "Expected annual return (drift) in percent")]
    pub drift: f64,
    #[arg(long, default_value_t = 15.0, help = "Annual return volatility in percent")]
    pub volatility: f64,
    #[arg(long, default_value_t = 30)]
    pub years: u32,
    #[arg(long, value_enum, default_value_t = CliWithdrawalPolicy::Percentage)]
    pub withdrawal_policy: CliWithdrawalPolicy,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Percentage policy: share of the balance withdrawn each year, in percent"
    )]
    pub withdrawal_rate: f64,
    #[arg(long, help = "Fixed policy: first-year withdrawal amount")]
    pub withdrawal_amount: Option<f64>,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Fixed policy: annual withdrawal escalation in percent"
    )]
    pub inflation: f64,
    #[arg(long, default_value_t = 1, help = "First simulated year (1-based) with withdrawals")]
    pub withdrawal_start_year: u32,
    #[arg(long, default_value_t = 10_000)]
    pub trials: u32,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    #[arg(long, value_delimiter = ',', default_values_t = [5.0, 50.0, 95.0])]
    pub percentiles: Vec<f64>,
    #[arg(
        long,
        env = "FIRESIM_HISTORY_URL",
        help = "JSON feed of [{year, totalReturn}] in percent, newest year first"
    )]
    pub history_url: Option<String>,
    #[arg(long, help = "Skip the history fetch and use the embedded table")]
    pub offline: bool,
    #[arg(long, default_value_t = 5)]
    pub fetch_timeout_secs: u64,
    #[arg(
        long,
        help = "Replace --drift/--volatility with the GBM parameters implied by the history"
    )]
    pub calibrate_from_history: bool,
    #[arg(long, default_value_t = 100_000)]
    pub diagnostic_draws: usize,
    #[arg(long)]
    pub skip_diagnostics: bool,
    #[arg(long, help = "Print the report as JSON")]
    pub json: bool,
    #[arg(long, help = "JSON config file; its keys override the flags above")]
    pub config: Option<PathBuf>,
}

/// Keys accepted in a `--config` file. Percent units match the flags.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigPayload {
    initial_balance: Option<f64>,
    drift: Option<f64>,
    volatility: Option<f64>,
    #[serde(alias = "horizonYears")]
    years: Option<u32>,
    withdrawal_policy: Option<FileWithdrawalPolicy>,
    withdrawal_rate: Option<f64>,
    withdrawal_amount: Option<f64>,
    inflation: Option<f64>,
    withdrawal_start_year: Option<u32>,
    #[serde(alias = "simulations")]
    trials: Option<u32>,
    seed: Option<u64>,
    percentiles: Option<Vec<f64>>,
    history_url: Option<String>,
    offline: Option<bool>,
    calibrate_from_history: Option<bool>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

pub async fn run(cli: Cli) -> Result<String, AppError> {
    let cli = match &cli.config {
        Some(path) => apply_config_file(cli.clone(), path)?,
        None => cli,
    };

    let history = if cli.offline {
        HistoricalReturns::embedded()
    } else {
        load_historical_returns(
            cli.history_url.as_deref(),
            Duration::from_secs(cli.fetch_timeout_secs),
        )
        .await
    };

    let config = build_config(&cli, Some(&history))?;
    let diagnostics = (!cli.skip_diagnostics).then(|| DiagnosticSettings {
        normal_draws: cli.diagnostic_draws,
        gbm_trials: config.trials,
    });
    let report = build_report(&config, &cli.percentiles, &history, diagnostics)?;

    if cli.json {
        Ok(render_json(&report)?)
    } else {
        Ok(render_text(&report))
    }
}

pub fn build_config(
    cli: &Cli,
    history: Option<&HistoricalReturns>,
) -> Result<SimulationConfig, ConfigError> {
    if let Some(&p) = cli.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(ConfigError::Percentile(p));
    }

    let (drift, volatility) = match history {
        Some(history) if cli.calibrate_from_history => {
            let (drift, volatility) = history.gbm_parameters();
            info!(drift, volatility, "calibrated GBM parameters from history");
            (drift, volatility)
        }
        _ => (cli.drift / 100.0, cli.volatility / 100.0),
    };

    let withdrawal = match cli.withdrawal_policy {
        CliWithdrawalPolicy::None => None,
        CliWithdrawalPolicy::Percentage => Some(WithdrawalPolicy::Percentage {
            rate: cli.withdrawal_rate / 100.0,
        }),
        CliWithdrawalPolicy::FixedInflation => {
            let Some(initial_amount) = cli.withdrawal_amount else {
                return Err(ConfigError::MissingPolicyField {
                    field: "--withdrawal-amount",
                    policy: "fixed-inflation",
                });
            };
            Some(WithdrawalPolicy::FixedWithInflation {
                initial_amount,
                inflation: cli.inflation / 100.0,
            })
        }
    };

    let config = SimulationConfig {
        initial_balance: cli.initial_balance,
        drift,
        volatility,
        horizon_years: cli.years,
        withdrawal,
        withdrawal_start_year: cli.withdrawal_start_year,
        trials: cli.trials,
        seed: cli.seed,
    };
    config.validate()?;
    Ok(config)
}

fn apply_config_file(cli: Cli, path: &Path) -> Result<Cli, ConfigError> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ConfigFile(format!("{}: {e}", path.display())))?;
    apply_config_json(cli, &json)
}

fn apply_config_json(mut cli: Cli, json: &str) -> Result<Cli, ConfigError> {
    let payload = serde_json::from_str::<ConfigPayload>(json)
        .map_err(|e| ConfigError::ConfigFile(e.to_string()))?;

    if let Some(v) = payload.initial_balance {
        cli.initial_balance = v;
    }
    if let Some(v) = payload.drift {
        cli.drift = v;
    }
    if let Some(v) = payload.volatility {
        cli.volatility = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.withdrawal_policy {
        cli.withdrawal_policy = v.into();
    }
    if let Some(v) = payload.withdrawal_rate {
        cli.withdrawal_rate = v;
    }
    if let Some(v) = payload.withdrawal_amount {
        cli.withdrawal_amount = Some(v);
    }
    if let Some(v) = payload.inflation {
        cli.inflation = v;
    }
    if let Some(v) = payload.withdrawal_start_year {
        cli.withdrawal_start_year = v;
    }
    if let Some(v) = payload.trials {
        cli.trials = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.percentiles {
        cli.percentiles = v;
    }
    if let Some(v) = payload.history_url {
        cli.history_url = Some(v);
    }
    if let Some(v) = payload.offline {
        cli.offline = v;
    }
    if let Some(v) = payload.calibrate_from_history {
        cli.calibrate_from_history = v;
    }

    Ok(cli)
}
