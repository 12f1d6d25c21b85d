use serde::Serialize;

use super::error::ConfigError;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WithdrawalPolicy {
    /// Withdraw `rate` of the pre-withdrawal balance every active year.
    Percentage { rate: f64 },
    /// Withdraw a fixed nominal amount, escalated by `inflation` after the first active year.
    FixedWithInflation { initial_amount: f64, inflation: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub initial_balance: f64,
    pub drift: f64,
    pub volatility: f64,
    pub horizon_years: u32,
    pub withdrawal: Option<WithdrawalPolicy>,
    /// First simulated year (1-based) in which the policy is consulted.
    pub withdrawal_start_year: u32,
    pub trials: u32,
    pub seed: u64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_balance.is_finite() || self.initial_balance <= 0.0 {
            return Err(ConfigError::InitialBalance(self.initial_balance));
        }
        if !self.drift.is_finite() {
            return Err(ConfigError::Drift(self.drift));
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(ConfigError::Volatility(self.volatility));
        }
        if self.horizon_years == 0 {
            return Err(ConfigError::Horizon);
        }
        if self.trials == 0 {
            return Err(ConfigError::Trials);
        }
        if self.withdrawal_start_year == 0 {
            return Err(ConfigError::WithdrawalStartYear);
        }

        match self.withdrawal {
            None => {}
            Some(WithdrawalPolicy::Percentage { rate }) => {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(ConfigError::WithdrawalRate(rate));
                }
            }
            Some(WithdrawalPolicy::FixedWithInflation {
                initial_amount,
                inflation,
            }) => {
                if !initial_amount.is_finite() || initial_amount <= 0.0 {
                    return Err(ConfigError::WithdrawalAmount(initial_amount));
                }
                if !inflation.is_finite() || inflation <= -1.0 {
                    return Err(ConfigError::Inflation(inflation));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearResult {
    pub year: u32,
    pub balance: f64,
    pub withdrawal: f64,
    /// Log-return increment drawn for the year, before withdrawals.
    pub log_return: f64,
}

impl YearResult {
    /// Balance after growth and before the withdrawal was taken.
    pub fn pre_withdrawal_balance(&self) -> f64 {
        self.balance + self.withdrawal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub years: Vec<YearResult>,
}

impl Trial {
    pub fn final_balance(&self) -> f64 {
        self.years.last().map(|y| y.balance).unwrap_or(0.0)
    }

    pub fn depleted_in(&self) -> Option<u32> {
        self.years.iter().find(|y| y.balance <= 0.0).map(|y| y.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: u32,
    pub mean_balance: f64,
    pub std_dev_balance: f64,
    pub median_balance: f64,
    pub balance_percentiles: Vec<PercentileValue>,
    pub mean_withdrawal: f64,
    pub median_withdrawal: f64,
    pub depleted_fraction: f64,
}

impl YearSummary {
    pub fn balance_at(&self, percentile: f64) -> Option<f64> {
        self.balance_percentiles
            .iter()
            .find(|p| p.percentile == percentile)
            .map(|p| p.value)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub trial_count: usize,
    /// Fraction of trials that end the horizon with a positive balance.
    pub success_rate: f64,
    pub years: Vec<YearSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<PercentileValue>,
}
