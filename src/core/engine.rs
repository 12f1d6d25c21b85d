use rand::Rng;
use rayon::prelude::*;
use tracing::debug;

use super::error::ConfigError;
use super::sampler::{NormalSampler, trial_rng};
use super::types::{SimulationConfig, Trial, YearResult};
use super::withdrawal::apply_withdrawal;

/// Runs `config.trials` independent trials, each seeded from `(config.seed, trial_id)`.
pub fn run_monte_carlo(config: &SimulationConfig) -> Result<Vec<Trial>, ConfigError> {
    let seed = config.seed;
    run_monte_carlo_with(config, move |trial_id| trial_rng(seed, trial_id))
}

/// Like [`run_monte_carlo`] with a caller-supplied generator per trial id.
///
/// Trials execute on the rayon pool; the output is ordered by trial id.
pub fn run_monte_carlo_with<R, F>(
    config: &SimulationConfig,
    rng_for_trial: F,
) -> Result<Vec<Trial>, ConfigError>
where
    R: Rng,
    F: Fn(u32) -> R + Sync,
{
    config.validate()?;
    debug!(
        trials = config.trials,
        horizon_years = config.horizon_years,
        "running monte carlo"
    );

    let trials = (0..config.trials)
        .into_par_iter()
        .map(|trial_id| {
            let mut sampler = NormalSampler::new(rng_for_trial(trial_id));
            simulate_trial(config, &mut sampler)
        })
        .collect();
    Ok(trials)
}

/// One GBM path with annual steps. Assumes `config` has been validated.
pub fn simulate_trial<R: Rng>(config: &SimulationConfig, sampler: &mut NormalSampler<R>) -> Trial {
    let drift_term = config.drift - 0.5 * config.volatility * config.volatility;
    let mut policy_state = config.withdrawal.map(|policy| (policy, policy.start_trial()));
    let mut balance = config.initial_balance;
    let mut years = Vec::with_capacity(config.horizon_years as usize);

    for year in 1..=config.horizon_years {
        let z = sampler.sample();
        let log_return = drift_term + config.volatility * z;
        // Zero is absorbing; skipping exp() also keeps 0 * inf out of the path.
        let balance_pre = if balance > 0.0 {
            balance * log_return.exp()
        } else {
            0.0
        };

        let (withdrawal, balance_post) = match policy_state.as_mut() {
            Some((policy, state)) if year >= config.withdrawal_start_year => {
                let request = policy.request(state, balance_pre);
                apply_withdrawal(balance_pre, request)
            }
            _ => (0.0, balance_pre),
        };
        balance = balance_post;

        years.push(YearResult {
            year,
            balance,
            withdrawal,
            log_return,
        });
    }

    Trial { years }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::WithdrawalPolicy;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn sample_config() -> SimulationConfig {
        SimulationConfig {
            initial_balance: 1_000_000.0,
            drift: 0.07,
            volatility: 0.15,
            horizon_years: 30,
            withdrawal: Some(WithdrawalPolicy::Percentage { rate: 0.04 }),
            withdrawal_start_year: 1,
            trials: 200,
            seed: 42,
        }
    }

    fn deterministic_config() -> SimulationConfig {
        let mut config = sample_config();
        config.drift = 0.0;
        config.volatility = 0.0;
        config.trials = 1;
        config
    }

    #[test]
    fn rejects_invalid_config_before_running() {
        let mut config = sample_config();
        config.trials = 0;
        assert_eq!(run_monte_carlo(&config), Err(ConfigError::Trials));

        let mut config = sample_config();
        config.volatility = -0.1;
        assert_eq!(run_monte_carlo(&config), Err(ConfigError::Volatility(-0.1)));

        let mut config = sample_config();
        config.initial_balance = -5.0;
        assert_eq!(
            run_monte_carlo(&config),
            Err(ConfigError::InitialBalance(-5.0))
        );

        let mut config = sample_config();
        config.horizon_years = 0;
        assert_eq!(run_monte_carlo(&config), Err(ConfigError::Horizon));
    }

    #[test]
    fn zero_volatility_path_is_deterministic_growth() {
        let mut config = deterministic_config();
        config.drift = 0.05;
        config.withdrawal = None;
        config.horizon_years = 3;

        let trials = run_monte_carlo(&config).expect("valid config");
        let path = &trials[0].years;
        for (idx, row) in path.iter().enumerate() {
            let expected = 1_000_000.0 * (0.05 * (idx as f64 + 1.0)).exp();
            assert_approx_tol(row.balance, expected, 1e-6);
            assert_approx_tol(row.log_return, 0.05, 1e-12);
            assert_eq!(row.withdrawal, 0.0);
        }
    }

    #[test]
    fn percentage_policy_respects_start_year() {
        let mut config = sample_config();
        config.withdrawal_start_year = 5;
        config.trials = 50;

        for trial in run_monte_carlo(&config).expect("valid config") {
            for row in &trial.years {
                if row.year < 5 {
                    assert_eq!(row.withdrawal, 0.0);
                } else {
                    assert_approx_tol(
                        row.withdrawal,
                        row.pre_withdrawal_balance() * 0.04,
                        1e-6 * row.pre_withdrawal_balance().max(1.0),
                    );
                }
            }
        }
    }

    #[test]
    fn fixed_inflation_requests_compound_from_start_year() {
        let mut config = deterministic_config();
        config.initial_balance = 10_000_000.0;
        config.horizon_years = 10;
        config.withdrawal_start_year = 3;
        config.withdrawal = Some(WithdrawalPolicy::FixedWithInflation {
            initial_amount: 40_000.0,
            inflation: 0.03,
        });

        let trials = run_monte_carlo(&config).expect("valid config");
        for row in &trials[0].years {
            if row.year < 3 {
                assert_eq!(row.withdrawal, 0.0);
            } else {
                let expected = 40_000.0 * 1.03_f64.powi((row.year - 3) as i32);
                assert_approx_tol(row.withdrawal, expected, 1e-6);
            }
        }
    }

    #[test]
    fn withdrawal_larger_than_balance_empties_portfolio() {
        let mut config = deterministic_config();
        config.initial_balance = 30_000.0;
        config.horizon_years = 3;
        config.withdrawal = Some(WithdrawalPolicy::FixedWithInflation {
            initial_amount: 40_000.0,
            inflation: 0.02,
        });

        let trials = run_monte_carlo(&config).expect("valid config");
        let years = &trials[0].years;
        assert_approx_tol(years[0].withdrawal, 30_000.0, 1e-9);
        assert_eq!(years[0].balance, 0.0);
        for row in &years[1..] {
            assert_eq!(row.withdrawal, 0.0);
            assert_eq!(row.balance, 0.0);
        }
        assert_eq!(trials[0].depleted_in(), Some(1));
    }

    #[test]
    fn full_rate_percentage_withdraws_everything() {
        let mut config = sample_config();
        config.withdrawal = Some(WithdrawalPolicy::Percentage { rate: 1.0 });
        config.trials = 10;

        for trial in run_monte_carlo(&config).expect("valid config") {
            assert!(trial.years.iter().all(|row| row.balance == 0.0));
            assert!(trial.years[0].withdrawal > 0.0);
            assert!(trial.years[1..].iter().all(|row| row.withdrawal == 0.0));
        }
    }

    #[test]
    fn same_seed_same_trials_and_trials_differ() {
        let config = sample_config();
        let a = run_monte_carlo(&config).expect("valid config");
        let b = run_monte_carlo(&config).expect("valid config");
        assert_eq!(a, b);
        assert_ne!(a[0], a[1]);

        let mut reseeded = config.clone();
        reseeded.seed = 43;
        let c = run_monte_carlo(&reseeded).expect("valid config");
        assert_ne!(a[0], c[0]);
    }

    #[test]
    fn trial_matches_sequential_replay_of_its_stream() {
        let config = sample_config();
        let trials = run_monte_carlo(&config).expect("valid config");

        let mut sampler = NormalSampler::new(trial_rng(config.seed, 17));
        let replay = simulate_trial(&config, &mut sampler);
        assert_eq!(trials[17], replay);
    }

    #[test]
    fn gbm_terminal_mean_and_log_return_converge() {
        let config = SimulationConfig {
            initial_balance: 100.0,
            drift: 0.10,
            volatility: 0.20,
            horizon_years: 1,
            withdrawal: None,
            withdrawal_start_year: 1,
            trials: 100_000,
            seed: 2024,
        };
        let trials = run_monte_carlo(&config).expect("valid config");

        let n = trials.len() as f64;
        let mean_terminal = trials.iter().map(|t| t.final_balance()).sum::<f64>() / n;
        let mean_log = trials
            .iter()
            .map(|t| (t.final_balance() / 100.0).ln())
            .sum::<f64>()
            / n;

        let expected_terminal = 100.0 * 0.10_f64.exp();
        assert!(
            ((mean_terminal - expected_terminal) / expected_terminal).abs() < 0.02,
            "mean terminal {mean_terminal}, expected {expected_terminal}"
        );
        assert_approx_tol(mean_log, 0.10 - 0.5 * 0.04, 0.01);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(24))]

        #[test]
        fn prop_balances_non_negative_and_zero_is_absorbing(
            seed in any::<u64>(),
            drift_bp in -3_000i32..2_000,
            vol_bp in 0u32..8_000,
            horizon in 1u32..60,
            start_year in 1u32..20,
            use_fixed in any::<bool>(),
            rate_bp in 0u32..=10_000,
            amount in 1u32..200_000,
            inflation_bp in 0u32..1_000
        ) {
            let withdrawal = if use_fixed {
                WithdrawalPolicy::FixedWithInflation {
                    initial_amount: amount as f64,
                    inflation: inflation_bp as f64 / 10_000.0,
                }
            } else {
                WithdrawalPolicy::Percentage { rate: rate_bp as f64 / 10_000.0 }
            };
            let config = SimulationConfig {
                initial_balance: 500_000.0,
                drift: drift_bp as f64 / 10_000.0,
                volatility: vol_bp as f64 / 10_000.0,
                horizon_years: horizon,
                withdrawal: Some(withdrawal),
                withdrawal_start_year: start_year,
                trials: 8,
                seed,
            };

            for trial in run_monte_carlo(&config).expect("valid config") {
                prop_assert_eq!(trial.years.len(), horizon as usize);
                let mut exhausted = false;
                for row in &trial.years {
                    prop_assert!(row.balance >= 0.0);
                    prop_assert!(row.withdrawal >= 0.0);
                    if exhausted {
                        prop_assert_eq!(row.balance, 0.0);
                        prop_assert_eq!(row.withdrawal, 0.0);
                    }
                    if row.balance == 0.0 {
                        exhausted = true;
                    }
                }
            }
        }
    }
}
