use super::types::{AggregateResult, PercentileValue, SeriesSummary, Trial, YearSummary};

pub const DEFAULT_PERCENTILES: [f64; 3] = [5.0, 50.0, 95.0];

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation with Bessel's correction; 0 for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss = values.iter().map(|x| (x - m) * (x - m)).sum::<f64>();
    (ss / (n as f64 - 1.0)).sqrt()
}

/// Nearest-rank percentile over an ascending slice: `sorted[floor(n * p / 100)]`,
/// zero-indexed, with the index clamped to the last element.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (n as f64 * p / 100.0).floor().max(0.0) as usize;
    sorted[rank.min(n - 1)]
}

fn sort_ascending(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

fn percentile_values(sorted: &[f64], percentiles: &[f64]) -> Vec<PercentileValue> {
    percentiles
        .iter()
        .map(|&p| PercentileValue {
            percentile: p,
            value: percentile(sorted, p),
        })
        .collect()
}

pub fn summarize_series(values: &[f64], percentiles: &[f64]) -> SeriesSummary {
    let mut sorted = values.to_vec();
    sort_ascending(&mut sorted);

    SeriesSummary {
        count: sorted.len(),
        mean: mean(&sorted),
        std_dev: sample_std_dev(&sorted),
        min: sorted.first().copied().unwrap_or(0.0),
        max: sorted.last().copied().unwrap_or(0.0),
        percentiles: percentile_values(&sorted, percentiles),
    }
}

pub fn aggregate(trials: &[Trial], percentiles: &[f64]) -> AggregateResult {
    let year_count = trials.iter().map(|t| t.years.len()).max().unwrap_or(0);
    let mut balances = Vec::with_capacity(trials.len());
    let mut withdrawals = Vec::with_capacity(trials.len());
    let mut years = Vec::with_capacity(year_count);

    for idx in 0..year_count {
        balances.clear();
        withdrawals.clear();
        let mut year = idx as u32 + 1;
        for row in trials.iter().filter_map(|t| t.years.get(idx)) {
            year = row.year;
            balances.push(row.balance);
            withdrawals.push(row.withdrawal);
        }

        sort_ascending(&mut balances);
        sort_ascending(&mut withdrawals);
        let depleted = balances.iter().filter(|b| **b <= 0.0).count();

        years.push(YearSummary {
            year,
            mean_balance: mean(&balances),
            std_dev_balance: sample_std_dev(&balances),
            median_balance: percentile(&balances, 50.0),
            balance_percentiles: percentile_values(&balances, percentiles),
            mean_withdrawal: mean(&withdrawals),
            median_withdrawal: percentile(&withdrawals, 50.0),
            depleted_fraction: depleted as f64 / balances.len().max(1) as f64,
        });
    }

    let survivors = trials.iter().filter(|t| t.final_balance() > 0.0).count();
    AggregateResult {
        trial_count: trials.len(),
        success_rate: survivors as f64 / trials.len().max(1) as f64,
        years,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::YearResult;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn trial(balances: &[f64]) -> Trial {
        Trial {
            years: balances
                .iter()
                .enumerate()
                .map(|(idx, &balance)| YearResult {
                    year: idx as u32 + 1,
                    balance,
                    withdrawal: 0.0,
                    log_return: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn percentile_uses_floor_rank_zero_indexed() {
        let values = (1..=100).map(|v| v as f64).collect::<Vec<_>>();
        assert_approx(percentile(&values, 5.0), 6.0);
        assert_approx(percentile(&values, 50.0), 51.0);
        assert_approx(percentile(&values, 95.0), 96.0);
        assert_approx(percentile(&values, 0.0), 1.0);
        assert_approx(percentile(&values, 100.0), 100.0);
    }

    #[test]
    fn percentile_of_single_value_is_that_value() {
        assert_approx(percentile(&[42.0], 5.0), 42.0);
        assert_approx(percentile(&[42.0], 95.0), 42.0);
        assert_approx(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn sample_std_dev_applies_bessel_correction() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_approx(mean(&values), 5.0);
        assert_approx(sample_std_dev(&values), (32.0_f64 / 7.0).sqrt());
    }

    #[test]
    fn std_dev_is_zero_for_a_single_trial() {
        assert_eq!(sample_std_dev(&[123.0]), 0.0);
        let result = aggregate(&[trial(&[10.0, 20.0])], &DEFAULT_PERCENTILES);
        assert_eq!(result.years[1].std_dev_balance, 0.0);
        assert_approx(result.years[1].median_balance, 20.0);
    }

    #[test]
    fn aggregate_reduces_each_year_independently() {
        let trials = vec![
            trial(&[100.0, 0.0]),
            trial(&[300.0, 50.0]),
            trial(&[200.0, 25.0]),
            trial(&[400.0, 75.0]),
        ];
        let result = aggregate(&trials, &[25.0, 50.0]);

        assert_eq!(result.trial_count, 4);
        assert_eq!(result.years.len(), 2);
        assert_approx(result.success_rate, 0.75);

        let first = &result.years[0];
        assert_eq!(first.year, 1);
        assert_approx(first.mean_balance, 250.0);
        assert_approx(first.median_balance, 300.0);
        assert_eq!(first.balance_at(25.0), Some(200.0));
        assert_approx(first.depleted_fraction, 0.0);

        let second = &result.years[1];
        assert_eq!(second.year, 2);
        assert_approx(second.mean_balance, 37.5);
        assert_approx(second.depleted_fraction, 0.25);
    }

    #[test]
    fn aggregate_is_independent_of_trial_order() {
        let mut trials = vec![trial(&[5.0]), trial(&[1.0]), trial(&[3.0]), trial(&[2.0])];
        let forward = aggregate(&trials, &DEFAULT_PERCENTILES);
        trials.reverse();
        let backward = aggregate(&trials, &DEFAULT_PERCENTILES);

        assert_eq!(
            forward.years[0].balance_percentiles,
            backward.years[0].balance_percentiles
        );
        assert_approx(forward.years[0].mean_balance, backward.years[0].mean_balance);
    }

    #[test]
    fn summarize_series_reports_extremes() {
        let summary = summarize_series(&[0.1, -0.2, 0.3, 0.05], &[50.0]);
        assert_eq!(summary.count, 4);
        assert_approx(summary.min, -0.2);
        assert_approx(summary.max, 0.3);
        assert_approx(summary.mean, 0.0625);
        assert_approx(summary.percentiles[0].value, 0.1);
    }
}
