use std::fmt::Write;

use serde::Serialize;

use crate::core::{
    AggregateResult, ConfigError, GbmDiagnostics, NormalDiagnostics, NormalSampler, SeriesSummary,
    SimulationConfig, WithdrawalPolicy, aggregate, gbm_diagnostics, normal_diagnostics,
    run_monte_carlo, summarize_series, trial_rng,
};
use crate::history::{AnnualReturn, HistoricalReturns, HistorySource};

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticSettings {
    pub normal_draws: usize,
    pub gbm_trials: u32,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            normal_draws: 100_000,
            gbm_trials: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryReport {
    pub source: HistorySource,
    pub years: usize,
    pub newest: Option<AnnualReturn>,
    pub oldest: Option<AnnualReturn>,
    pub best: Option<AnnualReturn>,
    pub worst: Option<AnnualReturn>,
    pub summary: SeriesSummary,
    pub implied_drift: f64,
    pub implied_volatility: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub normal: NormalDiagnostics,
    pub gbm: GbmDiagnostics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub config: SimulationConfig,
    pub percentiles: Vec<f64>,
    pub history: HistoryReport,
    pub simulation: AggregateResult,
    pub terminal_balance: SeriesSummary,
    pub simulated_returns: SeriesSummary,
    pub diagnostics: Option<DiagnosticsReport>,
}

pub fn build_report(
    config: &SimulationConfig,
    percentiles: &[f64],
    history: &HistoricalReturns,
    diagnostics: Option<DiagnosticSettings>,
) -> Result<Report, ConfigError> {
    if let Some(&p) = percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(ConfigError::Percentile(p));
    }

    let trials = run_monte_carlo(config)?;
    let simulation = aggregate(&trials, percentiles);
    let terminals = trials.iter().map(|t| t.final_balance()).collect::<Vec<_>>();
    let simple_returns = trials
        .iter()
        .flat_map(|t| t.years.iter().map(|y| y.log_return.exp_m1()))
        .collect::<Vec<_>>();
    drop(trials);

    let diagnostics = match diagnostics {
        Some(settings) => {
            let mut sampler = NormalSampler::new(trial_rng(config.seed, u32::MAX));
            Some(DiagnosticsReport {
                normal: normal_diagnostics(&mut sampler, settings.normal_draws),
                gbm: gbm_diagnostics(
                    config.initial_balance,
                    config.drift,
                    config.volatility,
                    settings.gbm_trials,
                    config.seed,
                )?,
            })
        }
        None => None,
    };

    let (implied_drift, implied_volatility) = history.gbm_parameters();
    Ok(Report {
        config: config.clone(),
        percentiles: percentiles.to_vec(),
        history: HistoryReport {
            source: history.source(),
            years: history.len(),
            newest: history.newest(),
            oldest: history.oldest(),
            best: history.best_year(),
            worst: history.worst_year(),
            summary: history.summary(percentiles),
            implied_drift,
            implied_volatility,
        },
        simulation,
        terminal_balance: summarize_series(&terminals, percentiles),
        simulated_returns: summarize_series(&simple_returns, percentiles),
        diagnostics,
    })
}

pub fn render_json(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text(&mut out, report);
    out
}

fn write_text(out: &mut String, report: &Report) -> std::fmt::Result {
    let config = &report.config;
    writeln!(out, "Portfolio projection")?;
    writeln!(out, "  initial balance   {}", money(config.initial_balance))?;
    writeln!(
        out,
        "  drift / vol       {} / {}",
        pct(config.drift),
        pct(config.volatility)
    )?;
    writeln!(out, "  horizon           {} years", config.horizon_years)?;
    writeln!(out, "  withdrawals       {}", describe_withdrawal(config))?;
    writeln!(out, "  trials            {} (seed {})", config.trials, config.seed)?;

    let history = &report.history;
    writeln!(out)?;
    match (history.oldest, history.newest) {
        (Some(oldest), Some(newest)) => writeln!(
            out,
            "Historical returns ({}, {}-{}, {} years)",
            source_label(history.source),
            oldest.year,
            newest.year,
            history.years
        )?,
        _ => writeln!(out, "Historical returns ({})", source_label(history.source))?,
    }
    write_series(out, &history.summary, pct)?;
    if let (Some(best), Some(worst)) = (history.best, history.worst) {
        writeln!(
            out,
            "  best {} {}   worst {} {}",
            best.year,
            pct(best.total_return),
            worst.year,
            pct(worst.total_return)
        )?;
    }
    writeln!(
        out,
        "  implied GBM drift {}  volatility {}",
        pct(history.implied_drift),
        pct(history.implied_volatility)
    )?;

    writeln!(out)?;
    writeln!(out, "Simulated annual returns")?;
    write_series(out, &report.simulated_returns, pct)?;

    writeln!(out)?;
    writeln!(out, "Balance by year")?;
    let mut header = format!("  {:>4} {:>16} {:>16}", "year", "mean", "std dev");
    for p in &report.percentiles {
        let _ = write!(header, " {:>16}", format!("p{p}"));
    }
    let _ = write!(header, " {:>14} {:>9}", "withdrawn", "depleted");
    writeln!(out, "{header}")?;
    for year in &report.simulation.years {
        write!(
            out,
            "  {:>4} {:>16} {:>16}",
            year.year,
            money(year.mean_balance),
            money(year.std_dev_balance)
        )?;
        for p in &year.balance_percentiles {
            write!(out, " {:>16}", money(p.value))?;
        }
        writeln!(
            out,
            " {:>14} {:>9}",
            money(year.median_withdrawal),
            pct(year.depleted_fraction)
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Terminal balance")?;
    write_series(out, &report.terminal_balance, money)?;
    writeln!(
        out,
        "Success rate: {} of trials end with a positive balance",
        pct(report.simulation.success_rate)
    )?;

    if let Some(diag) = &report.diagnostics {
        let normal = &diag.normal;
        let gbm = &diag.gbm;
        writeln!(out)?;
        writeln!(out, "Diagnostics")?;
        writeln!(
            out,
            "  Box-Muller ({} draws): mean {:.4}, std dev {:.4}, \
             within 1 sd {}, within 2 sd {} [{}]",
            normal.draws,
            normal.mean,
            normal.std_dev,
            pct(normal.within_one_sigma),
            pct(normal.within_two_sigma),
            verdict(normal.passed())
        )?;
        writeln!(
            out,
            "  GBM one-year ({} trials): mean terminal {} vs {} ({:.3}% off), \
             mean log-return {:.4} vs {:.4} [{}]",
            gbm.trials,
            money(gbm.mean_terminal),
            money(gbm.expected_terminal),
            gbm.terminal_relative_error * 100.0,
            gbm.mean_log_return,
            gbm.expected_log_return,
            verdict(gbm.passed)
        )?;
    }

    Ok(())
}

fn write_series(
    out: &mut String,
    summary: &SeriesSummary,
    fmt_value: fn(f64) -> String,
) -> std::fmt::Result {
    writeln!(
        out,
        "  n {}  mean {}  std dev {}  min {}  max {}",
        summary.count,
        fmt_value(summary.mean),
        fmt_value(summary.std_dev),
        fmt_value(summary.min),
        fmt_value(summary.max)
    )?;
    if !summary.percentiles.is_empty() {
        let bands = summary
            .percentiles
            .iter()
            .map(|p| format!("p{} {}", p.percentile, fmt_value(p.value)))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "  {bands}")?;
    }
    Ok(())
}

fn describe_withdrawal(config: &SimulationConfig) -> String {
    match config.withdrawal {
        None => "none".to_string(),
        Some(WithdrawalPolicy::Percentage { rate }) => format!(
            "{} of balance from year {}",
            pct(rate),
            config.withdrawal_start_year
        ),
        Some(WithdrawalPolicy::FixedWithInflation {
            initial_amount,
            inflation,
        }) => format!(
            "{} rising {}/yr from year {}",
            money(initial_amount),
            pct(inflation),
            config.withdrawal_start_year
        ),
    }
}

fn source_label(source: HistorySource) -> &'static str {
    match source {
        HistorySource::Remote => "remote feed",
        HistorySource::Embedded => "embedded table",
    }
}

fn verdict(passed: bool) -> &'static str {
    if passed { "PASS" } else { "FAIL" }
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Two decimals with thousands separators, e.g. `-1,234,567.89`.
fn money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}
