//! Annual total-return history for the US large-cap market.
//!
//! A remote feed is tried once; any failure falls back to the table compiled into the
//! binary, so a projection never fails because of the network.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::{SeriesSummary, mean, sample_std_dev, summarize_series};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// S&P 500 total returns as fractions, newest year first (1926-2024).
pub const EMBEDDED_TOTAL_RETURNS: [(u32, f64); 99] = [
    (2024, 0.2502),
    (2023, 0.2629),
    (2022, -0.1811),
    (2021, 0.2871),
    (2020, 0.184),
    (2019, 0.3149),
    (2018, -0.0438),
    (2017, 0.2183),
    (2016, 0.1196),
    (2015, 0.0138),
    (2014, 0.1369),
    (2013, 0.3239),
    (2012, 0.16),
    (2011, 0.0211),
    (2010, 0.1506),
    (2009, 0.2646),
    (2008, -0.37),
    (2007, 0.0549),
    (2006, 0.1579),
    (2005, 0.0491),
    (2004, 0.1088),
    (2003, 0.2868),
    (2002, -0.221),
    (2001, -0.1189),
    (2000, -0.091),
    (1999, 0.2104),
    (1998, 0.2858),
    (1997, 0.3336),
    (1996, 0.2296),
    (1995, 0.3758),
    (1994, 0.0132),
    (1993, 0.1008),
    (1992, 0.0762),
    (1991, 0.3047),
    (1990, -0.031),
    (1989, 0.3169),
    (1988, 0.1661),
    (1987, 0.0525),
    (1986, 0.1867),
    (1985, 0.3173),
    (1984, 0.0627),
    (1983, 0.2256),
    (1982, 0.2155),
    (1981, -0.0491),
    (1980, 0.3242),
    (1979, 0.1844),
    (1978, 0.0656),
    (1977, -0.0718),
    (1976, 0.2384),
    (1975, 0.372),
    (1974, -0.2647),
    (1973, -0.1466),
    (1972, 0.1898),
    (1971, 0.1431),
    (1970, 0.0401),
    (1969, -0.085),
    (1968, 0.1106),
    (1967, 0.2398),
    (1966, -0.1006),
    (1965, 0.1245),
    (1964, 0.1648),
    (1963, 0.228),
    (1962, -0.0873),
    (1961, 0.2689),
    (1960, 0.0047),
    (1959, 0.1196),
    (1958, 0.4336),
    (1957, -0.1078),
    (1956, 0.0656),
    (1955, 0.3156),
    (1954, 0.5262),
    (1953, -0.0099),
    (1952, 0.1837),
    (1951, 0.2402),
    (1950, 0.3171),
    (1949, 0.1879),
    (1948, 0.055),
    (1947, 0.0571),
    (1946, -0.0807),
    (1945, 0.3644),
    (1944, 0.1975),
    (1943, 0.259),
    (1942, 0.2034),
    (1941, -0.1159),
    (1940, -0.0978),
    (1939, -0.0041),
    (1938, 0.3112),
    (1937, -0.3503),
    (1936, 0.3392),
    (1935, 0.4767),
    (1934, -0.0144),
    (1933, 0.5399),
    (1932, -0.0819),
    (1931, -0.4334),
    (1930, -0.249),
    (1929, -0.0842),
    (1928, 0.4361),
    (1927, 0.3749),
    (1926, 0.1162),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualReturn {
    pub year: u32,
    pub total_return: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    Remote,
    Embedded,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed body: {0}")]
    Malformed(String),
    #[error("feed returned no entries")]
    Empty,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedEntry {
    year: u32,
    /// Percent, e.g. 25.02 for a 25.02% year.
    total_return: f64,
}

#[derive(Debug, Clone)]
pub struct HistoricalReturns {
    source: HistorySource,
    returns: Vec<AnnualReturn>,
}

impl HistoricalReturns {
    pub fn embedded() -> Self {
        Self {
            source: HistorySource::Embedded,
            returns: EMBEDDED_TOTAL_RETURNS
                .iter()
                .map(|&(year, total_return)| AnnualReturn { year, total_return })
                .collect(),
        }
    }

    pub fn source(&self) -> HistorySource {
        self.source
    }

    /// Newest year first.
    pub fn returns(&self) -> &[AnnualReturn] {
        &self.returns
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn newest(&self) -> Option<AnnualReturn> {
        self.returns.first().copied()
    }

    pub fn oldest(&self) -> Option<AnnualReturn> {
        self.returns.last().copied()
    }

    pub fn best_year(&self) -> Option<AnnualReturn> {
        self.returns
            .iter()
            .copied()
            .max_by(|a, b| a.total_return.total_cmp(&b.total_return))
    }

    pub fn worst_year(&self) -> Option<AnnualReturn> {
        self.returns
            .iter()
            .copied()
            .min_by(|a, b| a.total_return.total_cmp(&b.total_return))
    }

    pub fn total_returns(&self) -> Vec<f64> {
        self.returns.iter().map(|r| r.total_return).collect()
    }

    pub fn summary(&self, percentiles: &[f64]) -> SeriesSummary {
        summarize_series(&self.total_returns(), percentiles)
    }

    /// GBM `(drift, volatility)` implied by the series: volatility is the sample std dev
    /// of `ln(1 + r)` and drift its mean plus half the variance.
    pub fn gbm_parameters(&self) -> (f64, f64) {
        let log_returns = self
            .returns
            .iter()
            .map(|r| r.total_return.ln_1p())
            .collect::<Vec<_>>();
        let volatility = sample_std_dev(&log_returns);
        let drift = mean(&log_returns) + 0.5 * volatility * volatility;
        (drift, volatility)
    }
}

pub async fn fetch_historical_returns(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<AnnualReturn>, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = response.text().await?;
    parse_feed(&body)
}

/// Parses a feed body of `[{ "year": 2024, "totalReturn": 25.02 }, ...]` into fractions,
/// newest year first.
pub fn parse_feed(body: &str) -> Result<Vec<AnnualReturn>, FetchError> {
    let entries = serde_json::from_str::<Vec<FeedEntry>>(body)
        .map_err(|e| FetchError::Malformed(e.to_string()))?;
    if entries.is_empty() {
        return Err(FetchError::Empty);
    }

    let mut returns = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.total_return <= -100.0 {
            return Err(FetchError::Malformed(format!(
                "year {} has total return {}%",
                entry.year, entry.total_return
            )));
        }
        returns.push(AnnualReturn {
            year: entry.year,
            total_return: entry.total_return / 100.0,
        });
    }

    returns.sort_by(|a, b| b.year.cmp(&a.year));
    if let Some(pair) = returns.windows(2).find(|w| w[0].year == w[1].year) {
        return Err(FetchError::Malformed(format!(
            "duplicate year {}",
            pair[0].year
        )));
    }
    Ok(returns)
}

/// Resolves the series to use: the fetched one when it succeeded, otherwise the
/// embedded table.
pub fn resolve_history(fetched: Result<Vec<AnnualReturn>, FetchError>) -> HistoricalReturns {
    match fetched {
        Ok(returns) => {
            info!(years = returns.len(), "using remote historical returns");
            HistoricalReturns {
                source: HistorySource::Remote,
                returns,
            }
        }
        Err(e) => {
            warn!(error = %e, "historical data fetch failed; using embedded table");
            HistoricalReturns::embedded()
        }
    }
}

/// Fetches once from `url` (if any) and never fails.
pub async fn load_historical_returns(url: Option<&str>, timeout: Duration) -> HistoricalReturns {
    let Some(url) = url else {
        info!("no history url configured; using embedded table");
        return HistoricalReturns::embedded();
    };

    let fetched = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => fetch_historical_returns(&client, url).await,
        Err(e) => Err(FetchError::Transport(e)),
    };
    resolve_history(fetched)
}
