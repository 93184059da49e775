// Core structs: Bar, Quote, news/event records, IntelBundle
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One OHLCV observation. `t` is epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(alias = "timestamp")]
    pub t: i64,
    #[serde(alias = "o")]
    pub open: f64,
    #[serde(alias = "h")]
    pub high: f64,
    #[serde(alias = "l")]
    pub low: f64,
    #[serde(alias = "c")]
    pub close: f64,
    #[serde(alias = "v", default)]
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    #[serde(alias = "prevClose")]
    pub prev_close: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dividend {
    pub cash_amount: Option<f64>,
    pub declaration_date: Option<DateTime<Utc>>,
    pub ex_dividend_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub record_date: Option<DateTime<Utc>>,
    /// Payments per year (1 = annual, 4 = quarterly).
    pub frequency: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Split {
    /// e.g. "4/1"
    pub ratio: String,
    pub execution_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Earnings {
    pub fiscal_period: Option<String>,
    pub eps: Option<f64>,
    pub consensus_eps: Option<f64>,
    pub report_date: Option<DateTime<Utc>>,
    pub surprise: Option<f64>,
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funding {
    pub symbol: String,
    pub rate: f64,
    pub next_funding_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterest {
    pub symbol: String,
    /// Contracts outstanding, in base-asset units.
    pub amount: f64,
    pub as_of: Option<DateTime<Utc>>,
}

/// Corporate events for an equity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorporateEvents {
    #[serde(default)]
    pub dividends: Vec<Dividend>,
    #[serde(default)]
    pub splits: Vec<Split>,
    #[serde(default)]
    pub earnings: Vec<Earnings>,
}

/// Perpetual-futures statistics for a crypto pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Derivatives {
    pub funding: Option<Funding>,
    pub open_interest: Option<OpenInterest>,
}

/// Everything the data-acquisition layer hands over for one symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntelBundle {
    pub symbol: String,
    pub quote: Option<Quote>,
    #[serde(default)]
    pub bars: Vec<Bar>,
    #[serde(default)]
    pub news: Vec<NewsItem>,
    #[serde(default, flatten)]
    pub events: CorporateEvents,
    #[serde(default, flatten)]
    pub derivatives: Derivatives,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    Intraday,
    #[default]
    Swing,
    Position,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    #[default]
    Medium,
    High,
}

impl Horizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Intraday => "intraday",
            Horizon::Swing => "swing",
            Horizon::Position => "position",
        }
    }
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Horizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "intraday" => Ok(Horizon::Intraday),
            "swing" => Ok(Horizon::Swing),
            "position" => Ok(Horizon::Position),
            other => Err(format!("unknown horizon '{}' (intraday|swing|position)", other)),
        }
    }
}

impl FromStr for Risk {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Risk::Low),
            "medium" => Ok(Risk::Medium),
            "high" => Ok(Risk::High),
            other => Err(format!("unknown risk '{}' (low|medium|high)", other)),
        }
    }
}

/// Named columns of an OHLCV frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Column::Open => "open",
            Column::High => "high",
            Column::Low => "low",
            Column::Close => "close",
            Column::Volume => "volume",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("series is missing column '{0}'")]
    MissingColumn(Column),

    #[error("{name}: window must be >= 1 (got {window})")]
    InvalidWindow { name: &'static str, window: usize },

    #[error("series is empty")]
    EmptySeries,

    #[error("column '{column}' has {got} values, expected {expected}")]
    LengthMismatch {
        column: Column,
        expected: usize,
        got: usize,
    },
}

/// Faults of the data-acquisition layer. Kept apart from analysis failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode market data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no data for symbol '{0}'")]
    UnknownSymbol(String),

    #[error("transport error: {0}")]
    Transport(String),
}
