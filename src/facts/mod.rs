//! The fact pack: a compact, pruned JSON summary of one symbol's price,
//! indicator, level and event state, sent to the model service.
//!
//! Numbers are rounded when the pack is built; nulls and empty containers are
//! pruned when it is serialized. Non-finite numbers never reach the wire:
//! rounding maps them to `None`, and pruning removes the resulting nulls.

pub mod compactor;
pub mod prune;

pub use compactor::FactCompactor;

use crate::analyzer::LevelSet;
use crate::model::{Horizon, Risk};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Up,
    Down,
    Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceVsAverage {
    Above,
    Below,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceBlock {
    pub last: Option<f64>,
    pub prev: Option<f64>,
    pub chg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdBlock {
    pub line: Option<f64>,
    pub sig: Option<f64>,
    pub hist: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SmaBlock {
    pub s20: Option<f64>,
    pub s50: Option<f64>,
    pub s200: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmaBlock {
    pub e21: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendBlock {
    pub dir: Option<Regime>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdBlock>,
    pub sma: SmaBlock,
    pub ema: EmaBlock,
    pub vwap: Option<f64>,
    pub atr: Option<f64>,
    pub bbw: Option<f64>,
    pub vol20: Option<f64>,
    pub s20_gt_s50: bool,
    pub px_vs_200: Option<PriceVsAverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivsBlock {
    pub funding: Option<f64>,
    pub oi: Option<f64>,
    pub oi_notional: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventsBlock {
    pub next_earn: Option<NaiveDate>,
    pub div_ex: Option<NaiveDate>,
}

/// Built fresh per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FactPack {
    pub symbol: String,
    pub horizon: Horizon,
    pub risk: Risk,
    pub price: PriceBlock,
    pub trend: TrendBlock,
    pub levels: LevelSet,
    pub derivs: Option<DerivsBlock>,
    pub events: EventsBlock,
    pub news: Vec<String>,
}

impl FactPack {
    /// The wire form, with every empty field removed.
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "symbol": self.symbol,
            "horizon": self.horizon,
            "risk": self.risk,
            "price": self.price,
            "trend": self.trend,
            "levels": self.levels,
            "derivs": self.derivs,
            "events": self.events,
            "news": self.news,
        });
        prune::prune(&mut value);
        value
    }

    /// Compact single-line JSON, as embedded in the model prompt.
    pub fn to_compact_json(&self) -> String {
        self.to_value().to_string()
    }
}

impl Serialize for FactPack {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}
