use crate::analyzer::indicators::IndicatorSet;
use crate::analyzer::{Frame, LevelDetector, LevelSet};
use crate::config::{FactsConfig, LevelConfig};
use crate::facts::{
    DerivsBlock, EmaBlock, EventsBlock, FactPack, MacdBlock, PriceBlock, PriceVsAverage, Regime,
    SmaBlock, TrendBlock,
};
use crate::model::{Column, Horizon, IndicatorError, IntelBundle, NewsItem, Risk};
use crate::utils::{pct_change, round_opt};
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Reverse;
use tracing::debug;

/// Assembles a [`FactPack`] from an [`IntelBundle`].
pub struct FactCompactor {
    detector: LevelDetector,
    news_limit: usize,
}

impl FactCompactor {
    pub fn new(levels: LevelConfig, facts: &FactsConfig) -> Self {
        Self {
            detector: LevelDetector::new(levels),
            news_limit: facts.news_limit,
        }
    }

    pub fn build(
        &self,
        bundle: &IntelBundle,
        horizon: Horizon,
        risk: Risk,
    ) -> Result<FactPack, IndicatorError> {
        self.build_at(bundle, horizon, risk, Utc::now())
    }

    /// As [`build`](Self::build), with events judged relative to `as_of`.
    pub fn build_at(
        &self,
        bundle: &IntelBundle,
        horizon: Horizon,
        risk: Risk,
        as_of: DateTime<Utc>,
    ) -> Result<FactPack, IndicatorError> {
        let frame = Frame::from_bars(&bundle.bars);
        let prev = bundle.quote.as_ref().and_then(|q| q.prev_close);
        let last = frame.last(Column::Close).or(prev).filter(|v| v.is_finite());

        let (indicators, levels) = if frame.is_empty() {
            (IndicatorSet::default(), LevelSet::default())
        } else {
            (IndicatorSet::latest(&frame)?, self.detector.detect(&frame)?)
        };
        debug!(
            "{}: {} bars, {} supports, {} resistances",
            bundle.symbol,
            frame.len(),
            levels.support.len(),
            levels.resistance.len()
        );

        Ok(FactPack {
            symbol: bundle.symbol.clone(),
            horizon,
            risk,
            price: PriceBlock {
                last: round_opt(last, 2),
                prev: round_opt(prev, 2),
                chg: round_opt(pct_change(last, prev), 3),
            },
            trend: trend_block(&indicators, last),
            levels,
            derivs: derivs_block(bundle, last),
            events: events_block(bundle, as_of),
            news: self.headlines(&bundle.news),
        })
    }

    /// Most recent titles first; undated items keep provider order at the end.
    fn headlines(&self, news: &[NewsItem]) -> Vec<String> {
        let mut items: Vec<&NewsItem> = news.iter().filter(|n| !n.title.trim().is_empty()).collect();
        items.sort_by_key(|n| Reverse(n.published_at));
        items
            .into_iter()
            .take(self.news_limit)
            .map(|n| n.title.trim().to_string())
            .collect()
    }
}

fn regime(s50: Option<f64>, s200: Option<f64>) -> Option<Regime> {
    let (s50, s200) = (s50?, s200?);
    Some(if s50 > s200 {
        Regime::Up
    } else if s50 < s200 {
        Regime::Down
    } else {
        Regime::Side
    })
}

fn trend_block(ind: &IndicatorSet, last: Option<f64>) -> TrendBlock {
    let px_vs_200 = match (last, ind.sma200) {
        (Some(px), Some(avg)) if px > avg => Some(PriceVsAverage::Above),
        (Some(px), Some(avg)) if px < avg => Some(PriceVsAverage::Below),
        _ => None,
    };

    TrendBlock {
        dir: regime(ind.sma50, ind.sma200),
        rsi: round_opt(ind.rsi14, 1),
        macd: ind.macd.map(|m| MacdBlock {
            line: round_opt(Some(m.line), 3),
            sig: round_opt(m.signal, 3),
            hist: round_opt(m.histogram, 3),
        }),
        sma: SmaBlock {
            s20: round_opt(ind.sma20, 2),
            s50: round_opt(ind.sma50, 2),
            s200: round_opt(ind.sma200, 2),
        },
        ema: EmaBlock {
            e21: round_opt(ind.ema21, 2),
        },
        vwap: round_opt(ind.vwap, 2),
        atr: round_opt(ind.atr14, 2),
        bbw: round_opt(ind.bb_width, 3),
        vol20: round_opt(ind.vol20, 0),
        s20_gt_s50: matches!((ind.sma20, ind.sma50), (Some(a), Some(b)) if a > b),
        px_vs_200,
    }
}

fn derivs_block(bundle: &IntelBundle, last: Option<f64>) -> Option<DerivsBlock> {
    let funding = bundle.derivatives.funding.as_ref().map(|f| f.rate);
    let oi = bundle.derivatives.open_interest.as_ref().map(|o| o.amount);
    if funding.is_none() && oi.is_none() {
        return None;
    }

    let notional = match (oi, last) {
        (Some(amount), Some(px)) => Some(amount * px),
        _ => None,
    };
    Some(DerivsBlock {
        funding: round_opt(funding, 5),
        oi: round_opt(oi, 2),
        oi_notional: round_opt(notional, 0),
    })
}

/// Earliest date strictly after `as_of`.
fn next_after<I>(dates: I, as_of: DateTime<Utc>) -> Option<NaiveDate>
where
    I: IntoIterator<Item = Option<DateTime<Utc>>>,
{
    dates
        .into_iter()
        .flatten()
        .filter(|d| *d > as_of)
        .min()
        .map(|d| d.date_naive())
}

fn events_block(bundle: &IntelBundle, as_of: DateTime<Utc>) -> EventsBlock {
    EventsBlock {
        next_earn: next_after(bundle.events.earnings.iter().map(|e| e.report_date), as_of),
        div_ex: next_after(bundle.events.dividends.iter().map(|d| d.ex_dividend_date), as_of),
    }
}
