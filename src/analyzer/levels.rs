use crate::analyzer::frame::Frame;
use crate::analyzer::indicators::atr;
use crate::config::LevelConfig;
use crate::model::{Column, IndicatorError};
use crate::utils::round_to;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Support and resistance prices, each list ascending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    #[serde(default)]
    pub support: Vec<f64>,
    #[serde(default)]
    pub resistance: Vec<f64>,
}

impl LevelSet {
    pub fn is_empty(&self) -> bool {
        self.support.is_empty() && self.resistance.is_empty()
    }
}

/// Result of one detection pass, with the bin width used to score it.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelScan {
    pub levels: LevelSet,
    pub step: f64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    price: f64,
    score: f64,
}

/// Swing-weighted price histogram over the trailing bars.
pub struct LevelDetector {
    cfg: LevelConfig,
}

impl LevelDetector {
    pub fn new(cfg: LevelConfig) -> Self {
        Self { cfg }
    }

    pub fn detect(&self, frame: &Frame) -> Result<LevelSet, IndicatorError> {
        Ok(self.scan(frame)?.map(|s| s.levels).unwrap_or_default())
    }

    /// `None` for an empty frame.
    pub fn scan(&self, frame: &Frame) -> Result<Option<LevelScan>, IndicatorError> {
        frame.require(&[Column::High, Column::Low, Column::Close])?;
        if frame.is_empty() {
            return Ok(None);
        }

        let tail = frame.tail(self.cfg.lookback.max(1));
        let high = tail.column(Column::High)?;
        let low = tail.column(Column::Low)?;
        let close = tail.column(Column::Close)?;
        let last = close[close.len() - 1];

        let step = self.bin_step(&tail, last)?;

        let prices: Vec<f64> = close
            .iter()
            .chain(high)
            .chain(low)
            .copied()
            .filter(|p| p.is_finite())
            .collect();
        if prices.is_empty() || !last.is_finite() {
            return Ok(Some(LevelScan {
                levels: LevelSet::default(),
                step,
            }));
        }

        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let bins = (((max - min) / step).ceil() as usize).max(1);

        let mut buckets: Vec<Bucket> = (0..bins)
            .map(|i| Bucket {
                price: min + (i as f64 + 0.5) * step,
                score: 0.0,
            })
            .collect();

        for p in &prices {
            let idx = (((p - min) / step).floor() as usize).min(bins - 1);
            buckets[idx].score += 1.0;
        }

        // Both extremes of a swing bar count toward the nearest bucket centre.
        let first_center = buckets[0].price;
        for i in self.swing_bars(high, low) {
            for p in [high[i], low[i]] {
                if !p.is_finite() {
                    continue;
                }
                let raw = ((p - first_center) / step).round_ties_even();
                let idx = raw.clamp(0.0, (bins - 1) as f64) as usize;
                buckets[idx].score += self.cfg.swing_weight;
            }
        }

        let support: Vec<Bucket> = buckets.iter().copied().filter(|b| b.price <= last).collect();
        let resistance: Vec<Bucket> = buckets.iter().copied().filter(|b| b.price >= last).collect();

        // Sides are re-checked after rounding to cents.
        let support = cents(self.pick(support, step), |p| p <= last);
        let resistance = cents(self.pick(resistance, step), |p| p >= last);

        // Keep the levels nearest the last close.
        let n = self.cfg.count;
        let support = support[support.len().saturating_sub(n)..].to_vec();
        let resistance: Vec<f64> = resistance.into_iter().take(n).collect();

        Ok(Some(LevelScan {
            levels: LevelSet { support, resistance },
            step,
        }))
    }

    /// Bin width: ATR-sized, never below half a percent of the last close.
    fn bin_step(&self, tail: &Frame, last: f64) -> Result<f64, IndicatorError> {
        let atr_last = atr(tail, 14)?.last().copied().flatten().filter(|v| v.is_finite());
        let base = match atr_last {
            Some(v) => v,
            None => {
                let high = tail.column(Column::High)?;
                let low = tail.column(Column::Low)?;
                high.iter().zip(low).map(|(h, l)| h - l).sum::<f64>() / tail.len() as f64
            }
        };

        let step = base.max(last * 0.005);
        if step.is_finite() && step > 0.0 {
            Ok(step)
        } else {
            Ok((last.abs() * 0.005).max(0.01))
        }
    }

    /// Bars whose low (high) is the extreme of the centred window around them.
    fn swing_bars(&self, high: &[f64], low: &[f64]) -> Vec<usize> {
        let w = self.cfg.swing_window.max(1);
        let half = w / 2;
        let mut out = Vec::new();
        if high.len() < w {
            return out;
        }

        for i in half..high.len() - (w - 1 - half) {
            let range = i - half..i - half + w;
            let lowest = low[range.clone()].iter().copied().fold(f64::INFINITY, f64::min);
            let highest = high[range].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if high[i] == highest {
                out.push(i);
            }
            if low[i] == lowest {
                out.push(i);
            }
        }
        out
    }

    /// Top candidates by score, re-sorted by price and collapsed when two sit
    /// within half a step of each other.
    fn pick(&self, mut candidates: Vec<Bucket>, step: f64) -> Vec<f64> {
        // Stable: equal scores keep price-ascending order.
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        candidates.truncate(self.cfg.top_candidates);
        candidates.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));

        let mut kept: Vec<f64> = Vec::new();
        for c in candidates {
            match kept.last() {
                Some(prev) if (c.price - prev).abs() <= step * 0.5 => {}
                _ => kept.push(c.price),
            }
        }
        kept
    }
}

/// Rounds ascending prices to cents, keeps those on the wanted side of the
/// close and drops neighbours that collapsed onto the same cent.
fn cents(prices: Vec<f64>, keep: impl Fn(f64) -> bool) -> Vec<f64> {
    let mut out: Vec<f64> = prices
        .into_iter()
        .map(|p| round_to(p, 2))
        .filter(|p| keep(*p))
        .collect();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bar;

    fn detector() -> LevelDetector {
        LevelDetector::new(LevelConfig::default())
    }

    fn rising(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                Bar {
                    t: i as i64,
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    fn choppy(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                let close = 50.0 + 6.0 * (x / 9.0).sin() + 2.0 * (x / 3.1).cos() + 0.02 * x;
                Bar {
                    t: i as i64,
                    open: close + 0.3,
                    high: close + 0.8,
                    low: close - 0.9,
                    close,
                    volume: 500.0,
                }
            })
            .collect()
    }

    #[test]
    fn empty_series_has_no_levels() {
        let levels = detector().detect(&Frame::from_bars(&[])).unwrap();
        assert!(levels.support.is_empty());
        assert!(levels.resistance.is_empty());
    }

    #[test]
    fn close_only_series_is_rejected() {
        let frame = Frame::from_closes(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            detector().detect(&frame),
            Err(IndicatorError::MissingColumn(Column::High))
        );
    }

    #[test]
    fn rising_series_levels() {
        let scan = detector().scan(&Frame::from_bars(&rising(300))).unwrap().unwrap();
        assert_eq!(scan.step, 2.0);
        assert_eq!(scan.levels.support, vec![236.0, 238.0, 240.0]);
        assert_eq!(scan.levels.resistance, vec![400.0]);
    }

    #[test]
    fn levels_sit_on_the_right_side_of_price() {
        let bars = choppy(260);
        let last = bars.last().unwrap().close;
        let scan = detector().scan(&Frame::from_bars(&bars)).unwrap().unwrap();
        let levels = &scan.levels;

        assert!(!levels.is_empty());
        assert!(levels.support.len() <= 3);
        assert!(levels.resistance.len() <= 3);
        assert!(levels.support.iter().all(|p| *p <= last));
        assert!(levels.resistance.iter().all(|p| *p >= last));

        for side in [&levels.support, &levels.resistance] {
            for w in side.windows(2) {
                assert!(w[0] < w[1]);
                assert!(w[1] - w[0] > scan.step * 0.5 - 0.01);
            }
        }
    }

    #[test]
    fn rounding_never_pushes_a_support_above_the_close() {
        // The single bucket centres at 100.007, which rounds to 100.01.
        let bars: Vec<Bar> = (0..3)
            .map(|t| Bar {
                t,
                open: 100.008,
                high: 101.014,
                low: 99.0,
                close: 100.008,
                volume: 1_000.0,
            })
            .collect();
        let last = 100.008;
        let levels = detector().detect(&Frame::from_bars(&bars)).unwrap();

        assert!(levels.support.iter().all(|p| *p <= last), "{:?}", levels.support);
        assert!(levels.resistance.iter().all(|p| *p >= last), "{:?}", levels.resistance);
        assert!(!levels.support.contains(&100.01));
    }

    #[test]
    fn count_caps_each_side() {
        let cfg = LevelConfig {
            count: 1,
            ..LevelConfig::default()
        };
        let levels = LevelDetector::new(cfg).detect(&Frame::from_bars(&choppy(200))).unwrap();
        assert!(levels.support.len() <= 1);
        assert!(levels.resistance.len() <= 1);
    }

    #[test]
    fn short_series_still_ranks_histogram() {
        let bars = rising(2);
        let levels = detector().detect(&Frame::from_bars(&bars)).unwrap();
        assert!(!levels.is_empty());
    }

    #[test]
    fn swing_points_use_centred_window() {
        let high = [1.0, 3.0, 2.0, 2.5, 1.0];
        let low = [0.5, 2.0, 1.0, 2.0, 0.5];
        let swings = detector().swing_bars(&high, &low);
        // bar 1 is a swing high, bar 2 a swing low, bar 3 a swing high
        assert_eq!(swings, vec![1, 2, 3]);
    }
}
