use crate::analyzer::frame::Frame;
use crate::model::{Column, IndicatorError};
use serde::Serialize;

/// An indicator series aligned with its input. `None` marks warm-up rows.
pub type Line = Vec<Option<f64>>;

/// Substituted for a zero denominator (average loss, price range, volume).
const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct Macd {
    pub line: Line,
    pub signal: Line,
    pub histogram: Line,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    pub mid: Line,
    pub upper: Line,
    pub lower: Line,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    pub k: Line,
    pub d: Line,
}

fn check_window(name: &'static str, window: usize) -> Result<(), IndicatorError> {
    if window == 0 {
        return Err(IndicatorError::InvalidWindow { name, window });
    }
    Ok(())
}

/// Mean of every full window; a window containing a gap yields `None`.
fn rolling_mean(values: &[Option<f64>], window: usize) -> Line {
    let mut out = vec![None; values.len()];
    if values.len() < window {
        return out;
    }
    for (i, w) in values.windows(window).enumerate() {
        let sum: Option<f64> = w.iter().copied().sum();
        out[i + window - 1] = sum.map(|s| s / window as f64);
    }
    out
}

fn rolling_extreme(values: &[f64], window: usize, pick: fn(f64, f64) -> f64) -> Line {
    let mut out = vec![None; values.len()];
    if values.len() < window {
        return out;
    }
    for (i, w) in values.windows(window).enumerate() {
        out[i + window - 1] = w.iter().copied().reduce(pick);
    }
    out
}

/// Recursive exponential smoothing seeded with the first observation:
/// `y = alpha * x + (1 - alpha) * y_prev`. Rows before `min_periods`
/// observations have been seen are `None`, and so are gaps in the input.
fn ewm(values: &[Option<f64>], alpha: f64, min_periods: usize) -> Line {
    let mut out = Vec::with_capacity(values.len());
    let mut state: Option<f64> = None;
    let mut seen = 0usize;

    for value in values {
        match value {
            Some(x) => {
                seen += 1;
                let next = match state {
                    Some(prev) => alpha * x + (1.0 - alpha) * prev,
                    None => *x,
                };
                state = Some(next);
                out.push(if seen >= min_periods { Some(next) } else { None });
            }
            None => out.push(None),
        }
    }
    out
}

fn ema_line(values: &[Option<f64>], window: usize) -> Line {
    ewm(values, 2.0 / (window as f64 + 1.0), window)
}

/// Wilder smoothing: exponential with factor `1 / window`.
fn wilder(values: &[Option<f64>], window: usize) -> Line {
    ewm(values, 1.0 / window as f64, window)
}

fn defined(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

fn sub(a: &Line, b: &Line) -> Line {
    a.iter()
        .zip(b)
        .map(|(x, y)| Some((*x)? - (*y)?))
        .collect()
}

fn typical_price(frame: &Frame) -> Result<Vec<f64>, IndicatorError> {
    frame.require(&[Column::High, Column::Low, Column::Close])?;
    let high = frame.column(Column::High)?;
    let low = frame.column(Column::Low)?;
    let close = frame.column(Column::Close)?;
    Ok(high
        .iter()
        .zip(low)
        .zip(close)
        .map(|((h, l), c)| (h + l + c) / 3.0)
        .collect())
}

pub fn sma(frame: &Frame, column: Column, window: usize) -> Result<Line, IndicatorError> {
    check_window("sma", window)?;
    let values = frame.column(column)?;
    Ok(rolling_mean(&defined(values), window))
}

pub fn ema(frame: &Frame, column: Column, window: usize) -> Result<Line, IndicatorError> {
    check_window("ema", window)?;
    let values = frame.column(column)?;
    Ok(ema_line(&defined(values), window))
}

/// Average traded volume over `window` bars.
pub fn vol_sma(frame: &Frame, window: usize) -> Result<Line, IndicatorError> {
    check_window("vol_sma", window)?;
    sma(frame, Column::Volume, window)
}

/// Relative Strength Index with Wilder-smoothed gains and losses.
pub fn rsi(frame: &Frame, column: Column, window: usize) -> Result<Line, IndicatorError> {
    check_window("rsi", window)?;
    let values = frame.column(column)?;

    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    gains.push(None);
    losses.push(None);
    for w in values.windows(2) {
        let delta = w[1] - w[0];
        gains.push(Some(delta.max(0.0)));
        losses.push(Some((-delta).max(0.0)));
    }
    gains.truncate(values.len());
    losses.truncate(values.len());

    let avg_gain = wilder(&gains, window);
    let avg_loss = wilder(&losses, window);

    Ok(avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| {
            let (g, l) = ((*g)?, (*l)?);
            let l = if l == 0.0 { EPSILON } else { l };
            let rs = g / l;
            Some((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0))
        })
        .collect())
}

pub fn macd(
    frame: &Frame,
    column: Column,
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<Macd, IndicatorError> {
    check_window("macd.fast", fast)?;
    check_window("macd.slow", slow)?;
    check_window("macd.signal", signal)?;

    let fast_line = ema(frame, column, fast)?;
    let slow_line = ema(frame, column, slow)?;
    let line = sub(&fast_line, &slow_line);
    let signal_line = ema_line(&line, signal);
    let histogram = sub(&line, &signal_line);

    Ok(Macd {
        line,
        signal: signal_line,
        histogram,
    })
}

/// Bands at `k` population standard deviations around the window mean.
pub fn bollinger_bands(
    frame: &Frame,
    column: Column,
    window: usize,
    k: f64,
) -> Result<Bollinger, IndicatorError> {
    check_window("bollinger_bands", window)?;
    let values = frame.column(column)?;

    let mut mid = vec![None; values.len()];
    let mut upper = vec![None; values.len()];
    let mut lower = vec![None; values.len()];

    if values.len() >= window {
        for (i, w) in values.windows(window).enumerate() {
            let n = window as f64;
            let mean = w.iter().sum::<f64>() / n;
            let variance = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();
            let at = i + window - 1;
            mid[at] = Some(mean);
            upper[at] = Some(mean + k * std_dev);
            lower[at] = Some(mean - k * std_dev);
        }
    }

    Ok(Bollinger { mid, upper, lower })
}

/// Average True Range, Wilder-smoothed.
pub fn atr(frame: &Frame, window: usize) -> Result<Line, IndicatorError> {
    check_window("atr", window)?;
    frame.require(&[Column::High, Column::Low, Column::Close])?;
    let high = frame.column(Column::High)?;
    let low = frame.column(Column::Low)?;
    let close = frame.column(Column::Close)?;

    let true_range: Vec<Option<f64>> = (0..frame.len())
        .map(|i| {
            let range = (high[i] - low[i]).abs();
            if i == 0 {
                return Some(range);
            }
            let prev_close = close[i - 1];
            Some(
                range
                    .max((high[i] - prev_close).abs())
                    .max((low[i] - prev_close).abs()),
            )
        })
        .collect();

    Ok(wilder(&true_range, window))
}

/// Cumulative volume-weighted typical price from the first bar of the frame.
pub fn vwap(frame: &Frame) -> Result<Line, IndicatorError> {
    frame.require(&[Column::High, Column::Low, Column::Close, Column::Volume])?;
    let typical = typical_price(frame)?;
    let volume = frame.column(Column::Volume)?;

    let mut cum_pv = 0.0;
    let mut cum_v = 0.0;
    Ok(typical
        .iter()
        .zip(volume)
        .map(|(tp, v)| {
            cum_pv += tp * v;
            cum_v += v;
            let denom = if cum_v == 0.0 { EPSILON } else { cum_v };
            Some(cum_pv / denom)
        })
        .collect())
}

/// On-balance volume. A flat close contributes nothing.
pub fn obv(frame: &Frame) -> Result<Line, IndicatorError> {
    frame.require(&[Column::Close, Column::Volume])?;
    let close = frame.column(Column::Close)?;
    let volume = frame.column(Column::Volume)?;

    let mut total = 0.0;
    Ok((0..frame.len())
        .map(|i| {
            if i > 0 {
                let delta = close[i] - close[i - 1];
                if delta > 0.0 {
                    total += volume[i];
                } else if delta < 0.0 {
                    total -= volume[i];
                }
            }
            Some(total)
        })
        .collect())
}

/// Fast stochastic oscillator: %K over `k` bars, %D as the `d`-bar mean of %K.
pub fn stochastic(frame: &Frame, k: usize, d: usize) -> Result<Stochastic, IndicatorError> {
    check_window("stochastic.k", k)?;
    check_window("stochastic.d", d)?;
    frame.require(&[Column::High, Column::Low, Column::Close])?;
    let high = frame.column(Column::High)?;
    let low = frame.column(Column::Low)?;
    let close = frame.column(Column::Close)?;

    let lowest = rolling_extreme(low, k, f64::min);
    let highest = rolling_extreme(high, k, f64::max);

    let pct_k: Line = (0..frame.len())
        .map(|i| {
            let (ll, hh) = (lowest[i]?, highest[i]?);
            let range = hh - ll;
            let range = if range == 0.0 { EPSILON } else { range };
            Some(100.0 * (close[i] - ll) / range)
        })
        .collect();
    let pct_d = rolling_mean(&pct_k, d);

    Ok(Stochastic { k: pct_k, d: pct_d })
}

/// Latest value of a line, if it is defined and finite.
pub fn latest(line: &Line) -> Option<f64> {
    line.last().copied().flatten().filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacdPoint {
    pub line: f64,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

/// Snapshot of the most recent indicator values for a frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSet {
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub ema21: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd: Option<MacdPoint>,
    /// (upper - lower) / SMA20 of the 20-bar, 2-sigma bands.
    pub bb_width: Option<f64>,
    pub atr14: Option<f64>,
    pub vwap: Option<f64>,
    pub vol20: Option<f64>,
    pub obv: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
}

impl IndicatorSet {
    pub fn latest(frame: &Frame) -> Result<Self, IndicatorError> {
        if frame.is_empty() {
            return Err(IndicatorError::EmptySeries);
        }

        let sma20 = latest(&sma(frame, Column::Close, 20)?);
        let macd_lines = macd(frame, Column::Close, 12, 26, 9)?;
        let bands = bollinger_bands(frame, Column::Close, 20, 2.0)?;
        let stoch = stochastic(frame, 14, 3)?;

        let bb_width = match (latest(&bands.upper), latest(&bands.lower), sma20) {
            (Some(upper), Some(lower), Some(mid)) if mid != 0.0 => Some((upper - lower) / mid),
            _ => None,
        };

        Ok(Self {
            sma20,
            sma50: latest(&sma(frame, Column::Close, 50)?),
            sma200: latest(&sma(frame, Column::Close, 200)?),
            ema21: latest(&ema(frame, Column::Close, 21)?),
            rsi14: latest(&rsi(frame, Column::Close, 14)?),
            macd: latest(&macd_lines.line).map(|line| MacdPoint {
                line,
                signal: latest(&macd_lines.signal),
                histogram: latest(&macd_lines.histogram),
            }),
            bb_width,
            atr14: latest(&atr(frame, 14)?),
            vwap: latest(&vwap(frame)?),
            vol20: latest(&vol_sma(frame, 20)?),
            obv: latest(&obv(frame)?),
            stoch_k: latest(&stoch.k),
            stoch_d: latest(&stoch.d),
        })
    }
}
