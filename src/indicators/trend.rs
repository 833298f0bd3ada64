//! Trend indicators: SMA, EMA, MACD.
//!
//! Every function returns a series aligned with its input. Warm-up positions
//! hold `f64::NAN`.

use statrs::statistics::Statistics;

/// Simple moving average. A window containing NaN yields NaN.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    for i in (period - 1)..values.len() {
        out[i] = values[i + 1 - period..=i].iter().mean();
    }
    out
}

/// Exponential moving average with `alpha = 2 / (period + 1)`.
///
/// Leading NaNs are skipped; the first value is seeded with the SMA of the
/// first `period` finite inputs.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    let Some(start) = values.iter().position(|v| v.is_finite()) else {
        return out;
    };
    if period == 0 || values.len() - start < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_idx = start + period - 1;
    let mut prev = values[start..=seed_idx].iter().mean();
    out[seed_idx] = prev;

    for i in (seed_idx + 1)..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// MACD line, signal line and histogram.
#[derive(Debug, Clone, Default)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(l, s)| l - s)
        .collect();

    Macd {
        line,
        signal: signal_line,
        histogram,
    }
}
