//! Momentum oscillators: RSI, stochastic, Williams %R.

use super::trend::sma;

/// Relative Strength Index with Wilder smoothing.
///
/// The first value appears at index `period`, seeded with the simple average
/// of the first `period` gains and losses.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let p = period as f64;
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= p;
    avg_loss /= p;
    out[period] = rsi_value(avg_gain, avg_loss);

    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Highest high and lowest low of the `period` bars ending at `i`.
fn range_at(high: &[f64], low: &[f64], i: usize, period: usize) -> (f64, f64) {
    let window = i + 1 - period..=i;
    let hh = high[window.clone()].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let ll = low[window].iter().copied().fold(f64::INFINITY, f64::min);
    (hh, ll)
}

/// Slow stochastic %K and %D.
#[derive(Debug, Clone, Default)]
pub struct Stochastic {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Slow stochastic from true highs and lows.
///
/// Raw %K over `k_period` is smoothed by an SMA of `slow_k` to give %K, and
/// %D is an SMA of `slow_d` over %K. A zero high-low range is undefined (NaN).
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    slow_k: usize,
    slow_d: usize,
) -> Stochastic {
    let len = high.len().min(low.len()).min(close.len());
    let mut raw_k = vec![f64::NAN; len];

    if k_period > 0 && len >= k_period {
        for i in (k_period - 1)..len {
            let (hh, ll) = range_at(high, low, i, k_period);
            let range = hh - ll;
            if range > 0.0 {
                raw_k[i] = 100.0 * (close[i] - ll) / range;
            }
        }
    }

    let k = sma(&raw_k, slow_k);
    let d = sma(&k, slow_d);
    Stochastic { k, d }
}

/// Williams %R in [-100, 0]. A zero high-low range is undefined (NaN).
pub fn williams_r(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = high.len().min(low.len()).min(close.len());
    let mut out = vec![f64::NAN; len];
    if period == 0 || len < period {
        return out;
    }

    for i in (period - 1)..len {
        let (hh, ll) = range_at(high, low, i, period);
        let range = hh - ll;
        if range > 0.0 {
            out[i] = -100.0 * (hh - close[i]) / range;
        }
    }
    out
}
