//! Volatility indicators: ATR and Bollinger bands.

use statrs::statistics::Statistics;

use super::trend::sma;

/// Average true range with Wilder smoothing. First value at index `period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = high.len().min(low.len()).min(close.len());
    let mut out = vec![f64::NAN; len];
    if period == 0 || len <= period {
        return out;
    }

    let true_range = |i: usize| -> f64 {
        let prev_close = close[i - 1];
        (high[i] - low[i])
            .max((high[i] - prev_close).abs())
            .max((low[i] - prev_close).abs())
    };

    let p = period as f64;
    let mut prev = (1..=period).map(true_range).sum::<f64>() / p;
    out[period] = prev;

    for i in (period + 1)..len {
        prev = (prev * (p - 1.0) + true_range(i)) / p;
        out[i] = prev;
    }
    out
}

/// Bollinger bands around an SMA, using the population standard deviation.
#[derive(Debug, Clone, Default)]
pub struct Bollinger {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(values: &[f64], period: usize, width: f64) -> Bollinger {
    let middle = sma(values, period);
    let mut upper = vec![f64::NAN; values.len()];
    let mut lower = vec![f64::NAN; values.len()];

    for i in 0..values.len() {
        if middle[i].is_nan() {
            continue;
        }
        let std_dev = values[i + 1 - period..=i].iter().population_std_dev();
        upper[i] = middle[i] + width * std_dev;
        lower[i] = middle[i] - width * std_dev;
    }

    Bollinger {
        upper,
        middle,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atr_constant_range() {
        // Every bar spans 0.0010 and closes mid-range.
        let close: Vec<f64> = (0..30).map(|i| 1.1 + i as f64 * 0.0002).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.0005).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.0005).collect();
        let out = atr(&high, &low, &close, 14);

        assert!(out[13].is_nan());
        assert!((out[14] - 0.0010).abs() < 1e-9);
        assert!((out[29] - 0.0010).abs() < 1e-9);
    }

    #[test]
    fn test_atr_counts_gaps() {
        let close = vec![1.0, 1.0, 1.2, 1.2];
        let high = vec![1.0, 1.0, 1.2, 1.2];
        let low = vec![1.0, 1.0, 1.2, 1.2];
        let out = atr(&high, &low, &close, 2);

        // Gap from 1.0 to 1.2 counts as true range 0.2
        assert!((out[2] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_symmetric() {
        let values: Vec<f64> = (0..25).map(|i| if i % 2 == 0 { 1.0 } else { 3.0 }).collect();
        let bands = bollinger(&values, 20, 2.0);

        assert!(bands.middle[18].is_nan());
        let i = 24;
        assert!((bands.middle[i] - 2.0).abs() < 1e-9);
        // population std dev of alternating 1/3 is exactly 1
        assert!((bands.upper[i] - 4.0).abs() < 1e-9);
        assert!((bands.lower[i]).abs() < 1e-9);
    }
}
