//! Numeric helpers shared by the VaR and liquidity calculators.
//!
//! All functions are pure and return 0 (or an empty series) for degenerate
//! input instead of failing.

use rand::Rng;

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (divisor n - 1). Zero for fewer than 2 points.
pub fn std_dev(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    variance.sqrt()
}

/// Simple returns between consecutive prices, oldest first.
///
/// A zero previous price yields a 0 return so the series stays aligned with
/// the input.
pub fn returns_from_prices(prices: &[f64]) -> Vec<f64> {
    if prices.len() < 2 {
        return Vec::new();
    }
    prices
        .windows(2)
        .map(|w| {
            let (prev, cur) = (w[0], w[1]);
            if prev != 0.0 {
                (cur - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

/// floor((1 - confidence) * n), clamped to [0, n - 1].
pub fn percentile_index(n: usize, confidence: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let raw = ((1.0 - confidence) * n as f64).floor();
    if raw <= 0.0 {
        0
    } else {
        (raw as usize).min(n - 1)
    }
}

/// Return at the VaR percentile of an ascending series. Zero when empty.
pub fn percentile_loss(sorted_returns: &[f64], confidence: f64) -> f64 {
    if sorted_returns.is_empty() {
        return 0.0;
    }
    sorted_returns[percentile_index(sorted_returns.len(), confidence)]
}

/// Mean of every return at or below the VaR percentile of an ascending series.
pub fn tail_mean(sorted_returns: &[f64], confidence: f64) -> f64 {
    if sorted_returns.is_empty() {
        return 0.0;
    }
    let idx = percentile_index(sorted_returns.len(), confidence);
    mean(&sorted_returns[..=idx])
}

/// Largest peak-to-trough fall of the compounded series, as a fraction of the peak.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = 1.0;
    let mut max_dd: f64 = 0.0;

    for r in returns {
        cumulative *= 1.0 + r;
        if cumulative > peak {
            peak = cumulative;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - cumulative) / peak);
        }
    }

    max_dd
}

/// Normal draw via Box-Muller.
pub fn normal_random<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1 = rng.random::<f64>().max(1e-10);
    let u2 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z * std_dev
}

/// Ascending sort that tolerates NaN by ordering it last.
pub fn sort_ascending(xs: &mut [f64]) {
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater));
}
