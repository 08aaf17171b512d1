// Technical indicators used across the analyst graph.
//
// All functions are pure over bar/close slices and return None when the
// window is not covered; callers decide the fallback.

use crate::market_data::Bar;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Simple moving average of the last `window` values.
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Period-over-period simple returns.
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Total return over the trailing `lookback` bars:
/// (p_now − p_{t−lookback}) / p_{t−lookback}.
pub fn trailing_return(closes: &[f64], lookback: usize) -> Option<f64> {
    if closes.len() < lookback || lookback == 0 {
        return None;
    }
    let now = *closes.last()?;
    let then = closes[closes.len() - lookback];
    if then <= 0.0 {
        return None;
    }
    Some((now - then) / then)
}

/// Relative Strength Index over the trailing `period` deltas.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let tail = &deltas[deltas.len() - period..];
    let avg_gain = tail.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let avg_loss = -tail.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Standard deviation of the RSI sampled over the last `samples` bars;
/// measures how much the oscillator swings (mean-reversion tendency).
pub fn rsi_oscillation(closes: &[f64], period: usize, samples: usize) -> Option<f64> {
    if closes.len() < period + samples {
        return None;
    }
    let mut values = Vec::with_capacity(samples);
    for i in 0..samples {
        let end = closes.len() - samples + i + 1;
        if let Some(v) = rsi(&closes[..end], period) {
            values.push(v);
        }
    }
    if values.len() <= 5 {
        return None;
    }
    Some(std_dev(&values))
}

/// Average True Range in absolute dollars over the trailing `period` bars.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 {
        return None;
    }
    let trs: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let b = &w[1];
            (b.high - b.low)
                .max((b.high - prev_close).abs())
                .max((b.low - prev_close).abs())
        })
        .collect();
    let tail = &trs[trs.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Simplified Average Directional Index: the current DX over the smoothing
/// window stands in for the full Wilder recursion. > 25 reads as a strong
/// trend, < 20 as weak or no trend.
pub fn adx(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 {
        return None;
    }

    let mut trs = Vec::with_capacity(bars.len() - 1);
    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    for w in bars.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        trs.push(
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs()),
        );
        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
    }

    let avg = |v: &[f64]| v[v.len() - period..].iter().sum::<f64>() / period as f64;
    let atr = avg(&trs);
    if atr <= 0.0 {
        return Some(0.0);
    }
    let plus_di = avg(&plus_dm) / atr * 100.0;
    let minus_di = avg(&minus_dm) / atr * 100.0;
    let di_sum = plus_di + minus_di;
    if di_sum <= 0.0 {
        return Some(0.0);
    }
    Some((plus_di - minus_di).abs() / di_sum * 100.0)
}

/// Annualized volatility of the trailing `window` daily returns
/// (dimensionless fraction, e.g. 0.25 = 25% a year).
pub fn annualized_volatility(closes: &[f64], window: usize) -> Option<f64> {
    let returns = daily_returns(closes);
    if returns.len() < window || window < 2 {
        return None;
    }
    let tail = &returns[returns.len() - window..];
    Some(std_dev(tail) * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Fraction of the trailing `window` days moving in the dominant direction.
/// 1.0 = every day the same way, 0.5 = coin flip.
pub fn directional_consistency(closes: &[f64], window: usize) -> Option<f64> {
    let returns = daily_returns(closes);
    if returns.len() < window || window == 0 {
        return None;
    }
    let tail = &returns[returns.len() - window..];
    let up = tail.iter().filter(|r| **r > 0.0).count();
    let down = tail.iter().filter(|r| **r < 0.0).count();
    Some(up.max(down) as f64 / window as f64)
}

/// Pearson correlation of two aligned return series. The series are
/// truncated to their common tail; needs at least 5 overlapping points.
pub fn correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 5 {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Maximum peak-to-trough drawdown of an equity series, as a fraction.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}
