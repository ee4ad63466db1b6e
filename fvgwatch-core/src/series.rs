//! Series math shared by the built-in indicators and the script sandbox.
//!
//! Rolling windows follow the usual dataframe conventions: the first
//! `window - 1` outputs are NaN, and any NaN inside a window makes that
//! output NaN. `rolling_std` is the sample (n - 1) deviation. Every rolling
//! function runs in O(n) regardless of the window.

use std::collections::VecDeque;

use serde_json::{Map, Value};

// ─── Indicator output ───────────────────────────────────────────────

/// What an indicator produces: one series, or several named series in a
/// fixed order. Every series has the length of the candle input.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesOutput {
    Single(Vec<f64>),
    Multi(Vec<(String, Vec<f64>)>),
}

impl SeriesOutput {
    /// The series alerts look at: `line` when given, otherwise the only
    /// series, or the first one of a multi-series output.
    pub fn line(&self, line: Option<&str>) -> Option<&[f64]> {
        match (self, line) {
            (SeriesOutput::Single(values), _) => Some(values),
            (SeriesOutput::Multi(series), None) => series.first().map(|(_, v)| v.as_slice()),
            (SeriesOutput::Multi(_), Some(name)) => self.get(name),
        }
    }

    /// Named series lookup (multi-series outputs only).
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        match self {
            SeriesOutput::Single(_) => None,
            SeriesOutput::Multi(series) => series
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_slice()),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, SeriesOutput::Multi(_))
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            SeriesOutput::Single(_) => Vec::new(),
            SeriesOutput::Multi(series) => series.iter().map(|(n, _)| n.as_str()).collect(),
        }
    }

    /// Length of the (first) series; 0 for an empty frame.
    pub fn len(&self) -> usize {
        match self {
            SeriesOutput::Single(values) => values.len(),
            SeriesOutput::Multi(series) => series.first().map_or(0, |(_, v)| v.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// JSON view: an array, or an object keyed by series name. NaN becomes null.
    pub fn to_json(&self) -> Value {
        fn array(values: &[f64]) -> Value {
            Value::Array(
                values
                    .iter()
                    .map(|v| serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number))
                    .collect(),
            )
        }
        match self {
            SeriesOutput::Single(values) => array(values),
            SeriesOutput::Multi(series) => {
                let mut map = Map::new();
                for (name, values) in series {
                    map.insert(name.clone(), array(values));
                }
                Value::Object(map)
            }
        }
    }
}

// ─── Rolling windows ────────────────────────────────────────────────

/// Sliding sums of `x - shift` and `(x - shift)^2`. `f(shift, s1, s2)` runs
/// once per full window that holds no NaN.
fn rolling_moments(
    values: &[f64],
    window: usize,
    mut f: impl FnMut(f64, f64, f64) -> f64,
) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    // Shifting by a sample value keeps the squared sums small.
    let shift = values.iter().copied().find(|v| !v.is_nan()).unwrap_or(0.0);
    let (mut s1, mut s2, mut nans) = (0.0, 0.0, 0usize);
    for i in 0..n {
        let x = values[i];
        if x.is_nan() {
            nans += 1;
        } else {
            s1 += x - shift;
            s2 += (x - shift) * (x - shift);
        }
        if i >= window {
            let old = values[i - window];
            if old.is_nan() {
                nans -= 1;
            } else {
                s1 -= old - shift;
                s2 -= (old - shift) * (old - shift);
            }
        }
        if i + 1 >= window && nans == 0 {
            out[i] = f(shift, s1, s2);
        }
    }
    out
}

pub fn rolling_sum(values: &[f64], window: usize) -> Vec<f64> {
    let w = window as f64;
    rolling_moments(values, window, |shift, s1, _| s1 + shift * w)
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let w = window as f64;
    rolling_moments(values, window, |shift, s1, _| shift + s1 / w)
}

/// Sample standard deviation; a window of one is NaN.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let w = window as f64;
    rolling_moments(values, window, |_, s1, s2| {
        if window < 2 {
            return f64::NAN;
        }
        ((s2 - s1 * s1 / w) / (w - 1.0)).max(0.0).sqrt()
    })
}

/// Monotonic-deque extremum. `evicts(new, old)` drops `old` from the back.
fn rolling_extreme(values: &[f64], window: usize, evicts: fn(f64, f64) -> bool) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut last_nan: Option<usize> = None;
    for (i, &x) in values.iter().enumerate() {
        while deque.front().is_some_and(|&j| j + window <= i) {
            deque.pop_front();
        }
        if x.is_nan() {
            last_nan = Some(i);
        } else {
            while deque.back().is_some_and(|&j| evicts(x, values[j])) {
                deque.pop_back();
            }
            deque.push_back(i);
        }
        let clean = last_nan.map_or(true, |j| j + window <= i);
        if i + 1 >= window && clean {
            if let Some(&j) = deque.front() {
                out[i] = values[j];
            }
        }
    }
    out
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_extreme(values, window, |new, old| new <= old)
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_extreme(values, window, |new, old| new >= old)
}

// ─── Recursive / cumulative ─────────────────────────────────────────

/// Exponentially weighted mean with `alpha = 2 / (span + 1)`, no bias
/// adjustment, seeded with the first non-NaN value. Leading NaNs stay NaN;
/// a NaN after the seed repeats the previous mean.
pub fn ewm_mean(values: &[f64], span: f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if span.is_nan() || span < 1.0 {
        return out;
    }
    let alpha = 2.0 / (span + 1.0);
    let mut prev: Option<f64> = None;
    for (i, &x) in values.iter().enumerate() {
        prev = match (prev, x.is_nan()) {
            (None, true) => None,
            (None, false) => Some(x),
            (Some(p), true) => Some(p),
            (Some(p), false) => Some(alpha * x + (1.0 - alpha) * p),
        };
        if let Some(p) = prev {
            out[i] = p;
        }
    }
    out
}

/// Running sum that skips NaN inputs (their slot stays NaN).
pub fn cumsum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                f64::NAN
            } else {
                total += v;
                total
            }
        })
        .collect()
}

/// `x[i] - x[i - lag]`; the first `lag` outputs are NaN.
pub fn diff(values: &[f64], lag: usize) -> Vec<f64> {
    let shifted = shift(values, lag as i64);
    values.iter().zip(&shifted).map(|(a, b)| a - b).collect()
}

/// Move values forward by `periods` (backward when negative), padding with NaN.
pub fn shift(values: &[f64], periods: i64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    let k = periods.unsigned_abs() as usize;
    if k >= n {
        return out;
    }
    if periods >= 0 {
        out[k..].copy_from_slice(&values[..n - k]);
    } else {
        out[..n - k].copy_from_slice(&values[k..]);
    }
    out
}

pub fn fill_nan(values: &[f64], fill: f64) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v.is_nan() { fill } else { v })
        .collect()
}

/// Elementwise ratio where a zero or NaN denominator gives NaN.
pub fn safe_div(num: &[f64], den: &[f64]) -> Vec<f64> {
    num.iter()
        .zip(den)
        .map(|(&a, &b)| if b == 0.0 || b.is_nan() { f64::NAN } else { a / b })
        .collect()
}
