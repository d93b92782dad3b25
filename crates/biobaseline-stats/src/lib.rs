//! Descriptive statistics for reference baselines.
//!
//! Every summary in this crate has the same shape (count, mean, population
//! standard deviation, median, the percentile set {5, 10, 25, 75, 90, 95} and
//! optional min/max) regardless of whether it was computed from a sample
//! multiset ([`Empirical`]) or from normal parameters ([`Parametric`]). Both
//! implement [`Summarize`], so consumers never need to know which path
//! produced a [`Summary`].
//!
//! Percentiles use linear interpolation between order statistics: for
//! quantile `q` over `n` sorted values the rank is `h = (n - 1) * q / 100`
//! and the result is `x[⌊h⌋] + (h - ⌊h⌋) * (x[⌊h⌋ + 1] - x[⌊h⌋])`.

use statrs::distribution::{ContinuousCDF, Normal};

// ═══════════════════════════════════════════════════════════════════════════════
// Core types
// ═══════════════════════════════════════════════════════════════════════════════

/// Percentile levels reported in every summary besides the median.
pub const PERCENTILES: [f64; 6] = [5.0, 10.0, 25.0, 75.0, 90.0, 95.0];

/// Statistics for one stratification cell of one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    /// Population standard deviation (divisor `n`).
    pub std: f64,
    pub median: f64,
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Summary {
    /// Percentiles in ascending order, median included.
    pub fn ordered_quantiles(&self) -> [f64; 7] {
        [
            self.p5,
            self.p10,
            self.p25,
            self.median,
            self.p75,
            self.p90,
            self.p95,
        ]
    }

    /// True when p5 ≤ p10 ≤ p25 ≤ median ≤ p75 ≤ p90 ≤ p95.
    pub fn is_monotone(&self) -> bool {
        self.ordered_quantiles().windows(2).all(|w| w[0] <= w[1])
    }
}

/// Anything that can be reduced to a [`Summary`].
pub trait Summarize {
    /// Number of observations backing the summary.
    fn count(&self) -> usize;

    /// Compute the summary, or `None` when there is nothing to summarize.
    fn summarize(&self) -> Option<Summary>;

    /// Summary gated on a minimum backing count.
    ///
    /// Cells below `min_count` yield `None` without computing anything.
    fn summarize_at_least(&self, min_count: usize) -> Option<Summary> {
        if self.count() < min_count.max(1) {
            return None;
        }
        self.summarize()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Drop non-finite values and sort ascending.
///
/// Sorting up front makes every downstream reduction depend only on the
/// multiset of inputs, not on their arrival order.
pub fn sorted_finite(samples: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = samples.into_iter().filter(|v| v.is_finite()).collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Arithmetic mean. Zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around a precomputed mean.
pub fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Percentile `q` (0–100) of an ascending-sorted slice by linear interpolation.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * (q.clamp(0.0, 100.0) / 100.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = h - lo as f64;
            sorted[lo] + frac * (sorted[hi] - sorted[lo])
        }
    }
}

/// Quantile `q` (0–100) of N(mean, std²) via the inverse standard normal CDF.
///
/// A zero standard deviation collapses every quantile onto the mean.
pub fn normal_quantile(mean: f64, std: f64, q: f64) -> f64 {
    if std <= 0.0 {
        return mean;
    }
    let p = (q / 100.0).clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    match Normal::new(0.0, 1.0) {
        Ok(standard) => mean + std * standard.inverse_cdf(p),
        Err(_) => mean,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Empirical summaries
// ═══════════════════════════════════════════════════════════════════════════════

/// Summary source backed by an observed sample multiset.
#[derive(Debug, Clone, Default)]
pub struct Empirical {
    sorted: Vec<f64>,
}

impl Empirical {
    /// Collect samples; non-finite values are discarded.
    pub fn new(samples: impl IntoIterator<Item = f64>) -> Self {
        Self {
            sorted: sorted_finite(samples),
        }
    }
}

impl Summarize for Empirical {
    fn count(&self) -> usize {
        self.sorted.len()
    }

    fn summarize(&self) -> Option<Summary> {
        let s = &self.sorted;
        if s.is_empty() {
            return None;
        }
        let m = mean(s);
        Some(Summary {
            n: s.len(),
            mean: m,
            std: population_std(s, m),
            median: percentile_sorted(s, 50.0),
            p5: percentile_sorted(s, 5.0),
            p10: percentile_sorted(s, 10.0),
            p25: percentile_sorted(s, 25.0),
            p75: percentile_sorted(s, 75.0),
            p90: percentile_sorted(s, 90.0),
            p95: percentile_sorted(s, 95.0),
            min: s.first().copied(),
            max: s.last().copied(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parametric summaries
// ═══════════════════════════════════════════════════════════════════════════════

/// Summary source backed by normal parameters instead of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Parametric {
    pub mean: f64,
    pub std: f64,
    /// Lower bound; quantiles are clamped to it and it is reported as `min`.
    pub min: Option<f64>,
    /// Upper bound; quantiles are clamped to it and it is reported as `max`.
    pub max: Option<f64>,
    /// Nominal sample size the parameters were fit on.
    pub n: usize,
}

impl Parametric {
    fn quantile(&self, q: f64) -> f64 {
        let mut v = normal_quantile(self.mean, self.std, q);
        if let Some(lo) = self.min {
            v = v.max(lo);
        }
        if let Some(hi) = self.max {
            v = v.min(hi);
        }
        v
    }
}

impl Summarize for Parametric {
    fn count(&self) -> usize {
        self.n
    }

    fn summarize(&self) -> Option<Summary> {
        if self.n == 0 || !self.mean.is_finite() || !self.std.is_finite() || self.std < 0.0 {
            return None;
        }
        let [p5, p10, p25, p75, p90, p95] = PERCENTILES.map(|q| self.quantile(q));
        Some(Summary {
            n: self.n,
            mean: self.mean,
            std: self.std,
            median: self.quantile(50.0),
            p5,
            p10,
            p25,
            p75,
            p90,
            p95,
            min: self.min,
            max: self.max,
        })
    }
}
