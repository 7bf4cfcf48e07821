//! Statistical primitives: distribution summaries, mergeable moments and
//! Student-t confidence intervals.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Summary of a sample distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    /// Sample standard deviation (n - 1); zero for a single sample.
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

impl DistributionSummary {
    /// Summarise `samples`. Returns `None` for an empty slice.
    ///
    /// The samples are sorted before anything is accumulated, so the result
    /// does not depend on the order they were supplied in.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self::from_sorted(&sorted))
    }

    /// Like [`DistributionSummary::from_samples`] for data already in ascending order.
    pub fn from_sorted(sorted: &[f64]) -> Self {
        let moments: Moments = sorted.iter().copied().collect();
        Self {
            count: sorted.len(),
            mean: moments.mean().unwrap_or(0.0),
            median: percentile(sorted, 0.50),
            p95: percentile(sorted, 0.95),
            p99: percentile(sorted, 0.99),
            stddev: moments.stddev().unwrap_or(0.0),
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
        }
    }
}

/// Percentile of ascending `sorted` data with linear interpolation between
/// the two nearest ranks. `p` is a fraction (0.95 for p95).
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.last() else {
        return 0.0;
    };
    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 1.0 {
        return *last;
    }

    let rank = p * (sorted.len() - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = rank.ceil() as usize;
    if lower_idx == upper_idx {
        return sorted[lower_idx];
    }
    let lower = sorted[lower_idx];
    let upper = sorted[upper_idx];
    lower + (upper - lower) * (rank - lower_idx as f64)
}

/// Running count, mean and sum of squared deviations.
///
/// Two accumulators combine with [`Moments::merge`] (Chan et al.), so
/// per-run results can be folded without their raw samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Moments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an accumulator from a recorded count, mean and sample stddev.
    pub fn from_summary(count: u64, mean: f64, stddev: f64) -> Self {
        let m2 = if count > 1 {
            stddev * stddev * (count - 1) as f64
        } else {
            0.0
        };
        Self { count, mean, m2 }
    }

    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn merge(&self, other: &Moments) -> Moments {
        if other.count == 0 {
            return *self;
        }
        if self.count == 0 {
            return *other;
        }
        let count = self.count + other.count;
        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = count as f64;
        let delta = other.mean - self.mean;
        Moments {
            count,
            mean: self.mean + delta * n_b / n,
            m2: self.m2 + other.m2 + delta * delta * n_a * n_b / n,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample variance; needs at least two observations.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }

    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

impl FromIterator<f64> for Moments {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut moments = Moments::new();
        for x in iter {
            moments.push(x);
        }
        moments
    }
}

/// Statistics of one value observed once per run, over the runs of a
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcrossRuns {
    pub runs: u64,
    pub mean: f64,
    pub variance: Option<f64>,
    pub stddev: Option<f64>,
    /// Half-width of the Student-t confidence interval around `mean`.
    pub ci_half_width: Option<f64>,
    pub confidence_level: f64,
}

impl AcrossRuns {
    pub fn from_moments(moments: &Moments, confidence_level: f64) -> Option<Self> {
        let mean = moments.mean()?;
        let stddev = moments.stddev();
        Some(Self {
            runs: moments.count(),
            mean,
            variance: moments.variance(),
            stddev,
            ci_half_width: stddev
                .and_then(|s| confidence_half_width(moments.count(), s, confidence_level)),
            confidence_level,
        })
    }
}

/// Half-width of a two-sided Student-t interval for a mean of `n` samples.
pub fn confidence_half_width(n: u64, stddev: f64, confidence_level: f64) -> Option<f64> {
    if n < 2 || !(0.0..1.0).contains(&confidence_level) || confidence_level <= 0.0 {
        return None;
    }
    let t_dist = StudentsT::new(0.0, 1.0, (n - 1) as f64).ok()?;
    let alpha = 1.0 - confidence_level;
    let t_critical = t_dist.inverse_cdf(1.0 - alpha / 2.0);
    if !t_critical.is_finite() {
        return None;
    }
    Some((t_critical * stddev / (n as f64).sqrt()).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&data, 0.5), 3.0);
        assert!(close(percentile(&data, 0.95), 4.8));
        assert_eq!(percentile(&data, 1.0), 5.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
    }

    #[test]
    fn summary_is_order_independent() {
        let a = DistributionSummary::from_samples(&[0.3, 0.1, 0.2, 0.9, 0.4]).unwrap();
        let b = DistributionSummary::from_samples(&[0.9, 0.4, 0.3, 0.2, 0.1]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.count, 5);
        assert_eq!(a.median, 0.3);
        assert_eq!(a.min, 0.1);
        assert_eq!(a.max, 0.9);
        assert!(close(a.mean, 0.38));
    }

    #[test]
    fn summary_of_nothing_is_none() {
        assert!(DistributionSummary::from_samples(&[]).is_none());
    }

    #[test]
    fn merged_moments_match_single_pass() {
        let left = [1.0, 4.0, 9.0, 16.0];
        let right = [2.5, 3.5, 100.0];
        let all: Moments = left.iter().chain(right.iter()).copied().collect();
        let a: Moments = left.iter().copied().collect();
        let b: Moments = right.iter().copied().collect();

        for merged in [a.merge(&b), b.merge(&a)] {
            assert_eq!(merged.count(), all.count());
            assert!(close(merged.mean().unwrap(), all.mean().unwrap()));
            assert!(close(merged.variance().unwrap(), all.variance().unwrap()));
        }
        assert_eq!(a.merge(&Moments::new()), a);
    }

    #[test]
    fn moments_round_trip_through_summary() {
        let m: Moments = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0].into_iter().collect();
        let rebuilt = Moments::from_summary(m.count(), m.mean().unwrap(), m.stddev().unwrap());
        assert!(close(rebuilt.variance().unwrap(), m.variance().unwrap()));
    }

    #[test]
    fn confidence_interval_uses_student_t() {
        // t(0.975, 4) = 2.776445
        let hw = confidence_half_width(5, 1.0, 0.95).unwrap();
        assert!((hw - 2.776445 / 5f64.sqrt()).abs() < 1e-4);
        assert!(confidence_half_width(1, 1.0, 0.95).is_none());
        assert!(confidence_half_width(5, 1.0, 1.5).is_none());
    }
}
