//! Time-weighted queue occupancy.

use std::collections::BTreeMap;

use qgpsr_abstract::{MetricNames, Sample};
use serde::Serialize;
use tracing::debug;

use super::MetricCell;
use crate::repository::RunView;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueUtilization {
    /// Mean over the run's queues.
    pub mean: f64,
    pub max: f64,
    /// Per-queue value keyed by module path.
    pub queues: BTreeMap<String, f64>,
    /// Queues left out of `queues` because their samples span no time.
    pub zero_span_queues: Vec<String>,
    pub run_end: f64,
}

/// Average of the step function through `samples` between the first sample
/// and `end`. Each value holds until the next sample; the last holds until
/// `end`. Returns `None` when that span is empty.
///
/// The mean is updated incrementally, `m += (v - m) * dt / W`, so a constant
/// series yields exactly its value.
pub fn time_weighted_average(samples: &[Sample], end: f64) -> Option<f64> {
    let first = samples.first()?;
    let mut weight = 0.0;
    let mut mean = 0.0;
    for (i, sample) in samples.iter().enumerate() {
        let until = samples.get(i + 1).map_or(end, |next| next.time);
        let dt = until - sample.time;
        if dt <= 0.0 {
            continue;
        }
        weight += dt;
        mean += (sample.value - mean) * (dt / weight);
    }
    (weight > 0.0 && end > first.time).then_some(mean)
}

/// Simulated duration such as `100s`, `1.5min` or `1h 30min`, in seconds.
pub fn parse_sim_time(text: &str) -> Option<f64> {
    const UNITS: [(&str, f64); 8] = [
        ("min", 60.0),
        ("ms", 1e-3),
        ("us", 1e-6),
        ("ns", 1e-9),
        ("ps", 1e-12),
        ("s", 1.0),
        ("h", 3600.0),
        ("d", 86400.0),
    ];

    let text = text.trim().trim_matches('"');
    if text.is_empty() {
        return None;
    }
    let mut total = 0.0;
    for part in text.split_whitespace() {
        let (number, scale) = UNITS
            .iter()
            .find_map(|&(unit, scale)| part.strip_suffix(unit).map(|n| (n, scale)))
            .unwrap_or((part, 1.0));
        let value: f64 = number.parse().ok()?;
        total += value * scale;
    }
    total.is_finite().then_some(total)
}

pub(crate) fn compute(run: RunView<'_>, names: &MetricNames) -> MetricCell<QueueUtilization> {
    let limit = run
        .parameter(&names.sim_time_limit_key)
        .and_then(parse_sim_time);
    let Some(run_end) = limit.or_else(|| run.latest_time()) else {
        return MetricCell::insufficient(format!("{} not recorded", names.queue_length_vector));
    };

    let mut queues = BTreeMap::new();
    let mut zero_span_queues = Vec::new();
    for vector in run.vectors_named(&names.queue_length_vector) {
        let end = vector.last_time().map_or(run_end, |t| t.max(run_end));
        match time_weighted_average(vector.samples(), end) {
            Some(avg) => {
                queues.insert(vector.module.clone(), avg);
            }
            None => zero_span_queues.push(vector.module.clone()),
        }
    }
    if !zero_span_queues.is_empty() {
        debug!(
            "Run {}: {} queue(s) span zero simulated time: {}",
            run.identity(),
            zero_span_queues.len(),
            zero_span_queues.join(", ")
        );
    }

    if queues.is_empty() {
        return MetricCell::insufficient(if !zero_span_queues.is_empty() {
            format!("{} spans zero simulated time", names.queue_length_vector)
        } else {
            format!("{} not recorded", names.queue_length_vector)
        });
    }

    let mean = queues.values().sum::<f64>() / queues.len() as f64;
    let max = queues.values().copied().fold(f64::NEG_INFINITY, f64::max);
    MetricCell::computed(QueueUtilization {
        mean,
        max,
        queues,
        zero_span_queues,
        run_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(f64, f64)]) -> Vec<Sample> {
        points.iter().map(|&(t, v)| Sample::new(t, v)).collect()
    }

    #[test]
    fn constant_queue_is_exact() {
        let samples = series(&[(0.1, 3.7), (0.3, 3.7), (1.9, 3.7), (2.0, 3.7)]);
        assert_eq!(time_weighted_average(&samples, 10.0), Some(3.7));
    }

    #[test]
    fn step_function_weights_by_duration() {
        // 0 for 1s, 4 for 3s
        let samples = series(&[(1.0, 0.0), (2.0, 4.0)]);
        assert_eq!(time_weighted_average(&samples, 5.0), Some(3.0));
    }

    #[test]
    fn zero_span_has_no_average() {
        let samples = series(&[(5.0, 2.0)]);
        assert_eq!(time_weighted_average(&samples, 5.0), None);
        assert_eq!(time_weighted_average(&[], 5.0), None);
    }

    #[test]
    fn sim_time_units() {
        assert_eq!(parse_sim_time("100s"), Some(100.0));
        assert_eq!(parse_sim_time("2min"), Some(120.0));
        assert_eq!(parse_sim_time("1h 30min"), Some(5400.0));
        assert!((parse_sim_time("250ms").unwrap() - 0.25).abs() < 1e-12);
        assert_eq!(parse_sim_time("42"), Some(42.0));
        assert_eq!(parse_sim_time("soon"), None);
        assert_eq!(parse_sim_time(""), None);
    }
}
