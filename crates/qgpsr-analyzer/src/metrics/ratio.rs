use qgpsr_abstract::MetricNames;
use serde::Serialize;

use super::MetricCell;
use crate::repository::RunView;

/// A ratio together with the totals it was computed from, so that runs can
/// later be pooled by summing numerators and denominators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioValue {
    pub numerator: f64,
    pub denominator: f64,
    pub ratio: f64,
}

/// `numerator / denominator`, or InsufficientData if either side is missing
/// or the denominator is zero.
pub fn ratio_cell(
    numerator: Option<f64>,
    denominator: Option<f64>,
    numerator_name: &str,
    denominator_name: &str,
) -> MetricCell<RatioValue> {
    let Some(denominator) = denominator else {
        return MetricCell::insufficient(format!("{denominator_name} not recorded"));
    };
    let Some(numerator) = numerator else {
        return MetricCell::insufficient(format!("{numerator_name} not recorded"));
    };
    if denominator == 0.0 {
        return MetricCell::insufficient(format!("{denominator_name} is zero"));
    }
    MetricCell::computed(RatioValue {
        numerator,
        denominator,
        ratio: numerator / denominator,
    })
}

pub fn delivery_ratio(run: RunView<'_>, names: &MetricNames) -> MetricCell<RatioValue> {
    ratio_cell(
        run.scalar_sum(&names.delivered_count),
        run.scalar_sum(&names.sent_count),
        &names.delivered_count,
        &names.sent_count,
    )
}

/// Control packets sent per delivered data packet. Every configured control
/// counter contributes; the numerator is missing only if none was recorded.
pub fn routing_overhead(run: RunView<'_>, names: &MetricNames) -> MetricCell<RatioValue> {
    let control = names
        .control_sent
        .iter()
        .filter_map(|name| run.scalar_sum(name))
        .reduce(|a, b| a + b);
    ratio_cell(
        control,
        run.scalar_sum(&names.delivered_count),
        &names.control_sent.join(" + "),
        &names.delivered_count,
    )
}
