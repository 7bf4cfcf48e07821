//! End-to-end delay.
//!
//! The preferred source pairs packet ids between the send and receive vectors.
//! Runs that did not record id vectors fall back to a recorded delay vector,
//! then to the `count`/`mean`/`stddev` fields of a scalar delay statistic.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use qgpsr_abstract::MetricNames;
use serde::Serialize;
use tracing::debug;

use super::MetricCell;
use crate::repository::RunView;
use crate::stats::{DistributionSummary, Moments};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelaySource {
    PacketPairing,
    RecordedDelayVector,
    ScalarAggregate,
}

/// Sample-level summary, or only moments when the run recorded nothing finer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayDistribution {
    Samples(DistributionSummary),
    Moments {
        count: u64,
        mean: f64,
        stddev: Option<f64>,
    },
}

impl DelayDistribution {
    pub fn count(&self) -> u64 {
        match self {
            DelayDistribution::Samples(s) => s.count as u64,
            DelayDistribution::Moments { count, .. } => *count,
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            DelayDistribution::Samples(s) => s.mean,
            DelayDistribution::Moments { mean, .. } => *mean,
        }
    }
}

/// Bookkeeping of the packet-id pairing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PairingCounts {
    pub sent: usize,
    pub delivered: usize,
    /// Receives of an id already received once.
    pub duplicates: usize,
    /// Receives of an id that was never sent.
    pub unmatched: usize,
    /// Pairs whose receive precedes the send; discarded.
    pub negative: usize,
    /// Sent ids never received.
    pub undelivered: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayStats {
    pub source: DelaySource,
    pub distribution: DelayDistribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing: Option<PairingCounts>,
}

pub(crate) struct DelayResult {
    pub cell: MetricCell<DelayStats>,
    /// Sorted; empty for the scalar fallback.
    pub samples: Vec<f64>,
}

impl DelayResult {
    fn insufficient(reason: impl Into<String>) -> Self {
        Self {
            cell: MetricCell::insufficient(reason),
            samples: Vec::new(),
        }
    }
}

/// Packet ids are recorded as vector values; anything that is not a
/// non-negative integer cannot name a packet.
fn packet_id(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as u64)
}

/// Earliest time each id appears in any vector named `name`.
fn earliest_by_id<'a>(run: RunView<'a>, name: &'a str) -> Option<BTreeMap<u64, f64>> {
    let mut found = false;
    let mut earliest = BTreeMap::new();
    for vector in run.vectors_named(name) {
        found = true;
        for sample in vector.samples() {
            let Some(id) = packet_id(sample.value) else {
                continue;
            };
            earliest
                .entry(id)
                .and_modify(|t: &mut f64| *t = t.min(sample.time))
                .or_insert(sample.time);
        }
    }
    found.then_some(earliest)
}

pub(crate) fn pair_packets(
    sends: &BTreeMap<u64, f64>,
    receives: impl IntoIterator<Item = (u64, f64)>,
) -> (Vec<f64>, PairingCounts) {
    let mut counts = PairingCounts {
        sent: sends.len(),
        ..Default::default()
    };
    let mut first_receive: BTreeMap<u64, f64> = BTreeMap::new();
    for (id, time) in receives {
        if !sends.contains_key(&id) {
            counts.unmatched += 1;
            continue;
        }
        match first_receive.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(time);
            }
            Entry::Occupied(mut slot) => {
                counts.duplicates += 1;
                if time < *slot.get() {
                    slot.insert(time);
                }
            }
        }
    }

    let mut delays = Vec::with_capacity(first_receive.len());
    for (id, received) in &first_receive {
        let delay = received - sends[id];
        if delay < 0.0 {
            counts.negative += 1;
        } else {
            delays.push(delay);
        }
    }
    counts.delivered = delays.len();
    counts.undelivered = sends.len() - first_receive.len();
    delays.sort_by(f64::total_cmp);
    (delays, counts)
}

fn from_pairing(run: RunView<'_>, names: &MetricNames) -> Option<DelayResult> {
    let sends = earliest_by_id(run, &names.send_id_vector);
    let has_receives = run.vectors_named(&names.receive_id_vector).next().is_some();
    if sends.is_none() && !has_receives {
        return None;
    }
    let sends = sends.unwrap_or_default();
    let receives = run
        .vectors_named(&names.receive_id_vector)
        .flat_map(|v| v.samples())
        .filter_map(|s| packet_id(s.value).map(|id| (id, s.time)));
    let (delays, counts) = pair_packets(&sends, receives);
    debug!(
        "Run {}: paired {} packets ({} duplicate, {} unmatched, {} negative)",
        run.identity(),
        counts.delivered,
        counts.duplicates,
        counts.unmatched,
        counts.negative
    );
    if delays.is_empty() {
        return Some(DelayResult::insufficient(format!(
            "no packet delivered ({} sent, {} unmatched receives)",
            counts.sent, counts.unmatched
        )));
    }
    Some(DelayResult {
        cell: MetricCell::computed(DelayStats {
            source: DelaySource::PacketPairing,
            distribution: DelayDistribution::Samples(DistributionSummary::from_sorted(&delays)),
            pairing: Some(counts),
        }),
        samples: delays,
    })
}

fn from_delay_vector(run: RunView<'_>, names: &MetricNames) -> Option<DelayResult> {
    let mut vectors = run.vectors_named(&names.delay_vector).peekable();
    vectors.peek()?;
    let mut samples: Vec<f64> = vectors
        .flat_map(|v| v.samples())
        .map(|s| s.value)
        .filter(|d| d.is_finite())
        .collect();
    if samples.is_empty() {
        return Some(DelayResult::insufficient(format!(
            "{} recorded no samples",
            names.delay_vector
        )));
    }
    samples.sort_by(f64::total_cmp);
    Some(DelayResult {
        cell: MetricCell::computed(DelayStats {
            source: DelaySource::RecordedDelayVector,
            distribution: DelayDistribution::Samples(DistributionSummary::from_sorted(&samples)),
            pairing: None,
        }),
        samples,
    })
}

fn from_statistic(run: RunView<'_>, names: &MetricNames) -> Option<DelayResult> {
    let count_name = format!("{}:count", names.delay_statistic);
    let mean_name = format!("{}:mean", names.delay_statistic);
    let stddev_name = format!("{}:stddev", names.delay_statistic);

    let mut seen = false;
    let mut combined = Moments::new();
    for count in run.scalars_named(&count_name) {
        seen = true;
        if count.value < 1.0 {
            continue;
        }
        let Some(mean) = run.scalar(&count.module, &mean_name) else {
            continue;
        };
        let stddev = run
            .scalar(&count.module, &stddev_name)
            .map(|s| s.value)
            .filter(|s| s.is_finite())
            .unwrap_or(0.0);
        let part = Moments::from_summary(count.value as u64, mean.value, stddev);
        combined = combined.merge(&part);
    }
    if !seen {
        return None;
    }
    let Some(mean) = combined.mean() else {
        return Some(DelayResult::insufficient(format!(
            "{count_name} is zero in every module"
        )));
    };
    Some(DelayResult {
        cell: MetricCell::computed(DelayStats {
            source: DelaySource::ScalarAggregate,
            distribution: DelayDistribution::Moments {
                count: combined.count(),
                mean,
                stddev: combined.stddev(),
            },
            pairing: None,
        }),
        samples: Vec::new(),
    })
}

pub(crate) fn compute(run: RunView<'_>, names: &MetricNames) -> DelayResult {
    from_pairing(run, names)
        .or_else(|| from_delay_vector(run, names))
        .or_else(|| from_statistic(run, names))
        .unwrap_or_else(|| {
            DelayResult::insufficient(format!(
                "none of {}, {}, {} or {} recorded",
                names.send_id_vector,
                names.receive_id_vector,
                names.delay_vector,
                names.delay_statistic
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_uses_earliest_events() {
        let sends = BTreeMap::from([(1, 1.0), (2, 2.0), (3, 3.0)]);
        let receives = [(1, 1.5), (1, 1.25), (2, 2.5), (9, 4.0)];
        let (delays, counts) = pair_packets(&sends, receives);

        assert_eq!(delays, vec![0.25, 0.5]);
        assert_eq!(counts.sent, 3);
        assert_eq!(counts.delivered, 2);
        assert_eq!(counts.duplicates, 1);
        assert_eq!(counts.unmatched, 1);
        assert_eq!(counts.undelivered, 1);
        assert_eq!(counts.negative, 0);
    }

    #[test]
    fn negative_delay_is_discarded() {
        let sends = BTreeMap::from([(7, 5.0), (8, 5.0)]);
        let (delays, counts) = pair_packets(&sends, [(7, 4.0), (8, 5.5)]);
        assert_eq!(delays, vec![0.5]);
        assert_eq!(counts.negative, 1);
        assert_eq!(counts.delivered, 1);
        assert_eq!(counts.undelivered, 0);
    }

    #[test]
    fn packet_ids_must_be_whole() {
        assert_eq!(packet_id(42.0), Some(42));
        assert_eq!(packet_id(1.5), None);
        assert_eq!(packet_id(-1.0), None);
        assert_eq!(packet_id(f64::NAN), None);
    }
}
