use std::fs;
use std::path::Path;

use qgpsr_abstract::AnalysisConfig;
use qgpsr_analyzer::{
    AnalysisError, Anomaly, DelaySource, MetricFamily, RunFilter, compute_statistics,
    parse_results,
};
use qgpsr_loader::ParseErrorKind;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tempfile::TempDir;

fn header(config: &str, run: u32) -> String {
    format!(
        "version 3\nrun {config}-{run}-20240312-10:41:07-{pid}\nattr configname {config}\nattr runnumber {run}\nattr repetition {run}\nconfig sim-time-limit 10s\n",
        pid = 4000 + run
    )
}

fn scalars(config: &str, run: u32, sent: u32, delivered: u32, beacons: u32) -> String {
    let mut text = header(config, run);
    text.push_str(&format!(
        "scalar Net.host[0].app[0] packetSent:count {sent}\n\
         scalar Net.host[1].app[0] packetReceived:count {delivered}\n\
         scalar Net.host[0].gpsr beaconSent:count {beacons}\n\
         attr unit pk\n"
    ));
    text
}

/// Packet `i` leaves at `i` seconds and arrives `delay(i)` later; the queue
/// holds `queue` packets for the whole run.
fn vectors(
    config: &str,
    run: u32,
    packets: u32,
    delay: impl Fn(u32) -> f64,
    queue: f64,
) -> String {
    let mut text = header(config, run);
    text.push_str("vector 0 Net.host[0].app[0] packetSentId:vector ETV\n");
    text.push_str("vector 1 Net.host[1].app[0] packetReceivedId:vector ETV\n");
    text.push_str("vector 2 Net.host[0].queue queueLength:vector TV\n");
    text.push_str(&format!("2\t0\t{queue}\n"));
    let mut event = 1;
    for i in 0..packets {
        let sent = f64::from(i);
        text.push_str(&format!("0\t{event}\t{sent}\t{i}\n"));
        text.push_str(&format!("1\t{}\t{}\t{i}\n", event + 1, sent + delay(i)));
        event += 2;
    }
    text.push_str(&format!("2\t5\t{queue}\n"));
    text
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

/// Three runs in two configurations, one file per run and kind.
fn fixture_files() -> Vec<(String, String)> {
    vec![
        ("A-0.sca".into(), scalars("A", 0, 100, 95, 300)),
        ("A-0.vec".into(), vectors("A", 0, 4, |_| 0.25, 2.0)),
        ("A-1.sca".into(), scalars("A", 1, 50, 50, 100)),
        ("A-1.vec".into(), vectors("A", 1, 4, |i| 0.5 * f64::from(i + 1), 4.0)),
        ("B-0.sca".into(), scalars("B", 0, 0, 0, 10)),
        ("B-0.vec".into(), vectors("B", 0, 2, |_| 1.0, 1.0)),
    ]
}

fn fixture_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in fixture_files() {
        write(dir.path(), &name, &contents);
    }
    dir
}

fn patterns() -> Vec<String> {
    vec!["*.sca".to_string(), "*.vec".to_string()]
}

#[test]
fn end_to_end_summary() {
    let dir = fixture_dir();
    let config = AnalysisConfig::default();
    let handle = parse_results(dir.path(), &patterns(), &config).unwrap();
    assert_eq!(handle.run_count(), 3);
    assert_eq!(handle.files_ingested(), 6);

    let summary = compute_statistics(&handle, &config);
    assert_eq!(summary.runs.len(), 3);
    assert_eq!(summary.configurations.len(), 2);

    let a = summary.configuration("A").unwrap();
    assert_eq!(a.runs, 2);
    let pdr = a.delivery_ratio.value().unwrap();
    let per_run: Vec<f64> = pdr.per_run.iter().map(|r| r.ratio).collect();
    assert_eq!(per_run, vec![0.95, 1.0]);
    assert_eq!(pdr.pooled, 145.0 / 150.0);

    let overhead = a.routing_overhead.value().unwrap();
    assert_eq!(overhead.pooled_numerator, 400.0);
    assert_eq!(overhead.pooled_denominator, 145.0);

    let delay = a.end_to_end_delay.value().unwrap();
    let pooled = delay.pooled.unwrap();
    assert_eq!(pooled.count, 8);
    assert_eq!(pooled.max, 2.0);
    assert_eq!(pooled.min, 0.25);
    assert_eq!(delay.pooled_runs, 2);

    let first = &summary.runs[0];
    assert_eq!(
        first.end_to_end_delay.value().unwrap().source,
        DelaySource::PacketPairing
    );
    let queue = first.queue_utilization.value().unwrap();
    assert_eq!(queue.mean, 2.0);
    assert_eq!(queue.run_end, 10.0);

    let queues = a.queue_utilization.value().unwrap();
    assert_eq!(queues.mean, 3.0);
    assert!(queues.ci_half_width.is_some());
}

#[test]
fn insufficient_cells_are_enumerated() {
    let dir = fixture_dir();
    let config = AnalysisConfig::default();
    let handle = parse_results(dir.path(), &patterns(), &config).unwrap();
    let summary = compute_statistics(&handle, &config);

    let b = summary.configuration("B").unwrap();
    assert!(!b.delivery_ratio.is_computed());
    assert!(!b.routing_overhead.is_computed());
    assert!(b.end_to_end_delay.is_computed());

    let missing: Vec<_> = summary
        .insufficient_data
        .iter()
        .map(|c| (c.config_name.as_str(), c.metric))
        .collect();
    assert_eq!(
        missing,
        vec![
            ("B", MetricFamily::DeliveryRatio),
            ("B", MetricFamily::RoutingOverhead)
        ]
    );
    let markdown = summary.to_markdown();
    assert!(markdown.contains("## Insufficient data"));
    assert!(markdown.contains("packetSent:count is zero"));
}

#[test]
fn out_of_order_vector_file_is_skipped_whole() {
    let dir = fixture_dir();
    let mut broken = header("C", 0);
    broken.push_str("vector 0 Net.host[0].queue queueLength:vector TV\n0\t1.0\t3\n0\t0.5\t3\n");
    write(dir.path(), "C-0.vec", &broken);

    let config = AnalysisConfig::default();
    let handle = parse_results(dir.path(), &patterns(), &config).unwrap();

    assert_eq!(handle.skipped_files().len(), 1);
    let skipped = &handle.skipped_files()[0];
    assert!(skipped.path.ends_with("C-0.vec"));
    assert_eq!(skipped.error, ParseErrorKind::OrderingViolation);
    assert_eq!(handle.query(&RunFilter::config("C"), "queueLength:vector").count(), 0);
    assert_eq!(handle.run_count(), 3);

    let summary = compute_statistics(&handle, &config);
    assert_eq!(summary.files.skipped, 1);
    assert_eq!(summary.skipped_files.len(), 1);
    assert!(summary.to_markdown().contains("C-0.vec"));
}

#[test]
fn duplicate_across_files_raises_one_anomaly() {
    let dir = fixture_dir();
    let mut again = header("A", 1);
    again.push_str("scalar Net.host[0].app[0] packetSent:count 80\n");
    write(dir.path(), "A-1-rerun.sca", &again);

    let config = AnalysisConfig::default();
    let handle = parse_results(dir.path(), &patterns(), &config).unwrap();
    assert_eq!(handle.anomalies().len(), 1);
    let Anomaly::DuplicateDefinition { metric, source, .. } = &handle.anomalies()[0];
    assert_eq!(metric, "packetSent:count");
    assert!(source.as_ref().unwrap().ends_with("A-1.sca"));

    // "A-1-rerun.sca" sorts before "A-1.sca", so A-1.sca is merged last and wins.
    let summary = compute_statistics(&handle, &config);
    let pdr = summary.configuration("A").unwrap().delivery_ratio.value().unwrap();
    assert_eq!(pdr.per_run[1].ratio, 1.0);
}

#[test]
fn rerun_under_new_run_id_is_the_same_run() {
    let dir = tempfile::tempdir().unwrap();
    let reruns = [
        ("first.sca", "R-0-20240312-10:41:07-4001", 90),
        ("second.sca", "R-0-20240313-08:02:51-5123", 99),
    ];
    for (name, label, delivered) in reruns {
        let text = format!(
            "version 3\nrun {label}\nattr configname R\nattr runnumber 0\nattr repetition 0\n\
             scalar Net.host[0].app[0] packetSent:count 100\n\
             scalar Net.host[1].app[0] packetReceived:count {delivered}\n"
        );
        write(dir.path(), name, &text);
    }

    let config = AnalysisConfig::default();
    let handle = parse_results(dir.path(), &patterns(), &config).unwrap();
    assert_eq!(handle.run_count(), 1);
    assert_eq!(handle.anomalies().len(), 2);
    for anomaly in handle.anomalies() {
        let Anomaly::DuplicateDefinition { source, .. } = anomaly;
        assert!(source.as_ref().unwrap().ends_with("second.sca"));
    }

    let summary = compute_statistics(&handle, &config);
    assert_eq!(summary.runs.len(), 1);
    assert_eq!(summary.runs[0].run_label, "R-0-20240313-08:02:51-5123");
    assert_eq!(summary.runs[0].delivery_ratio.value().unwrap().ratio, 0.99);
}

#[test]
fn file_order_does_not_change_aggregates() {
    let config = AnalysisConfig::default();
    let reference = {
        let dir = fixture_dir();
        let handle = parse_results(dir.path(), &patterns(), &config).unwrap();
        compute_statistics(&handle, &config)
    };

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..4 {
        let mut files = fixture_files();
        files.shuffle(&mut rng);
        let dir = tempfile::tempdir().unwrap();
        // Names encode the shuffled position, so discovery order follows it.
        for (i, (name, contents)) in files.iter().enumerate() {
            let ext = Path::new(name).extension().unwrap().to_str().unwrap();
            write(dir.path(), &format!("{i:02}.{ext}"), contents);
        }
        let handle = parse_results(dir.path(), &patterns(), &config).unwrap();
        let summary = compute_statistics(&handle, &config);
        assert_eq!(summary.configurations, reference.configurations);
        assert_eq!(summary.runs, reference.runs);
    }
}

#[test]
fn worker_count_does_not_change_results() {
    let dir = fixture_dir();
    let single = AnalysisConfig {
        workers: 1,
        ..AnalysisConfig::default()
    };
    let many = AnalysisConfig {
        workers: 4,
        ..AnalysisConfig::default()
    };
    let a = compute_statistics(&parse_results(dir.path(), &patterns(), &single).unwrap(), &single);
    let b = compute_statistics(&parse_results(dir.path(), &patterns(), &many).unwrap(), &many);
    assert_eq!(a, b);
}

#[test]
fn missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let err = parse_results(&missing, &patterns(), &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::DirectoryNotFound(p) if p == missing));
}

#[test]
fn no_matching_files_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "notes.txt", "not a result file");
    let err = parse_results(dir.path(), &patterns(), &AnalysisConfig::default()).unwrap_err();
    match err {
        AnalysisError::EmptyResultSet { patterns: p, .. } => assert_eq!(p, patterns()),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn invalid_confidence_level_is_rejected() {
    let dir = fixture_dir();
    let config = AnalysisConfig {
        confidence_level: 1.0,
        ..AnalysisConfig::default()
    };
    let err = parse_results(dir.path(), &patterns(), &config).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidConfig(_)));
}

#[test]
fn summary_serializes_cell_status() {
    let dir = fixture_dir();
    let config = AnalysisConfig::default();
    let handle = parse_results(dir.path(), &patterns(), &config).unwrap();
    let summary = compute_statistics(&handle, &config);
    let json = serde_json::to_value(&summary).unwrap();

    let b_pdr = &json["configurations"][1]["delivery_ratio"];
    assert_eq!(b_pdr["status"], "insufficient_data");
    let a_pdr = &json["configurations"][0]["delivery_ratio"];
    assert_eq!(a_pdr["status"], "computed");
    assert_eq!(a_pdr["value"]["pooled_denominator"], 150.0);
    assert_eq!(
        json["runs"][0]["end_to_end_delay"]["value"]["source"],
        "packet_pairing"
    );
}
