use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub results_dir: PathBuf,
    /// Glob patterns, relative to `results_dir`.
    pub patterns: Vec<String>,
    /// Worker threads for parsing and for per-run metrics. 0 means one per
    /// available core.
    pub workers: usize,
    /// Two-sided confidence level for across-run intervals.
    pub confidence_level: f64,
    pub metrics: MetricNames,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            patterns: vec!["*.sca".to_string(), "*.vec".to_string()],
            workers: 0,
            confidence_level: 0.95,
            metrics: MetricNames::default(),
        }
    }
}

/// Names of the recorded statistics each metric family is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricNames {
    pub sent_count: String,
    pub delivered_count: String,
    /// Control-plane counters summed into the routing overhead numerator.
    pub control_sent: Vec<String>,
    /// Vector whose values are ids of packets handed to the network.
    pub send_id_vector: String,
    /// Vector whose values are ids of packets delivered to the application.
    pub receive_id_vector: String,
    /// Vector whose values are already end-to-end delays.
    pub delay_vector: String,
    /// Statistic whose `count`/`mean`/`stddev` fields summarise delay.
    pub delay_statistic: String,
    pub queue_length_vector: String,
    /// Run parameter holding the configured simulated duration.
    pub sim_time_limit_key: String,
}

impl Default for MetricNames {
    fn default() -> Self {
        Self {
            sent_count: "packetSent:count".to_string(),
            delivered_count: "packetReceived:count".to_string(),
            control_sent: vec!["beaconSent:count".to_string()],
            send_id_vector: "packetSentId:vector".to_string(),
            receive_id_vector: "packetReceivedId:vector".to_string(),
            delay_vector: "endToEndDelay:vector".to_string(),
            delay_statistic: "endToEndDelay:histogram".to_string(),
            queue_length_vector: "queueLength:vector".to_string(),
            sim_time_limit_key: "sim-time-limit".to_string(),
        }
    }
}

/// Command-line overrides layered on top of a loaded configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverride {
    pub results_dir: Option<PathBuf>,
    pub patterns: Option<Vec<String>>,
    pub workers: Option<usize>,
    pub confidence_level: Option<f64>,
}

impl ConfigOverride {
    pub fn apply_to(&self, config: &mut AnalysisConfig) {
        if let Some(v) = &self.results_dir {
            config.results_dir = v.clone();
        }
        if let Some(v) = &self.patterns
            && !v.is_empty()
        {
            config.patterns = v.clone();
        }
        if let Some(v) = self.workers {
            config.workers = v;
        }
        if let Some(v) = self.confidence_level {
            config.confidence_level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            results_dir = "out/grid"
            [metrics]
            control_sent = ["beaconSent:count", "helloSent:count"]
            "#,
        )
        .unwrap();
        assert_eq!(config.results_dir, PathBuf::from("out/grid"));
        assert_eq!(config.patterns, vec!["*.sca", "*.vec"]);
        assert_eq!(config.metrics.control_sent.len(), 2);
        assert_eq!(config.metrics.sent_count, "packetSent:count");
    }

    #[test]
    fn override_replaces_only_given_fields() {
        let mut config = AnalysisConfig::default();
        ConfigOverride {
            workers: Some(3),
            patterns: Some(Vec::new()),
            ..Default::default()
        }
        .apply_to(&mut config);
        assert_eq!(config.workers, 3);
        assert_eq!(config.patterns.len(), 2);
        assert_eq!(config.confidence_level, 0.95);
    }
}
