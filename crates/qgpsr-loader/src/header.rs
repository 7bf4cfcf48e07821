use qgpsr_abstract::{RunIdentity, RunSection};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Accumulates a run section's header until the first record needs its
/// identity. Parameters keep accumulating after the identity is frozen.
#[derive(Debug)]
pub(crate) struct RunHeader {
    label: String,
    parameters: BTreeMap<String, String>,
    identity: Option<Arc<RunIdentity>>,
}

impl RunHeader {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parameters: BTreeMap::new(),
            identity: None,
        }
    }

    pub(crate) fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Identity of this run; built from the attributes seen so far on first call.
    pub(crate) fn identity(&mut self) -> Arc<RunIdentity> {
        if let Some(identity) = &self.identity {
            return identity.clone();
        }
        let identity = Arc::new(self.build_identity());
        self.identity = Some(identity.clone());
        identity
    }

    pub(crate) fn into_section(mut self) -> RunSection {
        let identity = self.identity();
        RunSection {
            identity,
            label: self.label,
            parameters: self.parameters,
        }
    }

    fn build_identity(&self) -> RunIdentity {
        let config_name = self
            .parameters
            .get("configname")
            .cloned()
            .unwrap_or_else(|| fallback_config_name(&self.label).to_string());
        let run_number = self
            .parameters
            .get("runnumber")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let repetition = ["repetition", "seedset", "replication"]
            .iter()
            .find_map(|key| self.parameters.get(*key))
            .cloned()
            .unwrap_or_default();
        RunIdentity::new(config_name, run_number, repetition)
    }
}

/// Configuration name embedded in a run id of the form
/// `<config>-<number>-<timestamp>-<pid>`.
pub(crate) fn fallback_config_name(label: &str) -> &str {
    let bytes = label.as_bytes();
    for (idx, b) in bytes.iter().enumerate() {
        if *b == b'-' && bytes.get(idx + 1).is_some_and(u8::is_ascii_digit) {
            return &label[..idx];
        }
    }
    label
}
