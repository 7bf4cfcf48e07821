use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identifies one simulated execution.
///
/// Field order matters: the derived `Ord` sorts runs by configuration first,
/// then by run number, which is the order reports list them in.
///
/// The `run` line's id is not part of the identity. A re-run of the same
/// configuration, run number and repetition gets a fresh timestamp and pid in
/// its id but describes the same execution; see [`RunSection::label`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunIdentity {
    pub config_name: String,
    pub run_number: u32,
    /// Repetition / seed-set label. Empty when the file does not declare one.
    pub repetition: String,
}

impl RunIdentity {
    pub fn new(
        config_name: impl Into<String>,
        run_number: u32,
        repetition: impl Into<String>,
    ) -> Self {
        Self {
            config_name: config_name.into(),
            run_number,
            repetition: repetition.into(),
        }
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.config_name, self.run_number)?;
        if !self.repetition.is_empty() {
            write!(f, " (rep {})", self.repetition)?;
        }
        Ok(())
    }
}

/// A run section as declared by a result file: its frozen identity, its run id,
/// and the parameters (`itervar`, `config`, `par`, run attributes) seen in that file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSection {
    pub identity: Arc<RunIdentity>,
    /// The `run` line's id, e.g. `QueueGpsrGrid-3-20240312-10:41:07-5512`.
    pub label: String,
    pub parameters: BTreeMap<String, String>,
}

impl RunSection {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}
