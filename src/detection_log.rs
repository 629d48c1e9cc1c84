//! Append-only history of every published detection.
//!
//! One entry per surviving detection per cycle, not deduplicated: an object
//! visible for a hundred cycles contributes a hundred entries. The log is read
//! once, at export time, to build the manifest.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::{Arc, Mutex};

use crate::detect::{Detection, DetectionSet};

/// When the detection log is cleared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPolicy {
    /// Clear on every `Idle -> Recording` transition.
    #[default]
    ResetOnRecord,
    /// Keep everything for the lifetime of the camera session.
    Session,
}

impl LogPolicy {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reset_on_record" => Ok(Self::ResetOnRecord),
            "session" => Ok(Self::Session),
            other => Err(anyhow!(
                "unknown log policy '{}' (expected reset_on_record or session)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DetectionLog {
    entries: Vec<Detection>,
}

impl DetectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every detection of a published set, in set order.
    pub fn append_set(&mut self, set: &DetectionSet) {
        self.entries.extend(set.iter().cloned());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Detection] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Detection> for DetectionLog {
    fn from_iter<T: IntoIterator<Item = Detection>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Detection log shared between the detection loop (writer) and export (reader).
///
/// The lock is only taken for a synchronous append, clear or snapshot and is
/// never held across an `.await`.
#[derive(Clone, Debug, Default)]
pub struct SharedDetectionLog {
    inner: Arc<Mutex<DetectionLog>>,
}

impl SharedDetectionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_set(&self, set: &DetectionSet) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("detection log lock poisoned"))?;
        guard.append_set(set);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("detection log lock poisoned"))?;
        guard.clear();
        Ok(())
    }

    /// Copy of the log as it stands now.
    pub fn snapshot(&self) -> Result<DetectionLog> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("detection log lock poisoned"))?;
        Ok(guard.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
