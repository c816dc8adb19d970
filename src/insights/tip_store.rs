//! Single-slot handoff of generated tips to the next session.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use super::types::{PendingTips, Tip};
use crate::store::jsonl;

/// File holding the pending tip set.
pub const PENDING_TIPS_FILE: &str = "pending_tips.json";

/// Persists one pending tip set between processes.
///
/// Reading twice is harmless; [`SessionTipStore::take`] is load-then-clear.
#[derive(Debug, Clone)]
pub struct SessionTipStore {
    path: PathBuf,
}

impl SessionTipStore {
    /// Store under `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join(PENDING_TIPS_FILE),
        }
    }

    /// Location of the pending tip file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the pending set.
    pub fn save(&self, tips: &[Tip], session_id: Option<&str>, project: Option<&str>) -> bool {
        let pending = PendingTips {
            tips: tips.to_vec(),
            session_id: session_id.map(str::to_string),
            project: project.map(str::to_string),
            generated_at: Utc::now(),
        };
        match jsonl::write_json(&self.path, &pending) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save pending tips");
                false
            }
        }
    }

    /// The pending set, if any.
    pub fn load(&self) -> Option<PendingTips> {
        match jsonl::read_json(&self.path) {
            Ok(pending) => pending,
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable pending tips");
                None
            }
        }
    }

    /// Drop the pending set. Succeeds when nothing was pending.
    pub fn clear(&self) -> bool {
        match jsonl::remove(&self.path) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to clear pending tips");
                false
            }
        }
    }

    /// Load the pending set and clear it.
    pub fn take(&self) -> Option<PendingTips> {
        let pending = self.load()?;
        self.clear();
        Some(pending)
    }
}
