//! Persisted per-node build records
//!
//! Each node's output directory carries a small JSON record of the policy
//! it was last built under and when. Staleness evaluation reads it on the
//! next pass; a missing or unreadable record means the node counts as
//! never built.

use monolink_policy::LinkagePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::SystemTime;

/// File name of the record inside a node's output directory.
pub const STATE_FILE: &str = "build-state.json";

/// Record of a node's last successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
    /// Effective policy the node was built under.
    pub policy: LinkagePolicy,
    /// When the build completed.
    pub built_at: SystemTime,
}

impl BuildState {
    /// Record a build that just completed.
    #[must_use]
    pub fn now(policy: LinkagePolicy) -> Self {
        Self {
            policy,
            built_at: SystemTime::now(),
        }
    }

    /// Load the record from a node's output directory.
    ///
    /// A missing or corrupt record yields `None`; both mean the node must
    /// be treated as never built.
    #[must_use]
    pub fn load(node_out_dir: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(node_out_dir.join(STATE_FILE)).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Persist the record into a node's output directory.
    ///
    /// # Errors
    /// Returns the underlying I/O error when the record cannot be written.
    pub fn save(&self, node_out_dir: &Path) -> std::io::Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(node_out_dir.join(STATE_FILE), text)
    }
}

/// Newest modification timestamp under a source tree.
///
/// Unreadable entries are skipped; an empty or missing tree falls back to
/// the epoch so it never looks newer than a recorded build.
#[must_use]
pub fn newest_source_mtime(source: &Path) -> SystemTime {
    let mut newest = SystemTime::UNIX_EPOCH;
    for entry in walkdir::WalkDir::new(source)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(mtime) = meta.modified() {
                if mtime > newest {
                    newest = mtime;
                }
            }
        }
    }
    newest
}
