//! Run and node error taxonomy
//!
//! Two layers: [`RunError`] covers failures that abort a pass before any
//! node builds (bad manifest, bad graph, irreconcilable policy), while
//! [`NodeErrorKind`] classifies contained per-node failures that the
//! report carries without stopping other nodes.

use crate::graph::GraphError;
use crate::manifest::ManifestError;
use monolink_policy::ConfigError;
use serde::Serialize;
use std::fmt;

/// Failure that aborts the pass before any node is built.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The manifest could not be loaded.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The declared graph is malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Policy resolution rejected the declared configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Classification of one node's contained failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeErrorKind {
    /// The external tool ran and reported failure.
    BuildFailed {
        /// Tool exit code, when the process was not signal-terminated.
        exit_code: Option<i32>,
    },
    /// The produced artifact could not be parsed for inspection.
    UnreadableArtifact,
    /// Verification kept failing after the allowed rebuild attempts.
    ExceededRetries {
        /// Total build attempts made.
        attempts: u32,
    },
}

impl NodeErrorKind {
    /// One-line operator hint attached to reports.
    #[must_use]
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            Self::BuildFailed { .. } => "inspect the captured tool output for this node",
            Self::UnreadableArtifact => {
                "the tool produced an artifact in an unrecognized format; check the tool version"
            }
            Self::ExceededRetries { .. } => {
                "the tool keeps emitting a directive the policy forbids; check its flag handling"
            }
        }
    }
}

impl fmt::Display for NodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildFailed { exit_code: Some(code) } => {
                write!(f, "build failed (exit code {code})")
            }
            Self::BuildFailed { exit_code: None } => write!(f, "build failed (signal)"),
            Self::UnreadableArtifact => write!(f, "artifact unreadable"),
            Self::ExceededRetries { attempts } => {
                write!(f, "verification failed after {attempts} attempts")
            }
        }
    }
}
