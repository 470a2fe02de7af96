//! Run reporting
//!
//! One build pass produces a [`RunReport`]: every declared node appears
//! exactly once with a terminal [`NodeOutcome`], followed by the
//! consolidation results. The report renders as human-readable text or
//! JSON and determines the process exit code.

use crate::error::NodeErrorKind;
use chrono::{DateTime, Utc};
use monolink_policy::LinkagePolicy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use uuid::Uuid;

/// Terminal state of one node after a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The node's artifact exists and passed verification.
    Built {
        /// Verified artifact location.
        artifact: PathBuf,
        /// Whether the tool actually ran this pass (false = fresh reuse).
        rebuilt: bool,
    },
    /// The node failed; dependents were not attempted.
    Failed {
        /// Failure classification.
        kind: NodeErrorKind,
        /// Captured detail (tool output, mismatch description).
        detail: String,
    },
    /// A dependency failed, so this node never ran.
    Skipped {
        /// The failed node this one (transitively) depends on.
        failed_dependency: String,
    },
}

impl NodeOutcome {
    /// Whether the node ended in a usable state.
    #[inline]
    #[must_use]
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built { .. })
    }
}

/// Result of one consolidation group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupReport {
    /// All members merged into the named output.
    Consolidated {
        /// Group output name.
        output: String,
        /// Merged archive location.
        artifact: PathBuf,
    },
    /// Consolidation was not attempted because a member did not build.
    MembersIncomplete {
        /// Group output name.
        output: String,
        /// Members that are not in a built state.
        missing: Vec<String>,
    },
    /// Consolidation ran and failed (duplicate symbol, unreadable member).
    Failed {
        /// Group output name.
        output: String,
        /// Rendered consolidation error.
        detail: String,
    },
}

impl GroupReport {
    /// Group output name.
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::Consolidated { output, .. }
            | Self::MembersIncomplete { output, .. }
            | Self::Failed { output, .. } => output,
        }
    }
}

/// Full record of one build pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id for this pass.
    pub run_id: Uuid,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// The requested pass-wide policy.
    pub policy: LinkagePolicy,
    /// Terminal outcome per declared node.
    pub nodes: BTreeMap<String, NodeOutcome>,
    /// One entry per declared consolidation group.
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    /// Start a report for a new pass.
    #[must_use]
    pub fn begin(policy: LinkagePolicy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            policy,
            nodes: BTreeMap::new(),
            groups: Vec::new(),
        }
    }

    /// Process exit code for this pass.
    ///
    /// Build failures (including skips they caused) outrank verification
    /// failures, which outrank consolidation failures. A fully clean pass
    /// is zero.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let mut verification_failed = false;
        for outcome in self.nodes.values() {
            match outcome {
                NodeOutcome::Failed {
                    kind: NodeErrorKind::ExceededRetries { .. },
                    ..
                } => verification_failed = true,
                NodeOutcome::Failed { .. } | NodeOutcome::Skipped { .. } => return 3,
                NodeOutcome::Built { .. } => {}
            }
        }
        if verification_failed {
            return 4;
        }
        if self
            .groups
            .iter()
            .any(|g| matches!(g, GroupReport::Failed { .. }))
        {
            return 5;
        }
        0
    }

    /// Render the report as human-readable text.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "build pass {} ({})", self.run_id, self.policy);

        for (name, outcome) in &self.nodes {
            match outcome {
                NodeOutcome::Built { artifact, rebuilt } => {
                    let how = if *rebuilt { "built" } else { "fresh" };
                    let _ = writeln!(out, "  {how:>7}  {name}  {}", artifact.display());
                }
                NodeOutcome::Failed { kind, detail } => {
                    let _ = writeln!(out, "   failed  {name}  {kind}");
                    let _ = writeln!(out, "           hint: {}", kind.remediation_hint());
                    for line in detail.lines() {
                        let _ = writeln!(out, "           | {line}");
                    }
                }
                NodeOutcome::Skipped { failed_dependency } => {
                    let _ = writeln!(
                        out,
                        "  skipped  {name}  (dependency '{failed_dependency}' failed)"
                    );
                }
            }
        }

        for group in &self.groups {
            match group {
                GroupReport::Consolidated { output, artifact } => {
                    let _ = writeln!(out, "   merged  {output}  {}", artifact.display());
                }
                GroupReport::MembersIncomplete { output, missing } => {
                    let _ = writeln!(
                        out,
                        "  skipped  {output}  (members not built: {})",
                        missing.join(", ")
                    );
                }
                GroupReport::Failed { output, detail } => {
                    let _ = writeln!(out, "   failed  {output}  {detail}");
                }
            }
        }

        out
    }
}
