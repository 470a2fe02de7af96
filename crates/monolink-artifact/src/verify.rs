//! Consistency verification
//!
//! Purely a comparison between an inspection and the active policy. Acting
//! on the report (marking a node stale, triggering a rebuild) is the
//! orchestrator's job.

use crate::inspect::{DirectiveSet, Inspection};
use monolink_policy::LinkagePolicy;
use serde::Serialize;
use std::path::PathBuf;

/// Per-artifact verification outcome.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// The artifact that was checked.
    pub artifact: PathBuf,
    /// Whether the artifact satisfies the policy.
    pub passed: bool,
    /// Directive the policy expects.
    pub expected: String,
    /// Directives actually found, in first-seen order.
    pub found: DirectiveSet,
    /// Distinct directives disagree within the artifact. Mixed-variant
    /// linkage is unconditionally unsafe, so this fails under any policy.
    pub mixed: bool,
}

impl VerificationReport {
    /// Human-readable mismatch summary for failure reporting.
    #[must_use]
    pub fn mismatch_detail(&self) -> Option<String> {
        if self.passed {
            return None;
        }
        if self.mixed {
            Some(format!(
                "mixed directives [{}], expected only {}",
                self.found, self.expected
            ))
        } else if self.found.is_empty() {
            Some(format!("no directives found, expected {}", self.expected))
        } else {
            Some(format!("found {}, expected {}", self.found, self.expected))
        }
    }
}

/// Verify an inspected artifact against the active policy.
///
/// The policy is satisfied iff the directive set is homogeneous and equals
/// the policy's expected label. A mixed set always fails regardless of
/// policy.
#[must_use]
pub fn verify(inspection: &Inspection, policy: &LinkagePolicy) -> VerificationReport {
    let expected = policy.expected_directive();
    let mixed = inspection.directives.is_mixed();
    let passed = !mixed && inspection.directives.sole() == Some(expected);

    VerificationReport {
        artifact: inspection.artifact.path.clone(),
        passed,
        expected: expected.to_string(),
        found: inspection.directives.clone(),
        mixed,
    }
}
