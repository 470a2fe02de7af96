//! Staleness detection
//!
//! Decides whether a previously built node must be cleaned and rebuilt
//! before its artifacts can be verified authoritatively.

use crate::policy::LinkagePolicy;
use std::fmt;
use std::time::SystemTime;

/// Outcome of a staleness evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Artifacts no longer reflect policy or source; clean and rebuild.
    Stale(StaleReason),
    /// Prior artifacts may be reused (but are still verified).
    FreshEnough,
}

impl Staleness {
    /// True when a clean rebuild is required.
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Why a node was judged stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// No build record exists for the node.
    NeverBuilt,
    /// The effective policy changed since the last build.
    PolicyDrift {
        /// Policy for the current pass.
        current: LinkagePolicy,
        /// Policy recorded at the last successful build.
        last_build: LinkagePolicy,
    },
    /// Source was modified after the last build completed.
    SourceChanged,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverBuilt => write!(f, "never built"),
            Self::PolicyDrift { current, last_build } => {
                write!(f, "policy drift ({last_build} -> {current})")
            }
            Self::SourceChanged => write!(f, "source changed since last build"),
        }
    }
}

/// Evaluate whether a node's prior build output is still usable.
///
/// A node is stale when the current policy differs from the recorded one,
/// or when the source tree is newer than the last build. A missing build
/// record counts as stale. With unchanged inputs the answer is stable
/// across repeated calls.
#[must_use]
pub fn evaluate_staleness(
    current: LinkagePolicy,
    last_build_policy: Option<LinkagePolicy>,
    source_timestamp: SystemTime,
    last_build_timestamp: Option<SystemTime>,
) -> Staleness {
    let (last_policy, last_ts) = match (last_build_policy, last_build_timestamp) {
        (Some(policy), Some(ts)) => (policy, ts),
        _ => return Staleness::Stale(StaleReason::NeverBuilt),
    };

    if last_policy != current {
        return Staleness::Stale(StaleReason::PolicyDrift {
            current,
            last_build: last_policy,
        });
    }

    if source_timestamp > last_ts {
        return Staleness::Stale(StaleReason::SourceChanged);
    }

    Staleness::FreshEnough
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{BuildConfig, LinkageMode};
    use std::time::Duration;

    fn static_release() -> LinkagePolicy {
        LinkagePolicy::new(LinkageMode::Static, BuildConfig::Release)
    }

    fn dynamic_release() -> LinkagePolicy {
        LinkagePolicy::new(LinkageMode::Dynamic, BuildConfig::Release)
    }

    #[test]
    fn missing_record_is_stale() {
        let now = SystemTime::now();
        let result = evaluate_staleness(static_release(), None, now, None);
        assert_eq!(result, Staleness::Stale(StaleReason::NeverBuilt));
    }

    #[test]
    fn policy_drift_is_stale() {
        let now = SystemTime::now();
        let result =
            evaluate_staleness(static_release(), Some(dynamic_release()), now, Some(now));
        assert!(matches!(
            result,
            Staleness::Stale(StaleReason::PolicyDrift { .. })
        ));
    }

    #[test]
    fn newer_source_is_stale() {
        let built = SystemTime::now();
        let touched = built + Duration::from_secs(5);
        let result =
            evaluate_staleness(static_release(), Some(static_release()), touched, Some(built));
        assert_eq!(result, Staleness::Stale(StaleReason::SourceChanged));
    }

    #[test]
    fn unchanged_inputs_are_fresh_and_idempotent() {
        let source = SystemTime::now();
        let built = source + Duration::from_secs(1);

        let first =
            evaluate_staleness(static_release(), Some(static_release()), source, Some(built));
        let second =
            evaluate_staleness(static_release(), Some(static_release()), source, Some(built));

        assert_eq!(first, Staleness::FreshEnough);
        assert_eq!(first, second);
    }

    #[test]
    fn source_equal_to_build_time_is_fresh() {
        let ts = SystemTime::now();
        let result = evaluate_staleness(static_release(), Some(static_release()), ts, Some(ts));
        assert_eq!(result, Staleness::FreshEnough);
    }
}
