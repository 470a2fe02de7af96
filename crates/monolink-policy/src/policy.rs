//! Policy types
//!
//! A [`LinkagePolicy`] is immutable for the duration of one build pass.
//! Nodes may deviate from it only through an explicit [`PolicyOverride`]
//! declared before the pass starts — there is no hidden process-wide state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Runtime-linkage mode all artifacts in a pass must conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkageMode {
    /// Link the runtime statically into each artifact.
    Static,
    /// Link against the shared runtime.
    Dynamic,
}

impl fmt::Display for LinkageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl FromStr for LinkageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            other => Err(format!("unknown linkage mode '{other}'")),
        }
    }
}

/// Target build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfig {
    /// Optimized build.
    Release,
    /// Debug build (debug runtime variant).
    Debug,
}

impl fmt::Display for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => write!(f, "release"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

impl FromStr for BuildConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(Self::Release),
            "debug" => Ok(Self::Debug),
            other => Err(format!("unknown build config '{other}'")),
        }
    }
}

/// The intended low-level linkage policy for one build pass.
///
/// Immutable once a pass starts. Every object built under a policy must
/// declare exactly the directive returned by [`expected_directive`]
/// (`LinkagePolicy::expected_directive`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkagePolicy {
    /// Runtime-linkage mode.
    pub linkage: LinkageMode,
    /// Build configuration.
    pub config: BuildConfig,
}

impl LinkagePolicy {
    /// Create a new policy.
    #[inline]
    #[must_use]
    pub fn new(linkage: LinkageMode, config: BuildConfig) -> Self {
        Self { linkage, config }
    }

    /// The runtime-library directive label artifacts built under this
    /// policy must carry.
    ///
    /// These are the conventional runtime-library names of the modeled
    /// toolchain; the verifier only ever compares labels.
    #[must_use]
    pub fn expected_directive(&self) -> &'static str {
        match (self.linkage, self.config) {
            (LinkageMode::Static, BuildConfig::Release) => "LIBCMT",
            (LinkageMode::Static, BuildConfig::Debug) => "LIBCMTD",
            (LinkageMode::Dynamic, BuildConfig::Release) => "MSVCRT",
            (LinkageMode::Dynamic, BuildConfig::Debug) => "MSVCRTD",
        }
    }
}

impl fmt::Display for LinkagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.linkage, self.config)
    }
}

/// Explicit per-node deviation from the requested policy.
///
/// Overrides are declared up front in the build manifest; `reconciled`
/// acknowledges that the node's effective mode may legitimately differ
/// from its neighbors'.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    /// Replacement linkage mode, if any.
    #[serde(default)]
    pub linkage: Option<LinkageMode>,
    /// Replacement build configuration, if any.
    #[serde(default)]
    pub config: Option<BuildConfig>,
    /// Acknowledges cross-mode edges touching this node.
    #[serde(default)]
    pub reconciled: bool,
}

impl PolicyOverride {
    /// Apply this override on top of the requested policy.
    #[must_use]
    pub fn apply(&self, requested: LinkagePolicy) -> LinkagePolicy {
        LinkagePolicy {
            linkage: self.linkage.unwrap_or(requested.linkage),
            config: self.config.unwrap_or(requested.config),
        }
    }

    /// Whether this override changes anything at all.
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.linkage.is_none() && self.config.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_directive_covers_all_variants() {
        let cases = [
            (LinkageMode::Static, BuildConfig::Release, "LIBCMT"),
            (LinkageMode::Static, BuildConfig::Debug, "LIBCMTD"),
            (LinkageMode::Dynamic, BuildConfig::Release, "MSVCRT"),
            (LinkageMode::Dynamic, BuildConfig::Debug, "MSVCRTD"),
        ];
        for (linkage, config, label) in cases {
            assert_eq!(LinkagePolicy::new(linkage, config).expected_directive(), label);
        }
    }

    #[test]
    fn override_applies_only_declared_fields() {
        let requested = LinkagePolicy::new(LinkageMode::Static, BuildConfig::Release);

        let ov = PolicyOverride {
            linkage: Some(LinkageMode::Dynamic),
            config: None,
            reconciled: true,
        };
        let effective = ov.apply(requested);
        assert_eq!(effective.linkage, LinkageMode::Dynamic);
        assert_eq!(effective.config, BuildConfig::Release);
    }

    #[test]
    fn noop_override_detected() {
        assert!(PolicyOverride::default().is_noop());
        let ov = PolicyOverride {
            config: Some(BuildConfig::Debug),
            ..Default::default()
        };
        assert!(!ov.is_noop());
    }

    #[test]
    fn mode_round_trips_through_str() {
        assert_eq!("static".parse::<LinkageMode>().unwrap(), LinkageMode::Static);
        assert_eq!("dynamic".parse::<LinkageMode>().unwrap(), LinkageMode::Dynamic);
        assert!("shared".parse::<LinkageMode>().is_err());
        assert_eq!(LinkageMode::Static.to_string(), "static");
    }

    #[test]
    fn policy_serde_uses_lowercase_labels() {
        let policy = LinkagePolicy::new(LinkageMode::Dynamic, BuildConfig::Debug);
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"{"linkage":"dynamic","config":"debug"}"#);
    }
}
