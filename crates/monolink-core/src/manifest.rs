//! Build manifest
//!
//! The YAML graph description a build invocation consumes: nodes with
//! source locations and optional per-node policy overrides, the requested
//! policy, the external tool, and the consolidation groups.

use crate::graph::{BuildGraph, BuildNode, GraphError};
use monolink_policy::{BuildConfig, LinkageMode, LinkagePolicy, PolicyOverride};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Manifest loading error.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {}: {source}", path.display())]
    Io {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid YAML or misses required fields.
    #[error("failed to parse manifest {}: {source}", path.display())]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A consolidation group references a node that does not exist.
    #[error("group '{group}' references unknown node '{member}'")]
    UnknownGroupMember {
        /// Group output name.
        group: String,
        /// The missing member node.
        member: String,
    },
}

/// Requested policy section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PolicySpec {
    /// Runtime-linkage mode.
    pub linkage: LinkageMode,
    /// Build configuration.
    pub config: BuildConfig,
}

/// External tool section.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSpec {
    /// Command to invoke per node.
    pub command: PathBuf,
    /// Extra arguments placed before the policy-derived ones.
    #[serde(default)]
    pub args: Vec<String>,
}

/// One node entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    /// Node identity.
    pub name: String,
    /// Source location.
    pub source: PathBuf,
    /// Declared dependencies.
    #[serde(default)]
    pub deps: Vec<String>,
    /// Optional policy override for this node.
    #[serde(default, rename = "override")]
    pub policy_override: Option<PolicyOverride>,
}

/// One consolidation group entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSpec {
    /// Primary output identity.
    pub output: String,
    /// Ordered member nodes whose artifacts are merged.
    pub members: Vec<String>,
}

/// The full build manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Requested linkage policy.
    pub policy: PolicySpec,
    /// External build tool.
    pub tool: ToolSpec,
    /// Output directory (defaults to `build/out`).
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Dependency nodes.
    pub nodes: Vec<NodeSpec>,
    /// Consolidation groups.
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("build/out")
}

impl Manifest {
    /// Parse a manifest from YAML text.
    ///
    /// # Errors
    /// Returns [`ManifestError`] on parse failures or dangling group
    /// members.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.check_groups()?;
        Ok(manifest)
    }

    /// The requested pass-wide policy.
    #[inline]
    #[must_use]
    pub fn requested_policy(&self) -> LinkagePolicy {
        LinkagePolicy::new(self.policy.linkage, self.policy.config)
    }

    /// The declared override table.
    #[must_use]
    pub fn overrides(&self) -> BTreeMap<String, PolicyOverride> {
        self.nodes
            .iter()
            .filter_map(|n| n.policy_override.map(|ov| (n.name.clone(), ov)))
            .collect()
    }

    /// Construct and validate the dependency graph.
    ///
    /// # Errors
    /// Returns [`GraphError`] on duplicate nodes, unknown dependencies, or
    /// cycles.
    pub fn build_graph(&self) -> Result<BuildGraph, GraphError> {
        let mut graph = BuildGraph::new();
        for spec in &self.nodes {
            graph.add_node(BuildNode {
                name: spec.name.clone(),
                source: spec.source.clone(),
                deps: spec.deps.clone(),
            })?;
        }
        graph.validate()?;
        Ok(graph)
    }

    fn check_groups(&self) -> Result<(), ManifestError> {
        for group in &self.groups {
            for member in &group.members {
                if !self.nodes.iter().any(|n| &n.name == member) {
                    return Err(ManifestError::UnknownGroupMember {
                        group: group.output.clone(),
                        member: member.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Load a manifest from disk.
///
/// # Errors
/// Returns [`ManifestError`] on I/O or parse failures.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Manifest::parse(path, &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
policy: { linkage: static, config: release }
tool: { command: ./build.sh }
out_dir: build/out
nodes:
  - name: zlib
    source: vendor/zlib
  - name: png
    source: vendor/png
    deps: [zlib]
    override: { linkage: dynamic, reconciled: true }
groups:
  - output: core_bundle
    members: [zlib, png]
"#;

    #[test]
    fn parses_full_manifest() {
        let manifest = Manifest::parse(Path::new("build.yml"), SAMPLE).unwrap();

        assert_eq!(manifest.requested_policy().to_string(), "static/release");
        assert_eq!(manifest.nodes.len(), 2);
        assert_eq!(manifest.groups.len(), 1);

        let overrides = manifest.overrides();
        assert_eq!(overrides.len(), 1);
        assert!(overrides["png"].reconciled);
        assert_eq!(overrides["png"].linkage, Some(LinkageMode::Dynamic));
    }

    #[test]
    fn builds_validated_graph() {
        let manifest = Manifest::parse(Path::new("build.yml"), SAMPLE).unwrap();
        let graph = manifest.build_graph().unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.edges(),
            vec![("zlib".to_string(), "png".to_string())]
        );
    }

    #[test]
    fn missing_policy_is_a_parse_error() {
        let err = Manifest::parse(
            Path::new("build.yml"),
            "tool: { command: x }\nnodes: []\n",
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn dangling_group_member_rejected() {
        let text = r#"
policy: { linkage: static, config: release }
tool: { command: ./build.sh }
nodes:
  - name: zlib
    source: vendor/zlib
groups:
  - output: bundle
    members: [zlib, ghost]
"#;
        let err = Manifest::parse(Path::new("build.yml"), text).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::UnknownGroupMember { member, .. } if member == "ghost"
        ));
    }

    #[test]
    fn out_dir_defaults_when_omitted() {
        let text = r#"
policy: { linkage: dynamic, config: debug }
tool: { command: make }
nodes: []
"#;
        let manifest = Manifest::parse(Path::new("build.yml"), text).unwrap();
        assert_eq!(manifest.out_dir, PathBuf::from("build/out"));
    }
}
