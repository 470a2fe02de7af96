//! Policy propagation
//!
//! Resolves the single effective policy map for a build pass. Pure: the
//! resolver never touches the filesystem or mutates node state, it only
//! turns (requested policy, override table, graph shape) into a per-node
//! policy map or a [`ConfigError`].

use crate::policy::{LinkageMode, LinkagePolicy, PolicyOverride};
use std::collections::BTreeMap;

/// Fatal pre-build configuration error.
///
/// Any `ConfigError` aborts the run before a single node is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An override names a node that is not in the graph.
    #[error("override targets unknown node '{0}'")]
    UnknownOverrideTarget(String),

    /// A dependency edge crosses linkage modes with no declared
    /// reconciliation on either endpoint.
    #[error(
        "node '{dependent}' ({dependent_mode}) depends on '{dependency}' ({dependency_mode}) \
         with no declared reconciliation"
    )]
    UnreconciledEdge {
        /// The node being depended on.
        dependency: String,
        /// Effective mode of the dependency.
        dependency_mode: LinkageMode,
        /// The depending node.
        dependent: String,
        /// Effective mode of the dependent.
        dependent_mode: LinkageMode,
    },
}

/// Resolve the effective per-node policy map for one build pass.
///
/// Every node starts from `requested`; nodes named in `overrides` get the
/// override applied on top. Edges are `(dependency, dependent)` pairs. An
/// edge whose endpoints resolve to different linkage modes is rejected
/// unless at least one endpoint's override declares `reconciled: true` —
/// mixing modes across a hard dependency is exactly the drift this system
/// exists to catch, so it must be spelled out, never implied.
///
/// # Errors
/// Returns [`ConfigError`] on an override for an unknown node or an
/// unreconciled cross-mode edge.
pub fn resolve_policies(
    requested: LinkagePolicy,
    overrides: &BTreeMap<String, PolicyOverride>,
    nodes: &[String],
    edges: &[(String, String)],
) -> Result<BTreeMap<String, LinkagePolicy>, ConfigError> {
    for name in overrides.keys() {
        if !nodes.iter().any(|n| n == name) {
            return Err(ConfigError::UnknownOverrideTarget(name.clone()));
        }
    }

    let mut resolved = BTreeMap::new();
    for name in nodes {
        let effective = match overrides.get(name) {
            Some(ov) => ov.apply(requested),
            None => requested,
        };
        resolved.insert(name.clone(), effective);
    }

    for (dependency, dependent) in edges {
        let dep_mode = resolved
            .get(dependency)
            .map_or(requested.linkage, |p| p.linkage);
        let dependent_mode = resolved
            .get(dependent)
            .map_or(requested.linkage, |p| p.linkage);

        if dep_mode != dependent_mode {
            let reconciled = overrides
                .get(dependency)
                .map_or(false, |ov| ov.reconciled)
                || overrides.get(dependent).map_or(false, |ov| ov.reconciled);
            if !reconciled {
                return Err(ConfigError::UnreconciledEdge {
                    dependency: dependency.clone(),
                    dependency_mode: dep_mode,
                    dependent: dependent.clone(),
                    dependent_mode,
                });
            }
        }
    }

    Ok(resolved)
}
