//! Build orchestration
//!
//! Schedules the validated dependency graph bottom-up: a node becomes
//! ready only when every dependency is Built-and-Verified, ready nodes run
//! concurrently on a bounded worker pool, and a failure skips the failed
//! node's transitive dependents while unrelated subgraphs keep building.
//!
//! Verification is part of the build step. An artifact that fails
//! verification is cleaned and rebuilt up to the configured retry bound;
//! an artifact that cannot be parsed at all fails the node immediately.

use crate::error::NodeErrorKind;
use crate::graph::{BuildGraph, BuildNode};
use crate::manifest::Manifest;
use crate::report::{GroupReport, NodeOutcome};
use crate::state::{newest_source_mtime, BuildState};
use crate::tool::{artifact_path, BuildTool, ToolError};
use dashmap::DashMap;
use monolink_artifact::{inspect, verify};
use monolink_consolidate::{consolidate, ConsolidationGroup};
use monolink_policy::{evaluate_staleness, LinkagePolicy, Staleness};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Tunables for one build pass.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum concurrent node builds; 0 picks the host parallelism.
    pub workers: usize,
    /// Rebuild attempts allowed after a verification failure.
    pub verify_retries: u32,
    /// Ignore freshness and rebuild every node.
    pub force: bool,
    /// Root output directory; each node gets a subdirectory.
    pub out_dir: PathBuf,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            workers: 0,
            verify_retries: 1,
            force: false,
            out_dir: PathBuf::from("build/out"),
        }
    }
}

impl BuildOptions {
    fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
    }
}

/// Observable lifecycle state of a node during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Waiting on dependencies.
    Pending,
    /// A worker is building or verifying the node.
    Building,
    /// Artifact exists and passed verification.
    Built,
    /// Terminal failure (build, unreadable artifact, or retries exhausted).
    Failed,
    /// Never attempted because a dependency failed.
    Skipped,
}

/// Drives one build pass over a validated graph.
pub struct Orchestrator {
    graph: BuildGraph,
    policies: BTreeMap<String, LinkagePolicy>,
    tool: Arc<dyn BuildTool>,
    options: BuildOptions,
    status: Arc<DashMap<String, NodeStatus>>,
}

impl Orchestrator {
    /// Create an orchestrator for a validated graph and its resolved
    /// per-node policy map.
    #[must_use]
    pub fn new(
        graph: BuildGraph,
        policies: BTreeMap<String, LinkagePolicy>,
        tool: Arc<dyn BuildTool>,
        options: BuildOptions,
    ) -> Self {
        let status = Arc::new(DashMap::new());
        for name in graph.node_names() {
            status.insert(name, NodeStatus::Pending);
        }
        Self {
            graph,
            policies,
            tool,
            options,
            status,
        }
    }

    /// Current lifecycle state of a node, if it is in the graph.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        self.status.get(name).map(|s| *s)
    }

    /// Build every node, bottom-up, and return a terminal outcome for each.
    ///
    /// Total over the graph: every declared node appears in the result
    /// exactly once, as Built, Failed, or Skipped.
    pub async fn build_all(&self) -> BTreeMap<String, NodeOutcome> {
        let mut outcomes: BTreeMap<String, NodeOutcome> = BTreeMap::new();
        let mut in_degrees = self.graph.in_degrees();
        let dependents = self.graph.dependents();

        let mut ready: VecDeque<String> = in_degrees
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| name.clone())
            .collect();

        let workers = self.options.effective_workers();
        let mut join_set: JoinSet<(String, NodeOutcome)> = JoinSet::new();
        let mut task_nodes: HashMap<tokio::task::Id, String> = HashMap::new();

        tracing::info!(
            nodes = self.graph.len(),
            workers,
            out_dir = %self.options.out_dir.display(),
            "starting build pass"
        );

        loop {
            while join_set.len() < workers {
                let Some(name) = ready.pop_front() else { break };
                self.spawn_node(&name, &mut join_set, &mut task_nodes, &mut outcomes);
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };
            let (name, outcome) = match joined {
                Ok((id, result)) => {
                    task_nodes.remove(&id);
                    result
                }
                Err(e) => {
                    // A panicking worker aborts nothing else; the node fails
                    // in place and its dependents are skipped as usual.
                    let Some(name) = task_nodes.remove(&e.id()) else {
                        tracing::error!("build worker panicked for an unknown task");
                        continue;
                    };
                    tracing::error!(node = %name, "build worker panicked");
                    (
                        name,
                        NodeOutcome::Failed {
                            kind: NodeErrorKind::BuildFailed { exit_code: None },
                            detail: format!("build worker panicked: {e}"),
                        },
                    )
                }
            };

            match &outcome {
                NodeOutcome::Built { .. } => {
                    self.status.insert(name.clone(), NodeStatus::Built);
                    if let Some(children) = dependents.get(&name) {
                        for child in children {
                            if let Some(degree) = in_degrees.get_mut(child) {
                                *degree -= 1;
                                if *degree == 0 {
                                    ready.push_back(child.clone());
                                }
                            }
                        }
                    }
                }
                NodeOutcome::Failed { kind, .. } => {
                    tracing::warn!(node = %name, error = %kind, "node failed");
                    self.status.insert(name.clone(), NodeStatus::Failed);
                    self.skip_dependents(&name, &dependents, &mut outcomes);
                }
                NodeOutcome::Skipped { .. } => {}
            }
            outcomes.insert(name, outcome);
        }

        // Totality: anything still unaccounted for is blocked behind a node
        // that never reached Built.
        for name in self.graph.node_names() {
            if outcomes.contains_key(&name) {
                continue;
            }
            let blocker = self
                .graph
                .get(&name)
                .and_then(|node| {
                    node.deps
                        .iter()
                        .find(|dep| !outcomes.get(*dep).is_some_and(NodeOutcome::is_built))
                        .cloned()
                })
                .unwrap_or_default();
            self.status.insert(name.clone(), NodeStatus::Skipped);
            outcomes.insert(
                name,
                NodeOutcome::Skipped {
                    failed_dependency: blocker,
                },
            );
        }

        outcomes
    }

    fn spawn_node(
        &self,
        name: &str,
        join_set: &mut JoinSet<(String, NodeOutcome)>,
        task_nodes: &mut HashMap<tokio::task::Id, String>,
        outcomes: &mut BTreeMap<String, NodeOutcome>,
    ) {
        let Some(node) = self.graph.get(name) else {
            return;
        };
        let Some(policy) = self.policies.get(name).copied() else {
            // Resolution covers every graph node; a gap here means the
            // caller paired a graph with a foreign policy map.
            outcomes.insert(
                name.to_string(),
                NodeOutcome::Failed {
                    kind: NodeErrorKind::BuildFailed { exit_code: None },
                    detail: "no effective policy resolved for node".to_string(),
                },
            );
            self.status.insert(name.to_string(), NodeStatus::Failed);
            return;
        };

        self.status.insert(name.to_string(), NodeStatus::Building);
        let node = node.clone();
        let tool = Arc::clone(&self.tool);
        let out_dir = self.options.out_dir.clone();
        let force = self.options.force;
        let verify_retries = self.options.verify_retries;

        let handle = join_set.spawn(async move {
            let outcome =
                build_one(&node, policy, tool.as_ref(), &out_dir, force, verify_retries).await;
            (node.name, outcome)
        });
        task_nodes.insert(handle.id(), name.to_string());
    }

    /// Mark every transitive dependent of a failed node as skipped.
    fn skip_dependents(
        &self,
        failed: &str,
        dependents: &BTreeMap<String, Vec<String>>,
        outcomes: &mut BTreeMap<String, NodeOutcome>,
    ) {
        let mut stack = vec![failed.to_string()];
        while let Some(current) = stack.pop() {
            let Some(children) = dependents.get(&current) else {
                continue;
            };
            for child in children {
                if outcomes.contains_key(child) {
                    continue;
                }
                tracing::info!(node = %child, dependency = %failed, "skipping dependent");
                self.status.insert(child.clone(), NodeStatus::Skipped);
                outcomes.insert(
                    child.clone(),
                    NodeOutcome::Skipped {
                        failed_dependency: failed.to_string(),
                    },
                );
                stack.push(child.clone());
            }
        }
    }
}

/// Build, inspect, and verify a single node.
async fn build_one(
    node: &BuildNode,
    policy: LinkagePolicy,
    tool: &dyn BuildTool,
    out_dir: &Path,
    force: bool,
    verify_retries: u32,
) -> NodeOutcome {
    let node_out_dir = out_dir.join(&node.name);
    let artifact = artifact_path(&node_out_dir, node);

    if !force {
        if let Some(outcome) = try_reuse_fresh(node, policy, &node_out_dir, &artifact) {
            return outcome;
        }
    }

    let max_attempts = verify_retries.saturating_add(1);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        tracing::info!(node = %node.name, %policy, attempt = attempts, "building");

        if let Err(e) = clean_node_dir(&node_out_dir) {
            return NodeOutcome::Failed {
                kind: NodeErrorKind::BuildFailed { exit_code: None },
                detail: format!("failed to prepare output directory: {e}"),
            };
        }

        let output = match tool.build(node, &policy, &node_out_dir).await {
            Ok(output) => output,
            Err(ToolError::Invoke { command, source }) => {
                return NodeOutcome::Failed {
                    kind: NodeErrorKind::BuildFailed { exit_code: None },
                    detail: format!("could not invoke '{command}': {source}"),
                };
            }
        };

        let combined = output.combined_output();
        if !combined.is_empty() {
            tracing::debug!(node = %node.name, "tool output:\n{combined}");
        }

        if !output.success() {
            return NodeOutcome::Failed {
                kind: NodeErrorKind::BuildFailed {
                    exit_code: Some(output.exit_code),
                },
                detail: combined,
            };
        }

        let inspection = match inspect(&output.artifact) {
            Ok(inspection) => inspection,
            Err(e) => {
                return NodeOutcome::Failed {
                    kind: NodeErrorKind::UnreadableArtifact,
                    detail: e.to_string(),
                };
            }
        };

        let report = verify(&inspection, &policy);
        if report.passed {
            if let Err(e) = BuildState::now(policy).save(&node_out_dir) {
                tracing::warn!(node = %node.name, "failed to persist build state: {e}");
            }
            tracing::info!(node = %node.name, artifact = %output.artifact.display(), "verified");
            return NodeOutcome::Built {
                artifact: output.artifact,
                rebuilt: true,
            };
        }

        let detail = report
            .mismatch_detail()
            .unwrap_or_else(|| "verification failed".to_string());
        if attempts >= max_attempts {
            return NodeOutcome::Failed {
                kind: NodeErrorKind::ExceededRetries { attempts },
                detail,
            };
        }
        tracing::warn!(node = %node.name, %detail, "verification failed, rebuilding");
    }
}

/// Reuse a fresh prior artifact when it still verifies.
///
/// Returns `None` when the node is stale or the prior artifact fails
/// verification, in which case the caller cleans and rebuilds.
fn try_reuse_fresh(
    node: &BuildNode,
    policy: LinkagePolicy,
    node_out_dir: &Path,
    artifact: &Path,
) -> Option<NodeOutcome> {
    let state = BuildState::load(node_out_dir);
    let source_ts = newest_source_mtime(&node.source);
    let staleness = evaluate_staleness(
        policy,
        state.map(|s| s.policy),
        source_ts,
        state.map(|s| s.built_at),
    );

    if let Staleness::Stale(reason) = staleness {
        tracing::debug!(node = %node.name, %reason, "stale");
        return None;
    }
    if !artifact.is_file() {
        tracing::debug!(node = %node.name, "fresh record but artifact missing");
        return None;
    }

    // Fresh artifacts are still verified before reuse.
    let inspection = inspect(artifact).ok()?;
    let report = verify(&inspection, &policy);
    if !report.passed {
        tracing::debug!(node = %node.name, "prior artifact fails verification, rebuilding");
        return None;
    }

    tracing::info!(node = %node.name, "reusing fresh artifact");
    Some(NodeOutcome::Built {
        artifact: artifact.to_path_buf(),
        rebuilt: false,
    })
}

fn clean_node_dir(node_out_dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(node_out_dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(node_out_dir)
}

/// Consolidate every declared group whose members all built.
///
/// Groups with unbuilt members are reported as incomplete rather than
/// attempted; a consolidation error fails only its own group.
#[must_use]
pub fn run_consolidation(
    manifest: &Manifest,
    outcomes: &BTreeMap<String, NodeOutcome>,
    out_dir: &Path,
) -> Vec<GroupReport> {
    let mut reports = Vec::with_capacity(manifest.groups.len());

    for spec in &manifest.groups {
        let mut members = Vec::with_capacity(spec.members.len());
        let mut missing = Vec::new();
        for name in &spec.members {
            match outcomes.get(name) {
                Some(NodeOutcome::Built { artifact, .. }) => members.push(artifact.clone()),
                _ => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            tracing::warn!(group = %spec.output, ?missing, "skipping consolidation");
            reports.push(GroupReport::MembersIncomplete {
                output: spec.output.clone(),
                missing,
            });
            continue;
        }

        let group = ConsolidationGroup::new(spec.output.clone(), members);
        match consolidate(&group, out_dir) {
            Ok(artifact) => {
                tracing::info!(group = %spec.output, artifact = %artifact.display(), "consolidated");
                reports.push(GroupReport::Consolidated {
                    output: spec.output.clone(),
                    artifact,
                });
            }
            Err(e) => {
                tracing::warn!(group = %spec.output, error = %e, "consolidation failed");
                reports.push(GroupReport::Failed {
                    output: spec.output.clone(),
                    detail: e.to_string(),
                });
            }
        }
    }

    reports
}
