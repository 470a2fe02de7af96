//! monolink core
//!
//! Sequences the building of a native-library dependency graph under one
//! immutable linkage policy, verifies every produced artifact against that
//! policy, and consolidates verified groups into single outputs.
//!
//! # Pipeline
//!
//! ```rust,ignore
//! let manifest = manifest::load_manifest(path)?;
//! let graph = manifest.build_graph()?;
//! let policies = resolve_policies(manifest.requested_policy(), &manifest.overrides(),
//!                                 &graph.node_names(), &graph.edges())?;
//!
//! let orchestrator = Orchestrator::new(graph, policies, tool, options);
//! let outcomes = orchestrator.build_all().await;
//! let groups = run_consolidation(&manifest, &outcomes, &options.out_dir);
//! ```
//!
//! Per-node failures are contained and reported; only configuration errors
//! abort a run before any node builds.

// Core modules
pub mod error;
pub mod graph;
pub mod manifest;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod tool;

// Re-exports
pub use error::{NodeErrorKind, RunError};
pub use graph::{BuildGraph, BuildNode, GraphError};
pub use manifest::{load_manifest, Manifest, ManifestError};
pub use orchestrator::{run_consolidation, BuildOptions, NodeStatus, Orchestrator};
pub use report::{GroupReport, NodeOutcome, RunReport};
pub use tool::{BuildTool, ProcessBuildTool, ToolError, ToolOutput};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
