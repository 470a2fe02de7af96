//! External build tool contract
//!
//! The orchestrator invokes an opaque per-node build tool and consumes
//! only its exit code and the produced artifact path. [`BuildTool`] is the
//! seam: production uses [`ProcessBuildTool`], tests script their own
//! implementation.

use crate::graph::BuildNode;
use monolink_policy::LinkagePolicy;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Failure to run the external tool at all (distinct from the tool
/// running and reporting a non-zero exit).
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool process could not be spawned or awaited.
    #[error("failed to invoke '{command}': {source}")]
    Invoke {
        /// The command that was attempted.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit code (-1 when terminated by signal).
    pub exit_code: i32,
    /// Where the artifact was (or should have been) produced.
    pub artifact: PathBuf,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the invocation reported success.
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output for bracketed per-node logging.
    #[must_use]
    pub fn combined_output(&self) -> String {
        let mut combined = String::new();
        if !self.stdout.trim().is_empty() {
            combined.push_str(self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(self.stderr.trim_end());
        }
        combined
    }
}

/// Per-node external build invocation.
#[async_trait::async_trait]
pub trait BuildTool: Send + Sync {
    /// Build one node under its effective policy.
    ///
    /// The implementation must leave the artifact at
    /// [`artifact_path`](artifact_path)`(out_dir, node)` on success.
    ///
    /// # Errors
    /// Returns [`ToolError`] only when the tool could not be run; a tool
    /// that runs and fails reports that through the exit code.
    async fn build(
        &self,
        node: &BuildNode,
        policy: &LinkagePolicy,
        out_dir: &Path,
    ) -> Result<ToolOutput, ToolError>;
}

/// Conventional artifact location for a node.
#[must_use]
pub fn artifact_path(out_dir: &Path, node: &BuildNode) -> PathBuf {
    out_dir.join(format!("{}.lka", node.name))
}

/// Spawns the manifest-configured external command.
///
/// Working directory is the node's source location; arguments are the
/// configured extras followed by the policy-derived ones.
#[derive(Debug, Clone)]
pub struct ProcessBuildTool {
    command: PathBuf,
    args: Vec<String>,
}

impl ProcessBuildTool {
    /// Create a tool invoker for the given command.
    #[must_use]
    pub fn new(command: PathBuf, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

#[async_trait::async_trait]
impl BuildTool for ProcessBuildTool {
    async fn build(
        &self,
        node: &BuildNode,
        policy: &LinkagePolicy,
        out_dir: &Path,
    ) -> Result<ToolOutput, ToolError> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg("--linkage")
            .arg(policy.linkage.to_string())
            .arg("--config")
            .arg(policy.config.to_string())
            .arg("--out")
            .arg(out_dir)
            .current_dir(&node.source)
            .output()
            .await
            .map_err(|source| ToolError::Invoke {
                command: self.command.display().to_string(),
                source,
            })?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            artifact: artifact_path(out_dir, node),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_uses_node_name() {
        let node = BuildNode {
            name: "zlib".to_string(),
            source: PathBuf::from("vendor/zlib"),
            deps: vec![],
        };
        assert_eq!(
            artifact_path(Path::new("out/zlib"), &node),
            PathBuf::from("out/zlib/zlib.lka")
        );
    }

    #[test]
    fn combined_output_brackets_both_streams() {
        let output = ToolOutput {
            exit_code: 1,
            artifact: PathBuf::from("x.lka"),
            stdout: "compiling\n".to_string(),
            stderr: "error: boom\n".to_string(),
        };
        assert_eq!(output.combined_output(), "compiling\nerror: boom");
        assert!(!output.success());
    }

    #[test]
    fn blank_streams_collapse_to_empty() {
        let output = ToolOutput {
            exit_code: 0,
            artifact: PathBuf::from("x.lka"),
            stdout: "  \n".to_string(),
            stderr: String::new(),
        };
        assert!(output.combined_output().is_empty());
    }
}
