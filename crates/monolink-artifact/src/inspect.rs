//! Artifact inspection
//!
//! Reads a compiled artifact and extracts its runtime-linkage directive
//! set, aggregated over every member object inside an archive. Read-only:
//! inspection never mutates node state.

use crate::archive::Archive;
use crate::object::ObjectFile;
use indexmap::IndexSet;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of a produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// An `ar`-style archive of objects.
    Archive,
    /// A single bare object (shared-object stub).
    SharedObject,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::SharedObject => write!(f, "shared object"),
        }
    }
}

/// A produced artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Location on disk.
    pub path: PathBuf,
    /// Container kind, determined from the file's magic.
    pub kind: ArtifactKind,
}

/// Ordered set of directive labels extracted from an artifact.
///
/// Order is first-encountered order across member objects. The set may be
/// empty when an artifact carries no directives at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectiveSet {
    labels: IndexSet<String>,
}

impl DirectiveSet {
    /// Empty set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directive label, keeping first-seen order.
    pub fn insert(&mut self, label: impl Into<String>) {
        self.labels.insert(label.into());
    }

    /// Every constituent object agrees on at most one directive.
    ///
    /// An empty set is homogeneous; it still fails verification because it
    /// cannot equal the policy's expected label.
    #[inline]
    #[must_use]
    pub fn is_homogeneous(&self) -> bool {
        self.labels.len() <= 1
    }

    /// More than one distinct directive was found.
    #[inline]
    #[must_use]
    pub fn is_mixed(&self) -> bool {
        self.labels.len() > 1
    }

    /// The single directive, when homogeneous and non-empty.
    #[must_use]
    pub fn sole(&self) -> Option<&str> {
        if self.labels.len() == 1 {
            self.labels.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Iterate labels in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Number of distinct labels.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no directives were found.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl fmt::Display for DirectiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, "(none)");
        }
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(", "))
    }
}

impl<S: Into<String>> FromIterator<S> for DirectiveSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for label in iter {
            set.insert(label);
        }
        set
    }
}

/// Result of inspecting one artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    /// The inspected artifact.
    pub artifact: Artifact,
    /// Aggregated directive set.
    pub directives: DirectiveSet,
    /// Number of member objects examined.
    pub objects: usize,
}

/// Inspection failure.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// Corrupt or unrecognized artifact format.
    #[error("unreadable artifact {}: {reason}", path.display())]
    UnreadableArtifact {
        /// The offending file.
        path: PathBuf,
        /// What made it unreadable.
        reason: String,
    },

    /// The artifact could not be read at all.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The offending file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Inspect an artifact on disk.
///
/// Determines the container kind from its magic, parses every member
/// object, and aggregates directives in first-encountered order.
///
/// # Errors
/// [`InspectError::UnreadableArtifact`] for corrupt or unrecognized
/// formats, [`InspectError::Io`] when the file cannot be read.
pub fn inspect(path: &Path) -> Result<Inspection, InspectError> {
    let bytes = std::fs::read(path).map_err(|source| InspectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    inspect_bytes(path, &bytes)
}

/// Inspect already-loaded artifact bytes. Split out for tests and callers
/// that hold the file in memory.
pub fn inspect_bytes(path: &Path, bytes: &[u8]) -> Result<Inspection, InspectError> {
    let unreadable = |reason: String| InspectError::UnreadableArtifact {
        path: path.to_path_buf(),
        reason,
    };

    let mut directives = DirectiveSet::new();

    if Archive::sniff(bytes) {
        let archive = Archive::parse(bytes).map_err(|e| unreadable(e.to_string()))?;
        let mut objects = 0;
        for member in &archive.members {
            let object = ObjectFile::parse(&member.data)
                .map_err(|e| unreadable(format!("member '{}': {e}", member.name)))?;
            for label in &object.directives {
                directives.insert(label.clone());
            }
            objects += 1;
        }
        return Ok(Inspection {
            artifact: Artifact {
                path: path.to_path_buf(),
                kind: ArtifactKind::Archive,
            },
            directives,
            objects,
        });
    }

    if ObjectFile::sniff(bytes) {
        let object = ObjectFile::parse(bytes).map_err(|e| unreadable(e.to_string()))?;
        for label in &object.directives {
            directives.insert(label.clone());
        }
        return Ok(Inspection {
            artifact: Artifact {
                path: path.to_path_buf(),
                kind: ArtifactKind::SharedObject,
            },
            directives,
            objects: 1,
        });
    }

    Err(unreadable("unrecognized format".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::object::{ObjectFile, Symbol};

    fn object_with(directives: &[&str]) -> Vec<u8> {
        ObjectFile::new(
            directives.iter().map(|d| (*d).to_string()).collect(),
            vec![Symbol::strong("f")],
        )
        .to_bytes()
        .unwrap()
    }

    fn archive_of(objects: &[Vec<u8>]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new();
        for (i, data) in objects.iter().enumerate() {
            writer.append(&format!("m{i}.o"), data).unwrap();
        }
        writer.finish()
    }

    #[test]
    fn homogeneous_archive_aggregates_one_label() {
        let bytes = archive_of(&[object_with(&["LIBCMT"]), object_with(&["LIBCMT"])]);
        let inspection = inspect_bytes(Path::new("libz.lka"), &bytes).unwrap();

        assert_eq!(inspection.artifact.kind, ArtifactKind::Archive);
        assert_eq!(inspection.objects, 2);
        assert!(inspection.directives.is_homogeneous());
        assert_eq!(inspection.directives.sole(), Some("LIBCMT"));
    }

    #[test]
    fn mixed_archive_reports_both_labels_in_order() {
        let bytes = archive_of(&[object_with(&["LIBCMT"]), object_with(&["MSVCRT"])]);
        let inspection = inspect_bytes(Path::new("libz.lka"), &bytes).unwrap();

        assert!(inspection.directives.is_mixed());
        let labels: Vec<&str> = inspection.directives.iter().collect();
        assert_eq!(labels, vec!["LIBCMT", "MSVCRT"]);
    }

    #[test]
    fn bare_object_is_shared_object_kind() {
        let bytes = object_with(&["MSVCRTD"]);
        let inspection = inspect_bytes(Path::new("libz.lko"), &bytes).unwrap();

        assert_eq!(inspection.artifact.kind, ArtifactKind::SharedObject);
        assert_eq!(inspection.directives.sole(), Some("MSVCRTD"));
    }

    #[test]
    fn directive_free_object_yields_empty_set() {
        let bytes = object_with(&[]);
        let inspection = inspect_bytes(Path::new("plain.lko"), &bytes).unwrap();

        assert!(inspection.directives.is_empty());
        assert!(inspection.directives.is_homogeneous());
    }

    #[test]
    fn unrecognized_format_is_unreadable() {
        let err = inspect_bytes(Path::new("garbage.bin"), b"\x00\x01\x02\x03garbage").unwrap_err();
        assert!(matches!(err, InspectError::UnreadableArtifact { .. }));
    }

    #[test]
    fn corrupt_member_names_the_member() {
        let mut writer = ArchiveWriter::new();
        writer.append("good.o", &object_with(&["LIBCMT"])).unwrap();
        writer.append("bad.o", b"LKOBxx").unwrap();
        let err = inspect_bytes(Path::new("libz.lka"), &writer.finish()).unwrap_err();

        match err {
            InspectError::UnreadableArtifact { reason, .. } => {
                assert!(reason.contains("bad.o"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspect(&dir.path().join("absent.lka")).unwrap_err();
        assert!(matches!(err, InspectError::Io { .. }));
    }
}
