//! monolink artifact layer
//!
//! Reads compiled artifacts in the fixed, externally defined archive/object
//! layout, extracts their runtime-linkage directive sets, and checks them
//! against the active [`LinkagePolicy`](monolink_policy::LinkagePolicy).
//!
//! # Core Concepts
//!
//! - [`Archive`] / [`ArchiveWriter`]: the `ar`-style container format
//! - [`ObjectFile`]: one object's directive labels and symbol table
//! - [`inspect`]: aggregate a whole artifact into an ordered [`DirectiveSet`]
//! - [`verify`]: pure comparison of an inspection against a policy
//!
//! Inspection is read-only; nothing in this crate mutates node state.

// Format modules (external contract)
pub mod archive;
pub mod object;

// Inspection and verification
mod inspect;
mod verify;

// Re-exports
pub use archive::{Archive, ArchiveError, ArchiveMember, ArchiveWriter};
pub use inspect::{
    inspect, inspect_bytes, Artifact, ArtifactKind, DirectiveSet, InspectError, Inspection,
};
pub use object::{ObjectError, ObjectFile, Symbol};
pub use verify::{verify, VerificationReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
