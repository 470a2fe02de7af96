//! monolink policy layer
//!
//! One immutable [`LinkagePolicy`] governs a whole build pass. This crate
//! resolves the effective per-node policy map from a requested policy plus a
//! pre-declared override table, and decides whether a previously built node
//! is stale.
//!
//! # Core Concepts
//!
//! - [`LinkagePolicy`]: linkage mode + build configuration, mapped to the
//!   runtime-library directive every object built under it must carry
//! - [`PolicyOverride`]: explicit, pre-declared per-node deviation
//! - [`resolve_policies`]: pure resolution; the only way a node's policy may
//!   differ from the requested one
//! - [`evaluate_staleness`]: policy-drift and source-timestamp checks

// Core modules
mod policy;
mod propagate;
mod staleness;

// Re-exports
pub use policy::{BuildConfig, LinkageMode, LinkagePolicy, PolicyOverride};
pub use propagate::{resolve_policies, ConfigError};
pub use staleness::{evaluate_staleness, StaleReason, Staleness};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
