//! Migration-specific error types.

use super::lifecycle::{LifecycleError, StoreHandle};
use super::state::MigrationStatus;
use super::version::VersionId;
use crate::error::BoxError;
use std::path::PathBuf;
use thiserror::Error;

/// Migration errors.
///
/// Every variant is terminal for the `migrate()` call that produced it; the
/// engine never retries internally.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// No known schema matches the store's metadata.
    #[error("no known schema version matches the store metadata{}", describe_location(.location))]
    VersionNotFound {
        /// The store whose metadata was inspected, if known.
        location: Option<PathBuf>,
    },

    /// A version identifier is not part of the graph.
    #[error("unknown schema version: {0}")]
    UnknownVersion(VersionId),

    /// The target does not lie ahead of the current version.
    #[error("version {to} is not reachable from {from}")]
    UnreachableVersion {
        /// Current version.
        from: VersionId,
        /// Requested target version.
        to: VersionId,
    },

    /// Neither an explicit nor an inferred mapping exists for a hop.
    #[error("no mapping available from {from} to {to}")]
    NoMappingAvailable {
        /// Source version of the hop.
        from: VersionId,
        /// Destination version of the hop.
        to: VersionId,
    },

    /// The version graph is malformed.
    #[error("invalid version graph: {reason}")]
    InvalidGraph {
        /// What is wrong with the graph.
        reason: String,
    },

    /// The store metadata could not be read.
    #[error("cannot read metadata of {}: {source}", .location.display())]
    Metadata {
        /// The store being inspected.
        location: PathBuf,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// The pre-migration WAL checkpoint failed.
    #[error("wal checkpoint of {} failed: {source}", .location.display())]
    CheckpointFailed {
        /// The store being checkpointed.
        location: PathBuf,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// A mapping or step transform failed.
    #[error("migration failed while {phase}: {source}")]
    MigrationFailed {
        /// Phase the migration was in.
        phase: MigrationStatus,
        /// Partially written temporary store, left for inspection.
        leftover: Option<PathBuf>,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// Cancellation was observed at a mapping boundary.
    #[error("migration cancelled before mapping {mapping_index} of step {step_index}")]
    MigrationCancelled {
        /// Step that was about to run a mapping.
        step_index: usize,
        /// Mapping that was not started.
        mapping_index: usize,
        /// Temporary store of the interrupted step, if one was created.
        leftover: Option<PathBuf>,
    },

    /// The final swap into the destination failed.
    #[error("replacing {} failed, migrated store kept at {}: {source}", .destination.display(), .candidate.location().display())]
    ReplaceFailed {
        /// Destination that was to be replaced.
        destination: PathBuf,
        /// Fully migrated store, still intact.
        candidate: StoreHandle,
        /// Underlying cause.
        #[source]
        source: LifecycleError,
    },

    /// An operation was attempted in the wrong migration state.
    #[error("invalid migration state transition from {from} to {to}")]
    InvalidState {
        /// Current state.
        from: MigrationStatus,
        /// Requested state.
        to: MigrationStatus,
    },
}

impl MigrationError {
    /// Check if this error is the result of a cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, MigrationError::MigrationCancelled { .. })
    }

    /// Temporary store left behind by a failed or cancelled step.
    pub fn leftover(&self) -> Option<&PathBuf> {
        match self {
            MigrationError::MigrationFailed { leftover, .. }
            | MigrationError::MigrationCancelled { leftover, .. } => leftover.as_ref(),
            _ => None,
        }
    }
}

fn describe_location(location: &Option<PathBuf>) -> String {
    location
        .as_ref()
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}
