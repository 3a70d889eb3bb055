//! Migration state tracking.
//!
//! Records where a `migrate()` call is in its lifecycle and what each step
//! did, so the outcome stays inspectable after success or failure.

use super::error::MigrationError;
use super::version::VersionId;
use std::path::PathBuf;

/// Phase of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Nothing has run yet.
    Idle,
    /// Resolving the current version and building the plan.
    Planning,
    /// Running the step at `step_index`.
    Executing {
        /// Index of the running step.
        step_index: usize,
    },
    /// Swapping the migrated store into the destination.
    Finalizing,
    /// Migration completed successfully.
    Done,
    /// Migration was cancelled.
    Cancelled,
    /// Migration failed.
    Failed,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::Idle => write!(f, "idle"),
            MigrationStatus::Planning => write!(f, "planning"),
            MigrationStatus::Executing { step_index } => write!(f, "executing step {step_index}"),
            MigrationStatus::Finalizing => write!(f, "finalizing"),
            MigrationStatus::Done => write!(f, "done"),
            MigrationStatus::Cancelled => write!(f, "cancelled"),
            MigrationStatus::Failed => write!(f, "failed"),
        }
    }
}

impl MigrationStatus {
    /// Check if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Done | MigrationStatus::Cancelled | MigrationStatus::Failed
        )
    }

    /// Check if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: MigrationStatus) -> bool {
        use MigrationStatus::*;

        match (*self, next) {
            (from, Cancelled | Failed) => !from.is_terminal(),
            (Idle, Planning) => true,
            (Planning, Executing { step_index: 0 }) | (Planning, Done) => true,
            (Executing { step_index: a }, Executing { step_index: b }) => b == a + 1,
            (Executing { .. }, Finalizing) => true,
            (Finalizing, Done) => true,
            _ => false,
        }
    }
}

/// Status of a single step within a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Step not yet started.
    Pending,
    /// Step in progress.
    InProgress,
    /// Step completed successfully.
    Complete,
    /// Step failed.
    Failed,
    /// Step stopped at a mapping boundary.
    Cancelled,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::Complete => write!(f, "complete"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Progress of a single step within a migration.
#[derive(Debug, Clone)]
pub struct StepProgress {
    /// The index of this step in the migration plan.
    pub step_index: usize,
    /// Version the step reads.
    pub source_version: VersionId,
    /// Version the step produces.
    pub destination_version: VersionId,
    /// Current status of the step.
    pub status: StepStatus,
    /// When the step started (microseconds since epoch).
    pub started_at: Option<u64>,
    /// When the step completed (microseconds since epoch).
    pub completed_at: Option<u64>,
    /// Number of mappings that ran to completion.
    pub mappings_completed: usize,
    /// Number of mappings in the step.
    pub mappings_total: usize,
    /// Temporary store the step wrote into.
    pub candidate: Option<PathBuf>,
    /// Error message if the step failed.
    pub error: Option<String>,
}

impl StepProgress {
    /// Create a new step progress entry.
    pub fn new(
        step_index: usize,
        source_version: VersionId,
        destination_version: VersionId,
        mappings_total: usize,
    ) -> Self {
        Self {
            step_index,
            source_version,
            destination_version,
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            mappings_completed: 0,
            mappings_total,
            candidate: None,
            error: None,
        }
    }

    /// Mark the step as started.
    pub fn start(&mut self) {
        self.status = StepStatus::InProgress;
        self.started_at = Some(current_timestamp());
    }

    /// Mark the step as completed.
    pub fn complete(&mut self, candidate: PathBuf) {
        self.status = StepStatus::Complete;
        self.completed_at = Some(current_timestamp());
        self.mappings_completed = self.mappings_total;
        self.candidate = Some(candidate);
    }

    /// Mark the step as failed.
    pub fn fail(&mut self, error: impl Into<String>, leftover: Option<PathBuf>) {
        self.status = StepStatus::Failed;
        self.completed_at = Some(current_timestamp());
        self.error = Some(error.into());
        self.candidate = leftover;
    }

    /// Mark the step as cancelled.
    pub fn cancel(&mut self, leftover: Option<PathBuf>) {
        self.status = StepStatus::Cancelled;
        self.completed_at = Some(current_timestamp());
        self.candidate = leftover;
    }

    /// Calculate percentage complete.
    pub fn percent_complete(&self) -> f64 {
        if self.mappings_total == 0 {
            100.0
        } else {
            (self.mappings_completed as f64 / self.mappings_total as f64) * 100.0
        }
    }
}

/// State of one `migrate()` call.
#[derive(Debug, Clone)]
pub struct MigrationState {
    /// Current status of the migration.
    pub status: MigrationStatus,
    /// Version the store was found at.
    pub from_version: Option<VersionId>,
    /// Requested target version.
    pub to_version: Option<VersionId>,
    /// When the migration started (microseconds since epoch).
    pub started_at: Option<u64>,
    /// When the migration reached a terminal state (microseconds since epoch).
    pub completed_at: Option<u64>,
    /// Error message if the migration failed or was cancelled.
    pub error: Option<String>,
    /// Progress of each step.
    pub step_progress: Vec<StepProgress>,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationState {
    /// Create an idle migration state.
    pub fn new() -> Self {
        Self {
            status: MigrationStatus::Idle,
            from_version: None,
            to_version: None,
            started_at: None,
            completed_at: None,
            error: None,
            step_progress: Vec::new(),
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: MigrationStatus) -> Result<(), MigrationError> {
        if !self.status.can_transition_to(next) {
            return Err(MigrationError::InvalidState {
                from: self.status,
                to: next,
            });
        }

        if self.status == MigrationStatus::Idle {
            self.started_at = Some(current_timestamp());
        }
        if next.is_terminal() {
            self.completed_at = Some(current_timestamp());
        }
        self.status = next;
        Ok(())
    }

    /// Record a terminal error and move to `Failed` or `Cancelled`.
    ///
    /// Does nothing if the state is already terminal.
    pub fn abort(&mut self, error: &MigrationError) {
        let next = if error.is_cancellation() {
            MigrationStatus::Cancelled
        } else {
            MigrationStatus::Failed
        };
        if self.transition(next).is_ok() {
            self.error = Some(error.to_string());
        }
    }

    /// Get the progress of a step.
    pub fn step(&self, index: usize) -> Option<&StepProgress> {
        self.step_progress.get(index)
    }

    /// Get the progress of a step (mutable).
    pub fn step_mut(&mut self, index: usize) -> Option<&mut StepProgress> {
        self.step_progress.get_mut(index)
    }

    /// Get the progress of the running step.
    pub fn current_step(&self) -> Option<&StepProgress> {
        match self.status {
            MigrationStatus::Executing { step_index } => self.step(step_index),
            _ => None,
        }
    }

    /// Check if the migration is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Current time in microseconds since the Unix epoch.
///
/// A clock set before the epoch reads as zero.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(MigrationStatus::Idle.to_string(), "idle");
        assert_eq!(MigrationStatus::Executing { step_index: 2 }.to_string(), "executing step 2");
        assert_eq!(MigrationStatus::Finalizing.to_string(), "finalizing");
        assert_eq!(StepStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = MigrationState::new();
        state.transition(MigrationStatus::Planning).unwrap();
        assert!(state.started_at.is_some());
        state.transition(MigrationStatus::Executing { step_index: 0 }).unwrap();
        state.transition(MigrationStatus::Executing { step_index: 1 }).unwrap();
        state.transition(MigrationStatus::Finalizing).unwrap();
        state.transition(MigrationStatus::Done).unwrap();

        assert!(state.is_terminal());
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn test_empty_plan_goes_straight_to_done() {
        let mut state = MigrationState::new();
        state.transition(MigrationStatus::Planning).unwrap();
        state.transition(MigrationStatus::Done).unwrap();
        assert_eq!(state.status, MigrationStatus::Done);
    }

    #[test]
    fn test_illegal_transitions() {
        let mut state = MigrationState::new();
        let err = state.transition(MigrationStatus::Finalizing).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::InvalidState {
                from: MigrationStatus::Idle,
                to: MigrationStatus::Finalizing
            }
        ));

        state.transition(MigrationStatus::Planning).unwrap();
        state.transition(MigrationStatus::Executing { step_index: 0 }).unwrap();
        assert!(state.transition(MigrationStatus::Executing { step_index: 2 }).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut state = MigrationState::new();
        state.transition(MigrationStatus::Planning).unwrap();
        state.transition(MigrationStatus::Failed).unwrap();

        assert!(state.transition(MigrationStatus::Planning).is_err());
        assert!(state.transition(MigrationStatus::Cancelled).is_err());
    }

    #[test]
    fn test_abort_records_error() {
        let mut state = MigrationState::new();
        state.transition(MigrationStatus::Planning).unwrap();
        state.abort(&MigrationError::MigrationCancelled {
            step_index: 0,
            mapping_index: 0,
            leftover: None,
        });

        assert_eq!(state.status, MigrationStatus::Cancelled);
        assert!(state.error.as_deref().unwrap().contains("cancelled"));
    }

    #[test]
    fn test_step_progress() {
        let mut step = StepProgress::new(0, "v1".into(), "v2".into(), 4);
        assert_eq!(step.status, StepStatus::Pending);
        step.start();
        step.mappings_completed = 1;
        assert_eq!(step.percent_complete(), 25.0);

        step.complete(PathBuf::from("/tmp/candidate.store"));
        assert_eq!(step.status, StepStatus::Complete);
        assert_eq!(step.percent_complete(), 100.0);
    }
}
