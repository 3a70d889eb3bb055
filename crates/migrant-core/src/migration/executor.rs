//! Step executor - runs the mappings of one step into a scratch store.

use super::backend::{StoreTransformBackend, TransformRequest};
use super::error::MigrationError;
use super::lifecycle::{StoreHandle, StoreLifecycleManager};
use super::plan::MigrationStep;
use super::state::MigrationStatus;
use tracing::{debug, info};

/// Progress reported by the executor while a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent<'a> {
    /// A mapping is about to run.
    MappingStarted {
        /// Index of the mapping within the step.
        mapping_index: usize,
        /// Name of the mapping.
        name: &'a str,
    },
    /// A mapping ran to completion.
    MappingCompleted {
        /// Index of the mapping within the step.
        mapping_index: usize,
    },
}

/// Receives step events and answers cancellation checks.
pub trait StepObserver {
    /// Check if the migration should stop before the next mapping.
    fn is_cancelled(&self) -> bool;

    /// Called as mappings start and complete.
    fn on_event(&mut self, event: StepEvent<'_>);

    /// Called while a mapping runs, with the backend's own unit counts.
    fn on_mapping_progress(&self, mapping_index: usize, completed: u64, total: u64) {
        let _ = (mapping_index, completed, total);
    }
}

/// Runs one step's mappings, in order, into a fresh scratch store.
pub struct StepExecutor<'a, B: ?Sized> {
    backend: &'a B,
    lifecycle: &'a StoreLifecycleManager,
}

impl<'a, B: StoreTransformBackend + ?Sized> StepExecutor<'a, B> {
    /// Create an executor.
    pub fn new(backend: &'a B, lifecycle: &'a StoreLifecycleManager) -> Self {
        Self { backend, lifecycle }
    }

    /// Execute `step` reading from `source`.
    ///
    /// Mappings run sequentially; each sees what the previous ones wrote.
    /// Cancellation is checked before each mapping. On failure or
    /// cancellation the scratch store is left in place and its location
    /// is carried by the error.
    pub fn execute(
        &self,
        step: &MigrationStep,
        source: &StoreHandle,
        observer: &mut dyn StepObserver,
    ) -> Result<StoreHandle, MigrationError> {
        let phase = MigrationStatus::Executing {
            step_index: step.index,
        };
        info!(
            step = step.index,
            from = %step.source_version,
            to = %step.destination_version,
            mappings = step.mapping_count(),
            "executing migration step"
        );

        let mut destination: Option<StoreHandle> = None;

        for (mapping_index, mapping) in step.mappings.iter().enumerate() {
            if observer.is_cancelled() {
                info!(step = step.index, mapping = mapping_index, "cancellation observed");
                return Err(MigrationError::MigrationCancelled {
                    step_index: step.index,
                    mapping_index,
                    leftover: destination.map(|h| h.location().to_path_buf()),
                });
            }

            let target = match destination {
                Some(ref handle) => handle,
                None => &*destination.insert(self.reserve(step, phase)?),
            };

            observer.on_event(StepEvent::MappingStarted {
                mapping_index,
                name: &mapping.name,
            });
            debug!(step = step.index, mapping = %mapping.name, "running mapping");

            let watcher: &dyn StepObserver = &*observer;
            let sink = move |completed: u64, total: u64| {
                watcher.on_mapping_progress(mapping_index, completed, total)
            };
            let request = TransformRequest {
                mapping,
                source: source.location(),
                destination: target.location(),
                source_schema: &step.source_schema,
                destination_schema: &step.destination_schema,
                source_version: &step.source_version,
                destination_version: &step.destination_version,
                progress: &sink,
            };
            self.backend
                .transform(&request)
                .map_err(|source| MigrationError::MigrationFailed {
                    phase,
                    leftover: Some(target.location().to_path_buf()),
                    source,
                })?;

            observer.on_event(StepEvent::MappingCompleted { mapping_index });
        }

        match destination {
            Some(handle) => Ok(handle),
            None => self.reserve(step, phase),
        }
    }

    fn reserve(&self, step: &MigrationStep, phase: MigrationStatus) -> Result<StoreHandle, MigrationError> {
        self.lifecycle
            .create_temporary_store(&step.destination_version)
            .map_err(|e| MigrationError::MigrationFailed {
                phase,
                leftover: None,
                source: Box::new(e),
            })
    }
}
