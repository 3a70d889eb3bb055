//! Migrator - brings a store from whatever version it holds to a target
//! version.
//!
//! Every step writes into a scratch store. The destination is touched once,
//! by the final replace, after every step has succeeded.

use super::backend::{MetadataReader, StoreTransformBackend};
use super::error::MigrationError;
use super::executor::{StepEvent, StepExecutor, StepObserver};
use super::infer::{MappingInference, StructuralInference};
use super::lifecycle::{ReplaceError, StoreHandle, StoreLifecycleManager};
use super::plan::{MigrationPlan, MigrationPlanner};
use super::progress::{MigrationProgress, NodeId};
use super::state::{MigrationState, MigrationStatus, StepProgress};
use super::version::{VersionGraph, VersionId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Migrator configuration.
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Directory scratch stores are created in.
    pub scratch_dir: PathBuf,
    /// Whether to merge the source's write-ahead log before migrating.
    ///
    /// The source must not be open elsewhere while this runs.
    pub wal_checkpoint: bool,
    /// Whether to remove the source after migrating into a separate
    /// destination.
    pub delete_source: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("migrant"),
            wal_checkpoint: false,
            delete_source: false,
        }
    }
}

impl MigratorConfig {
    /// Set the scratch directory.
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    /// Enable or disable the pre-migration WAL checkpoint.
    pub fn with_wal_checkpoint(mut self, enabled: bool) -> Self {
        self.wal_checkpoint = enabled;
        self
    }

    /// Enable or disable source deletion.
    pub fn with_delete_source(mut self, enabled: bool) -> Self {
        self.delete_source = enabled;
        self
    }
}

/// Result of a successful migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version the store was found at.
    pub from_version: VersionId,
    /// Version the store is at now.
    pub to_version: VersionId,
    /// Steps executed.
    pub steps_executed: usize,
    /// Total steps.
    pub total_steps: usize,
    /// Where the migrated store lives.
    pub destination: PathBuf,
}

impl MigrationReport {
    /// Check if the store needed no migration.
    pub fn is_noop(&self) -> bool {
        self.total_steps == 0
    }
}

/// Orchestrates one migration of one store.
pub struct Migrator<R, B> {
    graph: Arc<VersionGraph>,
    inference: Box<dyn MappingInference>,
    reader: R,
    backend: B,
    source: PathBuf,
    destination: PathBuf,
    config: MigratorConfig,
    lifecycle: StoreLifecycleManager,
    progress: MigrationProgress,
    state: MigrationState,
}

impl<R: MetadataReader, B: StoreTransformBackend> Migrator<R, B> {
    /// Create a migrator that reads `source` and leaves the result at
    /// `destination`.
    pub fn new(
        graph: Arc<VersionGraph>,
        reader: R,
        backend: B,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        let config = MigratorConfig::default();
        Self {
            graph,
            inference: Box::new(StructuralInference),
            reader,
            backend,
            source: source.into(),
            destination: destination.into(),
            lifecycle: StoreLifecycleManager::new(&config.scratch_dir),
            config,
            progress: MigrationProgress::new("migration"),
            state: MigrationState::new(),
        }
    }

    /// Create a migrator that replaces the store at `location` with its
    /// migrated content.
    pub fn in_place(graph: Arc<VersionGraph>, reader: R, backend: B, location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        Self::new(graph, reader, backend, location.clone(), location)
    }

    /// Use a custom configuration.
    pub fn with_config(mut self, config: MigratorConfig) -> Self {
        self.lifecycle = StoreLifecycleManager::new(&config.scratch_dir);
        self.config = config;
        self
    }

    /// Use a custom mapping inference.
    pub fn with_inference(mut self, inference: impl MappingInference + 'static) -> Self {
        self.inference = Box::new(inference);
        self
    }

    /// Store being migrated.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Where the migrated store ends up.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Active configuration.
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Handle for observing progress and requesting cancellation.
    pub fn progress(&self) -> MigrationProgress {
        self.progress.clone()
    }

    /// State of the migration, kept after failure.
    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    /// Current phase.
    pub fn status(&self) -> MigrationStatus {
        self.state.status
    }

    /// Check if the source differs from the schema of `target`.
    pub fn is_migration_necessary(&self, target: &VersionId) -> Result<bool, MigrationError> {
        let metadata = self
            .reader
            .read_metadata(&self.source)
            .map_err(|source| MigrationError::Metadata {
                location: self.source.clone(),
                source,
            })?;
        self.graph.is_migration_necessary(&metadata, target)
    }

    /// Migrate the source to `target`.
    ///
    /// Runs once per migrator. On error the source is untouched, the state
    /// and progress stay readable, and any scratch store of the failing step
    /// is named by the error.
    #[instrument(skip(self), fields(source = %self.source.display(), destination = %self.destination.display()))]
    pub fn migrate(&mut self, target: &VersionId) -> Result<MigrationReport, MigrationError> {
        self.state.transition(MigrationStatus::Planning)?;
        self.state.to_version = Some(target.clone());

        let result = self.run(target);
        if let Err(e) = &result {
            self.state.abort(e);
            warn!(error = %e, status = %self.state.status, "migration stopped");
        }
        result
    }

    fn run(&mut self, target: &VersionId) -> Result<MigrationReport, MigrationError> {
        let plan = self.plan(target)?;
        self.state.from_version = Some(plan.from_version.clone());

        if plan.is_empty() {
            info!(version = %plan.to_version, "store already at target version");
            self.progress.write(|tree| {
                let root = tree.root();
                tree.complete(root);
            });
            self.state.transition(MigrationStatus::Done)?;
            return Ok(MigrationReport {
                from_version: plan.from_version,
                to_version: plan.to_version,
                steps_executed: 0,
                total_steps: 0,
                destination: self.source.clone(),
            });
        }

        info!(
            from = %plan.from_version,
            to = %plan.to_version,
            steps = plan.step_count(),
            mappings = plan.total_mappings(),
            "starting migration"
        );
        let step_nodes = self.track(&plan);

        if self.config.wal_checkpoint {
            debug!("checkpointing source");
            self.backend
                .checkpoint(&self.source)
                .map_err(|source| MigrationError::CheckpointFailed {
                    location: self.source.clone(),
                    source,
                })?;
        }

        let source = StoreHandle::permanent(&self.source, plan.from_version.clone());
        let candidate = self.execute_steps(&plan, &step_nodes, &source)?;

        self.state.transition(MigrationStatus::Finalizing)?;
        let replaced = self
            .lifecycle
            .replace(&self.destination, candidate)
            .map_err(|ReplaceError { candidate, source }| MigrationError::ReplaceFailed {
                destination: self.destination.clone(),
                candidate,
                source,
            })?;

        if self.destination != self.source && self.config.delete_source {
            if let Err(e) = self.lifecycle.destroy_source(source) {
                warn!(error = %e, "migrated store is in place but the source could not be removed");
            }
        }

        self.progress.write(|tree| {
            let root = tree.root();
            tree.complete(root);
        });
        self.state.transition(MigrationStatus::Done)?;
        info!(version = %plan.to_version, "migration complete");

        Ok(MigrationReport {
            from_version: plan.from_version.clone(),
            to_version: plan.to_version.clone(),
            steps_executed: plan.step_count(),
            total_steps: plan.step_count(),
            destination: replaced.location().to_path_buf(),
        })
    }

    fn plan(&self, target: &VersionId) -> Result<MigrationPlan, MigrationError> {
        let metadata = self
            .reader
            .read_metadata(&self.source)
            .map_err(|source| MigrationError::Metadata {
                location: self.source.clone(),
                source,
            })?;

        MigrationPlanner::new(&self.graph, self.inference.as_ref())
            .plan_for_store(&metadata, target)
            .map_err(|e| match e {
                MigrationError::VersionNotFound { location: None } => MigrationError::VersionNotFound {
                    location: Some(self.source.clone()),
                },
                other => other,
            })
    }

    fn track(&mut self, plan: &MigrationPlan) -> Vec<NodeId> {
        self.state.step_progress = plan
            .steps
            .iter()
            .map(|step| {
                StepProgress::new(
                    step.index,
                    step.source_version.clone(),
                    step.destination_version.clone(),
                    step.mapping_count(),
                )
            })
            .collect();

        self.progress.write(|tree| {
            let root = tree.root();
            tree.set_total_units(root, plan.step_count() as u64);
            plan.steps
                .iter()
                .map(|step| {
                    let label = format!("{} -> {}", step.source_version, step.destination_version);
                    tree.add_child(root, label, step.mapping_count() as u64, 1)
                })
                .collect()
        })
    }

    /// Run every step. Returns the scratch store holding the final version.
    fn execute_steps(
        &mut self,
        plan: &MigrationPlan,
        step_nodes: &[NodeId],
        source: &StoreHandle,
    ) -> Result<StoreHandle, MigrationError> {
        let mut current: Option<StoreHandle> = None;

        for (step, &node) in plan.steps.iter().zip(step_nodes) {
            self.state.transition(MigrationStatus::Executing {
                step_index: step.index,
            })?;
            if let Some(progress) = self.state.step_mut(step.index) {
                progress.start();
            }

            let mut recorder = ProgressRecorder {
                progress: &self.progress,
                step: node,
                mapping: None,
                completed: 0,
            };
            let outcome = StepExecutor::new(&self.backend, &self.lifecycle).execute(
                step,
                current.as_ref().unwrap_or(source),
                &mut recorder,
            );
            let completed = recorder.completed;

            match outcome {
                Ok(next) => {
                    if let Some(progress) = self.state.step_mut(step.index) {
                        progress.complete(next.location().to_path_buf());
                    }
                    self.progress.write(|tree| tree.complete(node));
                    if let Some(previous) = current.replace(next) {
                        self.discard(previous);
                    }
                }
                Err(e) => {
                    if let Some(progress) = self.state.step_mut(step.index) {
                        progress.mappings_completed = completed;
                        if e.is_cancellation() {
                            progress.cancel(e.leftover().cloned());
                        } else {
                            progress.fail(e.to_string(), e.leftover().cloned());
                        }
                    }
                    if let Some(previous) = current.take() {
                        self.discard(previous);
                    }
                    return Err(e);
                }
            }
        }

        current.ok_or_else(|| MigrationError::MigrationFailed {
            phase: MigrationStatus::Finalizing,
            leftover: None,
            source: "plan produced no store".into(),
        })
    }

    fn discard(&self, handle: StoreHandle) {
        let location = handle.location().to_path_buf();
        match self.lifecycle.destroy(handle) {
            Ok(()) => debug!(location = %location.display(), "removed intermediate store"),
            Err(e) => warn!(location = %location.display(), error = %e, "could not remove intermediate store"),
        }
    }
}

/// Turns step events into progress tree updates.
struct ProgressRecorder<'a> {
    progress: &'a MigrationProgress,
    step: NodeId,
    mapping: Option<NodeId>,
    completed: usize,
}

impl StepObserver for ProgressRecorder<'_> {
    fn is_cancelled(&self) -> bool {
        self.progress.read(|tree| tree.is_cancelled(self.step))
    }

    fn on_event(&mut self, event: StepEvent<'_>) {
        match event {
            StepEvent::MappingStarted { name, .. } => {
                let step = self.step;
                self.mapping = Some(self.progress.write(|tree| tree.add_child(step, name, 1, 1)));
            }
            StepEvent::MappingCompleted { .. } => {
                if let Some(node) = self.mapping.take() {
                    self.progress.write(|tree| tree.complete(node));
                }
                self.completed += 1;
            }
        }
    }

    fn on_mapping_progress(&self, _mapping_index: usize, completed: u64, total: u64) {
        if let Some(node) = self.mapping {
            self.progress.write(|tree| tree.report(node, completed, total));
        }
    }
}
