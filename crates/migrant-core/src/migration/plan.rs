//! Migration planning.
//!
//! A plan is the ordered list of steps needed to bring a store from its
//! current version to a target version. Each step carries the schemas of
//! both ends and the mappings to run, resolved once at plan time.

use super::error::MigrationError;
use super::infer::MappingInference;
use super::mapping::{Mapping, MappingSource};
use super::version::{SchemaVersion, VersionGraph, VersionId};
use crate::catalog::{SchemaBundle, StoreMetadata};
use tracing::debug;

/// One hop between adjacent versions.
#[derive(Debug, Clone)]
pub struct MigrationStep {
    /// Position of this step in the plan.
    pub index: usize,
    /// Version the step reads.
    pub source_version: VersionId,
    /// Version the step produces.
    pub destination_version: VersionId,
    /// Schema of the source store.
    pub source_schema: SchemaBundle,
    /// Schema of the produced store.
    pub destination_schema: SchemaBundle,
    /// Mappings to run, in order.
    pub mappings: Vec<Mapping>,
}

impl MigrationStep {
    /// Number of mappings in this step.
    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }
}

/// Ordered list of steps from one version to another.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Version the store is at.
    pub from_version: VersionId,
    /// Version the store will be at.
    pub to_version: VersionId,
    /// Steps to run, in order.
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    fn empty(version: VersionId) -> Self {
        Self {
            from_version: version.clone(),
            to_version: version,
            steps: Vec::new(),
        }
    }

    /// Check if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Number of mappings across all steps.
    pub fn total_mappings(&self) -> usize {
        self.steps.iter().map(MigrationStep::mapping_count).sum()
    }

    /// Check that each step starts where the previous one ended and that
    /// the plan spans `from_version` to `to_version`.
    pub fn is_contiguous(&self) -> bool {
        let mut current = &self.from_version;
        for step in &self.steps {
            if &step.source_version != current {
                return false;
            }
            current = &step.destination_version;
        }
        current == &self.to_version
    }
}

/// Builds migration plans over a version graph.
pub struct MigrationPlanner<'a> {
    graph: &'a VersionGraph,
    inference: &'a dyn MappingInference,
}

impl<'a> MigrationPlanner<'a> {
    /// Create a planner.
    pub fn new(graph: &'a VersionGraph, inference: &'a dyn MappingInference) -> Self {
        Self { graph, inference }
    }

    /// Plan the steps from `from` to `to`.
    ///
    /// Returns an empty plan when both are the same version.
    pub fn plan_steps(&self, from: &VersionId, to: &VersionId) -> Result<MigrationPlan, MigrationError> {
        let mut current = self.graph.require(from)?;
        self.graph.require(to)?;

        if from == to {
            return Ok(MigrationPlan::empty(from.clone()));
        }

        if !self.graph.is_reachable(from, to) {
            return Err(MigrationError::UnreachableVersion {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let mut steps = Vec::new();
        while current.id() != to {
            let next = self.graph.successor(current.id()).ok_or_else(|| {
                MigrationError::UnreachableVersion {
                    from: from.clone(),
                    to: to.clone(),
                }
            })?;

            let mappings = self.resolve_mappings(current, next)?;
            debug!(
                step = steps.len(),
                from = %current.id(),
                to = %next.id(),
                mappings = mappings.len(),
                "planned migration step"
            );

            steps.push(MigrationStep {
                index: steps.len(),
                source_version: current.id().clone(),
                destination_version: next.id().clone(),
                source_schema: current.schema().clone(),
                destination_schema: next.schema().clone(),
                mappings,
            });
            current = next;
        }

        Ok(MigrationPlan {
            from_version: from.clone(),
            to_version: to.clone(),
            steps,
        })
    }

    /// Resolve the version of a store from its metadata and plan the steps
    /// to `to`.
    ///
    /// A store already compatible with the target gets an empty plan, even
    /// if an earlier version with an identical schema matched first.
    pub fn plan_for_store(
        &self,
        metadata: &StoreMetadata,
        to: &VersionId,
    ) -> Result<MigrationPlan, MigrationError> {
        let target = self.graph.require(to)?;
        if target.schema().is_compatible_with(metadata) {
            return Ok(MigrationPlan::empty(to.clone()));
        }

        let current = self.graph.resolve(metadata)?;
        self.plan_steps(current.id(), to)
    }

    fn resolve_mappings(
        &self,
        from: &SchemaVersion,
        to: &SchemaVersion,
    ) -> Result<Vec<Mapping>, MigrationError> {
        let missing = || MigrationError::NoMappingAvailable {
            from: from.id().clone(),
            to: to.id().clone(),
        };

        let mappings = match from.mapping_source() {
            MappingSource::Explicit(mappings) => mappings.clone(),
            MappingSource::Inferred => {
                let mut mapping = self
                    .inference
                    .infer(from.schema(), to.schema())
                    .ok_or_else(missing)?;
                mapping.name = format!("{}-to-{}", from.id(), to.id());
                vec![mapping]
            }
            MappingSource::Custom(provider) => provider.mappings(from, to).ok_or_else(missing)?,
        };

        if mappings.is_empty() {
            return Err(missing());
        }
        Ok(mappings)
    }
}
