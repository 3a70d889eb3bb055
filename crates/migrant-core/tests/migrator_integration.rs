//! Integration tests for the migrator, run against JSON file stores.

use migrant_core::migration::{
    MigrationError, MigrationStatus, RecordSink, StepStatus, StoreLifecycleManager, TransformRequest,
};
use migrant_core::{
    BoxError, DefaultValue, EntityDef, FieldDef, FieldType, MetadataReader, MigrationProgress, Migrator,
    MigratorConfig, Record, ScalarType, SchemaBundle, StoreMetadata, StoreTransformBackend, VersionGraph, VersionId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonStore {
    metadata: Option<StoreMetadata>,
    records: Vec<Record>,
}

impl JsonStore {
    fn load(path: &Path) -> Result<Self, BoxError> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, path: &Path) -> Result<(), BoxError> {
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    fn upsert(&mut self, record: Record) {
        self.records
            .retain(|r| !(r.entity == record.entity && r.id == record.id));
        self.records.push(record);
    }
}

/// Store backend over JSON files, with failure injection.
#[derive(Default)]
struct JsonBackend {
    fail_at: Option<&'static str>,
    fail_checkpoint: bool,
    transforms: Mutex<Vec<String>>,
    checkpoints: Mutex<usize>,
    watch: Mutex<Option<MigrationProgress>>,
    observed: Mutex<Vec<f64>>,
}

impl MetadataReader for JsonBackend {
    fn read_metadata(&self, location: &Path) -> Result<StoreMetadata, BoxError> {
        JsonStore::load(location)?
            .metadata
            .ok_or_else(|| "store has no metadata".into())
    }
}

impl StoreTransformBackend for JsonBackend {
    fn transform(&self, request: &TransformRequest<'_>) -> Result<(), BoxError> {
        self.transforms.lock().push(request.destination_version.to_string());
        if self.fail_at == Some(request.destination_version.as_str()) {
            return Err("injected transform failure".into());
        }

        let source = JsonStore::load(request.source)?;
        let mut destination = JsonStore::load(request.destination)?;
        let mut sink = RecordSink::new();
        let work: Vec<_> = request
            .mapping
            .entities
            .iter()
            .filter_map(|entity| {
                let from = entity.source_entity.as_deref()?;
                Some(source.records.iter().filter(move |r| r.entity == from).map(move |r| (entity, r)))
            })
            .flatten()
            .collect();
        let total = work.len() as u64;
        for (done, (entity, record)) in work.into_iter().enumerate() {
            entity.migrate_record(record, &mut sink)?;
            request.progress.report(done as u64 + 1, total);
            if let Some(progress) = self.watch.lock().as_ref() {
                self.observed.lock().push(progress.fraction_completed());
            }
        }
        for record in sink.into_records() {
            destination.upsert(record);
        }
        destination.metadata = Some(
            request
                .destination_schema
                .metadata(Some(request.destination_version.as_str())),
        );
        destination.save(request.destination)
    }

    fn checkpoint(&self, _location: &Path) -> Result<(), BoxError> {
        *self.checkpoints.lock() += 1;
        if self.fail_checkpoint {
            return Err("database is locked".into());
        }
        Ok(())
    }
}

fn schema(fields: Vec<FieldDef>) -> SchemaBundle {
    let mut book = EntityDef::new("Book");
    for field in fields {
        book = book.with_field(field);
    }
    SchemaBundle::new().with_entity(book)
}

fn title() -> FieldDef {
    FieldDef::new("title", FieldType::scalar(ScalarType::String))
}

fn v1() -> SchemaBundle {
    schema(vec![title(), FieldDef::optional_scalar("blurb", ScalarType::String)])
}

fn v2() -> SchemaBundle {
    schema(vec![title()])
}

fn v3() -> SchemaBundle {
    schema(vec![
        title(),
        FieldDef::new("pages", FieldType::scalar(ScalarType::Int64)).with_default(DefaultValue::Int(0)),
    ])
}

fn graph() -> Arc<VersionGraph> {
    Arc::new(
        VersionGraph::builder()
            .version("v1", v1())
            .version("v2", v2())
            .version("v3", v3())
            .build()
            .unwrap(),
    )
}

struct TestContext {
    dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn scratch(&self) -> PathBuf {
        self.path("scratch")
    }

    fn config(&self) -> MigratorConfig {
        MigratorConfig::default().with_scratch_dir(self.scratch())
    }

    fn seed(&self, name: &str, schema: &SchemaBundle, version: &str) -> PathBuf {
        let path = self.path(name);
        let store = JsonStore {
            metadata: Some(schema.metadata(Some(version))),
            records: (0..3)
                .map(|i| {
                    Record::with_id("Book", format!("b{i}"))
                        .with_value("title", format!("Book {i}"))
                        .with_value("blurb", "x")
                })
                .collect(),
        };
        store.save(&path).unwrap();
        path
    }

    fn scratch_entries(&self) -> usize {
        fs::read_dir(self.scratch()).map(|e| e.count()).unwrap_or(0)
    }
}

#[test]
fn test_multi_hop_in_place() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v1(), "v1");
    let backend = JsonBackend::default();

    let mut migrator = Migrator::in_place(graph(), &backend, &backend, &path).with_config(ctx.config());
    let report = migrator.migrate(&VersionId::new("v3")).unwrap();

    assert_eq!(report.from_version.as_str(), "v1");
    assert_eq!(report.to_version.as_str(), "v3");
    assert_eq!(report.steps_executed, 2);
    assert_eq!(*backend.transforms.lock(), vec!["v2", "v3"]);

    let store = JsonStore::load(&path).unwrap();
    assert!(v3().is_compatible_with(store.metadata.as_ref().unwrap()));
    assert_eq!(store.records.len(), 3);
    for record in &store.records {
        assert!(record.get("blurb").is_none());
        assert_eq!(record.get("pages"), Some(&serde_json::json!(0)));
    }

    assert_eq!(ctx.scratch_entries(), 0);
    assert_eq!(migrator.status(), MigrationStatus::Done);
    assert!(migrator
        .state()
        .step_progress
        .iter()
        .all(|s| s.status == StepStatus::Complete && s.mappings_completed == 1));

    let snapshot = migrator.progress().snapshot();
    assert_eq!(snapshot.fraction_completed, 1.0);
    assert_eq!(snapshot.children.len(), 2);
    assert_eq!(snapshot.children[0].label, "v1 -> v2");
    assert_eq!(snapshot.children[1].children[0].label, "v2-to-v3");
}

#[test]
fn test_backend_reports_progress_within_mappings() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v1(), "v1");
    let backend = JsonBackend::default();

    let mut migrator = Migrator::in_place(graph(), &backend, &backend, &path).with_config(ctx.config());
    *backend.watch.lock() = Some(migrator.progress());
    migrator.migrate(&VersionId::new("v3")).unwrap();

    // three records per hop, two hops
    let observed = backend.observed.lock().clone();
    assert_eq!(observed.len(), 6);
    assert!(observed[0] > 0.0 && observed[0] < 0.5);
    assert!(observed.windows(2).all(|w| w[0] < w[1]));
    assert!((observed[2] - 0.5).abs() < 1e-9);
    assert!(observed[3] > 0.5 && observed[3] < 1.0);
    assert_eq!(migrator.progress().fraction_completed(), 1.0);
}

#[test]
fn test_uninferable_hop_fails_before_touching_stores() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v1(), "v1");
    let required = schema(vec![title(), FieldDef::new("isbn", FieldType::scalar(ScalarType::String))]);
    let graph = Arc::new(
        VersionGraph::builder()
            .version("v1", v1())
            .version("v2", required)
            .build()
            .unwrap(),
    );
    let backend = JsonBackend::default();

    let mut migrator = Migrator::in_place(graph, &backend, &backend, &path).with_config(ctx.config());
    let err = migrator.migrate(&VersionId::new("v2")).unwrap_err();

    assert!(matches!(err, MigrationError::NoMappingAvailable { .. }));
    assert!(backend.transforms.lock().is_empty());
    assert!(!ctx.scratch().exists());
    assert_eq!(migrator.status(), MigrationStatus::Failed);
    assert!(migrator.state().error.is_some());
}

#[test]
fn test_target_behind_current() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v3(), "v3");
    let backend = JsonBackend::default();

    let mut migrator = Migrator::in_place(graph(), &backend, &backend, &path).with_config(ctx.config());
    let err = migrator.migrate(&VersionId::new("v1")).unwrap_err();

    assert!(matches!(err, MigrationError::UnreachableVersion { .. }));
    assert!(backend.transforms.lock().is_empty());
}

#[test]
fn test_failure_keeps_source_version() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v1(), "v1");
    let backend = JsonBackend {
        fail_at: Some("v3"),
        ..Default::default()
    };

    let mut migrator = Migrator::in_place(graph(), &backend, &backend, &path).with_config(ctx.config());
    let err = migrator.migrate(&VersionId::new("v3")).unwrap_err();

    assert!(matches!(err, MigrationError::MigrationFailed { .. }));
    let leftover = err.leftover().unwrap();
    assert!(leftover.starts_with(ctx.scratch()));
    assert_eq!(ctx.scratch_entries(), 1);

    let metadata = backend.read_metadata(&path).unwrap();
    assert!(v1().is_compatible_with(&metadata));

    let failed = &migrator.state().step_progress[1];
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.candidate.as_deref(), Some(leftover.as_path()));
    assert!(migrator.progress().fraction_completed() >= 0.5);
}

#[test]
fn test_cancel_before_migrate() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v1(), "v1");
    let backend = JsonBackend::default();

    let mut migrator = Migrator::in_place(graph(), &backend, &backend, &path).with_config(ctx.config());
    migrator.progress().cancel();
    let err = migrator.migrate(&VersionId::new("v3")).unwrap_err();

    assert!(matches!(
        err,
        MigrationError::MigrationCancelled {
            step_index: 0,
            mapping_index: 0,
            leftover: None
        }
    ));
    assert!(backend.transforms.lock().is_empty());
    assert_eq!(migrator.status(), MigrationStatus::Cancelled);
    assert_eq!(migrator.state().step_progress[0].status, StepStatus::Cancelled);
}

#[test]
fn test_replace_failure_preserves_candidate() {
    let ctx = TestContext::new();
    let source = ctx.seed("books.json", &v1(), "v1");
    let unreachable = ctx.path("missing").join("books.json");
    let backend = JsonBackend::default();

    let mut migrator =
        Migrator::new(graph(), &backend, &backend, &source, &unreachable).with_config(ctx.config());
    let err = migrator.migrate(&VersionId::new("v3")).unwrap_err();

    let MigrationError::ReplaceFailed { candidate, .. } = err else {
        panic!("expected a replace failure");
    };
    assert_eq!(candidate.version().as_str(), "v3");
    let migrated = backend.read_metadata(candidate.location()).unwrap();
    assert!(v3().is_compatible_with(&migrated));
    assert!(v1().is_compatible_with(&backend.read_metadata(&source).unwrap()));

    let retry = ctx.path("books-v3.json");
    let replaced = StoreLifecycleManager::new(ctx.scratch())
        .replace(&retry, candidate)
        .unwrap();
    assert!(v3().is_compatible_with(&backend.read_metadata(replaced.location()).unwrap()));
}

#[test]
fn test_checkpoint_runs_once_and_failure_aborts() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v1(), "v1");

    let backend = JsonBackend::default();
    let mut migrator = Migrator::in_place(graph(), &backend, &backend, &path)
        .with_config(ctx.config().with_wal_checkpoint(true));
    migrator.migrate(&VersionId::new("v2")).unwrap();
    assert_eq!(*backend.checkpoints.lock(), 1);

    let failing = JsonBackend {
        fail_checkpoint: true,
        ..Default::default()
    };
    let mut migrator = Migrator::in_place(graph(), &failing, &failing, &path)
        .with_config(ctx.config().with_wal_checkpoint(true));
    let err = migrator.migrate(&VersionId::new("v3")).unwrap_err();

    assert!(matches!(err, MigrationError::CheckpointFailed { .. }));
    assert!(failing.transforms.lock().is_empty());
    assert!(v2().is_compatible_with(&failing.read_metadata(&path).unwrap()));
}

#[test]
fn test_migrate_runs_once() {
    let ctx = TestContext::new();
    let path = ctx.seed("books.json", &v1(), "v1");
    let backend = JsonBackend::default();

    let mut migrator = Migrator::in_place(graph(), &backend, &backend, &path).with_config(ctx.config());
    migrator.migrate(&VersionId::new("v2")).unwrap();

    let err = migrator.migrate(&VersionId::new("v3")).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::InvalidState {
            from: MigrationStatus::Done,
            to: MigrationStatus::Planning
        }
    ));
    assert_eq!(migrator.status(), MigrationStatus::Done);
}

#[test]
fn test_unreadable_metadata() {
    let ctx = TestContext::new();
    let backend = JsonBackend::default();

    let mut migrator = Migrator::in_place(graph(), &backend, &backend, ctx.path("absent.json"))
        .with_config(ctx.config());
    let err = migrator.migrate(&VersionId::new("v3")).unwrap_err();

    assert!(matches!(err, MigrationError::Metadata { .. }));
    assert!(err.to_string().contains("absent.json"));
}
