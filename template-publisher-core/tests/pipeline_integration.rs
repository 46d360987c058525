use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use template_publisher_core::config::{PipelineConfig, PublishOptions, StoreConfig};
use template_publisher_core::contract::{MockObjectStore, ObjectStore, StoreError, UploadOutcome};
use template_publisher_core::manifest::Manifest;
use template_publisher_core::pipeline::PipelineRunner;
use template_publisher_core::report::{Phase, StageOutcome};

fn write_template(root: &Path, kind: &str, dir: &str, definition: &str) {
    let template_dir = root.join(kind).join(dir);
    fs::create_dir_all(&template_dir).unwrap();
    fs::write(template_dir.join("definition.json"), definition).unwrap();
}

fn good_definition(name: &str) -> String {
    format!(
        r#"{{"category": "Basics", "name": "{name}", "description": "d", "icon": "i", "background": "b", "url": "u"}}"#
    )
}

struct Workspace {
    templates: TempDir,
    dist: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let templates = tempdir().unwrap();
        write_template(templates.path(), "app", "blank", &good_definition("Blank"));
        write_template(templates.path(), "app", "broken", "{");
        write_template(templates.path(), "screen", "login", &good_definition("Login"));
        Self {
            templates,
            dist: tempdir().unwrap(),
        }
    }

    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(
            self.templates.path().to_path_buf(),
            self.dist.path().to_path_buf(),
            StoreConfig::new("templates-bucket", "us-east-1"),
        );
        config.publish = PublishOptions {
            max_concurrent_uploads: 2,
            max_attempts: 1,
            backoff: Duration::ZERO,
        };
        config
    }
}

fn recording_store(uploaded: Arc<Mutex<Vec<String>>>) -> MockObjectStore {
    let mut store = MockObjectStore::new();
    store.expect_init().returning(|| Ok(()));
    store.expect_ensure_bucket_exists().returning(|| Ok(()));
    store.expect_configure_bucket_policy().returning(|| Ok(()));
    store.expect_upload().returning(move |_, key| {
        uploaded.lock().unwrap().push(key.to_string());
        Ok(UploadOutcome {
            key: key.to_string(),
            bytes: 1,
        })
    });
    store
}

#[tokio::test]
async fn test_build_and_publish_runs_every_phase_in_order() {
    let ws = Workspace::new();
    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let mut runner = PipelineRunner::new(ws.config(), recording_store(uploaded.clone()));

    let run = runner.build_and_publish().await;

    let phases: Vec<Phase> = run.stages.iter().map(StageOutcome::phase).collect();
    assert_eq!(
        phases,
        vec![
            Phase::Discover,
            Phase::BuildManifest,
            Phase::BuildArchives,
            Phase::Publish
        ]
    );

    // The broken template is a reported item failure, not an aborted stage.
    let discover = run.stage(Phase::Discover).unwrap().report().unwrap();
    assert_eq!(discover.succeeded.len(), 2);
    assert_eq!(discover.failed.len(), 1);
    assert!(!run.is_clean());

    let keys: BTreeSet<String> = uploaded.lock().unwrap().iter().cloned().collect();
    let expected: BTreeSet<String> = [
        "manifest.json",
        "templates/app/blank.tar.gz",
        "templates/screen/login.tar.gz",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn test_phases_can_be_invoked_independently() {
    let ws = Workspace::new();
    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let mut runner = PipelineRunner::new(ws.config(), recording_store(uploaded));

    assert!(matches!(runner.discover().await, StageOutcome::Completed(_)));
    assert_eq!(runner.templates().len(), 2);

    let listed = runner.list_templates().await;
    let summaries = &listed.report().unwrap().succeeded;
    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().any(|s| s.starts_with("app/blank")));

    let manifest = runner.build_manifest().await;
    assert!(manifest.is_clean());
    assert!(ws.dist.path().join("manifest.json").is_file());
    assert!(!ws.dist.path().join("templates").exists());

    let archives = runner.build_archives().await;
    assert!(archives.is_clean());
    assert!(ws.dist.path().join("templates/app/blank.tar.gz").is_file());
}

#[tokio::test]
async fn test_failed_discovery_is_contained_and_runner_recovers() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.templates_dir = ws.templates.path().join("missing");
    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let mut runner = PipelineRunner::new(config, recording_store(uploaded));

    match runner.discover().await {
        StageOutcome::Aborted { phase, error } => {
            assert_eq!(phase, Phase::Discover);
            assert!(error.contains("missing"), "got {error}");
        }
        other => panic!("expected aborted discovery, got {other:?}"),
    }

    // Later phases still run on an empty catalog.
    let manifest = runner.build_manifest().await;
    assert!(manifest.is_clean());
    assert!(ws.dist.path().join("manifest.json").is_file());
}

#[tokio::test]
async fn test_failed_rediscovery_drops_previous_catalog() {
    let ws = Workspace::new();
    let uploaded = Arc::new(Mutex::new(Vec::new()));
    let mut runner = PipelineRunner::new(ws.config(), recording_store(uploaded));

    runner.discover().await;
    assert_eq!(runner.templates().len(), 2);

    fs::remove_dir_all(ws.templates.path()).unwrap();
    assert!(matches!(
        runner.discover().await,
        StageOutcome::Aborted {
            phase: Phase::Discover,
            ..
        }
    ));
    assert!(runner.templates().is_empty());

    assert!(runner.build_manifest().await.is_clean());
    let manifest = Manifest::load(&ws.dist.path().join("manifest.json")).unwrap();
    assert!(manifest.is_empty(), "stale entries: {manifest:?}");
    assert!(manifest.get("app", "blank").is_none());
}

/// Panics on the first `init`, then behaves like an offline store.
struct PanicOnceStore {
    panicked: AtomicBool,
}

#[async_trait]
impl ObjectStore for PanicOnceStore {
    async fn init(&self) -> Result<(), StoreError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("credentials provider exploded");
        }
        Ok(())
    }

    async fn ensure_bucket_exists(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn configure_bucket_policy(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upload(&self, _local_path: &Path, remote_key: &str) -> Result<UploadOutcome, StoreError> {
        Err(StoreError::Upload {
            key: remote_key.to_string(),
            message: "offline".into(),
        })
    }
}

#[tokio::test]
async fn test_panicking_store_does_not_poison_the_runner() {
    let ws = Workspace::new();
    let store = PanicOnceStore {
        panicked: AtomicBool::new(false),
    };
    let mut runner = PipelineRunner::new(ws.config(), store);

    match runner.publish().await {
        StageOutcome::Aborted { phase, error } => {
            assert_eq!(phase, Phase::Publish);
            assert!(error.contains("credentials provider exploded"), "got {error}");
        }
        other => panic!("expected aborted publish, got {other:?}"),
    }

    runner.discover().await;
    runner.build_manifest().await;
    let second = runner.publish().await;
    let report = second.report().expect("second publish should complete");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item, "manifest.json");
}
