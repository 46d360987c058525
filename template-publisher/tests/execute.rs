use std::fs;
use std::time::Duration;

use tempfile::tempdir;
use template_publisher::{execute, Commands};
use template_publisher_core::config::{PipelineConfig, PublishOptions, StoreConfig};
use template_publisher_core::contract::{MockObjectStore, StoreError, UploadOutcome};
use template_publisher_core::report::{Phase, StageOutcome};

fn config(templates: &std::path::Path, dist: &std::path::Path) -> PipelineConfig {
    let mut config = PipelineConfig::new(
        templates.to_path_buf(),
        dist.to_path_buf(),
        StoreConfig::new("templates-bucket", "eu-west-1"),
    );
    config.publish = PublishOptions {
        max_concurrent_uploads: 1,
        max_attempts: 1,
        backoff: Duration::ZERO,
    };
    config
}

#[tokio::test]
async fn test_build_manifest_runs_discovery_first_and_never_touches_store() {
    let templates = tempdir().unwrap();
    let dist = tempdir().unwrap();
    let app = templates.path().join("app/blank");
    fs::create_dir_all(&app).unwrap();
    fs::write(
        app.join("definition.json"),
        r#"{"category": "c", "name": "Blank", "description": "d", "icon": "i", "background": "b", "url": "u"}"#,
    )
    .unwrap();

    let mut store = MockObjectStore::new();
    store.expect_init().never();
    store.expect_upload().never();

    let report = execute(
        Commands::BuildManifest,
        config(templates.path(), dist.path()),
        store,
    )
    .await;

    let phases: Vec<Phase> = report.stages.iter().map(StageOutcome::phase).collect();
    assert_eq!(phases, vec![Phase::Discover, Phase::BuildManifest]);
    assert!(report.is_clean());
    assert!(dist.path().join("manifest.json").is_file());
}

#[tokio::test]
async fn test_publish_with_failing_auth_is_reported_not_raised() {
    let templates = tempdir().unwrap();
    let dist = tempdir().unwrap();

    let mut store = MockObjectStore::new();
    store
        .expect_init()
        .returning(|| Err(StoreError::Auth("bad key".into())));
    store.expect_upload().never();

    let report = execute(Commands::Publish, config(templates.path(), dist.path()), store).await;

    assert_eq!(report.stages.len(), 1);
    match &report.stages[0] {
        StageOutcome::Aborted { phase, error } => {
            assert_eq!(*phase, Phase::Publish);
            assert!(error.contains("bad key"), "got {error}");
        }
        other => panic!("expected aborted publish, got {other:?}"),
    }
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_publish_uploads_staged_manifest() {
    let templates = tempdir().unwrap();
    let dist = tempdir().unwrap();
    fs::write(dist.path().join("manifest.json"), "{}").unwrap();

    let mut store = MockObjectStore::new();
    store.expect_init().returning(|| Ok(()));
    store.expect_ensure_bucket_exists().returning(|| Ok(()));
    store.expect_configure_bucket_policy().returning(|| Ok(()));
    store
        .expect_upload()
        .times(1)
        .withf(|_, key: &str| key == "manifest.json")
        .returning(|_, key| {
            Ok(UploadOutcome {
                key: key.to_string(),
                bytes: 2,
            })
        });

    let report = execute(Commands::Publish, config(templates.path(), dist.path()), store).await;

    let publish = report.stage(Phase::Publish).unwrap().report().unwrap();
    assert_eq!(publish.succeeded, vec!["manifest.json".to_string()]);
    assert!(report.is_clean());
}
