///
/// This module implements the CLI for template-publisher: command parsing, configuration
/// loading and mapping each command onto [`PipelineRunner`] operations.
///
/// All pipeline logic lives in the [`template-publisher-core`] crate; this module is glue.
///
/// ## Commands
/// - `discover`, `list`: scan the template tree
/// - `build-manifest`, `build-archives`: discover, then write the staged artifact
/// - `publish`: upload whatever is staged in the dist directory
/// - `build-and-publish`: all phases in order
///
/// Commands that depend on discovery run it first, since every invocation is a fresh process.
///
/// ## Exit status
/// Only configuration errors fail the process, unless `--strict` is given, in which case any
/// aborted stage or item failure does too.
///
/// [`template-publisher-core`]: ../../template-publisher-core/
use crate::load_config::{load_config, load_credentials};
use crate::upload::S3Client;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use template_publisher_core::config::PipelineConfig;
use template_publisher_core::contract::{ObjectStore, StoreError, UploadOutcome};
use template_publisher_core::pipeline::PipelineRunner;
use template_publisher_core::report::{RunReport, StageOutcome};

/// CLI for template-publisher: build and publish the template catalog.
#[derive(Parser)]
#[clap(
    name = "template-publisher",
    version,
    about = "Discover, package and publish templates to an object store"
)]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true, default_value = "template-publisher.yaml")]
    pub config: PathBuf,

    /// Exit non-zero when any stage aborts or any item fails
    #[clap(long, global = true)]
    pub strict: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Discover templates and report what was found or skipped
    Discover,
    /// List discovered templates
    List,
    /// Discover templates and write dist/manifest.json
    BuildManifest,
    /// Discover templates and write dist/templates/{type}/{name}.tar.gz
    BuildArchives,
    /// Upload the staged manifest and archives
    Publish,
    /// Run discover, build-manifest, build-archives and publish in order
    BuildAndPublish,
}

impl Commands {
    fn needs_store(self) -> bool {
        matches!(self, Commands::Publish | Commands::BuildAndPublish)
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!(command = ?cli.command, "CLI command starting");

    let config = load_config(&cli.config)?;

    let report = if cli.command.needs_store() {
        let credentials = load_credentials(&config.store)?;
        let store = S3Client::new(&config.store, &credentials)?;
        execute(cli.command, config, store).await
    } else {
        execute(cli.command, config, NoStore).await
    };

    print_report(&report);
    if cli.strict && !report.is_clean() {
        anyhow::bail!("{:?} finished with failures", cli.command);
    }
    Ok(())
}

/// Run `command` against `store` and collect every stage outcome.
pub async fn execute<S: ObjectStore>(
    command: Commands,
    config: PipelineConfig,
    store: S,
) -> RunReport {
    let mut runner = PipelineRunner::new(config, store);
    let mut report = RunReport::default();
    match command {
        Commands::Discover => report.stages.push(runner.discover().await),
        Commands::List => {
            report.stages.push(runner.discover().await);
            report.stages.push(runner.list_templates().await);
        }
        Commands::BuildManifest => {
            report.stages.push(runner.discover().await);
            report.stages.push(runner.build_manifest().await);
        }
        Commands::BuildArchives => {
            report.stages.push(runner.discover().await);
            report.stages.push(runner.build_archives().await);
        }
        Commands::Publish => report.stages.push(runner.publish().await),
        Commands::BuildAndPublish => report = runner.build_and_publish().await,
    }
    report
}

fn print_report(report: &RunReport) {
    for stage in &report.stages {
        match stage {
            StageOutcome::Completed(phase) => {
                println!(
                    "{}: {} succeeded, {} failed",
                    phase.phase,
                    phase.succeeded.len(),
                    phase.failed.len()
                );
                for failure in &phase.failed {
                    println!("  FAILED {}: {}", failure.item, failure.error);
                }
            }
            StageOutcome::Aborted { phase, error } => {
                println!("{phase}: aborted: {error}");
            }
        }
    }
}

/// Store for commands that never publish.
struct NoStore;

#[async_trait::async_trait]
impl ObjectStore for NoStore {
    async fn init(&self) -> Result<(), StoreError> {
        Err(StoreError::Auth(
            "no object store configured for this command".into(),
        ))
    }

    async fn ensure_bucket_exists(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn configure_bucket_policy(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upload(
        &self,
        _local_path: &std::path::Path,
        remote_key: &str,
    ) -> Result<UploadOutcome, StoreError> {
        Err(StoreError::Upload {
            key: remote_key.to_string(),
            message: "no object store configured for this command".into(),
        })
    }
}
