//! High-level pipeline: discover → manifest → archives → publish.
//!
//! [`PipelineRunner`] exposes every phase as its own async operation. Each operation runs to
//! completion before it returns, and anything that goes wrong inside it (an error or a panic) is
//! logged and reported as [`StageOutcome::Aborted`] instead of escaping. The runner keeps no
//! state that a failed operation could leave half-updated, so the next call starts clean.
//!
//! Ordering is the caller's business; [`PipelineRunner::build_and_publish`] chains the usual
//! order and keeps going past failed phases, since each phase reads what the previous one left
//! on disk.
//!
//! # Callable From
//! - The CLI crate (one runner per process invocation)
//! - Integration tests, with `MockObjectStore`

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, info, info_span, Instrument};

use crate::archive::pack_all;
use crate::catalog::{discover, Template};
use crate::config::PipelineConfig;
use crate::contract::ObjectStore;
use crate::manifest::build_manifest;
use crate::publish::publish;
use crate::report::{Phase, PhaseReport, RunReport, StageOutcome};

pub struct PipelineRunner<S> {
    config: PipelineConfig,
    store: S,
    templates: Vec<Template>,
}

impl<S> PipelineRunner<S>
where
    S: ObjectStore,
{
    pub fn new(config: PipelineConfig, store: S) -> Self {
        Self {
            config,
            store,
            templates: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Templates found by the last successful discovery.
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub async fn discover(&mut self) -> StageOutcome {
        let root = self.config.templates_dir.clone();
        let found = contain(Phase::Discover, async move {
            let catalog = discover(&root)?;
            let report = catalog.report();
            Ok::<_, crate::catalog::DiscoveryError>((catalog.templates, report))
        })
        .await;

        match found {
            Ok((templates, report)) => {
                self.templates = templates;
                StageOutcome::Completed(report)
            }
            Err(outcome) => {
                // Later phases must not rebuild a catalog that is no longer on disk.
                self.templates.clear();
                outcome
            }
        }
    }

    /// Print and report a summary line per discovered template.
    pub async fn list_templates(&self) -> StageOutcome {
        let templates = &self.templates;
        into_outcome(
            contain(Phase::List, async move {
                println!("{} template(s) found.", templates.len());
                let mut report = PhaseReport::new(Phase::List);
                for template in templates {
                    let summary = template.summary();
                    println!("{summary}");
                    report.succeeded.push(summary);
                }
                Ok::<_, std::convert::Infallible>(report)
            })
            .await,
        )
    }

    pub async fn build_manifest(&self) -> StageOutcome {
        let config = &self.config;
        let templates = &self.templates;
        into_outcome(
            contain(Phase::BuildManifest, async move {
                build_manifest(templates, &config.dist_dir, &config.store)
            })
            .await,
        )
    }

    pub async fn build_archives(&self) -> StageOutcome {
        let config = &self.config;
        into_outcome(
            contain(
                Phase::BuildArchives,
                pack_all(
                    &self.templates,
                    &config.dist_dir,
                    config.max_parallel_archives,
                ),
            )
            .await,
        )
    }

    pub async fn publish(&self) -> StageOutcome {
        into_outcome(
            contain(
                Phase::Publish,
                publish(&self.store, &self.config.dist_dir, &self.config.publish),
            )
            .await,
        )
    }

    /// Run every phase in order, each to completion, and report all of them.
    pub async fn build_and_publish(&mut self) -> RunReport {
        let mut run = RunReport::default();
        run.stages.push(self.discover().await);
        run.stages.push(self.build_manifest().await);
        run.stages.push(self.build_archives().await);
        run.stages.push(self.publish().await);
        info!(clean = run.is_clean(), "Build and publish finished");
        run
    }
}

/// Run one phase, turning errors and panics into an aborted outcome.
async fn contain<T, E, F>(phase: Phase, work: F) -> Result<T, StageOutcome>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let span = info_span!("stage", %phase);
    let result = AssertUnwindSafe(work.instrument(span.clone()))
        .catch_unwind()
        .await;
    let _entered = span.enter();
    match result {
        Ok(Ok(value)) => {
            info!("Stage completed");
            Ok(value)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Stage failed");
            Err(StageOutcome::Aborted {
                phase,
                error: e.to_string(),
            })
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(panic = %message, "Stage panicked");
            Err(StageOutcome::Aborted {
                phase,
                error: format!("panicked: {message}"),
            })
        }
    }
}

fn into_outcome(result: Result<PhaseReport, StageOutcome>) -> StageOutcome {
    match result {
        Ok(report) => StageOutcome::Completed(report),
        Err(outcome) => outcome,
    }
}
