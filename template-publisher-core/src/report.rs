//! Structured per-phase results, so automation can tell a clean run from a partial one.

use std::fmt;

/// The phases a run is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Discover,
    List,
    BuildManifest,
    BuildArchives,
    Publish,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discover => "discover",
            Phase::List => "list",
            Phase::BuildManifest => "build-manifest",
            Phase::BuildArchives => "build-archives",
            Phase::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// One item (template, archive, upload) that did not make it through a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, error: impl ToString) -> Self {
        Self {
            item: item.into(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
}

impl PhaseReport {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// How a single runner operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed(PhaseReport),
    /// The operation failed as a whole (or panicked); the runner is still usable.
    Aborted { phase: Phase, error: String },
}

impl StageOutcome {
    pub fn phase(&self) -> Phase {
        match self {
            StageOutcome::Completed(report) => report.phase,
            StageOutcome::Aborted { phase, .. } => *phase,
        }
    }

    pub fn report(&self) -> Option<&PhaseReport> {
        match self {
            StageOutcome::Completed(report) => Some(report),
            StageOutcome::Aborted { .. } => None,
        }
    }

    /// True when the stage completed without a single item failure.
    pub fn is_clean(&self) -> bool {
        self.report().is_some_and(PhaseReport::is_clean)
    }
}

/// Outcome of the composite build-and-publish operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub stages: Vec<StageOutcome>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.stages.iter().all(StageOutcome::is_clean)
    }

    pub fn stage(&self, phase: Phase) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.phase() == phase)
    }
}
