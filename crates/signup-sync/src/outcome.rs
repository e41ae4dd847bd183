//! Per-record outcomes, unit-level warnings and the run summary

use serde::Serialize;
use std::fmt;

/// Failure taxonomy for everything short of a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A field value could not be converted; the field was omitted
    Mapping,
    /// The row had no handle and was dropped
    MissingKey,
    /// An image link could not be resolved or downloaded
    Resolution,
    /// The batch's image commit failed; its images were not attached
    Publish,
    /// The duplicate query failed
    DuplicateCheck,
    /// Record creation failed
    Write,
    /// The record was created but its image blocks were not appended
    ContentAppend,
    /// The handle already appeared earlier in this run
    DuplicateInRun,
}

impl WarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningKind::Mapping => "mapping",
            WarningKind::MissingKey => "missing_key",
            WarningKind::Resolution => "resolution",
            WarningKind::Publish => "publish",
            WarningKind::DuplicateCheck => "duplicate_check",
            WarningKind::Write => "write",
            WarningKind::ContentAppend => "content_append",
            WarningKind::DuplicateInRun => "duplicate_in_run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub handle: Option<String>,
    /// Data row index from 0; messages quote the sheet line instead
    pub row: Option<usize>,
    pub field: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            handle: None,
            row: None,
            field: None,
            message: message.into(),
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind.as_str())?;
        if let Some(ref handle) = self.handle {
            write!(f, " {}", handle)?;
        }
        if let Some(ref field) = self.field {
            write!(f, " ({})", field)?;
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created,
    Skipped,
    Failed,
}

/// Final state of one handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub handle: String,
    pub status: OutcomeStatus,
    pub record_id: Option<String>,
    pub detail: Option<String>,
}

impl Outcome {
    pub fn created(handle: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            status: OutcomeStatus::Created,
            record_id: Some(record_id.into()),
            detail: None,
        }
    }

    pub fn skipped(handle: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            status: OutcomeStatus::Skipped,
            record_id: None,
            detail: Some(detail.into()),
        }
    }

    pub fn failed(handle: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            status: OutcomeStatus::Failed,
            record_id: None,
            detail: Some(detail.into()),
        }
    }
}

/// Everything a run produced, in the order it was produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub batches: usize,
    pub outcomes: Vec<Outcome>,
    pub warnings: Vec<Warning>,
}

impl RunSummary {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn created(&self) -> usize {
        self.count(OutcomeStatus::Created)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }

    pub fn outcome_for(&self, handle: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.handle == handle)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} batch(es): {} created, {} skipped, {} failed, {} warning(s)",
            self.batches,
            self.created(),
            self.skipped(),
            self.failed(),
            self.warnings.len()
        )?;

        for outcome in self.failures() {
            writeln!(
                f,
                "  FAILED {}: {}",
                outcome.handle,
                outcome.detail.as_deref().unwrap_or("unknown error")
            )?;
        }

        Ok(())
    }
}
