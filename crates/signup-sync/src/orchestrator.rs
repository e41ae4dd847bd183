//! Batch orchestration
//!
//! A run moves through `Idle → Fetching → Batch* → Done`. Each batch goes
//! through four phases in order, and a phase starts only once the previous
//! one has finished for every row of the batch:
//!
//! | Phase | Work | Concurrency |
//! |---|---|---|
//! | `ResolvingImages` | download every image link in the batch | shared limiter |
//! | `PublishingAssets` | one commit for the batch's images | serial |
//! | `WritingRecords` | duplicate check, create, append blocks | shared limiter |
//! | `Tallied` | outcomes and warnings folded into the summary | - |
//!
//! Batches never overlap and are separated by the configured delay. Only a
//! failure to read the source (or an empty source) aborts the run; every
//! other failure is recorded against the row, image or batch it hit.

use crate::clients::{ContentHost, LinkFetcher, RecordStore, SheetSource};
use crate::config::PipelineConfig;
use crate::dedup::DuplicateChecker;
use crate::error::{Result, SyncError};
use crate::limiter::Limiter;
use crate::mapper::{map_row, MappedRecord, Row};
use crate::outcome::{Outcome, RunSummary, Warning, WarningKind};
use crate::publisher::{AssetPublisher, ImageUrlMap};
use crate::resolver::{ImageResolver, ResolvedImage};
use crate::schema::Schema;
use crate::writer::RecordWriter;
use futures::future::join_all;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// External services a run talks to, built once at start-up
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SheetSource>,
    pub store: Arc<dyn RecordStore>,
    pub host: Arc<dyn ContentHost>,
    pub fetcher: Arc<dyn LinkFetcher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    ResolvingImages,
    PublishingAssets,
    WritingRecords,
    Tallied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    /// `batch` counts from 1
    Batch { batch: usize, phase: BatchPhase },
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Fetching => write!(f, "fetching"),
            RunState::Batch { batch, phase } => write!(f, "batch {} {:?}", batch, phase),
            RunState::Done => write!(f, "done"),
        }
    }
}

pub struct BatchOrchestrator {
    source: Arc<dyn SheetSource>,
    schema: Schema,
    config: PipelineConfig,
    limiter: Limiter,
    resolver: ImageResolver,
    publisher: AssetPublisher,
    writer: RecordWriter,
    state: watch::Sender<RunState>,
}

/// Rows of one batch after mapping and in-run deduplication
struct MappedBatch {
    records: Vec<MappedRecord>,
    outcomes: Vec<Outcome>,
    warnings: Vec<Warning>,
}

impl BatchOrchestrator {
    pub fn new(deps: Collaborators, schema: Schema, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let limiter = Limiter::new(config.max_concurrency);
        let resolver =
            ImageResolver::new(deps.fetcher, &config.image_prefix, config.image_timeout())?;
        let publisher = AssetPublisher::new(deps.host);
        let checker =
            DuplicateChecker::new(deps.store.clone(), &schema, config.strict_duplicate_check);
        let writer = RecordWriter::new(deps.store, checker, config.strict_content_append);
        let (state, _) = watch::channel(RunState::Idle);

        Ok(Self {
            source: deps.source,
            schema,
            config,
            limiter,
            resolver,
            publisher,
            writer,
            state,
        })
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch state transitions while a run is in progress
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn transition(&self, next: RunState) {
        debug!(state = %next, "State transition");
        self.state.send_replace(next);
    }

    #[instrument(skip(self), fields(batch_size = self.config.batch_size, dry_run = self.config.dry_run))]
    pub async fn run(&self) -> Result<RunSummary> {
        self.transition(RunState::Fetching);
        let rows = match self.source.fetch().await {
            Ok(data) => data.into_rows(),
            Err(e) => {
                self.transition(RunState::Done);
                return Err(e);
            },
        };

        if rows.is_empty() {
            self.transition(RunState::Done);
            return Err(SyncError::NoInput("the source has no data rows".into()));
        }

        let total_batches = rows.len().div_ceil(self.config.batch_size);
        info!(rows = rows.len(), batches = total_batches, "Starting sync");

        let mut summary = RunSummary::default();
        let mut seen = HashSet::new();

        for (i, chunk) in rows.chunks(self.config.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
            self.run_batch(i + 1, chunk, &mut seen, &mut summary).await;
            summary.batches += 1;
        }

        self.transition(RunState::Done);
        info!(
            created = summary.created(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            warnings = summary.warnings.len(),
            "Sync finished"
        );
        Ok(summary)
    }

    #[instrument(skip_all, fields(batch = batch, rows = rows.len()))]
    async fn run_batch(
        &self,
        batch: usize,
        rows: &[Row],
        seen: &mut HashSet<String>,
        summary: &mut RunSummary,
    ) {
        let MappedBatch {
            records,
            mut outcomes,
            mut warnings,
        } = self.map_batch(rows, seen);

        if self.config.dry_run {
            for record in &records {
                info!(
                    handle = %record.handle,
                    properties = record.properties.len(),
                    images = record.images.len(),
                    "Dry run, record not written"
                );
                outcomes.push(Outcome::skipped(&record.handle, "dry run"));
            }
            self.tally(batch, outcomes, warnings, summary);
            return;
        }

        self.transition(RunState::Batch {
            batch,
            phase: BatchPhase::ResolvingImages,
        });
        let (images, resolve_warnings) = self.resolve_images(&records).await;
        warnings.extend(resolve_warnings);

        self.transition(RunState::Batch {
            batch,
            phase: BatchPhase::PublishingAssets,
        });
        let urls = match self.publisher.publish(&images, batch).await {
            Ok(urls) => urls,
            Err(warning) => {
                warnings.push(warning);
                ImageUrlMap::new()
            },
        };

        self.transition(RunState::Batch {
            batch,
            phase: BatchPhase::WritingRecords,
        });
        let urls = &urls;
        let writes = records.iter().map(|record| async move {
            match self.limiter.run(self.writer.write(record, urls)).await {
                Ok(report) => report.into_parts(),
                Err(e) => (Outcome::failed(&record.handle, e.to_string()), Vec::new()),
            }
        });
        for (outcome, write_warnings) in join_all(writes).await {
            outcomes.push(outcome);
            warnings.extend(write_warnings);
        }

        self.tally(batch, outcomes, warnings, summary);
    }

    /// Map every row, dropping rows without a handle and rows whose handle
    /// was already seen earlier in the run
    fn map_batch(&self, rows: &[Row], seen: &mut HashSet<String>) -> MappedBatch {
        let mut batch = MappedBatch {
            records: Vec::with_capacity(rows.len()),
            outcomes: Vec::new(),
            warnings: Vec::new(),
        };

        for row in rows {
            let (record, row_warnings) = map_row(row, &self.schema);
            for w in &row_warnings {
                warn!(row = row.index(), handle = ?w.handle, field = ?w.field, error = %w.message, "Row mapping issue");
            }
            batch.warnings.extend(row_warnings);

            let Some(record) = record else {
                continue;
            };

            if !seen.insert(record.handle.clone()) {
                warn!(row = row.index(), handle = %record.handle, "Handle repeated within run");
                batch.warnings.push(
                    Warning::new(
                        WarningKind::DuplicateInRun,
                        format!(
                            "sheet row {} repeats a handle seen earlier in this run",
                            row.line()
                        ),
                    )
                    .with_handle(&record.handle)
                    .with_row(row.index()),
                );
                batch
                    .outcomes
                    .push(Outcome::skipped(&record.handle, "repeated within run"));
                continue;
            }

            batch.records.push(record);
        }

        batch
    }

    async fn resolve_images(&self, records: &[MappedRecord]) -> (Vec<ResolvedImage>, Vec<Warning>) {
        let tasks = records.iter().flat_map(|r| r.images.iter()).map(|task| async move {
            match self.limiter.run(self.resolver.resolve(task)).await {
                Ok(result) => result,
                Err(e) => Err(Warning::new(WarningKind::Resolution, e.to_string())
                    .with_handle(&task.handle)
                    .with_field(&task.field)),
            }
        });

        let mut images = Vec::new();
        let mut warnings = Vec::new();
        for result in join_all(tasks).await {
            match result {
                Ok(image) => images.push(image),
                Err(w) => warnings.push(w),
            }
        }
        debug!(resolved = images.len(), failed = warnings.len(), "Images resolved");
        (images, warnings)
    }

    fn tally(
        &self,
        batch: usize,
        outcomes: Vec<Outcome>,
        warnings: Vec<Warning>,
        summary: &mut RunSummary,
    ) {
        self.transition(RunState::Batch {
            batch,
            phase: BatchPhase::Tallied,
        });
        info!(
            batch,
            outcomes = outcomes.len(),
            warnings = warnings.len(),
            "Batch complete"
        );
        summary.outcomes.extend(outcomes);
        summary.warnings.extend(warnings);
    }
}
