//! Record creation
//!
//! [`RecordWriter::write`] runs the duplicate check, creates the record with
//! its mapped properties plus a file reference per published image, then
//! appends one image block per published image to the record body. Only the
//! create call decides between `created` and `failed`; a failed append is a
//! warning unless `strict_content_append` is set.

use crate::clients::{ContentBlock, RecordStore};
use crate::dedup::{DuplicateChecker, Presence};
use crate::mapper::{ExternalFile, MappedRecord, Property, PropertyValue};
use crate::outcome::{Outcome, Warning, WarningKind};
use crate::publisher::ImageUrlMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of one write plus the warnings raised on the way
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport {
    pub outcome: Outcome,
    pub warnings: Vec<Warning>,
}

impl WriteReport {
    fn new(outcome: Outcome, warnings: Vec<Warning>) -> Self {
        Self { outcome, warnings }
    }

    pub fn into_parts(self) -> (Outcome, Vec<Warning>) {
        (self.outcome, self.warnings)
    }
}

pub struct RecordWriter {
    store: Arc<dyn RecordStore>,
    checker: DuplicateChecker,
    strict_content_append: bool,
}

impl RecordWriter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        checker: DuplicateChecker,
        strict_content_append: bool,
    ) -> Self {
        Self {
            store,
            checker,
            strict_content_append,
        }
    }

    #[instrument(skip(self, record, urls), fields(handle = %record.handle))]
    pub async fn write(&self, record: &MappedRecord, urls: &ImageUrlMap) -> WriteReport {
        let handle = record.handle.as_str();
        let mut warnings = Vec::new();

        match self.checker.check(handle).await {
            Presence::Exists => {
                info!(handle, "Already in store, skipping");
                return WriteReport::new(Outcome::skipped(handle, "already exists"), warnings);
            },
            Presence::Absent(warning) => warnings.extend(warning),
            Presence::Unknown(warning) => {
                let detail = format!("duplicate check failed: {}", warning.message);
                warnings.push(warning);
                return WriteReport::new(Outcome::failed(handle, detail), warnings);
            },
        }

        let (properties, images) = assemble(record, urls);

        let record_id = match self.store.create_record(&properties).await {
            Ok(id) => id,
            Err(e) => {
                warn!(handle, error = %e, "Record creation failed");
                warnings.push(
                    Warning::new(WarningKind::Write, e.to_string())
                        .with_handle(handle)
                        .with_row(record.row_index),
                );
                return WriteReport::new(Outcome::failed(handle, e.to_string()), warnings);
            },
        };

        if !images.is_empty() {
            if let Err(e) = self.store.append_content(&record_id, &images).await {
                warn!(handle, %record_id, error = %e, "Image blocks not appended");
                warnings.push(
                    Warning::new(WarningKind::ContentAppend, e.to_string()).with_handle(handle),
                );
                if self.strict_content_append {
                    return WriteReport::new(
                        Outcome::failed(handle, format!("image blocks not appended: {}", e)),
                        warnings,
                    );
                }
            }
        }

        info!(handle, %record_id, images = images.len(), "Record created");
        WriteReport::new(Outcome::created(handle, record_id), warnings)
    }
}

/// Mapped properties plus a file property and an image block for every
/// image task that has a published URL
fn assemble(record: &MappedRecord, urls: &ImageUrlMap) -> (Vec<Property>, Vec<ContentBlock>) {
    let mut properties = record.properties.clone();
    let mut blocks = Vec::new();

    for task in &record.images {
        let Some(url) = urls.get(&task.logical_id) else {
            continue;
        };
        properties.push(Property::new(
            task.field.clone(),
            PropertyValue::Files(vec![ExternalFile {
                name: task.label.clone(),
                url: url.clone(),
            }]),
        ));
        blocks.push(ContentBlock::Image { url: url.clone() });
    }

    (properties, blocks)
}
