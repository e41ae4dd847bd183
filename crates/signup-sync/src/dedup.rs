//! Duplicate detection against the record store
//!
//! A record is a duplicate when the store already holds one whose handle
//! property equals the handle exactly. When the lookup itself fails the
//! default is to report the handle as absent and let the write go ahead;
//! with `strict` set the handle is reported as unverifiable instead.

use crate::clients::{RecordFilter, RecordStore};
use crate::outcome::{Warning, WarningKind};
use crate::schema::{FieldKind, Schema};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Result of a duplicate lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Exists,
    /// Not found. Carries a warning when the lookup failed and absence was
    /// assumed.
    Absent(Option<Warning>),
    /// Lookup failed under the strict policy
    Unknown(Warning),
}

impl Presence {
    pub fn exists(&self) -> bool {
        matches!(self, Presence::Exists)
    }
}

pub struct DuplicateChecker {
    store: Arc<dyn RecordStore>,
    handle_field: String,
    handle_kind: FieldKind,
    strict: bool,
}

impl DuplicateChecker {
    pub fn new(store: Arc<dyn RecordStore>, schema: &Schema, strict: bool) -> Self {
        Self {
            store,
            handle_field: schema.handle_field().to_string(),
            handle_kind: schema.handle_kind(),
            strict,
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self, handle: &str) -> Presence {
        let filter = RecordFilter {
            property: self.handle_field.clone(),
            kind: self.handle_kind,
            equals: handle.to_string(),
        };

        match self.store.query(&filter, 1).await {
            Ok(ids) if !ids.is_empty() => {
                debug!(record_id = %ids[0], "Existing record found");
                Presence::Exists
            },
            Ok(_) => Presence::Absent(None),
            Err(e) => {
                warn!(handle, error = %e, strict = self.strict, "Duplicate check failed");
                let warning = Warning::new(WarningKind::DuplicateCheck, e.to_string())
                    .with_handle(handle)
                    .with_field(&self.handle_field);
                if self.strict {
                    Presence::Unknown(warning)
                } else {
                    Presence::Absent(Some(warning))
                }
            },
        }
    }

    /// `true` only when the store confirms an existing record
    pub async fn exists(&self, handle: &str) -> bool {
        self.check(handle).await.exists()
    }
}
