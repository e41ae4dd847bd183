//! Field schema for the target database
//!
//! A [`Schema`] names every spreadsheet column that is carried over and the
//! kind of database property it becomes. Columns the schema does not mention
//! are ignored. One field is designated as the handle (natural key) used for
//! duplicate detection.
//!
//! Schemas are either the built-in [`Schema::signup_form`] or loaded from a
//! JSON file:
//!
//! ```json
//! {
//!   "handle_field": "telegram",
//!   "fields": [
//!     { "name": "telegram", "kind": "short_text" },
//!     { "name": "photo", "kind": "file_reference", "display_name": "Photo" }
//!   ]
//! }
//! ```

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Kind of value a column converts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Boolean,
    DateTime,
    ShortText,
    LongText,
    Number,
    TaggedSet,
    SingleTag,
    PhoneNumber,
    FileReference,
    Title,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Boolean => "boolean",
            FieldKind::DateTime => "date_time",
            FieldKind::ShortText => "short_text",
            FieldKind::LongText => "long_text",
            FieldKind::Number => "number",
            FieldKind::TaggedSet => "tagged_set",
            FieldKind::SingleTag => "single_tag",
            FieldKind::PhoneNumber => "phone_number",
            FieldKind::FileReference => "file_reference",
            FieldKind::Title => "title",
        }
    }

    /// Kinds the store can filter on by exact string equality
    pub fn supports_equality_filter(self) -> bool {
        matches!(
            self,
            FieldKind::ShortText
                | FieldKind::LongText
                | FieldKind::Title
                | FieldKind::PhoneNumber
                | FieldKind::SingleTag
        )
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of the schema
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,

    /// Label for stored file references; falls back to `name`
    #[serde(default)]
    pub display_name: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    handle_field: String,
    fields: Vec<FieldSpec>,
}

impl TryFrom<SchemaFile> for Schema {
    type Error = SyncError;

    fn try_from(file: SchemaFile) -> Result<Self> {
        Schema::new(file.handle_field, file.fields)
    }
}

/// Validated, immutable field schema
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "SchemaFile")]
pub struct Schema {
    handle_field: String,
    handle_kind: FieldKind,
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Build a schema, checking that field names are unique and that the
    /// handle field exists with a kind the store can match exactly
    pub fn new(handle_field: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let handle_field = handle_field.into();

        if fields.is_empty() {
            return Err(SyncError::config("Schema must declare at least one field"));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(SyncError::config("Schema field names cannot be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SyncError::config(format!(
                    "Schema field '{}' is declared more than once",
                    field.name
                )));
            }
        }

        let handle_kind = fields
            .iter()
            .find(|f| f.name == handle_field)
            .map(|f| f.kind)
            .ok_or_else(|| {
                SyncError::config(format!(
                    "Handle field '{}' is not declared in the schema",
                    handle_field
                ))
            })?;

        if !handle_kind.supports_equality_filter() {
            return Err(SyncError::config(format!(
                "Handle field '{}' has kind {}, which cannot be matched exactly",
                handle_field, handle_kind
            )));
        }

        Ok(Self {
            handle_field,
            handle_kind,
            fields,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// The signup form this tool was first written for
    pub fn signup_form() -> Self {
        use FieldKind::*;

        let fields = vec![
            FieldSpec::new("picked?", Boolean),
            FieldSpec::new("time", DateTime),
            FieldSpec::new("first_name", ShortText),
            FieldSpec::new("last_name", ShortText),
            FieldSpec::new("age", Number),
            FieldSpec::new("height", Number),
            FieldSpec::new("weight", Number),
            FieldSpec::new("Размер одежды", ShortText),
            FieldSpec::new("Размер обуви", Number),
            FieldSpec::new("headshotUrl", FileReference).with_display_name("Headshot"),
            FieldSpec::new("bodyPhotoUrl", FileReference).with_display_name("Body Photo"),
            FieldSpec::new(
                "Удобное время для съемки 6 апреля (можно выбрать несколько)",
                TaggedSet,
            ),
            FieldSpec::new("Номер телефона для связи", PhoneNumber),
            FieldSpec::new(SIGNUP_HANDLE_FIELD, ShortText),
            FieldSpec::new("Информация о правах субъекта персональных данных", LongText),
            FieldSpec::new("Согласие субъекта персональных данных", LongText),
            FieldSpec::new("Уточните, пожалуйста, ваш статус", SingleTag),
            FieldSpec::new("Укажите ваш Instagram", ShortText),
        ];

        Self {
            handle_field: SIGNUP_HANDLE_FIELD.to_string(),
            handle_kind: ShortText,
            fields,
        }
    }

    pub fn handle_field(&self) -> &str {
        &self.handle_field
    }

    pub fn handle_kind(&self) -> FieldKind {
        self.handle_kind
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Handle column of the built-in signup form
pub const SIGNUP_HANDLE_FIELD: &str = "Ваш ник в Телеграм";
