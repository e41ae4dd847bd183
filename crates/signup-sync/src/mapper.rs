//! Row to record conversion
//!
//! [`map_row`] turns one spreadsheet row into a [`MappedRecord`] according
//! to a [`Schema`]. Conversion is per field: a malformed value produces a
//! mapping warning and the field is left out, while the rest of the row is
//! still mapped. Only a blank or unconvertible handle rejects the whole row.
//!
//! File-reference columns are not resolved here; each one is queued on the
//! record as an [`ImageTask`] for the image resolver.

use crate::outcome::{Warning, WarningKind};
use crate::schema::{FieldKind, FieldSpec, Schema};
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashSet;

/// Maximum characters in one stored text segment
pub const TEXT_SEGMENT_LIMIT: usize = 2000;

/// One data row, cells keyed by column header in sheet order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    index: usize,
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new(index: usize, cells: Vec<(String, String)>) -> Self {
        Self { index, cells }
    }

    /// Pair headers with cell values. Rows shorter than the header row are
    /// common in sheet exports; the trailing columns are simply absent.
    pub fn from_cells(index: usize, headers: &[String], values: &[String]) -> Self {
        let cells = headers
            .iter()
            .zip(values.iter())
            .map(|(h, v)| (h.clone(), v.clone()))
            .collect();
        Self { index, cells }
    }

    /// Position of the row in the source, starting at 0 for the first data row
    pub fn index(&self) -> usize {
        self.index
    }

    /// Line number as shown in the sheet, where the header is line 1
    pub fn line(&self) -> usize {
        self.index + 2
    }

    /// Cell under `header`; the first column wins if a header repeats
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }
}

/// Typed property value, independent of the store's wire format
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Checkbox(bool),
    /// `YYYY-MM-DDTHH:MM`
    Date(String),
    /// Text split into store-sized segments
    RichText(Vec<String>),
    Title(String),
    Number(f64),
    MultiSelect(Vec<String>),
    Select(String),
    PhoneNumber(String),
    Files(Vec<ExternalFile>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFile {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Batch-local key tying an [`ImageTask`] to its published URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(row_index: usize, field: &str) -> Self {
        Self(format!("{}:{}", row_index, field))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image column waiting to be downloaded and published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    pub logical_id: LogicalId,
    pub handle: String,
    pub field: String,
    /// Name the stored file reference is given
    pub label: String,
    pub link: String,
}

/// A row after conversion, ready for the record writer
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub handle: String,
    pub row_index: usize,
    pub properties: Vec<Property>,
    pub images: Vec<ImageTask>,
}

impl MappedRecord {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Map one row. Returns `None` for the record when the handle is blank or
/// does not convert under its kind; the warnings then contain a single
/// [`WarningKind::MissingKey`].
pub fn map_row(row: &Row, schema: &Schema) -> (Option<MappedRecord>, Vec<Warning>) {
    let raw_handle = row
        .get(schema.handle_field())
        .map(str::trim)
        .unwrap_or_default();

    let key = match natural_key(schema.handle_kind(), raw_handle) {
        Ok(key) => key,
        Err(reason) => {
            let warning = Warning::new(
                WarningKind::MissingKey,
                format!(
                    "sheet row {} has no usable value in '{}': {}",
                    row.line(),
                    schema.handle_field(),
                    reason
                ),
            )
            .with_row(row.index())
            .with_field(schema.handle_field());
            return (None, vec![warning]);
        },
    };
    let handle = key.as_str();

    let mut warnings = Vec::new();
    let mut record = MappedRecord {
        handle: handle.to_string(),
        row_index: row.index(),
        properties: Vec::new(),
        images: Vec::new(),
    };

    for spec in schema.fields() {
        let Some(raw) = row.get(&spec.name).filter(|v| !v.trim().is_empty()) else {
            continue;
        };

        // Stored as the key so the next run's duplicate query matches exactly
        let raw = if spec.name == schema.handle_field() {
            handle
        } else {
            raw
        };

        if spec.kind == FieldKind::FileReference {
            record.images.push(image_task(row.index(), handle, spec, raw));
            continue;
        }

        match convert(spec.kind, raw) {
            Ok(Some(value)) => record.properties.push(Property::new(spec.name.clone(), value)),
            Ok(None) => {},
            Err(reason) => warnings.push(
                Warning::new(WarningKind::Mapping, reason)
                    .with_handle(handle)
                    .with_row(row.index())
                    .with_field(&spec.name),
            ),
        }
    }

    (Some(record), warnings)
}

/// The handle in the form it is stored and queried in
fn natural_key(kind: FieldKind, raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("the cell is blank".to_string());
    }
    match kind {
        FieldKind::PhoneNumber => normalize_phone(raw),
        _ => Ok(raw.to_string()),
    }
}

fn image_task(row_index: usize, handle: &str, spec: &FieldSpec, link: &str) -> ImageTask {
    ImageTask {
        logical_id: LogicalId::new(row_index, &spec.name),
        handle: handle.to_string(),
        field: spec.name.clone(),
        label: spec.label().to_string(),
        link: link.trim().to_string(),
    }
}

/// Convert a non-empty cell. `Ok(None)` means the value carried nothing to
/// store (a tag list of only commas, for instance).
fn convert(kind: FieldKind, raw: &str) -> Result<Option<PropertyValue>, String> {
    let value = match kind {
        FieldKind::Boolean => PropertyValue::Checkbox(parse_boolean(raw)),
        FieldKind::DateTime => PropertyValue::Date(parse_date_time(raw)?),
        FieldKind::Number => PropertyValue::Number(parse_number(raw)?),
        FieldKind::TaggedSet => {
            let tags = split_tags(raw);
            if tags.is_empty() {
                return Ok(None);
            }
            PropertyValue::MultiSelect(tags)
        },
        FieldKind::SingleTag => PropertyValue::Select(raw.to_string()),
        FieldKind::ShortText => PropertyValue::RichText(vec![raw.to_string()]),
        FieldKind::LongText => PropertyValue::RichText(segment_text(raw, TEXT_SEGMENT_LIMIT)),
        FieldKind::Title => PropertyValue::Title(raw.to_string()),
        FieldKind::PhoneNumber => PropertyValue::PhoneNumber(normalize_phone(raw)?),
        FieldKind::FileReference => return Ok(None),
    };
    Ok(Some(value))
}

pub fn parse_boolean(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// Normalise a sheet timestamp to `YYYY-MM-DDTHH:MM`
///
/// Accepted date layouts are `D.M.YYYY`, `D/M/YYYY` and `YYYY-M-D`. The time
/// part is optional (`00:00`); seconds are accepted and dropped. Hours are
/// padded on the left and minutes on the right, so `9:5` becomes `09:50`.
pub fn parse_date_time(raw: &str) -> Result<String, String> {
    let mut parts = raw.split_whitespace();
    let date = parts.next().ok_or_else(|| "empty date".to_string())?;
    let time = parts.next();
    if parts.next().is_some() {
        return Err(format!("unexpected trailing text in date '{}'", raw));
    }

    let (year, month, day) = if date.contains('-') {
        let [y, m, d] = split_exact(date, &['-'])
            .ok_or_else(|| format!("expected YYYY-MM-DD, got '{}'", date))?;
        (y, m, d)
    } else {
        let [d, m, y] = split_exact(date, &['.', '/'])
            .ok_or_else(|| format!("expected DD.MM.YYYY or DD/MM/YYYY, got '{}'", date))?;
        (y, m, d)
    };

    let year = digits(year, 4, 4).ok_or_else(|| format!("invalid year in '{}'", date))?;
    let month = digits(month, 1, 2).ok_or_else(|| format!("invalid month in '{}'", date))?;
    let day = digits(day, 1, 2).ok_or_else(|| format!("invalid day in '{}'", date))?;

    NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| format!("'{}' is not a calendar date", date))?;

    let (hour, minute) = match time {
        Some(time) => parse_time(time)?,
        None => (0, 0),
    };

    Ok(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}",
        year, month, day, hour, minute
    ))
}

fn parse_time(time: &str) -> Result<(u32, u32), String> {
    let mut parts = time.split(':');
    let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
        return Err(format!("expected HH:MM, got '{}'", time));
    };
    if let Some(seconds) = parts.next() {
        digits(seconds, 1, 2).ok_or_else(|| format!("invalid seconds in '{}'", time))?;
    }
    if parts.next().is_some() {
        return Err(format!("expected HH:MM, got '{}'", time));
    }

    let hour = digits(h, 1, 2).ok_or_else(|| format!("invalid hour in '{}'", time))?;
    let minute = digits(m, 1, 2).ok_or_else(|| format!("invalid minute in '{}'", time))?;
    let minute = if m.len() == 1 { minute * 10 } else { minute };

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| format!("'{}' is not a time of day", time))?;

    Ok((hour, minute))
}

fn split_exact<'a>(s: &'a str, separators: &[char]) -> Option<[&'a str; 3]> {
    let mut parts = s.split(|c| separators.contains(&c));
    let out = [parts.next()?, parts.next()?, parts.next()?];
    parts.next().is_none().then_some(out)
}

fn digits(s: &str, min_len: usize, max_len: usize) -> Option<u32> {
    if s.len() < min_len || s.len() > max_len || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn parse_number(raw: &str) -> Result<f64, String> {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(format!("'{}' is not a number", raw.trim())),
    }
}

/// Comma-separated tags, trimmed, blanks and repeats dropped
pub fn split_tags(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

/// Keep digits and `+`
pub fn normalize_phone(raw: &str) -> Result<String, String> {
    let phone: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if phone.is_empty() {
        return Err(format!("'{}' contains no phone digits", raw.trim()));
    }
    Ok(phone)
}

fn segment_text(raw: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    chars
        .chunks(limit)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn schema() -> Schema {
        Schema::new(
            "tg",
            vec![
                FieldSpec::new("tg", FieldKind::ShortText),
                FieldSpec::new("picked?", FieldKind::Boolean),
                FieldSpec::new("time", FieldKind::DateTime),
                FieldSpec::new("age", FieldKind::Number),
                FieldSpec::new("slots", FieldKind::TaggedSet),
                FieldSpec::new("status", FieldKind::SingleTag),
                FieldSpec::new("phone", FieldKind::PhoneNumber),
                FieldSpec::new("bio", FieldKind::LongText),
                FieldSpec::new("photo", FieldKind::FileReference).with_display_name("Photo"),
            ],
        )
        .unwrap()
    }

    fn row(cells: &[(&str, &str)]) -> Row {
        Row::new(
            3,
            cells
                .iter()
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_date_dotted_with_time() {
        assert_eq!(parse_date_time("06.04.2025 14:30").unwrap(), "2025-04-06T14:30");
    }

    #[test]
    fn test_date_iso_pads_hour_and_minute() {
        assert_eq!(parse_date_time("2025-04-06 9:5").unwrap(), "2025-04-06T09:50");
        assert_eq!(parse_date_time("6.4.2025 9:5").unwrap(), "2025-04-06T09:50");
    }

    #[test]
    fn test_date_defaults_and_variants() {
        assert_eq!(parse_date_time("6/4/2025").unwrap(), "2025-04-06T00:00");
        assert_eq!(parse_date_time("2025-4-6").unwrap(), "2025-04-06T00:00");
        assert_eq!(parse_date_time("06.04.2025 14:30:59").unwrap(), "2025-04-06T14:30");
    }

    #[test]
    fn test_date_rejects_malformed() {
        assert!(parse_date_time("31.02.2025").is_err());
        assert!(parse_date_time("2025.04").is_err());
        assert!(parse_date_time("06.04.25").is_err());
        assert!(parse_date_time("06.04.2025 25:00").is_err());
        assert!(parse_date_time("06.04.2025 14:30 extra").is_err());
        assert!(parse_date_time("tomorrow").is_err());
    }

    #[test]
    fn test_tags_trimmed_and_deduplicated() {
        assert_eq!(split_tags("red, blue ,green"), vec!["red", "blue", "green"]);
        assert_eq!(split_tags("a,,b, ,a"), vec!["a", "b"]);
        assert!(split_tags(" , ").is_empty());
    }

    #[test]
    fn test_phone_and_number() {
        assert_eq!(normalize_phone("+7 (912) 345-67-89").unwrap(), "+79123456789");
        assert!(normalize_phone("n/a").is_err());
        assert_eq!(parse_number(" 42.5 ").unwrap(), 42.5);
        assert!(parse_number("tall").is_err());
        assert!(parse_number("NaN").is_err());
    }

    #[test]
    fn test_boolean() {
        assert!(parse_boolean("TRUE"));
        assert!(parse_boolean("true"));
        assert!(!parse_boolean("yes"));
        assert!(!parse_boolean("1"));
    }

    #[test]
    fn test_map_row_full() {
        let (record, warnings) = map_row(
            &row(&[
                ("tg", "  @anna "),
                ("picked?", "True"),
                ("time", "06.04.2025 14:30"),
                ("age", "23"),
                ("slots", "10:00, 12:00 ,"),
                ("status", "Model"),
                ("phone", "8 912 000"),
                ("photo", "https://drive.google.com/file/d/abc/view"),
                ("ignored column", "whatever"),
            ]),
            &schema(),
        );
        let record = record.unwrap();

        assert!(warnings.is_empty());
        assert_eq!(record.handle, "@anna");
        assert_eq!(
            record.property("tg"),
            Some(&PropertyValue::RichText(vec!["@anna".to_string()]))
        );
        assert_eq!(record.property("picked?"), Some(&PropertyValue::Checkbox(true)));
        assert_eq!(
            record.property("time"),
            Some(&PropertyValue::Date("2025-04-06T14:30".to_string()))
        );
        assert_eq!(record.property("age"), Some(&PropertyValue::Number(23.0)));
        assert_eq!(
            record.property("slots"),
            Some(&PropertyValue::MultiSelect(vec![
                "10:00".to_string(),
                "12:00".to_string()
            ]))
        );
        assert_eq!(
            record.property("status"),
            Some(&PropertyValue::Select("Model".to_string()))
        );
        assert_eq!(
            record.property("phone"),
            Some(&PropertyValue::PhoneNumber("8912000".to_string()))
        );
        assert_eq!(record.property("photo"), None);

        assert_eq!(record.images.len(), 1);
        let task = &record.images[0];
        assert_eq!(task.logical_id, LogicalId::new(3, "photo"));
        assert_eq!(task.label, "Photo");
        assert_eq!(task.handle, "@anna");
    }

    #[test]
    fn test_map_row_blank_handle_rejected() {
        let (record, warnings) = map_row(&row(&[("tg", "   "), ("age", "30")]), &schema());
        assert!(record.is_none());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::MissingKey);
        assert_eq!(warnings[0].row, Some(3));
    }

    #[test]
    fn test_map_row_blank_handle_message_quotes_sheet_line() {
        let (_, warnings) = map_row(&row(&[("tg", "")]), &schema());
        assert_eq!(
            warnings[0].message,
            "sheet row 5 has no usable value in 'tg': the cell is blank"
        );
    }

    fn phone_schema() -> Schema {
        Schema::new(
            "phone",
            vec![
                FieldSpec::new("phone", FieldKind::PhoneNumber),
                FieldSpec::new("age", FieldKind::Number),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_phone_handle_keyed_by_stored_form() {
        let (record, warnings) = map_row(
            &row(&[("phone", " +7 (912) 345-67-89 "), ("age", "30")]),
            &phone_schema(),
        );
        let record = record.unwrap();

        assert!(warnings.is_empty());
        assert_eq!(record.handle, "+79123456789");
        assert_eq!(
            record.property("phone"),
            Some(&PropertyValue::PhoneNumber(record.handle.clone()))
        );
    }

    #[test]
    fn test_phone_handle_without_digits_rejected() {
        let (record, warnings) =
            map_row(&row(&[("phone", "n/a"), ("age", "30")]), &phone_schema());
        assert!(record.is_none());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::MissingKey);
        assert_eq!(warnings[0].field.as_deref(), Some("phone"));
    }

    #[test]
    fn test_map_row_bad_field_keeps_record() {
        let (record, warnings) = map_row(
            &row(&[("tg", "@bob"), ("age", "old"), ("time", "soon"), ("status", "x")]),
            &schema(),
        );
        let record = record.unwrap();

        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.kind == WarningKind::Mapping));
        assert!(warnings.iter().all(|w| w.handle.as_deref() == Some("@bob")));
        assert_eq!(record.property("age"), None);
        assert_eq!(record.property("time"), None);
        assert!(record.property("status").is_some());
    }

    #[test]
    fn test_long_text_segmented() {
        let bio = "я".repeat(TEXT_SEGMENT_LIMIT + 5);
        let (record, _) = map_row(&row(&[("tg", "@c"), ("bio", &bio)]), &schema());
        match record.unwrap().property("bio") {
            Some(PropertyValue::RichText(segments)) => {
                assert_eq!(segments.len(), 2);
                assert_eq!(segments[0].chars().count(), TEXT_SEGMENT_LIMIT);
                assert_eq!(segments[1].chars().count(), 5);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_row_from_short_cells() {
        let headers = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let row = Row::from_cells(0, &headers, &["1".to_string()]);
        assert_eq!(row.get("a"), Some("1"));
        assert_eq!(row.get("b"), None);
    }
}
