//! Local CSV export as a sheet source
//!
//! Lets a run work from `File → Download → CSV` without Sheets credentials.
//! The first line is the header row; ragged rows are accepted.

use super::{SheetData, SheetSource};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, instrument};

pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SheetSource for CsvSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&self) -> Result<SheetData> {
        let content = tokio::fs::read(&self.path).await?;
        let data = parse_csv(&content)?;
        info!(
            columns = data.headers.len(),
            rows = data.rows.len(),
            "Read CSV export"
        );
        Ok(data)
    }
}

fn parse_csv(content: &[u8]) -> Result<SheetData> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content);

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(SheetData::from_grid(grid))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_reads_headers_and_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Ваш ник в Телеграм,Возраст,Комментарий").unwrap();
        writeln!(file, "@anna,23,\"likes, commas\"").unwrap();
        writeln!(file, "@boris,31").unwrap();

        let data = CsvSource::new(file.path()).fetch().await.unwrap();
        assert_eq!(data.headers.len(), 3);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0][2], "likes, commas");

        let rows = data.into_rows();
        assert_eq!(rows[1].get("Возраст"), Some("31"));
        assert_eq!(rows[1].get("Комментарий"), None);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = CsvSource::new("/nonexistent/export.csv").fetch().await;
        assert!(matches!(result, Err(crate::error::SyncError::Io(_))));
    }

    #[test]
    fn test_empty_export() {
        let data = parse_csv(b"").unwrap();
        assert!(data.headers.is_empty());
        assert!(data.rows.is_empty());
    }
}
