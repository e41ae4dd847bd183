//! External collaborators
//!
//! The pipeline talks to four services through the traits below. Each HTTP
//! implementation lives in its own module; tests substitute in-memory fakes.
//!
//! | Trait | Implementation |
//! |---|---|
//! | [`SheetSource`] | [`sheets::SheetsClient`], [`csv_source::CsvSource`] |
//! | [`RecordStore`] | [`notion::NotionClient`] |
//! | [`ContentHost`] | [`github::GitHubClient`] |
//! | [`LinkFetcher`] | [`http_fetcher::HttpFetcher`] |

pub mod csv_source;
pub mod github;
pub mod http_fetcher;
pub mod notion;
pub mod sheets;

use crate::error::{Result, SyncError};
use crate::mapper::{Property, Row};
use crate::schema::FieldKind;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use csv_source::CsvSource;
pub use github::GitHubClient;
pub use http_fetcher::HttpFetcher;
pub use notion::NotionClient;
pub use sheets::SheetsClient;

/// Header row plus data rows, as text cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SheetData {
    /// Split a values grid whose first line is the header row
    pub fn from_grid(mut grid: Vec<Vec<String>>) -> Self {
        if grid.is_empty() {
            return Self::default();
        }
        let headers = grid.remove(0);
        Self {
            headers,
            rows: grid,
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        let headers = self.headers;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, cells)| Row::from_cells(i, &headers, cells))
            .collect()
    }
}

#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch(&self) -> Result<SheetData>;
}

/// Exact-match filter on one property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub property: String,
    pub kind: FieldKind,
    pub equals: String,
}

/// Content appended to a record body after creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    Image { url: String },
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Ids of records matching `filter`, at most `page_size` of them
    async fn query(&self, filter: &RecordFilter, page_size: u32) -> Result<Vec<String>>;

    /// Create a record and return its id
    async fn create_record(&self, properties: &[Property]) -> Result<String>;

    async fn append_content(&self, record_id: &str, blocks: &[ContentBlock]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob_sha: String,
}

/// Git-style object storage bound to one branch
#[async_trait]
pub trait ContentHost: Send + Sync {
    /// Commit sha the branch currently points at
    async fn get_branch_tip(&self) -> Result<String>;

    /// Tree sha of a commit
    async fn get_commit_tree(&self, commit_sha: &str) -> Result<String>;

    async fn create_blob(&self, content: &[u8]) -> Result<String>;

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String>;

    async fn create_commit(&self, message: &str, tree_sha: &str, parent_sha: &str)
        -> Result<String>;

    /// Move the branch to `commit_sha`; must fail rather than force if the
    /// branch has moved since `get_branch_tip`
    async fn update_ref(&self, commit_sha: &str) -> Result<()>;

    /// URL a published file at `path` will be served from
    fn public_url(&self, path: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait LinkFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedFile>;
}

/// Stand-in for a service a dry run never calls, so no credentials are
/// needed for it. Every call fails.
pub struct Disabled(pub &'static str);

impl Disabled {
    fn refuse<T>(&self) -> Result<T> {
        Err(SyncError::config(format!("{} is disabled for this run", self.0)))
    }
}

#[async_trait]
impl RecordStore for Disabled {
    async fn query(&self, _: &RecordFilter, _: u32) -> Result<Vec<String>> {
        self.refuse()
    }
    async fn create_record(&self, _: &[Property]) -> Result<String> {
        self.refuse()
    }
    async fn append_content(&self, _: &str, _: &[ContentBlock]) -> Result<()> {
        self.refuse()
    }
}

#[async_trait]
impl ContentHost for Disabled {
    async fn get_branch_tip(&self) -> Result<String> {
        self.refuse()
    }
    async fn get_commit_tree(&self, _: &str) -> Result<String> {
        self.refuse()
    }
    async fn create_blob(&self, _: &[u8]) -> Result<String> {
        self.refuse()
    }
    async fn create_tree(&self, _: &str, _: &[TreeEntry]) -> Result<String> {
        self.refuse()
    }
    async fn create_commit(&self, _: &str, _: &str, _: &str) -> Result<String> {
        self.refuse()
    }
    async fn update_ref(&self, _: &str) -> Result<()> {
        self.refuse()
    }
    fn public_url(&self, path: &str) -> String {
        path.to_string()
    }
}

#[async_trait]
impl LinkFetcher for Disabled {
    async fn get(&self, _: &str) -> Result<FetchedFile> {
        self.refuse()
    }
}

/// Turn a non-2xx response into [`SyncError::Api`], keeping the body for the
/// error detail
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::api(service, status.as_u16(), truncate(&body, 500)))
}

/// Check status and decode a JSON body
pub(crate) async fn decode<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let response = check_status(service, response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| SyncError::unexpected(service, e))
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_data_from_grid() {
        let grid = vec![
            vec!["tg".to_string(), "age".to_string()],
            vec!["@a".to_string(), "20".to_string()],
            vec!["@b".to_string()],
        ];
        let rows = SheetData::from_grid(grid).into_rows();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("age"), Some("20"));
        assert_eq!(rows[1].index(), 1);
        assert_eq!(rows[1].get("age"), None);
    }

    #[test]
    fn test_empty_grid() {
        let data = SheetData::from_grid(Vec::new());
        assert!(data.headers.is_empty());
        assert!(data.into_rows().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_refuses() {
        let store = Disabled("record store");
        let err = store.create_record(&[]).await.unwrap_err();
        assert!(err.to_string().contains("record store is disabled"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("абвгд", 3), "абв…");
    }
}
