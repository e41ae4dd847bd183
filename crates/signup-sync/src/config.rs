//! Configuration management
//!
//! Every setting comes from the environment (a `.env` file is loaded first by
//! the binary) with the defaults below. Service configs are loaded separately
//! so that, for example, a dry run over a CSV export needs no API tokens.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use signup_common::env;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Pipeline Defaults
// ============================================================================

/// Rows processed per resolve → publish → write cycle.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Simultaneous image downloads and record writes across the whole run.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Pause between batches, keeping the store under its request rate limit.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;

/// Timeout for a single image download.
pub const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 30;

/// Timeout for API calls to the store, the content host and the sheet.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Directory in the content repository that images are committed under.
pub const DEFAULT_IMAGE_PREFIX: &str = "images";

// ============================================================================
// Service Defaults
// ============================================================================

pub const DEFAULT_SHEET_RANGE: &str = "test!A1:Z";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_RAW_BASE: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_GITHUB_BRANCH: &str = "main";

/// Batching, concurrency and failure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub batch_delay_ms: u64,
    pub image_timeout_secs: u64,
    pub image_prefix: String,

    /// Treat a failed duplicate query as a failed record instead of writing anyway
    pub strict_duplicate_check: bool,

    /// Treat a failed image-block append as a failed record
    pub strict_content_append: bool,

    /// Map and validate only; nothing is downloaded, published or written
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            batch_delay_ms: DEFAULT_BATCH_DELAY_MS,
            image_timeout_secs: DEFAULT_IMAGE_TIMEOUT_SECS,
            image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            strict_duplicate_check: false,
            strict_content_append: false,
            dry_run: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            batch_size: env::parse_or("SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            max_concurrency: env::parse_or("SYNC_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)?,
            batch_delay_ms: env::parse_or("SYNC_BATCH_DELAY_MS", DEFAULT_BATCH_DELAY_MS)?,
            image_timeout_secs: env::parse_or(
                "SYNC_IMAGE_TIMEOUT_SECS",
                DEFAULT_IMAGE_TIMEOUT_SECS,
            )?,
            image_prefix: env::var_or("SYNC_IMAGE_PREFIX", DEFAULT_IMAGE_PREFIX),
            strict_duplicate_check: env::flag("SYNC_STRICT_DUPLICATE_CHECK", false)?,
            strict_content_append: env::flag("SYNC_STRICT_CONTENT_APPEND", false)?,
            dry_run: env::flag("SYNC_DRY_RUN", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::config("SYNC_BATCH_SIZE must be greater than 0"));
        }
        if self.max_concurrency == 0 {
            return Err(SyncError::config("SYNC_MAX_CONCURRENCY must be greater than 0"));
        }
        if self.image_timeout_secs == 0 {
            return Err(SyncError::config("SYNC_IMAGE_TIMEOUT_SECS must be greater than 0"));
        }
        let prefix = self.image_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.split('/').any(|s| s.is_empty() || s == "..") {
            return Err(SyncError::config(format!(
                "SYNC_IMAGE_PREFIX '{}' is not a valid repository path",
                self.image_prefix
            )));
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

/// Target database (Notion)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_base: String,
    pub version: String,
    pub timeout_secs: u64,
}

impl NotionConfig {
    pub fn new(token: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            database_id: database_id.into(),
            api_base: DEFAULT_NOTION_API_BASE.to_string(),
            version: DEFAULT_NOTION_VERSION.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            token: env::required("NOTION_TOKEN")?,
            database_id: env::required("DATABASE_ID")?,
            api_base: env::var_or("NOTION_API_BASE", DEFAULT_NOTION_API_BASE),
            version: env::var_or("NOTION_VERSION", DEFAULT_NOTION_VERSION),
            timeout_secs: env::parse_or("SYNC_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Image repository (GitHub)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_base: String,
    pub raw_base: String,
    pub timeout_secs: u64,
}

impl GitHubConfig {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: DEFAULT_GITHUB_BRANCH.to_string(),
            api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            raw_base: DEFAULT_GITHUB_RAW_BASE.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            token: env::required("GITHUB_TOKEN")?,
            owner: env::required("GITHUB_OWNER")?,
            repo: env::required("GITHUB_REPO")?,
            branch: env::var_or("GITHUB_BRANCH", DEFAULT_GITHUB_BRANCH),
            api_base: env::var_or("GITHUB_API_BASE", DEFAULT_GITHUB_API_BASE),
            raw_base: env::var_or("GITHUB_RAW_BASE", DEFAULT_GITHUB_RAW_BASE),
            timeout_secs: env::parse_or("SYNC_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Spreadsheet source (Google Sheets values API)
///
/// The access token is obtained outside this tool, e.g. with
/// `gcloud auth print-access-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub access_token: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            range: DEFAULT_SHEET_RANGE.to_string(),
            access_token: access_token.into(),
            api_base: DEFAULT_SHEETS_API_BASE.to_string(),
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            spreadsheet_id: env::required("SPREADSHEET_ID")?,
            range: env::var_or("SHEET_RANGE", DEFAULT_SHEET_RANGE),
            access_token: env::required("GOOGLE_ACCESS_TOKEN")?,
            api_base: env::var_or("SHEETS_API_BASE", DEFAULT_SHEETS_API_BASE),
            timeout_secs: env::parse_or("SYNC_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level settings that do not belong to a single service
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub pipeline: PipelineConfig,
    pub schema_path: Option<PathBuf>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            pipeline: PipelineConfig::from_env()?,
            schema_path: env::optional("SYNC_SCHEMA_PATH").map(PathBuf::from),
        })
    }
}
