//! Image resolution
//!
//! Turns a share link from the sheet into image bytes plus the repository
//! path the bytes will be committed under. A link is reduced to its Drive
//! file id and fetched from the direct-download endpoint. Failures never
//! escape: each one becomes a [`WarningKind::Resolution`] and the image is
//! left off its record. There are no retries.

use crate::clients::LinkFetcher;
use crate::error::{Result, SyncError};
use crate::mapper::{ImageTask, LogicalId};
use crate::outcome::{Warning, WarningKind};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const DIRECT_DOWNLOAD_BASE: &str = "https://drive.google.com/uc?export=view&id=";

/// Drive file ids are long runs of word characters and dashes
const FILE_ID_PATTERN: &str = r"[-A-Za-z0-9_]{25,}";

/// Downloaded image ready for the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub logical_id: LogicalId,
    pub handle: String,
    pub field: String,
    pub label: String,
    /// Repository path, relative to the branch root
    pub path: String,
    pub bytes: Vec<u8>,
}

pub struct ImageResolver {
    fetcher: Arc<dyn LinkFetcher>,
    file_id: Regex,
    prefix: String,
    timeout: Duration,
}

impl ImageResolver {
    pub fn new(fetcher: Arc<dyn LinkFetcher>, prefix: &str, timeout: Duration) -> Result<Self> {
        let file_id = Regex::new(FILE_ID_PATTERN)
            .map_err(|e| SyncError::config(format!("invalid file id pattern: {}", e)))?;

        Ok(Self {
            fetcher,
            file_id,
            prefix: prefix.trim_matches('/').to_string(),
            timeout,
        })
    }

    /// Direct-download URL for a share link, if it carries a file id
    pub fn canonical_url(&self, link: &str) -> Option<String> {
        self.file_id
            .find(link)
            .map(|m| format!("{}{}", DIRECT_DOWNLOAD_BASE, m.as_str()))
    }

    #[instrument(skip(self, task), fields(handle = %task.handle, field = %task.field))]
    pub async fn resolve(&self, task: &ImageTask) -> std::result::Result<ResolvedImage, Warning> {
        let fail = |message: String| {
            warn!(handle = %task.handle, field = %task.field, error = %message, "Image not resolved");
            Warning::new(WarningKind::Resolution, message)
                .with_handle(&task.handle)
                .with_field(&task.field)
        };

        let url = self
            .canonical_url(&task.link)
            .ok_or_else(|| fail(format!("no file id in link '{}'", task.link)))?;

        let file = match tokio::time::timeout(self.timeout, self.fetcher.get(&url)).await {
            Ok(Ok(file)) => file,
            Ok(Err(e)) => return Err(fail(e.to_string())),
            Err(_) => {
                return Err(fail(format!(
                    "download timed out after {}s",
                    self.timeout.as_secs()
                )))
            },
        };

        if file.bytes.is_empty() {
            return Err(fail("download returned no data".to_string()));
        }

        let ext = sniff_extension(&file.bytes, file.content_type.as_deref());
        let path = self.target_path(&task.handle, &task.field, ext);
        debug!(%path, bytes = file.bytes.len(), "Image resolved");

        Ok(ResolvedImage {
            logical_id: task.logical_id.clone(),
            handle: task.handle.clone(),
            field: task.field.clone(),
            label: task.label.clone(),
            path,
            bytes: file.bytes,
        })
    }

    /// `{prefix}/{handle}/{field}-{uuid8}.{ext}`; the random suffix keeps a
    /// re-submitted row from overwriting an earlier upload
    fn target_path(&self, handle: &str, field: &str, ext: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}/{}/{}-{}.{}",
            self.prefix,
            slug(handle, "unknown"),
            slug(field, "image"),
            &suffix[..8],
            ext
        )
    }
}

/// Lowercase ASCII slug with single dashes between words
pub fn slug(value: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if c == '_' || c == '.' {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// File extension from magic bytes, then the declared content type
pub fn sniff_extension(bytes: &[u8], content_type: Option<&str>) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "jpg";
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "png";
    }
    if bytes.starts_with(b"GIF8") {
        return "gif";
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return "webp";
    }
    match content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim()) {
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        _ => "jpg",
    }
}
