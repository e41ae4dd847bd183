//! In-memory collaborators for pipeline tests
//!
//! Every fake writes to a shared [`Journal`] so tests can assert on the order
//! of calls across services, and the fetcher and store report to a shared
//! [`Meter`] so tests can check how many calls were in flight at once.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use signup_sync::clients::{
    ContentBlock, ContentHost, FetchedFile, LinkFetcher, RecordFilter, RecordStore, SheetData,
    SheetSource, TreeEntry,
};
use signup_sync::config::PipelineConfig;
use signup_sync::mapper::{Property, PropertyValue};
use signup_sync::schema::{FieldKind, FieldSpec, Schema};
use signup_sync::{BatchOrchestrator, Collaborators, SyncError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const HANDLE: &str = "tg";
pub const PHOTO: &str = "photo";

/// Drive file id for row `n`; long enough for the resolver's id pattern
pub fn file_id(n: usize) -> String {
    format!("1FileIdForSignupRowNumber{:04}", n)
}

pub fn share_link(n: usize) -> String {
    format!("https://drive.google.com/file/d/{}/view?usp=sharing", file_id(n))
}

pub fn download_url(n: usize) -> String {
    format!("https://drive.google.com/uc?export=view&id={}", file_id(n))
}

pub fn schema() -> Schema {
    Schema::new(
        HANDLE,
        vec![
            FieldSpec::new(HANDLE, FieldKind::ShortText),
            FieldSpec::new("age", FieldKind::Number),
            FieldSpec::new(PHOTO, FieldKind::FileReference).with_display_name("Photo"),
        ],
    )
    .unwrap()
}

/// `n` rows `@user{i}`, each linking image `i`
pub fn sheet(n: usize) -> SheetData {
    SheetData {
        headers: vec![HANDLE.into(), "age".into(), PHOTO.into()],
        rows: (0..n)
            .map(|i| vec![format!("@user{}", i), "20".into(), share_link(i)])
            .collect(),
    }
}

/// Config with no inter-batch delay unless a test sets one
pub fn config() -> PipelineConfig {
    PipelineConfig {
        batch_delay_ms: 0,
        ..PipelineConfig::default()
    }
}

// ============================================================================
// Journal / Meter
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub at: Instant,
    pub call: String,
}

#[derive(Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(Event {
            at: Instant::now(),
            call: call.into(),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.call).collect()
    }

    /// Index of the first call starting with `prefix`
    pub fn first(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    /// Index of the last call starting with `prefix`
    pub fn last(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().rposition(|c| c.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[derive(Default)]
pub struct Meter {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Meter {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Fakes
// ============================================================================

pub struct FakeSource {
    data: Option<SheetData>,
}

impl FakeSource {
    pub fn new(data: SheetData) -> Self {
        Self { data: Some(data) }
    }

    pub fn unavailable() -> Self {
        Self { data: None }
    }
}

#[async_trait]
impl SheetSource for FakeSource {
    async fn fetch(&self) -> signup_sync::Result<SheetData> {
        self.data
            .clone()
            .ok_or_else(|| SyncError::api("Google Sheets", 403, "permission denied"))
    }
}

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub properties: Vec<Property>,
    pub blocks: Vec<ContentBlock>,
}

impl StoredRecord {
    pub fn text(&self, name: &str) -> Option<String> {
        self.properties.iter().find(|p| p.name == name).and_then(|p| match p.value {
            PropertyValue::RichText(ref segments) => Some(segments.concat()),
            PropertyValue::Title(ref t) => Some(t.clone()),
            PropertyValue::PhoneNumber(ref p) => Some(p.clone()),
            _ => None,
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub journal: Journal,
    pub meter: Arc<Meter>,
    pub latency: Duration,
    pub fail_query: bool,
    pub fail_append: bool,
    pub fail_create_for: HashSet<String>,
    pub records: Mutex<Vec<StoredRecord>>,
}

impl FakeStore {
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn record(&self, handle: &str) -> Option<StoredRecord> {
        self.records()
            .into_iter()
            .find(|r| r.text(HANDLE).as_deref() == Some(handle))
    }

    async fn busy(&self) {
        self.meter.enter();
        tokio::time::sleep(self.latency).await;
        self.meter.leave();
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn query(&self, filter: &RecordFilter, page_size: u32) -> signup_sync::Result<Vec<String>> {
        self.journal.record(format!("query {}", filter.equals));
        self.busy().await;
        if self.fail_query {
            return Err(SyncError::api("Notion", 503, "service unavailable"));
        }
        Ok(self
            .records()
            .into_iter()
            .filter(|r| r.text(&filter.property).as_deref() == Some(filter.equals.as_str()))
            .take(page_size as usize)
            .map(|r| r.id)
            .collect())
    }

    async fn create_record(&self, properties: &[Property]) -> signup_sync::Result<String> {
        let handle = properties
            .iter()
            .find(|p| p.name == HANDLE)
            .and_then(|p| match p.value {
                PropertyValue::RichText(ref s) => Some(s.concat()),
                _ => None,
            })
            .unwrap_or_default();
        self.journal.record(format!("create {}", handle));
        self.busy().await;

        if self.fail_create_for.contains(&handle) {
            return Err(SyncError::api("Notion", 400, "validation_error"));
        }

        let mut records = self.records.lock().unwrap();
        let id = format!("page-{}", records.len() + 1);
        records.push(StoredRecord {
            id: id.clone(),
            properties: properties.to_vec(),
            blocks: Vec::new(),
        });
        Ok(id)
    }

    async fn append_content(
        &self,
        record_id: &str,
        blocks: &[ContentBlock],
    ) -> signup_sync::Result<()> {
        self.journal.record(format!("append {}", record_id));
        self.busy().await;
        if self.fail_append {
            return Err(SyncError::api("Notion", 500, "internal_server_error"));
        }
        let mut records = self.records.lock().unwrap();
        if let Some(r) = records.iter_mut().find(|r| r.id == record_id) {
            r.blocks.extend_from_slice(blocks);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeHost {
    pub journal: Journal,
    pub fail_update_ref: bool,
    pub commits: AtomicUsize,
    pub pending: Mutex<HashMap<String, Vec<u8>>>,
    pub published: Mutex<HashMap<String, Vec<u8>>>,
    pub messages: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn published(&self) -> HashMap<String, Vec<u8>> {
        self.published.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentHost for FakeHost {
    async fn get_branch_tip(&self) -> signup_sync::Result<String> {
        self.journal.record("host tip");
        Ok(format!("commit-{}", self.commits.load(Ordering::SeqCst)))
    }

    async fn get_commit_tree(&self, commit_sha: &str) -> signup_sync::Result<String> {
        self.journal.record("host tree-of");
        Ok(format!("tree-of-{}", commit_sha))
    }

    async fn create_blob(&self, content: &[u8]) -> signup_sync::Result<String> {
        self.journal.record("host blob");
        let sha = format!("blob-{}", self.pending.lock().unwrap().len());
        self.pending.lock().unwrap().insert(sha.clone(), content.to_vec());
        Ok(sha)
    }

    async fn create_tree(
        &self,
        _base_tree: &str,
        entries: &[TreeEntry],
    ) -> signup_sync::Result<String> {
        self.journal.record("host tree");
        let mut pending = self.pending.lock().unwrap();
        let mut staged = HashMap::new();
        for e in entries {
            if let Some(bytes) = pending.remove(&e.blob_sha) {
                staged.insert(e.path.clone(), bytes);
            }
        }
        *pending = staged;
        Ok("tree-new".into())
    }

    async fn create_commit(
        &self,
        message: &str,
        _tree_sha: &str,
        _parent_sha: &str,
    ) -> signup_sync::Result<String> {
        self.journal.record("host commit");
        self.messages.lock().unwrap().push(message.to_string());
        Ok("commit-new".into())
    }

    async fn update_ref(&self, _commit_sha: &str) -> signup_sync::Result<()> {
        self.journal.record("host update-ref");
        if self.fail_update_ref {
            self.pending.lock().unwrap().clear();
            return Err(SyncError::api("GitHub", 422, "Update is not a fast forward"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        let staged: Vec<_> = self.pending.lock().unwrap().drain().collect();
        self.published.lock().unwrap().extend(staged);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://raw.example/{}", path)
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub journal: Journal,
    pub meter: Arc<Meter>,
    pub latency: Duration,
    pub files: HashMap<String, Vec<u8>>,
}

impl FakeFetcher {
    /// Serves a small JPEG for every row in `rows` except those in `missing`
    pub fn serving(rows: usize, missing: &[usize]) -> Self {
        let files = (0..rows)
            .filter(|i| !missing.contains(i))
            .map(|i| (download_url(i), vec![0xFF, 0xD8, 0xFF, 0xE0, i as u8]))
            .collect();
        Self {
            files,
            ..Default::default()
        }
    }
}

#[async_trait]
impl LinkFetcher for FakeFetcher {
    async fn get(&self, url: &str) -> signup_sync::Result<FetchedFile> {
        self.journal.record(format!("fetch {}", url));
        self.meter.enter();
        tokio::time::sleep(self.latency).await;
        self.meter.leave();
        self.files
            .get(url)
            .map(|bytes| FetchedFile {
                bytes: bytes.clone(),
                content_type: Some("image/jpeg".into()),
            })
            .ok_or_else(|| SyncError::api("image host", 404, "not found"))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One set of fakes sharing a journal and a meter
pub struct Harness {
    pub journal: Journal,
    pub meter: Arc<Meter>,
    pub store: Arc<FakeStore>,
    pub host: Arc<FakeHost>,
    pub fetcher: Arc<FakeFetcher>,
}

impl Harness {
    pub fn new(store: FakeStore, host: FakeHost, fetcher: FakeFetcher) -> Self {
        let journal = Journal::default();
        let meter = Arc::new(Meter::default());
        Self {
            store: Arc::new(FakeStore {
                journal: journal.clone(),
                meter: meter.clone(),
                ..store
            }),
            host: Arc::new(FakeHost {
                journal: journal.clone(),
                ..host
            }),
            fetcher: Arc::new(FakeFetcher {
                journal: journal.clone(),
                meter: meter.clone(),
                ..fetcher
            }),
            journal,
            meter,
        }
    }

    /// Harness serving every image of an `n`-row sheet
    pub fn serving(rows: usize) -> Self {
        Self::new(
            FakeStore::default(),
            FakeHost::default(),
            FakeFetcher::serving(rows, &[]),
        )
    }

    pub fn orchestrator(&self, data: SheetData, config: PipelineConfig) -> BatchOrchestrator {
        self.orchestrator_with(Arc::new(FakeSource::new(data)), config)
    }

    pub fn orchestrator_with(
        &self,
        source: Arc<dyn SheetSource>,
        config: PipelineConfig,
    ) -> BatchOrchestrator {
        self.orchestrator_for(schema(), source, config)
    }

    pub fn orchestrator_for(
        &self,
        schema: Schema,
        source: Arc<dyn SheetSource>,
        config: PipelineConfig,
    ) -> BatchOrchestrator {
        let deps = Collaborators {
            source,
            store: self.store.clone(),
            host: self.host.clone(),
            fetcher: self.fetcher.clone(),
        };
        BatchOrchestrator::new(deps, schema, config).unwrap()
    }
}
