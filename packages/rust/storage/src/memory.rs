//! In-memory host, used by tests and `--dry-run`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use contentbridge_shared::{
    ContentBridgeError, ContentRecord, LocalAsset, QueueEntry, RecordId, Result,
};

use crate::host::{
    AssetIndex, ContentStore, MediaLibrary, MediaUpload, MetadataStore, QueueStore, Scheduler,
    TemplateSource, media_url, meta_keys,
};

const DEFAULT_MEDIA_BASE_URL: &str = "http://localhost/media";

/// A host that keeps everything in process memory.
pub struct MemoryHost {
    media_base_url: String,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: RecordId,
    asset_index: HashMap<String, LocalAsset>,
    media: BTreeMap<RecordId, MediaUpload>,
    meta: HashMap<(RecordId, String), String>,
    queues: HashMap<String, Vec<QueueEntry>>,
    schedules: HashMap<String, DateTime<Utc>>,
    records: BTreeMap<RecordId, ContentRecord>,
}

impl MemoryState {
    /// Content and media share one id sequence.
    fn next_id(&mut self) -> RecordId {
        self.last_id += 1;
        self.last_id
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            media_base_url: DEFAULT_MEDIA_BASE_URL.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Serve ingested media from `url`.
    pub fn with_media_base_url(mut self, url: impl Into<String>) -> Self {
        self.media_base_url = url.into();
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of media files ingested so far.
    pub fn media_count(&self) -> usize {
        self.lock().media.len()
    }

    /// Bytes of an ingested media file.
    pub fn media_bytes(&self, id: RecordId) -> Option<Vec<u8>> {
        self.lock().media.get(&id).map(|m| m.bytes.clone())
    }
}

impl AssetIndex for MemoryHost {
    async fn find_by_origin(&self, origin_url: &str) -> Result<Option<LocalAsset>> {
        Ok(self.lock().asset_index.get(origin_url).cloned())
    }

    async fn record_origin(&self, origin_url: &str, asset: &LocalAsset) -> Result<()> {
        self.lock()
            .asset_index
            .insert(origin_url.to_string(), asset.clone());
        Ok(())
    }
}

impl MediaLibrary for MemoryHost {
    async fn ingest(&self, upload: &MediaUpload) -> Result<LocalAsset> {
        if upload.bytes.is_empty() {
            return Err(ContentBridgeError::asset(format!(
                "refusing to store empty file {}",
                upload.file_name
            )));
        }
        let mut state = self.lock();
        let id = state.next_id();
        state.media.insert(id, upload.clone());
        Ok(LocalAsset {
            id,
            url: media_url(&self.media_base_url, &id.to_string(), &upload.file_name),
        })
    }
}

impl MetadataStore for MemoryHost {
    async fn set_meta(&self, record_id: RecordId, key: &str, value: &str) -> Result<()> {
        self.lock()
            .meta
            .insert((record_id, key.to_string()), value.to_string());
        Ok(())
    }

    async fn get_meta(&self, record_id: RecordId, key: &str) -> Result<Option<String>> {
        Ok(self.lock().meta.get(&(record_id, key.to_string())).cloned())
    }
}

impl QueueStore for MemoryHost {
    async fn load_queue(&self, name: &str) -> Result<Vec<QueueEntry>> {
        Ok(self.lock().queues.get(name).cloned().unwrap_or_default())
    }

    async fn save_queue(&self, name: &str, entries: &[QueueEntry]) -> Result<()> {
        self.lock().queues.insert(name.to_string(), entries.to_vec());
        Ok(())
    }
}

impl Scheduler for MemoryHost {
    async fn try_schedule(&self, job: &str, delay: Duration) -> Result<bool> {
        let mut state = self.lock();
        if state.schedules.contains_key(job) {
            return Ok(false);
        }
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| ContentBridgeError::validation(format!("invalid delay: {e}")))?;
        state.schedules.insert(job.to_string(), Utc::now() + delay);
        Ok(true)
    }

    async fn scheduled_at(&self, job: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.lock().schedules.get(job).copied())
    }

    async fn clear_schedule(&self, job: &str) -> Result<()> {
        self.lock().schedules.remove(job);
        Ok(())
    }
}

impl ContentStore for MemoryHost {
    async fn insert_record(&self, title: &str, body: &str) -> Result<RecordId> {
        let mut state = self.lock();
        let id = state.next_id();
        state.records.insert(
            id,
            ContentRecord {
                id,
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        Ok(id)
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<ContentRecord>> {
        Ok(self.lock().records.get(&id).cloned())
    }

    async fn find_containing(&self, needle: &str) -> Result<Vec<ContentRecord>> {
        Ok(self
            .lock()
            .records
            .values()
            .filter(|r| r.body.contains(needle))
            .cloned()
            .collect())
    }

    async fn update_body(&self, id: RecordId, body: &str) -> Result<()> {
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(&id)
            .ok_or_else(|| ContentBridgeError::storage(format!("no record with id {id}")))?;
        record.body = body.to_string();
        Ok(())
    }
}

impl TemplateSource for MemoryHost {
    async fn fetch_template(&self, id: RecordId) -> Result<Option<String>> {
        self.get_meta(id, meta_keys::BLOCK_DATA).await
    }
}
