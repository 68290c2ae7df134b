//! Host collaborator interfaces.
//!
//! The transform core never reaches for global state: everything it persists
//! or looks up goes through these traits, implemented by [`crate::Storage`]
//! (libSQL) and [`crate::MemoryHost`] (tests, dry runs).

use std::time::Duration;

use chrono::{DateTime, Utc};
use contentbridge_shared::{ContentRecord, LocalAsset, QueueEntry, RecordId, Result};

/// Metadata keys written by the asset and import layers.
pub mod meta_keys {
    /// Remote address an ingested asset was downloaded from.
    pub const ORIGINAL_URL: &str = "_contentbridge_original_url";
    /// File name an ingested asset was stored under.
    pub const FILE_NAME: &str = "_contentbridge_file_name";
    /// Alt text of an ingested image.
    pub const IMAGE_ALT: &str = "_contentbridge_image_alt";
    /// Serialized block-tree document of a record.
    pub const BLOCK_DATA: &str = "_contentbridge_block_data";
    /// Unix milliseconds of the last import or export of a record.
    pub const LAST_UPDATE: &str = "_contentbridge_last_update";
    /// `import` or `export`, matching [`LAST_UPDATE`].
    pub const LAST_UPDATE_DIRECTION: &str = "_contentbridge_last_update_direction";
}

/// Downloaded bytes handed to the media library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Persisted origin URL → local asset index.
pub trait AssetIndex {
    async fn find_by_origin(&self, origin_url: &str) -> Result<Option<LocalAsset>>;

    async fn record_origin(&self, origin_url: &str, asset: &LocalAsset) -> Result<()>;
}

/// Where downloaded media ends up.
pub trait MediaLibrary {
    /// Store `upload` and return the new asset.
    async fn ingest(&self, upload: &MediaUpload) -> Result<LocalAsset>;
}

/// Key/value metadata scoped to a record (content or media).
pub trait MetadataStore {
    async fn set_meta(&self, record_id: RecordId, key: &str, value: &str) -> Result<()>;

    async fn get_meta(&self, record_id: RecordId, key: &str) -> Result<Option<String>>;
}

/// Named persisted lists of download queue entries.
pub trait QueueStore {
    /// Entries of queue `name`, oldest first. A missing queue is empty.
    async fn load_queue(&self, name: &str) -> Result<Vec<QueueEntry>>;

    async fn save_queue(&self, name: &str, entries: &[QueueEntry]) -> Result<()>;
}

/// One-shot named jobs, run by the host at least `delay` from now.
pub trait Scheduler {
    /// Request `job` to run after `delay`. Returns `false` if it is already pending.
    async fn try_schedule(&self, job: &str, delay: Duration) -> Result<bool>;

    /// When `job` is due, if pending.
    async fn scheduled_at(&self, job: &str) -> Result<Option<DateTime<Utc>>>;

    /// Drop a pending `job` (the runner claims it before running).
    async fn clear_schedule(&self, job: &str) -> Result<()>;
}

/// Rich-text content records.
pub trait ContentStore {
    async fn insert_record(&self, title: &str, body: &str) -> Result<RecordId>;

    async fn get_record(&self, id: RecordId) -> Result<Option<ContentRecord>>;

    /// Records whose body contains `needle` literally.
    async fn find_containing(&self, needle: &str) -> Result<Vec<ContentRecord>>;

    async fn update_body(&self, id: RecordId, body: &str) -> Result<()>;
}

/// Source of style template documents.
pub trait TemplateSource {
    /// The block-tree document JSON stored for `id`, if any.
    async fn fetch_template(&self, id: RecordId) -> Result<Option<String>>;
}

/// Everything a full import/queue run needs from the host.
pub trait Host:
    AssetIndex + MediaLibrary + MetadataStore + QueueStore + Scheduler + ContentStore + TemplateSource
{
}

impl<T> Host for T where
    T: AssetIndex
        + MediaLibrary
        + MetadataStore
        + QueueStore
        + Scheduler
        + ContentStore
        + TemplateSource
{
}

/// Build the public URL for a stored media file.
pub(crate) fn media_url(base_url: &str, dir: &str, file_name: &str) -> String {
    format!("{}/{dir}/{file_name}", base_url.trim_end_matches('/'))
}
