//! Host storage for ContentBridge.
//!
//! The transform core talks to its host through the traits in [`host`]. Two
//! implementations live here:
//! - [`Storage`]: a libSQL database plus a content-addressed media directory,
//!   used by the CLI
//! - [`MemoryHost`]: everything in memory, used by tests and dry runs

// The host traits are consumed through generics, never as `dyn`.
#![allow(async_fn_in_trait)]

pub mod host;
mod memory;
mod migrations;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use contentbridge_shared::{
    ContentBridgeError, ContentRecord, LocalAsset, QueueEntry, RecordId, Result,
};

pub use host::{
    AssetIndex, ContentStore, Host, MediaLibrary, MediaUpload, MetadataStore, QueueStore,
    Scheduler, TemplateSource, meta_keys,
};
pub use memory::MemoryHost;

/// Database file name inside the state directory.
pub const DB_FILE_NAME: &str = "contentbridge.db";

/// Media directory name, next to the database file.
const MEDIA_DIR_NAME: &str = "media";

const DEFAULT_MEDIA_BASE_URL: &str = "http://localhost/media";

const KIND_CONTENT: &str = "content";
const KIND_MEDIA: &str = "media";

fn db_err(e: libsql::Error) -> ContentBridgeError {
    ContentBridgeError::Storage(e.to_string())
}

/// Primary host handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    media_dir: PathBuf,
    media_base_url: String,
}

impl Storage {
    /// Open or create a database at `path`. Media files go to `media/` beside it.
    pub async fn open(path: &Path) -> Result<Self> {
        let media_dir = match path.parent() {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| ContentBridgeError::io(parent, e))?;
                parent.join(MEDIA_DIR_NAME)
            }
            None => PathBuf::from(MEDIA_DIR_NAME),
        };

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            media_dir,
            media_base_url: DEFAULT_MEDIA_BASE_URL.to_string(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open `contentbridge.db` inside `state_dir`.
    pub async fn open_in(state_dir: &Path) -> Result<Self> {
        Self::open(&state_dir.join(DB_FILE_NAME)).await
    }

    /// Serve ingested media from `url`.
    pub fn with_media_base_url(mut self, url: impl Into<String>) -> Self {
        self.media_base_url = url.into();
        self
    }

    /// Directory ingested media is written to.
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ContentBridgeError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Run an `INSERT ... RETURNING id` statement.
    async fn insert_returning_id(
        &self,
        sql: &str,
        values: impl libsql::params::IntoParams,
    ) -> Result<RecordId> {
        let mut rows = self.conn.query(sql, values).await.map_err(db_err)?;
        let row = rows
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| ContentBridgeError::Storage("insert returned no id".into()))?;
        let id: i64 = row.get(0).map_err(db_err)?;
        Ok(id as RecordId)
    }
}

// ---------------------------------------------------------------------------
// Asset index
// ---------------------------------------------------------------------------

impl AssetIndex for Storage {
    async fn find_by_origin(&self, origin_url: &str) -> Result<Option<LocalAsset>> {
        let mut rows = self
            .conn
            .query(
                "SELECT asset_id, local_url FROM asset_index WHERE origin_url = ?1",
                params![origin_url],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(LocalAsset {
                id: row.get::<i64>(0).map_err(db_err)? as RecordId,
                url: row.get::<String>(1).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn record_origin(&self, origin_url: &str, asset: &LocalAsset) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO asset_index (origin_url, asset_id, local_url, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(origin_url) DO UPDATE SET
                   asset_id = excluded.asset_id,
                   local_url = excluded.local_url",
                params![origin_url, asset.id as i64, asset.url.as_str(), now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Media library
// ---------------------------------------------------------------------------

impl MediaLibrary for Storage {
    async fn ingest(&self, upload: &MediaUpload) -> Result<LocalAsset> {
        if upload.bytes.is_empty() {
            return Err(ContentBridgeError::asset(format!(
                "refusing to store empty file {}",
                upload.file_name
            )));
        }

        // Never let a file name escape the media directory.
        let file_name = Path::new(&upload.file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("file")
            .to_string();

        let hash = content_hash(&upload.bytes);
        let bucket = &hash[..16];
        let dir = self.media_dir.join(bucket);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ContentBridgeError::io(&dir, e))?;
        let path = dir.join(&file_name);
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| ContentBridgeError::io(&path, e))?;

        let url = host::media_url(&self.media_base_url, bucket, &file_name);
        let now = Utc::now().to_rfc3339();
        let id = self
            .insert_returning_id(
                "INSERT INTO records (kind, title, file_name, content_type, content_hash, url, created_at, updated_at)
                 VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?6)
                 RETURNING id",
                params![
                    KIND_MEDIA,
                    file_name.as_str(),
                    upload.content_type.as_deref(),
                    hash.as_str(),
                    url.as_str(),
                    now.as_str()
                ],
            )
            .await?;

        debug!(id, %url, bytes = upload.bytes.len(), "stored media file");
        Ok(LocalAsset { id, url })
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

impl MetadataStore for Storage {
    async fn set_meta(&self, record_id: RecordId, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO record_meta (record_id, meta_key, meta_value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(record_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                params![record_id as i64, key, value],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_meta(&self, record_id: RecordId, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT meta_value FROM record_meta WHERE record_id = ?1 AND meta_key = ?2",
                params![record_id as i64, key],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(db_err)?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue and scheduler
// ---------------------------------------------------------------------------

impl QueueStore for Storage {
    async fn load_queue(&self, name: &str) -> Result<Vec<QueueEntry>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM options WHERE name = ?1", params![name])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let json: String = row.get(0).map_err(db_err)?;
                Ok(serde_json::from_str(&json)?)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save_queue(&self, name: &str, entries: &[QueueEntry]) -> Result<()> {
        let json = serde_json::to_string(entries)?;
        self.conn
            .execute(
                "INSERT INTO options (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![name, json.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

impl Scheduler for Storage {
    async fn try_schedule(&self, job: &str, delay: Duration) -> Result<bool> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| ContentBridgeError::validation(format!("invalid delay: {e}")))?;
        let run_after = (Utc::now() + delay).to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO scheduled_jobs (job, run_after) VALUES (?1, ?2)",
                params![job, run_after.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    async fn scheduled_at(&self, job: &str) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_after FROM scheduled_jobs WHERE job = ?1",
                params![job],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let s: String = row.get(0).map_err(db_err)?;
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| Some(dt.with_timezone(&Utc)))
                    .map_err(|e| ContentBridgeError::Storage(format!("invalid date: {e}")))
            }
            None => Ok(None),
        }
    }

    async fn clear_schedule(&self, job: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM scheduled_jobs WHERE job = ?1", params![job])
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Content records
// ---------------------------------------------------------------------------

impl ContentStore for Storage {
    async fn insert_record(&self, title: &str, body: &str) -> Result<RecordId> {
        let now = Utc::now().to_rfc3339();
        self.insert_returning_id(
            "INSERT INTO records (kind, title, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             RETURNING id",
            params![KIND_CONTENT, title, body, now.as_str()],
        )
        .await
    }

    async fn get_record(&self, id: RecordId) -> Result<Option<ContentRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, body FROM records WHERE id = ?1 AND kind = ?2",
                params![id as i64, KIND_CONTENT],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_containing(&self, needle: &str) -> Result<Vec<ContentRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, body FROM records
                 WHERE kind = ?1 AND instr(body, ?2) > 0
                 ORDER BY id",
                params![KIND_CONTENT, needle],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    async fn update_body(&self, id: RecordId, body: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn
            .execute(
                "UPDATE records SET body = ?1, updated_at = ?2 WHERE id = ?3 AND kind = ?4",
                params![body, now.as_str(), id as i64, KIND_CONTENT],
            )
            .await
            .map_err(db_err)?;
        if updated == 0 {
            return Err(ContentBridgeError::storage(format!("no record with id {id}")));
        }
        Ok(())
    }
}

impl TemplateSource for Storage {
    async fn fetch_template(&self, id: RecordId) -> Result<Option<String>> {
        self.get_meta(id, meta_keys::BLOCK_DATA).await
    }
}

/// SHA-256 hex digest of `bytes`.
fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Convert a database row to a [`ContentRecord`].
fn row_to_record(row: &libsql::Row) -> Result<ContentRecord> {
    Ok(ContentRecord {
        id: row.get::<i64>(0).map_err(db_err)? as RecordId,
        title: row.get::<String>(1).unwrap_or_default(),
        body: row.get::<String>(2).map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let dir = std::env::temp_dir().join(format!("cbr_test_{}", Uuid::now_v7()));
        Storage::open_in(&dir)
            .await
            .expect("open test db")
            .with_media_base_url("https://site.test/media")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let dir = std::env::temp_dir().join(format!("cbr_test_{}", Uuid::now_v7()));
        let s1 = Storage::open_in(&dir).await.unwrap();
        drop(s1);
        let s2 = Storage::open_in(&dir).await.unwrap();
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn content_records() {
        let storage = test_storage().await;
        let a = storage
            .insert_record("First", r#"<img src="http://x/a.png">"#)
            .await
            .unwrap();
        let b = storage.insert_record("Second", "plain").await.unwrap();
        assert_ne!(a, b);

        let found = storage.find_containing("http://x/a.png").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "First");

        // Wildcards in the needle are literal.
        assert!(storage.find_containing("%").await.unwrap().is_empty());

        storage.update_body(a, "rewritten").await.unwrap();
        let record = storage.get_record(a).await.unwrap().unwrap();
        assert_eq!(record.body, "rewritten");
        assert!(storage.update_body(9999, "x").await.is_err());
    }

    #[tokio::test]
    async fn media_ingest_and_index() {
        let storage = test_storage().await;
        let upload = MediaUpload {
            file_name: "../../etc/photo.png".into(),
            content_type: Some("image/png".into()),
            bytes: b"not really a png".to_vec(),
        };
        let asset = storage.ingest(&upload).await.unwrap();
        assert!(asset.url.starts_with("https://site.test/media/"));
        assert!(asset.url.ends_with("/photo.png"));

        let hash = content_hash(&upload.bytes);
        let stored = storage.media_dir().join(&hash[..16]).join("photo.png");
        assert_eq!(std::fs::read(stored).unwrap(), upload.bytes);

        // Media ids are not content records.
        assert!(storage.get_record(asset.id).await.unwrap().is_none());

        assert!(storage.find_by_origin("http://x/photo.png").await.unwrap().is_none());
        storage.record_origin("http://x/photo.png", &asset).await.unwrap();
        assert_eq!(
            storage.find_by_origin("http://x/photo.png").await.unwrap(),
            Some(asset)
        );
    }

    #[tokio::test]
    async fn metadata_upserts() {
        let storage = test_storage().await;
        let id = storage.insert_record("t", "b").await.unwrap();
        assert!(storage.get_meta(id, "k").await.unwrap().is_none());
        storage.set_meta(id, "k", "v1").await.unwrap();
        storage.set_meta(id, "k", "v2").await.unwrap();
        assert_eq!(storage.get_meta(id, "k").await.unwrap().as_deref(), Some("v2"));

        storage.set_meta(id, meta_keys::BLOCK_DATA, "[{}]").await.unwrap();
        assert_eq!(storage.fetch_template(id).await.unwrap().as_deref(), Some("[{}]"));
    }

    #[tokio::test]
    async fn queue_roundtrip() {
        let storage = test_storage().await;
        assert!(storage.load_queue("images").await.unwrap().is_empty());

        let entries = vec![
            QueueEntry::new("http://x/1.png", "one"),
            QueueEntry::new("http://x/2.png", ""),
        ];
        storage.save_queue("images", &entries).await.unwrap();
        assert_eq!(storage.load_queue("images").await.unwrap(), entries);

        storage.save_queue("images", &[]).await.unwrap();
        assert!(storage.load_queue("images").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduler_is_idempotent() {
        let storage = test_storage().await;
        assert!(storage.try_schedule("job", Duration::from_secs(5)).await.unwrap());
        assert!(!storage.try_schedule("job", Duration::from_secs(1)).await.unwrap());

        let at = storage.scheduled_at("job").await.unwrap().expect("pending");
        assert!(at > Utc::now());

        storage.clear_schedule("job").await.unwrap();
        assert!(storage.scheduled_at("job").await.unwrap().is_none());
    }
}
