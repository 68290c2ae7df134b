//! Asset acquisition: dedup lookup, synchronous download, or background enqueue.

use tracing::{debug, info, instrument, warn};

use contentbridge_shared::{
    AssetConfig, AssetReference, ContentBridgeError, LocalAsset, ProcessingMode, QueueEntry,
    Result,
};
use contentbridge_storage::{
    AssetIndex, MediaLibrary, MetadataStore, QueueStore, Scheduler, meta_keys,
};

use crate::download::Downloader;

/// Name of the persisted background download queue.
pub const IMAGE_QUEUE: &str = "image_download_queue";

/// Name of the scheduled job that drains [`IMAGE_QUEUE`].
pub const QUEUE_JOB: &str = "process_image_queue";

/// Turns remote image URLs into local assets, at most once per origin.
pub struct AssetManager<'a, H> {
    host: &'a H,
    downloader: Downloader,
    config: AssetConfig,
}

impl<'a, H> AssetManager<'a, H>
where
    H: AssetIndex + MediaLibrary + MetadataStore + QueueStore + Scheduler,
{
    pub fn new(host: &'a H, config: AssetConfig) -> Result<Self> {
        let downloader = Downloader::new(&config)?;
        Ok(Self {
            host,
            downloader,
            config,
        })
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub(crate) fn host(&self) -> &'a H {
        self.host
    }

    /// Pick the processing mode for content embedding `image_count` images.
    pub fn select_mode(&self, image_count: usize) -> ProcessingMode {
        self.config
            .processing
            .select_mode(image_count, self.config.async_threshold)
    }

    /// Resolve one image reference.
    ///
    /// Never fails: an image that cannot be acquired degrades to its remote
    /// URL with state `Failed`.
    #[instrument(skip(self, alt_text))]
    pub async fn resolve(
        &self,
        origin_url: &str,
        alt_text: &str,
        mode: ProcessingMode,
    ) -> AssetReference {
        let reference = AssetReference::unresolved(origin_url, alt_text);

        if origin_url.trim().is_empty() {
            debug!("empty image URL");
            return reference.failed();
        }

        match self.host.find_by_origin(origin_url).await {
            Ok(Some(asset)) => {
                debug!(id = asset.id, "image already in library");
                return reference.resolved(&asset);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "asset index lookup failed");
                return reference.failed();
            }
        }

        match mode {
            ProcessingMode::Async => match self.enqueue(origin_url, alt_text).await {
                Ok(()) => reference.queued(),
                Err(e) => {
                    warn!(error = %e, "failed to queue image");
                    reference.failed()
                }
            },
            ProcessingMode::Sync => match self.download(origin_url, alt_text).await {
                Ok(asset) => reference.resolved(&asset),
                Err(e) => {
                    warn!(error = %e, "image download failed, keeping remote URL");
                    reference.failed()
                }
            },
        }
    }

    /// Local asset for `origin_url`, downloading it unless the index already has it.
    pub async fn acquire(&self, origin_url: &str, alt_text: &str) -> Result<LocalAsset> {
        if let Some(asset) = self.host.find_by_origin(origin_url).await? {
            return Ok(asset);
        }
        self.download(origin_url, alt_text).await
    }

    /// Download, ingest, index and tag one image.
    async fn download(&self, origin_url: &str, alt_text: &str) -> Result<LocalAsset> {
        let upload = self.downloader.fetch(origin_url).await?;
        let asset = self.host.ingest(&upload).await?;
        self.host.record_origin(origin_url, &asset).await?;

        self.host
            .set_meta(asset.id, meta_keys::ORIGINAL_URL, origin_url)
            .await?;
        self.host
            .set_meta(asset.id, meta_keys::FILE_NAME, &upload.file_name)
            .await?;
        let alt = alt_text.trim();
        if !alt.is_empty() {
            self.host.set_meta(asset.id, meta_keys::IMAGE_ALT, alt).await?;
        }

        info!(id = asset.id, url = %asset.url, "image ingested");
        Ok(asset)
    }

    /// Append to the background queue and make sure a run is pending.
    async fn enqueue(&self, origin_url: &str, alt_text: &str) -> Result<()> {
        if origin_url.is_empty() {
            return Err(ContentBridgeError::validation("cannot queue an empty URL"));
        }
        let mut queue = self.host.load_queue(IMAGE_QUEUE).await?;
        queue.push(QueueEntry::new(origin_url, alt_text));
        self.host.save_queue(IMAGE_QUEUE, &queue).await?;

        if self
            .host
            .try_schedule(QUEUE_JOB, self.config.initial_delay)
            .await?
        {
            debug!(delay = ?self.config.initial_delay, "queue run scheduled");
        }
        debug!(pending = queue.len(), "image queued");
        Ok(())
    }
}
