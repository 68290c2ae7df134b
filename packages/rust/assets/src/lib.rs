//! Asset acquisition for ContentBridge.
//!
//! Remote images referenced by imported content are downloaded into the host
//! media library once per origin URL. Small imports download inline
//! ([`AssetManager::resolve`] in sync mode); large ones append to a persisted
//! queue that [`QueueProcessor`] drains in batches.

mod download;
mod manager;
mod queue;

pub use download::{Downloader, file_name_for};
pub use manager::{AssetManager, IMAGE_QUEUE, QUEUE_JOB};
pub use queue::{QueueProcessor, QueueReport};
