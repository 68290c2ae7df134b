//! Shared types, error model, and configuration for ContentBridge.
//!
//! This crate is the foundation depended on by all other ContentBridge crates.
//! It provides:
//! - [`ContentBridgeError`]: the unified error type
//! - Domain types ([`AssetReference`], [`QueueEntry`], [`LinkPolicy`], [`ContentRecord`])
//! - Configuration ([`AppConfig`], [`AssetConfig`], [`ImportConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssetConfig, ImagesConfig, ImportConfig, ImportSection, SeoPlugin, SiteConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    state_dir,
};
pub use error::{ContentBridgeError, Result};
pub use types::{
    AssetReference, AssetState, ContentRecord, ImageProcessing, LinkPolicy, LocalAsset,
    ProcessingMode, QueueEntry, RecordId, RenderTarget,
};
