//! Core domain types shared by the transform passes and the host adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an asset or content record in the host store.
pub type RecordId = u64;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// A library asset that already lives on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAsset {
    /// Host-side identifier.
    pub id: RecordId,
    /// Public URL the host serves the asset from.
    pub url: String,
}

/// Lifecycle of an [`AssetReference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetState {
    /// Not looked at yet.
    Unresolved,
    /// Handed to the background queue; content keeps the remote URL for now.
    Queued,
    /// Backed by a local asset.
    Resolved,
    /// Could not be downloaded or ingested; content keeps the remote URL.
    Failed,
}

/// An image reference found in inbound content and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    /// Remote address as it appeared in the content (the dedup key).
    pub origin_url: String,
    /// Host asset id once resolved.
    pub local_id: Option<RecordId>,
    /// Host URL once resolved.
    pub local_url: Option<String>,
    /// Alt text carried by the first `<img>` that referenced the origin.
    pub alt_text: String,
    pub state: AssetState,
}

impl AssetReference {
    /// A fresh reference that has not been looked up yet.
    pub fn unresolved(origin_url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self {
            origin_url: origin_url.into(),
            local_id: None,
            local_url: None,
            alt_text: alt_text.into(),
            state: AssetState::Unresolved,
        }
    }

    /// Mark as backed by `asset`.
    pub fn resolved(mut self, asset: &LocalAsset) -> Self {
        self.local_id = Some(asset.id);
        self.local_url = Some(asset.url.clone());
        self.state = AssetState::Resolved;
        self
    }

    /// Mark as queued for the background pass.
    pub fn queued(mut self) -> Self {
        self.state = AssetState::Queued;
        self
    }

    /// Mark as failed; the remote URL stays in use.
    pub fn failed(mut self) -> Self {
        self.state = AssetState::Failed;
        self
    }

    /// URL to put in rendered content: the local one when resolved, otherwise the origin.
    pub fn effective_url(&self) -> &str {
        self.local_url.as_deref().unwrap_or(&self.origin_url)
    }

    pub fn is_resolved(&self) -> bool {
        self.state == AssetState::Resolved
    }
}

/// An entry in the persisted background download queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Remote image address.
    pub origin_url: String,
    /// Alt text to tag the asset with once ingested.
    pub alt_text: String,
    /// When the entry was appended.
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(origin_url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self {
            origin_url: origin_url.into(),
            alt_text: alt_text.into(),
            enqueued_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Image processing mode
// ---------------------------------------------------------------------------

/// Configured image acquisition policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageProcessing {
    /// Pick per pass based on how many images the content embeds.
    #[default]
    Auto,
    /// Always download while the request waits.
    Sync,
    /// Always defer downloads to the background queue.
    Async,
}

/// The mode a single transform pass runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingMode {
    Sync,
    Async,
}

impl ImageProcessing {
    /// Resolve the policy for content embedding `image_count` images.
    ///
    /// In automatic mode, `image_count >= threshold` selects asynchronous processing.
    pub fn select_mode(self, image_count: usize, threshold: usize) -> ProcessingMode {
        match self {
            Self::Sync => ProcessingMode::Sync,
            Self::Async => ProcessingMode::Async,
            Self::Auto if image_count >= threshold => ProcessingMode::Async,
            Self::Auto => ProcessingMode::Sync,
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => f.write_str("sync"),
            Self::Async => f.write_str("async"),
        }
    }
}

// ---------------------------------------------------------------------------
// Link policy
// ---------------------------------------------------------------------------

/// How anchors are rewritten during import.
///
/// An empty `*_rel` list means "not configured": existing `rel` attributes are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPolicy {
    #[serde(default)]
    pub internal_rel: Vec<String>,
    #[serde(default = "default_internal_target")]
    pub internal_target: String,
    #[serde(default)]
    pub external_rel: Vec<String>,
    #[serde(default = "default_external_target")]
    pub external_target: String,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            internal_rel: Vec::new(),
            internal_target: default_internal_target(),
            external_rel: Vec::new(),
            external_target: default_external_target(),
        }
    }
}

fn default_internal_target() -> String {
    "_self".into()
}
fn default_external_target() -> String {
    "_blank".into()
}

// ---------------------------------------------------------------------------
// Content records
// ---------------------------------------------------------------------------

/// A stored rich-text content record on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    pub body: String,
}

/// Output format produced by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderTarget {
    /// Normalized flat HTML for a simple rich-text store.
    #[default]
    Flat,
    /// Nested JSON block document (container → widgets).
    BlockTree,
}

impl std::str::FromStr for RenderTarget {
    type Err = crate::ContentBridgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "block-tree" => Ok(Self::BlockTree),
            other => Err(crate::ContentBridgeError::config(format!(
                "unknown render target '{other}' (expected flat or block-tree)"
            ))),
        }
    }
}
