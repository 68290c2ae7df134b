//! Application configuration for ContentBridge.
//!
//! User config lives at `~/.contentbridge/contentbridge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ContentBridgeError, Result};
use crate::types::{ImageProcessing, LinkPolicy, RecordId, RenderTarget};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contentbridge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contentbridge";

// ---------------------------------------------------------------------------
// Config structs (matching contentbridge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site identity.
    #[serde(default)]
    pub site: SiteConfig,

    /// Anchor rewriting policy.
    #[serde(default)]
    pub links: LinkPolicy,

    /// Image acquisition settings.
    #[serde(default)]
    pub images: ImagesConfig,

    /// Import behaviour.
    #[serde(default)]
    pub import: ImportSection,

    /// Local state for the libSQL host.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Canonical site origin used to tell internal links from external ones.
    #[serde(default)]
    pub canonical_origin: String,
}

/// `[images]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// `auto`, `sync` or `async`.
    #[serde(default)]
    pub mode: ImageProcessing,

    /// Image count at which automatic mode switches to the background queue.
    #[serde(default = "default_async_threshold")]
    pub async_threshold: usize,

    /// Queue entries handled per background run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay before the first background run after something is queued.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Delay before the next background run when entries remain.
    #[serde(default = "default_reschedule_delay")]
    pub reschedule_delay_secs: u64,

    /// Timeout for a single image download.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Allow downloads from loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            mode: ImageProcessing::Auto,
            async_threshold: default_async_threshold(),
            batch_size: default_batch_size(),
            initial_delay_secs: default_initial_delay(),
            reschedule_delay_secs: default_reschedule_delay(),
            download_timeout_secs: default_download_timeout(),
            allow_private_hosts: false,
        }
    }
}

fn default_async_threshold() -> usize {
    8
}
fn default_batch_size() -> usize {
    3
}
fn default_initial_delay() -> u64 {
    5
}
fn default_reschedule_delay() -> u64 {
    1
}
fn default_download_timeout() -> u64 {
    30
}

/// Which SEO plugin receives imported meta title/description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeoPlugin {
    /// Let the host decide; the core falls back to native keys.
    #[default]
    Auto,
    Yoast,
    Aioseo,
    RankMath,
    Native,
}

/// `[import]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSection {
    /// `flat` or `block-tree`.
    #[serde(default)]
    pub target: RenderTarget,

    /// Host id of a block-tree document to borrow widget styling from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_template_id: Option<RecordId>,

    /// Remove the `<h1>` used as the record title from the body.
    #[serde(default)]
    pub strip_title_heading: bool,

    /// Where SEO metadata goes.
    #[serde(default)]
    pub seo_plugin: SeoPlugin,
}

impl Default for ImportSection {
    fn default() -> Self {
        Self {
            target: RenderTarget::Flat,
            style_template_id: None,
            strip_title_heading: false,
            seo_plugin: SeoPlugin::Auto,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the libSQL host state (defaults to `~/.contentbridge/state`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,

    /// Public base URL media files are served from.
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            media_base_url: default_media_base_url(),
        }
    }
}

fn default_media_base_url() -> String {
    "http://localhost/media".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime settings for the Asset Acquisition Manager and queue processor.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub processing: ImageProcessing,
    pub async_threshold: usize,
    pub batch_size: usize,
    pub initial_delay: Duration,
    pub reschedule_delay: Duration,
    pub download_timeout: Duration,
    pub allow_private_hosts: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AssetConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            processing: config.images.mode,
            async_threshold: config.images.async_threshold,
            batch_size: config.images.batch_size.max(1),
            initial_delay: Duration::from_secs(config.images.initial_delay_secs),
            reschedule_delay: Duration::from_secs(config.images.reschedule_delay_secs),
            download_timeout: Duration::from_secs(config.images.download_timeout_secs),
            allow_private_hosts: config.images.allow_private_hosts,
        }
    }
}

/// Runtime settings for one import pipeline.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub target: RenderTarget,
    pub canonical_origin: String,
    pub links: LinkPolicy,
    pub style_template_id: Option<RecordId>,
    pub strip_title_heading: bool,
    pub seo_plugin: SeoPlugin,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ImportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            target: config.import.target,
            canonical_origin: config.site.canonical_origin.clone(),
            links: config.links.clone(),
            style_template_id: config.import.style_template_id,
            strip_title_heading: config.import.strip_title_heading,
            seo_plugin: config.import.seo_plugin,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contentbridge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContentBridgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contentbridge/contentbridge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the state directory: explicit config value, else `~/.contentbridge/state`.
pub fn state_dir(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.state_dir {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(config_dir()?.join("state")),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContentBridgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ContentBridgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContentBridgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContentBridgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContentBridgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessingMode;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("async_threshold"));
        assert!(toml_str.contains("external_target"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.images.async_threshold, 8);
        assert_eq!(parsed.images.batch_size, 3);
        assert_eq!(parsed.links.external_target, "_blank");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[site]
canonical_origin = "https://blog.example.com/"

[links]
external_rel = ["nofollow", "noopener"]

[images]
mode = "async"

[import]
target = "block-tree"
style_template_id = 42
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.site.canonical_origin, "https://blog.example.com/");
        assert_eq!(config.links.external_rel, vec!["nofollow", "noopener"]);
        assert_eq!(config.links.internal_target, "_self");
        assert_eq!(config.images.mode, ImageProcessing::Async);
        assert_eq!(config.images.batch_size, 3);
        assert_eq!(config.import.target, RenderTarget::BlockTree);
        assert_eq!(config.import.style_template_id, Some(42));
        assert!(!config.import.strip_title_heading);
    }

    #[test]
    fn asset_config_from_app_config() {
        let app = AppConfig::default();
        let assets = AssetConfig::from(&app);
        assert_eq!(assets.batch_size, 3);
        assert_eq!(assets.reschedule_delay, Duration::from_secs(1));
        assert_eq!(assets.initial_delay, Duration::from_secs(5));
        assert_eq!(
            assets.processing.select_mode(8, assets.async_threshold),
            ProcessingMode::Async
        );
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let mut app = AppConfig::default();
        app.images.batch_size = 0;
        assert_eq!(AssetConfig::from(&app).batch_size, 1);
    }

    #[test]
    fn unknown_image_mode_is_rejected() {
        let result: std::result::Result<AppConfig, _> = toml::from_str("[images]\nmode = \"lazy\"");
        assert!(result.is_err());
    }
}
