//! End-to-end import: HTML fragment → resolved images → rewritten links → target format.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use contentbridge_assets::AssetManager;
use contentbridge_dom::{Fragment, parse_fragment, rewrite_links, unwrap_list_paragraphs};
use contentbridge_render::{
    BlockTreeRenderer, ResolvedImages, StyleTemplate, document_to_json, render_flat,
};
use contentbridge_shared::{
    AssetConfig, AssetReference, ContentBridgeError, ImportConfig, ProcessingMode, RecordId,
    RenderTarget, Result,
};
use contentbridge_storage::{Host, meta_keys};

use crate::oplog::{self, Operation};
use crate::sanitize::{encode_emoji, extract_title};
use crate::seo;

/// One piece of inbound content.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    /// The HTML fragment.
    pub html: String,
    /// Explicit record title; the first `<h1>` is used when absent or empty.
    pub title: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
}

impl ImportRequest {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }
}

/// Result of one import pass.
#[derive(Debug, Clone)]
pub struct ImportOutput {
    /// Record title, emoji-encoded.
    pub title: String,
    /// Flat HTML body. Always produced; it is what a host stores as the record body.
    pub body: String,
    /// Block-tree document JSON when the target is [`RenderTarget::BlockTree`].
    pub document: Option<String>,
    /// Image mode chosen for this pass.
    pub mode: ProcessingMode,
    /// One reference per distinct image origin, in document order.
    pub images: Vec<AssetReference>,
}

impl ImportOutput {
    /// The output in the configured target format.
    pub fn content(&self) -> &str {
        self.document.as_deref().unwrap_or(&self.body)
    }
}

/// Progress callback for reporting import status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each image is resolved.
    fn image_resolved(&self, reference: &AssetReference, current: usize, total: usize);
    /// Called when the import completes.
    fn done(&self, output: &ImportOutput);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn image_resolved(&self, _reference: &AssetReference, _current: usize, _total: usize) {}
    fn done(&self, _output: &ImportOutput) {}
}

/// Runs imports against a host.
pub struct Importer<'a, H> {
    host: &'a H,
    assets: AssetManager<'a, H>,
    config: ImportConfig,
}

impl<'a, H: Host> Importer<'a, H> {
    pub fn new(host: &'a H, config: ImportConfig, asset_config: AssetConfig) -> Result<Self> {
        Ok(Self {
            host,
            assets: AssetManager::new(host, asset_config)?,
            config,
        })
    }

    /// Transform `request` into the configured target format.
    ///
    /// 1. Reject empty input
    /// 2. Pick the image mode from the `<img` count
    /// 3. Extract the title and parse
    /// 4. Resolve images once per origin and rewrite `src`
    /// 5. Rewrite anchors
    /// 6. Render, then encode emoji
    #[instrument(skip_all, fields(render_target = ?self.config.target, len = request.html.len()))]
    pub async fn import(
        &self,
        request: &ImportRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<ImportOutput> {
        let start = Instant::now();

        if request.html.trim().is_empty() {
            let err = ContentBridgeError::validation("cannot import empty content");
            oplog::failure(Operation::Import, &request.html, &err);
            return Err(err);
        }

        let image_count = request.html.matches("<img").count();
        let mode = self.assets.select_mode(image_count);
        debug!(image_count, %mode, "image mode selected");

        let title = request
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| extract_title(&request.html))
            .unwrap_or_default();

        progress.phase("Parsing content");
        let mut fragment = parse_fragment(&request.html);

        if self.config.strip_title_heading && !title.is_empty() {
            let (stripped, removed) =
                fragment.without_first(|n| n.tag_name == "h1" && n.text_content().trim() == title);
            if removed.is_some() {
                debug!("title heading removed from body");
                fragment = stripped;
            }
        }

        progress.phase("Resolving images");
        let images = self.resolve_images(&fragment, mode, progress).await;
        let fragment = fragment.map_elements(|node| {
            if node.tag_name != "img" {
                return;
            }
            let local = node
                .attr("src")
                .and_then(|src| images.get(src.trim()))
                .map(|reference| reference.effective_url().to_string());
            if let Some(url) = local {
                node.set_attr("src", url);
            }
        });

        progress.phase("Rewriting links");
        let fragment = rewrite_links(&fragment, &self.config.links, &self.config.canonical_origin);

        progress.phase("Rendering");
        let body = encode_emoji(&render_flat(&fragment));
        let document = match self.config.target {
            RenderTarget::Flat => None,
            RenderTarget::BlockTree => {
                let template = self.load_template().await;
                let fragment = unwrap_list_paragraphs(&fragment);
                let container = BlockTreeRenderer::new(&template, &images).render(&fragment);
                Some(encode_emoji(&document_to_json(&container)?))
            }
        };

        let output = ImportOutput {
            title: encode_emoji(&title),
            body,
            document,
            mode,
            images: images.references(),
        };

        oplog::success(Operation::Import, &request.html, output.content());
        info!(
            images = output.images.len(),
            resolved = output.images.iter().filter(|r| r.is_resolved()).count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "import complete"
        );
        progress.done(&output);
        Ok(output)
    }

    /// Import and persist as a new content record with its metadata.
    pub async fn import_and_store(
        &self,
        request: &ImportRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<(RecordId, ImportOutput)> {
        let output = self.import(request, progress).await?;
        progress.phase("Saving record");
        let record_id = self.host.insert_record(&output.title, &output.body).await?;
        self.record_metadata(record_id, request, &output).await?;
        info!(record_id, "record stored");
        Ok((record_id, output))
    }

    /// Write SEO keys, the block-tree document and sync bookkeeping for `record_id`.
    pub async fn record_metadata(
        &self,
        record_id: RecordId,
        request: &ImportRequest,
        output: &ImportOutput,
    ) -> Result<()> {
        seo::write_seo_meta(
            self.host,
            record_id,
            self.config.seo_plugin,
            request.meta_title.as_deref(),
            request.meta_description.as_deref(),
        )
        .await?;

        if let Some(document) = &output.document {
            self.host
                .set_meta(record_id, meta_keys::BLOCK_DATA, document)
                .await?;
        }

        mark_synced(self.host, record_id, Operation::Import).await
    }

    /// Resolve every distinct image origin once, in document order.
    async fn resolve_images(
        &self,
        fragment: &Fragment,
        mode: ProcessingMode,
        progress: &dyn ProgressReporter,
    ) -> ResolvedImages {
        let mut seen = HashSet::new();
        let pending: Vec<(String, String)> = fragment
            .elements_named("img")
            .filter_map(|img| {
                let src = img.attr("src")?.trim();
                (!src.is_empty() && seen.insert(src.to_string()))
                    .then(|| (src.to_string(), img.attr_or_empty("alt").to_string()))
            })
            .collect();

        let mut images = ResolvedImages::new();
        let total = pending.len();
        for (i, (src, alt)) in pending.iter().enumerate() {
            let reference = self.assets.resolve(src, alt, mode).await;
            progress.image_resolved(&reference, i + 1, total);
            images.insert(reference);
        }
        images
    }

    /// The configured style template, or an empty one.
    async fn load_template(&self) -> StyleTemplate {
        let Some(id) = self.config.style_template_id else {
            return StyleTemplate::empty();
        };
        match self.host.fetch_template(id).await {
            Ok(Some(json)) => StyleTemplate::from_json_or_empty(&json),
            Ok(None) => {
                debug!(id, "style template not found, using defaults");
                StyleTemplate::empty()
            }
            Err(e) => {
                warn!(id, error = %e, "failed to load style template, using defaults");
                StyleTemplate::empty()
            }
        }
    }
}

/// Stamp `record_id` with the time and direction of its last sync.
pub(crate) async fn mark_synced<H: Host>(
    host: &H,
    record_id: RecordId,
    operation: Operation,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis().to_string();
    host.set_meta(record_id, meta_keys::LAST_UPDATE, &now).await?;
    host.set_meta(record_id, meta_keys::LAST_UPDATE_DIRECTION, operation.as_str())
        .await
}
