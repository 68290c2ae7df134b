//! Outbound direction: stored record → linear HTML for the external service.

use tracing::{info, instrument};

use contentbridge_render::flatten;
use contentbridge_shared::{ContentBridgeError, RecordId, Result};
use contentbridge_storage::Host;

use crate::oplog::{self, Operation};
use crate::pipeline::mark_synced;

/// A record flattened for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedRecord {
    pub id: RecordId,
    pub title: String,
    pub html: String,
}

/// Flattens stored records.
pub struct Exporter<'a, H> {
    host: &'a H,
}

impl<'a, H: Host> Exporter<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Flatten a raw rich-text body.
    pub fn export_html(&self, html: &str) -> String {
        let flat = flatten(html);
        oplog::success(Operation::Export, html, &flat);
        flat
    }

    /// Flatten record `id` and stamp it as exported.
    #[instrument(skip(self))]
    pub async fn export_record(&self, id: RecordId) -> Result<ExportedRecord> {
        let record = match self.host.get_record(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                let err = ContentBridgeError::validation(format!("no record with id {id}"));
                oplog::failure(Operation::Export, "", &err);
                return Err(err);
            }
            Err(e) => {
                oplog::failure(Operation::Export, "", &e);
                return Err(e);
            }
        };

        let html = self.export_html(&record.body);
        mark_synced(self.host, id, Operation::Export).await?;
        info!(id, len = html.len(), "record exported");

        Ok(ExportedRecord {
            id,
            title: record.title,
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentbridge_shared::{AssetConfig, ImageProcessing, ImportConfig};
    use contentbridge_storage::{ContentStore, MemoryHost, MetadataStore, meta_keys};

    use crate::pipeline::{ImportRequest, Importer, SilentProgress};

    #[tokio::test]
    async fn exports_stored_record() {
        let host = MemoryHost::new();
        let id = host
            .insert_record(
                "Post",
                "<div><h2>Head</h2><p>Text</p></div><p>With <img src=\"/m/1.png\" /> inline</p>",
            )
            .await
            .unwrap();

        let exported = Exporter::new(&host).export_record(id).await.unwrap();
        assert_eq!(exported.title, "Post");
        assert_eq!(
            exported.html,
            "<h2>Head</h2>\n<p>Text</p>\nWith <img src=\"/m/1.png\" /> inline\n"
        );
        assert_eq!(
            host.get_meta(id, meta_keys::LAST_UPDATE_DIRECTION)
                .await
                .unwrap()
                .as_deref(),
            Some("export")
        );
    }

    #[tokio::test]
    async fn missing_record_is_an_error() {
        let host = MemoryHost::new();
        let result = Exporter::new(&host).export_record(42).await;
        assert!(matches!(result, Err(ContentBridgeError::Validation { .. })));
    }

    #[tokio::test]
    async fn imported_image_paragraph_exports_with_its_text() {
        let host = MemoryHost::new();
        let importer = Importer::new(
            &host,
            ImportConfig::default(),
            AssetConfig {
                processing: ImageProcessing::Async,
                ..AssetConfig::default()
            },
        )
        .unwrap();
        let request = ImportRequest::new(
            "<p>Hello world <img src=\"https://cdn.example.com/a.png\" alt=\"a\"> more text</p>\
             <p>Next</p>",
        );
        let (id, _) = importer
            .import_and_store(&request, &SilentProgress)
            .await
            .unwrap();

        let exported = Exporter::new(&host).export_record(id).await.unwrap();
        assert!(exported.html.starts_with("Hello world <img "), "{}", exported.html);
        assert!(exported.html.contains("src=\"https://cdn.example.com/a.png\""));
        assert!(exported.html.ends_with(" more text\n<p>Next</p>\n"), "{}", exported.html);
    }
}
