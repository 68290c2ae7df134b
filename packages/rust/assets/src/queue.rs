//! Background queue processing.
//!
//! Each run claims the pending job, downloads up to `batch_size` entries,
//! swaps the origin URL for the local one in every stored record that
//! mentions it, and drops the attempted entries whether or not they worked.
//! If anything is left, the next run is scheduled `reschedule_delay` out.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use contentbridge_dom::escape_attr;
use contentbridge_shared::{AssetConfig, QueueEntry, RecordId, Result};
use contentbridge_storage::{
    AssetIndex, ContentStore, MediaLibrary, MetadataStore, QueueStore, Scheduler,
};

use crate::manager::{AssetManager, IMAGE_QUEUE, QUEUE_JOB};

/// Outcome of one queue run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueReport {
    /// Entries taken from the queue this run.
    pub attempted: usize,
    /// Entries that ended up backed by a local asset.
    pub resolved: usize,
    /// Entries whose download or ingest failed (dropped, not retried).
    pub failed: usize,
    /// Content records whose body was rewritten.
    pub records_updated: usize,
    /// Entries still queued after this run.
    pub remaining: usize,
    /// Whether another run was scheduled.
    pub rescheduled: bool,
}

/// Drains the image download queue in batches.
pub struct QueueProcessor<'a, H> {
    manager: AssetManager<'a, H>,
}

impl<'a, H> QueueProcessor<'a, H>
where
    H: AssetIndex + MediaLibrary + MetadataStore + QueueStore + Scheduler + ContentStore,
{
    pub fn new(host: &'a H, config: AssetConfig) -> Result<Self> {
        Ok(Self {
            manager: AssetManager::new(host, config)?,
        })
    }

    /// Run one batch.
    #[instrument(skip_all)]
    pub async fn process_queue(&self) -> Result<QueueReport> {
        let host = self.manager.host();
        let config = self.manager.config();

        host.clear_schedule(QUEUE_JOB).await?;

        let queue = host.load_queue(IMAGE_QUEUE).await?;
        if queue.is_empty() {
            debug!("image queue is empty");
            return Ok(QueueReport::default());
        }

        let batch: Vec<QueueEntry> = queue.into_iter().take(config.batch_size).collect();
        let mut report = QueueReport {
            attempted: batch.len(),
            ..QueueReport::default()
        };

        for entry in &batch {
            match self
                .manager
                .acquire(&entry.origin_url, &entry.alt_text)
                .await
            {
                Ok(asset) => {
                    report.resolved += 1;
                    report.records_updated += self
                        .replace_in_records(&entry.origin_url, &asset.url)
                        .await?;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(url = %entry.origin_url, error = %e, "queued image failed, dropping");
                }
            }
        }

        // Reload: imports may have appended while this batch was downloading.
        let mut remaining = host.load_queue(IMAGE_QUEUE).await?;
        for done in &batch {
            if let Some(pos) = remaining.iter().position(|e| e == done) {
                remaining.remove(pos);
            }
        }
        host.save_queue(IMAGE_QUEUE, &remaining).await?;
        report.remaining = remaining.len();

        if !remaining.is_empty() {
            report.rescheduled = host.try_schedule(QUEUE_JOB, config.reschedule_delay).await?;
        }

        info!(
            attempted = report.attempted,
            resolved = report.resolved,
            failed = report.failed,
            remaining = report.remaining,
            "image queue batch done"
        );
        Ok(report)
    }

    /// Literal replace of `origin_url` in every record body that contains it,
    /// either raw or as it appears inside a serialized attribute.
    async fn replace_in_records(&self, origin_url: &str, local_url: &str) -> Result<usize> {
        let host = self.manager.host();
        let mut forms = vec![(origin_url.to_string(), local_url.to_string())];
        let escaped = escape_attr(origin_url);
        if escaped != origin_url {
            forms.push((escaped, escape_attr(local_url)));
        }

        let mut bodies: BTreeMap<RecordId, String> = BTreeMap::new();
        for (needle, _) in &forms {
            for record in host.find_containing(needle).await? {
                bodies.entry(record.id).or_insert(record.body);
            }
        }

        for (id, body) in &bodies {
            let rewritten = forms
                .iter()
                .fold(body.clone(), |acc, (from, to)| acc.replace(from, to));
            host.update_body(*id, &rewritten).await?;
        }
        Ok(bodies.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentbridge_storage::MemoryHost;

    fn config() -> AssetConfig {
        AssetConfig {
            allow_private_hosts: true,
            ..AssetConfig::default()
        }
    }

    async fn mock_images(server: &wiremock::MockServer) {
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path_regex(r"^/img/\d+\.png$"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![7, 7, 7]),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let host = MemoryHost::new();
        let processor = QueueProcessor::new(&host, config()).unwrap();
        let report = processor.process_queue().await.unwrap();
        assert_eq!(report, QueueReport::default());
        assert!(host.scheduled_at(QUEUE_JOB).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn drains_in_batches_and_rewrites_records() {
        let server = wiremock::MockServer::start().await;
        mock_images(&server).await;
        let host = MemoryHost::new().with_media_base_url("https://site.test/media");

        let urls: Vec<String> = (1..=5)
            .map(|i| format!("{}/img/{i}.png", server.uri()))
            .collect();
        let body: String = urls
            .iter()
            .map(|u| format!("<p><img src=\"{u}\" /></p>\n"))
            .collect();
        let record = host.insert_record("Post", &body).await.unwrap();
        let entries: Vec<QueueEntry> = urls.iter().map(|u| QueueEntry::new(u, "")).collect();
        host.save_queue(IMAGE_QUEUE, &entries).await.unwrap();

        let processor = QueueProcessor::new(&host, config()).unwrap();

        let first = processor.process_queue().await.unwrap();
        assert_eq!(first.attempted, 3);
        assert_eq!(first.resolved, 3);
        assert_eq!(first.remaining, 2);
        assert!(first.rescheduled);
        assert!(host.scheduled_at(QUEUE_JOB).await.unwrap().is_some());

        let body = host.get_record(record).await.unwrap().unwrap().body;
        assert!(!body.contains(&urls[0]));
        assert!(body.contains(&urls[3]));

        let second = processor.process_queue().await.unwrap();
        assert_eq!(second.attempted, 2);
        assert_eq!(second.remaining, 0);
        assert!(!second.rescheduled);
        assert!(host.scheduled_at(QUEUE_JOB).await.unwrap().is_none());
        assert!(host.load_queue(IMAGE_QUEUE).await.unwrap().is_empty());

        let body = host.get_record(record).await.unwrap().unwrap().body;
        assert!(!body.contains(&server.uri()));
        assert!(body.contains("https://site.test/media/"));
        assert_eq!(host.media_count(), 5);
    }

    #[tokio::test]
    async fn failed_entries_are_dropped() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/broken.png"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let host = MemoryHost::new();
        let origin = format!("{}/broken.png", server.uri());
        let record = host
            .insert_record("Post", &format!("<img src=\"{origin}\" />"))
            .await
            .unwrap();
        host.save_queue(IMAGE_QUEUE, &[QueueEntry::new(&origin, "")])
            .await
            .unwrap();

        let report = QueueProcessor::new(&host, config())
            .unwrap()
            .process_queue()
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 0);
        assert!(host.load_queue(IMAGE_QUEUE).await.unwrap().is_empty());

        let body = host.get_record(record).await.unwrap().unwrap().body;
        assert!(body.contains(&origin));
    }

    #[tokio::test]
    async fn already_indexed_entry_reuses_asset() {
        let host = MemoryHost::new();
        let asset = contentbridge_shared::LocalAsset {
            id: 3,
            url: "https://site.test/media/3/x.png".into(),
        };
        host.record_origin("https://cdn.example.com/x.png", &asset)
            .await
            .unwrap();
        let record = host
            .insert_record("Post", "<img src=\"https://cdn.example.com/x.png\" />")
            .await
            .unwrap();
        host.save_queue(
            IMAGE_QUEUE,
            &[QueueEntry::new("https://cdn.example.com/x.png", "")],
        )
        .await
        .unwrap();

        let report = QueueProcessor::new(&host, config())
            .unwrap()
            .process_queue()
            .await
            .unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.records_updated, 1);
        assert_eq!(host.media_count(), 0);
        assert_eq!(
            host.get_record(record).await.unwrap().unwrap().body,
            "<img src=\"https://site.test/media/3/x.png\" />"
        );
    }

    #[tokio::test]
    async fn query_string_urls_are_rewritten_in_attributes() {
        let server = wiremock::MockServer::start().await;
        mock_images(&server).await;
        let host = MemoryHost::new().with_media_base_url("https://site.test/media");
        let origin = format!("{}/img/1.png?w=800&h=600", server.uri());
        let stored = format!(
            "<p>See <img src=\"{}\" /></p>\n",
            origin.replace('&', "&amp;")
        );
        let record = host.insert_record("Post", &stored).await.unwrap();
        host.save_queue(IMAGE_QUEUE, &[QueueEntry::new(&origin, "")])
            .await
            .unwrap();

        let report = QueueProcessor::new(&host, config())
            .unwrap()
            .process_queue()
            .await
            .unwrap();
        assert_eq!(report.resolved, 1);
        assert_eq!(report.records_updated, 1);

        let body = host.get_record(record).await.unwrap().unwrap().body;
        assert!(!body.contains(&server.uri()), "{body}");
        assert!(body.contains("src=\"https://site.test/media/"));
    }
}
