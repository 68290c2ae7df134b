//! SEO metadata sink.
//!
//! Imported meta title/description are written under whichever keys the
//! configured SEO plugin reads.

use tracing::debug;

use contentbridge_shared::{RecordId, Result, SeoPlugin};
use contentbridge_storage::MetadataStore;

/// Metadata keys a plugin reads its title and description from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeoKeys {
    pub title: &'static str,
    pub description: &'static str,
}

/// Keys for `plugin`. `Auto` falls back to the native keys; detecting an
/// installed plugin is the host's business.
pub fn keys_for(plugin: SeoPlugin) -> SeoKeys {
    match plugin {
        SeoPlugin::Yoast => SeoKeys {
            title: "_yoast_wpseo_title",
            description: "_yoast_wpseo_metadesc",
        },
        SeoPlugin::Aioseo => SeoKeys {
            title: "_aioseo_title",
            description: "_aioseo_description",
        },
        SeoPlugin::RankMath => SeoKeys {
            title: "rank_math_title",
            description: "rank_math_description",
        },
        SeoPlugin::Native | SeoPlugin::Auto => SeoKeys {
            title: "_contentbridge_title",
            description: "_contentbridge_description",
        },
    }
}

/// Write non-empty `title`/`description` for `record_id`. Returns how many keys were set.
pub async fn write_seo_meta<H: MetadataStore>(
    host: &H,
    record_id: RecordId,
    plugin: SeoPlugin,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<usize> {
    let keys = keys_for(plugin);
    let mut written = 0;

    for (key, value) in [(keys.title, title), (keys.description, description)] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            host.set_meta(record_id, key, value).await?;
            written += 1;
        }
    }

    debug!(record_id, ?plugin, written, "SEO metadata written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentbridge_storage::MemoryHost;

    #[test]
    fn auto_uses_native_keys() {
        assert_eq!(keys_for(SeoPlugin::Auto), keys_for(SeoPlugin::Native));
        assert_eq!(keys_for(SeoPlugin::RankMath).title, "rank_math_title");
    }

    #[tokio::test]
    async fn writes_only_non_empty_values() {
        let host = MemoryHost::new();
        let written = write_seo_meta(&host, 4, SeoPlugin::Yoast, Some("Meta"), Some(""))
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(
            host.get_meta(4, "_yoast_wpseo_title").await.unwrap().as_deref(),
            Some("Meta")
        );
        assert!(host.get_meta(4, "_yoast_wpseo_metadesc").await.unwrap().is_none());
    }
}
