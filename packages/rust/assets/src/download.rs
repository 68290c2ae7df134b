//! HTTP image downloader.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use tracing::{debug, instrument};
use url::Url;

use contentbridge_shared::{AssetConfig, ContentBridgeError, Result};
use contentbridge_storage::MediaUpload;

/// User-Agent string for image requests.
const USER_AGENT: &str = concat!("ContentBridge/", env!("CARGO_PKG_VERSION"));

/// Name used when a URL has no usable last path segment.
const FALLBACK_STEM: &str = "image";

static DISPOSITION_FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).expect("valid regex")
});

/// Fetches remote images into [`MediaUpload`]s.
pub struct Downloader {
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private_hosts: bool,
}

impl Downloader {
    /// Create a downloader honouring the timeout and host policy in `config`.
    pub fn new(config: &AssetConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.download_timeout)
            .build()
            .map_err(|e| {
                ContentBridgeError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Allow downloads from localhost/private IPs.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }

    /// Download `origin_url`.
    #[instrument(skip(self))]
    pub async fn fetch(&self, origin_url: &str) -> Result<MediaUpload> {
        let url = Url::parse(origin_url)
            .map_err(|e| ContentBridgeError::asset(format!("invalid image URL {origin_url}: {e}")))?;

        if !self.allow_private_hosts && is_ssrf_target(&url) {
            return Err(ContentBridgeError::asset(format!(
                "refusing to download from {url}"
            )));
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ContentBridgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentBridgeError::Network(format!(
                "{url}: HTTP {}",
                status.as_u16()
            )));
        }

        let content_type = header_str(&response, CONTENT_TYPE);
        let disposition = header_str(&response, CONTENT_DISPOSITION);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ContentBridgeError::Network(format!("{url}: {e}")))?;

        let file_name = file_name_for(&url, disposition.as_deref(), content_type.as_deref());
        let content_type = content_type.or_else(|| guess_content_type(&file_name));

        debug!(%file_name, bytes = bytes.len(), "downloaded image");

        Ok(MediaUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// File naming
// ---------------------------------------------------------------------------

/// Derive a storage file name for a downloaded image.
///
/// The URL's last path segment is used as-is when it has an extension.
/// Otherwise the extension comes from the `Content-Disposition` filename,
/// then from the `Content-Type`.
pub fn file_name_for(url: &Url, disposition: Option<&str>, content_type: Option<&str>) -> String {
    let stem = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());

    if extension_of(&stem).is_some() {
        return stem;
    }

    let extension = disposition
        .and_then(disposition_file_name)
        .and_then(|name| extension_of(&name).map(str::to_string))
        .or_else(|| content_type.and_then(extension_for_mime).map(str::to_string));

    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// File name from a `Content-Disposition` header value.
fn disposition_file_name(header: &str) -> Option<String> {
    DISPOSITION_FILENAME_RE
        .captures(header)
        .map(|c| c[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Extension of `name`, ignoring leading dots (`.hidden` has none).
fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

/// Keep file names to a portable character set.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '-')
        .to_string()
}

fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/svg+xml" => Some("svg"),
        "image/bmp" => Some("bmp"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        _ => None,
    }
}

fn guess_content_type(file_name: &str) -> Option<String> {
    let ext = extension_of(file_name)?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        other => return Some(format!("image/{other}")),
    };
    Some(mime.to_string())
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn file_name_from_path() {
        assert_eq!(file_name_for(&url("http://x.test/img/photo.png"), None, None), "photo.png");
        assert_eq!(
            file_name_for(&url("http://x.test/a/my%20pic.jpeg?w=100"), None, None),
            "my-20pic.jpeg"
        );
    }

    #[test]
    fn extension_from_disposition_then_content_type() {
        let u = url("http://x.test/download/12345");
        assert_eq!(
            file_name_for(&u, Some(r#"attachment; filename="cat.webp""#), Some("image/png")),
            "12345.webp"
        );
        assert_eq!(file_name_for(&u, Some("inline"), Some("image/jpeg; q=1")), "12345.jpg");
        assert_eq!(file_name_for(&u, None, None), "12345");
    }

    #[test]
    fn empty_path_falls_back() {
        assert_eq!(file_name_for(&url("http://x.test/"), None, Some("image/gif")), "image.gif");
    }

    #[test]
    fn ssrf_blocks_non_http_and_private() {
        assert!(is_ssrf_target(&url("file:///etc/passwd")));
        assert!(is_ssrf_target(&url("http://127.0.0.1/a.png")));
        assert!(is_ssrf_target(&url("http://10.0.0.8/a.png")));
        assert!(is_ssrf_target(&url("http://[::1]/a.png")));
        assert!(is_ssrf_target(&url("http://localhost:8080/a.png")));
        assert!(is_ssrf_target(&url("http://printer.local/a.png")));
        assert!(!is_ssrf_target(&url("https://cdn.example.com/a.png")));
    }

    #[tokio::test]
    async fn fetch_downloads_bytes() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/media/abc"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .insert_header("content-disposition", r#"inline; filename="abc.png""#)
                    .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
            )
            .mount(&server)
            .await;

        let downloader = Downloader::new(&AssetConfig::default())
            .unwrap()
            .allow_private_hosts();
        let upload = downloader
            .fetch(&format!("{}/media/abc", server.uri()))
            .await
            .unwrap();
        assert_eq!(upload.file_name, "abc.png");
        assert_eq!(upload.content_type.as_deref(), Some("image/png"));
        assert_eq!(upload.bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn fetch_rejects_errors_and_private_hosts() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/missing.png"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = AssetConfig {
            download_timeout: Duration::from_secs(5),
            ..AssetConfig::default()
        };
        let strict = Downloader::new(&config).unwrap();
        let blocked = strict.fetch(&format!("{}/missing.png", server.uri())).await;
        assert!(matches!(blocked, Err(ContentBridgeError::Asset(_))));

        let open = Downloader::new(&config).unwrap().allow_private_hosts();
        let missing = open.fetch(&format!("{}/missing.png", server.uri())).await;
        assert!(matches!(missing, Err(ContentBridgeError::Network(_))));

        assert!(open.fetch("not a url").await.is_err());
    }
}
