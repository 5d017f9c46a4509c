//! Upload client for the Internet Archive's S3-compatible API.
//!
//! Files are PUT to `{s3_endpoint}/{container}/{encoded file name}` with the
//! archive's `LOW access:secret` authorization and metadata headers; the
//! container (an archive "item") is created on first upload. On success the
//! public download URL for the same container and file name is returned.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ApiError;
use crate::config::ArchiveConfig;

/// Connect timeout in seconds. Uploads themselves are not time-limited.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Size of each streamed body chunk; progress is reported once per chunk
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive credentials are not configured (set ARCHIVIST_ACCESS_KEY and ARCHIVIST_SECRET_KEY)")]
    MissingCredentials,

    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),

    #[error("Upload failed with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Network error during upload: {0}")]
    Network(#[source] reqwest::Error),
}

/// Archive media type, derived from a file's content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movies,
    Texts,
    Image,
}

impl MediaKind {
    /// `video/*` are movies, PDFs are texts, `image/*` are images and
    /// everything else is filed as texts.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.starts_with("video/") {
            MediaKind::Movies
        } else if essence == "application/pdf" {
            MediaKind::Texts
        } else if essence.starts_with("image/") {
            MediaKind::Image
        } else {
            MediaKind::Texts
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movies => "movies",
            MediaKind::Texts => "texts",
            MediaKind::Image => "image",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file ready to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Read a file from disk. Without an explicit content type one is guessed
    /// from the extension.
    pub fn from_path(path: &Path, content_type: Option<&str>) -> anyhow::Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Path has no usable file name: {}", path.display()))?
            .to_string();
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(path).to_string());
        Ok(Self::new(file_name, content_type, data))
    }

    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_content_type(&self.content_type)
    }
}

/// Content type for common extensions
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "txt" => "text/plain",
        "epub" => "application/epub+zip",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub url: String,
    pub media_kind: MediaKind,
    pub bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Percentage of `sent` over `total`, rounded and capped at 100
fn progress_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (sent.saturating_mul(100) + total / 2) / total;
    pct.min(100) as u8
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ArchiveClient {
    client: Client,
    config: ArchiveConfig,
}

impl ArchiveClient {
    pub fn new(config: ArchiveConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    /// Destination of the PUT for a file in a container
    pub fn upload_url(&self, container: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.s3_endpoint.trim_end_matches('/'),
            container,
            urlencoding::encode(file_name)
        )
    }

    /// Public retrieval URL for a file in a container
    pub fn public_url(&self, container: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.download_base.trim_end_matches('/'),
            container,
            urlencoding::encode(file_name)
        )
    }

    fn upload_headers(&self, file: &UploadFile, kind: MediaKind) -> Result<HeaderMap, ArchiveError> {
        let (access, secret) = match (&self.config.access_key, &self.config.secret_key) {
            (Some(a), Some(s)) if self.config.has_credentials() => (a, s),
            _ => return Err(ArchiveError::MissingCredentials),
        };

        let value = |name: &'static str, v: &str| {
            HeaderValue::from_str(v).map_err(|_| ArchiveError::InvalidHeader(name))
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value("authorization", &format!("LOW {}:{}", access, secret))?);
        headers.insert(HeaderName::from_static("x-archive-auto-make-bucket"), HeaderValue::from_static("1"));
        headers.insert(
            HeaderName::from_static("x-archive-meta-collection"),
            value("x-archive-meta-collection", &self.config.collection)?,
        );
        headers.insert(
            HeaderName::from_static("x-archive-meta-mediatype"),
            HeaderValue::from_static(kind.as_str()),
        );
        headers.insert(CONTENT_TYPE, value("content-type", &file.content_type)?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(file.data.len() as u64));
        Ok(headers)
    }

    /// Stream `file` into `container`, calling `on_progress` with a percentage
    /// after each chunk is handed to the transport.
    ///
    /// Fails with `MissingCredentials` before touching the network when the
    /// access or secret key is unset.
    pub async fn upload<F>(
        &self,
        file: UploadFile,
        container: &str,
        on_progress: F,
    ) -> Result<UploadReceipt, ArchiveError>
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        let kind = file.media_kind();
        let headers = self.upload_headers(&file, kind)?;
        let url = self.upload_url(container, &file.file_name);
        let total = file.data.len() as u64;

        debug!(url = %url, bytes = total, media_kind = %kind, "Starting upload");

        let chunks: Vec<Vec<u8>> = file.data.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
        let mut sent: u64 = 0;
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(progress_percent(sent, total));
            Ok::<_, std::io::Error>(chunk)
        }));

        let response = self
            .client
            .put(&url)
            .headers(headers)
            .body(Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Upload transport failure");
                ArchiveError::Network(e)
            })?;

        let status = response.status();
        if status.is_success() {
            let public = self.public_url(container, &file.file_name);
            info!(url = %public, bytes = total, "Upload complete");
            Ok(UploadReceipt {
                url: public,
                media_kind: kind,
                bytes: total,
                uploaded_at: Utc::now(),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Upload rejected");
            Err(ArchiveError::Rejected {
                status: status.as_u16(),
                body: ApiError::truncate_body(&body),
            })
        }
    }
}
