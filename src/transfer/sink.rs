//! Destination sinks: where uploaded bytes end up.
//!
//! The core only needs a sink to accept a byte stream plus a classification;
//! [`DirectorySink`] and [`HttpSink`] cover local delivery and a generic
//! streaming HTTP endpoint. Chat platform adapters implement
//! [`DestinationSink`] outside this crate.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::artifact::{log_removal_error, sanitize_file_name};
use super::classify::{MediaKind, mime_for_path};

/// Header carrying the classification on [`HttpSink`] uploads.
pub const MEDIA_KIND_HEADER: &str = "x-media-kind";
/// Header carrying the percent-encoded file name on [`HttpSink`] uploads.
pub const FILE_NAME_HEADER: &str = "x-file-name";
/// Header carrying the percent-encoded caption on [`HttpSink`] uploads.
pub const CAPTION_HEADER: &str = "x-caption";

/// Stream of file blocks handed to a sink.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Errors a sink reports back to the uploader.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination refused this payload (size, type). Not retried.
    #[error("rejected: {reason}")]
    Rejected {
        /// Reason given by the destination.
        reason: String,
    },

    /// Connectivity problem talking to the destination. Retried.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// Local file system error inside the sink.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    /// Creates a rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// One upload handed to a sink.
pub struct SinkUpload {
    /// File contents, in order.
    pub body: ByteStream,
    /// Exact byte length of `body`.
    pub len: u64,
    /// Video or document.
    pub kind: MediaKind,
    /// Caption to attach, if any.
    pub caption: Option<String>,
    /// File name to present at the destination.
    pub file_name: String,
    /// Optional side file (e.g. a thumbnail) to attach.
    pub auxiliary: Option<PathBuf>,
}

impl std::fmt::Debug for SinkUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkUpload")
            .field("len", &self.len)
            .field("kind", &self.kind)
            .field("caption", &self.caption)
            .field("file_name", &self.file_name)
            .field("auxiliary", &self.auxiliary)
            .finish_non_exhaustive()
    }
}

/// Destination capability that accepts a byte stream and a classification.
#[async_trait]
pub trait DestinationSink: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Largest payload the destination accepts, if it declares one.
    ///
    /// Checked before any bytes move.
    fn max_upload_bytes(&self) -> Option<u64> {
        None
    }

    /// Consumes the whole upload.
    ///
    /// # Errors
    ///
    /// [`SinkError::Rejected`] when the payload is refused,
    /// [`SinkError::Transport`] or [`SinkError::Io`] on delivery failures.
    async fn send(&self, upload: SinkUpload) -> Result<(), SinkError>;
}

/// Writes uploads into a local directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    max_upload_bytes: Option<u64>,
}

impl DirectorySink {
    /// Creates a sink writing into `dir` (created on first upload).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_upload_bytes: None,
        }
    }

    /// Declares a maximum accepted size.
    #[must_use]
    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = Some(limit);
        self
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DestinationSink for DirectorySink {
    fn name(&self) -> &str {
        "directory"
    }

    fn max_upload_bytes(&self) -> Option<u64> {
        self.max_upload_bytes
    }

    #[instrument(skip(self, upload), fields(dir = %self.dir.display(), file = %upload.file_name))]
    async fn send(&self, upload: SinkUpload) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io { source })?;

        let target = self.dir.join(sanitize_file_name(&upload.file_name));
        let file = tokio::fs::File::create(&target)
            .await
            .map_err(|source| SinkError::Io { source })?;
        let mut writer = BufWriter::new(file);
        let mut body = upload.body;
        let mut written: u64 = 0;

        while let Some(block) = body.next().await {
            let block = block.map_err(|source| SinkError::Io { source })?;
            written += block.len() as u64;
            if self.max_upload_bytes.is_some_and(|limit| written > limit) {
                drop(writer);
                if let Err(e) = tokio::fs::remove_file(&target).await {
                    log_removal_error(&target, &e);
                }
                return Err(SinkError::rejected("file exceeds directory sink limit"));
            }
            writer
                .write_all(&block)
                .await
                .map_err(|source| SinkError::Io { source })?;
        }
        writer
            .flush()
            .await
            .map_err(|source| SinkError::Io { source })?;

        if let Some(aux) = &upload.auxiliary
            && let Some(aux_name) = aux.file_name()
        {
            let aux_target = self.dir.join(aux_name);
            tokio::fs::copy(aux, &aux_target)
                .await
                .map_err(|source| SinkError::Io { source })?;
        }

        info!(path = %target.display(), bytes = written, kind = %upload.kind, "stored upload");
        Ok(())
    }
}

/// Streams uploads to an HTTP endpoint with a single POST per upload.
///
/// The body is the raw file; classification, file name and caption travel in
/// headers. 4xx answers other than 408 and 429 count as rejections, every
/// other failure as a transport error.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    endpoint: Url,
    max_upload_bytes: Option<u64>,
}

impl HttpSink {
    /// Creates a sink posting to `endpoint`.
    #[must_use]
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            max_upload_bytes: None,
        }
    }

    /// Declares a maximum accepted size.
    #[must_use]
    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = Some(limit);
        self
    }

    fn headers(upload: &SinkUpload) -> Result<HeaderMap, SinkError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(mime_for_path(Path::new(&upload.file_name))),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(upload.len));
        headers.insert(MEDIA_KIND_HEADER, HeaderValue::from_static(upload.kind.as_str()));
        headers.insert(FILE_NAME_HEADER, encoded_header(&upload.file_name)?);
        if let Some(caption) = &upload.caption {
            headers.insert(CAPTION_HEADER, encoded_header(caption)?);
        }
        Ok(headers)
    }
}

fn encoded_header(value: &str) -> Result<HeaderValue, SinkError> {
    HeaderValue::from_str(&urlencoding::encode(value))
        .map_err(|e| SinkError::rejected(format!("unencodable header value: {e}")))
}

#[async_trait]
impl DestinationSink for HttpSink {
    fn name(&self) -> &str {
        self.endpoint.host_str().unwrap_or("http")
    }

    fn max_upload_bytes(&self) -> Option<u64> {
        self.max_upload_bytes
    }

    #[instrument(skip(self, upload), fields(endpoint = %self.endpoint, file = %upload.file_name))]
    async fn send(&self, upload: SinkUpload) -> Result<(), SinkError> {
        let headers = Self::headers(&upload)?;
        if upload.auxiliary.is_some() {
            debug!("http sink does not forward auxiliary files");
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .body(reqwest::Body::wrap_stream(upload.body))
            .send()
            .await
            .map_err(|e| SinkError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(status = status.as_u16(), bytes = upload.len, "upload accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", body.trim())
        };
        if is_rejection(status) {
            Err(SinkError::rejected(detail))
        } else {
            Err(SinkError::transport(detail))
        }
    }
}

fn is_rejection(status: StatusCode) -> bool {
    status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
}
