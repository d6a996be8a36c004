//! HTTP client wrapper for chunked downloads.
//!
//! [`HttpClient::download`] runs one download attempt: a streaming GET whose
//! body is re-chunked into fixed-size blocks and appended to the destination
//! file. Retrying is the caller's job; every attempt truncates the destination
//! and starts again from byte zero.

use std::path::Path;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use super::config::TransferConfig;
use super::error::TransferError;
use super::progress::{Phase, ProgressCallback, ProgressReporter, ThrottleSettings};
use crate::user_agent;

/// One download attempt's parameters.
#[derive(Debug, Clone, Copy)]
pub struct DownloadTarget<'a> {
    /// Source URL.
    pub url: &'a str,
    /// Destination file; truncated before writing.
    pub dest: &'a Path,
    /// Expected size from metadata, 0 when unknown. Only used for progress
    /// when the server sends no Content-Length.
    pub size_hint: u64,
    /// Abort with [`TransferError::SizeExceeded`] once more than this many
    /// bytes arrive.
    pub size_limit: Option<u64>,
    /// Attempt number (1-indexed) stamped on progress events.
    pub attempt: u32,
}

/// HTTP client for chunked streaming downloads.
///
/// Create once and share; the inner reqwest client pools connections.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use mediarelay_core::transfer::{DownloadTarget, HttpClient, TransferConfig, noop_progress};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::from_config(&TransferConfig::default());
/// let target = DownloadTarget {
///     url: "https://example.com/video.mp4",
///     dest: Path::new("/tmp/video.mp4"),
///     size_hint: 0,
///     size_limit: None,
///     attempt: 1,
/// };
/// let bytes = client
///     .download(&target, &noop_progress(), &CancellationToken::new())
///     .await?;
/// println!("downloaded {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    chunk_size: usize,
    throttle: ThrottleSettings,
    attempt_timeout: Duration,
}

impl HttpClient {
    /// Creates a client from the engine configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static TLS and
    /// timeout configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn from_config(config: &TransferConfig) -> Self {
        let client = build_client(config.connect_timeout)
            .expect("failed to build HTTP client with static configuration");
        Self::with_client(client, config)
    }

    /// Wraps an existing reqwest client, e.g. one shared with an
    /// [`HttpSink`](super::sink::HttpSink).
    #[must_use]
    pub fn with_client(client: Client, config: &TransferConfig) -> Self {
        Self {
            client,
            chunk_size: config.chunk_size.max(1),
            throttle: config.throttle_settings(),
            attempt_timeout: config.overall_timeout,
        }
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Runs one download attempt and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`TransferError::InvalidUrl`] if the URL does not parse
    /// - [`TransferError::RemoteError`] for non-2xx responses
    /// - [`TransferError::Network`] for connection or body stream failures
    /// - [`TransferError::Timeout`] when the attempt outlives the overall timeout
    /// - [`TransferError::SizeExceeded`] once `size_limit` is passed
    /// - [`TransferError::Io`] if the destination cannot be written
    /// - [`TransferError::Cancelled`] as soon as `cancel` fires
    #[instrument(skip(self, on_progress, cancel), fields(url = %target.url, attempt = target.attempt))]
    pub async fn download(
        &self,
        target: &DownloadTarget<'_>,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        Url::parse(target.url).map_err(|_| TransferError::invalid_url(target.url))?;

        let attempt = tokio::time::timeout(
            self.attempt_timeout,
            self.download_inner(target, on_progress),
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("download cancelled mid-stream");
                Err(TransferError::Cancelled)
            }
            result = attempt => result.unwrap_or_else(|_| Err(TransferError::timeout(target.url))),
        }
    }

    async fn download_inner(
        &self,
        target: &DownloadTarget<'_>,
        on_progress: &ProgressCallback,
    ) -> Result<u64, TransferError> {
        let url = target.url;
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransferError::timeout(url)
            } else {
                TransferError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::remote(url, status.as_u16()));
        }

        let content_length = response.content_length();
        if let (Some(limit), Some(announced)) = (target.size_limit, content_length)
            && announced > limit
        {
            debug!(limit, announced, "content-length over limit");
            return Err(TransferError::size_exceeded(limit, announced));
        }
        let total = content_length.unwrap_or(target.size_hint);
        debug!(total, chunk_size = self.chunk_size, "streaming body");

        let file = File::create(target.dest)
            .await
            .map_err(|e| TransferError::io(target.dest, e))?;
        let mut reporter =
            ProgressReporter::new(Phase::Download, target.attempt, self.throttle, on_progress.clone());

        let written = self
            .stream_to_file(file, response, target, total, &mut reporter)
            .await?;

        reporter.finish(written);
        info!(path = %target.dest.display(), bytes = written, "download complete");
        Ok(written)
    }

    /// Re-chunks the response body into `chunk_size` blocks and writes them.
    async fn stream_to_file(
        &self,
        mut file: File,
        response: reqwest::Response,
        target: &DownloadTarget<'_>,
        total: u64,
        reporter: &mut ProgressReporter,
    ) -> Result<u64, TransferError> {
        let mut stream = response.bytes_stream();
        let mut pending = BytesMut::with_capacity(self.chunk_size);
        let mut written: u64 = 0;

        while let Some(piece) = stream.next().await {
            let piece = piece.map_err(|e| TransferError::network(target.url, e))?;
            let mut rest = &piece[..];
            while !rest.is_empty() {
                let take = (self.chunk_size - pending.len()).min(rest.len());
                pending.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
                if pending.len() == self.chunk_size {
                    written = write_block(&mut file, &pending, written, target).await?;
                    pending.clear();
                    reporter.record(written, total);
                }
            }
        }
        if !pending.is_empty() {
            written = write_block(&mut file, &pending, written, target).await?;
            reporter.record(written, total);
        }

        file.flush()
            .await
            .map_err(|e| TransferError::io(target.dest, e))?;
        Ok(written)
    }
}

/// Appends `block` after checking the size limit; returns the new total.
async fn write_block(
    file: &mut File,
    block: &[u8],
    written: u64,
    target: &DownloadTarget<'_>,
) -> Result<u64, TransferError> {
    let next = written + block.len() as u64;
    if let Some(limit) = target.size_limit
        && next > limit
    {
        debug!(limit, observed = next, "download passed size limit");
        return Err(TransferError::size_exceeded(limit, next));
    }
    file.write_all(block)
        .await
        .map_err(|e| TransferError::io(target.dest, e))?;
    Ok(next)
}

fn build_client(connect_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(user_agent::default_transfer_user_agent())
        .build()
}
