//! Chunked upload of a local artifact to a [`DestinationSink`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::classify::MediaKind;
use super::config::TransferConfig;
use super::error::TransferError;
use super::progress::{Phase, ProgressCallback, ProgressReporter, ThrottleSettings};
use super::sink::{DestinationSink, SinkError, SinkUpload};
use crate::size::format_size;

/// One upload attempt's parameters.
#[derive(Debug, Clone, Copy)]
pub struct UploadSource<'a> {
    /// File to read.
    pub path: &'a Path,
    /// Classification passed to the sink.
    pub kind: MediaKind,
    /// Caption passed to the sink.
    pub caption: Option<&'a str>,
    /// Name presented at the destination.
    pub file_name: &'a str,
    /// Optional side file passed to the sink.
    pub auxiliary: Option<&'a Path>,
    /// Attempt number (1-indexed) stamped on progress events.
    pub attempt: u32,
}

/// Streams a local file to a sink in fixed-size blocks.
#[derive(Debug, Clone)]
pub struct ChunkedUploader {
    chunk_size: usize,
    throttle: ThrottleSettings,
    attempt_timeout: Duration,
}

impl ChunkedUploader {
    /// Creates an uploader from the engine configuration.
    #[must_use]
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            throttle: config.throttle_settings(),
            attempt_timeout: config.overall_timeout,
        }
    }

    /// Runs one upload attempt and returns the number of bytes offered.
    ///
    /// The sink's declared `max_upload_bytes` is checked before the file is
    /// opened, so an oversized artifact never moves a byte.
    ///
    /// # Errors
    ///
    /// - [`TransferError::SinkRejected`] when the sink refuses the payload
    /// - [`TransferError::Network`] for sink transport failures
    /// - [`TransferError::Io`] when the artifact cannot be read
    /// - [`TransferError::Timeout`] when the attempt outlives the overall timeout
    /// - [`TransferError::Cancelled`] as soon as `cancel` fires
    #[instrument(skip(self, sink, on_progress, cancel), fields(path = %source.path.display(), sink = sink.name(), attempt = source.attempt))]
    pub async fn upload(
        &self,
        source: &UploadSource<'_>,
        sink: &dyn DestinationSink,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let len = tokio::fs::metadata(source.path)
            .await
            .map_err(|e| TransferError::io(source.path, e))?
            .len();

        if let Some(limit) = sink.max_upload_bytes()
            && len > limit
        {
            return Err(TransferError::sink_rejected(format!(
                "{} accepts at most {}, file is {}",
                sink.name(),
                format_size(limit),
                format_size(len)
            )));
        }

        let attempt = tokio::time::timeout(
            self.attempt_timeout,
            self.upload_inner(source, len, sink, on_progress),
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("upload cancelled mid-stream");
                Err(TransferError::Cancelled)
            }
            result = attempt => result.unwrap_or_else(|_| Err(TransferError::timeout(sink.name()))),
        }
    }

    async fn upload_inner(
        &self,
        source: &UploadSource<'_>,
        len: u64,
        sink: &dyn DestinationSink,
        on_progress: &ProgressCallback,
    ) -> Result<u64, TransferError> {
        let file = File::open(source.path)
            .await
            .map_err(|e| TransferError::io(source.path, e))?;
        let reporter =
            ProgressReporter::new(Phase::Upload, source.attempt, self.throttle, on_progress.clone());

        let upload = SinkUpload {
            body: block_stream(file, self.chunk_size, len, reporter),
            len,
            kind: source.kind,
            caption: source.caption.map(str::to_string),
            file_name: source.file_name.to_string(),
            auxiliary: source.auxiliary.map(Path::to_path_buf),
        };
        debug!(len, kind = %source.kind, "handing stream to sink");

        sink.send(upload).await.map_err(|e| match e {
            SinkError::Rejected { reason } => TransferError::sink_rejected(reason),
            SinkError::Transport { message } => TransferError::network(sink.name(), message),
            SinkError::Io { source: io_error } => {
                TransferError::io(PathBuf::from(sink.name()), io_error)
            }
        })?;

        info!(bytes = len, "upload complete");
        Ok(len)
    }
}

struct BlockReader {
    file: File,
    chunk_size: usize,
    total: u64,
    sent: u64,
    reporter: ProgressReporter,
}

/// Reads `file` as a stream of `chunk_size` blocks, reporting each one.
fn block_stream(
    file: File,
    chunk_size: usize,
    total: u64,
    reporter: ProgressReporter,
) -> super::sink::ByteStream {
    let state = BlockReader {
        file,
        chunk_size,
        total,
        sent: 0,
        reporter,
    };
    stream::try_unfold(state, next_block).boxed()
}

async fn next_block(mut state: BlockReader) -> std::io::Result<Option<(Bytes, BlockReader)>> {
    let mut block = BytesMut::with_capacity(state.chunk_size);
    while block.len() < state.chunk_size {
        if state.file.read_buf(&mut block).await? == 0 {
            break;
        }
    }
    if block.is_empty() {
        state.reporter.finish(state.sent);
        return Ok(None);
    }
    state.sent += block.len() as u64;
    state.reporter.record(state.sent, state.total);
    Ok(Some((block.freeze(), state)))
}
