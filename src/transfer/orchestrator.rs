//! The transfer pipeline: gate, download, classify, upload, clean up.
//!
//! ```text
//! Idle -> SizeCheck -> Downloading -> Classifying -> Uploading -> Cleanup -> Done
//!            |              |               |             |
//!            +-> Done(link) +-> Cleanup     +-> Cleanup   +-> Cleanup
//! ```
//!
//! Every path that allocated a temp artifact goes through Cleanup before the
//! result is returned. The orchestrator holds no per-request state, so one
//! instance can serve many concurrent requests.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::artifact::{AuxiliaryProducer, TempArtifact};
use super::classify::classify;
use super::client::{DownloadTarget, HttpClient};
use super::config::TransferConfig;
use super::error::TransferError;
use super::progress::{Phase, ProgressCallback};
use super::request::{LinkReason, TransferMode, TransferRequest, TransferResult};
use super::sink::DestinationSink;
use super::upload::{ChunkedUploader, UploadSource};

/// Runs transfer requests end to end.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct TransferOrchestrator {
    config: Arc<TransferConfig>,
    client: HttpClient,
    uploader: ChunkedUploader,
    auxiliary: Option<Arc<dyn AuxiliaryProducer>>,
}

impl std::fmt::Debug for TransferOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOrchestrator")
            .field("config", &self.config)
            .field("has_auxiliary_producer", &self.auxiliary.is_some())
            .finish_non_exhaustive()
    }
}

impl TransferOrchestrator {
    /// Creates an orchestrator with its own HTTP client.
    #[must_use]
    pub fn new(config: TransferConfig) -> Self {
        let client = HttpClient::from_config(&config);
        Self::with_client(config, client)
    }

    /// Creates an orchestrator around an existing [`HttpClient`].
    #[must_use]
    pub fn with_client(config: TransferConfig, client: HttpClient) -> Self {
        let uploader = ChunkedUploader::from_config(&config);
        Self {
            config: Arc::new(config),
            client,
            uploader,
            auxiliary: None,
        }
    }

    /// Installs a producer for side files such as thumbnails.
    #[must_use]
    pub fn with_auxiliary_producer(mut self, producer: Arc<dyn AuxiliaryProducer>) -> Self {
        self.auxiliary = Some(producer);
        self
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Runs `request` to exactly one terminal result.
    ///
    /// Never returns an error: failures become [`TransferResult::LinkOnly`] or
    /// [`TransferResult::Failed`]. Cancellation yields
    /// `Failed { error: Cancelled }` after cleanup.
    #[instrument(skip_all, fields(request_id = %request.id(), url = %request.source_url()))]
    pub async fn execute(
        &self,
        request: &TransferRequest,
        sink: &dyn DestinationSink,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> TransferResult {
        debug!(state = "size_check", mode = %request.mode(), expected = request.expected_size_bytes());
        if request.mode() == TransferMode::LinkOnly {
            return link(request, LinkReason::Mode);
        }
        let ceiling = self.config.upload_ceiling_bytes;
        if request.expected_size_bytes() > ceiling {
            debug!(ceiling, "announced size over ceiling");
            return link(request, LinkReason::Size);
        }

        let mut artifact =
            match TempArtifact::allocate(&self.config.temp_dir, request.id(), request.file_name())
                .await
            {
                Ok(artifact) => artifact,
                Err(error) => return self.download_failed(request, error),
            };

        let result = self
            .run_phases(request, sink, &mut artifact, on_progress, cancel)
            .await;

        debug!(state = "cleanup");
        artifact.cleanup().await;

        match &result {
            TransferResult::Uploaded { final_size_bytes } => {
                info!(bytes = final_size_bytes, "transfer uploaded");
            }
            TransferResult::LinkOnly { reason, .. } => info!(%reason, "transfer degraded to link"),
            TransferResult::Failed { error } => warn!(error = %error, "transfer failed"),
        }
        result
    }

    async fn run_phases(
        &self,
        request: &TransferRequest,
        sink: &dyn DestinationSink,
        artifact: &mut TempArtifact,
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> TransferResult {
        let ceiling = self.config.upload_ceiling_bytes;
        let policy = self.config.retry_policy();

        debug!(state = "downloading");
        let client = &self.client;
        let url = request.source_url();
        let dest = artifact.path();
        let size_hint = request.expected_size_bytes();
        let downloaded = policy
            .run(Phase::Download, cancel, move |state| async move {
                let target = DownloadTarget {
                    url,
                    dest,
                    size_hint,
                    size_limit: Some(ceiling),
                    attempt: state.attempt,
                };
                client.download(&target, on_progress, cancel).await
            })
            .await;

        let written = match downloaded {
            Ok(written) => written,
            Err(error) if error.is_cancelled() => return cancelled(),
            Err(TransferError::SizeExceeded { limit, actual }) => {
                debug!(limit, actual, "download passed the ceiling");
                return link(request, LinkReason::ActualSize);
            }
            Err(error) => return self.download_failed(request, error),
        };

        debug!(state = "classifying", written);
        let actual = match tokio::fs::metadata(artifact.path()).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(error = %e, "could not re-measure artifact, using byte count");
                written
            }
        };
        if actual > ceiling {
            debug!(ceiling, actual, "downloaded size over ceiling");
            return link(request, LinkReason::ActualSize);
        }
        let kind = classify(request.destination_hint(), artifact.path());

        if let Some(producer) = &self.auxiliary {
            let produced = tokio::select! {
                biased;
                () = cancel.cancelled() => return cancelled(),
                produced = producer.produce(artifact.path(), kind) => produced,
            };
            if let Some(path) = produced {
                debug!(path = %path.display(), "auxiliary file attached");
                artifact.add_auxiliary(path);
            }
        }

        debug!(state = "uploading", %kind, actual);
        let uploader = &self.uploader;
        let path: &Path = artifact.path();
        let auxiliary = artifact.auxiliary().first().map(std::path::PathBuf::as_path);
        let caption = request.caption();
        let file_name = request.file_name();
        let uploaded = policy
            .run(Phase::Upload, cancel, move |state| async move {
                let source = UploadSource {
                    path,
                    kind,
                    caption,
                    file_name,
                    auxiliary,
                    attempt: state.attempt,
                };
                uploader.upload(&source, sink, on_progress, cancel).await
            })
            .await;

        match uploaded {
            Ok(_) => TransferResult::Uploaded {
                final_size_bytes: actual,
            },
            Err(error) if error.is_cancelled() => cancelled(),
            Err(error) => {
                warn!(error = %error, "upload failed, answering with link");
                link(request, LinkReason::UploadFailed)
            }
        }
    }

    fn download_failed(&self, request: &TransferRequest, error: TransferError) -> TransferResult {
        if self.config.allow_link_fallback {
            warn!(error = %error, "download failed, answering with link");
            link(request, LinkReason::DownloadFailed)
        } else {
            TransferResult::Failed { error }
        }
    }
}

fn link(request: &TransferRequest, reason: LinkReason) -> TransferResult {
    debug!(state = "done", %reason, "link only");
    TransferResult::LinkOnly {
        url: request.source_url().to_string(),
        reason,
    }
}

fn cancelled() -> TransferResult {
    debug!(state = "done", "cancelled");
    TransferResult::Failed {
        error: TransferError::Cancelled,
    }
}
