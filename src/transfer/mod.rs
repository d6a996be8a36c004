//! Chunked transfer engine.
//!
//! # Overview
//!
//! A request moves through two bounded-memory phases:
//! - download: streaming GET into a request-scoped temp file ([`HttpClient`])
//! - upload: the temp file streamed to a [`DestinationSink`] ([`ChunkedUploader`])
//!
//! Each phase runs under its own [`RetryPolicy`] budget and reports through a
//! fresh [`ProgressThrottle`]. [`TransferOrchestrator`] gates on mode and size,
//! sequences the phases, degrades to a link when the bytes cannot be
//! delivered, and always removes the temp artifact.
//!
//! # Example
//!
//! ```no_run
//! use mediarelay_core::transfer::{
//!     DirectorySink, TransferConfig, TransferOrchestrator, TransferRequest, noop_progress,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let orchestrator = TransferOrchestrator::new(TransferConfig::default());
//! let request = TransferRequest::new("https://example.com/video.mp4").with_expected_size(10_000_000);
//! let sink = DirectorySink::new("./received");
//!
//! let result = orchestrator
//!     .execute(&request, &sink, &noop_progress(), &CancellationToken::new())
//!     .await;
//! println!("{}", result.outcome_message());
//! # }
//! ```

mod artifact;
mod classify;
mod client;
mod config;
pub mod constants;
mod error;
mod orchestrator;
mod progress;
mod request;
mod retry;
mod sink;
mod upload;

pub use artifact::{AuxiliaryProducer, TempArtifact};
pub use classify::{DestinationHint, MediaKind, classify, classify_path, mime_for_path};
pub use client::{DownloadTarget, HttpClient};
pub use config::{ConfigError, TransferConfig};
pub use error::TransferError;
pub use orchestrator::TransferOrchestrator;
pub use progress::{
    Phase, ProgressCallback, ProgressEvent, ProgressThrottle, ThrottleSettings, noop_progress,
};
pub use request::{LinkReason, TransferMode, TransferRequest, TransferResult};
pub use retry::{FailureType, RetryDecision, RetryPolicy, RetryState, classify_error};
pub use sink::{
    ByteStream, CAPTION_HEADER, DestinationSink, DirectorySink, FILE_NAME_HEADER, HttpSink,
    MEDIA_KIND_HEADER, SinkError, SinkUpload,
};
pub use upload::{ChunkedUploader, UploadSource};
