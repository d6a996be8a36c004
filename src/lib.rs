//! mediarelay core library
//!
//! Moves a remote file to a destination in two bounded-memory phases
//! (download into a temp file, then upload from it), degrading to a plain
//! link whenever the bytes cannot or should not be delivered.
//!
//! # Architecture
//!
//! - [`transfer`] - chunked download/upload engine, retry policy, progress
//!   throttling and the orchestrator that ties them together
//! - [`metadata`] - optional JSON lookup turning a page link into a direct
//!   file URL with size hint, title and thumbnail
//! - [`prefs`] - per-user transfer mode store
//! - [`size`] - human-readable byte sizes

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod metadata;
pub mod prefs;
pub mod size;
#[cfg(test)]
pub(crate) mod test_support;
pub mod transfer;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use metadata::{JsonMetadataResolver, MetadataError, SourceDescriptor, ThumbnailFetcher};
pub use prefs::{InMemoryModeStore, ModeStore};
pub use size::{format_size, parse_size_text};
pub use transfer::{
    DestinationSink, DirectorySink, HttpSink, LinkReason, ProgressCallback, ProgressEvent,
    TransferConfig, TransferError, TransferMode, TransferOrchestrator, TransferRequest,
    TransferResult,
};
