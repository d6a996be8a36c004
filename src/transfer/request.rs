//! Transfer requests and their terminal results.

use std::fmt;
use std::str::FromStr;

use url::Url;
use uuid::Uuid;

use super::artifact::sanitize_file_name;
use super::classify::DestinationHint;
use super::error::TransferError;
use crate::size::format_size;

/// What the requester wants done with the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferMode {
    /// Never upload; always answer with the source link.
    LinkOnly,
    /// Upload when the file fits under the ceiling, otherwise link.
    #[default]
    UploadIfUnderLimit,
}

impl TransferMode {
    /// Stable label used in config files and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkOnly => "link",
            Self::UploadIfUnderLimit => "upload",
        }
    }

    /// The other mode.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::LinkOnly => Self::UploadIfUnderLimit,
            Self::UploadIfUnderLimit => Self::LinkOnly,
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "link" | "link-only" | "link_only" => Ok(Self::LinkOnly),
            "upload" | "upload-if-under-limit" | "upload_if_under_limit" => {
                Ok(Self::UploadIfUnderLimit)
            }
            other => Err(format!("unknown transfer mode '{other}' (expected 'link' or 'upload')")),
        }
    }
}

/// Why a request ended with a link instead of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkReason {
    /// The requester chose link-only mode.
    Mode,
    /// The announced size was over the ceiling.
    Size,
    /// The download phase failed.
    DownloadFailed,
    /// The downloaded file turned out to be over the ceiling.
    ActualSize,
    /// The upload phase failed.
    UploadFailed,
}

impl LinkReason {
    /// Stable machine-readable label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::Size => "size",
            Self::DownloadFailed => "download_failed",
            Self::ActualSize => "actual_size",
            Self::UploadFailed => "upload_failed",
        }
    }

    fn explanation(self) -> &'static str {
        match self {
            Self::Mode => "link-only mode is enabled",
            Self::Size => "the file is larger than the upload limit",
            Self::DownloadFailed => "the download could not be completed",
            Self::ActualSize => "the downloaded file is larger than the upload limit",
            Self::UploadFailed => "the upload could not be completed",
        }
    }
}

impl fmt::Display for LinkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to move a remote resource to a destination.
///
/// Immutable once built; the `with_*` methods consume and return the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    id: Uuid,
    source_url: String,
    expected_size_bytes: u64,
    destination_hint: DestinationHint,
    mode: TransferMode,
    caption: Option<String>,
    file_name: String,
}

impl TransferRequest {
    /// Creates a request with a fresh id and a file name taken from the URL.
    #[must_use]
    pub fn new(source_url: impl Into<String>) -> Self {
        let source_url = source_url.into();
        let file_name = file_name_from_url(&source_url);
        Self {
            id: Uuid::new_v4(),
            source_url,
            expected_size_bytes: 0,
            destination_hint: DestinationHint::Unknown,
            mode: TransferMode::default(),
            caption: None,
            file_name,
        }
    }

    /// Sets the announced size; 0 means unknown.
    #[must_use]
    pub fn with_expected_size(mut self, bytes: u64) -> Self {
        self.expected_size_bytes = bytes;
        self
    }

    /// Sets the classification hint.
    #[must_use]
    pub fn with_destination_hint(mut self, hint: DestinationHint) -> Self {
        self.destination_hint = hint;
        self
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the caption sent with the upload.
    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Overrides the file name derived from the URL.
    #[must_use]
    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = sanitize_file_name(file_name);
        self
    }

    /// Request id, unique per request.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Source URL.
    #[must_use]
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Announced size in bytes, 0 when unknown.
    #[must_use]
    pub fn expected_size_bytes(&self) -> u64 {
        self.expected_size_bytes
    }

    /// Classification hint.
    #[must_use]
    pub fn destination_hint(&self) -> DestinationHint {
        self.destination_hint
    }

    /// Requested mode.
    #[must_use]
    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Caption, if any.
    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// File name presented at the destination.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Terminal state of a request. Exactly one per request.
#[derive(Debug)]
pub enum TransferResult {
    /// The bytes reached the destination.
    Uploaded {
        /// Size of the uploaded artifact.
        final_size_bytes: u64,
    },
    /// The requester gets the source link instead of the bytes.
    LinkOnly {
        /// The source URL.
        url: String,
        /// Why no upload happened.
        reason: LinkReason,
    },
    /// Nothing useful could be delivered.
    Failed {
        /// The error that ended the request.
        error: TransferError,
    },
}

impl TransferResult {
    /// The link reason, for [`TransferResult::LinkOnly`].
    #[must_use]
    pub fn link_reason(&self) -> Option<LinkReason> {
        match self {
            Self::LinkOnly { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// One human-readable line describing the outcome.
    #[must_use]
    pub fn outcome_message(&self) -> String {
        match self {
            Self::Uploaded { final_size_bytes } => {
                format!("Uploaded ({}).", format_size(*final_size_bytes))
            }
            Self::LinkOnly { url, reason } => {
                format!("Here is a link instead because {}: {url}", reason.explanation())
            }
            Self::Failed { error } => format!("Transfer failed: {error}"),
        }
    }
}

/// Derives a file name from the last URL path segment.
fn file_name_from_url(source_url: &str) -> String {
    let segment = Url::parse(source_url).ok().and_then(|url| {
        url.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|last| !last.is_empty())
    });
    match segment {
        Some(last) => {
            let decoded = urlencoding::decode(&last).map_or(last.clone(), |d| d.into_owned());
            sanitize_file_name(&decoded)
        }
        None => "download".to_string(),
    }
}
