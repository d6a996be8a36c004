//! Video vs. document classification of a retrieved artifact.

use std::fmt;
use std::path::Path;

/// Extensions that are always sent as video.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "wmv", "flv", "3gp"];

/// How the destination should present the uploaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Streamable video.
    Video,
    /// Opaque file attachment.
    Document,
}

impl MediaKind {
    /// Stable lowercase label, also used as the HTTP sink's kind header value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller's preference for the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationHint {
    /// Always upload as video.
    Video,
    /// Always upload as a document.
    Document,
    /// Decide from the file itself.
    #[default]
    Unknown,
}

/// Resolves the classification for `path`, honouring an explicit hint.
#[must_use]
pub fn classify(hint: DestinationHint, path: &Path) -> MediaKind {
    match hint {
        DestinationHint::Video => MediaKind::Video,
        DestinationHint::Document => MediaKind::Document,
        DestinationHint::Unknown => classify_path(path),
    }
}

/// Sniffs the classification from the file extension and its guessed MIME type.
#[must_use]
pub fn classify_path(path: &Path) -> MediaKind {
    let Some(extension) = lowercase_extension(path) else {
        return MediaKind::Document;
    };
    if VIDEO_EXTENSIONS.contains(&extension.as_str())
        || guess_mime(&extension).is_some_and(|mime| mime.starts_with("video/"))
    {
        MediaKind::Video
    } else {
        MediaKind::Document
    }
}

/// Best-effort MIME type for a file path, used as the upload content type.
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    lowercase_extension(path)
        .and_then(|extension| guess_mime(&extension))
        .unwrap_or("application/octet-stream")
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
}

fn guess_mime(extension: &str) -> Option<&'static str> {
    let mime = match extension {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "3gp" => "video/3gpp",
        "mpg" | "mpeg" => "video/mpeg",
        "ts" => "video/mp2t",
        "ogv" => "video/ogg",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => return None,
    };
    Some(mime)
}
