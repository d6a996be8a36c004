//! Request-scoped temporary files.
//!
//! A [`TempArtifact`] owns the downloaded file and any auxiliary files derived
//! from it (a thumbnail, for instance). Only the orchestrator deletes it, via
//! [`TempArtifact::cleanup`]; if the owning future is dropped before that
//! happens, the `Drop` impl removes the files synchronously instead.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::classify::MediaKind;
use super::error::TransferError;

/// Longest file name component kept after sanitizing.
const MAX_FILE_NAME_CHARS: usize = 120;

/// Hex characters of the per-run suffix.
const RUN_SUFFIX_CHARS: usize = 12;

/// Derives a side file from a downloaded artifact.
///
/// Implementations typically shell out to an external tool; the produced
/// path is registered on the artifact and removed during cleanup whether or
/// not the upload succeeds.
#[async_trait]
pub trait AuxiliaryProducer: Send + Sync {
    /// Produces an auxiliary file for `media`, or `None` when there is nothing
    /// to attach. Failures are the producer's to log; they never fail the
    /// transfer.
    async fn produce(&self, media: &Path, kind: MediaKind) -> Option<PathBuf>;
}

/// Temporary storage for one transfer request.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    auxiliary: Vec<PathBuf>,
    cleaned: bool,
}

impl TempArtifact {
    /// Reserves `{temp_dir}/{request_id}-{run}-{file_name}`, creating
    /// `temp_dir` if needed. `run` is fresh per call, so executing the same
    /// request twice at once never shares a path. The file itself is created
    /// by the download phase.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Io`] if the directory cannot be created.
    pub async fn allocate(
        temp_dir: &Path,
        request_id: Uuid,
        file_name: &str,
    ) -> Result<Self, TransferError> {
        tokio::fs::create_dir_all(temp_dir)
            .await
            .map_err(|e| TransferError::io(temp_dir, e))?;
        let run = Uuid::new_v4().simple().to_string();
        let path = temp_dir.join(format!(
            "{request_id}-{}-{}",
            &run[..RUN_SUFFIX_CHARS],
            sanitize_file_name(file_name)
        ));
        debug!(path = %path.display(), "allocated temp artifact");
        Ok(Self {
            path,
            auxiliary: Vec::new(),
            cleaned: false,
        })
    }

    /// Path of the primary artifact.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers a derived file for deletion during cleanup.
    pub fn add_auxiliary(&mut self, path: PathBuf) {
        self.auxiliary.push(path);
    }

    /// Derived files registered so far.
    #[must_use]
    pub fn auxiliary(&self) -> &[PathBuf] {
        &self.auxiliary
    }

    /// True once [`cleanup`](Self::cleanup) has run.
    #[must_use]
    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned
    }

    /// Deletes the artifact and every auxiliary file.
    ///
    /// Missing files are ignored; other deletion errors are logged and
    /// swallowed. Returns `true` when this call performed the cleanup and
    /// `false` when it had already happened.
    pub async fn cleanup(&mut self) -> bool {
        if self.cleaned {
            return false;
        }
        self.cleaned = true;

        for path in std::iter::once(&self.path).chain(self.auxiliary.iter()) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "removed temp file"),
                Err(e) => log_removal_error(path, &e),
            }
        }
        true
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        debug!(path = %self.path.display(), "temp artifact dropped before cleanup");
        for path in std::iter::once(&self.path).chain(self.auxiliary.iter()) {
            if let Err(e) = std::fs::remove_file(path) {
                log_removal_error(path, &e);
            }
        }
    }
}

pub(crate) fn log_removal_error(path: &Path, error: &std::io::Error) {
    if error.kind() == ErrorKind::NotFound {
        debug!(path = %path.display(), "temp file already absent");
    } else {
        warn!(path = %path.display(), error = %error, "failed to remove temp file");
    }
}

/// Makes `name` safe as a single path component.
///
/// Separators, reserved characters and control characters become `_`; a name
/// made only of dots is neutralised so it cannot walk out of the temp dir.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();

    let trimmed = sanitized.trim();
    if trimmed.is_empty() {
        return "download".to_string();
    }
    if trimmed.chars().all(|c| c == '.') {
        return trimmed.replace('.', "_");
    }
    trimmed.to_string()
}
