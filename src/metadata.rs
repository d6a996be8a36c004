//! Source metadata lookup through an opaque JSON endpoint.
//!
//! Share links usually need a third-party API call to find the direct download
//! URL and an (untrusted) size. [`JsonMetadataResolver`] makes that call
//! against a URL template and pulls the fields out with JSON pointers, so the
//! specific API shape stays in configuration.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::size::{format_size, parse_size_text};
use crate::transfer::constants::{METADATA_MAX_ATTEMPTS, METADATA_RETRY_DELAY, METADATA_TIMEOUT};
use crate::transfer::{
    AuxiliaryProducer, MediaKind, Phase, RetryPolicy, TransferError, TransferRequest,
};
use crate::user_agent;

/// Placeholder in the endpoint template replaced by the percent-encoded link.
pub const URL_PLACEHOLDER: &str = "{url}";

/// Errors from a metadata lookup.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The endpoint template has no `{url}` placeholder.
    #[error("metadata endpoint template must contain {{url}}: {template}")]
    InvalidTemplate {
        /// The offending template.
        template: String,
    },

    /// The HTTP call failed after retries.
    #[error("metadata lookup failed: {source}")]
    Fetch {
        /// The underlying transfer error.
        #[source]
        source: TransferError,
    },

    /// The endpoint answered but reported no downloadable file.
    #[error("no downloadable file found: {reason}")]
    Unavailable {
        /// What the status field said.
        reason: String,
    },

    /// A required field is missing from the response.
    #[error("metadata response has no {field}")]
    MissingField {
        /// Field name.
        field: &'static str,
    },
}

/// What the metadata endpoint said about a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Direct download URL.
    pub url: String,
    /// Announced size in bytes, 0 when unknown. Untrusted.
    pub size_hint: u64,
    /// Display title, if any.
    pub title: Option<String>,
    /// Thumbnail URL, if any.
    pub thumbnail_url: Option<String>,
}

impl SourceDescriptor {
    /// Caption with the title and announced size.
    #[must_use]
    pub fn caption(&self) -> String {
        let title = self.title.as_deref().unwrap_or("Unknown");
        let size = if self.size_hint == 0 {
            "Unknown".to_string()
        } else {
            format_size(self.size_hint)
        };
        format!("Title: {title}\nSize: {size}")
    }

    /// Builds a transfer request for this source.
    ///
    /// The title, when present, becomes the file name and the caption.
    #[must_use]
    pub fn to_request(&self) -> TransferRequest {
        let mut request =
            TransferRequest::new(self.url.clone()).with_expected_size(self.size_hint);
        if let Some(title) = &self.title {
            request = request.with_file_name(title).with_caption(self.caption());
        }
        request
    }
}

/// JSON pointers locating each field in the endpoint's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataFields {
    /// Pointer to the direct download URL (required in responses).
    pub url: String,
    /// Pointer to the size, either a byte count or text like `"12.5 MB"`.
    pub size: Option<String>,
    /// Pointer to the title.
    pub title: Option<String>,
    /// Pointer to the thumbnail URL.
    pub thumbnail: Option<String>,
    /// Pointer to a status field that must equal `status_ok`.
    pub status: Option<String>,
    /// Value the status field must hold.
    pub status_ok: Option<Value>,
}

impl Default for MetadataFields {
    fn default() -> Self {
        Self {
            url: "/url".to_string(),
            size: Some("/size".to_string()),
            title: Some("/title".to_string()),
            thumbnail: Some("/thumbnail".to_string()),
            status: None,
            status_ok: None,
        }
    }
}

/// Resolves share links through a JSON endpoint.
///
/// # Example
///
/// ```no_run
/// use mediarelay_core::metadata::JsonMetadataResolver;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let resolver = JsonMetadataResolver::new("https://api.example.com/info?url={url}")?;
/// let source = resolver
///     .resolve("https://share.example.com/s/abc", &CancellationToken::new())
///     .await?;
/// println!("{} ({} bytes)", source.url, source.size_hint);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JsonMetadataResolver {
    client: Client,
    template: String,
    fields: MetadataFields,
    policy: RetryPolicy,
}

impl JsonMetadataResolver {
    /// Creates a resolver for `template` with default field pointers.
    ///
    /// # Errors
    ///
    /// [`MetadataError::InvalidTemplate`] if the template lacks `{url}`;
    /// [`MetadataError::Fetch`] if the HTTP client cannot be built.
    pub fn new(template: impl Into<String>) -> Result<Self, MetadataError> {
        let template = template.into();
        if !template.contains(URL_PLACEHOLDER) {
            return Err(MetadataError::InvalidTemplate { template });
        }
        let client = Client::builder()
            .timeout(METADATA_TIMEOUT)
            .user_agent(user_agent::default_metadata_user_agent())
            .build()
            .map_err(|e| MetadataError::Fetch {
                source: TransferError::network(template.clone(), e),
            })?;
        Ok(Self {
            client,
            template,
            fields: MetadataFields::default(),
            policy: RetryPolicy::new(METADATA_MAX_ATTEMPTS, METADATA_RETRY_DELAY),
        })
    }

    /// Overrides the field pointers.
    #[must_use]
    pub fn with_fields(mut self, fields: MetadataFields) -> Self {
        self.fields = fields;
        self
    }

    /// Overrides the retry budget (default 3 attempts, 2 s apart).
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Looks up `link`.
    ///
    /// Transport failures, non-2xx answers and undecodable bodies are retried;
    /// a negative status field or a missing URL is not.
    ///
    /// # Errors
    ///
    /// See [`MetadataError`].
    #[instrument(skip(self, cancel))]
    pub async fn resolve(
        &self,
        link: &str,
        cancel: &CancellationToken,
    ) -> Result<SourceDescriptor, MetadataError> {
        let endpoint = self
            .template
            .replace(URL_PLACEHOLDER, &urlencoding::encode(link));
        let client = &self.client;
        let api_url = endpoint.as_str();

        let body = self
            .policy
            .run(Phase::Metadata, cancel, move |_| async move {
                fetch_json(client, api_url).await
            })
            .await
            .map_err(|source| MetadataError::Fetch { source })?;

        let descriptor = descriptor_from_json(&body, &self.fields)?;
        debug!(url = %descriptor.url, size_hint = descriptor.size_hint, "resolved source");
        Ok(descriptor)
    }
}

async fn fetch_json(client: &Client, api_url: &str) -> Result<Value, TransferError> {
    let response = client.get(api_url).send().await.map_err(|e| {
        if e.is_timeout() {
            TransferError::timeout(api_url)
        } else {
            TransferError::network(api_url, e)
        }
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::remote(api_url, status.as_u16()));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| TransferError::network(api_url, e))
}

fn descriptor_from_json(
    body: &Value,
    fields: &MetadataFields,
) -> Result<SourceDescriptor, MetadataError> {
    if let (Some(pointer), Some(expected)) = (&fields.status, &fields.status_ok) {
        let actual = body.pointer(pointer);
        if actual != Some(expected) {
            return Err(MetadataError::Unavailable {
                reason: actual.map_or_else(|| "status missing".to_string(), Value::to_string),
            });
        }
    }

    let url = string_at(body, Some(&fields.url)).ok_or(MetadataError::MissingField { field: "url" })?;
    let size_hint = fields
        .size
        .as_deref()
        .and_then(|pointer| body.pointer(pointer))
        .and_then(size_value)
        .unwrap_or(0);

    Ok(SourceDescriptor {
        url,
        size_hint,
        title: string_at(body, fields.title.as_ref()),
        thumbnail_url: string_at(body, fields.thumbnail.as_ref()),
    })
}

fn string_at(body: &Value, pointer: Option<&String>) -> Option<String> {
    pointer
        .and_then(|pointer| body.pointer(pointer))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn size_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => parse_size_text(text),
        _ => None,
    }
}

/// Downloads a known thumbnail URL next to the media file.
///
/// Thumbnails are small, so the body is read in one piece. Any failure is
/// logged and the upload proceeds without a thumbnail.
#[derive(Debug, Clone)]
pub struct ThumbnailFetcher {
    client: Client,
    url: String,
}

impl ThumbnailFetcher {
    /// Creates a fetcher for `url`.
    #[must_use]
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AuxiliaryProducer for ThumbnailFetcher {
    async fn produce(&self, media: &Path, kind: MediaKind) -> Option<PathBuf> {
        if kind != MediaKind::Video {
            return None;
        }
        let target = media.with_extension("thumb.jpg");
        let response = match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(url = %self.url, status = response.status().as_u16(), "thumbnail fetch failed");
                return None;
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "thumbnail fetch failed");
                return None;
            }
        };
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %self.url, error = %e, "thumbnail body failed");
                return None;
            }
        };
        if let Err(e) = tokio::fs::write(&target, &bytes).await {
            warn!(path = %target.display(), error = %e, "could not store thumbnail");
            return None;
        }
        Some(target)
    }
}
