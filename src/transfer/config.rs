//! Runtime configuration for the transfer engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::constants::{
    CONNECT_TIMEOUT, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS, DEFAULT_OVERALL_TIMEOUT,
    DEFAULT_PROGRESS_BYTE_FLOOR, DEFAULT_PROGRESS_PERCENT_THRESHOLD,
    DEFAULT_PROGRESS_TIME_CEILING, DEFAULT_RETRY_DELAY, DEFAULT_UPLOAD_CEILING_BYTES,
    TEMP_DIR_NAME,
};
use super::progress::ThrottleSettings;
use super::retry::RetryPolicy;

/// Largest accepted chunk size (64 MiB); bigger chunks defeat bounded memory.
const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Largest accepted attempt budget per phase.
const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field is outside its accepted range.
    #[error("invalid value for `{field}`: {value} (expected {expected})")]
    OutOfRange {
        /// Field name as it appears in config files.
        field: &'static str,
        /// Offending value, rendered.
        value: String,
        /// Accepted range, rendered.
        expected: &'static str,
    },
}

impl ConfigError {
    fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Parameters shared by every transfer the engine runs.
///
/// One table replaces the per-script constants (chunk size, retry count,
/// delays, ceilings) so every caller drives the same engine.
///
/// # Default Values
///
/// - `chunk_size`: 4 MiB
/// - `max_attempts`: 3
/// - `retry_delay`: 5 seconds
/// - `upload_ceiling_bytes`: 50 MB
/// - `progress_percent_threshold`: 5 points
/// - `progress_byte_floor`: 10 MiB
/// - `progress_time_ceiling`: 3 seconds
/// - `overall_timeout`: 60 minutes
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Block size for reads and writes in both phases.
    pub chunk_size: usize,
    /// Attempts per phase, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Largest artifact the orchestrator will try to upload.
    pub upload_ceiling_bytes: u64,
    /// Percentage-point advance that forces a progress event.
    pub progress_percent_threshold: f64,
    /// Byte advance that forces a progress event.
    pub progress_byte_floor: u64,
    /// Maximum silence between progress events.
    pub progress_time_ceiling: Duration,
    /// Wall-clock ceiling for one download or upload attempt.
    pub overall_timeout: Duration,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// Directory holding request-scoped temp artifacts.
    pub temp_dir: PathBuf,
    /// Degrade to a link when the download phase fails instead of failing.
    pub allow_link_fallback: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            upload_ceiling_bytes: DEFAULT_UPLOAD_CEILING_BYTES,
            progress_percent_threshold: DEFAULT_PROGRESS_PERCENT_THRESHOLD,
            progress_byte_floor: DEFAULT_PROGRESS_BYTE_FLOOR,
            progress_time_ceiling: DEFAULT_PROGRESS_TIME_CEILING,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            temp_dir: std::env::temp_dir().join(TEMP_DIR_NAME),
            allow_link_fallback: true,
        }
    }
}

impl TransferConfig {
    /// Checks every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::out_of_range(
                "chunk_size",
                self.chunk_size,
                "1..=67108864",
            ));
        }
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.max_attempts) {
            return Err(ConfigError::out_of_range(
                "max_attempts",
                self.max_attempts,
                "1..=10",
            ));
        }
        if self.upload_ceiling_bytes == 0 {
            return Err(ConfigError::out_of_range(
                "upload_ceiling_bytes",
                self.upload_ceiling_bytes,
                "greater than 0",
            ));
        }
        if !(self.progress_percent_threshold > 0.0 && self.progress_percent_threshold <= 100.0) {
            return Err(ConfigError::out_of_range(
                "progress_percent_threshold",
                self.progress_percent_threshold,
                "(0, 100]",
            ));
        }
        if self.progress_byte_floor == 0 {
            return Err(ConfigError::out_of_range(
                "progress_byte_floor",
                self.progress_byte_floor,
                "greater than 0",
            ));
        }
        if self.overall_timeout.is_zero() {
            return Err(ConfigError::out_of_range(
                "overall_timeout_secs",
                self.overall_timeout.as_secs(),
                "greater than 0",
            ));
        }
        Ok(())
    }

    /// Retry policy for one phase, built from `max_attempts` and `retry_delay`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay)
    }

    /// Throttle thresholds for progress events.
    #[must_use]
    pub fn throttle_settings(&self) -> ThrottleSettings {
        ThrottleSettings {
            percent_threshold: self.progress_percent_threshold,
            byte_floor: self.progress_byte_floor,
            time_ceiling: self.progress_time_ceiling,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_values() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, 4_194_304);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.progress_byte_floor, 10_485_760);
        assert_eq!(config.progress_time_ceiling, Duration::from_secs(3));
        assert!((config.progress_percent_threshold - 5.0).abs() < f64::EPSILON);
        assert!(config.allow_link_fallback);
        assert!(config.temp_dir.ends_with("mediarelay"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(TransferConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = TransferConfig {
            chunk_size: 0,
            ..TransferConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_size"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = TransferConfig {
            max_attempts: 0,
            ..TransferConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "max_attempts",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_percent_threshold_over_100() {
        let config = TransferConfig {
            progress_percent_threshold: 150.0,
            ..TransferConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_uses_configured_budget() {
        let config = TransferConfig {
            max_attempts: 5,
            retry_delay: Duration::from_millis(250),
            ..TransferConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay(), Duration::from_millis(250));
    }
}
