//! Defaults for the transfer engine (chunking, retry, progress, timeouts).

use std::time::Duration;

/// Chunk size for both download and upload (4 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Attempts per phase, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upload ceiling for bot-style transports (50 MB).
pub const DEFAULT_UPLOAD_CEILING_BYTES: u64 = 50 * 1024 * 1024;

/// Upload ceiling for transports that accept large files (2 GB).
pub const LARGE_UPLOAD_CEILING_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Minimum progress advance, in percentage points, that forces an event.
pub const DEFAULT_PROGRESS_PERCENT_THRESHOLD: f64 = 5.0;

/// Minimum byte advance that forces an event (10 MiB).
pub const DEFAULT_PROGRESS_BYTE_FLOOR: u64 = 10 * 1024 * 1024;

/// Maximum silence between two progress events.
pub const DEFAULT_PROGRESS_TIME_CEILING: Duration = Duration::from_secs(3);

/// Wall-clock ceiling for a single download or upload attempt (60 minutes).
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(3600);

/// HTTP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Directory name created under the OS temp dir for transfer artifacts.
pub const TEMP_DIR_NAME: &str = "mediarelay";

/// Attempts for a metadata lookup.
pub const METADATA_MAX_ATTEMPTS: u32 = 3;

/// Delay between metadata lookup attempts.
pub const METADATA_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Per-request timeout for metadata lookups.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(60);
