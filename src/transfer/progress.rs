//! Progress events and the throttle that decides when to emit them.
//!
//! Transfers produce a byte count after every chunk, far more often than a
//! chat message or terminal line should be redrawn. [`ProgressThrottle`] gates
//! emission on three triggers (percentage advance, byte advance, elapsed
//! time) plus two unconditional cases: unknown totals and the final chunk.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::size::format_size;

use super::constants::{
    DEFAULT_PROGRESS_BYTE_FLOOR, DEFAULT_PROGRESS_PERCENT_THRESHOLD,
    DEFAULT_PROGRESS_TIME_CEILING,
};

/// Callback receiving throttle-approved progress events.
///
/// Invoked synchronously on the transfer path; keep it short or hand the
/// event off to another task.
///
/// `bytes_done` never decreases within one attempt. A retry starts a new
/// attempt from zero, so consumers that draw a bar should reset it when
/// [`ProgressEvent::attempt`] changes.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Returns a callback that drops every event.
#[must_use]
pub fn noop_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// Pipeline phase an event or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Fetching the source into the temp artifact.
    Download,
    /// Pushing the temp artifact to the destination.
    Upload,
    /// Resolving a page link into a direct file URL. Never reports progress.
    Metadata,
}

impl Phase {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of one phase's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Phase being reported.
    pub phase: Phase,
    /// Bytes transferred so far in this attempt.
    pub bytes_done: u64,
    /// Total bytes, or 0 when unknown.
    pub bytes_total: u64,
    /// Attempt number (1-indexed).
    pub attempt: u32,
    /// Time since the attempt started.
    pub elapsed: Duration,
}

impl ProgressEvent {
    /// Completed fraction in `0.0..=1.0`, or `None` when the total is unknown.
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        if self.bytes_total == 0 {
            return None;
        }
        Some(fraction(self.bytes_done, self.bytes_total).min(1.0))
    }

    /// Average throughput since the attempt started.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / secs
    }

    /// Estimated time to completion at the current average rate.
    ///
    /// `None` when the total is unknown or nothing has moved yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn eta(&self) -> Option<Duration> {
        if self.bytes_total == 0 {
            return None;
        }
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        let remaining = self.bytes_total.saturating_sub(self.bytes_done) as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }

    /// One-line human summary, e.g.
    /// `Downloading 1.00 MB / 4.00 MB (25.0%) at 512.00 KB/s, ETA 6s`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn status_line(&self) -> String {
        let verb = match self.phase {
            Phase::Download => "Downloading",
            Phase::Upload => "Uploading",
            Phase::Metadata => "Resolving",
        };
        let speed = format_size(self.bytes_per_second() as u64);
        let mut line = match self.fraction() {
            Some(fraction) => format!(
                "{verb} {} / {} ({:.1}%) at {speed}/s",
                format_size(self.bytes_done),
                format_size(self.bytes_total),
                fraction * 100.0
            ),
            None => format!("{verb} {} at {speed}/s", format_size(self.bytes_done)),
        };
        if let Some(eta) = self.eta() {
            line.push_str(&format!(", ETA {}s", eta.as_secs()));
        }
        if self.attempt > 1 {
            line.push_str(&format!(" (attempt {})", self.attempt));
        }
        line
    }
}

/// Thresholds for [`ProgressThrottle`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleSettings {
    /// Percentage-point advance that forces an event.
    pub percent_threshold: f64,
    /// Byte advance that forces an event.
    pub byte_floor: u64,
    /// Maximum silence between events.
    pub time_ceiling: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            percent_threshold: DEFAULT_PROGRESS_PERCENT_THRESHOLD,
            byte_floor: DEFAULT_PROGRESS_BYTE_FLOOR,
            time_ceiling: DEFAULT_PROGRESS_TIME_CEILING,
        }
    }
}

/// Fraction value below any real fraction, so the first check always fires.
const UNREPORTED_FRACTION: f64 = -1.0;

/// Decides whether a progress update is worth emitting.
///
/// State only changes when an event is emitted. Use one throttle per phase.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    settings: ThrottleSettings,
    last_fraction: f64,
    last_bytes: u64,
    last_time: Option<Instant>,
}

impl ProgressThrottle {
    /// Creates a throttle that has not reported anything yet.
    #[must_use]
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            last_fraction: UNREPORTED_FRACTION,
            last_bytes: 0,
            last_time: None,
        }
    }

    /// Returns true when an event for `bytes_done` should be emitted at `now`.
    ///
    /// Emits when any of these hold:
    /// - `bytes_total` is 0 (unknown total)
    /// - the fraction advanced by at least the percent threshold
    /// - at least `byte_floor` bytes moved since the last event
    /// - `bytes_done == bytes_total` (final event)
    /// - at least `time_ceiling` passed since the last event
    pub fn should_emit(&mut self, bytes_done: u64, bytes_total: u64, now: Instant) -> bool {
        let current = if bytes_total == 0 {
            UNREPORTED_FRACTION
        } else {
            fraction(bytes_done, bytes_total)
        };

        let emit = bytes_total == 0
            || (current - self.last_fraction) * 100.0 >= self.settings.percent_threshold
            || bytes_done.saturating_sub(self.last_bytes) >= self.settings.byte_floor
            || bytes_done == bytes_total
            || self
                .last_time
                .is_none_or(|last| now.saturating_duration_since(last) >= self.settings.time_ceiling);

        if emit {
            self.last_fraction = current;
            self.last_bytes = bytes_done;
            self.last_time = Some(now);
        }
        emit
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(done: u64, total: u64) -> f64 {
    done as f64 / total as f64
}

/// Per-attempt glue between a transfer loop, its throttle and the callback.
///
/// Keeps `bytes_done` non-decreasing and guarantees a closing event for the
/// final byte count even when the announced total turned out to be wrong.
pub(crate) struct ProgressReporter {
    phase: Phase,
    attempt: u32,
    throttle: ProgressThrottle,
    callback: ProgressCallback,
    started: Instant,
    last_done: u64,
    last_emitted: Option<u64>,
}

impl ProgressReporter {
    pub(crate) fn new(
        phase: Phase,
        attempt: u32,
        settings: ThrottleSettings,
        callback: ProgressCallback,
    ) -> Self {
        Self {
            phase,
            attempt,
            throttle: ProgressThrottle::new(settings),
            callback,
            started: Instant::now(),
            last_done: 0,
            last_emitted: None,
        }
    }

    /// Records a new byte count, emitting through the throttle.
    pub(crate) fn record(&mut self, bytes_done: u64, bytes_total: u64) {
        let bytes_done = bytes_done.max(self.last_done);
        self.last_done = bytes_done;
        let now = Instant::now();
        if self.throttle.should_emit(bytes_done, bytes_total, now) {
            self.emit(bytes_done, bytes_total, now);
        }
    }

    /// Emits a closing event for `bytes_done` unless one was already sent.
    pub(crate) fn finish(&mut self, bytes_done: u64) {
        let bytes_done = bytes_done.max(self.last_done);
        if self.last_emitted != Some(bytes_done) {
            self.emit(bytes_done, bytes_done, Instant::now());
        }
    }

    fn emit(&mut self, bytes_done: u64, bytes_total: u64, now: Instant) {
        self.last_emitted = Some(bytes_done);
        (self.callback)(ProgressEvent {
            phase: self.phase,
            bytes_done,
            bytes_total,
            attempt: self.attempt,
            elapsed: now.saturating_duration_since(self.started),
        });
    }
}
