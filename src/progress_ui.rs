//! Progress UI (spinner) for a transfer run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use mediarelay_core::transfer::{Phase, ProgressCallback, ProgressEvent};

/// Builds the spinner and the callback that feeds it.
///
/// When `use_spinner` is false the bar is hidden and the callback only logs.
pub(crate) fn progress_ui(use_spinner: bool) -> (ProgressBar, ProgressCallback) {
    let spinner = if use_spinner {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Starting...");
        spinner
    } else {
        ProgressBar::hidden()
    };

    let target = spinner.clone();
    let current: Mutex<Option<(Phase, u32)>> = Mutex::new(None);
    let callback: ProgressCallback = Arc::new(move |event: ProgressEvent| {
        tracing::trace!(
            phase = %event.phase,
            attempt = event.attempt,
            done = event.bytes_done,
            total = event.bytes_total,
            "progress"
        );
        // Byte counts restart at zero on every phase and retry attempt.
        if let Ok(mut current) = current.lock() {
            let key = Some((event.phase, event.attempt));
            if *current != key {
                target.reset();
                *current = key;
            }
        }
        if event.bytes_total > 0 {
            target.set_length(event.bytes_total);
        }
        target.set_position(event.bytes_done);
        target.set_message(event.status_line());
    });
    (spinner, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ProgressEvent {
        ProgressEvent {
            phase: Phase::Download,
            bytes_done: 512,
            bytes_total: 1024,
            attempt: 1,
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn progress_ui_when_disabled_is_hidden_and_callback_is_safe() {
        let (bar, callback) = progress_ui(false);
        assert!(bar.is_hidden());
        callback(event());
        assert!(bar.message().starts_with("Downloading"));
    }

    #[test]
    fn progress_ui_restarts_position_on_retry_attempt() {
        let (bar, callback) = progress_ui(false);
        callback(ProgressEvent {
            bytes_done: 800,
            ..event()
        });
        assert_eq!(bar.position(), 800);

        callback(ProgressEvent {
            bytes_done: 100,
            attempt: 2,
            ..event()
        });
        assert_eq!(bar.position(), 100);
        assert!(bar.message().contains("(attempt 2)"), "{}", bar.message());
    }

    #[test]
    fn progress_ui_callback_updates_message() {
        let (bar, callback) = progress_ui(true);
        callback(event());
        assert_eq!(bar.message(), event().status_line());
        bar.finish_and_clear();
    }
}
