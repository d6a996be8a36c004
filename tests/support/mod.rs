//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use mediarelay_core::transfer::{
    DestinationSink, ProgressCallback, ProgressEvent, SinkError, SinkUpload, TransferConfig,
};
use wiremock::MockServer;

/// Starts a mock server, or returns `None` when localhost sockets are
/// unavailable. Set `MEDIARELAY_REQUIRE_SOCKET_TESTS=1` to panic instead.
#[track_caller]
pub fn socket_available() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return true;
    }
    let required = std::env::var("MEDIARELAY_REQUIRE_SOCKET_TESTS")
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    let location = std::panic::Location::caller();
    assert!(
        !required,
        "[socket-bound-test] cannot bind localhost socket at {location}"
    );
    eprintln!("[socket-bound-test] cannot bind localhost socket at {location}. Skipping test.");
    false
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if socket_available() {
        Some(MockServer::start().await)
    } else {
        None
    }
}

/// Serves one response that announces `announced` bytes, sends `sent` of
/// them, then holds the connection open without finishing the body.
///
/// Runs on a plain thread so the stall survives whatever the test runtime
/// does. Returns the URL to fetch, or `None` when sockets are unavailable.
pub fn serve_stalled_body(announced: usize, sent: usize) -> Option<String> {
    if !socket_available() {
        return None;
    }
    let listener = TcpListener::bind("127.0.0.1:0").ok()?;
    let addr = listener.local_addr().ok()?;
    std::thread::spawn(move || {
        let Ok((mut socket, _)) = listener.accept() else {
            return;
        };
        let mut head = Vec::new();
        let mut buf = [0_u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {announced}\r\n\r\n");
        if socket.write_all(response.as_bytes()).is_err()
            || socket.write_all(&vec![9_u8; sent]).is_err()
            || socket.flush().is_err()
        {
            return;
        }
        // Hold the socket until the client hangs up.
        while matches!(socket.read(&mut buf), Ok(n) if n > 0) {}
    });
    Some(format!("http://{addr}/stalled.mp4"))
}

/// Engine config rooted in `root`, with a short retry delay.
pub fn test_config(root: &Path) -> TransferConfig {
    TransferConfig {
        temp_dir: root.join("work"),
        retry_delay: Duration::from_millis(10),
        chunk_size: 64 * 1024,
        ..TransferConfig::default()
    }
}

/// Entries left in a directory, or none if it does not exist.
pub fn leftovers(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// Progress callback that keeps every event.
pub fn recording_progress() -> (ProgressCallback, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&events);
    let callback: ProgressCallback = Arc::new(move |event| {
        if let Ok(mut events) = store.lock() {
            events.push(event);
        }
    });
    (callback, events)
}

/// How a [`RecordingSink`] answers each upload.
#[derive(Debug, Clone, Copy)]
pub enum SinkBehavior {
    Accept,
    Reject,
    TransportError,
}

/// In-memory sink that counts calls and keeps the last body.
pub struct RecordingSink {
    behavior: SinkBehavior,
    calls: AtomicUsize,
    received: Mutex<Vec<u8>>,
    max_upload_bytes: Option<u64>,
}

impl RecordingSink {
    pub fn new(behavior: SinkBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            max_upload_bytes: None,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = Some(limit);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received_len(&self) -> usize {
        self.received.lock().map(|body| body.len()).unwrap_or_default()
    }
}

#[async_trait]
impl DestinationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn max_upload_bytes(&self) -> Option<u64> {
        self.max_upload_bytes
    }

    async fn send(&self, upload: SinkUpload) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            SinkBehavior::Reject => return Err(SinkError::rejected("file type not allowed")),
            SinkBehavior::TransportError => return Err(SinkError::transport("connection reset")),
            SinkBehavior::Accept => {}
        }
        let mut body = upload.body;
        let mut bytes = Vec::new();
        while let Some(block) = body.next().await {
            let block = block.map_err(|source| SinkError::Io { source })?;
            bytes.extend_from_slice(&block);
        }
        if let Ok(mut received) = self.received.lock() {
            *received = bytes;
        }
        Ok(())
    }
}

/// Sink that takes the first block of the body and then never finishes.
#[derive(Default)]
pub struct HangingSink {
    first_block: AtomicUsize,
}

impl HangingSink {
    /// Length of the block read before hanging, 0 if none arrived.
    pub fn first_block_len(&self) -> usize {
        self.first_block.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationSink for HangingSink {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn send(&self, upload: SinkUpload) -> Result<(), SinkError> {
        let mut body = upload.body;
        if let Some(block) = body.next().await {
            let block = block.map_err(|source| SinkError::Io { source })?;
            self.first_block.store(block.len(), Ordering::SeqCst);
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}
