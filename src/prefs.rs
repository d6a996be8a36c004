//! Per-user transfer mode preferences.
//!
//! The transfer core only reads a mode when a request is built; toggling is
//! done by whatever front end owns the users (a chat command, a CLI flag).

use dashmap::DashMap;
use tracing::debug;

use crate::transfer::{TransferMode, TransferRequest};

/// Read side of a per-user mode mapping.
pub trait ModeStore: Send + Sync {
    /// Mode for `user`, or the store's default when none was chosen.
    fn mode_for(&self, user: &str) -> TransferMode;

    /// Applies `user`'s mode to `request`.
    fn apply(&self, user: &str, request: TransferRequest) -> TransferRequest {
        request.with_mode(self.mode_for(user))
    }
}

/// In-memory [`ModeStore`]. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryModeStore {
    modes: DashMap<String, TransferMode>,
    default_mode: TransferMode,
}

impl InMemoryModeStore {
    /// Creates an empty store answering `default_mode` for unknown users.
    #[must_use]
    pub fn new(default_mode: TransferMode) -> Self {
        Self {
            modes: DashMap::new(),
            default_mode,
        }
    }

    /// Sets `user`'s mode.
    pub fn set(&self, user: &str, mode: TransferMode) {
        debug!(user, %mode, "mode set");
        self.modes.insert(user.to_string(), mode);
    }

    /// Flips `user`'s mode and returns the new value.
    pub fn toggle(&self, user: &str) -> TransferMode {
        let mut entry = self
            .modes
            .entry(user.to_string())
            .or_insert(self.default_mode);
        *entry = entry.toggled();
        let mode = *entry;
        drop(entry);
        debug!(user, %mode, "mode toggled");
        mode
    }

    /// Forgets `user`'s choice.
    pub fn clear(&self, user: &str) {
        self.modes.remove(user);
    }

    /// Number of users with an explicit choice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// True when no user has an explicit choice.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

impl ModeStore for InMemoryModeStore {
    fn mode_for(&self, user: &str) -> TransferMode {
        self.modes
            .get(user)
            .map_or(self.default_mode, |entry| *entry)
    }
}
