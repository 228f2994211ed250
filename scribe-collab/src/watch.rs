//! File-watch bridge: ask the backend for external change notifications on
//! a path.
//!
//! Watch registrations live on the backend side of the link, so they do not
//! survive a connection drop. The bridge remembers which paths are watched
//! and re-subscribes them whenever the channel comes back.

use std::collections::BTreeSet;

use crate::connection::ConnectionManager;
use crate::protocol::ClientMessage;
use crate::session::SessionError;

/// Tracks watched paths and issues `watch` / `unwatch` requests.
#[derive(Debug, Clone, Default)]
pub struct FileWatchBridge {
    paths: BTreeSet<String>,
}

impl FileWatchBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes of `path`. Requires a live channel.
    pub fn watch(&mut self, connection: &ConnectionManager, path: &str) -> Result<(), SessionError> {
        if !connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        connection.send(ClientMessage::Watch { path: path.to_string() })?;
        if self.paths.insert(path.to_string()) {
            log::debug!("Watching {path}");
        }
        Ok(())
    }

    /// Cancel the subscription for `path`. Requires a live channel.
    pub fn unwatch(&mut self, connection: &ConnectionManager, path: &str) -> Result<(), SessionError> {
        if !connection.is_connected() {
            return Err(SessionError::NotConnected);
        }
        connection.send(ClientMessage::Unwatch { path: path.to_string() })?;
        if self.paths.remove(path) {
            log::debug!("Stopped watching {path}");
        }
        Ok(())
    }

    /// Re-issue `watch` for every tracked path. Returns how many were sent.
    pub fn resubscribe(&self, connection: &ConnectionManager) -> usize {
        let mut sent = 0;
        for path in &self.paths {
            match connection.send(ClientMessage::Watch { path: path.clone() }) {
                Ok(()) => sent += 1,
                Err(e) => log::warn!("Failed to re-watch {path}: {e}"),
            }
        }
        if sent > 0 {
            log::info!("Re-subscribed {sent} watched paths");
        }
        sent
    }

    pub fn is_watching(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Watched paths in sorted order.
    pub fn watched_paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}
