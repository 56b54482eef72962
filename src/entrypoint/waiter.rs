//! Event-driven marker waiter.
//!
//! Watches the marker's parent directory (the marker itself usually does
//! not exist yet) and matches create/modify events by file name. After the
//! watch is armed the directory is checked once, so markers written before
//! this container started are not missed.

use super::Waiter;
use crate::constants::ERROR_MARKER_SUFFIX;
use crate::error::{Error, Result};
use notify::{Event, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Waits on markers using filesystem notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWaiter {
    timeout: Option<Duration>,
}

impl FsWaiter {
    /// Creates a waiter that blocks until a marker appears.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives up with [`Error::WaitFailed`] after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

fn wait_failed(path: &Path, reason: impl ToString) -> Error {
    Error::WaitFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn present(path: &Path, expect_content: bool) -> bool {
    match fs::metadata(path) {
        Ok(m) => !expect_content || m.len() > 0,
        Err(_) => false,
    }
}

impl Waiter for FsWaiter {
    fn wait(&self, path: &Path, expect_content: bool) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Ok(());
        }

        let file_name = path
            .file_name()
            .ok_or_else(|| wait_failed(path, "path has no file name"))?
            .to_os_string();
        let mut err_name = file_name.clone();
        err_name.push(ERROR_MARKER_SUFFIX);
        let err_path = path.with_file_name(&err_name);

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| wait_failed(path, e))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| wait_failed(path, e))?;

        if err_path.exists() {
            return Err(Error::WaitSkipped { path: err_path });
        }
        if present(path, expect_content) {
            return Ok(());
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(remaining).map_err(|e| match e {
                        RecvTimeoutError::Timeout => wait_failed(
                            path,
                            format!("timed out after {:?}", self.timeout.unwrap_or_default()),
                        ),
                        RecvTimeoutError::Disconnected => wait_failed(path, "watcher stopped"),
                    })?
                }
                None => rx.recv().map_err(|_| wait_failed(path, "watcher stopped"))?,
            };

            let event = received.map_err(|e| wait_failed(path, e))?;
            if !(event.kind.is_create() || event.kind.is_modify()) {
                continue;
            }
            debug!("Watch event {:?} for {:?}", event.kind, event.paths);

            let names: Vec<OsString> = event
                .paths
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
                .collect();
            if names.contains(&err_name) {
                return Err(Error::WaitSkipped { path: err_path });
            }
            if names.contains(&file_name) && present(path, expect_content) {
                return Ok(());
            }
        }
    }
}
