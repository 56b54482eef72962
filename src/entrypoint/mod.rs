//! # Entrypointer - In-Container Step Sequencing
//!
//! Every container of a pod runs its real command through the `entrypoint`
//! binary, which waits for predecessor markers, runs the command, and posts
//! its own marker for the next container.
//!
//! ## State Machine
//!
//! ```text
//! Init ──▶ Waiting ──▶ Running ──▶ Succeeded ──┐
//!             │            │                   ├──▶ Signaling
//!             └────────────┴─────▶ Failed ─────┘
//! ```
//!
//! | Outcome | Marker written | Returned |
//! |---------|----------------|----------|
//! | Command succeeded (or none configured) | `<post>` | `Ok(())` |
//! | A wait target's `.err` appeared | `<post>.err` | [`Error::WaitSkipped`] |
//! | Watching failed or timed out | `<post>.err` | [`Error::WaitFailed`] |
//! | Command failed | `<post>.err` | [`Error::RunFailed`] |
//! | Writing `<post>` failed | `<post>.err` | [`Error::Io`] |
//!
//! Wait targets are processed strictly in order. The start marker, if any,
//! is written after waiting and before the command runs.
//!
//! ## Seams
//!
//! The [`Waiter`], [`Writer`] and [`Runner`] traits separate the state
//! machine from the filesystem and process APIs. [`FsWaiter`], [`FsWriter`]
//! and [`ProcessRunner`] are the production implementations.

mod runner;
mod waiter;
mod writer;

pub use runner::ProcessRunner;
pub use waiter::FsWaiter;
pub use writer::FsWriter;

use crate::constants::ERROR_MARKER_SUFFIX;
use crate::error::Result;
use std::path::Path;
use tracing::{debug, info, warn};

// =============================================================================
// Seams
// =============================================================================

/// Blocks until a marker file appears.
pub trait Waiter: Send + Sync {
    /// Waits for `path` to be created or written.
    ///
    /// An empty path returns immediately. If `expect_content` is set the file
    /// must also be non-empty.
    ///
    /// # Errors
    ///
    /// [`crate::Error::WaitSkipped`] when `<path>.err` appears first,
    /// [`crate::Error::WaitFailed`] when watching fails.
    fn wait(&self, path: &Path, expect_content: bool) -> Result<()>;
}

/// Creates marker files.
pub trait Writer: Send + Sync {
    /// Creates an empty file at `path`. An empty path is a no-op.
    fn write(&self, path: &Path) -> Result<()>;
}

/// Runs the real command.
pub trait Runner: Send + Sync {
    /// Runs `args[0]` with `args[1..]`, returning once it exits.
    ///
    /// # Errors
    ///
    /// [`crate::Error::RunFailed`] if the command cannot start or exits
    /// non-zero.
    fn run(&self, args: &[String]) -> Result<()>;
}

// =============================================================================
// Entrypointer
// =============================================================================

/// Configuration of one container's entrypoint run.
pub struct Entrypointer {
    /// The real executable. Empty means `args[0]` is the executable.
    pub entrypoint: String,
    /// Arguments passed through after `--`.
    pub args: Vec<String>,
    /// Markers to wait on, in order.
    pub wait_files: Vec<String>,
    /// Marker written on completion (`.err`-suffixed on failure).
    pub post_file: String,
    /// Marker written before the command runs.
    pub start_file: String,
    /// Teardown marker a sidecar's own process may watch.
    pub kill_file: String,
    /// Waits on markers.
    pub waiter: Box<dyn Waiter>,
    /// Writes markers.
    pub writer: Box<dyn Writer>,
    /// Runs the command.
    pub runner: Box<dyn Runner>,
}

impl Entrypointer {
    /// The full command line: entrypoint (if set) followed by args.
    pub fn command(&self) -> Vec<String> {
        let mut cmd = Vec::with_capacity(self.args.len() + 1);
        if !self.entrypoint.is_empty() {
            cmd.push(self.entrypoint.clone());
        }
        cmd.extend(self.args.iter().cloned());
        cmd
    }

    /// Waits, runs, and signals. Exactly one error is returned on failure,
    /// after the `.err` post marker has been attempted.
    ///
    /// Failing to write the success marker counts as a failure, so the
    /// `.err` marker is still attempted and successors are released.
    pub fn go(&self) -> Result<()> {
        let result = self.wait_and_run().and_then(|()| self.post(""));
        if result.is_err() {
            if let Err(we) = self.post(ERROR_MARKER_SUFFIX) {
                warn!("Failed to write error marker for {}: {}", self.post_file, we);
            }
        }
        result
    }

    fn post(&self, suffix: &str) -> Result<()> {
        if self.post_file.is_empty() {
            return Ok(());
        }
        let marker = format!("{}{}", self.post_file, suffix);
        self.writer.write(Path::new(&marker))?;
        debug!("Posted {}", marker);
        Ok(())
    }

    fn wait_and_run(&self) -> Result<()> {
        for file in &self.wait_files {
            debug!("Waiting for {}", file);
            self.waiter.wait(Path::new(file), false)?;
        }

        if !self.start_file.is_empty() {
            self.writer.write(Path::new(&self.start_file))?;
            debug!("Started {}", self.start_file);
        }

        let command = self.command();
        if command.is_empty() {
            return Ok(());
        }
        if !self.kill_file.is_empty() {
            debug!("Teardown marker for this container is {}", self.kill_file);
        }

        info!("Running {:?}", command);
        self.runner.run(&command)
    }
}
