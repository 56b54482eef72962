//! entrypoint - In-Pod Step Sequencer
//!
//! Every step and sidecar container runs its real command through this
//! binary, which is copied into the shared tools volume.
//!
//! ## Usage
//!
//! ```sh
//! # step: wait for predecessors, run, post own marker
//! entrypoint -wait_file /builder/tools/0 -post_file /builder/tools/1 \
//!     -entrypoint go -- build ./...
//!
//! # sidecar: announce start, then run
//! entrypoint -start_file /builder/tools/sidecar-0 \
//!     -kill_file /builder/tools/sidecar-kill -entrypoint postgres --
//! ```
//!
//! Flags are accepted with one or two leading dashes. Everything after `--`
//! is passed to the command untouched.
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | command succeeded (or nothing to run) |
//! | N | command exited with N |
//! | 1 | skipped, wait failed, or command could not start |

use clap::Parser;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;
use steprun::constants::ARGS_SEPARATOR;
use steprun::{Entrypointer, FsWaiter, FsWriter, ProcessRunner};
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

/// Environment variable overriding the log level.
const LOG_ENV: &str = "STEPRUN_LOG";

#[derive(Parser, Debug)]
#[command(name = "entrypoint", version, about = "Run a step in order with its pod")]
struct Cli {
    /// Comma-separated markers to wait on, in order
    #[arg(long = "wait_file", value_delimiter = ',', default_value = "")]
    wait_file: Vec<String>,

    /// Marker to write on completion (`.err` appended on failure)
    #[arg(long = "post_file", default_value = "")]
    post_file: String,

    /// Marker to write before running the command
    #[arg(long = "start_file", default_value = "")]
    start_file: String,

    /// Teardown marker for sidecars
    #[arg(long = "kill_file", default_value = "")]
    kill_file: String,

    /// The executable to run
    #[arg(long = "entrypoint", default_value = "")]
    entrypoint: String,

    /// Give up waiting after this many seconds
    #[arg(long = "wait_timeout")]
    wait_timeout: Option<u64>,

    /// Arguments passed to the executable
    #[arg(last = true)]
    args: Vec<String>,
}

/// Rewrites single-dash long flags (`-post_file`) to the double-dash form,
/// leaving everything from `--` on untouched.
fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    let mut out = Vec::new();
    let mut passthrough = false;
    for arg in args {
        if passthrough {
            out.push(arg);
            continue;
        }
        if arg == ARGS_SEPARATOR {
            passthrough = true;
            out.push(arg);
        } else if arg.len() > 2 && arg.starts_with('-') && !arg.starts_with("--") {
            out.push(format!("-{}", arg));
        } else {
            out.push(arg);
        }
    }
    out
}

fn log_level() -> Level {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|v| Level::from_str(&v).ok())
        .unwrap_or(Level::WARN)
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args()));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level())
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
    }

    let waiter = match cli.wait_timeout {
        Some(secs) => FsWaiter::with_timeout(Duration::from_secs(secs)),
        None => FsWaiter::new(),
    };

    let entrypointer = Entrypointer {
        entrypoint: cli.entrypoint,
        args: cli.args,
        wait_files: cli.wait_file.into_iter().filter(|f| !f.is_empty()).collect(),
        post_file: cli.post_file,
        start_file: cli.start_file,
        kill_file: cli.kill_file,
        waiter: Box::new(waiter),
        writer: Box::new(FsWriter),
        runner: Box::new(ProcessRunner),
    };

    match entrypointer.go() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
