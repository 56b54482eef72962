//! # steprun
//!
//! **Ordered Step Execution Inside a Single Pod**
//!
//! This crate turns a task (an ordered list of steps plus optional
//! long-running sidecars) into the containers of one pod, and provides the
//! in-container runtime that makes those containers run one after another.
//! Containers share no memory; they coordinate only through marker files on
//! a shared volume.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Pod construction (once)                      │
//! │                                                                     │
//! │  TaskSpec ──▶ template ──▶ workspace ──▶ scripts ──▶ resolve ──┐    │
//! │                                                      │         │    │
//! │                                         EntrypointCache        │    │
//! │                                         (LRU by digest)        ▼    │
//! │                                              │          resources   │
//! │                                              ▼                 │    │
//! │                                          registry              ▼    │
//! │                                                             order   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                   Pod execution (per container)                     │
//! │                                                                     │
//! │  entrypoint -wait_file <prev> -post_file <self> -entrypoint cmd --  │
//! │       │                                                             │
//! │       ├─▶ Waiter  (notify on /builder/tools, .err ⇒ skip)           │
//! │       ├─▶ Runner  (child process)                                   │
//! │       └─▶ Writer  (<self> or <self>.err)                            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Marker Protocol
//!
//! | Marker | Written by | Meaning |
//! |--------|------------|---------|
//! | `sidecar-<i>` | sidecar *i* | sidecar started |
//! | `<i>` | step *i* | step *i* succeeded |
//! | `sidecar-kill` | last step | all steps done, sidecars may exit |
//! | `<any>.err` | any | failed or skipped; downstream steps skip |
//!
//! Every marker is written at most once per pod and is never deleted.
//!
//! # Failure Model
//!
//! Transform and resolution errors abort before any container exists, and
//! nothing is produced. Execution errors stay inside one container and
//! reach later steps only through `.err` markers, so once one step fails
//! every later step is skipped without running.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use steprun::{
//!     EntrypointCache, OciImageSource, PodBuilder, PodOptions, SimpleNameGenerator,
//!     StaticKeychain, TaskSpec,
//! };
//!
//! #[tokio::main]
//! async fn main() -> steprun::Result<()> {
//!     let cache = EntrypointCache::new(
//!         Arc::new(OciImageSource::new()),
//!         Arc::new(StaticKeychain::default()),
//!     );
//!     let builder = PodBuilder::new(
//!         Arc::new(cache),
//!         Arc::new(SimpleNameGenerator::new()),
//!         PodOptions::default(),
//!     );
//!     let task = TaskSpec::from_yaml(&std::fs::read("task.yaml")?)?;
//!     let layout = builder.build(&task).await?;
//!     println!("{}", serde_json::to_string_pretty(&layout)?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod entrypoint;
pub mod error;
pub mod names;
pub mod pod;
pub mod registry;
pub mod spec;
pub mod status;

// Re-exports
pub use cache::{EntrypointCache, EntrypointResolver, ResolvedImage};
pub use config::Config;
pub use constants::*;
pub use entrypoint::{Entrypointer, FsWaiter, FsWriter, ProcessRunner, Runner, Waiter, Writer};
pub use error::{Error, Result};
pub use names::{NameGenerator, SimpleNameGenerator};
pub use pod::{PodBuilder, PodLayout, PodOptions};
pub use registry::{
    AnonymousKeychain, ImageCommand, ImageSource, Keychain, OciImageSource, RegistryCredential,
    StaticKeychain,
};
pub use spec::{Container, EnvVar, Quantity, ResourceRequirements, Step, TaskSpec, Volume, VolumeMount};
pub use status::{AdditionalFields, RunStatusFields};
