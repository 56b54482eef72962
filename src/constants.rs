//! # Step Ordering Constants
//!
//! Paths, marker names, limits, and timeouts shared by the transform
//! pipeline and the entrypoint runtime. The pipeline writes these paths into
//! container arguments and the runtime reads them back, so both sides must
//! agree on every value here.
//!
//! ## Filesystem Layout
//!
//! ```text
//! /builder/tools/            shared tools volume (every container)
//! ├── entrypoint             synchronization binary
//! ├── sidecar-0 .. sidecar-N sidecar start markers
//! ├── 0 .. n-2               step post markers
//! ├── sidecar-kill           last step's post marker, releases sidecars
//! └── <any>.err              failure companion of any marker
//! /builder/scripts/          materialized inline scripts
//! /builder/home/             implicit $HOME
//! /workspace/                implicit working directory
//! ```

use std::time::Duration;

// =============================================================================
// Mount Points
// =============================================================================

/// Shared tools volume holding the entrypoint binary and all markers.
pub const TOOLS_MOUNT_POINT: &str = "/builder/tools";

/// Path of the synchronization binary inside every container.
pub const ENTRYPOINT_BINARY: &str = "/builder/tools/entrypoint";

/// Volume name for the shared tools mount.
pub const TOOLS_VOLUME_NAME: &str = "tools";

/// Directory where inline scripts are materialized.
pub const SCRIPTS_DIR: &str = "/builder/scripts";

/// Implicit `$HOME` for every step.
pub const HOME_DIR: &str = "/builder/home";

/// Implicit working directory for every step.
pub const WORKSPACE_DIR: &str = "/workspace";

/// Environment variable set to [`HOME_DIR`].
pub const HOME_ENV_VAR: &str = "HOME";

// =============================================================================
// Markers
// =============================================================================

/// Marker written by the last step to release sidecars.
pub const SIDECAR_KILL_MARKER: &str = "sidecar-kill";

/// Prefix of sidecar start markers (`sidecar-<i>`).
pub const SIDECAR_START_PREFIX: &str = "sidecar-";

/// Suffix of the failure companion of any marker.
pub const ERROR_MARKER_SUFFIX: &str = ".err";

// =============================================================================
// Entrypoint CLI Flags
// =============================================================================

/// Comma-separated wait targets.
pub const FLAG_WAIT_FILE: &str = "-wait_file";

/// Marker written on completion.
pub const FLAG_POST_FILE: &str = "-post_file";

/// Marker written before the command runs.
pub const FLAG_START_FILE: &str = "-start_file";

/// Shared teardown marker name.
pub const FLAG_KILL_FILE: &str = "-kill_file";

/// Real command to run.
pub const FLAG_ENTRYPOINT: &str = "-entrypoint";

/// Separator before pass-through arguments.
pub const ARGS_SEPARATOR: &str = "--";

// =============================================================================
// Script Placement
// =============================================================================

/// Default image for the script placer container. Only needs `sh`, `cat`,
/// `touch` and `chmod`.
pub const DEFAULT_SHELL_IMAGE: &str = "busybox";

/// Base name of the placer container.
pub const PLACE_SCRIPTS_NAME: &str = "place-scripts";

/// Base name of the scripts volume.
pub const SCRIPTS_VOLUME_NAME: &str = "scripts";

/// Base of the heredoc delimiter. A random suffix keeps it from colliding
/// with script content.
pub const HEREDOC_BASE: &str = "script-heredoc-randomly-generated";

/// Base name of the implicit workspace volume.
pub const WORKSPACE_VOLUME_NAME: &str = "workspace";

/// Base name of the implicit home volume.
pub const HOME_VOLUME_NAME: &str = "home";

// =============================================================================
// Name Generation
// =============================================================================

/// Maximum length of a generated name (RFC 1123 label).
pub const MAX_GENERATED_NAME_LEN: usize = 63;

/// Length of the random suffix appended to generated names.
pub const RANDOM_SUFFIX_LEN: usize = 5;

/// Alphabet for random suffixes. Vowels and confusable digits are excluded
/// so suffixes never spell words.
pub const RANDOM_SUFFIX_ALPHABET: &str = "bcdfghjklmnpqrstvwxz2456789";

// =============================================================================
// Entrypoint Cache
// =============================================================================

/// Default number of image digests kept in the entrypoint cache.
///
/// Sized for the distinct images in concurrent use, not for historical
/// step count.
pub const DEFAULT_ENTRYPOINT_CACHE_SIZE: usize = 1024;

/// Timeout for one remote manifest + config lookup.
pub const IMAGE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum OCI image reference length in bytes.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Valid characters for OCI image references.
///
/// The `@` is for digest references like `nginx@sha256:abc...`.
/// The `:` is for tag references like `nginx:latest`.
pub const IMAGE_REF_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_./:@";

/// Maximum image config blob size accepted from a registry (1 MiB).
pub const MAX_CONFIG_SIZE: usize = 1024 * 1024;

// =============================================================================
// Manifest Limits
// =============================================================================

/// Maximum size of a task manifest in bytes (1 MiB).
pub const MAX_MANIFEST_SIZE: usize = 1024 * 1024;

/// Maximum size of the `steprun` config file in bytes (64 KiB).
pub const MAX_CONFIG_FILE_SIZE: usize = 64 * 1024;

/// Maximum number of steps per task.
pub const MAX_STEPS: usize = 64;

/// Maximum number of sidecars per task.
pub const MAX_SIDECARS: usize = 16;

/// Maximum number of environment variables per container.
pub const MAX_ENV_VARS_PER_CONTAINER: usize = 256;

/// Maximum length for container names (RFC 1123 label).
pub const MAX_CONTAINER_NAME_LEN: usize = 63;

/// CPU resource name.
pub const RESOURCE_CPU: &str = "cpu";

/// Memory resource name.
pub const RESOURCE_MEMORY: &str = "memory";

/// Ephemeral storage resource name.
pub const RESOURCE_EPHEMERAL_STORAGE: &str = "ephemeral-storage";

/// Resource names considered by step resource aggregation, in output order.
pub const AGGREGATED_RESOURCES: [&str; 3] =
    [RESOURCE_CPU, RESOURCE_MEMORY, RESOURCE_EPHEMERAL_STORAGE];

// =============================================================================
// Image Reference Validation Helper
// =============================================================================

/// Validates an image reference's length and characters.
///
/// Parsing into registry/repository/tag/digest happens later; this only
/// rejects references no registry would accept.
#[inline]
#[must_use = "validation result must be checked before using the reference"]
pub fn validate_image_reference(reference: &str) -> std::result::Result<(), &'static str> {
    if reference.is_empty() {
        return Err("image reference cannot be empty");
    }
    if reference.len() > MAX_IMAGE_REF_LEN {
        return Err("image reference exceeds maximum length");
    }
    if !reference.chars().all(|c| IMAGE_REF_VALID_CHARS.contains(c)) {
        return Err("image reference contains invalid characters");
    }
    Ok(())
}
