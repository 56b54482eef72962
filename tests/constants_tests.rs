//! Tests for constants module.
//!
//! The marker paths and flag names are a contract between the pod layout
//! and the entrypoint binary baked into images, so they are pinned here.

use std::time::Duration;
use steprun::constants::*;

// =============================================================================
// Marker Protocol Tests
// =============================================================================

#[test]
fn test_marker_layout() {
    assert_eq!(TOOLS_MOUNT_POINT, "/builder/tools");
    assert!(ENTRYPOINT_BINARY.starts_with(TOOLS_MOUNT_POINT));
    assert_eq!(SIDECAR_KILL_MARKER, "sidecar-kill");
    assert_eq!(SIDECAR_START_PREFIX, "sidecar-");
    assert_eq!(ERROR_MARKER_SUFFIX, ".err");
}

#[test]
fn test_flag_names() {
    let flags = [
        FLAG_WAIT_FILE,
        FLAG_POST_FILE,
        FLAG_START_FILE,
        FLAG_KILL_FILE,
        FLAG_ENTRYPOINT,
    ];
    for flag in flags {
        assert!(flag.starts_with('-') && !flag.starts_with("--"), "{}", flag);
    }
    assert_eq!(ARGS_SEPARATOR, "--");
}

#[test]
fn test_implicit_paths_distinct() {
    let paths = [TOOLS_MOUNT_POINT, SCRIPTS_DIR, HOME_DIR, WORKSPACE_DIR];
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

// =============================================================================
// Limit Tests
// =============================================================================

#[test]
fn test_generated_names_fit_dns_label() {
    assert_eq!(MAX_GENERATED_NAME_LEN, 63);
    assert!(RANDOM_SUFFIX_LEN < MAX_GENERATED_NAME_LEN);
    assert!(RANDOM_SUFFIX_ALPHABET.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
}

#[test]
fn test_cache_and_timeout_reasonable() {
    assert!(DEFAULT_ENTRYPOINT_CACHE_SIZE >= 100);
    assert!(DEFAULT_ENTRYPOINT_CACHE_SIZE <= 10_000);
    assert_eq!(IMAGE_LOOKUP_TIMEOUT, Duration::from_secs(300));
}

#[test]
fn test_image_ref_length_reasonable() {
    assert!(MAX_IMAGE_REF_LEN >= 256, "image ref limit too restrictive");
    assert!(MAX_IMAGE_REF_LEN <= 1024, "image ref limit too permissive");
}

#[test]
fn test_config_file_limit_below_manifest_limit() {
    assert!(MAX_CONFIG_FILE_SIZE < MAX_MANIFEST_SIZE);
    assert!(MAX_CONFIG_FILE_SIZE >= 4096, "config file limit too restrictive");
}

#[test]
fn test_aggregated_resources() {
    assert_eq!(
        AGGREGATED_RESOURCES,
        [RESOURCE_CPU, RESOURCE_MEMORY, RESOURCE_EPHEMERAL_STORAGE]
    );
}

// =============================================================================
// Image Reference Validation Tests
// =============================================================================

#[test]
fn test_validate_image_reference() {
    assert!(validate_image_reference("alpine").is_ok());
    assert!(validate_image_reference("ghcr.io/org/app:v1.2").is_ok());
    assert!(
        validate_image_reference(
            "registry.example.com:5000/ns/app@sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
        )
        .is_ok()
    );

    assert!(validate_image_reference("").is_err());
    assert!(validate_image_reference("app; rm -rf /").is_err());
    assert!(validate_image_reference(&"a".repeat(MAX_IMAGE_REF_LEN + 1)).is_err());
}
