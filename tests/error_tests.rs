//! Tests for error types.
//!
//! Validates display formatting, failure-kind classification, and exit code
//! mapping.

use rstest::rstest;
use std::path::PathBuf;
use std::time::Duration;
use steprun::Error;

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_invalid_step_display() {
    let err = Error::InvalidStep {
        index: 2,
        reason: "script cannot be used with command".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("step 2"), "should include step index");
    assert!(msg.contains("script"), "should include reason");
}

#[test]
fn test_image_lookup_failed_display() {
    let err = Error::ImageLookupFailed {
        reference: "ghcr.io/org/app:v1".to_string(),
        reason: "unauthorized".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("ghcr.io/org/app:v1"), "should include reference");
    assert!(msg.contains("unauthorized"), "should include reason");
}

#[test]
fn test_credentials_unavailable_display() {
    let err = Error::CredentialsUnavailable {
        namespace: "ci".to_string(),
        service_account: "builder".to_string(),
        reason: "secret missing".to_string(),
    };
    assert!(err.to_string().contains("ci/builder"));
}

#[test]
fn test_wait_skipped_display() {
    let err = Error::WaitSkipped {
        path: PathBuf::from("/builder/tools/0.err"),
    };
    let msg = err.to_string();

    assert!(msg.contains("/builder/tools/0.err"), "should include marker path");
    assert!(msg.contains("skipping"), "should say the step is skipped");
}

#[test]
fn test_timeout_display() {
    let err = Error::Timeout {
        operation: "fetch manifest".to_string(),
        duration: Duration::from_secs(300),
    };
    let msg = err.to_string();

    assert!(msg.contains("300"), "should include duration");
    assert!(msg.contains("fetch manifest"), "should include operation");
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: Error = io.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_json_error_converts() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Serialization(_)));
}

// =============================================================================
// Classification Tests
// =============================================================================

fn run_failed(code: Option<i32>) -> Error {
    Error::RunFailed {
        command: "make".to_string(),
        exit_code: code,
        reason: "failed".to_string(),
    }
}

#[rstest]
#[case(Error::InvalidTemplate("x".to_string()), true)]
#[case(Error::MissingCommand { container: "c".to_string() }, true)]
#[case(Error::InvalidImageReference { reference: "r".to_string(), reason: "x".to_string() }, true)]
#[case(Error::WaitSkipped { path: PathBuf::from("/m") }, false)]
#[case(Error::WaitFailed { path: PathBuf::from("/m"), reason: "x".to_string() }, false)]
#[case(run_failed(Some(2)), false)]
fn test_pre_execution(#[case] err: Error, #[case] expected: bool) {
    assert_eq!(err.is_pre_execution(), expected);
}

#[test]
fn test_only_wait_skipped_is_skip() {
    assert!(Error::WaitSkipped { path: PathBuf::from("/m") }.is_skip());
    assert!(!Error::WaitFailed {
        path: PathBuf::from("/m"),
        reason: "x".to_string()
    }
    .is_skip());
    assert!(!run_failed(Some(1)).is_skip());
}

#[rstest]
#[case(run_failed(Some(42)), 42)]
#[case(run_failed(Some(0)), 1)]
#[case(run_failed(None), 1)]
#[case(Error::WaitSkipped { path: PathBuf::from("/m") }, 1)]
fn test_exit_code(#[case] err: Error, #[case] expected: i32) {
    assert_eq!(err.exit_code(), expected);
}
