//! Child process runner.

use super::Runner;
use crate::error::{Error, Result};
use std::process::Command;

/// Runs the command as a child process sharing this process's stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(&self, args: &[String]) -> Result<()> {
        let Some((program, rest)) = args.split_first() else {
            return Ok(());
        };

        let status = Command::new(program)
            .args(rest)
            .status()
            .map_err(|e| Error::RunFailed {
                command: program.clone(),
                exit_code: None,
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::RunFailed {
                command: program.clone(),
                exit_code: status.code(),
                reason: status.to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_success() {
        ProcessRunner.run(&args(&["true"])).unwrap();
    }

    #[test]
    fn test_exit_code_reported() {
        let err = ProcessRunner.run(&args(&["sh", "-c", "exit 7"])).unwrap_err();
        assert!(matches!(err, Error::RunFailed { exit_code: Some(7), .. }));
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_missing_binary() {
        let err = ProcessRunner
            .run(&args(&["/definitely/not/a/binary"]))
            .unwrap_err();
        assert!(matches!(err, Error::RunFailed { exit_code: None, .. }));
    }

    #[test]
    fn test_empty_is_noop() {
        ProcessRunner.run(&[]).unwrap();
    }
}
