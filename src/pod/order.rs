//! # Container Ordering
//!
//! Wraps every container behind the entrypoint binary so that containers in
//! one pod run in a fixed order, coordinated only through marker files in
//! the shared tools volume.
//!
//! ## Marker Chain
//!
//! ```text
//! sidecar 0 ──start──▶ sidecar-0 ─┐
//! sidecar 1 ──start──▶ sidecar-1 ─┤
//!                                 ▼
//! step 0    wait sidecar-0,sidecar-1    post 0
//! step 1    wait 0                      post 1
//!  ...
//! step n-1  wait n-2                    post sidecar-kill
//! ```
//!
//! A single step waits on the sidecar start markers and posts the kill
//! marker directly.
//!
//! ## Rewritten Invocation
//!
//! ```text
//! /builder/tools/entrypoint -wait_file <w> -post_file <p> -entrypoint <cmd[0]> -- <cmd[1..]> <args>
//! /builder/tools/entrypoint -start_file <s> -kill_file <k> -entrypoint <cmd[0]> -- <cmd[1..]> <args>
//! ```
//!
//! Only `command`, `args` and `volume_mounts` change. Env, working dir,
//! resources and TTY pass through.

use crate::constants::{
    ARGS_SEPARATOR, ENTRYPOINT_BINARY, FLAG_ENTRYPOINT, FLAG_KILL_FILE, FLAG_POST_FILE,
    FLAG_START_FILE, FLAG_WAIT_FILE, SIDECAR_KILL_MARKER, SIDECAR_START_PREFIX, TOOLS_MOUNT_POINT,
    TOOLS_VOLUME_NAME,
};
use crate::error::{Error, Result};
use crate::spec::{Container, VolumeMount};
use tracing::debug;

/// Path of a marker file inside the tools volume.
pub fn marker_path(marker: &str) -> String {
    format!("{}/{}", TOOLS_MOUNT_POINT, marker)
}

/// Start marker for sidecar `index`.
pub fn sidecar_start_marker(index: usize) -> String {
    marker_path(&format!("{}{}", SIDECAR_START_PREFIX, index))
}

/// The mount every wrapped container gets for the tools volume.
pub fn tools_mount() -> VolumeMount {
    VolumeMount::new(TOOLS_VOLUME_NAME, TOOLS_MOUNT_POINT)
}

/// Produces the executable container list: sidecars first, then steps,
/// each rewritten to run through the entrypoint binary.
///
/// # Errors
///
/// [`Error::InvalidInput`] if there are no steps. [`Error::MissingCommand`]
/// if any container still has an empty command.
pub fn order_containers(sidecars: &[Container], steps: &[Container]) -> Result<Vec<Container>> {
    if steps.is_empty() {
        return Err(Error::InvalidInput(
            "no steps specified; at least one step is required".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(sidecars.len() + steps.len());

    for (i, sidecar) in sidecars.iter().enumerate() {
        let flags = vec![
            FLAG_START_FILE.to_string(),
            sidecar_start_marker(i),
            FLAG_KILL_FILE.to_string(),
            marker_path(SIDECAR_KILL_MARKER),
        ];
        out.push(wrap(sidecar, flags)?);
    }

    let last = steps.len() - 1;
    for (i, step) in steps.iter().enumerate() {
        let wait = if i == 0 {
            (0..sidecars.len())
                .map(sidecar_start_marker)
                .collect::<Vec<_>>()
                .join(",")
        } else {
            marker_path(&(i - 1).to_string())
        };
        let post = if i == last {
            marker_path(SIDECAR_KILL_MARKER)
        } else {
            marker_path(&i.to_string())
        };

        debug!(
            "Step {} ({}) waits on '{}' and posts '{}'",
            i,
            step.display_name(),
            wait,
            post
        );
        let flags = vec![
            FLAG_WAIT_FILE.to_string(),
            wait,
            FLAG_POST_FILE.to_string(),
            post,
        ];
        out.push(wrap(step, flags)?);
    }

    Ok(out)
}

fn wrap(container: &Container, flags: Vec<String>) -> Result<Container> {
    let Some((entrypoint, leading)) = container.command.split_first() else {
        return Err(Error::MissingCommand {
            container: container.display_name().to_string(),
        });
    };

    let mut args = flags;
    args.push(FLAG_ENTRYPOINT.to_string());
    args.push(entrypoint.clone());
    args.push(ARGS_SEPARATOR.to_string());
    args.extend(leading.iter().cloned());
    args.extend(container.args.iter().cloned());

    let mut wrapped = container.clone();
    wrapped.command = vec![ENTRYPOINT_BINARY.to_string()];
    wrapped.args = args;
    wrapped.volume_mounts.push(tools_mount());
    Ok(wrapped)
}
