//! Implicit workspace and home injection.
//!
//! Every step gets `/workspace` as its default working directory and
//! `/builder/home` as `$HOME`, each backed by a generated emptyDir volume.
//! A step that already mounts something at either path keeps its own mount
//! for that path; the decision is made per path.

use crate::constants::{HOME_DIR, HOME_ENV_VAR, HOME_VOLUME_NAME, WORKSPACE_DIR, WORKSPACE_VOLUME_NAME};
use crate::names::NameGenerator;
use crate::spec::{EnvVar, Step, Volume, VolumeMount};
use std::collections::HashSet;

/// Adds the implicit workspace and home mounts, `$HOME`, and the default
/// working directory to every step.
///
/// The implicit `HOME` is placed first in each step's env so a step's own
/// `HOME` comes later and wins. Returns the rewritten steps and the two
/// implicit volumes.
pub fn set_workspace_and_home(steps: &[Step], names: &dyn NameGenerator) -> (Vec<Step>, Vec<Volume>) {
    let workspace_volume = names.restrict_length_with_random_suffix(WORKSPACE_VOLUME_NAME);
    let home_volume = names.restrict_length_with_random_suffix(HOME_VOLUME_NAME);

    let implicit_mounts = [
        VolumeMount::new(&workspace_volume, WORKSPACE_DIR),
        VolumeMount::new(&home_volume, HOME_DIR),
    ];

    let out = steps
        .iter()
        .map(|s| {
            let mut container = s.container.clone();

            let mut env = vec![EnvVar::new(HOME_ENV_VAR, HOME_DIR)];
            env.extend(container.env.drain(..));
            container.env = env;

            let requested: HashSet<String> = container
                .volume_mounts
                .iter()
                .map(|vm| clean_path(&vm.mount_path))
                .collect();
            for imp in &implicit_mounts {
                if !requested.contains(&clean_path(&imp.mount_path)) {
                    container.volume_mounts.push(imp.clone());
                }
            }

            if container.working_dir.as_deref().is_none_or(str::is_empty) {
                container.working_dir = Some(WORKSPACE_DIR.to_string());
            }

            Step {
                container,
                script: s.script.clone(),
            }
        })
        .collect();

    let volumes = vec![
        Volume::empty_dir(workspace_volume),
        Volume::empty_dir(home_volume),
    ];
    (out, volumes)
}

/// Lexically cleans a slash-separated path: collapses repeated and trailing
/// slashes, drops `.` segments, and resolves `..` against earlier segments.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
