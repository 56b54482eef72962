//! Step template merge.
//!
//! The template sits under every step: scalar fields the step leaves unset
//! come from the template, and keyed lists (env by name, mounts by path,
//! resources by resource name) are merged with the step's entries first and
//! the template's unique entries appended.

use super::workspace::clean_path;
use crate::error::{Error, Result};
use crate::spec::{Container, Step};
use std::collections::HashSet;
use std::hash::Hash;

/// Merges `template` under each step. With no template the steps are
/// returned unchanged.
///
/// # Errors
///
/// [`Error::InvalidTemplate`] if the template has an unnamed env var or a
/// mount without a path.
pub fn merge_step_template(template: Option<&Container>, steps: &[Step]) -> Result<Vec<Step>> {
    let Some(template) = template else {
        return Ok(steps.to_vec());
    };
    validate_template(template)?;

    Ok(steps
        .iter()
        .map(|step| Step {
            container: merge_container(template, &step.container),
            script: step.script.clone(),
        })
        .collect())
}

fn validate_template(template: &Container) -> Result<()> {
    if let Some(env) = template.env.iter().find(|e| e.name.is_empty()) {
        return Err(Error::InvalidTemplate(format!(
            "env var with value '{}' has no name",
            env.value
        )));
    }
    if let Some(vm) = template.volume_mounts.iter().find(|vm| vm.mount_path.is_empty()) {
        return Err(Error::InvalidTemplate(format!(
            "volume mount '{}' has no mount path",
            vm.name
        )));
    }
    Ok(())
}

fn merge_container(template: &Container, step: &Container) -> Container {
    let or_template = |own: &Vec<String>, fallback: &Vec<String>| {
        if own.is_empty() {
            fallback.clone()
        } else {
            own.clone()
        }
    };

    let mut resources = step.resources.clone();
    for (name, q) in &template.resources.requests {
        resources.requests.entry(name.clone()).or_insert_with(|| q.clone());
    }
    for (name, q) in &template.resources.limits {
        resources.limits.entry(name.clone()).or_insert_with(|| q.clone());
    }

    Container {
        name: step.name.clone(),
        image: if step.image.is_empty() {
            template.image.clone()
        } else {
            step.image.clone()
        },
        command: or_template(&step.command, &template.command),
        args: or_template(&step.args, &template.args),
        env: merge_keyed(&step.env, &template.env, |e| e.name.clone()),
        volume_mounts: merge_keyed(&step.volume_mounts, &template.volume_mounts, |vm| {
            clean_path(&vm.mount_path)
        }),
        working_dir: step.working_dir.clone().or_else(|| template.working_dir.clone()),
        resources,
        tty: step.tty || template.tty,
    }
}

fn merge_keyed<T, K, F>(own: &[T], fallback: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let seen: HashSet<K> = own.iter().map(&key).collect();
    own.iter()
        .cloned()
        .chain(fallback.iter().filter(|t| !seen.contains(&key(t))).cloned())
        .collect()
}
