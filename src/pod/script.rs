//! Inline script materialization.
//!
//! Steps carrying a `script` are rewritten to run a generated file under
//! [`SCRIPTS_DIR`]. A single placer container, prepended to the steps,
//! writes every script to its file with a heredoc before any step runs.
//!
//! ```text
//! steps in:   [script A] [command] [script B]
//! steps out:  [place-scripts] [run /builder/scripts/script-0-xxxxx] [command] [run /builder/scripts/script-2-xxxxx]
//! ```

use crate::constants::{HEREDOC_BASE, PLACE_SCRIPTS_NAME, SCRIPTS_DIR, SCRIPTS_VOLUME_NAME};
use crate::error::{Error, Result};
use crate::names::NameGenerator;
use crate::spec::{Container, Step, Volume, VolumeMount};
use tracing::{debug, warn};

/// Converts script steps into plain containers.
///
/// Returns the containers (with the placer at index 0 when any script
/// exists) and the scripts volume, if one was needed. Steps without a
/// script pass through unchanged.
///
/// # Errors
///
/// [`Error::InvalidStep`] if a step sets both a script and a command.
pub fn convert_scripts(
    shell_image: &str,
    steps: &[Step],
    names: &dyn NameGenerator,
) -> Result<(Vec<Container>, Vec<Volume>)> {
    let mut out = Vec::with_capacity(steps.len() + 1);
    let mut placer: Option<(Container, VolumeMount)> = None;
    let mut body = String::new();

    for (i, step) in steps.iter().enumerate() {
        let Some(script) = step.script() else {
            out.push(step.container.clone());
            continue;
        };

        if !step.container.command.is_empty() {
            return Err(Error::InvalidStep {
                index: i,
                reason: "script cannot be used with command".to_string(),
            });
        }
        if !step.container.args.is_empty() {
            warn!(
                "Step {} has a script; ignoring its {} args",
                i,
                step.container.args.len()
            );
        }

        let (_, scripts_mount) = placer.get_or_insert_with(|| new_placer(shell_image, names));

        let tmp_file = format!(
            "{}/{}",
            SCRIPTS_DIR,
            names.restrict_length_with_random_suffix(&format!("script-{}", i))
        );
        let heredoc = names.restrict_length_with_random_suffix(HEREDOC_BASE);

        body.push_str(&format!(
            "tmpfile=\"{tmp_file}\"\n\
             touch ${{tmpfile}} && chmod +x ${{tmpfile}}\n\
             cat > ${{tmpfile}} << '{heredoc}'\n\
             {script}\n\
             {heredoc}\n"
        ));
        debug!("Step {} script placed at {}", i, tmp_file);

        let mut container = step.container.clone();
        container.command = vec![tmp_file];
        container.args = Vec::new();
        container.volume_mounts.push(scripts_mount.clone());
        out.push(container);
    }

    match placer {
        Some((mut place, mount)) => {
            place.args = vec!["-c".to_string(), body];
            out.insert(0, place);
            Ok((out, vec![Volume::empty_dir(mount.name)]))
        }
        None => Ok((out, Vec::new())),
    }
}

fn new_placer(shell_image: &str, names: &dyn NameGenerator) -> (Container, VolumeMount) {
    let mount = VolumeMount::new(
        names.restrict_length_with_random_suffix(SCRIPTS_VOLUME_NAME),
        SCRIPTS_DIR,
    );
    let container = Container {
        name: names.restrict_length_with_random_suffix(PLACE_SCRIPTS_NAME),
        image: shell_image.to_string(),
        command: vec!["sh".to_string()],
        volume_mounts: vec![mount.clone()],
        tty: true,
        ..Default::default()
    };
    (container, mount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::SimpleNameGenerator;

    #[test]
    fn test_no_scripts_untouched() {
        let names = SimpleNameGenerator::with_seed(3);
        let steps = vec![
            Step::new(Container::new("step-1")),
            Step::new(Container::new("step-2")),
        ];
        let (got, volumes) = convert_scripts("busybox", &steps, &names).unwrap();
        assert_eq!(got, vec![Container::new("step-1"), Container::new("step-2")]);
        assert!(volumes.is_empty());
    }

    #[test]
    fn test_script_and_command_rejected() {
        let names = SimpleNameGenerator::with_seed(3);
        let c = Container {
            command: vec!["echo".to_string()],
            ..Container::new("x")
        };
        let err = convert_scripts("busybox", &[Step::with_script(c, "echo hi")], &names).unwrap_err();
        assert!(matches!(err, Error::InvalidStep { index: 0, .. }));
    }

    #[test]
    fn test_empty_script_is_not_a_script() {
        let names = SimpleNameGenerator::with_seed(3);
        let steps = vec![Step::with_script(Container::new("step-1"), "")];
        let (got, volumes) = convert_scripts("busybox", &steps, &names).unwrap();
        assert_eq!(got, vec![Container::new("step-1")]);
        assert!(volumes.is_empty());
    }
}
