//! Command resolution for containers that leave `command` empty.
//!
//! The image's declared command is looked up through an
//! [`EntrypointResolver`] and combined with the container's own args the way
//! container runtimes do:
//!
//! | Image entrypoint | User args | Command | Args |
//! |------------------|-----------|---------|------|
//! | set | set | entrypoint | user args |
//! | set | empty | entrypoint | image cmd |
//! | empty | set | `args[0]` | `args[1..]` |
//! | empty | empty | image cmd | (none) |
//!
//! Every resolved container has its image rewritten to the digest-pinned
//! reference so the pod runs exactly what was inspected.

use crate::cache::EntrypointResolver;
use crate::error::{Error, Result};
use crate::registry::ImageCommand;
use crate::spec::Container;
use tracing::info;

/// Resolves every container whose command is empty, in order.
///
/// Containers that already have a command are returned untouched.
///
/// # Errors
///
/// Propagates the first lookup failure. [`Error::MissingCommand`] if an
/// image declares nothing to run and the container has no args.
pub async fn resolve_entrypoints(
    resolver: &dyn EntrypointResolver,
    namespace: &str,
    service_account: &str,
    containers: Vec<Container>,
) -> Result<Vec<Container>> {
    let mut out = Vec::with_capacity(containers.len());

    for mut container in containers {
        if !container.command.is_empty() {
            out.push(container);
            continue;
        }

        let resolved = resolver
            .get(&container.image, namespace, service_account)
            .await?;
        apply_image_command(&mut container, &resolved.command)?;
        info!(
            "Resolved command for {}: {:?}",
            container.display_name(),
            container.command
        );
        container.image = resolved.pinned;
        out.push(container);
    }

    Ok(out)
}

fn apply_image_command(container: &mut Container, image: &ImageCommand) -> Result<()> {
    if !image.entrypoint.is_empty() {
        container.command = image.entrypoint.clone();
        if container.args.is_empty() {
            container.args = image.cmd.clone();
        }
        return Ok(());
    }

    if container.args.is_empty() {
        container.command = image.cmd.clone();
    } else {
        container.command = vec![container.args.remove(0)];
    }

    if container.command.is_empty() {
        return Err(Error::MissingCommand {
            container: container.display_name().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_entrypoint_with_user_args() {
        let mut c = Container {
            args: strings(&["-v"]),
            ..Container::new("img")
        };
        let image = ImageCommand {
            entrypoint: strings(&["/bin/app"]),
            cmd: strings(&["--help"]),
        };
        apply_image_command(&mut c, &image).unwrap();
        assert_eq!(c.command, strings(&["/bin/app"]));
        assert_eq!(c.args, strings(&["-v"]));
    }

    #[test]
    fn test_entrypoint_falls_back_to_cmd() {
        let mut c = Container::new("img");
        let image = ImageCommand {
            entrypoint: strings(&["/bin/app"]),
            cmd: strings(&["--help"]),
        };
        apply_image_command(&mut c, &image).unwrap();
        assert_eq!(c.command, strings(&["/bin/app"]));
        assert_eq!(c.args, strings(&["--help"]));
    }

    #[test]
    fn test_cmd_only() {
        let mut c = Container::new("img");
        let image = ImageCommand {
            entrypoint: Vec::new(),
            cmd: strings(&["sh", "-c", "true"]),
        };
        apply_image_command(&mut c, &image).unwrap();
        assert_eq!(c.command, strings(&["sh", "-c", "true"]));
        assert!(c.args.is_empty());
    }

    #[test]
    fn test_user_args_become_command() {
        let mut c = Container {
            args: strings(&["python", "main.py"]),
            ..Container::new("img")
        };
        let image = ImageCommand {
            entrypoint: Vec::new(),
            cmd: strings(&["bash"]),
        };
        apply_image_command(&mut c, &image).unwrap();
        assert_eq!(c.command, strings(&["python"]));
        assert_eq!(c.args, strings(&["main.py"]));
    }

    #[test]
    fn test_nothing_to_run() {
        let mut c = Container {
            name: "empty".to_string(),
            ..Container::new("scratch")
        };
        let err = apply_image_command(&mut c, &ImageCommand::default()).unwrap_err();
        assert!(matches!(err, Error::MissingCommand { container } if container == "empty"));
    }
}
