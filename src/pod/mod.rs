//! # Pod Layout - Step Transform Pipeline and Container Ordering
//!
//! This module turns a [`TaskSpec`] into the containers and volumes of one
//! pod. All steps and sidecars are transformed together: either every
//! container is produced or the build fails with the first error.
//!
//! ## Pipeline
//!
//! ```text
//! steps ──▶ template ──▶ workspace/home ──▶ scripts ──▶ resolve ──▶ resources ──┐
//!                                                                               ├──▶ order
//! sidecars ─────────────────────────────────────────────▶ resolve ──────────────┘
//! ```
//!
//! | Stage | Module | Applies to |
//! |-------|--------|------------|
//! | Template merge | `template` | steps |
//! | Workspace and home injection | `workspace` | steps |
//! | Script materialization | `script` | steps |
//! | Command resolution | `resolve` | sidecars, steps |
//! | Resource aggregation | `resources` | steps (placer included) |
//! | Ordering | `order` | sidecars, steps |
//!
//! The order is fixed. Script steps already carry a command when resolution
//! runs, so they never hit the registry, and resources are computed over the
//! final step list only.
//!
//! ## Example
//!
//! ```rust,ignore
//! use steprun::pod::{PodBuilder, PodOptions};
//!
//! let builder = PodBuilder::new(cache, names, PodOptions::default());
//! let layout = builder.build(&TaskSpec::from_yaml(manifest)?).await?;
//! ```

mod order;
mod resolve;
mod resources;
mod script;
mod template;
mod workspace;

use crate::cache::EntrypointResolver;
use crate::constants::{DEFAULT_SHELL_IMAGE, TOOLS_VOLUME_NAME};
use crate::error::Result;
use crate::names::NameGenerator;
use crate::spec::{Container, TaskSpec, Volume};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub use order::{marker_path, order_containers, sidecar_start_marker, tools_mount};
pub use resolve::resolve_entrypoints;
pub use resources::set_resources;
pub use script::convert_scripts;
pub use template::merge_step_template;
pub use workspace::{clean_path, set_workspace_and_home};

/// Identity and defaults a build runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodOptions {
    /// Namespace used to pick registry credentials.
    pub namespace: String,
    /// Identity used to pick registry credentials.
    pub service_account: String,
    /// Image of the script placer container.
    pub shell_image: String,
}

impl Default for PodOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            service_account: "default".to_string(),
            shell_image: DEFAULT_SHELL_IMAGE.to_string(),
        }
    }
}

/// Ordered containers and the volumes they mount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodLayout {
    /// Sidecars first, then the placer (if any), then steps.
    pub containers: Vec<Container>,
    /// Task volumes followed by the implicit ones the pipeline added.
    pub volumes: Vec<Volume>,
}

/// Runs the transform pipeline and ordering for a task.
pub struct PodBuilder {
    resolver: Arc<dyn EntrypointResolver>,
    names: Arc<dyn NameGenerator>,
    options: PodOptions,
}

impl PodBuilder {
    /// Creates a builder.
    pub fn new(
        resolver: Arc<dyn EntrypointResolver>,
        names: Arc<dyn NameGenerator>,
        options: PodOptions,
    ) -> Self {
        Self {
            resolver,
            names,
            options,
        }
    }

    /// Builds the pod layout for `task`.
    ///
    /// # Errors
    ///
    /// The first transform or resolution error. Nothing is returned on
    /// failure.
    pub async fn build(&self, task: &TaskSpec) -> Result<PodLayout> {
        let names = self.names.as_ref();

        let steps = merge_step_template(task.step_template.as_ref(), &task.steps)?;
        let (steps, implicit_volumes) = set_workspace_and_home(&steps, names);
        let (steps, script_volumes) = convert_scripts(&self.options.shell_image, &steps, names)?;

        let sidecars = resolve_entrypoints(
            self.resolver.as_ref(),
            &self.options.namespace,
            &self.options.service_account,
            task.sidecars.clone(),
        )
        .await?;
        let steps = resolve_entrypoints(
            self.resolver.as_ref(),
            &self.options.namespace,
            &self.options.service_account,
            steps,
        )
        .await?;

        let steps = set_resources(steps);
        let containers = order_containers(&sidecars, &steps)?;

        let mut volumes = task.volumes.clone();
        volumes.extend(implicit_volumes);
        volumes.extend(script_volumes);
        volumes.push(Volume::empty_dir(TOOLS_VOLUME_NAME));

        info!(
            "Built pod layout: {} sidecars, {} steps, {} volumes",
            sidecars.len(),
            steps.len(),
            volumes.len()
        );
        Ok(PodLayout {
            containers,
            volumes,
        })
    }
}
