//! Configuration for the `steprun` transform CLI.
//!
//! Loaded from YAML. Every field has a default, so an empty file (or no
//! file at the default location) is a valid configuration.
//!
//! ```yaml
//! namespace: ci
//! serviceAccount: builder
//! shellImage: busybox:1.36
//! cacheCapacity: 512
//! registry:
//!   protocol: https
//!   lookupTimeoutSecs: 120
//!   credentials:
//!     - namespace: ci
//!       serviceAccount: builder
//!       registry: ghcr.io
//!       username: bot
//!       password: s3cret
//! nameSeed: 42
//! ```

use crate::constants::{
    DEFAULT_ENTRYPOINT_CACHE_SIZE, DEFAULT_SHELL_IMAGE, IMAGE_LOOKUP_TIMEOUT, MAX_CONFIG_FILE_SIZE,
};
use crate::error::{Error, Result};
use crate::pod::PodOptions;
use crate::registry::RegistryCredential;
use oci_distribution::client::ClientProtocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory under the home directory holding the default config file.
pub const CONFIG_DIR: &str = ".steprun";

/// Default config file name.
pub const CONFIG_FILE: &str = "config.yaml";

/// Transport used to reach registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryProtocol {
    /// TLS.
    #[default]
    Https,
    /// Plain HTTP, for local registries.
    Http,
}

impl From<RegistryProtocol> for ClientProtocol {
    fn from(p: RegistryProtocol) -> Self {
        match p {
            RegistryProtocol::Https => ClientProtocol::Https,
            RegistryProtocol::Http => ClientProtocol::Http,
        }
    }
}

/// Registry access settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Transport.
    pub protocol: RegistryProtocol,
    /// Per-image lookup timeout.
    pub lookup_timeout_secs: u64,
    /// Static credentials keyed by namespace and identity.
    pub credentials: Vec<RegistryCredential>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            protocol: RegistryProtocol::default(),
            lookup_timeout_secs: IMAGE_LOOKUP_TIMEOUT.as_secs(),
            credentials: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Lookup timeout as a [`Duration`].
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Namespace builds run in.
    pub namespace: String,
    /// Identity builds run as.
    pub service_account: String,
    /// Image of the script placer container.
    pub shell_image: String,
    /// Number of digests the entrypoint cache holds.
    pub cache_capacity: usize,
    /// Registry access.
    pub registry: RegistryConfig,
    /// Seed for generated names. Random when unset.
    pub name_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let pod = PodOptions::default();
        Self {
            namespace: pod.namespace,
            service_account: pod.service_account,
            shell_image: DEFAULT_SHELL_IMAGE.to_string(),
            cache_capacity: DEFAULT_ENTRYPOINT_CACHE_SIZE,
            registry: RegistryConfig::default(),
            name_seed: None,
        }
    }
}

impl Config {
    /// Parses and validates a YAML config.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for oversized, malformed, or out-of-range
    /// configuration.
    pub fn from_yaml(yaml: &[u8]) -> Result<Self> {
        if yaml.len() > MAX_CONFIG_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "config exceeds maximum size of {} bytes",
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let config: Config = if yaml.iter().all(u8::is_ascii_whitespace) {
            Config::default()
        } else {
            serde_yaml::from_slice(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads the config at `path`, or at the default location when `None`.
    ///
    /// A missing default file yields [`Config::default`]; a missing explicit
    /// file is an error.
    ///
    /// # Errors
    ///
    /// I/O errors reading an existing file and any [`Config::from_yaml`] error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        match fs::read(&path) {
            Ok(bytes) => {
                debug!("Loading config from {}", path.display());
                Self::from_yaml(&bytes)
            }
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::InvalidInput(format!(
                "cannot read config {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// `~/.steprun/config.yaml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(CONFIG_DIR).join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Options for [`crate::pod::PodBuilder`].
    pub fn pod_options(&self) -> PodOptions {
        PodOptions {
            namespace: self.namespace.clone(),
            service_account: self.service_account.clone(),
            shell_image: self.shell_image.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::InvalidInput(
                "cacheCapacity must be greater than zero".to_string(),
            ));
        }
        if self.registry.lookup_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "registry.lookupTimeoutSecs must be greater than zero".to_string(),
            ));
        }
        if self.shell_image.is_empty() {
            return Err(Error::InvalidInput("shellImage cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(Config::from_yaml(b"").unwrap(), Config::default());
        assert_eq!(Config::from_yaml(b"{}").unwrap(), Config::default());
    }

    #[test]
    fn test_full_config() {
        let yaml = br#"
namespace: ci
serviceAccount: builder
cacheCapacity: 8
registry:
  protocol: http
  lookupTimeoutSecs: 10
  credentials:
    - namespace: ci
      serviceAccount: builder
      registry: localhost:5000
      username: u
      password: p
nameSeed: 42
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.namespace, "ci");
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(config.registry.protocol, RegistryProtocol::Http);
        assert_eq!(config.registry.lookup_timeout(), Duration::from_secs(10));
        assert_eq!(config.registry.credentials.len(), 1);
        assert_eq!(config.name_seed, Some(42));
        assert_eq!(config.shell_image, DEFAULT_SHELL_IMAGE);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Config::from_yaml(b"cacheCapacity: 0").is_err());
    }

    #[test]
    fn test_oversized_config_rejected() {
        let yaml = format!("namespace: ci\n#{}\n", "x".repeat(MAX_CONFIG_FILE_SIZE));
        let err = Config::from_yaml(yaml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("maximum size"), "got {}", err);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "namespace: team-a\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().namespace, "team-a");
    }
}
