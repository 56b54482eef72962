//! # Registry Access for Entrypoint Lookup
//!
//! Resolves an image reference to its digest and declared default command
//! by fetching the manifest and config blob from a container registry.
//! Layers are never downloaded.
//!
//! ## Seams
//!
//! | Trait | Responsibility | Production impl |
//! |-------|----------------|-----------------|
//! | [`ImageSource`] | manifest + config fetch | [`OciImageSource`] |
//! | [`Keychain`] | credentials for namespace/identity | [`StaticKeychain`] |
//!
//! Both are external collaborators of the entrypoint cache and are mocked
//! in tests.
//!
//! ## Image Reference Validation
//!
//! References are validated before parsing:
//! - Length check against `MAX_IMAGE_REF_LEN` (512 bytes)
//! - Character allowlist validation (alphanumeric + `/:.-_@`)
//! - Proper format parsing via `oci-distribution`
//!
//! ## Multi-platform Images
//!
//! For an image index, `oci-distribution` picks the manifest for the host
//! platform before the config is fetched. The returned digest is the digest
//! of the manifest that was originally addressed.

use crate::constants::{IMAGE_LOOKUP_TIMEOUT, MAX_CONFIG_SIZE, validate_image_reference};
use crate::error::{Error, Result};
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

// =============================================================================
// Image Command
// =============================================================================

/// The default command an image declares in its config.
///
/// Container runtimes run `entrypoint` followed by either the user's args or,
/// when none are given, `cmd`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCommand {
    /// Image `Entrypoint`.
    pub entrypoint: Vec<String>,
    /// Image `Cmd`.
    pub cmd: Vec<String>,
}

impl ImageCommand {
    /// Creates a command with only an entrypoint.
    pub fn entrypoint<I, S>(entrypoint: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entrypoint: entrypoint.into_iter().map(Into::into).collect(),
            cmd: Vec::new(),
        }
    }

    /// True when the image declares nothing to run.
    pub fn is_empty(&self) -> bool {
        self.entrypoint.is_empty() && self.cmd.is_empty()
    }
}

/// Result of one remote lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Manifest digest (e.g., `sha256:abc...`).
    pub digest: String,
    /// Declared default command.
    pub command: ImageCommand,
}

/// Image config blob, reduced to the fields lookups need.
#[derive(Debug, Default, Deserialize)]
struct ImageConfigFile {
    #[serde(default)]
    config: Option<ImageRunConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageRunConfig {
    #[serde(default)]
    entrypoint: Option<Vec<String>>,
    #[serde(default)]
    cmd: Option<Vec<String>>,
}

/// Extracts the default command from a raw image config blob.
///
/// # Errors
///
/// Fails if the blob exceeds `MAX_CONFIG_SIZE` or is not an image config.
pub fn parse_image_command(reference: &str, config: &str) -> Result<ImageCommand> {
    if config.len() > MAX_CONFIG_SIZE {
        return Err(Error::ImageLookupFailed {
            reference: reference.to_string(),
            reason: format!("config blob exceeds {} bytes", MAX_CONFIG_SIZE),
        });
    }

    let file: ImageConfigFile =
        serde_json::from_str(config).map_err(|e| Error::ImageLookupFailed {
            reference: reference.to_string(),
            reason: format!("malformed image config: {}", e),
        })?;

    let run = file.config.unwrap_or_default();
    Ok(ImageCommand {
        entrypoint: run.entrypoint.unwrap_or_default(),
        cmd: run.cmd.unwrap_or_default(),
    })
}

// =============================================================================
// Reference Helpers
// =============================================================================

/// Validates and parses an image reference.
///
/// # Errors
///
/// [`Error::InvalidImageReference`] for overlong, ill-charactered, or
/// unparseable references.
pub fn parse_reference(image: &str) -> Result<Reference> {
    validate_image_reference(image).map_err(|reason| Error::InvalidImageReference {
        reference: image.to_string(),
        reason: reason.to_string(),
    })?;

    image
        .parse::<Reference>()
        .map_err(|e| Error::InvalidImageReference {
            reference: image.to_string(),
            reason: e.to_string(),
        })
}

/// Formats `registry/repository@digest`, dropping any tag.
pub fn pinned_reference(reference: &Reference, digest: &str) -> String {
    format!(
        "{}/{}@{}",
        reference.registry(),
        reference.repository(),
        digest
    )
}

// =============================================================================
// Image Source
// =============================================================================

/// Fetches manifest and config for an image.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Returns the digest and default command of `reference`.
    async fn fetch(&self, reference: &Reference, auth: &RegistryAuth) -> Result<FetchedImage>;
}

/// [`ImageSource`] backed by the `oci-distribution` client.
pub struct OciImageSource {
    client: Client,
    timeout: Duration,
}

impl OciImageSource {
    /// Creates a source speaking HTTPS with the default lookup timeout.
    pub fn new() -> Self {
        Self::with_protocol(ClientProtocol::Https)
    }

    /// Creates a source with an explicit protocol (plain HTTP for local
    /// registries).
    pub fn with_protocol(protocol: ClientProtocol) -> Self {
        Self {
            client: Client::new(ClientConfig {
                protocol,
                ..Default::default()
            }),
            timeout: IMAGE_LOOKUP_TIMEOUT,
        }
    }

    /// Overrides the per-lookup timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OciImageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for OciImageSource {
    async fn fetch(&self, reference: &Reference, auth: &RegistryAuth) -> Result<FetchedImage> {
        info!("Fetching image config: {}", reference);

        let (_manifest, digest, config) = tokio::time::timeout(self.timeout, async {
            self.client.pull_manifest_and_config(reference, auth).await
        })
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("fetch manifest and config for {}", reference),
            duration: self.timeout,
        })?
        .map_err(|e| Error::ImageLookupFailed {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

        let command = parse_image_command(&reference.to_string(), &config)?;
        debug!(
            "Resolved {} to {} (entrypoint {:?}, cmd {:?})",
            reference, digest, command.entrypoint, command.cmd
        );

        Ok(FetchedImage { digest, command })
    }
}

// =============================================================================
// Keychain
// =============================================================================

/// Resolves registry credentials for a namespace and identity.
#[async_trait]
pub trait Keychain: Send + Sync {
    /// Returns the auth to use when fetching `reference`.
    async fn resolve(
        &self,
        namespace: &str,
        service_account: &str,
        reference: &Reference,
    ) -> Result<RegistryAuth>;
}

/// Keychain that always answers anonymously.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousKeychain;

#[async_trait]
impl Keychain for AnonymousKeychain {
    async fn resolve(&self, _: &str, _: &str, _: &Reference) -> Result<RegistryAuth> {
        Ok(RegistryAuth::Anonymous)
    }
}

/// A basic-auth credential bound to a namespace, identity and registry.
///
/// An empty `service_account` applies to every identity in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredential {
    /// Namespace the credential belongs to.
    pub namespace: String,
    /// Identity the credential belongs to; empty matches any.
    #[serde(default)]
    pub service_account: String,
    /// Registry host (e.g., `ghcr.io`, `docker.io`).
    pub registry: String,
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

/// Keychain over a fixed credential list.
///
/// An identity-specific credential wins over a namespace-wide one; with no
/// match the lookup proceeds anonymously. An empty namespace is rejected.
#[derive(Debug, Clone, Default)]
pub struct StaticKeychain {
    credentials: Vec<RegistryCredential>,
}

impl StaticKeychain {
    /// Creates a keychain from credentials.
    pub fn new(credentials: Vec<RegistryCredential>) -> Self {
        Self { credentials }
    }

    fn find(&self, namespace: &str, service_account: &str, registry: &str) -> Option<&RegistryCredential> {
        let candidates = || {
            self.credentials
                .iter()
                .filter(move |c| c.namespace == namespace && c.registry == registry)
        };
        candidates()
            .find(|c| c.service_account == service_account)
            .or_else(|| candidates().find(|c| c.service_account.is_empty()))
    }
}

#[async_trait]
impl Keychain for StaticKeychain {
    async fn resolve(
        &self,
        namespace: &str,
        service_account: &str,
        reference: &Reference,
    ) -> Result<RegistryAuth> {
        if namespace.is_empty() {
            return Err(Error::CredentialsUnavailable {
                namespace: namespace.to_string(),
                service_account: service_account.to_string(),
                reason: "credentials are keyed by namespace; none given".to_string(),
            });
        }
        match self.find(namespace, service_account, reference.registry()) {
            Some(cred) => {
                debug!(
                    "Using credentials for {} in {}/{}",
                    cred.registry, namespace, service_account
                );
                Ok(RegistryAuth::Basic(
                    cred.username.clone(),
                    cred.password.clone(),
                ))
            }
            None => Ok(RegistryAuth::Anonymous),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_command() {
        let config = r#"{"architecture":"amd64","config":{"Entrypoint":["/ko-app/app"],"Cmd":["serve"]}}"#;
        let cmd = parse_image_command("app", config).unwrap();
        assert_eq!(cmd.entrypoint, vec!["/ko-app/app"]);
        assert_eq!(cmd.cmd, vec!["serve"]);
    }

    #[test]
    fn test_parse_image_command_null_fields() {
        let config = r#"{"config":{"Entrypoint":null,"Cmd":["/bin/sh"]}}"#;
        let cmd = parse_image_command("alpine", config).unwrap();
        assert!(cmd.entrypoint.is_empty());
        assert_eq!(cmd.cmd, vec!["/bin/sh"]);

        let cmd = parse_image_command("scratch", "{}").unwrap();
        assert!(cmd.is_empty());
    }

    #[test]
    fn test_parse_image_command_malformed() {
        let err = parse_image_command("bad", "not json").unwrap_err();
        assert!(matches!(err, Error::ImageLookupFailed { .. }));
    }

    #[test]
    fn test_parse_reference_validation() {
        assert!(parse_reference("nginx:latest").is_ok());
        assert!(matches!(
            parse_reference("nginx :latest"),
            Err(Error::InvalidImageReference { .. })
        ));
        assert!(parse_reference("").is_err());
    }

    #[test]
    fn test_pinned_reference_drops_tag() {
        let r = parse_reference("ghcr.io/org/app:v1").unwrap();
        assert_eq!(
            pinned_reference(&r, "sha256:abcd"),
            "ghcr.io/org/app@sha256:abcd"
        );
    }

    #[tokio::test]
    async fn test_static_keychain_precedence() {
        let cred = |sa: &str, user: &str| RegistryCredential {
            namespace: "ci".to_string(),
            service_account: sa.to_string(),
            registry: "ghcr.io".to_string(),
            username: user.to_string(),
            password: "pw".to_string(),
        };
        let keychain = StaticKeychain::new(vec![cred("", "any"), cred("builder", "specific")]);
        let r = parse_reference("ghcr.io/org/app:v1").unwrap();

        match keychain.resolve("ci", "builder", &r).await.unwrap() {
            RegistryAuth::Basic(user, _) => assert_eq!(user, "specific"),
            _ => panic!("expected basic auth"),
        }
        match keychain.resolve("ci", "other", &r).await.unwrap() {
            RegistryAuth::Basic(user, _) => assert_eq!(user, "any"),
            _ => panic!("expected basic auth"),
        }
        assert!(matches!(
            keychain.resolve("prod", "builder", &r).await.unwrap(),
            RegistryAuth::Anonymous
        ));
        assert!(matches!(
            keychain.resolve("", "builder", &r).await,
            Err(Error::CredentialsUnavailable { .. })
        ));
    }
}
