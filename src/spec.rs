//! Step, sidecar, and task definitions.
//!
//! This module provides the typed input of the transform pipeline and the
//! YAML manifest parsing that produces it, with validation.
//!
//! # Manifest Format
//!
//! ```yaml
//! spec:
//!   stepTemplate:
//!     env: [{ name: CI, value: "true" }]
//!   sidecars:
//!     - name: db
//!       image: postgres:16
//!   steps:
//!     - name: build
//!       image: golang:1.22
//!       command: [go, build, ./...]
//!     - name: check
//!       image: alpine:3.19
//!       script: |
//!         #!/bin/sh
//!         test -f /workspace/out
//! ```
//!
//! Both a full document with a `spec:` key and a bare spec body are accepted.

use crate::constants::{
    MAX_CONTAINER_NAME_LEN, MAX_ENV_VARS_PER_CONTAINER, MAX_MANIFEST_SIZE, MAX_SIDECARS, MAX_STEPS,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Validation Helpers
// =============================================================================

/// Validates a Kubernetes-compatible name (RFC 1123 DNS label).
fn validate_name(name: &str, max_len: usize) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("name cannot be empty".to_string()));
    }

    if name.len() > max_len {
        return Err(Error::InvalidInput(format!(
            "name '{}' exceeds maximum length of {}",
            name, max_len
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "name '{}' must contain only lowercase alphanumeric characters or '-'",
            name
        )));
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(Error::InvalidInput(format!(
            "name '{}' cannot start or end with '-'",
            name
        )));
    }

    Ok(())
}

fn string_seq(value: Option<&serde_yaml::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|v| match v {
                    serde_yaml::Value::String(s) => Some(s.clone()),
                    serde_yaml::Value::Number(n) => Some(n.to_string()),
                    serde_yaml::Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// Task Specification
// =============================================================================

/// A task: the ordered steps, their sidecars, and an optional step template.
///
/// Immutable once the pipeline begins; every transform produces new values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Steps, run strictly in order.
    pub steps: Vec<Step>,
    /// Sidecars, run concurrently with all steps.
    #[serde(default)]
    pub sidecars: Vec<Container>,
    /// Defaults merged under every step.
    #[serde(default)]
    pub step_template: Option<Container>,
    /// Volumes declared by the task (referenced by step mounts).
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl TaskSpec {
    /// Parses a task spec from YAML bytes.
    ///
    /// # Errors
    ///
    /// - Size exceeds `MAX_MANIFEST_SIZE`
    /// - YAML parsing fails
    /// - Validation errors for names, counts, quantities, or script/command
    ///   conflicts
    pub fn from_yaml(yaml: &[u8]) -> Result<Self> {
        if yaml.len() > MAX_MANIFEST_SIZE {
            return Err(Error::InvalidInput(format!(
                "manifest size {} exceeds limit of {}",
                yaml.len(),
                MAX_MANIFEST_SIZE
            )));
        }

        let doc: serde_yaml::Value = serde_yaml::from_slice(yaml)?;
        Self::from_value(&doc)
    }

    /// Parses a task spec from a `serde_yaml::Value`.
    pub fn from_value(doc: &serde_yaml::Value) -> Result<Self> {
        let spec = doc.get("spec").unwrap_or(doc);

        let steps_seq = spec
            .get("steps")
            .and_then(|s| s.as_sequence())
            .ok_or_else(|| Error::InvalidInput("missing spec.steps".to_string()))?;

        if steps_seq.is_empty() {
            return Err(Error::InvalidInput("at least one step required".to_string()));
        }
        if steps_seq.len() > MAX_STEPS {
            return Err(Error::InvalidInput(format!(
                "too many steps: {} (max {})",
                steps_seq.len(),
                MAX_STEPS
            )));
        }

        let steps = steps_seq
            .iter()
            .enumerate()
            .map(|(i, v)| Step::from_value(v).map_err(|e| step_error(i, e)))
            .collect::<Result<Vec<_>>>()?;

        let sidecars = match spec.get("sidecars").and_then(|s| s.as_sequence()) {
            Some(seq) if seq.len() > MAX_SIDECARS => {
                return Err(Error::InvalidInput(format!(
                    "too many sidecars: {} (max {})",
                    seq.len(),
                    MAX_SIDECARS
                )));
            }
            Some(seq) => seq
                .iter()
                .map(Container::from_value)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let step_template = spec
            .get("stepTemplate")
            .map(Container::from_value)
            .transpose()
            .map_err(|e| Error::InvalidTemplate(e.to_string()))?;

        let volumes = match spec.get("volumes").and_then(|v| v.as_sequence()) {
            Some(seq) => seq.iter().map(Volume::from_value).collect::<Result<_>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            steps,
            sidecars,
            step_template,
            volumes,
        })
    }
}

fn step_error(index: usize, e: Error) -> Error {
    match e {
        Error::InvalidInput(reason) => Error::InvalidStep { index, reason },
        other => other,
    }
}

// =============================================================================
// Step
// =============================================================================

/// One sequential unit of work: a container plus an optional inline script.
///
/// A script and an explicit command are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// The container that runs this step.
    #[serde(flatten)]
    pub container: Container,
    /// Inline script body, materialized to a file before any step runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl Step {
    /// Creates a step from a container with no script.
    pub fn new(container: Container) -> Self {
        Self {
            container,
            script: None,
        }
    }

    /// Creates a script step.
    pub fn with_script(container: Container, script: impl Into<String>) -> Self {
        Self {
            container,
            script: Some(script.into()),
        }
    }

    /// Returns the inline script if it is non-empty.
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref().filter(|s| !s.is_empty())
    }

    /// Parses from a YAML value.
    pub fn from_value(value: &serde_yaml::Value) -> Result<Self> {
        let container = Container::from_value(value)?;
        let script = value
            .get("script")
            .and_then(|s| s.as_str())
            .map(String::from);

        let step = Self { container, script };
        step.validate()?;
        Ok(step)
    }

    /// Checks that script and command are not both set.
    pub fn validate(&self) -> Result<()> {
        if self.script().is_some() && !self.container.command.is_empty() {
            return Err(Error::InvalidInput(
                "script cannot be used with command".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Container
// =============================================================================

/// Container definition shared by steps and sidecars.
///
/// Empty strings and empty lists mean "unset": the step template fills them
/// and entrypoint resolution fills an empty `command`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Container {
    /// Container name (RFC 1123 label), optional.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Image reference (e.g., "alpine:3.19", "ghcr.io/user/app@sha256:...").
    pub image: String,
    /// Executable and leading arguments. Empty means "use the image's".
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments to the command.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables, in order. Later entries win.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Volume mount points.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    /// Working directory inside the container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Resource requests and limits.
    #[serde(skip_serializing_if = "ResourceRequirements::is_empty")]
    pub resources: ResourceRequirements,
    /// Allocate a TTY.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub tty: bool,
}

impl Container {
    /// Creates a container running `image` with no other fields set.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Human-readable identifier for logs and errors.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.image
        } else {
            &self.name
        }
    }

    /// Returns the value of the last env var named `name`.
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Parses from a YAML value.
    pub fn from_value(value: &serde_yaml::Value) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        if !name.is_empty() {
            validate_name(&name, MAX_CONTAINER_NAME_LEN)?;
        }

        let image = value
            .get("image")
            .and_then(|i| i.as_str())
            .unwrap_or_default()
            .to_string();

        let command = string_seq(value.get("command"));
        let args = string_seq(value.get("args"));
        let env = parse_env_vars(value.get("env"), &name)?;

        let working_dir = value
            .get("workingDir")
            .and_then(|w| w.as_str())
            .filter(|w| !w.is_empty())
            .map(String::from);

        let volume_mounts = parse_volume_mounts(value.get("volumeMounts"))?;
        let resources = parse_resources(value.get("resources"))?;
        let tty = value.get("tty").and_then(|t| t.as_bool()).unwrap_or(false);

        Ok(Self {
            name,
            image,
            command,
            args,
            env,
            volume_mounts,
            working_dir,
            resources,
            tty,
        })
    }
}

fn parse_env_vars(value: Option<&serde_yaml::Value>, container_name: &str) -> Result<Vec<EnvVar>> {
    let Some(seq) = value.and_then(|v| v.as_sequence()) else {
        return Ok(Vec::new());
    };

    if seq.len() > MAX_ENV_VARS_PER_CONTAINER {
        return Err(Error::InvalidInput(format!(
            "too many environment variables in container {}: {} (max {})",
            container_name,
            seq.len(),
            MAX_ENV_VARS_PER_CONTAINER
        )));
    }

    seq.iter()
        .map(|item| {
            let name = item
                .get("name")
                .and_then(|n| n.as_str())
                .filter(|n| !n.is_empty())
                .ok_or_else(|| Error::InvalidInput("missing env name".to_string()))?;
            let value = match item.get("value") {
                Some(serde_yaml::Value::String(s)) => s.clone(),
                Some(serde_yaml::Value::Number(n)) => n.to_string(),
                Some(serde_yaml::Value::Bool(b)) => b.to_string(),
                _ => String::new(),
            };
            Ok(EnvVar::new(name, value))
        })
        .collect()
}

fn parse_volume_mounts(value: Option<&serde_yaml::Value>) -> Result<Vec<VolumeMount>> {
    let Some(seq) = value.and_then(|v| v.as_sequence()) else {
        return Ok(Vec::new());
    };

    seq.iter()
        .map(|vm| {
            let name = vm
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| Error::InvalidInput("volume mount missing 'name'".to_string()))?;
            let mount_path = vm
                .get("mountPath")
                .and_then(|p| p.as_str())
                .filter(|p| p.starts_with('/'))
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "volume mount '{}' needs an absolute 'mountPath'",
                        name
                    ))
                })?;
            let read_only = vm
                .get("readOnly")
                .and_then(|r| r.as_bool())
                .unwrap_or(false);
            Ok(VolumeMount {
                name: name.to_string(),
                mount_path: mount_path.to_string(),
                read_only,
            })
        })
        .collect()
}

fn parse_resources(value: Option<&serde_yaml::Value>) -> Result<ResourceRequirements> {
    let Some(r) = value else {
        return Ok(ResourceRequirements::default());
    };

    Ok(ResourceRequirements {
        requests: parse_resource_list(r.get("requests"))?,
        limits: parse_resource_list(r.get("limits"))?,
    })
}

fn parse_resource_list(value: Option<&serde_yaml::Value>) -> Result<BTreeMap<String, Quantity>> {
    let Some(mapping) = value.and_then(|v| v.as_mapping()) else {
        return Ok(BTreeMap::new());
    };

    let mut list = BTreeMap::new();
    for (k, v) in mapping {
        let name = k
            .as_str()
            .ok_or_else(|| Error::InvalidInput("resource name must be a string".to_string()))?;
        let raw = match v {
            serde_yaml::Value::String(s) => s.clone(),
            serde_yaml::Value::Number(n) => n.to_string(),
            _ => {
                return Err(Error::InvalidInput(format!(
                    "resource '{}' must be a quantity",
                    name
                )));
            }
        };
        list.insert(name.to_string(), raw.parse()?);
    }
    Ok(list)
}

// =============================================================================
// Supporting Types
// =============================================================================

/// Environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value.
    #[serde(default)]
    pub value: String,
}

impl EnvVar {
    /// Creates an env var.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Volume mount specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Name of the volume to mount.
    pub name: String,
    /// Path inside the container to mount at.
    pub mount_path: String,
    /// If true, mount as read-only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl VolumeMount {
    /// Creates a writable mount.
    pub fn new(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only: false,
        }
    }
}

/// Pod volume definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name (referenced by volume mounts).
    pub name: String,
    /// Volume source type.
    pub source: VolumeSource,
}

impl Volume {
    /// Creates an ephemeral volume.
    pub fn empty_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::EmptyDir,
        }
    }

    fn from_value(value: &serde_yaml::Value) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| Error::InvalidInput("volume missing 'name' field".to_string()))?
            .to_string();

        validate_name(&name, MAX_CONTAINER_NAME_LEN)?;

        let source = if let Some(hp) = value.get("hostPath") {
            let path = hp
                .get("path")
                .and_then(|p| p.as_str())
                .ok_or_else(|| {
                    Error::InvalidInput(format!("hostPath volume '{}' missing 'path' field", name))
                })?
                .to_string();

            if path.contains("..") || !path.starts_with('/') {
                return Err(Error::InvalidInput(format!(
                    "hostPath volume '{}' must be a clean absolute path: {}",
                    name, path
                )));
            }

            VolumeSource::HostPath { path }
        } else if let Some(cm) = value.get("configMap") {
            let cm_name = cm
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| {
                    Error::InvalidInput(format!("configMap volume '{}' missing 'name' field", name))
                })?
                .to_string();
            VolumeSource::ConfigMap { name: cm_name }
        } else if let Some(secret) = value.get("secret") {
            let secret_name = secret
                .get("secretName")
                .and_then(|n| n.as_str())
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "secret volume '{}' missing 'secretName' field",
                        name
                    ))
                })?
                .to_string();
            VolumeSource::Secret { name: secret_name }
        } else {
            VolumeSource::EmptyDir
        };

        Ok(Self { name, source })
    }
}

/// Volume source type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Empty directory, lives as long as the pod.
    EmptyDir,
    /// Host filesystem path.
    HostPath { path: String },
    /// ConfigMap reference.
    ConfigMap { name: String },
    /// Secret reference.
    Secret { name: String },
}

/// Resource requests and limits, keyed by resource name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    /// Requested amounts.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,
    /// Hard limits.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

impl ResourceRequirements {
    /// True when neither requests nor limits are set.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }

    /// Builds requirements from `(name, quantity)` request pairs.
    ///
    /// # Errors
    ///
    /// Fails if any quantity does not parse.
    pub fn with_requests<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let requests = pairs
            .into_iter()
            .map(|(n, q)| Ok((n.to_string(), q.parse()?)))
            .collect::<Result<_>>()?;
        Ok(Self {
            requests,
            limits: BTreeMap::new(),
        })
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A resource amount such as `500m`, `2`, `10Mi` or `1.9Gi`.
///
/// Compared by value; serialized in its original textual form.
#[derive(Debug, Clone)]
pub struct Quantity {
    raw: String,
    milli: i128,
}

impl Quantity {
    /// The zero quantity.
    pub fn zero() -> Self {
        Self {
            raw: "0".to_string(),
            milli: 0,
        }
    }

    /// True for any representation of zero.
    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    /// Value in thousandths of the base unit, truncated.
    pub fn milli_value(&self) -> i128 {
        self.milli
    }

    /// The textual form this quantity was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Returns `(numerator, denominator)` of the suffix multiplier.
fn suffix_multiplier(suffix: &str) -> Option<(i128, i128)> {
    let m = match suffix {
        "" => (1, 1),
        "n" => (1, 1_000_000_000),
        "u" => (1, 1_000_000),
        "m" => (1, 1_000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => return None,
    };
    Some(m)
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        let invalid = |reason: &str| Error::InvalidInput(format!("invalid quantity '{}': {}", s, reason));

        let split = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+'))
            .unwrap_or(raw.len());
        let (number, suffix) = raw.split_at(split);
        let number = number.strip_prefix('+').unwrap_or(number);

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid("missing number"));
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("malformed number"));
        }
        let (num, den) = suffix_multiplier(suffix).ok_or_else(|| invalid("unknown suffix"))?;

        let digits = format!("{}{}", int_part, frac_part);
        let mantissa: i128 = digits.parse().map_err(|_| invalid("number too large"))?;
        let scale = 10i128
            .checked_pow(frac_part.len() as u32)
            .ok_or_else(|| invalid("too many fractional digits"))?;

        let milli = mantissa
            .checked_mul(num)
            .and_then(|v| v.checked_mul(1000))
            .ok_or_else(|| invalid("number too large"))?
            / den
                .checked_mul(scale)
                .ok_or_else(|| invalid("too many fractional digits"))?;

        Ok(Self {
            raw: raw.to_string(),
            milli,
        })
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.milli.cmp(&other.milli)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_compares_by_value() {
        let a: Quantity = "1.9Gi".parse().unwrap();
        let b: Quantity = "10Mi".parse().unwrap();
        let c: Quantity = "2000m".parse().unwrap();
        let d: Quantity = "2".parse().unwrap();
        assert!(a > b);
        assert_eq!(c, d);
        assert_eq!(c.as_str(), "2000m");
    }

    #[test]
    fn test_quantity_rejects_garbage() {
        assert!("".parse::<Quantity>().is_err());
        assert!("12Xi".parse::<Quantity>().is_err());
        assert!("1.2.3".parse::<Quantity>().is_err());
        assert!("-1".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("build-1", MAX_CONTAINER_NAME_LEN).is_ok());
        assert!(validate_name("Build", MAX_CONTAINER_NAME_LEN).is_err());
        assert!(validate_name("-x", MAX_CONTAINER_NAME_LEN).is_err());
    }
}
