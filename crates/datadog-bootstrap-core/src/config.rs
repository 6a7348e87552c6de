// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven configuration for the bootstrap.
//!
//! Every recognized variable is captured once into a [`BootstrapEnv`] at
//! startup and passed into the components from there, so nothing else in
//! the crate reads process-wide environment state and tests can inject
//! arbitrary environments through [`BootstrapEnv::from_env_iter`].

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use rancher_metadata_client::{base_url_for_host, DEFAULT_METADATA_HOST};

use crate::error::BootstrapError;
use crate::tags::{split_csv, TagSet};

/// Environment variable overriding the metadata service host name.
const ENV_METADATA_HOSTNAME: &str = "DD_METADATA_HOSTNAME";
/// Environment variable bounding the metadata fetch, in seconds.
const ENV_METADATA_TIMEOUT: &str = "DD_METADATA_TIMEOUT";
/// Environment variable carrying host tags as comma-separated tokens.
const ENV_TAGS: &str = "TAGS";
/// Environment variable listing host labels to promote into host tags.
const ENV_HOST_LABELS: &str = "DD_HOST_LABELS";
/// Environment variable listing container labels to export as metric tags.
const ENV_CONTAINER_LABELS: &str = "DD_CONTAINER_LABELS";
/// Environment variable toggling the built-in Rancher container labels.
const ENV_DEFAULT_CONTAINER_LABELS: &str = "DD_DEFAULT_CONTAINER_LABELS";
/// Environment variable marking a Kubernetes environment (presence only).
const ENV_KUBERNETES: &str = "DD_KUBERNETES";
/// Environment variable toggling service discovery.
const ENV_SERVICE_DISCOVERY: &str = "DD_SERVICE_DISCOVERY";
/// Environment variable selecting the service discovery config backend.
const ENV_SD_CONFIG_BACKEND: &str = "DD_SD_CONFIG_BACKEND";
/// Environment variable naming the backend store host.
const ENV_SD_BACKEND_HOST: &str = "DD_SD_BACKEND_HOST";
/// Environment variable naming the backend store port.
const ENV_SD_BACKEND_PORT: &str = "DD_SD_BACKEND_PORT";
/// Environment variable overriding the template path inside the backend store.
const ENV_SD_TEMPLATE_DIR: &str = "DD_SD_TEMPLATE_DIR";
/// Environment variable carrying the Consul ACL token.
const ENV_CONSUL_TOKEN: &str = "DD_CONSUL_TOKEN";
/// Environment variable selecting the scheme used to reach Consul.
const ENV_CONSUL_SCHEME: &str = "DD_CONSUL_SCHEME";
/// Environment variable toggling TLS verification for Consul over HTTPS.
const ENV_CONSUL_VERIFY: &str = "DD_CONSUL_VERIFY";
/// Environment variable marking the Alpine image layout.
const ENV_ALPINE: &str = "DD_ALPINE";

/// Agent configuration file in the stock image layout.
const STANDARD_AGENT_CONFIG: &str = "/etc/dd-agent/datadog.conf";
/// Docker integration configuration in the stock image layout.
const STANDARD_DOCKER_CONFIG: &str = "/etc/dd-agent/conf.d/docker_daemon.yaml";
/// Agent configuration file in the Alpine image layout.
const ALPINE_AGENT_CONFIG: &str = "/opt/datadog-agent/agent/datadog.conf";
/// Docker integration configuration in the Alpine image layout.
const ALPINE_DOCKER_CONFIG: &str = "/opt/datadog-agent/agent/conf.d/docker_daemon.yaml";

/// Default overall deadline for the metadata fetch.
const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// Service discovery configuration backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdBackend {
    /// No external store; templates ship with the image.
    None,
    /// Check templates are read from an etcd store.
    Etcd,
    /// Check templates are read from a Consul store.
    Consul,
}

impl SdBackend {
    /// Parses the backend selector, rejecting unknown values outright.
    fn parse(value: &str) -> Result<Self, BootstrapError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "etcd" => Ok(Self::Etcd),
            "consul" => Ok(Self::Consul),
            other => Err(BootstrapError::InvalidConfig(format!(
                "unsupported DD_SD_CONFIG_BACKEND value '{other}', expected none, etcd, or consul"
            ))),
        }
    }

    /// Name used for the backend in configuration directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Etcd => "etcd",
            Self::Consul => "consul",
        }
    }
}

/// Captures every environment-derived option used by the bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapEnv {
    /// Host name used to reach the metadata service.
    pub metadata_host: String,
    /// Overall deadline for the metadata fetch.
    pub metadata_timeout: Duration,
    /// Host tags supplied through the environment.
    pub host_tags: TagSet,
    /// Host label keys promoted from metadata into host tags.
    pub host_label_allowlist: Vec<String>,
    /// Container label names exported as metric tags.
    pub container_labels: Vec<String>,
    /// Whether the built-in Rancher labels join the container label set.
    pub include_default_container_labels: bool,
    /// Kubernetes mode; suppresses container label export entirely.
    pub kubernetes: bool,
    /// Whether service discovery is enabled.
    pub service_discovery: bool,
    /// Selected service discovery config backend.
    pub sd_config_backend: SdBackend,
    /// Backend store host.
    pub sd_backend_host: Option<String>,
    /// Backend store port.
    pub sd_backend_port: Option<u16>,
    /// Template path override inside the backend store.
    pub sd_template_dir: Option<String>,
    /// Consul ACL token, forwarded verbatim.
    pub consul_token: Option<String>,
    /// Consul connection scheme, forwarded verbatim.
    pub consul_scheme: Option<String>,
    /// Consul TLS verification flag, forwarded verbatim.
    pub consul_verify: Option<String>,
    /// Agent configuration file rewritten during bootstrap.
    pub agent_config_path: PathBuf,
    /// Docker integration configuration rewritten during bootstrap.
    pub docker_config_path: PathBuf,
}

impl Default for BootstrapEnv {
    fn default() -> Self {
        Self {
            metadata_host: DEFAULT_METADATA_HOST.to_string(),
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            host_tags: TagSet::new(),
            host_label_allowlist: Vec::new(),
            container_labels: Vec::new(),
            include_default_container_labels: true,
            kubernetes: false,
            service_discovery: false,
            sd_config_backend: SdBackend::None,
            sd_backend_host: None,
            sd_backend_port: None,
            sd_template_dir: None,
            consul_token: None,
            consul_scheme: None,
            consul_verify: None,
            agent_config_path: PathBuf::from(STANDARD_AGENT_CONFIG),
            docker_config_path: PathBuf::from(STANDARD_DOCKER_CONFIG),
        }
    }
}

impl BootstrapEnv {
    /// Builds settings from the current process environment.
    ///
    /// Side-effect free apart from reading `std::env::vars`.
    pub fn from_os_env() -> Result<Self, BootstrapError> {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Result<Self, BootstrapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let metadata_host = map
            .get(ENV_METADATA_HOSTNAME)
            .and_then(|value| sanitize_non_empty(value))
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
        let metadata_timeout = map
            .get(ENV_METADATA_TIMEOUT)
            .and_then(|value| match value.trim().parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(%value, "ignoring unparsable DD_METADATA_TIMEOUT");
                    None
                }
            })
            .unwrap_or(DEFAULT_METADATA_TIMEOUT);

        let host_tags = TagSet::parse(map.get(ENV_TAGS).map(String::as_str).unwrap_or(""));
        let host_label_allowlist =
            split_csv(map.get(ENV_HOST_LABELS).map(String::as_str).unwrap_or(""));
        let container_labels =
            split_csv(map.get(ENV_CONTAINER_LABELS).map(String::as_str).unwrap_or(""));
        let include_default_container_labels = parse_bool(
            map.get(ENV_DEFAULT_CONTAINER_LABELS).map(String::as_str),
            true,
        );
        // Kubernetes mode is signalled by the variable being present at all,
        // whatever its value; the catalog sets it without a value.
        let kubernetes = map.contains_key(ENV_KUBERNETES);

        let service_discovery =
            parse_bool(map.get(ENV_SERVICE_DISCOVERY).map(String::as_str), false);
        let sd_config_backend = match map.get(ENV_SD_CONFIG_BACKEND) {
            Some(value) => SdBackend::parse(value)?,
            None => SdBackend::None,
        };
        let sd_backend_host = map
            .get(ENV_SD_BACKEND_HOST)
            .and_then(|value| sanitize_non_empty(value));
        let sd_backend_port = map
            .get(ENV_SD_BACKEND_PORT)
            .and_then(|value| match value.trim().parse::<u16>() {
                Ok(port) => Some(port),
                Err(_) => {
                    tracing::warn!(%value, "ignoring unparsable DD_SD_BACKEND_PORT");
                    None
                }
            });
        let sd_template_dir = map
            .get(ENV_SD_TEMPLATE_DIR)
            .and_then(|value| sanitize_non_empty(value));
        let consul_token = map
            .get(ENV_CONSUL_TOKEN)
            .and_then(|value| sanitize_non_empty(value));
        let consul_scheme = map
            .get(ENV_CONSUL_SCHEME)
            .and_then(|value| sanitize_non_empty(value));
        let consul_verify = map
            .get(ENV_CONSUL_VERIFY)
            .and_then(|value| sanitize_non_empty(value));

        let alpine = parse_bool(map.get(ENV_ALPINE).map(String::as_str), false);
        let (agent_config_path, docker_config_path) = if alpine {
            (
                PathBuf::from(ALPINE_AGENT_CONFIG),
                PathBuf::from(ALPINE_DOCKER_CONFIG),
            )
        } else {
            (
                PathBuf::from(STANDARD_AGENT_CONFIG),
                PathBuf::from(STANDARD_DOCKER_CONFIG),
            )
        };

        Ok(Self {
            metadata_host,
            metadata_timeout,
            host_tags,
            host_label_allowlist,
            container_labels,
            include_default_container_labels,
            kubernetes,
            service_discovery,
            sd_config_backend,
            sd_backend_host,
            sd_backend_port,
            sd_template_dir,
            consul_token,
            consul_scheme,
            consul_verify,
            agent_config_path,
            docker_config_path,
        })
    }

    /// Builds the metadata base URL from the captured host name.
    pub fn metadata_base_url(&self) -> String {
        base_url_for_host(&self.metadata_host)
    }
}

/// Helper trimming whitespace and discarding empty values.
fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        // Accept the common set of truthy strings.
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        // Accept the common set of falsy strings.
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        // Fall back to the supplied default when the input is absent or ambiguous.
        _ => default,
    }
}
