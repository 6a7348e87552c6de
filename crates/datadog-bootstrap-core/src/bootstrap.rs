//! Startup orchestration: metadata fetch, config rewrites, service discovery.

use rancher_metadata_client::{MetadataClient, MetadataClientConfig};
use tracing::info;

use crate::config::{BootstrapEnv, SdBackend};
use crate::confpatch::{append_config, rewrite_config, ReplacementRule};
use crate::error::BootstrapError;
use crate::tags::{container_label_set, format_label_list, resolve, ResolvedTags};

/// Runs the bootstrap against the captured environment.
///
/// Queries the metadata service for the host document, resolves the final
/// tag set, rewrites the agent and docker integration configs, and appends
/// the service discovery block when requested. Every error is terminal:
/// the caller must exit without starting the agent. Service discovery
/// validation runs after the rewrites, so a missing backend parameter
/// leaves the tag and hostname edits in place and appends nothing.
pub async fn run(env: &BootstrapEnv) -> Result<(), BootstrapError> {
    let client = MetadataClient::new(MetadataClientConfig {
        base_url: env.metadata_base_url(),
        ..Default::default()
    })?;

    info!("querying Rancher Metadata API");
    let host = client.self_host(env.metadata_timeout).await?;

    let ResolvedTags { tags, hostname } =
        resolve(&env.host_tags, &env.host_label_allowlist, &host);

    info!("hostname: {}", hostname.as_deref().unwrap_or(""));
    if !tags.is_empty() {
        info!("exporting host labels as host tags:");
        for (key, value) in tags.iter() {
            match value {
                Some(value) => info!("- {key}={value}"),
                None => info!("- {key}"),
            }
        }
    }

    let mut agent_rules = Vec::new();
    // An empty value never overwrites a placeholder.
    if !tags.is_empty() {
        agent_rules.push(ReplacementRule::setting("tags", &tags.to_conf_value())?);
    }
    if let Some(hostname) = &hostname {
        agent_rules.push(ReplacementRule::setting("hostname", hostname)?);
    }

    let mut docker_rules = Vec::new();
    // Kubernetes ships its own label mapping; skip the docker export there.
    if !env.kubernetes {
        let labels =
            container_label_set(&env.container_labels, env.include_default_container_labels);
        if !labels.is_empty() {
            info!("exporting container labels as metric tags:");
            for label in &labels {
                info!("- {label}");
            }
            docker_rules.push(ReplacementRule::setting(
                "collect_labels_as_tags",
                &format_label_list(&labels),
            )?);
        }
    }

    rewrite_config(&env.agent_config_path, &agent_rules)?;
    rewrite_config(&env.docker_config_path, &docker_rules)?;

    if let Some(directives) = sd_directives(env)? {
        append_config(&env.agent_config_path, &directives)?;
        info!(
            backend = env.sd_config_backend.as_str(),
            "service discovery enabled"
        );
    }

    Ok(())
}

/// Renders the service discovery block appended to the agent config.
///
/// Returns `None` when service discovery is disabled. A non-default
/// backend without a store host and port is a terminal configuration
/// error; the agent must not start half-configured.
fn sd_directives(env: &BootstrapEnv) -> Result<Option<String>, BootstrapError> {
    if !env.service_discovery {
        return Ok(None);
    }

    let mut directives = String::from("service_discovery_backend: docker\n");
    if env.sd_config_backend != SdBackend::None {
        let host = env
            .sd_backend_host
            .as_deref()
            .ok_or(BootstrapError::MissingSdParameter {
                backend: env.sd_config_backend.as_str(),
                variable: "DD_SD_BACKEND_HOST",
            })?;
        let port = env
            .sd_backend_port
            .ok_or(BootstrapError::MissingSdParameter {
                backend: env.sd_config_backend.as_str(),
                variable: "DD_SD_BACKEND_PORT",
            })?;
        directives.push_str(&format!(
            "sd_config_backend: {}\n",
            env.sd_config_backend.as_str()
        ));
        directives.push_str(&format!("sd_backend_host: {host}\n"));
        directives.push_str(&format!("sd_backend_port: {port}\n"));
    }
    if let Some(template_dir) = &env.sd_template_dir {
        directives.push_str(&format!("sd_template_dir: {template_dir}\n"));
    }
    if env.sd_config_backend == SdBackend::Consul {
        if let Some(token) = &env.consul_token {
            directives.push_str(&format!("consul_token: {token}\n"));
        }
        if let Some(scheme) = &env.consul_scheme {
            directives.push_str(&format!("consul_scheme: {scheme}\n"));
        }
        if let Some(verify) = &env.consul_verify {
            directives.push_str(&format!("consul_verify: {verify}\n"));
        }
    }
    Ok(Some(directives))
}
