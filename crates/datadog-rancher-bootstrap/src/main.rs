// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use datadog_bootstrap_core::{run, BootstrapEnv};

/// Agent entrypoint this process execs into once configuration is ready.
const AGENT_ENTRYPOINT: &str = "/entrypoint.sh";

#[tokio::main(flavor = "current_thread")]
pub async fn main() {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Starting Datadog agent bootstrap");

    let bootstrap_env = match BootstrapEnv::from_os_env() {
        Ok(bootstrap_env) => bootstrap_env,
        Err(e) => {
            error!("Invalid bootstrap environment: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&bootstrap_env).await {
        error!("Bootstrap failed, not starting the agent: {e}");
        process::exit(1);
    }

    info!("configuration ready, starting the agent entrypoint");

    // argv[0] names the entrypoint; our own arguments ride along unchanged.
    let argv: Vec<String> = std::iter::once(AGENT_ENTRYPOINT.to_string())
        .chain(env::args().skip(1))
        .collect();
    let error = exec::execvp(AGENT_ENTRYPOINT, &argv);

    // execvp only returns when the hand-off itself failed.
    error!("Failed to exec {AGENT_ENTRYPOINT}: {error}");
    process::exit(1);
}
