// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use rancher_metadata_client::MetadataError;

use crate::confpatch::PatchError;

/// Errors that abort the bootstrap before the agent hand-off
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Metadata lookup failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Configuration update failed: {0}")]
    Patch(#[from] PatchError),

    #[error("Service discovery backend '{backend}' requires {variable} to be set")]
    MissingSdParameter {
        backend: &'static str,
        variable: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BootstrapError::InvalidConfig("bad backend".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: bad backend");

        let error = BootstrapError::MissingSdParameter {
            backend: "consul",
            variable: "DD_SD_BACKEND_HOST",
        };
        assert_eq!(
            error.to_string(),
            "Service discovery backend 'consul' requires DD_SD_BACKEND_HOST to be set"
        );
    }

    #[test]
    fn test_patch_error_converts() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let patch = PatchError::Read {
            path: "/etc/dd-agent/datadog.conf".to_string(),
            source: io_error,
        };
        let error: BootstrapError = patch.into();
        assert!(matches!(error, BootstrapError::Patch(_)));
    }
}
