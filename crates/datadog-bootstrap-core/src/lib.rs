//! Core library for bootstrapping the Datadog agent inside a Rancher stack.
//!
//! The entrypoint binary stays a thin shell over this crate: it captures
//! the environment and calls [`run`] before handing the process to the
//! agent entrypoint. Everything observable lives here so it can be tested
//! against temporary config files and a mock metadata server.

pub mod bootstrap;
pub mod config;
pub mod confpatch;
pub mod error;
pub mod tags;

pub use bootstrap::run;
pub use config::{BootstrapEnv, SdBackend};
pub use confpatch::{append_config, rewrite_config, PatchError, ReplacementRule};
pub use error::BootstrapError;
pub use tags::{
    container_label_set, format_label_list, resolve, ResolvedTags, TagSet,
    DEFAULT_CONTAINER_LABELS,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Re-exports stay wired to the module definitions.
    #[test]
    fn re_exports_are_usable() {
        let env = BootstrapEnv::default();
        assert_eq!(env.sd_config_backend, SdBackend::None);
        assert!(TagSet::new().is_empty());
        assert_eq!(DEFAULT_CONTAINER_LABELS.len(), 2);
    }
}
