//! Typed view of the `/self/host` metadata document.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Host inventory document served under `/latest/self/host`.
///
/// Only the fields the bootstrap consumes are modeled; the service returns
/// many more, all ignored during decoding. Labels are kept ordered so
/// downstream iteration is deterministic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostMetadata {
    /// Host name as registered in the cluster inventory.
    #[serde(default)]
    pub name: Option<String>,
    /// Host labels keyed by label name.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl HostMetadata {
    /// Returns the host name when present and non-empty.
    pub fn hostname(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}
