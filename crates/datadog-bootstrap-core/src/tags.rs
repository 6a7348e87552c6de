// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host tag and container label resolution.
//!
//! Host tags arrive from two sources: the `TAGS` environment variable and
//! host labels promoted from the cluster metadata. Metadata wins on key
//! collision. Container labels are a separate export with a built-in
//! Rancher pair unioned in unless disabled.

use std::collections::BTreeSet;

use rancher_metadata_client::HostMetadata;

/// Container labels every Rancher deployment carries.
pub const DEFAULT_CONTAINER_LABELS: [&str; 2] =
    ["io.rancher.stack.name", "io.rancher.stack_service.name"];

/// Ordered mapping from tag key to optional tag value.
///
/// Keys are unique. Inserting an existing key updates its value in place,
/// so the serialization order stays stable when metadata overrides an
/// environment-supplied tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, Option<String>)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Parses comma-separated `key` or `key:value` tokens.
    ///
    /// Tokens are trimmed and empty tokens skipped. Everything after the
    /// first `:` belongs to the value, so values may themselves contain
    /// colons. Duplicate keys keep their first position; the last value
    /// wins. Tokens with an empty key are dropped with a warning.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::new();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once(':') {
                Some((key, value)) => {
                    let key = key.trim();
                    if key.is_empty() {
                        tracing::warn!(token, "skipping tag token with empty key");
                        continue;
                    }
                    set.insert(key, Some(value.trim()));
                }
                None => set.insert(token, None),
            }
        }
        set
    }

    /// Inserts or updates a tag, keeping the original position on update.
    pub fn insert(&mut self, key: &str, value: Option<&str>) {
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing == key)
        {
            Some((_, existing_value)) => *existing_value = value.map(str::to_owned),
            None => self
                .entries
                .push((key.to_owned(), value.map(str::to_owned))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Renders the `key:value` / bare `key` list written to the agent config.
    pub fn to_conf_value(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{key}:{value}"),
                None => key.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Tags and host name resolved from environment and metadata.
#[derive(Debug, Clone)]
pub struct ResolvedTags {
    /// Final host tag set, environment entries first, metadata overrides applied.
    pub tags: TagSet,
    /// Host name reported by the metadata service, when present.
    pub hostname: Option<String>,
}

/// Combines environment tags with allowlisted metadata labels.
///
/// Only labels named in the allowlist are promoted, and they override
/// environment tags on key collision. The host name passes through as-is;
/// no fallback is invented when the inventory has none.
pub fn resolve(env_tags: &TagSet, allowlist: &[String], host: &HostMetadata) -> ResolvedTags {
    let mut tags = env_tags.clone();
    for (key, value) in &host.labels {
        if allowlist.iter().any(|allowed| allowed == key) {
            tags.insert(key, Some(value));
        }
    }
    ResolvedTags {
        tags,
        hostname: host.hostname().map(str::to_owned),
    }
}

/// Builds the set of container labels to export as metric tags.
///
/// The operator-supplied list is unioned with the built-in Rancher pair
/// unless `include_defaults` is off.
pub fn container_label_set(extra: &[String], include_defaults: bool) -> BTreeSet<String> {
    let mut labels: BTreeSet<String> = extra.iter().cloned().collect();
    if include_defaults {
        labels.extend(DEFAULT_CONTAINER_LABELS.iter().map(|label| label.to_string()));
    }
    labels
}

/// Renders a label set as the flow sequence written to the integration config.
pub fn format_label_list(labels: &BTreeSet<String>) -> String {
    let quoted: Vec<String> = labels.iter().map(|label| format!("\"{label}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Splits a comma-separated list into trimmed, non-empty items.
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
