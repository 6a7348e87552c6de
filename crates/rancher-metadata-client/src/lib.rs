//! Client for the Rancher Metadata HTTP API.
//!
//! Rancher exposes cluster inventory to containers through a node-local
//! HTTP service. This crate wraps the lookups the Datadog bootstrap needs:
//! a typed `/self/host` document plus a generic JSON fetch, both retried
//! under a wall-clock deadline so a slow metadata answer delays agent
//! startup instead of failing it outright.

pub mod client;
pub mod host;

pub use client::{
    base_url_for_host, MetadataClient, MetadataClientConfig, MetadataError, DEFAULT_METADATA_HOST,
};
pub use host::HostMetadata;
