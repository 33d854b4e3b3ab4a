//! PebbleStore library — S3-compatible object storage engine.
//!
//! This crate provides the core components for running an S3-compatible
//! storage server: SigV4 authentication and presigned URLs, the
//! multipart-upload session state machine, bucket-listing pagination,
//! and pluggable blob storage backends.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod errors;
pub mod etag;
pub mod handlers;
pub mod listing;
pub mod metrics;
pub mod server;
pub mod sigv4;
pub mod store;
pub mod uploads;
pub mod xml;

use crate::auth::{Authenticator, CredentialStore};
use crate::config::Config;
use crate::store::blob::BlobStore;
use crate::uploads::UploadCoordinator;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Blob storage backend (local filesystem or in-memory).
    pub store: Arc<dyn BlobStore>,
    /// Read-only credential mapping loaded at startup.
    pub credentials: Arc<CredentialStore>,
    /// SigV4 verifier / presigned-URL generator.
    pub authenticator: Authenticator,
    /// Multipart upload session coordinator.
    pub uploads: UploadCoordinator,
}

impl AppState {
    /// Assemble application state from its parts.
    pub fn new(config: Config, store: Arc<dyn BlobStore>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            authenticator: Authenticator::new(credentials.clone()),
            uploads: UploadCoordinator::new(store.clone()),
            config,
            store,
            credentials,
        }
    }
}
