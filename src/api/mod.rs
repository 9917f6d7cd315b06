//! Orchestration-platform collaborator.
//!
//! Layout:
//! - `mod.rs`: the `Platform` seam used by the session orchestrator
//! - `cloud_controller.rs`: reqwest client for the Cloud Controller v2 API

pub mod cloud_controller;

use crate::error::ConnectError;
use crate::types::{CredentialGrant, ServiceInstance};
use async_trait::async_trait;
use serde_json::Value;

pub use cloud_controller::CloudController;

/// A service key as listed by the platform.
#[derive(Debug, Clone)]
pub struct ServiceKey {
    pub guid: String,
    pub name: String,
    pub credentials: Value,
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Look up a service instance by name in the targeted space.
    async fn fetch_service_instance(&self, name: &str) -> Result<ServiceInstance, ConnectError>;

    /// Service keys of an instance filtered by name. The platform filter is not
    /// guaranteed to be exact; callers compare names themselves.
    async fn service_keys(
        &self,
        instance_guid: &str,
        name: &str,
    ) -> Result<Vec<ServiceKey>, ConnectError>;

    async fn create_service_key(&self, grant: &CredentialGrant) -> Result<(), ConnectError>;

    /// Delete the named key. A key that does not exist is not an error.
    async fn delete_service_key(&self, grant: &CredentialGrant) -> Result<(), ConnectError>;
}
