//! Wire types for the Cloud Controller v2 API.
//!
//! Only the fields this tool reads are modelled; everything else in the
//! responses is ignored by serde.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Paginated list envelope.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default = "Vec::new")]
    pub resources: Vec<Resource<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Resource<T> {
    pub metadata: Metadata,
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct Metadata {
    pub guid: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceInstanceEntity {
    pub name: String,
    /// Absent for user-provided service instances.
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub service_plan_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceEntity {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct ServicePlanEntity {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceKeyEntity {
    pub name: String,
    #[serde(default)]
    pub credentials: Value,
}

#[derive(Debug, Serialize)]
pub struct CreateServiceKeyRequest<'a> {
    pub service_instance_guid: &'a str,
    pub name: &'a str,
}
