//! Function deployment and status records exchanged with the provider.

use crate::serde_util::null_as_default;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request to create or update a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeployment {
    pub service: String,
    pub image: String,
    /// Orchestrator network; only meaningful on Swarm-style backends.
    #[serde(default)]
    pub network: String,
    /// Process the watchdog forks for each request.
    #[serde(default)]
    pub env_process: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub env_vars: BTreeMap<String, String>,
    /// Registry credentials, docker config encoding.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registry_auth: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub constraints: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub limits: Option<FunctionResources>,
    #[serde(default)]
    pub requests: Option<FunctionResources>,
    #[serde(default)]
    pub read_only_root_filesystem: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_pull_secret: String,
}

impl FunctionDeployment {
    pub fn new(service: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// `service.namespace`, or just `service` outside any namespace.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.service.clone()
        } else {
            format!("{}.{}", self.service, self.namespace)
        }
    }
}

/// Memory and CPU quantities in orchestrator notation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResources {
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub cpu: String,
}

/// A deployed function as listed by the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub invocation_count: f64,
    /// Desired replicas.
    #[serde(default)]
    pub replicas: u64,
    #[serde(default)]
    pub env_process: String,
    /// Replicas ready to serve.
    #[serde(default)]
    pub available_replicas: u64,
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_pull_secret: String,
}

impl FunctionStatus {
    pub fn is_ready(&self) -> bool {
        self.available_replicas > 0
    }
}

/// A secret in the underlying orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleServiceRequest {
    pub service_name: String,
    pub replicas: u64,
}

/// What the provider reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub provider: String,
    pub version: ProviderVersion,
    pub orchestration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderVersion {
    pub sha: String,
    pub release: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFunctionRequest {
    pub function_name: String,
}

/// Gateway-side view of a function, including its invoke URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionDescription {
    pub name: String,
    pub status: String,
    pub replicas: i64,
    pub available_replicas: i64,
    pub invocation_count: i64,
    pub image: String,
    pub env_process: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "AsyncURL")]
    pub async_url: String,
    pub labels: Option<BTreeMap<String, String>>,
    pub annotations: Option<BTreeMap<String, String>>,
    pub image_pull_secret: String,
}
