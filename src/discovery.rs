//! Find the request/assessment log tables behind a deployed model:
//! model name → deployment → serving endpoint → inference-table capture config.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("no active deployment for model {0}")]
    DeploymentNotFound(String),

    #[error("serving endpoint {0} not found")]
    EndpointNotFound(String),

    #[error("serving endpoint {0} has no inference-table capture config")]
    CaptureNotConfigured(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub model_name: String,
    pub endpoint_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadTable {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureState {
    pub payload_table: PayloadTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoCaptureConfig {
    pub catalog_name: String,
    pub schema_name: String,
    pub state: CaptureState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub auto_capture_config: Option<AutoCaptureConfig>,
}

/// Serving endpoint as the workspace describes it. A freshly created
/// endpoint may only have `pending_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub name: String,
    #[serde(default)]
    pub config: Option<EndpointConfig>,
    #[serde(default)]
    pub pending_config: Option<EndpointConfig>,
}

impl EndpointDescription {
    pub fn capture_config(&self) -> Option<&AutoCaptureConfig> {
        self.config
            .as_ref()
            .and_then(|c| c.auto_capture_config.as_ref())
            .or_else(|| {
                self.pending_config
                    .as_ref()
                    .and_then(|c| c.auto_capture_config.as_ref())
            })
    }
}

pub trait Workspace {
    fn list_deployments(&self) -> Result<Vec<Deployment>>;
    fn get_endpoint(&self, name: &str) -> Result<EndpointDescription>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTables {
    pub request_logs: String,
    pub assessment_logs: String,
}

impl LogTables {
    pub fn from_capture(capture: &AutoCaptureConfig) -> Self {
        let prefix = format!("{}.{}", capture.catalog_name, capture.schema_name);
        let payload = &capture.state.payload_table.name;
        Self {
            request_logs: format!("{prefix}.`{payload}_request_logs`"),
            assessment_logs: format!("{prefix}.`{payload}_assessment_logs`"),
        }
    }
}

pub fn resolve_log_tables<W>(workspace: &W, model_name: &str) -> Result<LogTables>
where
    W: Workspace + ?Sized,
{
    let deployment = workspace
        .list_deployments()?
        .into_iter()
        .find(|d| d.model_name == model_name)
        .ok_or_else(|| DiscoveryError::DeploymentNotFound(model_name.to_string()))?;

    let endpoint = workspace.get_endpoint(&deployment.endpoint_name)?;
    let capture = endpoint
        .capture_config()
        .ok_or_else(|| DiscoveryError::CaptureNotConfigured(endpoint.name.clone()))?;

    let tables = LogTables::from_capture(capture);
    info!("Assessment logs: {}", tables.assessment_logs);
    info!("Request logs: {}", tables.request_logs);
    Ok(tables)
}

/// Workspace snapshot read from a JSON manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestWorkspace {
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    #[serde(default)]
    pub endpoints: Vec<EndpointDescription>,
}

impl ManifestWorkspace {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing {} as workspace manifest", path.display()))
    }
}

impl Workspace for ManifestWorkspace {
    fn list_deployments(&self) -> Result<Vec<Deployment>> {
        Ok(self.deployments.clone())
    }

    fn get_endpoint(&self, name: &str) -> Result<EndpointDescription> {
        self.endpoints
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .ok_or_else(|| DiscoveryError::EndpointNotFound(name.to_string()).into())
    }
}
