//! Application naming: a handful of seed parameters fan out into every
//! catalog/table/endpoint identifier the other stages use.

use std::{fmt, fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// Longest user-name prefix kept for endpoint naming
const USER_NAME_MAX: usize = 35;

pub const POC_DATA_PIPELINE_RUN_NAME: &str = "data_pipeline_poc";
pub const POC_CHAIN_RUN_NAME: &str = "reduced-chunk-size";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed user email {0:?}: expected <name>@<domain>")]
    MalformedEmail(String),

    #[error("{field} must not be empty")]
    EmptyIdentifier { field: &'static str },
}

/// The only values an operator has to choose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedParams {
    pub user_email: String,
    pub app_name: String,
    pub catalog: String,
    pub schema: String,
}

/// Every identifier derived from [`SeedParams`]. Persisted as a flat YAML
/// document so later stages can pick it up without re-deriving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub user_email: String,
    pub user_name: String,
    pub rag_app_name: String,
    pub uc_catalog: String,
    pub uc_schema: String,
    pub uc_model_name: String,
    pub vector_search_endpoint: String,
    pub source_path: String,
    pub evaluation_set_fqn: String,
    pub chunked_docs_table: String,
    pub mlflow_experiment_name: String,
    pub poc_data_pipeline_run_name: String,
    pub poc_chain_run_name: String,
}

impl AppConfig {
    pub fn resolve(seed: &SeedParams) -> Result<Self, ConfigError> {
        let user_name = user_name_from_email(&seed.user_email)?;
        for (field, value) in [
            ("app_name", &seed.app_name),
            ("catalog", &seed.catalog),
            ("schema", &seed.schema),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyIdentifier { field });
            }
        }

        let (app, catalog, schema) = (&seed.app_name, &seed.catalog, &seed.schema);

        Ok(Self {
            user_email: seed.user_email.clone(),
            vector_search_endpoint: format!("{user_name}_vector_search"),
            user_name,
            rag_app_name: app.clone(),
            uc_catalog: catalog.clone(),
            uc_schema: schema.clone(),
            uc_model_name: format!("{catalog}.{schema}.{app}"),
            source_path: format!("/Volumes/{catalog}/{schema}/docs"),
            evaluation_set_fqn: format!("`{catalog}`.`{schema}`.{app}_evaluation_set"),
            chunked_docs_table: format!("`{catalog}`.`{schema}`.`{app}_poc_chunked_docs_gold`"),
            mlflow_experiment_name: format!("/Users/{}/{app}", seed.user_email),
            poc_data_pipeline_run_name: POC_DATA_PIPELINE_RUN_NAME.to_string(),
            poc_chain_run_name: POC_CHAIN_RUN_NAME.to_string(),
        })
    }

    pub fn save_yaml(&self, path: &Path) -> Result<()> {
        let doc = serde_yaml::to_string(self).context("serialising config")?;
        fs::write(path, doc).with_context(|| format!("writing {}", path.display()))
    }

    pub fn load_yaml(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {} as config", path.display()))
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RAG_APP_NAME {}", self.rag_app_name)?;
        writeln!(f, "UC_CATALOG {}", self.uc_catalog)?;
        writeln!(f, "UC_SCHEMA {}", self.uc_schema)?;
        writeln!(f, "UC_MODEL_NAME {}", self.uc_model_name)?;
        writeln!(f, "VECTOR_SEARCH_ENDPOINT {}", self.vector_search_endpoint)?;
        writeln!(f, "SOURCE_PATH {}", self.source_path)?;
        writeln!(f, "EVALUATION_SET_FQN {}", self.evaluation_set_fqn)?;
        writeln!(f, "CHUNKED_DOCS_TABLE {}", self.chunked_docs_table)?;
        writeln!(f, "MLFLOW_EXPERIMENT_NAME {}", self.mlflow_experiment_name)?;
        writeln!(f, "POC_DATA_PIPELINE_RUN_NAME {}", self.poc_data_pipeline_run_name)?;
        write!(f, "POC_CHAIN_RUN_NAME {}", self.poc_chain_run_name)
    }
}

// local part, dots stripped, lower-cased, capped
fn user_name_from_email(email: &str) -> Result<String, ConfigError> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::MalformedEmail(email.to_string()))?;
    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::MalformedEmail(email.to_string()));
    }
    Ok(local
        .replace('.', "")
        .to_lowercase()
        .chars()
        .take(USER_NAME_MAX)
        .collect())
}

/// Knobs for the golden-question generator and the serving endpoint call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub questions_per_chunk: usize,
    pub sample_size: usize,
    pub sample_seed: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "databricks-meta-llama-3-3-70b-instruct".to_string(),
            temperature: 0.0,
            max_tokens: 1000,
            questions_per_chunk: 2,
            sample_size: 50,
            sample_seed: 42,
        }
    }
}
