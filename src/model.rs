//! Model-serving endpoint: prompt text in, completion text out.

use std::env;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tokio::time::Duration;

use crate::config::GenerationSettings;

#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&GenerationSettings> for GenerationParams {
    fn from(s: &GenerationSettings) -> Self {
        Self {
            temperature: s.temperature,
            max_tokens: s.max_tokens,
        }
    }
}

/// Chat-completions client for a workspace serving endpoint.
pub struct ServingEndpointClient {
    client: reqwest::Client,
    url: String,
    params: GenerationParams,
}

impl ServingEndpointClient {
    pub fn new(host: &str, token: &str, endpoint: &str, params: GenerationParams) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            url: invocations_url(host, endpoint),
            params,
        })
    }

    /// `DATABRICKS_HOST` / `DATABRICKS_TOKEN` unless overridden.
    pub fn from_env(
        host: Option<String>,
        token: Option<String>,
        endpoint: &str,
        params: GenerationParams,
    ) -> Result<Self> {
        let host = match host {
            Some(h) => h,
            None => env::var("DATABRICKS_HOST").context("DATABRICKS_HOST not set")?,
        };
        let token = match token {
            Some(t) => t,
            None => env::var("DATABRICKS_TOKEN").context("DATABRICKS_TOKEN not set")?,
        };
        Self::new(&host, &token, endpoint, params)
    }
}

fn invocations_url(host: &str, endpoint: &str) -> String {
    format!(
        "{}/serving-endpoints/{endpoint}/invocations",
        host.trim_end_matches('/')
    )
}

#[async_trait]
impl ModelEndpoint for ServingEndpointClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.params.temperature,
            "max_tokens": self.params.max_tokens,
        });

        let resp = self.client.post(&self.url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let msg = resp.text().await?;
            return Err(anyhow!("{} — {}", status, msg));
        }

        let resp_json: Value = resp.json().await?;
        completion_text(&resp_json)
    }
}

fn completion_text(resp_json: &Value) -> Result<String> {
    resp_json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow!(
                "unexpected response structure; full JSON from endpoint:\n{}",
                serde_json::to_string_pretty(resp_json)
                    .unwrap_or_else(|_| "<unable to serialise>".to_string())
            )
        })
}
