//! Spur context annotator.
//!
//! Calls the Spur v2 context endpoint and passes the response body through
//! opaquely; the schema is Spur's, not ours.

use crate::{Annotator, AnnotatorFactory};
use async_trait::async_trait;
use ipmeta_error::AnnotateError;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, error};

const SPUR_API_URL: &str = "https://api.spur.us/v2/context/";
const SPUR_API_KEY_ENV: &str = "SPUR_API_KEY";

/// Spur adapter configuration.
#[derive(Debug, Clone)]
pub struct SpurConfig {
    pub enabled: bool,
    /// Per-query deadline in seconds.
    pub timeout_secs: u64,
    pub workers: usize,
}

impl Default for SpurConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 2,
            workers: 100,
        }
    }
}

/// Reject empty or unset API tokens before any record is processed.
fn validate_token(token: Option<String>) -> Result<String, AnnotateError> {
    match token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AnnotateError::Config(format!(
            "{SPUR_API_KEY_ENV} environment variable not set; \
             use 'export {SPUR_API_KEY_ENV}=your_api_key' to set it"
        ))),
    }
}

/// Factory holding the API token read from the environment.
pub struct SpurFactory {
    config: SpurConfig,
    api_key: String,
}

impl SpurFactory {
    pub fn new(config: SpurConfig) -> Self {
        Self {
            config,
            api_key: String::new(),
        }
    }
}

#[async_trait]
impl AnnotatorFactory for SpurFactory {
    fn name(&self) -> &'static str {
        "spur"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        self.api_key = validate_token(std::env::var(SPUR_API_KEY_ENV).ok())?;
        Ok(())
    }

    fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
        Box::new(SpurAnnotator {
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.config.timeout_secs),
            client: None,
        })
    }
}

struct SpurAnnotator {
    api_key: String,
    timeout: Duration,
    client: Option<reqwest::Client>,
}

#[async_trait]
impl Annotator for SpurAnnotator {
    fn field_name(&self) -> &'static str {
        "spur"
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AnnotateError::Config(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn annotate(&mut self, ip: IpAddr) -> Value {
        let Some(client) = self.client.as_ref() else {
            return Value::Null;
        };

        let response = match client
            .get(format!("{SPUR_API_URL}{ip}"))
            .header("Token", &self.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(%ip, error = %err, "spur request failed");
                return Value::Null;
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::OK {
            let trimmed = body.trim_end_matches('\n');
            return serde_json::from_str(trimmed)
                .unwrap_or_else(|_| Value::String(trimmed.to_string()));
        }

        error!(%ip, %status, "spur returned non-200");
        Value::Null
    }
}
