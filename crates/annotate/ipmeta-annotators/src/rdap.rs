//! RDAP (WHOIS successor) annotator.
//!
//! Queries the rdap.org bootstrap redirector, which 30x-forwards to the
//! registry authoritative for the address block.

use crate::{Annotator, AnnotatorFactory};
use async_trait::async_trait;
use ipmeta_error::AnnotateError;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

const RDAP_BOOTSTRAP_URL: &str = "https://rdap.org/ip/";

/// RDAP adapter configuration.
#[derive(Debug, Clone)]
pub struct RdapConfig {
    pub enabled: bool,
    /// Per-query deadline in seconds.
    pub timeout_secs: u64,
    pub workers: usize,
}

impl Default for RdapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 2,
            workers: 5,
        }
    }
}

/// Stateless factory; each worker owns its HTTP client.
pub struct RdapFactory {
    config: RdapConfig,
}

impl RdapFactory {
    pub fn new(config: RdapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AnnotatorFactory for RdapFactory {
    fn name(&self) -> &'static str {
        "rdap"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        Ok(())
    }

    fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
        Box::new(RdapAnnotator {
            timeout: Duration::from_secs(self.config.timeout_secs),
            client: None,
        })
    }
}

struct RdapAnnotator {
    timeout: Duration,
    client: Option<reqwest::Client>,
}

#[async_trait]
impl Annotator for RdapAnnotator {
    fn field_name(&self) -> &'static str {
        "rdap/whois"
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
            .get(format!("{RDAP_BOOTSTRAP_URL}{ip}"))
            .header(reqwest::header::ACCEPT, "application/rdap+json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                debug!(%ip, %error, "rdap request failed");
                return Value::Null;
            }
        };

        if !response.status().is_success() {
            debug!(%ip, status = %response.status(), "rdap returned non-success");
            return Value::Null;
        }

        response.json::<Value>().await.unwrap_or(Value::Null)
    }
}
