//! IPInfo MMDB annotator.
//!
//! IPInfo ships several database tiers. The adapter first decodes into the
//! lite-tier shape it knows, and falls back to the raw record for other
//! tiers so schema drift degrades gracefully instead of dropping data.

use crate::mmdb::{is_not_found, MmdbMode, MmdbReader};
use crate::{Annotator, AnnotatorFactory};
use async_trait::async_trait;
use ipmeta_error::AnnotateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// IPInfo adapter configuration.
#[derive(Debug, Clone)]
pub struct IpinfoConfig {
    pub enabled: bool,
    /// Path to the IPInfo MMDB file.
    pub database: Option<PathBuf>,
    pub workers: usize,
}

impl Default for IpinfoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database: None,
            workers: 1,
        }
    }
}

/// Lite-tier record shape, e.g. `{"asn":"AS13335","as_name":...}`.
#[derive(Debug, Default, Deserialize)]
struct LiteRecord {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    continent: Option<String>,
    #[serde(default)]
    continent_code: Option<String>,
    #[serde(default)]
    asn: Option<String>,
    #[serde(default)]
    as_name: Option<String>,
    #[serde(default)]
    as_domain: Option<String>,
}

impl LiteRecord {
    fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.country_code.is_none()
            && self.continent.is_none()
            && self.continent_code.is_none()
            && self.asn.is_none()
            && self.as_name.is_none()
            && self.as_domain.is_none()
    }
}

/// Stable output schema for the lite tier.
#[derive(Debug, Default, Serialize)]
struct IpinfoOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continent_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    as_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    as_domain: Option<String>,
}

/// Parse IPInfo's `AS`-prefixed ASN strings; plain digits also accepted.
fn parse_asn(raw: &str) -> Option<u32> {
    raw.strip_prefix("AS").unwrap_or(raw).parse().ok()
}

impl From<LiteRecord> for IpinfoOutput {
    fn from(lite: LiteRecord) -> Self {
        Self {
            country: lite.country,
            country_code: lite.country_code,
            continent: lite.continent,
            continent_code: lite.continent_code,
            asn: lite.asn.as_deref().and_then(parse_asn),
            as_name: lite.as_name,
            as_domain: lite.as_domain,
        }
    }
}

/// Factory holding the opened IPInfo database.
pub struct IpinfoFactory {
    config: IpinfoConfig,
    reader: Option<Arc<MmdbReader>>,
}

impl IpinfoFactory {
    pub fn new(config: IpinfoConfig) -> Self {
        Self {
            config,
            reader: None,
        }
    }
}

#[async_trait]
impl AnnotatorFactory for IpinfoFactory {
    fn name(&self) -> &'static str {
        "ipinfo"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        let path = self
            .config
            .database
            .as_ref()
            .ok_or_else(|| AnnotateError::Config("ipinfo database file path is required".to_string()))?;
        self.reader = Some(Arc::new(MmdbReader::open(path, MmdbMode::Mmap)?));
        Ok(())
    }

    fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
        Box::new(IpinfoAnnotator {
            reader: self.reader.clone(),
        })
    }
}

struct IpinfoAnnotator {
    reader: Option<Arc<MmdbReader>>,
}

#[async_trait]
impl Annotator for IpinfoAnnotator {
    fn field_name(&self) -> &'static str {
        "ipinfo"
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        if self.reader.is_none() {
            return Err(AnnotateError::Config(
                "ipinfo factory not initialized".to_string(),
            ));
        }
        Ok(())
    }

    async fn annotate(&mut self, ip: IpAddr) -> Value {
        let Some(reader) = self.reader.as_ref() else {
            return Value::Null;
        };

        match reader.lookup::<LiteRecord>(ip) {
            Ok(record) if !record.is_empty() => {
                serde_json::to_value(IpinfoOutput::from(record)).unwrap_or(Value::Null)
            }
            Ok(_) | Err(_) => {
                // Unknown tier or typed decode failure: fall back to the
                // raw record so the data still reaches the output.
                match reader.lookup::<Value>(ip) {
                    Ok(value) => value,
                    Err(error) => {
                        if !is_not_found(&error) {
                            debug!(%ip, %error, "ipinfo lookup failed");
                        }
                        Value::Null
                    }
                }
            }
        }
    }
}
