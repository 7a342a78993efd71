//! GeoLite2 ASN annotator.

use crate::mmdb::{is_not_found, MmdbMode, MmdbReader};
use crate::{Annotator, AnnotatorFactory};
use async_trait::async_trait;
use ipmeta_error::AnnotateError;
use maxminddb::geoip2;
use serde::Serialize;
use serde_json::Value;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// GeoLite2 ASN adapter configuration.
#[derive(Debug, Clone)]
pub struct GeoAsnConfig {
    pub enabled: bool,
    /// Path to the ASN database.
    pub database: Option<PathBuf>,
    pub workers: usize,
}

impl Default for GeoAsnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database: None,
            workers: 5,
        }
    }
}

/// `{asn, org}`; both absent on a miss, producing the empty object.
#[derive(Debug, Default, Serialize)]
struct GeoAsnOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    org: Option<String>,
}

/// Factory holding the opened ASN database.
pub struct GeoAsnFactory {
    config: GeoAsnConfig,
    reader: Option<Arc<MmdbReader>>,
}

impl GeoAsnFactory {
    pub fn new(config: GeoAsnConfig) -> Self {
        Self {
            config,
            reader: None,
        }
    }
}

#[async_trait]
impl AnnotatorFactory for GeoAsnFactory {
    fn name(&self) -> &'static str {
        "geoasn"
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
            .ok_or_else(|| AnnotateError::Config("no GeoLite ASN database provided".to_string()))?;
        // The ASN database is small; keep it resident.
        self.reader = Some(Arc::new(MmdbReader::open(path, MmdbMode::Memory)?));
        Ok(())
    }

    fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
        Box::new(GeoAsnAnnotator {
            reader: self.reader.clone(),
        })
    }
}

struct GeoAsnAnnotator {
    reader: Option<Arc<MmdbReader>>,
}

#[async_trait]
impl Annotator for GeoAsnAnnotator {
    fn field_name(&self) -> &'static str {
        "geoasn"
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        if self.reader.is_none() {
            return Err(AnnotateError::Config(
                "geoasn factory not initialized".to_string(),
            ));
        }
        Ok(())
    }

    async fn annotate(&mut self, ip: IpAddr) -> Value {
        let Some(reader) = self.reader.as_ref() else {
            return Value::Null;
        };
        let out = match reader.lookup::<geoip2::Asn>(ip) {
            Ok(record) => GeoAsnOutput {
                asn: record.autonomous_system_number,
                org: record.autonomous_system_organization.map(str::to_string),
            },
            Err(error) => {
                if !is_not_found(&error) {
                    debug!(%ip, %error, "geoasn lookup failed");
                }
                GeoAsnOutput::default()
            }
        };
        serde_json::to_value(out).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_serializes_to_empty_object() {
        let json = serde_json::to_value(GeoAsnOutput::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn test_hit_serializes_both_fields() {
        let out = GeoAsnOutput {
            asn: Some(13335),
            org: Some("CLOUDFLARENET".to_string()),
        };
        let json = serde_json::to_value(out).unwrap();
        assert_eq!(json["asn"], 13335);
        assert_eq!(json["org"], "CLOUDFLARENET");
    }
}
