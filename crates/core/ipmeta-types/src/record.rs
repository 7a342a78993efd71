//! In-flight record model.

use serde_json::{Map, Value};
use std::net::IpAddr;

/// Input framing for the record decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One bare IP literal per line.
    Ips,
    /// One JSON object per line, carrying the IP in a configured field.
    Json,
}

/// Decoder/encoder configuration.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Input framing.
    pub format: InputFormat,

    /// Name of the JSON field holding the IP address (structured mode).
    pub ip_field: String,

    /// Reserved annotation field name; input records carrying it are rejected.
    pub annotation_field: String,
}

impl CodecConfig {
    /// Create a configuration with the default field names.
    pub fn new(format: InputFormat) -> Self {
        Self {
            format,
            ip_field: crate::DEFAULT_IP_FIELD.to_string(),
            annotation_field: crate::DEFAULT_ANNOTATION_FIELD.to_string(),
        }
    }

    /// Set the IP field name.
    pub fn with_ip_field(mut self, field: impl Into<String>) -> Self {
        self.ip_field = field.into();
        self
    }

    /// Set the reserved annotation field name.
    pub fn with_annotation_field(mut self, field: impl Into<String>) -> Self {
        self.annotation_field = field.into();
        self
    }
}

/// A record in flight through the pipeline.
///
/// Produced by the decoder, mutated by each annotator stage (one new field
/// per annotator), consumed by the encoder. In structured mode `fields`
/// holds the entire decoded input object so that existing fields survive to
/// the output unchanged; in bare mode it starts empty and the encoder adds
/// the IP string under [`crate::IP_OUTPUT_FIELD`].
#[derive(Debug, Clone)]
pub struct IpRecord {
    /// The parsed IP address all lookups key on.
    pub ip: IpAddr,

    /// Field map serialized as the output object.
    pub fields: Map<String, Value>,
}

impl IpRecord {
    /// Create a record with an empty field map (bare-IP mode).
    pub fn bare(ip: IpAddr) -> Self {
        Self {
            ip,
            fields: Map::new(),
        }
    }

    /// Create a record wrapping a decoded input object (structured mode).
    pub fn structured(ip: IpAddr, fields: Map<String, Value>) -> Self {
        Self { ip, fields }
    }

    /// Store an annotator's output under its field name.
    pub fn annotate(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_record_starts_empty() {
        let record = IpRecord::bare("1.1.1.1".parse().unwrap());
        assert!(record.fields.is_empty());
        assert!(record.ip.is_ipv4());
    }

    #[test]
    fn test_annotate_adds_field() {
        let mut record = IpRecord::bare("2606:4700:4700::1111".parse().unwrap());
        record.annotate("geoasn", json!({"asn": 13335}));

        assert_eq!(record.fields["geoasn"]["asn"], json!(13335));
    }

    #[test]
    fn test_codec_config_defaults() {
        let config = CodecConfig::new(InputFormat::Json);
        assert_eq!(config.ip_field, "ip");
        assert_eq!(config.annotation_field, "zannotate");

        let config = config.with_ip_field("saddr").with_annotation_field("meta");
        assert_eq!(config.ip_field, "saddr");
        assert_eq!(config.annotation_field, "meta");
    }
}
