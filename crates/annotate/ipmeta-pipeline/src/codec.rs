//! Record decoding and encoding.

use ipmeta_error::CodecError;
use ipmeta_types::{CodecConfig, InputFormat, IpRecord, IP_OUTPUT_FIELD};
use serde_json::Value;

/// Decode one input line into an in-flight record.
///
/// Bare mode parses the trimmed line as an IP literal. Structured mode
/// parses a JSON object, requires the configured IP field to exist and be
/// a string, and rejects records that already carry the annotation field.
/// Every failure is input malformation and carries the offending line.
pub fn decode_line(config: &CodecConfig, line: &str) -> Result<IpRecord, CodecError> {
    match config.format {
        InputFormat::Ips => {
            let ip = line.trim().parse().map_err(|_| CodecError::InvalidIp {
                line: line.to_string(),
            })?;
            Ok(IpRecord::bare(ip))
        }
        InputFormat::Json => {
            let value: Value =
                serde_json::from_str(line).map_err(|_| CodecError::InvalidJson {
                    line: line.to_string(),
                })?;
            let Value::Object(fields) = value else {
                return Err(CodecError::NotAnObject {
                    line: line.to_string(),
                });
            };

            let ip_value = fields.get(&config.ip_field).ok_or_else(|| {
                CodecError::MissingIpField {
                    field: config.ip_field.clone(),
                    line: line.to_string(),
                }
            })?;
            let ip_str = ip_value.as_str().ok_or_else(|| CodecError::IpFieldNotString {
                field: config.ip_field.clone(),
                line: line.to_string(),
            })?;
            let ip = ip_str.parse().map_err(|_| CodecError::InvalidIp {
                line: line.to_string(),
            })?;

            if fields.contains_key(&config.annotation_field) {
                return Err(CodecError::AnnotationFieldPresent {
                    field: config.annotation_field.clone(),
                    line: line.to_string(),
                });
            }

            Ok(IpRecord::structured(ip, fields))
        }
    }
}

/// Serialize a record to one output line.
///
/// In bare mode the IP string is injected under the fixed `ip` field; in
/// structured mode the input's own IP field is still in the map.
pub fn encode_record(config: &CodecConfig, mut record: IpRecord) -> Result<String, CodecError> {
    if config.format == InputFormat::Ips {
        record.fields.insert(
            IP_OUTPUT_FIELD.to_string(),
            Value::String(record.ip.to_string()),
        );
    }
    serde_json::to_string(&record.fields).map_err(|e| CodecError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bare_config() -> CodecConfig {
        CodecConfig::new(InputFormat::Ips)
    }

    fn json_config() -> CodecConfig {
        CodecConfig::new(InputFormat::Json)
    }

    #[test]
    fn test_decode_bare_ip() {
        let record = decode_line(&bare_config(), " 1.1.1.1 ").unwrap();
        assert_eq!(record.ip.to_string(), "1.1.1.1");
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_decode_bare_ipv6() {
        let record = decode_line(&bare_config(), "2606:4700:4700::1111").unwrap();
        assert!(record.ip.is_ipv6());
    }

    #[test]
    fn test_decode_bare_invalid() {
        let err = decode_line(&bare_config(), "999.999.999.999").unwrap_err();
        assert!(matches!(err, CodecError::InvalidIp { .. }));
        assert!(err.to_string().contains("999.999.999.999"));
    }

    #[test]
    fn test_decode_structured() {
        let record =
            decode_line(&json_config(), r#"{"ip":"192.0.2.7","tag":"x"}"#).unwrap();
        assert_eq!(record.ip.to_string(), "192.0.2.7");
        assert_eq!(record.fields["tag"], json!("x"));
        assert_eq!(record.fields["ip"], json!("192.0.2.7"));
    }

    #[test]
    fn test_decode_structured_custom_ip_field() {
        let config = json_config().with_ip_field("saddr");
        let record = decode_line(&config, r#"{"saddr":"192.0.2.7"}"#).unwrap();
        assert_eq!(record.ip.to_string(), "192.0.2.7");
    }

    #[test]
    fn test_decode_structured_missing_ip_field() {
        let err = decode_line(&json_config(), r#"{"tag":"x"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MissingIpField { .. }));
    }

    #[test]
    fn test_decode_structured_non_string_ip() {
        let err = decode_line(&json_config(), r#"{"ip":42}"#).unwrap_err();
        assert!(matches!(err, CodecError::IpFieldNotString { .. }));
    }

    #[test]
    fn test_decode_structured_annotation_field_reserved() {
        let err = decode_line(
            &json_config(),
            r#"{"ip":"1.2.3.4","zannotate":{}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::AnnotationFieldPresent { .. }));
    }

    #[test]
    fn test_decode_structured_not_json() {
        let err = decode_line(&json_config(), "{broken").unwrap_err();
        assert!(matches!(err, CodecError::InvalidJson { .. }));
    }

    #[test]
    fn test_decode_structured_not_an_object() {
        let err = decode_line(&json_config(), r#"["1.2.3.4"]"#).unwrap_err();
        assert!(matches!(err, CodecError::NotAnObject { .. }));
    }

    #[test]
    fn test_encode_bare_injects_ip() {
        let record = decode_line(&bare_config(), "1.1.1.1").unwrap();
        let line = encode_record(&bare_config(), record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"ip": "1.1.1.1"}));
    }

    #[test]
    fn test_structured_round_trip() {
        let config = json_config();
        let input = r#"{"ip":"192.0.2.7","tag":"x","n":3}"#;
        let record = decode_line(&config, input).unwrap();
        let line = encode_record(&config, record).unwrap();

        let reparsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        let original: serde_json::Value = serde_json::from_str(input).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_encode_with_annotations() {
        let mut record = decode_line(&bare_config(), "1.1.1.1").unwrap();
        record.annotate("geoasn", json!({"asn": 13335, "org": "CLOUDFLARENET"}));

        let line = encode_record(&bare_config(), record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["ip"], "1.1.1.1");
        assert_eq!(value["geoasn"]["asn"], 13335);
    }
}
