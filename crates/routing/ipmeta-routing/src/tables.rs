//! ASN side tables, loaded from newline-delimited JSON.

use ipmeta_error::RoutingError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

/// ASN descriptor from the AS-name input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsName {
    pub asn: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country_code: String,
}

/// Load an ASN→name map from one JSON object per line.
pub fn load_as_names<R: Read>(reader: R) -> Result<HashMap<u32, AsName>, RoutingError> {
    let mut names = HashMap::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let name: AsName = serde_json::from_str(&line).map_err(|e| {
            RoutingError::AsTable(format!("line {}: {e}", lineno + 1))
        })?;
        names.insert(name.asn, name);
    }
    Ok(names)
}

/// Load an ASN→data map from one JSON object per line.
///
/// Each object must carry an integer `asn` field; the rest of the object is
/// kept verbatim and joined to lookup results.
pub fn load_as_data<R: Read>(reader: R) -> Result<HashMap<u32, Value>, RoutingError> {
    let mut data = HashMap::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line).map_err(|e| {
            RoutingError::AsTable(format!("line {}: {e}", lineno + 1))
        })?;
        let asn = value
            .get("asn")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                RoutingError::AsTable(format!("line {}: missing integer asn field", lineno + 1))
            })?;
        data.insert(asn as u32, value);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_as_names() {
        let input = concat!(
            r#"{"asn":13335,"description":"Cloudflare","name":"CLOUDFLARENET","organization":"Cloudflare, Inc.","country_code":"US"}"#,
            "\n",
            "\n",
            r#"{"asn":3356,"name":"LEVEL3"}"#,
            "\n",
        );

        let names = load_as_names(input.as_bytes()).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[&13335].name, "CLOUDFLARENET");
        assert_eq!(names[&13335].country_code, "US");
        assert_eq!(names[&3356].name, "LEVEL3");
        assert!(names[&3356].organization.is_empty());
    }

    #[test]
    fn test_load_as_names_rejects_garbage() {
        let err = load_as_names("not-json\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_as_data() {
        let input = r#"{"asn":38,"cone_size":12,"rank":"large"}"#;
        let data = load_as_data(input.as_bytes()).unwrap();
        assert_eq!(data[&38]["rank"], "large");
    }

    #[test]
    fn test_load_as_data_requires_asn() {
        let err = load_as_data(r#"{"rank":"large"}"#.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("asn"));
    }

    #[test]
    fn test_as_name_serialization_skips_empty() {
        let name = AsName {
            asn: 38,
            name: "UMICH-AS".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&name).unwrap();
        assert_eq!(json["asn"], 38);
        assert_eq!(json["name"], "UMICH-AS");
        assert!(json.get("organization").is_none());
    }
}
