//! GeoIP2/GeoLite2 City annotator.

use crate::mmdb::{is_not_found, MmdbMode, MmdbReader};
use crate::{Annotator, AnnotatorFactory};
use async_trait::async_trait;
use ipmeta_error::AnnotateError;
use maxminddb::geoip2;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// GeoIP2 adapter configuration.
#[derive(Debug, Clone)]
pub struct GeoIp2Config {
    pub enabled: bool,
    /// Path to the City database.
    pub database: Option<PathBuf>,
    pub mode: MmdbMode,
    /// Language key for localized names.
    pub language: String,
    /// Raw include list: `*` or a comma-separated subset.
    pub fields: String,
    pub workers: usize,
}

impl Default for GeoIp2Config {
    fn default() -> Self {
        Self {
            enabled: false,
            database: None,
            mode: MmdbMode::Mmap,
            language: "en".to_string(),
            fields: "*".to_string(),
            workers: 5,
        }
    }
}

/// Which record sections the output includes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoFields {
    pub city: bool,
    pub country: bool,
    pub continent: bool,
    pub postal: bool,
    pub latlong: bool,
    pub traits: bool,
    pub subdivisions: bool,
    pub registered_country: bool,
    pub represented_country: bool,
}

impl GeoFields {
    /// Include every section.
    pub fn all() -> Self {
        Self {
            city: true,
            country: true,
            continent: true,
            postal: true,
            latlong: true,
            traits: true,
            subdivisions: true,
            registered_country: true,
            represented_country: true,
        }
    }

    /// Parse the raw include list. Unknown field names are a config error.
    pub fn parse(raw: &str) -> Result<Self, AnnotateError> {
        if raw == "*" {
            return Ok(Self::all());
        }
        let mut fields = Self::default();
        for part in raw.split(',') {
            match part.trim() {
                "city" => fields.city = true,
                "country" => fields.country = true,
                "continent" => fields.continent = true,
                "postal" => fields.postal = true,
                "latlong" => fields.latlong = true,
                "traits" => fields.traits = true,
                "subdivisions" => fields.subdivisions = true,
                "registered_country" => fields.registered_country = true,
                "represented_country" => fields.represented_country = true,
                other => {
                    return Err(AnnotateError::Config(format!(
                        "invalid geoip2 field {other:?}"
                    )))
                }
            }
        }
        Ok(fields)
    }
}

#[derive(Debug, Default, Serialize)]
struct NamedEntity {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
}

#[derive(Debug, Default, Serialize)]
struct NamedCode {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
}

#[derive(Debug, Default, Serialize)]
struct PostalOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct LatLongOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy_radius: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metro_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct TraitsOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    is_anonymous_proxy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_satellite_provider: Option<bool>,
}

/// Projected City record, shaped by the include set.
#[derive(Debug, Default, Serialize)]
struct GeoIp2Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<NamedEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<NamedCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continent: Option<NamedCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    postal: Option<PostalOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latlong: Option<LatLongOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subdivisions: Option<Vec<NamedCode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registered_country: Option<NamedCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    represented_country: Option<NamedCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    traits: Option<TraitsOutput>,
}

fn localized(names: &Option<BTreeMap<&str, &str>>, language: &str) -> Option<String> {
    names
        .as_ref()
        .and_then(|names| names.get(language))
        .map(|name| (*name).to_string())
}

fn project(record: geoip2::City<'_>, language: &str, include: &GeoFields) -> GeoIp2Output {
    let mut out = GeoIp2Output::default();

    if include.city {
        out.city = Some(match record.city {
            Some(city) => NamedEntity {
                name: localized(&city.names, language),
                id: city.geoname_id,
            },
            None => NamedEntity::default(),
        });
    }
    if include.country {
        out.country = Some(match record.country {
            Some(country) => NamedCode {
                name: localized(&country.names, language),
                code: country.iso_code.map(str::to_string),
                id: country.geoname_id,
            },
            None => NamedCode::default(),
        });
    }
    if include.continent {
        out.continent = Some(match record.continent {
            Some(continent) => NamedCode {
                name: localized(&continent.names, language),
                code: continent.code.map(str::to_string),
                id: continent.geoname_id,
            },
            None => NamedCode::default(),
        });
    }
    if include.postal {
        out.postal = Some(PostalOutput {
            code: record
                .postal
                .and_then(|postal| postal.code.map(str::to_string)),
        });
    }
    if include.latlong {
        out.latlong = Some(match record.location {
            Some(location) => LatLongOutput {
                accuracy_radius: location.accuracy_radius,
                latitude: location.latitude,
                longitude: location.longitude,
                metro_code: location.metro_code,
                time_zone: location.time_zone.map(str::to_string),
            },
            None => LatLongOutput::default(),
        });
    }
    if include.subdivisions {
        let subdivisions = record
            .subdivisions
            .unwrap_or_default()
            .into_iter()
            .map(|subdivision| NamedCode {
                name: localized(&subdivision.names, language),
                code: subdivision.iso_code.map(str::to_string),
                id: subdivision.geoname_id,
            })
            .collect();
        out.subdivisions = Some(subdivisions);
    }
    if include.registered_country {
        out.registered_country = Some(match record.registered_country {
            Some(country) => NamedCode {
                name: localized(&country.names, language),
                code: country.iso_code.map(str::to_string),
                id: country.geoname_id,
            },
            None => NamedCode::default(),
        });
    }
    if include.represented_country {
        out.represented_country = Some(match record.represented_country {
            Some(country) => NamedCode {
                name: localized(&country.names, language),
                code: country.iso_code.map(str::to_string),
                id: country.geoname_id,
            },
            None => NamedCode::default(),
        });
    }
    if include.traits {
        out.traits = Some(match record.traits {
            Some(traits) => TraitsOutput {
                is_anonymous_proxy: traits.is_anonymous_proxy,
                is_satellite_provider: traits.is_satellite_provider,
            },
            None => TraitsOutput::default(),
        });
    }

    out
}

/// Factory holding the opened City database.
pub struct GeoIp2Factory {
    config: GeoIp2Config,
    include: GeoFields,
    reader: Option<Arc<MmdbReader>>,
}

impl GeoIp2Factory {
    pub fn new(config: GeoIp2Config) -> Self {
        Self {
            config,
            include: GeoFields::default(),
            reader: None,
        }
    }
}

#[async_trait]
impl AnnotatorFactory for GeoIp2Factory {
    fn name(&self) -> &'static str {
        "geoip2"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        self.include = GeoFields::parse(&self.config.fields)?;
        let path = self
            .config
            .database
            .as_ref()
            .ok_or_else(|| AnnotateError::Config("no GeoIP2 database provided".to_string()))?;
        self.reader = Some(Arc::new(MmdbReader::open(path, self.config.mode)?));
        Ok(())
    }

    fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
        Box::new(GeoIp2Annotator {
            reader: self.reader.clone(),
            include: self.include,
            language: self.config.language.clone(),
        })
    }
}

struct GeoIp2Annotator {
    reader: Option<Arc<MmdbReader>>,
    include: GeoFields,
    language: String,
}

#[async_trait]
impl Annotator for GeoIp2Annotator {
    fn field_name(&self) -> &'static str {
        "geoip2"
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        if self.reader.is_none() {
            return Err(AnnotateError::Config(
                "geoip2 factory not initialized".to_string(),
            ));
        }
        Ok(())
    }

    async fn annotate(&mut self, ip: IpAddr) -> Value {
        let Some(reader) = self.reader.as_ref() else {
            return Value::Null;
        };
        match reader.lookup::<geoip2::City>(ip) {
            Ok(record) => serde_json::to_value(project(record, &self.language, &self.include))
                .unwrap_or(Value::Null),
            Err(error) => {
                if !is_not_found(&error) {
                    debug!(%ip, %error, "geoip2 lookup failed");
                }
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_fields() {
        let fields = GeoFields::parse("*").unwrap();
        assert!(fields.city);
        assert!(fields.represented_country);
        assert!(fields.traits);
    }

    #[test]
    fn test_parse_subset() {
        let fields = GeoFields::parse("city, country ,latlong").unwrap();
        assert!(fields.city);
        assert!(fields.country);
        assert!(fields.latlong);
        assert!(!fields.postal);
        assert!(!fields.subdivisions);
    }

    #[test]
    fn test_parse_invalid_field() {
        let err = GeoFields::parse("city,zipcode").unwrap_err();
        assert!(err.to_string().contains("zipcode"));
    }

    fn empty_city_record() -> geoip2::City<'static> {
        geoip2::City {
            city: None,
            continent: None,
            country: None,
            location: None,
            postal: None,
            registered_country: None,
            represented_country: None,
            subdivisions: None,
            traits: None,
        }
    }

    #[test]
    fn test_project_respects_include_set() {
        let include = GeoFields::parse("country").unwrap();
        let out = project(empty_city_record(), "en", &include);

        assert!(out.country.is_some());
        assert!(out.city.is_none());
        assert!(out.latlong.is_none());

        let out = project(empty_city_record(), "en", &GeoFields::all());
        assert!(out.city.is_some());
        assert!(out.traits.is_some());
    }

    #[tokio::test]
    async fn test_factory_requires_database() {
        let config = GeoIp2Config {
            enabled: true,
            ..Default::default()
        };
        let mut factory = GeoIp2Factory::new(config);
        let err = factory.initialize().await.unwrap_err();
        assert!(err.to_string().contains("database"));
    }
}
