//! Reverse-DNS (PTR) annotator.

use crate::{Annotator, AnnotatorFactory};
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use ipmeta_error::AnnotateError;
use serde::Serialize;
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Reverse-DNS adapter configuration.
#[derive(Debug, Clone)]
pub struct RdnsConfig {
    pub enabled: bool,
    /// Comma-separated resolver IPs; empty means system defaults.
    pub resolvers: String,
    /// Per-query deadline in seconds.
    pub timeout_secs: u64,
    pub workers: usize,
}

impl Default for RdnsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            resolvers: String::new(),
            timeout_secs: 3,
            workers: 100,
        }
    }
}

/// `{domain_names, status, error}`. Network errors land in `error`; a
/// resolved query carries its rcode in `status`.
#[derive(Debug, Default, Serialize)]
struct RdnsOutput {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    domain_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Upper-case rcode names, `NOERROR` style.
fn rcode_name(code: ResponseCode) -> String {
    match code {
        ResponseCode::NoError => "NOERROR".to_string(),
        ResponseCode::FormErr => "FORMERR".to_string(),
        ResponseCode::ServFail => "SERVFAIL".to_string(),
        ResponseCode::NXDomain => "NXDOMAIN".to_string(),
        ResponseCode::NotImp => "NOTIMP".to_string(),
        ResponseCode::Refused => "REFUSED".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

/// Parse a comma-separated resolver list into v4 and v6 pools (port 53).
fn parse_resolvers(raw: &str) -> Result<(Vec<SocketAddr>, Vec<SocketAddr>), AnnotateError> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for part in raw.split(',') {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        let ip: IpAddr = trimmed.parse().map_err(|_| {
            AnnotateError::Config(format!("failed to parse dns server IP address: {trimmed}"))
        })?;
        let addr = SocketAddr::new(ip, 53);
        if ip.is_ipv4() {
            v4.push(addr);
        } else {
            v6.push(addr);
        }
    }
    Ok((v4, v6))
}

/// Factory holding the parsed resolver pools.
pub struct RdnsFactory {
    config: RdnsConfig,
    nameservers: Vec<SocketAddr>,
}

impl RdnsFactory {
    pub fn new(config: RdnsConfig) -> Self {
        Self {
            config,
            nameservers: Vec::new(),
        }
    }
}

#[async_trait]
impl AnnotatorFactory for RdnsFactory {
    fn name(&self) -> &'static str {
        "rdns"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        let (v4, v6) = parse_resolvers(&self.config.resolvers)?;
        self.nameservers = v4;
        self.nameservers.extend(v6);
        Ok(())
    }

    fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
        Box::new(RdnsAnnotator {
            nameservers: self.nameservers.clone(),
            timeout: Duration::from_secs(self.config.timeout_secs),
            resolver: None,
        })
    }
}

struct RdnsAnnotator {
    nameservers: Vec<SocketAddr>,
    timeout: Duration,
    resolver: Option<TokioAsyncResolver>,
}

#[async_trait]
impl Annotator for RdnsAnnotator {
    fn field_name(&self) -> &'static str {
        "rdns"
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;

        let resolver = if self.nameservers.is_empty() {
            TokioAsyncResolver::tokio_from_system_conf()
                .map_err(|e| AnnotateError::Resolver(e.to_string()))?
        } else {
            let mut config = ResolverConfig::new();
            for addr in &self.nameservers {
                config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
            }
            TokioAsyncResolver::tokio(config, opts)
        };

        self.resolver = Some(resolver);
        Ok(())
    }

    async fn annotate(&mut self, ip: IpAddr) -> Value {
        let Some(resolver) = self.resolver.as_ref() else {
            return Value::Null;
        };

        let out = match tokio::time::timeout(self.timeout, resolver.reverse_lookup(ip)).await {
            Err(_) => RdnsOutput {
                error: Some("query timed out".to_string()),
                ..Default::default()
            },
            Ok(Err(error)) => match error.kind() {
                ResolveErrorKind::NoRecordsFound { response_code, .. } => RdnsOutput {
                    status: Some(rcode_name(*response_code)),
                    ..Default::default()
                },
                _ => RdnsOutput {
                    error: Some(error.to_string()),
                    ..Default::default()
                },
            },
            Ok(Ok(lookup)) => RdnsOutput {
                domain_names: lookup
                    .iter()
                    .map(|name| name.to_string().trim_end_matches('.').to_string())
                    .collect(),
                status: Some("NOERROR".to_string()),
                error: None,
            },
        };

        serde_json::to_value(out).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolvers_splits_families() {
        let (v4, v6) = parse_resolvers("8.8.8.8, 1.1.1.1 ,2001:4860:4860::8888").unwrap();
        assert_eq!(v4.len(), 2);
        assert_eq!(v6.len(), 1);
        assert_eq!(v4[0], "8.8.8.8:53".parse().unwrap());
        assert_eq!(v6[0].port(), 53);
    }

    #[test]
    fn test_parse_resolvers_empty() {
        let (v4, v6) = parse_resolvers("").unwrap();
        assert!(v4.is_empty());
        assert!(v6.is_empty());
    }

    #[test]
    fn test_parse_resolvers_rejects_garbage() {
        let err = parse_resolvers("8.8.8.8,nameserver.example").unwrap_err();
        assert!(err.to_string().contains("nameserver.example"));
    }

    #[test]
    fn test_rcode_names() {
        assert_eq!(rcode_name(ResponseCode::NoError), "NOERROR");
        assert_eq!(rcode_name(ResponseCode::NXDomain), "NXDOMAIN");
        assert_eq!(rcode_name(ResponseCode::ServFail), "SERVFAIL");
    }

    #[test]
    fn test_output_skips_empty_fields() {
        let out = RdnsOutput {
            domain_names: vec!["one.one.one.one".to_string()],
            status: Some("NOERROR".to_string()),
            error: None,
        };
        let json = serde_json::to_value(out).unwrap();
        assert_eq!(json["domain_names"][0], "one.one.one.one");
        assert!(json.get("error").is_none());

        let json = serde_json::to_value(RdnsOutput {
            status: Some("NXDOMAIN".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert!(json.get("domain_names").is_none());
    }
}
