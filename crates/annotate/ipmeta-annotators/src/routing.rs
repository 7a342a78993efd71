//! BGP routing annotator backed by an MRT-built lookup table.

use crate::{Annotator, AnnotatorFactory};
use async_trait::async_trait;
use ipmeta_error::AnnotateError;
use ipmeta_routing::{PathFilter, RoutingTable};
use serde_json::Value;
use std::fs::File;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Routing adapter configuration.
#[derive(Debug, Clone)]
pub struct RoutingAnnotatorConfig {
    pub enabled: bool,
    /// Path to the MRT TABLE_DUMPv2 snapshot.
    pub mrt_file: Option<PathBuf>,
    /// Optional ASN→name side table (newline-delimited JSON).
    pub as_names: Option<PathBuf>,
    /// Optional ASN→data side table (newline-delimited JSON).
    pub as_data: Option<PathBuf>,
    /// When set, collapse private-ASN runs in stored paths into this ASN.
    pub local_asn: Option<u32>,
    pub workers: usize,
}

impl Default for RoutingAnnotatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mrt_file: None,
            as_names: None,
            as_data: None,
            local_asn: None,
            workers: 5,
        }
    }
}

/// Factory owning the shared lookup table.
///
/// The table is built once here, then shared read-only with every worker.
pub struct RoutingFactory {
    config: RoutingAnnotatorConfig,
    table: Option<Arc<RoutingTable>>,
}

impl RoutingFactory {
    pub fn new(config: RoutingAnnotatorConfig) -> Self {
        Self {
            config,
            table: None,
        }
    }

    /// Wrap an already-built table (used by embedding tests).
    pub fn with_table(config: RoutingAnnotatorConfig, table: RoutingTable) -> Self {
        Self {
            config,
            table: Some(Arc::new(table)),
        }
    }
}

#[async_trait]
impl AnnotatorFactory for RoutingFactory {
    fn name(&self) -> &'static str {
        "routing"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        if self.table.is_some() {
            return Ok(());
        }
        let mrt_path = self.config.mrt_file.as_ref().ok_or_else(|| {
            AnnotateError::Config("no routing file (MRT TABLE_DUMPv2) provided".to_string())
        })?;
        info!(path = %mrt_path.display(), "building routing table");

        let filter = match self.config.local_asn {
            Some(origin) => PathFilter::collapse_private(origin),
            None => PathFilter::Identity,
        };

        let mrt = File::open(mrt_path)
            .map_err(|e| AnnotateError::Config(format!("{}: {e}", mrt_path.display())))?;
        let mut table = RoutingTable::from_mrt(mrt, filter)
            .map_err(|e| AnnotateError::Database(e.to_string()))?;

        if let Some(path) = &self.config.as_names {
            let file = File::open(path)
                .map_err(|e| AnnotateError::Config(format!("{}: {e}", path.display())))?;
            table
                .load_names(file)
                .map_err(|e| AnnotateError::Database(e.to_string()))?;
        }
        if let Some(path) = &self.config.as_data {
            let file = File::open(path)
                .map_err(|e| AnnotateError::Config(format!("{}: {e}", path.display())))?;
            table
                .load_data(file)
                .map_err(|e| AnnotateError::Database(e.to_string()))?;
        }

        self.table = Some(Arc::new(table));
        Ok(())
    }

    fn make_worker(&self, _id: usize) -> Box<dyn Annotator> {
        Box::new(RoutingAnnotator {
            table: self.table.clone(),
        })
    }
}

struct RoutingAnnotator {
    table: Option<Arc<RoutingTable>>,
}

#[async_trait]
impl Annotator for RoutingAnnotator {
    fn field_name(&self) -> &'static str {
        "routing"
    }

    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        if self.table.is_none() {
            return Err(AnnotateError::Config(
                "routing factory not initialized".to_string(),
            ));
        }
        Ok(())
    }

    async fn annotate(&mut self, ip: IpAddr) -> Value {
        let Some(table) = self.table.as_ref() else {
            return Value::Null;
        };
        match table.get(ip) {
            Some(info) => serde_json::to_value(info).unwrap_or(Value::Null),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipmeta_routing::{RouteNode, RouteTree};

    fn test_factory() -> RoutingFactory {
        let mut tree = RouteTree::new();
        tree.insert(
            "10.0.0.0/8",
            RouteNode {
                prefix: "10.0.0.0/8".to_string(),
                path: vec![1, 38],
                asn: Some(38),
            },
        )
        .unwrap();

        let config = RoutingAnnotatorConfig {
            enabled: true,
            workers: 2,
            ..Default::default()
        };
        RoutingFactory::with_table(config, RoutingTable::new(tree))
    }

    #[tokio::test]
    async fn test_annotate_hit() {
        let factory = test_factory();
        let mut worker = factory.make_worker(0);
        worker.initialize().await.unwrap();

        let value = worker.annotate("10.1.2.3".parse().unwrap()).await;
        assert_eq!(value["prefix"], "10.0.0.0/8");
        assert_eq!(value["asn"], 38);
        assert_eq!(value["path"], serde_json::json!([1, 38]));
    }

    #[tokio::test]
    async fn test_annotate_miss_is_null() {
        let factory = test_factory();
        let mut worker = factory.make_worker(0);
        worker.initialize().await.unwrap();

        let value = worker.annotate("192.0.2.1".parse().unwrap()).await;
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_initialize_requires_mrt_file() {
        let mut factory = RoutingFactory::new(RoutingAnnotatorConfig {
            enabled: true,
            ..Default::default()
        });
        let err = factory.initialize().await.unwrap_err();
        assert!(err.to_string().contains("MRT"));
    }

    #[tokio::test]
    async fn test_worker_without_factory_init_fails() {
        let factory = RoutingFactory::new(RoutingAnnotatorConfig::default());
        let mut worker = factory.make_worker(0);
        assert!(worker.initialize().await.is_err());
    }
}
