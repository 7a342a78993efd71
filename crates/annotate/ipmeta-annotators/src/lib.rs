//! Annotator contract and the adapters implementing it.
//!
//! An [`AnnotatorFactory`] holds process-wide immutable state (opened
//! databases, parsed lookup trees) and is initialized once after flags are
//! parsed. It mints one [`Annotator`] per worker; workers are initialized
//! inside their own task, invoked once per record, and closed when their
//! worker exits.
//!
//! Factories are assembled explicitly by the binary into a
//! `Vec<Box<dyn AnnotatorFactory>>`; registration order is chain order.
//!
//! `annotate` cannot fail the pipeline: an adapter that has nothing to say
//! for an IP returns its no-data value (`null` or an empty object), and
//! network or lookup errors are folded into that value.

pub mod geoasn;
pub mod geoip2;
pub mod ipinfo;
pub mod mmdb;
pub mod rdap;
pub mod rdns;
pub mod routing;
pub mod spur;

pub use geoasn::{GeoAsnConfig, GeoAsnFactory};
pub use geoip2::{GeoFields, GeoIp2Config, GeoIp2Factory};
pub use ipinfo::{IpinfoConfig, IpinfoFactory};
pub use ipmeta_error::AnnotateError;
pub use mmdb::{MmdbMode, MmdbReader};
pub use rdap::{RdapConfig, RdapFactory};
pub use rdns::{RdnsConfig, RdnsFactory};
pub use routing::{RoutingAnnotatorConfig, RoutingFactory};
pub use spur::{SpurConfig, SpurFactory};

use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;

/// Per-worker annotator instance.
#[async_trait]
pub trait Annotator: Send {
    /// Stable output field name this annotator writes under.
    fn field_name(&self) -> &'static str;

    /// Called once inside the worker task, before the first record.
    async fn initialize(&mut self) -> Result<(), AnnotateError> {
        Ok(())
    }

    /// Produce the annotation value for one IP. Never fails; no-data is a
    /// legitimate outcome.
    async fn annotate(&mut self, ip: IpAddr) -> Value;

    /// Called once when the worker exits.
    async fn close(&mut self) -> Result<(), AnnotateError> {
        Ok(())
    }
}

/// Process-wide annotator factory.
#[async_trait]
pub trait AnnotatorFactory: Send + Sync {
    /// Short name used in logs and metadata.
    fn name(&self) -> &'static str;

    /// Whether the operator enabled this annotator.
    fn is_enabled(&self) -> bool;

    /// Number of workers to run for this annotator's stage.
    fn worker_count(&self) -> usize;

    /// Open databases, parse trees, validate configuration. Called once,
    /// before any worker is made.
    async fn initialize(&mut self) -> Result<(), AnnotateError>;

    /// Mint the per-worker annotator with the given worker id.
    fn make_worker(&self, id: usize) -> Box<dyn Annotator>;

    /// Called once after the pipeline has drained.
    async fn close(&mut self) -> Result<(), AnnotateError> {
        Ok(())
    }
}
