//! Longest-prefix routing lookups built from MRT TABLE_DUMPv2 snapshots.
//!
//! [`RoutingTable`] combines a longest-prefix-match tree over IPv4/IPv6
//! prefixes with two optional side tables joined at query time: ASN→name
//! descriptors and ASN→arbitrary data. The tree is built once, before the
//! pipeline starts, and is immutable afterwards; lookups are safe from any
//! number of concurrent readers.

pub mod filter;
pub mod tables;
pub mod tree;

pub use filter::PathFilter;
pub use ipmeta_error::RoutingError;
pub use tables::{load_as_data, load_as_names, AsName};
pub use tree::{RouteNode, RouteTree};

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::net::IpAddr;
use tracing::{debug, info};

/// Result of a routing lookup, joined with the side tables.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingInfo {
    /// Most specific covering prefix.
    pub prefix: String,

    /// Origin ASN (last element of the stored path).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,

    /// Stored (possibly filtered) AS path.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<u32>,

    /// Origin AS descriptor from the name table, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<AsName>,

    /// Origin AS record from the data table, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Immutable routing lookup state shared across all pipeline workers.
#[derive(Debug, Default)]
pub struct RoutingTable {
    tree: RouteTree,
    names: HashMap<u32, AsName>,
    data: HashMap<u32, Value>,
}

impl RoutingTable {
    /// Wrap an already-built tree, with empty side tables.
    pub fn new(tree: RouteTree) -> Self {
        Self {
            tree,
            names: HashMap::new(),
            data: HashMap::new(),
        }
    }

    /// Build the prefix tree from an MRT TABLE_DUMPv2 stream.
    ///
    /// Only IPv4 RIB entries populate the tree. Each entry's AS path runs
    /// through `path_filter`; the origin ASN is the last element of the
    /// filtered path.
    pub fn from_mrt<R: Read>(reader: R, path_filter: PathFilter) -> Result<Self, RoutingError> {
        let mut tree = RouteTree::new();
        let mut skipped = 0usize;

        ipmeta_mrt::read_rib_entries(reader, |entry| {
            if entry.afi != ipmeta_mrt::AFI_IPV4 {
                return Ok(());
            }
            let path = path_filter.apply(&entry.attributes.as_path);
            let asn = path.last().copied();
            let node = RouteNode {
                prefix: entry.prefix.clone(),
                path,
                asn,
            };
            if tree.insert(&entry.prefix, node).is_err() {
                // Prefixes come from our own decoder; a reject here is a
                // malformed duplicate-style edge worth counting, not fatal.
                skipped += 1;
            }
            Ok(())
        })?;

        if skipped > 0 {
            debug!(skipped, "skipped unparseable prefixes during tree build");
        }
        info!(prefixes = tree.len(), "built routing lookup tree");

        Ok(Self {
            tree,
            names: HashMap::new(),
            data: HashMap::new(),
        })
    }

    /// Load the ASN→name side table from newline-delimited JSON.
    pub fn load_names<R: Read>(&mut self, reader: R) -> Result<(), RoutingError> {
        self.names = load_as_names(reader)?;
        info!(entries = self.names.len(), "loaded AS name table");
        Ok(())
    }

    /// Load the ASN→data side table from newline-delimited JSON.
    pub fn load_data<R: Read>(&mut self, reader: R) -> Result<(), RoutingError> {
        self.data = load_as_data(reader)?;
        info!(entries = self.data.len(), "loaded AS data table");
        Ok(())
    }

    /// Longest-prefix lookup, joined with the side tables.
    ///
    /// Returns `None` when no inserted prefix covers the address.
    pub fn get(&self, ip: IpAddr) -> Option<RoutingInfo> {
        let node = self.tree.lookup(ip)?;

        let origin = node.asn.and_then(|asn| {
            self.names.get(&asn).map(|name| {
                let mut name = name.clone();
                name.asn = asn;
                name
            })
        });
        let data = node.asn.and_then(|asn| self.data.get(&asn).cloned());

        Some(RoutingInfo {
            prefix: node.prefix.clone(),
            asn: node.asn,
            path: node.path.clone(),
            origin,
            data,
        })
    }

    /// Number of prefixes in the tree.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True when the tree holds no prefixes.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
