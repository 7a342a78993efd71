//! Longest-prefix-match tree over IPv4 and IPv6 prefixes.

use ip_network::IpNetwork;
use ip_network_table::IpNetworkTable;
use ipmeta_error::RoutingError;
use std::net::IpAddr;

/// Per-prefix payload stored in the tree.
#[derive(Debug, Clone)]
pub struct RouteNode {
    /// Prefix in `addr/len` form, as inserted.
    pub prefix: String,
    /// Filtered AS path.
    pub path: Vec<u32>,
    /// Origin ASN (last element of the filtered path).
    pub asn: Option<u32>,
}

/// Insert-only longest-prefix-match tree.
///
/// IPv4 and IPv6 prefixes share one logical table, disjoint by the address
/// family of the queried IP. Built single-threaded, then shared read-only.
pub struct RouteTree {
    table: IpNetworkTable<RouteNode>,
    ipv4_count: usize,
    ipv6_count: usize,
}

impl std::fmt::Debug for RouteTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTree")
            .field("ipv4_count", &self.ipv4_count)
            .field("ipv6_count", &self.ipv6_count)
            .finish_non_exhaustive()
    }
}

impl Default for RouteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            table: IpNetworkTable::new(),
            ipv4_count: 0,
            ipv6_count: 0,
        }
    }

    /// Insert a node keyed on a prefix string.
    ///
    /// Accepts CIDR notation (`10.0.0.0/8`, `2001:db8::/32`) or a bare IP,
    /// which becomes a host route (/32 or /128).
    pub fn insert(&mut self, prefix: &str, node: RouteNode) -> Result<(), RoutingError> {
        if let Ok(network) = prefix.parse::<IpNetwork>() {
            match network {
                IpNetwork::V4(_) => self.ipv4_count += 1,
                IpNetwork::V6(_) => self.ipv6_count += 1,
            }
            self.table.insert(network, node);
            return Ok(());
        }

        if let Ok(ip) = prefix.parse::<IpAddr>() {
            let network = match ip {
                IpAddr::V4(v4) => IpNetwork::new(v4, 32)
                    .map_err(|e| RoutingError::InvalidPrefix(format!("{prefix}: {e}")))?,
                IpAddr::V6(v6) => IpNetwork::new(v6, 128)
                    .map_err(|e| RoutingError::InvalidPrefix(format!("{prefix}: {e}")))?,
            };
            match network {
                IpNetwork::V4(_) => self.ipv4_count += 1,
                IpNetwork::V6(_) => self.ipv6_count += 1,
            }
            self.table.insert(network, node);
            return Ok(());
        }

        Err(RoutingError::InvalidPrefix(prefix.to_string()))
    }

    /// Longest-prefix match for a single address.
    pub fn lookup(&self, ip: IpAddr) -> Option<&RouteNode> {
        self.table.longest_match(ip).map(|(_, node)| node)
    }

    /// Total number of inserted prefixes.
    pub fn len(&self) -> usize {
        self.ipv4_count + self.ipv6_count
    }

    /// True when no prefix has been inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of IPv4 prefixes.
    pub fn ipv4_count(&self) -> usize {
        self.ipv4_count
    }

    /// Number of IPv6 prefixes.
    pub fn ipv6_count(&self) -> usize {
        self.ipv6_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(prefix: &str, path: &[u32]) -> RouteNode {
        RouteNode {
            prefix: prefix.to_string(),
            path: path.to_vec(),
            asn: path.last().copied(),
        }
    }

    fn build_tree() -> RouteTree {
        let mut tree = RouteTree::new();
        tree.insert("10.0.0.0/8", node("10.0.0.0/8", &[1, 100])).unwrap();
        tree.insert("10.1.0.0/16", node("10.1.0.0/16", &[1, 200])).unwrap();
        tree.insert("192.0.2.0/24", node("192.0.2.0/24", &[300])).unwrap();
        tree.insert("1.1.1.1", node("1.1.1.1/32", &[13335])).unwrap();
        tree.insert("2001:db8::/32", node("2001:db8::/32", &[400])).unwrap();
        tree
    }

    #[test]
    fn test_longest_prefix_match() {
        let tree = build_tree();

        let hit = tree.lookup("10.1.2.3".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix, "10.1.0.0/16");
        assert_eq!(hit.asn, Some(200));

        let hit = tree.lookup("10.2.0.1".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix, "10.0.0.0/8");
        assert_eq!(hit.asn, Some(100));
    }

    #[test]
    fn test_host_route_from_bare_ip() {
        let tree = build_tree();
        let hit = tree.lookup("1.1.1.1".parse().unwrap()).unwrap();
        assert_eq!(hit.asn, Some(13335));

        assert!(tree.lookup("1.1.1.2".parse().unwrap()).is_none());
    }

    #[test]
    fn test_ipv6_lookup() {
        let tree = build_tree();
        let hit = tree.lookup("2001:db8::1".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix, "2001:db8::/32");

        assert!(tree.lookup("2001:db9::1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_no_match() {
        let tree = build_tree();
        assert!(tree.lookup("203.0.113.1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let mut tree = RouteTree::new();
        assert!(tree.insert("not-a-prefix", node("x", &[])).is_err());
    }

    #[test]
    fn test_counts() {
        let tree = build_tree();
        assert_eq!(tree.ipv4_count(), 4);
        assert_eq!(tree.ipv6_count(), 1);
        assert_eq!(tree.len(), 5);
        assert!(!tree.is_empty());
    }
}
