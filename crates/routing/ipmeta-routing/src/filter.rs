//! AS-path rewriting filters applied at tree-build time.

use std::ops::RangeInclusive;

/// Reserved private ASN range (RFC 6996, 16-bit block).
pub const PRIVATE_ASN_RANGE: RangeInclusive<u32> = 64512..=65534;

/// A pure rewrite of an AS path, applied before a prefix is inserted into
/// the routing tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFilter {
    /// Pass the path through unchanged.
    Identity,

    /// Collapse each contiguous run of private ASNs into `origin`.
    ///
    /// The replacement is emitted only when the previously emitted element
    /// is not already `origin`, and a real `origin` hop that directly
    /// follows a replacement is swallowed. Duplicate runs of non-private
    /// ASNs are preserved.
    CollapsePrivate { origin: u32 },
}

impl PathFilter {
    /// Convenience constructor for the private-ASN collapse filter.
    pub fn collapse_private(origin: u32) -> Self {
        Self::CollapsePrivate { origin }
    }

    /// Apply the filter to a path.
    pub fn apply(&self, path: &[u32]) -> Vec<u32> {
        match *self {
            Self::Identity => path.to_vec(),
            Self::CollapsePrivate { origin } => collapse_private(path, origin),
        }
    }
}

fn collapse_private(path: &[u32], origin: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(path.len());
    // True while the most recently emitted element is an origin the filter
    // itself inserted; a following real origin hop is redundant then.
    let mut substituted = false;

    for &asn in path {
        if PRIVATE_ASN_RANGE.contains(&asn) {
            if out.last() != Some(&origin) {
                out.push(origin);
            }
            substituted = true;
        } else if substituted && asn == origin {
            continue;
        } else {
            out.push(asn);
            substituted = false;
        }
    }

    out
}
