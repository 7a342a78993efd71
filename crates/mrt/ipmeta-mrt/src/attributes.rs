//! BGP path attribute parsing for TABLE_DUMPv2 RIB entries.

use crate::message::{need, read_prefix};
use bytes::Buf;
use ipmeta_error::MrtError;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

const ATTR_ORIGIN: u8 = 1;
const ATTR_AS_PATH: u8 = 2;
const ATTR_NEXT_HOP: u8 = 3;
const ATTR_MULTI_EXIT_DISC: u8 = 4;
const ATTR_LOCAL_PREF: u8 = 5;
const ATTR_ATOMIC_AGGREGATE: u8 = 6;
const ATTR_AGGREGATOR: u8 = 7;
const ATTR_COMMUNITIES: u8 = 8;
const ATTR_ORIGINATOR_ID: u8 = 9;
const ATTR_MP_REACH_NLRI: u8 = 14;
const ATTR_MP_UNREACH_NLRI: u8 = 15;

/// Extended-length bit of the attribute flags octet.
const FLAG_EXTENDED_LENGTH: u8 = 0x10;

/// AS_PATH segment holding an ordered sequence of ASNs.
const SEGMENT_AS_SEQUENCE: u8 = 2;
/// AS_PATH segment holding an unordered set of ASNs.
const SEGMENT_AS_SET: u8 = 1;

/// AGGREGATOR value: AS number plus the aggregating speaker's address.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregator {
    #[serde(rename = "as")]
    pub asn: u32,
    pub address: IpAddr,
}

/// MP_REACH_NLRI attribute (RFC 4760).
#[derive(Debug, Clone, Serialize)]
pub struct MpReachNlri {
    pub afi: u16,
    pub safi: u8,
    pub next_hop: Vec<IpAddr>,
    pub nlri: Vec<String>,
}

/// MP_UNREACH_NLRI attribute (RFC 4760).
#[derive(Debug, Clone, Serialize)]
pub struct MpUnreachNlri {
    pub afi: u16,
    pub safi: u8,
    pub withdrawn: Vec<String>,
}

/// Parsed path attributes of one RIB entry.
///
/// The AS path is the field the routing table build consumes; the rest are
/// preserved for diagnostic export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RibAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub as_path: Vec<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_hop: Option<IpAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_exit_desc: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_pref: Option<u32>,

    pub atomic_aggregate: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<Aggregator>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub communities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub originator_id: Option<IpAddr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp_reach_nlri: Option<MpReachNlri>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp_unreach_nlri: Option<MpUnreachNlri>,
}

/// Parse a RIB entry's attribute block.
///
/// Unknown attribute types are logged at debug and skipped; structural
/// damage inside a recognized attribute is fatal.
pub fn parse_attributes(block: &[u8]) -> Result<RibAttributes, MrtError> {
    let mut buf = block;
    let mut attrs = RibAttributes::default();

    while buf.has_remaining() {
        need(&buf, 2, "attribute header")?;
        let flags = buf.get_u8();
        let type_code = buf.get_u8();

        let len = if flags & FLAG_EXTENDED_LENGTH != 0 {
            need(&buf, 2, "attribute extended length")?;
            buf.get_u16() as usize
        } else {
            need(&buf, 1, "attribute length")?;
            buf.get_u8() as usize
        };

        need(&buf, len, "attribute value")?;
        let value = &buf[..len];
        buf.advance(len);

        match type_code {
            ATTR_ORIGIN => attrs.origin = parse_origin(value),
            ATTR_AS_PATH => attrs.as_path = parse_as_path(value)?,
            ATTR_NEXT_HOP => attrs.next_hop = Some(parse_address(value, "NEXT_HOP")?),
            ATTR_MULTI_EXIT_DISC => attrs.multi_exit_desc = Some(parse_u32(value, "MULTI_EXIT_DISC")?),
            ATTR_LOCAL_PREF => attrs.local_pref = Some(parse_u32(value, "LOCAL_PREF")?),
            ATTR_ATOMIC_AGGREGATE => attrs.atomic_aggregate = true,
            ATTR_AGGREGATOR => attrs.aggregator = Some(parse_aggregator(value)?),
            ATTR_COMMUNITIES => attrs.communities = parse_communities(value)?,
            ATTR_ORIGINATOR_ID => attrs.originator_id = Some(parse_address(value, "ORIGINATOR_ID")?),
            ATTR_MP_REACH_NLRI => attrs.mp_reach_nlri = Some(parse_mp_reach(value)?),
            ATTR_MP_UNREACH_NLRI => attrs.mp_unreach_nlri = Some(parse_mp_unreach(value)?),
            other => {
                debug!(attribute = other, "skipping unsupported path attribute");
            }
        }
    }

    Ok(attrs)
}

fn parse_origin(value: &[u8]) -> Option<String> {
    match value.first() {
        Some(0) => Some("igp".to_string()),
        Some(1) => Some("egp".to_string()),
        Some(2) => Some("incomplete".to_string()),
        other => {
            debug!(value = ?other, "unrecognized ORIGIN value");
            None
        }
    }
}

/// Parse an AS_PATH of AS4 (4-byte ASN) segments, flattened in wire order.
fn parse_as_path(value: &[u8]) -> Result<Vec<u32>, MrtError> {
    let mut buf = value;
    let mut path = Vec::new();

    while buf.has_remaining() {
        need(&buf, 2, "AS_PATH segment header")?;
        let segment_type = buf.get_u8();
        let count = buf.get_u8() as usize;

        if segment_type != SEGMENT_AS_SEQUENCE && segment_type != SEGMENT_AS_SET {
            return Err(MrtError::Attribute(format!(
                "unknown AS_PATH segment type {segment_type}"
            )));
        }
        need(&buf, count * 4, "AS_PATH segment")?;
        for _ in 0..count {
            path.push(buf.get_u32());
        }
    }

    Ok(path)
}

fn parse_u32(value: &[u8], what: &str) -> Result<u32, MrtError> {
    let mut buf = value;
    need(&buf, 4, what)?;
    Ok(buf.get_u32())
}

fn parse_address(value: &[u8], what: &str) -> Result<IpAddr, MrtError> {
    match value.len() {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(value);
            Ok(Ipv4Addr::from(octets).into())
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(value);
            Ok(Ipv6Addr::from(octets).into())
        }
        other => Err(MrtError::Attribute(format!(
            "{what}: unexpected address length {other}"
        ))),
    }
}

fn parse_aggregator(value: &[u8]) -> Result<Aggregator, MrtError> {
    let mut buf = value;
    // 8 bytes = 4-byte AS + IPv4, 6 bytes = legacy 2-byte AS + IPv4.
    let asn = match value.len() {
        8 => buf.get_u32(),
        6 => u32::from(buf.get_u16()),
        other => {
            return Err(MrtError::Attribute(format!(
                "AGGREGATOR: unexpected length {other}"
            )))
        }
    };
    let address = Ipv4Addr::from(buf.get_u32()).into();
    Ok(Aggregator { asn, address })
}

fn parse_communities(value: &[u8]) -> Result<Vec<String>, MrtError> {
    if value.len() % 4 != 0 {
        return Err(MrtError::Attribute(format!(
            "COMMUNITIES: length {} not a multiple of 4",
            value.len()
        )));
    }
    let mut buf = value;
    let mut communities = Vec::with_capacity(value.len() / 4);
    while buf.has_remaining() {
        let community = buf.get_u32();
        communities.push(match well_known_community(community) {
            Some(name) => name.to_string(),
            None => format!("{}:{}", community >> 16, community & 0xffff),
        });
    }
    Ok(communities)
}

fn well_known_community(value: u32) -> Option<&'static str> {
    match value {
        0xFFFF_0000 => Some("graceful-shutdown"),
        0xFFFF_0001 => Some("accept-own"),
        0xFFFF_0002 => Some("route-filter-translated-v4"),
        0xFFFF_0003 => Some("route-filter-v4"),
        0xFFFF_0004 => Some("route-filter-translated-v6"),
        0xFFFF_0005 => Some("route-filter-v6"),
        0xFFFF_0006 => Some("llgr-stale"),
        0xFFFF_0007 => Some("no-llgr"),
        0xFFFF_0008 => Some("accept-own-nexthop"),
        0xFFFF_029A => Some("blackhole"),
        0xFFFF_FF01 => Some("no-export"),
        0xFFFF_FF02 => Some("no-advertise"),
        0xFFFF_FF03 => Some("no-export-subconfed"),
        0xFFFF_FF04 => Some("no-peer"),
        _ => None,
    }
}

fn parse_mp_reach(value: &[u8]) -> Result<MpReachNlri, MrtError> {
    let mut buf = value;
    need(&buf, 4, "MP_REACH_NLRI header")?;
    let afi = buf.get_u16();
    let safi = buf.get_u8();
    let nh_len = buf.get_u8() as usize;

    need(&buf, nh_len, "MP_REACH_NLRI next hop")?;
    let mut next_hop = Vec::new();
    let mut nh = &buf[..nh_len];
    buf.advance(nh_len);
    while !nh.is_empty() {
        let take = if nh.len() >= 16 { 16 } else { 4 };
        if nh.len() < take {
            return Err(MrtError::Attribute(
                "MP_REACH_NLRI: malformed next hop".to_string(),
            ));
        }
        next_hop.push(parse_address(&nh[..take], "MP_REACH_NLRI next hop")?);
        nh = &nh[take..];
    }

    need(&buf, 1, "MP_REACH_NLRI reserved octet")?;
    buf.advance(1);

    let mut nlri = Vec::new();
    while buf.has_remaining() {
        nlri.push(read_prefix(&mut buf, afi, "MP_REACH_NLRI prefix")?);
    }

    Ok(MpReachNlri {
        afi,
        safi,
        next_hop,
        nlri,
    })
}

fn parse_mp_unreach(value: &[u8]) -> Result<MpUnreachNlri, MrtError> {
    let mut buf = value;
    need(&buf, 3, "MP_UNREACH_NLRI header")?;
    let afi = buf.get_u16();
    let safi = buf.get_u8();

    let mut withdrawn = Vec::new();
    while buf.has_remaining() {
        withdrawn.push(read_prefix(&mut buf, afi, "MP_UNREACH_NLRI prefix")?);
    }

    Ok(MpUnreachNlri {
        afi,
        safi,
        withdrawn,
    })
}
