//! MRT message structures and body parsing.

use crate::attributes::{parse_attributes, RibAttributes};
use bytes::Buf;
use ipmeta_error::MrtError;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};

/// Length of the MRT common header in bytes.
pub const MRT_COMMON_HEADER_LEN: usize = 12;

/// MRT type code for TABLE_DUMPv2.
pub const TABLE_DUMP_V2: u16 = 13;

/// Address family identifier for IPv4.
pub const AFI_IPV4: u16 = 1;

/// Address family identifier for IPv6.
pub const AFI_IPV6: u16 = 2;

/// Peer type bit: the peer address is IPv6.
const PEER_TYPE_IPV6: u8 = 0x01;

/// Peer type bit: the peer AS number is 32-bit.
const PEER_TYPE_AS4: u8 = 0x02;

/// The 12-byte MRT common header.
#[derive(Debug, Clone, Copy)]
pub struct MrtHeader {
    /// Seconds since the Unix epoch the message was recorded at.
    pub timestamp: u32,
    /// MRT type code.
    pub mrt_type: u16,
    /// Type-specific subtype code.
    pub subtype: u16,
    /// Length of the message body in bytes.
    pub length: u32,
}

impl MrtHeader {
    /// Parse a common header from exactly [`MRT_COMMON_HEADER_LEN`] bytes.
    pub fn parse(buf: &[u8; MRT_COMMON_HEADER_LEN]) -> Self {
        let mut buf = &buf[..];
        Self {
            timestamp: buf.get_u32(),
            mrt_type: buf.get_u16(),
            subtype: buf.get_u16(),
            length: buf.get_u32(),
        }
    }
}

/// TABLE_DUMPv2 subtypes the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDumpV2Subtype {
    PeerIndexTable,
    RibIpv4Unicast,
    RibIpv4Multicast,
    RibIpv6Unicast,
    RibIpv6Multicast,
    RibGeneric,
    GeoPeerTable,
    RibIpv4UnicastAddpath,
    RibIpv4MulticastAddpath,
    RibIpv6UnicastAddpath,
    RibIpv6MulticastAddpath,
    RibGenericAddpath,
}

impl TableDumpV2Subtype {
    /// Decode the subtype code; `None` for codes this decoder rejects.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::PeerIndexTable),
            2 => Some(Self::RibIpv4Unicast),
            3 => Some(Self::RibIpv4Multicast),
            4 => Some(Self::RibIpv6Unicast),
            5 => Some(Self::RibIpv6Multicast),
            6 => Some(Self::RibGeneric),
            7 => Some(Self::GeoPeerTable),
            8 => Some(Self::RibIpv4UnicastAddpath),
            9 => Some(Self::RibIpv4MulticastAddpath),
            10 => Some(Self::RibIpv6UnicastAddpath),
            11 => Some(Self::RibIpv6MulticastAddpath),
            12 => Some(Self::RibGenericAddpath),
            _ => None,
        }
    }

    /// Stable lowercase name used in exported records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PeerIndexTable => "peer_index_table",
            Self::RibIpv4Unicast => "rib_ipv4_unicast",
            Self::RibIpv4Multicast => "rib_ipv4_multicast",
            Self::RibIpv6Unicast => "rib_ipv6_unicast",
            Self::RibIpv6Multicast => "rib_ipv6_multicast",
            Self::RibGeneric => "rib_generic",
            Self::GeoPeerTable => "geo_peer_table",
            Self::RibIpv4UnicastAddpath => "rib_ipv4_unicast_addpath",
            Self::RibIpv4MulticastAddpath => "rib_ipv4_multicast_addpath",
            Self::RibIpv6UnicastAddpath => "rib_ipv6_unicast_addpath",
            Self::RibIpv6MulticastAddpath => "rib_ipv6_multicast_addpath",
            Self::RibGenericAddpath => "rib_generic_addpath",
        }
    }

    /// Whether RIB entries of this subtype carry a path identifier.
    pub fn is_addpath(&self) -> bool {
        matches!(
            self,
            Self::RibIpv4UnicastAddpath
                | Self::RibIpv4MulticastAddpath
                | Self::RibIpv6UnicastAddpath
                | Self::RibIpv6MulticastAddpath
                | Self::RibGenericAddpath
        )
    }

    /// AFI fixed by the subtype; `None` for the generic subtypes, which
    /// carry the AFI in the message body.
    fn fixed_afi(&self) -> Option<u16> {
        match self {
            Self::RibIpv4Unicast | Self::RibIpv4Multicast | Self::RibIpv4UnicastAddpath
            | Self::RibIpv4MulticastAddpath => Some(AFI_IPV4),
            Self::RibIpv6Unicast | Self::RibIpv6Multicast | Self::RibIpv6UnicastAddpath
            | Self::RibIpv6MulticastAddpath => Some(AFI_IPV6),
            _ => None,
        }
    }

    /// SAFI fixed by the subtype; `None` for the generic subtypes.
    fn fixed_safi(&self) -> Option<u8> {
        match self {
            Self::RibIpv4Unicast | Self::RibIpv6Unicast | Self::RibIpv4UnicastAddpath
            | Self::RibIpv6UnicastAddpath => Some(1),
            Self::RibIpv4Multicast | Self::RibIpv6Multicast | Self::RibIpv4MulticastAddpath
            | Self::RibIpv6MulticastAddpath => Some(2),
            _ => None,
        }
    }
}

/// One peer from the PEER_INDEX_TABLE.
#[derive(Debug, Clone, Serialize)]
pub struct Peer {
    /// Peer BGP identifier.
    pub bgp_id: Ipv4Addr,
    /// Peer IP address.
    pub ip_address: IpAddr,
    /// Peer AS number.
    #[serde(rename = "as")]
    pub asn: u32,
}

/// Decoded PEER_INDEX_TABLE message.
#[derive(Debug, Clone, Serialize)]
pub struct PeerIndexTable {
    /// Collector BGP identifier.
    pub collector_bgp_id: Ipv4Addr,
    /// Optional view name.
    pub view_name: String,
    /// Peers referenced by index from RIB entries.
    pub peers: Vec<Peer>,
}

/// One entry of a RIB message, attributes parsed.
#[derive(Debug, Clone, Serialize)]
pub struct RibEntryRaw {
    /// Index into the peer table.
    pub peer_index: u16,
    /// Seconds since the Unix epoch the route was originated at.
    pub originated_time: u32,
    /// ADDPATH path identifier, when the subtype carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_identifier: Option<u32>,
    /// Parsed BGP path attributes.
    pub path_attributes: RibAttributes,
}

/// Decoded RIB message (any RIB_* subtype).
#[derive(Debug, Clone)]
pub struct RibMessage {
    /// The subtype this message arrived as.
    pub subtype: TableDumpV2Subtype,
    /// Snapshot sequence number.
    pub sequence_number: u32,
    /// Address family of the prefix.
    pub afi: u16,
    /// Subsequent address family (1 unicast, 2 multicast).
    pub safi: u8,
    /// Prefix in `addr/len` form.
    pub prefix: String,
    /// Per-peer entries.
    pub entries: Vec<RibEntryRaw>,
}

/// A decoded TABLE_DUMPv2 message.
#[derive(Debug, Clone)]
pub struct MrtMessage {
    pub header: MrtHeader,
    pub body: MrtBody,
}

/// Message body by subtype. GEO_PEER_TABLE is recognized but its payload is
/// not decoded.
#[derive(Debug, Clone)]
pub enum MrtBody {
    PeerIndexTable(PeerIndexTable),
    Rib(RibMessage),
    GeoPeerTable,
}

/// Fail with a malformed-message error when fewer than `n` bytes remain.
pub(crate) fn need(buf: &&[u8], n: usize, what: &str) -> Result<(), MrtError> {
    if buf.remaining() < n {
        return Err(MrtError::Malformed(format!(
            "{what}: need {n} bytes, {} remain",
            buf.remaining()
        )));
    }
    Ok(())
}

/// Read a prefix (length octet + packed address bits) for the given family.
pub(crate) fn read_prefix(buf: &mut &[u8], afi: u16, what: &str) -> Result<String, MrtError> {
    need(buf, 1, what)?;
    let bits = buf.get_u8();
    let max_bits = match afi {
        AFI_IPV4 => 32,
        AFI_IPV6 => 128,
        other => {
            return Err(MrtError::Malformed(format!(
                "{what}: unknown address family {other}"
            )))
        }
    };
    if bits > max_bits {
        return Err(MrtError::Malformed(format!(
            "{what}: prefix length {bits} exceeds {max_bits}"
        )));
    }
    let nbytes = (bits as usize).div_ceil(8);
    need(buf, nbytes, what)?;
    let addr: IpAddr = if afi == AFI_IPV4 {
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets[..nbytes]);
        Ipv4Addr::from(octets).into()
    } else {
        let mut octets = [0u8; 16];
        buf.copy_to_slice(&mut octets[..nbytes]);
        std::net::Ipv6Addr::from(octets).into()
    };
    Ok(format!("{addr}/{bits}"))
}

/// Parse a message body according to its header.
pub(crate) fn parse_body(header: &MrtHeader, body: &[u8]) -> Result<MrtBody, MrtError> {
    if header.mrt_type != TABLE_DUMP_V2 {
        return Err(MrtError::UnsupportedType(header.mrt_type));
    }
    let subtype = TableDumpV2Subtype::from_code(header.subtype)
        .ok_or(MrtError::UnsupportedSubtype(header.subtype))?;
    let mut buf = body;
    match subtype {
        TableDumpV2Subtype::PeerIndexTable => {
            Ok(MrtBody::PeerIndexTable(parse_peer_index_table(&mut buf)?))
        }
        TableDumpV2Subtype::GeoPeerTable => Ok(MrtBody::GeoPeerTable),
        _ => Ok(MrtBody::Rib(parse_rib(&mut buf, subtype)?)),
    }
}

fn parse_peer_index_table(buf: &mut &[u8]) -> Result<PeerIndexTable, MrtError> {
    need(buf, 4, "peer index table collector id")?;
    let collector_bgp_id = Ipv4Addr::from(buf.get_u32());

    need(buf, 2, "peer index table view name length")?;
    let name_len = buf.get_u16() as usize;
    need(buf, name_len, "peer index table view name")?;
    let view_name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
    buf.advance(name_len);

    need(buf, 2, "peer index table peer count")?;
    let peer_count = buf.get_u16() as usize;

    let mut peers = Vec::with_capacity(peer_count);
    for _ in 0..peer_count {
        need(buf, 5, "peer entry")?;
        let peer_type = buf.get_u8();
        let bgp_id = Ipv4Addr::from(buf.get_u32());

        let ip_address: IpAddr = if peer_type & PEER_TYPE_IPV6 != 0 {
            need(buf, 16, "peer IPv6 address")?;
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            std::net::Ipv6Addr::from(octets).into()
        } else {
            need(buf, 4, "peer IPv4 address")?;
            Ipv4Addr::from(buf.get_u32()).into()
        };

        let asn = if peer_type & PEER_TYPE_AS4 != 0 {
            need(buf, 4, "peer AS number")?;
            buf.get_u32()
        } else {
            need(buf, 2, "peer AS number")?;
            u32::from(buf.get_u16())
        };

        peers.push(Peer {
            bgp_id,
            ip_address,
            asn,
        });
    }

    Ok(PeerIndexTable {
        collector_bgp_id,
        view_name,
        peers,
    })
}

fn parse_rib(buf: &mut &[u8], subtype: TableDumpV2Subtype) -> Result<RibMessage, MrtError> {
    need(buf, 4, "RIB sequence number")?;
    let sequence_number = buf.get_u32();

    let (afi, safi) = match (subtype.fixed_afi(), subtype.fixed_safi()) {
        (Some(afi), Some(safi)) => (afi, safi),
        _ => {
            // RIB_GENERIC carries the family in the body.
            need(buf, 3, "RIB_GENERIC family")?;
            (buf.get_u16(), buf.get_u8())
        }
    };

    let prefix = read_prefix(buf, afi, "RIB prefix")?;

    need(buf, 2, "RIB entry count")?;
    let entry_count = buf.get_u16() as usize;

    let mut entries = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        need(buf, 6, "RIB entry")?;
        let peer_index = buf.get_u16();
        let originated_time = buf.get_u32();

        let path_identifier = if subtype.is_addpath() {
            need(buf, 4, "RIB entry path identifier")?;
            Some(buf.get_u32())
        } else {
            None
        };

        need(buf, 2, "RIB entry attribute length")?;
        let attr_len = buf.get_u16() as usize;
        need(buf, attr_len, "RIB entry attributes")?;
        let path_attributes = parse_attributes(&buf[..attr_len])?;
        buf.advance(attr_len);

        entries.push(RibEntryRaw {
            peer_index,
            originated_time,
            path_identifier,
            path_attributes,
        });
    }

    Ok(RibMessage {
        subtype,
        sequence_number,
        afi,
        safi,
        prefix,
        entries,
    })
}
