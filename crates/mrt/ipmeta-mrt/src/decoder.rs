//! MRT stream decoding: framing loop and RIB entry flattening.

use crate::attributes::RibAttributes;
use crate::message::{
    parse_body, MrtBody, MrtHeader, MrtMessage, Peer, MRT_COMMON_HEADER_LEN,
};
use chrono::{DateTime, Utc};
use ipmeta_error::MrtError;
use serde::Serialize;
use std::io::{BufReader, Read};
use std::net::{IpAddr, Ipv4Addr};

/// Read as many bytes as possible into `buf`, retrying on interruption.
///
/// Returns the number of bytes read; fewer than `buf.len()` means EOF.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Iterate raw TABLE_DUMPv2 messages from a byte stream.
///
/// EOF at a message boundary ends iteration cleanly; EOF inside a header or
/// body is [`MrtError::Truncated`]. The callback may abort iteration by
/// returning an error.
pub fn read_messages<R, F>(reader: R, mut cb: F) -> Result<(), MrtError>
where
    R: Read,
    F: FnMut(MrtMessage) -> Result<(), MrtError>,
{
    let mut reader = BufReader::new(reader);
    loop {
        let mut raw_header = [0u8; MRT_COMMON_HEADER_LEN];
        let n = read_fully(&mut reader, &mut raw_header)?;
        if n == 0 {
            return Ok(());
        }
        if n < raw_header.len() {
            return Err(MrtError::Truncated);
        }
        let header = MrtHeader::parse(&raw_header);

        let mut body = vec![0u8; header.length as usize];
        if read_fully(&mut reader, &mut body)? < body.len() {
            return Err(MrtError::Truncated);
        }

        let body = parse_body(&header, &body)?;
        cb(MrtMessage { header, body })?;
    }
}

/// The peer a RIB entry was learned from.
#[derive(Debug, Clone, Serialize)]
pub struct PeerRef {
    #[serde(rename = "as")]
    pub asn: u32,
    pub bgp_id: Ipv4Addr,
    pub address: IpAddr,
}

/// One flattened RIB entry: prefix, originating peer, and attributes.
#[derive(Debug, Clone, Serialize)]
pub struct RibEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub sub_type: String,
    pub sequence_number: u32,
    pub prefix: String,
    pub peer: PeerRef,
    pub afi: u16,
    pub peer_index: u16,
    pub originated_time: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_identifier: Option<u32>,
    pub attributes: RibAttributes,
}

fn timestamp(secs: u32) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(i64::from(secs), 0).unwrap_or_default()
}

/// Iterate flattened RIB entries from a TABLE_DUMPv2 stream.
///
/// The peer index table must precede any RIB message; entries referencing a
/// peer outside the table are fatal. GEO_PEER_TABLE messages are skipped.
pub fn read_rib_entries<R, F>(reader: R, mut cb: F) -> Result<(), MrtError>
where
    R: Read,
    F: FnMut(RibEntry) -> Result<(), MrtError>,
{
    let mut peers: Option<Vec<Peer>> = None;

    read_messages(reader, |message| {
        let rib = match message.body {
            MrtBody::PeerIndexTable(table) => {
                peers = Some(table.peers);
                return Ok(());
            }
            MrtBody::GeoPeerTable => return Ok(()),
            MrtBody::Rib(rib) => rib,
        };

        let peers = peers.as_deref().ok_or(MrtError::MissingPeerIndexTable)?;

        for entry in rib.entries {
            let peer = peers.get(entry.peer_index as usize).ok_or(
                MrtError::InvalidPeerIndex {
                    index: entry.peer_index,
                    peers: peers.len(),
                },
            )?;

            cb(RibEntry {
                kind: "table_dump_v2".to_string(),
                sub_type: rib.subtype.name().to_string(),
                sequence_number: rib.sequence_number,
                prefix: rib.prefix.clone(),
                peer: PeerRef {
                    asn: peer.asn,
                    bgp_id: peer.bgp_id,
                    address: peer.ip_address,
                },
                afi: rib.afi,
                peer_index: entry.peer_index,
                originated_time: timestamp(entry.originated_time),
                timestamp: timestamp(message.header.timestamp),
                path_identifier: entry.path_identifier,
                attributes: entry.path_attributes,
            })?;
        }
        Ok(())
    })
}

#[cfg(test)]
pub mod test_support {
    //! Builders for synthetic TABLE_DUMPv2 byte streams.

    use super::*;
    use crate::message::TABLE_DUMP_V2;
    use std::net::Ipv6Addr;

    pub fn message(subtype: u16, body: &[u8]) -> Vec<u8> {
        message_with_type(TABLE_DUMP_V2, subtype, body)
    }

    pub fn message_with_type(mrt_type: u16, subtype: u16, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(MRT_COMMON_HEADER_LEN + body.len());
        out.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        out.extend_from_slice(&mrt_type.to_be_bytes());
        out.extend_from_slice(&subtype.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    pub fn peer_index_table(peers: &[(Ipv4Addr, IpAddr, u32)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&Ipv4Addr::new(10, 0, 0, 1).octets());
        let view = b"test-view";
        body.extend_from_slice(&(view.len() as u16).to_be_bytes());
        body.extend_from_slice(view);
        body.extend_from_slice(&(peers.len() as u16).to_be_bytes());
        for (bgp_id, address, asn) in peers {
            let v6 = address.is_ipv6();
            body.push(if v6 { 0x03 } else { 0x02 }); // AS4, address family bit
            body.extend_from_slice(&bgp_id.octets());
            match address {
                IpAddr::V4(v4) => body.extend_from_slice(&v4.octets()),
                IpAddr::V6(v6) => body.extend_from_slice(&v6.octets()),
            }
            body.extend_from_slice(&asn.to_be_bytes());
        }
        message(1, &body)
    }

    pub fn as_path_attribute(asns: &[u32]) -> Vec<u8> {
        let mut value = vec![2u8, asns.len() as u8]; // AS_SEQUENCE
        for asn in asns {
            value.extend_from_slice(&asn.to_be_bytes());
        }
        let mut out = vec![0x40, 2, value.len() as u8];
        out.extend_from_slice(&value);
        out
    }

    pub fn origin_attribute(value: u8) -> Vec<u8> {
        vec![0x40, 1, 1, value]
    }

    pub fn next_hop_attribute(addr: Ipv4Addr) -> Vec<u8> {
        let mut out = vec![0x40, 3, 4];
        out.extend_from_slice(&addr.octets());
        out
    }

    pub fn rib_body(
        sequence: u32,
        prefix_bits: u8,
        prefix_octets: &[u8],
        entries: &[(u16, u32, Option<u32>, Vec<u8>)],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&sequence.to_be_bytes());
        body.push(prefix_bits);
        body.extend_from_slice(prefix_octets);
        body.extend_from_slice(&(entries.len() as u16).to_be_bytes());
        for (peer_index, originated, path_id, attrs) in entries {
            body.extend_from_slice(&peer_index.to_be_bytes());
            body.extend_from_slice(&originated.to_be_bytes());
            if let Some(id) = path_id {
                body.extend_from_slice(&id.to_be_bytes());
            }
            body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
            body.extend_from_slice(attrs);
        }
        body
    }

    /// A v4 unicast RIB message with a single entry for peer 0.
    pub fn rib_v4_unicast(prefix_bits: u8, prefix_octets: &[u8], attrs: Vec<u8>) -> Vec<u8> {
        message(2, &rib_body(1, prefix_bits, prefix_octets, &[(0, 1_600_000_000, None, attrs)]))
    }

    /// A v6 unicast RIB message with a single entry for peer 0.
    pub fn rib_v6_unicast(prefix_bits: u8, prefix_octets: &[u8], attrs: Vec<u8>) -> Vec<u8> {
        message(4, &rib_body(1, prefix_bits, prefix_octets, &[(0, 1_600_000_000, None, attrs)]))
    }

    pub fn default_peers() -> Vec<u8> {
        peer_index_table(&[
            (
                Ipv4Addr::new(10, 0, 0, 2),
                IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)),
                3356,
            ),
            (
                Ipv4Addr::new(10, 0, 0, 3),
                IpAddr::V6("2001:db8::1".parse::<Ipv6Addr>().unwrap()),
                13335,
            ),
        ])
    }
}
