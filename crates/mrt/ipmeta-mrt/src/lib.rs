//! MRT TABLE_DUMPv2 decoder (RFC 6396).
//!
//! Consumes a byte stream of concatenated MRT messages and exposes two
//! callback-based iteration surfaces:
//!
//! - [`read_messages`] yields raw decoded messages (the peer index table and
//!   RIB messages with every attribute preserved), the shape the `mrt2json`
//!   exporter serializes directly.
//! - [`read_rib_entries`] flattens RIB messages into one [`RibEntry`] per
//!   (prefix, peer) pair with the originating peer joined in, the shape the
//!   routing lookup table is built from.
//!
//! Only TABLE_DUMPv2 snapshots are accepted. Truncation at a message
//! boundary is a clean end of stream; truncation mid-message is a format
//! error.

pub mod attributes;
pub mod decoder;
pub mod message;

pub use attributes::{Aggregator, MpReachNlri, MpUnreachNlri, RibAttributes};
pub use decoder::{read_messages, read_rib_entries, PeerRef, RibEntry};
pub use ipmeta_error::MrtError;
pub use message::{
    MrtBody, MrtHeader, MrtMessage, Peer, PeerIndexTable, RibEntryRaw, RibMessage,
    TableDumpV2Subtype, AFI_IPV4, AFI_IPV6, MRT_COMMON_HEADER_LEN, TABLE_DUMP_V2,
};
