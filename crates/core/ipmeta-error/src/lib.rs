//! Error types for ipmeta.
//!
//! This crate provides:
//! - [`IpmetaError`] - Top-level error enum for all pipeline errors
//! - Domain-specific errors ([`CodecError`], [`MrtError`], [`RoutingError`],
//!   [`AnnotateError`])
//!
//! The taxonomy follows the pipeline's failure policy: configuration problems
//! and input malformation are fatal, MRT format problems are fatal at build
//! time, and per-record adapter failures are never represented here at all
//! (an adapter that cannot produce data emits its no-data value instead of
//! an error).

use thiserror::Error;

/// Top-level error type for ipmeta.
#[derive(Error, Debug)]
pub enum IpmetaError {
    /// Record decode/encode errors (input malformation)
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// MRT decode errors (routing table build)
    #[error("MRT error: {0}")]
    Mrt(#[from] MrtError),

    /// Routing table errors
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Annotator configuration/initialization errors
    #[error("Annotator error: {0}")]
    Annotate(#[from] AnnotateError),

    /// Configuration errors surfaced before any record is processed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors on the input or output streams
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors (wrapped anyhow)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Record decode/encode errors.
///
/// Every variant carries the offending input line; malformed input is
/// operator error and the line is the diagnostic.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The line is not a parseable IP address
    #[error("invalid IP address in input: {line:?}")]
    InvalidIp { line: String },

    /// The line is not valid JSON
    #[error("unable to parse JSON record: {line:?}")]
    InvalidJson { line: String },

    /// The line parsed as JSON but is not an object
    #[error("JSON record is not an object: {line:?}")]
    NotAnObject { line: String },

    /// The configured IP field is absent
    #[error("unable to find IP field {field:?} in record: {line:?}")]
    MissingIpField { field: String, line: String },

    /// The configured IP field is present but not a string
    #[error("IP field {field:?} is not a string in record: {line:?}")]
    IpFieldNotString { field: String, line: String },

    /// The record already carries the reserved annotation field
    #[error("record already contains annotation field {field:?}: {line:?}")]
    AnnotationFieldPresent { field: String, line: String },

    /// Serialization of an output record failed
    #[error("unable to serialize output record: {0}")]
    Serialize(String),
}

/// MRT TABLE_DUMPv2 decode errors.
#[derive(Error, Debug)]
pub enum MrtError {
    /// I/O failure while reading the byte stream
    #[error("I/O error reading MRT stream: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended inside a message
    #[error("truncated MRT stream: unexpected end of input mid-message")]
    Truncated,

    /// Message type other than TABLE_DUMPv2
    #[error("unsupported MRT type {0} (only TABLE_DUMPv2 is accepted)")]
    UnsupportedType(u16),

    /// TABLE_DUMPv2 subtype the decoder does not recognize
    #[error("unsupported TABLE_DUMPv2 subtype {0}")]
    UnsupportedSubtype(u16),

    /// A RIB message arrived before any PEER_INDEX_TABLE
    #[error("RIB entry seen before PEER_INDEX_TABLE")]
    MissingPeerIndexTable,

    /// A RIB entry references a peer index outside the peer table
    #[error("invalid peer index {index} (peer table has {peers} peers)")]
    InvalidPeerIndex { index: u16, peers: usize },

    /// Malformed message header or body
    #[error("malformed MRT message: {0}")]
    Malformed(String),

    /// Malformed path attribute block
    #[error("malformed path attribute: {0}")]
    Attribute(String),
}

/// Routing lookup table errors.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// MRT decode failure during build
    #[error("MRT decode failed: {0}")]
    Mrt(#[from] MrtError),

    /// A prefix string that cannot be parsed as a network or address
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Malformed AS-name or AS-data input
    #[error("invalid AS table record: {0}")]
    AsTable(String),

    /// I/O failure reading a side-table stream
    #[error("I/O error reading AS table: {0}")]
    Io(#[from] std::io::Error),
}

/// Annotator configuration and lifecycle errors.
///
/// These surface at factory/worker initialization; per-record lookup
/// failures are data, not errors.
#[derive(Error, Debug)]
pub enum AnnotateError {
    /// Missing or invalid adapter configuration
    #[error("{0}")]
    Config(String),

    /// Backing database could not be opened or validated
    #[error("unable to open lookup database: {0}")]
    Database(String),

    /// Resolver handle could not be constructed
    #[error("unable to initialize resolver: {0}")]
    Resolver(String),
}

/// Result type alias using IpmetaError.
pub type Result<T> = std::result::Result<T, IpmetaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_carries_line() {
        let err = CodecError::InvalidIp {
            line: "not-an-ip".to_string(),
        };
        assert!(err.to_string().contains("not-an-ip"));
    }

    #[test]
    fn test_mrt_error_display() {
        let err = MrtError::InvalidPeerIndex {
            index: 9,
            peers: 3,
        };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('3'));

        let err = MrtError::UnsupportedType(16);
        assert!(err.to_string().contains("TABLE_DUMPv2"));
    }

    #[test]
    fn test_error_conversion() {
        let codec = CodecError::InvalidJson {
            line: "{".to_string(),
        };
        let top: IpmetaError = codec.into();
        assert!(matches!(top, IpmetaError::Codec(_)));

        let mrt = MrtError::Truncated;
        let routing: RoutingError = mrt.into();
        assert!(matches!(routing, RoutingError::Mrt(_)));
    }
}
