//! Shared types for the ipmeta pipeline.
//!
//! The unit of work flowing between pipeline stages is an [`IpRecord`]: the
//! parsed IP address plus the mutable field map that annotators write into.

pub mod record;

pub use record::{CodecConfig, InputFormat, IpRecord};

/// Fixed output field the IP string is written under in bare-IP mode.
pub const IP_OUTPUT_FIELD: &str = "ip";

/// Default name of the JSON field carrying the IP address in structured mode.
pub const DEFAULT_IP_FIELD: &str = "ip";

/// Default reserved annotation field name.
pub const DEFAULT_ANNOTATION_FIELD: &str = "zannotate";
