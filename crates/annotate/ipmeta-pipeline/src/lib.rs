//! Streaming annotation pipeline.
//!
//! The topology is a fixed linear chain of stages joined by bounded
//! channels:
//!
//! ```text
//! reader (1) → decoder (D) → annotator₁ (A₁) → … → annotatorₙ (Aₙ) → encoder (E) → writer (1)
//! ```
//!
//! Each pooled stage is fed by a round-robin router over one bounded queue
//! per worker; a full queue blocks the router and, transitively, the
//! reader, which is the backpressure path. Shutdown is driven by EOF: the
//! reader closes its queue, and each stage's output closes only once every
//! worker of that stage has returned and dropped its sender clone.
//!
//! Record order across the pipeline is not preserved; per-record annotator
//! chain order is.

pub mod codec;
pub mod pipeline;
pub mod stats;

pub use codec::{decode_line, encode_record};
pub use ipmeta_types::{CodecConfig, InputFormat, IpRecord};
pub use pipeline::{run, PipelineConfig};
pub use stats::{PipelineStats, StatsSnapshot};
