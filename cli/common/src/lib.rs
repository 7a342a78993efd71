//! Shared utilities for ipmeta CLI binaries.
//!
//! This crate provides common functionality shared between the
//! `ipmeta-annotate` and `ipmeta-mrt2json` CLI applications.

pub mod args;
pub mod format;
pub mod logging;

pub use args::LogLevel;
pub use format::format_number;
pub use logging::init_logging;
