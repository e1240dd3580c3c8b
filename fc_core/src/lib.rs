//! ABOUTME: Core types, errors, and tracing utilities
//! ABOUTME: Foundation crate used by all other framecast components

pub mod error;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use time::{file_stamp, now_rfc3339, to_rfc3339};
