//! ABOUTME: Core error types and tracing utilities
//! ABOUTME: Foundation crate used by all other exporter components

pub mod error;
pub mod telemetry;

pub use error::{Error, Result};

/// Service name used in log output and the HTTP user agent
pub const SERVICE_NAME: &str = "social-media-user-exporter";
