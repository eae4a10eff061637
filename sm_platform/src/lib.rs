//! ABOUTME: Social media platform adapters that feed the metric registry
//! ABOUTME: Validates sources, probes remote accounts and fetches follower counts

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sm_obs::MetricRegistry;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod sources;
pub mod twitter;
pub mod youtube;

pub use sources::build_adapters;
pub use twitter::{TwitterAdapter, TwitterFactory, TwitterSource};
pub use youtube::{YouTubeAdapter, YouTubeFactory, YouTubeSource};

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors that can occur while constructing or polling a source
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Invalid {platform} source configuration: {message}")]
    InvalidConfig { platform: Platform, message: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unexpected response data: {0}")]
    Data(String),
    #[error("Probe failed for {platform} source {source_id}: {cause}")]
    Probe {
        platform: Platform,
        source_id: String,
        #[source]
        cause: Box<PlatformError>,
    },
    #[error("Fetch failed for {platform} source {source_id}: {cause}")]
    Fetch {
        platform: Platform,
        source_id: String,
        #[source]
        cause: Box<PlatformError>,
    },
    #[error("Metrics error: {0}")]
    Metrics(#[from] sm_core::Error),
}

impl PlatformError {
    pub(crate) fn probe(platform: Platform, source_id: &str, cause: PlatformError) -> Self {
        PlatformError::Probe {
            platform,
            source_id: source_id.to_string(),
            cause: Box::new(cause),
        }
    }

    pub(crate) fn fetch(platform: Platform, source_id: &str, cause: PlatformError) -> Self {
        PlatformError::Fetch {
            platform,
            source_id: source_id.to_string(),
            cause: Box::new(cause),
        }
    }

    pub(crate) fn invalid_config(platform: Platform, errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();

        PlatformError::InvalidConfig {
            platform,
            message: messages.join(", "),
        }
    }

    /// Map a non-success HTTP status onto an error kind
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => PlatformError::Auth(format!("{}: {}", status, body)),
            404 => PlatformError::NotFound(body),
            code => PlatformError::Api { status: code, body },
        }
    }
}

/// Supported platform kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    YouTube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polled account on one platform
///
/// Implementations own the gauges they registered and are the only writers
/// of those gauges. A failed fetch must leave every gauge at its last value.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Query the remote platform once and publish the fresh counters
    async fn fetch(&self) -> Result<()>;

    fn platform(&self) -> Platform;

    /// Stable identifier of the account (screen name, channel id)
    fn source_id(&self) -> &str;
}

/// Builds ready-to-poll adapters for one platform
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    fn platform(&self) -> Platform;

    /// Validate, probe and register gauges for one account
    async fn create(
        &self,
        identifier: &str,
        registry: &MetricRegistry,
    ) -> Result<Arc<dyn SourceAdapter>>;
}

/// Convert an API counter to a gauge value
pub(crate) fn count_to_gauge(value: u64) -> f64 {
    value as f64
}
