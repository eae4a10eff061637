//! ABOUTME: YouTube source adapter and its factory
//! ABOUTME: Publishes subscribers, views and videos per channel

use async_trait::async_trait;
use sm_config::YouTubeCredentials;
use sm_obs::{GaugeHandle, GaugeSpec, Labels, MetricRegistry};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    count_to_gauge, AdapterFactory, Platform, PlatformError, Result, SourceAdapter,
};

pub mod client;

pub use client::{Channel, ChannelSnippet, ChannelStatistics, HttpYouTubeClient, YouTubeApi};

const GAUGE_COUNT: usize = 3;

/// Identifying and credential parameters for one YouTube channel
#[derive(Clone, Validate)]
pub struct YouTubeSource {
    #[validate(length(min = 1, message = "a channel ID is required"))]
    pub channel_id: String,
    #[validate(length(min = 1, message = "a client ID is required"))]
    pub client_id: String,
    #[validate(length(min = 1, message = "a client secret is required"))]
    pub client_secret: String,
    #[validate(length(min = 1, message = "an access token is required"))]
    pub access_token: String,
    #[validate(length(min = 1, message = "a refresh token is required"))]
    pub refresh_token: String,
}

impl YouTubeSource {
    pub fn new(channel_id: &str, credentials: &YouTubeCredentials) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            access_token: credentials.access_token.clone(),
            refresh_token: credentials.refresh_token.clone(),
        }
    }

    pub fn credentials(&self) -> YouTubeCredentials {
        YouTubeCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

impl fmt::Debug for YouTubeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeSource")
            .field("channel_id", &self.channel_id)
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

/// Parsed channel counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCounts {
    pub subscribers: u64,
    pub views: u64,
    pub videos: u64,
}

impl ChannelCounts {
    /// Parse every counter or none of them
    ///
    /// A channel that hides its subscriber count reports zero subscribers.
    pub fn from_channel(channel: &Channel) -> Result<Self> {
        let stats = channel.statistics.as_ref().ok_or_else(|| {
            PlatformError::Data(format!("Channel {} has no statistics", channel.id))
        })?;

        let parse = |field: &str, value: &Option<String>| -> Result<u64> {
            let raw = value.as_deref().ok_or_else(|| {
                PlatformError::Data(format!("Channel {} is missing {}", channel.id, field))
            })?;
            raw.parse::<u64>().map_err(|e| {
                PlatformError::Data(format!(
                    "Channel {} has invalid {} '{}': {}",
                    channel.id, field, raw, e
                ))
            })
        };

        let subscribers = match &stats.subscriber_count {
            None if stats.hidden_subscriber_count => 0,
            value => parse("subscriberCount", value)?,
        };

        Ok(Self {
            subscribers,
            views: parse("viewCount", &stats.view_count)?,
            videos: parse("videoCount", &stats.video_count)?,
        })
    }
}

struct YouTubeGauges {
    subscribers: GaugeHandle,
    views: GaugeHandle,
    videos: GaugeHandle,
}

impl YouTubeGauges {
    fn register(registry: &MetricRegistry, prefix: &str, labels: Labels) -> Result<Self> {
        let spec = |metric: &str, help: &str| {
            GaugeSpec::new(format!("{}youtube_{}", prefix, metric), help, labels.clone())
        };

        let handles = registry.register_gauges(vec![
            spec("subscribers", "The number of subscribers the channel has"),
            spec("views", "The number of views the channel has"),
            spec("videos", "The number of videos the channel has"),
        ])?;

        match <[GaugeHandle; GAUGE_COUNT]>::try_from(handles) {
            Ok([subscribers, views, videos]) => Ok(Self {
                subscribers,
                views,
                videos,
            }),
            Err(handles) => Err(PlatformError::Data(format!(
                "Expected {} YouTube gauges, registry issued {}",
                GAUGE_COUNT,
                handles.len()
            ))),
        }
    }

    fn publish(&self, counts: ChannelCounts) {
        self.subscribers.set(count_to_gauge(counts.subscribers));
        self.views.set(count_to_gauge(counts.views));
        self.videos.set(count_to_gauge(counts.videos));
    }
}

/// Polls one YouTube channel
pub struct YouTubeAdapter<C = HttpYouTubeClient> {
    client: C,
    channel_id: String,
    channel_name: String,
    gauges: YouTubeGauges,
}

impl<C: YouTubeApi> YouTubeAdapter<C> {
    /// Probe the channel once, resolve its title and register gauges
    pub async fn connect(
        channel_id: &str,
        client: C,
        registry: &MetricRegistry,
        prefix: &str,
    ) -> Result<Self> {
        let channel = client
            .find_channel(channel_id)
            .await
            .map_err(|e| PlatformError::probe(Platform::YouTube, channel_id, e))?
            .ok_or_else(|| {
                PlatformError::probe(
                    Platform::YouTube,
                    channel_id,
                    PlatformError::NotFound(format!(
                        "The authenticated user doesn't have access to the channel with ID {}",
                        channel_id
                    )),
                )
            })?;

        let channel_name = channel.title().to_string();
        debug!(
            channel_id = %channel_id,
            channel_name = %channel_name,
            "Verified YouTube channel"
        );

        let labels = Labels::new()
            .with("channel_id", channel_id)
            .with("channel_name", channel_name.as_str());
        let gauges = YouTubeGauges::register(registry, prefix, labels)?;

        Ok(Self {
            client,
            channel_id: channel_id.to_string(),
            channel_name,
            gauges,
        })
    }

    /// Display name resolved when the adapter was created
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    async fn poll(&self) -> Result<ChannelCounts> {
        let channel = self.client.find_channel(&self.channel_id).await?.ok_or_else(|| {
            PlatformError::NotFound(format!(
                "Channel {} is not owned by the authenticated user",
                self.channel_id
            ))
        })?;

        ChannelCounts::from_channel(&channel)
    }
}

#[async_trait]
impl<C: YouTubeApi> SourceAdapter for YouTubeAdapter<C> {
    async fn fetch(&self) -> Result<()> {
        let counts = self
            .poll()
            .await
            .map_err(|e| PlatformError::fetch(Platform::YouTube, &self.channel_id, e))?;

        self.gauges.publish(counts);

        debug!(
            channel_id = %self.channel_id,
            subscribers = counts.subscribers,
            "Updated YouTube gauges"
        );

        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn source_id(&self) -> &str {
        &self.channel_id
    }
}

/// Creates HTTP-backed YouTube adapters from shared credentials
#[derive(Debug, Clone)]
pub struct YouTubeFactory {
    credentials: YouTubeCredentials,
    api_url: String,
    token_url: String,
    prefix: String,
}

impl YouTubeFactory {
    pub fn new(
        credentials: YouTubeCredentials,
        api_url: &str,
        token_url: &str,
        prefix: &str,
    ) -> Self {
        Self {
            credentials,
            api_url: api_url.to_string(),
            token_url: token_url.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Validate the source, build its client, probe it and register gauges
    pub async fn connect(
        &self,
        channel_id: &str,
        registry: &MetricRegistry,
    ) -> Result<YouTubeAdapter<HttpYouTubeClient>> {
        let source = YouTubeSource::new(channel_id, &self.credentials);
        source
            .validate()
            .map_err(|e| PlatformError::invalid_config(Platform::YouTube, e))?;

        let client = HttpYouTubeClient::new(&self.api_url, &self.token_url, source.credentials())?;
        let adapter = YouTubeAdapter::connect(channel_id, client, registry, &self.prefix).await?;

        info!(
            channel_id = %channel_id,
            channel_name = %adapter.channel_name(),
            "YouTube source ready"
        );
        Ok(adapter)
    }
}

#[async_trait]
impl AdapterFactory for YouTubeFactory {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn create(
        &self,
        identifier: &str,
        registry: &MetricRegistry,
    ) -> Result<Arc<dyn SourceAdapter>> {
        let adapter = self.connect(identifier, registry).await?;
        Ok(Arc::new(adapter))
    }
}
