//! ABOUTME: Twitter source adapter and its factory
//! ABOUTME: Publishes likes, statuses, followers and friends per screen name

use async_trait::async_trait;
use sm_config::TwitterCredentials;
use sm_obs::{GaugeHandle, GaugeSpec, Labels, MetricRegistry};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    count_to_gauge, AdapterFactory, Platform, PlatformError, Result, SourceAdapter,
};

pub mod client;
pub mod oauth;

pub use client::{HttpTwitterClient, TwitterApi, TwitterUser};
pub use oauth::OAuth1Signer;

/// Identifying and credential parameters for one Twitter account
#[derive(Clone, Validate)]
pub struct TwitterSource {
    #[validate(length(min = 1, message = "a screen name is required"))]
    pub screen_name: String,
    #[validate(length(min = 1, message = "a client ID is required"))]
    pub client_id: String,
    #[validate(length(min = 1, message = "a client secret is required"))]
    pub client_secret: String,
    #[validate(length(min = 1, message = "an access token is required"))]
    pub access_token: String,
    #[validate(length(min = 1, message = "an access token secret is required"))]
    pub access_token_secret: String,
}

impl TwitterSource {
    pub fn new(screen_name: &str, credentials: &TwitterCredentials) -> Self {
        Self {
            screen_name: screen_name.to_string(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            access_token: credentials.access_token.clone(),
            access_token_secret: credentials.access_token_secret.clone(),
        }
    }

    pub fn signer(&self) -> OAuth1Signer {
        OAuth1Signer::new(
            &self.client_id,
            &self.client_secret,
            &self.access_token,
            &self.access_token_secret,
        )
    }
}

impl fmt::Debug for TwitterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterSource")
            .field("screen_name", &self.screen_name)
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

const GAUGE_COUNT: usize = 4;

/// Gauges published for every Twitter account
struct TwitterGauges {
    likes: GaugeHandle,
    statuses: GaugeHandle,
    followers: GaugeHandle,
    friends: GaugeHandle,
}

impl TwitterGauges {
    fn register(registry: &MetricRegistry, prefix: &str, screen_name: &str) -> Result<Self> {
        let labels = Labels::new().with("screen_name", screen_name);
        let spec = |metric: &str, help: &str| {
            GaugeSpec::new(format!("{}twitter_{}", prefix, metric), help, labels.clone())
        };

        let handles = registry.register_gauges(vec![
            spec("likes", "The number of likes the user has"),
            spec("statuses", "The number of statuses the user has"),
            spec("followers", "The number of followers the user has"),
            spec("friends", "The number of friends the user has"),
        ])?;

        match <[GaugeHandle; GAUGE_COUNT]>::try_from(handles) {
            Ok([likes, statuses, followers, friends]) => Ok(Self {
                likes,
                statuses,
                followers,
                friends,
            }),
            Err(handles) => Err(PlatformError::Data(format!(
                "Expected {} Twitter gauges, registry issued {}",
                GAUGE_COUNT,
                handles.len()
            ))),
        }
    }

    fn publish(&self, user: &TwitterUser) {
        self.likes.set(count_to_gauge(user.favourites_count));
        self.statuses.set(count_to_gauge(user.statuses_count));
        self.followers.set(count_to_gauge(user.followers_count));
        self.friends.set(count_to_gauge(user.friends_count));
    }
}

/// Polls one Twitter account
pub struct TwitterAdapter<C = HttpTwitterClient> {
    client: C,
    screen_name: String,
    gauges: TwitterGauges,
}

impl<C: TwitterApi> TwitterAdapter<C> {
    /// Probe the account once, then register its gauges
    ///
    /// Nothing is registered when the probe fails.
    pub async fn connect(
        screen_name: &str,
        client: C,
        registry: &MetricRegistry,
        prefix: &str,
    ) -> Result<Self> {
        let user = client
            .show_user(screen_name)
            .await
            .map_err(|e| PlatformError::probe(Platform::Twitter, screen_name, e))?;

        debug!(
            screen_name = %screen_name,
            name = %user.name,
            "Verified Twitter screen name"
        );

        let gauges = TwitterGauges::register(registry, prefix, screen_name)?;

        Ok(Self {
            client,
            screen_name: screen_name.to_string(),
            gauges,
        })
    }
}

#[async_trait]
impl<C: TwitterApi> SourceAdapter for TwitterAdapter<C> {
    async fn fetch(&self) -> Result<()> {
        let user = self
            .client
            .show_user(&self.screen_name)
            .await
            .map_err(|e| PlatformError::fetch(Platform::Twitter, &self.screen_name, e))?;

        self.gauges.publish(&user);

        debug!(
            screen_name = %self.screen_name,
            followers = user.followers_count,
            "Updated Twitter gauges"
        );

        Ok(())
    }

    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn source_id(&self) -> &str {
        &self.screen_name
    }
}

/// Creates HTTP-backed Twitter adapters from shared credentials
#[derive(Debug, Clone)]
pub struct TwitterFactory {
    credentials: TwitterCredentials,
    api_url: String,
    prefix: String,
}

impl TwitterFactory {
    pub fn new(credentials: TwitterCredentials, api_url: &str, prefix: &str) -> Self {
        Self {
            credentials,
            api_url: api_url.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Validate the source, build its client, probe it and register gauges
    pub async fn connect(
        &self,
        screen_name: &str,
        registry: &MetricRegistry,
    ) -> Result<TwitterAdapter<HttpTwitterClient>> {
        let source = TwitterSource::new(screen_name, &self.credentials);
        source
            .validate()
            .map_err(|e| PlatformError::invalid_config(Platform::Twitter, e))?;

        let client = HttpTwitterClient::new(&self.api_url, source.signer())?;
        let adapter = TwitterAdapter::connect(screen_name, client, registry, &self.prefix).await?;

        info!(screen_name = %screen_name, "Twitter source ready");
        Ok(adapter)
    }
}

#[async_trait]
impl AdapterFactory for TwitterFactory {
    fn platform(&self) -> Platform {
        Platform::Twitter
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
