//! ABOUTME: YouTube Data API client for channel statistics
//! ABOUTME: Refreshes OAuth2 access tokens and caches them until expiry

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sm_config::YouTubeCredentials;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{PlatformError, Result};

/// Tokens are refreshed this long before the server-side expiry
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Channel resource as returned by `channels.list`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<ChannelSnippet>,
    #[serde(default)]
    pub statistics: Option<ChannelStatistics>,
}

impl Channel {
    pub fn title(&self) -> &str {
        self.snippet.as_ref().map(|s| s.title.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelSnippet {
    pub title: String,
}

/// Counters arrive as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    pub view_count: Option<String>,
    pub subscriber_count: Option<String>,
    pub video_count: Option<String>,
    #[serde(default)]
    pub hidden_subscriber_count: bool,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Remote operations the YouTube adapter needs
#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// Fetch a channel visible to the authenticated user, `None` if absent
    async fn find_channel(&self, channel_id: &str) -> Result<Option<Channel>>;
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        !self.value.is_empty() && Instant::now() < self.expires_at
    }
}

/// HTTP implementation of [`YouTubeApi`]
pub struct HttpYouTubeClient {
    client: Client,
    api_url: String,
    token_url: String,
    credentials: YouTubeCredentials,
    token: Mutex<AccessToken>,
}

impl std::fmt::Debug for HttpYouTubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpYouTubeClient")
            .field("api_url", &self.api_url)
            .field("token_url", &self.token_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl HttpYouTubeClient {
    pub fn new(api_url: &str, token_url: &str, credentials: YouTubeCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("{}/{}", sm_core::SERVICE_NAME, env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, api_url, token_url, credentials))
    }

    /// Create client with a custom reqwest client
    ///
    /// The configured access token is treated as already expired, so the
    /// first request always performs a refresh.
    pub fn with_client(
        client: Client,
        api_url: &str,
        token_url: &str,
        credentials: YouTubeCredentials,
    ) -> Self {
        let token = AccessToken {
            value: credentials.access_token.clone(),
            expires_at: Instant::now(),
        };

        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            credentials,
            token: Mutex::new(token),
        }
    }

    /// Return a valid access token, refreshing it when stale
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if token.is_fresh() {
            return Ok(token.value.clone());
        }

        debug!(token_url = %self.token_url, "Refreshing YouTube access token");

        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.client.post(&self.token_url).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PlatformError::Auth(format!(
                "Token refresh failed with {}: {}",
                status, body
            )));
        }

        let refreshed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| PlatformError::Auth(format!("Failed to parse token response: {}", e)))?;

        let lifetime = Duration::from_secs(refreshed.expires_in.unwrap_or(3600));
        token.value = refreshed.access_token;
        token.expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW);

        info!(expires_in_secs = lifetime.as_secs(), "YouTube access token refreshed");
        Ok(token.value.clone())
    }

    async fn invalidate_token(&self) {
        self.token.lock().await.expires_at = Instant::now();
    }
}

#[async_trait]
impl YouTubeApi for HttpYouTubeClient {
    async fn find_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let access_token = self.access_token().await?;
        let url = format!("{}/youtube/v3/channels", self.api_url);

        debug!(channel_id = %channel_id, url = %url, "Requesting YouTube channel");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", channel_id),
            ])
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.invalidate_token().await;
            }
            return Err(PlatformError::from_status(status, body));
        }

        let list: ChannelListResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Data(format!("Failed to parse channel list response: {}", e))
        })?;

        Ok(list.items.into_iter().find(|c| c.id == channel_id))
    }
}
