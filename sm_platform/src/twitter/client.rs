//! ABOUTME: Twitter REST API client for user profile lookups
//! ABOUTME: Signs each request with OAuth 1.0a user credentials

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::oauth::OAuth1Signer;
use crate::{PlatformError, Result};

/// Public counters of a Twitter user, as returned by `users/show`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TwitterUser {
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    pub followers_count: u64,
    pub friends_count: u64,
    pub statuses_count: u64,
    pub favourites_count: u64,
}

/// Remote operations the Twitter adapter needs
#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// Look up one user by screen name
    async fn show_user(&self, screen_name: &str) -> Result<TwitterUser>;
}

/// HTTP implementation of [`TwitterApi`]
#[derive(Debug)]
pub struct HttpTwitterClient {
    client: Client,
    base_url: String,
    signer: OAuth1Signer,
}

impl HttpTwitterClient {
    pub fn new(base_url: &str, signer: OAuth1Signer) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("{}/{}", sm_core::SERVICE_NAME, env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, base_url, signer))
    }

    /// Create client with a custom reqwest client
    pub fn with_client(client: Client, base_url: &str, signer: OAuth1Signer) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        }
    }
}

#[async_trait]
impl TwitterApi for HttpTwitterClient {
    async fn show_user(&self, screen_name: &str) -> Result<TwitterUser> {
        let url = format!("{}/1.1/users/show.json", self.base_url);
        let params = [("screen_name", screen_name)];

        debug!(screen_name = %screen_name, url = %url, "Requesting Twitter user");

        let authorization = self.signer.authorization("GET", &url, &params)?;
        let response = self
            .client
            .get(&url)
            .query(&params)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(PlatformError::from_status(status, body));
        }

        serde_json::from_str(&body).map_err(|e| {
            PlatformError::Data(format!("Failed to parse Twitter user response: {}", e))
        })
    }
}
