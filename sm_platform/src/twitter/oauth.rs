//! OAuth 1.0a request signing (HMAC-SHA1) for the Twitter REST API.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{PlatformError, Result};

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

/// RFC 3986 percent encoding, leaving only `A-Za-z0-9-._~` untouched
fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Signs requests on behalf of one user token
#[derive(Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
    token: String,
    token_secret: String,
}

impl std::fmt::Debug for OAuth1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Signer")
            .field("consumer_key", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl OAuth1Signer {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: token.into(),
            token_secret: token_secret.into(),
        }
    }

    /// Build the `Authorization` header for a request
    ///
    /// `params` are the query (and form body) parameters sent with it.
    pub fn authorization(&self, method: &str, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PlatformError::Auth(format!("System clock before epoch: {}", e)))?
            .as_secs();

        self.authorization_with(method, url, params, &nonce, timestamp)
    }

    pub fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: u64,
    ) -> Result<String> {
        let timestamp = timestamp.to_string();
        let mut oauth_params = self.oauth_params(nonce, &timestamp);

        let signature = self.sign(method, url, params, &oauth_params)?;
        oauth_params.push(("oauth_signature", signature));
        oauth_params.sort();

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }

    fn oauth_params(&self, nonce: &str, timestamp: &str) -> Vec<(&'static str, String)> {
        vec![
            ("oauth_consumer_key", self.consumer_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_token", self.token.clone()),
            ("oauth_version", OAUTH_VERSION.to_string()),
        ]
    }

    fn signature_base(
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        oauth_params: &[(&'static str, String)],
    ) -> String {
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .chain(
                oauth_params
                    .iter()
                    .map(|(k, v)| (percent_encode(k), percent_encode(v))),
            )
            .collect();
        encoded.sort();

        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}&{}&{}",
            method.to_uppercase(),
            percent_encode(url),
            percent_encode(&param_string)
        )
    }

    fn sign(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        oauth_params: &[(&'static str, String)],
    ) -> Result<String> {
        let base = Self::signature_base(method, url, params, oauth_params);
        let key = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(&self.token_secret)
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| PlatformError::Auth(format!("Invalid signing key: {}", e)))?;
        mac.update(base.as_bytes());

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}
