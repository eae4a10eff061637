//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles exporter settings from SMUE_ environment variables and files

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use sm_core::{Error, Result};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Environment variable prefix, e.g. `SMUE_HTTP_PORT`
pub const ENV_PREFIX: &str = "SMUE";

pub const DEFAULT_TWITTER_API_URL: &str = "https://api.twitter.com";
pub const DEFAULT_YOUTUBE_API_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_YOUTUBE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Main configuration struct
///
/// Keys are flat so every field maps onto exactly one `SMUE_*` variable.
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(length(min = 1))]
    pub http_host: String,
    #[validate(range(min = 1, max = 65535))]
    pub http_port: u16,
    /// Scrape path without the leading slash
    #[validate(length(min = 1))]
    pub http_path: String,
    pub metrics_prefix: String,
    #[validate(range(min = 1, max = 86400))]
    pub interval_seconds: u64,
    /// Run the fetches of one poll cycle concurrently
    pub parallel_fetch: bool,

    pub twitter_client_id: String,
    pub twitter_client_secret: String,
    pub twitter_access_token: String,
    pub twitter_access_token_secret: String,
    pub twitter_screen_names: String,
    #[validate(url)]
    pub twitter_api_url: String,

    pub youtube_client_id: String,
    pub youtube_client_secret: String,
    pub youtube_access_token: String,
    pub youtube_refresh_token: String,
    pub youtube_channel_ids: String,
    #[validate(url)]
    pub youtube_api_url: String,
    #[validate(url)]
    pub youtube_token_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 9100,
            http_path: "metrics".to_string(),
            metrics_prefix: "social_media_user_".to_string(),
            interval_seconds: 300,
            parallel_fetch: false,
            twitter_client_id: String::new(),
            twitter_client_secret: String::new(),
            twitter_access_token: String::new(),
            twitter_access_token_secret: String::new(),
            twitter_screen_names: String::new(),
            twitter_api_url: DEFAULT_TWITTER_API_URL.to_string(),
            youtube_client_id: String::new(),
            youtube_client_secret: String::new(),
            youtube_access_token: String::new(),
            youtube_refresh_token: String::new(),
            youtube_channel_ids: String::new(),
            youtube_api_url: DEFAULT_YOUTUBE_API_URL.to_string(),
            youtube_token_url: DEFAULT_YOUTUBE_TOKEN_URL.to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("http_path", &self.http_path)
            .field("metrics_prefix", &self.metrics_prefix)
            .field("interval_seconds", &self.interval_seconds)
            .field("parallel_fetch", &self.parallel_fetch)
            .field("twitter", &self.twitter_credentials())
            .field("twitter_screen_names", &self.twitter_screen_names)
            .field("twitter_api_url", &self.twitter_api_url)
            .field("youtube", &self.youtube_credentials())
            .field("youtube_channel_ids", &self.youtube_channel_ids)
            .field("youtube_api_url", &self.youtube_api_url)
            .field("youtube_token_url", &self.youtube_token_url)
            .finish()
    }
}

/// Twitter OAuth 1.0a credential bundle
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TwitterCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &redact(&self.client_secret))
            .field("access_token", &redact(&self.access_token))
            .field("access_token_secret", &redact(&self.access_token_secret))
            .finish()
    }
}

/// YouTube OAuth 2.0 credential bundle
#[derive(Clone, Default, PartialEq, Eq)]
pub struct YouTubeCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for YouTubeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeCredentials")
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &redact(&self.client_secret))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "[EMPTY]"
    } else {
        "[REDACTED]"
    }
}

/// Split a comma separated identifier list, dropping blank entries
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Routes the exporter serves besides the scrape path
pub const RESERVED_PATHS: [&str; 2] = ["healthz", "readyz"];

/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_valid_metric_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        None => true,
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        Some(_) => false,
    }
}

impl Config {
    /// Load configuration from `smue.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading `path` as a required file when given
    ///
    /// Precedence: defaults, then the file, then `SMUE_*` variables.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("smue").required(false)),
        };

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed.check()?;

        Ok(parsed)
    }

    /// Run all validation rules
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        if !is_valid_metric_prefix(&self.metrics_prefix) {
            return Err(Error::Config(format!(
                "Config validation failed: metric prefix '{}' is not a valid metric name",
                self.metrics_prefix
            )));
        }

        let route = self.http_path.trim_matches('/');
        if RESERVED_PATHS.contains(&route) {
            return Err(Error::Config(format!(
                "Config validation failed: http_path '{}' collides with the /{} endpoint",
                self.http_path, route
            )));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Address the exporter binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Scrape route with its leading slash
    pub fn scrape_route(&self) -> String {
        format!("/{}", self.http_path.trim_start_matches('/'))
    }

    pub fn twitter_credentials(&self) -> TwitterCredentials {
        TwitterCredentials {
            client_id: self.twitter_client_id.clone(),
            client_secret: self.twitter_client_secret.clone(),
            access_token: self.twitter_access_token.clone(),
            access_token_secret: self.twitter_access_token_secret.clone(),
        }
    }

    pub fn youtube_credentials(&self) -> YouTubeCredentials {
        YouTubeCredentials {
            client_id: self.youtube_client_id.clone(),
            client_secret: self.youtube_client_secret.clone(),
            access_token: self.youtube_access_token.clone(),
            refresh_token: self.youtube_refresh_token.clone(),
        }
    }

    pub fn twitter_screen_names(&self) -> Vec<String> {
        split_list(&self.twitter_screen_names)
    }

    pub fn youtube_channel_ids(&self) -> Vec<String> {
        split_list(&self.youtube_channel_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SMUE_HTTP_PORT",
        "SMUE_HTTP_PATH",
        "SMUE_METRICS_PREFIX",
        "SMUE_INTERVAL_SECONDS",
        "SMUE_PARALLEL_FETCH",
        "SMUE_TWITTER_CLIENT_ID",
        "SMUE_TWITTER_SCREEN_NAMES",
        "SMUE_YOUTUBE_CHANNEL_IDS",
        "SMUE_YOUTUBE_REFRESH_TOKEN",
    ];

    fn clear_env() {
        for key in VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load().expect("Should load with defaults");

        assert_eq!(config.http_port, 9100);
        assert_eq!(config.http_path, "metrics");
        assert_eq!(config.metrics_prefix, "social_media_user_");
        assert_eq!(config.interval(), Duration::from_secs(300));
        assert!(!config.parallel_fetch);
        assert!(config.twitter_screen_names().is_empty());
        assert!(config.youtube_channel_ids().is_empty());
        assert_eq!(config.scrape_route(), "/metrics");
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("SMUE_HTTP_PORT", "9200");
        env::set_var("SMUE_HTTP_PATH", "scrape");
        env::set_var("SMUE_INTERVAL_SECONDS", "60");
        env::set_var("SMUE_PARALLEL_FETCH", "true");
        env::set_var("SMUE_TWITTER_CLIENT_ID", "0042");
        env::set_var("SMUE_TWITTER_SCREEN_NAMES", "alice, bob,,");
        env::set_var("SMUE_YOUTUBE_CHANNEL_IDS", "UC123");

        let config = Config::load().expect("Should load from env");

        assert_eq!(config.http_port, 9200);
        assert_eq!(config.scrape_route(), "/scrape");
        assert_eq!(config.interval_seconds, 60);
        assert!(config.parallel_fetch);
        // Identifiers and secrets are kept verbatim
        assert_eq!(config.twitter_client_id, "0042");
        assert_eq!(config.twitter_screen_names(), vec!["alice", "bob"]);
        assert_eq!(config.youtube_channel_ids(), vec!["UC123"]);

        clear_env();
    }

    #[test]
    fn test_non_numeric_interval_is_fatal() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("SMUE_INTERVAL_SECONDS", "five minutes");
        let result = Config::load();
        assert!(matches!(result, Err(Error::Config(_))));

        clear_env();
    }

    #[test]
    fn test_config_validation_failure() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("SMUE_INTERVAL_SECONDS", "0");
        assert!(Config::load().is_err());

        env::set_var("SMUE_INTERVAL_SECONDS", "30");
        env::set_var("SMUE_METRICS_PREFIX", "9lives-");
        assert!(Config::load().is_err());

        clear_env();
    }

    #[test]
    fn test_config_file_then_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "http_port = 9300\ninterval_seconds = 120\ntwitter_screen_names = \"carol\""
        )
        .unwrap();

        env::set_var("SMUE_INTERVAL_SECONDS", "90");
        let config = Config::load_from(Some(file.path())).expect("Should load file");

        assert_eq!(config.http_port, 9300);
        assert_eq!(config.interval_seconds, 90);
        assert_eq!(config.twitter_screen_names(), vec!["carol"]);

        clear_env();
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let result = Config::load_from(Some(Path::new("/nonexistent/smue.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_secret_redaction() {
        let config = Config {
            twitter_client_secret: "super-secret-value".to_string(),
            youtube_refresh_token: "refresh-me".to_string(),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super-secret-value"));
        assert!(!debug_output.contains("refresh-me"));
    }

    #[test]
    fn test_metric_prefix_rules() {
        assert!(is_valid_metric_prefix(""));
        assert!(is_valid_metric_prefix("social_media_user_"));
        assert!(is_valid_metric_prefix("ns:sub_"));
        assert!(!is_valid_metric_prefix("1abc"));
        assert!(!is_valid_metric_prefix("a-b"));
    }

    #[test]
    fn test_http_path_cannot_shadow_health_routes() {
        for path in ["healthz", "/readyz", "readyz/"] {
            let config = Config {
                http_path: path.to_string(),
                ..Config::default()
            };
            let err = config.check().unwrap_err();
            assert!(err.to_string().contains("collides"), "{}", path);
        }

        let config = Config {
            http_path: "healthz/metrics".to_string(),
            ..Config::default()
        };
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_split_list() {
        assert!(split_list("").is_empty());
        assert_eq!(split_list(" a ,b"), vec!["a", "b"]);
        assert_eq!(split_list(",,x,"), vec!["x"]);
    }
}
