//! ABOUTME: Builds the polling set from configuration at startup
//! ABOUTME: Logs and skips any source whose validation or probe fails

use sm_config::Config;
use sm_obs::MetricRegistry;
use std::sync::Arc;
use tracing::{error, info};

use crate::{AdapterFactory, Platform, SourceAdapter, TwitterFactory, YouTubeFactory};

/// Factories for every supported platform, built from configuration
pub fn factories(config: &Config) -> Vec<Box<dyn AdapterFactory>> {
    vec![
        Box::new(TwitterFactory::new(
            config.twitter_credentials(),
            &config.twitter_api_url,
            &config.metrics_prefix,
        )),
        Box::new(YouTubeFactory::new(
            config.youtube_credentials(),
            &config.youtube_api_url,
            &config.youtube_token_url,
            &config.metrics_prefix,
        )),
    ]
}

/// Construct one adapter per configured identifier
///
/// A platform without identifiers contributes no adapters. A source that
/// fails construction is logged and left out; the rest still start.
pub async fn build_adapters(
    config: &Config,
    registry: &MetricRegistry,
) -> Vec<Arc<dyn SourceAdapter>> {
    let plan: Vec<(Box<dyn AdapterFactory>, Vec<String>)> = factories(config)
        .into_iter()
        .map(|factory| {
            let identifiers = match factory.platform() {
                Platform::Twitter => config.twitter_screen_names(),
                Platform::YouTube => config.youtube_channel_ids(),
            };
            (factory, identifiers)
        })
        .collect();

    build_from_plan(&plan, registry).await
}

/// Construct adapters for each `(factory, identifiers)` pair in order
pub async fn build_from_plan(
    plan: &[(Box<dyn AdapterFactory>, Vec<String>)],
    registry: &MetricRegistry,
) -> Vec<Arc<dyn SourceAdapter>> {
    let mut adapters = Vec::new();

    for (factory, identifiers) in plan {
        let platform = factory.platform();
        let mut created = 0usize;

        for identifier in identifiers {
            match factory.create(identifier, registry).await {
                Ok(adapter) => {
                    adapters.push(adapter);
                    created += 1;
                }
                Err(e) => {
                    error!(
                        platform = %platform,
                        source = %identifier,
                        error = %e,
                        "Problem setting up source, it will not be polled"
                    );
                }
            }
        }

        info!(
            platform = %platform,
            configured = identifiers.len(),
            created = created,
            "Platform sources configured"
        );
    }

    adapters
}
