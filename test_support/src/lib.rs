//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common API fixtures for platform, scheduler and end-to-end tests

use serde_json::{json, Value};

/// Credentials accepted by the mocked APIs
pub const TEST_CLIENT_ID: &str = "test-client-id";
pub const TEST_CLIENT_SECRET: &str = "test-client-secret";
pub const TEST_ACCESS_TOKEN: &str = "test-access-token";
pub const TEST_TOKEN_SECRET: &str = "test-token-secret";
pub const TEST_REFRESH_TOKEN: &str = "test-refresh-token";

/// Body of a Twitter `users/show` response
pub fn twitter_user_json(screen_name: &str, followers: u64) -> Value {
    json!({
        "id": 783214,
        "id_str": "783214",
        "name": format!("{} (test)", screen_name),
        "screen_name": screen_name,
        "followers_count": followers,
        "friends_count": 12,
        "statuses_count": 340,
        "favourites_count": 56,
        "verified": false
    })
}

/// Body of a Twitter API error response
pub fn twitter_error_json(code: u32, message: &str) -> Value {
    json!({ "errors": [{ "code": code, "message": message }] })
}

/// Body of a YouTube `channels.list` response holding one channel
pub fn youtube_channel_list_json(
    channel_id: &str,
    title: &str,
    subscribers: u64,
    views: u64,
    videos: u64,
) -> Value {
    json!({
        "kind": "youtube#channelListResponse",
        "pageInfo": { "totalResults": 1, "resultsPerPage": 5 },
        "items": [{
            "kind": "youtube#channel",
            "id": channel_id,
            "snippet": { "title": title, "description": "" },
            "contentDetails": { "relatedPlaylists": { "uploads": "UU" } },
            "statistics": {
                "viewCount": views.to_string(),
                "subscriberCount": subscribers.to_string(),
                "hiddenSubscriberCount": false,
                "videoCount": videos.to_string()
            }
        }]
    })
}

/// Body of a `channels.list` response with no visible channel
pub fn youtube_empty_channel_list_json() -> Value {
    json!({
        "kind": "youtube#channelListResponse",
        "pageInfo": { "totalResults": 0, "resultsPerPage": 5 }
    })
}

/// Body of an OAuth2 refresh-token grant response
pub fn token_response_json(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "expires_in": expires_in,
        "scope": "https://www.googleapis.com/auth/youtube",
        "token_type": "Bearer"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_fixture_uses_string_counts() {
        let body = youtube_channel_list_json("UC1", "Chan", 1, 2, 3);
        assert_eq!(body["items"][0]["statistics"]["viewCount"], "2");
        assert_eq!(body["items"][0]["snippet"]["title"], "Chan");
    }

    #[test]
    fn test_twitter_fixture() {
        let body = twitter_user_json("alice", 100);
        assert_eq!(body["followers_count"], 100);
        assert_eq!(body["screen_name"], "alice");
    }
}
