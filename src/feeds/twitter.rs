use super::{Author, Mention, PageRequest, SearchPage, SearchSource, MAX_RESULTS};
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

const SEARCH_ENDPOINT: &str = "/2/tweets/search/recent";
const TWEET_FIELDS: &str = "created_at,author_id,public_metrics";
const USER_FIELDS: &str = "username,name,verified";
const EXPANSIONS: &str = "author_id";

/// Recent-search client for the v2 API.
pub struct TwitterSearch {
    api_base: String,
    bearer_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    includes: Option<Includes>,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct ApiTweet {
    id: String,
    author_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    name: String,
    #[serde(default)]
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

impl TwitterSearch {
    pub fn new(api_base: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("mentionboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
            client,
        }
    }

    fn query_params(request: &PageRequest<'_>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", request.query.to_string()),
            ("max_results", MAX_RESULTS.to_string()),
            ("tweet.fields", TWEET_FIELDS.to_string()),
            ("user.fields", USER_FIELDS.to_string()),
            ("expansions", EXPANSIONS.to_string()),
        ];
        if let Some(since_id) = request.since_id {
            params.push(("since_id", since_id.to_string()));
        }
        if let Some(next_token) = request.next_token {
            params.push(("next_token", next_token.to_string()));
        }
        params
    }
}

/// Unpack a raw response body into mentions and authors.
///
/// Tweets without an author or a creation time are dropped.
fn parse_search_response(body: &str) -> Result<SearchPage, FetchError> {
    let response: SearchResponse = serde_json::from_str(body)?;

    let mentions = response
        .data
        .into_iter()
        .filter_map(|tweet| {
            Some(Mention {
                id: tweet.id,
                author_id: tweet.author_id?,
                created_at: tweet.created_at?,
            })
        })
        .collect();

    let authors = response
        .includes
        .map(|includes| includes.users)
        .unwrap_or_default()
        .into_iter()
        .map(|user| Author {
            id: user.id,
            handle: user.username,
            display_name: user.name,
            verified: user.verified,
        })
        .collect();

    Ok(SearchPage {
        mentions,
        authors,
        next_token: response.meta.and_then(|meta| meta.next_token),
    })
}

#[async_trait]
impl SearchSource for TwitterSearch {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<SearchPage, FetchError> {
        let url = format!("{}{}", self.api_base, SEARCH_ENDPOINT);
        tracing::debug!(
            url = %url,
            query = %urlencoding::encode(request.query),
            has_cursor = request.next_token.is_some(),
            "Requesting search page"
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(&Self::query_params(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        parse_search_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_page() {
        let body = r#"{
            "data": [
                {"id": "200", "author_id": "1", "created_at": "2025-03-01T10:00:00.000Z", "text": "hi @target"},
                {"id": "199", "author_id": "2", "created_at": "2025-03-01T09:00:00.000Z", "text": "yo @target"}
            ],
            "includes": {"users": [
                {"id": "1", "username": "alice", "name": "Alice", "verified": true},
                {"id": "2", "username": "bob", "name": "Bob"}
            ]},
            "meta": {"newest_id": "200", "next_token": "abc"}
        }"#;

        let page = parse_search_response(body).unwrap();

        assert_eq!(page.mentions.len(), 2);
        assert_eq!(page.mentions[0].id, "200");
        assert_eq!(page.mentions[0].author_id, "1");
        assert_eq!(page.authors[0].handle, "alice");
        assert!(page.authors[0].verified);
        assert!(!page.authors[1].verified);
        assert_eq!(page.next_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_empty_page() {
        let body = r#"{"meta": {"result_count": 0}}"#;

        let page = parse_search_response(body).unwrap();

        assert!(page.mentions.is_empty());
        assert!(page.authors.is_empty());
        assert_eq!(page.next_token, None);
    }

    #[test]
    fn test_parse_skips_tweets_without_author() {
        let body = r#"{"data": [
            {"id": "1", "created_at": "2025-03-01T10:00:00.000Z"},
            {"id": "2", "author_id": "9", "created_at": "2025-03-01T09:00:00.000Z"}
        ]}"#;

        let page = parse_search_response(body).unwrap();

        assert_eq!(page.mentions.len(), 1);
        assert_eq!(page.mentions[0].id, "2");
    }

    #[test]
    fn test_parse_skips_tweets_without_created_at() {
        let body = r#"{"data": [
            {"id": "300", "author_id": "1"},
            {"id": "299", "author_id": "1", "created_at": "2025-03-01T10:00:00.000Z"}
        ]}"#;

        let page = parse_search_response(body).unwrap();

        assert_eq!(page.mentions.len(), 1);
        assert_eq!(page.mentions[0].id, "299");
    }

    #[test]
    fn test_parse_malformed_body() {
        let err = parse_search_response("{not json").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn test_query_params_include_optional_bounds() {
        let params = TwitterSearch::query_params(&PageRequest {
            query: "@target",
            since_id: Some("77"),
            next_token: Some("cursor"),
        });

        assert!(params.contains(&("query", "@target".to_string())));
        assert!(params.contains(&("max_results", "100".to_string())));
        assert!(params.contains(&("expansions", "author_id".to_string())));
        assert!(params.contains(&("since_id", "77".to_string())));
        assert!(params.contains(&("next_token", "cursor".to_string())));
    }

    #[test]
    fn test_query_params_unbounded() {
        let params = TwitterSearch::query_params(&PageRequest {
            query: "@target",
            since_id: None,
            next_token: None,
        });

        assert!(params.iter().all(|(key, _)| *key != "since_id" && *key != "next_token"));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let search = TwitterSearch::new("https://api.example.com/", "token");
        assert_eq!(search.api_base, "https://api.example.com");
    }
}
