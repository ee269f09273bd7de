pub mod twitter;

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Page size requested from the upstream search service.
pub const MAX_RESULTS: u32 = 100;

/// Delay inserted between pages when a continuation cursor is present.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub verified: bool,
}

/// One unpacked page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub mentions: Vec<Mention>,
    pub authors: Vec<Author>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PageRequest<'a> {
    pub query: &'a str,
    pub since_id: Option<&'a str>,
    pub next_token: Option<&'a str>,
}

/// Everything a single fetch window returned, in fetch order.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub mentions: Vec<Mention>,
    pub authors: Vec<Author>,
    pub pages: usize,
}

/// A paginated search service. Implementations perform exactly one page request.
#[async_trait]
pub trait SearchSource: Send + Sync {
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<SearchPage, FetchError>;
}

pub struct PaginatedFetcher<S> {
    source: S,
    page_delay: Duration,
}

impl<S: SearchSource> PaginatedFetcher<S> {
    pub fn new(source: S, page_delay: Duration) -> Self {
        Self { source, page_delay }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Follow continuation cursors until the service stops returning one.
    ///
    /// Pages are concatenated without deduplication. Any failing page discards
    /// everything retrieved so far.
    pub async fn fetch(&self, query: &str, since_id: Option<&str>) -> Result<FetchResult, FetchError> {
        let mut result = FetchResult::default();
        let mut next_token: Option<String> = None;

        loop {
            result.pages += 1;
            tracing::debug!(query, page = result.pages, since_id, "Fetching page");

            let page = self
                .source
                .fetch_page(PageRequest {
                    query,
                    since_id,
                    next_token: next_token.as_deref(),
                })
                .await?;

            tracing::debug!(
                page = result.pages,
                count = page.mentions.len(),
                authors = page.authors.len(),
                "Page fetched"
            );

            result.mentions.extend(page.mentions);
            result.authors.extend(page.authors);
            next_token = page.next_token;

            match next_token {
                Some(_) => tokio::time::sleep(self.page_delay).await,
                None => break,
            }
        }

        tracing::info!(
            query,
            pages = result.pages,
            mentions = result.mentions.len(),
            "Pagination complete"
        );

        Ok(result)
    }
}
