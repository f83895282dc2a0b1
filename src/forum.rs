//! The forum data source: topic JSON by id, and topic rows in bulk through a
//! Data Explorer query.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};

use crate::error::ForumError;
use crate::formats::{CategoryPage, CategoryTopic, Topic, TopicId, TopicRow};

pub trait TopicSource: Send + Sync {
    /// Forum base URL, without a trailing slash.
    fn base_url(&self) -> &str;

    fn get_topic(&self, topic_id: TopicId) -> Result<Topic, ForumError>;

    /// Bulk fetch. Rows that do not have the expected shape are dropped.
    fn get_topics(&self, topic_ids: &[TopicId]) -> Result<Vec<TopicRow>, ForumError>;

    /// Every topic listed in a category, following the list's pages.
    fn category_topics(&self, category_id: u64) -> Result<Vec<CategoryTopic>, ForumError>;
}

/// Upper bound on `/c/<id>.json` pages read for one category.
const MAX_CATEGORY_PAGES: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_username: String,
}

impl ApiCredentials {
    /// Credentials from `FORUMDOCS_API_KEY` / `FORUMDOCS_API_USERNAME`, when
    /// both are set.
    pub fn from_env() -> Option<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            api_key: read("FORUMDOCS_API_KEY")?,
            api_username: read("FORUMDOCS_API_USERNAME")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DiscourseApi {
    base_url: String,
    client: reqwest::blocking::Client,
    topics_query_id: Option<u64>,
}

impl DiscourseApi {
    pub fn new(
        base_url: &str,
        credentials: Option<ApiCredentials>,
        topics_query_id: Option<u64>,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("forumdocs/0.1"));
        if let Some(credentials) = credentials {
            headers.insert("Api-Key", HeaderValue::from_str(&credentials.api_key)?);
            headers.insert(
                "Api-Username",
                HeaderValue::from_str(&credentials.api_username)?,
            );
        }

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
            topics_query_id,
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, ForumError> {
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|source| ForumError::Request {
                url: url.clone(),
                source,
            })?;
        let response = Self::check(&url, response)?;
        response
            .json::<T>()
            .map_err(|source| ForumError::Decode { url, source })
    }

    fn check(
        url: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ForumError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ForumError::Status {
                status,
                url: url.to_owned(),
            });
        }
        Ok(response)
    }
}

impl TopicSource for DiscourseApi {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_topic(&self, topic_id: TopicId) -> Result<Topic, ForumError> {
        let url = format!("{}/t/{topic_id}.json", self.base_url);
        tracing::debug!(%url, "fetch topic");
        self.get_json(url)
    }

    fn get_topics(&self, topic_ids: &[TopicId]) -> Result<Vec<TopicRow>, ForumError> {
        let query_id = self.topics_query_id.ok_or(ForumError::MissingQueryId)?;
        let url = format!(
            "{}/admin/plugins/explorer/queries/{query_id}/run",
            self.base_url
        );
        let topics = topic_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let params = serde_json::json!({ "topics": topics }).to_string();
        tracing::debug!(%url, count = topic_ids.len(), "bulk topic query");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .form(&[("params", params)])
            .send()
            .map_err(|source| ForumError::Request {
                url: url.clone(),
                source,
            })?;
        let response = Self::check(&url, response)?;
        let body: serde_json::Value = response.json().map_err(|source| ForumError::Decode {
            url: url.clone(),
            source,
        })?;

        let rows = body
            .get("rows")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(rows
            .iter()
            .filter_map(|row| {
                let parsed = TopicRow::from_value(row);
                if parsed.is_none() {
                    tracing::warn!(%url, ?row, "skipping malformed topic row");
                }
                parsed
            })
            .collect())
    }

    fn category_topics(&self, category_id: u64) -> Result<Vec<CategoryTopic>, ForumError> {
        let mut topics = Vec::new();
        for page in 0..MAX_CATEGORY_PAGES {
            let url = format!("{}/c/{category_id}.json?page={page}", self.base_url);
            tracing::debug!(%url, "fetch category page");
            let listing: CategoryPage = self.get_json(url)?;
            let done = listing.topic_list.more_topics_url.is_none()
                || listing.topic_list.topics.is_empty();
            topics.extend(listing.topic_list.topics);
            if done {
                break;
            }
        }
        Ok(topics)
    }
}
