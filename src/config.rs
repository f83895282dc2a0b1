use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::formats::TopicId;

/// Which kind of site an index topic describes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SiteKind {
    #[default]
    Docs,
    Tutorials,
    Engage,
    Category,
}

fn default_url_prefix() -> String {
    "/docs".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub forum_url: String,
    pub index_topic_id: TopicId,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    #[serde(default)]
    pub kind: SiteKind,
    /// Data Explorer query returning `[id, title, slug, cooked]` rows.
    #[serde(default)]
    pub topics_query_id: Option<u64>,
    #[serde(default)]
    pub exclude_topics: Vec<TopicId>,
    #[serde(default)]
    pub additional_metadata_validation: Vec<String>,
    /// Category whose topics a category site serves at `/<slug>`.
    #[serde(default)]
    pub category_id: Option<u64>,
    /// Tutorials index whose URL table gives card links in docs pages.
    #[serde(default)]
    pub tutorials_index_topic_id: Option<TopicId>,
    #[serde(default = "default_tutorials_url_prefix")]
    pub tutorials_url_prefix: String,
}

fn default_tutorials_url_prefix() -> String {
    "/tutorials".to_owned()
}

impl SiteConfig {
    pub fn new(forum_url: &str, index_topic_id: TopicId, url_prefix: &str, kind: SiteKind) -> Self {
        Self {
            forum_url: forum_url.trim_end_matches('/').to_owned(),
            index_topic_id,
            url_prefix: normalize_prefix(url_prefix),
            kind,
            topics_query_id: None,
            exclude_topics: Vec::new(),
            additional_metadata_validation: Vec::new(),
            category_id: None,
            tutorials_index_topic_id: None,
            tutorials_url_prefix: default_tutorials_url_prefix(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("decode yaml")?;
        config.normalized()
    }

    /// Normalise the prefix and forum URL and check the values are usable.
    pub fn normalized(mut self) -> anyhow::Result<Self> {
        self.forum_url = self.forum_url.trim().trim_end_matches('/').to_owned();
        let forum_url = url::Url::parse(&self.forum_url)
            .with_context(|| format!("invalid forum url: {}", self.forum_url))?;
        anyhow::ensure!(
            matches!(forum_url.scheme(), "http" | "https"),
            "forum url must be http/https: {}",
            self.forum_url
        );
        anyhow::ensure!(self.index_topic_id > 0, "index topic id must be positive");
        self.url_prefix = normalize_prefix(&self.url_prefix);
        self.tutorials_url_prefix = normalize_prefix(&self.tutorials_url_prefix);
        Ok(self)
    }
}

/// Leading `/` ensured; trailing `/` stripped unless the prefix is `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{trimmed}")
    }
}
