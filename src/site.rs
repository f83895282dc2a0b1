//! Serving pages of one site: resolve a request path, fetch the topic and
//! assemble everything a page needs.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::{SiteConfig, SiteKind};
use crate::docs::DocVersion;
use crate::engage::{self, EngageListing, EngagePage, EngageQuery, MetadataRow, PageParser, PageType};
use crate::error::{ForumError, ResolveError, SiteError, TracingErrorSink};
use crate::formats::{Document, Topic, TopicId, TopicRow};
use crate::forum::{ApiCredentials, DiscourseApi};
use crate::index::{IndexCache, ParsedIndex};
use crate::navigation::NavigationItem;
use crate::sitemap;
use crate::topic_url::{home_path, join_prefix};
use crate::tutorials::{self, TutorialListing};

/// Everything rendered for one request.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub document: Document,
    pub navigation: Vec<NavigationItem>,
    pub versions: Vec<DocVersion>,
    /// The same page in every docs version.
    pub version_paths: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tutorials: Option<TutorialListing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<EngageListing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engage: Option<EngagePage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<MetadataRow>,
}

pub struct Site {
    cache: IndexCache,
}

impl Site {
    pub fn new(cache: IndexCache) -> Self {
        Self { cache }
    }

    /// A site backed by the forum API, with credentials from the environment.
    pub fn from_config(config: SiteConfig) -> anyhow::Result<Self> {
        let api = DiscourseApi::new(
            &config.forum_url,
            ApiCredentials::from_env(),
            config.topics_query_id,
        )?;
        Ok(Self::new(IndexCache::new(
            Arc::new(api),
            config,
            Arc::new(TracingErrorSink),
        )))
    }

    pub fn config(&self) -> &SiteConfig {
        self.cache.config()
    }

    pub fn index(&self) -> Result<Arc<ParsedIndex>, ForumError> {
        self.cache.get()
    }

    pub fn take_warnings(&self) -> Vec<String> {
        self.cache.take_warnings()
    }

    /// The page for a path relative to the site prefix.
    ///
    /// Requests for the home page reparse the index topic so that edits to
    /// the navigation show up without a restart.
    pub fn page(&self, relative_path: &str) -> Result<Page, SiteError> {
        self.page_with_query(relative_path, &EngageQuery::default())
    }

    /// Like [`Site::page`], with `query` applied to the listing on an engage
    /// home page.
    pub fn page_with_query(&self, relative_path: &str, query: &EngageQuery) -> Result<Page, SiteError> {
        let home = home_path(&self.cache.config().url_prefix);
        let full_path = home_path(&join_prefix(&self.cache.config().url_prefix, relative_path));
        let index = if full_path == home {
            self.cache.reparse()?
        } else {
            self.cache.get()?
        };

        let resolved = index.resolve_path(relative_path)?;
        if resolved.topic_id == index.index_topic_id && full_path != home {
            return Err(ResolveError::redirect(full_path, home).into());
        }

        let topic = if resolved.topic_id == index.index_topic_id {
            index.index_topic.clone()
        } else {
            self.cache.source().get_topic(resolved.topic_id)?
        };

        let url_map = index.version_url_map(&resolved.version);
        if index.kind != SiteKind::Engage && !url_map.contains_topic(topic.id) {
            let canonical = join_prefix(&index.url_prefix, &topic.topic_path());
            if full_path != canonical {
                return Err(ResolveError::redirect(full_path, canonical).into());
            }
        }

        let mut document = index
            .parse_topic(&topic, self.cache.source())
            .map_err(|err| SiteError::Content {
                topic_id: topic.id,
                message: format!("{err:#}"),
            })?;
        self.cache.queue_warnings(std::mem::take(&mut document.warnings));

        let is_index = topic.id == index.index_topic_id;
        let mut tutorials = None;
        let mut pages = None;
        let mut engage_page = None;
        let mut related = Vec::new();
        match index.kind {
            SiteKind::Tutorials if is_index => tutorials = Some(self.tutorials(&index)),
            SiteKind::Engage if is_index => {
                let listed = self.engage_pages(&index).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "engage listing unavailable");
                    Vec::new()
                });
                pages = Some(engage::query_listing(listed, query));
            }
            SiteKind::Engage => {
                let parsed = self
                    .page_parser(PageType::EngagePages)
                    .parse_page(&row_for(&topic))
                    .map_err(|err| SiteError::Content {
                        topic_id: topic.id,
                        message: err.to_string(),
                    })?;
                related = engage::related(&index.metadata, &parsed.tags())
                    .into_iter()
                    .filter(|row| row.get("path").map(String::as_str) != Some(full_path.as_str()))
                    .cloned()
                    .collect();
                document.body_html.clone_from(&parsed.body_html);
                engage_page = Some(parsed);
            }
            _ => {}
        }

        Ok(Page {
            document,
            navigation: index.navigation_for(&resolved.version, Some(topic.id)),
            versions: index.versions.clone(),
            version_paths: index.resolve_path_all_versions(relative_path, &resolved.version),
            tutorials,
            pages,
            engage: engage_page,
            related,
        })
    }

    fn page_parser(&self, page_type: PageType) -> PageParser<'_> {
        let config = self.cache.config();
        PageParser {
            page_type,
            forum_url: &config.forum_url,
            required_keys: &config.additional_metadata_validation,
            sink: self.cache.sink(),
        }
    }

    fn tutorials(&self, index: &ParsedIndex) -> TutorialListing {
        match tutorials::fetch_tutorials(
            self.cache.source(),
            &index.url_map,
            index.index_topic_id,
            self.cache.sink(),
        ) {
            Ok(listing) => {
                self.cache.queue_warnings(listing.warnings.iter().cloned());
                listing
            }
            Err(ForumError::MissingQueryId) => {
                self.cache
                    .queue_warnings(["Data Explorer query ID is not set".to_owned()]);
                TutorialListing::default()
            }
            Err(err) => {
                tracing::warn!(error = %err, "tutorial listing unavailable");
                self.cache
                    .queue_warnings([format!("Could not load tutorials: {err}")]);
                TutorialListing::default()
            }
        }
    }

    /// Every engage page mapped by the index, minus the excluded topics.
    fn engage_pages(&self, index: &ParsedIndex) -> Result<Vec<EngagePage>, ForumError> {
        let topic_ids = index
            .url_map
            .topic_ids()
            .filter(|id| *id != index.index_topic_id)
            .collect::<Vec<TopicId>>();
        self.parse_pages(PageType::EngagePages, &topic_ids)
    }

    fn parse_pages(&self, page_type: PageType, topic_ids: &[TopicId]) -> Result<Vec<EngagePage>, ForumError> {
        if topic_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.cache.source().get_topics(topic_ids)?;
        Ok(self
            .page_parser(page_type)
            .build_listing(&rows, &self.cache.config().exclude_topics))
    }

    /// Engage pages filtered and paged by `query`, with their counts.
    pub fn engage_listing(&self, query: &EngageQuery) -> Result<EngageListing, SiteError> {
        let index = self.cache.get()?;
        Ok(engage::query_listing(self.engage_pages(&index)?, query))
    }

    /// The engage page mapped at `path` (a full path under the prefix), if
    /// any.
    pub fn engage_page(&self, path: &str) -> Result<Option<EngagePage>, SiteError> {
        let index = self.cache.get()?;
        let Some(topic_id) = index.url_map.topic_id(&home_path(path)) else {
            return Ok(None);
        };
        let rows = self.cache.source().get_topics(&[topic_id])?;
        let Some(row) = rows.iter().find(|row| row.id == topic_id) else {
            return Ok(None);
        };
        let page = self
            .page_parser(PageType::EngagePages)
            .parse_page(row)
            .map_err(|err| SiteError::Content {
                topic_id,
                message: err.to_string(),
            })?;
        Ok(Some(page))
    }

    /// Every tag used by the listed engage pages.
    pub fn engage_tags(&self) -> Result<BTreeSet<String>, SiteError> {
        let index = self.cache.get()?;
        Ok(engage::all_tags(&self.engage_pages(&index)?))
    }

    /// Takeovers linked from the index whose `active` is `true`.
    pub fn active_takeovers(&self) -> Result<Vec<EngagePage>, SiteError> {
        let index = self.cache.get()?;
        let takeovers = self.parse_pages(PageType::Takeovers, &index.takeover_topics)?;
        Ok(takeovers.into_iter().filter(EngagePage::is_active).collect())
    }

    pub fn sitemap_text(&self, base_url: &str) -> Result<String, ForumError> {
        let index = self.cache.get()?;
        Ok(sitemap::render_text(&index.url_map, base_url))
    }

    pub fn sitemap_xml(&self, base_url: &str) -> Result<String, ForumError> {
        let index = self.cache.get()?;
        let entries = sitemap::collect_entries(&index.url_map, base_url, self.cache.source());
        Ok(sitemap::render_xml(&entries))
    }
}

fn row_for(topic: &Topic) -> TopicRow {
    TopicRow {
        id: topic.id,
        title: topic.title.clone(),
        slug: topic.slug.clone(),
        cooked: topic.cooked().to_owned(),
    }
}

