//! The parsed index topic: one immutable snapshot per parse, and the cache
//! that swaps snapshots in.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use indexmap::IndexMap;
use serde::Serialize;

use crate::category::{self, DataTables};
use crate::config::{SiteConfig, SiteKind};
use crate::docs::{self, DocVersion, DEFAULT_VERSION};
use crate::engage::{self, MetadataRow};
use crate::error::{ErrorSink, ForumError};
use crate::forum::TopicSource;
use crate::formats::{Topic, TopicId};
use crate::navigation::{self, NavigationItem};
use crate::section::{self, IndexSection};
use crate::topic_url::{TopicLinks, join_prefix};
use crate::url_map::{self, RedirectMap, UrlMap};

/// Most recent warnings surfaced per response.
pub const MAX_SURFACED_WARNINGS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ParsedIndex {
    pub kind: SiteKind,
    pub url_prefix: String,
    pub forum_url: String,
    pub index_topic_id: TopicId,
    #[serde(skip)]
    pub index_topic: Topic,
    pub versions: Vec<DocVersion>,
    /// Version path → navigation tree. Empty for sites without navigation.
    pub navigations: IndexMap<String, Vec<NavigationItem>>,
    /// Version path → URL map of that version.
    pub url_maps: IndexMap<String, UrlMap>,
    /// Union of every version's URL map.
    pub url_map: UrlMap,
    pub redirect_map: RedirectMap,
    pub metadata: Vec<MetadataRow>,
    pub takeovers: Vec<MetadataRow>,
    /// Topics linked from the takeovers table, in table order.
    pub takeover_topics: Vec<TopicId>,
    pub data_tables: DataTables,
    /// Tutorials index consulted for cards embedded in docs pages.
    pub tutorials_index_topic_id: Option<TopicId>,
    pub tutorials_url_map: UrlMap,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ParsedIndex {
    fn empty(config: &SiteConfig, index_topic: Topic) -> Self {
        Self {
            kind: config.kind,
            url_prefix: config.url_prefix.clone(),
            forum_url: config.forum_url.clone(),
            index_topic_id: config.index_topic_id,
            index_topic,
            versions: vec![DocVersion {
                index: config.index_topic_id,
                path: String::new(),
                version: DEFAULT_VERSION.to_owned(),
            }],
            navigations: IndexMap::new(),
            url_maps: IndexMap::new(),
            url_map: UrlMap::new(),
            redirect_map: RedirectMap::new(),
            metadata: Vec::new(),
            takeovers: Vec::new(),
            takeover_topics: Vec::new(),
            data_tables: DataTables::new(),
            tutorials_index_topic_id: config.tutorials_index_topic_id,
            tutorials_url_map: UrlMap::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Copy of a version's navigation with the active topic and its
    /// ancestors flagged.
    pub fn navigation_for(&self, version: &str, active_topic_id: Option<TopicId>) -> Vec<NavigationItem> {
        let mut tree = self.navigations.get(version).cloned().unwrap_or_default();
        navigation::mark_active(&mut tree, active_topic_id);
        tree
    }

    /// URL map used for lookups within `version`.
    pub fn version_url_map(&self, version: &str) -> &UrlMap {
        self.url_maps.get(version).unwrap_or(&self.url_map)
    }

    /// Whether `topic_id` is the index topic of any version.
    pub fn is_version_index(&self, topic_id: TopicId) -> bool {
        self.versions.iter().any(|v| v.index == topic_id)
    }

    pub fn links(&self) -> TopicLinks {
        TopicLinks::new(&self.forum_url)
    }
}

/// Fetch the index topic and parse it according to the site kind.
pub fn parse_index(
    source: &dyn TopicSource,
    config: &SiteConfig,
    sink: &dyn ErrorSink,
) -> Result<ParsedIndex, ForumError> {
    let index_topic = source.get_topic(config.index_topic_id)?;
    Ok(parse_index_topic(index_topic, source, config, sink))
}

/// Parse an already fetched index topic. Other topics are only fetched for
/// the navigation of older doc versions, the tutorials index of a docs site
/// and the topic list of a category.
pub fn parse_index_topic(
    index_topic: Topic,
    source: &dyn TopicSource,
    config: &SiteConfig,
    sink: &dyn ErrorSink,
) -> ParsedIndex {
    let document = section::parse_fragment(index_topic.cooked());
    let links = TopicLinks::new(&config.forum_url);
    let prefix = config.url_prefix.as_str();
    let index_id = config.index_topic_id;
    let mut parsed = ParsedIndex::empty(config, index_topic);

    match config.kind {
        SiteKind::Docs => {
            let docs = docs::parse_docs_index(&document, source, &links, prefix, index_id);
            parsed.versions = docs.versions;
            parsed.navigations = docs.navigations;
            parsed.warnings.extend(docs.warnings);
            for map in docs.url_maps.values() {
                parsed.url_map.extend(map);
            }
            parsed.url_maps = docs.url_maps;

            if let Some(tutorials_id) = config.tutorials_index_topic_id {
                match source.get_topic(tutorials_id) {
                    Ok(topic) => {
                        let tutorials_doc = section::parse_fragment(topic.cooked());
                        let (map, warnings) = url_map::parse_url_map(
                            &tutorials_doc,
                            &config.tutorials_url_prefix,
                            tutorials_id,
                            IndexSection::Urls,
                        );
                        parsed.tutorials_url_map = map;
                        parsed.warnings.extend(warnings);
                    }
                    Err(err) => parsed
                        .warnings
                        .push(format!("Could not load tutorials index {tutorials_id}: {err}")),
                }
            }
        }
        SiteKind::Tutorials => {
            let (map, warnings) =
                url_map::parse_url_map(&document, prefix, index_id, IndexSection::Urls);
            parsed.warnings.extend(warnings);
            parsed.url_map = map;
        }
        SiteKind::Engage => {
            let (map, warnings) =
                url_map::parse_url_map(&document, prefix, index_id, IndexSection::Metadata);
            parsed.warnings.extend(warnings);
            parsed.url_map = map;

            let (metadata, mut errors) =
                engage::parse_metadata(&document, IndexSection::Metadata, sink);
            let (takeovers, takeover_errors) =
                engage::parse_metadata(&document, IndexSection::Takeovers, sink);
            for error in takeover_errors {
                if !errors.contains(&error) {
                    errors.push(error);
                }
            }
            parsed.metadata = metadata;
            parsed.takeovers = takeovers;
            parsed.takeover_topics = engage::section_topic_ids(&document, IndexSection::Takeovers);
            parsed.errors = errors;
        }
        SiteKind::Category => {
            parsed.data_tables = category::parse_data_tables(&document);
            match config.category_id {
                Some(category_id) => match source.category_topics(category_id) {
                    Ok(topics) => {
                        for topic in topics
                            .iter()
                            .filter(|t| !config.exclude_topics.contains(&t.id))
                        {
                            parsed.url_map.insert(join_prefix(prefix, &topic.slug), topic.id);
                        }
                    }
                    Err(err) => parsed
                        .warnings
                        .push(format!("Could not load topics of category {category_id}: {err}")),
                },
                None => parsed
                    .warnings
                    .push("Category id is not set, only the index topic is served".to_owned()),
            }
            parsed.url_map.insert_home(prefix, index_id);
        }
    }

    if parsed.url_maps.is_empty() {
        parsed.url_maps.insert(String::new(), parsed.url_map.clone());
    }

    if config.kind != SiteKind::Engage {
        let (redirects, warnings) = url_map::parse_redirect_map(&document, prefix, &parsed.url_map);
        parsed.redirect_map = redirects;
        parsed.warnings.extend(warnings);
    }

    for warning in &parsed.warnings {
        tracing::warn!(%warning, "index parse warning");
    }
    tracing::info!(
        kind = ?parsed.kind,
        paths = parsed.url_map.len(),
        redirects = parsed.redirect_map.len(),
        warnings = parsed.warnings.len(),
        "index parsed"
    );
    parsed
}

/// Holds the current parse of one index topic.
///
/// Readers get an `Arc` snapshot for the whole request; a reparse builds a new
/// snapshot and swaps it in.
pub struct IndexCache {
    source: Arc<dyn TopicSource>,
    config: SiteConfig,
    sink: Arc<dyn ErrorSink>,
    current: RwLock<Option<Arc<ParsedIndex>>>,
    pending_warnings: Mutex<Vec<String>>,
}

impl IndexCache {
    pub fn new(source: Arc<dyn TopicSource>, config: SiteConfig, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            source,
            config,
            sink,
            current: RwLock::new(None),
            pending_warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn TopicSource {
        self.source.as_ref()
    }

    pub fn sink(&self) -> &dyn ErrorSink {
        self.sink.as_ref()
    }

    /// The current snapshot, parsing on first use.
    pub fn get(&self) -> Result<Arc<ParsedIndex>, ForumError> {
        let current = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match current {
            Some(parsed) => Ok(parsed),
            None => self.reparse(),
        }
    }

    /// Parse again and replace the snapshot.
    pub fn reparse(&self) -> Result<Arc<ParsedIndex>, ForumError> {
        let parsed = Arc::new(parse_index(self.source.as_ref(), &self.config, self.sink.as_ref())?);

        self.pending_warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(parsed.warnings.iter().cloned());
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&parsed));
        Ok(parsed)
    }

    /// Queue warnings raised while serving a page, next to the parse warnings.
    pub fn queue_warnings(&self, warnings: impl IntoIterator<Item = String>) {
        let mut pending = self
            .pending_warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for warning in warnings {
            tracing::warn!(%warning, "page warning");
            pending.push(warning);
        }
    }

    /// Drain queued warnings, keeping only the most recent few.
    pub fn take_warnings(&self) -> Vec<String> {
        let mut pending = self
            .pending_warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let drained = std::mem::take(&mut *pending);
        let skip = drained.len().saturating_sub(MAX_SURFACED_WARNINGS);
        drained.into_iter().skip(skip).collect()
    }
}
