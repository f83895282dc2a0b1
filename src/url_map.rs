//! Pretty-path ↔ topic-id maps and the redirect table built from an index
//! topic.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::formats::TopicId;
use crate::section::{self, IndexSection};
use crate::topic_url::{self, home_path};

/// Bidirectional map between pretty paths and topic ids.
///
/// Every path key points at a topic id that is itself a key, and every topic
/// id maps back to a path that maps to it. Both sides keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMap {
    path_to_id: IndexMap<String, TopicId>,
    id_to_path: IndexMap<TopicId, String>,
}

impl UrlMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `path` to `topic_id` in both directions.
    ///
    /// The latest path inserted for a topic becomes its canonical path.
    pub fn insert(&mut self, path: impl Into<String>, topic_id: TopicId) {
        let path = path.into();
        if let Some(previous) = self.path_to_id.insert(path.clone(), topic_id)
            && previous != topic_id
            && self.id_to_path.get(&previous) == Some(&path)
        {
            self.id_to_path.shift_remove(&previous);
            let other = self
                .path_to_id
                .iter()
                .rev()
                .find(|(_, id)| **id == previous)
                .map(|(p, _)| p.clone());
            if let Some(other) = other {
                self.id_to_path.insert(previous, other);
            }
        }
        self.id_to_path.insert(topic_id, path);
    }

    /// Pin the home path to the index topic, overriding any row that claimed
    /// either side.
    pub fn insert_home(&mut self, url_prefix: &str, index_topic_id: TopicId) {
        self.insert(home_path(url_prefix), index_topic_id);
    }

    pub fn topic_id(&self, path: &str) -> Option<TopicId> {
        self.path_to_id.get(path).copied()
    }

    pub fn path(&self, topic_id: TopicId) -> Option<&str> {
        self.id_to_path.get(&topic_id).map(String::as_str)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.path_to_id.contains_key(path)
    }

    pub fn contains_topic(&self, topic_id: TopicId) -> bool {
        self.id_to_path.contains_key(&topic_id)
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, TopicId)> {
        self.path_to_id.iter().map(|(p, id)| (p.as_str(), *id))
    }

    pub fn topic_ids(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.id_to_path.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.path_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_to_id.is_empty()
    }

    /// Fold `other` into this map; entries of `other` win on clash.
    pub fn extend(&mut self, other: &UrlMap) {
        for (path, topic_id) in other.paths() {
            self.insert(path, topic_id);
        }
        for (topic_id, path) in &other.id_to_path {
            self.id_to_path.insert(*topic_id, path.clone());
        }
    }
}

/// Redirect source path → target location.
pub type RedirectMap = BTreeMap<String, String>;

/// Prefix `path` with `/` and then `url_prefix` when not already there.
///
/// Trailing slashes are dropped so that keys match the request paths the
/// resolver looks up.
pub fn normalize_pretty_path(path: &str, url_prefix: &str) -> String {
    let mut pretty = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    if !pretty.starts_with(url_prefix) {
        pretty = format!("{url_prefix}{pretty}");
    }
    home_path(&pretty)
}

/// Build the URL map from a `Topic | Path` table in `section`.
pub fn parse_url_map(
    index: &Html,
    url_prefix: &str,
    index_topic_id: TopicId,
    section: IndexSection,
) -> (UrlMap, Vec<String>) {
    let mut url_map = UrlMap::new();
    let mut warnings = Vec::new();

    if let Some(section_doc) = section.find(index) {
        for table in section::tables(&section_doc) {
            for (row_idx, cells) in section::data_rows(table).into_iter().enumerate() {
                let href = cells.first().and_then(|c| section::first_link_href(*c));
                let (Some(href), Some(path_cell)) = (href, cells.get(1)) else {
                    warnings.push(format!(
                        "Could not parse URL map row {}: missing topic link or path",
                        row_idx + 1
                    ));
                    continue;
                };

                let pretty_path =
                    normalize_pretty_path(&section::cell_text(*path_cell), url_prefix);
                let topic_id = topic_url::topic_id_from_href(&href);

                let Some(topic_id) = topic_id.filter(|_| pretty_path.starts_with(url_prefix))
                else {
                    warnings.push(format!(
                        "Could not parse URL map item {href} -> {pretty_path}"
                    ));
                    continue;
                };

                tracing::debug!(path = %pretty_path, topic_id, "url map entry");
                url_map.insert(pretty_path, topic_id);
            }
        }
    }

    url_map.insert_home(url_prefix, index_topic_id);
    (url_map, warnings)
}

/// Build the redirect map from the `Path | Location` table under "Redirects".
///
/// Rows are taken in document order; a source path already seen is ignored
/// with a warning.
pub fn parse_redirect_map(
    index: &Html,
    url_prefix: &str,
    url_map: &UrlMap,
) -> (RedirectMap, Vec<String>) {
    let mut redirect_map = RedirectMap::new();
    let mut warnings = Vec::new();

    let Some(section_doc) = IndexSection::Redirects.find(index) else {
        return (redirect_map, warnings);
    };

    for table in section::tables(&section_doc) {
        for cells in section::data_rows(table) {
            let (Some(path_cell), Some(location_cell)) = (cells.first(), cells.last()) else {
                continue;
            };
            let path = home_path(&section::cell_text(*path_cell));
            let location = section::cell_text(*location_cell);

            if !path.starts_with(url_prefix) {
                warnings.push(format!("Could not parse redirect map for {path}"));
                continue;
            }

            if !(location.starts_with(url_prefix) || is_absolute_url(&location)) {
                warnings.push(format!("Redirect map location {location} is invalid"));
                continue;
            }

            if url_map.contains_path(&path) {
                warnings.push(format!("Redirect path {path} clashes with URL map"));
                continue;
            }

            if redirect_map.contains_key(&path) {
                warnings.push(format!("Duplicate redirect path {path} ignored"));
                continue;
            }

            let location = if is_absolute_url(&location) {
                location
            } else {
                home_path(&location)
            };
            redirect_map.insert(path, location);
        }
    }

    (redirect_map, warnings)
}

/// A fully-qualified http(s) URL with a host.
pub fn is_absolute_url(location: &str) -> bool {
    match url::Url::parse(location) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}
