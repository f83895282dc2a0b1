//! Documentation sites: a version table, one navigation per version, and the
//! per-version URL maps derived from the navigation rows.

use indexmap::IndexMap;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::forum::TopicSource;
use crate::formats::TopicId;
use crate::navigation::{self, NavigationItem};
use crate::section::{self, IndexSection};
use crate::topic_url::{self, TopicLinks, join_prefix};
use crate::url_map::{UrlMap, normalize_pretty_path};

pub const DEFAULT_VERSION: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocVersion {
    /// Index topic holding this version's navigation.
    pub index: TopicId,
    /// First path segment under the site prefix; empty for the main version.
    pub path: String,
    pub version: String,
}

impl DocVersion {
    pub fn url_prefix(&self, site_prefix: &str) -> String {
        if self.path.is_empty() {
            site_prefix.to_owned()
        } else {
            join_prefix(site_prefix, &self.path)
        }
    }
}

/// Everything a docs index parse produces.
#[derive(Debug, Clone, Default)]
pub struct DocsIndex {
    pub versions: Vec<DocVersion>,
    /// Version path → navigation tree, links already pointing at pretty paths.
    pub navigations: IndexMap<String, Vec<NavigationItem>>,
    pub url_maps: IndexMap<String, UrlMap>,
    pub warnings: Vec<String>,
}

fn find_version_table(section_doc: &Html) -> Option<ElementRef<'_>> {
    section::tables(section_doc)
        .into_iter()
        .filter(|table| section::has_header(*table, "Version"))
        .last()
}

/// Read the `Path | Version` table of the "Navigation" section.
///
/// Without one there is a single unnamed version served from the main index.
pub fn parse_versions(index: &Html, links: &TopicLinks, index_topic_id: TopicId) -> Vec<DocVersion> {
    let default = vec![DocVersion {
        index: index_topic_id,
        path: String::new(),
        version: DEFAULT_VERSION.to_owned(),
    }];

    let Some(section_doc) = IndexSection::Navigation.find(index) else {
        return default;
    };
    let Some(table) = find_version_table(&section_doc) else {
        return default;
    };

    let rows = section::data_rows(table);
    if rows.is_empty() {
        return default;
    }

    rows.into_iter()
        .map(|cells| {
            let path = cells
                .first()
                .map(|c| section::cell_text(*c))
                .unwrap_or_default();
            let version_cell = cells.last().copied();
            let version = version_cell.map(section::cell_text).unwrap_or_default();
            let linked = version_cell
                .and_then(section::first_link_href)
                .and_then(|href| links.topic_id(&href));

            let index = match linked {
                Some(id) if !path.is_empty() => id,
                _ => index_topic_id,
            };
            DocVersion {
                index,
                path: path.trim_matches('/').to_owned(),
                version,
            }
        })
        .collect()
}

/// Build versions, navigation trees and URL maps for a docs index topic.
///
/// Navigation for other versions lives in their own index topics; a version
/// whose topic cannot be fetched gets an empty navigation and a warning.
pub fn parse_docs_index(
    index: &Html,
    source: &dyn TopicSource,
    links: &TopicLinks,
    url_prefix: &str,
    index_topic_id: TopicId,
) -> DocsIndex {
    let mut out = DocsIndex {
        versions: parse_versions(index, links, index_topic_id),
        ..DocsIndex::default()
    };

    for version in &out.versions {
        let (items, mut warnings) = if version.index == index_topic_id {
            navigation::parse_navigation(index, links)
        } else {
            match source.get_topic(version.index) {
                Ok(topic) => {
                    let doc = section::parse_fragment(topic.cooked());
                    navigation::parse_navigation(&doc, links)
                }
                Err(err) => {
                    out.warnings.push(format!(
                        "Could not load navigation for version {}: {err}",
                        version.version
                    ));
                    (Vec::new(), Vec::new())
                }
            }
        };
        out.warnings.append(&mut warnings);

        let version_prefix = version.url_prefix(url_prefix);
        let (url_map, mut map_warnings) =
            url_map_from_navigation(&items, &version_prefix, version.index);
        out.warnings.append(&mut map_warnings);

        let (items, mut level_warnings) = navigation::validate_levels(items);
        out.warnings.append(&mut level_warnings);
        let mut tree = navigation::build_tree(items);
        navigation::rewrite_links(&mut tree, &url_map);

        tracing::debug!(
            version = %version.version,
            paths = url_map.len(),
            "docs version parsed"
        );
        out.navigations.insert(version.path.clone(), tree);
        out.url_maps.insert(version.path.clone(), url_map);
    }

    out
}

/// URL map of one docs version, from its flat navigation rows.
pub fn url_map_from_navigation(
    items: &[NavigationItem],
    url_prefix: &str,
    version_index_id: TopicId,
) -> (UrlMap, Vec<String>) {
    let mut url_map = UrlMap::new();
    let mut warnings = Vec::new();

    for item in items {
        let path = item.path.as_str();
        match (&item.navlink_href, path.is_empty()) {
            (None, false) => {
                warnings.push(format!("Missing topic link for {path}"));
            }
            (Some(href), true) => {
                let is_version_index = item.topic_id == Some(version_index_id);
                if item.topic_id.is_some() && !is_version_index {
                    warnings.push(format!("Missing topic path for {href}"));
                }
            }
            (Some(href), false) => {
                let pretty_path = normalize_pretty_path(path, url_prefix);
                let topic_id = topic_url::topic_id_from_href(href)
                    .filter(|_| pretty_path.starts_with(url_prefix));
                match topic_id {
                    Some(topic_id) => url_map.insert(pretty_path, topic_id),
                    None => warnings.push(format!(
                        "Could not parse URL map item {href} -> {pretty_path}"
                    )),
                }
            }
            (None, true) => {}
        }
    }

    url_map.insert_home(url_prefix, version_index_id);
    (url_map, warnings)
}
