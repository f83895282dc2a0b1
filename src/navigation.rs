//! Navigation tables (`Level | Path | Navlink`) and the tree built from them.

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::formats::TopicId;
use crate::section::{self, IndexSection};
use crate::topic_url::{self, TopicLinks};
use crate::url_map::UrlMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationItem {
    pub level: u32,
    pub path: String,
    pub navlink_href: Option<String>,
    pub navlink_fragment: Option<String>,
    pub navlink_text: String,
    pub topic_id: Option<TopicId>,
    pub hidden: bool,
    pub is_active: bool,
    pub has_active_child: bool,
    pub children: Vec<NavigationItem>,
}

impl NavigationItem {
    fn group() -> Self {
        Self::default()
    }

    fn label(&self) -> &str {
        if !self.navlink_text.is_empty() {
            &self.navlink_text
        } else {
            &self.path
        }
    }
}

/// The navigation table of a "Navigation" section: the last table whose
/// header has a `Navlink` column.
pub fn find_navigation_table(section_doc: &Html) -> Option<ElementRef<'_>> {
    section::tables(section_doc)
        .into_iter()
        .filter(|table| section::has_header(*table, "Navlink"))
        .last()
}

/// Flat navigation rows of an index topic, in document order.
pub fn parse_navigation(index: &Html, links: &TopicLinks) -> (Vec<NavigationItem>, Vec<String>) {
    let Some(section_doc) = IndexSection::Navigation.find(index) else {
        return (Vec::new(), Vec::new());
    };
    match find_navigation_table(&section_doc) {
        Some(table) => parse_navigation_table(table, links),
        None => (Vec::new(), Vec::new()),
    }
}

/// Read each row as `level, path, navlink`.
///
/// A row with a non-numeric or negative level is skipped with a warning. An
/// empty level marks a hidden row at level 0.
pub fn parse_navigation_table(
    table: ElementRef<'_>,
    links: &TopicLinks,
) -> (Vec<NavigationItem>, Vec<String>) {
    let mut items = Vec::new();
    let mut warnings = Vec::new();

    for cells in section::data_rows(table) {
        let level_text = cells.first().map(|c| section::cell_text(*c)).unwrap_or_default();
        let hidden = level_text.is_empty();

        let level = if hidden {
            0
        } else {
            match parse_level(&level_text) {
                Some(level) => level,
                None => {
                    warnings.push(format!("Invalid level used: {level_text}"));
                    continue;
                }
            }
        };

        let path = cells
            .get(1)
            .map(|c| section::cell_text(*c).replace('–', "--"))
            .map(|p| topic_url::href_path(&p))
            .unwrap_or_default();

        let navlink_cell = cells.last().copied();
        let navlink_href = navlink_cell
            .and_then(section::first_link_href)
            .map(|href| href.replace('–', "--"));
        let navlink_text = match (hidden, navlink_cell) {
            (false, Some(cell)) => section::cell_text(cell),
            _ => String::new(),
        };
        let navlink_fragment = navlink_href
            .as_deref()
            .and_then(topic_url::href_fragment)
            .map(str::to_owned);
        let topic_id = navlink_href.as_deref().and_then(|h| links.topic_id(h));

        items.push(NavigationItem {
            level,
            path,
            navlink_href,
            navlink_fragment,
            navlink_text,
            topic_id,
            hidden,
            ..NavigationItem::default()
        });
    }

    (items, warnings)
}

fn parse_level(text: &str) -> Option<u32> {
    if !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Drop rows that nest more than one level below the previous row.
///
/// When the first row is not at level 0 a heading-only group is put in front
/// so that it has a parent.
pub fn validate_levels(items: Vec<NavigationItem>) -> (Vec<NavigationItem>, Vec<String>) {
    let mut accepted = Vec::with_capacity(items.len() + 1);
    let mut warnings = Vec::new();
    let mut depth: Option<u32> = None;

    if items.first().is_some_and(|item| item.level != 0) {
        accepted.push(NavigationItem::group());
        depth = Some(0);
    }

    for item in items {
        let max_level = depth.map_or(0, |d| d + 1);
        if item.level > max_level {
            warnings.push(format!(
                "Navigation item \"{}\" jumps to level {} without a parent at level {}; skipped",
                item.label(),
                item.level,
                item.level - 1
            ));
            continue;
        }
        depth = Some(item.level);
        accepted.push(item);
    }

    (accepted, warnings)
}

/// Nest flat items by level: each item becomes a child of the last item one
/// level up.
pub fn build_tree(items: Vec<NavigationItem>) -> Vec<NavigationItem> {
    let mut roots: Vec<NavigationItem> = Vec::new();

    for item in items {
        let mut siblings = &mut roots;
        for _ in 0..item.level {
            if siblings.is_empty() {
                break;
            }
            let last = siblings.len() - 1;
            siblings = &mut siblings[last].children;
        }
        siblings.push(item);
    }

    roots
}

/// Point topic links at their pretty paths, keeping any fragment.
pub fn rewrite_links(forest: &mut [NavigationItem], url_map: &UrlMap) {
    for item in forest.iter_mut() {
        if let Some(path) = item.topic_id.and_then(|id| url_map.path(id)) {
            item.navlink_href = Some(match &item.navlink_fragment {
                Some(fragment) => format!("{path}#{fragment}"),
                None => path.to_owned(),
            });
        }
        rewrite_links(&mut item.children, url_map);
    }
}

/// Flag the items linking to `active_topic_id` and all of their ancestors.
///
/// Returns whether anything in `forest` is active.
pub fn mark_active(forest: &mut [NavigationItem], active_topic_id: Option<TopicId>) -> bool {
    let mut any = false;
    for item in forest.iter_mut() {
        item.is_active = active_topic_id.is_some() && item.topic_id == active_topic_id;
        item.has_active_child = mark_active(&mut item.children, active_topic_id);
        any |= item.is_active || item.has_active_child;
    }
    any
}
