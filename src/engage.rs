//! Engage pages and takeovers: metadata tables on the index topic, and the
//! `Key | Value` table at the top of each page.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::content;
use crate::error::{ErrorSink, MetadataError};
use crate::formats::{TopicId, TopicRow};
use crate::section::{self, IndexSection};
use crate::topic_url;

pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// One row of an index metadata table, keyed by column title. Values keep
/// their inner HTML.
pub type MetadataRow = IndexMap<String, String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageType {
    #[default]
    EngagePages,
    Takeovers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagePage {
    pub topic_id: TopicId,
    pub title: String,
    pub topic_path: String,
    pub metadata: IndexMap<String, String>,
    pub body_html: String,
}

impl EngagePage {
    pub fn tags(&self) -> BTreeSet<String> {
        split_tags(self.metadata.get("tags").map(String::as_str).unwrap_or_default())
    }

    pub fn is_active(&self) -> bool {
        self.metadata
            .get("active")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    fn has(&self, key: &str, value: &str) -> bool {
        if key == "tag" {
            return self.tags().contains(value.trim());
        }
        self.metadata
            .get(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(value.trim()))
    }
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

/// Filters and paging for an engage listing.
///
/// `key` is a metadata key, or `tag` to match one of the page tags. The second
/// pair only applies together with the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, clap::Args)]
pub struct EngageQuery {
    #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[arg(long, default_value_t = 0)]
    #[serde(default)]
    pub offset: usize,
    #[arg(long)]
    #[serde(default)]
    pub key: Option<String>,
    #[arg(long)]
    #[serde(default)]
    pub value: Option<String>,
    #[arg(long)]
    #[serde(default)]
    pub second_key: Option<String>,
    #[arg(long)]
    #[serde(default)]
    pub second_value: Option<String>,
}

impl Default for EngageQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            key: None,
            value: None,
            second_key: None,
            second_value: None,
        }
    }
}

impl EngageQuery {
    pub fn matches(&self, page: &EngagePage) -> bool {
        let (Some(key), Some(value)) = (self.key.as_deref(), self.value.as_deref()) else {
            return true;
        };
        if !page.has(key, value) {
            return false;
        }
        match (self.second_key.as_deref(), self.second_value.as_deref()) {
            (Some(key), Some(value)) => page.has(key, value),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngageListing {
    pub pages: Vec<EngagePage>,
    /// Every listed page, before filtering.
    pub total_count: usize,
    /// Pages matching the filters whose `active` is `true`.
    pub active_count: usize,
    /// Pages matching the filters, before paging.
    pub current_total: usize,
}

/// Filter `pages` and cut out the requested window.
pub fn query_listing(pages: Vec<EngagePage>, query: &EngageQuery) -> EngageListing {
    let total_count = pages.len();
    let matching = pages
        .into_iter()
        .filter(|page| query.matches(page))
        .collect::<Vec<_>>();
    let active_count = matching.iter().filter(|page| page.is_active()).count();
    let current_total = matching.len();

    EngageListing {
        pages: matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect(),
        total_count,
        active_count,
        current_total,
    }
}

/// Topic ids linked from the rows of the tables under `section`.
pub fn section_topic_ids(index: &Html, section: IndexSection) -> Vec<TopicId> {
    let Some(section_doc) = section.find(index) else {
        return Vec::new();
    };
    let mut ids = Vec::new();
    for table in section::tables(&section_doc) {
        for cells in section::data_rows(table) {
            let topic_id = cells
                .iter()
                .filter_map(|cell| section::first_link_href(*cell))
                .find_map(|href| topic_url::topic_id_from_href(&href));
            if let Some(topic_id) = topic_id
                && !ids.contains(&topic_id)
            {
                ids.push(topic_id);
            }
        }
    }
    ids
}

fn split_tags(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

fn column_key(title: &str) -> String {
    title.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Read the metadata table under `section` of an index topic.
///
/// A row whose link cell has no href, or whose `path`/`type` cell is empty,
/// is dropped; each distinct problem is reported once.
pub fn parse_metadata(
    index: &Html,
    section: IndexSection,
    sink: &dyn ErrorSink,
) -> (Vec<MetadataRow>, Vec<String>) {
    let mut rows = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    let Some(section_doc) = section.find(index) else {
        return (rows, errors);
    };

    for table in section::tables(&section_doc) {
        let titles = section::header_texts(table)
            .iter()
            .map(|t| column_key(t))
            .collect::<Vec<_>>();

        'rows: for cells in section::data_rows(table) {
            let mut row = MetadataRow::new();
            for (idx, cell) in cells.into_iter().enumerate() {
                let Some(title) = titles.get(idx) else {
                    break;
                };

                let anchor = cell
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .find(|el| el.value().name() == "a");
                let mut value = cell.inner_html().trim().to_owned();

                if let Some(anchor) = anchor {
                    let text = section::element_text(anchor);
                    row.insert("topic_name".to_owned(), text.clone());
                    match anchor.value().attr("href") {
                        Some(href) if href == text => value = text,
                        Some(_) => {}
                        None => {
                            let message = format!(
                                "Warning: Link not found when parsing row {} \"{text}\" {title}. This row has been skipped.",
                                idx + 1
                            );
                            record(&mut errors, sink, message);
                            continue 'rows;
                        }
                    }
                }

                if (title == "path" || title == "type") && section::cell_text(cell).is_empty() {
                    let topic_name = row.get("topic_name").cloned().unwrap_or_default();
                    let message = format!(
                        "Warning: Title not found when parsing row {} \"{topic_name}\" {title}.",
                        idx + 1
                    );
                    record(&mut errors, sink, message);
                    continue 'rows;
                }

                row.insert(title.clone(), value);
            }
            if !row.is_empty() {
                rows.push(row);
            }
        }
    }

    (rows, errors)
}

fn record(errors: &mut Vec<String>, sink: &dyn ErrorSink, message: String) {
    if !errors.contains(&message) {
        sink.capture_message(&message);
        errors.push(message);
    }
}

/// Index rows sharing at least one tag with `tags`.
pub fn related<'a>(metadata: &'a [MetadataRow], tags: &BTreeSet<String>) -> Vec<&'a MetadataRow> {
    metadata
        .iter()
        .filter(|row| {
            let row_tags = split_tags(row.get("tags").map(String::as_str).unwrap_or_default());
            !row_tags.is_disjoint(tags)
        })
        .collect()
}

/// Reads engage pages or takeovers out of bulk topic rows.
pub struct PageParser<'a> {
    pub page_type: PageType,
    pub forum_url: &'a str,
    /// Keys every page must carry on top of the built-in ones.
    pub required_keys: &'a [String],
    pub sink: &'a dyn ErrorSink,
}

impl PageParser<'_> {
    /// Parse one page. A page without a leading metadata table is an error;
    /// missing keys are only reported.
    pub fn parse_page(&self, row: &TopicRow) -> Result<EngagePage, MetadataError> {
        let topic_path = format!("{}/t/{}/{}", self.forum_url, row.slug, row.id);
        let doc = Html::parse_fragment(&row.cooked);

        let table = doc
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|el| el.value().name() == "table" && !section::header_texts(*el).is_empty())
            .ok_or_else(|| MetadataError(format!("{topic_path} metadata not found")))?;

        let mut metadata = IndexMap::new();
        for cells in section::data_rows(table) {
            let (Some(key_cell), Some(value_cell)) = (cells.first(), cells.get(1)) else {
                return Err(MetadataError(format!(
                    "{} Metadata table contains errors: missing value for {topic_path}",
                    self.label()
                )));
            };
            let key = section::cell_text(*key_cell);
            let value = self.cell_value(*value_cell);
            metadata.insert(key, value);
        }

        let problems = self.healthcheck(&metadata, row.id);
        if !problems.is_empty() {
            self.sink.capture_message(&problems.join(", "));
        }

        let body_html = content::process_page_html(&row.cooked)
            .and_then(|html| remove_metadata_table(&html))
            .map_err(|err| MetadataError(format!("{topic_path}: {err:#}")))?;

        Ok(EngagePage {
            topic_id: row.id,
            title: row.title.clone(),
            topic_path,
            metadata,
            body_html,
        })
    }

    fn label(&self) -> &'static str {
        match self.page_type {
            PageType::EngagePages => "engage-pages",
            PageType::Takeovers => "takeovers",
        }
    }

    fn cell_value(&self, cell: ElementRef<'_>) -> String {
        let first_element = cell.children().filter_map(ElementRef::wrap).next();
        match (self.page_type, first_element) {
            (PageType::Takeovers, Some(el)) if el.value().name() == "a" => {
                el.value().attr("href").unwrap_or_default().to_owned()
            }
            _ => section::cell_text(cell),
        }
    }

    /// Messages for keys the page should carry but does not.
    pub fn healthcheck(&self, metadata: &IndexMap<String, String>, topic_id: TopicId) -> Vec<String> {
        let page = format!("{}/t/{topic_id}", self.forum_url);
        let required: &[(&str, &str)] = match self.page_type {
            PageType::EngagePages => &[
                ("path", "This engage page will not show in engage-pages"),
                ("topic_name", "Default discourse title will be used"),
                (
                    "type",
                    "Provide a type for this engage page (whitepaper, webinar, blog, event etc)",
                ),
                ("active", "Provide the active parameter in the metadata (true, false)"),
            ],
            PageType::Takeovers => &[
                ("title", "This takeover will not be displayed"),
                ("active", "This takeover will not be displayed"),
            ],
        };

        let mut problems = required
            .iter()
            .filter(|(key, _)| !metadata.contains_key(*key))
            .map(|(key, hint)| format!("Missing {key} on {page}. {hint}"))
            .collect::<Vec<_>>();
        problems.extend(
            self.required_keys
                .iter()
                .filter(|key| !metadata.contains_key(key.as_str()))
                .map(|key| {
                    format!("Missing {key} on {page}. This parameter is required to render takeovers")
                }),
        );
        problems
    }

    /// Parse every row not excluded, skipping pages without metadata.
    pub fn build_listing(&self, rows: &[TopicRow], exclude_topics: &[TopicId]) -> Vec<EngagePage> {
        rows.iter()
            .filter(|row| !exclude_topics.contains(&row.id))
            .filter_map(|row| match self.parse_page(row) {
                Ok(page) => Some(page),
                Err(err) => {
                    tracing::warn!(topic_id = row.id, %err, "skipping page");
                    None
                }
            })
            .collect()
    }
}

/// Every tag used across `pages`.
pub fn all_tags(pages: &[EngagePage]) -> BTreeSet<String> {
    pages.iter().flat_map(EngagePage::tags).collect()
}

/// Drop the first table when it is the `Key | Value` metadata table.
fn remove_metadata_table(html: &str) -> anyhow::Result<String> {
    let (_document, body) = content::parse_body(html)?;
    if let Ok(table) = body.select_first("table") {
        let headers = content::select_all(table.as_node(), "th")?
            .iter()
            .map(|th| th.text_contents().trim().to_owned())
            .collect::<Vec<_>>();
        if headers.first().map(String::as_str) == Some("Key")
            && headers.get(1).map(String::as_str) == Some("Value")
        {
            table.as_node().detach();
        }
    }
    content::inner_html(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryErrorSink;

    const ENGAGE_INDEX: &str = r#"
        <p>Engage pages</p>
        <h1>Metadata</h1>
        <details>
          <summary>Mapping table</summary>
          <table>
            <thead><tr><th>Topic name</th><th>Path</th><th>Type</th><th>Tags</th></tr></thead>
            <tbody>
              <tr><td><a href="https://forum.example.com/t/page/10">Cloud webinar</a></td><td>/engage/cloud</td><td>webinar</td><td>cloud</td></tr>
              <tr><td><a>Broken</a></td><td>/engage/broken</td><td>webinar</td><td>cloud</td></tr>
              <tr><td><a href="https://forum.example.com/t/other/11">No type</a></td><td>/engage/notype</td><td></td><td>iot</td></tr>
              <tr><td><a href="https://forum.example.com/t/iot/12">IoT paper</a></td><td>/engage/iot</td><td>whitepaper</td><td>iot, edge</td></tr>
            </tbody>
          </table>
        </details>
    "#;

    #[test]
    fn index_metadata_skips_broken_rows() {
        let doc = section::parse_fragment(ENGAGE_INDEX);
        let sink = MemoryErrorSink::default();
        let (rows, errors) = parse_metadata(&doc, IndexSection::Metadata, &sink);

        assert_eq!(rows.len(), 2);
        assert!(rows[0]["topic_name"].ends_with(">Cloud webinar</a>"));
        assert_eq!(rows[0]["path"], "/engage/cloud");
        assert_eq!(rows[1]["tags"], "iot, edge");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Warning: Link not found when parsing row 1 \"Broken\""));
        assert_eq!(errors[1], "Warning: Title not found when parsing row 3 \"No type\" type.");
        assert_eq!(sink.messages(), errors);

        let tags = split_tags("edge");
        let related = related(&rows, &tags);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0]["path"], "/engage/iot");
    }

    fn page_row(id: TopicId, cooked: &str) -> TopicRow {
        TopicRow {
            id,
            title: format!("Page {id}"),
            slug: format!("page-{id}"),
            cooked: cooked.to_owned(),
        }
    }

    #[test]
    fn page_metadata_and_body() -> anyhow::Result<()> {
        let sink = MemoryErrorSink::default();
        let required = vec!["language".to_owned()];
        let parser = PageParser {
            page_type: PageType::EngagePages,
            forum_url: "https://forum.example.com",
            required_keys: &required,
            sink: &sink,
        };
        let row = page_row(
            10,
            r#"<table><thead><tr><th>Key</th><th>Value</th></tr></thead><tbody>
                <tr><td>path</td><td>/engage/cloud</td></tr>
                <tr><td>type</td><td><a href="https://example.com/x">webinar</a></td></tr>
                <tr><td>tags</td><td>cloud, k8s</td></tr>
              </tbody></table><p>Body text</p>"#,
        );
        let page = parser.parse_page(&row)?;

        assert_eq!(page.metadata["path"], "/engage/cloud");
        assert_eq!(page.metadata["type"], "webinar");
        assert_eq!(page.topic_path, "https://forum.example.com/t/page-10/10");
        assert_eq!(page.body_html, "<p>Body text</p>");
        assert!(page.tags().contains("k8s"));

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Missing topic_name on https://forum.example.com/t/10"));
        assert!(messages[0].contains("Missing active"));
        assert!(messages[0].contains("Missing language"));
        Ok(())
    }

    #[test]
    fn takeover_links_keep_href() -> anyhow::Result<()> {
        let sink = MemoryErrorSink::default();
        let parser = PageParser {
            page_type: PageType::Takeovers,
            forum_url: "https://forum.example.com",
            required_keys: &[],
            sink: &sink,
        };
        let row = page_row(
            20,
            r#"<table><tr><th>Key</th><th>Value</th></tr>
                <tr><td>title</td><td>Big launch</td></tr>
                <tr><td>active</td><td>true</td></tr>
                <tr><td>url</td><td><a href="https://example.com/launch">launch</a></td></tr>
              </table>"#,
        );
        let page = parser.parse_page(&row)?;

        assert_eq!(page.metadata["url"], "https://example.com/launch");
        assert!(sink.messages().is_empty());
        Ok(())
    }

    #[test]
    fn listing_skips_excluded_and_unparseable_pages() {
        let sink = MemoryErrorSink::default();
        let parser = PageParser {
            page_type: PageType::Takeovers,
            forum_url: "https://forum.example.com",
            required_keys: &[],
            sink: &sink,
        };
        let table = "<table><tr><th>Key</th><th>Value</th></tr><tr><td>title</td><td>T</td></tr><tr><td>active</td><td>true</td></tr></table>";
        let rows = vec![
            page_row(1, table),
            page_row(2, "<p>no metadata</p>"),
            page_row(3, table),
        ];
        let pages = parser.build_listing(&rows, &[3]);

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].topic_id, 1);

        let err = parser.parse_page(&rows[1]).expect_err("missing metadata");
        assert_eq!(err.0, "https://forum.example.com/t/page-2/2 metadata not found");
    }

    fn listed(id: TopicId, metadata: &[(&str, &str)]) -> EngagePage {
        EngagePage {
            topic_id: id,
            title: format!("Page {id}"),
            topic_path: format!("https://forum.example.com/t/page-{id}/{id}"),
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            body_html: String::new(),
        }
    }

    fn ids(listing: &EngageListing) -> Vec<TopicId> {
        listing.pages.iter().map(|p| p.topic_id).collect()
    }

    #[test]
    fn listing_filters_pages_and_counts() {
        let pages = vec![
            listed(1, &[("type", "webinar"), ("tags", "cloud"), ("active", "true")]),
            listed(2, &[("type", "whitepaper"), ("tags", "cloud, iot"), ("active", "false")]),
            listed(3, &[("type", "Webinar"), ("tags", "iot"), ("active", "true"), ("language", "es")]),
        ];

        let all = query_listing(pages.clone(), &EngageQuery::default());
        assert_eq!(ids(&all), vec![1, 2, 3]);
        assert_eq!((all.total_count, all.active_count, all.current_total), (3, 2, 3));

        let webinars = EngageQuery {
            key: Some("type".to_owned()),
            value: Some("webinar".to_owned()),
            ..EngageQuery::default()
        };
        assert_eq!(ids(&query_listing(pages.clone(), &webinars)), vec![1, 3]);

        let spanish_webinars = EngageQuery {
            second_key: Some("language".to_owned()),
            second_value: Some("es".to_owned()),
            ..webinars.clone()
        };
        assert_eq!(ids(&query_listing(pages.clone(), &spanish_webinars)), vec![3]);

        let iot = EngageQuery {
            key: Some("tag".to_owned()),
            value: Some("iot".to_owned()),
            limit: 1,
            offset: 1,
            ..EngageQuery::default()
        };
        let listing = query_listing(pages, &iot);
        assert_eq!(ids(&listing), vec![3]);
        assert_eq!((listing.total_count, listing.active_count, listing.current_total), (3, 1, 2));
    }

    #[test]
    fn takeover_topics_come_from_row_links() {
        let doc = section::parse_fragment(
            r#"<h1>Takeovers</h1>
            <table>
              <tr><th>Topic name</th><th>Active</th></tr>
              <tr><td><a href="https://forum.example.com/t/launch/70">Launch</a></td><td>true</td></tr>
              <tr><td>No link</td><td>true</td></tr>
              <tr><td><a href="/t/launch/70">Again</a></td><td>false</td></tr>
              <tr><td><a href="/t/old/71">Old</a></td><td>false</td></tr>
            </table>"#,
        );

        assert_eq!(section_topic_ids(&doc, IndexSection::Takeovers), vec![70, 71]);
        assert!(section_topic_ids(&doc, IndexSection::Metadata).is_empty());
    }
}
