//! Tutorial cards for a tutorials index: each mapped tutorial topic starts
//! with a small key/value table describing it. Docs pages can embed the same
//! cards through a one-column `Tutorials` table of links.

use std::collections::HashMap;
use std::sync::LazyLock;

use kuchiki::NodeRef;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::content;
use crate::error::{ErrorSink, ForumError};
use crate::forum::TopicSource;
use crate::formats::{TopicId, TopicRow};
use crate::section;
use crate::topic_url;
use crate::url_map::UrlMap;

pub const ALLOWED_TUTORIAL_KEYS: [&str; 4] = ["summary", "categories", "difficulty", "author"];

static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table").expect("BUG: hardcoded selector 'table' is statically valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tutorial {
    pub id: TopicId,
    pub title: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TutorialListing {
    pub tutorials: Vec<Tutorial>,
    pub warnings: Vec<String>,
    /// Editorial errors, each reported once to the error sink.
    pub errors: Vec<String>,
}

/// Fetch every tutorial mapped by `url_map` (except the index itself) in one
/// bulk query and read their metadata tables.
///
/// Tutorials come back in the order the URL table lists them.
pub fn fetch_tutorials(
    source: &dyn TopicSource,
    url_map: &UrlMap,
    index_topic_id: TopicId,
    sink: &dyn ErrorSink,
) -> Result<TutorialListing, ForumError> {
    let topic_ids = url_map
        .topic_ids()
        .filter(|id| *id != index_topic_id)
        .collect::<Vec<_>>();
    if topic_ids.is_empty() {
        return Ok(TutorialListing::default());
    }

    let rows = source.get_topics(&topic_ids)?;
    let mut listing = build_listing(&rows, url_map, source.base_url(), sink);

    let position = topic_ids
        .iter()
        .enumerate()
        .map(|(pos, id)| (*id, pos))
        .collect::<HashMap<_, _>>();
    listing
        .tutorials
        .sort_by_key(|t| position.get(&t.id).copied().unwrap_or(usize::MAX));

    tracing::info!(count = listing.tutorials.len(), "tutorials loaded");
    Ok(listing)
}

/// `(key, value)` rows of the first table in `cooked`, keys lowercased.
fn metadata_pairs(cooked: &str) -> Option<Vec<(String, String)>> {
    let doc = Html::parse_fragment(cooked);
    let table = doc.select(&TABLE_SELECTOR).next()?;
    let rows = section::data_rows(table);
    if rows.is_empty() {
        return None;
    }
    Some(
        rows.iter()
            .map(|cells| {
                let key = cells
                    .first()
                    .map(|c| section::cell_text(*c).to_lowercase())
                    .unwrap_or_default();
                let value = cells.last().map(|c| section::cell_text(*c)).unwrap_or_default();
                (key, value)
            })
            .collect(),
    )
}

fn tutorial_link(url_map: &UrlMap, forum_url: &str, row: &TopicRow) -> String {
    url_map
        .path(row.id)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{forum_url}/t/{}/{}", row.slug, row.id))
}

/// Read tutorial cards from bulk topic rows, in row order.
pub fn build_listing(
    rows: &[TopicRow],
    url_map: &UrlMap,
    forum_url: &str,
    sink: &dyn ErrorSink,
) -> TutorialListing {
    let mut listing = TutorialListing::default();

    for row in rows {
        let Some(pairs) = metadata_pairs(&row.cooked) else {
            listing
                .warnings
                .push(format!("Invalid metadata table for tutorial topic {}", row.id));
            continue;
        };

        let mut tutorial = Tutorial {
            id: row.id,
            title: row.title.clone(),
            link: tutorial_link(url_map, forum_url, row),
            ..Tutorial::default()
        };

        let mut rejected = None;
        for (key, value) in pairs {
            match key.as_str() {
                "summary" => tutorial.summary = Some(value),
                "categories" => tutorial.categories = Some(value),
                "difficulty" => tutorial.difficulty = Some(value),
                "author" => tutorial.author = Some(value),
                _ => {
                    rejected = Some(key);
                    break;
                }
            }
        }

        match rejected {
            Some(key) => {
                let message = format!(
                    "The tutorial \"{}\" contains an incorrect key error \"{key}\", only {} are allowed. This tutorial has been skipped",
                    row.title,
                    ALLOWED_TUTORIAL_KEYS.join(", ")
                );
                sink.capture_message(&message);
                if !listing.errors.contains(&message) {
                    listing.errors.push(message);
                }
            }
            None => listing.tutorials.push(tutorial),
        }
    }

    listing
}

/// A card shown in place of a docs page's tutorials table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Card {
    title: String,
    link: String,
    summary: String,
}

fn render_cards(cards: &[&Card]) -> String {
    let mut html = String::from(r#"<div class="row">"#);
    for card in cards {
        html.push_str(&format!(
            r#"<div class="col-4 col-medium-3 p-card"><div class="p-card__content"><h3 class="p-card__title p-heading--four"><a class="inline-onebox" href="{}">{}</a></h3><p>{}</p></div></div>"#,
            html_escape::encode_double_quoted_attribute(&card.link),
            html_escape::encode_text(&card.title),
            html_escape::encode_text(&card.summary),
        ));
    }
    html.push_str("</div>");
    html
}

/// Tables with a single `Tutorials` header column, each with the topics its
/// rows link to.
fn tutorial_tables(body: &NodeRef, warnings: &mut Vec<String>) -> anyhow::Result<Vec<(NodeRef, Vec<TopicId>)>> {
    let mut found = Vec::new();
    for table in content::select_all(body, "table")? {
        let headers = content::select_all(table.as_node(), "th")?;
        let [header] = headers.as_slice() else {
            continue;
        };
        if !header.text_contents().contains("Tutorials") {
            continue;
        }

        let mut topic_ids = Vec::new();
        for row in content::select_all(table.as_node(), "tr")? {
            if content::select_all(row.as_node(), "td")?.is_empty() {
                continue;
            }
            let Ok(anchor) = row.as_node().select_first("a[href]") else {
                continue;
            };
            let href = anchor.attributes.borrow().get("href").unwrap_or_default().to_owned();
            match topic_url::topic_id_from_href(&href) {
                Some(topic_id) => topic_ids.push(topic_id),
                None => warnings.push("Invalid tutorial URL".to_owned()),
            }
        }
        if !topic_ids.is_empty() {
            found.push((table.as_node().clone(), topic_ids));
        }
    }
    Ok(found)
}

/// Swap the `Tutorials` tables of a docs page for cards built from each
/// linked tutorial's metadata table. Returns the HTML with the warnings met.
///
/// When the tutorials cannot be fetched the page is left as it is.
pub fn replace_tutorial_tables(
    cooked: &str,
    source: &dyn TopicSource,
    tutorials_url_map: &UrlMap,
) -> anyhow::Result<(String, Vec<String>)> {
    let mut warnings = Vec::new();
    let (_document, body) = content::parse_body(cooked)?;
    let tables = tutorial_tables(&body, &mut warnings)?;
    if tables.is_empty() {
        return Ok((cooked.to_owned(), warnings));
    }

    let topic_ids = tables
        .iter()
        .flat_map(|(_, ids)| ids.iter().copied())
        .collect::<Vec<_>>();
    let rows = match source.get_topics(&topic_ids) {
        Ok(rows) => rows,
        Err(ForumError::MissingQueryId) => {
            warnings.push("Tutorials found but Data Explorer query is not set".to_owned());
            return Ok((cooked.to_owned(), warnings));
        }
        Err(err) => {
            warnings.push(format!("Could not load tutorials: {err}"));
            return Ok((cooked.to_owned(), warnings));
        }
    };

    let mut cards = HashMap::new();
    for row in &rows {
        let Some(pairs) = metadata_pairs(&row.cooked) else {
            warnings.push(format!("Invalid metadata table for tutorial topic {}", row.id));
            continue;
        };
        let summary = pairs
            .into_iter()
            .find(|(key, _)| key == "summary")
            .map(|(_, value)| value)
            .unwrap_or_default();
        cards.insert(
            row.id,
            Card {
                title: row.title.clone(),
                link: tutorial_link(tutorials_url_map, source.base_url(), row),
                summary,
            },
        );
    }

    for (table, ids) in &tables {
        let table_cards = ids.iter().filter_map(|id| cards.get(id)).collect::<Vec<_>>();
        content::replace_with_html(table, &render_cards(&table_cards))?;
    }
    tracing::debug!(tables = tables.len(), cards = cards.len(), "tutorial tables replaced");

    Ok((content::inner_html(&body)?, warnings))
}
