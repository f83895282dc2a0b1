//! Locating heading-delimited sections in cooked topic HTML and reading the
//! tables inside them.

use std::sync::LazyLock;

use ego_tree::NodeRef;
use indexmap::IndexMap;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

static HEADING_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h1, h2, h3, h4, h5, h6")
        .expect("BUG: hardcoded selector 'h1..h6' is statically valid")
});

static TABLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("table").expect("BUG: hardcoded selector 'table' is statically valid")
});

static TR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("tr").expect("BUG: hardcoded selector 'tr' is statically valid")
});

static TH_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("th").expect("BUG: hardcoded selector 'th' is statically valid")
});

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href]").expect("BUG: hardcoded selector 'a[href]' is statically valid")
});

/// The sections an index topic is allowed to carry, by exact heading text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSection {
    Navigation,
    Urls,
    Redirects,
    Metadata,
    Takeovers,
}

impl IndexSection {
    pub fn heading(self) -> &'static str {
        match self {
            Self::Navigation => "Navigation",
            Self::Urls => "URLs",
            Self::Redirects => "Redirects",
            Self::Metadata => "Metadata",
            Self::Takeovers => "Takeovers",
        }
    }

    pub fn find(self, document: &Html) -> Option<Html> {
        get_section(document, self.heading())
    }
}

pub fn parse_fragment(html: &str) -> Html {
    Html::parse_fragment(html)
}

/// First heading (any level) whose text is exactly `text`.
pub fn find_heading<'a>(document: &'a Html, text: &str) -> Option<ElementRef<'a>> {
    document
        .select(&HEADING_SELECTOR)
        .find(|heading| element_text(*heading) == text)
}

/// Everything between the heading titled `heading_text` and the next heading
/// with the same tag, as its own fragment.
pub fn get_section(document: &Html, heading_text: &str) -> Option<Html> {
    let heading = find_heading(document, heading_text)?;
    Some(Html::parse_fragment(&section_html(heading)))
}

/// Sibling nodes following `heading` up to the next heading of the same tag.
pub fn section_nodes<'a>(heading: ElementRef<'a>) -> Vec<NodeRef<'a, Node>> {
    let tag = heading.value().name();
    heading
        .next_siblings()
        .take_while(|node| match node.value() {
            Node::Element(el) => el.name() != tag,
            _ => true,
        })
        .collect()
}

pub fn section_html(heading: ElementRef<'_>) -> String {
    nodes_html(section_nodes(heading))
}

/// Everything before the first heading titled `break_heading_text`, or the
/// whole fragment when there is no such heading.
pub fn get_preamble(document: &Html, break_heading_text: &str) -> String {
    let Some(heading) = find_heading(document, break_heading_text) else {
        return document.root_element().inner_html();
    };
    let mut before = heading.prev_siblings().collect::<Vec<_>>();
    before.reverse();
    nodes_html(before)
}

pub fn nodes_html<'a>(nodes: impl IntoIterator<Item = NodeRef<'a, Node>>) -> String {
    let mut out = String::new();
    for node in nodes {
        push_node_html(node, &mut out);
    }
    out
}

fn push_node_html(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Element(_) => {
            if let Some(el) = ElementRef::wrap(node) {
                out.push_str(&el.html());
            }
        }
        Node::Text(text) => out.push_str(&html_escape::encode_text(&**text)),
        _ => {}
    }
}

pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

pub fn tables(document: &Html) -> Vec<ElementRef<'_>> {
    document.select(&TABLE_SELECTOR).collect()
}

pub fn header_texts(table: ElementRef<'_>) -> Vec<String> {
    table
        .select(&TH_SELECTOR)
        .map(|th| element_text(th).trim().to_owned())
        .collect()
}

/// Whether any header cell of `table` mentions `needle`.
pub fn has_header(table: ElementRef<'_>, needle: &str) -> bool {
    header_texts(table).iter().any(|h| h.contains(needle))
}

/// Data rows of a table: every `tr` with at least one `td`, as its `td` cells.
pub fn data_rows(table: ElementRef<'_>) -> Vec<Vec<ElementRef<'_>>> {
    table
        .select(&TR_SELECTOR)
        .map(|tr| {
            tr.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| cell.value().name() == "td")
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect()
}

pub fn cell_text(cell: ElementRef<'_>) -> String {
    element_text(cell).trim().to_owned()
}

/// First anchor with an href inside `el`.
pub fn first_link(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.select(&LINK_SELECTOR).next()
}

pub fn first_link_href(el: ElementRef<'_>) -> Option<String> {
    first_link(el).and_then(|a| a.value().attr("href").map(str::to_owned))
}

/// A table cell: plain text, or the text and target of the cell's link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Link { text: String, url: String },
    Text(String),
}

impl Cell {
    pub fn text(&self) -> &str {
        match self {
            Self::Link { text, .. } | Self::Text(text) => text,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Link { url, .. } => Some(url),
            Self::Text(_) => None,
        }
    }
}

pub type TableRow = IndexMap<String, Cell>;

/// Read a table into rows keyed by its slugified header cells.
///
/// Extra cells beyond the headers are ignored; short rows just lack keys.
pub fn parse_table(table: ElementRef<'_>) -> Vec<TableRow> {
    let headers = header_texts(table)
        .iter()
        .map(|h| slug::slugify(h))
        .collect::<Vec<_>>();

    data_rows(table)
        .into_iter()
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .map(|(key, cell)| {
                    let text = cell_text(cell);
                    let value = match first_link_href(cell) {
                        Some(url) => Cell::Link { text, url },
                        None => Cell::Text(text),
                    };
                    (key.clone(), value)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_stops_at_next_heading_of_same_level() -> anyhow::Result<()> {
        let doc = parse_fragment("<h2>A</h2><p>x</p><h2>B</h2><p>y</p>");
        let section = get_section(&doc, "A").ok_or_else(|| anyhow::anyhow!("missing A"))?;
        let html = section.root_element().inner_html();

        assert_eq!(html, "<p>x</p>");
        Ok(())
    }

    #[test]
    fn section_keeps_deeper_headings() -> anyhow::Result<()> {
        let doc = parse_fragment("<h1>Top</h1><h2>Sub</h2><p>a</p><h1>Next</h1><p>b</p>");
        let section = get_section(&doc, "Top").ok_or_else(|| anyhow::anyhow!("missing Top"))?;
        let html = section.root_element().inner_html();

        assert!(html.contains("<h2>Sub</h2>"));
        assert!(html.contains("<p>a</p>"));
        assert!(!html.contains("<p>b</p>"));
        Ok(())
    }

    #[test]
    fn heading_match_is_exact_and_ignores_anchor_markup() {
        let doc = parse_fragment(
            r##"<h2><a name="nav" class="anchor" href="#nav"></a>Navigation</h2><p>n</p><h2>navigation</h2>"##,
        );
        assert!(get_section(&doc, "Navigation").is_some());
        assert!(get_section(&doc, "NAVIGATION").is_none());
        assert!(get_section(&doc, "Missing").is_none());
    }

    #[test]
    fn preamble_is_content_before_heading() {
        let doc = parse_fragment("<p>Intro &amp; more</p><h2>Navigation</h2><p>nav</p>");
        assert_eq!(get_preamble(&doc, "Navigation"), "<p>Intro &amp; more</p>");

        let whole = get_preamble(&doc, "Missing");
        assert!(whole.contains("<p>nav</p>"));
    }

    #[test]
    fn parse_table_slugifies_headers_and_captures_links() {
        let doc = parse_fragment(
            r#"<table>
              <thead><tr><th>Topic Name</th><th>Link-Target</th></tr></thead>
              <tbody>
                <tr><td> Plain </td><td><a href="/t/x/5">X</a></td><td>extra</td></tr>
                <tr><td>Short</td></tr>
              </tbody>
            </table>"#,
        );
        let table = tables(&doc)[0];
        let rows = parse_table(table);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["topic-name"], Cell::Text("Plain".to_owned()));
        assert_eq!(
            rows[0]["link-target"],
            Cell::Link {
                text: "X".to_owned(),
                url: "/t/x/5".to_owned()
            }
        );
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1].len(), 1);
    }
}
