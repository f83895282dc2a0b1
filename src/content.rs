//! Post-processing of cooked topic HTML before it is served, and splitting the
//! result into `<h2>` sections.

use std::sync::LazyLock;

use anyhow::Context as _;
use kuchiki::NodeRef;
use kuchiki::iter::NodeIterator as _;
use kuchiki::traits::TendrilSink;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::formats::DocumentSection;
use crate::section;
use crate::topic_url::{TopicLinks, join_prefix, match_topic_path};
use crate::url_map::{RedirectMap, UrlMap};

static LEADING_GLYPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\n?<p([^>]*)>ⓘ +").expect("BUG: hardcoded notification regex is statically valid")
});

static H2_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("h2").expect("BUG: hardcoded selector 'h2' is statically valid")
});

const INFO_GLYPH: &str = "ⓘ ";
const NOTE_TO_EDITORS: &str = "NOTE TO EDITORS";

/// Rewrites topic HTML for one site: markup conversions plus links pointing at
/// the site's pretty paths.
#[derive(Debug, Clone)]
pub struct ContentProcessor<'a> {
    links: TopicLinks,
    url_prefix: &'a str,
    url_map: &'a UrlMap,
    redirect_map: &'a RedirectMap,
}

impl<'a> ContentProcessor<'a> {
    pub fn new(
        forum_url: &str,
        url_prefix: &'a str,
        url_map: &'a UrlMap,
        redirect_map: &'a RedirectMap,
    ) -> Self {
        Self {
            links: TopicLinks::new(forum_url),
            url_prefix,
            url_map,
            redirect_map,
        }
    }

    /// Notifications, editor notes, links, polls, then lightbox metadata.
    pub fn process_topic_html(&self, cooked: &str) -> anyhow::Result<String> {
        let (_document, body) = parse_body(cooked)?;
        replace_notifications(&body)?;
        remove_notes_to_editors(&body)?;
        self.replace_links(&body)?;
        replace_polls(&body)?;
        remove_lightbox_meta(&body)?;
        inner_html(&body)
    }

    fn replace_links(&self, body: &NodeRef) -> anyhow::Result<()> {
        for anchor in select_all(body, "a[href]")? {
            let text = anchor.text_contents();
            let mut attrs = anchor.attributes.borrow_mut();
            let Some(href) = attrs.get("href").map(str::to_owned) else {
                continue;
            };
            if let Some(rewritten) = self.rewrite_href(&href, &text) {
                tracing::debug!(%href, %rewritten, "rewrite link");
                attrs.insert("href", rewritten);
            }
        }
        Ok(())
    }

    /// New target for a link, or `None` to leave it alone.
    pub fn rewrite_href(&self, href: &str, text: &str) -> Option<String> {
        // Mentions point at the forum profile.
        if href.starts_with("/u") && text.trim_start().starts_with('@') {
            return Some(self.links.absolute(href));
        }
        if href.starts_with("/uploads/") {
            return Some(self.links.absolute(href));
        }

        let forum_url = self.links.forum_url();
        let link = match href.strip_prefix(forum_url) {
            Some(rest) if !forum_url.is_empty() => rest,
            _ => href,
        };
        if !link.starts_with('/') {
            return None;
        }
        let topic = match_topic_path(link)?;

        let split = link.find(['?', '#']).unwrap_or(link.len());
        let (path, suffix) = link.split_at(split);
        let full_path = join_prefix(self.url_prefix, path);

        let target = if let Some(pretty) = self.url_map.path(topic.topic_id) {
            pretty.to_owned()
        } else if let Some(location) = self.redirect_map.get(&full_path) {
            location.clone()
        } else {
            full_path
        };
        Some(format!("{target}{suffix}"))
    }
}

/// The markup conversions without link rewriting, for pages that are not part
/// of a mapped site.
pub fn process_page_html(cooked: &str) -> anyhow::Result<String> {
    let (_document, body) = parse_body(cooked)?;
    replace_notifications(&body)?;
    remove_notes_to_editors(&body)?;
    replace_polls(&body)?;
    remove_lightbox_meta(&body)?;
    inner_html(&body)
}

/// Parse a fragment and return the document with its `<body>`.
pub(crate) fn parse_body(html: &str) -> anyhow::Result<(NodeRef, NodeRef)> {
    let document = kuchiki::parse_html().one(html);
    let body = document
        .select_first("body")
        .map_err(|()| anyhow::anyhow!("parsed html has no body"))?
        .as_node()
        .clone();
    Ok((document, body))
}

pub(crate) fn inner_html(node: &NodeRef) -> anyhow::Result<String> {
    let mut out = Vec::new();
    for child in node.children() {
        child.serialize(&mut out).context("serialize html")?;
    }
    String::from_utf8(out).context("serialized html is not utf-8")
}

pub(crate) fn select_all(
    node: &NodeRef,
    selector: &str,
) -> anyhow::Result<Vec<kuchiki::NodeDataRef<kuchiki::ElementData>>> {
    Ok(node
        .select(selector)
        .map_err(|()| anyhow::anyhow!("invalid selector: {selector}"))?
        .collect())
}

/// Replace `node` with the nodes parsed from `html`.
pub(crate) fn replace_with_html(node: &NodeRef, html: &str) -> anyhow::Result<()> {
    let (_document, body) = parse_body(html)?;
    let replacement = body.children().collect::<Vec<_>>();
    for child in replacement {
        node.insert_before(child);
    }
    node.detach();
    Ok(())
}

fn element_name(node: &NodeRef) -> Option<String> {
    node.as_element().map(|el| el.name.local.to_string())
}

fn is_element(node: &NodeRef, name: &str) -> bool {
    element_name(node).as_deref() == Some(name)
}

fn last_element_child(node: &NodeRef) -> Option<NodeRef> {
    node.children().rev().find(|child| child.as_element().is_some())
}

fn add_class(node: &NodeRef, class: &str) {
    if let Some(el) = node.as_element() {
        let mut attrs = el.attributes.borrow_mut();
        let value = match attrs.get("class") {
            Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
            _ => class.to_owned(),
        };
        attrs.insert("class", value);
    }
}

fn set_class(node: &NodeRef, class: &str) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().insert("class", class.to_owned());
    }
}

/// Paragraph and blockquote around a notification marker, when the marker sits
/// in a paragraph directly inside a blockquote that is still attached.
fn notification_parts(marker: &NodeRef) -> Option<(NodeRef, NodeRef)> {
    let paragraph = marker.parent()?;
    let blockquote = paragraph.parent()?;
    if !is_element(&paragraph, "p") || !is_element(&blockquote, "blockquote") {
        return None;
    }
    blockquote.parent()?;
    Some((paragraph, blockquote))
}

fn style_notification_paragraphs(first: &NodeRef, blockquote: &NodeRef) {
    set_class(first, "u-no-padding--top");
    if let Some(last) = last_element_child(blockquote)
        && is_element(&last, "p")
    {
        add_class(&last, "u-no-margin--bottom");
    }
}

fn notification_html(class: &str, contents: &str) -> String {
    format!(
        "<div class=\"{class}\"><div class=\"p-notification__response\">{contents}</div></div>"
    )
}

/// Turn `> ⓘ ...` and `> :warning: ...` blockquotes into notification boxes.
pub fn replace_notifications(body: &NodeRef) -> anyhow::Result<()> {
    let markers = body
        .descendants()
        .text_nodes()
        .filter(|text| text.borrow().contains(INFO_GLYPH))
        .map(|text| text.as_node().clone())
        .collect::<Vec<_>>();

    for marker in markers {
        let Some((paragraph, blockquote)) = notification_parts(&marker) else {
            continue;
        };
        style_notification_paragraphs(&paragraph, &blockquote);
        let contents = inner_html(&blockquote)?;
        let contents = LEADING_GLYPH.replace(&contents, "<p$1>");
        replace_with_html(&blockquote, &notification_html("p-notification", &contents))?;
    }

    for warning in select_all(body, "img[title=\":warning:\"]")? {
        let image = warning.as_node().clone();
        let Some((paragraph, blockquote)) = notification_parts(&image) else {
            continue;
        };
        image.detach();
        style_notification_paragraphs(&paragraph, &blockquote);
        if let Some(first) = paragraph.first_child()
            && let Some(text) = first.as_text()
        {
            let trimmed = text.borrow().trim_start_matches(' ').to_owned();
            *text.borrow_mut() = trimmed;
        }
        let contents = inner_html(&blockquote)?;
        replace_with_html(
            &blockquote,
            &notification_html("p-notification--caution", &contents),
        )?;
    }

    Ok(())
}

/// Drop quoted asides carrying the "NOTE TO EDITORS" banner.
pub fn remove_notes_to_editors(body: &NodeRef) -> anyhow::Result<()> {
    for aside in select_all(body, "aside.quote")? {
        let node = aside.as_node();
        if node.text_contents().contains(NOTE_TO_EDITORS) {
            node.detach();
        }
    }
    Ok(())
}

/// Expand Discourse polls into radio inputs named after the poll.
pub fn replace_polls(body: &NodeRef) -> anyhow::Result<()> {
    for poll in select_all(body, "div.poll[data-poll-name]")? {
        let node = poll.as_node().clone();
        let poll_name = poll
            .attributes
            .borrow()
            .get("data-poll-name")
            .unwrap_or_default()
            .to_owned();

        if let Ok(info) = node.select_first("div.poll-info") {
            info.as_node().detach();
        }

        if let Some(question) = node
            .preceding_siblings()
            .find(|sibling| is_element(sibling, "h3"))
            && let Some(el) = question.as_element()
        {
            el.attributes.borrow_mut().insert("id", poll_name.clone());
        }

        for option in select_all(&node, "li")? {
            let label = option.text_contents();
            let option_id = option
                .attributes
                .borrow()
                .get("data-poll-option-id")
                .unwrap_or_default()
                .to_owned();
            let id = html_escape::encode_double_quoted_attribute(&option_id);
            let name = html_escape::encode_double_quoted_attribute(&poll_name);
            let html = format!(
                "<input type=\"radio\" id=\"{id}\" name=\"{name}\"><label for=\"{id}\">{}</label>",
                html_escape::encode_text(label.trim())
            );
            replace_with_html(option.as_node(), &html)?;
        }
    }
    Ok(())
}

pub fn remove_lightbox_meta(body: &NodeRef) -> anyhow::Result<()> {
    for meta in select_all(body, "div.lightbox-wrapper div.meta")? {
        meta.as_node().detach();
    }
    Ok(())
}

/// Heading text reduced to lower-case letters, digits and hyphens.
pub fn section_slug(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .replace(' ', "-")
}

fn h2_sections(html: &Html) -> Vec<(String, Vec<ego_tree::NodeRef<'_, Node>>)> {
    html.select(&H2_SELECTOR)
        .map(|heading| {
            let title = section::element_text(heading).trim().to_owned();
            (title, section::section_nodes(heading))
        })
        .collect()
}

/// One section per `<h2>`, holding everything up to the next `<h2>`.
pub fn get_sections(processed_html: &str) -> Vec<DocumentSection> {
    let html = Html::parse_fragment(processed_html);
    h2_sections(&html)
        .into_iter()
        .map(|(title, nodes)| DocumentSection {
            slug: section_slug(&title),
            content: section::nodes_html(nodes).trim().to_owned(),
            title,
            duration: None,
            remaining_duration: None,
        })
        .collect()
}

fn parse_duration(text: &str) -> Option<u32> {
    let (minutes, seconds) = text.trim().split_once(':')?;
    let minutes = minutes.parse::<u32>().ok()?;
    let seconds = seconds.parse::<u32>().ok()?;
    (minutes < 60 && seconds < 60).then_some(minutes * 60 + seconds)
}

/// Sections for tutorials: a leading `Duration: mm:ss` element is lifted out of
/// the content, and each timed section learns how many minutes remain after it.
pub fn get_tutorial_sections(processed_html: &str) -> Vec<DocumentSection> {
    let html = Html::parse_fragment(processed_html);
    let mut sections = Vec::new();

    for (title, nodes) in h2_sections(&html) {
        let first_element = nodes.iter().position(|n| n.value().is_element());
        let duration = first_element
            .and_then(|idx| ElementRef::wrap(nodes[idx]))
            .map(section::element_text)
            .filter(|text| text.starts_with("Duration"))
            .map(|text| text.replace("Duration: ", ""));

        let content_nodes = nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| duration.is_none() || Some(*idx) != first_element)
            .map(|(_, node)| *node);

        sections.push(DocumentSection {
            slug: section_slug(&title),
            content: section::nodes_html(content_nodes).trim().to_owned(),
            title,
            duration,
            remaining_duration: None,
        });
    }

    let total: u32 = sections
        .iter()
        .filter_map(|s| s.duration.as_deref().and_then(parse_duration))
        .sum();
    let mut remaining = total;
    for section in &mut sections {
        if let Some(seconds) = section.duration.as_deref().and_then(parse_duration) {
            remaining = remaining.saturating_sub(seconds);
            section.remaining_duration = Some(remaining / 60);
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor<'a>(url_map: &'a UrlMap, redirects: &'a RedirectMap) -> ContentProcessor<'a> {
        ContentProcessor::new("https://forum.example.com", "/docs", url_map, redirects)
    }

    #[test]
    fn info_blockquote_becomes_notification() -> anyhow::Result<()> {
        let url_map = UrlMap::new();
        let redirects = RedirectMap::new();
        let html = processor(&url_map, &redirects)
            .process_topic_html("<blockquote><p>ⓘ Hello</p></blockquote>")?;

        assert_eq!(
            html,
            "<div class=\"p-notification\"><div class=\"p-notification__response\">\
             <p class=\"u-no-padding--top u-no-margin--bottom\">Hello</p></div></div>"
        );
        Ok(())
    }

    #[test]
    fn warning_blockquote_becomes_caution() -> anyhow::Result<()> {
        let html = process_page_html(
            r#"<blockquote><p><img title=":warning:" class="emoji" alt=":warning:"> Careful</p><p>More</p></blockquote>"#,
        )?;

        assert!(html.starts_with("<div class=\"p-notification--caution\">"));
        assert!(html.contains("<p class=\"u-no-padding--top\">Careful</p>"));
        assert!(html.contains("<p class=\"u-no-margin--bottom\">More</p>"));
        assert!(!html.contains("<img"));
        Ok(())
    }

    #[test]
    fn plain_blockquotes_are_left_alone() -> anyhow::Result<()> {
        let html = process_page_html("<blockquote><p>Just a quote</p></blockquote>")?;
        assert_eq!(html, "<blockquote><p>Just a quote</p></blockquote>");
        Ok(())
    }

    #[test]
    fn notes_to_editors_are_removed() -> anyhow::Result<()> {
        let html = process_page_html(
            r#"<aside class="quote no-group"><blockquote><p><strong>NOTE TO EDITORS</strong></p><p>secret</p></blockquote></aside><p>public</p>"#,
        )?;
        assert_eq!(html, "<p>public</p>");
        Ok(())
    }

    #[test]
    fn links_point_at_pretty_paths() -> anyhow::Result<()> {
        let mut url_map = UrlMap::new();
        url_map.insert("/docs/a", 10);
        let mut redirects = RedirectMap::new();
        redirects.insert("/docs/t/old/11".to_owned(), "/docs/new".to_owned());
        let processor = processor(&url_map, &redirects);

        assert_eq!(
            processor.rewrite_href("https://forum.example.com/t/page-a/10#intro", "A"),
            Some("/docs/a#intro".to_owned())
        );
        assert_eq!(
            processor.rewrite_href("/t/old/11", "Old"),
            Some("/docs/new".to_owned())
        );
        assert_eq!(
            processor.rewrite_href("/t/other/12", "Other"),
            Some("/docs/t/other/12".to_owned())
        );
        assert_eq!(
            processor.rewrite_href("/u/jane", "@jane"),
            Some("https://forum.example.com/u/jane".to_owned())
        );
        assert_eq!(
            processor.rewrite_href("/uploads/default/1.png", "image"),
            Some("https://forum.example.com/uploads/default/1.png".to_owned())
        );
        assert_eq!(processor.rewrite_href("https://example.com/t/x/5", "x"), None);
        assert_eq!(processor.rewrite_href("/docs/a", "A"), None);

        let html = processor.process_topic_html(r#"<p><a href="/t/page-a/10">A</a></p>"#)?;
        assert_eq!(html, r#"<p><a href="/docs/a">A</a></p>"#);
        Ok(())
    }

    #[test]
    fn polls_become_radio_inputs() -> anyhow::Result<()> {
        let html = process_page_html(
            r#"<h3>Favourite?</h3><div class="poll" data-poll-name="fav"><div><div class="poll-container"><ul><li data-poll-option-id="o1">Red</li><li data-poll-option-id="o2">Blue</li></ul></div><div class="poll-info">2 votes</div></div></div>"#,
        )?;

        assert!(html.contains(r#"<h3 id="fav">Favourite?</h3>"#));
        assert!(html.contains(r#"<input id="o1" name="fav" type="radio"><label for="o1">Red</label>"#));
        assert!(html.contains(r#"<label for="o2">Blue</label>"#));
        assert!(!html.contains("poll-info"));
        assert!(!html.contains("<li"));
        Ok(())
    }

    #[test]
    fn lightbox_meta_is_dropped() -> anyhow::Result<()> {
        let html = process_page_html(
            r#"<div class="lightbox-wrapper"><a class="lightbox" href="/img.png"><img src="/img.png"><div class="meta">1024x768</div></a></div>"#,
        )?;
        assert!(!html.contains("1024x768"));
        assert!(html.contains("<img src=\"/img.png\">"));
        Ok(())
    }

    #[test]
    fn sections_split_at_h2() {
        let sections = get_sections("<p>intro</p><h2>First Step!</h2><p>a</p><h3>sub</h3><h2>Second</h2><p>b</p>");

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "First Step!");
        assert_eq!(sections[0].slug, "first-step");
        assert_eq!(sections[0].content, "<p>a</p><h3>sub</h3>");
        assert_eq!(sections[1].content, "<p>b</p>");
    }

    #[test]
    fn tutorial_sections_track_duration() {
        let sections = get_tutorial_sections(
            "<h2>One</h2><p>Duration: 5:00</p><p>a</p><h2>Two</h2><p>Duration: 10:30</p><p>b</p><h2>Three</h2><p>c</p>",
        );

        assert_eq!(sections[0].duration.as_deref(), Some("5:00"));
        assert_eq!(sections[0].content, "<p>a</p>");
        assert_eq!(sections[0].remaining_duration, Some(10));
        assert_eq!(sections[1].remaining_duration, Some(0));
        assert_eq!(sections[2].duration, None);
        assert_eq!(sections[2].content, "<p>c</p>");
    }
}
