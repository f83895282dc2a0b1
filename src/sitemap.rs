//! Sitemaps derived from the URL map.

use chrono::{DateTime, Utc};

use crate::forum::TopicSource;
use crate::formats::TopicId;
use crate::url_map::UrlMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub loc: String,
    pub topic_id: TopicId,
    pub lastmod: Option<DateTime<Utc>>,
}

fn absolute(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}

/// One absolute URL per mapped path, sorted.
pub fn sitemap_urls(url_map: &UrlMap, base_url: &str) -> Vec<String> {
    let mut urls = url_map
        .paths()
        .map(|(path, _)| absolute(base_url, path))
        .collect::<Vec<_>>();
    urls.sort();
    urls
}

pub fn render_text(url_map: &UrlMap, base_url: &str) -> String {
    let mut out = String::new();
    for url in sitemap_urls(url_map, base_url) {
        out.push_str(&url);
        out.push('\n');
    }
    out
}

/// Entries sorted by URL, with `lastmod` from each topic's first post.
///
/// A topic that cannot be fetched still gets an entry, without `lastmod`.
pub fn collect_entries(url_map: &UrlMap, base_url: &str, source: &dyn TopicSource) -> Vec<SitemapEntry> {
    let mut entries = url_map
        .paths()
        .map(|(path, topic_id)| {
            let lastmod = match source.get_topic(topic_id) {
                Ok(topic) => topic.updated_at(),
                Err(err) => {
                    tracing::warn!(topic_id, error = %err, "sitemap lastmod unavailable");
                    None
                }
            };
            SitemapEntry {
                loc: absolute(base_url, path),
                topic_id,
                lastmod,
            }
        })
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| a.loc.cmp(&b.loc));
    entries
}

pub fn render_xml(entries: &[SitemapEntry]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        out.push_str("  <url>\n");
        out.push_str(&format!("    <loc>{}</loc>\n", html_escape::encode_text(&entry.loc)));
        out.push_str("    <changefreq>weekly</changefreq>\n");
        if let Some(lastmod) = entry.lastmod {
            out.push_str(&format!(
                "    <lastmod>{}</lastmod>\n",
                lastmod.format("%Y-%m-%dT%H:%M:%S%:z")
            ));
        }
        out.push_str("  </url>\n");
    }
    out.push_str("</urlset>\n");
    out
}
