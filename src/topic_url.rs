//! Recognising forum topic links (`[/t]/[slug/]<id>[/<post>]`) and joining
//! paths under a site prefix.

use std::sync::LazyLock;

use regex::Regex;

use crate::formats::TopicId;

static TOPIC_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:/t)?(?:/(?P<slug>[^/]+))?/(?P<topic_id>\d+)(?:/\d+)?")
        .expect("BUG: hardcoded topic url regex is statically valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMatch {
    pub slug: Option<String>,
    pub topic_id: TopicId,
}

/// Match the start of `path` against the topic URL shape.
///
/// A zero id is treated as no match.
pub fn match_topic_path(path: &str) -> Option<TopicMatch> {
    let caps = TOPIC_URL.captures(path)?;
    let topic_id = caps.name("topic_id")?.as_str().parse::<TopicId>().ok()?;
    if topic_id == 0 {
        return None;
    }
    Some(TopicMatch {
        slug: caps.name("slug").map(|m| m.as_str().to_owned()),
        topic_id,
    })
}

/// Topic id from the path component of an href, whatever its host.
pub fn topic_id_from_href(href: &str) -> Option<TopicId> {
    match_topic_path(&href_path(href)).map(|m| m.topic_id)
}

/// Path component of an absolute or relative href, without query or fragment.
pub fn href_path(href: &str) -> String {
    if let Ok(url) = url::Url::parse(href) {
        return url.path().to_owned();
    }
    let end = href.find(['?', '#']).unwrap_or(href.len());
    href[..end].to_owned()
}

/// Fragment of an href, if any.
pub fn href_fragment(href: &str) -> Option<&str> {
    href.split_once('#')
        .map(|(_, fragment)| fragment)
        .filter(|f| !f.is_empty())
}

/// Recognises topic links that live on one forum.
#[derive(Debug, Clone)]
pub struct TopicLinks {
    forum_url: String,
}

impl TopicLinks {
    pub fn new(forum_url: &str) -> Self {
        Self {
            forum_url: forum_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn forum_url(&self) -> &str {
        &self.forum_url
    }

    /// Match a link that is either relative or on this forum.
    ///
    /// Links to other hosts never match.
    pub fn match_link(&self, link: &str) -> Option<TopicMatch> {
        let link = match link.strip_prefix("//") {
            Some(rest) => format!("http://{rest}"),
            None => link.to_owned(),
        };
        let link = if !self.forum_url.is_empty() {
            link.strip_prefix(self.forum_url.as_str())
                .map(str::to_owned)
                .unwrap_or(link)
        } else {
            link
        };
        match_topic_path(&link)
    }

    pub fn topic_id(&self, link: &str) -> Option<TopicId> {
        self.match_link(link).map(|m| m.topic_id)
    }

    /// Absolute forum URL for a forum-relative path.
    pub fn absolute(&self, path: &str) -> String {
        format!("{}/{}", self.forum_url, path.trim_start_matches('/'))
    }
}

/// Join `path` under `prefix` the way a filesystem join would, so that
/// `("/docs", "a")` and `("/docs/", "/a")` both give `/docs/a`.
pub fn join_prefix(prefix: &str, path: &str) -> String {
    let rest = path.trim_start_matches('/');
    if prefix.is_empty() {
        return format!("/{rest}");
    }
    if prefix.ends_with('/') {
        format!("{prefix}{rest}")
    } else {
        format!("{prefix}/{rest}")
    }
}

/// Home path for a prefix: the prefix without its trailing slash, unless it
/// is exactly `/`.
pub fn home_path(prefix: &str) -> String {
    if prefix == "/" || prefix.is_empty() {
        return "/".to_owned();
    }
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    }
}
