//! Request path → topic resolution over a parsed index.

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::SiteKind;
use crate::error::ResolveError;
use crate::formats::TopicId;
use crate::index::ParsedIndex;
use crate::topic_url::{home_path, join_prefix, match_topic_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub topic_id: TopicId,
    /// Docs version path the request was made under; empty otherwise.
    pub version: String,
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

impl ParsedIndex {
    /// Resolve a path relative to the site prefix.
    ///
    /// Explicit redirects win over mapped paths, and mapped paths win over
    /// raw topic URLs. A raw topic URL for a mapped topic redirects to its
    /// pretty path; an unmapped one is served as is.
    pub fn resolve_path(&self, relative_path: &str) -> Result<Resolved, ResolveError> {
        let relative_path = with_leading_slash(relative_path);
        let full_path = home_path(&join_prefix(&self.url_prefix, &relative_path));
        let version = self.detect_version(&relative_path);
        let url_map = self.version_url_map(&version);

        if self.kind == SiteKind::Engage {
            return url_map
                .topic_id(&full_path)
                .map(|topic_id| Resolved { topic_id, version })
                .ok_or_else(|| ResolveError::not_found(relative_path));
        }

        if let Some(target) = self.redirect_map.get(&full_path) {
            return Err(ResolveError::redirect(full_path, target.clone()));
        }

        if let Some(topic_id) = url_map.topic_id(&full_path) {
            return Ok(Resolved { topic_id, version });
        }

        let topic = match_topic_path(&relative_path)
            .ok_or_else(|| ResolveError::not_found(relative_path))?;

        if let Some(pretty) = url_map.path(topic.topic_id) {
            return Err(ResolveError::redirect(full_path, pretty));
        }

        Ok(Resolved {
            topic_id: topic.topic_id,
            version,
        })
    }

    /// Version path named by the first segment of `relative_path`, or the
    /// main version.
    pub fn detect_version(&self, relative_path: &str) -> String {
        let first = relative_path
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default();
        if !first.is_empty() && self.versions.iter().any(|v| v.path == first) {
            first.to_owned()
        } else {
            String::new()
        }
    }

    /// The same page under every version, falling back to a version's home
    /// when the page does not exist there.
    pub fn resolve_path_all_versions(
        &self,
        relative_path: &str,
        current_version: &str,
    ) -> IndexMap<String, String> {
        let mut relative = with_leading_slash(relative_path);
        if !current_version.is_empty() {
            let version_root = format!("/{current_version}/");
            if let Some(rest) = relative.strip_prefix(version_root.as_str()) {
                relative = format!("/{rest}");
            }
        }

        self.url_maps
            .iter()
            .map(|(version, url_map)| {
                let version_relative = if version.is_empty() {
                    relative.clone()
                } else {
                    format!("/{version}{relative}")
                };
                let candidate = home_path(&join_prefix(&self.url_prefix, &version_relative));
                let path = if url_map.contains_path(&candidate) {
                    candidate
                } else {
                    home_path(&join_prefix(&self.url_prefix, version))
                };
                (version.clone(), path)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::docs::DocVersion;
    use crate::navigation::NavigationItem;
    use crate::url_map::UrlMap;

    fn parsed(kind: SiteKind, prefix: &str) -> anyhow::Result<ParsedIndex> {
        parsed_from(kind, prefix, "")
    }

    fn parsed_from(kind: SiteKind, prefix: &str, cooked: &str) -> anyhow::Result<ParsedIndex> {
        let config = SiteConfig::new("https://forum.example.com", 34, prefix, kind);
        let topic = serde_json::from_value(serde_json::json!({
            "id": 34,
            "slug": "index",
            "title": "Index",
            "post_stream": {"posts": [{"cooked": cooked, "updated_at": "2024-01-02T03:04:05Z"}]}
        }))?;
        let forum = NoForum;
        Ok(crate::index::parse_index_topic(
            topic,
            &forum,
            &config,
            &crate::error::MemoryErrorSink::default(),
        ))
    }

    struct NoForum;

    impl crate::forum::TopicSource for NoForum {
        fn base_url(&self) -> &str {
            "https://forum.example.com"
        }

        fn get_topic(&self, _: TopicId) -> Result<crate::formats::Topic, crate::error::ForumError> {
            Err(crate::error::ForumError::MissingQueryId)
        }

        fn get_topics(
            &self,
            _: &[TopicId],
        ) -> Result<Vec<crate::formats::TopicRow>, crate::error::ForumError> {
            Ok(Vec::new())
        }

        fn category_topics(
            &self,
            _: u64,
        ) -> Result<Vec<crate::formats::CategoryTopic>, crate::error::ForumError> {
            Ok(Vec::new())
        }
    }

    fn resolved(topic_id: TopicId) -> Result<Resolved, ResolveError> {
        Ok(Resolved {
            topic_id,
            version: String::new(),
        })
    }

    #[test]
    fn resolution_order() -> anyhow::Result<()> {
        let mut index = parsed(SiteKind::Docs, "/")?;
        let mut url_map = UrlMap::new();
        url_map.insert("/a", 10);
        url_map.insert_home("/", 34);
        index.url_map = url_map.clone();
        index.url_maps.insert(String::new(), url_map);
        index.redirect_map.insert("/redir-a".to_owned(), "/a".to_owned());
        // A clash the parser would refuse; the redirect must still win.
        index.redirect_map.insert("/a".to_owned(), "/elsewhere".to_owned());

        assert_eq!(
            index.resolve_path("/redir-a"),
            Err(ResolveError::redirect("/redir-a", "/a"))
        );
        assert_eq!(
            index.resolve_path("/a"),
            Err(ResolveError::redirect("/a", "/elsewhere"))
        );
        index.redirect_map.remove("/a");

        assert_eq!(index.resolve_path("/a"), resolved(10));
        assert_eq!(index.resolve_path("a"), resolved(10));
        assert_eq!(index.resolve_path("/"), resolved(34));
        assert_eq!(index.resolve_path("/a/"), resolved(10));
        assert_eq!(
            index.resolve_path("/t/some-other-slug/10"),
            Err(ResolveError::redirect("/t/some-other-slug/10", "/a"))
        );
        assert_eq!(index.resolve_path("/t/unmapped/77"), resolved(77));
        assert_eq!(index.resolve_path("/t/unmapped/77/3"), resolved(77));
        assert_eq!(
            index.resolve_path("/nothing-here"),
            Err(ResolveError::not_found("/nothing-here"))
        );
        Ok(())
    }

    #[test]
    fn every_mapped_path_round_trips() -> anyhow::Result<()> {
        let index = versioned()?;
        for (version, url_map) in &index.url_maps {
            for (path, topic_id) in url_map.paths() {
                let relative = path.strip_prefix("/docs").unwrap_or(path);
                let resolved = index.resolve_path(relative);
                assert_eq!(
                    resolved.map(|r| (r.topic_id, r.version)),
                    Ok((topic_id, version.clone())),
                    "{path}"
                );
            }
        }
        Ok(())
    }

    #[test]
    fn trailing_slash_rows_resolve_like_any_other() -> anyhow::Result<()> {
        let index = parsed_from(
            SiteKind::Docs,
            "/docs",
            r#"<h2>Navigation</h2>
<table>
<tr><th>Level</th><th>Path</th><th>Navlink</th></tr>
<tr><td>0</td><td>install/</td><td><a href="/t/install/10">Install</a></td></tr>
</table>
<h2>Redirects</h2>
<table>
<tr><th>Path</th><th>Location</th></tr>
<tr><td>/docs/old/</td><td>/docs/install/</td></tr>
</table>"#,
        )?;

        assert_eq!(index.url_map.path(10), Some("/docs/install"));
        assert_eq!(index.resolve_path("/install/"), resolved(10));
        assert_eq!(index.resolve_path("/install"), resolved(10));
        assert_eq!(
            index.resolve_path("/old/"),
            Err(ResolveError::redirect("/docs/old", "/docs/install"))
        );
        assert_eq!(
            index.resolve_path("/t/x/10"),
            Err(ResolveError::redirect("/docs/t/x/10", "/docs/install"))
        );
        assert_eq!(index.resolve_path_all_versions("/install/", "")[""], "/docs/install");

        for (path, topic_id) in index.url_map.paths() {
            let relative = path.strip_prefix("/docs").unwrap_or(path);
            assert_eq!(index.resolve_path(relative).map(|r| r.topic_id), Ok(topic_id), "{path}");
        }
        Ok(())
    }

    #[test]
    fn engage_only_serves_mapped_paths() -> anyhow::Result<()> {
        let mut index = parsed(SiteKind::Engage, "/engage")?;
        index.url_map.insert("/engage/cloud", 10);
        index.url_maps.insert(String::new(), index.url_map.clone());

        assert_eq!(index.resolve_path("/cloud"), resolved(10));
        assert_eq!(
            index.resolve_path("/t/cloud/10"),
            Err(ResolveError::not_found("/t/cloud/10"))
        );
        Ok(())
    }

    fn versioned() -> anyhow::Result<ParsedIndex> {
        let mut index = parsed(SiteKind::Docs, "/docs")?;
        index.versions = vec![
            DocVersion {
                index: 34,
                path: String::new(),
                version: "2.x".to_owned(),
            },
            DocVersion {
                index: 50,
                path: "v1".to_owned(),
                version: "1.x".to_owned(),
            },
        ];
        let mut latest = UrlMap::new();
        latest.insert("/docs/install", 100);
        latest.insert("/docs/upgrade", 101);
        latest.insert_home("/docs", 34);
        let mut v1 = UrlMap::new();
        v1.insert("/docs/v1/install", 200);
        v1.insert_home("/docs/v1", 50);

        index.url_maps = IndexMap::from([
            (String::new(), latest.clone()),
            ("v1".to_owned(), v1.clone()),
        ]);
        index.url_map = latest;
        index.url_map.extend(&v1);
        index.navigations.insert("v1".to_owned(), vec![NavigationItem::default()]);
        Ok(index)
    }

    #[test]
    fn versioned_paths_resolve_within_their_version() -> anyhow::Result<()> {
        let index = versioned()?;

        assert_eq!(
            index.resolve_path("/v1/install"),
            Ok(Resolved {
                topic_id: 200,
                version: "v1".to_owned()
            })
        );
        assert_eq!(index.resolve_path("/install"), resolved(100));
        assert_eq!(index.resolve_path("/"), resolved(34));
        assert_eq!(
            index.resolve_path("/v1"),
            Ok(Resolved {
                topic_id: 50,
                version: "v1".to_owned()
            })
        );
        assert_eq!(index.navigation_for("v1", None).len(), 1);
        Ok(())
    }

    #[test]
    fn all_versions_fall_back_to_version_home() -> anyhow::Result<()> {
        let index = versioned()?;

        let paths = index.resolve_path_all_versions("/install", "");
        assert_eq!(paths[""], "/docs/install");
        assert_eq!(paths["v1"], "/docs/v1/install");

        let paths = index.resolve_path_all_versions("/v1/install", "v1");
        assert_eq!(paths[""], "/docs/install");

        let paths = index.resolve_path_all_versions("/upgrade", "");
        assert_eq!(paths[""], "/docs/upgrade");
        assert_eq!(paths["v1"], "/docs/v1");
        Ok(())
    }
}
