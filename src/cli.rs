use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{SiteConfig, SiteKind};
use crate::engage::EngageQuery;
use crate::formats::TopicId;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub site: SiteArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the parsed index topic as JSON.
    Index,
    /// Resolve a path relative to the site prefix.
    Resolve(PathArgs),
    /// Resolve a path and print the processed page as JSON.
    Topic(PathArgs),
    Sitemap(SitemapArgs),
    /// Print the data tables of a category index as JSON.
    Tables,
    /// Print the engage page listing as JSON.
    Pages(EngageQuery),
    /// Print the engage page mapped at a full path as JSON.
    EngagePage(FullPathArgs),
    /// Print every tag used by engage pages.
    Tags,
    /// Print the active takeovers as JSON.
    Takeovers,
}

#[derive(Debug, Args)]
pub struct SiteArgs {
    /// YAML site configuration. Flags below override its values.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Forum base URL (must be http/https).
    #[arg(long, global = true)]
    pub forum_url: Option<String>,

    #[arg(long, global = true)]
    pub index_topic: Option<TopicId>,

    /// Path the site is served under.
    #[arg(long, global = true)]
    pub url_prefix: Option<String>,

    #[arg(long, global = true, value_enum)]
    pub kind: Option<SiteKind>,

    /// Data Explorer query used for bulk topic fetches.
    #[arg(long, global = true)]
    pub topics_query_id: Option<u64>,

    /// Category listed by a category site.
    #[arg(long, global = true)]
    pub category_id: Option<u64>,

    /// Tutorials index used for tutorial cards inside docs pages.
    #[arg(long, global = true)]
    pub tutorials_index_topic: Option<TopicId>,
}

impl SiteArgs {
    /// The configuration file (if any) with flags applied on top.
    pub fn site_config(&self) -> anyhow::Result<SiteConfig> {
        let mut config = match &self.config {
            Some(path) => SiteConfig::load(path)?,
            None => {
                let forum_url = self
                    .forum_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("--forum-url or --config is required"))?;
                let index_topic = self
                    .index_topic
                    .ok_or_else(|| anyhow::anyhow!("--index-topic or --config is required"))?;
                SiteConfig::new(forum_url, index_topic, "/docs", SiteKind::default())
            }
        };

        if let Some(forum_url) = &self.forum_url {
            config.forum_url.clone_from(forum_url);
        }
        if let Some(index_topic) = self.index_topic {
            config.index_topic_id = index_topic;
        }
        if let Some(url_prefix) = &self.url_prefix {
            config.url_prefix.clone_from(url_prefix);
        }
        if let Some(kind) = self.kind {
            config.kind = kind;
        }
        if let Some(query_id) = self.topics_query_id {
            config.topics_query_id = Some(query_id);
        }
        if let Some(category_id) = self.category_id {
            config.category_id = Some(category_id);
        }
        if let Some(topic_id) = self.tutorials_index_topic {
            config.tutorials_index_topic_id = Some(topic_id);
        }
        config.normalized()
    }
}

#[derive(Debug, Args)]
pub struct PathArgs {
    /// Request path relative to the site prefix, e.g. `/install`.
    #[arg(long)]
    pub path: String,
}

#[derive(Debug, Args)]
pub struct FullPathArgs {
    /// Path including the site prefix, e.g. `/engage/cloud`.
    #[arg(long)]
    pub path: String,
}

#[derive(Debug, Args)]
pub struct SitemapArgs {
    /// Print the XML variant with `lastmod` dates.
    #[arg(long)]
    pub xml: bool,

    /// Public origin the site is served from.
    #[arg(long, default_value = "http://localhost:8080")]
    pub base_url: String,
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;

    #[test]
    fn flags_build_a_config() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "forumdocs",
            "resolve",
            "--path",
            "/a",
            "--forum-url",
            "https://forum.example.com/",
            "--index-topic",
            "34",
            "--url-prefix",
            "/",
        ])?;
        let config = cli.site.site_config()?;

        assert_eq!(config.forum_url, "https://forum.example.com");
        assert_eq!(config.index_topic_id, 34);
        assert_eq!(config.url_prefix, "/");
        assert!(matches!(cli.command, Command::Resolve(PathArgs { ref path }) if path == "/a"));
        Ok(())
    }

    #[test]
    fn flags_override_the_config_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("site.yaml");
        std::fs::write(
            &path,
            "forum_url: https://forum.example.com\nindex_topic_id: 34\nkind: tutorials\n",
        )?;

        let cli = Cli::try_parse_from([
            "forumdocs",
            "--config",
            path.to_str().unwrap_or_default(),
            "--url-prefix",
            "tutorials",
            "index",
        ])?;
        let config = cli.site.site_config()?;

        assert_eq!(config.kind, SiteKind::Tutorials);
        assert_eq!(config.url_prefix, "/tutorials");
        Ok(())
    }

    #[test]
    fn pages_takes_listing_filters() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "forumdocs",
            "pages",
            "--key",
            "tag",
            "--value",
            "cloud",
            "--offset",
            "50",
        ])?;

        let Command::Pages(query) = cli.command else {
            panic!("expected the pages command");
        };
        assert_eq!(query.key.as_deref(), Some("tag"));
        assert_eq!(query.offset, 50);
        assert_eq!(query.limit, crate::engage::DEFAULT_PAGE_LIMIT);
        Ok(())
    }

    #[test]
    fn missing_forum_is_an_error() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["forumdocs", "index"])?;
        let err = cli.site.site_config().expect_err("no forum configured");
        assert!(err.to_string().contains("--forum-url"));
        Ok(())
    }
}
