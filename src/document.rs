//! Turning a fetched topic into the document served for it.

use chrono::{DateTime, Utc};

use crate::config::SiteKind;
use crate::content::{self, ContentProcessor};
use crate::formats::{Document, Topic};
use crate::forum::TopicSource;
use crate::index::ParsedIndex;
use crate::section::{self, IndexSection};
use crate::tutorials;

impl ParsedIndex {
    /// Post-process a topic for this site and split it into sections.
    ///
    /// `source` is only asked for tutorial rows, on docs sites that embed
    /// tutorial cards.
    pub fn parse_topic(&self, topic: &Topic, source: &dyn TopicSource) -> anyhow::Result<Document> {
        self.parse_topic_at(topic, source, Utc::now())
    }

    pub fn parse_topic_at(
        &self,
        topic: &Topic,
        source: &dyn TopicSource,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Document> {
        let mut cooked = topic.cooked().to_owned();
        let mut warnings = Vec::new();
        if self.kind == SiteKind::Docs && self.is_version_index(topic.id) {
            let document = section::parse_fragment(&cooked);
            cooked = section::get_preamble(&document, IndexSection::Navigation.heading());
        }
        if self.kind == SiteKind::Docs && self.tutorials_index_topic_id.is_some() {
            let (replaced, card_warnings) =
                tutorials::replace_tutorial_tables(&cooked, source, &self.tutorials_url_map)?;
            cooked = replaced;
            warnings = card_warnings;
        }

        let processor = ContentProcessor::new(
            &self.forum_url,
            &self.url_prefix,
            &self.url_map,
            &self.redirect_map,
        );
        let body_html = processor.process_topic_html(&cooked)?;
        let sections = match self.kind {
            SiteKind::Tutorials => content::get_tutorial_sections(&body_html),
            _ => content::get_sections(&body_html),
        };

        Ok(Document {
            title: topic.title.clone(),
            body_html,
            sections,
            updated: topic
                .updated_at()
                .map(|then| humanize_since(then, now))
                .unwrap_or_default(),
            topic_id: topic.id,
            topic_path: topic.topic_path(),
            warnings,
        })
    }
}

fn plural(count: i64, one: &str, unit: &str) -> String {
    if count == 1 {
        one.to_owned()
    } else {
        format!("{count} {unit}s")
    }
}

/// "3 days ago" style rendering of the time between `then` and `now`.
pub fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then);
    let (seconds, suffix) = if delta.num_seconds() < 0 {
        (-delta.num_seconds(), "from now")
    } else {
        (delta.num_seconds(), "ago")
    };
    if seconds == 0 {
        return "now".to_owned();
    }
    let days = seconds / 86_400;

    let amount = if seconds < 60 {
        plural(seconds, "a second", "second")
    } else if seconds < 3_600 {
        plural(seconds / 60, "a minute", "minute")
    } else if days == 0 {
        plural(seconds / 3_600, "an hour", "hour")
    } else if days < 30 {
        plural(days, "a day", "day")
    } else if days < 365 {
        plural((days / 30).max(1), "a month", "month")
    } else {
        plural(days / 365, "a year", "year")
    };
    format!("{amount} {suffix}")
}
