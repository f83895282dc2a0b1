use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TopicId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub id: TopicId,
    pub slug: String,
    pub title: String,
    pub post_stream: PostStream,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostStream {
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub cooked: String,
    pub updated_at: DateTime<Utc>,
}

impl Topic {
    pub fn first_post(&self) -> Option<&Post> {
        self.post_stream.posts.first()
    }

    /// Cooked HTML of the first post, or an empty body for a topic without posts.
    pub fn cooked(&self) -> &str {
        self.first_post().map(|p| p.cooked.as_str()).unwrap_or_default()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.first_post().map(|p| p.updated_at)
    }

    /// Raw forum location of the topic, `/t/<slug>/<id>`.
    pub fn topic_path(&self) -> String {
        format!("/t/{}/{}", self.slug, self.id).replace('—', "--")
    }
}

/// One row of the bulk topic query: `[id, title, slug, cooked]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicRow {
    pub id: TopicId,
    pub title: String,
    pub slug: String,
    pub cooked: String,
}

impl TopicRow {
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let cells = value.as_array()?;
        Some(Self {
            id: cells.first()?.as_u64()?,
            title: cells.get(1)?.as_str()?.to_owned(),
            slug: cells.get(2)?.as_str()?.to_owned(),
            cooked: cells.get(3)?.as_str()?.to_owned(),
        })
    }
}

/// A topic as listed by `/c/<category>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryTopic {
    pub id: TopicId,
    pub slug: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPage {
    pub topic_list: CategoryTopicList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryTopicList {
    #[serde(default)]
    pub topics: Vec<CategoryTopic>,
    /// Present while there are more pages to fetch.
    #[serde(default)]
    pub more_topics_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub title: String,
    pub body_html: String,
    pub sections: Vec<DocumentSection>,
    pub updated: String,
    pub topic_id: TopicId,
    pub topic_path: String,
    /// Problems met while rendering, for the site's warning queue.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSection {
    pub title: String,
    pub slug: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_duration: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_path_replaces_em_dash() -> anyhow::Result<()> {
        let topic: Topic = serde_json::from_value(serde_json::json!({
            "id": 1,
            "slug": "sample—text",
            "title": "Sample",
            "post_stream": {"posts": [{"cooked": "empty", "updated_at": "2018-10-02T12:45:44.259Z"}]}
        }))?;

        assert_eq!(topic.topic_path(), "/t/sample--text/1");
        assert_eq!(topic.cooked(), "empty");
        Ok(())
    }

    #[test]
    fn category_page_reads_topics_and_paging() -> anyhow::Result<()> {
        let page: CategoryPage = serde_json::from_value(serde_json::json!({
            "topic_list": {
                "topics": [{"id": 5, "slug": "noble", "title": "Noble", "posts_count": 3}],
                "more_topics_url": "/c/security/7?page=1"
            }
        }))?;

        assert_eq!(page.topic_list.topics[0].slug, "noble");
        assert!(page.topic_list.more_topics_url.is_some());
        Ok(())
    }

    #[test]
    fn topic_row_rejects_short_rows() {
        let row = serde_json::json!([12, "Title", "slug", "<p>x</p>"]);
        let parsed = TopicRow::from_value(&row);
        assert_eq!(parsed.map(|r| r.id), Some(12));

        assert!(TopicRow::from_value(&serde_json::json!([12, "Title"])).is_none());
    }
}
