use reqwest::StatusCode;

/// Outcome of a path lookup that did not yield a topic to serve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("Path {path} not found")]
    PathNotFound { path: String },

    #[error("Path {path} has moved to {target_url}")]
    RedirectFound { path: String, target_url: String },
}

impl ResolveError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    pub fn redirect(path: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self::RedirectFound {
            path: path.into(),
            target_url: target_url.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForumError {
    #[error("forum returned {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("bulk topic query requested but no Data Explorer query id is configured")]
    MissingQueryId,
}

impl ForumError {
    /// Upstream HTTP status, when the forum answered with an error status.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request { source, .. } | Self::Decode { source, .. } => source.status(),
            Self::MissingQueryId => None,
        }
    }
}

/// Errors raised while turning a request path into a served document.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Forum(#[from] ForumError),

    #[error("render topic {topic_id}: {message}")]
    Content { topic_id: u64, message: String },
}

/// A topic's key/value metadata table is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MetadataError(pub String);

/// External error tracker for editorial mistakes that should not fail a
/// request (bad metadata keys, missing links in metadata tables).
pub trait ErrorSink: Send + Sync {
    fn capture_message(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn capture_message(&self, message: &str) {
        tracing::error!(message, "captured content error");
    }
}

/// Keeps captured messages in memory.
#[derive(Debug, Default)]
pub struct MemoryErrorSink {
    messages: std::sync::Mutex<Vec<String>>,
}

impl MemoryErrorSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ErrorSink for MemoryErrorSink {
    fn capture_message(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message.to_owned());
    }
}
