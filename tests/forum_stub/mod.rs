use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::json;

/// A topic served by the stub: `(id, slug, title, cooked)`.
#[derive(Debug, Clone)]
pub struct StubTopic {
    pub id: u64,
    pub slug: &'static str,
    pub title: &'static str,
    pub cooked: String,
}

impl StubTopic {
    pub fn new(id: u64, slug: &'static str, title: &'static str, cooked: impl Into<String>) -> Self {
        Self {
            id,
            slug,
            title,
            cooked: cooked.into(),
        }
    }

    fn json(&self) -> String {
        json!({
            "id": self.id,
            "slug": self.slug,
            "title": self.title,
            "post_stream": {"posts": [{"cooked": self.cooked, "updated_at": "2024-01-02T03:04:05Z"}]}
        })
        .to_string()
    }

    fn row(&self) -> serde_json::Value {
        json!([self.id, self.title, self.slug, self.cooked])
    }

    fn listed(&self) -> serde_json::Value {
        json!({"id": self.id, "slug": self.slug, "title": self.title})
    }
}

/// Serves `/t/<id>.json`, the Data Explorer run endpoint and a single-page
/// `/c/<id>.json` listing every topic.
pub struct ForumStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ForumStub {
    pub fn spawn(topics: Vec<StubTopic>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start forum stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");
        let topics = topics
            .into_iter()
            .map(|topic| (topic.id, topic))
            .collect::<HashMap<_, _>>();

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                let json_header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .expect("content-type header");

                if request.method() == &tiny_http::Method::Post
                    && path.starts_with("/admin/plugins/explorer/queries/")
                {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let rows = requested_ids(&body)
                        .iter()
                        .filter_map(|id| topics.get(id))
                        .map(StubTopic::row)
                        .collect::<Vec<_>>();
                    let _ = request.respond(
                        tiny_http::Response::from_string(json!({ "rows": rows }).to_string())
                            .with_header(json_header),
                    );
                    continue;
                }

                if path.starts_with("/c/") {
                    let mut listed = topics.values().collect::<Vec<_>>();
                    listed.sort_by_key(|topic| topic.id);
                    let body = json!({
                        "topic_list": {"topics": listed.iter().map(|t| t.listed()).collect::<Vec<_>>()}
                    });
                    let _ = request.respond(
                        tiny_http::Response::from_string(body.to_string()).with_header(json_header),
                    );
                    continue;
                }

                let topic = path
                    .strip_prefix("/t/")
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .and_then(|id| id.parse::<u64>().ok())
                    .and_then(|id| topics.get(&id));
                let response = match topic {
                    Some(topic) => tiny_http::Response::from_string(topic.json()).with_header(json_header),
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for ForumStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Topic ids from a form-encoded `params={"topics":"1,2"}` body.
fn requested_ids(body: &str) -> Vec<u64> {
    let Some(encoded) = body.strip_prefix("params=") else {
        return Vec::new();
    };
    let decoded = url::form_urlencoded::parse(format!("p={encoded}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();
    let params: serde_json::Value = serde_json::from_str(&decoded).unwrap_or_default();
    params
        .get("topics")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}
