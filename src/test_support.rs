//! Fake upstream services for tests: a real axum server on an ephemeral port
//! that answers canned replies and records what it received.

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::post;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Recorded>>>);

impl Recorder {
    fn record(&self, path: &str, headers: HeaderMap, raw: &str) {
        let body = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        self.0.lock().unwrap().push(Recorded {
            path: path.to_string(),
            headers,
            body,
        });
    }

    pub fn hits(&self, path: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|r| r.path == path).count()
    }

    pub fn last(&self, path: &str) -> Option<Recorded> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.path == path)
            .cloned()
    }
}

pub struct FakeUpstream {
    router: Router,
    recorder: Recorder,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            recorder: Recorder::default(),
        }
    }

    /// Answers every POST to `path` with `status` and a JSON content type.
    pub fn reply(mut self, path: &'static str, status: u16, body: impl Into<String>) -> Self {
        let recorder = self.recorder.clone();
        let body = body.into();
        let status = StatusCode::from_u16(status).unwrap();

        self.router = self.router.route(
            path,
            post(move |headers: HeaderMap, raw: String| {
                let recorder = recorder.clone();
                let body = body.clone();
                async move {
                    recorder.record(path, headers, &raw);
                    (status, [(header::CONTENT_TYPE, "application/json")], body)
                }
            }),
        );
        self
    }

    pub async fn start(self) -> (String, Recorder) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router;
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{}", addr), self.recorder)
    }
}

/// OpenAI-style completion body whose first choice says `content`.
pub fn completion_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
    .to_string()
}
