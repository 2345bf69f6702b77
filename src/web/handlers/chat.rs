use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};

use super::api::not_found;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub stream: bool,
}

/// OpenAI-compatible entry point: `model` names the pipeline, the last user
/// message is the question and the whole body is handed to `pipe`.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, (StatusCode, String)> {
    let request: ChatCompletionRequest = serde_json::from_value(body.clone()).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid chat completion request: {}", e),
        )
    })?;

    let pipeline = state
        .registry
        .get(&request.model)
        .ok_or_else(|| not_found(&request.model))?;

    let user_message = last_user_message(&request.messages).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "No user message found in request".to_string(),
        )
    })?;

    debug!("Routing message to pipeline {}", pipeline.id);

    let reply = pipeline
        .pipe(&user_message, &request.model, &request.messages, &body)
        .await
        .map_err(|e| {
            error!("Pipeline {} failed: {}", pipeline.id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    if request.stream {
        Ok(stream_reply(&request.model, reply).into_response())
    } else {
        Ok(Json(completion(&request.model, reply)).into_response())
    }
}

fn last_user_message(messages: &[Value]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|message| message["role"] == "user")
        .and_then(|message| message_text(&message["content"]))
}

// Content is either a string or a list of typed parts
fn message_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part["type"] == "text")
                .filter_map(|part| part["text"].as_str())
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

fn completion(model: &str, reply: String) -> Value {
    json!({
        "id": completion_id(),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": reply },
            "logprobs": null,
            "finish_reason": "stop"
        }]
    })
}

fn chunk(id: &str, created: i64, model: &str, delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "logprobs": null,
            "finish_reason": finish_reason
        }]
    })
}

fn stream_reply(
    model: &str,
    reply: String,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + use<>> {
    let id = completion_id();
    let created = chrono::Utc::now().timestamp();

    let events = vec![
        Event::default().data(chunk(&id, created, model, json!({ "content": reply }), None).to_string()),
        Event::default().data(chunk(&id, created, model, json!({}), Some("stop")).to_string()),
        Event::default().data("[DONE]"),
    ];

    Sse::new(tokio_stream::iter(events.into_iter().map(Ok)))
}
