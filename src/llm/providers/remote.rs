use crate::config::LlmConfig;
use crate::llm::{ChatCompleter, ChatMessage, CompletionRequest, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible `/chat/completions` endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_url.trim().is_empty() {
            return Err(LlmError::ConfigError(
                "API URL is required for remote LLM provider".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: format!("{}/chat/completions", config.api_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatCompleter for RemoteLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = PromptRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("Sending completion request to {} with model {}", self.api_url, self.model);

        let mut builder = self.client.post(&self.api_url).json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let choice = prompt_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))?;

        choice
            .message
            .content
            .ok_or_else(|| LlmError::ResponseError("Empty message content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeUpstream, completion_body};

    fn provider(api_url: &str) -> RemoteLlmProvider {
        RemoteLlmProvider::new(&LlmConfig {
            model: "gpt-4o-mini".to_string(),
            api_url: api_url.to_string(),
            api_key: "sk-test".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("hello")],
            temperature: 0.0,
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn posts_openai_shaped_request() {
        let (url, recorder) = FakeUpstream::new()
            .reply("/v1/chat/completions", 200, completion_body("True"))
            .start()
            .await;

        let content = provider(&format!("{}/v1", url)).complete(request()).await.unwrap();
        assert_eq!(content, "True");

        let sent = recorder.last("/v1/chat/completions").unwrap();
        assert_eq!(sent.headers["authorization"], "Bearer sk-test");
        assert_eq!(sent.body["model"], "gpt-4o-mini");
        assert_eq!(sent.body["temperature"], 0.0);
        assert_eq!(sent.body["max_tokens"], 10);
        assert_eq!(sent.body["messages"][0]["role"], "system");
        assert_eq!(sent.body["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn error_status_and_empty_choices_are_errors() {
        let (url, _) = FakeUpstream::new()
            .reply("/chat/completions", 429, r#"{"error": "rate limited"}"#)
            .start()
            .await;
        let result = provider(&url).complete(request()).await;
        assert!(matches!(result, Err(LlmError::ResponseError(_))));

        let (url, _) = FakeUpstream::new()
            .reply("/chat/completions", 200, r#"{"choices": []}"#)
            .start()
            .await;
        let result = provider(&url).complete(request()).await;
        assert!(matches!(result, Err(LlmError::ResponseError(_))));
    }

    #[test]
    fn blank_api_url_is_a_config_error() {
        let result = RemoteLlmProvider::new(&LlmConfig {
            api_url: " ".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(LlmError::ConfigError(_))));
    }
}
