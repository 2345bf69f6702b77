use crate::config::TranslatorConfig;
use crate::t2q::{ExtractSchemaRequest, T2qError, TranslateForm, TranslateResponse, Translator};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

const API_KEY_HEADER: &str = "X-API-Key";

pub struct HttpTranslator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTranslator {
    pub fn new(config: &TranslatorConfig) -> Result<Self, T2qError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| T2qError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// POSTs `body` and returns the raw response text of a 200 reply.
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String, T2qError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| T2qError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status != StatusCode::OK {
            error!("Received status code {} from {} and error: {}", status, url, text);
            return Err(T2qError::StatusError {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn extract_schema(&self, request: &ExtractSchemaRequest) -> Result<String, T2qError> {
        info!("Extracting schema '{}' through T2Q", request.schema_id);
        let text = self.post("/v1/t2q/extract-schema", request).await?;

        // Stored as compact JSON whatever the server's formatting was
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| T2qError::ResponseError(format!("{} - Response was: {}", e, text)))?;

        Ok(value.to_string())
    }

    async fn translate(&self, form: &TranslateForm) -> Result<Option<String>, T2qError> {
        let text = self.post("/v1/t2q/translate", form).await?;

        let response: TranslateResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Failed to parse T2Q response: {} - Response was: {}", e, text);
            T2qError::ResponseError(e.to_string())
        })?;

        let sql = response
            .predicted_sql_query
            .filter(|sql| !sql.trim().is_empty());
        debug!("Predicted SQL: {:?}", sql);

        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::t2q::BusinessExample;
    use crate::test_support::FakeUpstream;

    fn translator(base_url: &str) -> HttpTranslator {
        HttpTranslator::new(&TranslatorConfig {
            base_url: format!("{}/", base_url),
            api_key: "secret-key".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn form() -> TranslateForm {
        TranslateForm {
            human_question: "how many employees are there".to_string(),
            db_id: "hr".to_string(),
            icl_type: "zero_shot".to_string(),
            business_context: "HR data".to_string(),
            business_rules: vec!["count active staff only".to_string()],
            business_examples: vec![BusinessExample {
                question: "headcount".to_string(),
                sql_query: "SELECT COUNT(*) FROM employees".to_string(),
            }],
            schema_description: "employees(id, name)".to_string(),
        }
    }

    #[tokio::test]
    async fn translate_sends_form_with_api_key() {
        let (url, recorder) = FakeUpstream::new()
            .reply(
                "/v1/t2q/translate",
                200,
                r#"{"predicted_sql_query": "SELECT COUNT(*) FROM employees", "confidence": 0.9}"#,
            )
            .start()
            .await;

        let sql = translator(&url).translate(&form()).await.unwrap();
        assert_eq!(sql.as_deref(), Some("SELECT COUNT(*) FROM employees"));

        let request = recorder.last("/v1/t2q/translate").unwrap();
        assert_eq!(request.headers["x-api-key"], "secret-key");
        assert_eq!(request.body["human_question"], "how many employees are there");
        assert_eq!(request.body["db_id"], "hr");
        assert_eq!(request.body["icl_type"], "zero_shot");
        assert_eq!(request.body["business_rules"][0], "count active staff only");
        assert_eq!(request.body["business_examples"][0]["sql_query"], "SELECT COUNT(*) FROM employees");
        assert_eq!(request.body["schema_description"], "employees(id, name)");
    }

    #[tokio::test]
    async fn null_or_blank_prediction_is_none() {
        let (url, _) = FakeUpstream::new()
            .reply("/v1/t2q/translate", 200, r#"{"predicted_sql_query": null}"#)
            .start()
            .await;
        assert_eq!(translator(&url).translate(&form()).await.unwrap(), None);

        let (url, _) = FakeUpstream::new()
            .reply("/v1/t2q/translate", 200, r#"{"predicted_sql_query": "  "}"#)
            .start()
            .await;
        assert_eq!(translator(&url).translate(&form()).await.unwrap(), None);

        let (url, _) = FakeUpstream::new()
            .reply("/v1/t2q/translate", 200, r#"{}"#)
            .start()
            .await;
        assert_eq!(translator(&url).translate(&form()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_200_is_a_status_error() {
        let (url, _) = FakeUpstream::new()
            .reply("/v1/t2q/translate", 500, "not json at all")
            .start()
            .await;

        match translator(&url).translate(&form()).await {
            Err(T2qError::StatusError { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "not json at all");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_a_response_error() {
        let (url, _) = FakeUpstream::new()
            .reply("/v1/t2q/translate", 200, "<html>oops</html>")
            .start()
            .await;

        let result = translator(&url).translate(&form()).await;
        assert!(matches!(result, Err(T2qError::ResponseError(_))));
    }

    #[tokio::test]
    async fn extract_schema_returns_compact_json() {
        let (url, recorder) = FakeUpstream::new()
            .reply("/v1/t2q/extract-schema", 200, r#"{"tables": ["employees"]}"#)
            .start()
            .await;

        let request = ExtractSchemaRequest {
            database_url: "postgresql://app:pw@db:5432/hr".to_string(),
            schema_id: "hr".to_string(),
        };
        let description = translator(&url).extract_schema(&request).await.unwrap();
        assert_eq!(description, r#"{"tables":["employees"]}"#);

        let sent = recorder.last("/v1/t2q/extract-schema").unwrap();
        assert_eq!(sent.headers["x-api-key"], "secret-key");
        assert_eq!(sent.body["database_url"], "postgresql://app:pw@db:5432/hr");
        assert_eq!(sent.body["schema_id"], "hr");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_connection_error() {
        let result = translator("http://127.0.0.1:1").translate(&form()).await;
        assert!(matches!(result, Err(T2qError::ConnectionError(_))));
    }
}
