//! Text generation - the opaque completion collaborator and its Gemini client
//!
//! Every caller goes through [`TextGenerator`] so the conversation can be driven
//! by a scripted generator in tests and by [`LlmClient`] in production.

use crate::config::AppConfig;
use crate::error::CompletionError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt`. `model` overrides the generator's default model.
    async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String, CompletionError>;
}

pub struct LlmClient {
    api_key: Option<String>,
    base_url: String,
    model: Option<String>,
    temperature: f32,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: Option<String>, model: Option<String>, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.5,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.api_key.clone(), config.model.clone(), config.base_url.clone())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CompletionError::CredentialsMissing)?;
        let model = model
            .or(self.model.as_deref())
            .filter(|m| !m.trim().is_empty())
            .ok_or(CompletionError::ModelUnspecified)?;

        debug!(model, prompt_chars = prompt.len(), "calling generateContent");

        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Failed(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Failed(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Failed(format!("Failed to parse LLM response: {}", e)))?;

        parsed.into_text()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, CompletionError> {
        let text: String = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if !text.trim().is_empty() {
            return Ok(text);
        }

        // Blocked prompts carry the reason on the feedback, truncated output on the candidate.
        let reason = self
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .or_else(|| self.candidates.into_iter().next().and_then(|c| c.finish_reason));
        warn!(reason = reason.as_deref().unwrap_or("none"), "empty response or content was blocked");
        Err(CompletionError::EmptyResponse { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<String, CompletionError> {
        serde_json::from_str::<GenerateContentResponse>(raw)
            .unwrap()
            .into_text()
    }

    #[test]
    fn test_joins_candidate_parts() {
        let text = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"SELECT 1"},{"text":";"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(text, "SELECT 1;");
    }

    #[test]
    fn test_blocked_prompt_reports_reason() {
        let err = parse(r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert_eq!(err, CompletionError::EmptyResponse { reason: Some("SAFETY".into()) });
    }

    #[test]
    fn test_empty_candidate_reports_finish_reason() {
        let err = parse(r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#).unwrap_err();
        assert_eq!(err, CompletionError::EmptyResponse { reason: Some("MAX_TOKENS".into()) });
    }

    #[tokio::test]
    async fn test_missing_credentials_and_model_are_distinct() {
        let client = LlmClient::new(None, Some("gemini-2.0-flash".into()), "http://localhost".into());
        assert_eq!(
            client.complete("hi", None).await.unwrap_err(),
            CompletionError::CredentialsMissing
        );

        let client = LlmClient::new(Some("key".into()), None, "http://localhost".into());
        assert_eq!(
            client.complete("hi", None).await.unwrap_err(),
            CompletionError::ModelUnspecified
        );
    }

    #[test]
    fn test_endpoint_uses_requested_model() {
        let client = LlmClient::new(None, None, "https://example.test/v1beta/".into());
        assert_eq!(
            client.endpoint("gemini-2.5-pro"),
            "https://example.test/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }
}
