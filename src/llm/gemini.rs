use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{status_error, transport_error, LlmBackend, LlmRequest, LlmSettings};
use crate::error::LlmError;

/// Finish reasons that mean the answer was withheld for policy reasons.
const BLOCKED_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "RECITATION"];

/// Google `generateContent` API.
pub struct GeminiBackend {
    client: Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
}

impl GeminiBackend {
    pub fn new(client: Client, settings: &LlmSettings) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                settings.base_url.trim_end_matches('/'),
                settings.model
            ),
            api_key: settings.api_key.clone(),
            temperature: settings.temperature,
        }
    }

    fn payload(&self, request: &LlmRequest) -> Value {
        let prompt = format!("{}\n\nContent:\n---\n{}\n---", request.system, request.input);
        let mut generation_config = json!({
            "temperature": self.temperature,
            "topP": 0.95,
        });
        if let Some(max) = request.max_output_tokens {
            generation_config["maxOutputTokens"] = json!(max);
        }

        json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{"text": prompt}]
                }
            ],
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn submit(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let res = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .timeout(request.timeout)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        let body = res.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(match status_error(status, &body) {
                // Gemini answers an invalid key with 400 rather than 401.
                LlmError::InvalidRequest(msg) if status == StatusCode::BAD_REQUEST && msg.contains("API key") => {
                    LlmError::AuthError(msg)
                }
                other => other,
            });
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| LlmError::MalformedResponse(format!("invalid generateContent JSON: {}", e)))?;
        response_text(&json)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn response_text(json: &Value) -> Result<String, LlmError> {
    if let Some(reason) = json.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        return Err(LlmError::ContentPolicyRejection(format!("prompt blocked: {}", reason)));
    }

    let candidate = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .ok_or_else(|| LlmError::MalformedResponse("gemini response has no candidates".to_string()))?;

    if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
        if BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(LlmError::ContentPolicyRejection(format!("response blocked: {}", reason)));
        }
    }

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::MalformedResponse("gemini response missing text content".to_string()));
    }
    Ok(text)
}
