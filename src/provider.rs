use async_trait::async_trait;
use serde_json::Value;

use crate::error::GenerateError;

/// The one capability reactive compaction needs from a model client: prompt
/// in, text out. Fallible and possibly slow.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        conversation: &str,
        max_tokens: u32,
    ) -> Result<String, GenerateError>;
}

/// Claude API client via Anthropic's messages endpoint.
pub struct AnthropicGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com".into(),
        }
    }

    pub fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com".into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        conversation: &str,
        max_tokens: u32,
    ) -> Result<String, GenerateError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system_prompt,
            "messages": [{
                "role": "user",
                "content": conversation,
            }],
        });

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| GenerateError::Request(e.to_string()))?;

        if status != 200 {
            return Err(GenerateError::ApiError { status, body: text });
        }

        let parsed: Value =
            serde_json::from_str(&text).map_err(|e| GenerateError::Parse(e.to_string()))?;

        let raw = parsed["content"].as_array().cloned().unwrap_or_default();
        let generated = raw
            .iter()
            .filter_map(|block| {
                if block["type"].as_str() == Some("text") {
                    block["text"].as_str()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        if generated.is_empty() {
            return Err(GenerateError::Parse("no text content in response".into()));
        }

        Ok(generated)
    }
}
