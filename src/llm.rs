//! Language model binding.
//!
//! [`OllamaModel`] calls `POST {url}/api/generate` with streaming disabled.
//! Failures are returned as-is: there is no retry, the caller decides.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Completes `prompt`, returning the generated text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct OllamaModel {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing response text"))
}

pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    tracing::info!("Initializing Ollama model: {}", config.model);
    Ok(Box::new(OllamaModel::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_response() {
        let json = serde_json::json!({
            "model": "llama3",
            "response": "Scrum is an agile framework.",
            "done": true
        });
        assert_eq!(
            parse_generate_response(&json).unwrap(),
            "Scrum is an agile framework."
        );
    }

    #[test]
    fn test_parse_generate_response_missing() {
        let json = serde_json::json!({ "error": "model 'x' not found" });
        assert!(parse_generate_response(&json).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let config = LlmConfig {
            url: "http://127.0.0.1:9".to_string(),
            model: "llama3".to_string(),
            timeout_secs: Some(5),
        };
        let model = OllamaModel::new(&config).unwrap();
        assert!(model.generate("hello").await.is_err());
    }
}
