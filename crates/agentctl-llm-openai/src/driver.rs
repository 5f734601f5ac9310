//! Thin HTTP client for the OpenAI chat-completions endpoint. Holds no
//! domain knowledge; `provider.rs` is the only caller.

use crate::types::{ChatRequest, OpenAiErrorBody, OpenAiResponse};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("openai error ({status}): {message}")]
    Api { status: u16, message: String },
}

pub struct OpenAiDriver {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiDriver {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com/v1".to_string())
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: String) -> Self {
        Self { http: reqwest::Client::new(), base_url, api_key: api_key.into() }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Ok(Self::with_base_url(api_key, base_url))
    }

    pub async fn chat_completion(&self, request: ChatRequest) -> Result<OpenAiResponse, DriverError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<OpenAiErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());
            return Err(DriverError::Api { status: status.as_u16(), message });
        }

        Ok(response.json().await?)
    }
}
