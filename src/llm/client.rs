//! Streaming client for the model endpoint

use super::error::LlmError;
use super::types::RequestBody;
use super::{ByteStream, ResponsesTransport};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP client for the `/responses` streaming endpoint.
pub struct ResponsesClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ResponsesClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        // Only the connect phase gets a timeout: a total-request timeout
        // would cap how long a streamed body may run.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl ResponsesTransport for ResponsesClient {
    async fn stream_turn(&self, body: &RequestBody) -> Result<ByteStream, LlmError> {
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let diagnostic = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<could not read body: {e}>"));
            tracing::error!(
                status = status.as_u16(),
                body = %diagnostic,
                "Model endpoint returned error status"
            );
            return Err(LlmError::http(status.as_u16(), &diagnostic));
        }

        Ok(Box::pin(response.bytes_stream().map_err(|e| {
            LlmError::network(format!("Failed to read response stream: {e}"))
        })))
    }
}
