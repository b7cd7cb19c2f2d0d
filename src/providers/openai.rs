use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::http_errors::{ensure_success, request_error};
use super::{ChatBackend, ChatFuture, ChatRequest, ChatResponse};
use crate::error::{ClientError, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Direct OpenAI-compatible endpoint with bearer authentication.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(http: Client, base_url: String, api_key: String, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            api_key,
            timeout,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let api_url = chat_url(&self.base_url);
        debug!(
            api_url = %api_url,
            model = %request.model,
            message_count = request.messages.len(),
            function_count = request.functions.len(),
            "sending openai chat request"
        );

        let response = self
            .http
            .post(&api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| request_error(err, &api_url, self.timeout))?;
        let response = ensure_success(response, &api_url).await?;

        let parsed: ChatResponse = response.json().await.map_err(ProviderError::Decode)?;
        debug!(
            model = %request.model,
            choice_count = parsed.choices.len(),
            "received openai chat response"
        );
        Ok(parsed)
    }
}

impl ChatBackend for OpenAiBackend {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.send(request))
    }
}

fn chat_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BASE_URL, chat_url};

    #[test]
    fn chat_url_trims_trailing_slash() {
        assert_eq!(
            chat_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_url(DEFAULT_BASE_URL),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
