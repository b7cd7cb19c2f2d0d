use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use super::http_errors::{ensure_success, request_error};
use super::{ChatBackend, ChatFuture, ChatRequest, ChatResponse};
use crate::error::{ClientError, ProviderError};

pub const API_VERSION: &str = "2023-07-01-preview";

/// Azure OpenAI style gateway. The request's model name selects the
/// deployment, so callers pass the already-remapped name.
#[derive(Debug, Clone)]
pub struct AzureBackend {
    http: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl AzureBackend {
    pub fn new(http: Client, endpoint: String, api_key: String, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            api_key,
            timeout,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let url = deployment_url(&self.endpoint, &request.model)?;
        let api_url = url.to_string();
        debug!(
            api_url = %api_url,
            deployment = %request.model,
            message_count = request.messages.len(),
            function_count = request.functions.len(),
            "sending azure chat request"
        );

        let response = self
            .http
            .post(url)
            .query(&[("api-version", API_VERSION)])
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| request_error(err, &api_url, self.timeout))?;
        let response = ensure_success(response, &api_url).await?;

        let parsed: ChatResponse = response.json().await.map_err(ProviderError::Decode)?;
        debug!(
            deployment = %request.model,
            choice_count = parsed.choices.len(),
            "received azure chat response"
        );
        Ok(parsed)
    }
}

impl ChatBackend for AzureBackend {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.send(request))
    }
}

/// Appends the deployment path to `endpoint`. The deployment name is a
/// single percent-encoded segment.
fn deployment_url(endpoint: &str, deployment: &str) -> Result<Url, ProviderError> {
    let invalid = |reason: String| ProviderError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason,
    };
    let mut url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(["openai", "deployments", deployment, "chat", "completions"]);
    Ok(url)
}
