pub mod azure;
pub(crate) mod http_errors;
pub mod openai;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::config::{ApiTarget, ClientConfig};
use crate::error::{ClientError, ProviderError};
use crate::model::{Message, SchemaDefinition};

pub use azure::AzureBackend;
pub use openai::OpenAiBackend;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<SchemaDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallMode>,
}

/// How the endpoint should pick among the offered schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FunctionCallMode {
    Auto(AutoMarker),
    Named { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMarker {
    Auto,
}

impl FunctionCallMode {
    pub fn for_schemas(schemas: &[SchemaDefinition]) -> Option<Self> {
        match schemas {
            [] => None,
            [only] => Some(Self::Named {
                name: only.name.clone(),
            }),
            _ => Some(Self::Auto(AutoMarker::Auto)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionInvocation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ResponseMessage {
                    content: Some(content.into()),
                    function_call: None,
                },
            }],
        }
    }

    pub fn invocation(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ResponseMessage {
                    content: None,
                    function_call: Some(FunctionInvocation {
                        name: name.into(),
                        arguments: arguments.into(),
                    }),
                },
            }],
        }
    }
}

pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatResponse, ClientError>> + 'a>>;

/// One stateless chat-completion round trip.
pub trait ChatBackend {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a>;
}

/// Backend chosen from configuration: a gateway when an endpoint is set,
/// the direct provider otherwise.
#[derive(Debug, Clone)]
pub enum Backend {
    OpenAi(OpenAiBackend),
    Azure(AzureBackend),
}

impl Backend {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ProviderError> {
        let http = build_http_client(config.timeout)?;
        let backend = match &config.target {
            ApiTarget::Direct { base_url } => Self::OpenAi(OpenAiBackend::new(
                http,
                base_url.clone(),
                config.api_key.clone(),
                config.timeout,
            )),
            ApiTarget::Gateway { endpoint, .. } => Self::Azure(AzureBackend::new(
                http,
                endpoint.clone(),
                config.api_key.clone(),
                config.timeout,
            )),
        };
        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai",
            Self::Azure(_) => "azure",
        }
    }
}

impl ChatBackend for Backend {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        match self {
            Self::OpenAi(backend) => backend.complete(request),
            Self::Azure(backend) => backend.complete(request),
        }
    }
}

fn build_http_client(timeout: Duration) -> Result<Client, ProviderError> {
    // Mirrors the per-call deadline enforced in ModelClient.
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ProviderError::ClientInit)
}
