use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures of a single model call. Never retried by the crate.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(
        "model request timed out after {}s; increase PIPEGPT_API_TIMEOUT or check endpoint responsiveness",
        .after.as_secs_f64()
    )]
    Timeout { after: Duration },
    #[error(transparent)]
    RequestFailed(#[from] ProviderError),
    #[error("model returned no choices")]
    NoChoices,
    #[error("model answered with free text instead of invoking one of the supplied schemas")]
    NoInvocation,
    #[error("arguments of schema invocation '{name}' are not a JSON object")]
    MalformedArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Transport, authentication and provider-side failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to initialize HTTP client")]
    ClientInit(#[source] reqwest::Error),
    #[error(
        "connection refused by model API at '{url}'; ensure the endpoint is reachable and PIPEGPT_API_ENDPOINT is correct"
    )]
    ConnectionRefused {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to connect to model API at '{url}'; check the endpoint and network connectivity")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to call model API at '{url}'")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid gateway endpoint '{url}': {reason}; check PIPEGPT_API_ENDPOINT")]
    InvalidEndpoint { url: String, reason: String },
    #[error("failed to parse model chat response")]
    Decode(#[source] reqwest::Error),
}

/// Failures that end the interactive loop.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to read interactive input")]
    InputSource(#[source] io::Error),
}
