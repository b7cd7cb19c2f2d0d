use tracing::info;

use crate::client::ModelClient;
use crate::error::ClientError;
use crate::model::{ExtractionResult, SchemaDefinition};
use crate::providers::ChatBackend;

/// Generic question: role + prompt + piped input in, the model's text out.
pub async fn ask_generic<B: ChatBackend>(
    client: &ModelClient<B>,
    role: &str,
    prompt: &str,
    input: &str,
) -> Result<String, ClientError> {
    info!(input_len = input.len(), "asking generic question");
    client.ask(role, prompt, input).await
}

/// Function-call question: the model must answer through one of `schemas`.
pub async fn extract_structured<B: ChatBackend>(
    client: &ModelClient<B>,
    role: &str,
    prompt: &str,
    input: &str,
    schemas: &[SchemaDefinition],
) -> Result<ExtractionResult, ClientError> {
    info!(
        input_len = input.len(),
        schema_count = schemas.len(),
        "asking function-call question"
    );
    client.extract(role, prompt, input, schemas).await
}
