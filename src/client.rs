use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ProviderError};
use crate::model::{Conversation, ExtractionResult, Message, SchemaDefinition};
use crate::providers::{
    Backend, ChatBackend, ChatRequest, ChatResponse, FunctionCallMode, ResponseMessage,
};

const INPUT_SEPARATOR: &str = "\n---\n";

/// Issues one chat-completion request per call under the configured deadline.
///
/// Holds only immutable configuration, so one client serves the one-shot
/// request and every later interactive round.
pub struct ModelClient<B = Backend> {
    config: ClientConfig,
    backend: B,
}

impl ModelClient<Backend> {
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let backend = Backend::from_config(&config)?;
        debug!(
            provider = backend.name(),
            model = %config.model,
            outbound_model = %config.target.outbound_model(&config.model),
            timeout_secs = config.timeout.as_secs_f64(),
            "model client ready"
        );
        Ok(Self { config, backend })
    }
}

impl<B> ModelClient<B>
where
    B: ChatBackend,
{
    pub fn with_backend(config: ClientConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Asks a single question and returns the first choice's text.
    pub async fn ask(&self, role: &str, prompt: &str, input: &str) -> Result<String, ClientError> {
        let request = self.request(question_messages(role, prompt, input), &[]);
        let message = self.first_message(&request).await?;
        Ok(message.content.unwrap_or_default())
    }

    /// Asks the model to answer by invoking one of `schemas` and decodes the
    /// invocation arguments.
    pub async fn extract(
        &self,
        role: &str,
        prompt: &str,
        input: &str,
        schemas: &[SchemaDefinition],
    ) -> Result<ExtractionResult, ClientError> {
        let request = self.request(question_messages(role, prompt, input), schemas);
        let message = self.first_message(&request).await?;
        let invocation = message.function_call.ok_or_else(|| {
            warn!(model = %request.model, "model replied without invoking a schema");
            ClientError::NoInvocation
        })?;

        debug!(
            schema = %invocation.name,
            arguments_len = invocation.arguments.len(),
            "decoding schema invocation"
        );
        serde_json::from_str::<Map<String, Value>>(&invocation.arguments).map_err(|source| {
            ClientError::MalformedArguments {
                name: invocation.name,
                source,
            }
        })
    }

    /// Sends the whole conversation plus `user_text` and returns the reply
    /// together with the extended conversation. `conversation` itself is
    /// never modified, so a failed round leaves the caller's copy intact.
    pub async fn continue_conversation(
        &self,
        conversation: &Conversation,
        user_text: &str,
    ) -> Result<(String, Conversation), ClientError> {
        let mut updated = conversation.clone();
        updated.push(Message::user(user_text));

        let request = self.request(updated.messages().to_vec(), &[]);
        let message = self.first_message(&request).await?;
        let reply = message.content.unwrap_or_default();

        updated.push(Message::assistant(reply.clone()));
        Ok((reply, updated))
    }

    fn request(&self, messages: Vec<Message>, schemas: &[SchemaDefinition]) -> ChatRequest {
        ChatRequest {
            model: self
                .config
                .target
                .outbound_model(&self.config.model)
                .to_string(),
            messages,
            functions: schemas.to_vec(),
            function_call: FunctionCallMode::for_schemas(schemas),
        }
    }

    async fn first_message(&self, request: &ChatRequest) -> Result<ResponseMessage, ClientError> {
        let response = self.dispatch(request).await?;
        match response.choices.into_iter().next() {
            Some(choice) => Ok(choice.message),
            None => {
                warn!(model = %request.model, "model returned no choices");
                Err(ClientError::NoChoices)
            }
        }
    }

    async fn dispatch(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        debug!(
            model = %request.model,
            message_count = request.messages.len(),
            function_count = request.functions.len(),
            "dispatching model chat request"
        );

        let timeout = self.config.timeout;
        match tokio::time::timeout(timeout, self.backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    model = %request.model,
                    timeout_secs = timeout.as_secs_f64(),
                    "model request exceeded deadline"
                );
                Err(ClientError::Timeout { after: timeout })
            }
        }
    }
}

fn question_messages(role: &str, prompt: &str, input: &str) -> Vec<Message> {
    vec![
        Message::system(role),
        Message::user(format!("{prompt}{INPUT_SEPARATOR}{input}")),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    use crate::config::{ApiTarget, ClientConfig};
    use crate::error::{ClientError, ProviderError};
    use crate::providers::{ChatBackend, ChatFuture, ChatRequest, ChatResponse};

    pub(crate) enum StubReply {
        Ok(ChatResponse),
        Status(u16, &'static str),
        Hang,
    }

    /// Replays queued replies and records every request it receives.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        pub(crate) calls: RefCell<Vec<ChatRequest>>,
        replies: RefCell<VecDeque<StubReply>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: impl IntoIterator<Item = StubReply>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                replies: RefCell::new(replies.into_iter().collect()),
            }
        }

        pub(crate) fn text(content: &str) -> Self {
            Self::new([StubReply::Ok(ChatResponse::text(content))])
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn complete<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
            self.calls.borrow_mut().push(request.clone());
            let reply = self.replies.borrow_mut().pop_front();
            Box::pin(async move {
                match reply {
                    Some(StubReply::Ok(response)) => Ok(response),
                    Some(StubReply::Status(code, body)) => Err(ClientError::RequestFailed(
                        ProviderError::Status {
                            status: reqwest::StatusCode::from_u16(code)
                                .expect("status code should be valid"),
                            body: body.to_string(),
                        },
                    )),
                    Some(StubReply::Hang) => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(ChatResponse::default())
                    }
                    None => panic!("scripted backend ran out of replies"),
                }
            })
        }
    }

    pub(crate) fn direct_config() -> ClientConfig {
        ClientConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-4".to_string(),
            timeout: Duration::from_secs(5),
            target: ApiTarget::Direct {
                base_url: "http://localhost:0/v1".to_string(),
            },
        }
    }

    pub(crate) fn gateway_config(model: &str, pairs: &[(&str, &str)]) -> ClientConfig {
        ClientConfig {
            model: model.to_string(),
            target: ApiTarget::Gateway {
                endpoint: "http://localhost:0".to_string(),
                model_map: pairs
                    .iter()
                    .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                    .collect::<HashMap<_, _>>(),
            },
            ..direct_config()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;

    use super::ModelClient;
    use super::test_support::{ScriptedBackend, StubReply, direct_config, gateway_config};
    use crate::error::{ClientError, ProviderError};
    use crate::model::{FirstResponse, Message, MessageRole, SchemaDefinition};
    use crate::providers::{ChatResponse, FunctionCallMode};
    use crate::session::build_history;

    fn classify_schema() -> SchemaDefinition {
        SchemaDefinition {
            name: "classify".to_string(),
            description: None,
            parameters: json!({
                "type": "object",
                "properties": {"label": {"type": "string"}}
            }),
        }
    }

    #[tokio::test]
    async fn ask_sends_system_role_and_combined_prompt() {
        let client = ModelClient::with_backend(direct_config(), ScriptedBackend::text("Looks fine."));

        let answer = client
            .ask("reviewer", "review this diff", "+foo\n-bar\n")
            .await
            .expect("ask should succeed");

        assert_eq!(answer, "Looks fine.");
        let calls = client.backend().calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gpt-4");
        assert_eq!(
            calls[0].messages,
            vec![
                Message::system("reviewer"),
                Message::user("review this diff\n---\n+foo\n-bar\n"),
            ]
        );
        assert!(calls[0].functions.is_empty());
        assert_eq!(calls[0].function_call, None);
    }

    #[tokio::test]
    async fn ask_fails_when_no_choices_are_returned() {
        let client = ModelClient::with_backend(
            direct_config(),
            ScriptedBackend::new([StubReply::Ok(ChatResponse::default())]),
        );

        let err = client.ask("r", "p", "i").await.expect_err("empty choices");
        assert!(matches!(err, ClientError::NoChoices), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn ask_surfaces_provider_failures() {
        let client = ModelClient::with_backend(
            direct_config(),
            ScriptedBackend::new([StubReply::Status(429, "rate limited")]),
        );

        let err = client.ask("r", "p", "i").await.expect_err("provider failure");
        assert!(matches!(
            err,
            ClientError::RequestFailed(ProviderError::Status { .. })
        ));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn ask_times_out_when_backend_hangs() {
        let config = crate::config::ClientConfig {
            timeout: Duration::from_millis(20),
            ..direct_config()
        };
        let client = ModelClient::with_backend(config, ScriptedBackend::new([StubReply::Hang]));

        let err = client.ask("r", "p", "i").await.expect_err("deadline");
        match err {
            ClientError::Timeout { after } => assert_eq!(after, Duration::from_millis(20)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn extract_decodes_invocation_arguments() {
        let client = ModelClient::with_backend(
            direct_config(),
            ScriptedBackend::new([StubReply::Ok(ChatResponse::invocation(
                "classify",
                r#"{"label":"bug"}"#,
            ))]),
        );

        let result = client
            .extract("triager", "classify", "crash on login\n", &[classify_schema()])
            .await
            .expect("extract should succeed");

        assert_eq!(result.len(), 1);
        assert_eq!(result["label"], json!("bug"));
        let calls = client.backend().calls.borrow();
        assert_eq!(calls[0].functions, vec![classify_schema()]);
        assert_eq!(
            calls[0].function_call,
            Some(FunctionCallMode::Named {
                name: "classify".to_string()
            })
        );
    }

    #[tokio::test]
    async fn extract_fails_when_model_answers_with_text() {
        let client = ModelClient::with_backend(direct_config(), ScriptedBackend::text("it is a bug"));

        let err = client
            .extract("r", "p", "i", &[classify_schema()])
            .await
            .expect_err("free text");
        assert!(matches!(err, ClientError::NoInvocation), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn extract_fails_on_malformed_arguments() {
        for arguments in ["label: bug", "[\"bug\"]", ""] {
            let client = ModelClient::with_backend(
                direct_config(),
                ScriptedBackend::new([StubReply::Ok(ChatResponse::invocation("classify", arguments))]),
            );

            let err = client
                .extract("r", "p", "i", &[classify_schema()])
                .await
                .expect_err("malformed arguments");
            assert!(
                matches!(&err, ClientError::MalformedArguments { name, .. } if name == "classify"),
                "unexpected error for {arguments:?}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn extract_fails_when_no_choices_are_returned() {
        let client = ModelClient::with_backend(
            direct_config(),
            ScriptedBackend::new([StubReply::Ok(ChatResponse::default())]),
        );

        let err = client
            .extract("r", "p", "i", &[classify_schema()])
            .await
            .expect_err("empty choices");
        assert!(matches!(err, ClientError::NoChoices));
    }

    #[tokio::test]
    async fn continue_conversation_resends_everything_and_appends_two_messages() {
        let seed = build_history(
            "reviewer",
            "review this diff",
            "+foo\n-bar\n",
            &FirstResponse::Text("Looks fine.".to_string()),
        );
        let client = ModelClient::with_backend(
            direct_config(),
            ScriptedBackend::new([
                StubReply::Ok(ChatResponse::text("None found.")),
                StubReply::Ok(ChatResponse::text("Ship it.")),
            ]),
        );

        let (reply, first) = client
            .continue_conversation(&seed, "Any security concerns?")
            .await
            .expect("first round");
        assert_eq!(reply, "None found.");
        assert_eq!(first.len(), seed.len() + 2);
        assert_eq!(&first.messages()[..seed.len()], seed.messages());

        let (_, second) = client
            .continue_conversation(&first, "Merge?")
            .await
            .expect("second round");
        assert_eq!(second.len(), first.len() + 2);
        assert_eq!(&second.messages()[..first.len()], first.messages());
        let tail: Vec<MessageRole> = second.messages()[first.len()..]
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(tail, vec![MessageRole::User, MessageRole::Assistant]);

        let calls = client.backend().calls.borrow();
        assert_eq!(calls[0].messages.len(), seed.len() + 1);
        assert_eq!(calls[1].messages.len(), first.len() + 1);
        assert_eq!(calls[1].messages.last(), Some(&Message::user("Merge?")));
    }

    #[tokio::test]
    async fn failed_continue_leaves_conversation_untouched() {
        let seed = build_history("r", "p", "i\n", &FirstResponse::Text("a".to_string()));
        let before = seed.clone();
        let client = ModelClient::with_backend(
            direct_config(),
            ScriptedBackend::new([StubReply::Status(500, "boom")]),
        );

        client
            .continue_conversation(&seed, "next")
            .await
            .expect_err("round should fail");
        assert_eq!(seed, before);
    }

    #[tokio::test]
    async fn gateway_remaps_logical_model_names() {
        let client = ModelClient::with_backend(
            gateway_config("gpt-4", &[("gpt-4", "dept-gpt4")]),
            ScriptedBackend::text("ok"),
        );
        client.ask("r", "p", "i").await.expect("ask");
        assert_eq!(client.backend().calls.borrow()[0].model, "dept-gpt4");

        let client = ModelClient::with_backend(
            gateway_config("gpt-4-vision", &[("gpt-4", "dept-gpt4")]),
            ScriptedBackend::text("ok"),
        );
        client.ask("r", "p", "i").await.expect("ask");
        assert_eq!(client.backend().calls.borrow()[0].model, "gpt-4-vision");
    }
}
