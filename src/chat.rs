use std::io;
use std::mem;

use tracing::{debug, warn};

use crate::client::ModelClient;
use crate::error::ChatError;
use crate::model::Conversation;
use crate::providers::ChatBackend;

pub const QUIT_SENTINEL: &str = "/quit";

/// Result of pulling one line from the interactive input.
#[derive(Debug)]
pub enum NextLine {
    Line(String),
    Quit,
    Failed(io::Error),
}

impl NextLine {
    pub fn from_text(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == QUIT_SENTINEL {
            Self::Quit
        } else {
            Self::Line(line.to_string())
        }
    }
}

pub trait LineSource {
    fn next_line(&mut self) -> NextLine;
}

pub trait OutputSink {
    fn emit(&mut self, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatState {
    AwaitingInput,
    Dispatching(String),
    Displaying(String),
    Stopped,
}

/// Interactive continuation of a seeded conversation.
///
/// Each successful round appends one user and one assistant message. A failed
/// round is reported and discarded; the stored conversation is only replaced
/// once the model has answered.
pub struct ChatSession<'a, B> {
    client: &'a ModelClient<B>,
    conversation: Conversation,
    state: ChatState,
}

impl<'a, B> ChatSession<'a, B>
where
    B: ChatBackend,
{
    pub fn new(client: &'a ModelClient<B>, seed: Conversation) -> Self {
        Self {
            client,
            conversation: seed,
            state: ChatState::AwaitingInput,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Shows the seed conversation, then loops until the sentinel is read or
    /// the input fails.
    pub async fn run(
        &mut self,
        input: &mut impl LineSource,
        output: &mut impl OutputSink,
    ) -> Result<(), ChatError> {
        for message in self.conversation.messages() {
            output.emit(&message.content);
        }
        output.emit(&format!("> \"{QUIT_SENTINEL}\" to quit"));

        while self.state != ChatState::Stopped {
            self.step(input, output).await?;
        }
        Ok(())
    }

    /// Performs a single state transition.
    pub async fn step(
        &mut self,
        input: &mut impl LineSource,
        output: &mut impl OutputSink,
    ) -> Result<(), ChatError> {
        let state = mem::replace(&mut self.state, ChatState::Stopped);
        self.state = match state {
            ChatState::AwaitingInput => match input.next_line() {
                NextLine::Quit => {
                    debug!(messages = self.conversation.len(), "chat stopped by sentinel");
                    ChatState::Stopped
                }
                NextLine::Line(text) => ChatState::Dispatching(text),
                NextLine::Failed(err) => {
                    warn!(error = %err, "interactive input failed");
                    return Err(ChatError::InputSource(err));
                }
            },
            ChatState::Dispatching(text) => {
                match self.client.continue_conversation(&self.conversation, &text).await {
                    Ok((reply, updated)) => {
                        self.conversation = updated;
                        ChatState::Displaying(reply)
                    }
                    Err(err) => {
                        warn!(error = %err, "chat round failed, discarding it");
                        output.emit(&format!("{:#}", anyhow::Error::from(err)));
                        ChatState::AwaitingInput
                    }
                }
            }
            ChatState::Displaying(reply) => {
                output.emit(&reply);
                ChatState::AwaitingInput
            }
            ChatState::Stopped => ChatState::Stopped,
        };
        Ok(())
    }
}
