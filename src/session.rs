use serde_json::Value;

use crate::model::{Conversation, FirstResponse, Message};

const MIN_FENCE_LEN: usize = 3;

/// Seeds a conversation from the first exchange.
///
/// Produces `System(role)`, `User(prompt)`, `User(fenced input)` and the
/// assistant's first answer. Structured answers are rendered as a fenced JSON
/// block so later rounds see them as data.
pub fn build_history(
    role: &str,
    prompt: &str,
    input: &str,
    first_response: &FirstResponse,
) -> Conversation {
    let answer = match first_response {
        FirstResponse::Text(text) => text.clone(),
        FirstResponse::Structured(result) => {
            let serialized = format!("{:#}", Value::Object(result.clone()));
            fenced_code_block(Some("json"), &serialized)
        }
    };

    Conversation::from(vec![
        Message::system(role),
        Message::user(prompt),
        Message::user(fenced_code_block(None, input)),
        Message::assistant(answer),
    ])
}

/// Wraps `body` in a backtick fence longer than any backtick run inside it,
/// so the body can never close the block early.
pub fn fenced_code_block(language: Option<&str>, body: &str) -> String {
    let fence = "`".repeat(MIN_FENCE_LEN.max(longest_backtick_run(body) + 1));
    let mut block = String::with_capacity(body.len() + 2 * fence.len() + 8);
    block.push_str(&fence);
    block.push_str(language.unwrap_or_default());
    block.push('\n');
    block.push_str(body);
    if !body.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(&fence);
    block
}

fn longest_backtick_run(body: &str) -> usize {
    body.split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0)
}
