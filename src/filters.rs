//! History filters applied when control moves to a handoff target.
//!
//! A filter receives the conversation so far and returns the view the target
//! agent starts from. Filters never modify their input.

use std::sync::Arc;

use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage,
};

/// Shared history transformation.
pub type HistoryFilter = Arc<
    dyn Fn(&[ChatCompletionRequestMessage]) -> Vec<ChatCompletionRequestMessage> + Send + Sync,
>;

/// Wraps a plain function as a [`HistoryFilter`].
pub fn filter_fn<F>(f: F) -> HistoryFilter
where
    F: Fn(&[ChatCompletionRequestMessage]) -> Vec<ChatCompletionRequestMessage>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Identity filter.
pub fn keep_all(history: &[ChatCompletionRequestMessage]) -> Vec<ChatCompletionRequestMessage> {
    history.to_vec()
}

/// Strips every tool-call record from the history.
///
/// Tool results and legacy function results are dropped. Assistant messages
/// that only carried tool calls are dropped; assistant messages that also
/// carried text keep the text without the calls. Everything else passes
/// through untouched.
pub fn remove_all_tools(
    history: &[ChatCompletionRequestMessage],
) -> Vec<ChatCompletionRequestMessage> {
    history
        .iter()
        .filter_map(|message| match message {
            ChatCompletionRequestMessage::Tool(_) | ChatCompletionRequestMessage::Function(_) => {
                None
            }
            ChatCompletionRequestMessage::Assistant(asst) if has_tool_calls(asst) => {
                if has_text(asst) {
                    let mut stripped = asst.clone();
                    stripped.tool_calls = None;
                    Some(ChatCompletionRequestMessage::Assistant(stripped))
                } else {
                    None
                }
            }
            other => Some(other.clone()),
        })
        .collect()
}

/// True for messages that record a tool invocation or its result.
pub fn is_tool_record(message: &ChatCompletionRequestMessage) -> bool {
    match message {
        ChatCompletionRequestMessage::Tool(_) | ChatCompletionRequestMessage::Function(_) => true,
        ChatCompletionRequestMessage::Assistant(asst) => has_tool_calls(asst),
        _ => false,
    }
}

fn has_tool_calls(asst: &ChatCompletionRequestAssistantMessage) -> bool {
    asst.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
}

fn has_text(asst: &ChatCompletionRequestAssistantMessage) -> bool {
    match &asst.content {
        Some(ChatCompletionRequestAssistantMessageContent::Text(text)) => !text.trim().is_empty(),
        Some(ChatCompletionRequestAssistantMessageContent::Array(parts)) => !parts.is_empty(),
        None => false,
    }
}
