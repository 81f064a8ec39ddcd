//! History summarization helpers.
//!
//! Pure functions over `Vec<Message>`. The agent loop obtains the summary
//! text from the provider and then calls [`summarize_messages`] to splice it
//! into the history.

use crate::session::{Message, Role};

/// Prefix of the system message that replaces summarized history.
pub const SUMMARY_HEADER: &str = "[Conversation Summary]";

/// System prompt for the summarization call.
pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You condense conversations. Reply with the summary only, no preamble.";

/// Whether summarizing with `keep_recent` would change anything.
pub fn needs_summary(messages: &[Message], keep_recent: usize) -> bool {
    messages.len() > keep_recent
}

/// Replace everything but the `keep_recent` most recent messages with one
/// summary system message.
///
/// # Examples
/// ```
/// use steward::session::{Message, Role};
/// use steward::agent::compaction::summarize_messages;
///
/// let msgs = vec![
///     Message::user("Tell me about Rust"),
///     Message::assistant("Rust is a systems language..."),
///     Message::user("What about async?"),
///     Message::assistant("Async in Rust uses tokio..."),
/// ];
/// let result = summarize_messages(msgs, 2, "User asked about Rust.");
/// assert_eq!(result.len(), 3);
/// assert_eq!(result[0].role, Role::System);
/// assert_eq!(result[1].text(), "What about async?");
/// ```
pub fn summarize_messages(
    messages: Vec<Message>,
    keep_recent: usize,
    summary_text: &str,
) -> Vec<Message> {
    if !needs_summary(&messages, keep_recent) {
        return messages;
    }

    let skip = messages.len() - keep_recent;
    let mut result = Vec::with_capacity(1 + keep_recent);
    result.push(Message::system(&format!("{}\n{}", SUMMARY_HEADER, summary_text.trim())));
    result.extend(messages.into_iter().skip(skip));
    result
}

/// One transcript line per message, tool traffic included.
fn transcript_line(msg: &Message) -> String {
    match (msg.role, msg.tool_call(), msg.tool_result()) {
        (Role::Tool, Some(call), Some(result)) => {
            let outcome = if result.is_error { "failed" } else { "ok" };
            format!(
                "tool {}({}) [{}]: {}",
                call.name, call.raw_arguments, outcome, result.content
            )
        }
        _ => format!("{}: {}", msg.role, msg.text()),
    }
}

/// Build the user prompt for the summarization call.
///
/// # Examples
/// ```
/// use steward::session::Message;
/// use steward::agent::compaction::build_summary_prompt;
///
/// let msgs = vec![Message::user("Hello"), Message::assistant("Hi there!")];
/// let prompt = build_summary_prompt(&msgs);
/// assert!(prompt.contains("user: Hello"));
/// assert!(prompt.contains("assistant: Hi there!"));
/// ```
pub fn build_summary_prompt(messages: &[Message]) -> String {
    let transcript: Vec<String> = messages.iter().map(transcript_line).collect();
    format!(
        "Summarize the following conversation focusing on key decisions, \
         information exchanged, and actions taken. Be concise.\n\n{}\n",
        transcript.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ToolCall, ToolCallStatus, ToolResult};

    fn history(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(&format!("m{}", i))).collect()
    }

    #[test]
    fn test_summarize_keeps_recent_verbatim() {
        let result = summarize_messages(history(5), 2, "earlier stuff");
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].text(), "[Conversation Summary]\nearlier stuff");
        assert_eq!(result[1].text(), "m3");
        assert_eq!(result[2].text(), "m4");
    }

    #[test]
    fn test_summarize_noop_when_short() {
        let result = summarize_messages(history(2), 2, "unused");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].role, Role::User);
    }

    #[test]
    fn test_summarize_keep_zero() {
        let result = summarize_messages(history(3), 0, "all of it");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].role, Role::System);
    }

    #[test]
    fn test_summary_of_summary_folds_previous() {
        let first = summarize_messages(history(4), 1, "one");
        let mut next = first;
        next.extend(history(3));
        let second = summarize_messages(next, 1, "two");
        assert_eq!(second.len(), 2);
        assert!(second[0].text().ends_with("two"));
    }

    #[test]
    fn test_prompt_includes_tool_traffic() {
        let mut call = ToolCall::new("c1", "ls", "{}");
        call.status = ToolCallStatus::Completed;
        let msgs = vec![
            Message::user("list files"),
            Message::tool(call, ToolResult::success("c1", "a.txt")),
        ];
        let prompt = build_summary_prompt(&msgs);
        assert!(prompt.contains("user: list files"));
        assert!(prompt.contains("tool ls({}) [ok]: a.txt"));
    }

    #[test]
    fn test_needs_summary() {
        assert!(needs_summary(&history(3), 2));
        assert!(!needs_summary(&history(2), 2));
    }
}
