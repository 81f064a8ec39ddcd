//! Vendor-neutral grouping of session history.
//!
//! Sessions store each tool invocation as one tool-role message holding both
//! the call and its result. Vendors instead expect an assistant turn listing
//! the calls followed by the results. [`wire_turns`] performs that grouping
//! once so each vendor only maps turns onto its own JSON shapes.

use serde_json::Value;

use crate::session::{Message, Role};

/// A tool call as sent back to the vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct WireCall {
    pub id: String,
    pub name: String,
    /// Parsed arguments; malformed raw arguments become an empty object
    pub arguments: Value,
}

/// A tool result as sent back to the vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// One conversation turn in vendor-neutral form.
#[derive(Debug, Clone, PartialEq)]
pub enum WireTurn {
    System(String),
    User(String),
    Assistant { text: String, calls: Vec<WireCall> },
    ToolResults(Vec<WireResult>),
}

/// Group session messages into vendor-neutral turns.
///
/// A run of consecutive tool messages becomes one assistant turn carrying the
/// calls (merged into the directly preceding assistant text, if any) and one
/// results turn.
pub fn wire_turns(messages: &[Message]) -> Vec<WireTurn> {
    let mut turns: Vec<WireTurn> = Vec::new();
    let mut i = 0;

    while i < messages.len() {
        let message = &messages[i];
        match message.role {
            Role::System => turns.push(WireTurn::System(message.text())),
            Role::User => turns.push(WireTurn::User(message.text())),
            Role::Assistant => turns.push(WireTurn::Assistant {
                text: message.text(),
                calls: Vec::new(),
            }),
            Role::Tool => {
                let mut calls = Vec::new();
                let mut results = Vec::new();
                while i < messages.len() && messages[i].role == Role::Tool {
                    let tool_message = &messages[i];
                    if let (Some(call), Some(result)) =
                        (tool_message.tool_call(), tool_message.tool_result())
                    {
                        calls.push(WireCall {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call
                                .arguments()
                                .ok()
                                .filter(Value::is_object)
                                .unwrap_or_else(|| Value::Object(Default::default())),
                        });
                        results.push(WireResult {
                            call_id: result.call_id.clone(),
                            content: result.content.clone(),
                            is_error: result.is_error,
                        });
                    }
                    i += 1;
                }

                let merge = matches!(
                    turns.last(),
                    Some(WireTurn::Assistant { calls: existing, .. }) if existing.is_empty()
                );
                if merge {
                    if let Some(WireTurn::Assistant {
                        calls: existing, ..
                    }) = turns.last_mut()
                    {
                        existing.extend(calls);
                    }
                } else {
                    turns.push(WireTurn::Assistant {
                        text: String::new(),
                        calls,
                    });
                }
                turns.push(WireTurn::ToolResults(results));
                continue;
            }
        }
        i += 1;
    }

    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ToolCall, ToolCallStatus, ToolResult};

    fn tool_message(id: &str, name: &str, args: &str, out: &str) -> Message {
        let mut call = ToolCall::new(id, name, args);
        call.status = ToolCallStatus::Completed;
        Message::tool(call, ToolResult::success(id, out))
    }

    #[test]
    fn test_plain_conversation() {
        let turns = wire_turns(&[Message::user("hi"), Message::assistant("hello")]);
        assert_eq!(
            turns,
            vec![
                WireTurn::User("hi".into()),
                WireTurn::Assistant {
                    text: "hello".into(),
                    calls: vec![]
                }
            ]
        );
    }

    #[test]
    fn test_tool_run_merges_into_preceding_assistant_text() {
        let turns = wire_turns(&[
            Message::user("list files"),
            Message::assistant("Let me look."),
            tool_message("c1", "ls", "{}", "a.txt"),
            tool_message("c2", "read_file", r#"{"path":"a.txt"}"#, "content"),
            Message::assistant("Done."),
        ]);

        assert_eq!(turns.len(), 4);
        match &turns[1] {
            WireTurn::Assistant { text, calls } => {
                assert_eq!(text, "Let me look.");
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[1].arguments["path"], "a.txt");
            }
            other => panic!("unexpected turn {:?}", other),
        }
        match &turns[2] {
            WireTurn::ToolResults(results) => {
                assert_eq!(results[0].call_id, "c1");
                assert_eq!(results[1].content, "content");
            }
            other => panic!("unexpected turn {:?}", other),
        }
    }

    #[test]
    fn test_tool_run_without_text_gets_empty_assistant_turn() {
        let turns = wire_turns(&[Message::user("go"), tool_message("c1", "ls", "", "x")]);
        assert_eq!(
            turns[1],
            WireTurn::Assistant {
                text: String::new(),
                calls: vec![WireCall {
                    id: "c1".into(),
                    name: "ls".into(),
                    arguments: serde_json::json!({}),
                }],
            }
        );
    }

    #[test]
    fn test_malformed_arguments_become_empty_object() {
        let turns = wire_turns(&[Message::user("go"), tool_message("c1", "ls", "{bad", "x")]);
        match &turns[1] {
            WireTurn::Assistant { calls, .. } => {
                assert_eq!(calls[0].arguments, serde_json::json!({}))
            }
            other => panic!("unexpected turn {:?}", other),
        }
    }
}
