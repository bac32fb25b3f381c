use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::base::{ProviderEvent, Usage};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::models::turn::Turn;

/// Convert the conversation to OpenAI's chat message specification, system message first.
///
/// A tool turn is replayed as the assistant `tool_calls` entry that requested it
/// followed by the `tool` message holding its outcome, which is the pairing the API expects.
pub fn turns_to_openai_spec(system: &str, turns: &[Turn]) -> Vec<Value> {
    let mut messages_spec = vec![json!({"role": "system", "content": system})];

    for turn in turns {
        match (turn.role, &turn.tool_call) {
            (Role::Tool, Some(record)) => {
                messages_spec.push(json!({
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": record.id,
                        "type": "function",
                        "function": {
                            "name": record.name,
                            "arguments": record.arguments.to_string(),
                        }
                    }]
                }));
                messages_spec.push(json!({
                    "role": "tool",
                    "tool_call_id": record.id,
                    "content": turn.content,
                }));
            }
            (Role::Tool, None) => {
                messages_spec.push(json!({
                    "role": "user",
                    "content": format!("Tool result:\n{}", turn.content),
                }));
            }
            (role, _) => {
                messages_spec.push(json!({
                    "role": role.as_str(),
                    "content": turn.content,
                }));
            }
        }
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

/// Extract the error message from an in-stream API error event, if this is one
pub fn extract_sse_api_error_message(event: &Value) -> Option<String> {
    let error = event.get("error")?;
    if let Some(message) = error.get("message").and_then(|value| value.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed chat completion chunks into provider events.
///
/// Text is surfaced as it arrives. Tool call fragments are buffered per index and
/// only surfaced by `finish`, once their arguments are complete.
#[derive(Debug, Default)]
pub struct OpenAiStreamState {
    pending: BTreeMap<u64, PartialToolCall>,
    usage: Usage,
    finish_reason: Option<String>,
}

impl OpenAiStreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the model reported a finish reason
    pub fn finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Apply one chunk, returning the text deltas it carried
    pub fn apply(&mut self, chunk: &Value) -> Vec<ProviderEvent> {
        let mut events = Vec::new();

        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            self.usage = parse_usage(usage);
        }

        let Some(choice) = chunk.get("choices").and_then(|c| c.get(0)) else {
            return events;
        };

        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
                if !text.is_empty() {
                    events.push(ProviderEvent::TextDelta(text.to_string()));
                }
            }

            if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
                for (position, fragment) in tool_calls.iter().enumerate() {
                    let index = fragment
                        .get("index")
                        .and_then(|i| i.as_u64())
                        .unwrap_or(position as u64);
                    let partial = self.pending.entry(index).or_default();
                    if let Some(id) = fragment.get("id").and_then(|i| i.as_str()) {
                        partial.id = id.to_string();
                    }
                    if let Some(function) = fragment.get("function") {
                        if let Some(name) = function.get("name").and_then(|n| n.as_str()) {
                            partial.name.push_str(name);
                        }
                        if let Some(arguments) = function.get("arguments").and_then(|a| a.as_str()) {
                            partial.arguments.push_str(arguments);
                        }
                    }
                }
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(|r| r.as_str()) {
            self.finish_reason = Some(reason.to_string());
        }

        events
    }

    /// Surface the completed tool calls in index order, then the end-of-stream marker
    pub fn finish(self) -> Vec<ProviderEvent> {
        let mut events = Vec::new();

        for (index, partial) in self.pending {
            if !is_valid_function_name(&partial.name) {
                tracing::warn!(index, name = %partial.name, "dropping tool call with invalid name");
                continue;
            }

            // Unparseable arguments are passed through raw so the registry rejects them as invalid input
            let arguments = if partial.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(&partial.arguments).unwrap_or_else(|_| {
                    tracing::warn!(
                        index,
                        name = %partial.name,
                        "tool call arguments are not valid JSON"
                    );
                    Value::String(partial.arguments.clone())
                })
            };

            let id = if partial.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                partial.id
            };

            events.push(ProviderEvent::ToolCall {
                id,
                call: ToolCall::new(partial.name, arguments),
            });
        }

        events.push(ProviderEvent::Done(self.usage));
        events
    }
}

fn parse_usage(usage: &Value) -> Usage {
    let field = |name: &str| usage.get(name).and_then(|v| v.as_i64()).map(|v| v as i32);
    let input_tokens = field("prompt_tokens");
    let output_tokens = field("completion_tokens");
    let total_tokens = field("total_tokens").or_else(|| match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });
    Usage::new(input_tokens, output_tokens, total_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolOutcome;
    use crate::models::turn::ToolCallRecord;

    fn chunk(delta: Value, finish_reason: Value) -> Value {
        json!({
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        })
    }

    #[test]
    fn test_turns_to_openai_spec_replays_tool_pairs() {
        let call = ToolCall::new("getEventByCategory", json!({"category": "environment"}));
        let turns = vec![
            Turn::user("Show me environment events"),
            Turn::tool(
                ToolCallRecord::new("call_1", &call),
                &ToolOutcome::success(json!([])),
            ),
            Turn::assistant("Nothing right now."),
        ];

        let spec = turns_to_openai_spec("You are helpful.", &turns);
        assert_eq!(spec.len(), 5);
        assert_eq!(spec[0], json!({"role": "system", "content": "You are helpful."}));
        assert_eq!(spec[1]["role"], "user");
        assert_eq!(spec[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            spec[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"category":"environment"}"#
        );
        assert_eq!(spec[3]["role"], "tool");
        assert_eq!(spec[3]["tool_call_id"], "call_1");
        assert_eq!(spec[3]["content"], r#"{"data":[],"ok":true}"#);
        assert_eq!(spec[4], json!({"role": "assistant", "content": "Nothing right now."}));
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<()> {
        let tool = Tool::new(
            "getAllEvents",
            "List every opportunity",
            json!({"type": "object", "properties": {}}),
        );
        let spec = tools_to_openai_spec(&[tool])?;
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "getAllEvents");
        assert_eq!(spec[0]["function"]["parameters"]["type"], "object");
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let tool = Tool::new("dup", "x", json!({}));
        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(result.unwrap_err().to_string().contains("Duplicate tool name"));
    }

    #[test]
    fn test_stream_state_text_and_tool_fragments() {
        let mut state = OpenAiStreamState::new();

        let events = state.apply(&chunk(json!({"role": "assistant", "content": "Let me look"}), Value::Null));
        assert_eq!(events, vec![ProviderEvent::TextDelta("Let me look".into())]);

        state.apply(&chunk(
            json!({"tool_calls": [{"index": 0, "id": "call_9", "function": {"name": "getEventByCategory", "arguments": "{\"cat"}}]}),
            Value::Null,
        ));
        state.apply(&chunk(
            json!({"tool_calls": [{"index": 0, "function": {"arguments": "egory\": \"environment\"}"}}]}),
            Value::Null,
        ));
        assert!(state.apply(&chunk(json!({}), json!("tool_calls"))).is_empty());
        assert!(state.finished());

        let events = state.finish();
        assert_eq!(
            events,
            vec![
                ProviderEvent::ToolCall {
                    id: "call_9".into(),
                    call: ToolCall::new("getEventByCategory", json!({"category": "environment"})),
                },
                ProviderEvent::Done(Usage::default()),
            ]
        );
    }

    #[test]
    fn test_stream_state_drops_unnamed_calls() {
        let mut state = OpenAiStreamState::new();
        state.apply(&chunk(
            json!({"tool_calls": [
                {"index": 0, "id": "b", "function": {"name": "bad name!", "arguments": "{}"}},
                {"index": 1, "id": "d", "function": {"arguments": "{}"}},
                {"index": 2, "id": "c", "function": {"name": "getAllEvents", "arguments": ""}}
            ]}),
            json!("tool_calls"),
        ));

        let events = state.finish();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ProviderEvent::ToolCall {
                id: "c".into(),
                call: ToolCall::new("getAllEvents", json!({})),
            }
        );
    }

    #[test]
    fn test_stream_state_keeps_calls_with_unparseable_arguments() {
        let mut state = OpenAiStreamState::new();
        let events = state.apply(&chunk(json!({"content": "Let me look that up. "}), Value::Null));
        assert_eq!(events.len(), 1);
        state.apply(&chunk(
            json!({"tool_calls": [
                {"index": 0, "id": "a", "function": {"name": "getEventByCategory", "arguments": "{\"category\": "}}
            ]}),
            json!("tool_calls"),
        ));

        let events = state.finish();
        assert_eq!(
            events,
            vec![
                ProviderEvent::ToolCall {
                    id: "a".into(),
                    call: ToolCall::new("getEventByCategory", Value::String("{\"category\": ".into())),
                },
                ProviderEvent::Done(Usage::default()),
            ]
        );
    }

    #[test]
    fn test_stream_state_usage() {
        let mut state = OpenAiStreamState::new();
        state.apply(&json!({
            "choices": [],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }));
        assert_eq!(
            state.finish(),
            vec![ProviderEvent::Done(Usage::new(Some(12), Some(3), Some(15)))]
        );
    }

    #[test]
    fn test_extract_sse_api_error_message() {
        assert_eq!(
            extract_sse_api_error_message(&json!({"error": {"message": "provider error"}})).as_deref(),
            Some("provider error")
        );
        assert_eq!(
            extract_sse_api_error_message(&json!({"error": "overloaded"})).as_deref(),
            Some("overloaded")
        );
        assert!(extract_sse_api_error_message(&json!({"choices": []})).is_none());
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({"code": "context_length_exceeded", "message": "too long"});
        let result = check_openai_context_length_error(&error).unwrap();
        assert_eq!(result.to_string(), "Context length exceeded. Message: too long");
        assert!(check_openai_context_length_error(&json!({"code": "other"})).is_none());
    }
}
