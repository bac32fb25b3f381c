use super::role::Role;
use super::tool::{ToolCall, ToolOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The tool-call signal that produced a tool turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRecord {
    pub fn new<S: Into<String>>(id: S, call: &ToolCall) -> Self {
        Self {
            id: id.into(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One message-equivalent unit in a conversation
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,
    pub created: i64,
}

impl Turn {
    /// Create a new user turn with the current timestamp
    pub fn user<S: Into<String>>(content: S) -> Self {
        Turn {
            role: Role::User,
            content: content.into(),
            tool_call: None,
            created: Utc::now().timestamp(),
        }
    }

    /// Create a new assistant turn with the current timestamp
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Turn {
            role: Role::Assistant,
            content: content.into(),
            tool_call: None,
            created: Utc::now().timestamp(),
        }
    }

    /// Create a tool turn carrying the serialized outcome of `record`
    pub fn tool(record: ToolCallRecord, outcome: &ToolOutcome) -> Self {
        Turn {
            role: Role::Tool,
            content: outcome.to_text(),
            tool_call: Some(record),
            created: Utc::now().timestamp(),
        }
    }

    /// The name of the tool that produced this turn, set only for tool turns
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_call.as_ref().map(|record| record.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_turn_carries_signal() {
        let call = ToolCall::new("getEventByCategory", json!({"category": "environment"}));
        let turn = Turn::tool(
            ToolCallRecord::new("call_1", &call),
            &ToolOutcome::failure("invalid input"),
        );

        assert_eq!(turn.role, Role::Tool);
        assert_eq!(turn.tool_name(), Some("getEventByCategory"));
        assert_eq!(
            serde_json::from_str::<Value>(&turn.content).unwrap(),
            json!({"ok": false, "error": "invalid input"})
        );
    }

    #[test]
    fn test_non_tool_turns_have_no_tool_name() {
        assert_eq!(Turn::user("hi").tool_name(), None);
        assert_eq!(Turn::assistant("hello").tool_name(), None);
    }

    #[test]
    fn test_turn_serialization_skips_empty_tool_call() {
        let value = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(value["role"], json!("user"));
        assert!(value.get("tool_call").is_none());
    }
}
