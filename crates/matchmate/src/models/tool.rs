use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool that can be used by a model.
///
/// The description is read by the model to decide when to call the tool, so
/// changing its wording changes assistant behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// A JSON schema describing the input the tool accepts
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool call request signaled by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The raw arguments produced by the model
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// The normalized result of invoking a tool.
///
/// Serializes as `{"ok":true,"data":...}` or `{"ok":false,"error":"..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Failure(String),
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        ToolOutcome::Success(data)
    }

    pub fn failure<S: Into<String>>(error: S) -> Self {
        ToolOutcome::Failure(error.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolOutcome::Failure(error) => Some(error),
            ToolOutcome::Success(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ToolOutcome::Success(data) => serde_json::json!({"ok": true, "data": data}),
            ToolOutcome::Failure(error) => serde_json::json!({"ok": false, "error": error}),
        }
    }

    /// The text appended to the conversation as the tool turn's content
    pub fn to_text(&self) -> String {
        self.to_value().to_string()
    }
}

#[derive(Serialize, Deserialize)]
struct WireOutcome {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Serialize for ToolOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            ToolOutcome::Success(data) => WireOutcome {
                ok: true,
                data: Some(data.clone()),
                error: None,
            },
            ToolOutcome::Failure(error) => WireOutcome {
                ok: false,
                data: None,
                error: Some(error.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ToolOutcome {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireOutcome::deserialize(deserializer)?;
        if wire.ok {
            Ok(ToolOutcome::Success(wire.data.unwrap_or(Value::Null)))
        } else {
            Ok(ToolOutcome::Failure(
                wire.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}
