use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::tool::{Tool, ToolCall};
use crate::models::turn::Turn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One event of a streamed generation
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Generated text, delivered in generation order
    TextDelta(String),
    /// A completed tool call; its arguments may still fail the tool's schema
    ToolCall { id: String, call: ToolCall },
    /// End-of-stream marker; a stream that ends without it was truncated
    Done(Usage),
}

/// A failure mid-stream is a single terminal `Err` item
pub type ProviderStream = BoxStream<'static, Result<ProviderEvent>>;

/// Base trait for model gateways (OpenAI, Ollama, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streamed generation over the full history.
    ///
    /// An empty `tools` slice means the model is not offered any tools.
    async fn stream(&self, system: &str, turns: &[Turn], tools: &[Tool])
        -> Result<ProviderStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));
    }

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let serialized = serde_json::to_string(&usage)?;
        let deserialized: Usage = serde_json::from_str(&serialized)?;
        assert_eq!(usage, deserialized);

        let json_value: serde_json::Value = serde_json::from_str(&serialized)?;
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["total_tokens"], json!(30));
        Ok(())
    }
}
