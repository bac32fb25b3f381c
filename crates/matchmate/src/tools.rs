use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::AgentResult;
use crate::models::tool::Tool;

pub mod registry;
pub mod schema;

pub use registry::{ToolRegistry, ToolRegistryBuilder};

/// A backend capability exposed to the model.
///
/// Executors receive input that already passed the tool's schema. Any error
/// they return is folded into a failed `ToolOutcome` by the registry.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, input: Value) -> AgentResult<Value>;
}

/// A tool paired with the executor that implements it
#[derive(Clone)]
pub struct ToolDefinition {
    pub tool: Tool,
    pub executor: Arc<dyn ToolExecutor>,
}

impl ToolDefinition {
    pub fn new(tool: Tool, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { tool, executor }
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}
