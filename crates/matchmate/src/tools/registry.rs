use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use super::{schema, ToolDefinition};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall, ToolOutcome};
use crate::systems::{System, SystemInfo};

/// The error text the model sees when its arguments fail the tool schema
pub const INVALID_INPUT: &str = "invalid input";

const DEFAULT_MAX_CONCURRENT_TOOLS: usize = 8;

/// Immutable mapping from tool name to definition, shared by every session.
///
/// Executor calls from all sessions draw from one pool of permits so a burst of
/// conversations cannot fan out unbounded requests to the data layer.
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
    systems: Vec<SystemInfo>,
    permits: Arc<Semaphore>,
}

pub struct ToolRegistryBuilder {
    definitions: Vec<ToolDefinition>,
    systems: Vec<SystemInfo>,
    max_concurrent: usize,
}

impl ToolRegistryBuilder {
    /// Register a single tool
    pub fn register(mut self, definition: ToolDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Register every tool of a system, and remember its instructions for the prompt
    pub fn with_system(mut self, system: &dyn System) -> Self {
        self.systems.push(SystemInfo::from_system(system));
        self.definitions.extend(system.definitions());
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn build(self) -> AgentResult<ToolRegistry> {
        let mut index = HashMap::new();
        for (position, definition) in self.definitions.iter().enumerate() {
            if index.insert(definition.name().to_string(), position).is_some() {
                return Err(AgentError::Internal(format!(
                    "Duplicate tool name: {}",
                    definition.name()
                )));
            }
        }

        Ok(ToolRegistry {
            definitions: self.definitions,
            index,
            systems: self.systems,
            permits: Arc::new(Semaphore::new(self.max_concurrent)),
        })
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            definitions: Vec::new(),
            systems: Vec::new(),
            max_concurrent: DEFAULT_MAX_CONCURRENT_TOOLS,
        }
    }

    /// An empty registry; generations against it never offer tools
    pub fn empty() -> Self {
        Self {
            definitions: Vec::new(),
            index: HashMap::new(),
            systems: Vec::new(),
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_TOOLS)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&position| &self.definitions[position])
    }

    /// Tool descriptions in registration order, as offered to the model
    pub fn tools(&self) -> Vec<Tool> {
        self.definitions.iter().map(|d| d.tool.clone()).collect()
    }

    pub fn systems(&self) -> &[SystemInfo] {
        &self.systems
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Validate and execute a tool call, folding every failure into the outcome.
    ///
    /// This never returns an error and never panics past this boundary.
    pub async fn invoke(&self, call: &ToolCall, timeout: Duration) -> ToolOutcome {
        let Some(definition) = self.get(&call.name) else {
            tracing::warn!(tool = %call.name, "model requested an unknown tool");
            return ToolOutcome::failure(AgentError::ToolNotFound(call.name.clone()).to_string());
        };

        if let Err(e) = schema::validate(&definition.tool.input_schema, &call.arguments) {
            tracing::debug!(tool = %call.name, error = %e, "rejected tool input");
            return ToolOutcome::failure(INVALID_INPUT);
        }

        let start = Instant::now();
        let run = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| AgentError::Internal("tool permits closed".to_string()))?;
            AssertUnwindSafe(definition.executor.execute(call.arguments.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(AgentError::ExecutionError("tool panicked".to_string())))
        };

        let outcome = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(data)) => ToolOutcome::success(data),
            Ok(Err(e)) => ToolOutcome::failure(failure_message(e)),
            Err(_) => ToolOutcome::failure(
                AgentError::Timeout(format!("tool {} after {:?}", call.name, timeout)).to_string(),
            ),
        };

        tracing::info!(
            tool = %call.name,
            ok = outcome.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "tool invoked"
        );
        outcome
    }
}

/// Executors report plain messages; other variants keep their prefix for context
fn failure_message(error: AgentError) -> String {
    match error {
        AgentError::ExecutionError(message) => message,
        other => other.to_string(),
    }
}
