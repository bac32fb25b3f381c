use serde::Serialize;

use crate::tools::ToolDefinition;

pub mod opportunities;
pub mod store;

pub use opportunities::OpportunitySystem;
pub use store::{InMemoryOpportunityStore, Opportunity, OpportunityStore, StoreError};

/// A named group of tools that is registered together
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get system instructions, rendered into the system prompt
    fn instructions(&self) -> &str;

    /// The tools this system contributes to the registry
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// What the system prompt needs to know about a registered system
#[derive(Clone, Debug, Serialize)]
pub struct SystemInfo {
    pub name: String,
    pub description: String,
    pub instructions: String,
}

impl SystemInfo {
    pub fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }

    pub fn from_system(system: &dyn System) -> Self {
        Self::new(system.name(), system.description(), system.instructions())
    }
}
