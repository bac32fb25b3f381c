use async_trait::async_trait;
use indoc::indoc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::store::{Opportunity, OpportunityStore, StoreError};
use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;
use crate::tools::{ToolDefinition, ToolExecutor};

pub const GET_ALL_EVENTS: &str = "getAllEvents";
pub const GET_EVENT_BY_CATEGORY: &str = "getEventByCategory";
pub const GET_EVENT_BY_REGION: &str = "getEventByRegion";

/// Opportunity lookup tools backed by an `OpportunityStore`
#[derive(Clone)]
pub struct OpportunitySystem {
    store: Arc<dyn OpportunityStore>,
}

impl OpportunitySystem {
    pub fn new(store: Arc<dyn OpportunityStore>) -> Self {
        Self { store }
    }
}

impl System for OpportunitySystem {
    fn name(&self) -> &str {
        "opportunities"
    }

    fn description(&self) -> &str {
        "Looks up volunteer opportunities listed on the site."
    }

    fn instructions(&self) -> &str {
        indoc! {"
            Use these tools whenever the user asks what they could volunteer for.
            Only recommend opportunities returned by a tool; never invent events.
            If a tool returns an error, tell the user the listing is unavailable right now.
        "}
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                Tool::new(
                    GET_ALL_EVENTS,
                    "List every volunteer opportunity currently posted. \
                    Use when the user wants to browse without a specific category or region.",
                    json!({
                        "type": "object",
                        "properties": {},
                        "additionalProperties": false
                    }),
                ),
                Arc::new(AllEvents {
                    store: self.store.clone(),
                }),
            ),
            ToolDefinition::new(
                Tool::new(
                    GET_EVENT_BY_CATEGORY,
                    "List volunteer opportunities in one category, such as environment, \
                    education, hunger, animals or health. Use when the user names a cause or kind of work.",
                    json!({
                        "type": "object",
                        "required": ["category"],
                        "additionalProperties": false,
                        "properties": {
                            "category": {
                                "type": "string",
                                "description": "The category to filter by, e.g. environment."
                            }
                        }
                    }),
                ),
                Arc::new(EventsByCategory {
                    store: self.store.clone(),
                }),
            ),
            ToolDefinition::new(
                Tool::new(
                    GET_EVENT_BY_REGION,
                    "List volunteer opportunities in one city or region. \
                    Use when the user mentions where they live or want to help.",
                    json!({
                        "type": "object",
                        "required": ["region"],
                        "additionalProperties": false,
                        "properties": {
                            "region": {
                                "type": "string",
                                "description": "The city or region name, e.g. Oakland."
                            }
                        }
                    }),
                ),
                Arc::new(EventsByRegion {
                    store: self.store.clone(),
                }),
            ),
        ]
    }
}

#[derive(Deserialize)]
struct CategoryInput {
    category: String,
}

#[derive(Deserialize)]
struct RegionInput {
    region: String,
}

fn parse_input<T: DeserializeOwned>(input: Value) -> AgentResult<T> {
    serde_json::from_value(input).map_err(|e| AgentError::InvalidParameters(e.to_string()))
}

// Storage errors never reach the model verbatim; they are reported as lookup failures
fn to_payload(result: Result<Vec<Opportunity>, StoreError>) -> AgentResult<Value> {
    match result {
        Ok(opportunities) => serde_json::to_value(opportunities)
            .map_err(|e| AgentError::Internal(e.to_string())),
        Err(e) => {
            tracing::warn!(error = %e, "opportunity lookup failed");
            Err(AgentError::ExecutionError(format!(
                "opportunity lookup failed: {}",
                e
            )))
        }
    }
}

struct AllEvents {
    store: Arc<dyn OpportunityStore>,
}

#[async_trait]
impl ToolExecutor for AllEvents {
    async fn execute(&self, _input: Value) -> AgentResult<Value> {
        to_payload(self.store.all().await)
    }
}

struct EventsByCategory {
    store: Arc<dyn OpportunityStore>,
}

#[async_trait]
impl ToolExecutor for EventsByCategory {
    async fn execute(&self, input: Value) -> AgentResult<Value> {
        let input: CategoryInput = parse_input(input)?;
        to_payload(self.store.by_category(&input.category).await)
    }
}

struct EventsByRegion {
    store: Arc<dyn OpportunityStore>,
}

#[async_trait]
impl ToolExecutor for EventsByRegion {
    async fn execute(&self, input: Value) -> AgentResult<Value> {
        let input: RegionInput = parse_input(input)?;
        to_payload(self.store.by_region(&input.region).await)
    }
}
