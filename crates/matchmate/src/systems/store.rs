use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// A volunteer opportunity as returned by the data layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Data source unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Failed to load opportunities: {0}")]
    Load(String),
}

/// Read access to opportunities. Every query returns records in a stable order.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    async fn all(&self) -> Result<Vec<Opportunity>, StoreError>;

    async fn by_category(&self, category: &str) -> Result<Vec<Opportunity>, StoreError>;

    async fn by_region(&self, region: &str) -> Result<Vec<Opportunity>, StoreError>;
}

/// A store backed by a fixed list, matched case-insensitively, in insertion order
#[derive(Debug, Clone, Default)]
pub struct InMemoryOpportunityStore {
    opportunities: Vec<Opportunity>,
}

impl InMemoryOpportunityStore {
    pub fn new(opportunities: Vec<Opportunity>) -> Self {
        Self { opportunities }
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let opportunities =
            serde_json::from_str(json).map_err(|e| StoreError::Load(e.to_string()))?;
        Ok(Self::new(opportunities))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.opportunities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }

    fn matching<F>(&self, predicate: F) -> Vec<Opportunity>
    where
        F: Fn(&Opportunity) -> bool,
    {
        self.opportunities
            .iter()
            .filter(|o| predicate(o))
            .cloned()
            .collect()
    }
}

fn same_label(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[async_trait]
impl OpportunityStore for InMemoryOpportunityStore {
    async fn all(&self) -> Result<Vec<Opportunity>, StoreError> {
        Ok(self.opportunities.clone())
    }

    async fn by_category(&self, category: &str) -> Result<Vec<Opportunity>, StoreError> {
        Ok(self.matching(|o| same_label(&o.category, category)))
    }

    async fn by_region(&self, region: &str) -> Result<Vec<Opportunity>, StoreError> {
        Ok(self.matching(|o| o.region.as_deref().is_some_and(|r| same_label(r, region))))
    }
}
