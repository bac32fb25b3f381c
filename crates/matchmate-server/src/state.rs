use matchmate::agent::Agent;
use matchmate::conversation::Conversation;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// A session's conversation. Holding the lock means a cycle is running for it.
pub type SharedConversation = Arc<Mutex<Conversation>>;

/// Live sessions keyed by id. Conversations are kept in memory for the life of the process.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SharedConversation>>>,
}

impl SessionStore {
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(Conversation::new())));
        id
    }

    pub async fn get(&self, id: &str) -> Option<SharedConversation> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(agent),
            sessions: SessionStore::default(),
        }
    }
}
