//! Credential registry
//!
//! Maps Slack user ids to an analysis client bound to that user's API key.
//! Entries are replaced on re-registration and never removed.

use crate::analysis::{AnalysisClient, ClientFactory};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Per-user analysis clients
pub struct CredentialRegistry {
    clients: RwLock<HashMap<String, Arc<dyn AnalysisClient>>>,
    factory: Arc<dyn ClientFactory>,
}

impl CredentialRegistry {
    /// Create an empty registry that builds clients with `factory`
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Bind `api_key` to `user_id`, replacing any previous client.
    ///
    /// The key is not checked against the service.
    pub async fn register(&self, user_id: &str, api_key: &str) {
        let client = self.factory.create(api_key);
        let replaced = {
            let mut clients = self.clients.write().await;
            clients.insert(user_id.to_string(), client).is_some()
        };
        info!(user_id, replaced, "Registered analysis credential");
    }

    /// Client currently registered for `user_id`
    pub async fn lookup(&self, user_id: &str) -> Option<Arc<dyn AnalysisClient>> {
        let clients = self.clients.read().await;
        clients.get(user_id).cloned()
    }

    /// Whether `user_id` has a credential
    pub async fn is_registered(&self, user_id: &str) -> bool {
        let clients = self.clients.read().await;
        clients.contains_key(user_id)
    }
}
