//! In-memory conversation store.

use async_trait::async_trait;
use contextweave_core::error::StoreError;
use contextweave_core::message::{ConversationStore, Message};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Discussions keyed by client id.
pub struct InMemoryConversationStore {
    discussions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            discussions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace a client's discussion. Ranks are renumbered in order.
    pub async fn set_discussion(&self, client_id: impl Into<String>, mut messages: Vec<Message>) {
        for (rank, msg) in messages.iter_mut().enumerate() {
            msg.rank = rank as u32;
        }
        self.discussions.write().await.insert(client_id.into(), messages);
    }

    /// Append a message to a client's discussion.
    pub async fn push(&self, client_id: &str, mut message: Message) {
        let mut discussions = self.discussions.write().await;
        let messages = discussions.entry(client_id.to_string()).or_default();
        message.rank = messages.len() as u32;
        messages.push(message);
    }

    /// Load a discussion from a JSON array of messages.
    pub async fn load_json_file(&self, client_id: &str, path: &Path) -> Result<usize, StoreError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to read {}: {e}", path.display())))?;
        let messages: Vec<Message> = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let count = messages.len();
        self.set_discussion(client_id, messages).await;
        Ok(count)
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_messages(&self, client_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .discussions
            .read()
            .await
            .get(client_id)
            .cloned()
            .unwrap_or_default())
    }
}
