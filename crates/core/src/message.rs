//! Message domain types and the conversation store contract.
//!
//! Messages are read-only to the engine: they are produced by the discussion
//! layer, fetched through a [`ConversationStore`] and only ever rendered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    /// The end user
    User,
    /// The AI assistant
    Ai,
}

/// Which audiences may see a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Shown to the user and sent to the model
    #[default]
    Visible,
    /// Hidden in the UI but still part of the model context
    InvisibleToUser,
    /// Shown to the user but never sent to the model
    InvisibleToAi,
}

/// A single message in a discussion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Position within the discussion
    #[serde(default)]
    pub rank: u32,

    /// Display name of the author
    pub sender: String,

    pub sender_type: SenderType,

    /// The text content
    pub content: String,

    /// Model that produced an AI message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub visibility: Visibility,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new user message.
    pub fn user(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(sender, SenderType::User, content)
    }

    /// Create a new AI message.
    pub fn ai(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(sender, SenderType::Ai, content)
    }

    fn new(sender: impl Into<String>, sender_type: SenderType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rank: 0,
            sender: sender.into(),
            sender_type,
            content: content.into(),
            model: None,
            visibility: Visibility::Visible,
            created_at: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    /// Whether the message may be sent to the model at all.
    pub fn is_visible_to_ai(&self) -> bool {
        self.visibility != Visibility::InvisibleToAi
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Read access to stored discussions.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    /// All messages of a client's active discussion, in order.
    async fn get_messages(&self, client_id: &str) -> std::result::Result<Vec<Message>, StoreError>;
}
