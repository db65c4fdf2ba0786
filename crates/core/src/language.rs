//! Language packs: translated conditioning and welcome text per personality.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Cached translation of a personality into one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguagePackEntry {
    pub personality_id: String,
    pub language_code: String,
    pub conditioning_text: String,
    pub welcome_text: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Persistence for language packs, keyed by (personality, language).
#[async_trait]
pub trait LanguagePackStore: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when no pack exists for the pair.
    async fn load(
        &self,
        personality_id: &str,
        language: &str,
    ) -> std::result::Result<Option<LanguagePackEntry>, StoreError>;

    /// Persist a pack. Implementations must replace atomically so readers
    /// never observe a partial entry.
    async fn save(&self, entry: &LanguagePackEntry) -> std::result::Result<(), StoreError>;

    /// Returns `true` if a pack was removed.
    async fn delete(&self, personality_id: &str, language: &str)
    -> std::result::Result<bool, StoreError>;

    /// Languages with a stored pack for the personality, sorted.
    async fn list_languages(&self, personality_id: &str)
    -> std::result::Result<Vec<String>, StoreError>;
}

/// Normalizes a user-supplied language name: first word, lower-cased.
///
/// `"  French canadian"` becomes `"french"`. Returns `None` for blank input.
pub fn normalize_language(language: &str) -> Option<String> {
    language
        .split_whitespace()
        .next()
        .map(|word| word.to_lowercase())
}
