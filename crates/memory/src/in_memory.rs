//! In-memory language-pack store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use contextweave_core::error::StoreError;
use contextweave_core::language::{LanguagePackEntry, LanguagePackStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

type PackKey = (String, String);

/// Stores language packs in a map keyed by (personality, language).
pub struct InMemoryLanguagePackStore {
    packs: Arc<RwLock<HashMap<PackKey, LanguagePackEntry>>>,
    saves: AtomicUsize,
}

impl InMemoryLanguagePackStore {
    pub fn new() -> Self {
        Self {
            packs: Arc::new(RwLock::new(HashMap::new())),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.packs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.packs.read().await.is_empty()
    }
}

impl Default for InMemoryLanguagePackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguagePackStore for InMemoryLanguagePackStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(
        &self,
        personality_id: &str,
        language: &str,
    ) -> Result<Option<LanguagePackEntry>, StoreError> {
        let packs = self.packs.read().await;
        Ok(packs
            .get(&(personality_id.to_string(), language.to_string()))
            .cloned())
    }

    async fn save(&self, entry: &LanguagePackEntry) -> Result<(), StoreError> {
        self.packs.write().await.insert(
            (entry.personality_id.clone(), entry.language_code.clone()),
            entry.clone(),
        );
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, personality_id: &str, language: &str) -> Result<bool, StoreError> {
        let mut packs = self.packs.write().await;
        Ok(packs
            .remove(&(personality_id.to_string(), language.to_string()))
            .is_some())
    }

    async fn list_languages(&self, personality_id: &str) -> Result<Vec<String>, StoreError> {
        let packs = self.packs.read().await;
        let mut languages: Vec<String> = packs
            .keys()
            .filter(|(p, _)| p == personality_id)
            .map(|(_, lang)| lang.clone())
            .collect();
        languages.sort();
        Ok(languages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pack(lang: &str) -> LanguagePackEntry {
        LanguagePackEntry {
            personality_id: "lolly".into(),
            language_code: lang.into(),
            conditioning_text: "c".into(),
            welcome_text: "w".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_load_delete() {
        let store = InMemoryLanguagePackStore::new();
        store.save(&pack("french")).await.unwrap();
        assert_eq!(store.save_count(), 1);
        assert!(store.load("lolly", "french").await.unwrap().is_some());
        assert!(store.load("other", "french").await.unwrap().is_none());

        assert!(store.delete("lolly", "french").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn list_is_scoped_to_personality() {
        let store = InMemoryLanguagePackStore::new();
        store.save(&pack("german")).await.unwrap();
        store.save(&pack("arabic")).await.unwrap();
        assert_eq!(
            store.list_languages("lolly").await.unwrap(),
            vec!["arabic".to_string(), "german".to_string()]
        );
        assert!(store.list_languages("nobody").await.unwrap().is_empty());
    }
}
