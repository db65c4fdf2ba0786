//! Per-personality, per-language conditioning cache.
//!
//! The personality's own language uses its built-in conditioning. Any other
//! language is translated by the model the first time it is requested and
//! persisted as a [`LanguagePackEntry`]; later requests reuse the stored
//! pack without calling the model.
//!
//! Concurrent first requests for the same pair are single-flighted: one task
//! translates, the others wait and then read the stored pack.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use contextweave_core::error::{ContextError, Result, StoreError};
use contextweave_core::language::{normalize_language, LanguagePackEntry, LanguagePackStore};
use contextweave_core::personality::Personality;
use contextweave_core::progress::{ProgressReporter, StepPhase};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::tasks::ModelTasks;

/// Where a resolved conditioning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackSource {
    /// The personality speaks this language natively
    Default,
    Cached,
    /// Translated during this call and persisted
    Translated,
    /// The pack could not be read or written; default conditioning used
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConditioning {
    pub language: String,
    pub conditioning: String,
    pub welcome_message: String,
    pub source: PackSource,
}

type PairKey = (String, String);

pub struct LanguagePackCache {
    store: Arc<dyn LanguagePackStore>,
    current: RwLock<Option<String>>,
    inflight: Mutex<HashMap<PairKey, Arc<Mutex<()>>>>,
}

impl LanguagePackCache {
    pub fn new(store: Arc<dyn LanguagePackStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Start the session in `language` (normalised; blank means default).
    pub fn with_language(self, language: Option<&str>) -> Self {
        Self {
            current: RwLock::new(language.and_then(normalize_language)),
            ..self
        }
    }

    pub fn store(&self) -> &Arc<dyn LanguagePackStore> {
        &self.store
    }

    /// The selected session language, if any.
    pub async fn current_language(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    /// Select the session language. Returns the normalised language, or
    /// `None` (selection unchanged) for a blank input.
    pub async fn select_language(&self, language: &str) -> Option<String> {
        let normalized = normalize_language(language)?;
        info!(language = %normalized, "Session language selected");
        *self.current.write().await = Some(normalized.clone());
        Some(normalized)
    }

    /// Languages available for `personality`: its own first, then every
    /// cached pack.
    pub async fn list_languages(&self, personality: &Personality) -> std::result::Result<Vec<String>, StoreError> {
        let default = default_language(personality);
        let mut languages = vec![default.clone()];
        for language in self.store.list_languages(&personality.id).await? {
            if !languages.contains(&language) {
                languages.push(language);
            }
        }
        Ok(languages)
    }

    /// Remove a cached pack. The default language cannot be deleted; when
    /// the deleted language was selected the session returns to the default.
    pub async fn delete_language(&self, personality: &Personality, language: &str) -> Result<bool> {
        let default = default_language(personality);
        let language = normalize_language(language).unwrap_or_default();
        if language.is_empty() || language == default {
            return Err(ContextError::DefaultLanguageDeletion(default).into());
        }

        let deleted = self.store.delete(&personality.id, &language).await?;
        let mut current = self.current.write().await;
        if current.as_deref() == Some(language.as_str()) {
            *current = None;
        }
        info!(personality = %personality.id, language = %language, deleted, "Language pack deleted");
        Ok(deleted)
    }

    /// Conditioning and welcome text for `language`, or for the session
    /// language when `None`.
    pub async fn resolve(
        &self,
        personality: &Personality,
        language: Option<&str>,
        tasks: &ModelTasks,
        progress: &dyn ProgressReporter,
    ) -> ResolvedConditioning {
        let default = default_language(personality);
        let requested = match language.and_then(normalize_language) {
            Some(language) => Some(language),
            None => self.current_language().await,
        };
        let language = match requested {
            Some(language) if language != default => language,
            _ => return builtin(personality, default, PackSource::Default),
        };

        match self.store.load(&personality.id, &language).await {
            Ok(Some(entry)) => return from_entry(entry, PackSource::Cached),
            Ok(None) => {}
            Err(e) => {
                warn!(personality = %personality.id, language = %language, error = %e, "Language pack unreadable");
                return builtin(personality, language, PackSource::Fallback);
            }
        }

        let key = (personality.id.clone(), language.clone());
        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(key.clone()).or_default())
        };
        let outcome = {
            let _flight = gate.lock().await;
            self.load_or_translate(personality, &default, &language, tasks, progress).await
        };
        self.inflight.lock().await.remove(&key);
        outcome
    }

    async fn load_or_translate(
        &self,
        personality: &Personality,
        default: &str,
        language: &str,
        tasks: &ModelTasks,
        progress: &dyn ProgressReporter,
    ) -> ResolvedConditioning {
        // Another task may have finished the translation while we waited.
        match self.store.load(&personality.id, language).await {
            Ok(Some(entry)) => return from_entry(entry, PackSource::Cached),
            Ok(None) => {}
            Err(e) => {
                warn!(language, error = %e, "Language pack unreadable");
                return builtin(personality, language.to_string(), PackSource::Fallback);
            }
        }

        let step = format!("Translating {} to {language}", personality.name);
        progress.report_step(&step, StepPhase::Start);
        info!(personality = %personality.id, language, "First use of this language, translating conditioning");

        let translated = async {
            let conditioning = tasks.translate(&personality.conditioning, default, language).await?;
            let welcome = tasks.translate(&personality.welcome_message, default, language).await?;
            Ok::<_, contextweave_core::ProviderError>((conditioning, welcome))
        }
        .await;
        let (conditioning_text, welcome_text) = match translated {
            Ok(texts) => texts,
            Err(e) => {
                warn!(language, error = %e, "Translation failed, using default conditioning");
                progress.report_step(&step, StepPhase::End { success: false });
                return builtin(personality, language.to_string(), PackSource::Fallback);
            }
        };

        let entry = LanguagePackEntry {
            personality_id: personality.id.clone(),
            language_code: language.to_string(),
            conditioning_text,
            welcome_text,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.save(&entry).await {
            warn!(language, error = %e, "Could not persist language pack, using default conditioning");
            progress.report_step(&step, StepPhase::End { success: false });
            return builtin(personality, language.to_string(), PackSource::Fallback);
        }
        progress.report_step(&step, StepPhase::End { success: true });
        debug!(language, "Language pack stored");
        from_entry(entry, PackSource::Translated)
    }
}

/// The personality's own language, normalised.
pub fn default_language(personality: &Personality) -> String {
    normalize_language(&personality.language).unwrap_or_else(|| "english".into())
}

fn builtin(personality: &Personality, language: String, source: PackSource) -> ResolvedConditioning {
    ResolvedConditioning {
        language,
        conditioning: personality.conditioning.clone(),
        welcome_message: personality.welcome_message.clone(),
        source,
    }
}

fn from_entry(entry: LanguagePackEntry, source: PackSource) -> ResolvedConditioning {
    ResolvedConditioning {
        language: entry.language_code,
        conditioning: entry.conditioning_text,
        welcome_message: entry.welcome_text,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingProgress, SequentialMockModel};
    use async_trait::async_trait;
    use contextweave_config::PromptTemplates;
    use contextweave_core::{CharTokenizer, NoopProgress};
    use contextweave_memory::InMemoryLanguagePackStore;

    fn setup(responses: Vec<&str>) -> (Arc<SequentialMockModel>, ModelTasks, Arc<InMemoryLanguagePackStore>, LanguagePackCache) {
        let model = Arc::new(SequentialMockModel::new(responses));
        let tasks = ModelTasks::new(model.clone(), Arc::new(CharTokenizer), PromptTemplates::default());
        let store = Arc::new(InMemoryLanguagePackStore::new());
        let cache = LanguagePackCache::new(store.clone());
        (model, tasks, store, cache)
    }

    #[tokio::test]
    async fn default_language_uses_builtin() {
        let (model, tasks, _, cache) = setup(vec![]);
        let p = Personality::default_personality();
        let r = cache.resolve(&p, Some("English"), &tasks, &NoopProgress).await;
        assert_eq!(r.source, PackSource::Default);
        assert_eq!(r.conditioning, p.conditioning);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn translates_once_then_reuses() {
        let (model, tasks, store, cache) = setup(vec!["Sois utile.", "Bienvenue !"]);
        let p = Personality::default_personality();
        let progress = RecordingProgress::default();

        let first = cache.resolve(&p, Some("french"), &tasks, &progress).await;
        assert_eq!(first.source, PackSource::Translated);
        assert_eq!(first.conditioning, "Sois utile.");
        assert_eq!(first.welcome_message, "Bienvenue !");
        assert!(progress.started("Translating assistant to french"));

        let second = cache.resolve(&p, Some("French"), &tasks, &progress).await;
        assert_eq!(second.source, PackSource::Cached);
        assert_eq!(second.conditioning, "Sois utile.");
        assert_eq!(model.call_count(), 2);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_use_translates_once() {
        let (model, tasks, store, cache) = setup(vec!["Sé útil.", "¡Bienvenido!"]);
        let p = Personality::default_personality();
        let (a, b, c) = tokio::join!(
            cache.resolve(&p, Some("spanish"), &tasks, &NoopProgress),
            cache.resolve(&p, Some("spanish"), &tasks, &NoopProgress),
            cache.resolve(&p, Some("spanish"), &tasks, &NoopProgress),
        );
        assert_eq!(a.conditioning, b.conditioning);
        assert_eq!(b.conditioning, c.conditioning);
        assert_eq!(model.call_count(), 2);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn translation_failure_falls_back_without_persisting() {
        let (_, tasks, store, cache) = setup(vec![]);
        let p = Personality::default_personality();
        let r = cache.resolve(&p, Some("german"), &tasks, &NoopProgress).await;
        assert_eq!(r.source, PackSource::Fallback);
        assert_eq!(r.conditioning, p.conditioning);
        assert!(store.is_empty().await);
    }

    struct BrokenStore;

    #[async_trait]
    impl LanguagePackStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        async fn load(&self, _: &str, _: &str) -> std::result::Result<Option<LanguagePackEntry>, StoreError> {
            Err(StoreError::Corrupt { path: "x".into(), reason: "half written".into() })
        }
        async fn save(&self, _: &LanguagePackEntry) -> std::result::Result<(), StoreError> {
            Err(StoreError::Storage("read-only".into()))
        }
        async fn delete(&self, _: &str, _: &str) -> std::result::Result<bool, StoreError> {
            Ok(false)
        }
        async fn list_languages(&self, _: &str) -> std::result::Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn unreadable_pack_falls_back() {
        let model = Arc::new(SequentialMockModel::new(vec!["x"]));
        let tasks = ModelTasks::new(model.clone(), Arc::new(CharTokenizer), PromptTemplates::default());
        let cache = LanguagePackCache::new(Arc::new(BrokenStore));
        let p = Personality::default_personality();
        let r = cache.resolve(&p, Some("italian"), &tasks, &NoopProgress).await;
        assert_eq!(r.source, PackSource::Fallback);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn delete_default_is_rejected_and_cache_unchanged() {
        let (_, tasks, store, cache) = setup(vec!["Sois utile.", "Bienvenue !"]);
        let p = Personality::default_personality();
        cache.resolve(&p, Some("french"), &tasks, &NoopProgress).await;

        let err = cache.delete_language(&p, "English").await.unwrap_err();
        assert!(err.to_string().contains("english"));
        assert_eq!(store.len().await, 1);
        assert_eq!(cache.list_languages(&p).await.unwrap(), vec!["english", "french"]);
    }

    #[tokio::test]
    async fn deleting_selected_language_resets_session() {
        let (model, tasks, _, cache) = setup(vec!["Sois utile.", "Bienvenue !", "Sois utile !", "Salut !"]);
        let p = Personality::default_personality();
        assert_eq!(cache.select_language("French please").await.as_deref(), Some("french"));
        let first = cache.resolve(&p, None, &tasks, &NoopProgress).await;
        assert_eq!(first.source, PackSource::Translated);

        assert!(cache.delete_language(&p, "french").await.unwrap());
        assert!(cache.current_language().await.is_none());

        let again = cache.resolve(&p, Some("french"), &tasks, &NoopProgress).await;
        assert_eq!(again.source, PackSource::Translated);
        assert_eq!(again.conditioning, "Sois utile !");
        assert_eq!(model.call_count(), 4);
    }

    #[tokio::test]
    async fn blank_selection_is_ignored() {
        let (_, _, _, cache) = setup(vec![]);
        let cache = cache.with_language(Some("german"));
        assert!(cache.select_language("   ").await.is_none());
        assert_eq!(cache.current_language().await.as_deref(), Some("german"));
    }
}
