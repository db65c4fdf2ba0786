//! Skills library: prior learnings searchable by similarity.
//!
//! Entries are kept in memory and, when opened with a path, mirrored to a
//! JSON-lines file (one `SkillEntry` per line) that is rewritten on every
//! insertion. Vectors are recomputed on load.

use async_trait::async_trait;
use contextweave_core::error::StoreError;
use contextweave_core::knowledge::{SkillEntry, SkillMatch, SkillsStore};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::vector::{rank_by_similarity, Vectorizer};

#[derive(Debug, Clone)]
struct StoredSkill {
    id: String,
    entry: SkillEntry,
    vector: Vec<f32>,
}

pub struct SkillsLibrary {
    vectorizer: Vectorizer,
    path: Option<PathBuf>,
    skills: Arc<RwLock<Vec<StoredSkill>>>,
}

impl SkillsLibrary {
    /// An empty library that is never written to disk.
    pub fn in_memory(vectorizer: Vectorizer) -> Self {
        Self {
            vectorizer,
            path: None,
            skills: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Open a file-backed library, loading existing entries.
    ///
    /// A missing file starts empty; corrupt lines are skipped.
    pub async fn open(path: PathBuf, vectorizer: Vectorizer) -> Result<Self, StoreError> {
        let entries = Self::load_from_disk(&path);
        let texts: Vec<String> = entries.iter().map(skill_text).collect();
        let vectors = vectorizer.vectorize(&texts).await?;

        let skills = entries
            .into_iter()
            .zip(vectors)
            .map(|(entry, vector)| StoredSkill {
                id: Uuid::new_v4().to_string(),
                entry,
                vector,
            })
            .collect::<Vec<_>>();
        debug!(path = %path.display(), count = skills.len(), "Skills library loaded");

        Ok(Self {
            vectorizer,
            path: Some(path),
            skills: Arc::new(RwLock::new(skills)),
        })
    }

    fn load_from_disk(path: &Path) -> Vec<SkillEntry> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<SkillEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted skill entry");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let skills = self.skills.read().await;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Failed to create skills directory: {e}")))?;
        }

        let mut content = String::new();
        for skill in skills.iter() {
            let line = serde_json::to_string(&skill.entry)
                .map_err(|e| StoreError::Storage(format!("Failed to serialize skill: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(path, &content)
            .map_err(|e| StoreError::Storage(format!("Failed to write skills file: {e}")))?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.skills.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.skills.read().await.is_empty()
    }
}

fn skill_text(entry: &SkillEntry) -> String {
    format!("{}\n{}\n{}", entry.title, entry.category, entry.content)
}

#[async_trait]
impl SkillsStore for SkillsLibrary {
    fn name(&self) -> &str {
        "skills_library"
    }

    async fn query_vector_db(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SkillMatch>, StoreError> {
        let query_vector = self.vectorizer.vectorize_one(query).await?;
        let skills = self.skills.read().await;

        let ranked = rank_by_similarity(
            skills.iter().map(|s| (s.id.as_str(), s.vector.as_slice())),
            &query_vector,
            &HashSet::new(),
            top_k,
            min_similarity,
        );

        Ok(ranked
            .into_iter()
            .map(|(i, similarity)| SkillMatch {
                title: skills[i].entry.title.clone(),
                content: skills[i].entry.content.clone(),
                similarity,
            })
            .collect())
    }

    async fn add_entry(&self, entry: SkillEntry) -> Result<String, StoreError> {
        let vector = self.vectorizer.vectorize_one(&skill_text(&entry)).await?;
        let id = Uuid::new_v4().to_string();
        self.skills.write().await.push(StoredSkill {
            id: id.clone(),
            entry,
            vector,
        });
        self.flush().await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn skill(title: &str, content: &str) -> SkillEntry {
        SkillEntry {
            title: title.into(),
            category: "general".into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn query_returns_best_matches_first() {
        let lib = SkillsLibrary::in_memory(Vectorizer::bag_of_words());
        lib.add_entry(skill("Tokio runtime", "spawn tasks on the tokio runtime")).await.unwrap();
        lib.add_entry(skill("Pasta", "boil water and add salt")).await.unwrap();

        let matches = lib.query_vector_db("how to spawn tokio tasks", 3, 0.0).await.unwrap();
        assert_eq!(matches[0].title, "Tokio runtime");
        assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn min_similarity_filters() {
        let lib = SkillsLibrary::in_memory(Vectorizer::bag_of_words());
        lib.add_entry(skill("Pasta", "boil water and add salt")).await.unwrap();
        let matches = lib.query_vector_db("quantum chromodynamics", 3, 0.5).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn file_backed_library_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.jsonl");

        let lib = SkillsLibrary::open(path.clone(), Vectorizer::bag_of_words()).await.unwrap();
        lib.add_entry(skill("Borrowing", "use references to avoid moves")).await.unwrap();

        let reopened = SkillsLibrary::open(path, Vectorizer::bag_of_words()).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        let matches = reopened.query_vector_db("references and moves", 1, 0.0).await.unwrap();
        assert_eq!(matches[0].title, "Borrowing");
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.jsonl");
        std::fs::write(
            &path,
            "not json\n{\"title\":\"t\",\"category\":\"c\",\"content\":\"x\"}\n",
        )
        .unwrap();
        let lib = SkillsLibrary::open(path, Vectorizer::bag_of_words()).await.unwrap();
        assert_eq!(lib.len().await, 1);
    }
}
