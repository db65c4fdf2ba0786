//! Knowledge sources: vector stores, skills library and internet search.
//!
//! All retrieval collaborators hand back [`KnowledgeChunk`]s (or skills
//! matches) so the engine can size, rank and render them uniformly. How the
//! similarity search works internally is up to each implementation.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A retrieved fragment of a source document.
///
/// Lower `distance` means more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Identifier, unique within the store that produced it
    pub chunk_id: String,

    pub source_document_title: String,

    /// File path for documents, URL for web results
    pub source_document_path: String,

    pub text: String,

    #[serde(default)]
    pub token_count: usize,

    #[serde(default)]
    pub distance: f32,
}

impl KnowledgeChunk {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Summary of a document held by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: String,
    pub path: String,
}

/// A searchable document database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The store name (e.g., the mounted database name).
    fn name(&self) -> &str;

    /// Up to `k` chunks closest to `query`, never returning an id in
    /// `exclude_ids`.
    async fn search(
        &self,
        query: &str,
        k: usize,
        exclude_ids: &HashSet<String>,
    ) -> std::result::Result<Vec<KnowledgeChunk>, StoreError>;

    async fn list_documents(&self) -> std::result::Result<Vec<DocumentInfo>, StoreError>;

    /// Full text of one document.
    async fn get_document(&self, path: &str) -> std::result::Result<String, StoreError>;
}

/// A learned skill stored in the skills library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub title: String,
    pub category: String,
    pub content: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A skill returned by a recall query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMatch {
    pub title: String,
    pub content: String,
    pub similarity: f32,
}

/// Prior learnings, searchable by similarity.
#[async_trait]
pub trait SkillsStore: Send + Sync {
    fn name(&self) -> &str;

    /// At most `top_k` skills whose similarity is at least `min_similarity`,
    /// best first.
    async fn query_vector_db(
        &self,
        query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> std::result::Result<Vec<SkillMatch>, StoreError>;

    /// Store a new skill, returning its id.
    async fn add_entry(&self, entry: SkillEntry) -> std::result::Result<String, StoreError>;
}

/// Web search that returns page fragments already ranked against the query.
#[async_trait]
pub trait InternetSearch: Send + Sync {
    fn name(&self) -> &str;

    /// `quick_mode` uses search snippets instead of fetching pages;
    /// `assess_with_model` lets the backend discard pages a model judges
    /// irrelevant.
    async fn search_with_vectorization(
        &self,
        query: &str,
        quick_mode: bool,
        assess_with_model: bool,
    ) -> std::result::Result<Vec<KnowledgeChunk>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_one_minus_distance() {
        let chunk = KnowledgeChunk {
            chunk_id: "c1".into(),
            source_document_title: "Guide".into(),
            source_document_path: "/docs/guide.md".into(),
            text: "body".into(),
            token_count: 4,
            distance: 0.25,
        };
        assert!((chunk.similarity() - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn skill_entry_serialization() {
        let entry = SkillEntry {
            title: "Borrow checker tips".into(),
            category: "rust".into(),
            content: "Prefer slices over owned vectors in arguments".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("Borrow checker tips"));
        let back: SkillEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.category, "rust");
    }
}
