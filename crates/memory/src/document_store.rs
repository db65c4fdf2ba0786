//! In-memory vector store over chunked documents.
//!
//! Documents are split into chunks of at most `chunk_size` characters on
//! whitespace boundaries, vectorized once on insertion, and searched by
//! cosine similarity. `distance` is reported as `1 - similarity`.

use async_trait::async_trait;
use contextweave_core::error::StoreError;
use contextweave_core::knowledge::{DocumentInfo, KnowledgeChunk, VectorStore};
use contextweave_core::tokenizer::Tokenizer;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::vector::{rank_by_similarity, Vectorizer};

/// File extensions picked up by [`InMemoryVectorStore::load_directory`].
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "rst", "csv", "json", "toml", "rs", "py"];

#[derive(Debug, Clone)]
struct StoredDocument {
    info: DocumentInfo,
    text: String,
}

#[derive(Debug, Clone)]
struct StoredChunk {
    chunk: KnowledgeChunk,
    vector: Vec<f32>,
}

pub struct InMemoryVectorStore {
    name: String,
    vectorizer: Vectorizer,
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    documents: Arc<RwLock<Vec<StoredDocument>>>,
    chunks: Arc<RwLock<Vec<StoredChunk>>>,
}

impl InMemoryVectorStore {
    pub fn new(
        name: impl Into<String>,
        vectorizer: Vectorizer,
        tokenizer: Arc<dyn Tokenizer>,
        chunk_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            vectorizer,
            tokenizer,
            chunk_size: chunk_size.max(1),
            documents: Arc::new(RwLock::new(Vec::new())),
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Index a document, replacing any earlier version at the same path.
    ///
    /// Returns the number of chunks created.
    pub async fn add_document(
        &self,
        title: impl Into<String>,
        path: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<usize, StoreError> {
        let info = DocumentInfo {
            title: title.into(),
            path: path.into(),
        };
        let text = text.into();

        let pieces = chunk_text(&text, self.chunk_size);
        let vectors = self.vectorizer.vectorize(&pieces).await?;

        let new_chunks: Vec<StoredChunk> = pieces
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (piece, vector))| StoredChunk {
                chunk: KnowledgeChunk {
                    chunk_id: format!("{}#{i}", info.path),
                    source_document_title: info.title.clone(),
                    source_document_path: info.path.clone(),
                    token_count: self.tokenizer.count(&piece),
                    text: piece,
                    distance: 0.0,
                },
                vector,
            })
            .collect();
        let count = new_chunks.len();

        {
            let mut chunks = self.chunks.write().await;
            chunks.retain(|c| c.chunk.source_document_path != info.path);
            chunks.extend(new_chunks);
        }
        {
            let mut documents = self.documents.write().await;
            documents.retain(|d| d.info.path != info.path);
            documents.push(StoredDocument { info: info.clone(), text });
        }

        debug!(store = %self.name, path = %info.path, chunks = count, "Document indexed");
        Ok(count)
    }

    /// Index every text file directly inside `dir`.
    ///
    /// Unreadable files are skipped with a warning. Returns the number of
    /// documents indexed.
    pub async fn load_directory(&self, dir: &Path) -> Result<usize, StoreError> {
        let mut reader = tokio::fs::read_dir(dir).await.map_err(|e| StoreError::Unavailable {
            store: self.name.clone(),
            reason: format!("{}: {e}", dir.display()),
        })?;

        let mut paths = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let path = item.path();
            let is_text = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext));
            if is_text {
                paths.push(path);
            }
        }
        paths.sort();

        let mut indexed = 0;
        for path in paths {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    let title = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("document")
                        .to_string();
                    self.add_document(title, path.display().to_string(), text).await?;
                    indexed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }
        Ok(indexed)
    }

    pub async fn chunk_count(&self) -> usize {
        self.chunks.read().await.len()
    }
}

/// Split `text` into pieces of at most `max_chars` characters, breaking on
/// whitespace where possible. Words longer than `max_chars` are split hard.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.vectorizer.vectorize_one(query).await?;
        let chunks = self.chunks.read().await;

        let ranked = rank_by_similarity(
            chunks
                .iter()
                .map(|c| (c.chunk.chunk_id.as_str(), c.vector.as_slice())),
            &query_vector,
            exclude_ids,
            k,
            f32::MIN,
        );

        Ok(ranked
            .into_iter()
            .map(|(i, similarity)| {
                let mut chunk = chunks[i].chunk.clone();
                chunk.distance = 1.0 - similarity;
                chunk
            })
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .map(|d| d.info.clone())
            .collect())
    }

    async fn get_document(&self, path: &str) -> Result<String, StoreError> {
        self.documents
            .read()
            .await
            .iter()
            .find(|d| d.info.path == path)
            .map(|d| d.text.clone())
            .ok_or_else(|| StoreError::DocumentNotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextweave_core::CharTokenizer;

    fn store(chunk_size: usize) -> InMemoryVectorStore {
        InMemoryVectorStore::new("notes", Vectorizer::bag_of_words(), Arc::new(CharTokenizer), chunk_size)
    }

    #[test]
    fn chunking_respects_size_and_words() {
        let chunks = chunk_text("one two three four five", 9);
        assert_eq!(chunks, vec!["one two", "three", "four five"]);
        for c in &chunks {
            assert!(c.chars().count() <= 9);
        }
    }

    #[test]
    fn chunking_splits_long_words() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[tokio::test]
    async fn search_ranks_relevant_chunk_first() {
        let s = store(64);
        s.add_document("rust", "/docs/rust.md", "Rust ownership rules prevent data races")
            .await
            .unwrap();
        s.add_document("bread", "/docs/bread.md", "Knead the dough and let it rise overnight")
            .await
            .unwrap();

        let results = s.search("ownership in rust", 2, &HashSet::new()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_document_title, "rust");
        assert!(results[0].distance <= results[1].distance);
        assert_eq!(results[0].token_count, results[0].text.chars().count());
    }

    #[tokio::test]
    async fn search_excludes_ids() {
        let s = store(64);
        s.add_document("a", "/a", "alpha beta").await.unwrap();
        s.add_document("b", "/b", "alpha gamma").await.unwrap();

        let exclude: HashSet<String> = ["/a#0".to_string()].into_iter().collect();
        let results = s.search("alpha", 5, &exclude).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "/b#0");
    }

    #[tokio::test]
    async fn reindexing_replaces_document() {
        let s = store(8);
        s.add_document("a", "/a", "one two three four").await.unwrap();
        let before = s.chunk_count().await;
        s.add_document("a", "/a", "one").await.unwrap();
        assert!(before > 1);
        assert_eq!(s.chunk_count().await, 1);
        assert_eq!(s.get_document("/a").await.unwrap(), "one");
        assert_eq!(s.list_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_document_is_error() {
        let s = store(8);
        assert!(matches!(
            s.get_document("/nope").await,
            Err(StoreError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn load_directory_indexes_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("guide.md"), "install with cargo").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let s = store(64);
        assert_eq!(s.load_directory(dir.path()).await.unwrap(), 1);
        let docs = s.list_documents().await.unwrap();
        assert_eq!(docs[0].title, "guide");
    }
}
