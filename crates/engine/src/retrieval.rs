//! Multi-store, multi-hop retrieval and documentation rendering.
//!
//! # Merge algorithm
//!
//! Every hop queries each store for up to `target_count` chunks, excluding
//! the ids that store already returned during this merge. Returned chunks
//! optionally pass a relevance filter, then join a single pool shared by all
//! stores. The merge stops as soon as the pool holds `target_count` chunks
//! after a complete hop, when `max_hops` hops have run, or when a hop brings
//! nothing new. The pool is then stable-sorted by distance and capped to
//! `n_neighbors`.
//!
//! A store that fails is logged and skipped for the rest of the merge; if
//! every store fails the outcome is simply empty.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use contextweave_config::PromptTemplates;
use contextweave_core::knowledge::{KnowledgeChunk, VectorStore};
use contextweave_core::progress::{ProgressReporter, StepPhase};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tasks::ModelTasks;

// ── Merge state ──────────────────────────────────────────────────────────

/// Chunk ids already returned, one set per store, for a single merge.
#[derive(Debug, Clone, Default)]
pub struct RetrievalState {
    seen: Vec<HashSet<String>>,
}

impl RetrievalState {
    pub fn new(n_stores: usize) -> Self {
        Self {
            seen: vec![HashSet::new(); n_stores],
        }
    }

    pub fn seen(&self, store: usize) -> &HashSet<String> {
        &self.seen[store]
    }

    /// Mark `id` as returned by `store`. False when it was already seen.
    pub fn record(&mut self, store: usize, id: &str) -> bool {
        self.seen[store].insert(id.to_string())
    }

    pub fn total_seen(&self) -> usize {
        self.seen.iter().map(HashSet::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Pool size that ends the merge; also the per-store request size
    pub target_count: usize,
    pub max_hops: usize,
    /// Chunks kept after ranking
    pub n_neighbors: usize,
}

/// Binary relevance check applied to every retrieved chunk.
#[async_trait]
pub trait RelevanceFilter: Send + Sync {
    async fn is_relevant(&self, query: &str, text: &str) -> bool;
}

#[async_trait]
impl RelevanceFilter for ModelTasks {
    async fn is_relevant(&self, query: &str, text: &str) -> bool {
        let question = format!("Is this text chunk relevant to the query \"{query}\"?");
        match self.yes_no(&question, text).await {
            Ok(relevant) => relevant,
            Err(e) => {
                warn!(error = %e, "Relevance verification failed, keeping chunk");
                true
            }
        }
    }
}

/// A chunk together with the store it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedChunk {
    pub store: String,
    pub chunk: KnowledgeChunk,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Ranked by ascending distance
    pub chunks: Vec<MergedChunk>,
    pub hops: usize,
    pub failed_stores: Vec<String>,
}

// ── Merger ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RetrievalMerger<'a> {
    filter: Option<&'a dyn RelevanceFilter>,
}

impl<'a> RetrievalMerger<'a> {
    pub fn new() -> Self {
        Self { filter: None }
    }

    pub fn with_filter(filter: &'a dyn RelevanceFilter) -> Self {
        Self { filter: Some(filter) }
    }

    pub async fn merge(
        &self,
        stores: &[Arc<dyn VectorStore>],
        query: &str,
        options: MergeOptions,
    ) -> MergeOutcome {
        let mut state = RetrievalState::new(stores.len());
        let mut failed = vec![false; stores.len()];
        let mut outcome = MergeOutcome::default();
        let mut pool: Vec<MergedChunk> = Vec::new();

        while pool.len() < options.target_count && outcome.hops < options.max_hops {
            outcome.hops += 1;
            let mut fresh = 0usize;

            for (i, store) in stores.iter().enumerate() {
                if failed[i] {
                    continue;
                }
                let chunks = match store.search(query, options.target_count, state.seen(i)).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!(store = %store.name(), error = %e, "Vector store search failed, skipping store");
                        failed[i] = true;
                        outcome.failed_stores.push(store.name().to_string());
                        continue;
                    }
                };
                debug!(store = %store.name(), hop = outcome.hops, returned = chunks.len(), "Store queried");

                for chunk in chunks {
                    if !state.record(i, &chunk.chunk_id) {
                        continue;
                    }
                    if !chunk.distance.is_finite() {
                        warn!(store = %store.name(), chunk = %chunk.chunk_id, "Chunk without a finite distance, dropping it");
                        continue;
                    }
                    fresh += 1;
                    if let Some(filter) = self.filter {
                        if !filter.is_relevant(query, &chunk.text).await {
                            debug!(chunk = %chunk.chunk_id, "Chunk rejected by relevance filter");
                            continue;
                        }
                    }
                    pool.push(MergedChunk {
                        store: store.name().to_string(),
                        chunk,
                    });
                }
            }

            if fresh == 0 {
                debug!(hop = outcome.hops, "No new chunks, ending merge");
                break;
            }
        }

        pool.sort_by(|a, b| a.chunk.distance.total_cmp(&b.chunk.distance));
        pool.truncate(options.n_neighbors);

        info!(
            hops = outcome.hops,
            seen = state.total_seen(),
            kept = pool.len(),
            "Retrieval merge complete"
        );
        outcome.chunks = pool;
        outcome
    }
}

// ── Documentation rendering ──────────────────────────────────────────────

/// What the caller learns about each documentation piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationEntry {
    pub document_title: String,
    pub document_path: String,
    pub chunk_content: String,
    pub chunk_size: usize,
    pub similarity: f32,
}

/// A documentation block under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Documentation {
    pub text: String,
    pub entries: Vec<DocumentationEntry>,
}

impl Documentation {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn append(&mut self, other: Documentation) {
        self.text.push_str(&other.text);
        self.entries.extend(other.entries);
    }
}

/// Instructions placed once ahead of any documentation content.
pub fn documentation_header(templates: &PromptTemplates) -> String {
    let sep = templates.separator_template.as_str();
    let mut header = [
        templates.system_custom_header("important information"),
        "Always refer to the provided documentation to answer user questions accurately.".to_string(),
        "Absence of Information: If the required information is not available in the documentation, \
         inform the user that the requested information is not present in the documentation section."
            .to_string(),
        "Strict Adherence to Documentation: It is strictly prohibited to provide answers without \
         concrete evidence from the documentation."
            .to_string(),
        "Cite Your Sources: After providing an answer, include the full path to the document where \
         the information was found."
            .to_string(),
        templates.system_custom_header("Documentation"),
    ]
    .join(sep);
    header.push_str(sep);
    header
}

/// Render ranked chunks. With `with_infos` each chunk carries its source
/// title and path.
pub fn render_documentation(
    templates: &PromptTemplates,
    chunks: &[MergedChunk],
    with_infos: bool,
) -> Documentation {
    let sep = templates.separator_template.as_str();
    let mut doc = Documentation::default();
    for MergedChunk { chunk, .. } in chunks {
        let rendered = if with_infos {
            [
                format!(
                    "{}document chunk{}",
                    templates.start_header_id_template, templates.end_header_id_template
                ),
                format!("source_document_title:{}", chunk.source_document_title),
                format!("source_document_path:{}", chunk.source_document_path),
                format!("content:\n{}\n", chunk.text),
            ]
            .join(sep)
        } else {
            format!(
                "{}chunk{}\n{}\n",
                templates.start_header_id_template, templates.end_header_id_template, chunk.text
            )
        };
        doc.text.push_str(&rendered);
        doc.entries.push(DocumentationEntry {
            document_title: chunk.source_document_title.clone(),
            document_path: chunk.source_document_path.clone(),
            chunk_content: chunk.text.clone(),
            chunk_size: chunk.token_count,
            similarity: chunk.similarity(),
        });
    }
    doc
}

/// Every document of every store, verbatim. Used when retrieval is
/// deactivated.
pub async fn full_documents(stores: &[Arc<dyn VectorStore>]) -> Documentation {
    let mut texts = Vec::new();
    let mut entries = Vec::new();
    for store in stores {
        let documents = match store.list_documents().await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(store = %store.name(), error = %e, "Could not list documents");
                continue;
            }
        };
        for info in documents {
            match store.get_document(&info.path).await {
                Ok(text) => {
                    entries.push(DocumentationEntry {
                        document_title: info.title,
                        document_path: info.path,
                        chunk_content: text.clone(),
                        chunk_size: 0,
                        similarity: 1.0,
                    });
                    texts.push(text);
                }
                Err(e) => warn!(store = %store.name(), path = %info.path, error = %e, "Could not read document"),
            }
        }
    }
    if texts.is_empty() {
        return Documentation::default();
    }
    Documentation {
        text: format!("{}\n", texts.join("\n\n")),
        entries,
    }
}

/// Summarise every document of every store against `query`, then condense
/// the per-document summaries into the documentation text.
pub async fn contextual_summaries(
    tasks: &ModelTasks,
    stores: &[Arc<dyn VectorStore>],
    query: &str,
    progress: &dyn ProgressReporter,
) -> Documentation {
    let templates = tasks.templates();
    let sep = templates.separator_template.as_str();
    let query_header = templates.system_custom_header("query");
    let mut full = String::new();
    let mut entries = Vec::new();

    for store in stores {
        let documents = match store.list_documents().await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(store = %store.name(), error = %e, "Could not list documents");
                continue;
            }
        };
        for info in documents {
            let text = match store.get_document(&info.path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %info.path, error = %e, "Could not read document");
                    continue;
                }
            };
            let step = format!("Summarizing document {}", info.path);
            progress.report_step(&step, StepPhase::Start);
            let instruction = format!(
                "Extract information from the following text chunk to answer this request. \
                 If there is no information about the query, just return an empty string.\n{query_header}{query}"
            );
            let summary = match tasks.summarize(&text, &instruction).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(path = %info.path, error = %e, "Document summary failed");
                    progress.report_step(&step, StepPhase::End { success: false });
                    continue;
                }
            };
            progress.report_step(&step, StepPhase::End { success: true });

            full.push_str(
                &[
                    templates.system_custom_header("document contextual summary"),
                    format!("source_document_title:{}", info.title),
                    format!("source_document_path:{}", info.path),
                    format!("content:\n{summary}\n"),
                ]
                .join(sep),
            );
            entries.push(DocumentationEntry {
                document_title: info.title,
                document_path: info.path,
                chunk_content: summary,
                chunk_size: 0,
                similarity: 0.0,
            });
        }
    }

    if full.is_empty() {
        return Documentation::default();
    }
    let instruction = format!(
        "Extract information from the current text chunk and previous text chunks to answer the query. \
         If there is no information about the query, just return an empty string.\n{query_header}{query}"
    );
    let text = match tasks.summarize(&full, &instruction).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Final documentation summary failed, using per-document summaries");
            full
        }
    };
    Documentation { text, entries }
}
