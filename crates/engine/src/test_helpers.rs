//! Scripted collaborators for engine tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use contextweave_core::error::{ProviderError, StoreError};
use contextweave_core::knowledge::{
    DocumentInfo, InternetSearch, KnowledgeChunk, SkillEntry, SkillMatch, SkillsStore, VectorStore,
};
use contextweave_core::progress::{ProgressReporter, StepPhase};
use contextweave_core::provider::{GenerationRequest, GenerationResponse, LanguageModel};

/// A model that answers with scripted texts in order.
///
/// Once the script is exhausted it keeps repeating the last answer, or
/// fails when the script was empty.
pub struct SequentialMockModel {
    responses: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl SequentialMockModel {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: responses.into_iter().map(String::from).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for SequentialMockModel {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let mut prompts = self.prompts.lock().unwrap();
        let index = prompts.len();
        prompts.push(request.prompt);
        let text = self
            .responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or_else(|| ProviderError::Network("no scripted response".into()))?;
        Ok(GenerationResponse {
            text,
            model: "mock-model".into(),
            usage: None,
        })
    }
}

pub fn chunk(id: &str, distance: f32) -> KnowledgeChunk {
    KnowledgeChunk {
        chunk_id: id.into(),
        source_document_title: format!("title of {id}"),
        source_document_path: format!("/docs/{id}.md"),
        text: format!("text of {id}"),
        token_count: 3,
        distance,
    }
}

/// A vector store serving a fixed pool of chunks in pool order.
///
/// Records the exclusion set of every search call.
pub struct ScriptedStore {
    name: String,
    pool: Vec<KnowledgeChunk>,
    per_call: Option<usize>,
    fail_from_call: Option<usize>,
    documents: Vec<(DocumentInfo, String)>,
    calls: Mutex<Vec<HashSet<String>>>,
}

impl ScriptedStore {
    pub fn new(name: &str, pool: Vec<KnowledgeChunk>) -> Self {
        Self {
            name: name.into(),
            pool,
            per_call: None,
            fail_from_call: None,
            documents: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Never return more than `n` chunks per search.
    pub fn per_call(mut self, n: usize) -> Self {
        self.per_call = Some(n);
        self
    }

    /// Fail every search starting with call number `n` (0-based).
    pub fn failing_from(mut self, n: usize) -> Self {
        self.fail_from_call = Some(n);
        self
    }

    pub fn with_document(mut self, title: &str, path: &str, text: &str) -> Self {
        self.documents.push((
            DocumentInfo {
                title: title.into(),
                path: path.into(),
            },
            text.into(),
        ));
        self
    }

    pub fn calls(&self) -> Vec<HashSet<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        _query: &str,
        k: usize,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        let mut calls = self.calls.lock().unwrap();
        let call = calls.len();
        calls.push(exclude_ids.clone());
        if self.fail_from_call.is_some_and(|n| call >= n) {
            return Err(StoreError::Unavailable {
                store: self.name.clone(),
                reason: "scripted failure".into(),
            });
        }
        let limit = self.per_call.map_or(k, |n| n.min(k));
        Ok(self
            .pool
            .iter()
            .filter(|c| !exclude_ids.contains(&c.chunk_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError> {
        Ok(self.documents.iter().map(|(info, _)| info.clone()).collect())
    }

    async fn get_document(&self, path: &str) -> Result<String, StoreError> {
        self.documents
            .iter()
            .find(|(info, _)| info.path == path)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| StoreError::DocumentNotFound(path.into()))
    }
}

/// A web search returning fixed chunks, or failing.
pub struct MockInternetSearch {
    pub chunks: Vec<KnowledgeChunk>,
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

impl MockInternetSearch {
    pub fn new(chunks: Vec<KnowledgeChunk>) -> Self {
        Self {
            chunks,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl InternetSearch for MockInternetSearch {
    fn name(&self) -> &str {
        "mock_search"
    }

    async fn search_with_vectorization(
        &self,
        query: &str,
        _quick_mode: bool,
        _assess_with_model: bool,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(StoreError::QueryFailed("offline".into()));
        }
        Ok(self.chunks.clone())
    }
}

/// A skills store with canned matches that records added entries.
#[derive(Default)]
pub struct MockSkills {
    pub matches: Vec<SkillMatch>,
    pub fail: bool,
    pub added: Mutex<Vec<SkillEntry>>,
}

#[async_trait]
impl SkillsStore for MockSkills {
    fn name(&self) -> &str {
        "mock_skills"
    }

    async fn query_vector_db(
        &self,
        _query: &str,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SkillMatch>, StoreError> {
        if self.fail {
            return Err(StoreError::QueryFailed("skills offline".into()));
        }
        Ok(self
            .matches
            .iter()
            .filter(|m| m.similarity >= min_similarity)
            .take(top_k)
            .cloned()
            .collect())
    }

    async fn add_entry(&self, entry: SkillEntry) -> Result<String, StoreError> {
        let mut added = self.added.lock().unwrap();
        added.push(entry);
        Ok(format!("skill-{}", added.len()))
    }
}

/// Collects every reported step.
#[derive(Default)]
pub struct RecordingProgress {
    steps: Mutex<Vec<(String, StepPhase)>>,
}

impl RecordingProgress {
    pub fn steps(&self) -> Vec<(String, StepPhase)> {
        self.steps.lock().unwrap().clone()
    }

    pub fn started(&self, step: &str) -> bool {
        self.steps()
            .iter()
            .any(|(s, p)| s == step && *p == StepPhase::Start)
    }
}

impl ProgressReporter for RecordingProgress {
    fn report_step(&self, step: &str, phase: StepPhase) {
        self.steps.lock().unwrap().push((step.to_string(), phase));
    }
}
