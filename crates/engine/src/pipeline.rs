//! The per-request context pipeline.
//!
//! Stages run sequentially: conditioning, internet search, document
//! retrieval, discussion-attached retrieval, skills recall, budgeting and
//! history packing. Every stage except budgeting degrades to an empty block
//! on failure; an exhausted budget aborts the request.

use std::sync::Arc;

use chrono::Local;
use contextweave_config::AppConfig;
use contextweave_core::error::{ContextError, Error, Result};
use contextweave_core::knowledge::{InternetSearch, SkillsStore, VectorStore};
use contextweave_core::message::{ConversationStore, Message, SenderType};
use contextweave_core::personality::{replace_keys, Personality};
use contextweave_core::progress::{NoopProgress, ProgressReporter, StepPhase};
use contextweave_core::provider::LanguageModel;
use contextweave_core::tokenizer::Tokenizer;
use contextweave_core::LanguagePackStore;
use tracing::{debug, info, warn};

use crate::assembler::{ContextAssembler, ContextDetails, ContextParts, GenerationType};
use crate::blocks::{self, SourceBlockBuilder};
use crate::budget::{BudgetAllocator, BudgetRequest};
use crate::history::HistoryWindowPacker;
use crate::internet::InternetQueryPlanner;
use crate::language::LanguagePackCache;
use crate::mounts::StoreMounts;
use crate::retrieval::{
    contextual_summaries, documentation_header, full_documents, render_documentation, Documentation,
    MergeOptions, RetrievalMerger,
};
use crate::skills::SkillsRecall;
use crate::tasks::ModelTasks;

const RETRIEVAL_STEP: &str = "Searching documentation";
const QUERY_STEP: &str = "Building vector store query";

/// One context-preparation request.
#[derive(Clone)]
pub struct QueryRequest {
    pub client_id: String,
    /// The active message; the last message when `None`
    pub message_id: Option<String>,
    pub is_continue: bool,
    /// Tokens already spent by the caller
    pub n_tokens_consumed: usize,
    /// Generation reservation; `max_n_predict` when `None`
    pub reserved_for_generation: Option<usize>,
    pub generation_type: GenerationType,
    pub force_using_internet: bool,
    /// Overrides the session language for this request
    pub language: Option<String>,
    /// Store built from files attached to the discussion
    pub discussion_store: Option<Arc<dyn VectorStore>>,
    pub progress: Arc<dyn ProgressReporter>,
}

impl QueryRequest {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            message_id: None,
            is_continue: false,
            n_tokens_consumed: 0,
            reserved_for_generation: None,
            generation_type: GenerationType::Full,
            force_using_internet: false,
            language: None,
            discussion_store: None,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_message(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn continuation(mut self) -> Self {
        self.is_continue = true;
        self
    }

    pub fn with_generation_type(mut self, generation_type: GenerationType) -> Self {
        self.generation_type = generation_type;
        self
    }

    pub fn force_internet(mut self) -> Self {
        self.force_using_internet = true;
        self
    }

    pub fn with_reserved(mut self, tokens: usize) -> Self {
        self.reserved_for_generation = Some(tokens);
        self
    }

    pub fn with_consumed(mut self, tokens: usize) -> Self {
        self.n_tokens_consumed = tokens;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_discussion_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.discussion_store = Some(store);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }
}

/// Session-level context engine. Cheap to share behind an `Arc`; requests
/// never share mutable state besides the language cache and store mounts.
pub struct ContextPipeline {
    config: AppConfig,
    personality: Personality,
    model: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn Tokenizer>,
    conversations: Arc<dyn ConversationStore>,
    languages: LanguagePackCache,
    mounts: StoreMounts,
    personality_store: Option<Arc<dyn VectorStore>>,
    internet: Option<Arc<dyn InternetSearch>>,
    skills: Option<Arc<dyn SkillsStore>>,
}

impl ContextPipeline {
    pub fn new(
        config: AppConfig,
        personality: Personality,
        model: Arc<dyn LanguageModel>,
        tokenizer: Arc<dyn Tokenizer>,
        conversations: Arc<dyn ConversationStore>,
        language_store: Arc<dyn LanguagePackStore>,
    ) -> Self {
        let languages = LanguagePackCache::new(language_store).with_language(config.current_language.as_deref());
        Self {
            config,
            personality,
            model,
            tokenizer,
            conversations,
            languages,
            mounts: StoreMounts::new(),
            personality_store: None,
            internet: None,
            skills: None,
        }
    }

    pub fn with_mounts(mut self, mounts: StoreMounts) -> Self {
        self.mounts = mounts;
        self
    }

    /// The personality's own data, searched ahead of mounted databases.
    pub fn with_personality_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.personality_store = Some(store);
        self
    }

    pub fn with_internet(mut self, search: Arc<dyn InternetSearch>) -> Self {
        self.internet = Some(search);
        self
    }

    pub fn with_skills(mut self, store: Arc<dyn SkillsStore>) -> Self {
        self.skills = Some(store);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    pub fn languages(&self) -> &LanguagePackCache {
        &self.languages
    }

    pub fn mounts(&self) -> &StoreMounts {
        &self.mounts
    }

    pub fn tasks(&self) -> ModelTasks {
        ModelTasks::new(
            Arc::clone(&self.model),
            Arc::clone(&self.tokenizer),
            self.config.templates.clone(),
        )
        .with_window_chars(self.config.discussion_window_chars)
        .with_summary_chunk_tokens(self.config.ctx_size / 2)
    }

    /// Build the full context for the active message of a discussion.
    pub async fn prepare_query(&self, request: QueryRequest) -> Result<ContextDetails> {
        let cfg = &self.config;
        let progress = request.progress.as_ref();
        let messages = self.conversations.get_messages(&request.client_id).await?;
        if messages.is_empty() {
            return Err(ContextError::EmptyDiscussion(request.client_id.clone()).into());
        }
        let index = match &request.message_id {
            Some(id) => messages
                .iter()
                .position(|m| &m.id == id)
                .ok_or_else(|| ContextError::MessageNotFound(id.clone()))?,
            None => messages.len() - 1,
        };
        let prompt = latest_user_content(&messages[..=index]);
        info!(
            client = %request.client_id,
            index,
            generation_type = ?request.generation_type,
            "Preparing context"
        );

        let tasks = self.tasks();
        let builder = SourceBlockBuilder::new(&cfg.templates, self.tokenizer.as_ref());

        // ── Conditioning ──
        let resolved = self
            .languages
            .resolve(&self.personality, request.language.as_deref(), &tasks, progress)
            .await;
        let conditioning = replace_keys(&resolved.conditioning, &self.personality.conditioning_commands, Local::now());
        let mut parts = ContextParts {
            client_id: request.client_id.clone(),
            generation_type: request.generation_type,
            current_language: resolved.language,
            is_continue: request.is_continue,
            prompt: prompt.clone(),
            ..ContextParts::default()
        };
        let mut source_blocks = vec![builder.conditioning(&conditioning)];

        // ── Retrieval stages ──
        if request.generation_type != GenerationType::SimpleQuestion {
            let discussion = tasks.recover_discussion(&messages, index);

            let wants_internet = cfg.activate_internet_search
                || request.force_using_internet
                || request.generation_type == GenerationType::FullWithInternet;
            if wants_internet {
                match &self.internet {
                    Some(search) => {
                        let results = InternetQueryPlanner::new(&tasks, Arc::clone(search), &cfg.user_name)
                            .with_decision(cfg.internet_activate_search_decision)
                            .with_modes(cfg.internet_quick_search, cfg.activate_internet_pages_judgement)
                            .plan(&discussion, progress)
                            .await;
                        if let Some(results) = results {
                            source_blocks.push(builder.text(blocks::INTERNET_SEARCH_RESULTS, results.text));
                            parts.internet_search_infos = results.infos;
                        }
                    }
                    None => warn!("Internet search requested but no search backend is configured"),
                }
            }

            let documentation = self
                .documentation(&tasks, &discussion, &prompt, request.discussion_store.as_ref(), progress)
                .await;
            if !documentation.is_empty() {
                source_blocks.push(builder.text(blocks::DOCUMENTATION, documentation.text));
                parts.documentation_entries = documentation.entries;
            }

            if cfg.activate_skills_lib {
                match &self.skills {
                    Some(store) => {
                        let recalled = SkillsRecall::new(&tasks, Arc::clone(store), &cfg.user_name)
                            .with_limits(cfg.skills_top_k, cfg.rag_min_correspondance)
                            .recall(&discussion, progress)
                            .await;
                        if let Some(knowledge) = recalled {
                            source_blocks.push(builder.text(blocks::KNOWLEDGE, knowledge.text));
                            parts.skills = knowledge.skills;
                        }
                    }
                    None => warn!("Skills library enabled but no skills store is configured"),
                }
            }
        }

        // ── Fixed blocks ──
        if cfg.use_user_informations_in_discussion {
            source_blocks.push(builder.user_description(&cfg.user_description));
        }
        source_blocks.push(builder.positive_boost(&cfg.positive_boost));
        source_blocks.push(builder.negative_boost(&cfg.negative_boost));
        source_blocks.push(builder.fun_mode(cfg.fun_mode));
        source_blocks.retain(|b| !b.is_empty());

        // ── Budget ──
        let allocator = BudgetAllocator::new(cfg.ctx_size);
        parts.warnings = allocator.enforce_block_limits(&mut source_blocks, self.tokenizer.as_ref());
        let report = allocator.allocate(
            &source_blocks,
            &BudgetRequest {
                reserved_for_generation: request.reserved_for_generation.unwrap_or(cfg.max_n_predict),
                n_tokens_already_consumed: request.n_tokens_consumed,
            },
        )?;

        // ── History ──
        let ai_prefix = self.ai_prefix();
        let packer = HistoryWindowPacker::new(self.tokenizer.as_ref(), &cfg.templates)
            .with_model_names(cfg.use_model_name_in_discussions)
            .with_ai_prefix(ai_prefix.clone());
        parts.history = if request.generation_type == GenerationType::SimpleQuestion {
            let asked = &messages[simple_question_index(&messages, index)];
            packer.pack_single(asked, report.available_space, request.is_continue)
        } else {
            packer.pack(&messages, index, report.available_space, request.is_continue)
        };
        debug!(history_tokens = parts.history.tokens, available = report.available_space, "History ready");

        parts.ai_prefix = ai_prefix;
        parts.blocks = source_blocks;
        parts.budget = Some(report);
        Ok(ContextAssembler::assemble(parts))
    }

    /// Summarise a stored discussion into the skills library.
    pub async fn learn_from_discussion(&self, client_id: &str) -> Result<String> {
        let store = self
            .skills
            .as_ref()
            .ok_or_else(|| Error::Internal("no skills library configured".into()))?;
        let messages = self.conversations.get_messages(client_id).await?;
        let tasks = self.tasks();
        SkillsRecall::new(&tasks, Arc::clone(store), &self.config.user_name)
            .learn_from_discussion(&messages)
            .await
    }

    fn ai_prefix(&self) -> String {
        let name = self.personality.ai_message_prefix.trim();
        if name.is_empty() {
            return String::new();
        }
        let t = &self.config.templates;
        format!("{}{}", t.separator_template, t.ai_full_header(name))
    }

    /// Document retrieval over the personality store, the mounted databases
    /// and the discussion's own store.
    async fn documentation(
        &self,
        tasks: &ModelTasks,
        discussion: &str,
        prompt: &str,
        discussion_store: Option<&Arc<dyn VectorStore>>,
        progress: &dyn ProgressReporter,
    ) -> Documentation {
        let cfg = &self.config;
        // Held until retrieval is done so mounts can't change underneath it.
        let active = self.mounts.read().await;
        let mut stores: Vec<Arc<dyn VectorStore>> = self.personality_store.iter().cloned().collect();
        stores.extend(active.stores());
        let discussion_store = discussion_store
            .filter(|_| !self.personality.ignore_discussion_documents_rag)
            .cloned();
        if stores.is_empty() && discussion_store.is_none() {
            return Documentation::default();
        }

        let mut documentation = Documentation::default();
        if cfg.rag_deactivate {
            stores.extend(discussion_store);
            documentation.append(full_documents(&stores).await);
            return documentation;
        }

        let query = if cfg.rag_build_keys_words {
            progress.report_step(QUERY_STEP, StepPhase::Start);
            let query = tasks.reformulate_query(discussion).await;
            progress.report_step(QUERY_STEP, StepPhase::End { success: query.is_some() });
            query.unwrap_or_else(|| prompt.to_string())
        } else {
            prompt.to_string()
        };
        progress.report_step(QUERY_STEP, StepPhase::Info { detail: format!("Query: {query}") });

        progress.report_step(RETRIEVAL_STEP, StepPhase::Start);
        let found = if cfg.contextual_summary {
            stores.extend(discussion_store);
            contextual_summaries(tasks, &stores, &query, progress).await
        } else {
            let merger = if cfg.rag_activate_multi_hops {
                RetrievalMerger::with_filter(tasks)
            } else {
                RetrievalMerger::new()
            };
            let with_infos = cfg.rag_put_chunk_informations_into_context;
            let mut found = Documentation::default();
            if !stores.is_empty() {
                let options = MergeOptions {
                    target_count: cfg.rag_n_chunks,
                    max_hops: cfg.rag_max_n_hops,
                    n_neighbors: cfg.n_neighbors(),
                };
                let outcome = merger.merge(&stores, &query, options).await;
                found.append(render_documentation(&cfg.templates, &outcome.chunks, with_infos));
            }
            if let Some(store) = discussion_store {
                let options = MergeOptions {
                    target_count: cfg.rag_n_chunks,
                    max_hops: 1,
                    n_neighbors: cfg.rag_n_chunks,
                };
                let outcome = RetrievalMerger::new().merge(&[store], &query, options).await;
                found.append(render_documentation(&cfg.templates, &outcome.chunks, with_infos));
            }
            found
        };
        progress.report_step(RETRIEVAL_STEP, StepPhase::End { success: true });
        drop(active);

        if found.is_empty() {
            return documentation;
        }
        documentation.text = documentation_header(&cfg.templates);
        documentation.append(found);
        documentation
    }
}

/// The message a simple question packs: the active one when it has content,
/// otherwise the latest user message before it.
fn simple_question_index(messages: &[Message], index: usize) -> usize {
    let usable = |m: &Message| !m.is_empty() && m.is_visible_to_ai();
    if usable(&messages[index]) {
        return index;
    }
    messages[..index]
        .iter()
        .rposition(|m| m.sender_type == SenderType::User && usable(m))
        .unwrap_or(index)
}

/// Content of the most recent user message, or of the last message when no
/// user message exists.
fn latest_user_content(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.sender_type == SenderType::User)
        .or_else(|| messages.last())
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{chunk, MockInternetSearch, MockSkills, RecordingProgress, ScriptedStore, SequentialMockModel};
    use contextweave_core::knowledge::SkillMatch;
    use contextweave_core::CharTokenizer;
    use contextweave_memory::{InMemoryConversationStore, InMemoryLanguagePackStore};

    async fn discussion(messages: Vec<Message>) -> Arc<InMemoryConversationStore> {
        let store = Arc::new(InMemoryConversationStore::new());
        store.set_discussion("c1", messages).await;
        store
    }

    fn base_messages() -> Vec<Message> {
        vec![
            Message::user("alice", "What is ownership?"),
            Message::ai("assistant", "A set of rules."),
            Message::user("alice", "And borrowing?"),
            Message::ai("assistant", ""),
        ]
    }

    fn pipeline(config: AppConfig, model: Arc<SequentialMockModel>, conversations: Arc<InMemoryConversationStore>) -> ContextPipeline {
        ContextPipeline::new(
            config,
            Personality::default_personality(),
            model,
            Arc::new(CharTokenizer),
            conversations,
            Arc::new(InMemoryLanguagePackStore::new()),
        )
    }

    #[tokio::test]
    async fn plain_request_packs_history() {
        let model = Arc::new(SequentialMockModel::new(vec![]));
        let p = pipeline(AppConfig::default(), model.clone(), discussion(base_messages()).await);
        let details = p.prepare_query(QueryRequest::new("c1")).await.unwrap();

        assert_eq!(details.prompt, "And borrowing?");
        assert!(details.conditioning.starts_with("!@>system: Act as"));
        assert!(details.discussion_messages.contains("!@>alice: What is ownership?"));
        assert!(details.discussion_messages.ends_with("!@>alice: And borrowing?"));
        assert_eq!(details.ai_prefix, "\n!@>assistant: ");
        assert!(details.render_prompt().ends_with("And borrowing?\n!@>assistant: "));
        assert_eq!(details.available_space, 4096 - 512 - details.token_breakdown[0].1);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn lone_user_message_is_packed() {
        let p = pipeline(
            AppConfig::default(),
            Arc::new(SequentialMockModel::new(vec![])),
            discussion(vec![Message::user("alice", "What is Rust?")]).await,
        );
        let details = p.prepare_query(QueryRequest::new("c1")).await.unwrap();
        assert_eq!(details.discussion_messages, "\n!@>alice: What is Rust?");
        assert_eq!(details.ai_prefix, "\n!@>assistant: ");
        assert!(details.render_prompt().ends_with("What is Rust?\n!@>assistant: "));
    }

    #[tokio::test]
    async fn simple_question_behind_placeholder_packs_user_turn() {
        let p = pipeline(
            AppConfig::default(),
            Arc::new(SequentialMockModel::new(vec![])),
            discussion(base_messages()).await,
        );
        let details = p
            .prepare_query(QueryRequest::new("c1").with_generation_type(GenerationType::SimpleQuestion))
            .await
            .unwrap();
        assert_eq!(details.discussion_messages, "\n!@>alice: And borrowing?");
        assert!(details.render_prompt().ends_with("And borrowing?\n!@>assistant: "));
    }

    #[tokio::test]
    async fn unknown_message_is_an_error() {
        let p = pipeline(
            AppConfig::default(),
            Arc::new(SequentialMockModel::new(vec![])),
            discussion(base_messages()).await,
        );
        let err = p.prepare_query(QueryRequest::new("c1").with_message("nope")).await.unwrap_err();
        assert!(matches!(err, Error::Context(ContextError::MessageNotFound(_))));
        let err = p.prepare_query(QueryRequest::new("other")).await.unwrap_err();
        assert!(matches!(err, Error::Context(ContextError::EmptyDiscussion(_))));
    }

    #[tokio::test]
    async fn active_message_selects_window() {
        let messages = base_messages();
        let first_ai = messages[1].id.clone();
        let p = pipeline(
            AppConfig::default(),
            Arc::new(SequentialMockModel::new(vec![])),
            discussion(messages).await,
        );
        let details = p.prepare_query(QueryRequest::new("c1").with_message(first_ai)).await.unwrap();
        assert_eq!(details.prompt, "What is ownership?");
        assert!(!details.discussion_messages.contains("borrowing"));
    }

    #[tokio::test]
    async fn simple_question_skips_retrieval() {
        let config = AppConfig {
            activate_internet_search: true,
            ..AppConfig::default()
        };
        let search = Arc::new(MockInternetSearch::new(vec![chunk("w", 0.1)]));
        let messages = vec![Message::user("alice", "hello"), Message::user("alice", "quick one")];
        let p = pipeline(config, Arc::new(SequentialMockModel::new(vec![])), discussion(messages).await)
            .with_internet(search.clone());
        let details = p
            .prepare_query(QueryRequest::new("c1").with_generation_type(GenerationType::SimpleQuestion))
            .await
            .unwrap();
        assert_eq!(details.discussion_messages, "\n!@>alice: quick one");
        assert!(details.internet_search_results.is_empty());
        assert!(search.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn forced_internet_fills_results_block() {
        let model = Arc::new(SequentialMockModel::new(vec!["borrowing rust"]));
        let search = Arc::new(MockInternetSearch::new(vec![chunk("w1", 0.1)]));
        let p = pipeline(AppConfig::default(), model, discussion(base_messages()).await).with_internet(search);
        let details = p.prepare_query(QueryRequest::new("c1").force_internet()).await.unwrap();
        assert!(details.internet_search_results.contains("chunk_title:title of w1"));
        assert_eq!(details.internet_search_infos.len(), 1);
        assert!(details.token_breakdown.iter().any(|(n, t)| n == "internet_search_results" && *t > 0));
    }

    #[tokio::test]
    async fn mounted_and_discussion_stores_feed_documentation() {
        let model = Arc::new(SequentialMockModel::new(vec![]));
        let p = pipeline(AppConfig::default(), model, discussion(base_messages()).await);
        p.mounts()
            .mount("db", Arc::new(ScriptedStore::new("db", vec![chunk("d1", 0.2), chunk("d2", 0.1)])))
            .await;
        let attached: Arc<dyn VectorStore> = Arc::new(ScriptedStore::new("files", vec![chunk("f1", 0.5)]));
        let progress = Arc::new(RecordingProgress::default());
        let details = p
            .prepare_query(
                QueryRequest::new("c1")
                    .with_discussion_store(attached)
                    .with_progress(progress.clone()),
            )
            .await
            .unwrap();

        assert!(details.documentation.starts_with("!@>important information: "));
        let paths: Vec<_> = details.documentation_entries.iter().map(|e| e.document_path.as_str()).collect();
        assert_eq!(paths, vec!["/docs/d2.md", "/docs/d1.md", "/docs/f1.md"]);
        assert!(progress.started("Searching documentation"));
    }

    #[tokio::test]
    async fn unmounted_store_is_not_searched() {
        let p = pipeline(
            AppConfig::default(),
            Arc::new(SequentialMockModel::new(vec![])),
            discussion(base_messages()).await,
        );
        let store = Arc::new(ScriptedStore::new("db", vec![chunk("d1", 0.2)]));
        p.mounts().mount("db", store.clone()).await;
        p.mounts().unmount("db").await;
        let details = p.prepare_query(QueryRequest::new("c1")).await.unwrap();
        assert!(details.documentation.is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn deactivated_rag_injects_full_documents() {
        let config = AppConfig {
            rag_deactivate: true,
            ..AppConfig::default()
        };
        let p = pipeline(config, Arc::new(SequentialMockModel::new(vec![])), discussion(base_messages()).await)
            .with_personality_store(Arc::new(ScriptedStore::new("persona", vec![]).with_document("Guide", "/g.md", "all of it")));
        let details = p.prepare_query(QueryRequest::new("c1")).await.unwrap();
        assert_eq!(details.documentation, "all of it\n");
    }

    #[tokio::test]
    async fn reformulation_failure_falls_back_to_prompt() {
        let config = AppConfig {
            rag_build_keys_words: true,
            ..AppConfig::default()
        };
        let model = Arc::new(SequentialMockModel::new(vec!["not json"]));
        let p = pipeline(config, model, discussion(base_messages()).await)
            .with_personality_store(Arc::new(ScriptedStore::new("persona", vec![chunk("p1", 0.3)])));
        let progress = Arc::new(RecordingProgress::default());
        let details = p
            .prepare_query(QueryRequest::new("c1").with_progress(progress.clone()))
            .await
            .unwrap();
        assert_eq!(details.documentation_entries.len(), 1);
        assert!(progress
            .steps()
            .iter()
            .any(|(s, phase)| s == QUERY_STEP
                && *phase == StepPhase::Info { detail: "Query: And borrowing?".into() }));
    }

    #[tokio::test]
    async fn skills_become_knowledge() {
        let config = AppConfig {
            activate_skills_lib: true,
            ..AppConfig::default()
        };
        let model = Arc::new(SequentialMockModel::new(vec![r#"{"request": "explain borrowing"}"#]));
        let skills = Arc::new(MockSkills {
            matches: vec![SkillMatch {
                title: "Borrowing".into(),
                content: "References without ownership".into(),
                similarity: 0.8,
            }],
            ..Default::default()
        });
        let p = pipeline(config, model, discussion(base_messages()).await).with_skills(skills);
        let details = p.prepare_query(QueryRequest::new("c1")).await.unwrap();
        assert!(details.knowledge.contains("title:\nBorrowing"));
        assert_eq!(details.skills.len(), 1);
    }

    #[tokio::test]
    async fn boosts_and_user_description_are_blocks() {
        let config = AppConfig {
            positive_boost: "Be precise.".into(),
            negative_boost: "Never invent APIs.".into(),
            fun_mode: true,
            use_user_informations_in_discussion: true,
            user_description: "Senior Rust developer".into(),
            ..AppConfig::default()
        };
        let p = pipeline(config, Arc::new(SequentialMockModel::new(vec![])), discussion(base_messages()).await);
        let details = p.prepare_query(QueryRequest::new("c1")).await.unwrap();
        assert!(details.positive_boost.contains("Be precise."));
        assert!(details.negative_boost.contains("Never invent APIs."));
        assert!(details.fun_mode.contains("Fun mode activated"));
        assert!(details.user_description.contains("Senior Rust developer"));
        let prompt = details.render_prompt();
        let user_at = prompt.find("Senior Rust developer").unwrap();
        let history_at = prompt.find("What is ownership?").unwrap();
        assert!(user_at < history_at);
    }

    #[tokio::test]
    async fn exhausted_budget_aborts() {
        let config = AppConfig {
            ctx_size: 1024,
            max_n_predict: 512,
            positive_boost: "x".repeat(600),
            ..AppConfig::default()
        };
        let p = pipeline(config, Arc::new(SequentialMockModel::new(vec![])), discussion(base_messages()).await);
        let err = p.prepare_query(QueryRequest::new("c1")).await.unwrap_err();
        match err {
            Error::Context(ref e @ ContextError::InsufficientContextBudget { .. }) => {
                assert_eq!(e.dominant_consumer().map(|(n, _)| n), Some("positive_boost"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_default_language_translates_conditioning() {
        let config = AppConfig {
            current_language: Some("French".into()),
            ..AppConfig::default()
        };
        let model = Arc::new(SequentialMockModel::new(vec!["Sois utile.", "Bienvenue"]));
        let p = pipeline(config, model.clone(), discussion(base_messages()).await);
        let first = p.prepare_query(QueryRequest::new("c1")).await.unwrap();
        assert_eq!(first.conditioning, "!@>system: Sois utile.\n");
        assert_eq!(first.current_language, "french");
        p.prepare_query(QueryRequest::new("c1")).await.unwrap();
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn learn_requires_skills_store() {
        let p = pipeline(
            AppConfig::default(),
            Arc::new(SequentialMockModel::new(vec![])),
            discussion(base_messages()).await,
        );
        assert!(p.learn_from_discussion("c1").await.is_err());
    }
}
