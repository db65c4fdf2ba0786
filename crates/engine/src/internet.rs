//! Internet search stage.
//!
//! Optionally asks the model whether the last request needs a web search,
//! crafts a search query from the recent discussion, and renders the ranked
//! search chunks into the web-results block.

use std::sync::Arc;

use chrono::Local;
use contextweave_core::knowledge::{InternetSearch, KnowledgeChunk};
use contextweave_core::progress::{ProgressReporter, StepPhase};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tasks::ModelTasks;

const EMPTY_RESULTS: &str =
    "The search response was empty!\nFailed to recover useful information from the search engine.\n";

const DECISION_STEP: &str = "Deciding whether an internet search is needed";
const QUERY_STEP: &str = "Crafting internet search query";

/// One search chunk as shown to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternetSearchInfo {
    pub title: String,
    pub url: String,
    pub brief: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternetResults {
    pub query: String,
    /// The rendered web-results block
    pub text: String,
    pub infos: Vec<InternetSearchInfo>,
}

pub struct InternetQueryPlanner<'a> {
    tasks: &'a ModelTasks,
    search: Arc<dyn InternetSearch>,
    user_name: String,
    decide_first: bool,
    quick_mode: bool,
    judge_pages: bool,
}

impl<'a> InternetQueryPlanner<'a> {
    pub fn new(tasks: &'a ModelTasks, search: Arc<dyn InternetSearch>, user_name: impl Into<String>) -> Self {
        Self {
            tasks,
            search,
            user_name: user_name.into(),
            decide_first: false,
            quick_mode: true,
            judge_pages: false,
        }
    }

    /// Ask the model before searching.
    pub fn with_decision(mut self, enabled: bool) -> Self {
        self.decide_first = enabled;
        self
    }

    pub fn with_modes(mut self, quick_mode: bool, judge_pages: bool) -> Self {
        self.quick_mode = quick_mode;
        self.judge_pages = judge_pages;
        self
    }

    /// Run the stage. `None` means no web-results block: the model said no
    /// search was needed, or a step failed.
    pub async fn plan(&self, discussion: &str, progress: &dyn ProgressReporter) -> Option<InternetResults> {
        let recent = self.tasks.window(discussion);
        let templates = self.tasks.templates();

        if self.decide_first {
            progress.report_step(DECISION_STEP, StepPhase::Start);
            let question = format!(
                "Does answering the last message from {} require searching the internet for information \
                 that is not already in the discussion?",
                self.user_name
            );
            match self.tasks.yes_no(&question, recent).await {
                Ok(needed) => {
                    progress.report_step(DECISION_STEP, StepPhase::End { success: true });
                    progress.report_step(
                        DECISION_STEP,
                        StepPhase::Info { detail: if needed { "Yes" } else { "No" }.into() },
                    );
                    if !needed {
                        info!("Internet search judged unnecessary");
                        return None;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Search decision failed, skipping internet search");
                    progress.report_step(DECISION_STEP, StepPhase::End { success: false });
                    return None;
                }
            }
        }

        progress.report_step(QUERY_STEP, StepPhase::Start);
        let prompt = [
            format!("{}{recent}", templates.system_custom_header("discussion")),
            templates.system_full_header(),
            "You are a sophisticated web search query builder. Your task is to help the user by crafting \
             a precise and concise web search query based on their request."
                .to_string(),
            format!(
                "Carefully read the discussion and generate a web search query that will retrieve the most \
                 relevant information to answer the last message from {}.",
                self.user_name
            ),
            "Do not answer the prompt directly. Do not provide explanations or additional information.".to_string(),
            format!("{}{}", templates.system_custom_header("current date"), Local::now().format("%Y-%m-%d %H:%M")),
            templates.ai_full_header("websearch query"),
        ]
        .join(templates.separator_template.as_str());

        let query = match self.tasks.fast_gen(&prompt, 256).await {
            Ok(raw) => raw.replace('"', "").trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Search query crafting failed");
                progress.report_step(QUERY_STEP, StepPhase::End { success: false });
                return None;
            }
        };
        progress.report_step(QUERY_STEP, StepPhase::End { success: true });
        progress.report_step(QUERY_STEP, StepPhase::Info { detail: format!("web search query: {query}") });
        if query.is_empty() {
            warn!("Model produced an empty search query");
            return None;
        }

        let search_step = if self.quick_mode {
            "Performing Internet search (quick mode)"
        } else {
            "Performing Internet search (advanced mode: slower but more accurate)"
        };
        progress.report_step(search_step, StepPhase::Start);
        let chunks = match self
            .search
            .search_with_vectorization(&query, self.quick_mode, self.judge_pages)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(search = %self.search.name(), error = %e, "Internet search failed");
                progress.report_step(search_step, StepPhase::End { success: false });
                return None;
            }
        };
        progress.report_step(search_step, StepPhase::End { success: true });
        info!(query = %query, chunks = chunks.len(), "Internet search complete");

        Some(self.render(query, &chunks))
    }

    fn render(&self, query: String, chunks: &[KnowledgeChunk]) -> InternetResults {
        let t = self.tasks.templates();
        let mut text = format!(
            "{}Use the web search results data to answer {user}. Try to extract information from the web \
             search and use it to perform the requested task or answer the question. Do not come up with \
             information that is not in the websearch results. If you rely on your own general knowledge \
             instead of the search results, say so. If you don't know how to perform the task, tell the \
             user politely that you need more data inputs.{}{}Web search results{}\n",
            t.system_full_header(),
            t.separator_template,
            t.start_header_id_template,
            t.end_header_id_template,
            user = self.user_name,
        );
        let mut infos = Vec::with_capacity(chunks.len());

        if chunks.is_empty() {
            text.push_str(EMPTY_RESULTS);
        }
        for chunk in chunks {
            text.push_str(&format!(
                "{}\nchunk_infos:{}\nchunk_title:{}\ncontent:{}\n",
                t.system_custom_header("search result chunk"),
                chunk.source_document_path,
                chunk.source_document_title,
                chunk.text
            ));
            infos.push(InternetSearchInfo {
                title: chunk.source_document_title.clone(),
                url: chunk.source_document_path.clone(),
                brief: chunk.text.clone(),
            });
        }
        text.push_str(&t.system_custom_header("information"));
        text.push_str("Use the search results to answer the user question.");

        InternetResults { query, text, infos }
    }
}
