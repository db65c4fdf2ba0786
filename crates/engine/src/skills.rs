//! Skills recall: prior learnings injected as a knowledge block, and
//! learning new skills from finished discussions.

use std::sync::Arc;

use chrono::Utc;
use contextweave_core::error::{Error, Result};
use contextweave_core::knowledge::{SkillEntry, SkillMatch, SkillsStore};
use contextweave_core::message::Message;
use contextweave_core::progress::{ProgressReporter, StepPhase};
use tracing::{info, warn};

use crate::tasks::{string_field, ModelTasks};

const RECALL_STEP: &str = "Querying skills library";

/// A rendered knowledge block and the skills behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBlock {
    pub query: String,
    pub text: String,
    pub skills: Vec<SkillMatch>,
}

pub struct SkillsRecall<'a> {
    tasks: &'a ModelTasks,
    store: Arc<dyn SkillsStore>,
    user_name: String,
    top_k: usize,
    min_similarity: f32,
}

impl<'a> SkillsRecall<'a> {
    pub fn new(tasks: &'a ModelTasks, store: Arc<dyn SkillsStore>, user_name: impl Into<String>) -> Self {
        Self {
            tasks,
            store,
            user_name: user_name.into(),
            top_k: 3,
            min_similarity: 0.0,
        }
    }

    pub fn with_limits(mut self, top_k: usize, min_similarity: f32) -> Self {
        self.top_k = top_k;
        self.min_similarity = min_similarity;
        self
    }

    /// Find skills matching the user's latest request.
    ///
    /// Every failure is logged and yields `None`; so does an empty match list.
    pub async fn recall(&self, discussion: &str, progress: &dyn ProgressReporter) -> Option<KnowledgeBlock> {
        progress.report_step(RECALL_STEP, StepPhase::Start);
        let outcome = self.try_recall(discussion).await;
        progress.report_step(RECALL_STEP, StepPhase::End { success: outcome.is_ok() });
        match outcome {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "Couldn't add skills to the context");
                None
            }
        }
    }

    async fn try_recall(&self, discussion: &str) -> Result<Option<KnowledgeBlock>> {
        let instruction = format!(
            "Your task is to carefully read the provided discussion and reformulate {}'s request concisely.\n{}\n{}\n",
            self.user_name,
            self.tasks.templates().system_custom_header("discussion"),
            self.tasks.window(discussion)
        );
        let value = self
            .tasks
            .generate_code(&instruction, r#"{"request": "the reformulated request"}"#)
            .await?;
        let query = string_field(&value, "request")
            .ok_or_else(|| Error::Internal("reformulated request missing".into()))?;

        let skills = self
            .store
            .query_vector_db(&query, self.top_k, self.min_similarity)
            .await?;
        info!(query = %query, found = skills.len(), "Skills recalled");
        if skills.is_empty() {
            return Ok(None);
        }

        let t = self.tasks.templates();
        let mut text = format!("{}\n", t.system_custom_header("knowledge"));
        for (i, skill) in skills.iter().enumerate() {
            text.push_str(&format!(
                "{}\ntitle:\n{}\ncontent:\n{}\n",
                t.system_custom_header(&format!("knowledge {i}")),
                skill.title,
                skill.content
            ));
        }
        Ok(Some(KnowledgeBlock { query, text, skills }))
    }

    /// Summarise a discussion into a new skill and store it. Returns the
    /// new entry's id.
    pub async fn learn_from_discussion(&self, messages: &[Message]) -> Result<String> {
        let discussion = self.tasks.recover_discussion(messages, messages.len());
        if discussion.trim().is_empty() {
            return Err(Error::Internal("nothing to learn from an empty discussion".into()));
        }

        let content = self
            .tasks
            .summarize(
                &discussion,
                "Extract the reusable knowledge of this discussion: facts learned, solutions found and \
                 mistakes to avoid. Write it as concise notes.",
            )
            .await?;

        let value = self
            .tasks
            .generate_code(
                &format!(
                    "Give a short title and a one-word category to these notes.\n{}{content}",
                    self.tasks.templates().system_custom_header("notes")
                ),
                r#"{"title": "the title", "category": "the category"}"#,
            )
            .await?;
        let title = string_field(&value, "title").unwrap_or_else(|| "untitled".into());
        let category = string_field(&value, "category").unwrap_or_else(|| "general".into());

        let id = self
            .store
            .add_entry(SkillEntry {
                title: title.clone(),
                category,
                content,
                created_at: Utc::now(),
            })
            .await?;
        info!(id = %id, title = %title, "Skill learned from discussion");
        Ok(id)
    }
}
