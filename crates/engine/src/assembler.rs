//! Final aggregation of every context source into [`ContextDetails`].
//!
//! The assembler is pure: it performs no model or store calls and only
//! arranges what the pipeline stages produced.

use contextweave_core::knowledge::SkillMatch;
use serde::{Deserialize, Serialize};

use crate::blocks::{self, ContextSourceBlock};
use crate::budget::{BudgetReport, BudgetWarning};
use crate::history::PackedHistory;
use crate::internet::InternetSearchInfo;
use crate::retrieval::DocumentationEntry;

/// How much of the pipeline a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    /// Every enabled stage, history included
    #[default]
    Full,
    /// Like `Full`, with the internet stage forced on
    FullWithInternet,
    /// No retrieval stage; only the active message is packed
    SimpleQuestion,
}

impl std::str::FromStr for GenerationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full" | "full_context" => Ok(Self::Full),
            "full_with_internet" | "full_context_with_internet" => Ok(Self::FullWithInternet),
            "simple_question" | "simple" => Ok(Self::SimpleQuestion),
            other => Err(format!("unknown generation type: {other}")),
        }
    }
}

/// Everything the generation caller needs, built once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDetails {
    pub client_id: String,
    pub generation_type: GenerationType,
    pub current_language: String,
    pub conditioning: String,
    pub internet_search_infos: Vec<InternetSearchInfo>,
    pub internet_search_results: String,
    pub documentation: String,
    pub documentation_entries: Vec<DocumentationEntry>,
    pub knowledge: String,
    pub skills: Vec<SkillMatch>,
    pub user_description: String,
    pub positive_boost: String,
    pub negative_boost: String,
    pub fun_mode: String,
    pub discussion_messages: String,
    pub ai_prefix: String,
    /// Room that was left for the history after the source blocks
    pub available_space: usize,
    pub history_tokens: usize,
    /// Tokens per source block, in canonical order
    pub token_breakdown: Vec<(String, usize)>,
    pub warnings: Vec<BudgetWarning>,
    pub is_continue: bool,
    /// Content of the latest user message
    pub prompt: String,
}

impl ContextDetails {
    /// The final prompt text.
    pub fn render_prompt(&self) -> String {
        [
            self.conditioning.as_str(),
            &self.internet_search_results,
            &self.documentation,
            &self.knowledge,
            &self.user_description,
            &self.positive_boost,
            &self.negative_boost,
            &self.fun_mode,
            &self.discussion_messages,
            &self.ai_prefix,
        ]
        .concat()
    }

    /// Total tokens of the source blocks and the packed history.
    pub fn total_tokens(&self) -> usize {
        self.token_breakdown.iter().map(|(_, t)| t).sum::<usize>() + self.history_tokens
    }
}

/// Stage outputs handed to the assembler.
#[derive(Debug, Clone, Default)]
pub struct ContextParts {
    pub client_id: String,
    pub generation_type: GenerationType,
    pub current_language: String,
    pub blocks: Vec<ContextSourceBlock>,
    pub internet_search_infos: Vec<InternetSearchInfo>,
    pub documentation_entries: Vec<DocumentationEntry>,
    pub skills: Vec<SkillMatch>,
    pub history: PackedHistory,
    pub budget: Option<BudgetReport>,
    pub warnings: Vec<BudgetWarning>,
    /// Rendered assistant header, emitted only when history was packed
    pub ai_prefix: String,
    pub is_continue: bool,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn assemble(parts: ContextParts) -> ContextDetails {
        let block_text = |name: &str| {
            parts
                .blocks
                .iter()
                .find(|b| b.name == name)
                .map(|b| b.rendered_text.clone())
                .unwrap_or_default()
        };
        let token_breakdown = blocks::BLOCK_ORDER
            .iter()
            .map(|name| {
                let tokens = parts
                    .blocks
                    .iter()
                    .filter(|b| b.name == *name)
                    .map(|b| b.token_count)
                    .sum();
                (name.to_string(), tokens)
            })
            .collect();

        let ai_prefix = if parts.history.messages > 0 && !parts.is_continue {
            parts.ai_prefix.clone()
        } else {
            String::new()
        };

        ContextDetails {
            conditioning: block_text(blocks::CONDITIONING),
            internet_search_results: block_text(blocks::INTERNET_SEARCH_RESULTS),
            documentation: block_text(blocks::DOCUMENTATION),
            knowledge: block_text(blocks::KNOWLEDGE),
            user_description: block_text(blocks::USER_DESCRIPTION),
            positive_boost: block_text(blocks::POSITIVE_BOOST),
            negative_boost: block_text(blocks::NEGATIVE_BOOST),
            fun_mode: block_text(blocks::FUN_MODE),
            available_space: parts.budget.as_ref().map_or(0, |b| b.available_space),
            token_breakdown,
            history_tokens: parts.history.tokens,
            discussion_messages: parts.history.text,
            ai_prefix,
            client_id: parts.client_id,
            generation_type: parts.generation_type,
            current_language: parts.current_language,
            internet_search_infos: parts.internet_search_infos,
            documentation_entries: parts.documentation_entries,
            skills: parts.skills,
            warnings: parts.warnings,
            is_continue: parts.is_continue,
            prompt: parts.prompt,
        }
    }
}
