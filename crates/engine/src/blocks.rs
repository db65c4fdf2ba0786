//! Source blocks: the named, pre-tokenized pieces of a prompt.
//!
//! Every context source (conditioning, web results, documentation, skills,
//! boosts) is rendered to text once and measured once. The budget allocator
//! only ever looks at [`ContextSourceBlock::token_count`].

use contextweave_config::PromptTemplates;
use contextweave_core::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};

// ── Block names ──────────────────────────────────────────────────────────

pub const CONDITIONING: &str = "conditioning";
pub const INTERNET_SEARCH_RESULTS: &str = "internet_search_results";
pub const DOCUMENTATION: &str = "documentation";
pub const KNOWLEDGE: &str = "knowledge";
pub const USER_DESCRIPTION: &str = "user_description";
pub const POSITIVE_BOOST: &str = "positive_boost";
pub const NEGATIVE_BOOST: &str = "negative_boost";
pub const FUN_MODE: &str = "fun_mode";

/// Canonical order of the source blocks in a rendered prompt.
pub const BLOCK_ORDER: [&str; 8] = [
    CONDITIONING,
    INTERNET_SEARCH_RESULTS,
    DOCUMENTATION,
    KNOWLEDGE,
    USER_DESCRIPTION,
    POSITIVE_BOOST,
    NEGATIVE_BOOST,
    FUN_MODE,
];

const IMPORTANT_INFORMATION: &str = "important information";

const FUN_MODE_TEXT: &str = " Fun mode activated. In this mode you must answer in a funny playful way. \
Do not be serious in your answers. Each answer needs to make the user laugh.\n";

// ── Types ────────────────────────────────────────────────────────────────

/// A rendered context source and its size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSourceBlock {
    pub name: String,
    pub rendered_text: String,
    pub token_count: usize,
}

impl ContextSourceBlock {
    /// Render-time constructor: measures `text` with `tokenizer`.
    pub fn new(name: impl Into<String>, text: impl Into<String>, tokenizer: &dyn Tokenizer) -> Self {
        let rendered_text = text.into();
        let token_count = if rendered_text.is_empty() {
            0
        } else {
            tokenizer.count(&rendered_text)
        };
        Self {
            name: name.into(),
            rendered_text,
            token_count,
        }
    }

    /// A block that contributes nothing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rendered_text: String::new(),
            token_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rendered_text.is_empty()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Renders the fixed context sources with the session's header templates.
pub struct SourceBlockBuilder<'a> {
    templates: &'a PromptTemplates,
    tokenizer: &'a dyn Tokenizer,
}

impl<'a> SourceBlockBuilder<'a> {
    pub fn new(templates: &'a PromptTemplates, tokenizer: &'a dyn Tokenizer) -> Self {
        Self { templates, tokenizer }
    }

    /// The personality preamble under the system header.
    ///
    /// `text` must already have its placeholder keys substituted. A trailing
    /// separator is added unless the text already ends with one.
    pub fn conditioning(&self, text: &str) -> ContextSourceBlock {
        if text.is_empty() {
            return ContextSourceBlock::empty(CONDITIONING);
        }
        let separator = &self.templates.separator_template;
        let mut rendered = format!("{}{text}", self.templates.system_full_header());
        if !text.ends_with(separator.as_str()) {
            rendered.push_str(separator);
        }
        self.text(CONDITIONING, rendered)
    }

    pub fn user_description(&self, description: &str) -> ContextSourceBlock {
        if description.is_empty() {
            return ContextSourceBlock::empty(USER_DESCRIPTION);
        }
        let rendered = format!(
            "{}User description{}\n{description}\n",
            self.templates.start_header_id_template, self.templates.end_header_id_template
        );
        self.text(USER_DESCRIPTION, rendered)
    }

    pub fn positive_boost(&self, boost: &str) -> ContextSourceBlock {
        self.important(POSITIVE_BOOST, boost)
    }

    pub fn negative_boost(&self, boost: &str) -> ContextSourceBlock {
        self.important(NEGATIVE_BOOST, boost)
    }

    /// The playful-answer notice, measured on its own text.
    pub fn fun_mode(&self, enabled: bool) -> ContextSourceBlock {
        if !enabled {
            return ContextSourceBlock::empty(FUN_MODE);
        }
        let rendered = format!(
            "{}{FUN_MODE_TEXT}",
            self.templates.system_custom_header(IMPORTANT_INFORMATION)
        );
        self.text(FUN_MODE, rendered)
    }

    /// An already-rendered block (web results, documentation, knowledge).
    pub fn text(&self, name: &str, rendered: impl Into<String>) -> ContextSourceBlock {
        ContextSourceBlock::new(name, rendered, self.tokenizer)
    }

    fn important(&self, name: &str, text: &str) -> ContextSourceBlock {
        if text.is_empty() {
            return ContextSourceBlock::empty(name);
        }
        let rendered = format!(
            "{}{text}\n",
            self.templates.system_custom_header(IMPORTANT_INFORMATION)
        );
        self.text(name, rendered)
    }
}
