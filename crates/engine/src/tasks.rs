//! Auxiliary model calls used while assembling a context.
//!
//! Query crafting, yes/no decisions, structured (JSON) extraction,
//! translation and summarisation all go through [`ModelTasks`], which owns
//! the model handle for the duration of a request.

use std::sync::Arc;

use contextweave_config::PromptTemplates;
use contextweave_core::error::{Error, ProviderError};
use contextweave_core::message::Message;
use contextweave_core::provider::{GenerationRequest, LanguageModel};
use contextweave_core::tokenizer::Tokenizer;
use tracing::{debug, warn};

/// Default size of the discussion tail fed to auxiliary prompts.
pub const DEFAULT_WINDOW_CHARS: usize = 2048;

const SHORT_ANSWER_TOKENS: usize = 10;
const QUERY_TOKENS: usize = 256;
const CODE_TOKENS: usize = 512;
const SUMMARY_TOKENS: usize = 512;

pub struct ModelTasks {
    model: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn Tokenizer>,
    templates: PromptTemplates,
    window_chars: usize,
    summary_chunk_tokens: usize,
}

impl ModelTasks {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tokenizer: Arc<dyn Tokenizer>,
        templates: PromptTemplates,
    ) -> Self {
        Self {
            model,
            tokenizer,
            templates,
            window_chars: DEFAULT_WINDOW_CHARS,
            summary_chunk_tokens: 1024,
        }
    }

    pub fn with_window_chars(mut self, chars: usize) -> Self {
        self.window_chars = chars;
        self
    }

    /// Size of the pieces a long text is cut into before summarising.
    pub fn with_summary_chunk_tokens(mut self, tokens: usize) -> Self {
        self.summary_chunk_tokens = tokens.max(1);
        self
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    // ── Discussion text ──────────────────────────────────────────────────

    /// The messages up to and including `active` as plain `sender: content`
    /// lines. Empty placeholders are skipped.
    pub fn recover_discussion(&self, messages: &[Message], active: usize) -> String {
        let separator = &self.templates.separator_template;
        messages
            .iter()
            .take(active.saturating_add(1))
            .filter(|m| !m.is_empty() && m.is_visible_to_ai())
            .map(|m| format!("\n{separator}{}: {}", m.sender, m.content.trim()))
            .collect()
    }

    /// The last `window_chars` characters of `discussion`.
    pub fn window<'a>(&self, discussion: &'a str) -> &'a str {
        let total = discussion.chars().count();
        if total <= self.window_chars {
            return discussion;
        }
        let skip = total - self.window_chars;
        match discussion.char_indices().nth(skip) {
            Some((offset, _)) => &discussion[offset..],
            None => "",
        }
    }

    // ── Generation helpers ───────────────────────────────────────────────

    pub async fn fast_gen(&self, prompt: &str, max_tokens: usize) -> Result<String, ProviderError> {
        let response = self
            .model
            .generate(GenerationRequest::new(prompt, max_tokens))
            .await?;
        Ok(response.text.trim().to_string())
    }

    /// Ask a yes/no question about `context`.
    pub async fn yes_no(&self, question: &str, context: &str) -> Result<bool, ProviderError> {
        let t = &self.templates;
        let prompt = [
            format!("{}Answer the question with yes or no only.", t.system_full_header()),
            format!("{}{context}", t.system_custom_header("context")),
            format!("{}{question}", t.system_custom_header("question")),
            t.ai_full_header("answer"),
        ]
        .join(t.separator_template.as_str());
        let answer = self.fast_gen(&prompt, SHORT_ANSWER_TOKENS).await?;
        let verdict = answer.to_lowercase().trim_start().starts_with("yes");
        debug!(%answer, verdict, "yes/no answer");
        Ok(verdict)
    }

    /// Ask for a JSON object shaped like `template` and parse it.
    pub async fn generate_code(&self, instruction: &str, template: &str) -> contextweave_core::Result<serde_json::Value> {
        let t = &self.templates;
        let prompt = [
            format!("{}{instruction}", t.system_full_header()),
            "Answer with a single JSON object following this template, inside a ```json markdown block:".to_string(),
            format!("```json\n{template}\n```"),
            t.ai_full_header("assistant"),
        ]
        .join(t.separator_template.as_str());
        let raw = self.fast_gen(&prompt, CODE_TOKENS).await?;
        let json = extract_json(&raw).ok_or_else(|| {
            Error::Internal(format!("no JSON object in model output: {raw}"))
        })?;
        Ok(serde_json::from_str(json)?)
    }

    /// Rewrite the last request of the discussion as a standalone search
    /// query. `None` when the model output is unusable.
    pub async fn reformulate_query(&self, discussion: &str) -> Option<String> {
        let instruction = format!(
            "Read the discussion and rewrite the last prompt for someone who didn't read the entire discussion.\n\
             Do not answer the prompt. Do not add explanations.{}{}",
            self.templates.system_custom_header("discussion"),
            self.window(discussion)
        );
        match self.generate_code(&instruction, r#"{"query": "the enhanced query"}"#).await {
            Ok(value) => string_field(&value, "query"),
            Err(e) => {
                warn!(error = %e, "Query reformulation failed");
                None
            }
        }
    }

    pub async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let t = &self.templates;
        let prompt = [
            format!(
                "{}Translate the following text from {from} to {to}. Keep its meaning, formatting and \
                 placeholders like {{{{date}}}} unchanged. Only answer with the translation.",
                t.system_full_header()
            ),
            format!("{}{text}", t.system_custom_header(from)),
            t.ai_full_header(to),
        ]
        .join(t.separator_template.as_str());
        let max_tokens = (self.tokenizer.count(text) * 2).max(QUERY_TOKENS);
        self.fast_gen(&prompt, max_tokens).await
    }

    /// Summarise `text` following `instruction`.
    ///
    /// Long texts are cut into token chunks; each chunk is summarised
    /// together with the summary of the previous chunks.
    pub async fn summarize(&self, text: &str, instruction: &str) -> Result<String, ProviderError> {
        let tokens = self.tokenizer.tokenize(text);
        if tokens.is_empty() {
            return Ok(String::new());
        }
        let t = &self.templates;
        let mut summary = String::new();
        for piece in tokens.chunks(self.summary_chunk_tokens) {
            let chunk = self.tokenizer.detokenize(piece);
            let mut parts = vec![format!("{}{instruction}", t.system_full_header())];
            if !summary.is_empty() {
                parts.push(format!("{}{summary}", t.system_custom_header("previous chunks summary")));
            }
            parts.push(format!("{}{chunk}", t.system_custom_header("text chunk")));
            parts.push(t.ai_full_header("summary"));
            summary = self.fast_gen(&parts.join(t.separator_template.as_str()), SUMMARY_TOKENS).await?;
        }
        Ok(summary)
    }
}

/// The JSON object inside a model answer: a fenced block when present,
/// otherwise the outermost braces.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }
    let open = text.find('{')?;
    let close = text.rfind('}')?;
    (close > open).then(|| &text[open..=close])
}

pub(crate) fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
