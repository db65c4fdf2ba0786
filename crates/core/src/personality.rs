//! Personality: the persona whose conditioning opens every prompt.
//!
//! A personality carries its conditioning text in its default language, an
//! optional welcome message and the prefix the model answers under. The
//! language-pack cache translates the first two for other languages.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A persona definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    /// Stable identifier, used as the language-pack cache key
    pub id: String,

    /// Display name, also the sender name of AI messages
    pub name: String,

    /// Language the conditioning is written in
    #[serde(default = "default_language")]
    pub language: String,

    /// System preamble
    #[serde(default)]
    pub conditioning: String,

    #[serde(default)]
    pub welcome_message: String,

    /// Header under which the model writes its answer
    #[serde(default)]
    pub ai_message_prefix: String,

    /// Custom placeholders substituted into the conditioning, keyed without braces
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditioning_commands: BTreeMap<String, String>,

    /// Skip the discussion-attached document store for this persona
    #[serde(default)]
    pub ignore_discussion_documents_rag: bool,
}

fn default_language() -> String {
    "english".into()
}

impl Personality {
    /// A minimal generic assistant.
    pub fn default_personality() -> Self {
        Self {
            id: "generic_assistant".into(),
            name: "assistant".into(),
            language: default_language(),
            conditioning: "Act as a helpful, accurate and concise assistant.".into(),
            welcome_message: "Welcome! How can I help you today?".into(),
            ai_message_prefix: "assistant".into(),
            conditioning_commands: BTreeMap::new(),
            ignore_discussion_documents_rag: false,
        }
    }

    /// Conditioning with every placeholder substituted at `now`.
    pub fn conditioning_at(&self, now: DateTime<Local>) -> String {
        replace_keys(&self.conditioning, &self.conditioning_commands, now)
    }
}

impl Default for Personality {
    fn default() -> Self {
        Self::default_personality()
    }
}

/// Substitutes `{{date}}`, `{{time}}`, `{{datetime}}` and every custom
/// `{{key}}` in `text`. Unknown placeholders are left as they are.
pub fn replace_keys(text: &str, commands: &BTreeMap<String, String>, now: DateTime<Local>) -> String {
    let mut out = text
        .replace("{{datetime}}", &now.format("%Y-%m-%d %H:%M:%S").to_string())
        .replace("{{date}}", &now.format("%Y-%m-%d").to_string())
        .replace("{{time}}", &now.format("%H:%M:%S").to_string());
    for (key, value) in commands {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}
