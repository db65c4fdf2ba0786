//! History window packing.
//!
//! Walks the discussion backward from the active message, itself included,
//! and keeps whole messages while they fit the remaining budget. Empty
//! placeholders (the AI turn being generated) take no space. The first message that
//! does not fit is cut at a token boundary, keeping its most recent tokens,
//! and packing stops there.

use contextweave_config::PromptTemplates;
use contextweave_core::message::{Message, SenderType};
use contextweave_core::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackedHistory {
    /// Rendered messages, oldest first
    pub text: String,
    /// Tokens used by the rendered messages
    pub tokens: usize,
    /// Tokens reserved for the assistant prefix
    pub prefix_tokens: usize,
    /// Number of messages included, whole or cut
    pub messages: usize,
    pub truncated: bool,
}

pub struct HistoryWindowPacker<'a> {
    tokenizer: &'a dyn Tokenizer,
    templates: &'a PromptTemplates,
    use_model_name: bool,
    ai_prefix: String,
}

impl<'a> HistoryWindowPacker<'a> {
    pub fn new(tokenizer: &'a dyn Tokenizer, templates: &'a PromptTemplates) -> Self {
        Self {
            tokenizer,
            templates,
            use_model_name: false,
            ai_prefix: String::new(),
        }
    }

    /// Add the producing model's name to AI message headers.
    pub fn with_model_names(mut self, enabled: bool) -> Self {
        self.use_model_name = enabled;
        self
    }

    /// The rendered assistant prefix whose tokens are consumed up front
    /// outside continuation mode.
    pub fn with_ai_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ai_prefix = prefix.into();
        self
    }

    /// A message with its role header.
    pub fn render(&self, message: &Message) -> String {
        let t = self.templates;
        let (start, end) = match message.sender_type {
            SenderType::Ai => (&t.start_ai_header_id_template, &t.end_ai_header_id_template),
            SenderType::User => (&t.start_user_header_id_template, &t.end_user_header_id_template),
        };
        let sender = match (&message.model, self.use_model_name) {
            (Some(model), true) => format!("{}({model})", message.sender),
            _ => message.sender.clone(),
        };
        format!("{}{start}{sender}{end}{}", t.separator_template, message.content.trim())
    }

    /// Pack the history up to and including `current` into `available`
    /// tokens. `continuation` only decides whether the assistant prefix is
    /// budgeted.
    pub fn pack(&self, messages: &[Message], current: usize, available: usize, continuation: bool) -> PackedHistory {
        let mut packed = PackedHistory::default();
        let mut accumulated = 0usize;
        if !continuation {
            packed.prefix_tokens = self.tokenizer.count(&self.ai_prefix);
            accumulated = packed.prefix_tokens;
        }

        let end = current.saturating_add(1).min(messages.len());
        let mut pieces: Vec<Vec<u32>> = Vec::new();

        for message in messages[..end].iter().rev() {
            if message.is_empty() || !message.is_visible_to_ai() {
                continue;
            }
            let tokens = self.tokenizer.tokenize(&self.render(message));
            if accumulated + tokens.len() > available {
                let remaining = available.saturating_sub(accumulated);
                if remaining > 0 {
                    pieces.push(tokens[tokens.len() - remaining..].to_vec());
                    accumulated += remaining;
                    packed.truncated = true;
                }
                debug!(remaining, message = %message.id, "History budget exhausted");
                break;
            }
            accumulated += tokens.len();
            pieces.push(tokens);
        }

        packed.messages = pieces.len();
        packed.tokens = pieces.iter().map(Vec::len).sum();
        packed.text = pieces
            .iter()
            .rev()
            .map(|tokens| self.tokenizer.detokenize(tokens))
            .collect();
        debug!(
            messages = packed.messages,
            tokens = packed.tokens,
            available,
            truncated = packed.truncated,
            "History packed"
        );
        packed
    }

    /// Pack only `message`, cut to `available` tokens if needed.
    pub fn pack_single(&self, message: &Message, available: usize, continuation: bool) -> PackedHistory {
        self.pack(std::slice::from_ref(message), 0, available, continuation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextweave_core::{CharTokenizer, Visibility};

    fn templates() -> PromptTemplates {
        PromptTemplates::default()
    }

    #[test]
    fn renders_role_headers() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t);
        let ai = Message::ai("bot", " hi ").with_model("mistral");
        assert_eq!(packer.render(&ai), "\n!@>bot: hi");
        let packer = packer.with_model_names(true);
        assert_eq!(packer.render(&ai), "\n!@>bot(mistral): hi");
        assert_eq!(packer.render(&Message::user("alice", "yo")), "\n!@>alice: yo");
    }

    #[test]
    fn everything_fits() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t);
        let mut messages: Vec<Message> = (0..10).map(|i| Message::user("u", format!("m{i}"))).collect();
        messages.push(Message::ai("bot", "").with_rank(10));
        let packed = packer.pack(&messages, 10, 1000, false);
        assert_eq!(packed.messages, 10);
        assert!(!packed.truncated);
        assert!(packed.text.starts_with("\n!@>u: m0"));
        assert!(packed.text.ends_with("\n!@>u: m9"));
        assert_eq!(packed.tokens, packed.text.chars().count());
    }

    #[test]
    fn oldest_message_cut_at_token_boundary() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t);
        // each rendered message is "\n!@>u: " (7) + 3 = 10 tokens
        let messages = vec![
            Message::user("u", "aaa"),
            Message::user("u", "bbb"),
            Message::user("u", "ccc"),
            Message::ai("bot", ""),
        ];
        let packed = packer.pack(&messages, 3, 24, false);
        assert_eq!(packed.tokens, 24);
        assert!(packed.truncated);
        assert_eq!(packed.messages, 3);
        assert_eq!(packed.text, " aaa\n!@>u: bbb\n!@>u: ccc");
    }

    #[test]
    fn cut_keeps_most_recent_tokens() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t);
        let messages = vec![Message::user("u", "abcdef"), Message::user("u", "xyz")];
        let packed = packer.pack(&messages, 1, 4, true);
        assert_eq!(packed.text, " xyz");
        assert_eq!(packed.tokens, 4);
        assert!(packed.truncated);
    }

    #[test]
    fn prefix_tokens_consumed_outside_continuation() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t).with_ai_prefix("\n!@>bot: ");
        let messages = vec![Message::user("u", "hello"), Message::ai("bot", "")];
        let packed = packer.pack(&messages, 1, 12, false);
        assert_eq!(packed.prefix_tokens, 9);
        assert_eq!(packed.tokens, 3);
        assert!(packed.tokens + packed.prefix_tokens <= 12);

        let cont = packer.pack(&messages[..1], 0, 12, true);
        assert_eq!(cont.prefix_tokens, 0);
        assert_eq!(cont.text, "\n!@>u: hello");
    }

    #[test]
    fn skips_empty_and_invisible_messages() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t);
        let messages = vec![
            Message::user("u", "keep"),
            Message::user("u", "   "),
            Message::user("u", "secret").with_visibility(Visibility::InvisibleToAi),
            Message::user("u", "ui-hidden").with_visibility(Visibility::InvisibleToUser),
            Message::ai("bot", ""),
        ];
        let packed = packer.pack(&messages, 4, 100, false);
        assert_eq!(packed.text, "\n!@>u: keep\n!@>u: ui-hidden");
        assert_eq!(packed.messages, 2);
    }

    #[test]
    fn zero_remaining_adds_nothing() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t);
        let messages = vec![Message::user("u", "aaa"), Message::user("u", "bbb"), Message::ai("b", "")];
        let packed = packer.pack(&messages, 2, 10, false);
        assert_eq!(packed.messages, 1);
        assert!(!packed.truncated);
        assert_eq!(packed.text, "\n!@>u: bbb");
    }

    #[test]
    fn packed_history_never_exceeds_budget() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t).with_ai_prefix("bot:");
        let messages: Vec<Message> = (0..30).map(|i| Message::user("u", "x".repeat(i * 3 + 1))).collect();
        for available in [5usize, 17, 64, 150, 999] {
            let packed = packer.pack(&messages, 29, available, false);
            assert!(packed.tokens + packed.prefix_tokens <= available, "available {available}");
        }
    }

    #[test]
    fn active_user_message_is_packed() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t).with_ai_prefix("\n!@>bot: ");
        let messages = vec![Message::user("alice", "What is Rust?")];
        let packed = packer.pack(&messages, 0, 100, false);
        assert_eq!(packed.text, "\n!@>alice: What is Rust?");
        assert_eq!(packed.messages, 1);
    }

    #[test]
    fn single_message_mode() {
        let t = templates();
        let packer = HistoryWindowPacker::new(&CharTokenizer, &t);
        let packed = packer.pack_single(&Message::user("u", "only me"), 100, false);
        assert_eq!(packed.text, "\n!@>u: only me");
        let cut = packer.pack_single(&Message::user("u", "only me"), 3, true);
        assert_eq!(cut.text, " me");
    }
}
