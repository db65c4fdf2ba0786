//! Tokenizer trait: the unit of every size computation.
//!
//! The engine never guesses token counts from character lengths; every block,
//! chunk and history message is measured through this trait.

/// Converts text to token ids and back.
///
/// Implementations must be deterministic, and `detokenize(tokenize(t))` must
/// reproduce `t`.
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &str;

    fn tokenize(&self, text: &str) -> Vec<u32>;

    fn detokenize(&self, tokens: &[u32]) -> String;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.tokenize(text).len()
    }
}

/// One token per Unicode scalar value.
///
/// Lossless for any input, which makes it a convenient reference tokenizer
/// for tests and for backends that do not expose their own vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn name(&self) -> &str {
        "char"
    }

    fn tokenize(&self, text: &str) -> Vec<u32> {
        text.chars().map(u32::from).collect()
    }

    fn detokenize(&self, tokens: &[u32]) -> String {
        tokens.iter().filter_map(|t| char::from_u32(*t)).collect()
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_tokenizer_is_lossless() {
        let tok = CharTokenizer;
        let text = "héllo wörld ✓";
        let ids = tok.tokenize(text);
        assert_eq!(ids.len(), 13);
        assert_eq!(tok.detokenize(&ids), text);
        assert_eq!(tok.count(text), 13);
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(CharTokenizer.count(""), 0);
        assert_eq!(CharTokenizer.detokenize(&[]), "");
    }
}
