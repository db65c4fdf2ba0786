//! Token budget arithmetic.
//!
//! The allocator sums the cost of every source block and subtracts it, the
//! generation reservation and the tokens already consumed from the context
//! window. Whatever is left is the room the history packer may fill. A
//! non-positive remainder is fatal: the request cannot be served without
//! silently dropping a source.

use contextweave_core::error::ContextError;
use contextweave_core::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::blocks::ContextSourceBlock;

/// Tokens always left free by the oversize truncation.
pub const TRUNCATION_MARGIN: usize = 512;

/// Per-request budget inputs besides the blocks themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BudgetRequest {
    /// Tokens kept free for the model's answer
    pub reserved_for_generation: usize,
    /// Tokens the caller already spent elsewhere in the prompt
    pub n_tokens_already_consumed: usize,
}

/// Non-fatal observations made while enforcing block limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BudgetWarning {
    /// The block is bigger than three quarters of the context window.
    Oversized { block: String, tokens: usize, threshold: usize },
    /// The block was cut to fit the context window.
    Truncated { block: String, from: usize, to: usize },
}

/// Outcome of a successful allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub ctx_size: usize,
    pub reserved_for_generation: usize,
    pub n_tokens_already_consumed: usize,
    pub total_source_tokens: usize,
    /// Room left for the history; always at least 1
    pub available_space: usize,
    /// Token count per block, in assembly order
    pub breakdown: Vec<(String, usize)>,
}

/// Sizes source blocks against a context window.
#[derive(Debug, Clone, Copy)]
pub struct BudgetAllocator {
    ctx_size: usize,
}

impl BudgetAllocator {
    pub fn new(ctx_size: usize) -> Self {
        Self { ctx_size }
    }

    pub fn ctx_size(&self) -> usize {
        self.ctx_size
    }

    /// Largest size a single block may keep.
    pub fn block_limit(&self) -> usize {
        self.ctx_size.saturating_sub(TRUNCATION_MARGIN)
    }

    /// Warn about blocks above ¾ of the window and cut blocks above
    /// `ctx_size - 512` to exactly that many tokens, dropping the tail.
    pub fn enforce_block_limits(
        &self,
        blocks: &mut [ContextSourceBlock],
        tokenizer: &dyn Tokenizer,
    ) -> Vec<BudgetWarning> {
        let threshold = self.ctx_size * 3 / 4;
        let limit = self.block_limit();
        let mut warnings = Vec::new();

        for block in blocks.iter_mut() {
            if block.token_count > threshold {
                warn!(
                    block = %block.name,
                    tokens = block.token_count,
                    threshold,
                    "Block is bigger than three quarters of the context"
                );
                warnings.push(BudgetWarning::Oversized {
                    block: block.name.clone(),
                    tokens: block.token_count,
                    threshold,
                });
            }

            if block.token_count > limit {
                let tokens = tokenizer.tokenize(&block.rendered_text);
                let from = block.token_count;
                block.rendered_text = tokenizer.detokenize(&tokens[..limit.min(tokens.len())]);
                block.token_count = limit;
                warn!(block = %block.name, from, to = limit, "Block too big for the context, cropped");
                warnings.push(BudgetWarning::Truncated {
                    block: block.name.clone(),
                    from,
                    to: limit,
                });
            }
        }

        warnings
    }

    /// Compute the space left for the history.
    ///
    /// Fails with [`ContextError::InsufficientContextBudget`] when fewer than
    /// one token remains. The value is never clamped.
    pub fn allocate(
        &self,
        blocks: &[ContextSourceBlock],
        request: &BudgetRequest,
    ) -> Result<BudgetReport, ContextError> {
        let breakdown: Vec<(String, usize)> = blocks
            .iter()
            .map(|b| (b.name.clone(), b.token_count))
            .collect();
        for (name, tokens) in &breakdown {
            debug!(block = %name, tokens, "Source block size");
        }

        let total_source_tokens: usize = breakdown.iter().map(|(_, t)| t).sum();
        let available_space = self.ctx_size as i64
            - request.reserved_for_generation as i64
            - request.n_tokens_already_consumed as i64
            - total_source_tokens as i64;

        if available_space < 1 {
            warn!(
                available_space,
                ctx_size = self.ctx_size,
                total_source_tokens,
                "Not enough space in context"
            );
            return Err(ContextError::InsufficientContextBudget {
                available_space,
                ctx_size: self.ctx_size,
                reserved: request.reserved_for_generation,
                consumed: request.n_tokens_already_consumed,
                breakdown,
            });
        }

        info!(available_space, total_source_tokens, "Context budget allocated");
        Ok(BudgetReport {
            ctx_size: self.ctx_size,
            reserved_for_generation: request.reserved_for_generation,
            n_tokens_already_consumed: request.n_tokens_already_consumed,
            total_source_tokens,
            available_space: available_space as usize,
            breakdown,
        })
    }
}
