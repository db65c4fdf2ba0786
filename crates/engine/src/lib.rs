//! The context-assembly engine: everything between "the user sent a
//! message" and "here is the prompt to generate from".
//!
//! A request flows through the [`pipeline::ContextPipeline`]:
//!
//! 1. **Conditioning**: the personality's system text, translated into the
//!    session language on first use and cached
//! 2. **Internet search**: optional web results, with an optional
//!    model-made decision and query
//! 3. **Documentation**: multi-hop retrieval over mounted vector stores,
//!    personality data and discussion attachments
//! 4. **Knowledge**: prior skills recalled from the skills library
//! 5. **Budget**: every source block is measured; the remainder is handed
//!    to the history packer, or the request fails
//! 6. **History**: messages packed backward from the active one
//!
//! The result is a [`assembler::ContextDetails`] with every block kept
//! separately and the full prompt rendered on demand.

pub mod assembler;
pub mod blocks;
pub mod budget;
pub mod history;
pub mod internet;
pub mod language;
pub mod mounts;
pub mod pipeline;
pub mod retrieval;
pub mod skills;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use assembler::{ContextAssembler, ContextDetails, ContextParts, GenerationType};
pub use blocks::{ContextSourceBlock, SourceBlockBuilder};
pub use budget::{BudgetAllocator, BudgetReport, BudgetRequest, BudgetWarning};
pub use history::{HistoryWindowPacker, PackedHistory};
pub use internet::{InternetQueryPlanner, InternetResults, InternetSearchInfo};
pub use language::{LanguagePackCache, PackSource, ResolvedConditioning};
pub use mounts::{MountStatus, StoreMounts};
pub use pipeline::{ContextPipeline, QueryRequest};
pub use retrieval::{DocumentationEntry, MergeOptions, MergeOutcome, RetrievalMerger};
pub use skills::{KnowledgeBlock, SkillsRecall};
pub use tasks::ModelTasks;
