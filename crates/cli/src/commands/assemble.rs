//! `contextweave assemble`: Build the context for one discussion.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use contextweave_core::{Message, TracingProgress, VectorStore};
use contextweave_engine::{ContextDetails, GenerationType, QueryRequest};
use contextweave_memory::{InMemoryConversationStore, InMemoryVectorStore};

use super::{build_pipeline, load_config, CmdResult};

const CLIENT_ID: &str = "cli";

#[derive(Debug, Args)]
pub struct AssembleArgs {
    /// JSON file holding the discussion as an array of messages
    #[arg(short, long, conflicts_with = "prompt")]
    pub discussion: Option<PathBuf>,

    /// Single user message to build a context for
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Id of the active message (defaults to the last one)
    #[arg(short, long)]
    pub message_id: Option<String>,

    /// Continue the active message instead of answering it
    #[arg(long = "continue")]
    pub is_continue: bool,

    /// full, full_with_internet or simple_question
    #[arg(short, long, default_value = "full")]
    pub generation_type: GenerationType,

    /// Force the internet search stage
    #[arg(long)]
    pub internet: bool,

    /// Directory of files attached to the discussion
    #[arg(long)]
    pub docs: Option<PathBuf>,

    /// Language to condition the personality in
    #[arg(short, long)]
    pub language: Option<String>,

    /// Tokens kept for the answer (defaults to max_n_predict)
    #[arg(long)]
    pub reserve: Option<usize>,

    /// Print the full context details as JSON
    #[arg(long)]
    pub json: bool,

    /// Configuration file to use instead of the default
    #[arg(long, env = "CONTEXTWEAVE_CONFIG")]
    pub config: Option<PathBuf>,
}

pub async fn run(args: AssembleArgs) -> CmdResult {
    let mut config = load_config(args.config.as_deref())?;
    if args.internet {
        config.activate_internet_search = true;
    }

    let conversations = Arc::new(InMemoryConversationStore::new());
    match (&args.discussion, &args.prompt) {
        (Some(path), _) => {
            conversations.load_json_file(CLIENT_ID, path).await?;
        }
        (None, Some(prompt)) => {
            conversations
                .set_discussion(CLIENT_ID, vec![Message::user(&config.user_name, prompt.as_str())])
                .await;
        }
        (None, None) => return Err("either --discussion or --prompt is required".into()),
    }

    let chunk_size = config.rag_chunk_size;
    let vectorizer_kind = config.rag_vectorizer;
    let (pipeline, backends) = build_pipeline(config, conversations).await?;

    let mut request = QueryRequest::new(CLIENT_ID)
        .with_generation_type(args.generation_type)
        .with_progress(Arc::new(TracingProgress));
    if let Some(id) = args.message_id {
        request = request.with_message(id);
    }
    if args.is_continue {
        request = request.continuation();
    }
    if args.internet {
        request = request.force_internet();
    }
    if let Some(language) = args.language {
        request = request.with_language(language);
    }
    if let Some(reserve) = args.reserve {
        request = request.with_reserved(reserve);
    }
    if let Some(dir) = &args.docs {
        let store = InMemoryVectorStore::new(
            "discussion",
            backends.vectorizer(vectorizer_kind),
            Arc::clone(&backends.tokenizer),
            chunk_size,
        );
        store.load_directory(dir).await?;
        let store: Arc<dyn VectorStore> = Arc::new(store);
        request = request.with_discussion_store(store);
    }

    let details = pipeline.prepare_query(request).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&details)?);
    } else {
        print!("{}", details.render_prompt());
        print_summary(&details);
    }
    Ok(())
}

/// Token accounting on stderr, out of the way of the prompt.
fn print_summary(details: &ContextDetails) {
    eprintln!();
    eprintln!("  Language:   {}", details.current_language);
    for (block, tokens) in details.token_breakdown.iter().filter(|(_, t)| *t > 0) {
        eprintln!("  {block:<24} {tokens:>6} tokens");
    }
    eprintln!("  {:<24} {:>6} tokens", "history", details.history_tokens);
    eprintln!("  {:<24} {:>6} tokens", "available for history", details.available_space);
    for warning in &details.warnings {
        eprintln!("  ⚠️  {warning:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: AssembleArgs,
    }

    #[test]
    fn parses_generation_type_and_flags() {
        let h = Harness::parse_from([
            "assemble",
            "--prompt",
            "hi",
            "--generation-type",
            "simple-question",
            "--continue",
            "--reserve",
            "128",
        ]);
        assert_eq!(h.args.generation_type, GenerationType::SimpleQuestion);
        assert!(h.args.is_continue);
        assert_eq!(h.args.reserve, Some(128));
        assert!(!h.args.internet);
    }

    #[test]
    fn discussion_and_prompt_conflict() {
        let parsed = Harness::try_parse_from(["assemble", "--prompt", "hi", "--discussion", "d.json"]);
        assert!(parsed.is_err());
    }
}
