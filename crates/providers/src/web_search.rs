//! Web search backed by the DuckDuckGo HTML endpoint.
//!
//! Quick mode ranks the result snippets against the query. Full mode fetches
//! each result page, extracts its readable text, chunks it and ranks the
//! chunks. With page judgement enabled a language model drops pages it
//! considers irrelevant before chunking.

use async_trait::async_trait;
use contextweave_core::error::StoreError;
use contextweave_core::knowledge::{InternetSearch, KnowledgeChunk};
use contextweave_core::provider::{GenerationRequest, LanguageModel};
use contextweave_core::tokenizer::Tokenizer;
use contextweave_memory::vector::{bag_of_words, cosine_similarity, BAG_OF_WORDS_DIMS};
use contextweave_memory::chunk_text;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MAX_PAGE_CHARS: usize = 30_000;

#[derive(Debug, Clone)]
struct SearchHit {
    title: String,
    url: String,
    snippet: String,
}

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    tokenizer: Arc<dyn Tokenizer>,
    judge: Option<Arc<dyn LanguageModel>>,
    max_results: usize,
    chunk_size: usize,
    max_chunks: usize,
}

impl DuckDuckGoSearch {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| StoreError::Unavailable {
                store: "duckduckgo".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            tokenizer,
            judge: None,
            max_results: 5,
            chunk_size: 512,
            max_chunks: 5,
        })
    }

    /// Model used to judge page relevance when asked to.
    pub fn with_judge(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.judge = Some(model);
        self
    }

    pub fn with_limits(mut self, max_results: usize, chunk_size: usize, max_chunks: usize) -> Self {
        self.max_results = max_results.max(1);
        self.chunk_size = chunk_size.max(1);
        self.max_chunks = max_chunks.max(1);
        self
    }

    async fn search_hits(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .finish();
        let url = format!("{SEARCH_URL}?{encoded}");

        let html = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?
            .text()
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        Ok(parse_results(&html, self.max_results))
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, error = %e, "Failed to fetch search result page");
                return None;
            }
        };
        let is_html = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        let body = resp.text().await.ok()?;
        let text = if is_html {
            extract_readable_text(&Html::parse_document(&body))
        } else {
            body
        };
        Some(text.chars().take(MAX_PAGE_CHARS).collect())
    }

    async fn page_is_relevant(&self, query: &str, hit: &SearchHit, text: &str) -> bool {
        let Some(judge) = &self.judge else {
            return true;
        };
        let excerpt: String = text.chars().take(2000).collect();
        let prompt = format!(
            "Does the following page help answer the query \"{query}\"? Answer yes or no.\n\
             title: {}\ncontent: {excerpt}\nanswer:",
            hit.title
        );
        match judge.generate(GenerationRequest::new(prompt, 4)).await {
            Ok(resp) => resp.text.trim().to_lowercase().starts_with("yes"),
            Err(e) => {
                warn!(url = %hit.url, error = %e, "Page judgement failed, keeping page");
                true
            }
        }
    }

    fn rank(&self, query: &str, pieces: Vec<(SearchHit, String)>) -> Vec<KnowledgeChunk> {
        let query_vector = bag_of_words(query, BAG_OF_WORDS_DIMS);
        let mut chunks: Vec<KnowledgeChunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(i, (hit, text))| {
                let similarity = cosine_similarity(&bag_of_words(&text, BAG_OF_WORDS_DIMS), &query_vector);
                KnowledgeChunk {
                    chunk_id: format!("{}#{i}", hit.url),
                    source_document_title: hit.title,
                    source_document_path: hit.url,
                    token_count: self.tokenizer.count(&text),
                    text,
                    distance: 1.0 - similarity,
                }
            })
            .collect();
        chunks.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        chunks.truncate(self.max_chunks);
        chunks
    }
}

#[async_trait]
impl InternetSearch for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search_with_vectorization(
        &self,
        query: &str,
        quick_mode: bool,
        assess_with_model: bool,
    ) -> Result<Vec<KnowledgeChunk>, StoreError> {
        info!(query, quick_mode, "Web search");
        let hits = self.search_hits(query).await?;
        debug!(count = hits.len(), "Search hits");

        let mut pieces = Vec::new();
        for hit in hits {
            if quick_mode {
                if !hit.snippet.is_empty() {
                    let snippet = hit.snippet.clone();
                    pieces.push((hit, snippet));
                }
                continue;
            }

            let Some(text) = self.fetch_page(&hit.url).await else {
                continue;
            };
            if assess_with_model && !self.page_is_relevant(query, &hit, &text).await {
                debug!(url = %hit.url, "Page judged irrelevant");
                continue;
            }
            for piece in chunk_text(&text, self.chunk_size) {
                pieces.push((hit.clone(), piece));
            }
        }

        Ok(self.rank(query, pieces))
    }
}

fn parse_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for element in document.select(&result_sel) {
        let Some(link) = element.select(&title_sel).next() else {
            continue;
        };
        let title = element_text(&link);
        let url = link.value().attr("href").unwrap_or_default().to_string();
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|e| element_text(&e))
            .unwrap_or_default();
        if !title.is_empty() && !url.is_empty() {
            hits.push(SearchHit { title, url, snippet });
        }
        if hits.len() >= limit {
            break;
        }
    }
    hits
}

/// Text of an element with whitespace runs collapsed.
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Readable content of a page: `<article>` or `<main>` when present,
/// otherwise paragraphs, headings and list items of the body.
fn extract_readable_text(document: &Html) -> String {
    for sel_str in ["article", "main", "[role=main]"] {
        if let Ok(sel) = Selector::parse(sel_str) {
            let parts: Vec<String> = document
                .select(&sel)
                .map(|el| element_text(&el))
                .filter(|t| !t.is_empty())
                .collect();
            if !parts.is_empty() {
                return parts.join("\n\n");
            }
        }
    }

    let Ok(block_sel) = Selector::parse("p, h1, h2, h3, h4, li, blockquote, pre") else {
        return String::new();
    };
    let mut paragraphs: Vec<String> = document
        .select(&block_sel)
        .map(|el| element_text(&el))
        .filter(|t| t.len() > 20)
        .collect();
    paragraphs.dedup();
    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextweave_core::CharTokenizer;

    const RESULTS_HTML: &str = r#"
        <html><body>
          <div class="result">
            <a class="result__a" href="https://doc.rust-lang.org/book/">The Rust   Book</a>
            <a class="result__snippet">Learn ownership and borrowing in Rust.</a>
          </div>
          <div class="result">
            <a class="result__a" href="https://bread.example/">Bread</a>
            <a class="result__snippet">Knead the dough.</a>
          </div>
          <div class="result"><span>no link here</span></div>
        </body></html>"#;

    #[test]
    fn parses_result_blocks() {
        let hits = parse_results(RESULTS_HTML, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "The Rust Book");
        assert_eq!(hits[0].url, "https://doc.rust-lang.org/book/");
        assert_eq!(hits[0].snippet, "Learn ownership and borrowing in Rust.");
    }

    #[test]
    fn parse_respects_limit() {
        assert_eq!(parse_results(RESULTS_HTML, 1).len(), 1);
    }

    #[test]
    fn readable_text_prefers_article() {
        let doc = Html::parse_document(
            "<html><body><nav>menu</nav><article><p>Main content here</p></article></body></html>",
        );
        assert_eq!(extract_readable_text(&doc), "Main content here");
    }

    #[test]
    fn ranking_orders_by_distance() {
        let search = DuckDuckGoSearch::new(Arc::new(CharTokenizer)).unwrap();
        let hits = parse_results(RESULTS_HTML, 10);
        let pieces = hits
            .into_iter()
            .map(|h| {
                let s = h.snippet.clone();
                (h, s)
            })
            .collect();
        let chunks = search.rank("rust ownership", pieces);
        assert_eq!(chunks[0].source_document_title, "The Rust Book");
        assert!(chunks[0].distance <= chunks[1].distance);
        assert_eq!(chunks[0].token_count, chunks[0].text.chars().count());
    }
}
