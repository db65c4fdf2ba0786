//! Vector similarity and vectorizers.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Hashed bag-of-words vectors (no network, deterministic)
//! - Ranking of stored vectors against a query vector
//!
//! [`Vectorizer`] is the closed set of ways a store can turn text into
//! vectors; it is picked once from configuration.

use std::collections::HashSet;
use std::sync::Arc;

use contextweave_core::error::StoreError;
use contextweave_core::Embedder;

/// Dimensions of the bag-of-words vectors.
pub const BAG_OF_WORDS_DIMS: usize = 1024;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Lower-cased alphanumeric words of `text`.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Hashed term-frequency vector of `text` with `dims` buckets.
pub fn bag_of_words(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims.max(1)];
    let len = v.len() as u64;
    for word in words(text) {
        v[(fnv1a(word.as_bytes()) % len) as usize] += 1.0;
    }
    v
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Turns text into vectors for similarity search.
#[derive(Clone)]
pub enum Vectorizer {
    /// Local hashed term frequencies
    BagOfWords { dims: usize },
    /// Remote embeddings
    Embeddings(Arc<dyn Embedder>),
}

impl Vectorizer {
    pub fn bag_of_words() -> Self {
        Vectorizer::BagOfWords { dims: BAG_OF_WORDS_DIMS }
    }

    pub fn name(&self) -> &str {
        match self {
            Vectorizer::BagOfWords { .. } => "bag_of_words",
            Vectorizer::Embeddings(embedder) => embedder.name(),
        }
    }

    /// One vector per input, in order.
    pub async fn vectorize(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        match self {
            Vectorizer::BagOfWords { dims } => {
                Ok(texts.iter().map(|t| bag_of_words(t, *dims)).collect())
            }
            Vectorizer::Embeddings(embedder) => {
                let vectors = embedder
                    .embed(texts)
                    .await
                    .map_err(|e| StoreError::EmbeddingFailed(e.to_string()))?;
                if vectors.len() != texts.len() {
                    return Err(StoreError::EmbeddingFailed(format!(
                        "expected {} vectors, got {}",
                        texts.len(),
                        vectors.len()
                    )));
                }
                Ok(vectors)
            }
        }
    }

    pub async fn vectorize_one(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut vectors = self.vectorize(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| StoreError::EmbeddingFailed("no vector returned".into()))
    }
}

impl std::fmt::Debug for Vectorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vectorizer::BagOfWords { dims } => write!(f, "BagOfWords({dims})"),
            Vectorizer::Embeddings(e) => write!(f, "Embeddings({})", e.name()),
        }
    }
}

/// Rank `(id, vector)` items by similarity to `query`, best first.
///
/// Items whose id is in `exclude` are skipped, as are items below
/// `min_score`. Returns `(index, similarity)` pairs into `items`.
pub fn rank_by_similarity<'a, I>(
    items: I,
    query: &[f32],
    exclude: &HashSet<String>,
    limit: usize,
    min_score: f32,
) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut scored: Vec<(usize, f32)> = items
        .into_iter()
        .enumerate()
        .filter(|(_, (id, _))| !exclude.contains(*id))
        .map(|(i, (_, v))| (i, cosine_similarity(v, query)))
        .filter(|(_, sim)| *sim >= min_score)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
