//! Embedding function contract and a deterministic local embedder.
//!
//! The production embedding model is an external collaborator: a frozen
//! function from text to a fixed-length vector. [`Embedder`] is the seam the
//! engine calls through. [`HashEmbedder`] is a dependency-free stand-in that
//! hashes word unigrams, word bigrams and character trigrams into a signed
//! feature vector. Identical text always yields an identical vector, and
//! texts sharing vocabulary land close together, which is what duplicate
//! detection needs from a fallback.

use anyhow::Result;

/// Text → dense vector of fixed dimensionality.
///
/// Implementations must be deterministic for a fixed `model_name`.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model and version.
    fn model_name(&self) -> &str;

    /// Length of every vector returned by [`embed`](Self::embed).
    fn dims(&self) -> usize;

    /// Embed one text.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend cannot produce a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Weight of a word unigram feature.
const UNIGRAM_WEIGHT: f32 = 1.0;
/// Weight of a word bigram feature.
const BIGRAM_WEIGHT: f32 = 0.5;
/// Weight of a character trigram feature.
const TRIGRAM_WEIGHT: f32 = 0.25;

/// Feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
    name: String,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        let dims = dims.max(1);
        Self {
            dims,
            name: format!("bugsift-hash-v1-{dims}"),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut word = [0_u8; 8];
        word.copy_from_slice(&bytes[..8]);
        let bucket_seed = u64::from_le_bytes(word);
        let dims = u64::try_from(self.dims).unwrap_or(u64::MAX);
        let bucket = usize::try_from(bucket_seed % dims).unwrap_or(0);
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dims];
        let tokens = tokenize(text);

        if tokens.is_empty() {
            // Keep empty input searchable with a well-defined direction.
            self.add_feature(&mut vector, "\u{0}empty", UNIGRAM_WEIGHT);
        }

        for token in &tokens {
            self.add_feature(&mut vector, &format!("w:{token}"), UNIGRAM_WEIGHT);

            let padded: Vec<char> = format!("^{token}$").chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &format!("c:{gram}"), TRIGRAM_WEIGHT);
            }
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

/// Lowercase alphanumeric words.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Scale `vector` to unit length in place. Zero vectors stay zero.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt();
    if norm > f64::EPSILON {
        for v in vector.iter_mut() {
            #[allow(clippy::cast_possible_truncation)]
            let scaled = (f64::from(*v) / norm) as f32;
            *v = scaled;
        }
    }
}
