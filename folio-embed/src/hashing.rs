//! Model-free embedding provider based on feature hashing.
//!
//! Each lower-cased alphanumeric token is hashed with FNV-1a into one of
//! `dimension` buckets, with the sign taken from the top bit of the hash, and the
//! resulting bag-of-words vector is L2-normalised. Texts that share words get
//! high cosine similarity, which is enough for offline use and reproducible tests.

use crate::config::HASHING_MODEL;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, convert_to_f16};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
    normalize: bool,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hashing dimension must be positive",
            ));
        }
        Ok(Self {
            dimension,
            normalize: true,
        })
    }

    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = FnvHasher::default();
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        Ok(convert_to_f16(vec![self.embed_one(text)], self.normalize)
            .pop()
            .unwrap_or_default())
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let raw = texts.iter().map(|t| self.embed_one(t)).collect();
        Ok(EmbeddingResult::new(convert_to_f16(raw, self.normalize)))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL
    }

    fn normalized(&self) -> bool {
        self.normalize
    }
}
