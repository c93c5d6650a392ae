use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::backend::BackendKind;
use crate::error::{SearchError, SearchResult};
use crate::fusion::FusionWeights;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    Hash,
    #[serde(rename = "fastembed")]
    FastEmbed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub kind: EncoderKind,
    pub model: String,
    /// Output dimension for the hash encoder; model encoders report their own.
    #[serde(default = "default_hash_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub seed: u64,
}

fn default_hash_dimension() -> usize {
    384
}

impl EncoderConfig {
    pub fn hash(model: &str, dimension: usize, seed: u64) -> Self {
        Self { kind: EncoderKind::Hash, model: model.to_string(), dimension, seed }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Artifact directory written by the indexer.
    pub data_path: PathBuf,
    /// Weight of answer-space similarity.
    pub coeff1: f32,
    /// Weight of lexical similarity; 0 leaves the lexical scorer out of hybrid ranking.
    pub coeff2: f32,
    /// Weight of title-space similarity.
    pub coeff3: f32,
    pub batch_size: usize,
    /// Result count for the alternate modes when the caller gives none.
    pub default_top_n: usize,
    pub backend: BackendKind,
    pub title_encoder: EncoderConfig,
    pub answer_encoder: EncoderConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data"),
            coeff1: 0.3,
            coeff2: 0.0,
            coeff3: 0.5,
            batch_size: 1024,
            default_top_n: 20,
            backend: BackendKind::Auto,
            title_encoder: EncoderConfig::hash("all-MiniLM-L6-v2", 384, 1),
            answer_encoder: EncoderConfig::hash("multi-qa-mpnet-base-cos-v1", 768, 2),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> SearchResult<()> {
        if self.batch_size == 0 {
            return Err(SearchError::Configuration("batch_size must be positive".into()));
        }
        if self.default_top_n == 0 {
            return Err(SearchError::Configuration("default_top_n must be positive".into()));
        }
        self.weights().map(|_| ())
    }

    /// Fusion weights normalized to sum to one.
    pub fn weights(&self) -> SearchResult<FusionWeights> {
        FusionWeights::new(self.coeff1, self.coeff2, self.coeff3)
    }
}
