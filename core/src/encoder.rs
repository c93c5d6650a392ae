//! Query encoders, one per embedding space.
//!
//! Title and answer spaces use different encoders (an asymmetric dual-encoder
//! setup), so a query is encoded twice per hybrid search.

use crate::config::{EncoderConfig, EncoderKind};
use crate::embedding::{normalize, Space};
use crate::error::{SearchError, SearchResult};
use crate::tokenizer::vectorizer_tokens;

pub trait QueryEncoder: Send + Sync {
    /// Unit-length vector for `text`, or all zeros when nothing in `text` can be encoded.
    fn encode(&self, text: &str) -> SearchResult<Vec<f32>>;
    fn dimension(&self) -> usize;
    fn name(&self) -> &str;
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET ^ seed;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Signed feature hashing of word tokens. Needs no model files, and the
/// embedding artifacts must have been produced with the same seed and dimension.
#[derive(Debug, Clone)]
pub struct HashEncoder {
    name: String,
    dimension: usize,
    seed: u64,
}

impl HashEncoder {
    pub fn new(name: impl Into<String>, dimension: usize, seed: u64) -> SearchResult<Self> {
        if dimension == 0 {
            return Err(SearchError::Configuration("hash encoder dimension must be positive".into()));
        }
        Ok(Self { name: name.into(), dimension, seed })
    }
}

impl QueryEncoder for HashEncoder {
    fn encode(&self, text: &str) -> SearchResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in vectorizer_tokens(text) {
            let hash = fnv1a(self.seed, token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "fastembed")]
pub use self::onnx::FastEmbedEncoder;

#[cfg(feature = "fastembed")]
mod onnx {
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use parking_lot::Mutex;

    use super::QueryEncoder;
    use crate::embedding::normalize;
    use crate::error::{SearchError, SearchResult};

    fn model_for(name: &str) -> SearchResult<EmbeddingModel> {
        let short = name.rsplit('/').next().unwrap_or(name);
        match short {
            "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            "paraphrase-multilingual-mpnet-base-v2" => Ok(EmbeddingModel::ParaphraseMLMpnetBaseV2),
            "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
            other => Err(SearchError::Configuration(format!("unsupported fastembed model {other:?}"))),
        }
    }

    /// ONNX sentence-embedding model run through fastembed.
    pub struct FastEmbedEncoder {
        name: String,
        dimension: usize,
        // The ONNX session needs exclusive access per call.
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedEncoder {
        pub fn load(name: &str) -> SearchResult<Self> {
            let mut model = TextEmbedding::try_new(InitOptions::new(model_for(name)?))
                .map_err(|e| SearchError::Encoder(format!("loading {name}: {e}")))?;
            let probe = model
                .embed(vec!["dimension probe"], None)
                .map_err(|e| SearchError::Encoder(e.to_string()))?;
            let dimension = probe.first().map(Vec::len).unwrap_or(0);
            tracing::info!(model = name, dimension, "loaded fastembed encoder");
            Ok(Self { name: name.to_string(), dimension, model: Mutex::new(model) })
        }
    }

    impl QueryEncoder for FastEmbedEncoder {
        fn encode(&self, text: &str) -> SearchResult<Vec<f32>> {
            let mut out = self
                .model
                .lock()
                .embed(vec![text], None)
                .map_err(|e| SearchError::Encoder(e.to_string()))?;
            let mut vector = out.pop().ok_or_else(|| SearchError::Encoder("empty embedding batch".into()))?;
            normalize(&mut vector);
            Ok(vector)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

/// Instantiates the encoder configured for `space`.
pub fn build_encoder(config: &EncoderConfig, space: Space) -> SearchResult<Box<dyn QueryEncoder>> {
    let encoder: Box<dyn QueryEncoder> = match config.kind {
        EncoderKind::Hash => Box::new(HashEncoder::new(config.model.clone(), config.dimension, config.seed)?),
        #[cfg(feature = "fastembed")]
        EncoderKind::FastEmbed => Box::new(FastEmbedEncoder::load(&config.model)?),
        #[cfg(not(feature = "fastembed"))]
        EncoderKind::FastEmbed => {
            return Err(SearchError::Configuration(format!(
                "{space} encoder {:?} needs the `fastembed` feature",
                config.model
            )))
        }
    };
    tracing::debug!(%space, encoder = encoder.name(), dimension = encoder.dimension(), "encoder ready");
    Ok(encoder)
}
