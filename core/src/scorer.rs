use std::sync::Arc;

use crate::backend::SimilarityBackend;
use crate::embedding::{EmbeddingStore, Space};
use crate::encoder::QueryEncoder;
use crate::error::{SearchError, SearchResult};
use crate::post::{Corpus, PostId};

/// Scores candidates against a query in one embedding space at a time.
pub struct SimilarityScorer {
    corpus: Arc<Corpus>,
    store: Arc<dyn EmbeddingStore>,
    backend: Arc<dyn SimilarityBackend>,
    title_encoder: Box<dyn QueryEncoder>,
    answer_encoder: Box<dyn QueryEncoder>,
    batch_size: usize,
}

impl SimilarityScorer {
    /// Fails when an encoder's output dimension differs from its space in the store.
    pub fn new(
        corpus: Arc<Corpus>,
        store: Arc<dyn EmbeddingStore>,
        backend: Arc<dyn SimilarityBackend>,
        title_encoder: Box<dyn QueryEncoder>,
        answer_encoder: Box<dyn QueryEncoder>,
        batch_size: usize,
    ) -> SearchResult<Self> {
        if batch_size == 0 {
            return Err(SearchError::Configuration("batch_size must be positive".into()));
        }
        for (space, encoder) in [(Space::Title, &title_encoder), (Space::Answer, &answer_encoder)] {
            if encoder.dimension() != store.dimension(space) {
                return Err(SearchError::Configuration(format!(
                    "{space} encoder {} produces {} dims, stored {space} embeddings have {}",
                    encoder.name(),
                    encoder.dimension(),
                    store.dimension(space)
                )));
            }
        }
        Ok(Self { corpus, store, backend, title_encoder, answer_encoder, batch_size })
    }

    pub fn encoder(&self, space: Space) -> &dyn QueryEncoder {
        match space {
            Space::Title => self.title_encoder.as_ref(),
            Space::Answer => self.answer_encoder.as_ref(),
        }
    }

    pub fn backend(&self) -> &dyn SimilarityBackend {
        self.backend.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn encode_query(&self, text: &str, space: Space) -> SearchResult<Vec<f32>> {
        let vector = self.encoder(space).encode(text)?;
        let expected = self.store.dimension(space);
        if vector.len() != expected {
            return Err(SearchError::DimensionMismatch { space, expected, actual: vector.len() });
        }
        Ok(vector)
    }

    /// Post whose vector stands for `post` in `space`. Answers have no title of
    /// their own and use their question's; everything else resolves to itself.
    pub fn embedding_key(&self, post: PostId, space: Space) -> SearchResult<PostId> {
        match space {
            Space::Answer => Ok(post),
            Space::Title => self
                .corpus
                .get(post)
                .map(|p| p.representative_id())
                .ok_or(SearchError::IndexDesynchronization { post, space }),
        }
    }

    /// Similarity of `query` to each candidate, aligned index for index.
    ///
    /// Candidates are processed `batch_size` at a time; the result does not
    /// depend on the batch size.
    pub fn score_batch(&self, query: &[f32], candidates: &[PostId], space: Space) -> SearchResult<Vec<f32>> {
        let expected = self.store.dimension(space);
        if query.len() != expected {
            return Err(SearchError::DimensionMismatch { space, expected, actual: query.len() });
        }
        let mut scores = Vec::with_capacity(candidates.len());
        let mut keys: Vec<&[f32]> = Vec::with_capacity(self.batch_size.min(candidates.len()));
        for chunk in candidates.chunks(self.batch_size) {
            keys.clear();
            for &post in chunk {
                let key = self.embedding_key(post, space)?;
                let vector = self
                    .store
                    .get(key, space)
                    .map_err(|_| SearchError::IndexDesynchronization { post, space })?;
                keys.push(vector);
            }
            scores.extend(self.backend.cosine_batch(query, &keys));
        }
        Ok(scores)
    }

    /// Encodes `text` for `space` and scores the candidates.
    pub fn score_text(&self, text: &str, candidates: &[PostId], space: Space) -> SearchResult<Vec<f32>> {
        let query = self.encode_query(text, space)?;
        self.score_batch(&query, candidates, space)
    }
}
