//! Immutable reference data shared by every query.
//!
//! An [`EngineContext`] is assembled once, either from an artifact directory
//! or from parts supplied by the caller, and fails as a whole: there is no
//! partially loaded state to serve from.

use std::sync::Arc;
use std::time::Instant;

use crate::backend::{select_backend, SimilarityBackend};
use crate::config::SearchConfig;
use crate::embedding::{EmbeddingStore, InMemoryEmbeddingStore, Space};
use crate::encoder::{build_encoder, QueryEncoder};
use crate::error::{SearchError, SearchResult};
use crate::fusion::FusionWeights;
use crate::lexical::LexicalIndex;
use crate::persist::{
    load_embeddings, load_meta, load_posts, load_topic_model, load_topic_table, ArtifactPaths,
};
use crate::post::Corpus;
use crate::scorer::SimilarityScorer;
use crate::topic_index::TopicIndex;

/// Everything a context is made of, for callers that build the pieces themselves.
pub struct ContextParts {
    pub corpus: Arc<Corpus>,
    pub store: Arc<dyn EmbeddingStore>,
    pub topics: TopicIndex,
    pub title_encoder: Box<dyn QueryEncoder>,
    pub answer_encoder: Box<dyn QueryEncoder>,
    pub backend: Arc<dyn SimilarityBackend>,
}

pub struct EngineContext {
    pub(crate) config: SearchConfig,
    pub(crate) weights: FusionWeights,
    pub(crate) corpus: Arc<Corpus>,
    pub(crate) store: Arc<dyn EmbeddingStore>,
    pub(crate) topics: TopicIndex,
    pub(crate) scorer: SimilarityScorer,
    pub(crate) lexical: LexicalIndex,
}

impl EngineContext {
    pub fn from_parts(config: SearchConfig, parts: ContextParts) -> SearchResult<Self> {
        config.validate()?;
        let weights = config.weights()?;
        let ContextParts { corpus, store, topics, title_encoder, answer_encoder, backend } = parts;
        let scorer = SimilarityScorer::new(
            Arc::clone(&corpus),
            Arc::clone(&store),
            backend,
            title_encoder,
            answer_encoder,
            config.batch_size,
        )?;
        let lexical = LexicalIndex::build(&corpus);
        report_coverage(&corpus, store.as_ref());
        Ok(Self { config, weights, corpus, store, topics, scorer, lexical })
    }

    /// Loads every artifact under `config.data_path`.
    pub fn load(config: SearchConfig) -> SearchResult<Self> {
        let start = Instant::now();
        config.validate()?;
        let paths = ArtifactPaths::new(&config.data_path);
        let meta = load_meta(&paths)?;

        let corpus = Arc::new(Corpus::new(load_posts(&paths)?)?);
        if corpus.len() != meta.num_posts {
            return Err(SearchError::corrupt(
                paths.posts(),
                format!("holds {} posts, meta.json records {}", corpus.len(), meta.num_posts),
            ));
        }

        let title = load_embeddings(&paths, Space::Title)?;
        let answer = load_embeddings(&paths, Space::Answer)?;
        for (space, table, recorded) in [
            (Space::Title, &title, meta.title_dimension),
            (Space::Answer, &answer, meta.answer_dimension),
        ] {
            if table.dimension != recorded {
                return Err(SearchError::corrupt(
                    paths.embeddings(space),
                    format!("dimension {} differs from meta.json ({recorded})", table.dimension),
                ));
            }
        }
        let store: Arc<dyn EmbeddingStore> = Arc::new(
            InMemoryEmbeddingStore::new(title, answer)
                .map_err(|e| SearchError::corrupt(&paths.root, e.to_string()))?,
        );

        let (vectorizer, model) = load_topic_model(&paths)?
            .into_parts()
            .map_err(|e| SearchError::corrupt(paths.topic_model(), e.to_string()))?;
        let topics = TopicIndex::from_parts(
            Box::new(model),
            Box::new(vectorizer),
            load_topic_table(&paths)?,
            &corpus,
            &paths.topic_index(),
        )?;

        let parts = ContextParts {
            corpus,
            store,
            topics,
            title_encoder: build_encoder(&config.title_encoder, Space::Title)?,
            answer_encoder: build_encoder(&config.answer_encoder, Space::Answer)?,
            backend: select_backend(config.backend),
        };
        let context = Self::from_parts(config, parts)?;
        tracing::info!(
            posts = context.corpus.len(),
            topics = context.topics.num_topics(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            data = %context.config.data_path.display(),
            "engine context loaded"
        );
        Ok(context)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn topics(&self) -> &TopicIndex {
        &self.topics
    }

    pub fn scorer(&self) -> &SimilarityScorer {
        &self.scorer
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        tracing::debug!(posts = self.corpus.len(), "engine context released");
    }
}

fn report_coverage(corpus: &Corpus, store: &dyn EmbeddingStore) {
    let no_answer = corpus.posts().iter().filter(|p| !store.contains(p.id, Space::Answer)).count();
    let no_title = corpus.questions().filter(|p| !store.contains(p.id, Space::Title)).count();
    if no_answer > 0 || no_title > 0 {
        tracing::warn!(
            posts_without_answer_embedding = no_answer,
            questions_without_title_embedding = no_title,
            "embedding coverage is incomplete; queries touching these posts will fail"
        );
    }
}
