//! Query pipeline.
//!
//! Every mode runs the same shape: pick a candidate set, score it with a
//! [`CandidateScorer`], order by score, build rows. Hybrid (clustering) mode
//! narrows candidates to the query's topic and collapses the rows to one per
//! thread; the alternate modes rank the whole corpus and keep every row.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::context::EngineContext;
use crate::dedup::dedupe;
use crate::embedding::Space;
use crate::error::{SearchError, SearchResult};
use crate::fusion::{fuse, fuse_with_lexical, order_by_score};
use crate::post::{Post, PostId};
use crate::topic_model::TopicId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Topic candidates, fused answer + title similarity, one row per thread.
    Clustering,
    /// Whole corpus, answer-space similarity.
    Semantic,
    /// Whole corpus, bag-of-words cosine.
    Vector,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Clustering => "clustering",
            SearchMode::Semantic => "semantic",
            SearchMode::Vector => "vector",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clustering" => Ok(SearchMode::Clustering),
            "semantic" => Ok(SearchMode::Semantic),
            "vector" => Ok(SearchMode::Vector),
            other => Err(SearchError::Configuration(format!(
                "search_type must be one of: clustering, semantic, vector (got {other:?})"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub post: Post,
    /// Score the row was ranked by.
    pub similarity: f32,
}

/// Produces one score per candidate, aligned with the candidate slice.
pub trait CandidateScorer {
    fn score(&self, ctx: &EngineContext, query: &str, candidates: &[PostId]) -> SearchResult<Vec<f32>>;
}

/// Weighted answer + title similarity, plus lexical when its weight is non-zero.
pub struct HybridScorer;

impl CandidateScorer for HybridScorer {
    fn score(&self, ctx: &EngineContext, query: &str, candidates: &[PostId]) -> SearchResult<Vec<f32>> {
        let sim_answer = ctx.scorer.score_text(query, candidates, Space::Answer)?;
        let sim_title = ctx.scorer.score_text(query, candidates, Space::Title)?;
        if ctx.weights.uses_lexical() {
            let sim_lexical = ctx.lexical.score(query, candidates);
            fuse_with_lexical(&sim_answer, &sim_title, &sim_lexical, &ctx.weights)
        } else {
            fuse(&sim_answer, &sim_title, &ctx.weights)
        }
    }
}

/// Answer-space similarity alone.
pub struct AnswerScorer;

impl CandidateScorer for AnswerScorer {
    fn score(&self, ctx: &EngineContext, query: &str, candidates: &[PostId]) -> SearchResult<Vec<f32>> {
        ctx.scorer.score_text(query, candidates, Space::Answer)
    }
}

/// Count-vector cosine.
pub struct LexicalScorer;

impl CandidateScorer for LexicalScorer {
    fn score(&self, ctx: &EngineContext, query: &str, candidates: &[PostId]) -> SearchResult<Vec<f32>> {
        Ok(ctx.lexical.score(query, candidates))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsLoaded {
    pub title_encoder: String,
    pub answer_encoder: String,
    pub topic_model: bool,
    pub vectorizer: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingStats {
    pub title_embeddings: usize,
    pub title_dimension: usize,
    pub answer_embeddings: usize,
    pub answer_dimension: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryCounters {
    pub served: u64,
    pub failed: u64,
    pub empty_topic: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_posts: usize,
    pub total_questions: usize,
    pub total_topics: usize,
    pub populated_topics: usize,
    pub avg_posts_per_topic: f64,
    pub topic_sizes: BTreeMap<TopicId, usize>,
    pub embeddings: EmbeddingStats,
    pub models_loaded: ModelsLoaded,
    pub backend: &'static str,
    pub accelerated: bool,
    pub vectorizer_vocabulary: usize,
    pub lexical_vocabulary: usize,
    pub queries: QueryCounters,
}

#[derive(Default)]
struct Counters {
    served: AtomicU64,
    failed: AtomicU64,
    empty_topic: AtomicU64,
}

pub struct SearchEngine {
    ctx: EngineContext,
    counters: Counters,
}

impl SearchEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx, counters: Counters::default() }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Scores `candidates` and returns their rows from best to worst.
    fn rank(
        &self,
        query: &str,
        candidates: &[PostId],
        scorer: &dyn CandidateScorer,
    ) -> SearchResult<Vec<SearchHit>> {
        let scores = scorer.score(&self.ctx, query, candidates)?;
        if scores.len() != candidates.len() {
            return Err(SearchError::LengthMismatch { left: candidates.len(), right: scores.len() });
        }
        order_by_score(&scores)
            .into_iter()
            .map(|i| {
                let post = candidates[i];
                self.ctx
                    .corpus
                    .get(post)
                    .map(|p| SearchHit { post: p.clone(), similarity: scores[i] })
                    .ok_or(SearchError::IndexDesynchronization { post, space: Space::Answer })
            })
            .collect()
    }

    fn record<T>(&self, mode: SearchMode, candidates: usize, start: Instant, result: &SearchResult<Vec<T>>) {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(rows) => {
                self.counters.served.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%mode, candidates, rows = rows.len(), elapsed_ms, "query served");
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%mode, candidates, elapsed_ms, error = %err, "query failed");
            }
        }
    }

    /// Hybrid search: topic candidates, fused similarity, one row per thread.
    pub fn search(&self, query: &str, top_n: Option<usize>) -> SearchResult<Vec<SearchHit>> {
        let start = Instant::now();
        let topic = self.ctx.topics.topic_for_query(query);
        let candidates = self.ctx.topics.candidates_for_topic(topic);
        if candidates.is_empty() {
            self.counters.empty_topic.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(topic, "query topic has no members");
            let result = Ok(Vec::new());
            self.record::<SearchHit>(SearchMode::Clustering, 0, start, &result);
            return result;
        }
        let result = self
            .rank(query, candidates, &HybridScorer)
            .map(|ranked| dedupe(ranked, top_n, |hit| &hit.post));
        self.record(SearchMode::Clustering, candidates.len(), start, &result);
        result
    }

    /// Answer-space similarity over the whole corpus, no thread collapsing.
    pub fn semantic_search(&self, query: &str, top_n: usize) -> SearchResult<Vec<SearchHit>> {
        self.full_corpus(SearchMode::Semantic, query, top_n, &AnswerScorer)
    }

    /// Bag-of-words cosine over the whole corpus, no thread collapsing.
    pub fn vector_search(&self, query: &str, top_n: usize) -> SearchResult<Vec<SearchHit>> {
        self.full_corpus(SearchMode::Vector, query, top_n, &LexicalScorer)
    }

    fn full_corpus(
        &self,
        mode: SearchMode,
        query: &str,
        top_n: usize,
        scorer: &dyn CandidateScorer,
    ) -> SearchResult<Vec<SearchHit>> {
        let start = Instant::now();
        let candidates = self.ctx.corpus.ids();
        let result = self.rank(query, &candidates, scorer).map(|mut ranked| {
            ranked.truncate(top_n);
            ranked
        });
        self.record(mode, candidates.len(), start, &result);
        result
    }

    /// Dispatches on `mode`. Alternate modes fall back to the configured
    /// default result count when `top_n` is absent; hybrid mode returns every thread.
    pub fn search_mode(&self, mode: SearchMode, query: &str, top_n: Option<usize>) -> SearchResult<Vec<SearchHit>> {
        let default_top_n = self.ctx.config.default_top_n;
        match mode {
            SearchMode::Clustering => self.search(query, top_n),
            SearchMode::Semantic => self.semantic_search(query, top_n.unwrap_or(default_top_n)),
            SearchMode::Vector => self.vector_search(query, top_n.unwrap_or(default_top_n)),
        }
    }

    /// `None` when no post has this id.
    pub fn get_post_by_id(&self, id: PostId) -> Option<&Post> {
        self.ctx.corpus.get(id)
    }

    pub fn topics_for_post(&self, id: PostId) -> Vec<TopicId> {
        self.ctx.topics.topics_for_post(id)
    }

    pub fn get_stats(&self) -> EngineStats {
        let ctx = &self.ctx;
        let topic_sizes = ctx.topics.topic_sizes();
        let populated = topic_sizes.len();
        let avg = if populated == 0 {
            0.0
        } else {
            topic_sizes.values().sum::<usize>() as f64 / populated as f64
        };
        let backend = ctx.scorer.backend();
        EngineStats {
            total_posts: ctx.corpus.len(),
            total_questions: ctx.corpus.questions().count(),
            total_topics: ctx.topics.num_topics(),
            populated_topics: populated,
            avg_posts_per_topic: avg,
            topic_sizes,
            embeddings: EmbeddingStats {
                title_embeddings: ctx.store.len(Space::Title),
                title_dimension: ctx.store.dimension(Space::Title),
                answer_embeddings: ctx.store.len(Space::Answer),
                answer_dimension: ctx.store.dimension(Space::Answer),
            },
            models_loaded: ModelsLoaded {
                title_encoder: ctx.scorer.encoder(Space::Title).name().to_string(),
                answer_encoder: ctx.scorer.encoder(Space::Answer).name().to_string(),
                topic_model: ctx.topics.num_topics() > 0,
                vectorizer: ctx.topics.vocabulary_size() > 0,
            },
            backend: backend.name(),
            accelerated: backend.accelerated(),
            vectorizer_vocabulary: ctx.topics.vocabulary_size(),
            lexical_vocabulary: ctx.lexical.vocabulary_size(),
            queries: QueryCounters {
                served: self.counters.served.load(Ordering::Relaxed),
                failed: self.counters.failed.load(Ordering::Relaxed),
                empty_topic: self.counters.empty_topic.load(Ordering::Relaxed),
            },
        }
    }
}
