//! Hybrid ranking for question/answer corpora.
//!
//! A query is routed to one latent topic, the topic's member posts are scored
//! in two embedding spaces (answer body and question title), the scores are
//! fused with configured weights and the ranked list is collapsed to one row
//! per question thread.

pub mod backend;
pub mod config;
pub mod context;
pub mod dedup;
pub mod embedding;
pub mod encoder;
pub mod error;
pub mod fusion;
pub mod lexical;
pub mod persist;
pub mod post;
pub mod scorer;
pub mod search;
pub mod tokenizer;
pub mod topic_index;
pub mod topic_model;
pub mod vectorizer;

pub use config::SearchConfig;
pub use context::EngineContext;
pub use embedding::{EmbeddingStore, InMemoryEmbeddingStore, Space};
pub use error::{SearchError, SearchResult};
pub use fusion::FusionWeights;
pub use post::{Corpus, Post, PostId};
pub use search::{EngineStats, SearchEngine, SearchHit, SearchMode};
