use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::Space;
use crate::post::PostId;

pub type SearchResult<T> = Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("corrupt artifact {}: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("no {space} embedding for post {post}")]
    MissingEmbedding { post: PostId, space: Space },

    #[error("index out of sync: candidate post {post} has no {space} embedding")]
    IndexDesynchronization { post: PostId, space: Space },

    #[error("{space} space expects vectors of dimension {expected}, got {actual}")]
    DimensionMismatch { space: Space, expected: usize, actual: usize },

    #[error("score arrays differ in length: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SearchError::CorruptArtifact { path: path.into(), reason: reason.into() }
    }

    /// Whether this failure belongs to a single query rather than to engine startup.
    pub fn is_query_scoped(&self) -> bool {
        matches!(
            self,
            SearchError::IndexDesynchronization { .. }
                | SearchError::MissingEmbedding { .. }
                | SearchError::DimensionMismatch { .. }
                | SearchError::LengthMismatch { .. }
                | SearchError::Encoder(_)
        )
    }
}
