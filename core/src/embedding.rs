use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{SearchError, SearchResult};
use crate::post::PostId;

/// The two independent embedding spaces. Vectors from different spaces are never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Space {
    /// Question titles; answers borrow their question's vector.
    Title,
    /// Post bodies.
    Answer,
}

impl Space {
    pub const ALL: [Space; 2] = [Space::Title, Space::Answer];

    pub fn as_str(self) -> &'static str {
        match self {
            Space::Title => "title",
            Space::Answer => "answer",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only (post, space) -> unit vector lookup.
pub trait EmbeddingStore: Send + Sync {
    fn get(&self, post: PostId, space: Space) -> SearchResult<&[f32]>;
    fn dimension(&self, space: Space) -> usize;
    fn len(&self, space: Space) -> usize;

    fn contains(&self, post: PostId, space: Space) -> bool {
        self.get(post, space).is_ok()
    }
}

/// Flat row-major block of same-dimension vectors keyed by post id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingTable {
    pub dimension: usize,
    pub ids: Vec<PostId>,
    pub data: Vec<f32>,
}

impl EmbeddingTable {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, ids: Vec::new(), data: Vec::new() }
    }

    /// Appends one vector; its length must match the table dimension.
    pub fn push(&mut self, post: PostId, vector: &[f32]) -> SearchResult<()> {
        if vector.len() != self.dimension {
            return Err(SearchError::Configuration(format!(
                "vector for post {post} has dimension {}, table expects {}",
                vector.len(),
                self.dimension
            )));
        }
        self.ids.push(post);
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
struct SpaceStore {
    dimension: usize,
    rows: HashMap<PostId, usize>,
    data: Vec<f32>,
}

impl SpaceStore {
    fn from_table(table: EmbeddingTable) -> SearchResult<Self> {
        if table.dimension == 0 || table.data.len() != table.ids.len() * table.dimension {
            return Err(SearchError::Configuration(format!(
                "embedding block of {} values does not hold {} vectors of dimension {}",
                table.data.len(),
                table.ids.len(),
                table.dimension
            )));
        }
        let mut rows = HashMap::with_capacity(table.ids.len());
        for (row, &id) in table.ids.iter().enumerate() {
            if rows.insert(id, row).is_some() {
                return Err(SearchError::Configuration(format!("post {id} embedded twice")));
            }
        }
        Ok(Self { dimension: table.dimension, rows, data: table.data })
    }

    fn row(&self, post: PostId) -> Option<&[f32]> {
        let start = *self.rows.get(&post)? * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }
}

/// Both spaces held in memory for the engine's lifetime.
#[derive(Debug)]
pub struct InMemoryEmbeddingStore {
    title: SpaceStore,
    answer: SpaceStore,
}

impl InMemoryEmbeddingStore {
    pub fn new(title: EmbeddingTable, answer: EmbeddingTable) -> SearchResult<Self> {
        Ok(Self { title: SpaceStore::from_table(title)?, answer: SpaceStore::from_table(answer)? })
    }

    fn space(&self, space: Space) -> &SpaceStore {
        match space {
            Space::Title => &self.title,
            Space::Answer => &self.answer,
        }
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn get(&self, post: PostId, space: Space) -> SearchResult<&[f32]> {
        self.space(space).row(post).ok_or(SearchError::MissingEmbedding { post, space })
    }

    fn dimension(&self, space: Space) -> usize {
        self.space(space).dimension
    }

    fn len(&self, space: Space) -> usize {
        self.space(space).rows.len()
    }
}

/// Scales `vector` to unit length in place. Returns false for a zero vector.
pub fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    vector.iter_mut().for_each(|v| *v /= norm);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(dimension: usize, rows: &[(PostId, &[f32])]) -> EmbeddingTable {
        let mut t = EmbeddingTable::new(dimension);
        for (id, v) in rows {
            t.push(*id, v).unwrap();
        }
        t
    }

    #[test]
    fn spaces_keep_their_own_dimension() {
        let store = InMemoryEmbeddingStore::new(
            table(2, &[(1, &[1.0, 0.0])]),
            table(3, &[(1, &[0.0, 1.0, 0.0]), (2, &[0.0, 0.0, 1.0])]),
        )
        .unwrap();
        assert_eq!(store.dimension(Space::Title), 2);
        assert_eq!(store.dimension(Space::Answer), 3);
        assert_eq!(store.get(2, Space::Answer).unwrap(), &[0.0, 0.0, 1.0]);
        assert_eq!(store.len(Space::Title), 1);
    }

    #[test]
    fn absent_vector_is_missing_embedding() {
        let store = InMemoryEmbeddingStore::new(table(2, &[(1, &[1.0, 0.0])]), table(2, &[])).unwrap();
        let err = store.get(2, Space::Title).unwrap_err();
        assert!(matches!(err, SearchError::MissingEmbedding { post: 2, space: Space::Title }));
        assert!(!store.contains(1, Space::Answer));
    }

    #[test]
    fn push_rejects_wrong_dimension() {
        let mut t = EmbeddingTable::new(3);
        assert!(t.push(1, &[1.0, 0.0]).is_err());
    }

    #[test]
    fn normalize_reports_zero_vectors() {
        let mut v = [3.0, 4.0];
        assert!(normalize(&mut v));
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!(!normalize(&mut [0.0, 0.0]));
    }
}
