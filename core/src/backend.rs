use serde::{Deserialize, Serialize};
use std::sync::Arc;

const COSINE_EPS: f32 = 1e-8;

/// Cosine of two equal-length vectors. Every backend scores through this
/// function, so their outputs agree bit for bit.
#[inline]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    dot / (na.sqrt() * nb.sqrt()).max(COSINE_EPS)
}

/// Batched query-vs-keys cosine similarity.
///
/// Implementations must be reentrant: the engine calls them from many
/// queries at once without locking.
pub trait SimilarityBackend: Send + Sync {
    fn cosine_batch(&self, query: &[f32], keys: &[&[f32]]) -> Vec<f32>;
    fn name(&self) -> &'static str;
    fn accelerated(&self) -> bool;
}

/// Portable single-threaded path.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarBackend;

impl SimilarityBackend for ScalarBackend {
    fn cosine_batch(&self, query: &[f32], keys: &[&[f32]]) -> Vec<f32> {
        keys.iter().map(|key| cosine(query, key)).collect()
    }

    fn name(&self) -> &'static str {
        "scalar"
    }

    fn accelerated(&self) -> bool {
        false
    }
}

/// Splits each batch across the rayon worker pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelBackend;

#[cfg(feature = "parallel")]
impl SimilarityBackend for ParallelBackend {
    fn cosine_batch(&self, query: &[f32], keys: &[&[f32]]) -> Vec<f32> {
        use rayon::prelude::*;
        keys.par_iter().map(|key| cosine(query, key)).collect()
    }

    fn name(&self) -> &'static str {
        "parallel"
    }

    fn accelerated(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Parallel when available, scalar otherwise.
    #[default]
    Auto,
    Scalar,
    Parallel,
}

#[cfg(feature = "parallel")]
fn parallel_available() -> bool {
    rayon::current_num_threads() > 1
}

/// Picks the similarity backend at startup. Requests for the parallel path
/// degrade to the scalar one when it cannot run.
pub fn select_backend(kind: BackendKind) -> Arc<dyn SimilarityBackend> {
    let backend: Arc<dyn SimilarityBackend> = match kind {
        BackendKind::Scalar => Arc::new(ScalarBackend),
        #[cfg(feature = "parallel")]
        BackendKind::Auto | BackendKind::Parallel if parallel_available() => Arc::new(ParallelBackend),
        BackendKind::Auto | BackendKind::Parallel => {
            if kind == BackendKind::Parallel {
                tracing::warn!("parallel similarity backend unavailable, using scalar");
            }
            Arc::new(ScalarBackend)
        }
    };
    tracing::info!(backend = backend.name(), "selected similarity backend");
    backend
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_ignores_magnitude() {
        let s = cosine(&[2.0, 0.0], &[0.6, 0.8]);
        assert!((s - 0.6).abs() < 1e-6);
    }

    #[test]
    fn scalar_backend_keeps_key_order() {
        let keys: Vec<&[f32]> = vec![&[0.0, 1.0], &[1.0, 0.0]];
        assert_eq!(ScalarBackend.cosine_batch(&[1.0, 0.0], &keys), vec![0.0, 1.0]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_scalar_exactly() {
        let rows: Vec<Vec<f32>> = (0..2000)
            .map(|i| {
                let x = i as f32 * 0.37;
                vec![x.sin(), x.cos(), (x * 0.5).sin()]
            })
            .collect();
        let keys: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
        let query = [0.3, -0.2, 0.9];
        assert_eq!(ScalarBackend.cosine_batch(&query, &keys), ParallelBackend.cosine_batch(&query, &keys));
    }

    #[test]
    fn scalar_request_is_honoured() {
        assert_eq!(select_backend(BackendKind::Scalar).name(), "scalar");
    }
}
