use std::collections::{BTreeMap, HashMap};

use crate::post::{Corpus, PostId};
use crate::tokenizer::analyze;

/// Sparse term counts, sorted by term id.
type CountVector = Vec<(u32, f32)>;

/// Bag-of-words count vectors over the corpus, scored by cosine.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    vocabulary: HashMap<String, u32>,
    docs: HashMap<PostId, (CountVector, f32)>,
}

fn norm(vector: &CountVector) -> f32 {
    vector.iter().map(|(_, c)| c * c).sum::<f32>().sqrt()
}

impl LexicalIndex {
    pub fn build(corpus: &Corpus) -> Self {
        let mut vocabulary: HashMap<String, u32> = HashMap::new();
        let mut docs = HashMap::with_capacity(corpus.len());
        for post in corpus.posts() {
            let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
            for term in analyze(&post.cleaned_body) {
                let next = vocabulary.len() as u32;
                let id = *vocabulary.entry(term).or_insert(next);
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
            let vector: CountVector = counts.into_iter().collect();
            let n = norm(&vector);
            docs.insert(post.id, (vector, n));
        }
        tracing::info!(posts = docs.len(), terms = vocabulary.len(), "built lexical index");
        Self { vocabulary, docs }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn vectorize_query(&self, query: &str) -> HashMap<u32, f32> {
        let mut counts = HashMap::new();
        for term in analyze(query) {
            if let Some(&id) = self.vocabulary.get(&term) {
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
        }
        counts
    }

    /// Cosine between the query's counts and each candidate's, aligned with
    /// `candidates`. Unknown posts and empty vectors score 0.
    pub fn score(&self, query: &str, candidates: &[PostId]) -> Vec<f32> {
        let q = self.vectorize_query(query);
        let q_norm = q.values().map(|c| c * c).sum::<f32>().sqrt();
        candidates
            .iter()
            .map(|id| match self.docs.get(id) {
                Some((doc, d_norm)) if q_norm > 0.0 && *d_norm > 0.0 => {
                    let dot: f32 = doc.iter().filter_map(|(t, c)| q.get(t).map(|qc| qc * c)).sum();
                    dot / (q_norm * d_norm)
                }
                _ => 0.0,
            })
            .collect()
    }
}
