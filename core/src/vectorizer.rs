use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{SearchError, SearchResult};
use crate::tokenizer::vectorizer_tokens;

/// Sparse term-weight vector with strictly ascending column indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f64>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

/// Turns raw text into the feature space a topic model was fitted on.
pub trait TextVectorizer: Send + Sync {
    fn transform(&self, text: &str) -> SparseVector;
    fn vocabulary_size(&self) -> usize;
}

/// Count or tf-idf vectorizer restored from a pretrained vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, u32>,
    /// Per-column idf; `None` means raw counts.
    idf: Option<Vec<f64>>,
    l2_norm: bool,
}

impl TfidfVectorizer {
    /// `terms` lists the vocabulary in column order.
    pub fn new(terms: Vec<String>, idf: Option<Vec<f64>>, l2_norm: bool) -> SearchResult<Self> {
        if let Some(idf) = &idf {
            if idf.len() != terms.len() {
                return Err(SearchError::Configuration(format!(
                    "idf has {} entries for a vocabulary of {}",
                    idf.len(),
                    terms.len()
                )));
            }
        }
        let mut vocabulary = HashMap::with_capacity(terms.len());
        for (column, term) in terms.into_iter().enumerate() {
            if vocabulary.insert(term.clone(), column as u32).is_some() {
                return Err(SearchError::Configuration(format!("duplicate vocabulary term {term:?}")));
            }
        }
        Ok(Self { vocabulary, idf, l2_norm })
    }

    pub fn counts(vocabulary: Vec<String>) -> SearchResult<Self> {
        Self::new(vocabulary, None, false)
    }
}

impl TextVectorizer for TfidfVectorizer {
    fn transform(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<u32, f64> = BTreeMap::new();
        for token in vectorizer_tokens(text) {
            if let Some(&column) = self.vocabulary.get(&token) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }
        let mut vector = SparseVector {
            indices: Vec::with_capacity(counts.len()),
            values: Vec::with_capacity(counts.len()),
        };
        for (column, count) in counts {
            let weight = match &self.idf {
                Some(idf) => count * idf[column as usize],
                None => count,
            };
            vector.indices.push(column);
            vector.values.push(weight);
        }
        if self.l2_norm {
            let norm = vector.values.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                vector.values.iter_mut().for_each(|v| *v /= norm);
            }
        }
        vector
    }

    fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }
}
