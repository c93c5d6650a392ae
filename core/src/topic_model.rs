//! Pretrained topic model inference.
//!
//! The model is fitted elsewhere; this module only restores it and runs the
//! per-document variational E-step of online LDA to get topic proportions.

use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};
use crate::vectorizer::{SparseVector, TfidfVectorizer};

pub type TopicId = u32;

/// Maps a vectorized document to a probability per topic.
pub trait TopicModel: Send + Sync {
    fn num_topics(&self) -> usize;

    /// Topic proportions for `doc`; the result has `num_topics()` entries summing to 1.
    fn transform(&self, doc: &SparseVector) -> Vec<f64>;
}

const DEFAULT_MAX_DOC_UPDATE_ITER: usize = 100;
const DEFAULT_MEAN_CHANGE_TOL: f64 = 1e-3;

/// Exported form of a fitted LDA model together with its vectorizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicModelArtifact {
    /// Vectorizer vocabulary in column order.
    pub vocabulary: Vec<String>,
    #[serde(default)]
    pub idf: Option<Vec<f64>>,
    #[serde(default)]
    pub l2_norm: bool,
    /// Topic-word pseudo-counts, one row per topic.
    pub components: Vec<Vec<f64>>,
    pub doc_topic_prior: f64,
    #[serde(default = "default_max_iter")]
    pub max_doc_update_iter: usize,
    #[serde(default = "default_tol")]
    pub mean_change_tol: f64,
}

fn default_max_iter() -> usize {
    DEFAULT_MAX_DOC_UPDATE_ITER
}

fn default_tol() -> f64 {
    DEFAULT_MEAN_CHANGE_TOL
}

impl TopicModelArtifact {
    pub fn into_parts(self) -> SearchResult<(TfidfVectorizer, LdaModel)> {
        let n_terms = self.vocabulary.len();
        if let Some(row) = self.components.iter().position(|r| r.len() != n_terms) {
            return Err(SearchError::Configuration(format!(
                "topic {row} has {} term weights, vocabulary has {n_terms}",
                self.components[row].len()
            )));
        }
        let vectorizer = TfidfVectorizer::new(self.vocabulary, self.idf, self.l2_norm)?;
        let model = LdaModel::new(
            self.components,
            self.doc_topic_prior,
            self.max_doc_update_iter,
            self.mean_change_tol,
        )?;
        Ok((vectorizer, model))
    }
}

#[derive(Debug, Clone)]
pub struct LdaModel {
    /// exp(E[log beta]) per topic, per term.
    exp_topic_word: Vec<Vec<f64>>,
    doc_topic_prior: f64,
    max_iter: usize,
    tol: f64,
}

impl LdaModel {
    pub fn new(
        components: Vec<Vec<f64>>,
        doc_topic_prior: f64,
        max_iter: usize,
        tol: f64,
    ) -> SearchResult<Self> {
        if components.is_empty() {
            return Err(SearchError::Configuration("topic model has no topics".into()));
        }
        if !doc_topic_prior.is_finite() || doc_topic_prior <= 0.0 {
            return Err(SearchError::Configuration(format!(
                "doc_topic_prior must be positive, got {doc_topic_prior}"
            )));
        }
        if components.iter().flatten().any(|&w| !w.is_finite() || w <= 0.0) {
            return Err(SearchError::Configuration(
                "topic-word pseudo-counts must be positive and finite".into(),
            ));
        }
        let exp_topic_word = components
            .iter()
            .map(|row| {
                let total = digamma(row.iter().sum());
                row.iter().map(|&w| (digamma(w) - total).exp()).collect()
            })
            .collect();
        Ok(Self { exp_topic_word, doc_topic_prior, max_iter: max_iter.max(1), tol })
    }

    fn exp_dirichlet_expectation(gamma: &[f64]) -> Vec<f64> {
        let total = digamma(gamma.iter().sum());
        gamma.iter().map(|&g| (digamma(g) - total).exp()).collect()
    }
}

impl TopicModel for LdaModel {
    fn num_topics(&self) -> usize {
        self.exp_topic_word.len()
    }

    fn transform(&self, doc: &SparseVector) -> Vec<f64> {
        let k = self.num_topics();
        let mut gamma = vec![1.0; k];
        let words: Vec<(usize, f64)> = doc
            .iter()
            .map(|(col, cnt)| (col as usize, cnt))
            .filter(|&(col, cnt)| cnt != 0.0 && col < self.exp_topic_word[0].len())
            .collect();

        if !words.is_empty() {
            let mut exp_doc_topic = Self::exp_dirichlet_expectation(&gamma);
            let mut norm_phi = vec![0.0; words.len()];
            for _ in 0..self.max_iter {
                for (slot, &(col, _)) in norm_phi.iter_mut().zip(&words) {
                    *slot = (0..k).map(|t| exp_doc_topic[t] * self.exp_topic_word[t][col]).sum::<f64>()
                        + f64::EPSILON;
                }
                let mut next = vec![0.0; k];
                for (t, slot) in next.iter_mut().enumerate() {
                    let dot: f64 = words
                        .iter()
                        .zip(&norm_phi)
                        .map(|(&(col, cnt), &phi)| cnt / phi * self.exp_topic_word[t][col])
                        .sum();
                    *slot = exp_doc_topic[t] * dot + self.doc_topic_prior;
                }
                exp_doc_topic = Self::exp_dirichlet_expectation(&next);
                let change = gamma.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum::<f64>() / k as f64;
                gamma = next;
                if change < self.tol {
                    break;
                }
            }
        }

        let total: f64 = gamma.iter().sum();
        gamma.iter_mut().for_each(|g| *g /= total);
        gamma
    }
}

/// Digamma via upward recurrence then the asymptotic series.
fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result + x.ln() - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 * (1.0 / 240.0 - inv2 / 132.0))))
}

/// Index of the largest value; the lowest index wins ties.
pub fn first_argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b || v.is_nan() => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
