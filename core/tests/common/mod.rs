#![allow(dead_code)]

use qasearch_core::backend::ScalarBackend;
use qasearch_core::context::ContextParts;
use qasearch_core::embedding::EmbeddingTable;
use qasearch_core::encoder::QueryEncoder;
use qasearch_core::topic_index::TopicIndex;
use qasearch_core::topic_model::TopicModel;
use qasearch_core::vectorizer::{SparseVector, TfidfVectorizer};
use qasearch_core::{
    Corpus, EngineContext, InMemoryEmbeddingStore, Post, PostId, SearchConfig, SearchEngine, SearchResult,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const QUERY: &str = "rust ownership";

pub fn post(id: PostId, parent_id: Option<PostId>, cleaned_body: &str) -> Post {
    Post {
        id,
        parent_id,
        title: if parent_id.is_none() { format!("Question {id}") } else { String::new() },
        body: format!("<p>{cleaned_body}</p>"),
        cleaned_body: cleaned_body.to_string(),
        score: 0.0,
        creation_date: None,
    }
}

/// Topic distribution chosen by the first vocabulary term in the text.
pub struct KeywordTopics;

pub fn vocabulary() -> Vec<String> {
    vec!["rust".into(), "haskell".into()]
}

impl TopicModel for KeywordTopics {
    fn num_topics(&self) -> usize {
        5
    }

    fn transform(&self, doc: &SparseVector) -> Vec<f64> {
        match doc.indices.first() {
            Some(0) => vec![0.6, 0.2, 0.1, 0.05, 0.05],
            Some(_) => vec![0.0, 0.0, 0.0, 0.1, 0.9],
            None => vec![0.2; 5],
        }
    }
}

/// Looks the query up in a fixed table; unknown text encodes to zeros.
pub struct FixedEncoder {
    pub dimension: usize,
    pub vectors: HashMap<String, Vec<f32>>,
}

impl FixedEncoder {
    pub fn new(dimension: usize, entries: &[(&str, Vec<f32>)]) -> Self {
        let vectors = entries.iter().map(|(q, v)| (q.to_string(), v.clone())).collect();
        Self { dimension, vectors }
    }
}

impl QueryEncoder for FixedEncoder {
    fn encode(&self, text: &str) -> SearchResult<Vec<f32>> {
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0; self.dimension]))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

pub fn unit(c: f32) -> Vec<f32> {
    vec![c, (1.0 - c * c).sqrt()]
}

/// Q1=1 (A1=2), Q2=3 (A2=4, A3=5). Answer-space similarity to `QUERY`
/// ranks the posts 2, 4, 1, 5, 3; both titles match the query equally.
pub fn thread_corpus() -> Vec<Post> {
    vec![
        post(1, None, "rust ownership question"),
        post(2, Some(1), "rust answer about moves"),
        post(3, None, "rust lifetimes question"),
        post(4, Some(3), "rust answer about borrows"),
        post(5, Some(3), "rust answer about references"),
    ]
}

pub fn answer_vectors() -> Vec<(PostId, Vec<f32>)> {
    vec![(1, unit(0.5)), (2, unit(0.9)), (3, unit(0.1)), (4, unit(0.7)), (5, unit(0.3))]
}

pub fn title_vectors() -> Vec<(PostId, Vec<f32>)> {
    vec![(1, vec![1.0, 0.0]), (3, vec![1.0, 0.0])]
}

pub fn table(rows: &[(PostId, Vec<f32>)]) -> EmbeddingTable {
    let mut t = EmbeddingTable::new(2);
    for (id, v) in rows {
        t.push(*id, v).unwrap();
    }
    t
}

pub fn engine_with(
    config: SearchConfig,
    posts: Vec<Post>,
    answers: &[(PostId, Vec<f32>)],
    titles: &[(PostId, Vec<f32>)],
) -> SearchEngine {
    let corpus = Arc::new(Corpus::new(posts).unwrap());
    let store = Arc::new(InMemoryEmbeddingStore::new(table(titles), table(answers)).unwrap());
    let topics = TopicIndex::build(
        Box::new(KeywordTopics),
        Box::new(TfidfVectorizer::counts(vocabulary()).unwrap()),
        &corpus,
    );
    let query_vector = vec![1.0, 0.0];
    let parts = ContextParts {
        corpus,
        store,
        topics,
        title_encoder: Box::new(FixedEncoder::new(2, &[(QUERY, query_vector.clone())])),
        answer_encoder: Box::new(FixedEncoder::new(2, &[(QUERY, query_vector)])),
        backend: Arc::new(ScalarBackend),
    };
    SearchEngine::new(EngineContext::from_parts(config, parts).unwrap())
}

pub fn thread_engine() -> SearchEngine {
    engine_with(SearchConfig::default(), thread_corpus(), &answer_vectors(), &title_vectors())
}

pub fn ids<T>(rows: &[T], id_of: impl Fn(&T) -> PostId) -> Vec<PostId> {
    rows.iter().map(id_of).collect()
}
