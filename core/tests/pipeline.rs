mod common;

use common::*;
use qasearch_core::fusion::FusionWeights;
use qasearch_core::{SearchConfig, SearchError, SearchMode, Space};
use std::collections::HashSet;

#[test]
fn hybrid_search_keeps_best_row_per_thread() {
    let engine = thread_engine();
    let hits = engine.search(QUERY, None).unwrap();
    assert_eq!(ids(&hits, |h| h.post.id), vec![2, 4]);

    let hits = engine.search(QUERY, Some(5)).unwrap();
    assert_eq!(ids(&hits, |h| h.post.id), vec![2, 4]);

    let hits = engine.search(QUERY, Some(1)).unwrap();
    assert_eq!(ids(&hits, |h| h.post.id), vec![2]);
}

#[test]
fn fused_order_before_dedup_follows_answer_similarity() {
    // Title similarity is 1.0 for every post, so fusion preserves the answer ranking.
    let engine = thread_engine();
    let ctx = engine.context();
    let candidates = ctx.topics().candidates_for_topic(ctx.topics().topic_for_query(QUERY)).to_vec();
    assert_eq!(candidates, vec![1, 2, 3, 4, 5]);

    let q = ctx.scorer().encode_query(QUERY, Space::Answer).unwrap();
    let answer = ctx.scorer().score_batch(&q, &candidates, Space::Answer).unwrap();
    let title = ctx.scorer().score_batch(&q, &candidates, Space::Title).unwrap();
    assert!(title.iter().all(|&t| (t - 1.0).abs() < 1e-6));

    let fused = qasearch_core::fusion::fuse(&answer, &title, &ctx.weights()).unwrap();
    let order: Vec<_> = qasearch_core::fusion::order_by_score(&fused).into_iter().map(|i| candidates[i]).collect();
    assert_eq!(order, vec![2, 4, 1, 5, 3]);
}

#[test]
fn repeated_queries_return_identical_rows() {
    let engine = thread_engine();
    let first = engine.search(QUERY, None).unwrap();
    let second = engine.search(QUERY, None).unwrap();
    assert_eq!(ids(&first, |h| h.post.id), ids(&second, |h| h.post.id));
    let a: Vec<f32> = first.iter().map(|h| h.similarity).collect();
    let b: Vec<f32> = second.iter().map(|h| h.similarity).collect();
    assert_eq!(a, b);
}

#[test]
fn rows_never_share_a_thread_and_scores_never_rise() {
    let engine = thread_engine();
    let hits = engine.search(QUERY, None).unwrap();
    let mut threads = HashSet::new();
    for hit in &hits {
        assert!(threads.insert(hit.post.representative_id()));
    }
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[test]
fn topic_without_members_gives_empty_result() {
    let engine = thread_engine();
    let hits = engine.search("haskell monads", Some(10)).unwrap();
    assert!(hits.is_empty());
    assert_eq!(engine.get_stats().queries.empty_topic, 1);
}

#[test]
fn answers_inherit_their_question_title_score() {
    let engine = thread_engine();
    let scorer = engine.context().scorer();
    let query = [0.6, 0.8];
    let question = scorer.score_batch(&query, &[1], Space::Title).unwrap();
    let answer = scorer.score_batch(&query, &[2], Space::Title).unwrap();
    assert!((question[0] - 0.6).abs() < 1e-6);
    assert_eq!(question, answer);
    assert_eq!(scorer.embedding_key(2, Space::Title).unwrap(), 1);
    assert_eq!(scorer.embedding_key(3, Space::Title).unwrap(), 3);
    assert_eq!(scorer.embedding_key(2, Space::Answer).unwrap(), 2);
}

#[test]
fn candidate_without_embedding_fails_the_query() {
    let answers: Vec<_> = answer_vectors().into_iter().filter(|(id, _)| *id != 5).collect();
    let engine = engine_with(SearchConfig::default(), thread_corpus(), &answers, &title_vectors());
    let err = engine.search(QUERY, None).unwrap_err();
    assert!(matches!(err, SearchError::IndexDesynchronization { post: 5, space: Space::Answer }));
    assert_eq!(engine.get_stats().queries.failed, 1);

    // The engine keeps serving other queries.
    assert!(engine.search("haskell", None).unwrap().is_empty());
}

#[test]
fn question_without_title_embedding_fails_title_scoring() {
    let titles: Vec<_> = title_vectors().into_iter().filter(|(id, _)| *id != 3).collect();
    let engine = engine_with(SearchConfig::default(), thread_corpus(), &answer_vectors(), &titles);
    let err = engine.search(QUERY, None).unwrap_err();
    // Post 3 is the first candidate whose thread lacks a title vector.
    assert!(matches!(err, SearchError::IndexDesynchronization { post: 3, space: Space::Title }));
}

#[test]
fn alternate_modes_rank_the_whole_corpus_without_dedup() {
    let engine = thread_engine();
    let semantic = engine.semantic_search(QUERY, 10).unwrap();
    assert_eq!(ids(&semantic, |h| h.post.id), vec![2, 4, 1, 5, 3]);

    let semantic = engine.semantic_search(QUERY, 3).unwrap();
    assert_eq!(ids(&semantic, |h| h.post.id), vec![2, 4, 1]);

    let lexical = engine.vector_search("lifetimes", 10).unwrap();
    assert_eq!(lexical.len(), 5);
    assert_eq!(lexical[0].post.id, 3);
    assert!(lexical[1..].iter().all(|h| h.similarity == 0.0));
}

#[test]
fn search_mode_applies_default_top_n_to_alternate_modes() {
    let config = SearchConfig { default_top_n: 2, ..SearchConfig::default() };
    let engine = engine_with(config, thread_corpus(), &answer_vectors(), &title_vectors());
    assert_eq!(engine.search_mode(SearchMode::Semantic, QUERY, None).unwrap().len(), 2);
    assert_eq!(engine.search_mode(SearchMode::Semantic, QUERY, Some(4)).unwrap().len(), 4);
    assert_eq!(engine.search_mode(SearchMode::Clustering, QUERY, None).unwrap().len(), 2);
}

#[test]
fn lexical_weight_can_reorder_threads() {
    // With lexical weight dominant, the thread mentioning "lifetimes" wins.
    let config = SearchConfig { coeff1: 0.01, coeff2: 10.0, coeff3: 0.01, ..SearchConfig::default() };
    let engine = engine_with(config, thread_corpus(), &answer_vectors(), &title_vectors());
    let weights = engine.context().weights();
    assert!(weights.uses_lexical());
    let hits = engine.search("rust lifetimes question", None).unwrap();
    assert_eq!(hits[0].post.id, 3);
}

#[test]
fn weights_come_from_config_normalized() {
    let config = SearchConfig { coeff1: 0.4, coeff2: 0.2, coeff3: 0.6, ..SearchConfig::default() };
    let engine = engine_with(config, thread_corpus(), &answer_vectors(), &title_vectors());
    let w = engine.context().weights();
    assert_eq!(w, FusionWeights::new(0.4, 0.2, 0.6).unwrap());
    assert!((w.answer + w.lexical + w.title - 1.0).abs() < 1e-6);
}

#[test]
fn post_lookup_reports_missing_ids_as_none() {
    let engine = thread_engine();
    assert_eq!(engine.get_post_by_id(4).unwrap().parent_id, Some(3));
    assert!(engine.get_post_by_id(404).is_none());
    assert_eq!(engine.topics_for_post(1), vec![0, 1, 2]);
}

#[test]
fn stats_describe_the_loaded_engine() {
    let engine = thread_engine();
    engine.search(QUERY, None).unwrap();
    let stats = engine.get_stats();
    assert_eq!(stats.total_posts, 5);
    assert_eq!(stats.total_questions, 2);
    assert_eq!(stats.total_topics, 5);
    assert_eq!(stats.populated_topics, 3);
    assert_eq!(stats.embeddings.title_embeddings, 2);
    assert_eq!(stats.embeddings.answer_dimension, 2);
    assert_eq!(stats.backend, "scalar");
    assert_eq!(stats.queries.served, 1);
}
