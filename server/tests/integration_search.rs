use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use qasearch_core::embedding::{normalize, EmbeddingTable};
use qasearch_core::encoder::build_encoder;
use qasearch_core::persist::{
    save_embeddings, save_meta, save_posts, save_topic_model, save_topic_table, ArtifactPaths, MetaFile,
    ARTIFACT_VERSION,
};
use qasearch_core::topic_index::TopicIndex;
use qasearch_core::topic_model::TopicModelArtifact;
use qasearch_core::{Corpus, Post, PostId, SearchConfig, Space};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tower::ServiceExt;

fn post(id: PostId, parent_id: Option<PostId>, text: &str) -> Post {
    Post {
        id,
        parent_id,
        // Question titles repeat the body so a query equal to it matches in both spaces.
        title: if parent_id.is_none() { text.to_string() } else { String::new() },
        body: format!("<p>{text}</p>"),
        cleaned_body: text.to_string(),
        score: 1.0,
        creation_date: Some("2024-01-01T00:00:00".into()),
    }
}

fn posts() -> Vec<Post> {
    vec![
        post(1, None, "rust borrow checker"),
        post(2, Some(1), "rust borrow answer with clone"),
        post(3, None, "python packaging"),
        post(4, Some(3), "python pip answer"),
    ]
}

fn write_config(dir: &Path, data: &Path) -> std::path::PathBuf {
    let path = dir.join("search.toml");
    let text = format!(
        r#"data_path = {:?}
batch_size = 2
backend = "scalar"

[title_encoder]
kind = "hash"
model = "title-hash"
dimension = 64
seed = 1

[answer_encoder]
kind = "hash"
model = "answer-hash"
dimension = 64
seed = 2
"#,
        data.display().to_string()
    );
    fs::write(&path, text).unwrap();
    path
}

fn embed(config: &SearchConfig, space: Space, posts: &[Post], skip: &[PostId]) -> EmbeddingTable {
    let encoder_config = match space {
        Space::Title => &config.title_encoder,
        Space::Answer => &config.answer_encoder,
    };
    let encoder = build_encoder(encoder_config, space).unwrap();
    let mut table = EmbeddingTable::new(encoder.dimension());
    for p in posts.iter().filter(|p| !skip.contains(&p.id)) {
        let text = match space {
            Space::Title if p.is_question() => &p.title,
            Space::Title => continue,
            Space::Answer => &p.cleaned_body,
        };
        let mut v = encoder.encode(text).unwrap();
        normalize(&mut v);
        table.push(p.id, &v).unwrap();
    }
    table
}

fn write_artifacts(data: &Path, config: &SearchConfig, missing_answers: &[PostId]) {
    let paths = ArtifactPaths::new(data);
    let posts = posts();
    let corpus = Corpus::new(posts.clone()).unwrap();
    let artifact: TopicModelArtifact = serde_json::from_value(serde_json::json!({
        "vocabulary": ["rust", "python"],
        "components": [[10.0, 0.1], [0.1, 10.0]],
        "doc_topic_prior": 0.5
    }))
    .unwrap();
    let (vectorizer, model) = artifact.clone().into_parts().unwrap();
    let index = TopicIndex::build(Box::new(model), Box::new(vectorizer), &corpus);

    let title = embed(config, Space::Title, &posts, &[]);
    let answer = embed(config, Space::Answer, &posts, missing_answers);
    save_posts(&paths, &posts).unwrap();
    save_embeddings(&paths, Space::Title, &title).unwrap();
    save_embeddings(&paths, Space::Answer, &answer).unwrap();
    save_topic_model(&paths, &artifact).unwrap();
    save_topic_table(&paths, index.table()).unwrap();
    save_meta(
        &paths,
        &MetaFile {
            num_posts: posts.len(),
            num_topics: 2,
            title_dimension: title.dimension,
            answer_dimension: answer.dimension,
            created_at: "2024-01-01T00:00:00Z".into(),
            version: ARTIFACT_VERSION,
        },
    )
    .unwrap();
}

fn app_with(missing_answers: &[PostId]) -> (tempfile::TempDir, Router) {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    let config_path = write_config(dir.path(), &data);
    let config = server::load_config(Some(config_path.as_path())).unwrap();
    assert_eq!(config.batch_size, 2);
    write_artifacts(&data, &config, missing_answers);
    let engine = server::load_engine(config).unwrap();
    (dir, server::build_app(engine))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn result_ids(json: &Value) -> Vec<i64> {
    json["results"].as_array().unwrap().iter().map(|r| r["id"].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn clustering_search_returns_one_row_per_thread() {
    let (_dir, app) = app_with(&[]);
    let (status, json) = get(app, "/search?query=rust%20borrow%20checker").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["search_type"], "clustering");
    assert_eq!(json["total_results"], 2);
    let ids = result_ids(&json);
    assert_eq!(ids[0], 1);
    assert_eq!(ids.len(), 2);
    assert!(json["execution_time"].as_f64().unwrap() >= 0.0);
    assert_eq!(json["results"][0]["title"], "rust borrow checker");
    assert!(json["results"][0]["similarity"].as_f64().unwrap() > 0.99);
}

#[tokio::test]
async fn post_search_runs_the_requested_mode() {
    let (_dir, app) = app_with(&[]);
    let req = Request::post("/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"query": "python packaging", "top_n": 3, "search_type": "semantic"}"#))
        .unwrap();
    let (status, json) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["search_type"], "semantic");
    assert_eq!(json["total_results"], 3);
    assert_eq!(result_ids(&json)[0], 3);
}

#[tokio::test]
async fn vector_route_ranks_by_term_overlap() {
    let (_dir, app) = app_with(&[]);
    let (status, json) = get(app, "/search/vector?query=python").await;
    assert_eq!(status, StatusCode::OK);
    let ids = result_ids(&json);
    assert_eq!(ids.len(), 4);
    assert_eq!(&ids[..2], &[3, 4]);
}

#[tokio::test]
async fn unknown_search_type_is_a_bad_request() {
    let (_dir, app) = app_with(&[]);
    let (status, json) = get(app, "/search?query=rust&search_type=fulltext").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("clustering, semantic, vector"));
}

#[tokio::test]
async fn missing_query_is_reported_in_the_search_envelope() {
    let (_dir, app) = app_with(&[]);
    let (status, json) = get(app.clone(), "/search?top_n=3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["total_results"], 0);
    assert!(json["error"].as_str().unwrap().contains("query"));

    let (status, json) = get(app.clone(), "/search/vector").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["search_type"], "vector");
    assert_eq!(json["success"], false);

    let req = Request::post("/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"top_n": 3}"#))
        .unwrap();
    let (status, json) = send(app, req).await;
    assert!(status.is_client_error());
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("query"));
}

#[tokio::test]
async fn desynchronized_index_fails_only_that_query() {
    let (_dir, app) = app_with(&[4]);
    let (status, json) = get(app.clone(), "/search/clustering?query=rust%20borrow%20checker").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("post 4"));

    let (status, _) = get(app, "/search/vector?query=python").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn post_lookup_reports_missing_posts() {
    let (_dir, app) = app_with(&[]);
    let (status, json) = get(app.clone(), "/post/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["post"]["parent_id"], 1);

    let (status, json) = get(app, "/post/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert!(json.get("post").is_none());
}

#[tokio::test]
async fn stats_and_health_describe_the_engine() {
    let (_dir, app) = app_with(&[]);
    let (status, json) = get(app.clone(), "/stats").await;
    assert_eq!(status, StatusCode::OK);
    let stats = &json["engine_stats"];
    assert_eq!(stats["total_posts"], 4);
    assert_eq!(stats["total_questions"], 2);
    assert_eq!(stats["total_topics"], 2);
    assert_eq!(stats["embeddings"]["title_dimension"], 64);
    assert_eq!(stats["backend"], "scalar");

    let (status, json) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
}
