use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use qasearch_core::{EngineContext, EngineStats, Post, PostId, SearchConfig, SearchEngine, SearchHit, SearchMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default = "default_search_type")]
    pub search_type: String,
}
fn default_search_type() -> String { SearchMode::Clustering.as_str().to_string() }

#[derive(Deserialize)]
pub struct ModeParams {
    pub query: String,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub search_type: String,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    /// Seconds.
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct PostResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub engine_stats: EngineStats,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
}

/// Reads a TOML config when a path is given, otherwise the defaults.
pub fn load_config(path: Option<&std::path::Path>) -> Result<SearchConfig> {
    let config: SearchConfig = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => SearchConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Loads every artifact under `config.data_path`. Blocking.
pub fn load_engine(config: SearchConfig) -> Result<Arc<SearchEngine>> {
    let data = config.data_path.clone();
    let ctx = EngineContext::load(config).with_context(|| format!("loading engine from {}", data.display()))?;
    Ok(Arc::new(SearchEngine::new(ctx)))
}

pub fn build_app(engine: Arc<SearchEngine>) -> Router {
    let app_state = AppState { engine };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/search", get(search_get_handler).post(search_post_handler))
        .route("/search/clustering", get(clustering_handler))
        .route("/search/semantic", get(semantic_handler))
        .route("/search/vector", get(vector_handler))
        .route("/post/:post_id", get(post_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Q&A search API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.engine.get_stats();
    let complete = stats.models_loaded.topic_model
        && stats.models_loaded.vectorizer
        && stats.embeddings.title_embeddings > 0
        && stats.embeddings.answer_embeddings > 0;
    let response = if complete {
        HealthResponse { status: "healthy", message: "All components loaded successfully".into() }
    } else {
        HealthResponse { status: "degraded", message: "Some components hold no data".into() }
    };
    Json(response)
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse { success: true, engine_stats: state.engine.get_stats() })
}

pub async fn search_get_handler(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Response {
    match params {
        Ok(Query(params)) => dispatch(state, params).await,
        Err(rejection) => rejected(rejection.body_text(), default_search_type()),
    }
}

pub async fn search_post_handler(
    State(state): State<AppState>,
    params: Result<Json<SearchParams>, JsonRejection>,
) -> Response {
    match params {
        Ok(Json(params)) => dispatch(state, params).await,
        Err(rejection) => rejected(rejection.body_text(), default_search_type()),
    }
}

pub async fn clustering_handler(state: State<AppState>, params: Result<Query<ModeParams>, QueryRejection>) -> Response {
    run_mode(state, SearchMode::Clustering, params).await
}

pub async fn semantic_handler(state: State<AppState>, params: Result<Query<ModeParams>, QueryRejection>) -> Response {
    run_mode(state, SearchMode::Semantic, params).await
}

pub async fn vector_handler(state: State<AppState>, params: Result<Query<ModeParams>, QueryRejection>) -> Response {
    run_mode(state, SearchMode::Vector, params).await
}

async fn run_mode(
    State(state): State<AppState>,
    mode: SearchMode,
    params: Result<Query<ModeParams>, QueryRejection>,
) -> Response {
    match params {
        Ok(Query(params)) => run_search(state, mode, params.query, params.top_n).await,
        Err(rejection) => rejected(rejection.body_text(), mode.to_string()),
    }
}

/// Malformed request parameters, reported in the search envelope.
fn rejected(error: String, search_type: String) -> Response {
    tracing::debug!(%error, "rejected search request");
    failure(StatusCode::BAD_REQUEST, String::new(), search_type, error, 0.0)
}

async fn dispatch(state: AppState, params: SearchParams) -> Response {
    match params.search_type.parse::<SearchMode>() {
        Ok(mode) => run_search(state, mode, params.query, params.top_n).await,
        Err(err) => failure(StatusCode::BAD_REQUEST, params.query, params.search_type, err.to_string(), 0.0),
    }
}

fn failure(status: StatusCode, query: String, search_type: String, error: String, execution_time: f64) -> Response {
    let body = SearchResponse {
        success: false,
        query,
        search_type,
        results: Vec::new(),
        total_results: 0,
        execution_time,
        error: Some(error),
    };
    (status, Json(body)).into_response()
}

/// Runs the query off the async workers; a failed query only fails its own request.
async fn run_search(state: AppState, mode: SearchMode, query: String, top_n: Option<usize>) -> Response {
    let start = Instant::now();
    let engine = Arc::clone(&state.engine);
    let text = query.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.search_mode(mode, &text, top_n)).await;
    let execution_time = start.elapsed().as_secs_f64();
    match outcome {
        Ok(Ok(results)) => Json(SearchResponse {
            success: true,
            query,
            search_type: mode.to_string(),
            total_results: results.len(),
            results,
            execution_time,
            error: None,
        })
        .into_response(),
        Ok(Err(err)) => {
            tracing::warn!(%mode, query_scoped = err.is_query_scoped(), error = %err, "search failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, query, mode.to_string(), err.to_string(), execution_time)
        }
        Err(join) => {
            tracing::error!(error = %join, "search task panicked");
            failure(StatusCode::INTERNAL_SERVER_ERROR, query, mode.to_string(), join.to_string(), execution_time)
        }
    }
}

pub async fn post_handler(State(state): State<AppState>, Path(post_id): Path<PostId>) -> (StatusCode, Json<PostResponse>) {
    match state.engine.get_post_by_id(post_id) {
        Some(post) => (StatusCode::OK, Json(PostResponse { success: true, post: Some(post.clone()), error: None })),
        None => (
            StatusCode::NOT_FOUND,
            Json(PostResponse { success: false, post: None, error: Some(format!("Post with ID {post_id} not found")) }),
        ),
    }
}
