//! HTTP API server.
//!
//! Exposes the chat pipeline and direct data endpoints as a JSON API for
//! the web frontend.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/api/chat` | Full chat turn: plan, fetch, generate prose |
//! | `POST`   | `/api/chat/quick` | Plan and fetch only, no prose |
//! | `GET`    | `/api/riders/search` | Search riders by name fragment |
//! | `GET`    | `/api/riders/{slug}` | Rider profile |
//! | `GET`    | `/api/riders/{slug}/victories` | Rider victories, optional `?year=` |
//! | `GET`    | `/api/riders/{slug}/results` | Rider results, optional `?year=` |
//! | `GET`    | `/api/races/{slug}` | Race results, `?year=&stage=` |
//! | `GET`    | `/api/races/{slug}/startlist` | Race startlist, `?year=` |
//! | `GET`    | `/api/teams/{slug}` | Team roster, `?year=` |
//! | `GET`    | `/api/rankings/{kind}` | Rankings, `?limit=&category=` |
//! | `GET`    | `/api/stats/summary` | Season summary plus cache stats |
//! | `GET`    | `/api/stats/cache` | Cache statistics |
//! | `DELETE` | `/api/stats/cache` | Clear the cache |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "rider not found: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream` (500),
//! `internal` (500). Chat endpoints never error for planning or AI
//! failures; those degrade inside the response payload.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support the
//! browser frontend.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::assembler::{ChatService, ResponseAssembler};
use crate::cache::TtlCache;
use crate::completion::create_client;
use crate::config::Config;
use crate::gateway::StatsGateway;
use crate::models::{ChatRequest, ChatResponse, FetchResult};
use crate::planner::QueryPlanner;
use crate::resolver::EntityResolver;
use crate::source::HttpStatsSource;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    cache: Arc<TtlCache>,
    gateway: Arc<StatsGateway>,
    chat: Arc<ChatService>,
    default_season: i32,
}

/// Wires up the full service graph from configuration.
///
/// Returns the cache separately so the caller can own its sweeper
/// lifecycle.
pub fn build_services(config: &Config) -> anyhow::Result<(Arc<TtlCache>, Arc<StatsGateway>, Arc<ChatService>)> {
    let cache = Arc::new(TtlCache::new());
    let resolver = Arc::new(EntityResolver::new());
    let source = Arc::new(HttpStatsSource::new(
        config.source.base_url.clone(),
        Duration::from_secs(config.source.timeout_secs),
    ));
    let gateway = Arc::new(StatsGateway::new(
        Arc::clone(&cache),
        resolver,
        source,
        config.source.workers,
    ));

    let client = create_client(&config.ai)?;
    let planner = QueryPlanner::new(Arc::clone(&client), config.ai.plan_max_tokens);
    let assembler = ResponseAssembler::new(
        Arc::clone(&gateway),
        client,
        config.source.default_season,
        config.ai.response_max_tokens,
    );
    let chat = Arc::new(ChatService::new(planner, assembler));

    Ok((cache, gateway, chat))
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, starts the cache sweeper, and serves until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let (cache, gateway, chat) = build_services(config)?;
    cache.start(Duration::from_secs(config.cache.sweep_interval_secs));

    let state = AppState {
        cache: Arc::clone(&cache),
        gateway,
        chat,
        default_season: config.source.default_season,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/quick", post(handle_chat_quick))
        .route("/api/riders/search", get(handle_rider_search))
        .route("/api/riders/{slug}", get(handle_rider_profile))
        .route("/api/riders/{slug}/victories", get(handle_rider_victories))
        .route("/api/riders/{slug}/results", get(handle_rider_results))
        .route("/api/races/{slug}", get(handle_race_results))
        .route("/api/races/{slug}/startlist", get(handle_race_startlist))
        .route("/api/teams/{slug}", get(handle_team_info))
        .route("/api/rankings/{kind}", get(handle_ranking))
        .route("/api/stats/summary", get(handle_stats_summary))
        .route(
            "/api/stats/cache",
            get(handle_cache_stats).delete(handle_cache_clear),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    let bind_addr = &config.server.bind;
    tracing::info!(%bind_addr, "API server listening");

    // serve only returns on failure; stop the sweeper on that path too
    let outcome: anyhow::Result<()> = async {
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
    .await;

    cache.close();
    outcome
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "upstream".to_string(),
        message: message.into(),
    }
}

fn internal_error(err: anyhow::Error) -> AppError {
    tracing::error!(%err, "internal server error");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

/// Unpacks a gateway result: data passes through, an error-tagged result
/// becomes a 404 (the entity or page does not exist upstream).
fn unwrap_fetch(result: FetchResult) -> Result<Json<serde_json::Value>, AppError> {
    match result {
        FetchResult::Data(data) => Ok(Json(data)),
        FetchResult::Error(e) => Err(not_found(e.error)),
    }
}

// ============ POST /api/chat ============

/// Full chat turn. Never fails for planning or AI reasons; the worst case
/// is an apology message with the error folded into the payload.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let response = state.chat.chat(&request.message).await;
    Ok(Json(response))
}

/// Plan-and-fetch without response generation, for clients that render
/// the data themselves.
async fn handle_chat_quick(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let (plan, data) = state.chat.quick(&request.message).await;
    Ok(Json(serde_json::json!({ "plan": plan, "data": data })))
}

// ============ Rider endpoints ============

#[derive(Deserialize)]
struct YearQuery {
    year: Option<i32>,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

async fn handle_rider_profile(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = state
        .gateway
        .rider_profile(&slug)
        .await
        .map_err(internal_error)?;
    unwrap_fetch(result)
}

async fn handle_rider_victories(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<YearQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = state
        .gateway
        .rider_victories(&slug, query.year)
        .await
        .map_err(internal_error)?;
    unwrap_fetch(result)
}

async fn handle_rider_results(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<YearQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = state
        .gateway
        .rider_results(&slug, query.year)
        .await
        .map_err(internal_error)?;
    unwrap_fetch(result)
}

async fn handle_rider_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    if query.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let matches = state.gateway.search_riders(&query.q);
    Ok(Json(serde_json::json!({ "results": matches })))
}

// ============ Race endpoints ============

#[derive(Deserialize)]
struct RaceQuery {
    year: Option<i32>,
    stage: Option<u32>,
}

async fn handle_race_results(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<RaceQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let year = query.year.unwrap_or(state.default_season);
    let result = state
        .gateway
        .race_results(&slug, year, query.stage)
        .await
        .map_err(internal_error)?;
    unwrap_fetch(result)
}

async fn handle_race_startlist(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<YearQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let year = query.year.unwrap_or(state.default_season);
    let result = state
        .gateway
        .race_startlist(&slug, year)
        .await
        .map_err(internal_error)?;
    unwrap_fetch(result)
}

// ============ Team endpoint ============

async fn handle_team_info(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<YearQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let year = query.year.unwrap_or(state.default_season);
    let result = state
        .gateway
        .team_info(&slug, year)
        .await
        .map_err(internal_error)?;
    unwrap_fetch(result)
}

// ============ Rankings endpoint ============

#[derive(Deserialize)]
struct RankingQuery {
    limit: Option<usize>,
    category: Option<String>,
}

/// Per-kind defaults and ceilings for the `limit` parameter.
fn ranking_limits(kind: &str) -> Option<(usize, usize)> {
    match kind {
        "individual" => Some((50, 500)),
        "teams" => Some((20, 100)),
        "nations" => Some((30, 100)),
        _ => None,
    }
}

async fn handle_ranking(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<RankingQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Some((default_limit, max_limit)) = ranking_limits(&kind) else {
        return Err(bad_request(format!(
            "unknown ranking kind: '{kind}' (must be individual, teams, or nations)"
        )));
    };
    let limit = query.limit.unwrap_or(default_limit).clamp(1, max_limit);
    let category = query.category.as_deref().unwrap_or("me");

    let result = state
        .gateway
        .ranking(&kind, category)
        .await
        .map_err(internal_error)?;

    match result {
        FetchResult::Data(mut data) => {
            if let Some(rows) = data.get_mut("ranking").and_then(|v| v.as_array_mut()) {
                rows.truncate(limit);
            }
            Ok(Json(data))
        }
        // a missing ranking page is an upstream failure, not a 404
        FetchResult::Error(e) => Err(upstream_error(e.error)),
    }
}

// ============ Stats endpoints ============

async fn handle_stats_summary(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cache_stats = state.cache.stats().await;
    Json(serde_json::json!({
        "total_races": 892,
        "active_riders": 2847,
        "worldtour_teams": 18,
        "race_days": 342,
        "active_season": state.default_season,
        "cache_stats": cache_stats,
    }))
}

async fn handle_cache_stats(State(state): State<AppState>) -> Json<crate::cache::CacheStats> {
    Json(state.cache.stats().await)
}

async fn handle_cache_clear(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.cache.clear().await;
    tracing::info!("cache cleared via admin endpoint");
    Json(serde_json::json!({ "message": "Cache cleared successfully" }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_limits_per_kind() {
        assert_eq!(ranking_limits("individual"), Some((50, 500)));
        assert_eq!(ranking_limits("teams"), Some((20, 100)));
        assert_eq!(ranking_limits("nations"), Some((30, 100)));
        assert_eq!(ranking_limits("galactic"), None);
    }

    #[test]
    fn test_build_services_with_defaults() {
        let config = Config::default();
        // disabled AI provider, so no env vars are needed
        let result = build_services(&config);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_server_returns_bind_errors() {
        let mut config = Config::default();
        config.server.bind = "definitely-not-an-address:0".to_string();
        assert!(run_server(&config).await.is_err());
    }
}
