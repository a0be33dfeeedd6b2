//! JSON HTTP API consumed by the archive's search page.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/stats` | Script and line counts, top characters, years |
//! | `GET`  | `/api/search?q=` | Scripts containing a keyword |
//! | `GET`  | `/api/script_detail?script_name=&keyword=` | Full transcript of one script |
//! | `GET`  | `/api/search/scripts?q=&theme=&year=&limit=&offset=` | Paged script listing with filters |
//! | `GET`  | `/api/search/dialogues?q=&character=&limit=&offset=` | Paged line listing with filters |
//! | `GET`  | `/api/list_scripts?contains=&diagnostics=` | Distinct script names |
//! | `GET`  | `/api/characters` | Line and script counts per character |
//! | `GET`  | `/api/themes` | Script counts per theme |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every endpoint answers `OPTIONS` with an empty `200` and any method other
//! than `GET`/`OPTIONS` (`HEAD` included) with `405 {"error":"Method not allowed"}`.
//!
//! # Response Contract
//!
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "keyword (q) must not be empty" }
//! ```
//!
//! Errors use `400` for missing parameters, `404` for unknown scripts and
//! `500` when the database cannot be fetched or queried.
//!
//! # CORS
//!
//! All origins are allowed. Every response, errors and pre-flights included,
//! carries the same fixed `Access-Control-*` and `Content-Type` headers.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    handler::Handler,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodFilter, MethodRouter},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info, warn};

use crate::browse;
use crate::catalog;
use crate::config::Config;
use crate::error::ArchiveError;
use crate::fetch::DatabaseCache;
use crate::script;
use crate::search;
use crate::stats;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// The one cache handle for the process; every request goes through it.
    pub cache: Arc<DatabaseCache>,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            cache: Arc::new(DatabaseCache::new(&config.db)?),
        })
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated. The database is not fetched until the first request needs it.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::new(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        cache = %config.db.cache_path.display(),
        "archive server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router with all endpoints and the fixed response headers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/stats", endpoint(handle_stats))
        .route("/api/search", endpoint(handle_search))
        .route("/api/search/scripts", endpoint(handle_search_scripts))
        .route("/api/search/dialogues", endpoint(handle_search_dialogues))
        .route("/api/script_detail", endpoint(handle_script_detail))
        .route("/api/list_scripts", endpoint(handle_list_scripts))
        .route("/api/characters", endpoint(handle_characters))
        .route("/api/themes", endpoint(handle_themes))
        .route("/health", endpoint(handle_health))
        .fallback(handle_unknown_route)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .with_state(state)
}

/// `GET` runs the handler, `OPTIONS` is an empty pre-flight, anything else is 405.
/// `get()` would also answer `HEAD`, so that is routed to the 405 explicitly.
fn endpoint<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler)
        .on(MethodFilter::HEAD, handle_method_not_allowed)
        .options(handle_preflight)
        .fallback(handle_method_not_allowed)
}

async fn handle_preflight() -> StatusCode {
    StatusCode::OK
}

async fn handle_method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

async fn handle_unknown_route() -> AppError {
    not_found("no such endpoint")
}

// ============ Envelopes ============

/// Success envelope: `{"success": true, ...payload}`.
#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(flatten)]
    payload: T,
}

fn success<T: Serialize>(payload: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        payload,
    })
}

/// Payload wrapper for endpoints that answer with `{"data": ...}`.
#[derive(Serialize)]
struct Data<T> {
    data: T,
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<serde_json::Value>,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
    debug: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            debug: self.debug,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
        debug: None,
    }
}

/// Constructs a 404 Not Found error.
fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
        debug: None,
    }
}

/// Constructs a 500 error.
fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
        debug: None,
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Validation(message) => bad_request(message),
            ArchiveError::NotFound { message, debug } => {
                warn!(%message, "lookup failed");
                AppError {
                    debug,
                    ..not_found(message)
                }
            }
            other => {
                error!(error = %other, "request failed");
                internal(other.to_string())
            }
        }
    }
}

/// Unwraps query parameters, turning a malformed query string into a JSON 400.
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    match query {
        Ok(Query(params)) => Ok(params),
        Err(rejection) => Err(bad_request(rejection.body_text())),
    }
}

/// Reads a query flag such as `diagnostics=true`.
fn flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/stats ============

async fn handle_stats(
    State(state): State<AppState>,
) -> Result<Json<Success<Data<stats::ArchiveStats>>>, AppError> {
    let data = stats::get_stats(&state.cache).await?;
    Ok(success(Data { data }))
}

// ============ GET /api/search ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Success<search::SearchResponse>>, AppError> {
    let params = query_params(query)?;
    let keyword = params.q.unwrap_or_default();
    if keyword.trim().is_empty() {
        return Err(bad_request("keyword (q) must not be empty"));
    }

    let response = search::search_keyword(&state.cache, &keyword).await?;
    Ok(success(response))
}

// ============ GET /api/search/scripts ============

#[derive(Debug, Deserialize)]
struct SearchScriptsParams {
    q: Option<String>,
    theme: Option<String>,
    year: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn handle_search_scripts(
    State(state): State<AppState>,
    query: Result<Query<SearchScriptsParams>, QueryRejection>,
) -> Result<Json<Success<Data<browse::Page<browse::ScriptSummary>>>>, AppError> {
    let params = query_params(query)?;
    let page = browse::PageRequest::new(params.limit, params.offset)?;
    let filter = browse::ScriptFilter {
        query: params.q,
        theme: params.theme,
        year: params.year,
    };

    let data = browse::search_scripts(&state.cache, &filter, page).await?;
    Ok(success(Data { data }))
}

// ============ GET /api/search/dialogues ============

#[derive(Debug, Deserialize)]
struct SearchDialoguesParams {
    q: Option<String>,
    character: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn handle_search_dialogues(
    State(state): State<AppState>,
    query: Result<Query<SearchDialoguesParams>, QueryRejection>,
) -> Result<Json<Success<Data<browse::Page<browse::DialogueHit>>>>, AppError> {
    let params = query_params(query)?;
    let page = browse::PageRequest::new(params.limit, params.offset)?;
    let filter = browse::DialogueFilter {
        query: params.q,
        character: params.character,
    };

    let data = browse::search_dialogues(&state.cache, &filter, page).await?;
    Ok(success(Data { data }))
}

// ============ GET /api/script_detail ============

#[derive(Debug, Deserialize)]
struct ScriptDetailParams {
    script_name: Option<String>,
    keyword: Option<String>,
}

async fn handle_script_detail(
    State(state): State<AppState>,
    query: Result<Query<ScriptDetailParams>, QueryRejection>,
) -> Result<Json<Success<Data<script::ScriptDetail>>>, AppError> {
    let params = query_params(query)?;
    let script_name = params.script_name.unwrap_or_default();
    if script_name.trim().is_empty() {
        return Err(bad_request("script_name must not be empty"));
    }

    let data =
        script::get_script_detail(&state.cache, &script_name, params.keyword.as_deref()).await?;
    Ok(success(Data { data }))
}

// ============ GET /api/list_scripts ============

#[derive(Debug, Deserialize)]
struct ListScriptsParams {
    contains: Option<String>,
    diagnostics: Option<String>,
}

async fn handle_list_scripts(
    State(state): State<AppState>,
    query: Result<Query<ListScriptsParams>, QueryRejection>,
) -> Result<Json<Success<catalog::ScriptList>>, AppError> {
    let params = query_params(query)?;
    let list = catalog::list_scripts(
        &state.cache,
        params.contains.as_deref(),
        flag(params.diagnostics.as_deref()),
    )
    .await?;
    Ok(success(list))
}

// ============ GET /api/characters ============

async fn handle_characters(
    State(state): State<AppState>,
) -> Result<Json<Success<Data<Vec<catalog::CharacterSummary>>>>, AppError> {
    let data = catalog::list_characters(&state.cache).await?;
    Ok(success(Data { data }))
}

// ============ GET /api/themes ============

async fn handle_themes(
    State(state): State<AppState>,
) -> Result<Json<Success<Data<Vec<catalog::ThemeCount>>>>, AppError> {
    let data = catalog::list_themes(&state.cache).await?;
    Ok(success(Data { data }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{fixture, Fixture};

    /// Serves the router on an ephemeral port and returns its base URL.
    async fn serve(fx: &Fixture) -> String {
        let config = Config {
            db: crate::config::DbConfig {
                cache_path: fx.cache.path().to_path_buf(),
                source_url: "http://127.0.0.1:9/unused".to_string(),
                min_bytes: 1024,
                ..Default::default()
            },
            ..Default::default()
        };
        let app = router(AppState::new(&config).unwrap());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn assert_standard_headers(resp: &reqwest::Response) {
        let h = resp.headers();
        assert_eq!(h["access-control-allow-origin"], "*");
        assert_eq!(h["access-control-allow-methods"], "GET, POST, OPTIONS");
        assert_eq!(h["access-control-allow-headers"], "Content-Type");
        assert_eq!(h["content-type"], "application/json");
    }

    #[test]
    fn test_flag() {
        assert!(flag(Some("true")));
        assert!(flag(Some(" 1 ")));
        assert!(flag(Some("YES")));
        assert!(!flag(Some("false")));
        assert!(!flag(Some("")));
        assert!(!flag(None));
    }

    #[tokio::test]
    async fn test_unsupported_methods_get_405() {
        let fx = fixture().await;
        let base = serve(&fx).await;
        let client = reqwest::Client::new();

        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            for path in ["/api/stats", "/api/search?q=apple", "/api/script_detail"] {
                let resp = client
                    .request(method.clone(), format!("{}{}", base, path))
                    .send()
                    .await
                    .unwrap();
                assert_eq!(resp.status(), 405, "{} {}", method, path);
                assert_standard_headers(&resp);
                let body: serde_json::Value = resp.json().await.unwrap();
                assert_eq!(body, serde_json::json!({ "error": "Method not allowed" }));
            }
        }
    }

    #[tokio::test]
    async fn test_head_gets_405() {
        let fx = fixture().await;
        let base = serve(&fx).await;
        let client = reqwest::Client::new();

        for path in ["/api/stats", "/api/search?q=apple", "/api/search/scripts", "/health"] {
            let resp = client
                .head(format!("{}{}", base, path))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 405, "HEAD {}", path);
            assert_standard_headers(&resp);
        }
    }

    #[tokio::test]
    async fn test_options_is_empty_200() {
        let fx = fixture().await;
        let base = serve(&fx).await;
        let client = reqwest::Client::new();

        for path in ["/api/stats", "/api/search", "/api/list_scripts"] {
            let resp = client
                .request(Method::OPTIONS, format!("{}{}", base, path))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            assert_standard_headers(&resp);
            assert!(resp.text().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_search_requires_q() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        for query in ["", "?q=", "?q=%20%20"] {
            let resp = reqwest::get(format!("{}/api/search{}", base, query))
                .await
                .unwrap();
            assert_eq!(resp.status(), 400);
            assert_standard_headers(&resp);
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(body["success"], false);
            assert!(body["error"].as_str().unwrap().contains("q"));
        }
    }

    #[tokio::test]
    async fn test_malformed_query_is_json_400() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        for path in [
            "/api/search?q=a&q=b",
            "/api/script_detail?script_name=A101&script_name=C300",
            "/api/list_scripts?contains=a&contains=b",
            "/api/search/scripts?limit=abc",
            "/api/search/dialogues?offset=-1",
        ] {
            let resp = reqwest::get(format!("{}{}", base, path)).await.unwrap();
            assert_eq!(resp.status(), 400, "{}", path);
            assert_standard_headers(&resp);
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(body["success"], false, "{}", path);
            assert!(!body["error"].as_str().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_search_scripts_paged() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let resp = reqwest::get(format!("{}/api/search/scripts?limit=2&offset=1", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total_count"], 4);
        assert_eq!(body["data"]["has_more"], true);
        assert_eq!(body["data"]["results"][0]["script_name"], "B2231 ");
        assert_eq!(body["data"]["results"][1]["dialogue_count"], 6);

        let body: serde_json::Value =
            reqwest::get(format!("{}/api/search/scripts?theme=music&year=2023", base))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(body["data"]["total_count"], 1);
        assert_eq!(body["data"]["results"][0]["script_name"], "C300");

        let resp = reqwest::get(format!("{}/api/search/scripts?limit=0", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_search_dialogues_by_character() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let body: serde_json::Value = reqwest::get(format!(
            "{}/api/search/dialogues?q=apple&character=Star&limit=2",
            base
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total_count"], 4);
        assert_eq!(body["data"]["has_more"], true);
        let results = body["data"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["script_name"], "C300");
        assert_eq!(results[0]["character"], "Star");
    }

    #[tokio::test]
    async fn test_search_success_envelope() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let resp = reqwest::get(format!("{}/api/search?q=apple", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_standard_headers(&resp);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["keyword"], "apple");
        assert_eq!(body["total_results"], 3);
        assert_eq!(body["data"][0]["script_name"], "B2231 ");
        assert_eq!(body["data"][0]["dialogues"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_script_detail_not_found() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let resp = reqwest::get(format!("{}/api/script_detail?script_name=B22", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["debug"]["searched_for"], "B22");
        assert_eq!(body["debug"]["similar_names"][0], "B2231 ");
    }

    #[tokio::test]
    async fn test_script_detail_requires_name() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let resp = reqwest::get(format!("{}/api/script_detail", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_script_detail_with_keyword() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let resp = reqwest::get(format!(
            "{}/api/script_detail?script_name=A101&keyword=apple",
            base
        ))
        .await
        .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        let data = &body["data"];
        assert_eq!(data["total_dialogues"], 6);
        assert_eq!(data["match_count"], 5);
        let confidence = data["match_confidence"].as_f64().unwrap();
        assert!((confidence - 5.0 / 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stats_and_listings() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let stats: serde_json::Value = reqwest::get(format!("{}/api/stats", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["success"], true);
        assert_eq!(stats["data"]["total_scripts"], 4);
        assert_eq!(stats["data"]["total_dialogues"], 16);

        let list: serde_json::Value =
            reqwest::get(format!("{}/api/list_scripts?diagnostics=true", base))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(list["total_found"], 4);
        assert_eq!(list["scripts"][1]["ends_with_space"], true);

        let themes: serde_json::Value = reqwest::get(format!("{}/api/themes", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(themes["data"][0]["theme"], "food");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_500() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config {
            db: crate::config::DbConfig {
                cache_path: tmp.path().join("missing.db"),
                source_url: "http://127.0.0.1:9/unused".to_string(),
                timeout_secs: Some(5),
                ..Default::default()
            },
            ..Default::default()
        };
        let app = router(AppState::new(&config).unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let resp = reqwest::get(format!("http://{}/api/stats", addr))
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert_standard_headers(&resp);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("127.0.0.1:9"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let fx = fixture().await;
        let base = serve(&fx).await;

        let resp = reqwest::get(format!("{}/api/nope", base)).await.unwrap();
        assert_eq!(resp.status(), 404);
        assert_standard_headers(&resp);
    }
}
