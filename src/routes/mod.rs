//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - session API under `/api/v1/...`
/// - Static SPA from `STATIC_DIR` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/concepts", get(http::http_concepts))
        .route("/api/v1/session", post(http::http_start_session))
        .route(
            "/api/v1/session/:id",
            get(http::http_get_session).delete(http::http_end_session),
        )
        .route("/api/v1/session/:id/submit", post(http::http_submit))
        .route("/api/v1/session/:id/hint", post(http::http_toggle_hint))
        .route("/api/v1/session/:id/reveal", post(http::http_toggle_reveal))
        .route("/api/v1/session/:id/narrative", post(http::http_regenerate_narrative))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::ServiceConfig;
    use crate::narrator::tests::ScriptedGenerator;
    use crate::session::tests::{deps, verdict, FakeBackend};

    fn app(backend: Arc<FakeBackend>, generator: Option<Arc<ScriptedGenerator>>) -> (Router, Arc<AppState>) {
        let config = ServiceConfig::from_lookup(|_| None);
        let state = Arc::new(AppState::with_services(config, deps(backend, generator)));
        (build_router(state.clone()), state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .expect("request");
        let res = app.clone().oneshot(req).await.expect("response");
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_and_concepts() {
        let (app, _) = app(FakeBackend::with(0, vec![]), None);
        let (status, body) = call(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "generator": false }));

        let (_, body) = call(&app, "GET", "/api/v1/concepts", None).await;
        let concepts = body.as_array().expect("list");
        assert_eq!(concepts.len(), 10);
        assert_eq!(concepts[9]["id"], "basic JOIN usage");
        assert_eq!(concepts[9]["level"], "hard");
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let backend = FakeBackend::with(0, vec![verdict(true, vec![0.9], 0)]);
        let (app, state) = app(backend, None);

        let (status, view) = call(
            &app,
            "POST",
            "/api/v1/session",
            Some(json!({ "theme": "fantasy", "concepts": ["basic WHERE clause"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = view["id"].as_str().expect("id").to_string();
        assert_eq!(view["concept"], "basic WHERE clause");
        assert!(!view["narrative"].as_str().unwrap_or_default().is_empty());

        let (status, out) = call(
            &app,
            "POST",
            &format!("/api/v1/session/{id}/submit"),
            Some(json!({ "query": "SELECT * FROM adventurers WHERE gold > 100" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["outcome"], json!({ "outcome": "correct", "via_reveal": false }));
        assert_eq!(out["session"]["progress"]["completed_questions"], 1);
        assert_eq!(out["session"]["progress"]["completed_concepts"], 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/v1/session/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.live_sessions().await, 0);

        let (status, body) = call(&app, "GET", &format!("/api/v1/session/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap_or_default().contains(&id));
    }

    #[tokio::test]
    async fn empty_concept_list_is_rejected() {
        let (app, state) = app(FakeBackend::with(0, vec![]), None);
        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/session",
            Some(json!({ "theme": "cyberpunk", "concepts": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Please select at least one concept to continue.");
        assert_eq!(state.live_sessions().await, 0);
    }

    #[tokio::test]
    async fn hint_toggle_over_http() {
        let (app, _) = app(FakeBackend::with(0, vec![]), None);
        let (_, view) = call(
            &app,
            "POST",
            "/api/v1/session",
            Some(json!({ "theme": "real-world", "concepts": ["ORDER BY clause"] })),
        )
        .await;
        let id = view["id"].as_str().expect("id").to_string();

        let (status, view) = call(&app, "POST", &format!("/api/v1/session/{id}/hint"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["attempts"]["hint_requested"], true);
        assert!(view["hint"].as_str().unwrap_or_default().contains("ORDER BY clause"));

        let (_, view) = call(&app, "POST", &format!("/api/v1/session/{id}/reveal"), None).await;
        assert_eq!(view["attempts"]["hint_requested"], false);
        assert_eq!(view["attempts"]["answer_revealed"], true);
        assert!(view["revealed_answer"].as_str().unwrap_or_default().starts_with("SELECT"));
    }
}
