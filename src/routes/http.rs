//! HTTP endpoint handlers. These are thin wrappers that forward to the session store.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use tracing::{info, instrument, warn};

use crate::difficulty::classify;
use crate::domain::ALL_CONCEPTS;
use crate::error::GameError;
use crate::protocol::*;
use crate::session::SessionView;
use crate::state::AppState;

impl IntoResponse for GameError {
  fn into_response(self) -> Response {
    let status = match &self {
      GameError::UnknownSession(_) => StatusCode::NOT_FOUND,
      GameError::EmptyConcepts | GameError::FixtureMissing { .. } => StatusCode::BAD_REQUEST,
      GameError::InvalidLocalConfiguration(_) | GameError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
      GameError::ValidationBackend(_)
      | GameError::UpstreamFormat(_)
      | GameError::Upstream { .. }
      | GameError::Transport(_)
      | GameError::GeneratorDisabled => StatusCode::BAD_GATEWAY,
    };
    warn!(target: "sql_quest", status = status.as_u16(), error = %self, "Request failed");
    (status, Json(ErrorOut { message: self.to_string() })).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generator: state.deps.generator.is_some() })
}

#[instrument(level = "info")]
pub async fn http_concepts() -> impl IntoResponse {
  let out: Vec<ConceptOut> = ALL_CONCEPTS
    .iter()
    .map(|&id| {
      let d = classify(id);
      ConceptOut { id, level: d.level, description: d.description }
    })
    .collect();
  Json(out)
}

#[instrument(level = "info", skip(state, body), fields(theme = %body.theme, concepts = body.concepts.len()))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartIn>,
) -> Result<(StatusCode, Json<SessionView>), GameError> {
  let (_, view) = state.start_session(body.theme, body.concepts).await?;
  info!(target: "session", id = %view.id, concept = %view.concept, "HTTP session started");
  Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionView>, GameError> {
  let session = state.session(&id).await?;
  let view = session.lock().await.snapshot();
  Ok(Json(view))
}

#[instrument(level = "info", skip(state, body), fields(query_len = body.query.len()))]
pub async fn http_submit(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SubmitIn>,
) -> Result<Json<SubmitOut>, GameError> {
  let session = state.session(&id).await?;
  let mut session = session.lock().await;
  let outcome = session.submit(&body.query).await;
  info!(target: "session", %id, ?outcome, "HTTP submission graded");
  Ok(Json(SubmitOut { outcome, session: session.snapshot() }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_hint(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionView>, GameError> {
  let session = state.session(&id).await?;
  let mut session = session.lock().await;
  session.toggle_hint().await?;
  Ok(Json(session.snapshot()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_reveal(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionView>, GameError> {
  let session = state.session(&id).await?;
  let mut session = session.lock().await;
  session.toggle_reveal().await?;
  Ok(Json(session.snapshot()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_regenerate_narrative(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionView>, GameError> {
  let session = state.session(&id).await?;
  let mut session = session.lock().await;
  session.regenerate_narrative().await?;
  Ok(Json(session.snapshot()))
}

#[instrument(level = "info", skip(state))]
pub async fn http_end_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<SessionView>, GameError> {
  let view = state.end_session(&id).await?;
  info!(target: "session", %id, "HTTP session ended");
  Ok(Json(view))
}
