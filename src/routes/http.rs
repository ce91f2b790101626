//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;
use axum::{
  extract::{Query, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::error::{CoreError, StoreError};
use crate::generator::SessionRequest;
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;
use crate::templates;

use super::learner_from_headers;

/// Error body `{ "error": ... }` with a status derived from the core error.
pub struct ApiError(StatusCode, String);

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    let status = match &e {
      CoreError::InvalidQuality(_) => StatusCode::BAD_REQUEST,
      CoreError::UnknownItem(_) | CoreError::UnknownExercise(_) => StatusCode::NOT_FOUND,
      CoreError::ContendedUpdate { .. } => StatusCode::CONFLICT,
      CoreError::Store(StoreError::Timeout(_) | StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
      CoreError::Store(StoreError::Conflict { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
      warn!(target: "lexis_backend", %status, error = %e, "Request failed");
    }
    ApiError(status, e.to_string())
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.0, Json(ErrorOut { error: self.1 })).into_response()
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, headers))]
pub async fn http_get_session_items(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Query(q): Query<SessionItemsQuery>,
) -> impl IntoResponse {
  let learner = learner_from_headers(&headers);
  let minutes = q.minutes.unwrap_or(DEFAULT_SESSION_MINUTES);
  let out = session_items(&state, learner.as_ref(), &q.language, minutes).await;
  info!(target: "scheduler", total = out.plan.total, authenticated = learner.is_some(), "HTTP session items served");
  Json(out)
}

#[instrument(level = "info", skip(state, headers, body), fields(minutes = body.duration_minutes, level = %body.user_level))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<SessionRequest>,
) -> impl IntoResponse {
  let learner = learner_from_headers(&headers);
  let exercises = generate_session(&state, learner.as_ref(), &body).await;
  let total_seconds = total_seconds(&exercises);
  info!(target: "exercise", count = exercises.len(), total_seconds, "HTTP session generated");
  Json(GenerateOut { exercises, total_seconds })
}

#[instrument(level = "info", skip(state, headers, body), fields(item = %body.item_id, quality = body.quality))]
pub async fn http_post_review(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<ReviewIn>,
) -> Result<Json<ReviewOut>, ApiError> {
  let learner = learner_from_headers(&headers);
  let state = record_review(&state, learner.as_ref(), body.item_id, body.quality).await?;
  Ok(Json(ReviewOut { state }))
}

#[instrument(level = "info", skip(state, headers, body), fields(item = %body.item_id, quality = body.quality, context_len = body.context.len()))]
pub async fn http_post_usage(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<UsageIn>,
) -> Result<Json<ReviewOut>, ApiError> {
  let learner = learner_from_headers(&headers);
  let state = record_usage(&state, learner.as_ref(), body.item_id, &body.context, body.quality).await?;
  Ok(Json(ReviewOut { state }))
}

#[instrument(level = "info", skip(state, headers, body), fields(exercise = %body.exercise_id, response_len = body.response.len()))]
pub async fn http_post_evaluate(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<EvaluateIn>,
) -> Result<Json<EvaluateOut>, ApiError> {
  let learner = learner_from_headers(&headers);
  let (result, reviews) =
    evaluate_by_id(&state, learner.as_ref(), &body.exercise_id, &body.response, body.response_mode).await?;
  Ok(Json(EvaluateOut { result, reviews }))
}

#[instrument(level = "info")]
pub async fn http_get_exercise_types() -> impl IntoResponse {
  Json(templates::catalog())
}
