//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Exercise, ExerciseType, ItemId, ReviewState, ResponseMode};
use crate::evaluator::ExerciseResult;
use crate::selector::{BucketPlan, SessionItems};
use crate::session::SessionEvent;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartSession {
        #[serde(rename = "durationMinutes")]
        duration_minutes: f64,
        #[serde(rename = "userLevel", default = "default_level")]
        user_level: String,
        #[serde(rename = "focusTypes", default)]
        focus_types: Option<Vec<ExerciseType>>,
        #[serde(rename = "targetLanguage", default)]
        target_language: Option<String>,
    },
    SubmitResponse {
        #[serde(rename = "exerciseId")]
        exercise_id: String,
        response: String,
        #[serde(rename = "responseMode", default)]
        response_mode: ResponseMode,
    },
    Next,
    Stop,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    /// One state-machine event of the connection's study session.
    Session {
        event: SessionEvent,
    },
    Error {
        message: String,
    },
}

fn default_level() -> String {
    "B1".into()
}

fn default_language() -> String {
    "en".into()
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionItemsQuery {
    pub minutes: Option<f64>,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Serialize)]
pub struct SessionItemsOut {
    pub plan: BucketPlan,
    pub items: SessionItems,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOut {
    pub exercises: Vec<Exercise>,
    /// Sum of the exercises' time estimates, in seconds.
    pub total_seconds: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewIn {
    pub item_id: ItemId,
    /// Validated to 0..=5 by the handler so out-of-range values map to 400.
    pub quality: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageIn {
    pub item_id: ItemId,
    pub context: String,
    pub quality: i64,
}

#[derive(Serialize)]
pub struct ReviewOut {
    /// `None` when no learner was identified.
    pub state: Option<ReviewState>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateIn {
    pub exercise_id: String,
    pub response: String,
    #[serde(default)]
    pub response_mode: ResponseMode,
}

#[derive(Serialize)]
pub struct EvaluateOut {
    pub result: ExerciseResult,
    /// Review states written back for the exercise's items.
    pub reviews: Vec<ReviewState>,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}
