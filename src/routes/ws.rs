//! WebSocket upgrade + message loop. Each connection drives one study session
//! at a time. Client messages are parsed as JSON and forwarded to core logic;
//! the replies are the session events each message produced.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  http::HeaderMap,
  response::IntoResponse,
};
use tokio::sync::broadcast::Receiver;
use tracing::{debug, error, info, instrument};

use crate::domain::LearnerId;
use crate::generator::SessionRequest;
use crate::logic::{evaluate_exercise, generate_session};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::{SessionEvent, SessionPhase, StudySession};
use crate::state::AppState;

use super::learner_from_headers;

#[instrument(level = "info", skip(state, headers))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let learner = learner_from_headers(&headers);
  info!(target: "lexis_backend", authenticated = learner.is_some(), "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, learner))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, learner: Option<LearnerId>) {
  info!(target: "lexis_backend", "WebSocket connected");
  let mut conn = WsSession::new(learner);
  'recv: while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize responses.
        let replies = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "lexis_backend", "WS received: {:?}", &incoming);
            conn.handle(incoming, &state).await
          }
          Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }],
        };

        for reply in replies {
          let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
          });
          if let Err(e) = socket.send(Message::Text(out)).await {
            error!(target: "lexis_backend", error = %e, "WS send error");
            break 'recv;
          }
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "lexis_backend", "WebSocket disconnected");
}

/// Per-connection study session plus its event subscription.
struct WsSession {
  learner: Option<LearnerId>,
  session: Option<StudySession>,
  events: Option<Receiver<SessionEvent>>,
}

impl WsSession {
  fn new(learner: Option<LearnerId>) -> Self {
    Self { learner, session: None, events: None }
  }

  async fn handle(&mut self, msg: ClientWsMessage, state: &AppState) -> Vec<ServerWsMessage> {
    match msg {
      ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

      ClientWsMessage::StartSession { duration_minutes, user_level, focus_types, target_language } => {
        let req = SessionRequest { duration_minutes, user_level, focus_types, target_language };
        let exercises = generate_session(state, self.learner.as_ref(), &req).await;

        // A new start replaces whatever session was running.
        if let Some(old) = &self.session {
          debug!(target: "lexis_backend", session = %old.id(), phase = ?old.phase(), "Replacing running session");
        }
        let mut session = StudySession::new(self.learner.clone());
        self.events = Some(session.subscribe());
        if let Err(e) = session.start(exercises) {
          return vec![ws_error(e)];
        }
        self.session = Some(session);
        self.drain()
      }

      ClientWsMessage::SubmitResponse { exercise_id, response, response_mode } => {
        let Some(session) = self.session.as_mut() else {
          return vec![ws_error("no active session")];
        };
        if session.phase() != SessionPhase::Exercise {
          return vec![ws_error(format!("cannot submit while in {:?}", session.phase()))];
        }
        let Some(current) = session.current().cloned() else {
          return vec![ws_error("no current exercise")];
        };
        if current.id != exercise_id {
          return vec![ws_error(format!("exercise {exercise_id} is not current"))];
        }

        let result = match evaluate_exercise(state, session.learner(), &current, &response, response_mode).await {
          Ok((result, _)) => result,
          Err(e) => return vec![ws_error(e)],
        };
        if let Err(e) = session.record_result(result) {
          return vec![ws_error(e)];
        }
        self.drain()
      }

      ClientWsMessage::Next => match self.session.as_mut().map(|s| s.advance().map(|_| ())) {
        Some(Ok(())) => self.drain(),
        Some(Err(e)) => vec![ws_error(e)],
        None => vec![ws_error("no active session")],
      },

      ClientWsMessage::Stop => match self.session.as_mut().map(|s| s.stop().map(|_| ())) {
        Some(Ok(())) => self.drain(),
        Some(Err(e)) => vec![ws_error(e)],
        None => vec![ws_error("no active session")],
      },
    }
  }

  /// Forward everything the session published since the last message.
  fn drain(&mut self) -> Vec<ServerWsMessage> {
    let mut out = Vec::new();
    if let Some(rx) = self.events.as_mut() {
      while let Ok(event) = rx.try_recv() {
        out.push(ServerWsMessage::Session { event });
      }
    }
    out
  }
}

fn ws_error(e: impl ToString) -> ServerWsMessage {
  ServerWsMessage::Error { message: e.to_string() }
}
