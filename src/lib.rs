//! Lexis spaced-repetition backend.
//!
//! The scheduling core (SM-2, session item selection, exercise generation,
//! progress updates) plus the evaluator, the study-session state machine and
//! the axum HTTP/WebSocket surface the server binary mounts.

pub mod config;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod logic;
pub mod openai;
pub mod progress;
pub mod protocol;
pub mod routes;
pub mod seeds;
pub mod selector;
pub mod session;
pub mod sm2;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod templates;
pub mod util;
