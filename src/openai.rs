//! Minimal OpenAI client for answer evaluation.
//!
//! We only call chat.completions with a strict JSON-object response format.
//! Calls are instrumented and log model names, latencies and token usage
//! (not contents).
//!
//! NOTE: We never log the API key, and learner responses are truncated in logs.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{Exercise, ItemId, ResponseMode};
use crate::evaluator::{xp_for, Correction, Evaluator, ExerciseResult, LocalEvaluator, MissedOpportunity, Scores};
use crate::util::{fill_template, trunc_for_log};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    Self::new(api_key, base_url, model)
  }

  pub fn new(api_key: String, base_url: String, model: String) -> Option<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;
    Some(Self { client, api_key, base_url, model })
  }

  /// JSON-object chat completion. Generic over the target type T.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
  async fn chat_json<T: for<'a> Deserialize<'a>>(
    &self,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<T, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(1000),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "lexis-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    serde_json::from_str::<T>(&text).map_err(|e| format!("JSON parse error: {}", e))
  }
}

/// Evaluator backed by a chat model, falling back to `LocalEvaluator` when
/// the call or its JSON fails.
pub struct OpenAiEvaluator {
  client: OpenAI,
  prompts: Prompts,
  fallback: LocalEvaluator,
}

impl OpenAiEvaluator {
  pub fn new(client: OpenAI, prompts: Prompts) -> Self {
    Self { client, prompts, fallback: LocalEvaluator }
  }

  fn render(&self, exercise: &Exercise, response: &str) -> (String, String) {
    let system = fill_template(&self.prompts.evaluation_system, &[("level", self.prompts.learner_level.as_str())]);
    let items = exercise
      .items
      .iter()
      .map(|i| format!("- [{}] \"{}\" ({}): {}", i.id, i.content, i.lexical_type.as_str(), i.definition.as_deref().unwrap_or("")))
      .collect::<Vec<_>>()
      .join("\n");
    let user = fill_template(
      &self.prompts.evaluation_user_template,
      &[
        ("exercise_type", exercise_type_name(exercise).as_str()),
        ("prompt", exercise.prompt.as_str()),
        ("items", items.as_str()),
        ("response", response),
      ],
    );
    (system, user)
  }
}

fn exercise_type_name(exercise: &Exercise) -> String {
  serde_json::to_value(exercise.exercise_type)
    .ok()
    .and_then(|v| v.as_str().map(str::to_string))
    .unwrap_or_default()
}

#[async_trait]
impl Evaluator for OpenAiEvaluator {
  #[instrument(level = "info", skip(self, exercise, response), fields(id = %exercise.id, response_len = response.len()))]
  async fn evaluate(&self, exercise: &Exercise, response: &str, mode: ResponseMode) -> ExerciseResult {
    let (system, user) = self.render(exercise, response);
    let start = std::time::Instant::now();
    match self.client.chat_json::<ModelEvaluation>(&system, &user, 0.3).await {
      Ok(reply) => {
        info!(target: "exercise", elapsed = ?start.elapsed(), "Model evaluation received");
        reply.into_result(exercise, response, mode)
      }
      Err(e) => {
        error!(target: "exercise", elapsed = ?start.elapsed(), error = %e, response = %trunc_for_log(response, 80), "Model evaluation failed; using local heuristics");
        self.fallback.score(exercise, response, mode)
      }
    }
  }
}

// --- Model reply ---

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ModelScores {
  grammar: Option<i64>,
  vocabulary: Option<i64>,
  naturalness: Option<i64>,
  item_usage: Option<i64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ModelEvaluation {
  scores: Option<ModelScores>,
  feedback: String,
  corrections: Vec<Correction>,
  items_used_correctly: Vec<ItemId>,
  missed_opportunities: Vec<MissedOpportunity>,
}

impl ModelEvaluation {
  /// Clamp scores into 1..=5 and drop item ids that are not targets of the exercise.
  fn into_result(self, exercise: &Exercise, response: &str, mode: ResponseMode) -> ExerciseResult {
    let scores = match self.scores {
      Some(s) => {
        let pick = |v: Option<i64>| v.unwrap_or(3).clamp(1, 5) as u8;
        Scores {
          grammar: pick(s.grammar),
          vocabulary: pick(s.vocabulary),
          naturalness: pick(s.naturalness),
          item_usage: pick(s.item_usage),
        }
      }
      None => {
        warn!(target: "exercise", "Model reply had no scores; using neutral");
        Scores::NEUTRAL
      }
    };

    let targets: HashSet<ItemId> = exercise.items.iter().map(|i| i.id).collect();
    let mut seen = HashSet::new();
    let used: Vec<ItemId> = self
      .items_used_correctly
      .into_iter()
      .filter(|id| targets.contains(id) && seen.insert(*id))
      .collect();
    let missed = self
      .missed_opportunities
      .into_iter()
      .filter(|m| targets.contains(&m.item_id) && !used.contains(&m.item_id))
      .collect();

    ExerciseResult {
      exercise_id: exercise.id.clone(),
      response: response.to_string(),
      response_mode: mode,
      xp_earned: xp_for(&scores, used.len(), exercise.difficulty),
      scores,
      feedback: if self.feedback.is_empty() { "Evaluation completed.".into() } else { self.feedback },
      corrections: self.corrections,
      items_used_correctly: used,
      missed_opportunities: missed,
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
