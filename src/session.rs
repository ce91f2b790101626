//! Study session state machine.
//!
//! `Setup → Exercise ⇄ Feedback → Complete`. The container only tracks
//! progress and emits events; generating exercises and evaluating answers
//! happen outside and are fed in through `start` and `record_result`.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Exercise, LearnerId};
use crate::evaluator::ExerciseResult;

const EVENT_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
  Setup,
  Exercise,
  Feedback,
  Complete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
  pub exercises_total: usize,
  pub exercises_done: usize,
  /// Target items practiced across finished exercises.
  pub items_reviewed: usize,
  pub items_correct: usize,
  pub xp_earned: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
  Started { session_id: Uuid, exercises: usize },
  ExerciseShown { index: usize, exercise: Exercise },
  ResultRecorded { index: usize, result: ExerciseResult },
  Completed { summary: SessionSummary, stopped: bool },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("cannot {action} while in {from:?}")]
  InvalidTransition { from: SessionPhase, action: &'static str },
  #[error("result for exercise {got} but {expected} is current")]
  WrongExercise { expected: String, got: String },
}

pub struct StudySession {
  id: Uuid,
  learner: Option<LearnerId>,
  phase: SessionPhase,
  exercises: Vec<Exercise>,
  index: usize,
  summary: SessionSummary,
  events: broadcast::Sender<SessionEvent>,
}

impl StudySession {
  pub fn new(learner: Option<LearnerId>) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      id: Uuid::new_v4(),
      learner,
      phase: SessionPhase::Setup,
      exercises: Vec::new(),
      index: 0,
      summary: SessionSummary::default(),
      events,
    }
  }

  pub fn id(&self) -> Uuid { self.id }
  pub fn learner(&self) -> Option<&LearnerId> { self.learner.as_ref() }
  pub fn phase(&self) -> SessionPhase { self.phase }
  pub fn summary(&self) -> SessionSummary { self.summary }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.events.subscribe()
  }

  /// Exercise awaiting an answer, if any.
  pub fn current(&self) -> Option<&Exercise> {
    match self.phase {
      SessionPhase::Exercise | SessionPhase::Feedback => self.exercises.get(self.index),
      _ => None,
    }
  }

  /// Load the exercises and show the first. An empty list completes at once.
  pub fn start(&mut self, exercises: Vec<Exercise>) -> Result<Option<&Exercise>, SessionError> {
    self.expect(SessionPhase::Setup, "start")?;
    self.summary.exercises_total = exercises.len();
    self.exercises = exercises;
    self.index = 0;
    info!(target: "exercise", session = %self.id, exercises = self.exercises.len(), "Study session started");
    self.emit(SessionEvent::Started { session_id: self.id, exercises: self.exercises.len() });
    Ok(self.show_current())
  }

  pub fn record_result(&mut self, result: ExerciseResult) -> Result<(), SessionError> {
    self.expect(SessionPhase::Exercise, "record a result")?;
    let Some(current) = self.exercises.get(self.index) else {
      return Err(SessionError::InvalidTransition { from: self.phase, action: "record a result" });
    };
    if current.id != result.exercise_id {
      return Err(SessionError::WrongExercise { expected: current.id.clone(), got: result.exercise_id });
    }
    self.summary.exercises_done += 1;
    self.summary.items_reviewed += current.items.len();
    self.summary.items_correct += result.items_used_correctly.len();
    self.summary.xp_earned += result.xp_earned;
    self.phase = SessionPhase::Feedback;
    debug!(target: "exercise", session = %self.id, index = self.index, xp = result.xp_earned, "Result recorded");
    self.emit(SessionEvent::ResultRecorded { index: self.index, result });
    Ok(())
  }

  /// Move past the feedback screen; `None` once the session is complete.
  pub fn advance(&mut self) -> Result<Option<&Exercise>, SessionError> {
    self.expect(SessionPhase::Feedback, "advance")?;
    self.index += 1;
    Ok(self.show_current())
  }

  /// End early from any phase but `Complete`.
  pub fn stop(&mut self) -> Result<SessionSummary, SessionError> {
    if self.phase == SessionPhase::Complete {
      return Err(SessionError::InvalidTransition { from: self.phase, action: "stop" });
    }
    self.complete(true);
    Ok(self.summary)
  }

  fn show_current(&mut self) -> Option<&Exercise> {
    if self.index >= self.exercises.len() {
      self.complete(false);
      return None;
    }
    self.phase = SessionPhase::Exercise;
    self.emit(SessionEvent::ExerciseShown { index: self.index, exercise: self.exercises[self.index].clone() });
    self.exercises.get(self.index)
  }

  fn complete(&mut self, stopped: bool) {
    self.phase = SessionPhase::Complete;
    info!(
      target: "exercise",
      session = %self.id,
      stopped,
      done = self.summary.exercises_done,
      xp = self.summary.xp_earned,
      "Study session complete"
    );
    self.emit(SessionEvent::Completed { summary: self.summary, stopped });
  }

  fn expect(&self, phase: SessionPhase, action: &'static str) -> Result<(), SessionError> {
    if self.phase == phase {
      Ok(())
    } else {
      Err(SessionError::InvalidTransition { from: self.phase, action })
    }
  }

  fn emit(&self, event: SessionEvent) {
    // No subscribers is fine.
    let _ = self.events.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{CefrLevel, ExerciseType, LexicalType, ResponseMode};
  use crate::evaluator::LocalEvaluator;
  use crate::generator::build_exercise;
  use crate::store::testing::item;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn exercises(n: i64) -> Vec<Exercise> {
    let mut rng = StdRng::seed_from_u64(11);
    (1..=n)
      .map(|i| build_exercise(ExerciseType::SituationResponse, vec![item(i, LexicalType::Idiom, CefrLevel::B1, i)], &mut rng))
      .collect()
  }

  #[test]
  fn full_walkthrough_tracks_summary() {
    let mut s = StudySession::new(None);
    let mut rx = s.subscribe();
    let first = s.start(exercises(2)).unwrap().cloned().unwrap();
    assert_eq!(s.phase(), SessionPhase::Exercise);

    let r = LocalEvaluator.score(&first, "I used item-1 here", ResponseMode::Written);
    let xp1 = r.xp_earned;
    s.record_result(r).unwrap();
    assert_eq!(s.phase(), SessionPhase::Feedback);
    assert!(s.advance().unwrap().is_some());

    let second = s.current().cloned().unwrap();
    let r = LocalEvaluator.score(&second, "nothing relevant", ResponseMode::Written);
    let xp2 = r.xp_earned;
    s.record_result(r).unwrap();
    assert!(s.advance().unwrap().is_none());
    assert_eq!(s.phase(), SessionPhase::Complete);

    let sum = s.summary();
    assert_eq!((sum.exercises_total, sum.exercises_done), (2, 2));
    assert_eq!((sum.items_reviewed, sum.items_correct), (2, 1));
    assert_eq!(sum.xp_earned, xp1 + xp2);

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
      kinds.push(match ev {
        SessionEvent::Started { .. } => "started",
        SessionEvent::ExerciseShown { .. } => "shown",
        SessionEvent::ResultRecorded { .. } => "result",
        SessionEvent::Completed { stopped, .. } => if stopped { "stopped" } else { "completed" },
      });
    }
    assert_eq!(kinds, vec!["started", "shown", "result", "shown", "result", "completed"]);
  }

  #[test]
  fn illegal_transitions_are_rejected() {
    let mut s = StudySession::new(None);
    assert!(matches!(s.advance(), Err(SessionError::InvalidTransition { from: SessionPhase::Setup, .. })));
    s.start(exercises(1)).unwrap();
    assert!(s.start(exercises(1)).is_err());
    assert!(s.advance().is_err());

    let wrong = LocalEvaluator.score(&exercises(1)[0], "x", ResponseMode::Written);
    let mut foreign = wrong.clone();
    foreign.exercise_id = "other".into();
    assert!(matches!(s.record_result(foreign), Err(SessionError::WrongExercise { .. })));

    let summary = s.stop().unwrap();
    assert_eq!(summary.exercises_done, 0);
    assert_eq!(s.phase(), SessionPhase::Complete);
    assert!(s.stop().is_err());
    assert!(s.current().is_none());
  }

  #[test]
  fn empty_session_completes_immediately() {
    let mut s = StudySession::new(None);
    assert!(s.start(Vec::new()).unwrap().is_none());
    assert_eq!(s.phase(), SessionPhase::Complete);
  }
}
