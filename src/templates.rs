//! Static exercise table: per-type category, difficulty, input mode, time
//! estimate and prompt templates, plus the filler pools used to fill
//! `{topic}`, `{action}` and `{question}`.
//!
//! The attribute table is a contract with UI consumers. Change it only
//! together with them.

use serde::Serialize;

use crate::domain::{ExerciseCategory, ExerciseType, InputMode};

pub struct ExerciseTemplate {
  pub category: ExerciseCategory,
  pub difficulty: u8,
  pub input_mode: InputMode,
  /// Seconds.
  pub time_estimate: u32,
  pub prompts: &'static [&'static str],
}

fn t(
  category: ExerciseCategory,
  difficulty: u8,
  input_mode: InputMode,
  time_estimate: u32,
  prompts: &'static [&'static str],
) -> ExerciseTemplate {
  ExerciseTemplate { category, difficulty, input_mode, time_estimate, prompts }
}

pub fn template(ty: ExerciseType) -> ExerciseTemplate {
  use ExerciseCategory::*;
  use ExerciseType::*;
  use InputMode::*;

  match ty {
    SituationResponse => t(Speaking, 2, Both, 60, &[
      "Your friend is stressed about {topic}. What would you tell them?",
      "You're at work and need to {action}. How would you start the conversation?",
      "A colleague asks about your weekend. Describe what you did.",
      "You're explaining to someone why you were late. What do you say?",
      "Your boss asks for your opinion on {topic}. How do you respond?",
    ]),
    Roleplay => t(Speaking, 3, Both, 90, &[
      "You're in a job interview. The interviewer asks: '{question}'",
      "You're calling customer service to complain about {issue}.",
      "You're at a restaurant and there's a problem with your order.",
      "You're negotiating a deadline with your project manager.",
      "You're giving feedback to a colleague about their work.",
    ]),
    PictureDescription => t(Speaking, 2, Both, 60, &[
      "Describe a typical morning in your life.",
      "Describe your ideal workspace.",
      "Describe what's happening at a busy train station.",
    ]),
    OpinionExpress => t(Speaking, 3, Both, 90, &[
      "Do you think remote work is better than office work? Explain.",
      "What's your opinion on {topic}? Give at least two reasons.",
      "Some people say {statement}. Do you agree or disagree?",
    ]),
    StoryContinue => t(Speaking, 2, Both, 60, &[
      "Continue this story: 'Last week, something unexpected happened at work...'",
      "Continue: 'I was walking home when I suddenly...'",
    ]),
    ContextResponse => t(Writing, 2, Write, 120, &[
      "Your manager emails asking why a project is delayed. Write a brief response.",
      "A friend asks for advice about {topic}. Write your response.",
      "You need to explain a technical problem to a non-technical person.",
    ]),
    EmailDraft => t(Writing, 3, Write, 180, &[
      "Write a formal email to schedule a meeting with a client.",
      "Write an informal email to a colleague about {topic}.",
      "Write an email apologizing for missing a deadline.",
    ]),
    Paraphrase => t(Writing, 2, Write, 60, &[
      "Rewrite this sentence using '{phrasal_verb}': {original_sentence}",
      "Express the same idea using the word '{word}': {original_sentence}",
    ]),
    ErrorCorrection => t(Grammar, 2, Write, 45, &[
      "Find and correct the error: '{sentence_with_error}'",
      "This sentence has a common Italian-speaker mistake. Fix it: '{sentence}'",
    ]),
    Dictation => t(Listening, 2, Write, 60, &["Listen and write exactly what you hear."]),
    Comprehension => t(Listening, 2, Write, 90, &["Listen to the audio and answer: {question}"]),
    TenseTransform => t(Grammar, 2, Write, 45, &[
      "Change this sentence to {target_tense}: '{sentence}'",
      "Rewrite in the passive voice: '{sentence}'",
    ]),
    L1InterferenceFix => t(Grammar, 2, Write, 45, &[
      "An Italian speaker wrote: '{italian_error}'. What's wrong and how do you fix it?",
    ]),
    SentenceBuild => t(Grammar, 2, Write, 60, &[
      "Create a sentence using: {word1}, {word2}, {word3}",
      "Build a question using '{phrasal_verb}'",
    ]),
    MultiItemScenario => t(Speaking, 3, Both, 120, &[
      "You're in a meeting. Use ALL of these in your response: {items_list}",
      "Describe your day using these expressions: {items_list}",
    ]),
  }
}

pub const TOPICS: &[&str] = &[
  "work-life balance", "a new project", "learning English",
  "technology", "remote work", "their career", "a decision",
  "travel plans", "a difficult situation", "time management",
];

pub const ACTIONS: &[&str] = &[
  "ask for a day off", "report a problem", "suggest an idea",
  "discuss a deadline", "give feedback", "request help",
  "explain a delay", "propose a solution",
];

pub const QUESTIONS: &[&str] = &[
  "What are your strengths?", "Where do you see yourself in 5 years?",
  "Why do you want this position?", "Tell me about a challenge you faced.",
  "How do you handle pressure?",
];

/// Human-facing label and one-line description.
pub fn describe(ty: ExerciseType) -> (&'static str, &'static str) {
  use ExerciseType::*;
  match ty {
    SituationResponse => ("Respond to Situation", "React naturally to a scenario"),
    Roleplay => ("Roleplay", "Act out a conversation"),
    PictureDescription => ("Describe", "Describe what you see"),
    OpinionExpress => ("Express Opinion", "Share and defend your view"),
    StoryContinue => ("Continue Story", "Keep the story going"),
    ContextResponse => ("Written Response", "Write a natural reply"),
    EmailDraft => ("Write Email", "Compose a professional email"),
    Paraphrase => ("Paraphrase", "Rewrite using target word"),
    ErrorCorrection => ("Fix Error", "Find and correct mistakes"),
    Dictation => ("Dictation", "Write what you hear"),
    Comprehension => ("Listen & Answer", "Answer based on audio"),
    TenseTransform => ("Change Tense", "Transform the sentence"),
    L1InterferenceFix => ("Italian Error", "Fix common Italian mistake"),
    SentenceBuild => ("Build Sentence", "Create using given words"),
    MultiItemScenario => ("Integration", "Use multiple items together"),
  }
}

/// Row of the public exercise-type table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseTypeInfo {
  #[serde(rename = "type")]
  pub exercise_type: ExerciseType,
  pub label: &'static str,
  pub description: &'static str,
  pub category: ExerciseCategory,
  pub difficulty: u8,
  pub input_mode: InputMode,
  pub time_estimate: u32,
}

pub fn catalog() -> Vec<ExerciseTypeInfo> {
  ExerciseType::ALL
    .iter()
    .map(|&ty| {
      let t = template(ty);
      let (label, description) = describe(ty);
      ExerciseTypeInfo {
        exercise_type: ty,
        label,
        description,
        category: t.category,
        difficulty: t.difficulty,
        input_mode: t.input_mode,
        time_estimate: t.time_estimate,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_is_stable() {
    let row = |ty| {
      let t = template(ty);
      (t.category, t.difficulty, t.input_mode, t.time_estimate)
    };
    assert_eq!(row(ExerciseType::SituationResponse), (ExerciseCategory::Speaking, 2, InputMode::Both, 60));
    assert_eq!(row(ExerciseType::Roleplay), (ExerciseCategory::Speaking, 3, InputMode::Both, 90));
    assert_eq!(row(ExerciseType::EmailDraft), (ExerciseCategory::Writing, 3, InputMode::Write, 180));
    assert_eq!(row(ExerciseType::ErrorCorrection), (ExerciseCategory::Grammar, 2, InputMode::Write, 45));
    assert_eq!(row(ExerciseType::Comprehension), (ExerciseCategory::Listening, 2, InputMode::Write, 90));
    assert_eq!(row(ExerciseType::MultiItemScenario), (ExerciseCategory::Speaking, 3, InputMode::Both, 120));
  }

  #[test]
  fn every_type_has_prompts() {
    for ty in ExerciseType::ALL {
      assert!(!template(ty).prompts.is_empty(), "{ty:?}");
      assert!((1..=3).contains(&template(ty).difficulty));
    }
    assert_eq!(catalog().len(), 15);
  }
}
