//! Seed data: a small built-in English catalog that keeps the app useful
//! without any external store.
//!
//! Ids are stable so learner review state survives restarts of a real store.

use crate::domain::{CefrLevel, Item, ItemId, LexicalType};

struct Seed {
  id: i64,
  content: &'static str,
  ty: LexicalType,
  level: CefrLevel,
  priority: i64,
  definition: &'static str,
  example: &'static str,
}

const SEEDS: &[Seed] = &[
  // phrasal verbs
  Seed { id: 1, content: "look into", ty: LexicalType::PhrasalVerb, level: CefrLevel::B1, priority: 12, definition: "to investigate or examine", example: "I'll look into the problem tomorrow." },
  Seed { id: 2, content: "put off", ty: LexicalType::PhrasalVerb, level: CefrLevel::B1, priority: 15, definition: "to postpone", example: "We put off the meeting until Friday." },
  Seed { id: 3, content: "come up with", ty: LexicalType::PhrasalVerb, level: CefrLevel::B2, priority: 20, definition: "to think of an idea or plan", example: "She came up with a great solution." },
  Seed { id: 4, content: "figure out", ty: LexicalType::PhrasalVerb, level: CefrLevel::B1, priority: 10, definition: "to understand or solve", example: "I can't figure out how this works." },
  Seed { id: 5, content: "get along with", ty: LexicalType::PhrasalVerb, level: CefrLevel::A2, priority: 18, definition: "to have a friendly relationship", example: "I get along with my colleagues." },
  Seed { id: 6, content: "carry out", ty: LexicalType::PhrasalVerb, level: CefrLevel::B2, priority: 25, definition: "to perform or complete a task", example: "The team carried out the tests." },
  Seed { id: 7, content: "run out of", ty: LexicalType::PhrasalVerb, level: CefrLevel::A2, priority: 22, definition: "to have none left", example: "We ran out of coffee." },
  Seed { id: 8, content: "bring up", ty: LexicalType::PhrasalVerb, level: CefrLevel::B1, priority: 30, definition: "to mention a topic", example: "He brought up the budget issue." },
  // vocabulary
  Seed { id: 20, content: "reliable", ty: LexicalType::Vocabulary, level: CefrLevel::B1, priority: 40, definition: "can be trusted", example: "She is a reliable colleague." },
  Seed { id: 21, content: "deadline", ty: LexicalType::Vocabulary, level: CefrLevel::A2, priority: 35, definition: "the latest time something must be done", example: "The deadline is next Monday." },
  Seed { id: 22, content: "straightforward", ty: LexicalType::Vocabulary, level: CefrLevel::B2, priority: 60, definition: "easy to understand or do", example: "The process is quite straightforward." },
  Seed { id: 23, content: "nevertheless", ty: LexicalType::Vocabulary, level: CefrLevel::C1, priority: 80, definition: "in spite of that", example: "It was risky; nevertheless, we tried." },
  Seed { id: 24, content: "schedule", ty: LexicalType::Vocabulary, level: CefrLevel::A1, priority: 30, definition: "a plan of times for events", example: "My schedule is full today." },
  // collocations
  Seed { id: 40, content: "make a decision", ty: LexicalType::Collocation, level: CefrLevel::A2, priority: 14, definition: "to decide", example: "We need to make a decision today." },
  Seed { id: 41, content: "take a break", ty: LexicalType::Collocation, level: CefrLevel::A2, priority: 16, definition: "to stop working for a short time", example: "Let's take a break." },
  Seed { id: 42, content: "meet a deadline", ty: LexicalType::Collocation, level: CefrLevel::B1, priority: 28, definition: "to finish on time", example: "We worked late to meet the deadline." },
  Seed { id: 43, content: "raise awareness", ty: LexicalType::Collocation, level: CefrLevel::B2, priority: 55, definition: "to make people know about something", example: "The campaign raised awareness of the issue." },
  Seed { id: 44, content: "draw a conclusion", ty: LexicalType::Collocation, level: CefrLevel::C1, priority: 70, definition: "to decide something is true from evidence", example: "It's too early to draw a conclusion." },
  // idioms
  Seed { id: 60, content: "break the ice", ty: LexicalType::Idiom, level: CefrLevel::B1, priority: 45, definition: "to make people feel more relaxed", example: "He told a joke to break the ice." },
  Seed { id: 61, content: "a piece of cake", ty: LexicalType::Idiom, level: CefrLevel::A2, priority: 50, definition: "very easy", example: "The exam was a piece of cake." },
  Seed { id: 62, content: "hit the nail on the head", ty: LexicalType::Idiom, level: CefrLevel::B2, priority: 75, definition: "to describe exactly what is causing a problem", example: "You hit the nail on the head." },
  Seed { id: 63, content: "cut corners", ty: LexicalType::Idiom, level: CefrLevel::C1, priority: 85, definition: "to do something badly to save time or money", example: "Don't cut corners on safety." },
  // expressions
  Seed { id: 80, content: "as far as I know", ty: LexicalType::Expression, level: CefrLevel::B1, priority: 33, definition: "according to what I know", example: "As far as I know, the office is closed." },
  Seed { id: 81, content: "it's up to you", ty: LexicalType::Expression, level: CefrLevel::A2, priority: 26, definition: "you decide", example: "Tea or coffee? It's up to you." },
  Seed { id: 82, content: "to be honest", ty: LexicalType::Expression, level: CefrLevel::B1, priority: 24, definition: "speaking frankly", example: "To be honest, I didn't like it." },
  Seed { id: 83, content: "on second thought", ty: LexicalType::Expression, level: CefrLevel::B2, priority: 65, definition: "after reconsidering", example: "On second thought, let's stay in." },
];

/// Built-in English items across every lexical type and A1–C1.
pub fn seed_items() -> Vec<Item> {
  SEEDS
    .iter()
    .map(|s| Item {
      id: ItemId(s.id),
      content: s.content.into(),
      lexical_type: s.ty,
      cefr_level: s.level,
      target_language: "en".into(),
      priority: s.priority,
      definition: Some(s.definition.into()),
      examples: vec![s.example.into()],
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn seeds_are_unique_and_cover_all_types() {
    let items = seed_items();
    let ids: HashSet<ItemId> = items.iter().map(|i| i.id).collect();
    assert_eq!(ids.len(), items.len());
    for ty in LexicalType::ALL {
      assert!(items.iter().any(|i| i.lexical_type == ty), "{ty:?}");
    }
  }
}
