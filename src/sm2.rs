//! SM-2 interval engine.
//!
//! Pure: the only ambient input is "today", which callers take from a
//! [`Clock`] so tests can pin the date.

use chrono::{Duration, NaiveDate, Utc};

use crate::domain::{Quality, MIN_EASE_FACTOR};

/// Source of the current date.
pub trait Clock: Send + Sync {
  fn today(&self) -> NaiveDate;
  fn now(&self) -> chrono::DateTime<Utc>;
}

/// Wall clock (UTC).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn today(&self) -> NaiveDate { Utc::now().date_naive() }
  fn now(&self) -> chrono::DateTime<Utc> { Utc::now() }
}

/// Clock frozen at a given instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub chrono::DateTime<Utc>);

impl FixedClock {
  pub fn on(date: NaiveDate) -> Self {
    Self(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
  }
}

impl Clock for FixedClock {
  fn today(&self) -> NaiveDate { self.0.date_naive() }
  fn now(&self) -> chrono::DateTime<Utc> { self.0 }
}

/// Output of one SM-2 step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sm2Outcome {
  pub ease_factor: f64,
  pub interval_days: u32,
  pub repetitions: u32,
  pub next_review: NaiveDate,
}

/// Ease update: `EF + (0.1 - (5-q)(0.08 + (5-q)0.02))`, floored at 1.3.
pub fn next_ease_factor(quality: Quality, ease_factor: f64) -> f64 {
  let d = (Quality::MAX - quality.value()) as f64;
  (ease_factor + (0.1 - d * (0.08 + d * 0.02))).max(MIN_EASE_FACTOR)
}

/// Compute the schedule after a review of the given quality.
///
/// A lapse (quality < 3) restarts the schedule at one day. Passing reviews
/// grow the interval 1 → 6 → `round(previous × EF')`. The returned ease
/// factor is rounded to two decimals; the interval uses the unrounded value.
pub fn next_state(
  quality: Quality,
  ease_factor: f64,
  interval_days: u32,
  repetitions: u32,
  today: NaiveDate,
) -> Sm2Outcome {
  let ef = next_ease_factor(quality, ease_factor);

  let (interval, reps) = if !quality.is_pass() {
    (1, 0)
  } else {
    let reps = repetitions.saturating_add(1);
    let interval = match reps {
      1 => 1,
      2 => 6,
      _ => (interval_days as f64 * ef).round() as u32,
    };
    (interval, reps)
  };

  Sm2Outcome {
    ease_factor: ((ef * 100.0).round() / 100.0).max(MIN_EASE_FACTOR),
    interval_days: interval,
    repetitions: reps,
    next_review: today + Duration::days(interval as i64),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn q(v: u8) -> Quality { Quality::new(v).unwrap() }
  fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 10).unwrap() }

  #[test]
  fn lapse_resets_regardless_of_history() {
    for quality in 0..3 {
      for (interval, reps) in [(0, 0), (6, 2), (40, 7)] {
        let out = next_state(q(quality), 2.5, interval, reps, day());
        assert_eq!(out.repetitions, 0);
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.next_review, day() + Duration::days(1));
      }
    }
  }

  #[test]
  fn passing_reviews_follow_one_six_then_growth() {
    for quality in 3..=5 {
      let first = next_state(q(quality), 2.5, 0, 0, day());
      assert_eq!((first.repetitions, first.interval_days), (1, 1));

      let second = next_state(q(quality), 2.5, 1, 1, day());
      assert_eq!((second.repetitions, second.interval_days), (2, 6));

      let third = next_state(q(quality), 2.5, 6, 2, day());
      let ef = next_ease_factor(q(quality), 2.5);
      assert_eq!(third.repetitions, 3);
      assert_eq!(third.interval_days, (6.0 * ef).round() as u32);
    }
  }

  #[test]
  fn easy_review_on_second_repetition() {
    let out = next_state(q(5), 2.5, 6, 2, day());
    assert!((out.ease_factor - 2.6).abs() < 1e-9);
    assert_eq!(out.repetitions, 3);
    assert_eq!(out.interval_days, 16);
    assert_eq!(out.next_review, day() + Duration::days(16));
  }

  #[test]
  fn quality_four_keeps_ease() {
    assert!((next_ease_factor(q(4), 2.5) - 2.5).abs() < 1e-9);
    assert!(next_ease_factor(q(5), 2.5) > 2.5);
    assert!(next_ease_factor(q(3), 2.5) < 2.5);
  }

  #[test]
  fn ease_never_drops_below_floor() {
    let mut ef = 2.5;
    let mut interval = 10;
    let mut reps = 5;
    for _ in 0..20 {
      let out = next_state(q(0), ef, interval, reps, day());
      ef = out.ease_factor;
      interval = out.interval_days;
      reps = out.repetitions;
      assert!(ef >= MIN_EASE_FACTOR);
    }
    assert!((ef - MIN_EASE_FACTOR).abs() < 1e-9);
  }

  #[test]
  fn deterministic_for_identical_inputs() {
    let a = next_state(q(4), 2.36, 15, 4, day());
    let b = next_state(q(4), 2.36, 15, 4, day());
    assert_eq!(a, b);
  }
}
