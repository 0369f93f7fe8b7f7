//! Domain models shared by the play loop: themes, concepts, table snapshots,
//! challenge/attempt state and the task board.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Named SQL skill the player is tested on. Free-form so that unknown ids from
/// older clients still flow through (see `difficulty::classify`).
pub type ConceptId = String;

/// One result row, column name -> value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The ten concepts offered at setup, in catalog order.
pub const ALL_CONCEPTS: [&str; 10] = [
  "basic SELECT and FROM",
  "basic WHERE clause",
  "pattern matching with LIKE",
  "handle NULL values",
  "ORDER BY clause",
  "INSERT Statement",
  "UPDATE Statement",
  "DELETE Statement",
  "basic GROUP BY and HAVING",
  "basic JOIN usage",
];

/// Mastery at or above this value counts the concept as mastered.
pub const MASTERY_THRESHOLD: f64 = 0.8;

/// Mastery every chosen concept starts with.
pub const INITIAL_MASTERY: f64 = 0.2;

/// Narrative skin wrapping the same SQL exercises.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
  Cyberpunk,
  Fantasy,
  RealWorld,
}

impl Theme {
  pub const ALL: [Theme; 3] = [Theme::Cyberpunk, Theme::Fantasy, Theme::RealWorld];

  pub fn as_str(&self) -> &'static str {
    match self {
      Theme::Cyberpunk => "cyberpunk",
      Theme::Fantasy => "fantasy",
      Theme::RealWorld => "real-world",
    }
  }
}

impl fmt::Display for Theme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A named table and its rows, as shown to the player and to the generator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableSnapshot {
  pub name: String,
  #[serde(default)]
  pub rows: Vec<Row>,
}

/// The challenge currently on screen.
#[derive(Clone, Debug, Serialize)]
pub struct Challenge {
  pub theme: Theme,
  pub concept: ConceptId,
  /// Which pre-authored expected-result variant of `concept` is active.
  pub choice_index: usize,
  pub narrative: String,
  /// Indexed by position in the player's chosen concept list.
  pub mastery_levels: Vec<f64>,
}

impl Challenge {
  /// Replace mastery levels with the backend's view. Values are clamped to
  /// [0, 1]; the vector never shrinks below `min_len`.
  pub fn set_mastery(&mut self, levels: &[f64], min_len: usize) {
    let len = levels.len().max(min_len).max(self.mastery_levels.len());
    self.mastery_levels.resize(len, INITIAL_MASTERY);
    for (slot, v) in self.mastery_levels.iter_mut().zip(levels) {
      *slot = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    }
  }

  pub fn mastery_at(&self, index: usize) -> Option<f64> {
    self.mastery_levels.get(index).copied()
  }
}

/// Per-question attempt bookkeeping.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct Attempts {
  pub attempts: u32,
  pub hint_requested: bool,
  pub answer_revealed: bool,
}

impl Attempts {
  pub fn reset(&mut self) {
    *self = Attempts::default();
  }
}

/// One line of the task board.
#[derive(Clone, Debug, Serialize)]
pub struct TaskStatus {
  pub task_name: String,
  pub correct: bool,
  pub concept: ConceptId,
  pub narrative: String,
}

/// A graded query together with the rows the backend produced for it.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryEntry {
  pub user_query: String,
  pub db_result: String,
}
