//! Query fixtures keyed by (theme, concept): the tables a challenge runs
//! against and the pre-authored expected-result variants.
//!
//! The bank is validated once at startup; a missing combination at runtime is
//! an error rather than a silent empty challenge.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Row, TableSnapshot, Theme, ALL_CONCEPTS};
use crate::error::GameError;

/// One authored question: the tables shown to the player and the rows a
/// correct query returns (or the table state it leaves behind).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryVariant {
  /// Plain-language task, used when no narrative generator is configured.
  #[serde(default)]
  pub brief: String,
  pub input: Vec<TableSnapshot>,
  #[serde(default)]
  pub expected: Vec<Row>,
}

#[derive(Clone, Debug, Default)]
pub struct QueryBank {
  entries: HashMap<(Theme, String), Vec<QueryVariant>>,
}

impl QueryBank {
  pub fn insert(&mut self, theme: Theme, concept: &str, variant: QueryVariant) {
    self.entries.entry((theme, concept.to_string())).or_default().push(variant);
  }

  /// Drop every variant of a combination and use `variants` instead.
  pub fn replace(&mut self, theme: Theme, concept: &str, variants: Vec<QueryVariant>) {
    self.entries.insert((theme, concept.to_string()), variants);
  }

  /// Every catalog concept must have at least one variant for every theme, and
  /// every variant must show at least one named table.
  pub fn validate(&self) -> Result<(), GameError> {
    for theme in Theme::ALL {
      for concept in ALL_CONCEPTS {
        let variants = self.variants(theme, concept)?;
        if variants.is_empty() {
          return Err(GameError::FixtureMissing { theme, concept: concept.to_string() });
        }
      }
    }
    for ((theme, concept), variants) in &self.entries {
      for (i, v) in variants.iter().enumerate() {
        if v.input.is_empty() || v.input.iter().any(|t| t.name.trim().is_empty()) {
          return Err(GameError::Config(format!(
            "fixture {theme}/{concept}#{i} must name at least one table"
          )));
        }
      }
    }
    Ok(())
  }

  pub fn variants(&self, theme: Theme, concept: &str) -> Result<&[QueryVariant], GameError> {
    self
      .entries
      .get(&(theme, concept.to_string()))
      .map(|v| v.as_slice())
      .ok_or_else(|| GameError::FixtureMissing { theme, concept: concept.to_string() })
  }

  /// The active variant. An out-of-range choice is a local configuration
  /// error, reported before anything is sent to the backend.
  pub fn variant(&self, theme: Theme, concept: &str, choice: usize) -> Result<&QueryVariant, GameError> {
    let variants = self.variants(theme, concept)?;
    variants.get(choice).ok_or_else(|| {
      GameError::InvalidLocalConfiguration(format!(
        "answer index {choice} exceeds the {} variant(s) of '{concept}'",
        variants.len()
      ))
    })
  }

  pub fn random_choice(&self, theme: Theme, concept: &str) -> Result<usize, GameError> {
    let n = self.variants(theme, concept)?.len();
    if n == 0 {
      return Err(GameError::FixtureMissing { theme, concept: concept.to_string() });
    }
    Ok(rand::thread_rng().gen_range(0..n))
  }

  /// Number of authored questions across all themes and concepts.
  pub fn variant_count(&self) -> usize {
    self.entries.values().map(Vec::len).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::seed_bank;

  #[test]
  fn seed_bank_covers_every_theme_and_concept() {
    let bank = seed_bank();
    bank.validate().expect("seed bank valid");
    assert!(bank.variant_count() >= Theme::ALL.len() * ALL_CONCEPTS.len());
  }

  #[test]
  fn out_of_range_choice_is_a_local_configuration_error() {
    let bank = seed_bank();
    let n = bank.variants(Theme::Fantasy, "basic WHERE clause").expect("variants").len();
    let err = bank.variant(Theme::Fantasy, "basic WHERE clause", n).unwrap_err();
    assert!(matches!(err, GameError::InvalidLocalConfiguration(_)), "{err:?}");
  }

  #[test]
  fn missing_combination_fails_fast() {
    let mut bank = seed_bank();
    assert!(matches!(
      bank.variants(Theme::Cyberpunk, "WINDOW functions"),
      Err(GameError::FixtureMissing { .. })
    ));

    bank.replace(Theme::RealWorld, "basic JOIN usage", Vec::new());
    assert!(matches!(bank.validate(), Err(GameError::FixtureMissing { .. })));
  }

  #[test]
  fn variant_without_tables_is_rejected() {
    let mut bank = seed_bank();
    bank.insert(
      Theme::Cyberpunk,
      "basic WHERE clause",
      QueryVariant { brief: String::new(), input: Vec::new(), expected: Vec::new() },
    );
    assert!(matches!(bank.validate(), Err(GameError::Config(_))));
  }

  #[test]
  fn random_choice_stays_in_range() {
    let bank = seed_bank();
    let n = bank.variants(Theme::Cyberpunk, "pattern matching with LIKE").expect("variants").len();
    assert_eq!(n, 2);
    for _ in 0..20 {
      let c = bank.random_choice(Theme::Cyberpunk, "pattern matching with LIKE").expect("choice");
      assert!(c < n);
    }
  }
}
