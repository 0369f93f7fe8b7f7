//! Fixed difficulty table for the concept catalog.

use serde::Serialize;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
  Easy,
  Medium,
  Hard,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ConceptDifficulty {
  pub level: DifficultyLevel,
  pub description: &'static str,
}

const TABLE: [(&str, DifficultyLevel, &str); 10] = [
  ("basic SELECT and FROM", DifficultyLevel::Easy, "Basic data retrieval"),
  ("basic WHERE clause", DifficultyLevel::Easy, "Simple filtering"),
  ("pattern matching with LIKE", DifficultyLevel::Easy, "Pattern-based filtering"),
  ("handle NULL values", DifficultyLevel::Medium, "NULL value handling"),
  ("ORDER BY clause", DifficultyLevel::Easy, "Result sorting"),
  ("INSERT Statement", DifficultyLevel::Medium, "Data insertion"),
  ("UPDATE Statement", DifficultyLevel::Medium, "Data modification"),
  ("DELETE Statement", DifficultyLevel::Medium, "Data deletion"),
  ("basic GROUP BY and HAVING", DifficultyLevel::Hard, "Data aggregation"),
  ("basic JOIN usage", DifficultyLevel::Hard, "Table relationships"),
];

/// Difficulty of a concept. Unknown ids get a generic Medium tier.
pub fn classify(concept_id: &str) -> ConceptDifficulty {
  TABLE
    .iter()
    .find(|(id, _, _)| *id == concept_id)
    .map(|(_, level, description)| ConceptDifficulty { level: *level, description: *description })
    .unwrap_or(ConceptDifficulty { level: DifficultyLevel::Medium, description: "Standard challenge" })
}

/// Colour band of a mastery bar.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MasteryBand {
  Learning,
  Progressing,
  Mastered,
}

pub fn mastery_band(level: f64) -> MasteryBand {
  if level >= crate::domain::MASTERY_THRESHOLD {
    MasteryBand::Mastered
  } else if level >= 0.5 {
    MasteryBand::Progressing
  } else {
    MasteryBand::Learning
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ALL_CONCEPTS;

  #[test]
  fn every_catalog_concept_has_an_entry() {
    for c in ALL_CONCEPTS {
      assert_ne!(classify(c).description, "Standard challenge", "{c} missing from table");
    }
  }

  #[test]
  fn known_concepts_map_to_their_tier() {
    assert_eq!(classify("basic JOIN usage").level, DifficultyLevel::Hard);
    assert_eq!(classify("basic SELECT and FROM").level, DifficultyLevel::Easy);
    assert_eq!(classify("handle NULL values").description, "NULL value handling");
  }

  #[test]
  fn unknown_concepts_fail_soft() {
    for c in ["", "WINDOW functions", "join", "  basic JOIN usage "] {
      let d = classify(c);
      assert_eq!(d.level, DifficultyLevel::Medium);
      assert_eq!(d.description, "Standard challenge");
    }
  }

  #[test]
  fn mastery_bands() {
    assert_eq!(mastery_band(0.2), MasteryBand::Learning);
    assert_eq!(mastery_band(0.5), MasteryBand::Progressing);
    assert_eq!(mastery_band(0.8), MasteryBand::Mastered);
  }
}
