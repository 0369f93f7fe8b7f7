//! Achievement bookkeeping: cumulative counters and the badges they unlock.
//!
//! `apply_outcome` is the only way progress changes. It is pure: callers keep
//! the returned value and drop the old one.

use serde::Serialize;

use crate::domain::{ConceptId, ALL_CONCEPTS};
use crate::fixtures::QueryBank;

/// Which counter a badge requirement is measured against.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
  Questions,
  Concepts,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Badge {
  pub id: &'static str,
  pub name: &'static str,
  pub short_description: &'static str,
  pub description: &'static str,
  pub icon: &'static str,
  pub unlocked: bool,
  pub requirement: u32,
  pub kind: BadgeKind,
  /// Guided unlock sequence, ascending.
  pub order: u32,
}

impl Badge {
  const fn locked(
    id: &'static str,
    name: &'static str,
    short_description: &'static str,
    description: &'static str,
    icon: &'static str,
    requirement: u32,
    kind: BadgeKind,
    order: u32,
  ) -> Self {
    Self { id, name, short_description, description, icon, unlocked: false, requirement, kind, order }
  }

  fn is_met(&self, questions: u32, concepts: u32) -> bool {
    match self.kind {
      BadgeKind::Questions => questions >= self.requirement,
      BadgeKind::Concepts => concepts >= self.requirement,
    }
  }
}

const BADGES: [Badge; 8] = [
  Badge::locked("question-master-3", "SQL Beginner", "3 questions", "Completed 3 questions", "target", 3, BadgeKind::Questions, 1),
  Badge::locked("concept-master-1", "Concept Initiate", "1 concept", "Mastered your first SQL concept", "star", 1, BadgeKind::Concepts, 2),
  Badge::locked("question-master-10", "SQL Apprentice", "10 questions", "Completed 10 questions", "award", 10, BadgeKind::Questions, 3),
  Badge::locked("concept-master-3", "Concept Explorer", "3 concepts", "Mastered 3 SQL concepts", "star", 3, BadgeKind::Concepts, 4),
  Badge::locked("question-master-30", "SQL Expert", "30 questions", "Completed 30 questions", "medal", 30, BadgeKind::Questions, 5),
  Badge::locked("concept-master-5", "Concept Scholar", "5 concepts", "Mastered 5 SQL concepts", "book", 5, BadgeKind::Concepts, 6),
  Badge::locked("question-master-50", "SQL Master", "50 questions", "Completed 50 questions", "trophy", 50, BadgeKind::Questions, 7),
  Badge::locked("concept-master-10", "Concept Grandmaster", "10 concepts", "Mastered every SQL concept", "crown", 10, BadgeKind::Concepts, 8),
];

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Progress {
  pub completed_questions: u32,
  pub completed_concepts: u32,
  /// Deduplicated, in the order concepts were first mastered.
  pub unique_concepts: Vec<ConceptId>,
  pub badges: Vec<Badge>,
}

/// Fresh progress: zero counters, no concepts, every badge locked.
pub fn initialize_progress() -> Progress {
  let mut badges = BADGES.to_vec();
  badges.sort_by_key(|b| b.order);
  Progress {
    completed_questions: 0,
    completed_concepts: 0,
    unique_concepts: Vec::new(),
    badges,
  }
}

/// Apply one graded submission.
pub fn apply_outcome(
  progress: &Progress,
  question_completed: bool,
  mastered_concept: Option<&str>,
) -> Progress {
  let mut next = progress.clone();

  if question_completed {
    next.completed_questions = next.completed_questions.saturating_add(1);
  }

  if let Some(concept) = mastered_concept {
    if !next.unique_concepts.iter().any(|c| c == concept) {
      next.unique_concepts.push(concept.to_string());
    }
  }
  next.completed_concepts = next.unique_concepts.len() as u32;

  let (questions, concepts) = (next.completed_questions, next.completed_concepts);
  for badge in &mut next.badges {
    // Once earned, a badge stays earned.
    badge.unlocked = badge.unlocked || badge.is_met(questions, concepts);
  }

  next
}

/// The lowest-order locked badge, shown as "next to earn". Badges are offered
/// in sequence: nothing is offered while an earlier badge is still locked,
/// which is exactly "the first locked badge in order".
pub fn next_badge(progress: &Progress) -> Option<&Badge> {
  let mut ordered: Vec<&Badge> = progress.badges.iter().collect();
  ordered.sort_by_key(|b| b.order);
  ordered.into_iter().find(|b| !b.unlocked)
}

/// Badges the renderer should draw: everything earned plus the next target.
pub fn visible_badges(progress: &Progress) -> Vec<Badge> {
  let next_id = next_badge(progress).map(|b| b.id);
  let mut out: Vec<Badge> = progress
    .badges
    .iter()
    .filter(|b| b.unlocked || Some(b.id) == next_id)
    .cloned()
    .collect();
  out.sort_by_key(|b| b.order);
  out
}

/// Number of authored questions across every theme and concept.
pub fn total_questions(bank: &QueryBank) -> usize {
  bank.variant_count()
}

pub fn total_concepts() -> usize {
  ALL_CONCEPTS.len()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn badge<'a>(p: &'a Progress, id: &str) -> &'a Badge {
    p.badges.iter().find(|b| b.id == id).expect("badge in catalog")
  }

  #[test]
  fn fresh_progress_is_empty_and_locked() {
    let p = initialize_progress();
    assert_eq!(p.completed_questions, 0);
    assert_eq!(p.completed_concepts, 0);
    assert!(p.unique_concepts.is_empty());
    assert!(p.badges.iter().all(|b| !b.unlocked));
  }

  #[test]
  fn repeated_mastery_of_one_concept_counts_once() {
    let p0 = initialize_progress();
    let p1 = apply_outcome(&p0, true, Some("JOIN"));
    assert_eq!(p1.completed_questions, 1);
    assert_eq!(p1.completed_concepts, 1);
    assert_eq!(p1.unique_concepts, vec!["JOIN".to_string()]);

    let p2 = apply_outcome(&p1, true, Some("JOIN"));
    assert_eq!(p2.completed_questions, 2);
    assert_eq!(p2.completed_concepts, 1);
    assert_eq!(p2.unique_concepts, vec!["JOIN".to_string()]);

    // The input is left untouched.
    assert_eq!(p0.completed_questions, 0);
  }

  #[test]
  fn beginner_badge_unlocks_at_three_questions() {
    let mut p = initialize_progress();
    let mut seen = vec![];
    for _ in 0..5 {
      seen.push(badge(&p, "question-master-3").unlocked);
      p = apply_outcome(&p, true, None);
    }
    assert_eq!(seen, vec![false, false, false, true, true]);
  }

  #[test]
  fn badges_never_relock_and_concept_count_matches_set() {
    let concepts = ["a", "b", "a", "c", "b", "d", "e"];
    let mut p = initialize_progress();
    let mut prev = p.clone();
    for (i, c) in concepts.iter().cycle().take(60).enumerate() {
      let mastered = if i % 3 == 0 { Some(*c) } else { None };
      p = apply_outcome(&p, i % 2 == 0, mastered);
      assert_eq!(p.completed_concepts as usize, p.unique_concepts.len());
      for (before, after) in prev.badges.iter().zip(&p.badges) {
        assert!(!before.unlocked || after.unlocked, "badge {} relocked", after.id);
      }
      prev = p.clone();
    }
    assert_eq!(p.unique_concepts.len(), 5);
  }

  #[test]
  fn next_badge_follows_order() {
    let mut p = initialize_progress();
    assert_eq!(next_badge(&p).map(|b| b.id), Some("question-master-3"));

    // Master a concept first: the concept badge unlocks, but the guided
    // sequence still points at the first question badge.
    p = apply_outcome(&p, false, Some("basic JOIN usage"));
    assert!(badge(&p, "concept-master-1").unlocked);
    assert_eq!(next_badge(&p).map(|b| b.id), Some("question-master-3"));

    for _ in 0..3 {
      p = apply_outcome(&p, true, None);
    }
    assert_eq!(next_badge(&p).map(|b| b.id), Some("question-master-10"));

    let shown: Vec<_> = visible_badges(&p).iter().map(|b| b.id).collect();
    assert_eq!(shown, vec!["question-master-3", "concept-master-1", "question-master-10"]);
  }
}
