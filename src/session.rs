//! One play session: the challenge on screen, attempt bookkeeping, hint and
//! reveal toggles, the task board and progress.
//!
//! Every event handler runs to completion before the next one is accepted
//! (callers hold the session behind a mutex), so the `Submitting` phase is only
//! observable from inside a handler and from logs.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::backend::{format_db_result, SubmitQueryIn, SubmitQueryOut, ValidationBackend};
use crate::config::{Prompts, RevealPolicy};
use crate::difficulty::{classify, mastery_band, ConceptDifficulty, MasteryBand};
use crate::domain::{
  Attempts, Challenge, ConceptId, HistoryEntry, TableSnapshot, TaskStatus, Theme, INITIAL_MASTERY, MASTERY_THRESHOLD,
};
use crate::error::GameError;
use crate::fixtures::QueryBank;
use crate::narrator::{ChallengeContext, Narrator};
use crate::openai::TextGenerator;
use crate::progress::{apply_outcome, initialize_progress, next_badge, total_concepts, total_questions, visible_badges, Badge, Progress};
use crate::seeds::theme_schema;
use crate::util::normalize_query;

const INCORRECT_FALLBACK: &str = "That query didn't return the expected result. Try again!";
const REVEALED_RESULT: &str = "(accepted from revealed answer)";

/// Services a session talks to. Cheap to clone.
#[derive(Clone)]
pub struct SessionDeps {
  pub backend: Arc<dyn ValidationBackend>,
  pub generator: Option<Arc<dyn TextGenerator>>,
  pub prompts: Arc<Prompts>,
  pub bank: Arc<QueryBank>,
  pub reveal_policy: RevealPolicy,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
  Idle,
  Submitting,
  Ended,
}

/// Result of one submission.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
  /// Blank input or ended session; nothing changed.
  Ignored,
  Correct { via_reveal: bool },
  Incorrect,
  /// Backend unreachable, rejected the request or local fixtures are broken.
  Failed { message: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct ConceptMastery {
  pub concept: ConceptId,
  pub mastery: f64,
  pub band: MasteryBand,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProgressView {
  pub completed_questions: u32,
  pub total_questions: usize,
  pub completed_concepts: u32,
  pub total_concepts: usize,
  pub unique_concepts: Vec<ConceptId>,
  /// Earned badges plus the next one to earn.
  pub badges: Vec<Badge>,
  pub next_badge: Option<Badge>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchemaTable {
  pub name: String,
  pub columns: Vec<String>,
}

/// Everything a renderer needs to draw the session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionView {
  pub id: String,
  pub phase: SessionPhase,
  pub theme: Theme,
  pub concept: ConceptId,
  pub choice_index: usize,
  /// Narrative with inline "Error:" feedback appended when there is any.
  pub output: String,
  pub narrative: String,
  pub feedback: Option<String>,
  pub narrative_pending: bool,
  pub difficulty: ConceptDifficulty,
  pub attempts: Attempts,
  pub hint: Option<String>,
  pub revealed_answer: Option<String>,
  pub mastery: Vec<ConceptMastery>,
  pub progress: ProgressView,
  pub tables: Vec<TableSnapshot>,
  pub schema: Vec<SchemaTable>,
  pub tasks: Vec<TaskStatus>,
  pub history: Vec<HistoryEntry>,
  pub input: String,
}

pub struct GameSession {
  id: String,
  deps: SessionDeps,
  narrator: Narrator,
  concepts: Vec<ConceptId>,
  concept_index: usize,
  challenge: Challenge,
  attempts: Attempts,
  progress: Progress,
  phase: SessionPhase,
  feedback: Option<String>,
  hint: Option<String>,
  revealed_answer: Option<String>,
  narrative_pending: bool,
  tasks: Vec<TaskStatus>,
  history: Vec<HistoryEntry>,
  input: String,
}

impl GameSession {
  /// Set up a session: the backend picks the first concept, a variant is drawn
  /// and the opening narrative is requested. Any failure here is fatal.
  #[instrument(level = "info", skip_all, fields(%id, %theme, concepts = concepts.len()))]
  pub async fn start(id: String, deps: SessionDeps, theme: Theme, concepts: Vec<ConceptId>) -> Result<Self, GameError> {
    if concepts.is_empty() {
      return Err(GameError::EmptyConcepts);
    }
    for c in &concepts {
      deps.bank.variants(theme, c)?;
    }

    let first = deps.backend.setup(concepts.len()).await?;
    let Some(concept) = concepts.get(first).cloned() else {
      return Err(GameError::ValidationBackend(format!(
        "setup picked concept {first} of {}",
        concepts.len()
      )));
    };
    let choice_index = deps.bank.random_choice(theme, &concept)?;

    let mut session = Self {
      narrator: Narrator::new(deps.generator.clone(), Arc::clone(&deps.prompts)),
      challenge: Challenge {
        theme,
        concept,
        choice_index,
        narrative: String::new(),
        mastery_levels: vec![INITIAL_MASTERY; concepts.len()],
      },
      id,
      deps,
      concepts,
      concept_index: first,
      attempts: Attempts::default(),
      progress: initialize_progress(),
      phase: SessionPhase::Idle,
      feedback: None,
      hint: None,
      revealed_answer: None,
      narrative_pending: false,
      tasks: Vec::new(),
      history: Vec::new(),
      input: String::new(),
    };
    session.challenge.narrative = session.next_narrative().await?;
    info!(target: "session", id = %session.id, concept = %session.challenge.concept, choice = choice_index, "Session started");
    Ok(session)
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// Track what the player is typing so snapshots can restore it.
  pub fn set_input(&mut self, text: &str) {
    self.input = text.to_string();
  }

  /// Grade one query. Blank input is ignored without touching any state.
  #[instrument(level = "info", skip(self, user_query), fields(id = %self.id, concept = %self.challenge.concept, query_len = user_query.len()))]
  pub async fn submit(&mut self, user_query: &str) -> SubmitOutcome {
    if user_query.trim().is_empty() || self.phase == SessionPhase::Ended {
      return SubmitOutcome::Ignored;
    }
    self.input = user_query.to_string();
    self.attempts.attempts = self.attempts.attempts.saturating_add(1);
    self.phase = SessionPhase::Submitting;

    let outcome = if self.accepts_revealed(user_query) {
      info!(target: "session", id = %self.id, "Accepted revealed answer without backend check");
      self.record_correct(user_query, None).await;
      SubmitOutcome::Correct { via_reveal: true }
    } else {
      match self.grade(user_query).await {
        Ok(out) if out.correct => {
          self.record_correct(user_query, Some(out)).await;
          SubmitOutcome::Correct { via_reveal: false }
        }
        Ok(out) => {
          self.record_incorrect(user_query, out);
          SubmitOutcome::Incorrect
        }
        Err(e) => self.record_failure(user_query, e).await,
      }
    };

    self.phase = SessionPhase::Idle;
    outcome
  }

  fn accepts_revealed(&self, user_query: &str) -> bool {
    if !self.attempts.answer_revealed {
      return false;
    }
    self
      .revealed_answer
      .as_deref()
      .is_some_and(|answer| reveal_accepts(self.deps.reveal_policy, user_query, answer))
  }

  async fn grade(&self, user_query: &str) -> Result<SubmitQueryOut, GameError> {
    // Resolved before any network call so a broken fixture never reaches the backend.
    let variant = self.deps.bank.variant(self.challenge.theme, &self.challenge.concept, self.challenge.choice_index)?;
    let req = SubmitQueryIn {
      user_query: user_query.to_string(),
      expected: variant.expected.clone(),
      question_id: self.challenge.choice_index,
      attempts: self.attempts.attempts,
      hints_used: self.attempts.hint_requested,
    };
    self.deps.backend.submit_query(&req).await
  }

  async fn record_correct(&mut self, user_query: &str, out: Option<SubmitQueryOut>) {
    let answered = self.challenge.concept.clone();
    let answered_index = self.concept_index;

    if let Some(out) = &out {
      self.challenge.set_mastery(&out.new_mastery, self.concepts.len());
    }
    let task = self.task_entry(true);
    self.tasks.push(task);
    self.history.push(HistoryEntry {
      user_query: user_query.to_string(),
      db_result: out.as_ref().map_or_else(|| REVEALED_RESULT.to_string(), |o| format_db_result(&o.result_from_db)),
    });

    let mastered = self
      .challenge
      .mastery_at(answered_index)
      .is_some_and(|m| m >= MASTERY_THRESHOLD)
      && !self.progress.unique_concepts.contains(&answered);
    self.progress = apply_outcome(&self.progress, true, mastered.then_some(answered.as_str()));
    if mastered {
      info!(target: "session", id = %self.id, concept = %answered, "Concept mastered");
    }

    self.attempts.reset();
    self.feedback = None;
    self.hint = None;
    self.revealed_answer = None;
    self.input.clear();

    // The revealed-answer shortcut has no selector verdict; stay on the concept.
    let next_index = match &out {
      Some(out) if out.action < self.concepts.len() => out.action,
      Some(out) => {
        warn!(target: "session", id = %self.id, action = out.action, concepts = self.concepts.len(), "Backend picked an unknown concept; keeping the current one");
        self.concept_index
      }
      None => self.concept_index,
    };
    self.concept_index = next_index;
    self.challenge.concept = self.concepts[next_index].clone();

    match self.deps.bank.random_choice(self.challenge.theme, &self.challenge.concept) {
      Ok(choice) => self.challenge.choice_index = choice,
      Err(e) => {
        error!(target: "session", id = %self.id, error = %e, "No variant for next concept");
        self.feedback = Some(e.to_string());
        self.narrative_pending = true;
        return;
      }
    }

    match self.next_narrative().await {
      Ok(narrative) => {
        self.challenge.narrative = narrative;
        self.narrative_pending = false;
      }
      Err(e) => {
        error!(target: "session", id = %self.id, error = %e, "Next narrative failed; keeping the previous one");
        self.feedback = Some(e.to_string());
        self.narrative_pending = true;
      }
    }
  }

  fn record_incorrect(&mut self, user_query: &str, out: SubmitQueryOut) {
    self.challenge.set_mastery(&out.new_mastery, self.concepts.len());
    let task = self.task_entry(false);
    self.tasks.push(task);
    self.history.push(HistoryEntry {
      user_query: user_query.to_string(),
      db_result: format_db_result(&out.result_from_db),
    });
    let message = out.message.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| INCORRECT_FALLBACK.to_string());
    info!(target: "session", id = %self.id, attempts = self.attempts.attempts, "Incorrect answer");
    self.feedback = Some(message);
  }

  async fn record_failure(&mut self, user_query: &str, e: GameError) -> SubmitOutcome {
    let raw = e.to_string();
    warn!(target: "session", id = %self.id, error = %raw, "Submission failed");
    // Raw error first; replaced once the explanation arrives.
    self.feedback = Some(raw.clone());
    let explained = self
      .narrator
      .request_error_explanation(user_query, &raw, &self.challenge.concept, self.challenge.theme)
      .await;
    self.feedback = Some(explained.clone());
    SubmitOutcome::Failed { message: explained }
  }

  fn task_entry(&self, correct: bool) -> TaskStatus {
    TaskStatus {
      task_name: format!("Task {}", self.tasks.len() + 1),
      correct,
      concept: self.challenge.concept.clone(),
      narrative: self.challenge.narrative.clone(),
    }
  }

  /// Show or hide a hint. Turning it on hides the revealed answer.
  #[instrument(level = "info", skip(self), fields(id = %self.id))]
  pub async fn toggle_hint(&mut self) -> Result<(), GameError> {
    self.feedback = None;
    if self.attempts.hint_requested {
      self.attempts.hint_requested = false;
      self.hint = None;
      return Ok(());
    }
    self.attempts.answer_revealed = false;
    self.revealed_answer = None;

    let bank = Arc::clone(&self.deps.bank);
    let variant = bank.variant(self.challenge.theme, &self.challenge.concept, self.challenge.choice_index)?;
    let ctx = ChallengeContext {
      theme: self.challenge.theme,
      concept: &self.challenge.concept,
      tables: &variant.input,
      expected: &variant.expected,
    };
    let hint = self.narrator.request_hint(ctx).await;
    self.hint = Some(hint);
    self.attempts.hint_requested = true;
    Ok(())
  }

  /// Show or hide the reference answer. Turning it on hides the hint.
  #[instrument(level = "info", skip(self), fields(id = %self.id))]
  pub async fn toggle_reveal(&mut self) -> Result<(), GameError> {
    self.feedback = None;
    if self.attempts.answer_revealed {
      self.attempts.answer_revealed = false;
      self.revealed_answer = None;
      return Ok(());
    }
    self.attempts.hint_requested = false;
    self.hint = None;

    let bank = Arc::clone(&self.deps.bank);
    let variant = bank.variant(self.challenge.theme, &self.challenge.concept, self.challenge.choice_index)?;
    let ctx = ChallengeContext {
      theme: self.challenge.theme,
      concept: &self.challenge.concept,
      tables: &variant.input,
      expected: &variant.expected,
    };
    let answer = self.narrator.request_reference_answer(ctx).await;
    self.revealed_answer = Some(answer);
    self.attempts.answer_revealed = true;
    Ok(())
  }

  /// Retry the narrative for the current challenge after a failed request.
  #[instrument(level = "info", skip(self), fields(id = %self.id))]
  pub async fn regenerate_narrative(&mut self) -> Result<(), GameError> {
    let narrative = self.next_narrative().await?;
    self.challenge.narrative = narrative;
    self.narrative_pending = false;
    self.feedback = None;
    Ok(())
  }

  /// Session teardown: the narrative history goes with it.
  pub fn end(&mut self) {
    let narratives = self.narratives_kept();
    self.narrator.clear_history();
    self.phase = SessionPhase::Ended;
    info!(target: "session", id = %self.id, questions = self.progress.completed_questions, narratives, "Session ended");
  }

  /// Narratives currently remembered as story context.
  pub fn narratives_kept(&self) -> usize {
    self.narrator.history().len()
  }

  async fn next_narrative(&mut self) -> Result<String, GameError> {
    let bank = Arc::clone(&self.deps.bank);
    let variant = bank.variant(self.challenge.theme, &self.challenge.concept, self.challenge.choice_index)?;
    let ctx = ChallengeContext {
      theme: self.challenge.theme,
      concept: &self.challenge.concept,
      tables: &variant.input,
      expected: &variant.expected,
    };
    let coefficient = self.challenge.mastery_at(self.concept_index).unwrap_or(INITIAL_MASTERY);
    self.narrator.request_next_narrative(ctx, coefficient, &variant.brief).await
  }

  pub fn snapshot(&self) -> SessionView {
    let theme = self.challenge.theme;
    let output = match &self.feedback {
      Some(f) => format!("{}\n\nError: {}", self.challenge.narrative, f),
      None => self.challenge.narrative.clone(),
    };
    let tables = self
      .deps
      .bank
      .variant(theme, &self.challenge.concept, self.challenge.choice_index)
      .map(|v| v.input.clone())
      .unwrap_or_default();
    let mastery = self
      .concepts
      .iter()
      .enumerate()
      .map(|(i, c)| {
        let m = self.challenge.mastery_at(i).unwrap_or(INITIAL_MASTERY);
        ConceptMastery { concept: c.clone(), mastery: m, band: mastery_band(m) }
      })
      .collect();

    SessionView {
      id: self.id.clone(),
      phase: self.phase,
      theme,
      concept: self.challenge.concept.clone(),
      choice_index: self.challenge.choice_index,
      output,
      narrative: self.challenge.narrative.clone(),
      feedback: self.feedback.clone(),
      narrative_pending: self.narrative_pending,
      difficulty: classify(&self.challenge.concept),
      attempts: self.attempts.clone(),
      hint: self.hint.clone(),
      revealed_answer: self.revealed_answer.clone(),
      mastery,
      progress: ProgressView {
        completed_questions: self.progress.completed_questions,
        total_questions: total_questions(&self.deps.bank),
        completed_concepts: self.progress.completed_concepts,
        total_concepts: total_concepts(),
        unique_concepts: self.progress.unique_concepts.clone(),
        badges: visible_badges(&self.progress),
        next_badge: next_badge(&self.progress).cloned(),
      },
      tables,
      schema: theme_schema(theme)
        .into_iter()
        .map(|(name, columns)| SchemaTable { name, columns })
        .collect(),
      tasks: self.tasks.clone(),
      history: self.history.clone(),
      input: self.input.clone(),
    }
  }
}

/// Fewest tokens a typed query needs before a partial match with the revealed
/// answer is trusted. Exact matches are exempt.
const MIN_FUZZY_TOKENS: usize = 4;

/// Whether a typed query matches the revealed answer closely enough to skip grading.
pub fn reveal_accepts(policy: RevealPolicy, typed: &str, revealed: &str) -> bool {
  let (a, b) = (normalize_query(typed), normalize_query(revealed));
  if a.is_empty() || b.is_empty() {
    return false;
  }
  match policy {
    RevealPolicy::Off => false,
    RevealPolicy::Exact => a == b,
    RevealPolicy::Fuzzy => {
      a == b || (a.split(' ').count() >= MIN_FUZZY_TOKENS && (a.contains(&b) || b.contains(&a)))
    }
  }
}
