//! Prompts for the text-generation service and parsing of its answers.
//!
//! Four requests share one generator:
//!   - next-challenge narrative (failures propagate to the caller)
//!   - error explanation (falls back to the raw error)
//!   - hint (falls back to a local hint)
//!   - reference answer (falls back to `fallback::synthesize_answer`)
//!
//! Each narrator keeps a short rolling history of the narratives it produced so
//! consecutive challenges read as one story. The history belongs to one play
//! session and is wiped by `clear_history` when the session ends.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::Prompts;
use crate::difficulty::classify;
use crate::domain::{Row, TableSnapshot, Theme};
use crate::error::GameError;
use crate::fallback::synthesize_answer;
use crate::openai::TextGenerator;
use crate::util::{fill_template, strip_code_fences, trunc_for_log};

pub const HISTORY_CAPACITY: usize = 5;

const HINT_TEMPERATURE: f32 = 0.3;
const ANSWER_TEMPERATURE: f32 = 0.1;

/// Bounded FIFO of recent narratives.
#[derive(Clone, Debug, Default)]
pub struct NarrativeHistory {
  items: VecDeque<String>,
}

impl NarrativeHistory {
  pub fn push(&mut self, narrative: String) {
    if self.items.len() == HISTORY_CAPACITY {
      self.items.pop_front();
    }
    self.items.push_back(narrative);
  }

  pub fn clear(&mut self) {
    self.items.clear();
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &String> {
    self.items.iter()
  }

  /// "[1] ...\n\n[2] ..." or a line telling the model there is nothing yet.
  fn as_context(&self) -> String {
    if self.items.is_empty() {
      return "No previous queries found. Ignore this line.".to_string();
    }
    self
      .items
      .iter()
      .enumerate()
      .map(|(i, n)| format!("[{}] {}", i + 1, n))
      .collect::<Vec<_>>()
      .join("\n\n")
  }
}

/// Length and tone of a narrative, by difficulty coefficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoryBand {
  Simple,
  Moderate,
  Elaborate,
}

impl StoryBand {
  pub fn for_coefficient(coefficient: f64) -> Self {
    if coefficient <= 0.3 {
      StoryBand::Simple
    } else if coefficient <= 0.6 {
      StoryBand::Moderate
    } else {
      StoryBand::Elaborate
    }
  }

  pub fn word_limit(&self) -> &'static str {
    match self {
      StoryBand::Simple => "30-40 words",
      StoryBand::Moderate => "40-50 words",
      StoryBand::Elaborate => "50-60 words",
    }
  }

  fn style(&self) -> &'static str {
    match self {
      StoryBand::Simple => "Use simple, straightforward language. Keep the narrative linear and easy to follow. Focus on basic concepts and clear objectives.",
      StoryBand::Moderate => "Use moderate complexity. Include some twists or additional context, but keep the main objective clear. Add some character development or environmental details.",
      StoryBand::Elaborate => "Use complex, layered storytelling. Include multiple plot threads, sophisticated character motivations, and intricate world-building details. Make the challenge feel more sophisticated and demanding.",
    }
  }

  fn guidance(&self) -> &'static str {
    match self {
      StoryBand::Simple => "Keep it simple and direct.",
      StoryBand::Moderate => "Add moderate complexity.",
      StoryBand::Elaborate => "Make it sophisticated and challenging.",
    }
  }
}

/// What a challenge is built from.
#[derive(Clone, Copy, Debug)]
pub struct ChallengeContext<'a> {
  pub theme: Theme,
  pub concept: &'a str,
  pub tables: &'a [TableSnapshot],
  pub expected: &'a [Row],
}

pub struct Narrator {
  generator: Option<Arc<dyn TextGenerator>>,
  prompts: Arc<Prompts>,
  history: NarrativeHistory,
}

impl Narrator {
  pub fn new(generator: Option<Arc<dyn TextGenerator>>, prompts: Arc<Prompts>) -> Self {
    Self { generator, prompts, history: NarrativeHistory::default() }
  }

  pub fn history(&self) -> &NarrativeHistory {
    &self.history
  }

  /// Session teardown.
  pub fn clear_history(&mut self) {
    self.history.clear();
  }

  fn generator(&self) -> Result<&Arc<dyn TextGenerator>, GameError> {
    self.generator.as_ref().ok_or(GameError::GeneratorDisabled)
  }

  /// Story framing the next challenge. Never contains the solving query.
  ///
  /// Without a configured generator a plain local narrative is built from
  /// `brief`; a configured generator that fails is an error.
  #[instrument(level = "info", skip(self, ctx, brief), fields(theme = %ctx.theme, concept = %ctx.concept))]
  pub async fn request_next_narrative(
    &mut self,
    ctx: ChallengeContext<'_>,
    coefficient: f64,
    brief: &str,
  ) -> Result<String, GameError> {
    let narrative = match &self.generator {
      None => {
        debug!(target: "narrator", "Generator disabled; using local narrative");
        local_narrative(ctx, brief)
      }
      Some(generator) => {
        let prompt = self.narrative_prompt(ctx, coefficient);
        match generator.complete(&prompt, None).await {
          Ok(text) => text.trim().to_string(),
          Err(e) => {
            error!(target: "narrator", error = %e, "Narrative generation failed");
            return Err(e);
          }
        }
      }
    };

    info!(target: "narrator", preview = %trunc_for_log(&narrative, 60), "Narrative ready");
    self.history.push(narrative.clone());
    Ok(narrative)
  }

  pub fn narrative_prompt(&self, ctx: ChallengeContext<'_>, coefficient: f64) -> String {
    let band = StoryBand::for_coefficient(coefficient);
    let coefficient = format!("{:.1}", coefficient);
    let tables = tables_for_prompt(ctx.tables);
    let expected = ctx
      .expected
      .iter()
      .map(|r| serde_json::Value::Object(r.clone()).to_string())
      .collect::<Vec<_>>()
      .join(",\n");
    let history = self.history.as_context();
    fill_template(
      &self.prompts.narrative_template,
      &[
        ("word_limit", band.word_limit()),
        ("history", &history),
        ("concept", ctx.concept),
        ("theme", ctx.theme.as_str()),
        ("coefficient", &coefficient),
        ("style", band.style()),
        ("guidance", band.guidance()),
        ("expected", &expected),
        // Last, so table contents cannot be mistaken for placeholders.
        ("tables", &tables),
      ],
    )
  }

  /// Friendlier wording for a failed submission. Never fails: on any problem
  /// the raw error comes back unchanged.
  #[instrument(level = "info", skip_all, fields(%theme, %concept, query_len = user_query.len()))]
  pub async fn request_error_explanation(
    &self,
    user_query: &str,
    raw_error: &str,
    concept: &str,
    theme: Theme,
  ) -> String {
    let prompt = fill_template(
      &self.prompts.error_explanation_template,
      &[("theme", theme.as_str()), ("concept", concept), ("error", raw_error), ("user_query", user_query)],
    );
    let result = match self.generator() {
      Ok(g) => g.complete(&prompt, None).await,
      Err(e) => Err(e),
    };
    match result {
      Ok(text) => text.trim().to_string(),
      Err(e) => {
        warn!(target: "narrator", error = %e, "Error explanation unavailable; showing raw error");
        raw_error.to_string()
      }
    }
  }

  /// A short nudge (≤40 words) that does not give away the query.
  #[instrument(level = "info", skip(self, ctx), fields(theme = %ctx.theme, concept = %ctx.concept))]
  pub async fn request_hint(&self, ctx: ChallengeContext<'_>) -> String {
    let prompt = self.json_prompt(&self.prompts.hint_template, ctx);
    let result = match self.generator() {
      Ok(g) => g.complete(&prompt, Some(HINT_TEMPERATURE)).await,
      Err(e) => Err(e),
    };
    match result {
      Ok(text) => text.trim().to_string(),
      Err(e) => {
        warn!(target: "narrator", error = %e, "Hint generation failed; using local hint");
        local_hint(ctx)
      }
    }
  }

  /// A query producing exactly the expected result, code fences removed.
  #[instrument(level = "info", skip(self, ctx), fields(theme = %ctx.theme, concept = %ctx.concept))]
  pub async fn request_reference_answer(&self, ctx: ChallengeContext<'_>) -> String {
    let prompt = self.json_prompt(&self.prompts.reference_answer_template, ctx);
    let result = match self.generator() {
      Ok(g) => g.complete(&prompt, Some(ANSWER_TEMPERATURE)).await,
      Err(e) => Err(e),
    };
    match result.map(|t| strip_code_fences(&t)) {
      Ok(answer) if !answer.is_empty() => answer,
      Ok(_) => {
        warn!(target: "narrator", "Reference answer was empty; synthesizing locally");
        synthesize_answer(ctx.tables, ctx.expected)
      }
      Err(e) => {
        warn!(target: "narrator", error = %e, "Reference answer generation failed; synthesizing locally");
        synthesize_answer(ctx.tables, ctx.expected)
      }
    }
  }

  fn json_prompt(&self, template: &str, ctx: ChallengeContext<'_>) -> String {
    let tables_json = serde_json::to_string_pretty(&tables_as_object(ctx.tables)).unwrap_or_default();
    let expected_json = serde_json::to_string_pretty(ctx.expected).unwrap_or_default();
    fill_template(
      template,
      &[
        ("theme", ctx.theme.as_str()),
        ("concept", ctx.concept),
        ("expected_json", &expected_json),
        ("tables_json", &tables_json),
      ],
    )
  }
}

/// `{ "table": [rows...] }`, the shape the prompts describe.
fn tables_as_object(tables: &[TableSnapshot]) -> serde_json::Value {
  let mut obj = serde_json::Map::new();
  for t in tables {
    let rows = t.rows.iter().cloned().map(serde_json::Value::Object).collect();
    obj.insert(t.name.clone(), serde_json::Value::Array(rows));
  }
  serde_json::Value::Object(obj)
}

/// Tables as readable blocks: `Table "x":` followed by one object per row.
fn tables_for_prompt(tables: &[TableSnapshot]) -> String {
  tables
    .iter()
    .map(|t| {
      let rows: String = t
        .rows
        .iter()
        .map(|row| {
          let fields = row
            .iter()
            .map(|(k, v)| format!("    {k}: {v},"))
            .collect::<Vec<_>>()
            .join("\n");
          format!("{{\n{fields}\n}},\n")
        })
        .collect();
      format!("Table \"{}\":\n{}\n", t.name, rows)
    })
    .collect::<Vec<_>>()
    .join("\n")
}

fn local_narrative(ctx: ChallengeContext<'_>, brief: &str) -> String {
  let opener = match ctx.theme {
    Theme::Cyberpunk => "A terminal flickers to life in the rain-soaked city.",
    Theme::Fantasy => "An old scroll unrolls itself on the guild table.",
    Theme::RealWorld => "A new ticket lands in your queue.",
  };
  let task = if brief.trim().is_empty() {
    format!("Use {} to answer the request.", ctx.concept)
  } else {
    brief.trim().to_string()
  };
  format!("{opener} {task} Which SQL query gets it done?")
}

fn local_hint(ctx: ChallengeContext<'_>) -> String {
  let d = classify(ctx.concept);
  let tables = ctx.tables.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ");
  format!(
    "Focus on {} ({}). Look at the columns of {} and compare them with the {} expected row(s).",
    ctx.concept,
    d.description.to_lowercase(),
    if tables.is_empty() { "the tables" } else { tables.as_str() },
    ctx.expected.len()
  )
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::Mutex;

  use async_trait::async_trait;

  /// Replays canned completions and records every prompt it saw.
  #[derive(Default)]
  pub(crate) struct ScriptedGenerator {
    pub replies: Mutex<VecDeque<Result<String, GameError>>>,
    pub prompts: Mutex<Vec<(String, Option<f32>)>>,
  }

  impl ScriptedGenerator {
    pub(crate) fn with(replies: Vec<Result<String, GameError>>) -> Arc<Self> {
      Arc::new(Self { replies: Mutex::new(replies.into()), prompts: Mutex::default() })
    }

    pub(crate) fn calls(&self) -> usize {
      self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
  }

  #[async_trait]
  impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String, GameError> {
      self.prompts.lock().expect("lock").push((prompt.to_string(), temperature));
      self
        .replies
        .lock()
        .expect("lock")
        .pop_front()
        .unwrap_or_else(|| Err(GameError::UpstreamFormat("script exhausted".into())))
    }
  }

  fn tables() -> Vec<TableSnapshot> {
    serde_json::from_value(serde_json::json!([
      { "name": "archives", "rows": [{ "mission_id": 1, "mission_name": "Neon Ghost" }] }
    ]))
    .expect("tables")
  }

  fn expected() -> Vec<Row> {
    serde_json::from_value(serde_json::json!([{ "mission_id": 1, "mission_name": "Neon Ghost" }])).expect("rows")
  }

  fn narrator(g: &Arc<ScriptedGenerator>) -> Narrator {
    let g: Arc<dyn TextGenerator> = g.clone();
    Narrator::new(Some(g), Arc::new(Prompts::default()))
  }

  #[test]
  fn bands_follow_coefficient() {
    assert_eq!(StoryBand::for_coefficient(0.1).word_limit(), "30-40 words");
    assert_eq!(StoryBand::for_coefficient(0.3).word_limit(), "30-40 words");
    assert_eq!(StoryBand::for_coefficient(0.31).word_limit(), "40-50 words");
    assert_eq!(StoryBand::for_coefficient(0.6).word_limit(), "40-50 words");
    assert_eq!(StoryBand::for_coefficient(0.9).word_limit(), "50-60 words");
  }

  #[test]
  fn history_keeps_the_five_most_recent() {
    let mut h = NarrativeHistory::default();
    for i in 0..8 {
      h.push(format!("n{i}"));
    }
    assert_eq!(h.len(), HISTORY_CAPACITY);
    assert_eq!(h.iter().next().map(String::as_str), Some("n3"));
    h.clear();
    assert!(h.is_empty());
  }

  #[tokio::test]
  async fn narrative_prompt_carries_context_and_history() {
    let g = ScriptedGenerator::with(vec![Ok("First chapter.".into()), Ok("  Second chapter.  ".into())]);
    let mut n = narrator(&g);
    let (t, e) = (tables(), expected());
    let ctx = ChallengeContext { theme: Theme::Cyberpunk, concept: "pattern matching with LIKE", tables: &t, expected: &e };

    assert_eq!(n.request_next_narrative(ctx, 0.2, "").await.expect("narrative"), "First chapter.");
    assert_eq!(n.request_next_narrative(ctx, 0.7, "").await.expect("narrative"), "Second chapter.");

    let prompts = g.prompts.lock().expect("lock");
    assert!(prompts[0].0.contains("30-40 words"));
    assert!(prompts[0].0.contains("No previous queries found"));
    assert!(prompts[0].0.contains("Table \"archives\""));
    assert!(prompts[0].0.contains("Theme: cyberpunk"));
    assert!(prompts[1].0.contains("50-60 words"));
    assert!(prompts[1].0.contains("[1] First chapter."));
    assert!(prompts[1].0.contains("Do NOT provide the SQL query"));
    assert_eq!(n.history().len(), 2);

    drop(prompts);
    n.clear_history();
    assert!(n.history().is_empty());
  }

  #[tokio::test]
  async fn narrative_failure_propagates_and_skips_history() {
    let g = ScriptedGenerator::with(vec![Err(GameError::UpstreamFormat("{}".into()))]);
    let mut n = narrator(&g);
    let (t, e) = (tables(), expected());
    let ctx = ChallengeContext { theme: Theme::Fantasy, concept: "basic WHERE clause", tables: &t, expected: &e };
    let err = n.request_next_narrative(ctx, 0.5, "").await.unwrap_err();
    assert!(matches!(err, GameError::UpstreamFormat(_)));
    assert!(n.history().is_empty());
  }

  #[tokio::test]
  async fn disabled_generator_uses_the_brief() {
    let mut n = Narrator::new(None, Arc::new(Prompts::default()));
    let (t, e) = (tables(), expected());
    let ctx = ChallengeContext { theme: Theme::RealWorld, concept: "basic WHERE clause", tables: &t, expected: &e };
    let text = n.request_next_narrative(ctx, 0.5, "Find the big spenders.").await.expect("narrative");
    assert!(text.contains("Find the big spenders."));
    assert_eq!(n.history().len(), 1);
  }

  #[tokio::test]
  async fn explanation_falls_back_to_raw_error() {
    let g = ScriptedGenerator::with(vec![Err(GameError::Transport("offline".into()))]);
    let n = narrator(&g);
    let text = n.request_error_explanation("SELEC *", "syntax error", "basic SELECT and FROM", Theme::Fantasy).await;
    assert_eq!(text, "syntax error");
    assert!(g.prompts.lock().expect("lock")[0].0.contains("User's SQL Query: `SELEC *`"));
  }

  #[tokio::test]
  async fn hint_uses_low_temperature_and_recovers_locally() {
    let g = ScriptedGenerator::with(vec![Ok("Try LIKE with a wildcard.".into())]);
    let n = narrator(&g);
    let (t, e) = (tables(), expected());
    let ctx = ChallengeContext { theme: Theme::Cyberpunk, concept: "pattern matching with LIKE", tables: &t, expected: &e };
    assert_eq!(n.request_hint(ctx).await, "Try LIKE with a wildcard.");
    assert_eq!(g.prompts.lock().expect("lock")[0].1, Some(0.3));

    // Script exhausted: the next call fails and the hint is built locally.
    let local = n.request_hint(ctx).await;
    assert!(local.contains("archives"), "{local}");
    assert!(local.contains("pattern-based filtering"), "{local}");
  }

  #[tokio::test]
  async fn reference_answer_strips_fences_or_synthesizes() {
    let g = ScriptedGenerator::with(vec![Ok("```sql\nSELECT * FROM archives WHERE mission_name LIKE '%Neon%';\n```\n".into())]);
    let n = narrator(&g);
    let (t, e) = (tables(), expected());
    let ctx = ChallengeContext { theme: Theme::Cyberpunk, concept: "pattern matching with LIKE", tables: &t, expected: &e };
    assert_eq!(
      n.request_reference_answer(ctx).await,
      "SELECT * FROM archives WHERE mission_name LIKE '%Neon%';"
    );
    assert_eq!(g.prompts.lock().expect("lock")[0].1, Some(0.1));

    let fallback = n.request_reference_answer(ctx).await;
    assert!(fallback.starts_with("SELECT mission_id, mission_name, mission_description FROM archives"), "{fallback}");
  }
}
