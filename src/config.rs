//! Service configuration from the environment, plus the optional agent
//! config (prompt overrides + extra query fixtures) loaded from TOML.
//!
//! See `ServiceConfig`, `AgentConfig` and `Prompts` for the expected schema.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Theme;
use crate::error::GameError;
use crate::fixtures::{QueryBank, QueryVariant};

const DEV_API_URL: &str = "http://localhost:3000";
const PROD_API_URL: &str = "http://44.204.27.181:3000";
const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// How far a submission may be trusted when the player has revealed the
/// reference answer and types it back in.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevealPolicy {
  /// Case-insensitive, whitespace-collapsed, substring either way. Skips the backend.
  #[default]
  Fuzzy,
  /// Normalized text must be equal. Skips the backend.
  Exact,
  /// Always validate with the backend.
  Off,
}

impl RevealPolicy {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "fuzzy" => Some(Self::Fuzzy),
      "exact" => Some(Self::Exact),
      "off" | "none" | "disabled" => Some(Self::Off),
      _ => None,
    }
  }
}

/// Everything read from the environment at startup.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
  pub port: u16,
  /// Validation/setup backend base URL.
  pub api_url: String,
  pub openrouter_api_key: Option<String>,
  pub openrouter_base_url: String,
  pub openrouter_model: String,
  /// None = requests may hang forever, the renderer keeps showing a spinner.
  pub http_timeout: Option<Duration>,
  pub reveal_policy: RevealPolicy,
  pub static_dir: String,
  /// Sessions untouched for this long are ended and dropped. None = never.
  pub session_idle: Option<Duration>,
}

impl ServiceConfig {
  pub fn from_env() -> Self {
    Self::from_lookup(|k| std::env::var(k).ok())
  }

  /// Same as `from_env` but reads through `get`, so tests can inject values.
  pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
    let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let production = non_empty("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
    let api_url = non_empty("API_URL")
      .unwrap_or_else(|| (if production { PROD_API_URL } else { DEV_API_URL }).to_string())
      .trim_end_matches('/')
      .to_string();

    let reveal_policy = match non_empty("REVEAL_POLICY") {
      Some(v) => RevealPolicy::parse(&v).unwrap_or_else(|| {
        error!(target: "sql_quest", value = %v, "Unknown REVEAL_POLICY; using fuzzy");
        RevealPolicy::Fuzzy
      }),
      None => RevealPolicy::Fuzzy,
    };

    Self {
      port: non_empty("PORT").and_then(|p| p.parse().ok()).unwrap_or(3000),
      api_url,
      openrouter_api_key: non_empty("OPENROUTER_API_KEY"),
      openrouter_base_url: non_empty("OPENROUTER_BASE_URL")
        .unwrap_or_else(|| "https://openrouter.ai/api/v1".into())
        .trim_end_matches('/')
        .to_string(),
      openrouter_model: non_empty("OPENROUTER_MODEL").unwrap_or_else(|| "deepseek/deepseek-chat-v3-0324".into()),
      http_timeout: non_empty("HTTP_TIMEOUT_SECS")
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .map(Duration::from_secs),
      reveal_policy,
      static_dir: non_empty("STATIC_DIR").unwrap_or_else(|| "./static".into()),
      session_idle: match non_empty("SESSION_IDLE_SECS").map(|s| s.parse::<u64>()) {
        None => Some(Duration::from_secs(DEFAULT_SESSION_IDLE_SECS)),
        Some(Ok(0)) => None,
        Some(Ok(secs)) => Some(Duration::from_secs(secs)),
        Some(Err(e)) => {
          error!(target: "sql_quest", error = %e, "Invalid SESSION_IDLE_SECS; using default");
          Some(Duration::from_secs(DEFAULT_SESSION_IDLE_SECS))
        }
      },
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub fixtures: Vec<FixtureCfg>,
}

/// Fixture entry accepted in TOML configuration.
/// With `replace = true` the built-in variants of the combination are dropped.
#[derive(Clone, Debug, Deserialize)]
pub struct FixtureCfg {
  pub theme: Theme,
  pub concept: String,
  #[serde(default)]
  pub replace: bool,
  pub variants: Vec<QueryVariant>,
}

/// Prompt templates sent to the text-generation service. `{placeholders}` are
/// filled by the narrator. Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub narrative_template: String,
  pub error_explanation_template: String,
  pub hint_template: String,
  pub reference_answer_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      narrative_template: concat!(
        "You are a creative storyteller with knowledge of SQL database queries. ",
        "Generate an **engaging narrative within {word_limit}** based on a given theme that continues the ongoing storyline. ",
        "Your story must include:\n\n",
        "1. A continuation of the previous narrative: {history}\n",
        "2. A challenge or mission that can only be solved by running a {concept} SQL query against the following contents:\n",
        "{tables}\n\n",
        "3. A direct prompt asking the user (the 'player') to provide the SQL query that returns the specified expected result.\n\n",
        "[Details to incorporate into the story]\n",
        "- Theme: {theme}\n",
        "- Expected Result:\n[{expected}]\n",
        "- Difficulty Level: {coefficient} (0.1=easiest, 1.0=hardest)\n\n",
        "[Storytelling Style Based on Difficulty]\n",
        "{style}\n\n",
        "[Format of your response]\n",
        "1. Provide a narrative or storyline within {word_limit} in the specified theme that continues from the previous storyline.\n",
        "2. Do NOT provide the SQL query yourself; only ask the player to supply it.\n",
        "3. Adjust the complexity of your narrative based on the difficulty coefficient.\n\n",
        "[Example Guidance]\n",
        "- If the theme is 'Cyberpunk,' your story might refer to futuristic cities, neon lights, or secret hacking missions.\n",
        "- Conclude with a direct question like:\n",
        "'Neo has discovered three individuals who show signs of rebellion. He needs a query that will list these rebels. ",
        "What SQL command can you use to retrieve only those entries from the table(s)?'\n",
        "- For difficulty {coefficient}: {guidance}",
      )
      .into(),
      error_explanation_template: concat!(
        "You are an SQL tutor helping a student. ",
        "Provide a helpful, informative explanation of what went wrong with their SQL query. ",
        "Be encouraging and educational. ",
        "Keep your response under 100 words. ",
        "Format your response in conversational language.\n\n",
        "Theme: {theme}\n",
        "SQL Concept being practiced: {concept}\n",
        "User's SQL Query: `{user_query}`\n",
        "Error message: {error}\n",
      )
      .into(),
      hint_template: concat!(
        "You are an SQL tutor. Give a helpful, concise hint (max 40 words) for a student struggling with ",
        "the following SQL concept: {concept} in the theme: {theme}. ",
        "Base your hint on the following table(s) and expected result:\n",
        "Tables: {tables_json}\nExpected: {expected_json}\n",
        "Do NOT give the full answer, just a nudge in the right direction. Focus on the specific SQL concept being tested.",
      )
      .into(),
      reference_answer_template: concat!(
        "You are an SQL expert. Write a SQL query that will produce EXACTLY the expected result.\n\n",
        "Context:\n",
        "- Theme: {theme}\n",
        "- SQL Concept: {concept}\n",
        "- Tables/Data: {tables_json}\n",
        "- Expected Result: {expected_json}\n\n",
        "Requirements:\n",
        "1. Write ONLY the SQL query, no explanations\n",
        "2. The query must produce the EXACT expected result\n",
        "3. Use proper SQL syntax\n",
        "4. If the expected result is empty, write a query that returns no rows\n",
        "5. Pay attention to column names, table names, and data types\n",
        "6. Use educational SQL concepts like LIKE, WHERE, OR, AND, etc.\n\n",
        "SQL Query:",
      )
      .into(),
    }
  }
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "sql_quest", %path, fixtures = cfg.fixtures.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "sql_quest", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "sql_quest", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Merge configured fixtures over the built-in bank and validate the result.
pub fn build_query_bank(mut bank: QueryBank, cfg: Option<&AgentConfig>) -> Result<QueryBank, GameError> {
  if let Some(cfg) = cfg {
    for f in &cfg.fixtures {
      if f.replace {
        bank.replace(f.theme, &f.concept, f.variants.clone());
      } else {
        for v in &f.variants {
          bank.insert(f.theme, &f.concept, v.clone());
        }
      }
    }
  }
  bank.validate()?;
  Ok(bank)
}
