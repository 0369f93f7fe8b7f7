//! Client for the query-validation backend: game setup and answer grading.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, instrument};

use crate::config::ServiceConfig;
use crate::domain::Row;
use crate::error::GameError;
use crate::util::trunc_for_log;

const UNKNOWN_ERROR: &str = "An unknown error occurred";

/// Body of `POST /submit-query`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQueryIn {
  pub user_query: String,
  pub expected: Vec<Row>,
  pub question_id: usize,
  pub attempts: u32,
  pub hints_used: bool,
}

/// Grading verdict from the backend.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQueryOut {
  #[serde(default)]
  pub correct: bool,
  /// Mastery per chosen concept, in setup order.
  #[serde(default, deserialize_with = "mastery_list")]
  pub new_mastery: Vec<f64>,
  /// Index of the next concept in the chosen list.
  #[serde(deserialize_with = "concept_index")]
  pub action: usize,
  #[serde(default, rename = "resultFromDB")]
  pub result_from_db: serde_json::Value,
  #[serde(default)]
  pub message: Option<String>,
}

#[derive(Deserialize)]
struct SetupOut {
  #[serde(deserialize_with = "concept_index")]
  action: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message: Option<String>,
}

/// The backend that knows the real database and the mastery model.
#[async_trait]
pub trait ValidationBackend: Send + Sync {
  /// Index of the first concept to play, given how many were chosen.
  async fn setup(&self, concepts_len: usize) -> Result<usize, GameError>;
  async fn submit_query(&self, req: &SubmitQueryIn) -> Result<SubmitQueryOut, GameError>;
}

#[derive(Clone)]
pub struct HttpBackend {
  pub client: reqwest::Client,
  pub base_url: String,
}

impl HttpBackend {
  pub fn from_config(cfg: &ServiceConfig) -> Result<Self, GameError> {
    let mut builder = reqwest::Client::builder();
    if let Some(t) = cfg.http_timeout {
      builder = builder.timeout(t);
    }
    let client = builder.build().map_err(|e| GameError::Config(format!("HTTP client: {e}")))?;
    Ok(Self { client, base_url: cfg.api_url.clone() })
  }

  async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, GameError> {
    let url = format!("{}/{}", self.base_url, path);
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "sql-quest/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(body)
      .send()
      .await
      .map_err(|e| GameError::ValidationBackend(e.to_string()))?;

    let status = res.status();
    let text = res.text().await.map_err(|e| GameError::ValidationBackend(e.to_string()))?;
    if !status.is_success() {
      error!(target: "session", %path, status = status.as_u16(), body = %trunc_for_log(&text, 200), "Backend returned an error");
      return Err(GameError::ValidationBackend(error_message(&text)));
    }
    Ok(text)
  }
}

#[async_trait]
impl ValidationBackend for HttpBackend {
  #[instrument(level = "info", skip(self))]
  async fn setup(&self, concepts_len: usize) -> Result<usize, GameError> {
    let body = serde_json::json!({ "conceptsLength": concepts_len });
    let text = self.post_json("setup-form", &body).await?;
    let out: SetupOut = serde_json::from_str(&text)
      .map_err(|e| GameError::ValidationBackend(format!("Malformed setup response: {e}")))?;
    info!(target: "session", action = out.action, "Backend picked first concept");
    Ok(out.action)
  }

  #[instrument(level = "info", skip(self, req), fields(question_id = req.question_id, attempts = req.attempts, query_len = req.user_query.len()))]
  async fn submit_query(&self, req: &SubmitQueryIn) -> Result<SubmitQueryOut, GameError> {
    let text = self.post_json("submit-query", req).await?;
    parse_submit_response(&text)
  }
}

pub fn parse_submit_response(text: &str) -> Result<SubmitQueryOut, GameError> {
  serde_json::from_str(text).map_err(|e| GameError::ValidationBackend(format!("Malformed grading response: {e}")))
}

/// `{message}` of an error body, or a generic message.
pub fn error_message(body: &str) -> String {
  serde_json::from_str::<ErrorBody>(body)
    .ok()
    .and_then(|b| b.message)
    .filter(|m| !m.trim().is_empty())
    .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}

/// `action` arrives as a number or a numeric string.
fn concept_index<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Num(f64),
    Str(String),
  }
  match Raw::deserialize(d)? {
    Raw::Num(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
    Raw::Num(n) => Err(serde::de::Error::custom(format!("invalid concept index: {n}"))),
    // Leading digits only, the way parseInt reads "2 (JOIN)".
    Raw::Str(s) => {
      let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
      digits
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid concept index: {s}")))
    }
  }
}

/// `newMastery` arrives as a list, or as a lone number for single-concept games.
fn mastery_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    List(Vec<Option<f64>>),
    One(f64),
    Null(()),
  }
  Ok(match Raw::deserialize(d)? {
    Raw::List(v) => v.into_iter().map(|x| x.unwrap_or(0.0)).collect(),
    Raw::One(x) => vec![x],
    Raw::Null(()) => Vec::new(),
  })
}

/// Render backend result rows as compact text for the history panel.
pub fn format_db_result(v: &serde_json::Value) -> String {
  match v {
    serde_json::Value::Null => "(no result)".to_string(),
    serde_json::Value::Array(rows) if rows.is_empty() => "(0 rows)".to_string(),
    serde_json::Value::Array(rows) => rows
      .iter()
      .map(|r| match r {
        serde_json::Value::Object(m) => m
          .iter()
          .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{k}: {s}"),
            other => format!("{k}: {other}"),
          })
          .collect::<Vec<_>>()
          .join(", "),
        other => other.to_string(),
      })
      .collect::<Vec<_>>()
      .join("\n"),
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn grading_response_accepts_loose_shapes() {
    let out = parse_submit_response(
      r#"{"correct":true,"newMastery":[0.2,0.85],"action":"1","resultFromDB":[{"id":1}]}"#,
    )
    .expect("parse");
    assert!(out.correct);
    assert_eq!(out.new_mastery, vec![0.2, 0.85]);
    assert_eq!(out.action, 1);

    let single = parse_submit_response(r#"{"correct":false,"newMastery":0.4,"action":0}"#).expect("parse");
    assert_eq!(single.new_mastery, vec![0.4]);
    assert_eq!(single.result_from_db, serde_json::Value::Null);
  }

  #[test]
  fn malformed_grading_response_is_a_backend_error() {
    for body in ["", "{}", r#"{"correct":true,"action":"next"}"#, r#"{"correct":true,"action":-1}"#] {
      assert!(matches!(parse_submit_response(body), Err(GameError::ValidationBackend(_))), "{body}");
    }
  }

  #[test]
  fn error_bodies_fall_back_to_generic_message() {
    assert_eq!(error_message(r#"{"message":"syntax error near FORM"}"#), "syntax error near FORM");
    assert_eq!(error_message("Bad Gateway"), UNKNOWN_ERROR);
    assert_eq!(error_message(r#"{"message":""}"#), UNKNOWN_ERROR);
  }

  #[test]
  fn submit_body_uses_camel_case() {
    let body = SubmitQueryIn {
      user_query: "SELECT 1".into(),
      expected: vec![],
      question_id: 2,
      attempts: 3,
      hints_used: true,
    };
    let v = serde_json::to_value(&body).expect("serialize");
    assert_eq!(v, json!({ "userQuery": "SELECT 1", "expected": [], "questionId": 2, "attempts": 3, "hintsUsed": true }));
  }

  #[test]
  fn db_results_render_one_row_per_line() {
    let rows = json!([{ "name": "Neo", "credits": 1200 }, { "name": "Nova", "credits": 5200 }]);
    assert_eq!(format_db_result(&rows), "credits: 1200, name: Neo\ncredits: 5200, name: Nova");
    assert_eq!(format_db_result(&json!([])), "(0 rows)");
  }
}
