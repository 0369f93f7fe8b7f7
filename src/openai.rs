//! Minimal chat-completions client for the text-generation service
//! (OpenRouter by default, any OpenAI-compatible endpoint works).
//!
//! We send a single user message and read back `choices[0].message.content`.
//! Calls are instrumented and log model names, latencies and response sizes
//! (not contents).
//!
//! NOTE: We never log the API key.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::ServiceConfig;
use crate::error::GameError;
use crate::util::trunc_for_log;

/// Anything that turns a prompt into a completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  async fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String, GameError>;
}

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
}

impl OpenAI {
  /// Construct the client if an API key is configured; otherwise return None.
  pub fn from_config(cfg: &ServiceConfig) -> Option<Self> {
    let api_key = cfg.openrouter_api_key.clone()?;
    let mut builder = reqwest::Client::builder();
    if let Some(t) = cfg.http_timeout {
      builder = builder.timeout(t);
    }
    let client = match builder.build() {
      Ok(c) => c,
      Err(e) => {
        error!(target: "narrator", error = %e, "Failed to build HTTP client for text generation");
        return None;
      }
    };
    Some(Self {
      client,
      api_key,
      base_url: cfg.openrouter_base_url.clone(),
      model: cfg.openrouter_model.clone(),
    })
  }
}

#[async_trait]
impl TextGenerator for OpenAI {
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String, GameError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature,
    };

    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "sql-quest/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await?;

    let status = res.status();
    let body = res.text().await?;
    let elapsed = start.elapsed();

    if !status.is_success() {
      let message = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(?elapsed, status = status.as_u16(), "Text generation call failed");
      return Err(GameError::Upstream { status: status.as_u16(), message });
    }

    let text = parse_completion(&body)?;
    info!(?elapsed, completion_len = text.len(), "Text generation response received");
    Ok(text)
  }
}

/// Pull the completion text out of a chat-completions envelope.
pub fn parse_completion(body: &str) -> Result<String, GameError> {
  let parsed: ChatCompletionResponse =
    serde_json::from_str(body).map_err(|_| GameError::UpstreamFormat(trunc_for_log(body, 200)))?;
  if let Some(usage) = &parsed.usage {
    info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Text generation usage");
  }
  parsed
    .choices
    .into_iter()
    .next()
    .and_then(|c| c.message)
    .and_then(|m| m.content)
    .filter(|c| !c.trim().is_empty())
    .ok_or_else(|| GameError::UpstreamFormat(trunc_for_log(body, 200)))
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { #[serde(default)] message: Option<ChatMessageResp> }
#[derive(Deserialize)]
struct ChatMessageResp { #[serde(default)] content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn completion_is_read_from_first_choice() {
    let body = r#"{"choices":[{"message":{"role":"assistant","content":"The vault hums."}}],"usage":{"total_tokens":12}}"#;
    assert_eq!(parse_completion(body).expect("completion"), "The vault hums.");
  }

  #[test]
  fn missing_completion_is_a_format_error() {
    for body in [
      r#"{"choices":[]}"#,
      r#"{"choices":[{"message":{}}]}"#,
      r#"{"choices":[{}]}"#,
      r#"{"error":{"message":"rate limited"}}"#,
      "not json",
    ] {
      assert!(matches!(parse_completion(body), Err(GameError::UpstreamFormat(_))), "{body}");
    }
  }

  #[test]
  fn error_bodies_yield_their_message() {
    assert_eq!(extract_openai_error(r#"{"error":{"message":"bad key","code":401}}"#).as_deref(), Some("bad key"));
    assert_eq!(extract_openai_error("<html>"), None);
  }
}
