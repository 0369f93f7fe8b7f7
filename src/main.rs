//! SQL Quest · session service for a story-driven SQL practice game
//!
//! - Axum HTTP + WebSocket API over play sessions
//! - Grading and concept selection delegated to the validation backend
//! - Optional narrative/hint generation via an OpenAI-compatible API
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   APP_ENV             : "development" (default) or "production"
//!   API_URL             : validation backend; defaults depend on APP_ENV
//!   OPENROUTER_API_KEY  : enables text generation if present
//!   OPENROUTER_BASE_URL : default "https://openrouter.ai/api/v1"
//!   OPENROUTER_MODEL    : default "deepseek/deepseek-chat-v3-0324"
//!   HTTP_TIMEOUT_SECS   : outbound request timeout (unset = none)
//!   REVEAL_POLICY       : "fuzzy" (default), "exact" or "off"
//!   STATIC_DIR          : default "./static"
//!   SESSION_IDLE_SECS   : end sessions idle this long (default 1800, 0 = never)
//!   AGENT_CONFIG_PATH   : path to TOML config (prompts + extra query fixtures)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod seeds;
mod fixtures;
mod progress;
mod difficulty;
mod fallback;
mod openai;
mod backend;
mod narrator;
mod session;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::config::ServiceConfig;
use crate::routes::build_router;
use crate::state::{spawn_idle_reaper, AppState};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = ServiceConfig::from_env();
  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
  let session_idle = config.session_idle;

  // Shared services and the session store. Fails fast on a broken query bank.
  let state = match AppState::new(config) {
    Ok(s) => Arc::new(s),
    Err(e) => {
      error!(target: "sql_quest", error = %e, "Startup failed");
      return Err(e.into());
    }
  };

  match session_idle {
    Some(idle) => {
      spawn_idle_reaper(state.clone(), idle);
      info!(target: "sql_quest", idle_secs = idle.as_secs(), "Idle session reaper running");
    }
    None => info!(target: "sql_quest", "Idle session reaper disabled"),
  }

  let app = build_router(state.clone());

  let listener = TcpListener::bind(addr).await?;
  info!(target: "sql_quest", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "sql_quest", live = state.live_sessions().await, "HTTP server stopped");
  Ok(())
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!(target: "sql_quest", "Shutdown signal received"),
    // Without a signal handler, keep serving until the process is killed.
    Err(e) => {
      error!(target: "sql_quest", error = %e, "Cannot listen for shutdown signal");
      std::future::pending::<()>().await;
    }
  }
}
