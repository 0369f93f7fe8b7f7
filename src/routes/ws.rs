//! WebSocket upgrade + message loop. One play session per connection: `start`
//! creates it, the socket closing tears it down. Each client message is parsed
//! as JSON and answered with a single JSON message.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug, warn};

use crate::error::GameError;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::{AppState, SharedSession};

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "sql_quest", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "sql_quest", "WebSocket connected");
  let mut current: Option<String> = None;

  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "sql_quest", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state, &mut current).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "sql_quest", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }

  if let Some(id) = current.take() {
    if let Err(e) = state.end_session(&id).await {
      warn!(target: "session", %id, error = %e, "Session already gone at disconnect");
    }
  }
  info!(target: "sql_quest", "WebSocket disconnected");
}

async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  current: &mut Option<String>,
) -> ServerWsMessage {
  match dispatch(msg, state, current).await {
    Ok(reply) => reply,
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

async fn dispatch(
  msg: ClientWsMessage,
  state: &AppState,
  current: &mut Option<String>,
) -> Result<ServerWsMessage, GameError> {
  match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

    ClientWsMessage::Start { theme, concepts } => {
      // A new start replaces the connection's previous session.
      if let Some(old) = current.take() {
        let _ = state.end_session(&old).await;
      }
      let (_, view) = state.start_session(theme, concepts).await?;
      info!(target: "session", id = %view.id, concept = %view.concept, "WS session started");
      *current = Some(view.id.clone());
      Ok(ServerWsMessage::Session { session: Box::new(view) })
    }

    ClientWsMessage::Input { text } => {
      let shared = active(state, current).await?;
      let mut session = shared.lock().await;
      session.set_input(&text);
      Ok(ServerWsMessage::Session { session: Box::new(session.snapshot()) })
    }

    ClientWsMessage::Submit { query } => {
      let shared = active(state, current).await?;
      let mut session = shared.lock().await;
      let outcome = session.submit(&query).await;
      info!(target: "session", id = %session.id(), ?outcome, "WS submission graded");
      Ok(ServerWsMessage::Submitted { outcome, session: Box::new(session.snapshot()) })
    }

    ClientWsMessage::ToggleHint => {
      let shared = active(state, current).await?;
      let mut session = shared.lock().await;
      session.toggle_hint().await?;
      Ok(ServerWsMessage::Session { session: Box::new(session.snapshot()) })
    }

    ClientWsMessage::ToggleReveal => {
      let shared = active(state, current).await?;
      let mut session = shared.lock().await;
      session.toggle_reveal().await?;
      Ok(ServerWsMessage::Session { session: Box::new(session.snapshot()) })
    }

    ClientWsMessage::RegenerateNarrative => {
      let shared = active(state, current).await?;
      let mut session = shared.lock().await;
      session.regenerate_narrative().await?;
      Ok(ServerWsMessage::Session { session: Box::new(session.snapshot()) })
    }

    ClientWsMessage::End => {
      let id = current.take().ok_or_else(no_session)?;
      let view = state.end_session(&id).await?;
      Ok(ServerWsMessage::Ended { session: Box::new(view) })
    }
  }
}

/// The connection's session, looked up in the store so each event counts as
/// activity. A session reaped while idle surfaces as unknown.
async fn active(state: &AppState, current: &Option<String>) -> Result<SharedSession, GameError> {
  let id = current.as_deref().ok_or_else(no_session)?;
  state.session(id).await
}

fn no_session() -> GameError {
  GameError::UnknownSession("no session on this connection; send start first".into())
}
