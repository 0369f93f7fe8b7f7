//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyLevel;
use crate::domain::{ConceptId, Theme};
use crate::session::{SessionView, SubmitOutcome};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Start {
        theme: Theme,
        concepts: Vec<ConceptId>,
    },
    /// Editor contents, kept so a reconnecting renderer can restore them.
    Input {
        text: String,
    },
    Submit {
        query: String,
    },
    ToggleHint,
    ToggleReveal,
    RegenerateNarrative,
    End,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: Box<SessionView>,
    },
    Submitted {
        outcome: SubmitOutcome,
        session: Box<SessionView>,
    },
    Ended {
        session: Box<SessionView>,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct StartIn {
    pub theme: Theme,
    pub concepts: Vec<ConceptId>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitIn {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitOut {
    pub outcome: SubmitOutcome,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
pub struct ConceptOut {
    pub id: &'static str,
    pub level: DifficultyLevel,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub generator: bool,
}
