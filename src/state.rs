//! Application state: shared services and the in-memory session store.
//!
//! This module owns:
//!   - the validated query bank and the prompts (from TOML or defaults)
//!   - the validation backend client
//!   - the optional text-generation client
//!   - live play sessions, each behind its own mutex so events on one
//!     session are handled one at a time
//!   - the idle reaper that ends sessions nobody has touched for a while

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::backend::{HttpBackend, ValidationBackend};
use crate::config::{build_query_bank, load_agent_config_from_env, ServiceConfig};
use crate::domain::{ConceptId, Theme};
use crate::error::GameError;
use crate::openai::{OpenAI, TextGenerator};
use crate::seeds::seed_bank;
use crate::session::{GameSession, SessionDeps, SessionView};

pub type SharedSession = Arc<Mutex<GameSession>>;

/// Upper bound on how often the reaper wakes up.
const REAP_EVERY_MAX: Duration = Duration::from_secs(60);

pub struct SessionSlot {
    pub session: SharedSession,
    pub last_active: Instant,
}

pub struct AppState {
    pub config: ServiceConfig,
    pub deps: SessionDeps,
    pub sessions: RwLock<HashMap<String, SessionSlot>>,
}

impl AppState {
    /// Build state from config: load agent TOML, validate the query bank,
    /// set up the backend client and the optional generator.
    #[instrument(level = "info", skip_all)]
    pub fn new(config: ServiceConfig) -> Result<Self, GameError> {
        let agent_cfg = load_agent_config_from_env();
        let prompts = agent_cfg
            .as_ref()
            .map(|c| c.prompts.clone())
            .unwrap_or_default();

        // Refuses to start when any theme x concept has no fixture.
        let bank = build_query_bank(seed_bank(), agent_cfg.as_ref())?;
        info!(target: "sql_quest", variants = bank.variant_count(), "Query bank ready");

        let backend: Arc<dyn ValidationBackend> = Arc::new(HttpBackend::from_config(&config)?);
        info!(target: "sql_quest", api_url = %config.api_url, "Validation backend configured");

        let generator: Option<Arc<dyn TextGenerator>> = match OpenAI::from_config(&config) {
            Some(oa) => {
                info!(target: "sql_quest", base_url = %oa.base_url, model = %oa.model, "Text generation enabled.");
                Some(Arc::new(oa))
            }
            None => {
                info!(target: "sql_quest", "Text generation disabled (no OPENROUTER_API_KEY). Using local narratives and fallbacks.");
                None
            }
        };

        let deps = SessionDeps {
            backend,
            generator,
            prompts: Arc::new(prompts),
            bank: Arc::new(bank),
            reveal_policy: config.reveal_policy,
        };
        Ok(Self::with_services(config, deps))
    }

    /// State around already-built services.
    pub fn with_services(config: ServiceConfig, deps: SessionDeps) -> Self {
        Self {
            config,
            deps,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session and register it under a fresh id.
    #[instrument(level = "info", skip(self, concepts), fields(%theme, concepts = concepts.len()))]
    pub async fn start_session(&self, theme: Theme, concepts: Vec<ConceptId>) -> Result<(SharedSession, SessionView), GameError> {
        let id = Uuid::new_v4().to_string();
        let session = GameSession::start(id.clone(), self.deps.clone(), theme, concepts).await?;
        let view = session.snapshot();
        let shared = Arc::new(Mutex::new(session));
        let slot = SessionSlot { session: shared.clone(), last_active: Instant::now() };
        self.sessions.write().await.insert(id.clone(), slot);
        let live = self.live_sessions().await;
        info!(target: "session", %id, live, "Session registered");
        Ok((shared, view))
    }

    /// Look a session up and mark it active.
    pub async fn session(&self, id: &str) -> Result<SharedSession, GameError> {
        let mut sessions = self.sessions.write().await;
        let slot = sessions
            .get_mut(id)
            .ok_or_else(|| GameError::UnknownSession(id.to_string()))?;
        slot.last_active = Instant::now();
        Ok(slot.session.clone())
    }

    /// Remove a session and clear its narrative history.
    #[instrument(level = "info", skip(self))]
    pub async fn end_session(&self, id: &str) -> Result<SessionView, GameError> {
        let slot = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| GameError::UnknownSession(id.to_string()))?;
        let mut session = slot.session.lock().await;
        session.end();
        Ok(session.snapshot())
    }

    pub async fn live_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// End every session idle for at least `max_idle`. Returns how many went.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.last_active.elapsed() >= max_idle)
            .map(|(id, _)| id.clone())
            .collect();

        let mut reaped = 0;
        for id in idle {
            // Another path may have ended it between the scan and now.
            if self.end_session(&id).await.is_ok() {
                reaped += 1;
            }
        }
        if reaped > 0 {
            let live = self.live_sessions().await;
            info!(target: "session", reaped, live, idle_secs = max_idle.as_secs(), "Idle sessions ended");
        }
        reaped
    }
}

/// Periodically end sessions idle longer than `max_idle`.
pub fn spawn_idle_reaper(state: Arc<AppState>, max_idle: Duration) -> JoinHandle<()> {
    let period = max_idle.min(REAP_EVERY_MAX).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let reaped = state.reap_idle(max_idle).await;
            debug!(target: "session", reaped, "Idle sweep done");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{deps, FakeBackend};
    use crate::session::SessionPhase;

    fn state() -> AppState {
        AppState::with_services(ServiceConfig::from_lookup(|_| None), deps(FakeBackend::with(0, vec![]), None))
    }

    #[tokio::test]
    async fn idle_session_is_ended_and_dropped() {
        let state = state();
        let (shared, view) = state
            .start_session(Theme::Fantasy, vec!["basic WHERE clause".into()])
            .await
            .expect("session");
        assert!(shared.lock().await.narratives_kept() > 0);

        assert_eq!(state.reap_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(state.live_sessions().await, 1);

        assert_eq!(state.reap_idle(Duration::ZERO).await, 1);
        assert_eq!(state.live_sessions().await, 0);
        let session = shared.lock().await;
        assert_eq!(session.narratives_kept(), 0);
        assert_eq!(session.snapshot().phase, SessionPhase::Ended);
        drop(session);

        assert!(matches!(state.session(&view.id).await, Err(GameError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn lookups_keep_a_session_alive() {
        let state = state();
        let (_, view) = state
            .start_session(Theme::Cyberpunk, vec!["basic WHERE clause".into()])
            .await
            .expect("session");
        tokio::time::sleep(Duration::from_millis(300)).await;
        state.session(&view.id).await.expect("live");
        assert_eq!(state.reap_idle(Duration::from_millis(250)).await, 0);
        assert_eq!(state.live_sessions().await, 1);
    }
}
