//! ============================================================================
//! Access Engine - Session lifecycle around the access decision
//! ============================================================================
//! Owns the session store, the transition watcher and the dispatcher:
//! - `load` / `begin_session`: fetch all three signals independently
//! - `refresh_beta_status`: commit a beta snapshot, then feed the watcher
//! - `logout`: cancel pending redirects, re-arm, drop the user
//! - `recheck_discord`: re-verify, then invalidate and refetch the user
//!
//! Commit and watcher observation happen under the watcher lock, so the
//! watcher always sees committed snapshots in commit order. Lock order is
//! session, then watcher, then store.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::evaluate;
use crate::config::GateConfig;
use crate::session::{HttpBackend, MembershipBackend, Resource, SessionStore};
use crate::types::{AuthorizationDecision, GateError};
use crate::watcher::{
    BetaEdge, Dispatcher, Notice, ScheduledRedirect, TransitionWatcher, WatcherState,
};

#[derive(Debug)]
struct SessionContext {
    id: Uuid,
    pending_redirect: Option<ScheduledRedirect>,
}

/// Access authorization engine
pub struct AccessEngine {
    config: GateConfig,
    store: SessionStore,
    watcher: Mutex<TransitionWatcher>,
    dispatcher: Arc<dyn Dispatcher>,
    session: Mutex<SessionContext>,
}

impl AccessEngine {
    pub fn new(
        config: GateConfig,
        backend: Arc<dyn MembershipBackend>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let store = SessionStore::new(backend, config.bypass_config_ttl());
        Self {
            config,
            store,
            watcher: Mutex::new(TransitionWatcher::new()),
            dispatcher,
            session: Mutex::new(SessionContext {
                id: Uuid::new_v4(),
                pending_redirect: None,
            }),
        }
    }

    /// Engine talking to the HTTP membership API
    pub fn with_http(config: GateConfig, dispatcher: Arc<dyn Dispatcher>) -> Result<Self, GateError> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        Ok(Self::new(config, backend, dispatcher))
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn session_id(&self) -> Uuid {
        self.session.lock().await.id
    }

    pub async fn watcher_state(&self) -> WatcherState {
        self.watcher.lock().await.state().clone()
    }

    /// Route of a redirect that is scheduled but has not run yet
    pub async fn pending_redirect(&self) -> Option<String> {
        let session = self.session.lock().await;
        session
            .pending_redirect
            .as_ref()
            .filter(|r| r.session_id() == session.id && !r.is_finished())
            .map(|r| r.route().to_string())
    }

    /// Decision over the last committed snapshots. Never fetches.
    pub async fn decision(&self) -> AuthorizationDecision {
        let snapshot = self.store.snapshot().await;
        evaluate(
            snapshot.user.as_ref(),
            snapshot.beta_status.as_ref(),
            snapshot.bypass_config.as_ref(),
        )
    }

    /// Fetch user, beta status and bypass config concurrently
    pub async fn load(&self) -> AuthorizationDecision {
        tokio::join!(
            self.store.fetch_user(),
            self.refresh_beta_status(),
            self.store.ensure_bypass_config(),
        );

        let decision = self.decision().await;
        info!(
            "Session {} loaded: authorized={} badge={:?}",
            self.session_id().await,
            decision.is_authorized,
            decision.badge()
        );
        decision
    }

    /// Start a fresh session (after login): new identity, re-armed watcher,
    /// no pending redirect, everything refetched.
    pub async fn begin_session(&self) -> AuthorizationDecision {
        let id = self.rotate_session().await;
        self.store.invalidate().await;
        info!("Session {} started", id);
        self.load().await
    }

    /// End the session. Backend failures are logged; local state is cleared
    /// regardless.
    pub async fn logout(&self) {
        let id = self.rotate_session().await;

        if let Err(e) = self.store.backend().logout().await {
            warn!("Logout request failed, clearing local session anyway: {}", e);
        }
        self.store.clear_session().await;
        info!("Logged out (next session {})", id);
    }

    /// Re-run Discord verification. On failure the cached state is untouched
    /// and an error notice is shown.
    pub async fn recheck_discord(&self) -> Result<AuthorizationDecision, GateError> {
        if let Err(e) = self.store.backend().recheck_discord().await {
            let reason = match e {
                GateError::DiscordRecheck(reason) => reason,
                other => other.to_string(),
            };
            warn!("Discord recheck failed: {}", reason);
            self.dispatcher.notify(&Notice::discord_recheck_failed(&reason));
            return Err(GateError::DiscordRecheck(reason));
        }

        self.store.invalidate().await;
        self.store.fetch_user().await;
        let decision = self.decision().await;
        info!("Discord recheck complete: authorized={}", decision.is_authorized);
        Ok(decision)
    }

    /// Fetch the beta status and run the transition watcher on it.
    ///
    /// This is the only path that commits a beta snapshot, so the watcher
    /// baseline always matches the store. Returns the edge if this refresh
    /// crossed into "expired" for a live session. Fetch errors and superseded
    /// fetches return `None` without advancing the watcher.
    pub async fn refresh_beta_status(&self) -> Option<BetaEdge> {
        let session_id = self.session_id().await;
        let ticket = self.store.begin_fetch(Resource::BetaStatus).await;
        let result = self.store.backend().fetch_beta_status().await;

        // Held until the edge is applied so a logout cannot land in between
        let mut session = self.session.lock().await;
        let edge = {
            let mut watcher = self.watcher.lock().await;
            let snapshot = self.store.settle_beta(ticket, result).await?;
            let (user, config) = self.store.authorization_inputs().await;
            watcher.on_snapshot(&snapshot, user.as_ref(), config.as_ref())?
        };

        if session.id != session_id {
            info!("Session changed during beta refresh, dropping {:?} edge", edge);
            return None;
        }
        self.apply_edge(edge, &mut session).await;
        Some(edge)
    }

    /// Poll the beta status in the background until the poller is stopped
    pub fn spawn_beta_poller(self: Arc<Self>, every: Duration) -> BetaPoller {
        info!("Polling beta status every {:?}", every);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Some(edge) = self.refresh_beta_status().await {
                    debug!("Beta poller observed edge {:?}", edge);
                }
            }
        });
        BetaPoller { handle }
    }

    async fn apply_edge(&self, edge: BetaEdge, session: &mut SessionContext) {
        self.dispatcher.notify(&Notice::beta_ended(edge));
        if !edge.redirects() {
            return;
        }

        self.store.invalidate().await;

        let redirect = ScheduledRedirect::schedule(
            Arc::clone(&self.dispatcher),
            &self.config.subscribe_route,
            self.config.redirect_delay(),
            session.id,
        );
        if let Some(previous) = session.pending_redirect.replace(redirect) {
            previous.cancel();
        }
    }

    /// New session identity with a re-armed watcher; cancels anything
    /// scheduled for the old one
    async fn rotate_session(&self) -> Uuid {
        let mut session = self.session.lock().await;
        if let Some(pending) = session.pending_redirect.take() {
            pending.cancel();
        }
        self.watcher.lock().await.rearm();
        session.id = Uuid::new_v4();
        session.id
    }
}

/// Handle to the background beta poller; stops polling when dropped
#[derive(Debug)]
pub struct BetaPoller {
    handle: JoinHandle<()>,
}

impl BetaPoller {
    pub fn stop(self) {
        info!("Beta poller stopped");
    }
}

impl Drop for BetaPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
