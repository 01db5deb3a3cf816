//! ============================================================================
//! Session Store - Last committed user, beta and policy snapshots
//! ============================================================================
//! The single shared cell for "what do we currently know". Written only by
//! fetch completion, `invalidate` and `clear_session`; read everywhere else.
//! Beta snapshots are committed by the engine alone, next to the watcher.
//!
//! Every fetch takes a sequence number when it is *issued*. A result is only
//! committed if its slot has not been re-requested since, so an older
//! response arriving late can never overwrite a newer one.
//! ============================================================================

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::backend::MembershipBackend;
use crate::types::{BetaStatus, BypassConfig, GateError, User};

/// Which snapshot a fetch targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    User,
    BetaStatus,
    BypassConfig,
}

/// Issued when a fetch starts; must be presented to commit its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FetchTicket {
    resource: Resource,
    seq: u64,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    /// Sequence of the most recently issued fetch
    requested: u64,
    /// Sequence of the most recently settled fetch
    settled: u64,
    fetched_at: Option<DateTime<Utc>>,
    stale: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            requested: 0,
            settled: 0,
            fetched_at: None,
            stale: true,
        }
    }
}

impl<T> Slot<T> {
    fn is_loading(&self) -> bool {
        self.requested > self.settled
    }

    /// Only the latest issued fetch may settle the slot
    fn accepts(&self, seq: u64) -> bool {
        seq == self.requested
    }

    fn settle(&mut self, seq: u64) {
        self.settled = seq;
        self.fetched_at = Some(Utc::now());
        self.stale = false;
    }

    /// Supersede anything in flight and force the next read to refetch
    fn supersede(&mut self, seq: u64) {
        self.requested = seq;
        self.settled = seq;
        self.fetched_at = None;
        self.stale = true;
    }
}

#[derive(Debug, Default)]
struct StoreState {
    user: Slot<User>,
    beta: Slot<BetaStatus>,
    bypass: Slot<BypassConfig>,
    next_seq: u64,
}

impl StoreState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Point-in-time copy of everything the store knows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub beta_status: Option<BetaStatus>,
    pub bypass_config: Option<BypassConfig>,
    pub user_loading: bool,
    pub beta_loading: bool,
    pub bypass_loading: bool,
}

/// Owned session state with a sequenced write path
pub struct SessionStore {
    backend: Arc<dyn MembershipBackend>,
    state: RwLock<StoreState>,
    bypass_ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn MembershipBackend>, bypass_ttl: chrono::Duration) -> Self {
        Self {
            backend,
            state: RwLock::new(StoreState::default()),
            bypass_ttl,
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn MembershipBackend> {
        &self.backend
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            user: state.user.value.clone(),
            beta_status: state.beta.value.clone(),
            bypass_config: state.bypass.value.clone(),
            user_loading: state.user.is_loading(),
            beta_loading: state.beta.is_loading(),
            bypass_loading: state.bypass.is_loading(),
        }
    }

    /// Last committed user, without fetching
    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.value.clone()
    }

    /// Last committed beta status, without fetching
    pub async fn beta_status(&self) -> Option<BetaStatus> {
        self.state.read().await.beta.value.clone()
    }

    /// Last committed bypass config, without fetching
    pub async fn bypass_config(&self) -> Option<BypassConfig> {
        self.state.read().await.bypass.value.clone()
    }

    pub async fn is_loading(&self, resource: Resource) -> bool {
        let state = self.state.read().await;
        match resource {
            Resource::User => state.user.is_loading(),
            Resource::BetaStatus => state.beta.is_loading(),
            Resource::BypassConfig => state.bypass.is_loading(),
        }
    }

    /// Whether the next read of `resource` will go to the backend
    pub async fn is_stale(&self, resource: Resource) -> bool {
        let state = self.state.read().await;
        match resource {
            Resource::User => state.user.stale,
            Resource::BetaStatus => state.beta.stale,
            Resource::BypassConfig => state.bypass.stale,
        }
    }

    /// Inputs the decision function needs besides the beta status
    pub(crate) async fn authorization_inputs(&self) -> (Option<User>, Option<BypassConfig>) {
        let state = self.state.read().await;
        (state.user.value.clone(), state.bypass.value.clone())
    }

    // ========================================================================
    // Fetches
    // ========================================================================

    /// Fetch the user and return whatever is committed afterwards
    pub async fn fetch_user(&self) -> Option<User> {
        let ticket = self.begin_fetch(Resource::User).await;
        let result = self.backend.fetch_user().await;
        self.settle_user(ticket, result).await;
        self.user().await
    }

    pub async fn fetch_bypass_config(&self) -> Option<BypassConfig> {
        let ticket = self.begin_fetch(Resource::BypassConfig).await;
        let result = self.backend.fetch_bypass_config().await;
        self.settle_bypass(ticket, result).await;
        self.bypass_config().await
    }

    /// Cached bypass config while inside the freshness window, else refetch
    pub async fn ensure_bypass_config(&self) -> Option<BypassConfig> {
        {
            let state = self.state.read().await;
            let fresh = state
                .bypass
                .fetched_at
                .map(|at| Utc::now() - at < self.bypass_ttl)
                .unwrap_or(false);
            if fresh && !state.bypass.stale {
                debug!("Bypass config cache hit");
                return state.bypass.value.clone();
            }
        }

        debug!("Bypass config stale, fetching");
        self.fetch_bypass_config().await
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Force every slot to refetch on next read.
    ///
    /// Fetches already in flight are superseded and will not commit. Values
    /// are kept until the refetch lands.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        let seq = state.next_seq();
        state.user.supersede(seq);
        state.beta.supersede(seq);
        state.bypass.supersede(seq);
        info!("Session cache invalidated (seq {})", seq);
    }

    /// Drop the user on logout. In-flight user fetches are discarded.
    pub async fn clear_session(&self) {
        let mut state = self.state.write().await;
        let seq = state.next_seq();
        state.user.supersede(seq);
        state.user.value = None;
        state.bypass.supersede(seq);
        info!("Session cleared");
    }

    pub(crate) async fn begin_fetch(&self, resource: Resource) -> FetchTicket {
        let mut state = self.state.write().await;
        let seq = state.next_seq();
        match resource {
            Resource::User => state.user.requested = seq,
            Resource::BetaStatus => state.beta.requested = seq,
            Resource::BypassConfig => state.bypass.requested = seq,
        }
        debug!("Issued {:?} fetch #{}", resource, seq);
        FetchTicket { resource, seq }
    }

    /// Commit a user fetch. Errors count as "no session".
    pub(crate) async fn settle_user(
        &self,
        ticket: FetchTicket,
        result: Result<Option<User>, GateError>,
    ) -> bool {
        debug_assert_eq!(ticket.resource, Resource::User);
        let mut state = self.state.write().await;
        if !state.user.accepts(ticket.seq) {
            debug!(
                "Discarding stale user fetch #{} (latest #{})",
                ticket.seq, state.user.requested
            );
            return false;
        }

        state.user.settle(ticket.seq);
        state.user.value = match result {
            Ok(user) => user,
            Err(e) => {
                warn!("User fetch failed, treating as signed out: {}", e);
                None
            }
        };
        true
    }

    /// Commit a beta fetch. Errors keep the last good snapshot and return `None`.
    pub(crate) async fn settle_beta(
        &self,
        ticket: FetchTicket,
        result: Result<BetaStatus, GateError>,
    ) -> Option<BetaStatus> {
        debug_assert_eq!(ticket.resource, Resource::BetaStatus);
        let mut state = self.state.write().await;
        if !state.beta.accepts(ticket.seq) {
            debug!(
                "Discarding stale beta fetch #{} (latest #{})",
                ticket.seq, state.beta.requested
            );
            return None;
        }

        match result {
            Ok(beta) => {
                state.beta.settle(ticket.seq);
                state.beta.value = Some(beta.clone());
                Some(beta)
            }
            Err(e) => {
                warn!("Beta status fetch failed, keeping last snapshot: {}", e);
                state.beta.settled = ticket.seq;
                None
            }
        }
    }

    /// Commit a bypass config fetch. Errors fail closed to no config.
    pub(crate) async fn settle_bypass(
        &self,
        ticket: FetchTicket,
        result: Result<BypassConfig, GateError>,
    ) -> bool {
        debug_assert_eq!(ticket.resource, Resource::BypassConfig);
        let mut state = self.state.write().await;
        if !state.bypass.accepts(ticket.seq) {
            debug!(
                "Discarding stale bypass config fetch #{} (latest #{})",
                ticket.seq, state.bypass.requested
            );
            return false;
        }

        match result {
            Ok(config) => {
                state.bypass.settle(ticket.seq);
                state.bypass.value = Some(config);
            }
            Err(e) => {
                warn!("Bypass config fetch failed, no bypass available: {}", e);
                state.bypass.settled = ticket.seq;
                state.bypass.fetched_at = None;
                state.bypass.stale = true;
                state.bypass.value = None;
            }
        }
        true
    }
}
