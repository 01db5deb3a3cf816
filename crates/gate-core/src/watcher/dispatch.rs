//! ============================================================================
//! Dispatch - Notices and deferred redirects
//! ============================================================================
//! The engine decides *that* and *when* a notice or redirect happens; the
//! host's [`Dispatcher`] decides *how* it is shown.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::transition::BetaEdge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-visible toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: &str, body: &str) -> Self {
        Self {
            level,
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    /// Toast shown when the beta ends mid-session
    pub fn beta_ended(edge: BetaEdge) -> Self {
        match edge {
            BetaEdge::AccessRetained => Notice::new(
                NoticeLevel::Info,
                "Beta period ended",
                "The beta period has ended. Your membership keeps your access.",
            ),
            BetaEdge::SubscriptionRequired => Notice::new(
                NoticeLevel::Warning,
                "Beta period ended",
                "The beta period has ended. Subscribe to keep your access. Redirecting to the subscription page...",
            ),
            BetaEdge::LinkAndSubscribe => Notice::new(
                NoticeLevel::Warning,
                "Beta period ended",
                "The beta period has ended. Link your Discord account and subscribe to continue.",
            ),
        }
    }

    pub fn discord_recheck_failed(reason: &str) -> Self {
        Notice::new(NoticeLevel::Error, "Discord verification failed", reason)
    }
}

/// Host-side presentation of notices and navigation
pub trait Dispatcher: Send + Sync {
    fn notify(&self, notice: &Notice);

    fn redirect(&self, route: &str);
}

/// Dispatcher that renders everything as log events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

impl Dispatcher for TracingDispatcher {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Info => info!("[notice] {}: {}", notice.title, notice.body),
            NoticeLevel::Warning => warn!("[notice] {}: {}", notice.title, notice.body),
            NoticeLevel::Error => error!("[notice] {}: {}", notice.title, notice.body),
        }
    }

    fn redirect(&self, route: &str) {
        info!("[redirect] {}", route);
    }
}

/// One-shot redirect timer bound to a session.
///
/// Dropping or cancelling it before the delay elapses prevents the redirect.
#[derive(Debug)]
pub struct ScheduledRedirect {
    session_id: Uuid,
    route: String,
    handle: JoinHandle<()>,
}

impl ScheduledRedirect {
    /// Must be called from within a tokio runtime
    pub fn schedule(
        dispatcher: Arc<dyn Dispatcher>,
        route: &str,
        delay: Duration,
        session_id: Uuid,
    ) -> Self {
        debug!("Scheduling redirect to {} in {:?} (session {})", route, delay, session_id);

        let target = route.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.redirect(&target);
        });

        Self {
            session_id,
            route: route.to_string(),
            handle,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        if !self.handle.is_finished() {
            info!("Cancelled pending redirect to {} (session {})", self.route, self.session_id);
        }
    }
}

impl Drop for ScheduledRedirect {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        redirects: Mutex<Vec<String>>,
    }

    impl Dispatcher for Recorder {
        fn notify(&self, _notice: &Notice) {}

        fn redirect(&self, route: &str) {
            self.redirects.lock().unwrap().push(route.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_fires_after_delay() {
        let recorder = Arc::new(Recorder::default());
        let pending = ScheduledRedirect::schedule(
            recorder.clone(),
            "/subscribe",
            Duration::from_secs(3),
            Uuid::new_v4(),
        );

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(recorder.redirects.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*recorder.redirects.lock().unwrap(), vec!["/subscribe".to_string()]);
        assert!(pending.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_redirect() {
        let recorder = Arc::new(Recorder::default());
        let pending = ScheduledRedirect::schedule(
            recorder.clone(),
            "/subscribe",
            Duration::from_secs(3),
            Uuid::new_v4(),
        );
        assert_eq!(pending.route(), "/subscribe");

        tokio::time::sleep(Duration::from_secs(1)).await;
        pending.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(recorder.redirects.lock().unwrap().is_empty());
    }

    #[test]
    fn test_beta_notice_levels() {
        assert_eq!(Notice::beta_ended(BetaEdge::AccessRetained).level, NoticeLevel::Info);
        assert_eq!(
            Notice::beta_ended(BetaEdge::SubscriptionRequired).level,
            NoticeLevel::Warning
        );
        let link = Notice::beta_ended(BetaEdge::LinkAndSubscribe);
        assert_eq!(link.level, NoticeLevel::Warning);
        assert!(link.body.contains("Discord"));
    }
}
