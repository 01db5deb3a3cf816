//! ============================================================================
//! Transition Watcher - Detects the end of the beta while a session is live
//! ============================================================================
//! Fed one committed beta snapshot at a time. Fires on the single edge
//! "not expired -> expired" and then latches until the session is re-armed.
//!
//! ```text
//!   NoPriorSnapshot --first snapshot--> Stable(s)
//!   Stable(prev) --same expired flag--> Stable(curr)
//!   Stable(prev) --false -> true, user--> EdgeFired   (one BetaEdge emitted)
//!   EdgeFired --anything--> EdgeFired                (until rearm)
//! ```
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::evaluate;
use crate::types::{BetaStatus, BypassConfig, User};

/// Watcher state for the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherState {
    NoPriorSnapshot,
    Stable(BetaStatus),
    EdgeFired,
}

/// What the user should experience when the beta ends under them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaEdge {
    /// Still authorized by subscription or policy; informational only
    AccessRetained,
    /// Discord-verified but nothing else grants access; send to subscribe
    SubscriptionRequired,
    /// Neither linked nor subscribed; prompt for both
    LinkAndSubscribe,
}

impl BetaEdge {
    /// Classify the edge by the user's authorization inputs at edge time
    pub fn classify(user: &User, beta_status: &BetaStatus, config: Option<&BypassConfig>) -> Self {
        if evaluate(Some(user), Some(beta_status), config).is_authorized {
            BetaEdge::AccessRetained
        } else if user.is_discord_verified() {
            BetaEdge::SubscriptionRequired
        } else {
            BetaEdge::LinkAndSubscribe
        }
    }

    pub fn redirects(&self) -> bool {
        matches!(self, BetaEdge::SubscriptionRequired)
    }
}

/// Edge detector over successive beta snapshots
#[derive(Debug)]
pub struct TransitionWatcher {
    state: WatcherState,
}

impl TransitionWatcher {
    pub fn new() -> Self {
        Self {
            state: WatcherState::NoPriorSnapshot,
        }
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    pub fn has_fired(&self) -> bool {
        self.state == WatcherState::EdgeFired
    }

    /// Advance with the next committed snapshot.
    ///
    /// `user` and `config` are the session's current inputs; without a user
    /// the edge is not reported and the snapshot simply becomes the baseline.
    pub fn on_snapshot(
        &mut self,
        snapshot: &BetaStatus,
        user: Option<&User>,
        config: Option<&BypassConfig>,
    ) -> Option<BetaEdge> {
        let previously_expired = match &self.state {
            WatcherState::EdgeFired => {
                debug!("Beta edge already fired this session, ignoring snapshot");
                return None;
            }
            WatcherState::NoPriorSnapshot => None,
            WatcherState::Stable(prev) => Some(prev.expired),
        };

        match (previously_expired, user) {
            (Some(false), Some(user)) if snapshot.expired => {
                let edge = BetaEdge::classify(user, snapshot, config);
                info!("Beta period ended during session: {:?}", edge);
                self.state = WatcherState::EdgeFired;
                Some(edge)
            }
            _ => {
                self.state = WatcherState::Stable(snapshot.clone());
                None
            }
        }
    }

    /// Start over for a new session
    pub fn rearm(&mut self) {
        debug!("Transition watcher re-armed");
        self.state = WatcherState::NoPriorSnapshot;
    }
}

impl Default for TransitionWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionStatus;

    fn beta(expired: bool) -> BetaStatus {
        BetaStatus::new(expired)
    }

    fn verified() -> User {
        User::new(SubscriptionStatus::Inactive).with_discord_verified(true)
    }

    /// Feed a sequence and collect the index of every fired edge
    fn run(watcher: &mut TransitionWatcher, seq: &[bool], user: Option<&User>) -> Vec<(usize, BetaEdge)> {
        seq.iter()
            .enumerate()
            .filter_map(|(i, expired)| {
                watcher
                    .on_snapshot(&beta(*expired), user, None)
                    .map(|edge| (i, edge))
            })
            .collect()
    }

    #[test]
    fn test_fires_once_on_third_snapshot() {
        let mut watcher = TransitionWatcher::new();
        let fired = run(&mut watcher, &[false, false, true], Some(&verified()));

        assert_eq!(fired, vec![(2, BetaEdge::SubscriptionRequired)]);
        assert!(watcher.has_fired());
    }

    #[test]
    fn test_already_expired_at_start_never_fires() {
        let mut watcher = TransitionWatcher::new();
        let fired = run(&mut watcher, &[true, true], Some(&verified()));

        assert!(fired.is_empty());
        assert_eq!(watcher.state(), &WatcherState::Stable(beta(true)));
    }

    #[test]
    fn test_first_snapshot_is_baseline() {
        let mut watcher = TransitionWatcher::new();
        assert_eq!(watcher.on_snapshot(&beta(true), Some(&verified()), None), None);
        assert_eq!(watcher.state(), &WatcherState::Stable(beta(true)));
    }

    #[test]
    fn test_latched_after_fire() {
        let mut watcher = TransitionWatcher::new();
        let fired = run(
            &mut watcher,
            &[false, true, false, true, true, false, true],
            Some(&verified()),
        );
        assert_eq!(fired.len(), 1);
        assert_eq!(watcher.state(), &WatcherState::EdgeFired);
    }

    #[test]
    fn test_rearm_allows_one_more_fire() {
        let mut watcher = TransitionWatcher::new();
        let user = verified();
        assert_eq!(run(&mut watcher, &[false, true], Some(&user)).len(), 1);

        watcher.rearm();
        assert_eq!(watcher.state(), &WatcherState::NoPriorSnapshot);
        assert_eq!(run(&mut watcher, &[false, true], Some(&user)).len(), 1);
    }

    #[test]
    fn test_no_session_no_edge() {
        let mut watcher = TransitionWatcher::new();
        assert!(run(&mut watcher, &[false, true], None).is_empty());
        assert_eq!(watcher.state(), &WatcherState::Stable(beta(true)));

        // Logging in afterwards does not replay the missed edge
        assert!(run(&mut watcher, &[true], Some(&verified())).is_empty());
    }

    #[test]
    fn test_reopened_beta_can_end_again_before_fire() {
        let mut watcher = TransitionWatcher::new();
        // Edge while signed out is skipped, the re-opened window still counts
        assert!(run(&mut watcher, &[false, true, false], None).is_empty());
        let fired = run(&mut watcher, &[true], Some(&verified()));
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_edge_classification() {
        let ended = beta(true);

        let subscriber = User::new(SubscriptionStatus::Active).with_discord_verified(true);
        assert_eq!(BetaEdge::classify(&subscriber, &ended, None), BetaEdge::AccessRetained);

        assert_eq!(BetaEdge::classify(&verified(), &ended, None), BetaEdge::SubscriptionRequired);

        let stranger = User::new(SubscriptionStatus::Inactive);
        assert_eq!(BetaEdge::classify(&stranger, &ended, None), BetaEdge::LinkAndSubscribe);

        let comped = User::new(SubscriptionStatus::Inactive)
            .with_discord_verified(true)
            .with_tier("shadow");
        let config = BypassConfig::new(false, false, ["shadow"]);
        assert_eq!(
            BetaEdge::classify(&comped, &ended, Some(&config)),
            BetaEdge::AccessRetained
        );

        let discord_free = BypassConfig::new(true, true, Vec::<String>::new());
        assert_eq!(
            BetaEdge::classify(&verified(), &ended, Some(&discord_free)),
            BetaEdge::AccessRetained
        );
    }

    #[test]
    fn test_only_subscription_required_redirects() {
        assert!(BetaEdge::SubscriptionRequired.redirects());
        assert!(!BetaEdge::AccessRetained.redirects());
        assert!(!BetaEdge::LinkAndSubscribe.redirects());
    }
}
