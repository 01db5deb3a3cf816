//! ============================================================================
//! Access Decision - Resolves the four access signals into one verdict
//! ============================================================================
//! Pure and total: no I/O, no state, safe to call on every render with any
//! mix of loaded and still-loading inputs.
//! ============================================================================

use super::bypass::{can_bypass_payment, is_bypass_tier, is_discord_free};
use crate::types::{AccessGrant, AuthorizationDecision, BetaStatus, BypassConfig, SubscriptionStatus, User};

/// Evaluate access for the current snapshots.
///
/// A missing beta status counts as "not expired" so access is not revoked
/// while it loads; it still needs a verified Discord link to matter.
pub fn evaluate(
    user: Option<&User>,
    beta_status: Option<&BetaStatus>,
    bypass_config: Option<&BypassConfig>,
) -> AuthorizationDecision {
    let Some(user) = user else {
        return AuthorizationDecision::unauthenticated();
    };

    let verified = user.is_discord_verified();
    let beta_expired = beta_status.map(|b| b.expired).unwrap_or(false);

    let mut grants = Vec::with_capacity(4);
    if user.has_active_subscription() {
        grants.push(AccessGrant::Subscription);
    }
    if verified && is_discord_free(bypass_config) {
        grants.push(AccessGrant::DiscordFreeAccess);
    }
    if verified && !beta_expired {
        grants.push(AccessGrant::BetaAccess);
    }
    if is_bypass_tier(bypass_config, user.tier()) {
        grants.push(AccessGrant::BypassTier);
    }

    AuthorizationDecision {
        is_subscribed: matches!(
            user.subscription_status,
            SubscriptionStatus::Active | SubscriptionStatus::Trial
        ),
        is_authorized: !grants.is_empty(),
        can_bypass_payment: can_bypass_payment(bypass_config, user),
        grants,
    }
}
