//! ============================================================================
//! Gate Types - Membership, beta window and access policy snapshots
//! ============================================================================
//! Wire types for the identity, beta-status and access-config endpoints,
//! plus the derived authorization verdict.
//! ============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// User
// ============================================================================

/// Billing state of a user's subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    #[default]
    Inactive,
    Trial,
    Cancelled,
}

impl SubscriptionStatus {
    /// Parse a billing status string. Unknown values fail closed to `Inactive`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "trial" | "trialing" => SubscriptionStatus::Trial,
            "cancelled" | "canceled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Inactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl<'de> Deserialize<'de> for SubscriptionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Self::parse).unwrap_or_default())
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and billing record for the logged-in user.
///
/// Always replaced wholesale by the session store; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    /// `None` when the backend has not reported a verification result
    #[serde(default)]
    pub discord_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_username: Option<String>,
    /// Free-form tier label, e.g. "none", "recruit", "operator", "shadow"
    #[serde(default)]
    pub subscription_tier: Option<String>,
}

impl User {
    pub fn new(subscription_status: SubscriptionStatus) -> Self {
        Self {
            subscription_status,
            discord_verified: None,
            discord_id: None,
            discord_username: None,
            subscription_tier: None,
        }
    }

    /// Mark the user as Discord-linked with the given verification result
    pub fn with_discord(mut self, id: &str, username: &str, verified: bool) -> Self {
        self.discord_id = Some(id.to_string());
        self.discord_username = Some(username.to_string());
        self.discord_verified = Some(verified);
        self
    }

    pub fn with_discord_verified(mut self, verified: bool) -> Self {
        self.discord_verified = Some(verified);
        self
    }

    pub fn with_tier(mut self, tier: &str) -> Self {
        self.subscription_tier = Some(tier.to_string());
        self
    }

    /// Unknown verification counts as unverified
    pub fn is_discord_verified(&self) -> bool {
        self.discord_verified.unwrap_or(false)
    }

    pub fn tier(&self) -> Option<&str> {
        self.subscription_tier.as_deref()
    }

    pub fn has_active_subscription(&self) -> bool {
        self.subscription_status == SubscriptionStatus::Active
    }
}

// ============================================================================
// Beta window
// ============================================================================

/// Global promotional window, independent of the user.
///
/// `expired` is authoritative (server time); `ends_at` is for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetaStatus {
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub expired: bool,
    #[serde(default)]
    pub message: String,
}

impl BetaStatus {
    pub fn new(expired: bool) -> Self {
        Self {
            ends_at: None,
            expired,
            message: String::new(),
        }
    }

    pub fn ending_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = Some(ends_at);
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    /// Countdown until `ends_at`, clamped at zero. `None` when no end is known.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.ends_at
            .map(|ends_at| (ends_at - now).max(Duration::zero()))
    }
}

// ============================================================================
// Bypass policy
// ============================================================================

/// Discord free-access switches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordAccessConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub beta_active: bool,
}

/// Payment bypass policy, read-only to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BypassConfig {
    #[serde(default)]
    pub discord: DiscordAccessConfig,
    #[serde(default)]
    pub bypass_tiers: BTreeSet<String>,
}

impl BypassConfig {
    pub fn new<I, S>(discord_enabled: bool, beta_active: bool, bypass_tiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            discord: DiscordAccessConfig {
                enabled: discord_enabled,
                beta_active,
            },
            bypass_tiers: bypass_tiers.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Authorization verdict
// ============================================================================

/// The clause that granted access. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessGrant {
    /// Paid subscription is active
    Subscription,
    /// Discord-verified while Discord free access is switched on
    DiscordFreeAccess,
    /// Discord-verified while the beta window is open
    BetaAccess,
    /// Tier is on the bypass allow-list
    BypassTier,
}

impl AccessGrant {
    /// Badge label for the UI
    pub fn badge(&self) -> &'static str {
        match self {
            AccessGrant::Subscription => "Elite Member",
            AccessGrant::DiscordFreeAccess => "Discord Access",
            AccessGrant::BetaAccess => "Beta Access",
            AccessGrant::BypassTier => "Comped Access",
        }
    }
}

/// Derived verdict. Never persisted; recomputed from the current snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    /// Active or trialing. Weaker than `is_authorized`; not an access gate.
    pub is_subscribed: bool,
    pub is_authorized: bool,
    pub can_bypass_payment: bool,
    /// Every clause that fired, in declaration order of [`AccessGrant`]
    pub grants: Vec<AccessGrant>,
}

impl AuthorizationDecision {
    /// Verdict for a visitor without a session
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    pub fn primary_grant(&self) -> Option<AccessGrant> {
        self.grants.first().copied()
    }

    pub fn badge(&self) -> Option<&'static str> {
        self.primary_grant().map(|g| g.badge())
    }

    pub fn has_grant(&self, grant: AccessGrant) -> bool {
        self.grants.contains(&grant)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised at the membership backend boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Discord verification failed: {0}")]
    DiscordRecheck(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_user_decodes_camel_case() {
        let user: User = serde_json::from_value(serde_json::json!({
            "subscriptionStatus": "trial",
            "discordVerified": true,
            "discordId": "1234",
            "discordUsername": "ghost",
            "subscriptionTier": "operator"
        }))
        .unwrap();

        assert_eq!(user.subscription_status, SubscriptionStatus::Trial);
        assert!(user.is_discord_verified());
        assert_eq!(user.discord_username.as_deref(), Some("ghost"));
        assert_eq!(user.tier(), Some("operator"));
    }

    #[test]
    fn test_user_missing_fields_fail_closed() {
        let user: User = serde_json::from_value(serde_json::json!({
            "subscriptionStatus": "past_due",
            "subscriptionTier": null
        }))
        .unwrap();

        assert_eq!(user.subscription_status, SubscriptionStatus::Inactive);
        assert_eq!(user.discord_verified, None);
        assert!(!user.is_discord_verified());
        assert_eq!(user.tier(), None);
    }

    #[test]
    fn test_status_parse_aliases() {
        assert_eq!(SubscriptionStatus::parse("ACTIVE"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::parse("trialing"), SubscriptionStatus::Trial);
        assert_eq!(SubscriptionStatus::parse("canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::parse(""), SubscriptionStatus::Inactive);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SubscriptionStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn test_beta_status_decode() {
        let beta: BetaStatus = serde_json::from_value(serde_json::json!({
            "endsAt": "2026-11-01T00:00:00Z",
            "expired": false,
            "message": "Beta ends soon"
        }))
        .unwrap();

        assert!(!beta.expired);
        assert_eq!(
            beta.ends_at,
            Some(Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap())
        );

        let open: BetaStatus = serde_json::from_value(serde_json::json!({
            "endsAt": null,
            "expired": true
        }))
        .unwrap();
        assert!(open.expired);
        assert!(open.message.is_empty());
    }

    #[test]
    fn test_time_remaining() {
        let ends_at = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();
        let beta = BetaStatus::new(false).ending_at(ends_at);

        let before = ends_at - Duration::hours(5);
        assert_eq!(beta.time_remaining(before), Some(Duration::hours(5)));

        let after = ends_at + Duration::hours(1);
        assert_eq!(beta.time_remaining(after), Some(Duration::zero()));

        assert_eq!(BetaStatus::new(false).time_remaining(before), None);
    }

    #[test]
    fn test_bypass_config_decode() {
        let config: BypassConfig = serde_json::from_value(serde_json::json!({
            "discord": { "enabled": true, "betaActive": false },
            "bypassTiers": ["shadow", "operator"]
        }))
        .unwrap();

        assert!(config.discord.enabled);
        assert!(!config.discord.beta_active);
        assert!(config.bypass_tiers.contains("shadow"));
        assert_eq!(config, BypassConfig::new(true, false, ["operator", "shadow"]));
    }

    #[test]
    fn test_decision_badges() {
        let decision = AuthorizationDecision {
            is_subscribed: true,
            is_authorized: true,
            can_bypass_payment: false,
            grants: vec![AccessGrant::Subscription, AccessGrant::BetaAccess],
        };

        assert_eq!(decision.primary_grant(), Some(AccessGrant::Subscription));
        assert_eq!(decision.badge(), Some("Elite Member"));
        assert!(decision.has_grant(AccessGrant::BetaAccess));
        assert_eq!(AuthorizationDecision::unauthenticated().badge(), None);
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let value = serde_json::to_value(AuthorizationDecision::unauthenticated()).unwrap();
        assert_eq!(value["isAuthorized"], false);
        assert_eq!(value["canBypassPayment"], false);
    }
}
