//! ============================================================================
//! Bypass Policy - Payment exemptions from access configuration
//! ============================================================================
//! Evaluates the externally supplied access config. A missing config never
//! grants anything.
//! ============================================================================

use crate::types::{BypassConfig, User};

impl BypassConfig {
    /// Discord verification alone suffices while both switches are on
    pub fn is_discord_free(&self) -> bool {
        self.discord.enabled && self.discord.beta_active
    }

    /// Whether `tier` is on the allow-list. Exact, case-sensitive match.
    pub fn is_bypass_tier(&self, tier: &str) -> bool {
        self.bypass_tiers.contains(tier)
    }
}

pub fn is_discord_free(config: Option<&BypassConfig>) -> bool {
    config.map(BypassConfig::is_discord_free).unwrap_or(false)
}

pub fn is_bypass_tier(config: Option<&BypassConfig>, tier: Option<&str>) -> bool {
    match (config, tier) {
        (Some(config), Some(tier)) => config.is_bypass_tier(tier),
        _ => false,
    }
}

/// Payment is not required for this user under the current policy.
///
/// Policy-only: the beta window is not consulted here, so a missing config
/// always yields `false`.
pub fn can_bypass_payment(config: Option<&BypassConfig>, user: &User) -> bool {
    is_bypass_tier(config, user.tier())
        || (user.is_discord_verified() && is_discord_free(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionStatus;

    fn config() -> BypassConfig {
        BypassConfig::new(true, true, ["operator", "shadow"])
    }

    #[test]
    fn test_discord_free_requires_both_switches() {
        assert!(is_discord_free(Some(&BypassConfig::new(true, true, Vec::<String>::new()))));
        assert!(!is_discord_free(Some(&BypassConfig::new(true, false, Vec::<String>::new()))));
        assert!(!is_discord_free(Some(&BypassConfig::new(false, true, Vec::<String>::new()))));
        assert!(!is_discord_free(None));
    }

    #[test]
    fn test_bypass_tier_membership() {
        let config = config();
        for tier in ["operator", "shadow"] {
            assert!(is_bypass_tier(Some(&config), Some(tier)), "{} should bypass", tier);
        }
        for tier in ["none", "recruit", "Shadow", ""] {
            assert!(!is_bypass_tier(Some(&config), Some(tier)), "{} should not bypass", tier);
        }
    }

    #[test]
    fn test_bypass_tier_missing_inputs() {
        assert!(!is_bypass_tier(Some(&config()), None));
        assert!(!is_bypass_tier(None, Some("shadow")));
        assert!(!is_bypass_tier(None, None));
    }

    #[test]
    fn test_can_bypass_payment() {
        let config = config();
        let comped = User::new(SubscriptionStatus::Inactive).with_tier("shadow");
        let verified = User::new(SubscriptionStatus::Inactive).with_discord_verified(true);
        let plain = User::new(SubscriptionStatus::Active).with_tier("recruit");

        assert!(can_bypass_payment(Some(&config), &comped));
        assert!(can_bypass_payment(Some(&config), &verified));
        assert!(!can_bypass_payment(Some(&config), &plain));

        let closed = BypassConfig::new(true, false, ["shadow"]);
        assert!(!can_bypass_payment(Some(&closed), &verified));
        assert!(!can_bypass_payment(None, &comped));
        assert!(!can_bypass_payment(None, &verified));
    }
}
