//! ============================================================================
//! Access Module - Membership access authorization
//! ============================================================================
//! Combines four independently updated signals into one verdict:
//! - **Subscription**: billing status `active`
//! - **Discord**: verified link while free access is on or the beta is open
//! - **Bypass tier**: tier on the configured allow-list
//!
//! ## Usage
//! ```rust,ignore
//! use gate_core::access::evaluate;
//!
//! let decision = evaluate(user.as_ref(), beta.as_ref(), config.as_ref());
//! if decision.is_authorized {
//!     show_badge(decision.badge());
//! }
//! ```
//! ============================================================================

mod bypass;
mod decision;

pub use bypass::{can_bypass_payment, is_bypass_tier, is_discord_free};
pub use decision::evaluate;
