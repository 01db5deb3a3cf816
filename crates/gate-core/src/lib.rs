//! ============================================================================
//! GATE-CORE: Membership access authorization
//! ============================================================================
//! Decides whether the current user may see gated content, from four
//! independently updated signals:
//! - Subscription billing status
//! - Discord identity verification
//! - The global, time-boxed beta window
//! - A configured allow-list of tiers that bypass payment
//!
//! It also watches the beta window for the moment it closes mid-session and
//! fires exactly one notice (and, where needed, one deferred redirect).
//! ============================================================================

pub mod access;
pub mod config;
pub mod engine;
pub mod session;
pub mod types;
pub mod watcher;

// Re-export main types for convenience
pub use access::evaluate;
pub use config::GateConfig;
pub use engine::{AccessEngine, BetaPoller};
pub use session::{HttpBackend, MembershipBackend, Resource, SessionSnapshot, SessionStore};
pub use types::*;
pub use watcher::{
    BetaEdge, Dispatcher, Notice, NoticeLevel, ScheduledRedirect, TracingDispatcher,
    TransitionWatcher, WatcherState,
};
