//! ============================================================================
//! Session Module - Fetching and holding the access signals
//! ============================================================================
//! The backend is the only path to the network; the store is the only place
//! snapshots live.
//!
//! ## Usage
//! ```rust,ignore
//! use gate_core::session::{HttpBackend, SessionStore};
//!
//! let backend = Arc::new(HttpBackend::new(&config)?);
//! let store = SessionStore::new(backend, config.bypass_config_ttl());
//! store.fetch_user().await;
//! ```
//! ============================================================================

mod backend;
mod store;

pub use backend::{HttpBackend, MembershipBackend};
pub use store::{Resource, SessionSnapshot, SessionStore};
