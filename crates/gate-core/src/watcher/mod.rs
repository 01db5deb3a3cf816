//! ============================================================================
//! Watcher Module - Beta transition detection and its side effects
//! ============================================================================
//! - [`TransitionWatcher`]: latched edge detector over beta snapshots
//! - [`Dispatcher`]: host boundary for notices and navigation
//! - [`ScheduledRedirect`]: cancellable deferred redirect
//! ============================================================================

mod dispatch;
mod transition;

pub use dispatch::{Dispatcher, Notice, NoticeLevel, ScheduledRedirect, TracingDispatcher};
pub use transition::{BetaEdge, TransitionWatcher, WatcherState};
