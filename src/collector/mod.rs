//! Collector Core - Continuous Match Collection
//!
//! This module provides the session-scoped collection machinery around the
//! staged-file pipeline:
//!
//! ```text
//! MatchCrawler (external producer)
//!     ↓
//! FileRotator (hot file, rotates into warm)
//!     ↓ rotation hook
//! WarmFileCounter → StateMachine CAS (COLLECTING → REDUCING)
//!     ↓
//! ContinuousCollector reduce: aggregate + archive under WarmLock
//!     ↓
//! AggPusher → remote aggregate store
//! ```

pub mod backoff;
pub mod continuous;
pub mod crawler;
pub mod hooks;
pub mod session;
pub mod state;
pub mod warm_counter;
pub mod warm_lock;

pub use backoff::ExponentialBackoff;
pub use continuous::{CollectorExit, ContinuousCollector, SessionHooks};
pub use crawler::{FetchError, MatchCrawler};
pub use hooks::{KeyProvider, KeyValidator, LogNotifier, Notifier, SeedSource, SessionSummary};
pub use session::SessionState;
pub use state::{InvalidTransition, MachineState, StateMachine};
pub use warm_counter::WarmFileCounter;
pub use warm_lock::{WarmLock, WarmLockMetrics};
