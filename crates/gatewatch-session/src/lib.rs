#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

//! Client-side session core for the Gatewatch dashboard.
//!
//! Establishes and maintains "who is logged in, with what credentials",
//! consistently across client surfaces (browser tabs), page reloads, and
//! token expiry:
//!
//! - [`SecureTokenStore`] — durable token/user persistence behind trait
//!   seams (key-value backend + cookie sink), safe to use where no
//!   storage capability exists.
//! - [`TokenLifecycleManager`] — owns the in-memory token pair, the
//!   proactive refresh timer, and the single-flight refresh.
//! - [`SessionBroadcaster`] — typed lifecycle events over a shared
//!   same-origin channel, idempotent to apply.
//! - [`SessionManager`] — the façade the rest of the client talks to.

pub mod events;
pub mod lifecycle;
pub mod manager;
pub mod store;

pub use events::{EventEnvelope, SessionBroadcaster, SessionChannel, SessionEvent};
pub use lifecycle::{RefreshError, TokenLifecycleManager, TokenPhase, REFRESH_THRESHOLD_SECS};
pub use manager::{SessionManager, SessionState, SessionStatus};
pub use store::{
    CookieRecord, CookieSink, FileStorage, MemoryCookieSink, MemoryStorage, SecureTokenStore,
    StorageBackend, StorageError,
};
