//! Typed session lifecycle events shared across same-origin surfaces.
//!
//! [`SessionChannel`] models the browser's same-origin messaging primitive
//! as a `tokio::sync::broadcast` channel; each surface attaches a
//! [`SessionBroadcaster`] carrying its own tab id. Delivery is best-effort,
//! at-most-once per tab, unordered across tabs; every event is idempotent
//! to apply, so nothing stronger is needed.

use chrono::{DateTime, Utc};
use gatewatch_api::types::User;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 64;

/// A session lifecycle event as broadcast between surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Login { user: User },
    Logout,
    TokenRefresh,
    SessionExpired,
    UserUpdated { user: User },
}

impl SessionEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::TokenRefresh => "token_refresh",
            Self::SessionExpired => "session_expired",
            Self::UserUpdated { .. } => "user_updated",
        }
    }
}

/// Wire envelope: the event plus the sending tab and a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: SessionEvent,
    pub tab_id: Uuid,
    pub sent_at: DateTime<Utc>,
}

/// The shared same-origin transport all surfaces attach to.
///
/// [`SessionChannel::disabled`] is the capability-detection fallback for
/// hosts without the messaging primitive: publishing and subscribing become
/// no-ops instead of errors.
#[derive(Clone)]
pub struct SessionChannel {
    sender: Option<broadcast::Sender<EventEnvelope>>,
}

impl SessionChannel {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Some(sender),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Attach a surface, giving it a fresh tab identity.
    #[must_use]
    pub fn attach(&self) -> SessionBroadcaster {
        SessionBroadcaster {
            tab_id: Uuid::new_v4(),
            sender: self.sender.clone(),
        }
    }
}

impl Default for SessionChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Per-surface handle for publishing and subscribing to session events.
#[derive(Clone)]
pub struct SessionBroadcaster {
    tab_id: Uuid,
    sender: Option<broadcast::Sender<EventEnvelope>>,
}

impl SessionBroadcaster {
    /// Broadcaster that never delivers anything; used by isolated tests
    /// and by surfaces detached from any channel.
    #[must_use]
    pub fn detached() -> Self {
        SessionChannel::disabled().attach()
    }

    #[must_use]
    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Publish to every other surface. Best-effort: a channel with no
    /// receivers (or no channel at all) drops the event silently.
    pub fn publish(&self, event: SessionEvent) {
        if let Some(sender) = self.sender.as_ref() {
            let _ = sender.send(EventEnvelope {
                event,
                tab_id: self.tab_id,
                sent_at: Utc::now(),
            });
        }
    }

    /// Subscribe to events from other surfaces; the subscription filters
    /// out this surface's own envelopes, matching the browser primitive
    /// which never delivers a message back to its sender.
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            tab_id: self.tab_id,
            receiver: self.sender.as_ref().map(|sender| sender.subscribe()),
        }
    }
}

pub struct SessionSubscription {
    tab_id: Uuid,
    receiver: Option<broadcast::Receiver<EventEnvelope>>,
}

impl SessionSubscription {
    /// Next event from another surface, or `None` once the channel is
    /// closed (or was never available). Lagged gaps are skipped: missing
    /// an idempotent event is recovered by the next one.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(envelope) if envelope.tab_id == self.tab_id => continue,
                Ok(envelope) => return Some(envelope.event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
