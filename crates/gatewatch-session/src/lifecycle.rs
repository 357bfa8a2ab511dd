//! Access-token lifecycle: expiry tracking, proactive refresh scheduling,
//! and the single-flight refresh gate.
//!
//! The manager exclusively owns the mutable in-memory token pair. Writes
//! funnel through [`SecureTokenStore`]; siblings in other surfaces observe
//! changes via [`SessionEvent`] broadcasts plus the shared store.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use gatewatch_api::client::AuthApi;
use gatewatch_api::error::ApiError;
use gatewatch_api::types::AuthTokens;
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::events::{SessionBroadcaster, SessionEvent};
use crate::store::SecureTokenStore;

/// How long before expiry a token counts as expiring and gets refreshed.
pub const REFRESH_THRESHOLD_SECS: i64 = 30;

/// Lifecycle state of the in-memory token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    Unauthenticated,
    Valid,
    Expiring,
    Refreshing,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    /// No refresh token anywhere; the caller must re-authenticate.
    #[error("refresh_token_missing")]
    NoRefreshToken,
    #[error("refresh_failed:{0}")]
    Api(#[from] ApiError),
}

impl RefreshError {
    /// Whether the refresh failed before the gateway could judge the
    /// token. The session survives these; only a rejection clears it.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Api(error) if error.is_network())
    }
}

struct TokenSlot {
    tokens: Option<AuthTokens>,
    phase: TokenPhase,
    /// Scheduling epoch: bumped on every token change so a stale timer
    /// task can detect it was superseded and stand down.
    epoch: u64,
    timer: Option<AbortHandle>,
}

struct LifecycleInner {
    api: Arc<dyn AuthApi>,
    store: SecureTokenStore,
    broadcaster: SessionBroadcaster,
    slot: Mutex<TokenSlot>,
    /// Single-flight gate: at most one refresh network call in flight.
    refresh_gate: tokio::sync::Mutex<()>,
}

/// Owns the in-memory token pair and its refresh schedule.
///
/// Explicitly constructed and dependency-injected; tests instantiate
/// isolated managers instead of sharing process-wide state.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<LifecycleInner>,
}

impl TokenLifecycleManager {
    #[must_use]
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: SecureTokenStore,
        broadcaster: SessionBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                api,
                store,
                broadcaster,
                slot: Mutex::new(TokenSlot {
                    tokens: None,
                    phase: TokenPhase::Unauthenticated,
                    epoch: 0,
                    timer: None,
                }),
                refresh_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, TokenSlot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[must_use]
    pub fn phase(&self) -> TokenPhase {
        self.lock_slot().phase
    }

    /// Current access token without any freshness guarantee.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.lock_slot()
            .tokens
            .as_ref()
            .map(|tokens| tokens.access_token.clone())
    }

    #[must_use]
    pub fn refresh_token_value(&self) -> Option<String> {
        self.lock_slot()
            .tokens
            .as_ref()
            .map(|tokens| tokens.refresh_token.clone())
    }

    fn fresh_tokens(&self) -> Option<AuthTokens> {
        let slot = self.lock_slot();
        let tokens = slot.tokens.as_ref()?;
        if tokens.is_expired(Duration::seconds(REFRESH_THRESHOLD_SECS)) {
            None
        } else {
            Some(tokens.clone())
        }
    }

    /// Install a fresh pair: persist through the store, cancel any prior
    /// timer, and arm a new one at `expires_at − threshold`.
    pub fn set_tokens(&self, tokens: AuthTokens) {
        self.inner.store.set_tokens(&tokens);
        let epoch = {
            let mut slot = self.lock_slot();
            slot.tokens = Some(tokens.clone());
            slot.phase = TokenPhase::Valid;
            slot.epoch += 1;
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            slot.epoch
        };
        self.arm_timer(epoch, tokens.expires_at);
    }

    /// Load the persisted pair into memory without server verification.
    /// Returns false when the store holds no complete pair.
    pub fn hydrate(&self) -> bool {
        match self.inner.store.tokens() {
            Some(tokens) => {
                self.set_tokens(tokens);
                true
            }
            None => false,
        }
    }

    /// Drop tokens everywhere and cancel the scheduled refresh.
    pub fn clear(&self) {
        {
            let mut slot = self.lock_slot();
            slot.tokens = None;
            slot.phase = TokenPhase::Unauthenticated;
            slot.epoch += 1;
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
        }
        self.inner.store.clear_tokens();
    }

    /// Surface teardown: cancel the scheduled refresh but leave tokens in
    /// memory and storage. An in-flight refresh is allowed to finish.
    pub fn destroy(&self) {
        let mut slot = self.lock_slot();
        slot.epoch += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }

    /// The one token accessor callers should use: returns the cached
    /// token while it is comfortably fresh, otherwise refreshes (single
    /// flight) and returns the new token, or `None` when refresh fails.
    pub async fn get_valid_access_token(&self) -> Option<String> {
        if let Some(tokens) = self.fresh_tokens() {
            return Some(tokens.access_token);
        }
        {
            let mut slot = self.lock_slot();
            if slot.phase == TokenPhase::Valid {
                slot.phase = TokenPhase::Expiring;
            }
        }
        match self.refresh_inner(false).await {
            Ok(tokens) => Some(tokens.access_token),
            Err(_) => None,
        }
    }

    /// Force a refresh: always issues the transport call, behind the
    /// single-flight gate. A rejected refresh token clears the session
    /// and broadcasts expiry; a connectivity failure leaves the tokens
    /// intact so the next attempt can succeed.
    pub async fn refresh(&self) -> Result<AuthTokens, RefreshError> {
        self.refresh_inner(true).await
    }

    async fn refresh_inner(&self, force: bool) -> Result<AuthTokens, RefreshError> {
        let _gate = self.inner.refresh_gate.lock().await;

        // Waiters that queued behind the winning refresh reuse its tokens
        // instead of issuing a second network call. A forced refresh must
        // reach the transport even when the cached pair is still fresh.
        if !force {
            if let Some(tokens) = self.fresh_tokens() {
                return Ok(tokens);
            }
        }

        let refresh_token = self
            .refresh_token_value()
            .or_else(|| self.inner.store.refresh_token())
            .ok_or(RefreshError::NoRefreshToken)?;

        {
            let mut slot = self.lock_slot();
            slot.phase = TokenPhase::Refreshing;
        }
        debug!("refreshing access token");

        match self.inner.api.refresh_access_token(&refresh_token).await {
            Ok(tokens) => {
                self.set_tokens(tokens.clone());
                self.inner.broadcaster.publish(SessionEvent::TokenRefresh);
                Ok(tokens)
            }
            Err(error) if error.is_network() => {
                warn!(error = %error, "token refresh unreachable; keeping session for retry");
                let mut slot = self.lock_slot();
                slot.phase = match slot.tokens.as_ref() {
                    Some(tokens)
                        if !tokens.is_expired(Duration::seconds(REFRESH_THRESHOLD_SECS)) =>
                    {
                        TokenPhase::Valid
                    }
                    Some(_) => TokenPhase::Expiring,
                    None => TokenPhase::Unauthenticated,
                };
                Err(RefreshError::Api(error))
            }
            Err(error) => {
                warn!(error = %error, "refresh token rejected; clearing session");
                self.clear();
                self.inner.broadcaster.publish(SessionEvent::SessionExpired);
                Err(RefreshError::Api(error))
            }
        }
    }

    fn current_epoch(&self) -> u64 {
        self.lock_slot().epoch
    }

    fn arm_timer(&self, epoch: u64, expires_at: DateTime<Utc>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime available; proactive refresh not scheduled");
            return;
        };

        let fire_at = expires_at - Duration::seconds(REFRESH_THRESHOLD_SECS);
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);

        let weak = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = TokenLifecycleManager { inner };
            // Latest scheduling epoch wins: a superseded timer stands down.
            if manager.current_epoch() != epoch {
                return;
            }
            {
                let mut slot = manager.lock_slot();
                if slot.phase == TokenPhase::Valid {
                    slot.phase = TokenPhase::Expiring;
                }
            }
            let _ = manager.refresh().await;
        });

        let mut slot = self.lock_slot();
        if slot.epoch == epoch {
            slot.timer = Some(task.abort_handle());
        } else {
            // Tokens changed between install and arm; this timer is stale.
            task.abort();
        }
    }
}
