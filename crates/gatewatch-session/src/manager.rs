//! The session façade the rest of the client talks to.
//!
//! Combines the token lifecycle manager, the secure store, and the
//! cross-surface broadcaster behind login/signup/logout/refresh/update
//! operations and an observable [`SessionState`] snapshot.

use std::sync::{Arc, RwLock};

use chrono::Duration;
use gatewatch_api::client::AuthApi;
use gatewatch_api::error::ApiError;
use gatewatch_api::types::{
    AuthResponse, ChangePasswordRequest, LoginRequest, SignupRequest, UpdateProfileRequest, User,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{SessionBroadcaster, SessionEvent};
use crate::lifecycle::{RefreshError, TokenLifecycleManager, REFRESH_THRESHOLD_SECS};
use crate::store::SecureTokenStore;

pub const SIGN_IN_PATH: &str = "/signin";
const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// First load; nothing is known yet. A surface shows its skeleton now
    /// and only now.
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Point-in-time view of the session, cheap to clone out to renderers.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub user: Option<User>,
    pub status: SessionStatus,
    pub last_error: Option<String>,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated && self.user.is_some()
    }
}

struct ManagerInner {
    api: Arc<dyn AuthApi>,
    store: SecureTokenStore,
    broadcaster: SessionBroadcaster,
    lifecycle: TokenLifecycleManager,
    state: RwLock<SessionState>,
}

/// Explicitly constructed session service; one per client surface.
///
/// Clones share the same underlying session. Collaborators are injected
/// so tests run against isolated instances and mock transports.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: SecureTokenStore,
        broadcaster: SessionBroadcaster,
    ) -> Self {
        let lifecycle =
            TokenLifecycleManager::new(api.clone(), store.clone(), broadcaster.clone());
        Self {
            inner: Arc::new(ManagerInner {
                api,
                store,
                broadcaster,
                lifecycle,
                state: RwLock::new(SessionState {
                    user: None,
                    status: SessionStatus::Initializing,
                    last_error: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    #[must_use]
    pub fn lifecycle(&self) -> &TokenLifecycleManager {
        &self.inner.lifecycle
    }

    /// See [`TokenLifecycleManager::get_valid_access_token`].
    pub async fn get_valid_access_token(&self) -> Option<String> {
        self.inner.lifecycle.get_valid_access_token().await
    }

    /// Authenticate against the gateway. On success the session is fully
    /// installed and `Login` is broadcast; on failure local state is left
    /// untouched apart from `last_error`, and the original error returns
    /// to the caller so a form can show it inline.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ApiError> {
        match self.inner.api.login(request).await {
            Ok(response) => {
                self.install_session(&response);
                self.inner.broadcaster.publish(SessionEvent::Login {
                    user: response.user.clone(),
                });
                Ok(response)
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    /// Same contract as [`login`](Self::login), against registration.
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, ApiError> {
        match self.inner.api.signup(request).await {
            Ok(response) => {
                self.install_session(&response);
                self.inner.broadcaster.publish(SessionEvent::Login {
                    user: response.user.clone(),
                });
                Ok(response)
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    /// End the session. The server call is best-effort; local and durable
    /// state is cleared unconditionally, so the client always lands in the
    /// unauthenticated state. Returns the sign-in path with the caller's
    /// location preserved for post-login return.
    pub async fn logout(&self, current_path: &str) -> String {
        if let Some(token) = self.inner.lifecycle.access_token() {
            if let Err(error) = self.inner.api.logout(&token).await {
                warn!(error = %error, "server logout failed; clearing local session anyway");
            }
        }
        self.clear_local_session(None);
        self.inner.broadcaster.publish(SessionEvent::Logout);
        sign_in_redirect(current_path)
    }

    /// Force a token refresh. A rejected refresh token lands on the
    /// session-expired path; a connectivity failure keeps the session and
    /// surfaces a retryable error.
    pub async fn refresh_token(&self) -> Result<(), RefreshError> {
        match self.inner.lifecycle.refresh().await {
            Ok(_) => Ok(()),
            Err(error) => {
                if error.is_network() {
                    if let RefreshError::Api(api_error) = &error {
                        let message = api_error.user_message();
                        self.write_state(|state| state.last_error = Some(message.clone()));
                    }
                } else {
                    self.mark_unauthenticated(Some(SESSION_EXPIRED_MESSAGE.to_string()));
                }
                Err(error)
            }
        }
    }

    /// Update the profile and replace the cached user wholesale.
    pub async fn update_user(&self, request: UpdateProfileRequest) -> Result<User, ApiError> {
        let token = self
            .get_valid_access_token()
            .await
            .ok_or(ApiError::NotAuthenticated)?;
        match self.inner.api.update_profile(&token, request).await {
            Ok(user) => {
                self.inner.store.set_user(&user);
                self.write_state(|state| {
                    state.user = Some(user.clone());
                    state.last_error = None;
                });
                self.inner
                    .broadcaster
                    .publish(SessionEvent::UserUpdated { user: user.clone() });
                Ok(user)
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    pub async fn change_password(&self, request: ChangePasswordRequest) -> Result<(), ApiError> {
        let token = self
            .get_valid_access_token()
            .await
            .ok_or(ApiError::NotAuthenticated)?;
        match self.inner.api.change_password(&token, request).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    /// Mount-time initialization.
    ///
    /// A server-prevalidated user skips redundant client verification and
    /// only hydrates the lifecycle manager from durable storage. Otherwise
    /// a fresh persisted pair is verified against the gateway, and an
    /// expired pair gets one refresh attempt before giving up.
    pub async fn initialize(&self, server_validated_user: Option<User>) {
        if let Some(user) = server_validated_user {
            self.inner.lifecycle.hydrate();
            self.inner.store.set_user(&user);
            self.write_state(|state| {
                state.user = Some(user.clone());
                state.status = SessionStatus::Authenticated;
                state.last_error = None;
            });
            return;
        }

        let Some(tokens) = self.inner.store.tokens() else {
            self.mark_unauthenticated(None);
            return;
        };

        if !tokens.is_expired(Duration::seconds(REFRESH_THRESHOLD_SECS)) {
            self.inner.lifecycle.hydrate();
            match self.inner.api.current_user(&tokens.access_token).await {
                Ok(user) => {
                    self.inner.store.set_user(&user);
                    self.write_state(|state| {
                        state.user = Some(user.clone());
                        state.status = SessionStatus::Authenticated;
                        state.last_error = None;
                    });
                }
                Err(error) => {
                    warn!(error = %error, "persisted session failed verification");
                    self.clear_local_session(None);
                }
            }
            return;
        }

        if !tokens.refresh_token.is_empty() {
            self.inner.lifecycle.hydrate();
            match self.inner.lifecycle.refresh().await {
                Ok(new_tokens) => {
                    let user = match self.inner.store.user() {
                        Some(user) => Some(user),
                        None => self
                            .inner
                            .api
                            .current_user(&new_tokens.access_token)
                            .await
                            .ok(),
                    };
                    match user {
                        Some(user) => {
                            self.inner.store.set_user(&user);
                            self.write_state(|state| {
                                state.user = Some(user.clone());
                                state.status = SessionStatus::Authenticated;
                                state.last_error = None;
                            });
                        }
                        None => self.clear_local_session(None),
                    }
                }
                Err(error) => {
                    // A rejected token was already cleared and broadcast by
                    // the lifecycle; a connectivity failure keeps the pair
                    // persisted so a later attempt can recover.
                    let message = (!error.is_network())
                        .then(|| SESSION_EXPIRED_MESSAGE.to_string());
                    self.mark_unauthenticated(message);
                }
            }
            return;
        }

        self.clear_local_session(None);
    }

    /// Idempotent reducer for events arriving from sibling surfaces.
    /// Never issues network calls and never re-broadcasts.
    pub fn apply_remote_event(&self, event: SessionEvent) {
        debug!(kind = event.kind(), "applying remote session event");
        match event {
            SessionEvent::Logout | SessionEvent::SessionExpired => {
                self.inner.lifecycle.clear();
                self.inner.store.clear_user();
                self.mark_unauthenticated(None);
            }
            SessionEvent::Login { user } | SessionEvent::UserUpdated { user } => {
                // Tokens were written to shared storage by the sender.
                self.inner.lifecycle.hydrate();
                self.write_state(|state| {
                    state.user = Some(user.clone());
                    state.status = SessionStatus::Authenticated;
                    state.last_error = None;
                });
            }
            SessionEvent::TokenRefresh => {
                self.inner.lifecycle.hydrate();
            }
        }
    }

    /// Drain the cross-surface subscription into the reducer. Returns
    /// `None` outside an async runtime.
    pub fn spawn_event_loop(&self) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let mut subscription = self.inner.broadcaster.subscribe();
        let manager = self.clone();
        Some(runtime.spawn(async move {
            while let Some(event) = subscription.recv().await {
                manager.apply_remote_event(event);
            }
        }))
    }

    /// Surface teardown: stop the scheduled refresh; storage stays.
    pub fn destroy(&self) {
        self.inner.lifecycle.destroy();
    }

    fn install_session(&self, response: &AuthResponse) {
        self.inner.lifecycle.set_tokens(response.tokens.clone());
        self.inner.store.set_user(&response.user);
        self.write_state(|state| {
            state.user = Some(response.user.clone());
            state.status = SessionStatus::Authenticated;
            state.last_error = None;
        });
    }

    fn clear_local_session(&self, message: Option<String>) {
        self.inner.lifecycle.clear();
        self.inner.store.clear_user();
        self.mark_unauthenticated(message);
    }

    fn mark_unauthenticated(&self, message: Option<String>) {
        self.write_state(|state| {
            state.user = None;
            state.status = SessionStatus::Unauthenticated;
            state.last_error = message.clone();
        });
    }

    fn record_error(&self, error: &ApiError) {
        let message = error.user_message();
        self.write_state(|state| state.last_error = Some(message.clone()));
    }

    fn write_state(&self, mutate: impl Fn(&mut SessionState)) {
        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        mutate(&mut state);
    }
}

/// Sign-in path with the caller's location preserved for post-login return.
#[must_use]
pub fn sign_in_redirect(current_path: &str) -> String {
    let trimmed = current_path.trim();
    if trimmed.is_empty() || trimmed == "/" || trimmed.starts_with(SIGN_IN_PATH) {
        return SIGN_IN_PATH.to_string();
    }
    format!("{SIGN_IN_PATH}?return_to={}", encode_query_value(trimmed))
}

fn encode_query_value(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{byte:02X}"));
            }
        }
    }
    encoded
}
