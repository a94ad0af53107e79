//! Credential state and the scheduled token refresh.
//!
//! A [`TokenManager`] owns the user key, the current access/refresh token pair and
//! at most one pending refresh timer. Storing a refresh token schedules a one-shot
//! task that fires [`DEFAULT_REFRESH_LEAD`] before the access token expires and
//! swaps in a fresh pair; storing another refresh token aborts the pending task
//! and replaces it.
//!
//! Readers and the refresh task are not synchronized beyond the credential lock:
//! a request that read the access token just before a refresh completed goes out
//! with the previous token.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use super::{Grant, TokenGrant, TokenResponse};
use crate::{config::ClientConfig, error::Error};

pub const DEFAULT_REFRESH_LEAD: Duration = Duration::from_secs(15);

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated,
    /// The last refresh failed; the stale access token is still held.
    Expiring,
}

/// What happens after a refresh fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshFailurePolicy {
    /// Keep the stale token and stop refreshing.
    #[default]
    Stop,
    /// Try again after `delay`, giving up once `max_attempts` consecutive
    /// refreshes have failed.
    Retry { delay: Duration, max_attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    Refreshed { expires_in: u64 },
    RefreshFailed {
        error: String,
        /// The token endpoint rejected the refresh token, as opposed to a
        /// transport or server failure.
        is_auth: bool,
        retry_in: Option<Duration>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Default)]
struct Credentials {
    user_key: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    state: SessionState,
    failed_refreshes: u32,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Schedule {
    generation: u64,
    pending: Option<Timer>,
}

pub struct TokenManager {
    provider: Arc<dyn TokenGrant>,
    refresh_lead: Duration,
    failure_policy: RefreshFailurePolicy,
    credentials: Mutex<Credentials>,
    schedule: Mutex<Schedule>,
    events: broadcast::Sender<AuthEvent>,
    this: Weak<TokenManager>,
}

impl TokenManager {
    pub fn new(provider: Arc<dyn TokenGrant>, config: &ClientConfig) -> Arc<Self> {
        let credentials = Credentials {
            user_key: Some(config.user_key.clone()).filter(|key| !key.is_empty()),
            state: match config.access_token {
                Some(_) => SessionState::Authenticated,
                None => SessionState::Unauthenticated,
            },
            access_token: config.access_token.clone(),
            ..Credentials::default()
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new_cyclic(|this| Self {
            provider,
            refresh_lead: config.refresh_lead,
            failure_policy: config.refresh_failure,
            credentials: Mutex::new(credentials),
            schedule: Mutex::new(Schedule::default()),
            events,
            this: this.clone(),
        })
    }

    fn credentials(&self) -> MutexGuard<'_, Credentials> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_user_key(&self, user_key: impl Into<String>) {
        self.credentials().user_key = Some(user_key.into());
    }

    pub fn user_key(&self) -> Option<String> {
        self.credentials().user_key.clone()
    }

    pub fn set_access_token(&self, access_token: impl Into<String>) {
        let mut credentials = self.credentials();
        credentials.access_token = Some(access_token.into());
        if credentials.state == SessionState::Unauthenticated {
            credentials.state = SessionState::Authenticated;
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.credentials().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.credentials().refresh_token.clone()
    }

    /// Lifetime in seconds of the current access token, as reported by the server.
    pub fn expires_in(&self) -> Option<u64> {
        self.credentials().expires_in
    }

    pub fn state(&self) -> SessionState {
        self.credentials().state
    }

    /// Store `refresh_token` and schedule a refresh `expires_in` seconds minus the
    /// refresh lead from now, replacing any pending one.
    ///
    /// Scheduling needs a Tokio runtime; outside of one the token is stored but no
    /// refresh is scheduled.
    pub fn set_refresh_token(&self, refresh_token: impl Into<String>, expires_in: u64) {
        {
            let mut credentials = self.credentials();
            credentials.refresh_token = Some(refresh_token.into());
            credentials.expires_in = Some(expires_in);
        }
        let delay = Duration::from_secs(expires_in).saturating_sub(self.refresh_lead);
        self.schedule_refresh(delay);
    }

    pub fn has_pending_refresh(&self) -> bool {
        self.schedule()
            .pending
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Abort the pending refresh, if any. A refresh already in flight is not affected.
    pub fn cancel_refresh(&self) {
        if let Some(timer) = self.schedule().pending.take() {
            debug!(message = "Cancelling refresh timer", generation = timer.generation);
            timer.handle.abort();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Exchange a username and password for a token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenSet, Error> {
        if username.trim().is_empty() {
            return Err(Error::Validation("username"));
        }
        if password.is_empty() {
            return Err(Error::Validation("password"));
        }
        let user_key = self.user_key().ok_or(Error::Validation("user key"))?;

        let response = self
            .provider
            .grant(&user_key, Grant::Password { username, password })
            .await?;
        let tokens = self.apply(response);

        info!(message = "Logged in", token_expires_in = tokens.expires_in);
        self.emit(AuthEvent::LoggedIn);
        Ok(tokens)
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// On success the new pair is stored and the timer rescheduled. On failure the
    /// stale access token is kept and the configured [`RefreshFailurePolicy`]
    /// decides whether another attempt gets scheduled.
    pub async fn do_refresh_token(&self) -> Result<TokenSet, Error> {
        let (user_key, refresh_token) = {
            let credentials = self.credentials();
            let user_key = credentials
                .user_key
                .clone()
                .ok_or(Error::Validation("user key"))?;
            let refresh_token = credentials
                .refresh_token
                .clone()
                .ok_or(Error::Validation("refresh token"))?;
            (user_key, refresh_token)
        };

        let grant = Grant::RefreshToken {
            refresh_token: &refresh_token,
        };
        match self.provider.grant(&user_key, grant).await {
            Ok(response) => {
                let tokens = self.apply(response);
                info!(message = "Refreshed access token", token_expires_in = tokens.expires_in);
                self.emit(AuthEvent::Refreshed {
                    expires_in: tokens.expires_in,
                });
                Ok(tokens)
            }
            Err(err) => {
                self.refresh_failed(&err, &refresh_token);
                Err(err)
            }
        }
    }

    fn apply(&self, response: TokenResponse) -> TokenSet {
        let TokenResponse {
            access_token,
            refresh_token,
            expires_in,
        } = response;
        {
            let mut credentials = self.credentials();
            credentials.access_token = Some(access_token.clone());
            credentials.state = SessionState::Authenticated;
            credentials.failed_refreshes = 0;
        }
        self.set_refresh_token(refresh_token.clone(), expires_in);
        TokenSet {
            access_token,
            refresh_token,
            expires_in,
        }
    }

    fn refresh_failed(&self, err: &Error, sent_refresh_token: &str) {
        let failed_refreshes = {
            let mut credentials = self.credentials();
            // Another refresh or a caller stored a new pair while this one was in
            // flight; the failure says nothing about the current credentials.
            if credentials.refresh_token.as_deref() != Some(sent_refresh_token) {
                debug!(message = "Ignoring failure of superseded refresh", error = %err);
                return;
            }
            credentials.state = SessionState::Expiring;
            credentials.failed_refreshes += 1;
            credentials.failed_refreshes
        };
        let retry_in = match self.failure_policy {
            RefreshFailurePolicy::Retry {
                delay,
                max_attempts,
            } if failed_refreshes < max_attempts => Some(delay),
            _ => None,
        };
        warn!(
            message = "Token refresh failed",
            error = %err,
            failed_refreshes,
            retry_in = ?retry_in,
        );
        if let Some(delay) = retry_in {
            self.schedule_refresh(delay);
        }
        self.emit(AuthEvent::RefreshFailed {
            error: err.to_string(),
            is_auth: err.is_auth(),
            retry_in,
        });
    }

    fn schedule_refresh(&self, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(message = "No Tokio runtime, token refresh not scheduled");
            return;
        };
        let Some(deadline) = tokio::time::Instant::now().checked_add(delay) else {
            // Lifetime beyond what the clock can represent: nothing to refresh.
            warn!(message = "Token lifetime out of range, refresh not scheduled", delay = ?delay);
            self.cancel_refresh();
            return;
        };

        // The lock is held until the handle is stored so a timer that fires
        // immediately still finds itself in `pending`.
        let mut schedule = self.schedule();
        schedule.generation += 1;
        let generation = schedule.generation;
        let this = self.this.clone();

        let handle = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(manager) = this.upgrade() else {
                return;
            };
            if !manager.detach(generation) {
                return;
            }
            debug!(message = "Refresh timer fired", generation);
            // Failures are logged and reported through events.
            let _ = manager.do_refresh_token().await;
        });

        if let Some(previous) = schedule.pending.replace(Timer { generation, handle }) {
            debug!(
                message = "Replacing pending refresh timer",
                previous_generation = previous.generation
            );
            previous.handle.abort();
        }
        debug!(message = "Scheduled token refresh", generation, delay = ?delay);
    }

    /// Called by a fired timer so that the reschedule done by its own refresh does
    /// not abort it. Returns false if the timer was replaced meanwhile.
    fn detach(&self, generation: u64) -> bool {
        let mut schedule = self.schedule();
        match &schedule.pending {
            Some(timer) if timer.generation == generation => {
                schedule.pending = None;
                true
            }
            _ => false,
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        let schedule = self
            .schedule
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = schedule.pending.take() {
            timer.handle.abort();
        }
    }
}
