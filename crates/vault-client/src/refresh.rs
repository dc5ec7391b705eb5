//! Single-flight access-token refresh.
//!
//! When a request comes back `401`, the client hands it to the
//! [`RefreshCoordinator`]. The coordinator guarantees that however many
//! requests fail at once, exactly one refresh call reaches the backend. Every
//! request that hit a `401` while that refresh was outstanding waits in a FIFO
//! queue and receives the same outcome: the new access token, or the failure.
//!
//! State machine:
//!
//! ```text
//!            401, token still current
//!   Idle ─────────────────────────────▶ Refreshing
//!    ▲                                     │
//!    └──── settle: drain queue (FIFO) ◀────┘
//! ```
//!
//! The refresh runs in its own task. A caller that stops waiting cannot leave
//! the coordinator stuck in `Refreshing`, and a panicking refresher settles
//! the queue with [`RefreshFailure::Abandoned`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use crate::error::RefreshFailure;
use crate::redirect::LoginRedirect;
use crate::session::{Rotation, SessionStore};
use crate::types::{RefreshRequest, TokenResponse};

/// Tokens returned by a successful refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    /// The new access token.
    pub access_token: String,
    /// A rotated refresh token, when the backend issued one.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("access_token", &"[redacted]")
            .field("rotated", &self.refresh_token.is_some())
            .finish()
    }
}

/// Exchanges a refresh token for a new access token.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync + 'static {
    /// Perform one refresh call.
    ///
    /// # Errors
    ///
    /// Returns a [`RefreshFailure`] describing why no new token was issued.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshFailure>;
}

/// [`TokenRefresher`] that POSTs `{ "refreshtoken": … }` to the backend.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    http: reqwest::Client,
    url: String,
}

impl HttpRefresher {
    /// Create a refresher that calls `url` with `http`.
    #[must_use]
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshFailure> {
        let resp = self
            .http
            .post(&self.url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshFailure::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RefreshFailure::MalformedResponse(e.to_string()))?;

        match body.access_token.filter(|t| !t.is_empty()) {
            Some(access_token) => Ok(RefreshedTokens {
                access_token,
                refresh_token: body.refresh_token,
            }),
            None => Err(RefreshFailure::MalformedResponse(
                "response has no accesstoken".to_owned(),
            )),
        }
    }
}

type Waiter = oneshot::Sender<Result<String, RefreshFailure>>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<Waiter>,
}

struct Inner {
    state: Mutex<RefreshState>,
    store: SessionStore,
    refresher: Arc<dyn TokenRefresher>,
    redirect: Arc<dyn LoginRedirect>,
    login_path: String,
}

/// Coordinates token refresh across every request issued by one client.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.inner.store)
            .field("login_path", &self.inner.login_path)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator in the `Idle` state.
    #[must_use]
    pub fn new(
        store: SessionStore,
        refresher: Arc<dyn TokenRefresher>,
        redirect: Arc<dyn LoginRedirect>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::default()),
                store,
                refresher,
                redirect,
                login_path: login_path.into(),
            }),
        }
    }

    /// Obtain an access token to replace `stale_token`, the token a request
    /// was sent with when it received `401`.
    ///
    /// If another refresh already replaced `stale_token`, the current token is
    /// returned without contacting the backend. Otherwise the caller joins the
    /// in-flight refresh, starting one if none is running.
    ///
    /// # Errors
    ///
    /// Returns the [`RefreshFailure`] of the refresh this call waited on. When
    /// [`RefreshFailure::ends_session`] holds, the session has been cleared
    /// and the login redirect has fired by the time it is returned.
    pub async fn recover(&self, stale_token: Option<&str>) -> Result<String, RefreshFailure> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock().await;
            if state.in_flight {
                state.waiters.push(tx);
                debug!(queued = state.waiters.len(), "refresh in flight, request queued");
            } else {
                if let Some(current) = self.inner.store.access_token().await {
                    if stale_token != Some(current.as_str()) {
                        debug!("access token already rotated, reusing it");
                        return Ok(current);
                    }
                }
                state.in_flight = true;
                state.waiters.push(tx);
                debug!("starting token refresh");
                tokio::spawn(Arc::clone(&self.inner).run());
            }
        }

        rx.await.unwrap_or(Err(RefreshFailure::Abandoned))
    }

    /// Whether a refresh is currently outstanding.
    pub async fn is_refreshing(&self) -> bool {
        self.inner.state.lock().await.in_flight
    }

    /// Number of requests waiting on the outstanding refresh.
    pub async fn queued(&self) -> usize {
        self.inner.state.lock().await.waiters.len()
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        let worker = Arc::clone(&self);
        let outcome = match tokio::spawn(async move { worker.refresh_session().await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "token refresh task did not complete");
                Err(RefreshFailure::Abandoned)
            }
        };

        if let Err(failure) = &outcome {
            if failure.ends_session() {
                self.sign_out(failure).await;
            } else {
                warn!(reason = %failure, "token refresh failed, keeping stored session");
            }
        }
        self.settle(outcome).await;
    }

    async fn refresh_session(&self) -> Result<String, RefreshFailure> {
        let session = match self.store.try_load().await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(RefreshFailure::MissingRefreshToken),
            Err(e) => return Err(RefreshFailure::Storage(e.to_string())),
        };

        let tokens = self.refresher.refresh(&session.refresh_token).await?;
        let rotated = tokens.refresh_token.is_some();
        let outcome = self
            .store
            .rotate(&session.refresh_token, tokens.access_token, tokens.refresh_token)
            .await
            .map_err(|e| RefreshFailure::Storage(e.to_string()))?;

        match outcome {
            Rotation::Applied(session) => {
                info!(rotated, "access token refreshed");
                Ok(session.access_token)
            }
            Rotation::Superseded(current) => {
                info!("session replaced during refresh, discarding refreshed tokens");
                Ok(current.access_token)
            }
            Rotation::SignedOut => {
                info!("session removed during refresh, discarding refreshed tokens");
                Err(RefreshFailure::SignedOut)
            }
        }
    }

    async fn sign_out(&self, failure: &RefreshFailure) {
        warn!(reason = %failure, "token refresh failed, clearing session");
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear session after refresh failure");
        }
        self.redirect.redirect_to_login(&self.login_path);
    }

    async fn settle(&self, outcome: Result<String, RefreshFailure>) {
        let waiters = {
            let mut state = self.state.lock().await;
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh settled");
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped.
            let _ = waiter.send(outcome.clone());
        }
    }
}
