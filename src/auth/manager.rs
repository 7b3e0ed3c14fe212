use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::credentials::CredentialStore;
use super::expiry::ExpiryOracle;
use super::redirect::RedirectGate;
use super::refresh::AuthBackend;
use super::types::{CredentialPair, Token};
use crate::error::{AuthError, SessionEnded};

type RefreshOutcome = Result<Token, SessionEnded>;

/// Suspended request waiting for someone else's refresh
type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    /// Non-empty only while `in_flight` is set
    waiters: VecDeque<Waiter>,
}

/// Single-flight refresh coordinator
///
/// Hands out valid access tokens. When the access token is expired exactly
/// one caller performs the refresh; callers arriving meanwhile are parked and
/// resumed in arrival order with the same outcome.
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    backend: Arc<dyn AuthBackend>,
    oracle: ExpiryOracle,
    redirect: Arc<RedirectGate>,
    state: Mutex<RefreshState>,
}

enum Role {
    Wait(oneshot::Receiver<RefreshOutcome>),
    Refresh(CredentialPair, oneshot::Receiver<RefreshOutcome>),
    Ready(Token),
    End(AuthError),
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        backend: Arc<dyn AuthBackend>,
        oracle: ExpiryOracle,
        redirect: Arc<RedirectGate>,
    ) -> Self {
        Self {
            store,
            backend,
            oracle,
            redirect,
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn oracle(&self) -> &ExpiryOracle {
        &self.oracle
    }

    /// Whether a refresh call is currently outstanding
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Number of requests waiting on the in-flight refresh, its initiator
    /// included
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Get a valid access token for `credentials`, refreshing if necessary
    ///
    /// The refresh call runs on its own task, so cancelling the request that
    /// started it leaves the refresh and every other waiter unaffected.
    pub async fn ensure_valid_access(
        self: &Arc<Self>,
        credentials: &CredentialPair,
        now: DateTime<Utc>,
    ) -> Result<Token, SessionEnded> {
        if !self.oracle.is_expired(&credentials.access, now) {
            return Ok(credentials.access.clone());
        }

        if self.oracle.is_expired(&credentials.refresh, now) {
            tracing::warn!("Refresh token expired, session cannot be renewed");
            return Err(self.end_session(AuthError::ExpiredRefresh));
        }

        let role = {
            let mut state = self.state.lock();
            if state.in_flight {
                let rx = park(&mut state);
                tracing::debug!(
                    position = state.waiters.len(),
                    "Refresh in flight, parking request"
                );
                Role::Wait(rx)
            } else {
                // The caller's snapshot may predate a refresh or logout that
                // finished in the meantime.
                match self.store.get() {
                    Ok(None) => Role::End(AuthError::ExpiredRefresh),
                    Ok(Some(latest)) if !self.oracle.is_expired(&latest.access, now) => {
                        Role::Ready(latest.access)
                    }
                    Ok(Some(latest)) if self.oracle.is_expired(&latest.refresh, now) => {
                        Role::End(AuthError::ExpiredRefresh)
                    }
                    Ok(Some(latest)) => {
                        state.in_flight = true;
                        Role::Refresh(latest, park(&mut state))
                    }
                    Err(e) => {
                        tracing::error!("Failed to read credentials before refresh: {:#}", e);
                        state.in_flight = true;
                        Role::Refresh(credentials.clone(), park(&mut state))
                    }
                }
            }
        };

        match role {
            Role::Wait(rx) => wait(rx).await,
            Role::Ready(token) => Ok(token),
            Role::End(cause) => Err(self.end_session(cause)),
            Role::Refresh(current, rx) => {
                let coordinator = Arc::clone(self);
                tokio::spawn(async move { coordinator.run_refresh(current).await });
                wait(rx).await
            }
        }
    }

    async fn run_refresh(&self, current: CredentialPair) {
        let mut flight = InFlight {
            coordinator: self,
            armed: true,
        };
        let result = self.backend.refresh(&current.refresh).await;
        flight.armed = false;

        match result {
            Ok(response) => {
                let updated = current.rotated(response);
                // Persist before releasing so later requests read the new pair
                if let Err(e) = self.store.set(&updated) {
                    tracing::error!("Failed to persist refreshed credentials: {:#}", e);
                }
                self.release(&Ok(updated.access));
            }
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                self.fail_refresh(e);
            }
        }
    }

    /// Clear the flag and resolve every parked waiter with `outcome`
    fn release(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        tracing::debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "Resolving parked requests"
        );
        for waiter in waiters {
            // Receiver gone means the request was cancelled
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Failure branch: clear the session, abort every waiter, redirect once
    fn fail_refresh(&self, cause: AuthError) {
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear credentials: {:#}", e);
        }
        let ended = cause.into_session_ended();
        self.release(&Err(ended.clone()));
        self.redirect.trigger(&ended.reason);
    }

    fn end_session(&self, cause: AuthError) -> SessionEnded {
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear credentials: {:#}", e);
        }
        let ended = cause.into_session_ended();
        self.redirect.trigger(&ended.reason);
        ended
    }
}

fn park(state: &mut RefreshState) -> oneshot::Receiver<RefreshOutcome> {
    let (tx, rx) = oneshot::channel();
    state.waiters.push_back(tx);
    rx
}

async fn wait(rx: oneshot::Receiver<RefreshOutcome>) -> RefreshOutcome {
    rx.await.unwrap_or_else(|_| Err(SessionEnded::expired()))
}

/// Resolves the waiters if the refresh task dies before the backend answers
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if std::thread::panicking() {
            tracing::error!("Refresh task panicked, ending session");
            self.coordinator
                .fail_refresh(AuthError::RefreshTransport("refresh panicked".to_string()));
        } else {
            // Runtime shutting down: the credentials are still good
            tracing::warn!("Refresh task cancelled, aborting waiting requests");
            self.coordinator.release(&Err(SessionEnded::expired()));
        }
    }
}
