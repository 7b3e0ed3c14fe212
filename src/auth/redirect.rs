// Logged-out navigation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reason used when the backend gave no detail
pub const SESSION_EXPIRED: &str = "session expired";

/// Host capability that sends the user to the login view
pub trait LoginRedirect: Send + Sync {
    fn navigate_to_login(&self, reason: &str);
}

/// De-duplicates redirects
///
/// The first trigger navigates; later triggers are swallowed until a new
/// session is stored and the gate is re-armed.
pub struct RedirectGate {
    target: Arc<dyn LoginRedirect>,
    pending: AtomicBool,
}

impl RedirectGate {
    pub fn new(target: Arc<dyn LoginRedirect>) -> Self {
        Self {
            target,
            pending: AtomicBool::new(false),
        }
    }

    /// Returns `true` if this call performed the navigation
    pub fn trigger(&self, reason: &str) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            tracing::debug!(reason, "Login redirect already pending, skipping");
            return false;
        }

        tracing::warn!(reason, "Session ended, redirecting to login");
        self.target.navigate_to_login(reason);
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Swallow redirects until the next `reset`, while the user ends the
    /// session themselves
    pub fn suppress(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Re-arm after a new session has been established
    pub fn reset(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Redirect for terminal hosts: tells the user to sign in again
pub struct ConsoleRedirect;

impl LoginRedirect for ConsoleRedirect {
    fn navigate_to_login(&self, reason: &str) {
        eprintln!(
            "Signed out ({}). Run `{} login` to sign in again.",
            reason,
            env!("CARGO_PKG_NAME")
        );
    }
}
