// Test doubles shared by the auth unit tests

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

use super::redirect::LoginRedirect;
use super::refresh::AuthBackend;
use super::types::{CredentialPair, RefreshResponse, Token};
use crate::error::AuthError;

/// Unsigned JWT whose payload carries the given `exp`
pub fn jwt_expiring_at(exp: DateTime<Utc>) -> Token {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::json!({
        "exp": exp.timestamp(),
        "jti": uuid::Uuid::new_v4().to_string(),
    });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    Token::new(format!("{}.{}.sig", header, payload))
}

pub fn jwt_in(offset: Duration) -> Token {
    jwt_expiring_at(Utc::now() + offset)
}

/// Expired access token, refresh token good for a day
pub fn expired_pair() -> CredentialPair {
    CredentialPair {
        access: jwt_in(-Duration::minutes(1)),
        refresh: jwt_in(Duration::days(1)),
    }
}

#[derive(Default)]
pub struct RecordingRedirect {
    reasons: Mutex<Vec<String>>,
}

impl RecordingRedirect {
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.reasons.lock().len()
    }
}

impl LoginRedirect for RecordingRedirect {
    fn navigate_to_login(&self, reason: &str) {
        self.reasons.lock().push(reason.to_string());
    }
}

/// Refresh backend answering from a queue of scripted results
///
/// While held, refresh calls park until `release` is called.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<RefreshResponse, AuthError>>>,
    seen: Mutex<Vec<Token>>,
    held: AtomicBool,
    gate: Notify,
}

impl ScriptedBackend {
    pub fn respond_ok(&self, access: Token, refresh: Option<Token>) {
        self.responses
            .lock()
            .push_back(Ok(RefreshResponse { access, refresh }));
    }

    pub fn respond_err(&self, err: AuthError) {
        self.responses.lock().push_back(Err(err));
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn refresh_tokens_seen(&self) -> Vec<Token> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn refresh(&self, refresh: &Token) -> Result<RefreshResponse, AuthError> {
        self.seen.lock().push(refresh.clone());
        if self.held.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::RefreshTransport("no scripted response".into())))
    }
}
