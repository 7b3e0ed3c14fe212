use serde::{Deserialize, Serialize};

use crate::auth::{CredentialPair, Token, UserProfile};

// ==================================================================================================
// Request Models
// ==================================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password1: String,
    pub password2: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub first_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutRequest {
    pub refresh: Token,
}

/// Email verification link parameters (`uid` + `token`)
#[derive(Debug, Clone, Serialize)]
pub struct VerifyEmailRequest {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Either a reset link (`uid` + `token`) or the current credentials
/// (`email` + `old_password`) authorize the new password
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SetNewPasswordRequest {
    ResetLink {
        uid: String,
        token: String,
        new_password: String,
    },
    ChangePassword {
        email: String,
        old_password: String,
        new_password: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleLoginRequest {
    pub code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub state: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteOAuthRequest {
    pub state_token: String,
    pub terms_accepted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateTokenRequest {
    pub state_token: String,
}

// ==================================================================================================
// Response Models
// ==================================================================================================

/// Body of every endpoint that may establish a session
///
/// Tokens are absent when, e.g., registration still awaits email
/// verification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub access: Option<Token>,
    #[serde(default)]
    pub refresh: Option<Token>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl AuthPayload {
    /// The credential pair, only when both tokens were issued
    pub fn credentials(&self) -> Option<CredentialPair> {
        match (&self.access, &self.refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair {
                access: access.clone(),
                refresh: refresh.clone(),
            }),
            _ => None,
        }
    }
}

/// Informational response (`{"detail": ...}` plus optional extras)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub action_required: Option<String>,
    #[serde(default)]
    pub resend_count: Option<u32>,
    #[serde(default)]
    pub max_resends: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleAuthUrl {
    pub auth_url: String,
}

/// Prefill data for finishing a social sign-up
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthStateInfo {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}
