// Authentication types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque bearer token (a JWT carrying an `exp` claim)
///
/// `Debug` output is redacted so tokens never end up in logs verbatim.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "Token({}…)", prefix)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Access/refresh pair. Either both are stored or neither is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access: Token,
    pub refresh: Token,
}

impl CredentialPair {
    pub fn new(access: impl Into<Token>, refresh: impl Into<Token>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    /// Apply a refresh result: access is always replaced, refresh only when
    /// the backend rotated it.
    pub fn rotated(&self, response: RefreshResponse) -> Self {
        Self {
            access: response.access,
            refresh: response.refresh.unwrap_or_else(|| self.refresh.clone()),
        }
    }
}

/// Cached identity of the signed-in user
///
/// Unknown fields sent by the backend are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<i64>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

/// Token refresh request body
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a Token,
}

/// Token refresh response. `refresh` is present when the backend rotates
/// refresh tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: Token,
    #[serde(default)]
    pub refresh: Option<Token>,
}

/// Extract the human-readable `detail` from an error body.
///
/// The backend sends either `{"detail": "..."}` or `{"detail": ["...", ...]}`.
pub fn error_detail(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    match json.get("detail")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::new("eyJhbGciOiJIUzI1NiJ9.secret-payload.signature");
        let printed = format!("{:?}", token);
        assert_eq!(printed, "Token(eyJhbGci…)");
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn test_rotated_keeps_refresh_when_not_supplied() {
        let pair = CredentialPair::new("A1", "R1");

        let next = pair.rotated(RefreshResponse {
            access: Token::new("A2"),
            refresh: None,
        });
        assert_eq!(next, CredentialPair::new("A2", "R1"));

        let next = pair.rotated(RefreshResponse {
            access: Token::new("A2"),
            refresh: Some(Token::new("R2")),
        });
        assert_eq!(next, CredentialPair::new("A2", "R2"));
    }

    #[test]
    fn test_refresh_response_without_refresh_field() {
        let resp: RefreshResponse = serde_json::from_str(r#"{"access": "A2"}"#).unwrap();
        assert_eq!(resp.access.as_str(), "A2");
        assert!(resp.refresh.is_none());
    }

    #[test]
    fn test_user_profile_keeps_unknown_fields() {
        let user: UserProfile = serde_json::from_str(
            r#"{"pk": 7, "email": "ada@example.com", "first_name": "Ada", "last_name": "", "plan": "pro"}"#,
        )
        .unwrap();
        assert_eq!(user.pk, Some(7));
        assert_eq!(user.display_name(), "Ada");
        assert_eq!(user.extra["plan"], "pro");

        let round = serde_json::to_value(&user).unwrap();
        assert_eq!(round["plan"], "pro");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let user = UserProfile {
            email: "ada@example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "ada@example.com");
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(r#"{"detail": "Token is blacklisted", "code": "token_not_valid"}"#),
            Some("Token is blacklisted".to_string())
        );
        assert_eq!(
            error_detail(r#"{"detail": ["Too short.", "Too common."]}"#),
            Some("Too short. Too common.".to_string())
        );
        assert_eq!(error_detail(r#"{"detail": ""}"#), None);
        assert_eq!(error_detail(r#"{"code": "x"}"#), None);
        assert_eq!(error_detail("<html>502</html>"), None);
    }
}
