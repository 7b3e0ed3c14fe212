// Token expiry inspection

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::types::Token;

#[derive(Deserialize)]
struct Claims {
    exp: Option<f64>,
}

/// Decode the `exp` claim of a JWT without verifying its signature.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload carrying a numeric `exp`.
pub fn token_expiry(token: &Token) -> Option<DateTime<Utc>> {
    let mut segments = token.as_str().split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.exp?;
    if !exp.is_finite() {
        return None;
    }

    DateTime::from_timestamp(exp.floor() as i64, 0)
}

/// Decides whether a token is usable at a given instant
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryOracle {
    /// Tokens are treated as expired this long before their `exp`
    leeway: Duration,
}

impl ExpiryOracle {
    pub fn new(leeway_secs: u64) -> Self {
        Self {
            leeway: Duration::seconds(leeway_secs as i64),
        }
    }

    /// Malformed tokens and tokens without `exp` count as expired.
    pub fn is_expired(&self, token: &Token, now: DateTime<Utc>) -> bool {
        match token_expiry(token) {
            None => true,
            Some(exp) => exp - self.leeway <= now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::jwt_expiring_at;
    use proptest::prelude::*;

    #[test]
    fn test_token_expiry_decodes_exp() {
        let exp = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        let token = jwt_expiring_at(exp);
        assert_eq!(token_expiry(&token), Some(exp));
    }

    #[test]
    fn test_valid_and_expired() {
        let oracle = ExpiryOracle::default();
        let now = Utc::now();

        assert!(!oracle.is_expired(&jwt_expiring_at(now + Duration::minutes(5)), now));
        assert!(oracle.is_expired(&jwt_expiring_at(now - Duration::seconds(1)), now));
        // exp == now is already expired
        let exact = DateTime::from_timestamp(now.timestamp(), 0).unwrap();
        assert!(oracle.is_expired(&jwt_expiring_at(exact), exact));
    }

    #[test]
    fn test_leeway_expires_early() {
        let oracle = ExpiryOracle::new(30);
        let now = Utc::now();

        assert!(oracle.is_expired(&jwt_expiring_at(now + Duration::seconds(20)), now));
        assert!(!oracle.is_expired(&jwt_expiring_at(now + Duration::seconds(60)), now));
    }

    #[test]
    fn test_malformed_tokens_are_expired() {
        let oracle = ExpiryOracle::default();
        let now = Utc::now();

        for raw in ["", "abc", "a.b", "a.b.c.d", "a.!!!.c", "a.e30.c"] {
            assert!(oracle.is_expired(&Token::new(raw), now), "{raw:?}");
        }

        // payload `{"exp":"soon"}` - non-numeric exp
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":"soon"}"#);
        let token = Token::new(format!("h.{}.s", payload));
        assert!(oracle.is_expired(&token, now));
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":4102444800}"#);
        let token = Token::new(format!("h.{}.s", payload));
        assert_eq!(token_expiry(&token).map(|d| d.timestamp()), Some(4_102_444_800));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_strings_never_panic(raw in ".*") {
            let oracle = ExpiryOracle::default();
            let _ = oracle.is_expired(&Token::new(raw), Utc::now());
        }

        #[test]
        fn prop_expired_iff_exp_not_after_now(offset in -100_000i64..100_000i64) {
            let oracle = ExpiryOracle::default();
            let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
            let token = jwt_expiring_at(now + Duration::seconds(offset));
            prop_assert_eq!(oracle.is_expired(&token, now), offset <= 0);
        }
    }
}
