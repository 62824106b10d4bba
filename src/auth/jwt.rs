//! JWT Token Handler
//! Mission: Issue signed, time-bounded tokens and tell malformed from expired

use crate::auth::models::{Claims, RESERVED_CLAIMS};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

/// Why a presented token could not be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, wrong key, or unparseable structure
    #[error("malformed token")]
    Malformed,
    /// Signature verifies but the token is past its expiry
    #[error("expired token")]
    Expired,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Identity recovered from a token whose signature verified
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub username: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claims: Claims,
}

/// JWT Handler for token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
    clock_skew: Duration,
}

impl JwtHandler {
    /// Create a handler signing with `secret` (HS256).
    ///
    /// An empty secret or a non-positive lifetime is a configuration error.
    pub fn new(secret: &str, lifetime: Duration) -> Result<Self> {
        if secret.trim().is_empty() {
            bail!("JWT signing secret must not be empty");
        }
        if lifetime <= Duration::zero() {
            bail!("token lifetime must be positive, got {}s", lifetime.num_seconds());
        }

        // Expiry is checked by hand so that revocation can be consulted first
        // and so the caller picks the clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime,
            clock_skew: Duration::zero(),
        })
    }

    /// Tolerance applied when comparing expiry against the clock
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew.max(Duration::zero());
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    /// Issue a token for an already-authenticated username
    pub fn issue(&self, username: &str) -> Result<IssuedToken> {
        self.issue_at(username, Map::new(), Utc::now())
    }

    /// Issue a token carrying additional claims
    pub fn issue_with_claims(
        &self,
        username: &str,
        extra: Map<String, Value>,
    ) -> Result<IssuedToken> {
        self.issue_at(username, extra, Utc::now())
    }

    pub fn issue_at(
        &self,
        username: &str,
        mut extra: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        extra.retain(|key, _| !RESERVED_CLAIMS.contains(&key.as_str()));

        let iat = now.timestamp();
        let exp = iat
            .checked_add(self.lifetime.num_seconds())
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: username.to_string(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
            extra,
        };

        debug!(
            "Generating JWT for {}, expires in {}s",
            username,
            self.lifetime.num_seconds()
        );

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to generate JWT")?;

        Ok(IssuedToken {
            token,
            issued_at: timestamp(iat).context("Invalid timestamp")?,
            expires_at: timestamp(exp).context("Invalid timestamp")?,
        })
    }

    /// Verify signature and structure only; expiry is not checked.
    pub fn decode(&self, token: &str) -> Result<DecodedToken, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!("JWT rejected: {}", e);
            TokenError::Malformed
        })?;

        let claims = data.claims;
        if claims.sub.is_empty() || claims.exp <= claims.iat {
            return Err(TokenError::Malformed);
        }
        let issued_at = timestamp(claims.iat).ok_or(TokenError::Malformed)?;
        let expires_at = timestamp(claims.exp).ok_or(TokenError::Malformed)?;

        Ok(DecodedToken {
            username: claims.sub.clone(),
            issued_at,
            expires_at,
            claims,
        })
    }

    /// Whether a decoded token is still inside its lifetime at `now`
    pub fn is_live_at(&self, decoded: &DecodedToken, now: DateTime<Utc>) -> bool {
        decoded.expires_at + self.clock_skew > now
    }

    /// Decode and check expiry against the wall clock
    pub fn verify(&self, token: &str) -> Result<DecodedToken, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<DecodedToken, TokenError> {
        let decoded = self.decode(token)?;
        if !self.is_live_at(&decoded, now) {
            return Err(TokenError::Expired);
        }
        Ok(decoded)
    }

    /// True only for an unexpired token whose subject is `expected_username`
    pub fn validate(&self, token: &str, expected_username: &str) -> bool {
        self.validate_at(token, expected_username, Utc::now())
    }

    pub fn validate_at(&self, token: &str, expected_username: &str, now: DateTime<Utc>) -> bool {
        matches!(
            self.verify_at(token, now),
            Ok(decoded) if decoded.username == expected_username
        )
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler() -> JwtHandler {
        JwtHandler::new("test-secret-key-12345", Duration::minutes(30)).unwrap()
    }

    #[test]
    fn test_issue_then_decode_recovers_username() {
        let handler = handler();
        let issued = handler.issue("bob").unwrap();
        assert!(!issued.token.is_empty());

        let decoded = handler.decode(&issued.token).unwrap();
        assert_eq!(decoded.username, "bob");
        assert_eq!(decoded.expires_at, issued.expires_at);
        assert_eq!(
            decoded.expires_at - decoded.issued_at,
            Duration::minutes(30)
        );
    }

    #[test]
    fn test_token_accepted_until_lifetime_elapses() {
        let handler = handler();
        let now = Utc::now();
        let issued = handler.issue_at("bob", Map::new(), now).unwrap();

        assert!(handler.verify_at(&issued.token, now).is_ok());
        assert!(handler.validate_at(&issued.token, "bob", now));

        let later = issued.expires_at;
        assert_eq!(
            handler.verify_at(&issued.token, later),
            Err(TokenError::Expired)
        );
        assert!(!handler.validate_at(&issued.token, "bob", later));
    }

    #[test]
    fn test_validate_checks_subject() {
        let handler = handler();
        let issued = handler.issue("bob").unwrap();
        assert!(handler.validate(&issued.token, "bob"));
        assert!(!handler.validate(&issued.token, "alice"));
    }

    #[test]
    fn test_clock_skew_extends_acceptance() {
        let handler = handler().with_clock_skew(Duration::seconds(5));
        let now = Utc::now();
        let issued = handler.issue_at("bob", Map::new(), now).unwrap();

        let just_after = issued.expires_at + Duration::seconds(3);
        assert!(handler.verify_at(&issued.token, just_after).is_ok());

        let well_after = issued.expires_at + Duration::seconds(5);
        assert_eq!(
            handler.verify_at(&issued.token, well_after),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_negative_clock_skew_clamped() {
        let handler = handler().with_clock_skew(Duration::seconds(-30));
        assert_eq!(handler.clock_skew(), Duration::zero());
        assert_eq!(handler.lifetime(), Duration::minutes(30));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = handler();
        assert_eq!(
            handler.decode("invalid.token.here"),
            Err(TokenError::Malformed)
        );
        assert_eq!(handler.decode(""), Err(TokenError::Malformed));
        assert_eq!(handler.decode("no-dots-at-all"), Err(TokenError::Malformed));
    }

    #[test]
    fn test_tampered_signature_is_malformed() {
        let handler = handler();
        let issued = handler.issue("bob").unwrap();

        let sig_start = issued.token.rfind('.').unwrap() + 1;
        let mut bytes = issued.token.clone().into_bytes();
        bytes[sig_start] = if bytes[sig_start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert_ne!(tampered, issued.token);
        assert_eq!(handler.decode(&tampered), Err(TokenError::Malformed));
    }

    #[test]
    fn test_different_secrets_reject() {
        let handler1 = JwtHandler::new("secret1", Duration::minutes(5)).unwrap();
        let handler2 = JwtHandler::new("secret2", Duration::minutes(5)).unwrap();

        let issued = handler1.issue("bob").unwrap();
        assert_eq!(handler2.decode(&issued.token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_empty_secret_is_configuration_error() {
        assert!(JwtHandler::new("", Duration::minutes(5)).is_err());
        assert!(JwtHandler::new("   ", Duration::minutes(5)).is_err());
        assert!(JwtHandler::new("secret", Duration::zero()).is_err());
    }

    #[test]
    fn test_extra_claims_cannot_override_reserved() {
        let handler = handler();
        let extra = json!({ "sub": "mallory", "exp": 0, "tenant": "acme" })
            .as_object()
            .cloned()
            .unwrap();

        let issued = handler.issue_with_claims("bob", extra).unwrap();
        let decoded = handler.decode(&issued.token).unwrap();

        assert_eq!(decoded.username, "bob");
        assert_eq!(decoded.claims.extra.get("tenant"), Some(&json!("acme")));
        assert!(!decoded.claims.extra.contains_key("sub"));
    }

    #[test]
    fn test_tokens_issued_together_are_distinct() {
        let handler = handler();
        let now = Utc::now();
        let a = handler.issue_at("bob", Map::new(), now).unwrap();
        let b = handler.issue_at("bob", Map::new(), now).unwrap();
        assert_ne!(a.token, b.token);
    }
}
