//! Session verification
//!
//! Validates the signed, time-limited bearer token presented during the
//! connection handshake. Tokens are HS256 JWTs issued by the user service
//! with `{ _id, email, iat, exp }` claims.
//!
//! Verification is a pure function of the token and the injected clock:
//! the library's own expiry check is disabled and `exp` is compared
//! against [`Clock::now_unix`] instead, so unit tests never have to mock
//! system time.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// Source of "now" for expiry checks.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_unix(&self) -> i64;
}

/// Default clock backed by the system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Identity derived once per connection from a verified credential.
/// Immutable for the connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Claim set carried by session tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verifies session tokens against the shared signing secret.
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
    clock: Box<dyn Clock>,
}

impl SessionVerifier {
    pub fn new(secret: &str) -> Self {
        Self::with_clock(secret, Box::new(SystemClock))
    }

    /// Construct with an explicit clock. Tests pass a fixed clock here.
    pub fn with_clock(secret: &str, clock: Box<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock below, not by the
        // library against system time.
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        }
    }

    /// Validate a bearer token and derive the connection identity.
    ///
    /// No side effects; deterministic for a given token and clock.
    pub fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        if token.trim().is_empty() {
            return Err(VerifyError::Missing);
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => VerifyError::BadSignature,
                ErrorKind::ExpiredSignature => VerifyError::Expired,
                _ => VerifyError::Malformed,
            }
        })?;

        let claims = data.claims;
        if claims.exp <= self.clock.now_unix() {
            return Err(VerifyError::Expired);
        }

        Ok(Identity {
            user_id: claims.user_id,
            email: claims.email,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}
