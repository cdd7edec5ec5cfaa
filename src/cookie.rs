//! Signed session cookies and the browser-side cookie jar.
//!
//! A session cookie is an HS256 JWT carrying the username (`sub`) and the
//! expiry (`exp`, unix seconds), signed with the policy's key. Expiry is
//! checked against the caller's clock rather than inside the JWT decoder so
//! that the check is deterministic for a given `now`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Longest accepted cookie lifetime
pub const MAX_EXPIRY_DAYS: u32 = 36_500;

/// Parameters governing signed session-cookie issuance and expiry
#[derive(Clone, Deserialize, Serialize)]
pub struct CookiePolicy {
    pub name: String,
    pub key: String,
    pub expiry_days: u32,
}

impl std::fmt::Debug for CookiePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookiePolicy")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .field("expiry_days", &self.expiry_days)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("invalid session cookie: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("session cookie expired at unix time {exp}")]
    Expired { exp: i64 },
    #[error("cookie expiry of {days} days is out of range")]
    ExpiryOutOfRange { days: u32 },
    #[error("cookie jar I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cookie jar is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CookieClaims {
    sub: String,
    exp: i64,
}

impl CookiePolicy {
    pub fn expiry(&self) -> Duration {
        Duration::days(i64::from(self.expiry_days))
    }

    /// Issue a signed cookie value for `username`, valid until `now + expiry_days`
    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> Result<String, CookieError> {
        let exp = now
            .checked_add_signed(self.expiry())
            .ok_or(CookieError::ExpiryOutOfRange {
                days: self.expiry_days,
            })?;
        let claims = CookieClaims {
            sub: username.to_string(),
            exp: exp.timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.key.as_bytes()),
        )?;
        Ok(token)
    }

    /// Verify signature and expiry, returning the username the cookie was issued for
    pub fn verify(&self, value: &str, now: DateTime<Utc>) -> Result<String, CookieError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<CookieClaims>(
            value,
            &DecodingKey::from_secret(self.key.as_bytes()),
            &validation,
        )?;
        if data.claims.exp <= now.timestamp() {
            return Err(CookieError::Expired {
                exp: data.claims.exp,
            });
        }
        Ok(data.claims.sub)
    }
}

/// Cookies held by one browser, keyed by cookie name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: String) {
        self.cookies.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.cookies.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Load a jar from disk; a missing file is an empty jar
    pub fn load(path: &Path) -> Result<Self, CookieError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CookieError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
