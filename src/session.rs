//! Per-browser-session state.

use crate::auth::AuthFailure;
use crate::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Tri-state authentication status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// No login attempt yet, or logged out
    #[default]
    Unknown,
    Authenticated,
    /// Last login attempt was rejected
    Failed,
}

impl AuthStatus {
    pub fn is_authenticated(self) -> bool {
        self == Self::Authenticated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Authenticated => "authenticated",
            Self::Failed => "failed",
        }
    }
}

/// Mutable state of one browser session.
///
/// Created on first contact and dropped when the session ends; nothing here
/// outlives the session except what the browser keeps in `cookies`.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub authentication_status: AuthStatus,
    pub username: Option<String>,
    /// Display name of the authenticated user
    pub name: Option<String>,
    pub cookies: CookieJar,
    /// Why the last login submission was rejected, shown on the next form
    pub last_auth_error: Option<AuthFailure>,
    /// Append-only record of gated operations invoked in this session
    pub activity_log: Vec<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_cookies(CookieJar::default())
    }

    /// Start a session for a browser that already holds `cookies`
    pub fn with_cookies(cookies: CookieJar) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            authentication_status: AuthStatus::Unknown,
            username: None,
            name: None,
            cookies,
            last_auth_error: None,
            activity_log: Vec::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authentication_status.is_authenticated()
    }

    pub(crate) fn sign_in(&mut self, username: String, name: String) {
        self.authentication_status = AuthStatus::Authenticated;
        self.username = Some(username);
        self.name = Some(name);
        self.last_auth_error = None;
    }

    pub(crate) fn sign_out(&mut self) {
        self.authentication_status = AuthStatus::Unknown;
        self.username = None;
        self.name = None;
        self.last_auth_error = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
