//! Session authenticator.
//!
//! Decides whether a session may proceed. An unauthenticated session first
//! gets a chance to present a signed cookie; failing that, a login form is
//! rendered and the current request halts whatever the outcome of the form.
//! A successful login therefore only takes effect on the next request.

use crate::config::AuthConfig;
use crate::credentials::normalize_username;
use crate::session::{AuthStatus, SessionState};
use crate::transcript::{self, SharedTranscript};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of an authentication check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    /// The wrapped operation may run
    Authenticated,
    /// A login form was shown; the request must stop here
    LoginPromptRendered,
}

/// Recoverable authentication failures. These are absorbed into a
/// re-rendered login form and never abort the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("username and password are both required")]
    MalformedEntry,
    #[error("unknown user")]
    UnknownUser,
    #[error("incorrect password")]
    BadPassword,
    #[error("session cookie rejected: {0}")]
    CookieRejected(String),
}

impl AuthFailure {
    /// Message safe to show on the login form
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MalformedEntry => "Please enter your username and password",
            Self::UnknownUser | Self::BadPassword => "Username/password is incorrect",
            Self::CookieRejected(_) => "Your session has expired, please log in again",
        }
    }
}

/// What the login prompt shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub title: String,
    pub cookie_name: String,
    pub expiry_days: u32,
    /// Error from the previous attempt, if any
    pub error: Option<String>,
}

/// Credentials as entered by the user
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// The UI surface the authenticator renders into
pub trait LoginPrompt {
    /// Render the login form and return whatever the user submitted
    fn render(&mut self, form: &LoginForm) -> Option<LoginInput>;

    /// Render the logout affordance for an authenticated user
    fn offer_logout(&mut self, _name: &str) {}
}

pub struct Authenticator {
    config: Arc<AuthConfig>,
    audit: Option<SharedTranscript>,
}

impl Authenticator {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self {
            config,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: SharedTranscript) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn authenticate(
        &self,
        session: &mut SessionState,
        prompt: &mut dyn LoginPrompt,
    ) -> AuthResult {
        if session.is_authenticated() {
            prompt.offer_logout(session.name.as_deref().unwrap_or_default());
            return AuthResult::Authenticated;
        }

        let error = match self.restore_from_cookie(session) {
            Ok(true) => {
                prompt.offer_logout(session.name.as_deref().unwrap_or_default());
                return AuthResult::Authenticated;
            }
            Ok(false) => session.last_auth_error.as_ref().map(AuthFailure::user_message),
            Err(failure) => Some(failure.user_message()),
        };

        let form = self.login_form(error.map(str::to_string));
        if let Some(input) = prompt.render(&form) {
            // The failure is shown on the next form; this request stops regardless.
            if let Err(failure) = self.login(session, &input) {
                session.last_auth_error = Some(failure);
            }
        }
        AuthResult::LoginPromptRendered
    }

    pub fn login_form(&self, error: Option<String>) -> LoginForm {
        LoginForm {
            title: "Login".to_string(),
            cookie_name: self.config.cookie.name.clone(),
            expiry_days: self.config.cookie.expiry_days,
            error,
        }
    }

    /// Try to restore authentication from the session cookie.
    ///
    /// Returns `Ok(false)` when no cookie is present. An invalid or expired
    /// cookie is removed from the jar and reported as `CookieRejected`.
    pub fn restore_from_cookie(&self, session: &mut SessionState) -> Result<bool, AuthFailure> {
        let policy = &self.config.cookie;
        let Some(value) = session.cookies.get(&policy.name) else {
            return Ok(false);
        };

        let verified = policy
            .verify(value, Utc::now())
            .map_err(|e| AuthFailure::CookieRejected(e.to_string()))
            .and_then(|username| {
                // The user may have been removed from the config since issuance
                let record = self
                    .config
                    .credentials
                    .get(&username)
                    .ok_or_else(|| AuthFailure::CookieRejected(format!("unknown user {}", username)))?;
                Ok((username, record.name.clone()))
            });

        match verified {
            Ok((username, name)) => {
                transcript::audit(self.audit.as_ref(), |t| {
                    t.cookie_restored(&session.id, &username)
                });
                session.sign_in(username, name);
                Ok(true)
            }
            Err(failure) => {
                session.cookies.remove(&policy.name);
                transcript::audit(self.audit.as_ref(), |t| {
                    t.cookie_rejected(&session.id, &failure.to_string())
                });
                Err(failure)
            }
        }
    }

    /// Check submitted credentials and update the session status.
    ///
    /// A malformed entry leaves the session status untouched. Otherwise the
    /// status becomes `Authenticated` (and a signed cookie is set) or `Failed`.
    pub fn login(&self, session: &mut SessionState, input: &LoginInput) -> Result<(), AuthFailure> {
        let username = normalize_username(&input.username);
        if username.is_empty() || input.password.is_empty() {
            return Err(AuthFailure::MalformedEntry);
        }

        match self.config.credentials.verify(&username, &input.password) {
            Ok(record) => {
                let name = record.name.clone();
                let policy = &self.config.cookie;
                match policy.issue(&username, Utc::now()) {
                    Ok(token) => session.cookies.set(&policy.name, token),
                    Err(e) => eprintln!("Warning: failed to issue session cookie: {}", e),
                }
                transcript::audit(self.audit.as_ref(), |t| t.login_ok(&session.id, &username));
                session.sign_in(username, name);
                Ok(())
            }
            Err(failure) => {
                session.authentication_status = AuthStatus::Failed;
                transcript::audit(self.audit.as_ref(), |t| {
                    t.login_failed(&session.id, &username, &failure.to_string())
                });
                Err(failure)
            }
        }
    }

    /// Clear the session's authentication and its signed cookie
    pub fn logout(&self, session: &mut SessionState) {
        transcript::audit(self.audit.as_ref(), |t| {
            t.logout(&session.id, session.username.as_deref())
        });
        session.cookies.remove(&self.config.cookie.name);
        session.sign_out();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::CookiePolicy;
    use crate::credentials::{hash_password, Credentials, UserRecord};
    use chrono::Duration;
    use std::collections::HashMap;

    /// Prompt that replays scripted submissions and counts renders
    #[derive(Default)]
    struct Scripted {
        submissions: Vec<LoginInput>,
        forms: Vec<LoginForm>,
        logouts_offered: usize,
    }

    impl Scripted {
        fn submitting(username: &str, password: &str) -> Self {
            Self {
                submissions: vec![LoginInput::new(username, password)],
                ..Self::default()
            }
        }
    }

    impl LoginPrompt for Scripted {
        fn render(&mut self, form: &LoginForm) -> Option<LoginInput> {
            self.forms.push(form.clone());
            if self.submissions.is_empty() {
                None
            } else {
                Some(self.submissions.remove(0))
            }
        }

        fn offer_logout(&mut self, _name: &str) {
            self.logouts_offered += 1;
        }
    }

    fn authenticator() -> Authenticator {
        let mut users = HashMap::new();
        users.insert(
            "jsmith".to_string(),
            UserRecord {
                name: "John Smith".to_string(),
                email: None,
                password: hash_password("s3cret-pw").unwrap(),
            },
        );
        let config = AuthConfig::new(
            Credentials::new(users),
            CookiePolicy {
                name: "dashgate_auth".to_string(),
                key: "unit-test-key".to_string(),
                expiry_days: 30,
            },
        );
        Authenticator::new(Arc::new(config))
    }

    #[test]
    fn test_unauthenticated_without_submission_renders_prompt() {
        let auth = authenticator();
        let mut session = SessionState::new();
        let mut prompt = Scripted::default();

        let result = auth.authenticate(&mut session, &mut prompt);

        assert_eq!(result, AuthResult::LoginPromptRendered);
        assert_eq!(prompt.forms.len(), 1);
        assert_eq!(prompt.forms[0].cookie_name, "dashgate_auth");
        assert_eq!(prompt.forms[0].error, None);
        assert_eq!(session.authentication_status, AuthStatus::Unknown);
    }

    #[test]
    fn test_successful_login_still_halts_request() {
        let auth = authenticator();
        let mut session = SessionState::new();
        let mut prompt = Scripted::submitting("jsmith", "s3cret-pw");

        let result = auth.authenticate(&mut session, &mut prompt);

        assert_eq!(result, AuthResult::LoginPromptRendered);
        assert!(session.is_authenticated());
        assert_eq!(session.name.as_deref(), Some("John Smith"));
        assert!(session.cookies.get("dashgate_auth").is_some());

        // Next request proceeds and offers logout
        let result = auth.authenticate(&mut session, &mut prompt);
        assert_eq!(result, AuthResult::Authenticated);
        assert_eq!(prompt.forms.len(), 1);
        assert_eq!(prompt.logouts_offered, 1);
    }

    #[test]
    fn test_wrong_password_marks_session_failed() {
        let auth = authenticator();
        let mut session = SessionState::new();
        let mut prompt = Scripted::submitting("jsmith", "guess");

        assert_eq!(
            auth.authenticate(&mut session, &mut prompt),
            AuthResult::LoginPromptRendered
        );
        assert_eq!(session.authentication_status, AuthStatus::Failed);
        assert!(session.cookies.is_empty());

        // The re-rendered form carries the failure
        auth.authenticate(&mut session, &mut prompt);
        assert_eq!(
            prompt.forms[1].error.as_deref(),
            Some("Username/password is incorrect")
        );
    }

    #[test]
    fn test_malformed_entry_leaves_status_untouched() {
        let auth = authenticator();
        let mut session = SessionState::new();

        let err = auth
            .login(&mut session, &LoginInput::new("  ", "s3cret-pw"))
            .unwrap_err();
        assert_eq!(err, AuthFailure::MalformedEntry);
        let err = auth
            .login(&mut session, &LoginInput::new("jsmith", ""))
            .unwrap_err();
        assert_eq!(err, AuthFailure::MalformedEntry);
        assert_eq!(session.authentication_status, AuthStatus::Unknown);
        assert!(session.activity_log.is_empty());
    }

    #[test]
    fn test_blank_submission_asks_for_both_fields() {
        let auth = authenticator();
        let mut session = SessionState::new();
        let mut prompt = Scripted::submitting("", "");

        auth.authenticate(&mut session, &mut prompt);
        auth.authenticate(&mut session, &mut prompt);

        assert_eq!(prompt.forms[0].error, None);
        assert_eq!(
            prompt.forms[1].error.as_deref(),
            Some("Please enter your username and password")
        );
        assert_eq!(session.authentication_status, AuthStatus::Unknown);
    }

    #[test]
    fn test_form_error_follows_latest_submission() {
        let auth = authenticator();
        let mut session = SessionState::new();
        let mut prompt = Scripted {
            submissions: vec![
                LoginInput::new("jsmith", "guess"),
                LoginInput::new("jsmith", ""),
            ],
            ..Scripted::default()
        };

        auth.authenticate(&mut session, &mut prompt);
        auth.authenticate(&mut session, &mut prompt);
        auth.authenticate(&mut session, &mut prompt);

        assert_eq!(
            prompt.forms[1].error.as_deref(),
            Some("Username/password is incorrect")
        );
        // A blank entry after a bad password is reported as blank
        assert_eq!(
            prompt.forms[2].error.as_deref(),
            Some("Please enter your username and password")
        );
        assert_eq!(session.authentication_status, AuthStatus::Failed);
    }

    #[test]
    fn test_login_is_case_insensitive_on_username() {
        let auth = authenticator();
        let mut session = SessionState::new();
        auth.login(&mut session, &LoginInput::new("JSmith", "s3cret-pw"))
            .unwrap();
        assert_eq!(session.username.as_deref(), Some("jsmith"));
    }

    #[test]
    fn test_valid_cookie_restores_without_prompt() {
        let auth = authenticator();
        let mut first = SessionState::new();
        auth.login(&mut first, &LoginInput::new("jsmith", "s3cret-pw"))
            .unwrap();

        // A new browser session carrying the same cookie jar
        let mut second = SessionState::with_cookies(first.cookies.clone());
        let mut prompt = Scripted::default();

        assert_eq!(
            auth.authenticate(&mut second, &mut prompt),
            AuthResult::Authenticated
        );
        assert!(prompt.forms.is_empty());
        assert_eq!(second.username.as_deref(), Some("jsmith"));
    }

    #[test]
    fn test_expired_cookie_is_dropped_and_prompts() {
        let auth = authenticator();
        let issued = Utc::now() - Duration::days(31);
        let token = auth.config().cookie.issue("jsmith", issued).unwrap();
        let mut session = SessionState::new();
        session.cookies.set("dashgate_auth", token);
        let mut prompt = Scripted::default();

        assert_eq!(
            auth.authenticate(&mut session, &mut prompt),
            AuthResult::LoginPromptRendered
        );
        assert!(!session.is_authenticated());
        assert!(session.cookies.get("dashgate_auth").is_none());
        assert_eq!(
            prompt.forms[0].error.as_deref(),
            Some("Your session has expired, please log in again")
        );
    }

    #[test]
    fn test_cookie_for_removed_user_is_rejected() {
        let auth = authenticator();
        let token = auth.config().cookie.issue("ghost", Utc::now()).unwrap();
        let mut session = SessionState::new();
        session.cookies.set("dashgate_auth", token);

        let err = auth.restore_from_cookie(&mut session).unwrap_err();
        assert!(matches!(err, AuthFailure::CookieRejected(_)));
        assert!(session.cookies.is_empty());
    }

    #[test]
    fn test_logout_clears_status_and_cookie() {
        let auth = authenticator();
        let mut session = SessionState::new();
        auth.login(&mut session, &LoginInput::new("jsmith", "s3cret-pw"))
            .unwrap();

        auth.logout(&mut session);

        assert_eq!(session.authentication_status, AuthStatus::Unknown);
        assert!(session.username.is_none());
        assert!(session.cookies.get("dashgate_auth").is_none());
        let mut prompt = Scripted::default();
        assert_eq!(
            auth.authenticate(&mut session, &mut prompt),
            AuthResult::LoginPromptRendered
        );
    }

    #[test]
    fn test_unrepresentable_cookie_expiry_does_not_panic() {
        let mut users = HashMap::new();
        users.insert(
            "ada".to_string(),
            UserRecord {
                name: "Ada".to_string(),
                email: None,
                password: hash_password("analytical").unwrap(),
            },
        );
        // Built directly, skipping the validation that would reject it
        let config = AuthConfig::new(
            Credentials::new(users),
            CookiePolicy {
                name: "dashgate_auth".to_string(),
                key: "k".to_string(),
                expiry_days: 4_000_000_000,
            },
        );
        let auth = Authenticator::new(Arc::new(config));
        let mut session = SessionState::new();

        auth.login(&mut session, &LoginInput::new("ada", "analytical"))
            .unwrap();

        assert!(session.is_authenticated());
        assert!(session.cookies.get("dashgate_auth").is_none());
    }

    #[test]
    fn test_empty_credentials_always_fail() {
        let config = AuthConfig::new(
            Credentials::default(),
            CookiePolicy {
                name: "c".to_string(),
                key: "k".to_string(),
                expiry_days: 1,
            },
        );
        let auth = Authenticator::new(Arc::new(config));
        let mut session = SessionState::new();
        for (user, pw) in [("admin", "admin"), ("jsmith", "s3cret-pw"), ("x", "y")] {
            assert!(auth.login(&mut session, &LoginInput::new(user, pw)).is_err());
            assert_eq!(session.authentication_status, AuthStatus::Failed);
        }
    }
}
