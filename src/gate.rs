//! Access gate: middleware wrappers for page handlers.
//!
//! `gate(page)` is `LogActivity(RequireAuth(page))`. The access entry is
//! recorded before authentication is checked, so attempts by unauthenticated
//! sessions show up in the activity log as well.

use crate::activity::ActivityLogger;
use crate::auth::{AuthResult, Authenticator, LoginPrompt};
use crate::session::SessionState;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Query parameters of a request
pub type Params = BTreeMap<String, String>;

/// Everything a handler sees during one request cycle
pub struct Request<'a> {
    pub session: &'a mut SessionState,
    pub prompt: &'a mut dyn LoginPrompt,
    pub params: Params,
}

impl<'a> Request<'a> {
    pub fn new(session: &'a mut SessionState, prompt: &'a mut dyn LoginPrompt) -> Self {
        Self {
            session,
            prompt,
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Result of invoking a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The handler ran; its output is passed through untouched
    Rendered(T),
    /// The request stopped at the login prompt
    LoginRequired,
}

impl<T> Outcome<T> {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Rendered(value) => Outcome::Rendered(f(value)),
            Self::LoginRequired => Outcome::LoginRequired,
        }
    }
}

/// A page render entry point
pub trait Handler {
    type Output;

    /// Identifying name, used for activity log entries
    fn name(&self) -> &str;

    fn handle(&self, req: &mut Request<'_>) -> Outcome<Self::Output>;
}

/// Handler backed by a plain function
pub struct FnHandler<F> {
    name: String,
    f: F,
}

pub fn handler_fn<F, T>(name: &str, f: F) -> FnHandler<F>
where
    F: Fn(&mut Request<'_>) -> T,
{
    FnHandler {
        name: name.to_string(),
        f,
    }
}

impl<F, T> Handler for FnHandler<F>
where
    F: Fn(&mut Request<'_>) -> T,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, req: &mut Request<'_>) -> Outcome<T> {
        Outcome::Rendered((self.f)(req))
    }
}

/// Records an access entry, then delegates unconditionally
pub struct LogActivity<H> {
    inner: H,
    logger: Arc<ActivityLogger>,
}

impl<H: Handler> Handler for LogActivity<H> {
    type Output = H::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn handle(&self, req: &mut Request<'_>) -> Outcome<H::Output> {
        self.logger.record(&mut *req.session, self.inner.name());
        self.inner.handle(req)
    }
}

/// Runs the inner handler only for authenticated sessions
pub struct RequireAuth<H> {
    inner: H,
    authenticator: Arc<Authenticator>,
}

impl<H: Handler> Handler for RequireAuth<H> {
    type Output = H::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn handle(&self, req: &mut Request<'_>) -> Outcome<H::Output> {
        match self.authenticator.authenticate(&mut *req.session, &mut *req.prompt) {
            AuthResult::Authenticated => self.inner.handle(req),
            AuthResult::LoginPromptRendered => Outcome::LoginRequired,
        }
    }
}

pub fn logged<H: Handler>(inner: H, logger: Arc<ActivityLogger>) -> LogActivity<H> {
    LogActivity { inner, logger }
}

pub fn require_auth<H: Handler>(inner: H, authenticator: Arc<Authenticator>) -> RequireAuth<H> {
    RequireAuth {
        inner,
        authenticator,
    }
}

/// Wrap `inner` with activity logging and authentication, in that order
pub fn gate<H: Handler>(
    inner: H,
    authenticator: Arc<Authenticator>,
    logger: Arc<ActivityLogger>,
) -> LogActivity<RequireAuth<H>> {
    logged(require_auth(inner, authenticator), logger)
}
