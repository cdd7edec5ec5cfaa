//! Page routing.
//!
//! Each page is registered once with an access policy; the registry applies
//! the matching middleware at registration time.

pub mod about;
pub mod dashboard;
pub mod home;

use crate::activity::ActivityLogger;
use crate::auth::Authenticator;
use crate::gate::{gate, logged, Handler, Outcome, Request};
use dashboard::{DashboardPage, Dataset};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// What a page render produces
pub type PageResult = anyhow::Result<String>;

type BoxedPage = Box<dyn Handler<Output = PageResult> + Send + Sync>;

/// How a page is protected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Served as-is
    Public,
    /// Access is logged, no authentication
    Logged,
    /// Logged, then authenticated
    Protected,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Logged => "logged",
            Self::Protected => "protected",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown page '{route}' (available: {})", .available.join(", "))]
pub struct UnknownRoute {
    pub route: String,
    pub available: Vec<String>,
}

struct Route {
    access: Access,
    page: BoxedPage,
}

pub struct PageRegistry {
    routes: BTreeMap<String, Route>,
    authenticator: Arc<Authenticator>,
    logger: Arc<ActivityLogger>,
}

impl PageRegistry {
    pub fn new(authenticator: Arc<Authenticator>, logger: Arc<ActivityLogger>) -> Self {
        Self {
            routes: BTreeMap::new(),
            authenticator,
            logger,
        }
    }

    /// Registry with the home, about and dashboard pages
    pub fn with_default_pages(
        authenticator: Arc<Authenticator>,
        logger: Arc<ActivityLogger>,
        dataset: Arc<Dataset>,
    ) -> Self {
        let mut registry = Self::new(authenticator, logger);
        registry.register(Access::Public, home::page());
        registry.register(Access::Logged, about::page());
        registry.register(Access::Protected, DashboardPage::new(dataset));
        registry
    }

    /// Register `page` under its own name
    pub fn register<H>(&mut self, access: Access, page: H)
    where
        H: Handler<Output = PageResult> + Send + Sync + 'static,
    {
        let route = normalize_route(page.name());
        let page: BoxedPage = match access {
            Access::Public => Box::new(page),
            Access::Logged => Box::new(logged(page, self.logger.clone())),
            Access::Protected => Box::new(gate(
                page,
                self.authenticator.clone(),
                self.logger.clone(),
            )),
        };
        self.routes.insert(route, Route { access, page });
    }

    pub fn routes(&self) -> Vec<(&str, Access)> {
        self.routes
            .iter()
            .map(|(name, route)| (name.as_str(), route.access))
            .collect()
    }

    /// Render the page at `route`. Errors raised by the page itself are
    /// returned unchanged.
    pub fn render(&self, route: &str, req: &mut Request<'_>) -> anyhow::Result<Outcome<String>> {
        let key = normalize_route(route);
        let Some(entry) = self.routes.get(&key) else {
            return Err(UnknownRoute {
                route: key,
                available: self.routes.keys().cloned().collect(),
            }
            .into());
        };
        match entry.page.handle(req) {
            Outcome::Rendered(result) => Ok(Outcome::Rendered(result?)),
            Outcome::LoginRequired => Ok(Outcome::LoginRequired),
        }
    }
}

fn normalize_route(route: &str) -> String {
    route.trim().trim_start_matches('/').to_lowercase()
}
