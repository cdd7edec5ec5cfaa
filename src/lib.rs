//! Session authentication gate and activity logging for multi-page dashboards.
//!
//! Pages are [`gate::Handler`]s registered in a [`pages::PageRegistry`].
//! Protected pages are wrapped so that every invocation is first recorded in
//! the session's activity log and then authenticated; the page itself only
//! runs for an authenticated session.

pub mod activity;
pub mod auth;
pub mod config;
pub mod cookie;
pub mod credentials;
pub mod gate;
pub mod pages;
pub mod session;
pub mod transcript;
