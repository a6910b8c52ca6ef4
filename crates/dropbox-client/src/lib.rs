//! Dropbox API client
//!
//! `DropboxClient` wraps a Babel client with bearer-token authentication and
//! exposes typed route namespaces (`users`). `DropboxSession` ties the client
//! to the link flow: it restores a stored account at startup, links new
//! accounts from redirects, and unlinks.
//!
//! Session lifecycle:
//! 1. `DropboxSession::setup()` builds the auth manager and restores the
//!    first stored token, if any
//! 2. Unlinked: `authorize()` starts the link flow
//! 3. `handle_redirect_url()` stores the token and installs the client
//! 4. `unlink()` clears stored tokens and drops the client

pub mod auth;
pub mod client;
pub mod error;
pub mod session;
pub mod users;
pub mod users_routes;

pub use auth::BearerAuth;
pub use client::DropboxClient;
pub use error::{Error, Result};
pub use session::DropboxSession;
pub use users_routes::UsersRoutes;
