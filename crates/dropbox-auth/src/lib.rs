//! Dropbox account linking
//!
//! OAuth2 implicit-grant link flow (hosted consent page or handoff to the
//! Dropbox app), redirect parsing, and secure storage of the resulting
//! access tokens keyed by user id.
//!
//! Link flow:
//! 1. Host calls `AuthManager::authorize()`
//! 2. The Dropbox app or the consent page redirects to `db-<app_key>://...`
//! 3. Host passes that URL to `AuthManager::handle_redirect_url()`
//! 4. On success the token is stored in the `Keychain` and returned

pub mod constants;
pub mod error;
pub mod keychain;
pub mod link;
pub mod oauth2;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use keychain::{FileStorage, Keychain, MemoryStorage, SecureStorage};
pub use link::{AuthManager, HostApp, LinkStart, NavigationInterceptor, NavigationPolicy};
pub use oauth2::{LinkResult, OAuth2Error};
pub use token::AccessToken;
pub use url::Url;
