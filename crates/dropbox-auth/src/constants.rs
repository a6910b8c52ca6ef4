//! Dropbox link flow constants
//!
//! Public identifiers only. Tokens live in the secure store, never here.

/// Path of the implicit-grant authorization endpoint on the auth host.
pub const AUTHORIZE_PATH: &str = "/1/oauth2/authorize";

/// URL scheme of the sibling Dropbox app that accepts dauth handoffs.
pub const DAUTH_SCHEME: &str = "dbapi-2";

/// Suffix appended to the bundle id to form the token store's service label.
pub const TOKEN_SERVICE_SUFFIX: &str = ".dropbox.authv2";

/// Suffix for the service holding link state (the dauth nonce).
pub const LINK_STATE_SERVICE_SUFFIX: &str = ".dropbox.sync";

/// Key under which the pending dauth nonce is stored.
pub const LINK_NONCE_KEY: &str = "dropbox.sync.nonce";

/// Prefix of the `state` value sent with a dauth handoff.
pub const DAUTH_STATE_PREFIX: &str = "oauth2";

/// URL scheme the host app must register to receive redirects.
pub fn app_scheme(app_key: &str) -> String {
    format!("db-{app_key}")
}
