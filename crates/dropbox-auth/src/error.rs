//! Error types for the link flow and token storage

/// Errors from link flow and token store operations.
///
/// OAuth2 failures reported by the server are not errors here; they arrive
/// as `LinkResult::Error`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to link: app isn't registered for URL scheme {0}")]
    UrlSchemeNotRegistered(String),

    #[error("unable to link: app isn't registered to query for URL scheme {0}")]
    QueriesSchemeMissing(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("storage parse error: {0}")]
    StorageParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
