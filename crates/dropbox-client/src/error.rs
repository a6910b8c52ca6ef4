//! Error types for client and session operations

/// Errors from building clients and managing the linked session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client is already authorized; unlink first")]
    AlreadyAuthorized,

    #[error(transparent)]
    Auth(#[from] dropbox_auth::Error),

    #[error("HTTP client setup failed: {0}")]
    Transport(#[from] babel_rpc::TransportError),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
