//! Errors raised while loading SDK configuration

use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading error
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = Error::Config("app_key must not be empty".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: app_key must not be empty"
        );
    }

    #[test]
    fn read_error_names_the_path() {
        let err = Error::Read {
            path: PathBuf::from("/etc/dropbox.toml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/dropbox.toml"), "got: {msg}");
        assert!(msg.contains("file not found"), "got: {msg}");
    }
}
