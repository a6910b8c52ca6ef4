//! Common types shared by the Dropbox SDK crates

mod config;
mod error;
mod secret;

pub use config::{AppConfig, HostsConfig, HttpConfig, SdkConfig, StorageConfig};
pub use error::{Error, Result};
pub use secret::Secret;
