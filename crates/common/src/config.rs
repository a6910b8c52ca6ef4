//! SDK configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The app key may be
//! overridden with `DROPBOX_APP_KEY` so the same file can be shared between
//! development and release builds.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    pub app: AppConfig,
    #[serde(default)]
    pub hosts: HostsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Application identity and the URL schemes the host app declares
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_key: String,
    /// Host serving the OAuth2 consent page
    #[serde(default = "default_auth_host")]
    pub auth_host: String,
    /// Namespace for stored credentials (bundle identifier on mobile)
    #[serde(default = "default_bundle_id")]
    pub bundle_id: String,
    /// URL schemes registered by the host application for inbound redirects
    #[serde(default)]
    pub url_schemes: Vec<String>,
    /// URL schemes the host application is allowed to query
    #[serde(default)]
    pub queries_schemes: Vec<String>,
}

/// Base URLs for the API host names used by routes
#[derive(Debug, Clone, Deserialize)]
pub struct HostsConfig {
    #[serde(default = "default_meta_host")]
    pub meta: String,
    #[serde(default = "default_content_host")]
    pub content: String,
    #[serde(default = "default_notify_host")]
    pub notify: String,
}

/// Where linked access tokens are persisted
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

/// HTTP transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Connect and idle-read timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// PEM root bundles trusted instead of the built-in roots
    #[serde(default)]
    pub pinned_roots: Vec<PathBuf>,
    /// PEM CRL bundles; only honoured together with `pinned_roots`
    #[serde(default)]
    pub revocation_lists: Vec<PathBuf>,
}

fn default_auth_host() -> String {
    "www.dropbox.com".into()
}

fn default_bundle_id() -> String {
    "dropbox-sdk".into()
}

fn default_meta_host() -> String {
    "https://api.dropbox.com/2".into()
}

fn default_content_host() -> String {
    "https://api-content.dropbox.com/2".into()
}

fn default_notify_host() -> String {
    "https://notify.dropboxapi.com/2".into()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("dropbox-credentials.json")
}

fn default_timeout() -> u64 {
    60
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            meta: default_meta_host(),
            content: default_content_host(),
            notify: default_notify_host(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            pinned_roots: Vec::new(),
            revocation_lists: Vec::new(),
        }
    }
}

impl HostsConfig {
    /// Host name → base URL map consumed by the RPC client.
    pub fn base_hosts(&self) -> HashMap<String, String> {
        HashMap::from([
            ("meta".to_string(), self.meta.clone()),
            ("content".to_string(), self.content.clone()),
            ("notify".to_string(), self.notify.clone()),
        ])
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SdkConfig {
    /// Minimal configuration for an app key with every other field defaulted.
    pub fn for_app_key(app_key: impl Into<String>) -> Self {
        Self {
            app: AppConfig {
                app_key: app_key.into(),
                auth_host: default_auth_host(),
                bundle_id: default_bundle_id(),
                url_schemes: Vec::new(),
                queries_schemes: Vec::new(),
            },
            hosts: HostsConfig::default(),
            storage: StorageConfig::default(),
            http: HttpConfig::default(),
        }
    }

    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: SdkConfig = toml::from_str(&contents)?;

        if let Ok(key) = std::env::var("DROPBOX_APP_KEY") {
            debug!("app_key overridden by DROPBOX_APP_KEY");
            config.app.app_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at link or request time.
    pub fn validate(&self) -> Result<()> {
        if self.app.app_key.trim().is_empty() {
            return Err(Error::Config("app_key must not be empty".into()));
        }

        if self.app.auth_host.contains("://") || self.app.auth_host.contains('/') {
            return Err(Error::Config(format!(
                "auth_host must be a bare host name, got: {}",
                self.app.auth_host
            )));
        }

        for (name, url) in [
            ("meta", &self.hosts.meta),
            ("content", &self.hosts.content),
            ("notify", &self.hosts.notify),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "hosts.{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.http.pinned_roots.is_empty() && !self.http.revocation_lists.is_empty() {
            return Err(Error::Config(
                "http.revocation_lists requires http.pinned_roots".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or DROPBOX_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("DROPBOX_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("dropbox.toml")
    }
}
