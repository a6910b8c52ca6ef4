//! Secure token storage
//!
//! `SecureStorage` is the platform seam: a flat (service, account) -> value
//! store. `FileStorage` keeps everything in one JSON file written atomically
//! (temp file + rename, mode 0600). `MemoryStorage` is for tests and hosts
//! that don't persist. `Keychain` scopes a backend to one service label.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{LINK_STATE_SERVICE_SUFFIX, TOKEN_SERVICE_SUFFIX};
use crate::error::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// service -> account -> value
type Entries = BTreeMap<String, BTreeMap<String, String>>;

/// Backend for secret key/value pairs, namespaced by service.
///
/// Accounts are returned in sorted order.
pub trait SecureStorage: Send + Sync {
    /// Insert or replace a value.
    fn set<'a>(
        &'a self,
        service: &'a str,
        account: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    fn get<'a>(&'a self, service: &'a str, account: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    fn accounts<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Remove one value. Returns whether it existed.
    fn delete<'a>(&'a self, service: &'a str, account: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Remove every value under `service`. Returns whether anything was removed.
    fn clear<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// JSON-file backed storage.
///
/// The Mutex serializes all access; every mutation is persisted before the
/// lock is released.
pub struct FileStorage {
    path: PathBuf,
    state: Mutex<Entries>,
}

impl FileStorage {
    /// Load the store from `path`, creating it as `{}` if it doesn't exist.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token store: {e}")))?;
            let entries: Entries = serde_json::from_str(&contents)
                .map_err(|e| Error::StorageParse(format!("parsing token store: {e}")))?;
            info!(path = %path.display(), services = entries.len(), "loaded token store");
            entries
        } else {
            info!(path = %path.display(), "token store not found, starting empty");
            let entries = Entries::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecureStorage for FileStorage {
    fn set<'a>(
        &'a self,
        service: &'a str,
        account: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state
                .entry(service.to_string())
                .or_default()
                .insert(account.to_string(), value.to_string());
            debug!(service, account, "stored secret");
            write_atomic(&self.path, &state).await
        })
    }

    fn get<'a>(
        &'a self,
        service: &'a str,
        account: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.get(service).and_then(|s| s.get(account)).cloned())
        })
    }

    fn accounts<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .get(service)
                .map(|s| s.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn delete<'a>(&'a self, service: &'a str, account: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(entries) = state.get_mut(service) else {
                return Ok(false);
            };
            if entries.remove(account).is_none() {
                return Ok(false);
            }
            if entries.is_empty() {
                state.remove(service);
            }
            debug!(service, account, "deleted secret");
            write_atomic(&self.path, &state).await?;
            Ok(true)
        })
    }

    fn clear<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(service).is_none() {
                return Ok(false);
            }
            debug!(service, "cleared service");
            write_atomic(&self.path, &state).await?;
            Ok(true)
        })
    }
}

/// Write the store atomically with 0600 permissions.
async fn write_atomic(path: &Path, data: &Entries) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::StorageParse(format!("serializing token store: {e}")))?;

    let tmp_path = temp_path(path)?;

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token store: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token store permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token store: {e}")))?;

    debug!(path = %path.display(), "persisted token store");
    Ok(())
}

/// Sibling temp file, unique per target file and process.
fn temp_path(path: &Path) -> Result<PathBuf> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token store path has no parent directory".into()))?;
    let name = path
        .file_name()
        .ok_or_else(|| Error::Io(format!("token store path {} has no file name", path.display())))?;
    Ok(dir.join(format!(
        ".{}.tmp.{}",
        name.to_string_lossy(),
        std::process::id()
    )))
}

/// In-process storage. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<Entries>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemoryStorage {
    fn set<'a>(
        &'a self,
        service: &'a str,
        account: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .entry(service.to_string())
                .or_default()
                .insert(account.to_string(), value.to_string());
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        service: &'a str,
        account: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.get(service).and_then(|s| s.get(account)).cloned())
        })
    }

    fn accounts<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .get(service)
                .map(|s| s.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn delete<'a>(&'a self, service: &'a str, account: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            Ok(state
                .get_mut(service)
                .and_then(|s| s.remove(account))
                .is_some())
        })
    }

    fn clear<'a>(&'a self, service: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.state.lock().await.remove(service).is_some()) })
    }
}

/// A storage backend scoped to a single service label.
#[derive(Clone)]
pub struct Keychain {
    service: String,
    backend: Arc<dyn SecureStorage>,
}

impl Keychain {
    /// Token store for an app: service `<bundle_id>.dropbox.authv2`.
    pub fn tokens(bundle_id: &str, backend: Arc<dyn SecureStorage>) -> Self {
        Self::with_service(format!("{bundle_id}{TOKEN_SERVICE_SUFFIX}"), backend)
    }

    /// Link state store for an app: service `<bundle_id>.dropbox.sync`.
    pub fn link_state(bundle_id: &str, backend: Arc<dyn SecureStorage>) -> Self {
        Self::with_service(format!("{bundle_id}{LINK_STATE_SERVICE_SUFFIX}"), backend)
    }

    pub fn with_service(service: impl Into<String>, backend: Arc<dyn SecureStorage>) -> Self {
        Self {
            service: service.into(),
            backend,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Replace any existing value for `key`.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.backend.delete(&self.service, key).await?;
        self.backend.set(&self.service, key, value).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(&self.service, key).await
    }

    /// All keys under this service, sorted.
    pub async fn get_all(&self) -> Result<Vec<String>> {
        self.backend.accounts(&self.service).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(&self.service, key).await
    }

    pub async fn clear(&self) -> Result<bool> {
        self.backend.clear(&self.service).await
    }
}
