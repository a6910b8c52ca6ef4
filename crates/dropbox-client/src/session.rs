//! Linked session: the auth manager plus the client for the linked account
//!
//! A host app creates one `DropboxSession` at startup and keeps it for the
//! life of the process. If a token is already stored, the session starts
//! linked.

use std::sync::Arc;

use babel_rpc::HttpTransport;
use common::SdkConfig;
use dropbox_auth::{AuthManager, HostApp, Keychain, LinkResult, LinkStart, SecureStorage, Url};
use tracing::info;

use crate::client::{DropboxClient, reqwest_transport};
use crate::error::{Error, Result};

pub struct DropboxSession {
    auth: AuthManager,
    transport: Arc<dyn HttpTransport>,
    config: SdkConfig,
    client: Option<DropboxClient>,
}

impl DropboxSession {
    /// Build a session over a `reqwest` transport.
    pub async fn setup(
        config: SdkConfig,
        storage: Arc<dyn SecureStorage>,
        host_app: Arc<dyn HostApp>,
    ) -> Result<Self> {
        let transport = Arc::new(reqwest_transport(&config)?);
        Self::setup_with_transport(config, storage, host_app, transport).await
    }

    pub async fn setup_with_transport(
        config: SdkConfig,
        storage: Arc<dyn SecureStorage>,
        host_app: Arc<dyn HostApp>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let auth = AuthManager::new(
            config.app.app_key.clone(),
            config.app.auth_host.clone(),
            Keychain::tokens(&config.app.bundle_id, storage.clone()),
            Keychain::link_state(&config.app.bundle_id, storage),
            host_app,
        )?;

        let client = auth.get_first_access_token().await?.map(|token| {
            info!(user_id = token.user_id(), "restored linked account");
            DropboxClient::new(token, transport.clone(), config.hosts.base_hosts())
        });

        Ok(Self {
            auth,
            transport,
            config,
            client,
        })
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Client for the linked account, if any.
    pub fn client(&self) -> Option<&DropboxClient> {
        self.client.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.client.is_some()
    }

    /// Start linking. Fails with `AlreadyAuthorized` if linked.
    pub async fn authorize(&self) -> Result<LinkStart> {
        if self.is_linked() {
            return Err(Error::AlreadyAuthorized);
        }
        Ok(self.auth.authorize().await?)
    }

    /// Handle a link redirect; a successful result links the session.
    pub async fn handle_redirect_url(&mut self, url: &Url) -> Result<Option<LinkResult>> {
        if self.is_linked() {
            return Err(Error::AlreadyAuthorized);
        }
        let result = self.auth.handle_redirect_url(url).await?;
        if let Some(LinkResult::Success(token)) = &result {
            self.client = Some(DropboxClient::new(
                token.clone(),
                self.transport.clone(),
                self.config.hosts.base_hosts(),
            ));
        }
        Ok(result)
    }

    /// Forget every stored token and drop the client. No-op when unlinked.
    pub async fn unlink(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        self.auth.clear_stored_access_tokens().await?;
        info!(user_id = client.user_id(), "unlinked account");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{FULL_ACCOUNT, MockTransport};
    use dropbox_auth::{AccessToken, MemoryStorage, NavigationInterceptor};
    use reqwest::header::AUTHORIZATION;

    struct WebOnlyHost;

    impl HostApp for WebOnlyHost {
        fn url_schemes(&self) -> Vec<String> {
            vec!["db-appkey".into()]
        }

        fn queries_schemes(&self) -> Vec<String> {
            vec!["dbapi-2".into()]
        }

        fn can_open_url(&self, _url: &Url) -> bool {
            false
        }

        fn open_url(&self, _url: &Url) -> bool {
            true
        }

        fn present_consent_page(&self, _url: &Url, _interceptor: NavigationInterceptor) {}
    }

    fn config() -> SdkConfig {
        let mut config = SdkConfig::for_app_key("appkey");
        config.app.bundle_id = "com.example".into();
        config
    }

    async fn session(
        storage: Arc<dyn SecureStorage>,
        transport: Arc<MockTransport>,
    ) -> DropboxSession {
        DropboxSession::setup_with_transport(config(), storage, Arc::new(WebOnlyHost), transport)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn starts_unlinked_without_tokens() {
        let session = session(
            Arc::new(MemoryStorage::new()),
            MockTransport::new(200, FULL_ACCOUNT),
        )
        .await;
        assert!(!session.is_linked());
        assert!(matches!(
            session.authorize().await.unwrap(),
            LinkStart::ConsentPage(_)
        ));
    }

    #[tokio::test]
    async fn restores_stored_token() {
        let storage: Arc<dyn SecureStorage> = Arc::new(MemoryStorage::new());
        Keychain::tokens("com.example", storage.clone())
            .set("dbid:me", "sl.stored")
            .await
            .unwrap();

        let transport = MockTransport::new(200, FULL_ACCOUNT);
        let session = session(storage, transport.clone()).await;
        let client = session.client().unwrap();
        assert_eq!(client.user_id(), "dbid:me");

        client
            .users()
            .get_current_account()
            .response()
            .await
            .unwrap();
        assert_eq!(
            transport.sent.lock().unwrap()[0].headers[AUTHORIZATION],
            "Bearer sl.stored"
        );
    }

    #[tokio::test]
    async fn redirect_links_and_blocks_second_link() {
        let mut session = session(
            Arc::new(MemoryStorage::new()),
            MockTransport::new(200, FULL_ACCOUNT),
        )
        .await;

        let redirect = Url::parse("db-appkey://2/token#access_token=abc&uid=123").unwrap();
        let result = session.handle_redirect_url(&redirect).await.unwrap();
        assert_eq!(
            result,
            Some(LinkResult::Success(AccessToken::new("abc", "123")))
        );
        assert_eq!(session.client().unwrap().user_id(), "123");

        assert!(matches!(
            session.authorize().await,
            Err(Error::AlreadyAuthorized)
        ));
        assert!(matches!(
            session.handle_redirect_url(&redirect).await,
            Err(Error::AlreadyAuthorized)
        ));
    }

    #[tokio::test]
    async fn failed_redirect_stays_unlinked() {
        let mut session = session(
            Arc::new(MemoryStorage::new()),
            MockTransport::new(200, FULL_ACCOUNT),
        )
        .await;
        let redirect = Url::parse("db-appkey://2/token#error=access_denied").unwrap();
        let result = session.handle_redirect_url(&redirect).await.unwrap();
        assert!(matches!(result, Some(LinkResult::Error(..))));
        assert!(!session.is_linked());
    }

    #[tokio::test]
    async fn unlink_clears_tokens() {
        let storage: Arc<dyn SecureStorage> = Arc::new(MemoryStorage::new());
        let mut session = session(storage.clone(), MockTransport::new(200, FULL_ACCOUNT)).await;

        // no-op while unlinked
        session.unlink().await.unwrap();

        let redirect = Url::parse("db-appkey://2/token#access_token=abc&uid=123").unwrap();
        session.handle_redirect_url(&redirect).await.unwrap();
        assert!(session.is_linked());

        session.unlink().await.unwrap();
        assert!(!session.is_linked());
        assert!(!session.auth().has_stored_access_tokens().await.unwrap());

        let reopened = self::session(storage, MockTransport::new(200, FULL_ACCOUNT)).await;
        assert!(!reopened.is_linked());
    }
}
