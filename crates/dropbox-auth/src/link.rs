//! Account linking
//!
//! Two ways to link. If the Dropbox app is installed, the host hands off to it
//! with a `dbapi-2://1/connect` URL carrying a one-time nonce, and the Dropbox
//! app redirects back to `db-<app_key>://1/connect`. Otherwise the host shows
//! the hosted consent page, which redirects to `db-<app_key>://2/token` with
//! the result in the URL fragment.
//!
//! Either redirect ends up in `AuthManager::handle_redirect_url`, which turns
//! it into a `LinkResult` and stores the token on success.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::constants::{
    AUTHORIZE_PATH, DAUTH_SCHEME, DAUTH_STATE_PREFIX, LINK_NONCE_KEY, app_scheme,
};
use crate::error::{Error, Result};
use crate::keychain::Keychain;
use crate::oauth2::{LinkResult, OAuth2Error, decode_description, parse_pairs};
use crate::token::AccessToken;

/// Host application services the link flow depends on.
///
/// This is where the platform's URL handling and UI live.
pub trait HostApp: Send + Sync {
    /// URL schemes the host is registered to receive.
    fn url_schemes(&self) -> Vec<String>;

    /// URL schemes the host is allowed to probe with `can_open_url`.
    fn queries_schemes(&self) -> Vec<String>;

    fn can_open_url(&self, url: &Url) -> bool;

    /// Open `url` in whichever app handles it. Returns whether it was opened.
    fn open_url(&self, url: &Url) -> bool;

    /// Show the hosted consent page at `url`. The page must consult
    /// `interceptor` before following each navigation.
    fn present_consent_page(&self, url: &Url, interceptor: NavigationInterceptor);
}

/// How the consent page should treat a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPolicy {
    Allow,
    Cancel,
}

/// How `authorize` started the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStart {
    /// Handed off to the Dropbox app with this URL.
    Handoff(Url),
    /// Presented the hosted consent page at this URL.
    ConsentPage(Url),
}

#[derive(Clone)]
struct RedirectTemplates {
    token: Url,
    connect: Url,
}

impl RedirectTemplates {
    fn new(app_key: &str) -> Result<Self> {
        let scheme = app_scheme(app_key);
        Ok(Self {
            token: parse_url(&format!("{scheme}://2/token"))?,
            connect: parse_url(&format!("{scheme}://1/connect"))?,
        })
    }

    fn matches(&self, url: &Url) -> bool {
        [&self.token, &self.connect].into_iter().any(|known| {
            url.scheme() == known.scheme()
                && url.host_str() == known.host_str()
                && url.path() == known.path()
        })
    }
}

/// Decides consent-page navigations. Redirects meant for the app are
/// cancelled in the page and re-opened through the host app so they reach
/// `handle_redirect_url`.
#[derive(Clone)]
pub struct NavigationInterceptor {
    redirects: RedirectTemplates,
    host_app: Arc<dyn HostApp>,
}

impl NavigationInterceptor {
    pub fn decide(&self, url: &Url) -> NavigationPolicy {
        if self.redirects.matches(url) {
            debug!(scheme = url.scheme(), "intercepted link redirect");
            self.host_app.open_url(url);
            NavigationPolicy::Cancel
        } else {
            NavigationPolicy::Allow
        }
    }
}

/// Drives the link flow and manages stored tokens.
pub struct AuthManager {
    app_key: String,
    host: String,
    redirects: RedirectTemplates,
    keychain: Keychain,
    state_store: Keychain,
    host_app: Arc<dyn HostApp>,
}

impl AuthManager {
    /// `host` serves the consent page (normally `www.dropbox.com`).
    /// `keychain` holds tokens keyed by user id; `state_store` holds the
    /// pending dauth nonce.
    pub fn new(
        app_key: impl Into<String>,
        host: impl Into<String>,
        keychain: Keychain,
        state_store: Keychain,
        host_app: Arc<dyn HostApp>,
    ) -> Result<Self> {
        let app_key = app_key.into();
        let redirects = RedirectTemplates::new(&app_key)?;
        Ok(Self {
            app_key,
            host: host.into(),
            redirects,
            keychain,
            state_store,
            host_app,
        })
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Redirect URI registered for the hosted consent page.
    pub fn redirect_url(&self) -> &Url {
        &self.redirects.token
    }

    /// Hosted consent page URL.
    pub fn auth_url(&self) -> Result<Url> {
        Url::parse_with_params(
            &format!("https://{}{AUTHORIZE_PATH}", self.host),
            [
                ("response_type", "token"),
                ("client_id", self.app_key.as_str()),
                ("redirect_uri", self.redirects.token.as_str()),
                ("disable_signup", "true"),
            ],
        )
        .map_err(|e| Error::InvalidUrl(format!("authorize URL for host {}: {e}", self.host)))
    }

    /// Dropbox app handoff URL. Without a nonce this is only used to probe
    /// whether the Dropbox app is installed.
    pub fn dauth_url(&self, nonce: Option<&str>) -> Result<Url> {
        let mut url = parse_url(&format!("{DAUTH_SCHEME}://1/connect"))?;
        if let Some(nonce) = nonce {
            url.query_pairs_mut()
                .append_pair("k", &self.app_key)
                .append_pair("s", "")
                .append_pair("state", &format!("{DAUTH_STATE_PREFIX}:{nonce}"));
        }
        Ok(url)
    }

    /// Whether `url` is one of this app's link redirects.
    pub fn can_handle_url(&self, url: &Url) -> bool {
        self.redirects.matches(url)
    }

    /// Start linking an account.
    ///
    /// Fails without side effects if the host app's URL scheme registration
    /// is incomplete.
    pub async fn authorize(&self) -> Result<LinkStart> {
        let scheme = app_scheme(&self.app_key);
        if !self.host_app.url_schemes().contains(&scheme) {
            return Err(Error::UrlSchemeNotRegistered(scheme));
        }
        if !self
            .host_app
            .queries_schemes()
            .iter()
            .any(|s| s == DAUTH_SCHEME)
        {
            return Err(Error::QueriesSchemeMissing(DAUTH_SCHEME.to_string()));
        }

        if self.host_app.can_open_url(&self.dauth_url(None)?) {
            let nonce = Uuid::new_v4().to_string();
            self.state_store.set(LINK_NONCE_KEY, &nonce).await?;
            let url = self.dauth_url(Some(&nonce))?;
            info!("handing off link to Dropbox app");
            if !self.host_app.open_url(&url) {
                warn!("host app failed to open Dropbox app handoff URL");
            }
            Ok(LinkStart::Handoff(url))
        } else {
            let url = self.auth_url()?;
            info!(host = %self.host, "presenting consent page");
            self.host_app
                .present_consent_page(&url, self.navigation_interceptor());
            Ok(LinkStart::ConsentPage(url))
        }
    }

    pub fn navigation_interceptor(&self) -> NavigationInterceptor {
        NavigationInterceptor {
            redirects: self.redirects.clone(),
            host_app: self.host_app.clone(),
        }
    }

    /// Handle a redirect back into the app.
    ///
    /// Returns `Ok(None)` if `url` is not a link redirect for this app. On
    /// success the token has been stored before this returns.
    pub async fn handle_redirect_url(&self, url: &Url) -> Result<Option<LinkResult>> {
        if !self.can_handle_url(url) {
            return Ok(None);
        }

        let result = if url.host_str() == Some("1") {
            self.extract_from_dauth_url(url).await?
        } else {
            extract_from_redirect_url(url)
        };

        match &result {
            LinkResult::Success(token) => {
                self.store_access_token(token).await?;
                info!(user_id = token.user_id(), "linked account");
            }
            LinkResult::Error(kind, message) => {
                warn!(?kind, message, "link failed");
            }
        }
        Ok(Some(result))
    }

    async fn extract_from_dauth_url(&self, url: &Url) -> Result<LinkResult> {
        if url.path() != "/connect" {
            return Ok(LinkResult::Error(
                OAuth2Error::AccessDenied,
                "User cancelled Dropbox link".into(),
            ));
        }

        let params = parse_pairs(url.query().unwrap_or_default());
        let state: Vec<&str> = params
            .get("state")
            .map(|s| s.split("%3A").collect())
            .unwrap_or_default();
        let nonce = self.state_store.get(LINK_NONCE_KEY).await?;

        let verified = matches!(
            (state.as_slice(), nonce.as_deref()),
            ([prefix, received], Some(expected))
                if *prefix == DAUTH_STATE_PREFIX && received == &expected
        );
        if !verified {
            return Ok(LinkResult::Error(
                OAuth2Error::Unknown,
                "Unable to verify link request".into(),
            ));
        }

        Ok(token_result(&params, "oauth_token_secret"))
    }

    /// All stored tokens, keyed and ordered by user id.
    pub async fn get_all_access_tokens(&self) -> Result<BTreeMap<String, AccessToken>> {
        let mut tokens = BTreeMap::new();
        for user in self.keychain.get_all().await? {
            if let Some(token) = self.keychain.get(&user).await? {
                tokens.insert(user.clone(), AccessToken::new(token, user));
            }
        }
        Ok(tokens)
    }

    pub async fn has_stored_access_tokens(&self) -> Result<bool> {
        Ok(!self.get_all_access_tokens().await?.is_empty())
    }

    pub async fn get_access_token(&self, user_id: &str) -> Result<Option<AccessToken>> {
        Ok(self
            .keychain
            .get(user_id)
            .await?
            .map(|token| AccessToken::new(token, user_id)))
    }

    /// The token with the lowest user id, if any.
    pub async fn get_first_access_token(&self) -> Result<Option<AccessToken>> {
        Ok(self.get_all_access_tokens().await?.into_values().next())
    }

    pub async fn store_access_token(&self, token: &AccessToken) -> Result<()> {
        self.keychain.set(token.user_id(), token.token()).await
    }

    /// Returns whether a token was removed.
    pub async fn clear_stored_access_token(&self, token: &AccessToken) -> Result<bool> {
        self.keychain.delete(token.user_id()).await
    }

    pub async fn clear_stored_access_tokens(&self) -> Result<bool> {
        self.keychain.clear().await
    }
}

fn extract_from_redirect_url(url: &Url) -> LinkResult {
    let params = parse_pairs(url.fragment().unwrap_or_default());
    if let Some(code) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|d| decode_description(d))
            .unwrap_or_default();
        return LinkResult::Error(OAuth2Error::from_code(code), description);
    }
    token_result(&params, "access_token")
}

fn token_result(params: &HashMap<String, String>, token_field: &str) -> LinkResult {
    let Some(token) = params.get(token_field) else {
        return missing(token_field);
    };
    let Some(uid) = params.get("uid") else {
        return missing("uid");
    };
    LinkResult::Success(AccessToken::new(token.clone(), uid.clone()))
}

fn missing(field: &str) -> LinkResult {
    LinkResult::Error(OAuth2Error::Unknown, format!("Redirect missing {field}"))
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))
}
