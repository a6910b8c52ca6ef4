//! Terminal host for the link flow
//!
//! A terminal can't receive `db-<app_key>://` redirects or launch the Dropbox
//! app, so links always go through the consent page. The command loop prints
//! the URL from `LinkStart::ConsentPage`; the user opens it in a browser and
//! pastes the final redirect back into `handle-redirect`.

use common::AppConfig;
use dropbox_auth::{HostApp, NavigationInterceptor, Url};
use tracing::debug;

pub struct CliHost {
    url_schemes: Vec<String>,
    queries_schemes: Vec<String>,
}

impl CliHost {
    pub fn from_config(app: &AppConfig) -> Self {
        Self {
            url_schemes: app.url_schemes.clone(),
            queries_schemes: app.queries_schemes.clone(),
        }
    }
}

impl HostApp for CliHost {
    fn url_schemes(&self) -> Vec<String> {
        self.url_schemes.clone()
    }

    fn queries_schemes(&self) -> Vec<String> {
        self.queries_schemes.clone()
    }

    fn can_open_url(&self, _url: &Url) -> bool {
        false
    }

    fn open_url(&self, url: &Url) -> bool {
        debug!(%url, "terminal cannot open URLs");
        false
    }

    fn present_consent_page(&self, url: &Url, _interceptor: NavigationInterceptor) {
        debug!(%url, "consent page left to the command output");
    }
}
