//! Bearer token authentication for Babel requests

use babel_rpc::Authenticator;
use dropbox_auth::AccessToken;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::warn;

/// Adds `Authorization: Bearer <token>` to every request except those to
/// the notify host.
pub struct BearerAuth {
    token: AccessToken,
}

impl BearerAuth {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }

    pub fn user_id(&self) -> &str {
        self.token.user_id()
    }
}

impl Authenticator for BearerAuth {
    fn additional_headers(&self, noauth: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if noauth {
            return headers;
        }
        match HeaderValue::from_str(&format!("Bearer {}", self.token.token())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                warn!(user_id = self.token.user_id(), error = %e, "access token is not a valid header value");
            }
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_bearer_header() {
        let auth = BearerAuth::new(AccessToken::new("sl.abc", "123"));
        let headers = auth.additional_headers(false);
        assert_eq!(headers[AUTHORIZATION], "Bearer sl.abc");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn noauth_adds_nothing() {
        let auth = BearerAuth::new(AccessToken::new("sl.abc", "123"));
        assert!(auth.additional_headers(true).is_empty());
    }

    #[test]
    fn invalid_token_is_skipped() {
        let auth = BearerAuth::new(AccessToken::new("bad\ntoken", "123"));
        assert!(auth.additional_headers(false).is_empty());
    }
}
