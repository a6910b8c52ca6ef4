//! Access tokens

use std::fmt;

use common::Secret;

/// A Dropbox OAuth2 access token and the user it belongs to.
///
/// Identity is the user id. The token string is redacted in `Debug` and
/// `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: Secret<String>,
    user_id: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
            user_id: user_id.into(),
        }
    }

    /// The bearer token. Do not log.
    pub fn token(&self) -> &str {
        self.token.expose()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.token)
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let token = AccessToken::new("sl.secret", "123");
        let debug = format!("{token:?}");
        assert!(!debug.contains("sl.secret"));
        assert!(debug.contains("123"));
        assert_eq!(token.token(), "sl.secret");
    }
}
