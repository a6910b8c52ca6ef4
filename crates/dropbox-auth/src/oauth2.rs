//! OAuth2 implicit-grant results and redirect parameter parsing

use std::collections::HashMap;

use url::form_urlencoded;

use crate::token::AccessToken;

/// Authorization failure codes from RFC 6749 section 4.2.2.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuth2Error {
    /// The client is not authorized to request a token with this method.
    UnauthorizedClient,
    /// The user or server denied the request.
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
    /// Anything outside the RFC code table.
    Unknown,
}

impl OAuth2Error {
    /// Decode a wire error code. Unrecognised codes map to `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "unauthorized_client" => OAuth2Error::UnauthorizedClient,
            "access_denied" => OAuth2Error::AccessDenied,
            "unsupported_response_type" => OAuth2Error::UnsupportedResponseType,
            "invalid_scope" => OAuth2Error::InvalidScope,
            "server_error" => OAuth2Error::ServerError,
            "temporarily_unavailable" => OAuth2Error::TemporarilyUnavailable,
            _ => OAuth2Error::Unknown,
        }
    }
}

/// Outcome of handling one redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    Success(AccessToken),
    Error(OAuth2Error, String),
}

impl LinkResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LinkResult::Success(_))
    }
}

/// Split `a=1&b=2` into a map. Values are kept verbatim (no percent
/// decoding). Pairs without `=` are skipped and later keys win.
pub(crate) fn parse_pairs(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Decode an `error_description`: `+` becomes a space, then percent
/// escapes are resolved.
pub(crate) fn decode_description(raw: &str) -> String {
    form_urlencoded::parse(format!("d={raw}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_follow_rfc_table() {
        let table = [
            ("unauthorized_client", OAuth2Error::UnauthorizedClient),
            ("access_denied", OAuth2Error::AccessDenied),
            ("unsupported_response_type", OAuth2Error::UnsupportedResponseType),
            ("invalid_scope", OAuth2Error::InvalidScope),
            ("server_error", OAuth2Error::ServerError),
            ("temporarily_unavailable", OAuth2Error::TemporarilyUnavailable),
        ];
        for (code, expected) in table {
            assert_eq!(OAuth2Error::from_code(code), expected, "code {code}");
        }
    }

    #[test]
    fn unrecognised_codes_are_unknown() {
        for code in ["", "invalid_request", "ACCESS_DENIED", "access_denied "] {
            assert_eq!(OAuth2Error::from_code(code), OAuth2Error::Unknown);
        }
    }

    #[test]
    fn pairs_skip_entries_without_equals() {
        let pairs = parse_pairs("access_token=abc&junk&uid=123");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["access_token"], "abc");
        assert_eq!(pairs["uid"], "123");
    }

    #[test]
    fn duplicate_keys_keep_last_value() {
        let pairs = parse_pairs("uid=1&uid=2");
        assert_eq!(pairs["uid"], "2");
    }

    #[test]
    fn pair_values_are_not_decoded() {
        let pairs = parse_pairs("state=oauth2%3Aabc");
        assert_eq!(pairs["state"], "oauth2%3Aabc");
    }

    #[test]
    fn description_decodes_plus_and_percent() {
        assert_eq!(decode_description("User+cancelled"), "User cancelled");
        assert_eq!(decode_description("a%2Bb%20c"), "a+b c");
        assert_eq!(decode_description(""), "");
    }
}
