//! Authorized Dropbox API client

use std::collections::HashMap;
use std::sync::Arc;

use babel_rpc::{BabelClient, HttpTransport, ReqwestTransport, TransportSettings};
use common::SdkConfig;
use dropbox_auth::AccessToken;

use crate::auth::BearerAuth;
use crate::error::Result;
use crate::users_routes::UsersRoutes;

/// A Babel client authorized as one user, with typed route namespaces.
#[derive(Clone)]
pub struct DropboxClient {
    user_id: String,
    babel: BabelClient,
    users: UsersRoutes,
}

impl DropboxClient {
    pub fn new(
        token: AccessToken,
        transport: Arc<dyn HttpTransport>,
        base_hosts: HashMap<String, String>,
    ) -> Self {
        let user_id = token.user_id().to_string();
        let babel = BabelClient::new(transport, base_hosts, Arc::new(BearerAuth::new(token)));
        Self {
            user_id,
            users: UsersRoutes::new(babel.clone()),
            babel,
        }
    }

    /// Client over a fresh `reqwest` transport using the configured hosts,
    /// timeout and trust roots.
    pub fn from_config(token: AccessToken, config: &SdkConfig) -> Result<Self> {
        Ok(Self::new(
            token,
            Arc::new(reqwest_transport(config)?),
            config.hosts.base_hosts(),
        ))
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Routes for the `users` namespace.
    pub fn users(&self) -> &UsersRoutes {
        &self.users
    }

    /// The underlying Babel client, for routes without a typed wrapper.
    pub fn babel(&self) -> &BabelClient {
        &self.babel
    }
}

pub(crate) fn reqwest_transport(config: &SdkConfig) -> Result<ReqwestTransport> {
    let settings = TransportSettings {
        timeout: config.http.timeout(),
        pinned_roots: config.http.pinned_roots.clone(),
        revocation_lists: config.http.revocation_lists.clone(),
    };
    Ok(ReqwestTransport::from_settings(&settings)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use babel_rpc::{
        BoxFuture, CallError, HttpRequest, HttpResponse, RequestBody, TransportError,
    };
    use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
    use std::sync::Mutex;

    use crate::error::Error;
    use crate::users::{GetAccountBatchError, GetAccountError, NoError, SpaceAllocation};

    pub(crate) const ACCOUNT_ID: &str = "dbid:AAH4f99T0taONIb-OurWxbNQ6ywGRopQngc";

    pub(crate) const FULL_ACCOUNT: &str = r#"{
        "account_id": "dbid:AAH4f99T0taONIb-OurWxbNQ6ywGRopQngc",
        "name": {
            "given_name": "Franz",
            "surname": "Ferdinand",
            "familiar_name": "Franz",
            "display_name": "Franz Ferdinand (Personal)"
        },
        "email": "franz@dropbox.com",
        "locale": "en",
        "referral_link": "https://db.tt/ZITNuhtI",
        "is_paired": false,
        "account_type": {".tag": "basic"}
    }"#;

    const BASIC_ACCOUNT: &str = r#"{
        "account_id": "dbid:AAH4f99T0taONIb-OurWxbNQ6ywGRopQngc",
        "name": {
            "given_name": "Franz",
            "surname": "Ferdinand",
            "familiar_name": "Franz",
            "display_name": "Franz Ferdinand (Personal)"
        },
        "is_teammate": false
    }"#;

    pub(crate) struct Recorded {
        pub url: String,
        pub headers: HeaderMap,
        pub body: Vec<u8>,
    }

    /// Replies to each request with a canned status and body, recording what
    /// was sent.
    pub(crate) struct MockTransport {
        status: u16,
        body: &'static str,
        pub sent: Mutex<Vec<Recorded>>,
    }

    impl MockTransport {
        pub(crate) fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpTransport for MockTransport {
        fn send(
            &self,
            request: HttpRequest,
        ) -> BoxFuture<'static, std::result::Result<HttpResponse, TransportError>> {
            let body = match request.body {
                RequestBody::Bytes(bytes) => bytes.to_vec(),
                _ => Vec::new(),
            };
            self.sent.lock().unwrap().push(Recorded {
                url: request.url,
                headers: request.headers,
                body,
            });
            let mut headers = HeaderMap::new();
            headers.insert("x-dropbox-request-id", HeaderValue::from_static("req-1"));
            let response = HttpResponse::from_bytes(self.status, headers, self.body);
            Box::pin(async move { Ok(response) })
        }
    }

    fn client(transport: Arc<MockTransport>) -> DropboxClient {
        DropboxClient::new(
            AccessToken::new("sl.token", "dbid:user"),
            transport,
            SdkConfig::for_app_key("k").hosts.base_hosts(),
        )
    }

    #[tokio::test]
    async fn current_account_is_authorized_rpc_on_meta() {
        let transport = MockTransport::new(200, FULL_ACCOUNT);
        let account = client(transport.clone())
            .users()
            .get_current_account()
            .response()
            .await
            .unwrap();
        assert_eq!(account.email, "franz@dropbox.com");

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://api.dropbox.com/2/users/get_current_account");
        assert_eq!(sent[0].headers[AUTHORIZATION], "Bearer sl.token");
        assert_eq!(sent[0].body, b"null");
    }

    #[tokio::test]
    async fn space_usage_decodes_allocation() {
        let transport = MockTransport::new(
            200,
            r#"{"used": 42, "allocation": {".tag": "individual", "allocated": 1000}}"#,
        );
        let usage = client(transport)
            .users()
            .get_space_usage()
            .response()
            .await
            .unwrap();
        assert_eq!(usage.used, 42);
        assert_eq!(
            usage.allocation,
            SpaceAllocation::Individual { allocated: 1000 }
        );
    }

    #[tokio::test]
    async fn get_account_sends_account_id() {
        let transport = MockTransport::new(200, BASIC_ACCOUNT);
        let account = client(transport.clone())
            .users()
            .get_account(ACCOUNT_ID)
            .response()
            .await
            .unwrap();
        assert_eq!(account.account_id, ACCOUNT_ID);

        let sent = transport.sent.lock().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(body, serde_json::json!({ "account_id": ACCOUNT_ID }));
    }

    #[tokio::test]
    async fn get_account_route_error() {
        let transport = MockTransport::new(
            409,
            r#"{"error_summary": "no_account/", "error": {".tag": "no_account"}}"#,
        );
        let err = client(transport)
            .users()
            .get_account(ACCOUNT_ID)
            .response()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallError::RouteError {
                error: GetAccountError::NoAccount,
                request_id: Some("req-1".into()),
            }
        );
    }

    #[tokio::test]
    async fn invalid_account_id_is_rejected_locally() {
        let transport = MockTransport::new(200, BASIC_ACCOUNT);
        let err = client(transport.clone())
            .users()
            .get_account("dbid:short")
            .response()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "bad_input");
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn account_batch_requires_ids() {
        let transport = MockTransport::new(200, "[]");
        let users = client(transport.clone());

        let empty = users.users().get_account_batch(&[]).response().await;
        assert!(matches!(empty, Err(CallError::BadInput { .. })));

        let bad = users
            .users()
            .get_account_batch(&[ACCOUNT_ID.to_string(), "short".to_string()])
            .response()
            .await;
        assert!(matches!(bad, Err(CallError::BadInput { .. })));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn account_batch_decodes_list_and_errors() {
        let ok = MockTransport::new(200, "[]");
        let accounts = client(ok)
            .users()
            .get_account_batch(&[ACCOUNT_ID.to_string()])
            .response()
            .await
            .unwrap();
        assert!(accounts.is_empty());

        let missing = MockTransport::new(
            400,
            "Error in call to API function \"users/get_account_batch\"",
        );
        let err = client(missing)
            .users()
            .get_account_batch(&[ACCOUNT_ID.to_string()])
            .response()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "bad_input");

        let route = MockTransport::new(
            409,
            r#"{"error": {".tag": "no_account", "no_account": "dbid:gone"}}"#,
        );
        let err = client(route)
            .users()
            .get_account_batch(&[ACCOUNT_ID.to_string()])
            .response()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallError::RouteError {
                error: GetAccountBatchError::NoAccount {
                    no_account: "dbid:gone".into()
                },
                request_id: Some("req-1".into()),
            }
        );
    }

    #[tokio::test]
    async fn error_on_route_without_error_type_is_route_error() {
        let transport = MockTransport::new(
            409,
            r#"{"error_summary": "other/", "error": {".tag": "other"}}"#,
        );
        let err = client(transport)
            .users()
            .get_current_account()
            .response()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CallError::RouteError {
                error: NoError,
                request_id: Some("req-1".into()),
            }
        );
    }

    #[tokio::test]
    async fn malformed_error_on_route_without_error_type_is_http_error() {
        let transport = MockTransport::new(409, "not json");
        let err = client(transport)
            .users()
            .get_space_usage()
            .response()
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::HttpError { code: Some(409), .. }));
    }

    #[tokio::test]
    async fn from_config_keeps_user_id() {
        let config = SdkConfig::for_app_key("k");
        let client =
            DropboxClient::from_config(AccessToken::new("t", "dbid:me"), &config).unwrap();
        assert_eq!(client.user_id(), "dbid:me");
    }

    #[tokio::test]
    async fn from_config_rejects_unreadable_pinned_roots() {
        let mut config = SdkConfig::for_app_key("k");
        config.http.pinned_roots = vec!["/nonexistent/dropbox-roots.pem".into()];
        let result = DropboxClient::from_config(AccessToken::new("t", "dbid:me"), &config);
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Tls(_)))
        ));
    }
}
