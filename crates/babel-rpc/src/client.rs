//! Babel client: host resolution, header assembly, request dispatch

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::debug;

use crate::error::TransportError;
use crate::escape::ascii_escape;
use crate::metrics::record_request;
use crate::request::{
    DownloadRequest, Progress, ResponseHead, RpcRequest, UploadBody, UploadRequest,
    counted_upload_stream, execute_download, execute_rpc,
};
use crate::transport::{HttpRequest, HttpTransport, RequestBody};

/// Request header carrying JSON arguments for upload/download routes.
pub const API_ARG_HEADER: &str = "dropbox-api-arg";

/// Host name whose routes are called without authentication.
pub const NOTIFY_HOST: &str = "notify";

/// Supplies per-request headers, typically authentication.
///
/// `noauth` is true for hosts that must not receive credentials.
pub trait Authenticator: Send + Sync {
    fn additional_headers(&self, noauth: bool) -> HeaderMap;
}

/// Adds no headers.
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn additional_headers(&self, _noauth: bool) -> HeaderMap {
        HeaderMap::new()
    }
}

/// Dispatches typed requests against a set of named API hosts.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct BabelClient {
    transport: Arc<dyn HttpTransport>,
    base_hosts: Arc<HashMap<String, String>>,
    auth: Arc<dyn Authenticator>,
}

impl BabelClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_hosts: HashMap<String, String>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            transport,
            base_hosts: Arc::new(base_hosts),
            auth,
        }
    }

    /// Full URL for `route` on the named host.
    pub fn url_for(&self, host: &str, route: &str) -> Result<String, TransportError> {
        self.base_hosts
            .get(host)
            .map(|base| format!("{base}{route}"))
            .ok_or_else(|| TransportError::UnknownHost(host.to_string()))
    }

    fn auth_headers(&self, host: &str) -> HeaderMap {
        self.auth.additional_headers(host == NOTIFY_HOST)
    }

    /// Send an RPC-style request: JSON body in, JSON body out.
    pub fn rpc<P, R, E>(&self, host: &str, route: &str, params: &P) -> RpcRequest<R, E>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
    {
        record_request("rpc");
        let request = match self.build_rpc(host, route, params) {
            Ok(request) => request,
            Err(e) => return RpcRequest::rejected(e.into()),
        };
        debug!(host, route, "dispatching rpc request");
        RpcRequest::spawn(execute_rpc(self.transport.clone(), request))
    }

    /// Send an upload-style request: raw body, JSON arguments in a header.
    pub fn upload<P, R, E>(
        &self,
        host: &str,
        route: &str,
        params: &P,
        body: UploadBody,
    ) -> UploadRequest<R, E>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
    {
        record_request("upload");
        let (url, headers) = match self.build_upload_head(host, route, params) {
            Ok(head) => head,
            Err(e) => return UploadRequest::rejected(e.into()),
        };
        debug!(host, route, "dispatching upload request");

        let (progress_tx, progress_rx) = watch::channel(Progress::default());
        let transport = self.transport.clone();
        UploadRequest::spawn(
            async move {
                let stream = counted_upload_stream(body, progress_tx).await?;
                let request = HttpRequest {
                    url,
                    headers,
                    body: RequestBody::Stream(stream),
                };
                execute_rpc(transport, request).await
            },
            progress_rx,
        )
    }

    /// Send a download-style request.
    ///
    /// `destination` is called with the response head of a successful
    /// response and returns the path the body is written to.
    pub fn download<P, R, E, D>(
        &self,
        host: &str,
        route: &str,
        params: &P,
        destination: D,
    ) -> DownloadRequest<R, E>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
        E: DeserializeOwned + Send + 'static,
        D: FnOnce(&ResponseHead) -> PathBuf + Send + 'static,
    {
        record_request("download");
        let request = match self.build_download(host, route, params) {
            Ok(request) => request,
            Err(e) => return DownloadRequest::rejected(e.into()),
        };
        debug!(host, route, "dispatching download request");

        let (progress_tx, progress_rx) = watch::channel(Progress::default());
        DownloadRequest::spawn(
            execute_download(self.transport.clone(), request, destination, progress_tx),
            progress_rx,
        )
    }

    fn build_rpc<P: Serialize + ?Sized>(
        &self,
        host: &str,
        route: &str,
        params: &P,
    ) -> Result<HttpRequest, TransportError> {
        let url = self.url_for(host, route)?;
        let body = serde_json::to_vec(params)
            .map_err(|e| TransportError::Encode(format!("serializing {route} params: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(self.auth_headers(host));

        Ok(HttpRequest {
            url,
            headers,
            body: RequestBody::Bytes(body.into()),
        })
    }

    fn build_upload_head<P: Serialize + ?Sized>(
        &self,
        host: &str,
        route: &str,
        params: &P,
    ) -> Result<(String, HeaderMap), TransportError> {
        let url = self.url_for(host, route)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        headers.extend(self.auth_headers(host));
        headers.insert(
            HeaderName::from_static(API_ARG_HEADER),
            api_arg_value(route, params)?,
        );

        Ok((url, headers))
    }

    fn build_download<P: Serialize + ?Sized>(
        &self,
        host: &str,
        route: &str,
        params: &P,
    ) -> Result<HttpRequest, TransportError> {
        let url = self.url_for(host, route)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(API_ARG_HEADER),
            api_arg_value(route, params)?,
        );
        headers.extend(self.auth_headers(host));

        Ok(HttpRequest {
            url,
            headers,
            body: RequestBody::Empty,
        })
    }
}

fn api_arg_value<P: Serialize + ?Sized>(
    route: &str,
    params: &P,
) -> Result<HeaderValue, TransportError> {
    let json = serde_json::to_string(params)
        .map_err(|e| TransportError::Encode(format!("serializing {route} params: {e}")))?;
    HeaderValue::from_str(&ascii_escape(&json))
        .map_err(|e| TransportError::Encode(format!("{route} params are not a valid header: {e}")))
}
