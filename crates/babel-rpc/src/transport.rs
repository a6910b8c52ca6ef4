//! HTTP transport seam
//!
//! The RPC client never talks to `reqwest` directly. It hands a fully built
//! `HttpRequest` to an `HttpTransport` and gets back the status, headers and a
//! body stream. `ReqwestTransport` is the production implementation; tests
//! substitute canned transports.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::tls::CertificateRevocationList;
use reqwest::{Certificate, ClientBuilder};
use tracing::{debug, info};

use crate::error::TransportError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Chunked request or response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Header carrying the server-side request id.
pub const REQUEST_ID_HEADER: &str = "x-dropbox-request-id";

pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Stream(ByteStream),
}

/// A POST to be sent by a transport. Babel only ever uses POST.
pub struct HttpRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl HttpResponse {
    /// Build a response with a single-chunk body.
    pub fn from_bytes(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let chunk: Bytes = body.into();
        Self {
            status,
            headers,
            body: Box::pin(futures_util::stream::once(async move { Ok(chunk) })),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    pub fn request_id(&self) -> Option<String> {
        self.header(REQUEST_ID_HEADER)
    }

    /// Drain the body into memory.
    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        let mut buf = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.try_next().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

/// Sends Babel requests.
///
/// Returns a `'static` future so the RPC client can spawn it; implementations
/// clone whatever handle they need into the future.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>>;
}

/// Settings for building a `ReqwestTransport`.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Applied to connecting and to each read; a transfer that keeps making
    /// progress is never cut off.
    pub timeout: Duration,
    /// PEM bundles that replace the built-in trust roots when non-empty.
    pub pinned_roots: Vec<PathBuf>,
    /// PEM CRL bundles checked against pinned roots.
    pub revocation_lists: Vec<PathBuf>,
}

impl TransportSettings {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pinned_roots: Vec::new(),
            revocation_lists: Vec::new(),
        }
    }

    /// Apply timeouts and trust roots to a client builder.
    pub fn configure(&self, builder: ClientBuilder) -> Result<ClientBuilder, TransportError> {
        let mut builder = builder
            .connect_timeout(self.timeout)
            .read_timeout(self.timeout);

        if self.pinned_roots.is_empty() {
            if !self.revocation_lists.is_empty() {
                return Err(TransportError::Tls(
                    "revocation lists require pinned roots".into(),
                ));
            }
            return Ok(builder);
        }

        let mut roots = Vec::new();
        for path in &self.pinned_roots {
            roots.extend(load_certificates(path)?);
        }
        info!(count = roots.len(), "pinning TLS roots");
        builder = builder.tls_certs_only(roots);

        let mut crls = Vec::new();
        for path in &self.revocation_lists {
            let pem = read_pem(path)?;
            crls.extend(
                CertificateRevocationList::from_pem_bundle(&pem)
                    .map_err(|e| TransportError::Tls(format!("{}: {e}", path.display())))?,
            );
        }
        if !crls.is_empty() {
            builder = builder.tls_crls_only(crls);
        }
        Ok(builder)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|e| TransportError::Tls(format!("{}: {e}", path.display())))
}

fn load_certificates(path: &Path) -> Result<Vec<Certificate>, TransportError> {
    let pem = read_pem(path)?;
    let certs = Certificate::from_pem_bundle(&pem)
        .map_err(|e| TransportError::Tls(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client from `settings`.
    pub fn from_settings(settings: &TransportSettings) -> Result<Self, TransportError> {
        let client = settings
            .configure(reqwest::Client::builder())?
            .build()
            .map_err(|e| TransportError::Tls(format!("building HTTP client: {e}")))?;
        debug!(timeout = ?settings.timeout, "built HTTP transport");
        Ok(Self::new(client))
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let builder = client.post(&request.url).headers(request.headers);
            let builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Bytes(bytes) => builder.body(bytes),
                RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
            };

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Http(format!("request to {} failed: {e}", request.url)))?;

            let status = response.status().as_u16();
            let headers = response.headers().clone();
            debug!(url = %request.url, status, "received response head");

            let body = response.bytes_stream().map(|chunk| {
                chunk.map_err(|e| TransportError::Http(format!("reading response body: {e}")))
            });

            Ok(HttpResponse {
                status,
                headers,
                body: Box::pin(body),
            })
        })
    }
}
