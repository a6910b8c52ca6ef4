//! Generic client for Babel-described HTTP APIs
//!
//! Routes come in three styles. RPC routes take JSON parameters in the body
//! and return JSON. Upload routes take a raw body with parameters in the
//! `Dropbox-Api-Arg` header. Download routes stream the body to a file and
//! return their result in the `Dropbox-Api-Result` header.
//!
//! Non-2xx responses are mapped to `CallError` from the status code alone;
//! see `error_from_response`.

mod client;
mod error;
mod escape;
mod metrics;
mod request;
mod transport;
pub mod validate;

pub use client::{API_ARG_HEADER, Authenticator, BabelClient, NOTIFY_HOST, NoAuth};
pub use error::{CallError, TransportError, ValidationError};
pub use escape::ascii_escape;
pub use request::{
    API_RESULT_HEADER, DownloadRequest, Progress, ResponseHead, RpcRequest, UploadBody,
    UploadRequest, error_from_response,
};
pub use transport::{
    BoxFuture, ByteStream, HttpRequest, HttpResponse, HttpTransport, REQUEST_ID_HEADER,
    ReqwestTransport, RequestBody, TransportSettings,
};
