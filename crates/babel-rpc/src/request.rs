//! In-flight Babel requests and response handling
//!
//! Every request is spawned onto the tokio runtime as soon as it is built,
//! mirroring how the HTTP layer starts work eagerly. The returned handle
//! resolves exactly once via `response()`, which consumes it. Upload and
//! download handles also expose a `watch` channel with cumulative byte counts.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CallError, TransportError};
use crate::metrics::record_call_error;
use crate::transport::{ByteStream, HttpRequest, HttpTransport};

/// Response header carrying the JSON result of a download-style route.
pub const API_RESULT_HEADER: &str = "dropbox-api-result";

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Cumulative transfer progress. `total` is known for byte/file uploads and
/// for downloads that report a content length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: Option<u64>,
}

/// Status and headers of a download response, handed to the destination
/// callback before the body is written.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
}

/// Body of an upload-style request.
pub enum UploadBody {
    Bytes(Bytes),
    File(PathBuf),
    Stream(ByteStream),
}

#[derive(Deserialize)]
struct ErrorEnvelope<E> {
    error: E,
}

/// Map a non-2xx response to a `CallError`.
///
/// 403, 404 and 409 carry a route error in the `error` field of a JSON body;
/// a body that doesn't parse as one becomes an `HttpError` for that status.
pub fn error_from_response<E: DeserializeOwned>(
    status: u16,
    request_id: Option<String>,
    body: &[u8],
) -> CallError<E> {
    match status {
        500..=599 => CallError::InternalServerError {
            code: status,
            message: Some(String::from_utf8_lossy(body).into_owned()),
            request_id,
        },
        400 => CallError::BadInput {
            message: Some(String::from_utf8_lossy(body).into_owned()),
            request_id,
        },
        429 => CallError::RateLimited,
        403 | 404 | 409 => match serde_json::from_slice::<ErrorEnvelope<E>>(body) {
            Ok(envelope) => CallError::RouteError {
                error: envelope.error,
                request_id,
            },
            Err(e) => {
                warn!(status, error = %e, "route error body did not parse");
                CallError::HttpError {
                    code: Some(status),
                    message: Some(format!("failed to parse route error: {e}")),
                    request_id,
                }
            }
        },
        _ => CallError::HttpError {
            code: Some(status),
            message: Some("An error occurred.".into()),
            request_id,
        },
    }
}

enum Task<T, E> {
    Running(JoinHandle<Result<T, CallError<E>>>),
    Failed(CallError<E>),
}

impl<T: Send + 'static, E: Send + 'static> Task<T, E> {
    fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, CallError<E>>> + Send + 'static,
    {
        let future = async move {
            let result = future.await;
            if let Err(e) = &result {
                record_call_error(e.kind());
            }
            result
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Task::Running(handle.spawn(future)),
            Err(e) => Task::Failed(TransportError::Task(format!("no tokio runtime: {e}")).into()),
        }
    }

    fn failed(error: CallError<E>) -> Self {
        record_call_error(error.kind());
        Task::Failed(error)
    }
}

impl<T, E> Task<T, E> {
    fn abort(&self) {
        if let Task::Running(handle) = self {
            handle.abort();
        }
    }

    async fn join(self) -> Result<T, CallError<E>> {
        match self {
            Task::Running(handle) => match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(TransportError::Cancelled.into()),
                Err(e) => Err(TransportError::Task(e.to_string()).into()),
            },
            Task::Failed(error) => Err(error),
        }
    }
}

/// An RPC-style request: JSON parameters in, JSON result out.
pub struct RpcRequest<R, E> {
    task: Task<R, E>,
}

impl<R: Send + 'static, E: Send + 'static> RpcRequest<R, E> {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<R, CallError<E>>> + Send + 'static,
    {
        Self {
            task: Task::spawn(future),
        }
    }

    /// A request that resolves to `error` without touching the network.
    pub fn rejected(error: CallError<E>) -> Self {
        Self {
            task: Task::failed(error),
        }
    }
}

impl<R, E> RpcRequest<R, E> {
    /// Abort the underlying HTTP exchange; `response()` then yields `Cancelled`.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub async fn response(self) -> Result<R, CallError<E>> {
        self.task.join().await
    }
}

/// An upload-style request.
pub struct UploadRequest<R, E> {
    task: Task<R, E>,
    progress: watch::Receiver<Progress>,
}

impl<R: Send + 'static, E: Send + 'static> UploadRequest<R, E> {
    pub(crate) fn spawn<F>(future: F, progress: watch::Receiver<Progress>) -> Self
    where
        F: Future<Output = Result<R, CallError<E>>> + Send + 'static,
    {
        Self {
            task: Task::spawn(future),
            progress,
        }
    }

    pub fn rejected(error: CallError<E>) -> Self {
        Self {
            task: Task::failed(error),
            progress: watch::channel(Progress::default()).1,
        }
    }
}

impl<R, E> UploadRequest<R, E> {
    /// Bytes handed to the transport so far.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub async fn response(self) -> Result<R, CallError<E>> {
        self.task.join().await
    }
}

/// A download-style request. Resolves to the route result and the path the
/// body was written to.
pub struct DownloadRequest<R, E> {
    task: Task<(R, PathBuf), E>,
    progress: watch::Receiver<Progress>,
}

impl<R: Send + 'static, E: Send + 'static> DownloadRequest<R, E> {
    pub(crate) fn spawn<F>(future: F, progress: watch::Receiver<Progress>) -> Self
    where
        F: Future<Output = Result<(R, PathBuf), CallError<E>>> + Send + 'static,
    {
        Self {
            task: Task::spawn(future),
            progress,
        }
    }

    pub fn rejected(error: CallError<E>) -> Self {
        Self {
            task: Task::failed(error),
            progress: watch::channel(Progress::default()).1,
        }
    }
}

impl<R, E> DownloadRequest<R, E> {
    /// Bytes written to the destination so far.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub async fn response(self) -> Result<(R, PathBuf), CallError<E>> {
        self.task.join().await
    }
}

pub(crate) async fn execute_rpc<R, E>(
    transport: Arc<dyn HttpTransport>,
    request: HttpRequest,
) -> Result<R, CallError<E>>
where
    R: DeserializeOwned,
    E: DeserializeOwned,
{
    let url = request.url.clone();
    let response = transport.send(request).await?;
    let status = response.status;
    let request_id = response.request_id();
    let success = response.is_success();
    let body = response.bytes().await?;
    debug!(url = %url, status, ?request_id, bytes = body.len(), "request completed");

    if !success {
        return Err(error_from_response(status, request_id, &body));
    }

    serde_json::from_slice(&body)
        .map_err(|e| TransportError::Decode(format!("response body from {url}: {e}")).into())
}

/// Turn an upload body into a chunk stream that reports progress as the
/// transport pulls from it.
pub(crate) async fn counted_upload_stream(
    body: UploadBody,
    progress: watch::Sender<Progress>,
) -> Result<ByteStream, TransportError> {
    let (stream, total): (ByteStream, Option<u64>) = match body {
        UploadBody::Bytes(bytes) => {
            let total = bytes.len() as u64;
            let chunks = chunk_bytes(bytes).into_iter().map(Ok);
            (Box::pin(futures_util::stream::iter(chunks)), Some(total))
        }
        UploadBody::File(path) => {
            let file = tokio::fs::File::open(&path).await.map_err(|e| {
                TransportError::Io(format!("opening upload file {}: {e}", path.display()))
            })?;
            let total = file.metadata().await.ok().map(|m| m.len());
            (file_stream(file), total)
        }
        UploadBody::Stream(stream) => (stream, None),
    };

    progress.send_replace(Progress {
        completed: 0,
        total,
    });
    let mut sent = 0u64;
    Ok(Box::pin(stream.inspect_ok(move |chunk| {
        sent += chunk.len() as u64;
        progress.send_replace(Progress {
            completed: sent,
            total,
        });
    })))
}

fn chunk_bytes(mut bytes: Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(bytes.len() / UPLOAD_CHUNK_SIZE + 1);
    while bytes.len() > UPLOAD_CHUNK_SIZE {
        chunks.push(bytes.split_to(UPLOAD_CHUNK_SIZE));
    }
    if !bytes.is_empty() {
        chunks.push(bytes);
    }
    chunks
}

fn file_stream(file: tokio::fs::File) -> ByteStream {
    Box::pin(futures_util::stream::try_unfold(file, |mut file| async move {
        let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => return Err(TransportError::Io(format!("reading upload file: {e}"))),
        };
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), file)))
    }))
}

pub(crate) async fn execute_download<R, E, D>(
    transport: Arc<dyn HttpTransport>,
    request: HttpRequest,
    destination: D,
    progress: watch::Sender<Progress>,
) -> Result<(R, PathBuf), CallError<E>>
where
    R: DeserializeOwned,
    E: DeserializeOwned,
    D: FnOnce(&ResponseHead) -> PathBuf,
{
    let url = request.url.clone();
    let response = transport.send(request).await?;
    let request_id = response.request_id();

    if !response.is_success() {
        let status = response.status;
        let body = response.bytes().await?;
        debug!(url = %url, status, ?request_id, "download failed");
        return Err(error_from_response(status, request_id, &body));
    }

    let raw = response
        .header(API_RESULT_HEADER)
        .ok_or_else(|| TransportError::Decode("missing Dropbox-Api-Result header".into()))?;
    let result = serde_json::from_str(&raw)
        .map_err(|e| TransportError::Decode(format!("Dropbox-Api-Result header: {e}")))?;

    let head = ResponseHead {
        status: response.status,
        headers: response.headers.clone(),
    };
    let path = destination(&head);
    let total = response
        .header("content-length")
        .and_then(|v| v.parse::<u64>().ok());
    progress.send_replace(Progress {
        completed: 0,
        total,
    });

    match write_body(response.body, &path, total, &progress).await {
        Ok(written) => {
            debug!(url = %url, path = %path.display(), bytes = written, "download written");
            Ok((result, path))
        }
        Err(e) => {
            if let Err(remove) = tokio::fs::remove_file(&path).await
                && remove.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %remove, "failed to remove partial download");
            }
            Err(e.into())
        }
    }
}

async fn write_body(
    mut body: ByteStream,
    path: &Path,
    total: Option<u64>,
    progress: &watch::Sender<Progress>,
) -> Result<u64, TransportError> {
    let mut file = tokio::fs::File::create(path).await.map_err(|e| {
        TransportError::Io(format!("creating download file {}: {e}", path.display()))
    })?;
    let mut written = 0u64;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| TransportError::Io(format!("writing {}: {e}", path.display())))?;
        written += chunk.len() as u64;
        progress.send_replace(Progress {
            completed: written,
            total,
        });
    }
    file.flush()
        .await
        .map_err(|e| TransportError::Io(format!("flushing {}: {e}", path.display())))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(tag = ".tag", rename_all = "snake_case")]
    enum LookupError {
        NotFound,
        NotFile,
    }

    #[test]
    fn server_errors_map_to_internal_server_error() {
        for status in [500u16, 503, 599] {
            let err = error_from_response::<LookupError>(status, Some("rid".into()), b"oops");
            assert_eq!(
                err,
                CallError::InternalServerError {
                    code: status,
                    message: Some("oops".into()),
                    request_id: Some("rid".into()),
                },
                "status {status}"
            );
        }
    }

    #[test]
    fn status_400_is_bad_input_with_body_text() {
        let err = error_from_response::<LookupError>(400, None, b"Error in call: missing arg");
        assert_eq!(
            err,
            CallError::BadInput {
                message: Some("Error in call: missing arg".into()),
                request_id: None,
            }
        );
    }

    #[test]
    fn status_429_is_exactly_rate_limited() {
        let err = error_from_response::<LookupError>(429, Some("rid".into()), b"{}");
        assert_eq!(err, CallError::RateLimited);
    }

    #[test]
    fn route_statuses_deserialize_error_field() {
        let body = br#"{"error_summary": "not_found/..", "error": {".tag": "not_found"}}"#;
        for status in [403u16, 404, 409] {
            let err = error_from_response::<LookupError>(status, Some("r9".into()), body);
            assert_eq!(
                err,
                CallError::RouteError {
                    error: LookupError::NotFound,
                    request_id: Some("r9".into()),
                },
                "status {status}"
            );
        }
    }

    #[test]
    fn malformed_route_error_becomes_http_error() {
        let err = error_from_response::<LookupError>(409, None, b"<html>conflict</html>");
        match err {
            CallError::HttpError { code, message, .. } => {
                assert_eq!(code, Some(409));
                assert!(message.unwrap().starts_with("failed to parse route error"));
            }
            other => panic!("expected HttpError, got {other:?}"),
        }
    }

    #[test]
    fn other_statuses_are_generic_http_errors() {
        let err = error_from_response::<LookupError>(418, Some("r".into()), b"teapot");
        assert_eq!(
            err,
            CallError::HttpError {
                code: Some(418),
                message: Some("An error occurred.".into()),
                request_id: Some("r".into()),
            }
        );
    }

    #[test]
    fn chunk_bytes_splits_on_chunk_size() {
        let data = Bytes::from(vec![7u8; UPLOAD_CHUNK_SIZE * 2 + 10]);
        let chunks = chunk_bytes(data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 10);
        assert!(chunk_bytes(Bytes::new()).is_empty());
    }

    #[tokio::test]
    async fn counted_stream_reports_cumulative_progress() {
        let (tx, rx) = watch::channel(Progress::default());
        let data = Bytes::from(vec![1u8; UPLOAD_CHUNK_SIZE + 5]);
        let stream = counted_upload_stream(UploadBody::Bytes(data), tx)
            .await
            .unwrap();
        let collected: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(collected.len(), 2);
        assert_eq!(
            *rx.borrow(),
            Progress {
                completed: (UPLOAD_CHUNK_SIZE + 5) as u64,
                total: Some((UPLOAD_CHUNK_SIZE + 5) as u64),
            }
        );
    }

    #[tokio::test]
    async fn file_body_streams_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        tokio::fs::write(&path, b"file contents").await.unwrap();

        let (tx, rx) = watch::channel(Progress::default());
        let stream = counted_upload_stream(UploadBody::File(path), tx)
            .await
            .unwrap();
        let collected: Vec<Bytes> = stream.try_collect().await.unwrap();
        assert_eq!(collected.concat(), b"file contents");
        assert_eq!(rx.borrow().total, Some(13));
    }

    #[tokio::test]
    async fn missing_upload_file_is_io_error() {
        let (tx, _rx) = watch::channel(Progress::default());
        let result =
            counted_upload_stream(UploadBody::File(PathBuf::from("/nonexistent/f")), tx).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn rejected_request_resolves_to_its_error() {
        let request: RpcRequest<(), LookupError> = RpcRequest::rejected(CallError::RateLimited);
        assert_eq!(request.response().await.unwrap_err(), CallError::RateLimited);
    }

    #[tokio::test]
    async fn cancelled_request_yields_cancelled() {
        let request: RpcRequest<(), LookupError> = RpcRequest::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(())
        });
        request.cancel();
        assert_eq!(
            request.response().await.unwrap_err(),
            CallError::Transport(TransportError::Cancelled)
        );
    }
}
