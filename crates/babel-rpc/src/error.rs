//! Error taxonomy for Babel calls
//!
//! `CallError` is derived from the HTTP status of a completed exchange.
//! `TransportError` covers everything that prevented a usable exchange in the
//! first place (connection failures, body streaming, local file I/O).

use std::fmt;

/// Failures below the HTTP status layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("no base URL configured for host `{0}`")]
    UnknownHost(String),

    #[error("request was cancelled")]
    Cancelled,

    #[error("request task failed: {0}")]
    Task(String),

    #[error("invalid TLS configuration: {0}")]
    Tls(String),
}

/// A parameter failed client-side validation before the request was sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Error delivered to the caller of a Babel request.
///
/// `E` is the route-specific error type, deserialized from the `error` field
/// of 403/404/409 response bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum CallError<E> {
    InternalServerError {
        code: u16,
        message: Option<String>,
        request_id: Option<String>,
    },
    BadInput {
        message: Option<String>,
        request_id: Option<String>,
    },
    RateLimited,
    HttpError {
        code: Option<u16>,
        message: Option<String>,
        request_id: Option<String>,
    },
    RouteError {
        error: E,
        request_id: Option<String>,
    },
    Transport(TransportError),
}

impl<E> CallError<E> {
    /// Metric/log label for the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::InternalServerError { .. } => "internal_server_error",
            CallError::BadInput { .. } => "bad_input",
            CallError::RateLimited => "rate_limited",
            CallError::HttpError { .. } => "http_error",
            CallError::RouteError { .. } => "route_error",
            CallError::Transport(_) => "transport_error",
        }
    }

    /// Request id reported by the server, if the response carried one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            CallError::InternalServerError { request_id, .. }
            | CallError::BadInput { request_id, .. }
            | CallError::HttpError { request_id, .. }
            | CallError::RouteError { request_id, .. } => request_id.as_deref(),
            CallError::RateLimited | CallError::Transport(_) => None,
        }
    }
}

impl<E> From<TransportError> for CallError<E> {
    fn from(err: TransportError) -> Self {
        CallError::Transport(err)
    }
}

impl<E> From<ValidationError> for CallError<E> {
    fn from(err: ValidationError) -> Self {
        CallError::BadInput {
            message: Some(err.0),
            request_id: None,
        }
    }
}

fn write_request_id(f: &mut fmt::Formatter<'_>, request_id: &Option<String>) -> fmt::Result {
    match request_id {
        Some(id) => write!(f, "[request-id {id}] "),
        None => Ok(()),
    }
}

fn write_message(f: &mut fmt::Formatter<'_>, message: &Option<String>) -> fmt::Result {
    match message {
        Some(m) => write!(f, ": {m}"),
        None => Ok(()),
    }
}

impl<E: fmt::Debug> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::InternalServerError {
                code,
                message,
                request_id,
            } => {
                write_request_id(f, request_id)?;
                write!(f, "Internal Server Error {code}")?;
                write_message(f, message)
            }
            CallError::BadInput {
                message,
                request_id,
            } => {
                write_request_id(f, request_id)?;
                write!(f, "Bad Input")?;
                write_message(f, message)
            }
            CallError::RateLimited => write!(f, "Rate limited"),
            CallError::HttpError {
                code,
                message,
                request_id,
            } => {
                write_request_id(f, request_id)?;
                write!(f, "HTTP Error")?;
                if let Some(c) = code {
                    write!(f, " {c}")?;
                }
                write_message(f, message)
            }
            CallError::RouteError { error, request_id } => {
                write_request_id(f, request_id)?;
                write!(f, "API route error - {error:?}")
            }
            CallError::Transport(err) => write!(f, "{err}"),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for CallError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Transport(err) => Some(err),
            _ => None,
        }
    }
}
