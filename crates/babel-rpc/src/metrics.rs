//! Request counters
//!
//! Emitted through the `metrics` facade; nothing is recorded unless the host
//! installs a recorder.
//!
//! - `babel_requests_total` (counter): label `style` (rpc, upload, download)
//! - `babel_call_errors_total` (counter): label `kind` (see `CallError::kind`)

/// Record a request being dispatched.
pub fn record_request(style: &'static str) {
    metrics::counter!("babel_requests_total", "style" => style).increment(1);
}

/// Record a call that completed with an error.
pub fn record_call_error(kind: &'static str) {
    metrics::counter!("babel_call_errors_total", "kind" => kind).increment(1);
}
