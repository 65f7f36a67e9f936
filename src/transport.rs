//! HTTP transport used by requests.
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::RequestCallback;

/// Outcome of a single POST attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    /// The request reached a terminal state and the callback has been notified. Holds the
    /// response body on success.
    Finished(Option<Value>),
    /// The attempt failed transiently. The caller may back off and try again.
    Retry,
}

/// A connection to the API server.
///
/// `post` is synchronous and reports the outcome to `callback` before returning:
/// `on_success`/`on_error` for terminal outcomes, `on_status` for transient ones.
pub trait ClientSession: Send + Sync {
    /// POST `payload` to `path`, relative to the API base URL.
    fn post(&self, path: &str, payload: &Value, callback: &dyn RequestCallback) -> Attempt;

    /// Abort the session. Later and in-flight posts return [`Attempt::Retry`] without invoking
    /// any callback.
    fn stop(&self);
}

/// [`ClientSession`] backed by a blocking `reqwest` client.
///
/// An in-flight POST cannot be interrupted. After [`ClientSession::stop`] its response is
/// discarded, and the client's request timeout bounds how long it may take.
#[derive(Debug)]
pub struct HttpClientSession {
    base_url: Url,
    client: reqwest::blocking::Client,
    stopped: AtomicBool,
}

impl HttpClientSession {
    /// Create a session posting to paths relative to `base_url`.
    pub fn new(mut base_url: Url, client: reqwest::blocking::Client) -> HttpClientSession {
        // Url::join replaces the last path segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        HttpClientSession {
            base_url,
            client,
            stopped: AtomicBool::new(false),
        }
    }

    /// Base URL request paths are joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `true` after [`ClientSession::stop`].
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl ClientSession for HttpClientSession {
    fn post(&self, path: &str, payload: &Value, callback: &dyn RequestCallback) -> Attempt {
        if self.is_stopped() {
            return Attempt::Retry;
        }

        let url = match self.base_url.join(path) {
            Ok(url) => url,
            Err(err) => {
                log::error!(target: "branch", path; "invalid request url: {err}");
                callback.on_error(0, 0, &err.to_string());
                return Attempt::Finished(None);
            }
        };

        log::trace!(target: "branch", url = url.as_str(), payload:serde = payload; "sending request");

        let result = self
            .client
            .post(url)
            .json(payload)
            .send()
            .and_then(|response| {
                let status = response.status();
                response.text().map(|body| (status, body))
            });

        if self.is_stopped() {
            log::debug!(target: "branch", path; "discarding response of stopped session");
            return Attempt::Retry;
        }

        match result {
            Ok((status, body)) => classify(status, &body, callback),
            Err(err) => {
                let err = err.without_url();
                log::warn!(target: "branch", path; "error while sending request: {err}");
                callback.on_status(0, 0, &err.to_string());
                Attempt::Retry
            }
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Map an HTTP response to an attempt outcome, notifying `callback`.
fn classify(status: StatusCode, body: &str, callback: &dyn RequestCallback) -> Attempt {
    let code = i32::from(status.as_u16());
    let reason = status.canonical_reason().unwrap_or("Unknown status");

    if status == StatusCode::OK {
        return match serde_json::from_str::<Value>(body) {
            Ok(response) => {
                log::trace!(target: "branch", response:serde = response; "received response");
                callback.on_success(0, response.clone());
                Attempt::Finished(Some(response))
            }
            Err(err) => {
                log::warn!(target: "branch", "failed to parse response body: {err}");
                callback.on_status(0, code, "Could not parse JSON response");
                Attempt::Retry
            }
        };
    }

    let retryable = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
    );
    if status.is_client_error() && !retryable {
        log::warn!(target: "branch", status = code; "request rejected: {body}");
        let message = if body.is_empty() { reason } else { body };
        callback.on_error(0, code, message);
        Attempt::Finished(None)
    } else {
        log::warn!(target: "branch", status = code; "received retryable response");
        callback.on_status(0, code, reason);
        Attempt::Retry
    }
}
