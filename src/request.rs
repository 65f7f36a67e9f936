//! A single logical server request with retries and exponential backoff.
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Condvar, Mutex, PoisonError,
    },
    time::Duration,
};

use serde_json::Value;

use crate::{ApiEndpoint, Attempt, ClientSession, RequestCallback};

/// Maximum number of POST attempts for one request.
pub const MAX_ATTEMPT_COUNT: u32 = 5;

/// Upper bound of the backoff between attempts.
pub const MAX_BACKOFF_MILLIS: u64 = 120_000;

const INITIAL_BACKOFF_MILLIS: u64 = 8_000;

/// How many times a request is attempted and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of POST attempts, including the first.
    pub max_attempts: u32,
    /// Wait after the first failed attempt. Doubles after each further failure.
    pub initial_backoff: Duration,
    /// Upper bound of a single wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: MAX_ATTEMPT_COUNT,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MILLIS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MILLIS),
        }
    }
}

impl RetryPolicy {
    /// Time to wait after failed attempt number `attempt` (1-based):
    /// `initial_backoff * 2^(attempt - 1)`, clamped to `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }
}

/// Interruptible sleep. Once woken, every later sleep returns immediately.
#[derive(Debug, Default)]
struct Sleeper {
    woken: Mutex<bool>,
    condvar: Condvar,
    #[cfg(test)]
    requested: Mutex<Vec<Duration>>,
}

impl Sleeper {
    /// Sleep for `duration` or until woken. Returns `true` if woken.
    fn sleep(&self, duration: Duration) -> bool {
        #[cfg(test)]
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);

        let woken = self.woken.lock().unwrap_or_else(PoisonError::into_inner);
        let (woken, _) = self
            .condvar
            .wait_timeout_while(woken, duration, |woken| !*woken)
            .unwrap_or_else(PoisonError::into_inner);
        *woken
    }

    fn wake(&self) {
        *self.woken.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.condvar.notify_all();
    }
}

/// Retry state of one request.
///
/// `send` blocks the calling thread while attempting and backing off. [`Request::cancel`] may be
/// called from any thread and interrupts a pending backoff.
#[derive(Debug, Default)]
pub struct Request {
    policy: RetryPolicy,
    attempts: AtomicU32,
    canceled: AtomicBool,
    sleeper: Sleeper,
}

impl Request {
    /// A request that has not been attempted yet.
    pub fn new(policy: RetryPolicy) -> Request {
        Request {
            policy,
            attempts: AtomicU32::new(0),
            canceled: AtomicBool::new(false),
            sleeper: Sleeper::default(),
        }
    }

    /// POST `payload` to `endpoint` until it succeeds, fails permanently, runs out of attempts or
    /// is canceled.
    ///
    /// The outcome is reported to `callback`: the transport delivers `on_success`/`on_error` for
    /// terminal responses, exhaustion is reported as `on_error`, cancellation as `on_status`.
    /// Returns the server response on success.
    pub fn send(
        &self,
        endpoint: ApiEndpoint,
        payload: &Value,
        callback: &dyn RequestCallback,
        session: &dyn ClientSession,
    ) -> Option<Value> {
        let path = endpoint.path();

        loop {
            if self.is_canceled() {
                log::debug!(target: "branch", path; "request canceled");
                callback.on_status(0, 0, "Request canceled");
                return None;
            }

            let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
            log::debug!(target: "branch", path, attempt; "sending request");

            if let Attempt::Finished(response) = session.post(path, payload, callback) {
                return response;
            }

            if self.is_canceled() {
                continue;
            }

            if attempt >= self.policy.max_attempts {
                log::error!(target: "branch", path, attempt; "giving up on request");
                callback.on_error(0, 0, "Maximum number of retries reached.");
                return None;
            }

            let backoff = self.policy.backoff(attempt);
            log::debug!(target: "branch", path, backoff_ms = backoff.as_millis() as u64; "backing off before retry");
            self.sleeper.sleep(backoff);
        }
    }

    /// Cancel the request. A pending backoff returns immediately and no further attempt is made.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
        self.sleeper.wake();
    }

    /// `true` after [`Request::cancel`].
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Number of POST attempts made so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.sleeper.wake();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use serde_json::json;

    use super::{Request, RetryPolicy, MAX_ATTEMPT_COUNT, MAX_BACKOFF_MILLIS};
    use crate::{
        test_support::{init_logger, MockClientSession, MockResponse, RecordingCallback},
        ApiEndpoint,
    };

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: MAX_ATTEMPT_COUNT,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[test]
    fn default_backoff_sequence() {
        let policy = RetryPolicy::default();
        let backoffs: Vec<u128> = (1..=5).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(backoffs, vec![8000, 16000, 32000, 64000, 120000]);
        assert_eq!(
            policy.backoff(40),
            Duration::from_millis(MAX_BACKOFF_MILLIS)
        );
    }

    #[test]
    fn gives_up_after_max_attempts() {
        init_logger();
        let session = MockClientSession::failing();
        let callback = RecordingCallback::new();
        let request = Request::new(fast_policy());

        let response = request.send(ApiEndpoint::RegisterOpen, &json!({}), &*callback, &*session);

        assert_eq!(response, None);
        assert_eq!(session.posts().len(), 5);
        assert_eq!(request.attempt_count(), 5);
        assert_eq!(callback.errors(), vec!["Maximum number of retries reached.".to_owned()]);
        assert_eq!(callback.terminal_count(), 1);
    }

    #[test]
    fn backs_off_between_attempts_only() {
        let session = MockClientSession::failing();
        let callback = RecordingCallback::new();
        let request = Request::new(RetryPolicy {
            max_attempts: MAX_ATTEMPT_COUNT,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_secs(1),
        });

        request.send(ApiEndpoint::RegisterOpen, &json!({}), &*callback, &*session);

        let slept = request.sleeper.requested.lock().unwrap().clone();
        assert_eq!(
            slept,
            [1, 2, 4, 8].map(Duration::from_millis).to_vec(),
            "one backoff after each failed attempt but the last"
        );
        assert_eq!(session.posts().len(), 5);
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let session = MockClientSession::succeeding(json!({"session_id": "abc123"}));
        session.push(MockResponse::Transient(503));
        session.push(MockResponse::Transient(500));
        let callback = RecordingCallback::new();
        let request = Request::new(fast_policy());

        let response = request.send(ApiEndpoint::RegisterOpen, &json!({}), &*callback, &*session);

        assert_eq!(response, Some(json!({"session_id": "abc123"})));
        assert_eq!(request.attempt_count(), 3);
        assert_eq!(callback.statuses().len(), 2);
        assert_eq!(callback.successes(), vec![json!({"session_id": "abc123"})]);
    }

    #[test]
    fn client_error_is_not_retried() {
        let session = MockClientSession::new(MockResponse::ClientError(400));
        let callback = RecordingCallback::new();
        let request = Request::new(fast_policy());

        let response = request.send(ApiEndpoint::TrackCustomEvent, &json!({}), &*callback, &*session);

        assert_eq!(response, None);
        assert_eq!(session.paths(), vec!["v2/event/custom".to_owned()]);
        assert_eq!(callback.terminal_count(), 1);
    }

    #[test]
    fn cancel_interrupts_backoff() {
        init_logger();
        let session = MockClientSession::failing();
        let callback = RecordingCallback::new();
        let request = Arc::new(Request::new(RetryPolicy {
            initial_backoff: Duration::from_secs(60),
            ..RetryPolicy::default()
        }));

        let started = Instant::now();
        let worker = {
            let (session, callback, request) = (session.clone(), callback.clone(), request.clone());
            std::thread::spawn(move || {
                request.send(ApiEndpoint::RegisterOpen, &json!({}), &*callback, &*session)
            })
        };

        assert!(session.wait_for_posts(1, Duration::from_secs(5)));
        request.cancel();
        let response = worker.join().unwrap();

        assert_eq!(response, None);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(session.posts().len(), 1);
        assert!(callback.errors().is_empty());
        assert_eq!(callback.statuses().last().map(String::as_str), Some("Request canceled"));
    }

    #[test]
    fn canceled_request_never_posts() {
        let session = MockClientSession::failing();
        let callback = RecordingCallback::new();
        let request = Request::new(fast_policy());
        request.cancel();

        assert_eq!(
            request.send(ApiEndpoint::RegisterOpen, &json!({}), &*callback, &*session),
            None
        );
        assert!(session.posts().is_empty());
        assert_eq!(callback.statuses(), vec!["Request canceled".to_owned()]);
    }
}
