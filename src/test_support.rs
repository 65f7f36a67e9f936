//! Fakes shared by unit tests.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use serde_json::Value;

use crate::{
    storage::Storage, AppInfo, Attempt, ClientSession, DeviceInfo, MemoryStorage, PackagingInfo,
    RequestCallback, SessionInfo,
};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn memory_storage() -> Storage {
    Storage::new(Arc::new(MemoryStorage::new())).with_prefix("key_test")
}

pub(crate) fn packaging_info(branch_key: &str) -> PackagingInfo {
    PackagingInfo::new(
        branch_key,
        AppInfo::new(),
        DeviceInfo::new(),
        SessionInfo::new(memory_storage()),
    )
}

/// Scripted server reply.
#[derive(Debug, Clone)]
pub(crate) enum MockResponse {
    Success(Value),
    ClientError(i32),
    Transient(i32),
}

#[derive(Default)]
struct MockState {
    script: VecDeque<MockResponse>,
    posts: Vec<(String, Value)>,
    /// Posts to this path block until [`MockClientSession::release`].
    held_path: Option<String>,
}

/// In-memory [`ClientSession`] replaying scripted responses. Once the script runs out every post
/// gets the fallback response.
pub(crate) struct MockClientSession {
    state: Mutex<MockState>,
    posted: Condvar,
    fallback: MockResponse,
    stopped: AtomicBool,
}

impl MockClientSession {
    pub fn new(fallback: MockResponse) -> Arc<MockClientSession> {
        Arc::new(MockClientSession {
            state: Mutex::new(MockState::default()),
            posted: Condvar::new(),
            fallback,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn succeeding(response: Value) -> Arc<MockClientSession> {
        MockClientSession::new(MockResponse::Success(response))
    }

    pub fn failing() -> Arc<MockClientSession> {
        MockClientSession::new(MockResponse::Transient(500))
    }

    pub fn push(&self, response: MockResponse) {
        self.state.lock().unwrap().script.push_back(response);
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.posts().into_iter().map(|(path, _)| path).collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Make posts to `path` block after being recorded, until [`MockClientSession::release`].
    pub fn hold(&self, path: &str) {
        self.state.lock().unwrap().held_path = Some(path.to_owned());
    }

    pub fn release(&self) {
        self.state.lock().unwrap().held_path = None;
        self.posted.notify_all();
    }

    /// Block until at least `count` posts were made. Returns `false` on timeout.
    pub fn wait_for_posts(&self, count: usize, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .posted
            .wait_timeout_while(state, timeout, |state| state.posts.len() < count)
            .unwrap();
        state.posts.len() >= count
    }
}

impl ClientSession for MockClientSession {
    fn post(&self, path: &str, payload: &Value, callback: &dyn RequestCallback) -> Attempt {
        let response = {
            let mut state = self.state.lock().unwrap();
            state.posts.push((path.to_owned(), payload.clone()));
            self.posted.notify_all();
            let mut state = self
                .posted
                .wait_while(state, |state| state.held_path.as_deref() == Some(path))
                .unwrap();
            state
                .script
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        };

        if self.is_stopped() {
            return Attempt::Retry;
        }

        match response {
            MockResponse::Success(value) => {
                callback.on_success(0, value.clone());
                Attempt::Finished(Some(value))
            }
            MockResponse::ClientError(code) => {
                callback.on_error(0, code, "Bad Request");
                Attempt::Finished(None)
            }
            MockResponse::Transient(code) => {
                callback.on_status(0, code, "Internal Server Error");
                Attempt::Retry
            }
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// A callback invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Success(Value),
    Error(i32, String),
    Status(i32, String),
}

impl Call {
    fn is_terminal(&self) -> bool {
        !matches!(self, Call::Status(..))
    }
}

/// Callback that records every invocation.
#[derive(Default)]
pub(crate) struct RecordingCallback {
    calls: Mutex<Vec<Call>>,
    changed: Condvar,
}

impl RecordingCallback {
    pub fn new() -> Arc<RecordingCallback> {
        Arc::new(RecordingCallback::default())
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        self.changed.notify_all();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn terminal_count(&self) -> usize {
        self.calls().iter().filter(|call| call.is_terminal()).count()
    }

    pub fn successes(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Success(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Error(_, message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Status(_, message) => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Block until at least `count` terminal callbacks were received. Returns `false` on timeout.
    pub fn wait_for_terminal(&self, count: usize, timeout: Duration) -> bool {
        let calls = self.calls.lock().unwrap();
        let (calls, _) = self
            .changed
            .wait_timeout_while(calls, timeout, |calls| {
                calls.iter().filter(|call| call.is_terminal()).count() < count
            })
            .unwrap();
        calls.iter().filter(|call| call.is_terminal()).count() >= count
    }
}

impl RequestCallback for RecordingCallback {
    fn on_success(&self, _id: i32, response: Value) {
        self.record(Call::Success(response));
    }

    fn on_error(&self, _id: i32, code: i32, message: &str) {
        self.record(Call::Error(code, message.to_owned()));
    }

    fn on_status(&self, _id: i32, code: i32, message: &str) {
        self.record(Call::Status(code, message.to_owned()));
    }
}
