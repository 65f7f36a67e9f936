use std::{
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock},
    thread::JoinHandle,
};

use reqwest::Url;

use crate::{
    ClientSession, Error, Event, HttpClientSession, PackagingInfo, Request, RequestCallback,
    Result, RetryPolicy,
};

/// Transport settings for a [`RequestManager`].
#[derive(Clone)]
pub struct RequestManagerOptions {
    /// Base URL requests are posted to.
    pub base_url: Url,
    /// Attempt count and backoff of every request.
    pub retry_policy: RetryPolicy,
    /// Session used for every request. When `None`, each request gets a fresh
    /// [`HttpClientSession`] over `http_client`.
    pub client_session: Option<Arc<dyn ClientSession>>,
    /// HTTP client shared by the sessions created per request.
    pub http_client: reqwest::blocking::Client,
}

struct RequestTask {
    event: Event,
    callback: Arc<dyn RequestCallback>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<RequestTask>,
    shutting_down: bool,
    current_request: Option<Arc<Request>>,
    current_session: Option<Arc<dyn ClientSession>>,
}

struct Shared {
    state: Mutex<State>,
    /// Signaled when a task is enqueued or shutdown begins.
    wakeup: Condvar,
    default_callback: RwLock<Option<Arc<dyn RequestCallback>>>,
    packaging_info: Arc<PackagingInfo>,
    options: RequestManagerOptions,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_session(&self) -> Arc<dyn ClientSession> {
        match &self.options.client_session {
            Some(session) => session.clone(),
            None => Arc::new(HttpClientSession::new(
                self.options.base_url.clone(),
                self.options.http_client.clone(),
            )),
        }
    }
}

/// A queue of requests executed one at a time by a background worker thread.
///
/// Requests are executed in enqueue order. Urgent requests are inserted at the front of the queue,
/// so they run before every request already waiting (and a later urgent request runs before an
/// earlier one).
///
/// The worker is started with [`RequestManager::start`] and stopped with [`RequestManager::stop`].
/// Dropping the manager stops the worker and waits for it to exit.
pub struct RequestManager {
    shared: Arc<Shared>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RequestManager {
    /// A manager packaging requests against `packaging_info`. The worker is not started yet.
    pub fn new(packaging_info: Arc<PackagingInfo>, options: RequestManagerOptions) -> RequestManager {
        RequestManager {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                wakeup: Condvar::new(),
                default_callback: RwLock::new(None),
                packaging_info,
                options,
            }),
            join_handle: Mutex::new(None),
        }
    }

    /// Callback used for requests enqueued without one.
    pub fn set_default_callback(&self, callback: Option<Arc<dyn RequestCallback>>) {
        *self
            .shared
            .default_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = callback;
    }

    /// Callback used for requests enqueued without one, if set.
    pub fn default_callback(&self) -> Option<Arc<dyn RequestCallback>> {
        self.shared
            .default_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add `event` to the queue. May be called before [`RequestManager::start`].
    ///
    /// Returns [`Error::MissingCallback`] if `callback` is `None` and no default callback is set.
    pub fn enqueue(
        &self,
        event: Event,
        callback: Option<Arc<dyn RequestCallback>>,
        urgent: bool,
    ) -> Result<()> {
        let callback = callback
            .or_else(|| self.default_callback())
            .ok_or(Error::MissingCallback)?;

        log::debug!(target: "branch", path = event.endpoint().path(), name = event.name(), urgent; "enqueuing request");

        let task = RequestTask { event, callback };
        {
            let mut state = self.shared.state();
            if urgent {
                state.queue.push_front(task);
            } else {
                state.queue.push_back(task);
            }
        }
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Start the worker thread. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut join_handle = self
            .join_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if join_handle.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        *join_handle = Some(
            std::thread::Builder::new()
                .name("branchio-requests".to_owned())
                .spawn(move || run(&shared))?,
        );
        log::debug!(target: "branch", "request worker started");
        Ok(())
    }

    /// Stop the worker thread.
    ///
    /// The request in flight is canceled and its client session stopped. Queued requests are not
    /// executed, but stay in the queue. This function does not wait for the thread to exit.
    pub fn stop(&self) {
        let (request, session) = {
            let mut state = self.shared.state();
            state.shutting_down = true;
            (state.current_request.clone(), state.current_session.clone())
        };
        self.shared.wakeup.notify_all();

        if let Some(request) = request {
            request.cancel();
        }
        if let Some(session) = session {
            session.stop();
        }
    }

    /// Block waiting for the worker thread to exit. Returns immediately if it was never started.
    ///
    /// The worker only exits after [`RequestManager::stop`].
    pub fn wait_till_finished(&self) -> Result<()> {
        let join_handle = self
            .join_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join_handle) = join_handle {
            join_handle
                .join()
                .map_err(|_| Error::WorkerThreadPanicked)?;
        }
        Ok(())
    }

    /// `true` once [`RequestManager::stop`] was called.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.state().shutting_down
    }

    /// Number of requests waiting to be executed, not counting the one in flight.
    pub fn pending_count(&self) -> usize {
        self.shared.state().queue.len()
    }

    /// Context requests are packaged against.
    pub fn packaging_info(&self) -> &Arc<PackagingInfo> {
        &self.shared.packaging_info
    }

    /// A client session configured like the ones used for queued requests.
    pub(crate) fn new_session(&self) -> Arc<dyn ClientSession> {
        self.shared.new_session()
    }

    /// `true` when every request goes through one injected session instead of a fresh one.
    pub(crate) fn shares_session(&self) -> bool {
        self.shared.options.client_session.is_some()
    }
}

impl Drop for RequestManager {
    fn drop(&mut self) {
        self.stop();
        if let Err(err) = self.wait_till_finished() {
            log::error!(target: "branch", "failed to stop request worker: {err}");
        }
    }
}

/// Worker loop.
fn run(shared: &Shared) {
    loop {
        let (task, request, session) = {
            let mut state = shared.state();
            let task = loop {
                if state.shutting_down {
                    log::debug!(target: "branch", "request worker received stop command");
                    return;
                }
                if let Some(task) = state.queue.pop_front() {
                    break task;
                }
                state = shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            };

            // Registered under the same lock as the shutdown check so stop() always sees them.
            let request = Arc::new(Request::new(shared.options.retry_policy));
            let session = shared.new_session();
            state.current_request = Some(request.clone());
            state.current_session = Some(session.clone());
            (task, request, session)
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            execute(&shared.packaging_info, &task, &request, &*session)
        }));
        if result.is_err() {
            log::error!(target: "branch", path = task.event.endpoint().path(); "request task panicked");
        }

        let mut state = shared.state();
        state.current_request = None;
        state.current_session = None;
    }
}

fn execute(
    packaging_info: &PackagingInfo,
    task: &RequestTask,
    request: &Request,
    session: &dyn ClientSession,
) {
    let event = &task.event;
    let payload = event.package(packaging_info);

    log::debug!(target: "branch", path = event.endpoint().path(), name = event.name(); "executing request");

    if let Some(response) = request.send(event.endpoint(), &payload, &*task.callback, session) {
        event.handle_result(&response);
    }
}
