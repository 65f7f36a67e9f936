//! Short link creation with a locally built long-link fallback.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::JoinHandle,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Url;
use serde_json::Value;

use crate::{
    defines::keys, ApiEndpoint, Attempt, Client, ClientSession, Error, Event, PropertyBag,
    PropertyValue, RequestCallback, Result,
};

/// A link that may be clicked any number of times.
pub const LINK_TYPE_UNLIMITED_USE: i32 = 0;

/// A link that may be clicked once.
pub const LINK_TYPE_ONE_TIME_USE: i32 = 1;

/// Query parameter identifying the SDK in long links.
const LONG_LINK_SOURCE: &str = "rust";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    InFlight,
    Complete,
}

struct LinkState {
    phase: Phase,
    /// Session stopped by [`LinkInfo::cancel`]. Only set when the link owns it.
    session: Option<Arc<dyn ClientSession>>,
}

struct Shared {
    state: Mutex<LinkState>,
    completed: Condvar,
    canceled: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self) {
        let mut state = self.state();
        state.phase = Phase::Complete;
        state.session = None;
        self.completed.notify_all();
    }
}

/// Parameters of a Branch link, and a one-shot request creating it.
///
/// [`LinkInfo::create_url`] makes a single request on a dedicated thread, independent of the
/// client's request queue. If the request fails for any reason, a long link is built locally from
/// the same parameters and delivered as a success.
///
/// Dropping a `LinkInfo` blocks until its request has completed.
///
/// # Examples
/// ```no_run
/// # use std::sync::Arc;
/// # use branchio::{ClientConfig, LinkInfo, RequestCallback};
/// let client = ClientConfig::new("key_live_xxx").to_client()?;
/// let link = LinkInfo::new()
///     .set_channel("email")
///     .set_feature("sharing")
///     .add_tag("spring")
///     .add_control_parameter("$canonical_identifier", "item/1234");
///
/// let callback: Arc<dyn RequestCallback> =
///     Arc::new(|result: Result<serde_json::Value, String>| println!("{result:?}"));
/// link.create_url(&client, callback)?;
/// link.wait_till_complete();
/// # Ok::<(), branchio::Error>(())
/// ```
pub struct LinkInfo {
    properties: PropertyBag,
    tags: Vec<String>,
    control_params: PropertyBag,
    shared: Arc<Shared>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for LinkInfo {
    fn default() -> LinkInfo {
        LinkInfo {
            properties: PropertyBag::new(),
            tags: Vec::new(),
            control_params: PropertyBag::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(LinkState {
                    phase: Phase::Idle,
                    session: None,
                }),
                completed: Condvar::new(),
                canceled: AtomicBool::new(false),
            }),
            join_handle: Mutex::new(None),
        }
    }
}

impl LinkInfo {
    /// A link without parameters.
    pub fn new() -> LinkInfo {
        LinkInfo::default()
    }

    /// Custom path of the link. Must be unique for the app.
    pub fn set_alias(self, alias: &str) -> LinkInfo {
        self.with(keys::LINK_ALIAS, alias)
    }

    /// Campaign the link belongs to.
    pub fn set_campaign(self, campaign: &str) -> LinkInfo {
        self.with(keys::LINK_CAMPAIGN, campaign)
    }

    /// Channel the link is shared on, e.g. `email`.
    pub fn set_channel(self, channel: &str) -> LinkInfo {
        self.with(keys::LINK_CHANNEL, channel)
    }

    /// Duration of the match window, in seconds.
    pub fn set_duration(self, duration: i32) -> LinkInfo {
        self.with(keys::LINK_DURATION, duration)
    }

    /// Feature the link belongs to, e.g. `sharing`.
    pub fn set_feature(self, feature: &str) -> LinkInfo {
        self.with(keys::LINK_FEATURE, feature)
    }

    /// Stage of the user when the link was created.
    pub fn set_stage(self, stage: &str) -> LinkInfo {
        self.with(keys::LINK_STAGE, stage)
    }

    /// [`LINK_TYPE_UNLIMITED_USE`] or [`LINK_TYPE_ONE_TIME_USE`].
    pub fn set_type(self, link_type: i32) -> LinkInfo {
        self.with(keys::LINK_TYPE, link_type)
    }

    /// Add a free-form tag. Empty tags are ignored.
    pub fn add_tag(mut self, tag: &str) -> LinkInfo {
        if !tag.is_empty() {
            self.tags.push(tag.to_owned());
        }
        self
    }

    /// Add a key to the link data delivered to the app that opens the link.
    pub fn add_control_parameter(mut self, key: &str, value: impl Into<PropertyValue>) -> LinkInfo {
        self.control_params.set(key, value);
        self
    }

    fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> LinkInfo {
        self.properties.set(key, value);
        self
    }

    /// Alias, if set.
    pub fn alias(&self) -> Option<&str> {
        self.properties.get_str(keys::LINK_ALIAS)
    }

    /// Tags in insertion order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Link data set with [`LinkInfo::add_control_parameter`].
    pub fn control_params(&self) -> &PropertyBag {
        &self.control_params
    }

    /// The request event for `v1/url`.
    fn to_event(&self) -> Event {
        let mut properties = self.properties.clone();
        if !self.tags.is_empty() {
            properties.set(keys::LINK_TAGS, self.tags.clone());
        }
        if !self.control_params.is_empty() {
            properties.set(keys::DATA, self.control_params.clone());
        }
        Event::with_properties(ApiEndpoint::Url, "url", properties)
    }

    /// Request a short link from the server on a new thread.
    ///
    /// The result is delivered to `callback` as `on_success({"url": ...})`. On failure, a long
    /// link built by [`LinkInfo::create_long_url`] is delivered instead, or the original error if
    /// no long link can be built. A canceled request reports `on_status` only.
    ///
    /// Returns [`Error::LinkRequestInProgress`] if this link was already requested.
    pub fn create_url(&self, client: &Client, callback: Arc<dyn RequestCallback>) -> Result<()> {
        let (session, owned) = client.new_client_session();
        {
            let mut state = self.shared.state();
            if state.phase != Phase::Idle {
                return Err(Error::LinkRequestInProgress);
            }
            state.phase = Phase::InFlight;
            state.session = owned.then(|| session.clone());
        }

        let payload = self.to_event().package(client.packaging_info());
        let long_url = self.create_long_url(client, None);
        let shared = Arc::clone(&self.shared);

        let spawned = std::thread::Builder::new()
            .name("branchio-link".to_owned())
            .spawn(move || {
                request_link(&*session, &payload, &long_url, &shared, &*callback);
                shared.complete();
            });

        match spawned {
            Ok(join_handle) => {
                *self
                    .join_handle
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(join_handle);
                Ok(())
            }
            Err(err) => {
                self.shared.complete();
                Err(err.into())
            }
        }
    }

    /// Cancel the link request. Safe to call in any state and more than once.
    ///
    /// A session the link shares with the client's request queue keeps running. The link's
    /// response is discarded instead.
    pub fn cancel(&self) {
        self.shared.canceled.store(true, Ordering::Release);
        let session = self.shared.state().session.clone();
        if let Some(session) = session {
            session.stop();
        }
    }

    /// `true` after [`LinkInfo::cancel`].
    pub fn is_canceled(&self) -> bool {
        self.shared.canceled.load(Ordering::Acquire)
    }

    /// `true` once the link request finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.shared.state().phase == Phase::Complete
    }

    /// Block until the link request in flight completes. Returns immediately if none was started.
    pub fn wait_till_complete(&self) {
        {
            let state = self.shared.state();
            let _state = self
                .shared
                .completed
                .wait_while(state, |state| state.phase == Phase::InFlight)
                .unwrap_or_else(PoisonError::into_inner);
        }

        let join_handle = self
            .join_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join_handle) = join_handle {
            if join_handle.join().is_err() {
                log::error!(target: "branch", "link request thread panicked");
            }
        }
    }

    /// Build a long link from the link parameters, without contacting the server.
    ///
    /// The link has the form `{base}/a/{branch_key}?alias=...&channel=...&data=...`, where `data`
    /// is the base64-encoded JSON of the control parameters. `base` defaults to the client's link
    /// base URL. Returns an empty string when the client has no Branch key.
    pub fn create_long_url(&self, client: &Client, base: Option<&str>) -> String {
        let branch_key = client.branch_key();
        if branch_key.is_empty() {
            return String::new();
        }
        let base = base.unwrap_or(client.link_base_url()).trim_end_matches('/');

        let mut params: Vec<(&str, String)> = Vec::new();
        for key in [
            keys::LINK_ALIAS,
            keys::LINK_CHANNEL,
            keys::LINK_FEATURE,
            keys::LINK_STAGE,
            keys::LINK_CAMPAIGN,
        ] {
            if let Some(value) = self.properties.get_str(key) {
                params.push((key, value.to_owned()));
            }
        }
        for tag in &self.tags {
            params.push((keys::LINK_TAGS, tag.clone()));
        }
        for key in [keys::LINK_TYPE, keys::LINK_DURATION] {
            if let Some(value) = self.properties.get(key) {
                params.push((key, value.to_string()));
            }
        }
        params.push(("source", LONG_LINK_SOURCE.to_owned()));
        if !self.control_params.is_empty() {
            params.push((keys::DATA, STANDARD.encode(self.control_params.to_string())));
        }

        match Url::parse_with_params(&format!("{base}/a/{branch_key}"), &params) {
            Ok(url) => url.into(),
            Err(err) => {
                log::warn!(target: "branch", base; "failed to build long url: {err}");
                String::new()
            }
        }
    }
}

impl Drop for LinkInfo {
    fn drop(&mut self) {
        self.wait_till_complete();
    }
}

#[derive(Default)]
struct Failure {
    last: Mutex<Option<(i32, String)>>,
}

impl Failure {
    fn record(&self, code: i32, message: &str) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some((code, message.to_owned()));
    }

    fn take(&self) -> (i32, String) {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| (0, "Link request failed".to_owned()))
    }
}

impl RequestCallback for Failure {
    fn on_success(&self, _id: i32, _response: Value) {}

    fn on_error(&self, _id: i32, code: i32, message: &str) {
        self.record(code, message);
    }

    fn on_status(&self, _id: i32, code: i32, message: &str) {
        self.record(code, message);
    }
}

/// Body of the link request thread.
fn request_link(
    session: &dyn ClientSession,
    payload: &Value,
    long_url: &str,
    shared: &Shared,
    callback: &dyn RequestCallback,
) {
    let failure = Failure::default();
    let attempt = if shared.canceled.load(Ordering::Acquire) {
        Attempt::Retry
    } else {
        session.post(ApiEndpoint::Url.path(), payload, &failure)
    };

    if shared.canceled.load(Ordering::Acquire) {
        log::debug!(target: "branch", "link request canceled");
        callback.on_status(0, 0, "Request canceled");
        return;
    }

    match attempt {
        Attempt::Finished(Some(response)) => callback.on_success(0, response),
        Attempt::Finished(None) | Attempt::Retry => {
            let (code, message) = failure.take();
            if long_url.is_empty() {
                callback.on_error(0, code, &message);
            } else {
                log::warn!(target: "branch", code; "link request failed, falling back to long url: {message}");
                let mut response = PropertyBag::new();
                response.set(keys::URL, long_url);
                callback.on_success(0, response.into_json());
            }
        }
    }
}
