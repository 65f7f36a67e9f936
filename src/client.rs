use std::sync::Arc;

use reqwest::Url;

use crate::{
    default_storage, session_info::STORED_KEYS, storage::Storage, AdvertiserInfo, ApiEndpoint,
    AppInfo, ClientConfig, ClientSession, DeviceInfo, Error, Event, PackagingInfo,
    RequestCallback, RequestManager, RequestManagerOptions, Result, SessionCallback, SessionInfo,
};

/// A client for the Branch API.
///
/// In order to create a client instance, first create [`ClientConfig`]. The client owns a
/// background worker that sends requests one at a time. Results are delivered to the
/// [`RequestCallback`] passed with each request (or the configured default callback).
///
/// # Examples
/// ```no_run
/// # use std::sync::Arc;
/// # use branchio::{ClientConfig, Event, RequestCallback, StandardEventType};
/// let client = ClientConfig::new("key_live_xxx").to_client()?;
///
/// let callback: Arc<dyn RequestCallback> =
///     Arc::new(|result: Result<serde_json::Value, String>| println!("{result:?}"));
/// client.open_session("", Some(callback.clone()))?;
/// client.send_event(
///     Event::standard(StandardEventType::Purchase).set_revenue(9.99),
///     Some(callback),
/// )?;
///
/// client.stop();
/// client.wait_till_finished()?;
/// # Ok::<(), branchio::Error>(())
/// ```
pub struct Client {
    packaging_info: Arc<PackagingInfo>,
    request_manager: RequestManager,
    link_base_url: String,
}

impl Client {
    /// Create a new `Client` using the specified configuration and start its request worker.
    pub fn new(config: ClientConfig) -> Result<Client> {
        let base_url = Url::parse(&config.base_url).map_err(Error::InvalidBaseUrl)?;

        let storage = Storage::new(config.storage.unwrap_or_else(default_storage))
            .with_prefix(config.branch_key.as_str());
        if let Err(err) = storage.migrate_legacy(STORED_KEYS) {
            log::warn!(target: "branch", "failed to migrate legacy session storage: {err}");
        }

        let packaging_info = Arc::new(PackagingInfo::new(
            config.branch_key,
            config.app_info,
            config.device_info,
            SessionInfo::new(storage),
        ));

        let http_client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let request_manager = RequestManager::new(
            packaging_info.clone(),
            RequestManagerOptions {
                base_url,
                retry_policy: config.retry_policy,
                client_session: config.client_session,
                http_client,
            },
        );
        request_manager.set_default_callback(config.default_callback);
        request_manager.start()?;

        log::debug!(target: "branch", branch_key = packaging_info.branch_key(); "client started");

        Ok(Client {
            packaging_info,
            request_manager,
            link_base_url: config.link_base_url,
        })
    }

    /// Open a session, optionally attributing it to the link that opened the app.
    ///
    /// The session id and tokens returned by the server are stored before `callback` is notified.
    pub fn open_session(
        &self,
        link_url: &str,
        callback: Option<Arc<dyn RequestCallback>>,
    ) -> Result<()> {
        self.send_event(Event::session_open().set_link_url(link_url), callback)
    }

    /// Sessions are closed by the server. This only reports a status to `callback`.
    pub fn close_session(&self, callback: Option<Arc<dyn RequestCallback>>) {
        if let Some(callback) = self.resolve_callback(callback) {
            callback.on_status(0, 0, "Session close is handled by the server");
        }
    }

    /// Send `event`.
    ///
    /// While tracking is disabled only session opens are sent. Any other event is rejected
    /// locally: `callback` gets a status followed by an error, and nothing is sent.
    ///
    /// Returns [`Error::MissingCallback`] if `callback` is `None` and no default callback is set.
    pub fn send_event(
        &self,
        event: Event,
        callback: Option<Arc<dyn RequestCallback>>,
    ) -> Result<()> {
        let callback = self
            .resolve_callback(callback)
            .ok_or(Error::MissingCallback)?;

        if self.advertiser_info().is_tracking_disabled()
            && event.endpoint() != ApiEndpoint::RegisterOpen
        {
            log::debug!(target: "branch", name = event.name(); "tracking is disabled, dropping event");
            callback.on_status(
                0,
                0,
                "Requested operation cannot be completed since tracking is disabled",
            );
            callback.on_error(0, 0, "Tracking is disabled");
            return Ok(());
        }

        let callback = SessionCallback::new(
            self.packaging_info.clone(),
            event.endpoint(),
            Some(callback),
        );
        self.request_manager
            .enqueue(event, Some(Arc::new(callback)), false)
    }

    /// Identify the current user. Requires an open session.
    pub fn set_identity(
        &self,
        user_id: &str,
        callback: Option<Arc<dyn RequestCallback>>,
    ) -> Result<()> {
        self.send_with_session(Event::identity_login(user_id), callback)
    }

    /// Log the current user out. Requires an open session.
    pub fn logout(&self, callback: Option<Arc<dyn RequestCallback>>) -> Result<()> {
        self.send_with_session(Event::identity_logout(), callback)
    }

    fn send_with_session(
        &self,
        event: Event,
        callback: Option<Arc<dyn RequestCallback>>,
    ) -> Result<()> {
        if self.session_info().has_session_id() {
            return self.send_event(event, callback);
        }

        let callback = self
            .resolve_callback(callback)
            .ok_or(Error::MissingCallback)?;
        callback.on_error(0, 0, "No Session has been started.");
        Ok(())
    }

    fn resolve_callback(
        &self,
        callback: Option<Arc<dyn RequestCallback>>,
    ) -> Option<Arc<dyn RequestCallback>> {
        callback.or_else(|| self.request_manager.default_callback())
    }

    /// Advertiser ids and tracking preferences, shared with packaging.
    pub fn advertiser_info(&self) -> &AdvertiserInfo {
        self.packaging_info.advertiser_info()
    }

    /// Opt out of tracking. The current session and stored tokens are forgotten.
    pub fn disable_tracking(&self) {
        self.packaging_info.disable_tracking();
    }

    /// Opt back into tracking. A new session is opened since the previous one was discarded.
    pub fn enable_tracking(&self) -> Result<()> {
        if !self.advertiser_info().is_tracking_disabled() {
            return Ok(());
        }
        self.advertiser_info().enable_tracking();

        let event = Event::session_open();
        let callback = SessionCallback::new(
            self.packaging_info.clone(),
            event.endpoint(),
            self.request_manager.default_callback(),
        );
        self.request_manager
            .enqueue(event, Some(Arc::new(callback)), false)
    }

    /// Current session id and tokens.
    pub fn session_info(&self) -> &SessionInfo {
        self.packaging_info.session_info()
    }

    /// Snapshot of the app info.
    pub fn app_info(&self) -> AppInfo {
        self.packaging_info.app_info()
    }

    /// Snapshot of the device info.
    pub fn device_info(&self) -> DeviceInfo {
        self.packaging_info.device_info()
    }

    /// Branch key the client was configured with.
    pub fn branch_key(&self) -> &str {
        self.packaging_info.branch_key()
    }

    /// SDK version.
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Stop the request worker. The request in flight is canceled. Does not wait for the worker to
    /// exit.
    pub fn stop(&self) {
        self.request_manager.stop();
    }

    /// Block waiting for the request worker to exit after [`Client::stop`].
    pub fn wait_till_finished(&self) -> Result<()> {
        self.request_manager.wait_till_finished()
    }

    pub(crate) fn packaging_info(&self) -> &Arc<PackagingInfo> {
        &self.packaging_info
    }

    pub(crate) fn link_base_url(&self) -> &str {
        &self.link_base_url
    }

    /// A client session for a request made outside the queue, and whether it belongs to the
    /// caller alone. A session shared with the request worker must not be stopped by the caller.
    pub(crate) fn new_client_session(&self) -> (Arc<dyn ClientSession>, bool) {
        (
            self.request_manager.new_session(),
            !self.request_manager.shares_session(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    use serde_json::json;

    use crate::{
        storage::Storage,
        test_support::{init_logger, MockClientSession, RecordingCallback},
        Client, ClientConfig, Error, Event, MemoryStorage, RequestCallback, RetryPolicy, Scope,
        StandardEventType, StorageBackend,
    };

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn config(session: &Arc<MockClientSession>, storage: &Arc<MemoryStorage>) -> ClientConfig {
        init_logger();
        ClientConfig::new("key_test")
            .client_session(session.clone())
            .storage(storage.clone())
            .retry_policy(RetryPolicy {
                max_attempts: 5,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            })
    }

    fn client(session: &Arc<MockClientSession>) -> Client {
        config(session, &Arc::new(MemoryStorage::new()))
            .to_client()
            .unwrap()
    }

    fn callback() -> (Arc<RecordingCallback>, Option<Arc<dyn RequestCallback>>) {
        let callback = RecordingCallback::new();
        let erased: Arc<dyn RequestCallback> = callback.clone();
        (callback, Some(erased))
    }

    #[test]
    fn purchase_updates_session() {
        let session = MockClientSession::succeeding(json!({"session_id": "abc123"}));
        let client = client(&session);
        let (recorder, callback) = callback();

        client
            .send_event(
                Event::standard(StandardEventType::Purchase)
                    .set_revenue(99.99)
                    .set_transaction_id("T1"),
                callback,
            )
            .unwrap();

        assert!(recorder.wait_for_terminal(1, TIMEOUT));
        assert_eq!(client.session_info().session_id().as_deref(), Some("abc123"));
        assert_eq!(recorder.successes(), vec![json!({"session_id": "abc123"})]);

        let (path, payload) = &session.posts()[0];
        assert_eq!(path, "v2/event/standard");
        assert_eq!(payload["name"], "PURCHASE");
        assert_eq!(
            payload["event_data"],
            json!({"revenue": 99.99, "transaction_id": "T1"})
        );
    }

    #[test]
    fn open_session_persists_tokens() {
        let session = MockClientSession::succeeding(json!({
            "session_id": "abc123",
            "randomized_device_token": "device",
            "randomized_bundle_token": "bundle",
        }));
        let storage = Arc::new(MemoryStorage::new());
        let client = config(&session, &storage).to_client().unwrap();
        let (recorder, callback) = callback();

        client
            .open_session("https://example.app.link/abc", callback)
            .unwrap();
        assert!(recorder.wait_for_terminal(1, TIMEOUT));

        let (path, payload) = &session.posts()[0];
        assert_eq!(path, "v1/open");
        assert_eq!(payload["external_intent_uri"], "https://example.app.link/abc");

        let persisted = Storage::new(storage).with_prefix("key_test");
        assert_eq!(
            persisted.get_string("session.randomized_device_token").as_deref(),
            Some("device")
        );
        assert_eq!(
            persisted.get_string("session.randomized_bundle_token").as_deref(),
            Some("bundle")
        );
        // Session ids are never persisted.
        assert!(!persisted.has("session.session_id"));
    }

    #[test]
    fn events_are_rejected_while_tracking_is_disabled() {
        let session = MockClientSession::succeeding(json!({"session_id": "abc123"}));
        let client = client(&session);
        client.disable_tracking();
        let (recorder, callback) = callback();

        client
            .send_event(Event::custom("my_event"), callback.clone())
            .unwrap();
        assert_eq!(
            recorder.statuses(),
            vec!["Requested operation cannot be completed since tracking is disabled".to_owned()]
        );
        assert_eq!(recorder.errors(), vec!["Tracking is disabled".to_owned()]);

        client.open_session("", callback).unwrap();
        assert!(recorder.wait_for_terminal(2, TIMEOUT));

        let posts = session.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "v1/open");
        assert_eq!(posts[0].1["tracking_disabled"], true);
        // Sessions are not stored while tracking is disabled.
        assert!(!client.session_info().has_session_id());
    }

    #[test]
    fn enabling_tracking_opens_a_session() {
        let session = MockClientSession::succeeding(json!({"session_id": "fresh"}));
        let client = client(&session);
        client.session_info().set_session_id("stale").set_bundle_token("bundle");

        client.disable_tracking();
        assert!(!client.session_info().has_session_id());
        assert_eq!(client.session_info().bundle_token(), None);

        client.enable_tracking().unwrap();
        assert!(session.wait_for_posts(1, TIMEOUT));

        let deadline = Instant::now() + TIMEOUT;
        while !client.session_info().has_session_id() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.paths(), vec!["v1/open".to_owned()]);
        assert_eq!(client.session_info().session_id().as_deref(), Some("fresh"));
    }

    #[test]
    fn identity_requires_session() {
        let session = MockClientSession::succeeding(json!({}));
        let client = client(&session);
        let (recorder, callback) = callback();

        client.set_identity("user-1", callback.clone()).unwrap();
        client.logout(callback.clone()).unwrap();
        assert_eq!(
            recorder.errors(),
            vec![
                "No Session has been started.".to_owned(),
                "No Session has been started.".to_owned()
            ]
        );

        client.session_info().set_session_id("abc123");
        client.set_identity("user-1", callback).unwrap();
        assert!(recorder.wait_for_terminal(3, TIMEOUT));

        let (path, payload) = &session.posts()[0];
        assert_eq!(path, "v1/profile");
        assert_eq!(payload["identity"], "user-1");
        assert_eq!(payload["session_id"], "abc123");
    }

    #[test]
    fn close_session_only_reports_status() {
        let session = MockClientSession::succeeding(json!({}));
        let client = client(&session);
        let (recorder, callback) = callback();

        client.close_session(callback);

        assert_eq!(recorder.statuses().len(), 1);
        assert_eq!(recorder.terminal_count(), 0);
        assert!(session.posts().is_empty());
    }

    #[test]
    fn send_event_without_any_callback_fails() {
        let session = MockClientSession::succeeding(json!({}));
        let client = client(&session);

        let result = client.send_event(Event::custom("x"), None);
        assert!(matches!(result, Err(Error::MissingCallback)));
    }

    #[test]
    fn default_callback_receives_results() {
        let session = MockClientSession::succeeding(json!({"ok": true}));
        let recorder = RecordingCallback::new();
        let client = {
            let recorder = recorder.clone();
            config(&session, &Arc::new(MemoryStorage::new()))
                .default_callback(move |result: Result<serde_json::Value, String>| match result {
                    Ok(value) => recorder.on_success(0, value),
                    Err(message) => recorder.on_error(0, 0, &message),
                })
                .to_client()
                .unwrap()
        };

        client.send_event(Event::custom("x"), None).unwrap();
        assert!(recorder.wait_for_terminal(1, TIMEOUT));
        assert_eq!(recorder.successes(), vec![json!({"ok": true})]);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = ClientConfig::new("key_test")
            .storage(Arc::new(MemoryStorage::new()))
            .base_url("not a url")
            .to_client();
        assert!(matches!(result, Err(Error::InvalidBaseUrl(_))));
    }

    #[test]
    fn legacy_tokens_are_migrated() {
        let session = MockClientSession::succeeding(json!({}));
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_string("session.identity_id", "legacy-bundle", Scope::User)
            .unwrap();

        let client = config(&session, &storage).to_client().unwrap();

        assert_eq!(
            client.session_info().bundle_token().as_deref(),
            Some("legacy-bundle")
        );
    }

    #[test]
    fn version_is_crate_version() {
        assert_eq!(Client::version(), env!("CARGO_PKG_VERSION"));
    }
}
