use std::{sync::Arc, time::Duration};

use crate::{
    AppInfo, Client, ClientSession, DeviceInfo, RequestCallback, Result, RetryPolicy,
    StorageBackend,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```no_run
/// # use branchio::{AppInfo, ClientConfig};
/// let client = ClientConfig::new("key_live_xxx")
///     .app_info(AppInfo::new().set_app_version("1.0"))
///     .to_client()
///     .unwrap();
/// ```
pub struct ClientConfig {
    pub(crate) branch_key: String,
    pub(crate) base_url: String,
    pub(crate) link_base_url: String,
    pub(crate) app_info: AppInfo,
    pub(crate) device_info: DeviceInfo,
    pub(crate) storage: Option<Arc<dyn StorageBackend>>,
    pub(crate) client_session: Option<Arc<dyn ClientSession>>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) request_timeout: Duration,
    pub(crate) default_callback: Option<Arc<dyn RequestCallback>>,
}

impl ClientConfig {
    /// Default base URL for API calls.
    pub const DEFAULT_BASE_URL: &'static str = "https://api2.branch.io";

    /// Default base URL for long links built locally.
    pub const DEFAULT_LINK_BASE_URL: &'static str = "https://bnc.lt";

    /// Default timeout of a single HTTP request.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a default configuration using the specified Branch key.
    ///
    /// ```
    /// # use branchio::ClientConfig;
    /// ClientConfig::new("key_live_xxx");
    /// ```
    pub fn new(branch_key: impl Into<String>) -> ClientConfig {
        ClientConfig {
            branch_key: branch_key.into(),
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            link_base_url: ClientConfig::DEFAULT_LINK_BASE_URL.to_owned(),
            app_info: AppInfo::new(),
            device_info: DeviceInfo::from_host(),
            storage: None,
            client_session: None,
            retry_policy: RetryPolicy::default(),
            request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
            default_callback: None,
        }
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override base URL of long links built when link creation fails.
    pub fn link_base_url(mut self, link_base_url: impl Into<String>) -> Self {
        self.link_base_url = link_base_url.into();
        self
    }

    /// Application context sent with every request.
    pub fn app_info(mut self, app_info: AppInfo) -> Self {
        self.app_info = app_info;
        self
    }

    /// Replace the device info. Defaults to [`DeviceInfo::from_host`].
    pub fn device_info(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = device_info;
        self
    }

    /// Storage for persisted session tokens. Defaults to [`default_storage`](crate::default_storage).
    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Send all requests through `client_session` instead of HTTP.
    pub fn client_session(mut self, client_session: Arc<dyn ClientSession>) -> Self {
        self.client_session = Some(client_session);
        self
    }

    /// Override attempt count and backoff of queued requests.
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Override the timeout of a single HTTP request.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Callback for requests sent without one.
    ///
    /// ```
    /// # use branchio::ClientConfig;
    /// let config = ClientConfig::new("key_live_xxx").default_callback(|result: Result<serde_json::Value, String>| {
    ///     println!("{:?}", result);
    /// });
    /// ```
    pub fn default_callback(mut self, callback: impl RequestCallback + 'static) -> Self {
        self.default_callback = Some(Arc::new(callback));
        self
    }

    /// Create a new [`Client`] using the specified configuration and start its request worker.
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}
