//! The context that events are packaged against.
use std::sync::{PoisonError, RwLock};

use crate::{AdvertiserInfo, AppInfo, DeviceInfo, SessionInfo};

/// Branch key plus the app, device, session and advertiser context of a client.
///
/// Packaging reads this at the moment a request executes, not when it is enqueued, so changes
/// made after `enqueue` (e.g., a new session id) are visible to queued requests.
pub struct PackagingInfo {
    branch_key: String,
    app_info: RwLock<AppInfo>,
    device_info: RwLock<DeviceInfo>,
    session_info: SessionInfo,
    advertiser_info: AdvertiserInfo,
}

impl PackagingInfo {
    /// Context for `branch_key`. Advertiser info starts empty with tracking enabled.
    pub fn new(
        branch_key: impl Into<String>,
        app_info: AppInfo,
        device_info: DeviceInfo,
        session_info: SessionInfo,
    ) -> PackagingInfo {
        PackagingInfo {
            branch_key: branch_key.into(),
            app_info: RwLock::new(app_info),
            device_info: RwLock::new(device_info),
            session_info,
            advertiser_info: AdvertiserInfo::new(),
        }
    }

    /// Branch key sent with every request.
    pub fn branch_key(&self) -> &str {
        &self.branch_key
    }

    /// Snapshot of the current app info.
    pub fn app_info(&self) -> AppInfo {
        self.app_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the app info used by requests packaged from now on.
    pub fn set_app_info(&self, app_info: AppInfo) {
        *self.app_info.write().unwrap_or_else(PoisonError::into_inner) = app_info;
    }

    /// Snapshot of the current device info.
    pub fn device_info(&self) -> DeviceInfo {
        self.device_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the device info used by requests packaged from now on.
    pub fn set_device_info(&self, device_info: DeviceInfo) {
        *self.device_info.write().unwrap_or_else(PoisonError::into_inner) = device_info;
    }

    /// Session id and tokens.
    pub fn session_info(&self) -> &SessionInfo {
        &self.session_info
    }

    /// Advertiser ids and tracking preferences.
    pub fn advertiser_info(&self) -> &AdvertiserInfo {
        &self.advertiser_info
    }

    /// Opt out of tracking and forget the session and its tokens.
    ///
    /// The flag is raised under the session lock, so a session response being stored concurrently
    /// either lands before the clear or is rejected.
    pub fn disable_tracking(&self) {
        self.session_info.clear_identity_with(|| {
            self.advertiser_info.disable_tracking();
        });
    }
}
