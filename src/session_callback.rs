use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::Value;

use crate::{defines::keys, ApiEndpoint, PackagingInfo, RequestCallback};

/// Callback wrapper that records the session returned by the server before forwarding the
/// response to the caller.
///
/// On success, if the response carries a `session_id` and tracking is enabled, the session id and
/// bundle token are stored in the client's [`SessionInfo`](crate::SessionInfo) (plus the device
/// token for session opens). A `data` field holding stringified JSON is parsed before the response
/// is forwarded.
///
/// The wrapper is single use: after the first terminal callback (`on_success` or `on_error`) all
/// further callbacks are dropped.
pub struct SessionCallback {
    packaging_info: Arc<PackagingInfo>,
    endpoint: ApiEndpoint,
    parent: Option<Arc<dyn RequestCallback>>,
    fired: AtomicBool,
}

impl SessionCallback {
    /// Wrap `parent` for a request to `endpoint`. `parent` may be `None` to only store the session.
    pub fn new(
        packaging_info: Arc<PackagingInfo>,
        endpoint: ApiEndpoint,
        parent: Option<Arc<dyn RequestCallback>>,
    ) -> SessionCallback {
        SessionCallback {
            packaging_info,
            endpoint,
            parent,
            fired: AtomicBool::new(false),
        }
    }

    /// `true` once the terminal callback was delivered.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Mark the terminal callback as delivered. Returns `false` if it already was.
    fn fire(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        if !first {
            log::warn!(target: "branch", path = self.endpoint.path(); "dropping callback after terminal callback was delivered");
        }
        first
    }

    fn update_session(&self, response: &Value) {
        let Some(session_id) = response.get(keys::SESSION_ID).and_then(Value::as_str) else {
            return;
        };

        let advertiser_info = self.packaging_info.advertiser_info();
        let device_token = (self.endpoint == ApiEndpoint::RegisterOpen).then(|| {
            token(
                response,
                keys::RANDOMIZED_DEVICE_TOKEN,
                keys::DEVICE_FINGERPRINT_ID,
            )
        });
        let stored = self.packaging_info.session_info().store_session(
            session_id,
            token(response, keys::RANDOMIZED_BUNDLE_TOKEN, keys::IDENTITY_ID),
            device_token,
            || advertiser_info.is_tracking_disabled(),
        );
        if stored {
            log::debug!(target: "branch", session_id; "session updated");
        } else {
            log::debug!(target: "branch", "tracking is disabled, not storing session");
        }
    }
}

/// Token under `key`, falling back to its legacy name. Empty if neither is present.
fn token<'a>(response: &'a Value, key: &str, legacy_key: &str) -> &'a str {
    response
        .get(key)
        .or_else(|| response.get(legacy_key))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Replace a `data` string holding JSON with the parsed value.
fn parse_data_field(response: &mut Value) {
    let Some(data) = response.get_mut(keys::DATA) else {
        return;
    };
    let Some(text) = data.as_str() else {
        return;
    };
    match serde_json::from_str::<Value>(text) {
        Ok(parsed) => *data = parsed,
        Err(err) => log::warn!(target: "branch", "response data is not valid JSON: {err}"),
    }
}

impl RequestCallback for SessionCallback {
    fn on_success(&self, id: i32, mut response: Value) {
        if !self.fire() {
            return;
        }

        self.update_session(&response);
        parse_data_field(&mut response);

        log::debug!(target: "branch", response:serde = response; "session request succeeded");
        if let Some(parent) = &self.parent {
            parent.on_success(id, response);
        }
    }

    fn on_error(&self, id: i32, code: i32, message: &str) {
        if !self.fire() {
            return;
        }
        if let Some(parent) = &self.parent {
            parent.on_error(id, code, message);
        }
    }

    fn on_status(&self, id: i32, code: i32, message: &str) {
        if self.has_fired() {
            return;
        }
        if let Some(parent) = &self.parent {
            parent.on_status(id, code, message);
        }
    }
}
