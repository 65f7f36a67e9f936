//! Server endpoints and the JSON keys shared by packaging and response handling.
use std::fmt;

/// Packaging scheme used for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Event properties are sent verbatim.
    Raw,
    /// Legacy session endpoints. Context is flattened into the top-level object.
    V1,
    /// Event endpoints. Context is nested under `user_data`.
    V2,
}

/// API endpoints known to the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiEndpoint {
    /// `v1/open`: start a session.
    RegisterOpen,
    /// `v1/close`: end a session.
    RegisterClose,
    /// `v1/register-view`: a content view.
    RegisterView,
    /// `v1/logout`: forget the developer identity.
    Logout,
    /// `v1/url`: create a short link.
    Url,
    /// `v1/profile`: set the developer identity.
    IdentifyUser,
    /// `v1/redeem`: redeem referral credits.
    RedeemRewards,
    /// `v1/credits`: referral credit balance.
    GetCredits,
    /// `v1/credithistory`: referral credit transactions.
    GetCreditHistory,
    /// `v1/event`: legacy custom action.
    CompletedAction,
    /// `v1/referralcode`: fetch a referral code.
    GetReferralCode,
    /// `v1/referralcode`: check a referral code.
    ValidateReferralCode,
    /// `v1/applycode`: apply a referral code.
    ApplyReferralCode,
    /// `v1/content-events`: content analytics.
    ContentEvent,
    /// `v2/event/standard`: a [`StandardEventType`](crate::StandardEventType) event.
    TrackStandardEvent,
    /// `v2/event/custom`: an event with an app-defined name.
    TrackCustomEvent,
    /// `v1/app-link-settings`: app link configuration, sent unpackaged.
    AppLinkSettings,
}

impl ApiEndpoint {
    /// Path relative to the API base URL.
    pub fn path(self) -> &'static str {
        match self {
            ApiEndpoint::RegisterOpen => "v1/open",
            ApiEndpoint::RegisterClose => "v1/close",
            ApiEndpoint::RegisterView => "v1/register-view",
            ApiEndpoint::Logout => "v1/logout",
            ApiEndpoint::Url => "v1/url",
            ApiEndpoint::IdentifyUser => "v1/profile",
            ApiEndpoint::RedeemRewards => "v1/redeem",
            ApiEndpoint::GetCredits => "v1/credits",
            ApiEndpoint::GetCreditHistory => "v1/credithistory",
            ApiEndpoint::CompletedAction => "v1/event",
            ApiEndpoint::GetReferralCode | ApiEndpoint::ValidateReferralCode => "v1/referralcode",
            ApiEndpoint::ApplyReferralCode => "v1/applycode",
            ApiEndpoint::ContentEvent => "v1/content-events",
            ApiEndpoint::TrackStandardEvent => "v2/event/standard",
            ApiEndpoint::TrackCustomEvent => "v2/event/custom",
            ApiEndpoint::AppLinkSettings => "v1/app-link-settings",
        }
    }

    /// Packaging scheme for this endpoint.
    pub fn kind(self) -> EndpointKind {
        match self {
            ApiEndpoint::RegisterOpen
            | ApiEndpoint::RegisterClose
            | ApiEndpoint::RegisterView
            | ApiEndpoint::IdentifyUser
            | ApiEndpoint::Logout
            | ApiEndpoint::Url => EndpointKind::V1,
            ApiEndpoint::ApplyReferralCode
            | ApiEndpoint::CompletedAction
            | ApiEndpoint::ContentEvent
            | ApiEndpoint::GetCredits
            | ApiEndpoint::GetCreditHistory
            | ApiEndpoint::GetReferralCode
            | ApiEndpoint::RedeemRewards
            | ApiEndpoint::TrackCustomEvent
            | ApiEndpoint::TrackStandardEvent
            | ApiEndpoint::ValidateReferralCode => EndpointKind::V2,
            ApiEndpoint::AppLinkSettings => EndpointKind::Raw,
        }
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// JSON keys used on the wire.
pub mod keys {
    /// Branch key identifying the app.
    pub const BRANCH_KEY: &str = "branch_key";
    /// Event name.
    pub const NAME: &str = "name";
    /// Standard event properties in V2 payloads.
    pub const EVENT_DATA: &str = "event_data";
    /// App-defined event properties.
    pub const CUSTOM_DATA: &str = "custom_data";
    /// Nested app, device and session context in V2 payloads.
    pub const USER_DATA: &str = "user_data";
    /// Advertiser ids, keyed by [`AdIdType`](crate::AdIdType) name.
    pub const ADVERTISING_IDS: &str = "advertising_ids";
    /// Set on requests sent while tracking is disabled.
    pub const TRACKING_DISABLED: &str = "tracking_disabled";
    /// Link data, in link requests and in session responses.
    pub const DATA: &str = "data";

    // Event
    /// Ad type of an ad event.
    pub const AD_TYPE: &str = "ad_type";
    /// Store or affiliate of a commerce event.
    pub const AFFILIATION: &str = "affiliation";
    /// Coupon code of a commerce event.
    pub const COUPON: &str = "coupon";
    /// ISO 4217 currency code of a commerce event.
    pub const CURRENCY: &str = "currency";
    /// Alias shown for the event on the dashboard.
    pub const CUSTOMER_EVENT_ALIAS: &str = "customer_event_alias";
    /// Free-form event description.
    pub const DESCRIPTION: &str = "description";
    /// Revenue of a commerce event.
    pub const REVENUE: &str = "revenue";
    /// Query of a search event.
    pub const SEARCH_QUERY: &str = "search_query";
    /// Shipping cost of a commerce event.
    pub const SHIPPING: &str = "shipping";
    /// Tax of a commerce event.
    pub const TAX: &str = "tax";
    /// Transaction id of a commerce event.
    pub const TRANSACTION_ID: &str = "transaction_id";

    // Device
    /// Hardware brand.
    pub const DEVICE_BRAND: &str = "brand";
    /// OS build identifier.
    pub const DEVICE_BUILD: &str = "build";
    /// ISO country code.
    pub const DEVICE_COUNTRY: &str = "country";
    /// UI language.
    pub const DEVICE_LANGUAGE: &str = "language";
    /// Local IP address.
    pub const DEVICE_LOCAL_IP_ADDRESS: &str = "local_ip";
    /// MAC address.
    pub const DEVICE_MAC_ADDRESS: &str = "mac_address";
    /// Hardware model.
    pub const DEVICE_MODEL: &str = "model";
    /// Operating system name.
    pub const DEVICE_OS: &str = "os";
    /// Operating system version.
    pub const DEVICE_OS_VERSION: &str = "os_version";
    /// Screen density.
    pub const DEVICE_SCREEN_DPI: &str = "screen_dpi";
    /// Screen height in pixels.
    pub const DEVICE_SCREEN_HEIGHT: &str = "screen_height";
    /// Screen width in pixels.
    pub const DEVICE_SCREEN_WIDTH: &str = "screen_width";

    // App
    /// Developer-assigned user identity.
    pub const APP_DEVELOPER_IDENTITY: &str = "developer_identity";
    /// Runtime environment.
    pub const APP_ENVIRONMENT: &str = "environment";
    /// Identity sent by [`ApiEndpoint::IdentifyUser`](crate::ApiEndpoint::IdentifyUser).
    pub const APP_IDENTITY: &str = "identity";
    /// Limit-ad-tracking flag in V1 payloads.
    pub const APP_LAT_V1: &str = "lat_val";
    /// Limit-ad-tracking flag in V2 payloads.
    pub const APP_LAT_V2: &str = "limit_ad_tracking";
    /// Link that opened the app.
    pub const APP_LINK_URL: &str = "external_intent_uri";
    /// Package (bundle) name.
    pub const APP_PACKAGE_NAME: &str = "bundle";
    /// SDK name.
    pub const APP_SDK: &str = "sdk";
    /// SDK version.
    pub const APP_SDK_VERSION: &str = "sdk_version";
    /// User agent of the host.
    pub const APP_USER_AGENT: &str = "user_agent";
    /// App version.
    pub const APP_VERSION: &str = "app_version";

    // Session
    /// Server-assigned session id.
    pub const SESSION_ID: &str = "session_id";
    /// Token identifying the device across sessions.
    pub const RANDOMIZED_DEVICE_TOKEN: &str = "randomized_device_token";
    /// Token identifying the app install.
    pub const RANDOMIZED_BUNDLE_TOKEN: &str = "randomized_bundle_token";
    /// Legacy name of [`RANDOMIZED_DEVICE_TOKEN`].
    pub const DEVICE_FINGERPRINT_ID: &str = "device_fingerprint_id";
    /// Legacy name of [`RANDOMIZED_BUNDLE_TOKEN`].
    pub const IDENTITY_ID: &str = "identity_id";

    // Link
    /// Custom path of a link.
    pub const LINK_ALIAS: &str = "alias";
    /// Campaign of a link.
    pub const LINK_CAMPAIGN: &str = "campaign";
    /// Channel a link is shared on.
    pub const LINK_CHANNEL: &str = "channel";
    /// Match duration of a link, in seconds.
    pub const LINK_DURATION: &str = "duration";
    /// Feature a link belongs to.
    pub const LINK_FEATURE: &str = "feature";
    /// Stage of a link.
    pub const LINK_STAGE: &str = "stage";
    /// Tags of a link.
    pub const LINK_TAGS: &str = "tags";
    /// Link type, see [`LINK_TYPE_ONE_TIME_USE`](crate::LINK_TYPE_ONE_TIME_USE).
    pub const LINK_TYPE: &str = "type";
    /// Link returned by the server.
    pub const URL: &str = "url";
}

#[cfg(test)]
mod tests {
    use super::{ApiEndpoint, EndpointKind};

    #[test]
    fn session_endpoints_use_v1() {
        for endpoint in [
            ApiEndpoint::RegisterOpen,
            ApiEndpoint::RegisterClose,
            ApiEndpoint::Logout,
            ApiEndpoint::Url,
            ApiEndpoint::IdentifyUser,
        ] {
            assert_eq!(endpoint.kind(), EndpointKind::V1, "{endpoint}");
        }
    }

    #[test]
    fn event_endpoints_use_v2() {
        assert_eq!(ApiEndpoint::TrackStandardEvent.kind(), EndpointKind::V2);
        assert_eq!(ApiEndpoint::TrackCustomEvent.kind(), EndpointKind::V2);
        assert_eq!(ApiEndpoint::GetCredits.kind(), EndpointKind::V2);
    }

    #[test]
    fn paths() {
        assert_eq!(ApiEndpoint::RegisterOpen.path(), "v1/open");
        assert_eq!(ApiEndpoint::IdentifyUser.path(), "v1/profile");
        assert_eq!(ApiEndpoint::TrackStandardEvent.to_string(), "v2/event/standard");
        assert_eq!(ApiEndpoint::AppLinkSettings.kind(), EndpointKind::Raw);
    }
}
