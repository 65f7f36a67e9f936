//! Trackable events and their packaging into wire payloads.
//!
//! Every request the SDK sends is an [`Event`]: session opens, identity changes, standard and
//! custom events, and utility calls. An event knows its [`ApiEndpoint`] and packages itself
//! against a [`PackagingInfo`] using the scheme of that endpoint (see [`EndpointKind`]).
use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::{
    defines::{keys, ApiEndpoint, EndpointKind},
    PackagingInfo, PropertyBag, PropertyValue,
};

/// Handler invoked with the server response once a request has succeeded.
pub type ResultHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Fields removed from payloads while tracking is disabled.
const IDENTIFYING_KEYS: &[&str] = &[
    keys::APP_DEVELOPER_IDENTITY,
    keys::APP_IDENTITY,
    keys::DEVICE_LOCAL_IP_ADDRESS,
    keys::DEVICE_MAC_ADDRESS,
    keys::DEVICE_FINGERPRINT_ID,
    keys::RANDOMIZED_DEVICE_TOKEN,
    keys::IDENTITY_ID,
    keys::RANDOMIZED_BUNDLE_TOKEN,
    keys::ADVERTISING_IDS,
];

/// Standard event types with server-side semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardEventType {
    /// Item added to a cart.
    AddToCart,
    /// Item added to a wishlist.
    AddToWishlist,
    /// Cart viewed.
    ViewCart,
    /// Checkout started.
    InitiatePurchase,
    /// Payment details entered.
    AddPaymentInfo,
    /// Purchase completed.
    Purchase,
    /// In-app credits spent.
    SpendCredits,
    /// Search performed.
    Search,
    /// Single item viewed.
    ViewItem,
    /// Item list viewed.
    ViewItems,
    /// Item rated.
    Rate,
    /// Content shared.
    Share,
    /// Sign-up completed.
    CompleteRegistration,
    /// Tutorial completed.
    CompleteTutorial,
    /// Level reached.
    AchieveLevel,
    /// Achievement unlocked.
    UnlockAchievement,
    /// Invitation sent.
    Invite,
    /// User logged in.
    Login,
    /// Reservation made.
    Reserve,
    /// Subscription started.
    Subscribe,
    /// Trial started.
    StartTrial,
    /// Ad clicked.
    ClickAd,
    /// Ad viewed.
    ViewAd,
}

impl StandardEventType {
    /// Event name sent to the server, e.g. `"PURCHASE"`.
    pub fn as_str(self) -> &'static str {
        match self {
            StandardEventType::AddToCart => "ADD_TO_CART",
            StandardEventType::AddToWishlist => "ADD_TO_WISHLIST",
            StandardEventType::ViewCart => "VIEW_CART",
            StandardEventType::InitiatePurchase => "INITIATE_PURCHASE",
            StandardEventType::AddPaymentInfo => "ADD_PAYMENT_INFO",
            StandardEventType::Purchase => "PURCHASE",
            StandardEventType::SpendCredits => "SPEND_CREDITS",
            StandardEventType::Search => "SEARCH",
            StandardEventType::ViewItem => "VIEW_ITEM",
            StandardEventType::ViewItems => "VIEW_ITEMS",
            StandardEventType::Rate => "RATE",
            StandardEventType::Share => "SHARE",
            StandardEventType::CompleteRegistration => "COMPLETE_REGISTRATION",
            StandardEventType::CompleteTutorial => "COMPLETE_TUTORIAL",
            StandardEventType::AchieveLevel => "ACHIEVE_LEVEL",
            StandardEventType::UnlockAchievement => "UNLOCK_ACHIEVEMENT",
            StandardEventType::Invite => "INVITE",
            StandardEventType::Login => "LOGIN",
            StandardEventType::Reserve => "RESERVE",
            StandardEventType::Subscribe => "SUBSCRIBE",
            StandardEventType::StartTrial => "START_TRIAL",
            StandardEventType::ClickAd => "CLICK_AD",
            StandardEventType::ViewAd => "VIEW_AD",
        }
    }
}

/// Ad types for ad-related standard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdType {
    /// Banner ad.
    Banner,
    /// Full-screen interstitial ad.
    Interstitial,
    /// Rewarded video ad.
    RewardedVideo,
    /// Native ad.
    Native,
}

impl AdType {
    /// Name sent to the server, e.g. `"BANNER"`.
    pub fn as_str(self) -> &'static str {
        match self {
            AdType::Banner => "BANNER",
            AdType::Interstitial => "INTERSTITIAL",
            AdType::RewardedVideo => "REWARDED_VIDEO",
            AdType::Native => "NATIVE",
        }
    }
}

/// A single trackable action.
///
/// # Examples
/// ```
/// # use branchio::{Event, StandardEventType};
/// let event = Event::standard(StandardEventType::Purchase)
///     .set_revenue(99.99)
///     .set_currency("USD")
///     .set_transaction_id("T1")
///     .add_custom_data_property("color", "blue");
/// ```
#[derive(Clone)]
pub struct Event {
    endpoint: ApiEndpoint,
    name: String,
    properties: PropertyBag,
    custom_data: PropertyBag,
    result_handler: Option<ResultHandler>,
}

impl Event {
    /// Create an event for an arbitrary endpoint.
    pub fn new(endpoint: ApiEndpoint, name: impl Into<String>) -> Event {
        Event {
            endpoint,
            name: name.into(),
            properties: PropertyBag::new(),
            custom_data: PropertyBag::new(),
            result_handler: None,
        }
    }

    /// Create an event whose properties start as a copy of `properties`.
    pub fn with_properties(
        endpoint: ApiEndpoint,
        name: impl Into<String>,
        properties: PropertyBag,
    ) -> Event {
        Event {
            properties,
            ..Event::new(endpoint, name)
        }
    }

    /// A session open.
    pub fn session_open() -> Event {
        Event::new(ApiEndpoint::RegisterOpen, "Open")
    }

    /// A session close.
    pub fn session_close() -> Event {
        Event::new(ApiEndpoint::RegisterClose, "Close")
    }

    /// A content view within the session.
    pub fn session_view() -> Event {
        Event::new(ApiEndpoint::RegisterView, "View")
    }

    /// Identify the user as `identity`.
    pub fn identity_login(identity: &str) -> Event {
        Event::new(ApiEndpoint::IdentifyUser, "setIdentity")
            .add_event_property(keys::APP_IDENTITY, identity)
    }

    /// Forget the identified user.
    pub fn identity_logout() -> Event {
        Event::new(ApiEndpoint::Logout, "logout")
    }

    /// A standard event, sent to `v2/event/standard`.
    pub fn standard(event_type: StandardEventType) -> Event {
        Event::new(ApiEndpoint::TrackStandardEvent, event_type.as_str())
    }

    /// An event with an app-defined name, sent to `v2/event/custom`.
    pub fn custom(name: impl Into<String>) -> Event {
        Event::new(ApiEndpoint::TrackCustomEvent, name)
    }

    /// Attach the link that opened the app. Ignored when `url` is empty.
    pub fn set_link_url(self, url: &str) -> Event {
        self.add_event_property(keys::APP_LINK_URL, url)
    }

    /// Ad type, for [`StandardEventType::ClickAd`] and [`StandardEventType::ViewAd`].
    pub fn set_ad_type(self, ad_type: AdType) -> Event {
        self.add_event_property(keys::AD_TYPE, ad_type.as_str())
    }

    /// Store or affiliate the transaction happened with.
    pub fn set_affiliation(self, affiliation: &str) -> Event {
        self.add_event_property(keys::AFFILIATION, affiliation)
    }

    /// Coupon code applied to the transaction.
    pub fn set_coupon(self, coupon: &str) -> Event {
        self.add_event_property(keys::COUPON, coupon)
    }

    /// ISO 4217 currency code.
    pub fn set_currency(self, currency: &str) -> Event {
        self.add_event_property(keys::CURRENCY, currency)
    }

    /// Alias shown for this event on the dashboard.
    pub fn set_customer_event_alias(self, alias: &str) -> Event {
        self.add_event_property(keys::CUSTOMER_EVENT_ALIAS, alias)
    }

    /// Free-form description.
    pub fn set_description(self, description: &str) -> Event {
        self.add_event_property(keys::DESCRIPTION, description)
    }

    /// Transaction revenue, in the currency set by [`Event::set_currency`].
    pub fn set_revenue(self, revenue: f64) -> Event {
        self.add_event_property(keys::REVENUE, revenue)
    }

    /// Query of a [`StandardEventType::Search`] event.
    pub fn set_search_query(self, search_query: &str) -> Event {
        self.add_event_property(keys::SEARCH_QUERY, search_query)
    }

    /// Shipping cost of the transaction.
    pub fn set_shipping(self, shipping: f64) -> Event {
        self.add_event_property(keys::SHIPPING, shipping)
    }

    /// Tax of the transaction.
    pub fn set_tax(self, tax: f64) -> Event {
        self.add_event_property(keys::TAX, tax)
    }

    /// Id of the transaction.
    pub fn set_transaction_id(self, transaction_id: &str) -> Event {
        self.add_event_property(keys::TRANSACTION_ID, transaction_id)
    }

    /// Set a top-level event property. An empty string removes it.
    pub fn add_event_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Event {
        self.properties.set(name, value);
        self
    }

    /// Set an app-defined property, sent under `custom_data`.
    pub fn add_custom_data_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Event {
        self.custom_data.set(name, value);
        self
    }

    /// Set a handler that receives the server response after the request succeeded.
    pub fn set_result_handler(mut self, handler: impl Fn(&Value) + Send + Sync + 'static) -> Event {
        self.result_handler = Some(Arc::new(handler));
        self
    }

    /// Endpoint the event is sent to.
    pub fn endpoint(&self) -> ApiEndpoint {
        self.endpoint
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level event properties.
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// App-defined properties.
    pub fn custom_data(&self) -> &PropertyBag {
        &self.custom_data
    }

    pub(crate) fn handle_result(&self, response: &Value) {
        if let Some(handler) = &self.result_handler {
            handler(response);
        }
    }

    /// Package this event into a JSON payload for its endpoint.
    ///
    /// Packaging has no side effects: the same event and context always produce the same JSON.
    pub fn package(&self, info: &PackagingInfo) -> Value {
        let mut payload = PropertyBag::new();
        payload.set(keys::BRANCH_KEY, info.branch_key());

        match self.endpoint.kind() {
            EndpointKind::Raw => {
                payload += &self.properties;
            }
            EndpointKind::V1 => self.package_v1(info, &mut payload),
            EndpointKind::V2 => self.package_v2(info, &mut payload),
        }

        if info.advertiser_info().is_tracking_disabled() {
            strip_identifying_fields(&mut payload);
        }

        payload.into_json()
    }

    fn package_v1(&self, info: &PackagingInfo, payload: &mut PropertyBag) {
        let advertiser_info = info.advertiser_info();

        *payload += &self.properties;
        *payload += info.session_info().properties();
        *payload += info.device_info().properties();
        *payload += info.app_info().properties();

        let ids = advertiser_info.ids();
        if !ids.is_empty() {
            payload.set(keys::ADVERTISING_IDS, ids);
        }

        // The server assigns a fresh session on open.
        if self.endpoint == ApiEndpoint::RegisterOpen {
            payload.remove(keys::SESSION_ID);
        }

        payload.set(keys::APP_LAT_V1, i32::from(advertiser_info.is_tracking_limited()));
    }

    fn package_v2(&self, info: &PackagingInfo, payload: &mut PropertyBag) {
        let advertiser_info = info.advertiser_info();

        payload.set(keys::NAME, self.name.as_str());
        payload.set(keys::EVENT_DATA, self.properties.clone());
        if !self.custom_data.is_empty() {
            payload.set(keys::CUSTOM_DATA, self.custom_data.clone());
        }

        let mut user_data = info.session_info().properties();
        user_data += info.device_info().properties();
        user_data += info.app_info().properties();

        let limited = advertiser_info.is_tracking_limited();
        let ids = advertiser_info.ids();
        if !limited && !ids.is_empty() {
            user_data.set(keys::ADVERTISING_IDS, ids);
        }
        user_data.set(keys::APP_LAT_V2, i32::from(limited));

        payload.set(keys::USER_DATA, user_data);
    }
}

fn strip_identifying_fields(payload: &mut PropertyBag) {
    payload.set(keys::TRACKING_DISABLED, true);
    for key in IDENTIFYING_KEYS {
        payload.remove(key);
    }

    if let Some(Value::Object(user_data)) = payload.remove(keys::USER_DATA) {
        let mut user_data = PropertyBag::from_json(Value::Object(user_data)).unwrap_or_default();
        for key in IDENTIFYING_KEYS {
            user_data.remove(key);
        }
        payload.set(keys::USER_DATA, user_data);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("endpoint", &self.endpoint)
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("custom_data", &self.custom_data)
            .field("has_result_handler", &self.result_handler.is_some())
            .finish()
    }
}
