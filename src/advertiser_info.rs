use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::PropertyBag;

/// Advertiser identifier types understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdIdType {
    /// Apple identifier for advertisers.
    Idfa,
    /// Google advertising id.
    GoogleAdvertisingId,
    /// Windows advertising id.
    WindowsAdvertisingId,
    /// Roku id for advertising.
    RokuRida,
    /// Samsung identifier for advertising.
    SamsungIfa,
    /// LG identifier for advertising.
    LgIfa,
    /// Panasonic identifier for advertising.
    PanasonicIfa,
    /// PlayStation identifier for advertising.
    PlaystationIfa,
    /// Xbox Microsoft advertising id.
    XboxMsai,
}

impl AdIdType {
    /// Name of the id type on the wire, e.g. `"IDFA"`.
    pub fn as_str(self) -> &'static str {
        match self {
            AdIdType::Idfa => "IDFA",
            AdIdType::GoogleAdvertisingId => "GOOGLE_ADVERTISING_ID",
            AdIdType::WindowsAdvertisingId => "WINDOWS_ADVERTISING_ID",
            AdIdType::RokuRida => "ROKU_RIDA",
            AdIdType::SamsungIfa => "SAMSUNG_IFA",
            AdIdType::LgIfa => "LG_IFA",
            AdIdType::PanasonicIfa => "PANASONIC_IFA",
            AdIdType::PlaystationIfa => "PLAYSTATION_IFA",
            AdIdType::XboxMsai => "XBOX_MSAI",
        }
    }
}

impl fmt::Display for AdIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct State {
    ids: PropertyBag,
    tracking_disabled: bool,
    tracking_limited: bool,
}

/// Advertiser identifiers and the user's tracking preferences.
///
/// `AdvertiserInfo` is shared between the application thread (getters, opt-out toggles) and the
/// request worker (packaging), so all access goes through an internal lock.
#[derive(Debug, Default)]
pub struct AdvertiserInfo {
    state: Mutex<State>,
}

impl AdvertiserInfo {
    /// No ids, tracking enabled and not limited.
    pub fn new() -> AdvertiserInfo {
        AdvertiserInfo::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an advertiser id. An empty value removes the id of that type.
    pub fn add_id(&self, id_type: AdIdType, value: &str) -> &Self {
        self.state().ids.set(id_type.as_str(), value);
        self
    }

    /// The id of type `id_type`, if any.
    pub fn id(&self, id_type: AdIdType) -> Option<String> {
        self.state().ids.get_str(id_type.as_str()).map(str::to_owned)
    }

    /// Snapshot of all advertiser ids, keyed by [`AdIdType::as_str`].
    pub fn ids(&self) -> PropertyBag {
        self.state().ids.clone()
    }

    /// Opt out of tracking. Identifying fields are stripped from all requests and only session
    /// opens are sent.
    pub fn disable_tracking(&self) -> &Self {
        self.state().tracking_disabled = true;
        self
    }

    /// Opt back into tracking.
    pub fn enable_tracking(&self) -> &Self {
        self.state().tracking_disabled = false;
        self
    }

    /// `true` after [`AdvertiserInfo::disable_tracking`].
    pub fn is_tracking_disabled(&self) -> bool {
        self.state().tracking_disabled
    }

    /// Limit ad tracking. Advertiser ids are kept out of V2 payloads.
    pub fn limit_ad_tracking(&self, limited: bool) -> &Self {
        self.state().tracking_limited = limited;
        self
    }

    /// `true` while ad tracking is limited.
    pub fn is_tracking_limited(&self) -> bool {
        self.state().tracking_limited
    }
}

#[cfg(test)]
mod tests {
    use super::{AdIdType, AdvertiserInfo};

    #[test]
    fn ids_are_keyed_by_type_name() {
        let info = AdvertiserInfo::new();
        info.add_id(AdIdType::WindowsAdvertisingId, "waid")
            .add_id(AdIdType::Idfa, "idfa");

        assert_eq!(info.ids().get_str("WINDOWS_ADVERTISING_ID"), Some("waid"));
        assert_eq!(info.id(AdIdType::Idfa).as_deref(), Some("idfa"));
        assert_eq!(info.id(AdIdType::RokuRida), None);
    }

    #[test]
    fn tracking_flags() {
        let info = AdvertiserInfo::new();
        assert!(!info.is_tracking_disabled());
        assert!(!info.is_tracking_limited());

        info.disable_tracking().limit_ad_tracking(true);
        assert!(info.is_tracking_disabled());
        assert!(info.is_tracking_limited());

        info.enable_tracking();
        assert!(!info.is_tracking_disabled());
    }
}
