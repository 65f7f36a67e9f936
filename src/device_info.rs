use crate::{defines::keys, PropertyBag};

/// Device context attached to every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    properties: PropertyBag,
}

impl DeviceInfo {
    /// Empty device info. See [`DeviceInfo::from_host`] for a populated one.
    pub fn new() -> DeviceInfo {
        DeviceInfo::default()
    }

    /// Device info describing the current host: operating system from the compile target and
    /// the SDK name/version.
    pub fn from_host() -> DeviceInfo {
        DeviceInfo::new()
            .set_os(std::env::consts::OS)
            .set_sdk("rust")
            .set_sdk_version(env!("CARGO_PKG_VERSION"))
    }

    /// Hardware brand.
    pub fn set_brand(self, brand: &str) -> DeviceInfo {
        self.with(keys::DEVICE_BRAND, brand)
    }

    /// OS build identifier.
    pub fn set_build(self, build: &str) -> DeviceInfo {
        self.with(keys::DEVICE_BUILD, build)
    }

    /// Local IP address. Stripped while tracking is disabled.
    pub fn set_ip_address(self, address: &str) -> DeviceInfo {
        self.with(keys::DEVICE_LOCAL_IP_ADDRESS, address)
    }

    /// MAC address. Stripped while tracking is disabled.
    pub fn set_mac_address(self, address: &str) -> DeviceInfo {
        self.with(keys::DEVICE_MAC_ADDRESS, address)
    }

    /// Hardware model.
    pub fn set_model(self, model: &str) -> DeviceInfo {
        self.with(keys::DEVICE_MODEL, model)
    }

    /// Operating system name.
    pub fn set_os(self, os: &str) -> DeviceInfo {
        self.with(keys::DEVICE_OS, os)
    }

    /// Operating system version.
    pub fn set_os_version(self, os_version: &str) -> DeviceInfo {
        self.with(keys::DEVICE_OS_VERSION, os_version)
    }

    /// Name of the SDK sending requests.
    pub fn set_sdk(self, sdk: &str) -> DeviceInfo {
        self.with(keys::APP_SDK, sdk)
    }

    /// Version of the SDK sending requests.
    pub fn set_sdk_version(self, sdk_version: &str) -> DeviceInfo {
        self.with(keys::APP_SDK_VERSION, sdk_version)
    }

    /// User agent string of the host.
    pub fn set_user_agent(self, user_agent: &str) -> DeviceInfo {
        self.with(keys::APP_USER_AGENT, user_agent)
    }

    /// Operating system name, if set.
    pub fn os(&self) -> Option<&str> {
        self.properties.get_str(keys::DEVICE_OS)
    }

    /// Operating system version, if set.
    pub fn os_version(&self) -> Option<&str> {
        self.properties.get_str(keys::DEVICE_OS_VERSION)
    }

    /// All properties, keyed by their wire names.
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    fn with(mut self, key: &str, value: &str) -> DeviceInfo {
        self.properties.set(key, value);
        self
    }
}
