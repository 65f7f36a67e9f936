use crate::{defines::keys, PropertyBag};

/// Application context attached to every request.
///
/// ```
/// # use branchio::AppInfo;
/// let app_info = AppInfo::new()
///     .set_app_version("1.2.3")
///     .set_package_name("io.example.app")
///     .set_environment("FULL_APP");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppInfo {
    properties: PropertyBag,
}

impl AppInfo {
    /// Empty app info.
    pub fn new() -> AppInfo {
        AppInfo::default()
    }

    /// Version of the app, as shown to users.
    pub fn set_app_version(self, app_version: &str) -> AppInfo {
        self.with(keys::APP_VERSION, app_version)
    }

    /// Identity of the user, as known to the app developer.
    pub fn set_developer_identity(self, identity: &str) -> AppInfo {
        self.with(keys::APP_DEVELOPER_IDENTITY, identity)
    }

    /// Runtime environment, e.g. `FULL_APP`.
    pub fn set_environment(self, environment: &str) -> AppInfo {
        self.with(keys::APP_ENVIRONMENT, environment)
    }

    /// ISO country code of the user.
    pub fn set_country_code(self, country_code: &str) -> AppInfo {
        self.with(keys::DEVICE_COUNTRY, country_code)
    }

    /// Language of the app UI.
    pub fn set_language(self, language: &str) -> AppInfo {
        self.with(keys::DEVICE_LANGUAGE, language)
    }

    /// Package (bundle) name of the app.
    pub fn set_package_name(self, package_name: &str) -> AppInfo {
        self.with(keys::APP_PACKAGE_NAME, package_name)
    }

    /// Screen density and size in pixels.
    pub fn set_display_info(mut self, dpi: i32, width: i32, height: i32) -> AppInfo {
        self.properties
            .set(keys::DEVICE_SCREEN_DPI, dpi)
            .set(keys::DEVICE_SCREEN_WIDTH, width)
            .set(keys::DEVICE_SCREEN_HEIGHT, height);
        self
    }

    /// Version set with [`AppInfo::set_app_version`].
    pub fn app_version(&self) -> Option<&str> {
        self.properties.get_str(keys::APP_VERSION)
    }

    /// Package name set with [`AppInfo::set_package_name`].
    pub fn package_name(&self) -> Option<&str> {
        self.properties.get_str(keys::APP_PACKAGE_NAME)
    }

    /// Environment set with [`AppInfo::set_environment`].
    pub fn environment(&self) -> Option<&str> {
        self.properties.get_str(keys::APP_ENVIRONMENT)
    }

    /// Merge all properties of `other` into this one.
    pub fn add_properties(&mut self, other: &AppInfo) {
        self.properties += &other.properties;
    }

    /// All properties, keyed by their wire names.
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    fn with(mut self, key: &str, value: &str) -> AppInfo {
        self.properties.set(key, value);
        self
    }
}
