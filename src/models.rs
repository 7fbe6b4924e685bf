//! Core data models for the ZAP wrapper
//!
//! The web scan configuration mirrors the `webScan` section of a SecHub
//! configuration file, which is produced by the surrounding job system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default maximum scan duration when the configuration does not provide one
pub const DEFAULT_MAX_SCAN_DURATION_MILLIS: u64 = 8 * 60 * 60 * 1000;

/// Top level SecHub configuration file. Only the parts the wrapper needs are modelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecHubScanConfiguration {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub web_scan: Option<WebScanConfiguration>,
    #[serde(default)]
    pub data: Option<DataSection>,
}

/// The `webScan` section of a SecHub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebScanConfiguration {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_scan_duration: Option<ScanDuration>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub headers: Vec<HttpHeaderConfiguration>,
    #[serde(default)]
    pub login: Option<WebLoginConfiguration>,
    #[serde(default)]
    pub api: Option<WebScanApiConfiguration>,
}

/// A header the engine must inject into every (or only some) requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpHeaderConfiguration {
    pub name: String,
    /// Literal value. When absent the value is read from a referenced data file.
    #[serde(default)]
    pub value: Option<String>,
    /// Restricts the header to these URL patterns. Empty means every URL.
    #[serde(default)]
    pub only_for_urls: Vec<String>,
    /// Data section references holding the header value
    #[serde(default, rename = "use")]
    pub uses: Vec<String>,
}

impl HttpHeaderConfiguration {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            only_for_urls: Vec::new(),
            uses: Vec::new(),
        }
    }

    /// Restricts the header to the given URL patterns
    pub fn only_for(mut self, urls: &[&str]) -> Self {
        self.only_for_urls = urls.iter().map(|u| u.to_string()).collect();
        self
    }
}

/// Maximum duration of a scan as written in the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDuration {
    pub duration: u64,
    #[serde(default)]
    pub unit: DurationUnit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[serde(alias = "millisecond", alias = "MILLISECOND", alias = "MILLISECONDS")]
    Milliseconds,
    #[serde(alias = "second", alias = "SECOND", alias = "SECONDS")]
    Seconds,
    #[serde(alias = "minute", alias = "MINUTE", alias = "MINUTES")]
    Minutes,
    #[default]
    #[serde(alias = "hour", alias = "HOUR", alias = "HOURS")]
    Hours,
    #[serde(alias = "day", alias = "DAY", alias = "DAYS")]
    Days,
}

impl ScanDuration {
    /// Duration converted to milliseconds, saturating on overflow
    pub fn to_millis(&self) -> u64 {
        let factor: u64 = match self.unit {
            DurationUnit::Milliseconds => 1,
            DurationUnit::Seconds => 1_000,
            DurationUnit::Minutes => 60_000,
            DurationUnit::Hours => 3_600_000,
            DurationUnit::Days => 86_400_000,
        };
        self.duration.saturating_mul(factor)
    }
}

/// Login section of a web scan configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebLoginConfiguration {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub basic: Option<BasicLoginConfiguration>,
    #[serde(default)]
    pub form: Option<FormLoginConfiguration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicLoginConfiguration {
    #[serde(default)]
    pub realm: Option<String>,
    pub user: String,
    pub password: String,
}

/// Form based login. Accepted by the model, not yet applied to the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormLoginConfiguration {
    #[serde(default)]
    pub autodetect: Option<AutoDetectUserLoginConfiguration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoDetectUserLoginConfiguration {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebScanApiConfiguration {
    #[serde(rename = "type", default)]
    pub api_type: ApiType,
    #[serde(default, rename = "use")]
    pub uses: Vec<String>,
    /// Remote OpenAPI definition, downloaded by the engine
    #[serde(default)]
    pub api_definition_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiType {
    #[default]
    #[serde(rename = "openApi", alias = "OPEN_API")]
    OpenApi,
}

/// `data` section of the SecHub configuration, referenced by `use` entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSection {
    #[serde(default)]
    pub sources: Vec<DataSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub name: String,
    #[serde(default)]
    pub file_system: Option<FileSystemConfiguration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSystemConfiguration {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
}

/// Authentication type derived from the login configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationType {
    #[default]
    None,
    HttpBasicAuthentication,
    FormBasedAuthentication,
}

impl AuthenticationType {
    /// Resolves the authentication type of a login section
    pub fn from_login(login: Option<&WebLoginConfiguration>) -> Self {
        match login {
            Some(login) if login.basic.is_some() => AuthenticationType::HttpBasicAuthentication,
            Some(login) if login.form.is_some() => AuthenticationType::FormBasedAuthentication,
            _ => AuthenticationType::None,
        }
    }
}

impl fmt::Display for AuthenticationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthenticationType::None => write!(f, "NONE"),
            AuthenticationType::HttpBasicAuthentication => write!(f, "HTTP_BASIC_AUTHENTICATION"),
            AuthenticationType::FormBasedAuthentication => write!(f, "FORM_BASED_AUTHENTICATION"),
        }
    }
}

/// Session management type used by the engine context
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionManagementType {
    #[default]
    CookieBasedSessionManagement,
    HttpAuthSessionManagement,
}

impl SessionManagementType {
    /// Session management that pairs with an authentication type
    pub fn for_authentication(auth: AuthenticationType) -> Self {
        match auth {
            AuthenticationType::HttpBasicAuthentication => {
                SessionManagementType::HttpAuthSessionManagement
            }
            _ => SessionManagementType::CookieBasedSessionManagement,
        }
    }

    pub fn zap_session_management_method(&self) -> &'static str {
        match self {
            SessionManagementType::CookieBasedSessionManagement => "cookieBasedSessionManagement",
            SessionManagementType::HttpAuthSessionManagement => "httpAuthSessionManagement",
        }
    }
}

/// Upstream proxy the engine has to route its traffic through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInformation {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyInformation {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            realm: None,
            username: None,
            password: None,
        }
    }

    /// Whether the proxy needs authentication
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Authenticated scan identity created inside the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInformation {
    pub user_name: String,
    pub zap_user_id: u32,
}
