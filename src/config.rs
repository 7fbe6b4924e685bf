//! Configuration management for the ZAP wrapper
//!
//! Values come from three layers: a TOML file, environment variables set by
//! the job system, and command line flags. Later layers win.

use crate::error::{Result, ZapWrapperError};
use crate::models::{ProxyInformation, SecHubScanConfiguration};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ZAP_HOST_ENV: &str = "ZAP_HOST";
pub const ZAP_PORT_ENV: &str = "ZAP_PORT";
pub const ZAP_API_KEY_ENV: &str = "ZAP_API_KEY";
pub const PROXY_HOST_ENV: &str = "PROXY_HOST";
pub const PROXY_PORT_ENV: &str = "PROXY_PORT";
pub const PROXY_REALM_ENV: &str = "PROXY_REALM";
pub const PROXY_USERNAME_ENV: &str = "PROXY_USERNAME";
pub const PROXY_PASSWORD_ENV: &str = "PROXY_PASSWORD";
pub const PDS_JOB_USER_MESSAGES_FOLDER_ENV: &str = "PDS_JOB_USER_MESSAGES_FOLDER";
pub const PDS_JOB_EVENTS_FOLDER_ENV: &str = "PDS_JOB_EVENTS_FOLDER";
pub const PDS_JOB_EXTRACTED_SOURCES_FOLDER_ENV: &str = "PDS_JOB_EXTRACTED_SOURCES_FOLDER";
pub const ZAP_DEACTIVATED_RULE_REFERENCES_ENV: &str = "ZAP_DEACTIVATED_RULE_REFERENCES";

/// Connection settings of the ZAP instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZapServerConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for ZapServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_key: String::new(),
            timeout_secs: 60,
        }
    }
}

impl ZapServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// Scan behaviour settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub ajax_spider: bool,
    pub active_scan: bool,
    pub ajax_spider_browser_id: String,
    pub poll_interval_ms: u64,
    /// Overrides the duration from the web scan configuration
    pub max_scan_duration_ms: Option<u64>,
    pub scan_policy: Option<String>,
    pub report_template: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            ajax_spider: false,
            active_scan: false,
            ajax_spider_browser_id: "firefox-headless".to_string(),
            poll_interval_ms: 5_000,
            max_scan_duration_ms: None,
            scan_policy: None,
            report_template: "sarif-json".to_string(),
        }
    }
}

/// Folders shared with the surrounding job system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdsSettings {
    pub user_message_folder: Option<PathBuf>,
    pub event_folder: Option<PathBuf>,
    pub extracted_sources_folder: Option<PathBuf>,
}

/// Complete wrapper configuration after all layers were merged
#[derive(Debug, Clone, Default)]
pub struct WrapperConfig {
    pub zap: ZapServerConfig,
    pub scan: ScanSettings,
    pub proxy: Option<ProxyInformation>,
    pub pds: PdsSettings,
    /// Comma separated rule references to deactivate
    pub deactivated_rule_references: Option<String>,
}

/// File-based configuration structure matching default.toml
#[derive(Debug, Deserialize)]
struct FileConfig {
    zap: Option<ZapSection>,
    scan: Option<ScanSection>,
    proxy: Option<ProxySection>,
    pds: Option<PdsSection>,
}

#[derive(Debug, Deserialize)]
struct ZapSection {
    host: Option<String>,
    port: Option<u16>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ScanSection {
    ajax_spider: Option<bool>,
    active_scan: Option<bool>,
    ajax_spider_browser_id: Option<String>,
    poll_interval_ms: Option<u64>,
    max_scan_duration_ms: Option<u64>,
    scan_policy: Option<String>,
    report_template: Option<String>,
    deactivated_rule_references: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ProxySection {
    host: Option<String>,
    port: Option<u16>,
    realm: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PdsSection {
    user_message_folder: Option<PathBuf>,
    event_folder: Option<PathBuf>,
    extracted_sources_folder: Option<PathBuf>,
}

/// Loads configuration from a TOML file and merges with defaults
pub fn load_config(path: &Path) -> Result<WrapperConfig> {
    let content = std::fs::read_to_string(path).map_err(ZapWrapperError::IoError)?;
    parse_config(&content)
}

/// Parses TOML configuration content and merges with defaults
pub fn parse_config(content: &str) -> Result<WrapperConfig> {
    let file_config: FileConfig = toml::from_str(content)?;

    let mut config = WrapperConfig::default();

    if let Some(zap) = file_config.zap {
        if let Some(host) = zap.host {
            config.zap.host = host;
        }
        if let Some(port) = zap.port {
            config.zap.port = port;
        }
        if let Some(key) = zap.api_key {
            config.zap.api_key = key;
        }
        if let Some(timeout) = zap.timeout_secs {
            config.zap.timeout_secs = timeout;
        }
    }

    if let Some(scan) = file_config.scan {
        if let Some(ajax) = scan.ajax_spider {
            config.scan.ajax_spider = ajax;
        }
        if let Some(active) = scan.active_scan {
            config.scan.active_scan = active;
        }
        if let Some(browser) = scan.ajax_spider_browser_id {
            config.scan.ajax_spider_browser_id = browser;
        }
        if let Some(interval) = scan.poll_interval_ms {
            config.scan.poll_interval_ms = interval;
        }
        config.scan.max_scan_duration_ms = scan.max_scan_duration_ms;
        config.scan.scan_policy = scan.scan_policy;
        if let Some(template) = scan.report_template {
            config.scan.report_template = template;
        }
        if let Some(rules) = scan.deactivated_rule_references {
            if !rules.is_empty() {
                config.deactivated_rule_references = Some(rules.join(","));
            }
        }
    }

    if let Some(proxy) = file_config.proxy {
        if let (Some(host), Some(port)) = (proxy.host, proxy.port) {
            config.proxy = Some(ProxyInformation {
                host,
                port,
                realm: proxy.realm,
                username: proxy.username,
                password: proxy.password,
            });
        }
    }

    if let Some(pds) = file_config.pds {
        config.pds.user_message_folder = pds.user_message_folder;
        config.pds.event_folder = pds.event_folder;
        config.pds.extracted_sources_folder = pds.extracted_sources_folder;
    }

    Ok(config)
}

/// Applies the process environment on top of a configuration
pub fn apply_env_overrides(config: &mut WrapperConfig) -> Result<()> {
    apply_env(config, |name| std::env::var(name).ok())
}

/// Applies environment values read through `lookup`
pub fn apply_env<F>(config: &mut WrapperConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ZAP_HOST_ENV) {
        config.zap.host = host;
    }
    if let Some(port) = lookup(ZAP_PORT_ENV) {
        config.zap.port = parse_port(ZAP_PORT_ENV, &port)?;
    }
    if let Some(key) = lookup(ZAP_API_KEY_ENV) {
        config.zap.api_key = key;
    }

    let proxy_host = lookup(PROXY_HOST_ENV);
    let proxy_port = lookup(PROXY_PORT_ENV)
        .map(|p| parse_port(PROXY_PORT_ENV, &p))
        .transpose()?;
    let proxy = match (proxy_host, proxy_port, config.proxy.take()) {
        (Some(host), Some(port), _) => Some(ProxyInformation::new(host, port)),
        (Some(host), None, Some(existing)) => Some(ProxyInformation { host, ..existing }),
        (None, Some(port), Some(existing)) => Some(ProxyInformation { port, ..existing }),
        (_, _, existing) => existing,
    };
    config.proxy = proxy.map(|mut p| {
        if let Some(realm) = lookup(PROXY_REALM_ENV) {
            p.realm = Some(realm);
        }
        if let Some(user) = lookup(PROXY_USERNAME_ENV) {
            p.username = Some(user);
        }
        if let Some(password) = lookup(PROXY_PASSWORD_ENV) {
            p.password = Some(password);
        }
        p
    });

    if let Some(folder) = lookup(PDS_JOB_USER_MESSAGES_FOLDER_ENV) {
        config.pds.user_message_folder = Some(PathBuf::from(folder));
    }
    if let Some(folder) = lookup(PDS_JOB_EVENTS_FOLDER_ENV) {
        config.pds.event_folder = Some(PathBuf::from(folder));
    }
    if let Some(folder) = lookup(PDS_JOB_EXTRACTED_SOURCES_FOLDER_ENV) {
        config.pds.extracted_sources_folder = Some(PathBuf::from(folder));
    }
    if let Some(rules) = lookup(ZAP_DEACTIVATED_RULE_REFERENCES_ENV) {
        config.deactivated_rule_references = Some(rules);
    }
    Ok(())
}

fn parse_port(variable: &str, value: &str) -> Result<u16> {
    value.trim().parse::<u16>().map_err(|_| {
        ZapWrapperError::ConfigError(format!("{variable} is not a valid port: {value}"))
    })
}

/// Command line values that override file and environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub zap_host: Option<String>,
    pub zap_port: Option<u16>,
    pub zap_api_key: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub ajax_spider: bool,
    pub active_scan: bool,
    pub ajax_spider_browser_id: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub user_message_folder: Option<PathBuf>,
    pub event_folder: Option<PathBuf>,
    pub deactivate_rules: Option<Vec<String>>,
}

/// Merges CLI arguments into an existing configuration
pub fn merge_cli_args(config: &mut WrapperConfig, cli: CliOverrides) {
    if let Some(host) = cli.zap_host {
        config.zap.host = host;
    }
    if let Some(port) = cli.zap_port {
        config.zap.port = port;
    }
    if let Some(key) = cli.zap_api_key {
        config.zap.api_key = key;
    }
    match (cli.proxy_host, cli.proxy_port) {
        (Some(host), Some(port)) => {
            let mut proxy = config.proxy.take().unwrap_or_else(|| ProxyInformation::new("", 0));
            proxy.host = host;
            proxy.port = port;
            config.proxy = Some(proxy);
        }
        (Some(_), None) | (None, Some(_)) => {
            info!("Proxy host and port must both be given on the command line, ignoring partial proxy flags");
        }
        (None, None) => {}
    }
    if cli.ajax_spider {
        config.scan.ajax_spider = true;
    }
    if cli.active_scan {
        config.scan.active_scan = true;
    }
    if let Some(browser) = cli.ajax_spider_browser_id {
        config.scan.ajax_spider_browser_id = browser;
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.scan.poll_interval_ms = interval;
    }
    if let Some(folder) = cli.user_message_folder {
        config.pds.user_message_folder = Some(folder);
    }
    if let Some(folder) = cli.event_folder {
        config.pds.event_folder = Some(folder);
    }
    if let Some(rules) = cli.deactivate_rules {
        if !rules.is_empty() {
            config.deactivated_rule_references = Some(rules.join(","));
        }
    }
}

/// Validates the merged configuration before a scan starts
pub fn validate(config: &WrapperConfig) -> Result<()> {
    if config.zap.host.trim().is_empty() {
        return Err(ZapWrapperError::ConfigError(
            "Zap host is empty. Please set the Zap host to the host used by the Zap.".to_string(),
        ));
    }
    if config.zap.port == 0 {
        return Err(ZapWrapperError::ConfigError(
            "Zap port was set to 0. Please set the Zap port to the port used by the Zap.".to_string(),
        ));
    }
    if config.zap.api_key.is_empty() {
        return Err(ZapWrapperError::ConfigError(
            "Zap API-Key is empty. Please set the Zap API-key to the same value set inside your Zap."
                .to_string(),
        ));
    }
    if config.scan.poll_interval_ms == 0 {
        return Err(ZapWrapperError::ConfigError(
            "Poll interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Loads the SecHub configuration file holding the `webScan` section
pub fn load_sechub_configuration(path: &Path) -> Result<SecHubScanConfiguration> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ZapWrapperError::ConfigError(format!(
            "SecHub configuration file {} could not be read: {e}",
            path.display()
        ))
    })?;
    let config: SecHubScanConfiguration = serde_json::from_str(&content)?;
    Ok(config)
}
