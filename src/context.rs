//! Scan context: everything one scan needs, fixed before the scan starts

use crate::config::WrapperConfig;
use crate::error::{Result, ZapWrapperError};
use crate::models::{
    AuthenticationType, DataSection, ProxyInformation, SecHubScanConfiguration,
    SessionManagementType, WebScanConfiguration, DEFAULT_MAX_SCAN_DURATION_MILLIS,
};
use crate::rules::{DeactivatedRuleReferences, ZapFullRuleset};
use crate::scan::scope::{build_exclude_set, build_include_set};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

pub const DEFAULT_AJAX_SPIDER_BROWSER_ID: &str = "firefox-headless";
pub const DEFAULT_REPORT_TEMPLATE: &str = "sarif-json";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Immutable description of one scan, owned by its orchestrator
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Engine session and context identity, the job UUID
    pub context_name: String,
    pub target_url: Url,
    pub web_scan: WebScanConfiguration,
    pub authentication_type: AuthenticationType,
    pub session_management_type: SessionManagementType,
    pub max_scan_duration_ms: u64,
    pub ajax_spider_enabled: bool,
    pub active_scan_enabled: bool,
    pub ajax_spider_browser_id: String,
    pub report_file: PathBuf,
    pub report_template: String,
    /// `None` uses the engine's default scan policy
    pub scan_policy: Option<String>,
    pub poll_interval: Duration,
    pub proxy: Option<ProxyInformation>,
    pub full_ruleset: Option<ZapFullRuleset>,
    pub deactivated_rules: Option<DeactivatedRuleReferences>,
    pub api_definition_files: Vec<PathBuf>,
    /// Remote OpenAPI definition, imported before the local files
    pub api_definition_url: Option<String>,
    /// Header name to the file holding its value
    pub header_value_files: HashMap<String, PathBuf>,
    pub include_urls: Vec<String>,
    pub exclude_urls: Vec<String>,
}

impl ScanContext {
    pub fn builder(target_url: Url, report_file: impl Into<PathBuf>) -> ScanContextBuilder {
        ScanContextBuilder::new(target_url, report_file.into())
    }

    /// Builds the context from merged wrapper configuration and the inputs of the job
    pub fn from_config(config: &WrapperConfig, inputs: ContextInputs<'_>) -> Result<Self> {
        let target_url = parse_target_url(inputs.target_url)?;
        let web_scan = inputs
            .sechub
            .and_then(|s| s.web_scan.clone())
            .unwrap_or_default();
        let data = inputs.sechub.and_then(|s| s.data.as_ref());
        let sources_folder = config.pds.extracted_sources_folder.as_deref();

        let api_definition_files = match (&web_scan.api, data, sources_folder) {
            (Some(api), Some(data), Some(folder)) => data_files(data, &api.uses, folder),
            (Some(_), _, None) => {
                info!("Extracted sources folder was not set, continuing without API definitions");
                Vec::new()
            }
            _ => Vec::new(),
        };

        let mut header_value_files = HashMap::new();
        if let (Some(data), Some(folder)) = (data, sources_folder) {
            for header in &web_scan.headers {
                if let Some(file) = data_files(data, &header.uses, folder).into_iter().next() {
                    header_value_files.insert(header.name.clone(), file);
                }
            }
        }

        let mut deactivated_rules = inputs.rules_deactivation.unwrap_or_default();
        if let Some(list) = config.deactivated_rule_references.as_deref() {
            let listed = DeactivatedRuleReferences::from_comma_separated(list);
            for reference in listed.deactivated_rule_references {
                deactivated_rules.add(reference);
            }
        }

        let mut builder = ScanContext::builder(target_url, inputs.report_file)
            .web_scan(web_scan)
            .ajax_spider(config.scan.ajax_spider)
            .active_scan(config.scan.active_scan)
            .ajax_spider_browser_id(config.scan.ajax_spider_browser_id.clone())
            .report_template(config.scan.report_template.clone())
            .poll_interval(Duration::from_millis(config.scan.poll_interval_ms))
            .proxy(config.proxy.clone())
            .api_definition_files(api_definition_files)
            .header_value_files(header_value_files);
        if let Some(name) = inputs.job_uuid {
            builder = builder.context_name(name);
        }
        if let Some(policy) = &config.scan.scan_policy {
            builder = builder.scan_policy(policy.clone());
        }
        if let Some(max) = config.scan.max_scan_duration_ms {
            builder = builder.max_scan_duration_ms(max);
        }
        if let Some(ruleset) = inputs.full_ruleset {
            builder = builder.full_ruleset(ruleset);
        }
        if !deactivated_rules.is_empty() {
            builder = builder.deactivated_rules(deactivated_rules);
        }
        builder.build()
    }
}

/// Job specific inputs of [`ScanContext::from_config`]
#[derive(Debug, Clone)]
pub struct ContextInputs<'a> {
    pub target_url: &'a str,
    pub report_file: &'a Path,
    /// Used as context name, a random UUID when absent
    pub job_uuid: Option<String>,
    pub sechub: Option<&'a SecHubScanConfiguration>,
    pub full_ruleset: Option<ZapFullRuleset>,
    pub rules_deactivation: Option<DeactivatedRuleReferences>,
}

/// Parses the target, only http and https are scanned
pub fn parse_target_url(target_url: &str) -> Result<Url> {
    let url = Url::parse(target_url.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ZapWrapperError::UnsupportedConfiguration(format!(
            "Target URL scheme '{other}' is not supported, use http or https"
        ))),
    }
}

/// Files of the data sources referenced by `uses`, below the extracted sources folder
fn data_files(data: &DataSection, uses: &[String], folder: &Path) -> Vec<PathBuf> {
    uses.iter()
        .flat_map(|name| data.sources.iter().filter(move |s| &s.name == name))
        .filter_map(|source| source.file_system.as_ref())
        .flat_map(|fs| fs.files.iter().map(|f| folder.join(f)))
        .collect()
}

pub struct ScanContextBuilder {
    target_url: Url,
    report_file: PathBuf,
    context_name: Option<String>,
    web_scan: WebScanConfiguration,
    max_scan_duration_ms: Option<u64>,
    ajax_spider_enabled: bool,
    active_scan_enabled: bool,
    ajax_spider_browser_id: String,
    report_template: String,
    scan_policy: Option<String>,
    poll_interval: Duration,
    proxy: Option<ProxyInformation>,
    full_ruleset: Option<ZapFullRuleset>,
    deactivated_rules: Option<DeactivatedRuleReferences>,
    api_definition_files: Vec<PathBuf>,
    header_value_files: HashMap<String, PathBuf>,
}

impl ScanContextBuilder {
    fn new(target_url: Url, report_file: PathBuf) -> Self {
        Self {
            target_url,
            report_file,
            context_name: None,
            web_scan: WebScanConfiguration::default(),
            max_scan_duration_ms: None,
            ajax_spider_enabled: false,
            active_scan_enabled: false,
            ajax_spider_browser_id: DEFAULT_AJAX_SPIDER_BROWSER_ID.to_string(),
            report_template: DEFAULT_REPORT_TEMPLATE.to_string(),
            scan_policy: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            proxy: None,
            full_ruleset: None,
            deactivated_rules: None,
            api_definition_files: Vec::new(),
            header_value_files: HashMap::new(),
        }
    }

    pub fn context_name(mut self, name: impl Into<String>) -> Self {
        self.context_name = Some(name.into());
        self
    }

    pub fn web_scan(mut self, web_scan: WebScanConfiguration) -> Self {
        self.web_scan = web_scan;
        self
    }

    /// Overrides the duration of the web scan configuration
    pub fn max_scan_duration_ms(mut self, millis: u64) -> Self {
        self.max_scan_duration_ms = Some(millis);
        self
    }

    pub fn ajax_spider(mut self, enabled: bool) -> Self {
        self.ajax_spider_enabled = enabled;
        self
    }

    pub fn active_scan(mut self, enabled: bool) -> Self {
        self.active_scan_enabled = enabled;
        self
    }

    pub fn ajax_spider_browser_id(mut self, browser_id: impl Into<String>) -> Self {
        self.ajax_spider_browser_id = browser_id.into();
        self
    }

    pub fn report_template(mut self, template: impl Into<String>) -> Self {
        self.report_template = template.into();
        self
    }

    pub fn scan_policy(mut self, policy: impl Into<String>) -> Self {
        self.scan_policy = Some(policy.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn proxy(mut self, proxy: Option<ProxyInformation>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn full_ruleset(mut self, ruleset: ZapFullRuleset) -> Self {
        self.full_ruleset = Some(ruleset);
        self
    }

    pub fn deactivated_rules(mut self, rules: DeactivatedRuleReferences) -> Self {
        self.deactivated_rules = Some(rules);
        self
    }

    pub fn api_definition_files(mut self, files: Vec<PathBuf>) -> Self {
        self.api_definition_files = files;
        self
    }

    pub fn header_value_files(mut self, files: HashMap<String, PathBuf>) -> Self {
        self.header_value_files = files;
        self
    }

    pub fn build(self) -> Result<ScanContext> {
        if self.poll_interval.is_zero() {
            return Err(ZapWrapperError::ConfigError(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        let context_name = self.context_name.unwrap_or_else(|| {
            let generated = uuid::Uuid::new_v4().to_string();
            warn!("The job UUID was not set. Using randomly generated UUID: {generated} as fallback.");
            generated
        });

        let authentication_type = AuthenticationType::from_login(self.web_scan.login.as_ref());
        let session_management_type = SessionManagementType::for_authentication(authentication_type);

        let max_scan_duration_ms = self
            .max_scan_duration_ms
            .or_else(|| self.web_scan.max_scan_duration.as_ref().map(|d| d.to_millis()))
            .unwrap_or(DEFAULT_MAX_SCAN_DURATION_MILLIS);

        let include_urls = build_include_set(&self.target_url, &self.web_scan.includes);
        let exclude_urls = build_exclude_set(&self.target_url, &self.web_scan.excludes);
        let api_definition_url = self
            .web_scan
            .api
            .as_ref()
            .and_then(|api| api.api_definition_url.clone());

        Ok(ScanContext {
            context_name,
            target_url: self.target_url,
            web_scan: self.web_scan,
            authentication_type,
            session_management_type,
            max_scan_duration_ms,
            ajax_spider_enabled: self.ajax_spider_enabled,
            active_scan_enabled: self.active_scan_enabled,
            ajax_spider_browser_id: self.ajax_spider_browser_id,
            report_file: self.report_file,
            report_template: self.report_template,
            scan_policy: self.scan_policy,
            poll_interval: self.poll_interval,
            proxy: self.proxy,
            full_ruleset: self.full_ruleset,
            deactivated_rules: self.deactivated_rules,
            api_definition_files: self.api_definition_files,
            api_definition_url,
            header_value_files: self.header_value_files,
            include_urls,
            exclude_urls,
        })
    }
}
