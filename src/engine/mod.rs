//! Remote DAST engine contract
//!
//! The orchestrator only talks to the engine through [`ZapEngine`], so a
//! recording fake can stand in for a real ZAP instance in tests.

pub mod client;

use crate::error::Result;
use crate::models::ProxyInformation;
use async_trait::async_trait;
use std::path::Path;

pub use client::ZapApiClient;

/// AJAX spider status reported once the crawl has ended
pub const AJAX_SPIDER_STATUS_STOPPED: &str = "stopped";

/// How a replacer rule matches the traffic it rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerMatchType {
    /// Adds the header to requests, or replaces it when already present
    RequestHeader,
}

impl ReplacerMatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplacerMatchType::RequestHeader => "REQ_HEADER",
        }
    }
}

/// Header rewrite rule injected into the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacerRule {
    /// Rule identity, used again to remove the rule
    pub description: String,
    pub enabled: bool,
    pub match_type: ReplacerMatchType,
    pub match_regex: bool,
    /// Header name
    pub match_string: String,
    /// Header value
    pub replacement: String,
    /// `None` applies the rule to all engine components
    pub initiators: Option<String>,
    /// `None` applies the rule to every URL
    pub url: Option<String>,
}

impl ReplacerRule {
    /// Request header rule sent by every engine component
    pub fn request_header(
        description: impl Into<String>,
        header_name: impl Into<String>,
        header_value: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            description: description.into(),
            enabled: true,
            match_type: ReplacerMatchType::RequestHeader,
            match_regex: false,
            match_string: header_name.into(),
            replacement: header_value.into(),
            initiators: None,
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiderRequest {
    pub url: String,
    pub context_name: String,
    pub context_id: u32,
    /// Crawl as this engine user when set
    pub user_id: Option<u32>,
    pub max_children: Option<u32>,
    pub recurse: bool,
    pub subtree_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AjaxSpiderRequest {
    pub url: String,
    pub context_name: String,
    /// Crawl as this engine user when set
    pub user_name: Option<String>,
    pub in_scope: bool,
    pub subtree_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveScanRequest {
    pub url: String,
    pub context_id: u32,
    /// Attack as this engine user when set
    pub user_id: Option<u32>,
    pub recurse: bool,
    pub in_scope_only: bool,
    pub scan_policy: Option<String>,
}

/// Parameters of the engine side report generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRequest {
    pub title: String,
    pub template: String,
    pub theme: Option<String>,
    pub description: Option<String>,
    pub contexts: Option<String>,
    pub sites: Option<String>,
    pub sections: Option<String>,
    pub included_confidences: Option<String>,
    pub included_risks: Option<String>,
    pub report_file_name: String,
    pub report_file_name_pattern: Option<String>,
    pub report_dir: String,
    pub display: bool,
}

/// Capability set of the remote DAST engine
#[async_trait]
pub trait ZapEngine: Send + Sync {
    async fn create_session(&self, name: &str, overwrite: bool) -> Result<()>;

    /// Zero means unlimited
    async fn set_max_alerts_per_rule(&self, max_alerts: u32) -> Result<()>;

    async fn enable_all_passive_rules(&self) -> Result<()>;

    /// `None` targets the engine's default policy
    async fn enable_all_active_rules_for_policy(&self, policy: Option<&str>) -> Result<()>;

    async fn set_ajax_spider_browser(&self, browser_id: &str) -> Result<()>;

    async fn set_spider_max_depth(&self, depth: u32) -> Result<()>;

    async fn set_ajax_spider_max_depth(&self, depth: u32) -> Result<()>;

    async fn disable_passive_rule(&self, rule_id: &str) -> Result<()>;

    async fn disable_active_rule_for_policy(&self, rule_id: &str, policy: Option<&str>)
        -> Result<()>;

    async fn set_proxy_enabled(&self, enabled: bool) -> Result<()>;

    async fn configure_proxy(&self, proxy: &ProxyInformation) -> Result<()>;

    async fn set_proxy_auth_enabled(&self, enabled: bool) -> Result<()>;

    /// Returns the engine assigned context id
    async fn create_context(&self, name: &str) -> Result<u32>;

    /// Returns the handle needed to remove the rule again
    async fn add_replacer_rule(&self, rule: &ReplacerRule) -> Result<String>;

    async fn remove_replacer_rule(&self, handle: &str) -> Result<()>;

    async fn add_include_url_pattern(&self, context_name: &str, pattern: &str) -> Result<()>;

    async fn add_exclude_url_pattern(&self, context_name: &str, pattern: &str) -> Result<()>;

    /// Requests the URL through the engine so it shows up in its history
    async fn visit_url(&self, url: &str, follow_redirects: bool) -> Result<()>;

    async fn import_api_definition_file(
        &self,
        file: &Path,
        target_url: &str,
        context_id: u32,
    ) -> Result<()>;

    /// Imports an OpenAPI definition the engine downloads itself
    async fn import_api_definition_url(
        &self,
        definition_url: &str,
        target_url: &str,
        context_id: u32,
    ) -> Result<()>;

    async fn configure_auth_method(&self, context_id: u32, method: &str, params: &str)
        -> Result<()>;

    async fn set_session_management_method(
        &self,
        context_id: u32,
        method: &str,
        params: Option<&str>,
    ) -> Result<()>;

    /// Returns the engine user id
    async fn create_user(&self, context_id: u32, name: &str) -> Result<u32>;

    async fn configure_user_credentials(
        &self,
        context_id: u32,
        user_id: u32,
        params: &str,
    ) -> Result<()>;

    async fn set_user_enabled(&self, context_id: u32, user_id: u32, enabled: bool) -> Result<()>;

    async fn set_forced_user(&self, context_id: u32, user_id: u32) -> Result<()>;

    async fn set_forced_user_mode_enabled(&self, enabled: bool) -> Result<()>;

    async fn start_ajax_spider(&self, request: &AjaxSpiderRequest) -> Result<()>;

    async fn stop_ajax_spider(&self) -> Result<()>;

    async fn ajax_spider_status(&self) -> Result<String>;

    /// Returns the spider scan id
    async fn start_spider(&self, request: &SpiderRequest) -> Result<u32>;

    /// Progress in percent
    async fn spider_status(&self, scan_id: u32) -> Result<u32>;

    async fn stop_spider(&self, scan_id: u32) -> Result<()>;

    async fn all_spider_urls(&self) -> Result<Vec<String>>;

    /// Records still waiting for passive analysis
    async fn passive_backlog_count(&self) -> Result<u64>;

    async fn at_least_one_url_detected(&self) -> Result<bool>;

    /// Returns the active scan id
    async fn start_active_scan(&self, request: &ActiveScanRequest) -> Result<u32>;

    /// Progress in percent
    async fn active_scan_status(&self, scan_id: u32) -> Result<u32>;

    async fn stop_active_scan(&self, scan_id: u32) -> Result<()>;

    /// Returns the path the engine wrote the report to
    async fn generate_report(&self, request: &ReportRequest) -> Result<String>;
}
