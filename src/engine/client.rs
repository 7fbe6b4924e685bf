//! ZAP JSON API client

use super::{
    ActiveScanRequest, AjaxSpiderRequest, ReplacerRule, ReportRequest, SpiderRequest, ZapEngine,
};
use crate::config::ZapServerConfig;
use crate::error::{Result, ZapWrapperError};
use crate::models::ProxyInformation;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const API_KEY_HEADER: &str = "X-ZAP-API-Key";

/// Error code ZAP answers with when an object of the same name exists
const ALREADY_EXISTS_CODE: &str = "already_exists";

/// robots.txt and sitemap.xml always show up in the sites tree, even when
/// the target does not serve them
const IGNORED_SPIDER_URL_PARTS: [&str; 2] = ["robots.txt", "sitemap.xml"];

type Params<'a> = Vec<(&'a str, String)>;

/// Talks to a ZAP instance over its JSON API
#[derive(Clone)]
pub struct ZapApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    request_count: Arc<AtomicU64>,
}

impl ZapApiClient {
    /// Creates a client for the ZAP instance at `base_url`
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            api_key: api_key.into(),
            request_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Creates a client from the server section of the wrapper configuration
    pub fn from_config(config: &ZapServerConfig) -> Result<Self> {
        Self::new(&config.base_url(), config.api_key.clone(), config.timeout_secs)
    }

    /// Returns the total number of API calls made
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    async fn action(&self, component: &str, name: &str, params: Params<'_>) -> Result<Value> {
        self.call(component, "action", name, params).await
    }

    async fn view(&self, component: &str, name: &str, params: Params<'_>) -> Result<Value> {
        self.call(component, "view", name, params).await
    }

    async fn call(
        &self,
        component: &str,
        kind: &str,
        name: &str,
        params: Params<'_>,
    ) -> Result<Value> {
        let endpoint = format!("{component}/{kind}/{name}");
        let url = self.base_url.join(&format!("JSON/{endpoint}/"))?;

        self.request_count.fetch_add(1, Ordering::Relaxed);
        debug!("ZAP API call: {endpoint}");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let json: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let code = json
                .as_ref()
                .and_then(|v| v.get("code"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let message = json
                .as_ref()
                .and_then(|v| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}: {body}"));
            warn!("ZAP API call {endpoint} failed: {message}");
            return Err(ZapWrapperError::ZapApiError {
                endpoint,
                code,
                message,
            });
        }

        json.ok_or_else(|| {
            ZapWrapperError::InvalidZapResponse(format!("{endpoint} did not return JSON: {body}"))
        })
    }
}

/// Whether the engine rejected a call because the object is already present
fn is_already_exists(err: &ZapWrapperError) -> bool {
    match err {
        ZapWrapperError::ZapApiError { code, message, .. } => {
            code.as_deref() == Some(ALREADY_EXISTS_CODE)
                || message.eq_ignore_ascii_case("already exists")
        }
        _ => false,
    }
}

/// Reads a string element such as `{"scan": "3"}`
fn element(value: &Value, key: &str) -> Result<String> {
    match value.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ZapWrapperError::InvalidZapResponse(format!(
            "Missing element '{key}' in {value}"
        ))),
    }
}

fn numeric_element<T: std::str::FromStr>(value: &Value, key: &str) -> Result<T> {
    let raw = element(value, key)?;
    raw.trim().parse::<T>().map_err(|_| {
        ZapWrapperError::InvalidZapResponse(format!("Element '{key}' is not numeric: {raw}"))
    })
}

fn list_element(value: &Value, key: &str) -> Result<Vec<Value>> {
    match value.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(ZapWrapperError::InvalidZapResponse(format!(
            "Missing list '{key}' in {value}"
        ))),
    }
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn push_opt<'a>(params: &mut Params<'a>, key: &'a str, value: &Option<String>) {
    if let Some(v) = value {
        params.push((key, v.clone()));
    }
}

#[async_trait]
impl ZapEngine for ZapApiClient {
    async fn create_session(&self, name: &str, overwrite: bool) -> Result<()> {
        self.action(
            "core",
            "newSession",
            vec![("name", name.to_string()), ("overwrite", flag(overwrite))],
        )
        .await?;
        Ok(())
    }

    async fn set_max_alerts_per_rule(&self, max_alerts: u32) -> Result<()> {
        self.action(
            "core",
            "setOptionMaximumAlertInstances",
            vec![("NumberOfInstances", max_alerts.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn enable_all_passive_rules(&self) -> Result<()> {
        self.action("pscan", "enableAllScanners", vec![]).await?;
        Ok(())
    }

    async fn enable_all_active_rules_for_policy(&self, policy: Option<&str>) -> Result<()> {
        let mut params = vec![];
        if let Some(p) = policy {
            params.push(("scanPolicyName", p.to_string()));
        }
        self.action("ascan", "enableAllScanners", params).await?;
        Ok(())
    }

    async fn set_ajax_spider_browser(&self, browser_id: &str) -> Result<()> {
        self.action(
            "ajaxSpider",
            "setOptionBrowserId",
            vec![("String", browser_id.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn set_spider_max_depth(&self, depth: u32) -> Result<()> {
        self.action("spider", "setOptionMaxDepth", vec![("Integer", depth.to_string())])
            .await?;
        Ok(())
    }

    async fn set_ajax_spider_max_depth(&self, depth: u32) -> Result<()> {
        self.action(
            "ajaxSpider",
            "setOptionMaxCrawlDepth",
            vec![("Integer", depth.to_string())],
        )
        .await?;
        Ok(())
    }

    async fn disable_passive_rule(&self, rule_id: &str) -> Result<()> {
        self.action("pscan", "disableScanners", vec![("ids", rule_id.to_string())])
            .await?;
        info!("Passive scanner rule: {rule_id}, was deactivated");
        Ok(())
    }

    async fn disable_active_rule_for_policy(
        &self,
        rule_id: &str,
        policy: Option<&str>,
    ) -> Result<()> {
        let mut params = vec![("ids", rule_id.to_string())];
        if let Some(p) = policy {
            params.push(("scanPolicyName", p.to_string()));
        }
        self.action("ascan", "disableScanners", params).await?;
        info!("Active scanner rule: {rule_id}, was deactivated");
        Ok(())
    }

    async fn set_proxy_enabled(&self, enabled: bool) -> Result<()> {
        self.action("network", "setHttpProxyEnabled", vec![("enabled", flag(enabled))])
            .await?;
        Ok(())
    }

    async fn configure_proxy(&self, proxy: &ProxyInformation) -> Result<()> {
        let mut params = vec![("host", proxy.host.clone()), ("port", proxy.port.to_string())];
        push_opt(&mut params, "realm", &proxy.realm);
        push_opt(&mut params, "username", &proxy.username);
        push_opt(&mut params, "password", &proxy.password);
        self.action("network", "setHttpProxy", params).await?;
        Ok(())
    }

    async fn set_proxy_auth_enabled(&self, enabled: bool) -> Result<()> {
        self.action(
            "network",
            "setHttpProxyAuthEnabled",
            vec![("enabled", flag(enabled))],
        )
        .await?;
        Ok(())
    }

    async fn create_context(&self, name: &str) -> Result<u32> {
        let response = self
            .action("context", "newContext", vec![("contextName", name.to_string())])
            .await?;
        numeric_element(&response, "contextId")
    }

    async fn add_replacer_rule(&self, rule: &ReplacerRule) -> Result<String> {
        let mut params = vec![
            ("description", rule.description.clone()),
            ("enabled", flag(rule.enabled)),
            ("matchType", rule.match_type.as_str().to_string()),
            ("matchRegex", flag(rule.match_regex)),
            ("matchString", rule.match_string.clone()),
            ("replacement", rule.replacement.clone()),
        ];
        push_opt(&mut params, "initiators", &rule.initiators);
        push_opt(&mut params, "url", &rule.url);

        match self.action("replacer", "addRule", params.clone()).await {
            Ok(_) => {}
            Err(e) if is_already_exists(&e) => {
                warn!(
                    "Replacer rule {} already exists, replacing it",
                    rule.description
                );
                self.remove_replacer_rule(&rule.description).await?;
                self.action("replacer", "addRule", params).await?;
            }
            Err(e) => return Err(e),
        }
        Ok(rule.description.clone())
    }

    async fn remove_replacer_rule(&self, handle: &str) -> Result<()> {
        self.action("replacer", "removeRule", vec![("description", handle.to_string())])
            .await?;
        Ok(())
    }

    async fn add_include_url_pattern(&self, context_name: &str, pattern: &str) -> Result<()> {
        self.action(
            "context",
            "includeInContext",
            vec![
                ("contextName", context_name.to_string()),
                ("regex", pattern.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn add_exclude_url_pattern(&self, context_name: &str, pattern: &str) -> Result<()> {
        self.action(
            "context",
            "excludeFromContext",
            vec![
                ("contextName", context_name.to_string()),
                ("regex", pattern.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn visit_url(&self, url: &str, follow_redirects: bool) -> Result<()> {
        self.action(
            "core",
            "accessUrl",
            vec![
                ("url", url.to_string()),
                ("followRedirects", flag(follow_redirects)),
            ],
        )
        .await?;
        Ok(())
    }

    async fn import_api_definition_file(
        &self,
        file: &Path,
        target_url: &str,
        context_id: u32,
    ) -> Result<()> {
        self.action(
            "openapi",
            "importFile",
            vec![
                ("file", file.display().to_string()),
                ("target", target_url.to_string()),
                ("contextId", context_id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn import_api_definition_url(
        &self,
        definition_url: &str,
        target_url: &str,
        context_id: u32,
    ) -> Result<()> {
        info!("Loading openAPI definition from: {definition_url}");
        self.action(
            "openapi",
            "importUrl",
            vec![
                ("url", definition_url.to_string()),
                ("hostOverride", target_url.to_string()),
                ("contextId", context_id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn configure_auth_method(
        &self,
        context_id: u32,
        method: &str,
        params: &str,
    ) -> Result<()> {
        self.action(
            "authentication",
            "setAuthenticationMethod",
            vec![
                ("contextId", context_id.to_string()),
                ("authMethodName", method.to_string()),
                ("authMethodConfigParams", params.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_session_management_method(
        &self,
        context_id: u32,
        method: &str,
        params: Option<&str>,
    ) -> Result<()> {
        let mut query = vec![
            ("contextId", context_id.to_string()),
            ("methodName", method.to_string()),
        ];
        if let Some(p) = params {
            query.push(("methodConfigParams", p.to_string()));
        }
        self.action("sessionManagement", "setSessionManagementMethod", query)
            .await?;
        Ok(())
    }

    async fn create_user(&self, context_id: u32, name: &str) -> Result<u32> {
        let response = self
            .action(
                "users",
                "newUser",
                vec![("contextId", context_id.to_string()), ("name", name.to_string())],
            )
            .await?;
        numeric_element(&response, "userId")
    }

    async fn configure_user_credentials(
        &self,
        context_id: u32,
        user_id: u32,
        params: &str,
    ) -> Result<()> {
        self.action(
            "users",
            "setAuthenticationCredentials",
            vec![
                ("contextId", context_id.to_string()),
                ("userId", user_id.to_string()),
                ("authCredentialsConfigParams", params.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_user_enabled(&self, context_id: u32, user_id: u32, enabled: bool) -> Result<()> {
        self.action(
            "users",
            "setUserEnabled",
            vec![
                ("contextId", context_id.to_string()),
                ("userId", user_id.to_string()),
                ("enabled", flag(enabled)),
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_forced_user(&self, context_id: u32, user_id: u32) -> Result<()> {
        self.action(
            "forcedUser",
            "setForcedUser",
            vec![
                ("contextId", context_id.to_string()),
                ("userId", user_id.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_forced_user_mode_enabled(&self, enabled: bool) -> Result<()> {
        self.action(
            "forcedUser",
            "setForcedUserModeEnabled",
            vec![("boolean", flag(enabled))],
        )
        .await?;
        Ok(())
    }

    async fn start_ajax_spider(&self, request: &AjaxSpiderRequest) -> Result<()> {
        match &request.user_name {
            Some(user_name) => {
                self.action(
                    "ajaxSpider",
                    "scanAsUser",
                    vec![
                        ("contextName", request.context_name.clone()),
                        ("userName", user_name.clone()),
                        ("url", request.url.clone()),
                        ("subtreeOnly", flag(request.subtree_only)),
                    ],
                )
                .await?;
            }
            None => {
                self.action(
                    "ajaxSpider",
                    "scan",
                    vec![
                        ("url", request.url.clone()),
                        ("inScope", flag(request.in_scope)),
                        ("contextName", request.context_name.clone()),
                        ("subtreeOnly", flag(request.subtree_only)),
                    ],
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn stop_ajax_spider(&self) -> Result<()> {
        self.action("ajaxSpider", "stop", vec![]).await?;
        Ok(())
    }

    async fn ajax_spider_status(&self) -> Result<String> {
        let response = self.view("ajaxSpider", "status", vec![]).await?;
        element(&response, "status")
    }

    async fn start_spider(&self, request: &SpiderRequest) -> Result<u32> {
        let max_children = request.max_children.map(|m| m.to_string());
        match request.user_id {
            Some(user_id) => {
                let mut params = vec![
                    ("contextId", request.context_id.to_string()),
                    ("userId", user_id.to_string()),
                    ("url", request.url.clone()),
                    ("recurse", flag(request.recurse)),
                    ("subtreeOnly", flag(request.subtree_only)),
                ];
                push_opt(&mut params, "maxChildren", &max_children);
                let response = self.action("spider", "scanAsUser", params).await?;
                numeric_element(&response, "scanAsUser")
            }
            None => {
                let mut params = vec![
                    ("url", request.url.clone()),
                    ("recurse", flag(request.recurse)),
                    ("contextName", request.context_name.clone()),
                    ("subtreeOnly", flag(request.subtree_only)),
                ];
                push_opt(&mut params, "maxChildren", &max_children);
                let response = self.action("spider", "scan", params).await?;
                numeric_element(&response, "scan")
            }
        }
    }

    async fn spider_status(&self, scan_id: u32) -> Result<u32> {
        let response = self
            .view("spider", "status", vec![("scanId", scan_id.to_string())])
            .await?;
        numeric_element(&response, "status")
    }

    async fn stop_spider(&self, scan_id: u32) -> Result<()> {
        self.action("spider", "stop", vec![("scanId", scan_id.to_string())])
            .await?;
        Ok(())
    }

    async fn all_spider_urls(&self) -> Result<Vec<String>> {
        let response = self.view("spider", "allUrls", vec![]).await?;
        let urls = list_element(&response, "allUrls")?
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .filter(|url| !IGNORED_SPIDER_URL_PARTS.iter().any(|part| url.contains(part)))
            .collect();
        Ok(urls)
    }

    async fn passive_backlog_count(&self) -> Result<u64> {
        let response = self.view("pscan", "recordsToScan", vec![]).await?;
        numeric_element(&response, "recordsToScan")
    }

    async fn at_least_one_url_detected(&self) -> Result<bool> {
        let response = self.view("core", "sites", vec![]).await?;
        Ok(!list_element(&response, "sites")?.is_empty())
    }

    async fn start_active_scan(&self, request: &ActiveScanRequest) -> Result<u32> {
        match request.user_id {
            Some(user_id) => {
                let mut params = vec![
                    ("url", request.url.clone()),
                    ("contextId", request.context_id.to_string()),
                    ("userId", user_id.to_string()),
                    ("recurse", flag(request.recurse)),
                ];
                push_opt(&mut params, "scanPolicyName", &request.scan_policy);
                let response = self.action("ascan", "scanAsUser", params).await?;
                numeric_element(&response, "scanAsUser")
            }
            None => {
                let mut params = vec![
                    ("url", request.url.clone()),
                    ("recurse", flag(request.recurse)),
                    ("inScopeOnly", flag(request.in_scope_only)),
                    ("contextId", request.context_id.to_string()),
                ];
                push_opt(&mut params, "scanPolicyName", &request.scan_policy);
                let response = self.action("ascan", "scan", params).await?;
                numeric_element(&response, "scan")
            }
        }
    }

    async fn active_scan_status(&self, scan_id: u32) -> Result<u32> {
        let response = self
            .view("ascan", "status", vec![("scanId", scan_id.to_string())])
            .await?;
        numeric_element(&response, "status")
    }

    async fn stop_active_scan(&self, scan_id: u32) -> Result<()> {
        self.action("ascan", "stop", vec![("scanId", scan_id.to_string())])
            .await?;
        Ok(())
    }

    async fn generate_report(&self, request: &ReportRequest) -> Result<String> {
        let mut params = vec![
            ("title", request.title.clone()),
            ("template", request.template.clone()),
            ("reportFileName", request.report_file_name.clone()),
            ("reportDir", request.report_dir.clone()),
            ("display", flag(request.display)),
        ];
        push_opt(&mut params, "theme", &request.theme);
        push_opt(&mut params, "description", &request.description);
        push_opt(&mut params, "contexts", &request.contexts);
        push_opt(&mut params, "sites", &request.sites);
        push_opt(&mut params, "sections", &request.sections);
        push_opt(&mut params, "includedConfidences", &request.included_confidences);
        push_opt(&mut params, "includedRisks", &request.included_risks);
        push_opt(
            &mut params,
            "reportFileNamePattern",
            &request.report_file_name_pattern,
        );
        let response = self.action("reports", "generate", params).await?;
        element(&response, "generate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_accepts_strings_and_numbers() {
        assert_eq!(element(&json!({"scan": "7"}), "scan").expect("element"), "7");
        assert_eq!(element(&json!({"scan": 7}), "scan").expect("element"), "7");
        assert!(element(&json!({"other": 1}), "scan").is_err());
    }

    #[test]
    fn test_already_exists_detection() {
        let by_code = ZapWrapperError::ZapApiError {
            endpoint: "replacer/action/addRule".to_string(),
            code: Some("already_exists".to_string()),
            message: "Already exists".to_string(),
        };
        let other = ZapWrapperError::ZapApiError {
            endpoint: "replacer/action/addRule".to_string(),
            code: Some("illegal_parameter".to_string()),
            message: "Provided parameter has illegal or unrecognized value".to_string(),
        };
        assert!(is_already_exists(&by_code));
        assert!(!is_already_exists(&other));
    }

    #[test]
    fn test_numeric_element_rejects_garbage() {
        let value = json!({"status": "running"});
        assert!(numeric_element::<u32>(&value, "status").is_err());
    }
}
