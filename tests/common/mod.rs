//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use zap_wrapper::budget::Clock;
use zap_wrapper::cancel::{CancellationMonitor, FlagCancellation};
use zap_wrapper::context::{ScanContext, ScanContextBuilder};
use zap_wrapper::engine::{
    ActiveScanRequest, AjaxSpiderRequest, ReplacerRule, ReportRequest, SpiderRequest, ZapEngine,
};
use zap_wrapper::error::{Result, ZapWrapperError};
use zap_wrapper::messages::CollectingMessageWriter;
use zap_wrapper::models::ProxyInformation;
use zap_wrapper::scan::ScanOrchestrator;

pub const TEST_CONTEXT_ID: u32 = 1;
pub const TEST_USER_ID: u32 = 7;
pub const TEST_SCAN_ID: u32 = 3;

/// One recorded engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: &'static str,
    pub args: Vec<String>,
}

/// Engine fake that records every call and replays scripted statuses
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    ajax_statuses: Mutex<VecDeque<String>>,
    spider_statuses: Mutex<VecDeque<u32>>,
    passive_counts: Mutex<VecDeque<u64>>,
    active_statuses: Mutex<VecDeque<u32>>,
    spider_urls: Mutex<Vec<String>>,
    no_url_detected: AtomicBool,
    fail_on: Mutex<Vec<&'static str>>,
    cancel_on: Mutex<Option<(&'static str, FlagCancellation)>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Statuses returned one by one; once drained the AJAX spider reports `stopped`
    pub fn script_ajax_statuses(&self, statuses: &[&str]) {
        *self.ajax_statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
    }

    /// Progress values returned one by one; once drained the spider reports 100
    pub fn script_spider_statuses(&self, statuses: &[u32]) {
        *self.spider_statuses.lock().unwrap() = statuses.iter().copied().collect();
    }

    /// Backlog counts returned one by one; once drained the backlog is empty
    pub fn script_passive_counts(&self, counts: &[u64]) {
        *self.passive_counts.lock().unwrap() = counts.iter().copied().collect();
    }

    /// Progress values returned one by one; once drained the active scan reports 100
    pub fn script_active_statuses(&self, statuses: &[u32]) {
        *self.active_statuses.lock().unwrap() = statuses.iter().copied().collect();
    }

    pub fn set_spider_urls(&self, urls: &[&str]) {
        *self.spider_urls.lock().unwrap() = urls.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_no_url_detected(&self) {
        self.no_url_detected.store(true, Ordering::SeqCst);
    }

    /// Makes every call of `name` fail with an API error. Can be called for several names.
    pub fn fail_on(&self, name: &'static str) {
        self.fail_on.lock().unwrap().push(name);
    }

    /// Raises the cancellation flag as soon as `name` is called
    pub fn cancel_on(&self, name: &'static str, flag: FlagCancellation) {
        *self.cancel_on.lock().unwrap() = Some((name, flag));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|c| c.name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.name == name).count()
    }

    pub fn args_of(&self, name: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.name == name)
            .map(|c| c.args)
            .collect()
    }

    fn record(&self, name: &'static str, args: Vec<String>) -> Result<()> {
        self.calls.lock().unwrap().push(Call { name, args });
        if let Some((trigger, flag)) = self.cancel_on.lock().unwrap().as_ref() {
            if *trigger == name {
                flag.cancel();
            }
        }
        if self.fail_on.lock().unwrap().contains(&name) {
            return Err(ZapWrapperError::ZapApiError {
                endpoint: name.to_string(),
                code: None,
                message: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

#[async_trait]
impl ZapEngine for FakeEngine {
    async fn create_session(&self, name: &str, overwrite: bool) -> Result<()> {
        self.record("create_session", vec![name.to_string(), overwrite.to_string()])
    }

    async fn set_max_alerts_per_rule(&self, max_alerts: u32) -> Result<()> {
        self.record("set_max_alerts_per_rule", vec![max_alerts.to_string()])
    }

    async fn enable_all_passive_rules(&self) -> Result<()> {
        self.record("enable_all_passive_rules", vec![])
    }

    async fn enable_all_active_rules_for_policy(&self, policy: Option<&str>) -> Result<()> {
        self.record("enable_all_active_rules_for_policy", vec![opt(policy)])
    }

    async fn set_ajax_spider_browser(&self, browser_id: &str) -> Result<()> {
        self.record("set_ajax_spider_browser", vec![browser_id.to_string()])
    }

    async fn set_spider_max_depth(&self, depth: u32) -> Result<()> {
        self.record("set_spider_max_depth", vec![depth.to_string()])
    }

    async fn set_ajax_spider_max_depth(&self, depth: u32) -> Result<()> {
        self.record("set_ajax_spider_max_depth", vec![depth.to_string()])
    }

    async fn disable_passive_rule(&self, rule_id: &str) -> Result<()> {
        self.record("disable_passive_rule", vec![rule_id.to_string()])
    }

    async fn disable_active_rule_for_policy(
        &self,
        rule_id: &str,
        policy: Option<&str>,
    ) -> Result<()> {
        self.record(
            "disable_active_rule_for_policy",
            vec![rule_id.to_string(), opt(policy)],
        )
    }

    async fn set_proxy_enabled(&self, enabled: bool) -> Result<()> {
        self.record("set_proxy_enabled", vec![enabled.to_string()])
    }

    async fn configure_proxy(&self, proxy: &ProxyInformation) -> Result<()> {
        self.record(
            "configure_proxy",
            vec![proxy.host.clone(), proxy.port.to_string()],
        )
    }

    async fn set_proxy_auth_enabled(&self, enabled: bool) -> Result<()> {
        self.record("set_proxy_auth_enabled", vec![enabled.to_string()])
    }

    async fn create_context(&self, name: &str) -> Result<u32> {
        self.record("create_context", vec![name.to_string()])?;
        Ok(TEST_CONTEXT_ID)
    }

    async fn add_replacer_rule(&self, rule: &ReplacerRule) -> Result<String> {
        self.record(
            "add_replacer_rule",
            vec![
                rule.description.clone(),
                rule.match_string.clone(),
                rule.replacement.clone(),
                opt(rule.url.as_deref()),
            ],
        )?;
        Ok(rule.description.clone())
    }

    async fn remove_replacer_rule(&self, handle: &str) -> Result<()> {
        self.record("remove_replacer_rule", vec![handle.to_string()])
    }

    async fn add_include_url_pattern(&self, context_name: &str, pattern: &str) -> Result<()> {
        self.record(
            "add_include_url_pattern",
            vec![context_name.to_string(), pattern.to_string()],
        )
    }

    async fn add_exclude_url_pattern(&self, context_name: &str, pattern: &str) -> Result<()> {
        self.record(
            "add_exclude_url_pattern",
            vec![context_name.to_string(), pattern.to_string()],
        )
    }

    async fn visit_url(&self, url: &str, follow_redirects: bool) -> Result<()> {
        self.record(
            "visit_url",
            vec![url.to_string(), follow_redirects.to_string()],
        )
    }

    async fn import_api_definition_file(
        &self,
        file: &Path,
        target_url: &str,
        context_id: u32,
    ) -> Result<()> {
        self.record(
            "import_api_definition_file",
            vec![
                file.display().to_string(),
                target_url.to_string(),
                context_id.to_string(),
            ],
        )
    }

    async fn import_api_definition_url(
        &self,
        definition_url: &str,
        target_url: &str,
        context_id: u32,
    ) -> Result<()> {
        self.record(
            "import_api_definition_url",
            vec![
                definition_url.to_string(),
                target_url.to_string(),
                context_id.to_string(),
            ],
        )
    }

    async fn configure_auth_method(&self, context_id: u32, method: &str, params: &str) -> Result<()> {
        self.record(
            "configure_auth_method",
            vec![context_id.to_string(), method.to_string(), params.to_string()],
        )
    }

    async fn set_session_management_method(
        &self,
        context_id: u32,
        method: &str,
        params: Option<&str>,
    ) -> Result<()> {
        self.record(
            "set_session_management_method",
            vec![context_id.to_string(), method.to_string(), opt(params)],
        )
    }

    async fn create_user(&self, context_id: u32, name: &str) -> Result<u32> {
        self.record("create_user", vec![context_id.to_string(), name.to_string()])?;
        Ok(TEST_USER_ID)
    }

    async fn configure_user_credentials(
        &self,
        context_id: u32,
        user_id: u32,
        params: &str,
    ) -> Result<()> {
        self.record(
            "configure_user_credentials",
            vec![context_id.to_string(), user_id.to_string(), params.to_string()],
        )
    }

    async fn set_user_enabled(&self, context_id: u32, user_id: u32, enabled: bool) -> Result<()> {
        self.record(
            "set_user_enabled",
            vec![context_id.to_string(), user_id.to_string(), enabled.to_string()],
        )
    }

    async fn set_forced_user(&self, context_id: u32, user_id: u32) -> Result<()> {
        self.record(
            "set_forced_user",
            vec![context_id.to_string(), user_id.to_string()],
        )
    }

    async fn set_forced_user_mode_enabled(&self, enabled: bool) -> Result<()> {
        self.record("set_forced_user_mode_enabled", vec![enabled.to_string()])
    }

    async fn start_ajax_spider(&self, request: &AjaxSpiderRequest) -> Result<()> {
        self.record(
            "start_ajax_spider",
            vec![request.url.clone(), opt(request.user_name.as_deref())],
        )
    }

    async fn stop_ajax_spider(&self) -> Result<()> {
        self.record("stop_ajax_spider", vec![])
    }

    async fn ajax_spider_status(&self) -> Result<String> {
        self.record("ajax_spider_status", vec![])?;
        Ok(self
            .ajax_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "stopped".to_string()))
    }

    async fn start_spider(&self, request: &SpiderRequest) -> Result<u32> {
        self.record(
            "start_spider",
            vec![
                request.url.clone(),
                request.user_id.map(|u| u.to_string()).unwrap_or_else(|| "-".to_string()),
            ],
        )?;
        Ok(TEST_SCAN_ID)
    }

    async fn spider_status(&self, scan_id: u32) -> Result<u32> {
        self.record("spider_status", vec![scan_id.to_string()])?;
        Ok(self.spider_statuses.lock().unwrap().pop_front().unwrap_or(100))
    }

    async fn stop_spider(&self, scan_id: u32) -> Result<()> {
        self.record("stop_spider", vec![scan_id.to_string()])
    }

    async fn all_spider_urls(&self) -> Result<Vec<String>> {
        self.record("all_spider_urls", vec![])?;
        Ok(self.spider_urls.lock().unwrap().clone())
    }

    async fn passive_backlog_count(&self) -> Result<u64> {
        self.record("passive_backlog_count", vec![])?;
        Ok(self.passive_counts.lock().unwrap().pop_front().unwrap_or(0))
    }

    async fn at_least_one_url_detected(&self) -> Result<bool> {
        self.record("at_least_one_url_detected", vec![])?;
        Ok(!self.no_url_detected.load(Ordering::SeqCst))
    }

    async fn start_active_scan(&self, request: &ActiveScanRequest) -> Result<u32> {
        self.record(
            "start_active_scan",
            vec![
                request.url.clone(),
                request.user_id.map(|u| u.to_string()).unwrap_or_else(|| "-".to_string()),
            ],
        )?;
        Ok(TEST_SCAN_ID)
    }

    async fn active_scan_status(&self, scan_id: u32) -> Result<u32> {
        self.record("active_scan_status", vec![scan_id.to_string()])?;
        Ok(self.active_statuses.lock().unwrap().pop_front().unwrap_or(100))
    }

    async fn stop_active_scan(&self, scan_id: u32) -> Result<()> {
        self.record("stop_active_scan", vec![scan_id.to_string()])
    }

    async fn generate_report(&self, request: &ReportRequest) -> Result<String> {
        self.record(
            "generate_report",
            vec![
                request.title.clone(),
                request.template.clone(),
                request.report_file_name.clone(),
                request.report_dir.clone(),
            ],
        )?;
        // the engine appends .json to JSON reports
        let written = Path::new(&request.report_dir).join(format!("{}.json", request.report_file_name));
        std::fs::write(&written, "{\"runs\":[]}")?;
        Ok(written.display().to_string())
    }
}

/// Clock that only moves when the code under test sleeps
#[derive(Default)]
pub struct FakeClock {
    now: AtomicU64,
    sleeps: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.now
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

pub fn target() -> Url {
    Url::parse("https://www.example.com").expect("target url")
}

/// Context builder with a fixed name and a one second poll interval
pub fn context_builder(report_dir: &Path) -> ScanContextBuilder {
    ScanContext::builder(target(), report_dir.join("result.txt"))
        .context_name("test-context")
        .poll_interval(Duration::from_secs(1))
}

/// Everything a test needs to drive and inspect an orchestrator
pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub clock: Arc<FakeClock>,
    pub messages: Arc<CollectingMessageWriter>,
    pub cancel: FlagCancellation,
    pub orchestrator: ScanOrchestrator,
}

pub fn harness(context: ScanContext) -> Harness {
    let engine = FakeEngine::new();
    let clock = FakeClock::new();
    let messages = Arc::new(CollectingMessageWriter::new());
    let cancel = FlagCancellation::new();
    let orchestrator = ScanOrchestrator::new(
        engine.clone(),
        context,
        CancellationMonitor::new(Arc::new(cancel.clone())),
        clock.clone(),
        messages.clone(),
    );
    Harness {
        engine,
        clock,
        messages,
        cancel,
        orchestrator,
    }
}
