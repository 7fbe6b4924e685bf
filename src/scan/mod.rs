//! Scan orchestration
//!
//! [`ScanOrchestrator`] drives one scan through the engine phase by phase:
//! session setup, rule policy, proxy, context and scope, authentication,
//! crawling, passive and active scanning, report generation and clean up.
//! Every wait loop checks the cancellation signal once per iteration and is
//! bounded by a share of the remaining [`TimeBudget`].

pub mod auth;
pub mod replacer;
pub mod report;
pub mod scope;

use crate::budget::{Clock, PhaseDurations, TimeBudget};
use crate::cancel::CancellationMonitor;
use crate::context::ScanContext;
use crate::engine::{
    ActiveScanRequest, AjaxSpiderRequest, SpiderRequest, ZapEngine, AJAX_SPIDER_STATUS_STOPPED,
};
use crate::error::{Result, ZapWrapperError};
use crate::messages::{MessageWriter, UserMessage};
use crate::models::{ProxyInformation, UserInformation};
use crate::rules::{DeactivatedRuleReferences, RuleClassification, RuleSetPolicy, ZapFullRuleset};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use auth::AuthenticationConfigurer;
pub use replacer::ReplacerRuleManager;
pub use scope::UrlScopeManager;

/// Crawl depth of the classic spider
pub const DEFAULT_MAX_DEPTH_SPIDER: u32 = 5;

/// Crawl depth of the AJAX spider
pub const DEFAULT_MAX_DEPTH_AJAX_SPIDER: u32 = 10;

/// Zero disables the engine's alert limit
const UNLIMITED_ALERTS_PER_RULE: u32 = 0;

const ACTIVE_SCAN_SKIPPED_MESSAGE: &str = "Skipped the active scan, because no URLs were detected by the crawler! Please check if the URL you specified or any of the includes are accessible.";

/// Engine work a wait loop is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitPhase {
    AjaxSpider,
    Spider(u32),
    PassiveScan,
    ActiveScan(u32),
}

impl WaitPhase {
    fn name(&self) -> &'static str {
        match self {
            WaitPhase::AjaxSpider => "AjaxSpider",
            WaitPhase::Spider(_) => "Spider",
            WaitPhase::PassiveScan => "Passive scan",
            WaitPhase::ActiveScan(_) => "Active scan",
        }
    }
}

/// Sequences all scan phases against one engine session
pub struct ScanOrchestrator {
    engine: Arc<dyn ZapEngine>,
    context: ScanContext,
    cancellation: CancellationMonitor,
    clock: Arc<dyn Clock>,
    messages: Arc<dyn MessageWriter>,
    replacer_rules: ReplacerRuleManager,
    phase_durations: PhaseDurations,
}

impl ScanOrchestrator {
    pub fn new(
        engine: Arc<dyn ZapEngine>,
        context: ScanContext,
        cancellation: CancellationMonitor,
        clock: Arc<dyn Clock>,
        messages: Arc<dyn MessageWriter>,
    ) -> Self {
        let phase_durations =
            PhaseDurations::new(context.ajax_spider_enabled, context.active_scan_enabled);
        Self {
            engine,
            context,
            cancellation,
            clock,
            messages,
            replacer_rules: ReplacerRuleManager::new(),
            phase_durations,
        }
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    /// Replacer rules created so far and not yet cleaned up
    pub fn created_replacer_rules(&self) -> &[String] {
        self.replacer_rules.created_rules()
    }

    fn context_name(&self) -> &str {
        &self.context.context_name
    }

    fn send_message(&self, message: UserMessage) {
        if let Err(e) = self.messages.write(message) {
            warn!(
                "For scan {}: User message could not be written: {e}",
                self.context_name()
            );
        }
    }

    /// Runs every phase in order and always cleans up.
    ///
    /// Failures are wrapped as [`ZapWrapperError::ScanFailed`]; a cancellation
    /// is returned as is so its exit code survives.
    pub async fn scan(&mut self) -> Result<()> {
        let result = self.run_phases().await;
        self.clean_up().await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => {
                error!("For scan {}: Scan failed: {e}", self.context_name());
                Err(ZapWrapperError::ScanFailed {
                    context_name: self.context.context_name.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn run_phases(&mut self) -> Result<()> {
        let started = self.clock.now_millis();

        self.setup_standard_configuration().await?;
        self.deactivate_rules(
            self.context.full_ruleset.as_ref(),
            self.context.deactivated_rules.as_ref(),
        )
        .await?;
        self.setup_additional_proxy_configuration(self.context.proxy.as_ref())
            .await?;
        let context_id = self.create_context().await?;
        self.add_x_sechub_dast_header().await?;
        self.add_replacer_rules_for_headers().await?;
        self.add_default_excludes().await?;
        self.add_included_and_excluded_urls_to_context().await?;
        self.load_api_definitions(context_id).await?;
        let user = self.configure_login_inside_zap_context(context_id).await?;

        let setup_time = self.clock.now_millis().saturating_sub(started);
        let mut budget = TimeBudget::new(self.context.max_scan_duration_ms).consume(setup_time);

        if self.context.ajax_spider_enabled {
            budget = self.run_ajax_spider(user.as_ref(), budget).await?;
        }
        budget = self.run_spider(context_id, user.as_ref(), budget).await?;
        budget = self.passive_scan(budget).await?;
        if self.context.active_scan_enabled {
            budget = self
                .run_active_scan(context_id, user.as_ref(), budget)
                .await?;
        }

        self.generate_zap_report().await?;
        info!(
            "For scan {}: Scan finished with {}ms of the time budget left",
            self.context_name(),
            budget.remaining()
        );
        Ok(())
    }

    /// New session, unlimited alerts, all rules enabled, crawler defaults
    pub async fn setup_standard_configuration(&self) -> Result<()> {
        info!("For scan {}: Creating new session", self.context_name());
        self.engine.create_session(self.context_name(), true).await?;
        self.engine
            .set_max_alerts_per_rule(UNLIMITED_ALERTS_PER_RULE)
            .await?;
        self.engine.enable_all_passive_rules().await?;
        self.engine.enable_all_active_rules_for_policy(None).await?;
        self.engine
            .set_ajax_spider_browser(&self.context.ajax_spider_browser_id)
            .await?;
        self.engine
            .set_spider_max_depth(DEFAULT_MAX_DEPTH_SPIDER)
            .await?;
        self.engine
            .set_ajax_spider_max_depth(DEFAULT_MAX_DEPTH_AJAX_SPIDER)
            .await?;
        Ok(())
    }

    /// Disables each referenced rule known to the ruleset
    pub async fn deactivate_rules(
        &self,
        ruleset: Option<&ZapFullRuleset>,
        deactivated: Option<&DeactivatedRuleReferences>,
    ) -> Result<()> {
        let (Some(ruleset), Some(deactivated)) = (ruleset, deactivated) else {
            debug!("For scan {}: No rules to deactivate", self.context_name());
            return Ok(());
        };
        if deactivated.is_empty() {
            return Ok(());
        }

        let policy = RuleSetPolicy::new(ruleset);
        for reference in &deactivated.deactivated_rule_references {
            match policy.classify(reference) {
                RuleClassification::Active { id } => {
                    self.engine
                        .disable_active_rule_for_policy(&id, self.context.scan_policy.as_deref())
                        .await?;
                }
                RuleClassification::Passive { id } => {
                    self.engine.disable_passive_rule(&id).await?;
                }
                RuleClassification::Unknown => {
                    debug!(
                        "For scan {}: Rule reference {} is neither a passive nor an active rule, skipped",
                        self.context_name(),
                        reference.reference
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn setup_additional_proxy_configuration(
        &self,
        proxy: Option<&ProxyInformation>,
    ) -> Result<()> {
        let Some(proxy) = proxy else {
            info!("For scan {}: No proxy was set, continuing without proxy", self.context_name());
            self.engine.set_proxy_enabled(false).await?;
            return Ok(());
        };

        info!(
            "For scan {}: Using proxy {}:{} to reach target",
            self.context_name(),
            proxy.host,
            proxy.port
        );
        self.engine.configure_proxy(proxy).await?;
        self.engine
            .set_proxy_auth_enabled(proxy.has_credentials())
            .await?;
        self.engine.set_proxy_enabled(true).await?;
        Ok(())
    }

    /// Creates the engine context named after the scan and returns its id
    pub async fn create_context(&self) -> Result<u32> {
        info!("For scan {}: Creating context", self.context_name());
        self.engine.create_context(self.context_name()).await
    }

    /// Marks every request of this scan with the DAST job header
    pub async fn add_x_sechub_dast_header(&mut self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.replacer_rules
            .add_dast_header(engine.as_ref(), &self.context.context_name)
            .await
    }

    pub async fn add_replacer_rules_for_headers(&mut self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        self.replacer_rules
            .add_rules_for_headers(
                engine.as_ref(),
                &self.context.context_name,
                &self.context.web_scan.headers,
                &self.context.header_value_files,
                self.messages.as_ref(),
            )
            .await
    }

    /// Keeps the crawler away from logout links
    pub async fn add_default_excludes(&self) -> Result<()> {
        UrlScopeManager::new(self.engine.as_ref(), self.context_name())
            .add_default_excludes()
            .await
    }

    pub async fn add_included_and_excluded_urls_to_context(&self) -> Result<()> {
        UrlScopeManager::new(self.engine.as_ref(), self.context_name())
            .add_included_and_excluded_urls(&self.context.include_urls, &self.context.exclude_urls)
            .await
    }

    pub async fn load_api_definitions(&self, context_id: u32) -> Result<()> {
        UrlScopeManager::new(self.engine.as_ref(), self.context_name())
            .load_api_definitions(
                context_id,
                &self.context.target_url,
                self.context.api_definition_url.as_deref(),
                &self.context.api_definition_files,
            )
            .await
    }

    pub async fn configure_login_inside_zap_context(
        &self,
        context_id: u32,
    ) -> Result<Option<UserInformation>> {
        AuthenticationConfigurer::new(self.engine.as_ref(), self.context_name())
            .configure(context_id, &self.context)
            .await
    }

    /// Starts the AJAX spider, as the scan user when one exists, and waits for it
    pub async fn run_ajax_spider(
        &self,
        user: Option<&UserInformation>,
        budget: TimeBudget,
    ) -> Result<TimeBudget> {
        info!("For scan {}: Starting AjaxSpider", self.context_name());
        let request = AjaxSpiderRequest {
            url: self.context.target_url.to_string(),
            context_name: self.context.context_name.clone(),
            user_name: user.map(|u| u.user_name.clone()),
            in_scope: true,
            subtree_only: true,
        };
        self.engine.start_ajax_spider(&request).await?;
        self.wait_for_ajax_spider_results(budget).await
    }

    pub async fn wait_for_ajax_spider_results(&self, budget: TimeBudget) -> Result<TimeBudget> {
        let max = self.phase_durations.ajax_spider(budget);
        self.wait_for(WaitPhase::AjaxSpider, max, budget).await
    }

    /// Starts the spider, as the scan user when one exists, and waits for it
    pub async fn run_spider(
        &self,
        context_id: u32,
        user: Option<&UserInformation>,
        budget: TimeBudget,
    ) -> Result<TimeBudget> {
        info!("For scan {}: Starting Spider", self.context_name());
        let request = SpiderRequest {
            url: self.context.target_url.to_string(),
            context_name: self.context.context_name.clone(),
            context_id,
            user_id: user.map(|u| u.zap_user_id),
            max_children: None,
            recurse: true,
            subtree_only: true,
        };
        let scan_id = self.engine.start_spider(&request).await?;
        self.wait_for_spider_results(scan_id, budget).await
    }

    /// Waits for the spider and forwards the detected URLs as user messages
    pub async fn wait_for_spider_results(
        &self,
        scan_id: u32,
        budget: TimeBudget,
    ) -> Result<TimeBudget> {
        let max = self.phase_durations.spider(budget);
        let budget = self.wait_for(WaitPhase::Spider(scan_id), max, budget).await?;

        let urls = self.engine.all_spider_urls().await?;
        info!(
            "For scan {}: Spider detected {} URLs",
            self.context_name(),
            urls.len()
        );
        for url in urls {
            self.send_message(UserMessage::info(format!("Detect url to scan: {url}")));
        }
        Ok(budget)
    }

    /// Waits until the passive backlog is empty. Nothing is started here.
    pub async fn passive_scan(&self, budget: TimeBudget) -> Result<TimeBudget> {
        info!("For scan {}: Starting passive scan", self.context_name());
        let max = self.phase_durations.passive_scan(budget);
        self.wait_for(WaitPhase::PassiveScan, max, budget).await
    }

    /// Starts the active scan when the crawl detected at least one URL
    pub async fn run_active_scan(
        &self,
        context_id: u32,
        user: Option<&UserInformation>,
        budget: TimeBudget,
    ) -> Result<TimeBudget> {
        if !self.engine.at_least_one_url_detected().await? {
            warn!(
                "For scan {}: Skipping active scan, since no URLs were detected by spider or ajaxSpider",
                self.context_name()
            );
            self.send_message(UserMessage::warning(ACTIVE_SCAN_SKIPPED_MESSAGE));
            return Ok(budget);
        }

        info!("For scan {}: Starting ActiveScan", self.context_name());
        let request = ActiveScanRequest {
            url: self.context.target_url.to_string(),
            context_id,
            user_id: user.map(|u| u.zap_user_id),
            recurse: true,
            in_scope_only: true,
            scan_policy: self.context.scan_policy.clone(),
        };
        let scan_id = self.engine.start_active_scan(&request).await?;
        self.wait_for_active_scan_results(scan_id, budget).await
    }

    pub async fn wait_for_active_scan_results(
        &self,
        scan_id: u32,
        budget: TimeBudget,
    ) -> Result<TimeBudget> {
        let max = self.phase_durations.active_scan(budget);
        self.wait_for(WaitPhase::ActiveScan(scan_id), max, budget)
            .await
    }

    pub async fn generate_zap_report(&self) -> Result<()> {
        let target = report::resolve_report_target(&self.context.report_file, self.context_name())?;
        let request =
            report::report_request(self.context_name(), &self.context.report_template, &target);
        let written = self.engine.generate_report(&request).await?;
        debug!("For scan {}: Engine wrote report {written}", self.context_name());

        report::rename_report_if_necessary(&self.context.report_file, self.context_name())?;
        info!(
            "For scan {}: Report can be found at {}",
            self.context_name(),
            target.directory.join(&target.file_name).display()
        );
        Ok(())
    }

    /// Removes the transient engine configuration of this scan.
    ///
    /// Never fails; problems are logged so they cannot hide an earlier error.
    pub async fn clean_up(&mut self) {
        info!("For scan {}: Starting cleanup", self.context.context_name);
        let engine = Arc::clone(&self.engine);
        let failures = self
            .replacer_rules
            .remove_all(engine.as_ref(), &self.context.context_name)
            .await;
        if failures == 0 {
            info!("For scan {}: Cleanup successful", self.context.context_name);
        } else {
            error!(
                "For scan {}: Cleanup finished with {failures} failures",
                self.context.context_name
            );
        }
    }

    async fn wait_for(
        &self,
        phase: WaitPhase,
        max_millis: u64,
        budget: TimeBudget,
    ) -> Result<TimeBudget> {
        let started = self.clock.now_millis();
        loop {
            if self.cancellation.is_scan_cancelled() {
                if let Err(e) = self.stop(phase).await {
                    warn!(
                        "For scan {}: {} could not be stopped: {e}",
                        self.context_name(),
                        phase.name()
                    );
                }
                return Err(self.cancellation.cancel_scan(self.context_name()));
            }

            if self.is_done(phase).await? {
                info!("For scan {}: {} completed", self.context_name(), phase.name());
                break;
            }

            let elapsed = self.clock.now_millis().saturating_sub(started);
            if elapsed >= max_millis {
                warn!(
                    "For scan {}: {} ran out of time after {elapsed}ms",
                    self.context_name(),
                    phase.name()
                );
                break;
            }
            self.clock.sleep(self.context.poll_interval).await;
        }

        self.stop(phase).await?;
        let elapsed = self.clock.now_millis().saturating_sub(started);
        Ok(budget.consume(elapsed))
    }

    async fn is_done(&self, phase: WaitPhase) -> Result<bool> {
        let name = self.context_name();
        match phase {
            WaitPhase::AjaxSpider => {
                let status = self.engine.ajax_spider_status().await?;
                info!("For scan {name}: AjaxSpider status {status}");
                Ok(status == AJAX_SPIDER_STATUS_STOPPED)
            }
            WaitPhase::Spider(scan_id) => {
                let progress = self.engine.spider_status(scan_id).await?;
                info!("For scan {name}: Spider progress {progress}%");
                Ok(progress >= 100)
            }
            WaitPhase::PassiveScan => {
                let records = self.engine.passive_backlog_count().await?;
                info!("For scan {name}: Passive scan number of records left for scanning: {records}");
                Ok(records == 0)
            }
            WaitPhase::ActiveScan(scan_id) => {
                let progress = self.engine.active_scan_status(scan_id).await?;
                info!("For scan {name}: Active scan progress {progress}%");
                Ok(progress >= 100)
            }
        }
    }

    /// Stops a phase so it does not keep running in the background
    async fn stop(&self, phase: WaitPhase) -> Result<()> {
        match phase {
            WaitPhase::AjaxSpider => self.engine.stop_ajax_spider().await,
            WaitPhase::Spider(scan_id) => self.engine.stop_spider(scan_id).await,
            WaitPhase::PassiveScan => Ok(()),
            WaitPhase::ActiveScan(scan_id) => self.engine.stop_active_scan(scan_id).await,
        }
    }
}
