//! Integration tests for crawling, scanning, reporting and full scan runs

mod common;

use common::{context_builder, harness, TEST_CONTEXT_ID, TEST_SCAN_ID};
use zap_wrapper::budget::TimeBudget;
use zap_wrapper::error::{ExitCode, ZapWrapperError};
use zap_wrapper::messages::MessageType;
use zap_wrapper::models::{
    BasicLoginConfiguration, HttpHeaderConfiguration, UserInformation, WebLoginConfiguration,
    WebScanConfiguration,
};

fn basic_login_scan() -> WebScanConfiguration {
    WebScanConfiguration {
        login: Some(WebLoginConfiguration {
            url: None,
            basic: Some(BasicLoginConfiguration {
                realm: None,
                user: "user0".to_string(),
                password: "secret".to_string(),
            }),
            form: None,
        }),
        ..WebScanConfiguration::default()
    }
}

fn scan_user() -> UserInformation {
    UserInformation {
        user_name: "user0".to_string(),
        zap_user_id: 7,
    }
}

// ── Wait loops ──

#[tokio::test]
async fn test_spider_completion_stops_once_and_consumes_elapsed_time() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.engine.script_spider_statuses(&[10, 50, 100]);

    let budget = h
        .orchestrator
        .wait_for_spider_results(TEST_SCAN_ID, TimeBudget::new(60_000))
        .await
        .unwrap();

    assert_eq!(h.engine.count("spider_status"), 3);
    assert_eq!(h.clock.sleeps(), 2);
    assert_eq!(h.engine.count("stop_spider"), 1);
    assert_eq!(budget.remaining(), 58_000);
}

#[tokio::test]
async fn test_spider_stops_when_its_share_of_the_budget_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.engine.script_spider_statuses(&[0; 20]);

    // spider only: 80% of 5000ms with a one second poll interval
    let budget = h
        .orchestrator
        .wait_for_spider_results(TEST_SCAN_ID, TimeBudget::new(5_000))
        .await
        .unwrap();

    assert_eq!(h.engine.count("spider_status"), 5);
    assert_eq!(h.clock.sleeps(), 4);
    assert_eq!(h.engine.count("stop_spider"), 1);
    assert_eq!(budget.remaining(), 1_000);
    // URLs are still collected after a timeout
    assert_eq!(h.engine.count("all_spider_urls"), 1);
}

#[tokio::test]
async fn test_exhausted_budget_polls_once() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.engine.script_active_statuses(&[0]);

    let budget = h
        .orchestrator
        .wait_for_active_scan_results(TEST_SCAN_ID, TimeBudget::new(0))
        .await
        .unwrap();

    assert_eq!(h.engine.count("active_scan_status"), 1);
    assert_eq!(h.clock.sleeps(), 0);
    assert_eq!(h.engine.count("stop_active_scan"), 1);
    assert!(budget.is_exhausted());
}

#[tokio::test]
async fn test_spider_detected_urls_become_info_messages() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.engine
        .set_spider_urls(&["https://www.example.com/", "https://www.example.com/login"]);

    h.orchestrator
        .wait_for_spider_results(TEST_SCAN_ID, TimeBudget::new(60_000))
        .await
        .unwrap();

    let messages = h.messages.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.message_type == MessageType::Info));
    assert_eq!(
        messages[1].text,
        "Detect url to scan: https://www.example.com/login"
    );
}

#[tokio::test]
async fn test_ajax_spider_waits_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).ajax_spider(true).build().unwrap());
    h.engine.script_ajax_statuses(&["running", "running"]);

    let budget = h
        .orchestrator
        .run_ajax_spider(None, TimeBudget::new(100_000))
        .await
        .unwrap();

    assert_eq!(h.engine.count("start_ajax_spider"), 1);
    assert_eq!(h.engine.count("ajax_spider_status"), 3);
    assert_eq!(h.engine.count("stop_ajax_spider"), 1);
    assert_eq!(budget.remaining(), 98_000);
}

#[tokio::test]
async fn test_passive_scan_waits_for_empty_backlog_without_stopping() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.engine.script_passive_counts(&[12, 3]);

    h.orchestrator
        .passive_scan(TimeBudget::new(60_000))
        .await
        .unwrap();

    assert_eq!(h.engine.count("passive_backlog_count"), 3);
    assert_eq!(h.clock.sleeps(), 2);
    assert_eq!(h.engine.call_names(), vec!["passive_backlog_count"; 3]);
}

// ── Cancellation inside wait loops ──

#[tokio::test]
async fn test_cancelled_ajax_spider_is_stopped_once() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).ajax_spider(true).build().unwrap());
    h.engine.script_ajax_statuses(&["running"; 10]);
    h.engine.cancel_on("ajax_spider_status", h.cancel.clone());

    let err = h
        .orchestrator
        .run_ajax_spider(None, TimeBudget::new(100_000))
        .await
        .unwrap_err();

    assert!(matches!(err, ZapWrapperError::ScanCancelled { .. }));
    assert_eq!(h.engine.count("ajax_spider_status"), 1);
    assert_eq!(h.engine.count("stop_ajax_spider"), 1);
}

#[tokio::test]
async fn test_cancelled_spider_is_stopped_once() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.cancel.cancel();

    let err = h
        .orchestrator
        .wait_for_spider_results(TEST_SCAN_ID, TimeBudget::new(60_000))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::ScanJobCancelled);
    assert_eq!(h.engine.count("spider_status"), 0);
    assert_eq!(h.engine.count("stop_spider"), 1);
    assert_eq!(h.engine.count("all_spider_urls"), 0);
}

#[tokio::test]
async fn test_cancelled_passive_scan_has_nothing_to_stop() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.engine.script_passive_counts(&[50; 10]);
    h.engine.cancel_on("passive_backlog_count", h.cancel.clone());

    let err = h
        .orchestrator
        .passive_scan(TimeBudget::new(60_000))
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(h.engine.call_names(), vec!["passive_backlog_count"]);
}

#[tokio::test]
async fn test_cancelled_active_scan_is_stopped_once() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).active_scan(true).build().unwrap());
    h.engine.script_active_statuses(&[5; 10]);
    h.engine.cancel_on("active_scan_status", h.cancel.clone());

    let err = h
        .orchestrator
        .run_active_scan(TEST_CONTEXT_ID, None, TimeBudget::new(60_000))
        .await
        .unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(h.engine.count("stop_active_scan"), 1);
    assert_eq!(h.engine.args_of("stop_active_scan")[0], vec![TEST_SCAN_ID.to_string()]);
}

#[tokio::test]
async fn test_stop_failure_does_not_hide_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());
    h.engine.fail_on("stop_spider");
    h.cancel.cancel();

    let err = h
        .orchestrator
        .wait_for_spider_results(TEST_SCAN_ID, TimeBudget::new(60_000))
        .await
        .unwrap_err();

    assert!(matches!(err, ZapWrapperError::ScanCancelled { .. }));
}

// ── Active scan ──

#[tokio::test]
async fn test_active_scan_skipped_without_detected_urls() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).active_scan(true).build().unwrap());
    h.engine.set_no_url_detected();

    let budget = h
        .orchestrator
        .run_active_scan(TEST_CONTEXT_ID, None, TimeBudget::new(60_000))
        .await
        .unwrap();

    assert_eq!(budget.remaining(), 60_000);
    assert_eq!(h.engine.count("start_active_scan"), 0);
    let messages = h.messages.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, MessageType::Warning);
    assert!(messages[0].text.contains("no URLs were detected"));
}

#[tokio::test]
async fn test_scans_run_as_the_scan_user() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        context_builder(dir.path())
            .ajax_spider(true)
            .active_scan(true)
            .build()
            .unwrap(),
    );
    let user = scan_user();
    let budget = TimeBudget::new(60_000);

    let budget = h.orchestrator.run_ajax_spider(Some(&user), budget).await.unwrap();
    let budget = h
        .orchestrator
        .run_spider(TEST_CONTEXT_ID, Some(&user), budget)
        .await
        .unwrap();
    h.orchestrator
        .run_active_scan(TEST_CONTEXT_ID, Some(&user), budget)
        .await
        .unwrap();

    assert_eq!(
        h.engine.args_of("start_ajax_spider")[0],
        vec!["https://www.example.com/", "user0"]
    );
    assert_eq!(
        h.engine.args_of("start_spider")[0],
        vec!["https://www.example.com/", "7"]
    );
    assert_eq!(
        h.engine.args_of("start_active_scan")[0],
        vec!["https://www.example.com/", "7"]
    );
}

// ── Report ──

#[tokio::test]
async fn test_report_is_renamed_to_configured_file() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(context_builder(dir.path()).build().unwrap());

    h.orchestrator.generate_zap_report().await.unwrap();

    let report = h.engine.args_of("generate_report");
    assert_eq!(report[0][0], "test-context");
    assert_eq!(report[0][1], "sarif-json");
    assert_eq!(report[0][2], "result.txt");
    assert!(dir.path().join("result.txt").exists());
    assert!(!dir.path().join("result.txt.json").exists());
}

#[tokio::test]
async fn test_report_into_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        zap_wrapper::context::ScanContext::builder(common::target(), dir.path())
            .context_name("test-context")
            .build()
            .unwrap(),
    );

    let err = h.orchestrator.generate_zap_report().await.unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::PdsConfigurationError);
    assert_eq!(h.engine.count("generate_report"), 0);
}

// ── Full scan ──

#[tokio::test]
async fn test_full_scan_runs_phases_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        context_builder(dir.path())
            .ajax_spider(true)
            .active_scan(true)
            .build()
            .unwrap(),
    );

    h.orchestrator.scan().await.unwrap();

    assert_eq!(
        h.engine.call_names(),
        vec![
            "create_session",
            "set_max_alerts_per_rule",
            "enable_all_passive_rules",
            "enable_all_active_rules_for_policy",
            "set_ajax_spider_browser",
            "set_spider_max_depth",
            "set_ajax_spider_max_depth",
            "set_proxy_enabled",
            "create_context",
            "add_replacer_rule",
            "add_exclude_url_pattern",
            "add_include_url_pattern",
            "visit_url",
            "add_include_url_pattern",
            "visit_url",
            "start_ajax_spider",
            "ajax_spider_status",
            "stop_ajax_spider",
            "start_spider",
            "spider_status",
            "stop_spider",
            "all_spider_urls",
            "passive_backlog_count",
            "at_least_one_url_detected",
            "start_active_scan",
            "active_scan_status",
            "stop_active_scan",
            "generate_report",
            "remove_replacer_rule",
        ]
    );
    assert!(dir.path().join("result.txt").exists());
}

#[tokio::test]
async fn test_full_scan_without_optional_phases() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(context_builder(dir.path()).build().unwrap());

    h.orchestrator.scan().await.unwrap();

    assert_eq!(h.engine.count("start_ajax_spider"), 0);
    assert_eq!(h.engine.count("at_least_one_url_detected"), 0);
    assert_eq!(h.engine.count("start_active_scan"), 0);
    assert_eq!(h.engine.count("start_spider"), 1);
    assert_eq!(h.engine.count("generate_report"), 1);
}

#[tokio::test]
async fn test_authenticated_full_scan_uses_created_user() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        context_builder(dir.path())
            .web_scan(basic_login_scan())
            .active_scan(true)
            .build()
            .unwrap(),
    );

    h.orchestrator.scan().await.unwrap();

    assert_eq!(h.engine.count("create_user"), 1);
    assert_eq!(h.engine.args_of("start_spider")[0][1], "7");
    assert_eq!(h.engine.args_of("start_active_scan")[0][1], "7");
}

#[tokio::test]
async fn test_cancelled_scan_still_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let web_scan = WebScanConfiguration {
        headers: vec![HttpHeaderConfiguration::new("Authorization", "Bearer token")],
        ..WebScanConfiguration::default()
    };
    let mut h = harness(context_builder(dir.path()).web_scan(web_scan).build().unwrap());
    h.engine.script_spider_statuses(&[0; 10]);
    h.engine.cancel_on("start_spider", h.cancel.clone());

    let err = h.orchestrator.scan().await.unwrap_err();

    assert!(matches!(err, ZapWrapperError::ScanCancelled { .. }));
    assert_eq!(err.exit_code().code(), 6);
    assert_eq!(h.engine.count("stop_spider"), 1);
    assert_eq!(h.engine.count("passive_backlog_count"), 0);
    assert_eq!(h.engine.count("generate_report"), 0);
    // header rule plus the DAST job header
    assert_eq!(h.engine.count("remove_replacer_rule"), 2);
}

#[tokio::test]
async fn test_failed_scan_is_wrapped_and_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let web_scan = WebScanConfiguration {
        headers: vec![
            HttpHeaderConfiguration::new("Authorization", "Bearer token"),
            HttpHeaderConfiguration::new("X-Tenant", "tenant-1"),
        ],
        ..WebScanConfiguration::default()
    };
    let mut h = harness(context_builder(dir.path()).web_scan(web_scan).build().unwrap());
    h.engine.fail_on("passive_backlog_count");

    let err = h.orchestrator.scan().await.unwrap_err();

    match &err {
        ZapWrapperError::ScanFailed { context_name, source } => {
            assert_eq!(context_name, "test-context");
            assert!(matches!(**source, ZapWrapperError::ZapApiError { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), ExitCode::ProductExecutionError);
    assert_eq!(h.engine.count("remove_replacer_rule"), 3);
    assert!(h.orchestrator.created_replacer_rules().is_empty());
}

#[tokio::test]
async fn test_full_scan_removes_dast_header_rule() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(context_builder(dir.path()).build().unwrap());

    h.orchestrator.scan().await.unwrap();

    assert_eq!(
        h.engine.args_of("add_replacer_rule")[0],
        vec![
            "x-sechub-dast",
            "x-sechub-dast",
            "SecHub DAST job: test-context",
            "-"
        ]
    );
    assert_eq!(
        h.engine.args_of("remove_replacer_rule"),
        vec![vec!["x-sechub-dast".to_string()]]
    );
    assert!(h.orchestrator.created_replacer_rules().is_empty());
}

#[tokio::test]
async fn test_unreachable_include_does_not_fail_scan() {
    let dir = tempfile::tempdir().unwrap();
    let web_scan = WebScanConfiguration {
        excludes: vec!["/admin".to_string()],
        ..WebScanConfiguration::default()
    };
    let mut h = harness(context_builder(dir.path()).web_scan(web_scan).build().unwrap());
    h.engine.fail_on("visit_url");

    h.orchestrator.scan().await.unwrap();

    assert_eq!(h.engine.count("add_include_url_pattern"), 2);
    assert_eq!(h.engine.count("visit_url"), 2);
    // default logout exclude plus the configured one
    assert_eq!(h.engine.count("add_exclude_url_pattern"), 2);
    assert_eq!(h.engine.count("start_spider"), 1);
    assert_eq!(h.engine.count("generate_report"), 1);
}

#[tokio::test]
async fn test_clean_up_failure_does_not_fail_successful_scan() {
    let dir = tempfile::tempdir().unwrap();
    let web_scan = WebScanConfiguration {
        headers: vec![
            HttpHeaderConfiguration::new("Authorization", "Bearer token"),
            HttpHeaderConfiguration::new("X-Tenant", "tenant-1"),
        ],
        ..WebScanConfiguration::default()
    };
    let mut h = harness(context_builder(dir.path()).web_scan(web_scan).build().unwrap());
    h.engine.fail_on("remove_replacer_rule");

    h.orchestrator.scan().await.unwrap();

    // every removal is attempted although each one fails
    assert_eq!(
        h.engine.args_of("remove_replacer_rule"),
        vec![
            vec!["x-sechub-dast".to_string()],
            vec!["Authorization".to_string()],
            vec!["X-Tenant".to_string()],
        ]
    );
    assert!(h.orchestrator.created_replacer_rules().is_empty());
    assert_eq!(h.engine.count("generate_report"), 1);
}

#[tokio::test]
async fn test_clean_up_failure_does_not_hide_scan_error() {
    let dir = tempfile::tempdir().unwrap();
    let web_scan = WebScanConfiguration {
        headers: vec![HttpHeaderConfiguration::new("Authorization", "Bearer token")],
        ..WebScanConfiguration::default()
    };
    let mut h = harness(context_builder(dir.path()).web_scan(web_scan).build().unwrap());
    h.engine.fail_on("passive_backlog_count");
    h.engine.fail_on("remove_replacer_rule");

    let err = h.orchestrator.scan().await.unwrap_err();

    match &err {
        ZapWrapperError::ScanFailed { source, .. } => match source.as_ref() {
            ZapWrapperError::ZapApiError { endpoint, .. } => {
                assert_eq!(endpoint, "passive_backlog_count");
            }
            other => panic!("unexpected source: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.engine.count("remove_replacer_rule"), 2);
}
