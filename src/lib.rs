//! ZAP Wrapper - DAST scan orchestration for OWASP ZAP
//!
//! Drives a remote ZAP instance through a complete scan lifecycle: session
//! and rule setup, authentication, crawling, passive and active scanning and
//! SARIF report generation. Scans are bounded by a time budget, react to
//! external cancellation and remove the configuration they injected.

pub mod budget;
pub mod cancel;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod messages;
pub mod models;
pub mod rules;
pub mod scan;
