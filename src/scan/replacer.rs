//! Transient header replacer rules
//!
//! Replacer rules survive engine restarts, so every rule created for a scan
//! is tracked and removed again during clean up.

use super::scope::wildcard_to_regex;
use crate::engine::{ReplacerRule, ZapEngine};
use crate::error::{Result, ZapWrapperError};
use crate::messages::{MessageWriter, UserMessage};
use crate::models::HttpHeaderConfiguration;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Header sent with every request of a scan so targets can recognise DAST traffic
pub const X_SECHUB_DAST_HEADER_NAME: &str = "x-sechub-dast";

#[derive(Debug, Default)]
pub struct ReplacerRuleManager {
    created: Vec<String>,
}

impl ReplacerRuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles of rules currently present in the engine
    pub fn created_rules(&self) -> &[String] {
        &self.created
    }

    /// Adds the DAST job header. The rule is tracked like every header rule.
    pub async fn add_dast_header(
        &mut self,
        engine: &dyn ZapEngine,
        context_name: &str,
    ) -> Result<()> {
        info!("For scan {context_name}: Adding {X_SECHUB_DAST_HEADER_NAME} header");
        let rule = ReplacerRule::request_header(
            X_SECHUB_DAST_HEADER_NAME,
            X_SECHUB_DAST_HEADER_NAME,
            format!("SecHub DAST job: {context_name}"),
            None,
        );
        let handle = engine.add_replacer_rule(&rule).await?;
        self.created.push(handle);
        Ok(())
    }

    /// Creates one rule per header, or one per header and URL restriction
    pub async fn add_rules_for_headers(
        &mut self,
        engine: &dyn ZapEngine,
        context_name: &str,
        headers: &[HttpHeaderConfiguration],
        header_value_files: &HashMap<String, PathBuf>,
        messages: &dyn MessageWriter,
    ) -> Result<()> {
        if headers.is_empty() {
            info!("For scan {context_name}: No headers configured");
            return Ok(());
        }
        info!("For scan {context_name}: Applying header configuration");

        for header in headers {
            let value = header_value(header, header_value_files, messages)?;

            if header.only_for_urls.is_empty() {
                let rule =
                    ReplacerRule::request_header(header.name.clone(), &header.name, &value, None);
                let handle = engine.add_replacer_rule(&rule).await?;
                self.created.push(handle);
                continue;
            }

            for (index, only_for_url) in header.only_for_urls.iter().enumerate() {
                let rule = ReplacerRule::request_header(
                    format!("{}-{index}", header.name),
                    &header.name,
                    &value,
                    Some(wildcard_to_regex(only_for_url)),
                );
                let handle = engine.add_replacer_rule(&rule).await?;
                self.created.push(handle);
            }
        }
        Ok(())
    }

    /// Removes every tracked rule once. Failures are logged and skipped.
    ///
    /// Returns the number of rules that could not be removed.
    pub async fn remove_all(&mut self, engine: &dyn ZapEngine, context_name: &str) -> usize {
        if self.created.is_empty() {
            return 0;
        }
        info!(
            "For scan {context_name}: Removing {} replacer rules",
            self.created.len()
        );
        let mut failures = 0;
        for handle in self.created.drain(..) {
            if let Err(e) = engine.remove_replacer_rule(&handle).await {
                error!("For scan {context_name}: Replacer rule {handle} could not be removed: {e}");
                failures += 1;
            }
        }
        failures
    }
}

fn header_value(
    header: &HttpHeaderConfiguration,
    header_value_files: &HashMap<String, PathBuf>,
    messages: &dyn MessageWriter,
) -> Result<String> {
    if let Some(value) = &header.value {
        return Ok(value.clone());
    }
    let Some(file) = header_value_files.get(&header.name) else {
        return Err(ZapWrapperError::UnsupportedConfiguration(format!(
            "Header '{}' has neither a value nor a value file",
            header.name
        )));
    };
    match std::fs::read_to_string(file) {
        Ok(content) => Ok(content.trim_end_matches(['\r', '\n']).to_string()),
        Err(e) => {
            let text = format!("Could not read header value from file: {}", file.display());
            if let Err(write_err) = messages.write(UserMessage::error(&text)) {
                warn!("User message could not be written: {write_err}");
            }
            Err(ZapWrapperError::IoError(std::io::Error::new(
                e.kind(),
                format!("{text}: {e}"),
            )))
        }
    }
}
