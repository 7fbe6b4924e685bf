//! Scan scope: include/exclude URL patterns and API definitions

use crate::engine::ZapEngine;
use crate::error::Result;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

/// Wildcard accepted in configured URL patterns
pub const WILDCARD: &str = "<*>";

/// Regex the wildcard is translated to
pub const REGEX_WILDCARD: &str = ".*";

/// Logout and sign-off URLs, excluded so the crawler never ends its own session
pub const DEFAULT_EXCLUDE: &str =
    r"(?i).*(log[\s_+-]*out|log[\s_+-]*off|sign[\s_+-]*out|sign[\s_+-]*off|abmelden|ausloggen).*";

/// Converts configured wildcards into the regex syntax of the engine
pub fn wildcard_to_regex(pattern: &str) -> String {
    pattern.replace(WILDCARD, REGEX_WILDCARD)
}

/// Resolves configured patterns against the target.
///
/// Absolute URLs are kept, everything else is treated as a path below the
/// target. Duplicates are dropped, first occurrence wins.
pub fn resolve_url_patterns(target: &Url, patterns: &[String]) -> Vec<String> {
    let base = target.as_str().trim_end_matches('/');
    let mut resolved = Vec::new();
    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        let url = if pattern.starts_with("http://") || pattern.starts_with("https://") {
            pattern.to_string()
        } else {
            format!("{base}/{}", pattern.trim_start_matches('/'))
        };
        push_unique(&mut resolved, wildcard_to_regex(&url));
    }
    resolved
}

/// URL patterns the engine context includes.
///
/// Without configured includes the whole target is in scope. The target itself
/// is always part of the set as the entry point of the crawl.
pub fn build_include_set(target: &Url, includes: &[String]) -> Vec<String> {
    let mut set = resolve_url_patterns(target, includes);
    if set.is_empty() {
        set.push(format!("{}{REGEX_WILDCARD}", target.as_str()));
    }
    push_unique(&mut set, target.as_str().to_string());
    set
}

pub fn build_exclude_set(target: &Url, excludes: &[String]) -> Vec<String> {
    resolve_url_patterns(target, excludes)
}

fn push_unique(set: &mut Vec<String>, value: String) {
    if !set.contains(&value) {
        set.push(value);
    }
}

/// Pushes the scan scope into the engine context
pub struct UrlScopeManager<'a> {
    engine: &'a dyn ZapEngine,
    context_name: &'a str,
}

impl<'a> UrlScopeManager<'a> {
    pub fn new(engine: &'a dyn ZapEngine, context_name: &'a str) -> Self {
        Self {
            engine,
            context_name,
        }
    }

    /// Adds every include (plus one visit each) and every exclude to the context
    pub async fn add_included_and_excluded_urls(
        &self,
        includes: &[String],
        excludes: &[String],
    ) -> Result<()> {
        info!(
            "For scan {}: Adding {} include and {} exclude patterns to the context",
            self.context_name,
            includes.len(),
            excludes.len()
        );
        for include in includes {
            self.engine
                .add_include_url_pattern(self.context_name, include)
                .await?;
            // the engine only crawls what it has seen in its history
            if let Err(e) = self.engine.visit_url(include, false).await {
                warn!(
                    "For scan {}: Could not access URL {include} via ZAP: {e}",
                    self.context_name
                );
            }
        }
        for exclude in excludes {
            self.engine
                .add_exclude_url_pattern(self.context_name, exclude)
                .await?;
        }
        Ok(())
    }

    pub async fn add_default_excludes(&self) -> Result<()> {
        self.engine
            .add_exclude_url_pattern(self.context_name, DEFAULT_EXCLUDE)
            .await
    }

    /// Imports the API definition URL and each API definition file, scoped
    /// to the context and the target
    pub async fn load_api_definitions(
        &self,
        context_id: u32,
        target: &Url,
        definition_url: Option<&str>,
        files: &[PathBuf],
    ) -> Result<()> {
        if definition_url.is_none() && files.is_empty() {
            debug!("For scan {}: No API definitions configured", self.context_name);
            return Ok(());
        }
        if let Some(url) = definition_url {
            info!(
                "For scan {}: Loading API definition from {url}",
                self.context_name
            );
            self.engine
                .import_api_definition_url(url, target.as_str(), context_id)
                .await?;
        }
        for file in files {
            info!(
                "For scan {}: Loading API definition {}",
                self.context_name,
                file.display()
            );
            self.engine
                .import_api_definition_file(file, target.as_str(), context_id)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://www.example.com").expect("url")
    }

    #[test]
    fn test_wildcards_become_regex() {
        assert_eq!(
            wildcard_to_regex("https://example.com/<*>/admin/<*>"),
            "https://example.com/.*/admin/.*"
        );
    }

    #[test]
    fn test_include_set_without_includes_covers_target() {
        let set = build_include_set(&target(), &[]);
        assert_eq!(
            set,
            vec![
                "https://www.example.com/.*".to_string(),
                "https://www.example.com/".to_string()
            ]
        );
    }

    #[test]
    fn test_include_set_resolves_relative_patterns() {
        let includes = vec![
            "/app/<*>".to_string(),
            "app/<*>".to_string(),
            "https://other.example.com/x".to_string(),
        ];
        let set = build_include_set(&target(), &includes);
        assert_eq!(
            set,
            vec![
                "https://www.example.com/app/.*".to_string(),
                "https://other.example.com/x".to_string(),
                "https://www.example.com/".to_string(),
            ]
        );
    }

    #[test]
    fn test_exclude_set_may_be_empty() {
        assert!(build_exclude_set(&target(), &[]).is_empty());
        assert_eq!(
            build_exclude_set(&target(), &["/logout".to_string()]),
            vec!["https://www.example.com/logout".to_string()]
        );
    }
}
