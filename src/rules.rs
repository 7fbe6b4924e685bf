//! ZAP rule catalog and rule deactivation references

use crate::error::{Result, ZapWrapperError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Whether a rule belongs to the passive or the active scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[serde(alias = "Passive", alias = "PASSIVE")]
    Passive,
    #[serde(alias = "Active", alias = "ACTIVE")]
    Active,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Passive => write!(f, "passive"),
            RuleType::Active => write!(f, "active"),
        }
    }
}

/// One rule installed in the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Engine scanner id, e.g. `10096`
    pub id: String,
    /// Human readable reference, e.g. `Timestamp-Disclosure-10096`
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    #[serde(default)]
    pub link: Option<String>,
}

/// Catalog of all passive and active rules known to the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZapFullRuleset {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl ZapFullRuleset {
    /// Loads a ruleset from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ZapWrapperError::ConfigError(format!(
                "Full ruleset file {} could not be read: {e}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Finds a rule by its reference or, as a fallback, by its engine id
    pub fn find_rule_by_reference(&self, reference: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|r| r.reference == reference)
            .or_else(|| self.rules.iter().find(|r| r.id == reference))
    }

    pub fn passive_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.rule_type == RuleType::Passive)
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.rule_type == RuleType::Active)
    }
}

/// Identifies one rule to deactivate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleReference {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub info: Option<String>,
}

impl RuleReference {
    pub fn new(reference: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            info: Some(info.into()),
        }
    }
}

/// The rules a project wants turned off during the scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivatedRuleReferences {
    #[serde(default)]
    pub deactivated_rule_references: Vec<RuleReference>,
}

impl DeactivatedRuleReferences {
    /// Loads deactivated references from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ZapWrapperError::ConfigError(format!(
                "Rule deactivation file {} could not be read: {e}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Builds references from a comma separated list (CLI or environment)
    pub fn from_comma_separated(list: &str) -> Self {
        let deactivated_rule_references = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| RuleReference {
                reference: s.to_string(),
                info: None,
            })
            .collect();
        Self {
            deactivated_rule_references,
        }
    }

    pub fn add(&mut self, reference: RuleReference) {
        self.deactivated_rule_references.push(reference);
    }

    pub fn is_empty(&self) -> bool {
        self.deactivated_rule_references.is_empty()
    }
}

/// Result of classifying a rule reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleClassification {
    Passive { id: String },
    Active { id: String },
    Unknown,
}

/// Classifies rule references against a full ruleset snapshot
pub struct RuleSetPolicy<'a> {
    ruleset: &'a ZapFullRuleset,
}

impl<'a> RuleSetPolicy<'a> {
    pub fn new(ruleset: &'a ZapFullRuleset) -> Self {
        Self { ruleset }
    }

    pub fn classify(&self, reference: &RuleReference) -> RuleClassification {
        match self.ruleset.find_rule_by_reference(&reference.reference) {
            Some(rule) => match rule.rule_type {
                RuleType::Passive => RuleClassification::Passive {
                    id: rule.id.clone(),
                },
                RuleType::Active => RuleClassification::Active {
                    id: rule.id.clone(),
                },
            },
            None => RuleClassification::Unknown,
        }
    }
}
