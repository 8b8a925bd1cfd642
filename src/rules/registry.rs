use super::builtin;
use super::Rule;
use crate::config::{RuleProperties, RuleSettings};
use crate::errors::ConfigError;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Builds a fresh rule instance for each analyzed file.
pub type RuleFactory = Arc<dyn Fn() -> Box<dyn Rule> + Send + Sync>;

/// A rule that could not be configured and will not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDiagnostic {
    pub rule_key: String,
    pub message: String,
}

#[derive(Clone)]
struct CompiledRule {
    key: String,
    exclusions: Option<Regex>,
    factory: RuleFactory,
}

/// Validated set of active rules.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<CompiledRule>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rules.iter().map(|r| &r.key)).finish()
    }
}

impl RuleRegistry {
    /// Compile every active rule. A rule whose properties fail to validate
    /// is left out and reported; the others still run.
    pub fn compile(rules: &IndexMap<String, RuleSettings>) -> (Self, Vec<ConfigDiagnostic>) {
        let mut registry = RuleRegistry::default();
        let mut diagnostics = Vec::new();

        for (key, settings) in rules.iter().filter(|(_, s)| s.active) {
            match Self::compile_rule(key, settings) {
                Ok(rule) => registry.rules.push(rule),
                Err(error) => {
                    warn!(rule = %key, %error, "rule disabled by configuration error");
                    diagnostics.push(ConfigDiagnostic {
                        rule_key: key.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }
        (registry, diagnostics)
    }

    fn compile_rule(key: &str, settings: &RuleSettings) -> Result<CompiledRule, ConfigError> {
        let definition = match &settings.template {
            Some(template) => builtin::definition(template)
                .filter(|d| d.is_template)
                .ok_or_else(|| ConfigError::UnknownTemplate(template.clone()))?,
            None => builtin::definition(key).ok_or_else(|| ConfigError::UnknownRule(key.to_string()))?,
        };
        let properties = RuleProperties::new(&settings.properties);
        let exclusions = properties.glob("exclusions")?;
        let factory = (definition.build)(&properties)?;
        Ok(CompiledRule {
            key: key.to_string(),
            exclusions,
            factory,
        })
    }

    /// Fresh instances of the rules that apply to `path`.
    pub fn instantiate(&self, path: &Path) -> Vec<(String, Box<dyn Rule>)> {
        let normalized = path.to_string_lossy().replace('\\', "/");
        self.rules
            .iter()
            .filter(|rule| {
                rule.exclusions
                    .as_ref()
                    .map_or(true, |glob| !glob.is_match(&normalized))
            })
            .map(|rule| (rule.key.clone(), (rule.factory)()))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(entries: Vec<(&str, RuleSettings)>) -> IndexMap<String, RuleSettings> {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_invalid_property_disables_only_that_rule() {
        let config = rules(vec![
            ("ClassName", RuleSettings::new().property("pattern", "([")),
            ("ClassPerFile", RuleSettings::new()),
            ("NoSuchRule", RuleSettings::new()),
        ]);
        let (registry, diagnostics) = RuleRegistry::compile(&config);
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["ClassPerFile"]);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].rule_key, "ClassName");
        assert!(diagnostics[0].message.contains("regular expression"));
        assert_eq!(diagnostics[1].message, "Unknown rule 'NoSuchRule'");
    }

    #[test]
    fn test_inactive_rules_are_skipped() {
        let mut settings = RuleSettings::new();
        settings.active = false;
        let (registry, diagnostics) = RuleRegistry::compile(&rules(vec![("EmptyUnit", settings)]));
        assert!(registry.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_templates_and_exclusions() {
        let config = rules(vec![
            (
                "NoWith",
                RuleSettings::new()
                    .template("XPathTemplate")
                    .property("xpath", "//With")
                    .property("message", "Avoid with")
                    .property("exclusions", "**/legacy/**"),
            ),
            ("Broken", RuleSettings::new().template("ClassPerFile")),
        ]);
        let (registry, diagnostics) = RuleRegistry::compile(&config);
        assert_eq!(registry.len(), 1);
        assert_eq!(diagnostics[0].message, "Unknown rule template 'ClassPerFile'");
        assert_eq!(registry.instantiate(Path::new("src/Main.pas")).len(), 1);
        assert!(registry.instantiate(Path::new("src\\legacy\\Old.pas")).is_empty());
    }

    #[test]
    fn test_invalid_glob_is_a_config_diagnostic() {
        let config = rules(vec![("EmptyUnit", RuleSettings::new().property("exclusions", "src/[x"))]);
        let (registry, diagnostics) = RuleRegistry::compile(&config);
        assert!(registry.is_empty());
        assert!(diagnostics[0].message.starts_with("Invalid glob in 'exclusions'"));
    }
}
