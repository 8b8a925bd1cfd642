//! Test utilities for multi-unit integration tests
//!
//! Provides a harness that collects in-memory Delphi sources, configures
//! rules and runs them through the public `Analyzer` API.
#![allow(dead_code)]

use delphi_lint::{
    AnalysisOutput, Analyzer, AnalyzerConfig, AnalyzerOptions, Issue, RuleSettings, SourceInput,
    TargetKind, UnitMap,
};

/// Test harness for analyzing several units together
///
/// Units are registered in the project unit map under `src/<name>.pas` so
/// `uses` clauses between them resolve like they would in a real project.
#[derive(Default)]
pub struct ProjectHarness {
    config: AnalyzerConfig,
    inputs: Vec<SourceInput>,
    units: UnitMap,
}

impl ProjectHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a rule with default properties
    pub fn enable(&mut self, key: &str) -> &mut Self {
        self.configure(key, RuleSettings::new())
    }

    /// Activate a rule with explicit settings
    pub fn configure(&mut self, key: &str, settings: RuleSettings) -> &mut Self {
        self.config.rules.insert(key.to_string(), settings);
        self
    }

    pub fn options(&mut self, update: impl FnOnce(&mut AnalyzerOptions)) -> &mut Self {
        update(&mut self.config.options);
        self
    }

    /// Add a unit to the project
    ///
    /// # Arguments
    /// * `name` - Unit name (e.g., "Shapes", "App.Main")
    /// * `source` - Delphi source code
    pub fn add_unit(&mut self, name: &str, source: &str) -> &mut Self {
        let path = format!("src/{}.pas", name);
        self.units.insert(name, path.as_str());
        self.inputs.push(SourceInput::unit(path, name, source));
        self
    }

    /// Add a program file; programs are not importable.
    pub fn add_program(&mut self, name: &str, source: &str) -> &mut Self {
        let path = format!("src/{}.dpr", name);
        self.inputs
            .push(SourceInput::new(path, name, source, TargetKind::Program));
        self
    }

    pub fn analyze(&self) -> AnalysisOutput {
        Analyzer::new(self.config.clone()).analyze(self.inputs.clone(), &self.units)
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.analyze().issues
    }

    /// Get the number of inputs added
    pub fn unit_count(&self) -> usize {
        self.inputs.len()
    }
}

/// Start lines of `issues`, in report order.
pub fn lines(issues: &[Issue]) -> Vec<Option<u32>> {
    issues.iter().map(|issue| issue.start_line).collect()
}

/// Issues of one rule.
pub fn of_rule<'a>(issues: &'a [Issue], key: &str) -> Vec<&'a Issue> {
    issues.iter().filter(|issue| issue.rule_key == key).collect()
}
