//! The analysis pipeline.
//!
//! A run has two parallel phases separated by a barrier:
//! 1. every file is parsed and its declarations collected, one task per
//!    file;
//! 2. the collected units are published as one read-only
//!    [`SymbolIndex`], then every file is resolved and checked by the
//!    active rules, again one task per file.
//!
//! A file whose task is cancelled, runs past the per-file time limit or
//! panics is reported with an `E4001` diagnostic and contributes nothing
//! further. Other files are not affected; units depending on it see an
//! empty unit and resolve its names to `Unknown`.

use crate::config::AnalyzerConfig;
use crate::diagnostics::{
    error_codes, CollectingDiagnosticHandler, Diagnostic, DiagnosticHandler, FileDiagnostic,
};
use crate::errors::AnalysisError;
use crate::module_resolver::{DependencyGraph, UnitError, UnitMap, UnitNames};
use crate::phases::declaration_phase::collect_unit;
use crate::phases::resolution_phase::resolve_unit;
use crate::rules::{run_rules, ConfigDiagnostic, FileModel, Issue, RuleRegistry};
use crate::span::Span;
use crate::state::{AnalysisMetrics, AnalysisStats};
use crate::stdlib::BUILTIN_UNITS;
use crate::symbols::{SymbolIndex, UnitId, UnitSymbols};
use crate::syntax::ast::{FileKind, SectionKind, SourceFile};
use crate::syntax::directives::DirectiveOptions;
use crate::syntax::parser::parse_source;
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What kind of file the caller believes an input is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetKind {
    Unit,
    Program,
    Library,
    Package,
}

impl From<TargetKind> for FileKind {
    fn from(target: TargetKind) -> Self {
        match target {
            TargetKind::Unit => FileKind::Unit,
            TargetKind::Program => FileKind::Program,
            TargetKind::Library => FileKind::Library,
            TargetKind::Package => FileKind::Package,
        }
    }
}

/// One file to analyze.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub path: PathBuf,
    /// Name other units use to import this one. When empty the file stem
    /// is used.
    pub unit_name: String,
    pub text: String,
    pub target: TargetKind,
}

impl SourceInput {
    pub fn new(
        path: impl Into<PathBuf>,
        unit_name: impl Into<String>,
        text: impl Into<String>,
        target: TargetKind,
    ) -> Self {
        Self {
            path: path.into(),
            unit_name: unit_name.into(),
            text: text.into(),
            target,
        }
    }

    pub fn unit(path: impl Into<PathBuf>, unit_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(path, unit_name, text, TargetKind::Unit)
    }

    fn name(&self) -> String {
        if !self.unit_name.trim().is_empty() {
            return self.unit_name.trim().to_string();
        }
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Run-level cancellation flag, cheap to clone and share with the host.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Everything one run produces. Issues, input diagnostics and
/// configuration diagnostics are kept apart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    /// Sorted by file, start line, rule key and message; no duplicates.
    pub issues: Vec<Issue>,
    pub diagnostics: Vec<FileDiagnostic>,
    pub config_diagnostics: Vec<ConfigDiagnostic>,
    pub stats: AnalysisStats,
}

/// Per-file time accounting, checked between pipeline steps.
#[derive(Debug, Clone, Copy)]
struct FileClock<'t> {
    started: Instant,
    spent: Duration,
    limit: Option<Duration>,
    token: &'t CancellationToken,
}

impl<'t> FileClock<'t> {
    fn start(limit: Option<Duration>, spent: Duration, token: &'t CancellationToken) -> Self {
        Self {
            started: Instant::now(),
            spent,
            limit,
            token,
        }
    }

    fn elapsed(&self) -> Duration {
        self.spent + self.started.elapsed()
    }

    fn check(&self) -> Result<(), AnalysisError> {
        if self.token.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        match self.limit {
            Some(limit) if self.elapsed() >= limit => Err(AnalysisError::TimedOut(limit.as_millis() as u64)),
            _ => Ok(()),
        }
    }
}

/// A file or builtin unit entering the pipeline.
struct Source<'a> {
    id: UnitId,
    name: String,
    path: PathBuf,
    text: &'a str,
    /// `None` for builtin units.
    target: Option<TargetKind>,
}

/// Result of the first phase for one unit.
struct Declared {
    file: Option<SourceFile>,
    symbols: Arc<UnitSymbols>,
    diagnostics: Vec<Diagnostic>,
    spent: Duration,
}

/// Configured analysis pipeline. Reusable across runs.
pub struct Analyzer {
    config: AnalyzerConfig,
    registry: RuleRegistry,
    config_diagnostics: Vec<ConfigDiagnostic>,
    directives: DirectiveOptions,
    cancellation: CancellationToken,
}

impl Analyzer {
    /// Compile the configured rules. Rules that fail to configure are
    /// reported in every run's `config_diagnostics` and do not run.
    pub fn new(config: AnalyzerConfig) -> Self {
        let (registry, config_diagnostics) = RuleRegistry::compile(&config.rules);
        debug!(rules = registry.len(), rejected = config_diagnostics.len(), "rules compiled");
        let directives = config.options.directive_options();
        Self {
            config,
            registry,
            config_diagnostics,
            directives,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn analyze(&self, inputs: Vec<SourceInput>, units: &UnitMap) -> AnalysisOutput {
        let started = Instant::now();
        let metrics = AnalysisMetrics::new();
        let options = &self.config.options;
        let limit = options.file_timeout_ms.map(Duration::from_millis);

        let mut sources: Vec<Source> = Vec::with_capacity(BUILTIN_UNITS.len() + inputs.len());
        for builtin in BUILTIN_UNITS {
            sources.push(Source {
                id: UnitId(sources.len() as u32),
                name: builtin.name.to_string(),
                path: PathBuf::from(builtin.path),
                text: builtin.source,
                target: None,
            });
        }
        for input in &inputs {
            sources.push(Source {
                id: UnitId(sources.len() as u32),
                name: input.name(),
                path: input.path.clone(),
                text: &input.text,
                target: Some(input.target),
            });
        }

        let mut names = UnitNames::new(&options.unit_scope_names, units);
        for source in &sources {
            names.register(source.id, &source.name, &source.path);
        }

        // Phase 1: parse and collect declarations.
        let declared: Vec<Declared> = self.map_files(sources.iter().collect(), |source| {
            self.declare(source, &names, limit, &metrics)
        });
        info!(files = inputs.len(), elapsed_ms = started.elapsed().as_millis() as u64, "declarations collected");

        // Barrier: publish the cross-unit index.
        let index = SymbolIndex::new(declared.iter().map(|d| Arc::clone(&d.symbols)).collect());
        let cycle_diagnostics = circular_references(&index, &sources);
        info!(units = sources.len(), cycles = cycle_diagnostics.len(), "symbol index published");

        // Phase 2: resolve and run rules.
        let tasks: Vec<(&Source, &Declared)> = sources
            .iter()
            .zip(&declared)
            .filter(|(source, declared)| source.target.is_some() && declared.file.is_some())
            .collect();
        let checked: Vec<(UnitId, Result<Vec<Issue>, AnalysisError>)> = self.map_files(tasks, |(source, declared)| {
            (source.id, self.check(source, declared, &index, limit, &metrics))
        });
        info!(files = checked.len(), elapsed_ms = started.elapsed().as_millis() as u64, "files checked");

        let mut issues = Vec::new();
        let mut late_diagnostics: Vec<(UnitId, Diagnostic)> = Vec::new();
        for (id, outcome) in checked {
            match outcome {
                Ok(found) => issues.extend(found),
                Err(error) => late_diagnostics.push((id, aborted(&error))),
            }
        }
        metrics.record_issues(issues.len());
        issues.sort();
        issues.dedup();

        let mut diagnostics = Vec::new();
        for (source, declared) in sources.iter().zip(declared) {
            if source.target.is_none() {
                if !declared.diagnostics.is_empty() {
                    debug!(unit = %source.name, count = declared.diagnostics.len(), "builtin unit diagnostics");
                }
                continue;
            }
            let own = declared
                .diagnostics
                .into_iter()
                .chain(late_diagnostics.iter().filter(|(id, _)| *id == source.id).map(|(_, d)| d.clone()))
                .chain(cycle_diagnostics.iter().filter(|(id, _)| *id == source.id).map(|(_, d)| d.clone()));
            diagnostics.extend(own.map(|diagnostic| FileDiagnostic {
                file: source.path.clone(),
                diagnostic,
            }));
        }

        let stats = metrics.summary();
        info!(
            files = stats.files,
            aborted = stats.files_aborted,
            issues = issues.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );
        AnalysisOutput {
            issues,
            diagnostics,
            config_diagnostics: self.config_diagnostics.clone(),
            stats,
        }
    }

    fn map_files<T, R, F>(&self, items: Vec<T>, task: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        if self.config.options.parallel {
            items.into_par_iter().map(task).collect()
        } else {
            items.into_iter().map(task).collect()
        }
    }

    fn declare(&self, source: &Source, names: &UnitNames, limit: Option<Duration>, metrics: &AnalysisMetrics) -> Declared {
        let handler = CollectingDiagnosticHandler::new();
        let clock = FileClock::start(limit, Duration::ZERO, &self.cancellation);
        let outcome = guarded(|| {
            clock.check()?;
            let parsed = parse_source(source.text, &self.directives, &handler);
            if let Some(target) = source.target {
                let expected = FileKind::from(target);
                if parsed.file.kind != expected {
                    handler.report(
                        Diagnostic::warning(
                            parsed.file.name.span,
                            format!(
                                "File declares a {:?} but is analyzed as a {:?}",
                                parsed.file.kind, expected
                            ),
                        )
                        .with_code(error_codes::TARGET_KIND_MISMATCH),
                    );
                }
            }
            clock.check()?;
            let symbols = collect_unit(source.id, &source.name, &source.path, &parsed.file, names, &handler);
            Ok((parsed.file, symbols))
        });

        let is_input = source.target.is_some();
        if is_input {
            metrics.record_file(handler.error_count());
        }
        let mut diagnostics = handler.take();
        match outcome {
            Ok((file, symbols)) => {
                debug!(path = %source.path.display(), diagnostics = diagnostics.len(), "file declared");
                Declared {
                    file: Some(file),
                    symbols: Arc::new(symbols),
                    diagnostics,
                    spent: clock.elapsed(),
                }
            }
            Err(error) => {
                warn!(path = %source.path.display(), %error, "file analysis aborted");
                if is_input {
                    metrics.record_abort();
                }
                diagnostics.push(aborted(&error));
                let kind = source.target.map_or(FileKind::Unit, FileKind::from);
                Declared {
                    file: None,
                    symbols: Arc::new(UnitSymbols::placeholder(source.id, &source.name, source.path.clone(), kind)),
                    diagnostics,
                    spent: clock.elapsed(),
                }
            }
        }
    }

    fn check(
        &self,
        source: &Source,
        declared: &Declared,
        index: &SymbolIndex,
        limit: Option<Duration>,
        metrics: &AnalysisMetrics,
    ) -> Result<Vec<Issue>, AnalysisError> {
        let Some(file) = &declared.file else {
            return Ok(Vec::new());
        };
        let clock = FileClock::start(limit, declared.spent, &self.cancellation);
        let outcome = guarded(|| {
            clock.check()?;
            let resolution = resolve_unit(index, source.id, file);
            metrics.record_resolution(resolution.bound_count(), resolution.unknown_count());
            clock.check()?;
            let model = FileModel {
                path: &source.path,
                unit: source.id,
                file,
                index,
                resolution: &resolution,
            };
            Ok(run_rules(&self.registry, &model))
        });
        match &outcome {
            Ok(issues) => debug!(path = %source.path.display(), issues = issues.len(), "file checked"),
            Err(error) => {
                warn!(path = %source.path.display(), %error, "file analysis aborted");
                metrics.record_abort();
            }
        }
        outcome
    }
}

/// Run one file step, turning a panic into an error for that file.
fn guarded<T>(step: impl FnOnce() -> Result<T, AnalysisError>) -> Result<T, AnalysisError> {
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => Err(AnalysisError::Internal(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn aborted(error: &AnalysisError) -> Diagnostic {
    Diagnostic::error_with_code(Span::default(), error_codes::ANALYSIS_ABORTED, error.to_string())
}

/// One diagnostic per cycle of interface `uses`, reported in the file of
/// the cycle's first unit at the entry that starts it.
fn circular_references(index: &SymbolIndex, sources: &[Source]) -> Vec<(UnitId, Diagnostic)> {
    let mut graph = DependencyGraph::new();
    for source in sources {
        let deps = index
            .unit(source.id)
            .uses_in(SectionKind::Interface)
            .filter_map(|entry| entry.unit)
            .collect();
        graph.add_unit(source.id, deps);
    }

    let mut diagnostics = Vec::new();
    for cycle in graph.cycles() {
        let (Some(&first), Some(&second)) = (cycle.first(), cycle.get(1)) else {
            continue;
        };
        let unit = index.unit(first);
        let span = unit
            .uses_in(SectionKind::Interface)
            .find(|entry| entry.unit == Some(second))
            .map_or(Span::default(), |entry| entry.span);
        let error = UnitError::CircularReference {
            cycle: cycle.iter().map(|id| index.unit(*id).name.clone()).collect(),
        };
        debug!(%error, "interface uses cycle");
        diagnostics.push((
            first,
            Diagnostic::error_with_code(span, error_codes::CIRCULAR_UNIT_REFERENCE, error.to_string()),
        ));
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSettings;

    const EMPTY: &str = "unit Empty; interface implementation end.";

    const A: &str = "unit A;\n\
        interface\n\
        uses B;\n\
        implementation\n\
        end.";

    const B: &str = "unit B;\n\
        interface\n\
        uses A;\n\
        implementation\n\
        end.";

    fn analyzer(rules: &[&str]) -> Analyzer {
        let mut config = AnalyzerConfig::default();
        for rule in rules {
            config.rules.insert(rule.to_string(), RuleSettings::new());
        }
        Analyzer::new(config)
    }

    fn codes(output: &AnalysisOutput) -> Vec<String> {
        output
            .diagnostics
            .iter()
            .filter_map(|d| d.diagnostic.code.map(|c| c.as_str()))
            .collect()
    }

    #[test]
    fn test_issues_and_stats() {
        let inputs = vec![
            SourceInput::unit("src/Empty.pas", "Empty", EMPTY),
            SourceInput::unit("src/Other.pas", "", "unit Other; interface const X = 1; implementation end."),
        ];
        let output = analyzer(&["EmptyUnit"]).analyze(inputs, &UnitMap::new());
        assert_eq!(output.issues.len(), 1);
        assert_eq!(output.issues[0].file, PathBuf::from("src/Empty.pas"));
        assert_eq!(output.issues[0].start_line, None);
        assert_eq!(output.stats.files, 2);
        assert_eq!(output.stats.files_aborted, 0);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    }

    #[test]
    fn test_circular_interface_uses() {
        let inputs = vec![SourceInput::unit("A.pas", "A", A), SourceInput::unit("B.pas", "B", B)];
        let output = analyzer(&[]).analyze(inputs, &UnitMap::new());
        assert_eq!(codes(&output), vec!["E3011"]);
        assert_eq!(output.diagnostics[0].file, PathBuf::from("A.pas"));
        assert_eq!(output.diagnostics[0].diagnostic.message, "Circular unit reference: A -> B -> A");
        assert_eq!(output.diagnostics[0].diagnostic.span.line, 3);
    }

    #[test]
    fn test_cancelled_run_aborts_every_file() {
        let token = CancellationToken::new();
        token.cancel();
        let analyzer = analyzer(&["EmptyUnit"]).with_cancellation(token.clone());
        let output = analyzer.analyze(vec![SourceInput::unit("Empty.pas", "Empty", EMPTY)], &UnitMap::new());
        assert!(output.issues.is_empty());
        assert_eq!(codes(&output), vec!["E4001"]);
        assert_eq!(output.diagnostics[0].diagnostic.message, "Analysis cancelled");
        assert_eq!(output.stats.files_aborted, 1);
        assert!(analyzer.cancellation().is_cancelled());
    }

    #[test]
    fn test_zero_timeout_aborts_files() {
        let mut config = AnalyzerConfig::default();
        config.options.file_timeout_ms = Some(0);
        config.rules.insert("EmptyUnit".to_string(), RuleSettings::new());
        let output = Analyzer::new(config).analyze(vec![SourceInput::unit("Empty.pas", "Empty", EMPTY)], &UnitMap::new());
        assert!(output.issues.is_empty());
        assert_eq!(codes(&output), vec!["E4001"]);
        assert!(output.diagnostics[0].diagnostic.message.contains("time limit of 0 ms"));
    }

    #[test]
    fn test_target_kind_mismatch() {
        let input = SourceInput::new("Main.dpr", "Main", EMPTY, TargetKind::Program);
        let output = analyzer(&[]).analyze(vec![input], &UnitMap::new());
        assert_eq!(codes(&output), vec!["W3002"]);
    }

    #[test]
    fn test_config_diagnostics_are_returned() {
        let output = analyzer(&["NoSuchRule"]).analyze(Vec::new(), &UnitMap::new());
        assert_eq!(output.config_diagnostics.len(), 1);
        assert_eq!(output.stats, AnalysisStats::default());
    }

    #[test]
    fn test_sequential_and_parallel_runs_agree() {
        let inputs = vec![
            SourceInput::unit("A.pas", "A", A),
            SourceInput::unit("B.pas", "B", B),
            SourceInput::unit("Empty.pas", "Empty", EMPTY),
        ];
        let parallel = analyzer(&["EmptyUnit", "UnusedImport"]).analyze(inputs.clone(), &UnitMap::new());
        let mut config = AnalyzerConfig::default();
        config.options.parallel = false;
        for rule in ["EmptyUnit", "UnusedImport"] {
            config.rules.insert(rule.to_string(), RuleSettings::new());
        }
        let sequential = Analyzer::new(config).analyze(inputs, &UnitMap::new());
        assert_eq!(parallel.issues, sequential.issues);
        assert_eq!(parallel.diagnostics, sequential.diagnostics);
    }

    #[test]
    fn test_panic_messages() {
        let outcome: Result<(), AnalysisError> = guarded(|| panic!("boom"));
        assert_eq!(outcome, Err(AnalysisError::Internal("boom".to_string())));
        let outcome: Result<(), AnalysisError> = guarded(|| panic!("{} {}", "formatted", 1));
        assert_eq!(outcome, Err(AnalysisError::Internal("formatted 1".to_string())));
    }
}
