use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters shared by the per-file tasks of one analysis run.
#[derive(Debug, Default)]
pub struct AnalysisMetrics {
    pub files: AtomicUsize,
    pub files_aborted: AtomicUsize,
    pub references_bound: AtomicUsize,
    pub references_unknown: AtomicUsize,
    pub syntax_errors: AtomicUsize,
    pub issues: AtomicUsize,
}

impl AnalysisMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.files.store(0, Ordering::SeqCst);
        self.files_aborted.store(0, Ordering::SeqCst);
        self.references_bound.store(0, Ordering::SeqCst);
        self.references_unknown.store(0, Ordering::SeqCst);
        self.syntax_errors.store(0, Ordering::SeqCst);
        self.issues.store(0, Ordering::SeqCst);
    }

    pub fn record_file(&self, syntax_errors: usize) {
        self.files.fetch_add(1, Ordering::SeqCst);
        self.syntax_errors.fetch_add(syntax_errors, Ordering::SeqCst);
    }

    pub fn record_abort(&self) {
        self.files_aborted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_resolution(&self, bound: usize, unknown: usize) {
        self.references_bound.fetch_add(bound, Ordering::SeqCst);
        self.references_unknown.fetch_add(unknown, Ordering::SeqCst);
    }

    pub fn record_issues(&self, count: usize) {
        self.issues.fetch_add(count, Ordering::SeqCst);
    }

    pub fn summary(&self) -> AnalysisStats {
        AnalysisStats {
            files: self.files.load(Ordering::SeqCst),
            files_aborted: self.files_aborted.load(Ordering::SeqCst),
            references_bound: self.references_bound.load(Ordering::SeqCst),
            references_unknown: self.references_unknown.load(Ordering::SeqCst),
            syntax_errors: self.syntax_errors.load(Ordering::SeqCst),
            issues: self.issues.load(Ordering::SeqCst),
        }
    }
}

/// Totals of one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    /// Input files parsed, builtins excluded.
    pub files: usize,
    pub files_aborted: usize,
    pub references_bound: usize,
    /// References whose target or type stayed `Unknown`.
    pub references_unknown: usize,
    /// Error diagnostics raised while parsing and collecting.
    pub syntax_errors: usize,
    /// Issues reported before deduplication.
    pub issues: usize,
}

impl AnalysisStats {
    /// Share of references that resolved, 1.0 when there were none.
    pub fn resolution_rate(&self) -> f64 {
        let total = self.references_bound + self.references_unknown;
        if total == 0 {
            return 1.0;
        }
        self.references_bound as f64 / total as f64
    }

    pub fn format(&self) -> String {
        format!(
            r#"=== Analysis Statistics ===
Files: {} ({} aborted)
Syntax Errors: {}
References: {} bound, {} unknown (resolution rate: {:.1}%)
Issues: {}"#,
            self.files,
            self.files_aborted,
            self.syntax_errors,
            self.references_bound,
            self.references_unknown,
            self.resolution_rate() * 100.0,
            self.issues
        )
    }
}
