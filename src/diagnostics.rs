use crate::span::Span;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// Diagnostic code for categorization and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DiagnosticCode {
    /// Numeric code (e.g., 1001, 2004)
    pub code: u16,
    /// Category prefix (e.g., "E" for error, "W" for warning)
    pub prefix: char,
}

impl DiagnosticCode {
    pub const fn new(prefix: char, code: u16) -> Self {
        Self { code, prefix }
    }

    /// Format as string (e.g., "E1001", "W2004")
    pub fn as_str(&self) -> String {
        format!("{}{:04}", self.prefix, self.code)
    }
}

/// Related information for a diagnostic (additional context from other locations)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRelatedInformation {
    pub span: Span,
    pub message: String,
}

/// A diagnostic message with location, severity, and optional metadata.
///
/// Diagnostics describe problems with the input (syntax, unresolvable
/// structure) and are kept apart from rule issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub span: Span,
    pub message: String,
    pub code: Option<DiagnosticCode>,
    pub related_information: Vec<DiagnosticRelatedInformation>,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            span,
            message: message.into(),
            code: None,
            related_information: Vec::new(),
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            span,
            message: message.into(),
            code: None,
            related_information: Vec::new(),
        }
    }

    pub fn info(span: Span, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            span,
            message: message.into(),
            code: None,
            related_information: Vec::new(),
        }
    }

    /// Create an error with a diagnostic code
    pub fn error_with_code(span: Span, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::error(span, message).with_code(code)
    }

    /// Add related information to this diagnostic
    pub fn with_related(mut self, span: Span, message: impl Into<String>) -> Self {
        self.related_information.push(DiagnosticRelatedInformation {
            span,
            message: message.into(),
        });
        self
    }

    /// Set the diagnostic code
    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }
}

/// A diagnostic attributed to an input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiagnostic {
    pub file: PathBuf,
    pub diagnostic: Diagnostic,
}

/// Trait for handling diagnostics
/// This allows for dependency injection and testing with mock handlers
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn error(&self, span: Span, message: &str) {
        self.report(Diagnostic::error(span, message.to_string()));
    }

    fn warning(&self, span: Span, message: &str) {
        self.report(Diagnostic::warning(span, message.to_string()));
    }

    fn info(&self, span: Span, message: &str) {
        self.report(Diagnostic::info(span, message.to_string()));
    }

    fn has_errors(&self) -> bool;
    fn error_count(&self) -> usize;
    fn warning_count(&self) -> usize;
    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

/// Error codes for analyzer diagnostics
///
/// Error codes are organized by component:
/// - E1000-E1999: Lexer and directive errors
/// - E2000-E2999: Parser errors
/// - E3000-E3999: Declaration and resolution errors
/// - E4000-E4999: Analysis aborts
/// - W3000-W3999: Semantic warnings
pub mod error_codes {
    use super::DiagnosticCode;

    /// Unterminated string literal
    pub const UNTERMINATED_STRING: DiagnosticCode = DiagnosticCode::new('E', 1001);

    /// Unterminated comment
    pub const UNTERMINATED_COMMENT: DiagnosticCode = DiagnosticCode::new('E', 1002);

    /// Unexpected character
    pub const UNEXPECTED_CHAR: DiagnosticCode = DiagnosticCode::new('E', 1004);

    /// Unbalanced or unterminated conditional directive
    pub const UNBALANCED_DIRECTIVE: DiagnosticCode = DiagnosticCode::new('E', 1010);

    /// `$IF` expression that could not be evaluated
    pub const INVALID_DIRECTIVE_EXPRESSION: DiagnosticCode = DiagnosticCode::new('E', 1011);

    /// Expected a specific token but found something else
    pub const EXPECTED_TOKEN: DiagnosticCode = DiagnosticCode::new('E', 2001);

    /// Unexpected token encountered
    pub const UNEXPECTED_TOKEN: DiagnosticCode = DiagnosticCode::new('E', 2002);

    /// Expected an identifier
    pub const EXPECTED_IDENTIFIER: DiagnosticCode = DiagnosticCode::new('E', 2003);

    /// Expected an expression
    pub const EXPECTED_EXPRESSION: DiagnosticCode = DiagnosticCode::new('E', 2004);

    /// Expected a type
    pub const EXPECTED_TYPE: DiagnosticCode = DiagnosticCode::new('E', 2005);

    /// Unexpected end of file
    pub const UNEXPECTED_EOF: DiagnosticCode = DiagnosticCode::new('E', 2006);

    /// Parser gave up on the file after too many errors
    pub const TOO_MANY_ERRORS: DiagnosticCode = DiagnosticCode::new('E', 2099);

    /// Duplicate declaration without forward/full relationship
    pub const DUPLICATE_DECLARATION: DiagnosticCode = DiagnosticCode::new('E', 3003);

    /// Routine implementation with no matching declaration
    pub const UNMATCHED_IMPLEMENTATION: DiagnosticCode = DiagnosticCode::new('E', 3004);

    /// Circular unit reference through interface uses clauses
    pub const CIRCULAR_UNIT_REFERENCE: DiagnosticCode = DiagnosticCode::new('E', 3011);

    /// Per-file analysis cancelled, timed out or crashed
    pub const ANALYSIS_ABORTED: DiagnosticCode = DiagnosticCode::new('E', 4001);

    /// Unit named in a uses clause is not part of the project
    pub const UNRESOLVED_UNIT: DiagnosticCode = DiagnosticCode::new('W', 3001);

    /// File header disagrees with the target kind the caller supplied
    pub const TARGET_KIND_MISMATCH: DiagnosticCode = DiagnosticCode::new('W', 3002);
}

/// Collecting diagnostic handler
/// Collects all diagnostics without printing
pub struct CollectingDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drain the collected diagnostics.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.guard())
    }
}

impl Default for CollectingDiagnosticHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.guard().push(diagnostic);
    }

    fn has_errors(&self) -> bool {
        self.guard()
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error)
    }

    fn error_count(&self) -> usize {
        self.guard()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    fn warning_count(&self) -> usize {
        self.guard()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.guard().clone()
    }
}
