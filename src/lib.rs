pub mod analyzer;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod errors;
pub mod module_resolver;
pub mod phases;
pub mod rules;
pub mod span;
pub mod state;
pub mod stdlib;
pub mod symbols;
pub mod syntax;
pub mod types;

pub use analyzer::{AnalysisOutput, Analyzer, CancellationToken, SourceInput, TargetKind};
pub use config::{AnalyzerConfig, AnalyzerOptions, RuleProperties, RuleSettings};
pub use crate::core::type_compat::TypeCompatibility;
pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticLevel, FileDiagnostic};
pub use errors::{AnalysisError, ConfigError, DirectiveError, LexerError, ParserError, QueryError};
pub use module_resolver::UnitMap;
pub use rules::query::Query;
pub use rules::{ConfigDiagnostic, Issue, RuleRegistry};
pub use span::Span;
pub use state::AnalysisStats;
