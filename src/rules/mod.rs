//! Rule engine
//!
//! Rules see one fully resolved file at a time through a [`FileModel`] and
//! report [`Issue`]s through a [`RuleContext`]. Every file gets fresh rule
//! instances from the [`RuleRegistry`], so no rule state survives from one
//! file to the next.

pub mod builtin;
pub mod engine;
pub mod query;
pub mod registry;

pub use engine::run_rules;
pub use registry::{ConfigDiagnostic, RuleFactory, RuleRegistry};

use crate::phases::resolution_phase::Resolution;
use crate::span::Span;
use crate::symbols::{DeclId, Declaration, NameKey, SymbolIndex, UnitId, UnitSymbols};
use crate::syntax::ast::{Expr, ExprKind, NodeId, RoutineDecl, SourceFile, Stmt, TypeDecl, TypeExpr};
use crate::types::{TypeArena, TypeId};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A finding reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub rule_key: String,
    pub file: PathBuf,
    /// `None` for file-scoped issues with no single anchoring line.
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
    pub message: String,
}

impl Ord for Issue {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.file, self.start_line, &self.rule_key, &self.message, self.end_line).cmp(&(
            &other.file,
            other.start_line,
            &other.rule_key,
            &other.message,
            other.end_line,
        ))
    }
}

impl PartialOrd for Issue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Everything rules may consult about one analyzed file.
#[derive(Debug, Clone, Copy)]
pub struct FileModel<'a> {
    pub path: &'a Path,
    pub unit: UnitId,
    pub file: &'a SourceFile,
    pub index: &'a SymbolIndex,
    pub resolution: &'a Resolution,
}

impl<'a> FileModel<'a> {
    pub fn symbols(&self) -> &'a UnitSymbols {
        self.index.unit(self.unit)
    }

    pub fn arena(&self) -> &'a TypeArena {
        &self.resolution.arena
    }

    pub fn decl(&self, id: DeclId) -> &'a Declaration {
        self.index.decl(id)
    }

    /// Declaration a reference node is bound to.
    pub fn decl_of(&self, node: NodeId) -> Option<&'a Declaration> {
        self.resolution.decl(node).map(|id| self.index.decl(id))
    }

    /// Declaration introduced by a type declaration or routine node.
    pub fn node_decl(&self, node: NodeId) -> Option<&'a Declaration> {
        self.symbols()
            .node_decls
            .get(&node)
            .map(|id| self.index.decl(*id))
    }

    /// Resolved type of a node, `None` when missing or `Unknown`.
    pub fn known_type(&self, node: NodeId) -> Option<TypeId> {
        self.resolution
            .type_of(node)
            .filter(|ty| !self.arena().is_unknown(*ty))
    }

    /// Resolved type of a declaration, `None` when missing or `Unknown`.
    pub fn known_decl_type(&self, decl: DeclId) -> Option<TypeId> {
        self.resolution
            .decl_type(decl)
            .filter(|ty| !self.arena().is_unknown(*ty))
    }

    pub fn qualified_name(&self, decl: DeclId) -> String {
        self.index.qualified_name(decl)
    }

    /// Whether `node` is bound to the routine `name` of `System` or
    /// `System.SysUtils`.
    pub fn is_rtl_routine(&self, node: NodeId, name: &str) -> bool {
        self.decl_of(node).is_some_and(|decl| {
            decl.is_routine()
                && decl.key == NameKey::new(name)
                && self.index.unit(decl.id.unit).key.as_str().starts_with("system")
        })
    }

    /// Whether an expression calls (or implicitly calls) the routine `name`
    /// of the runtime library, returning the arguments.
    pub fn rtl_call<'e>(&self, expr: &'e Expr, name: &str) -> Option<&'e [Expr]> {
        match &expr.kind {
            ExprKind::Call { callee, args } if self.is_rtl_routine(callee.id, name) => Some(args),
            _ if self.is_rtl_routine(expr.id, name) => Some(&[]),
            _ => None,
        }
    }
}

/// Per-invocation handle through which a rule reports issues.
pub struct RuleContext<'m> {
    pub model: &'m FileModel<'m>,
    key: &'m str,
    issues: &'m mut Vec<Issue>,
}

impl<'m> RuleContext<'m> {
    pub fn new(model: &'m FileModel<'m>, key: &'m str, issues: &'m mut Vec<Issue>) -> Self {
        Self { model, key, issues }
    }

    pub fn rule_key(&self) -> &str {
        self.key
    }

    /// Report an issue spanning the lines of `span`.
    pub fn report(&mut self, span: Span, message: impl Into<String>) {
        self.push(Some(span.line), Some(span.end_line.max(span.line)), message.into());
    }

    /// Report an issue on a single line.
    pub fn report_line(&mut self, line: u32, message: impl Into<String>) {
        self.push(Some(line), Some(line), message.into());
    }

    /// Report an issue about the file as a whole.
    pub fn report_file(&mut self, message: impl Into<String>) {
        self.push(None, None, message.into());
    }

    fn push(&mut self, start_line: Option<u32>, end_line: Option<u32>, message: String) {
        self.issues.push(Issue {
            rule_key: self.key.to_string(),
            file: self.model.path.to_path_buf(),
            start_line,
            end_line,
            message,
        });
    }
}

/// A native rule. Hooks fire in source order during a single walk of the
/// file; nested routines get their own `visit_routine`/`leave_routine`
/// pair inside the enclosing one.
pub trait Rule {
    fn start_file(&mut self, _ctx: &mut RuleContext) {}

    fn visit_type_decl(&mut self, _ctx: &mut RuleContext, _decl: &TypeDecl) {}

    fn visit_type_expr(&mut self, _ctx: &mut RuleContext, _ty: &TypeExpr) {}

    fn visit_routine(&mut self, _ctx: &mut RuleContext, _routine: &RoutineDecl) {}

    fn leave_routine(&mut self, _ctx: &mut RuleContext, _routine: &RoutineDecl) {}

    fn visit_stmt(&mut self, _ctx: &mut RuleContext, _stmt: &Stmt) {}

    fn visit_expr(&mut self, _ctx: &mut RuleContext, _expr: &Expr) {}

    fn end_file(&mut self, _ctx: &mut RuleContext) {}
}

/// Case-insensitive comparison of two dotted name paths.
pub(crate) fn same_name_path(a: &Expr, b: &Expr) -> bool {
    match (a.unparenthesized().name_path(), b.unparenthesized().name_path()) {
        (Some(a), Some(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .zip(&b)
                    .all(|(x, y)| NameKey::new(&x.name) == NameKey::new(&y.name))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(file: &str, line: Option<u32>, key: &str) -> Issue {
        Issue {
            rule_key: key.to_string(),
            file: PathBuf::from(file),
            start_line: line,
            end_line: line,
            message: "m".to_string(),
        }
    }

    #[test]
    fn test_issue_ordering() {
        let mut issues = vec![
            issue("b.pas", Some(1), "A"),
            issue("a.pas", Some(9), "A"),
            issue("a.pas", Some(2), "Z"),
            issue("a.pas", Some(2), "B"),
            issue("a.pas", None, "C"),
        ];
        issues.sort();
        let order: Vec<(String, Option<u32>, String)> = issues
            .iter()
            .map(|i| (i.file.display().to_string(), i.start_line, i.rule_key.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a.pas".to_string(), None, "C".to_string()),
                ("a.pas".to_string(), Some(2), "B".to_string()),
                ("a.pas".to_string(), Some(2), "Z".to_string()),
                ("a.pas".to_string(), Some(9), "A".to_string()),
                ("b.pas".to_string(), Some(1), "A".to_string()),
            ]
        );
    }
}
