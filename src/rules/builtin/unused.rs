use crate::rules::{Rule, RuleContext};
use crate::symbols::{DeclId, DeclKind, ScopeId, ScopeKind, SymbolIndex};
use crate::syntax::ast::{Expr, ExprKind, FileKind, ForTarget, NodeId, RoutineDecl, SectionKind, Stmt, StmtKind};
use rustc_hash::FxHashSet;

/// Local variables that are written but never read.
#[derive(Debug, Default)]
pub struct UnusedLocalVariable {
    /// Name nodes that are plain assignment or loop targets.
    writes: FxHashSet<NodeId>,
    reads: FxHashSet<DeclId>,
}

/// Whether `scope` is the body scope or an inline-declaration block nested
/// in it.
fn within_body(index: &SymbolIndex, mut scope: ScopeId, body: ScopeId) -> bool {
    loop {
        if scope == body {
            return true;
        }
        let current = index.scope(scope);
        match (current.kind, current.parent) {
            (ScopeKind::Block, Some(parent)) => scope = parent,
            _ => return false,
        }
    }
}

fn plain_name(expr: &Expr) -> Option<NodeId> {
    let expr = expr.unparenthesized();
    matches!(expr.kind, ExprKind::Name(_)).then_some(expr.id)
}

impl Rule for UnusedLocalVariable {
    fn visit_stmt(&mut self, _ctx: &mut RuleContext, stmt: &Stmt) {
        let target = match &stmt.kind {
            StmtKind::Assign { target, .. } => target,
            StmtKind::For {
                target: ForTarget::Existing(target),
                ..
            }
            | StmtKind::ForIn {
                target: ForTarget::Existing(target),
                ..
            } => target,
            _ => return,
        };
        if let Some(node) = plain_name(target) {
            self.writes.insert(node);
        }
    }

    fn visit_expr(&mut self, ctx: &mut RuleContext, expr: &Expr) {
        if matches!(expr.kind, ExprKind::Name(_)) && !self.writes.contains(&expr.id) {
            if let Some(decl) = ctx.model.resolution.decl(expr.id) {
                self.reads.insert(decl);
            }
        }
    }

    fn leave_routine(&mut self, ctx: &mut RuleContext, routine: &RoutineDecl) {
        let model = ctx.model;
        let Some(body) = model.symbols().node_scopes.get(&routine.id).copied() else {
            return;
        };
        let unread: Vec<_> = model
            .symbols()
            .decls
            .iter()
            .filter(|d| d.kind == DeclKind::Variable && d.implicit.is_none())
            .filter(|d| within_body(model.index, d.scope, body))
            .filter(|d| !self.reads.contains(&d.id))
            .collect();
        for decl in unread {
            ctx.report(decl.span, format!("Local variable '{}' is never read", decl.name));
        }
    }
}

/// `uses` entries none of whose declarations are referenced.
#[derive(Debug, Default)]
pub struct UnusedImport;

impl Rule for UnusedImport {
    fn end_file(&mut self, ctx: &mut RuleContext) {
        let model = ctx.model;
        // Project files list their units to build them.
        if model.file.kind != FileKind::Unit {
            return;
        }
        for entry in &model.symbols().uses {
            let Some(unit) = entry.unit else {
                continue;
            };
            if !model.resolution.import_usage(unit).is_used() {
                ctx.report(entry.span, format!("Unit '{}' is imported but never used", entry.name));
            }
        }
    }
}

/// Interface-section imports only referenced from the implementation.
#[derive(Debug, Default)]
pub struct ImportSpecificity;

impl Rule for ImportSpecificity {
    fn end_file(&mut self, ctx: &mut RuleContext) {
        let model = ctx.model;
        for entry in model.symbols().uses_in(SectionKind::Interface) {
            let Some(unit) = entry.unit else {
                continue;
            };
            let usage = model.resolution.import_usage(unit);
            if usage.implementation && !usage.interface {
                ctx.report(
                    entry.span,
                    format!(
                        "Unit '{}' is only used by the implementation, move it to the implementation uses clause",
                        entry.name
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check, check_with, lines};
    use crate::config::RuleSettings;

    #[test]
    fn test_written_but_never_read() {
        let source = "unit A; interface implementation\n\
            procedure Consume(V: Integer); begin end;\n\
            procedure Run;\n\
            var\n\
              Written: Integer;\n\
              Passed: Integer;\n\
              Looped: Integer;\n\
              Never: Integer;\n\
            begin\n\
              Written := 1;\n\
              Passed := 2;\n\
              Consume(Passed);\n\
              for Looped := 0 to 3 do ;\n\
            end;\n\
            end.";
        let issues = check("UnusedLocalVariable", source);
        assert_eq!(lines(&issues), vec![Some(5), Some(7), Some(8)]);
        assert_eq!(issues[0].message, "Local variable 'Written' is never read");
    }

    #[test]
    fn test_reads_from_nested_routines_and_inline_vars() {
        let source = "unit A; interface implementation\n\
            function Run: Integer;\n\
            var Captured: Integer;\n\
              procedure Inner;\n\
              begin\n\
                Result := Captured;\n\
              end;\n\
            begin\n\
              Captured := 1;\n\
              var Temp := 2;\n\
              var Spare: Integer;\n\
              Spare := 3;\n\
              Result := Temp;\n\
            end;\n\
            end.";
        let issues = check("UnusedLocalVariable", source);
        assert_eq!(lines(&issues), vec![Some(11)]);
    }

    const LIBRARY: &str = "unit Lib; interface\n\
        type TThing = class end;\n\
        procedure Helper;\n\
        implementation\n\
        procedure Helper; begin end;\n\
        end.";

    const OTHER: &str = "unit Other; interface\n\
        const Answer = 42;\n\
        implementation end.";

    #[test]
    fn test_unused_import() {
        let source = "unit A;\n\
            interface\n\
            uses Lib, Other, Missing;\n\
            implementation\n\
            procedure Run; begin Helper; end;\n\
            end.";
        let issues = check_with("UnusedImport", RuleSettings::new(), &[source, LIBRARY, OTHER]);
        assert_eq!(lines(&issues), vec![Some(3)]);
        assert_eq!(issues[0].message, "Unit 'Other' is imported but never used");
    }

    #[test]
    fn test_import_specificity() {
        let source = "unit A;\n\
            interface\n\
            uses Lib, Other;\n\
            var Value: TThing;\n\
            implementation\n\
            procedure Run; begin Helper; Writeln(Answer); end;\n\
            end.";
        let issues = check_with("ImportSpecificity", RuleSettings::new(), &[source, LIBRARY, OTHER]);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.starts_with("Unit 'Other'"));
        assert!(check("ImportSpecificity", "unit A; interface implementation end.").is_empty());
    }
}
