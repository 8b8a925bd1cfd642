use crate::rules::{same_name_path, FileModel, Rule, RuleContext};
use crate::syntax::ast::{BinaryOp, Expr, ExprKind, Stmt, StmtKind};
use crate::types::TypeKind;

/// `if Assigned(X) then X.Free;` and its `X <> nil` / `FreeAndNil(X)`
/// variants. `Free` already checks for nil.
#[derive(Debug, Default)]
pub struct AssignedAndFree;

impl Rule for AssignedAndFree {
    fn visit_stmt(&mut self, ctx: &mut RuleContext, stmt: &Stmt) {
        let StmtKind::If {
            cond,
            then_branch: Some(then_branch),
            else_branch: None,
        } = &stmt.kind
        else {
            return;
        };
        let Some(guarded) = nil_guard(ctx.model, cond) else {
            return;
        };
        let Some(free) = single_statement(then_branch) else {
            return;
        };
        if let StmtKind::Expr(expr) = &free.kind {
            if freed_object(expr).is_some_and(|freed| same_name_path(freed, guarded)) {
                ctx.report(
                    free.span,
                    "Remove the redundant nil check, Free already handles nil references",
                );
            }
        }
    }
}

/// `X` of `Assigned(X)`, `X <> nil` or `nil <> X`.
fn nil_guard<'e>(model: &FileModel, cond: &'e Expr) -> Option<&'e Expr> {
    let cond = cond.unparenthesized();
    if let Some([arg]) = model.rtl_call(cond, "Assigned") {
        return Some(arg);
    }
    match &cond.kind {
        ExprKind::Binary {
            op: BinaryOp::NotEq,
            lhs,
            rhs,
        } => match (&lhs.unparenthesized().kind, &rhs.unparenthesized().kind) {
            (_, ExprKind::Nil) => Some(lhs.as_ref()),
            (ExprKind::Nil, _) => Some(rhs.as_ref()),
            _ => None,
        },
        _ => None,
    }
}

/// The statement itself, or the only statement of a `begin ... end`.
fn single_statement(stmt: &Stmt) -> Option<&Stmt> {
    match &stmt.kind {
        StmtKind::Compound(block) if block.stmts.len() == 1 => single_statement(&block.stmts[0]),
        StmtKind::Compound(_) => None,
        _ => Some(stmt),
    }
}

/// `X` of `X.Free`, `X.Free()` or `FreeAndNil(X)`.
fn freed_object(expr: &Expr) -> Option<&Expr> {
    match &expr.kind {
        ExprKind::Member { object, member } if member.name.eq_ignore_ascii_case("Free") => {
            Some(object.as_ref())
        }
        ExprKind::Call { callee, args } if args.is_empty() => freed_object(callee),
        ExprKind::Call { callee, args } if args.len() == 1 => {
            let path = callee.name_path()?;
            path.last()
                .filter(|name| name.name.eq_ignore_ascii_case("FreeAndNil"))
                .map(|_| &args[0])
        }
        _ => None,
    }
}

/// `FreeAndNil` applied to something that is known not to be an object.
#[derive(Debug, Default)]
pub struct FreeAndNilTObject;

impl Rule for FreeAndNilTObject {
    fn visit_expr(&mut self, ctx: &mut RuleContext, expr: &Expr) {
        let model = ctx.model;
        let Some([arg]) = model.rtl_call(expr, "FreeAndNil") else {
            return;
        };
        let Some(ty) = model.known_type(arg.id) else {
            return;
        };
        let arena = model.arena();
        match arena.get(arena.underlying(ty)) {
            TypeKind::Class { .. } | TypeKind::TypeParam(_) | TypeKind::Untyped | TypeKind::Nil => {}
            _ => ctx.report(
                expr.span,
                format!(
                    "FreeAndNil should only be passed an object instance, not '{}'",
                    arena.display(ty, model.index)
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check, lines};

    #[test]
    fn test_assigned_then_free() {
        let source = "unit A; interface implementation\n\
            uses System.SysUtils;\n\
            procedure Run(X: TObject);\n\
            begin\n\
              if Assigned(X) then X.Free;\n\
              if Assigned(X) then\n\
                X.Free;\n\
              if X <> nil then begin\n\
                FreeAndNil(X);\n\
              end;\n\
              if Assigned(X) then X.Free else X := nil;\n\
              if Assigned(X) then begin X.Free; X := nil; end;\n\
            end;\n\
            end.";
        let issues = check("AssignedAndFree", source);
        assert_eq!(lines(&issues), vec![Some(5), Some(7), Some(9)]);
        assert_eq!(issues[0].end_line, Some(5));
    }

    #[test]
    fn test_guard_on_a_different_variable() {
        let source = "unit A; interface implementation\n\
            procedure Run(X, Y: TObject);\n\
            begin\n\
              if Assigned(Y) then X.Free;\n\
              if Assigned(X) then Y.Free;\n\
            end;\n\
            end.";
        assert!(check("AssignedAndFree", source).is_empty());
    }

    #[test]
    fn test_free_and_nil_on_non_objects() {
        let source = "unit A; interface implementation\n\
            uses System.SysUtils;\n\
            type IFoo = interface end;\n\
            procedure Run(O: TObject; I: IFoo; P: Pointer; Q: Whatever);\n\
            begin\n\
              FreeAndNil(O);\n\
              FreeAndNil(I);\n\
              FreeAndNil(P);\n\
              FreeAndNil(Q);\n\
            end;\n\
            end.";
        let issues = check("FreeAndNilTObject", source);
        assert_eq!(lines(&issues), vec![Some(7), Some(8)]);
        assert!(issues[0].message.contains("'IFoo'"));
    }
}
