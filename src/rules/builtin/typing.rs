//! Rules about assignments and value casts.

use crate::core::type_compat::{Conversion, TypeCompatibility};
use crate::rules::{same_name_path, FileModel, Rule, RuleContext};
use crate::syntax::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::types::TypeId;

/// Source and target types of a value cast `T(X)`.
fn cast_types(model: &FileModel, expr: &Expr) -> Option<(TypeId, TypeId)> {
    let ExprKind::Call { args, .. } = &expr.kind else {
        return None;
    };
    let [arg] = args.as_slice() else {
        return None;
    };
    let target = model.resolution.cast_target(expr.id)?;
    Some((model.known_type(arg.id)?, target))
}

/// Value and target types of an assignment statement.
fn assignment_types<'s>(model: &FileModel, stmt: &'s Stmt) -> Option<(&'s Expr, TypeId, TypeId)> {
    let StmtKind::Assign { target, value } = &stmt.kind else {
        return None;
    };
    Some((value, model.known_type(value.id)?, model.known_type(target.id)?))
}

/// `X := X;` and `X := (X);`
#[derive(Debug, Default)]
pub struct RedundantAssignment;

impl Rule for RedundantAssignment {
    fn visit_stmt(&mut self, ctx: &mut RuleContext, stmt: &Stmt) {
        if let StmtKind::Assign { target, value } = &stmt.kind {
            if same_name_path(target, value) {
                ctx.report(stmt.span, "Redundant assignment of a variable to itself");
            }
        }
    }
}

/// Casts between pointer-sized and fixed-width integer representations.
#[derive(Debug, Default)]
pub struct PlatformDependentCast;

impl Rule for PlatformDependentCast {
    fn visit_expr(&mut self, ctx: &mut RuleContext, expr: &Expr) {
        let model = ctx.model;
        let Some((from, to)) = cast_types(model, expr) else {
            return;
        };
        let arena = model.arena();
        if TypeCompatibility::classify_conversion(arena, from, to) == Conversion::PlatformDependent {
            ctx.report(
                expr.span,
                format!(
                    "Platform dependent cast from '{}' to '{}'",
                    arena.display(from, model.index),
                    arena.display(to, model.index)
                ),
            );
        }
    }
}

/// Assignments that truncate on some platforms.
#[derive(Debug, Default)]
pub struct PlatformDependentTruncation;

impl Rule for PlatformDependentTruncation {
    fn visit_stmt(&mut self, ctx: &mut RuleContext, stmt: &Stmt) {
        let model = ctx.model;
        let Some((_, from, to)) = assignment_types(model, stmt) else {
            return;
        };
        let arena = model.arena();
        if TypeCompatibility::is_platform_truncation(arena, from, to) {
            ctx.report(
                stmt.span,
                format!(
                    "Assigning '{}' to '{}' truncates on some platforms",
                    arena.display(from, model.index),
                    arena.display(to, model.index)
                ),
            );
        }
    }
}

/// Unicode strings or characters cast or assigned to Ansi ones.
#[derive(Debug, Default)]
pub struct UnicodeToAnsiCast;

impl UnicodeToAnsiCast {
    fn check(ctx: &mut RuleContext, span: crate::span::Span, from: TypeId, to: TypeId) {
        let model = ctx.model;
        let arena = model.arena();
        if TypeCompatibility::classify_conversion(arena, from, to) == Conversion::AnsiNarrowing {
            ctx.report(
                span,
                format!(
                    "Unicode data narrowed from '{}' to '{}'",
                    arena.display(from, model.index),
                    arena.display(to, model.index)
                ),
            );
        }
    }
}

impl Rule for UnicodeToAnsiCast {
    fn visit_expr(&mut self, ctx: &mut RuleContext, expr: &Expr) {
        if let Some((from, to)) = cast_types(ctx.model, expr) {
            Self::check(ctx, expr.span, from, to);
        }
    }

    fn visit_stmt(&mut self, ctx: &mut RuleContext, stmt: &Stmt) {
        let Some((value, from, to)) = assignment_types(ctx.model, stmt) else {
            return;
        };
        // Literals are converted at compile time.
        if matches!(value.unparenthesized().kind, ExprKind::Literal(_)) {
            return;
        }
        Self::check(ctx, stmt.span, from, to);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check, lines};

    #[test]
    fn test_redundant_self_assignment() {
        let source = "unit A; interface implementation\n\
            type TFoo = class FValue: Integer; procedure Run; end;\n\
            procedure TFoo.Run;\n\
            var X, Y: Integer;\n\
            begin\n\
              X := X;\n\
              X := (X);\n\
              x := ((X));\n\
              X := Y;\n\
              Self.FValue := FValue;\n\
              Self.FValue := Self.FValue;\n\
            end;\n\
            end.";
        let issues = check("RedundantAssignment", source);
        assert_eq!(lines(&issues), vec![Some(6), Some(7), Some(8), Some(11)]);
    }

    #[test]
    fn test_platform_dependent_casts() {
        let source = "unit A; interface implementation\n\
            procedure Run(I: Integer; N: NativeInt; U: NativeUInt; P: Pointer; O: TObject);\n\
            begin\n\
              I := Integer(N);\n\
              N := NativeInt(I);\n\
              P := Pointer(N);\n\
              N := NativeInt(P);\n\
              U := NativeUInt(O);\n\
              I := Integer(P);\n\
              I := Integer(Unknown);\n\
            end;\n\
            end.";
        let issues = check("PlatformDependentCast", source);
        assert_eq!(lines(&issues), vec![Some(4), Some(5), Some(9)]);
        assert_eq!(issues[0].message, "Platform dependent cast from 'NativeInt' to 'Integer'");
    }

    #[test]
    fn test_platform_dependent_truncation() {
        let source = "unit A; interface implementation\n\
            procedure Run(I: Integer; N: NativeInt; L: Int64; W: Word);\n\
            begin\n\
              I := N;\n\
              N := L;\n\
              L := N;\n\
              N := I;\n\
              W := N;\n\
            end;\n\
            end.";
        let issues = check("PlatformDependentTruncation", source);
        assert_eq!(lines(&issues), vec![Some(4), Some(5), Some(8)]);
    }

    #[test]
    fn test_unicode_to_ansi() {
        let source = "unit A; interface implementation\n\
            procedure Run(S: string; A: AnsiString; C: Char; AC: AnsiChar);\n\
            begin\n\
              A := S;\n\
              A := AnsiString(S);\n\
              AC := C;\n\
              S := A;\n\
              A := 'literal';\n\
              A := A;\n\
            end;\n\
            end.";
        let issues = check("UnicodeToAnsiCast", source);
        assert_eq!(lines(&issues), vec![Some(4), Some(5), Some(6)]);
    }
}
