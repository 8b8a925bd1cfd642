use crate::config::RuleProperties;
use crate::errors::ConfigError;
use crate::rules::{Rule, RuleContext, RuleFactory};
use crate::syntax::ast::{BinaryOp, Expr, ExprKind, RoutineDecl, Stmt, StmtKind, TryHandler};
use crate::types::TypeKind;
use std::sync::Arc;

/// McCabe complexity of each routine body: one plus every branch point.
/// Nested routines are measured on their own.
#[derive(Debug)]
pub struct CyclomaticComplexity {
    threshold: u32,
    /// Complexity of the routines being walked, innermost last.
    stack: Vec<u32>,
}

impl CyclomaticComplexity {
    pub fn build(props: &RuleProperties) -> Result<RuleFactory, ConfigError> {
        let threshold = props.u32("threshold")?.unwrap_or(10);
        Ok(Arc::new(move || {
            Box::new(CyclomaticComplexity {
                threshold,
                stack: Vec::new(),
            })
        }))
    }

    fn add(&mut self, points: usize) {
        if let Some(top) = self.stack.last_mut() {
            *top += points as u32;
        }
    }
}

impl Rule for CyclomaticComplexity {
    fn visit_routine(&mut self, _ctx: &mut RuleContext, routine: &RoutineDecl) {
        if routine.body.is_some() {
            self.stack.push(1);
        }
    }

    fn leave_routine(&mut self, ctx: &mut RuleContext, routine: &RoutineDecl) {
        if routine.body.is_none() {
            return;
        }
        let Some(complexity) = self.stack.pop() else {
            return;
        };
        if complexity > self.threshold {
            let name = routine
                .heading
                .name
                .iter()
                .map(|part| part.name.as_str())
                .collect::<Vec<_>>()
                .join(".");
            ctx.report(
                routine.heading.span,
                format!(
                    "Routine '{}' has a cyclomatic complexity of {}, above the threshold of {}",
                    name, complexity, self.threshold
                ),
            );
        }
    }

    fn visit_stmt(&mut self, _ctx: &mut RuleContext, stmt: &Stmt) {
        let points = match &stmt.kind {
            StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::Repeat { .. }
            | StmtKind::For { .. }
            | StmtKind::ForIn { .. } => 1,
            StmtKind::Case { arms, .. } => arms.len(),
            StmtKind::Try {
                handler: TryHandler::Except { handlers, .. },
                ..
            } => handlers.len(),
            _ => 0,
        };
        self.add(points);
    }

    fn visit_expr(&mut self, ctx: &mut RuleContext, expr: &Expr) {
        if let ExprKind::Binary {
            op: BinaryOp::And | BinaryOp::Or,
            ..
        } = expr.kind
        {
            // Bitwise operators on integers do not branch.
            let is_bitwise = ctx.model.known_type(expr.id).is_some_and(|ty| {
                let arena = ctx.model.arena();
                matches!(arena.get(arena.underlying(ty)), TypeKind::Int(_))
            });
            if !is_bitwise {
                self.add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::check_with;
    use crate::config::RuleSettings;

    const SOURCE: &str = "unit A; interface implementation\n\
        procedure Simple(A: Boolean);\n\
        begin\n\
          if A then Exit;\n\
        end;\n\
        \n\
        procedure Branchy(A, B: Boolean; I: Integer);\n\
          procedure Nested;\n\
          begin\n\
            if A then if B then Exit;\n\
          end;\n\
        begin\n\
          if A and B then Exit;\n\
          while A or B do I := I and 3;\n\
          case I of\n\
            1: ;\n\
            2: ;\n\
          else ;\n\
          end;\n\
          try\n\
            Nested;\n\
          except\n\
            on Exception do ;\n\
          end;\n\
        end;\n\
        end.";

    #[test]
    fn test_threshold() {
        let issues = check_with(
            "CyclomaticComplexity",
            RuleSettings::new().property("threshold", "3"),
            &[SOURCE],
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].start_line, Some(7));
        assert_eq!(
            issues[0].message,
            "Routine 'Branchy' has a cyclomatic complexity of 8, above the threshold of 3"
        );
    }

    #[test]
    fn test_default_threshold() {
        let issues = check_with("CyclomaticComplexity", RuleSettings::new(), &[SOURCE]);
        assert!(issues.is_empty());
    }
}
