//! Single-pass dispatch of one resolved file to every active rule.

use super::{FileModel, Issue, Rule, RuleContext, RuleRegistry};
use crate::syntax::ast::{Expr, RoutineDecl, Stmt, TypeDecl, TypeExpr};
use crate::syntax::visit::{self, Visitor};
use tracing::debug;

/// Run the registry's rules over one file and return their issues in
/// report order.
pub fn run_rules(registry: &RuleRegistry, model: &FileModel) -> Vec<Issue> {
    let rules = registry.instantiate(model.path);
    if rules.is_empty() {
        return Vec::new();
    }
    let mut dispatcher = Dispatcher {
        model,
        rules,
        issues: Vec::new(),
    };
    dispatcher.each(|rule, ctx| rule.start_file(ctx));
    visit::walk_file(&mut dispatcher, model.file);
    dispatcher.each(|rule, ctx| rule.end_file(ctx));

    debug!(
        path = %model.path.display(),
        issues = dispatcher.issues.len(),
        "rules finished"
    );
    dispatcher.issues
}

struct Dispatcher<'m> {
    model: &'m FileModel<'m>,
    rules: Vec<(String, Box<dyn Rule>)>,
    issues: Vec<Issue>,
}

impl Dispatcher<'_> {
    fn each(&mut self, mut hook: impl FnMut(&mut dyn Rule, &mut RuleContext)) {
        let model = self.model;
        for (key, rule) in self.rules.iter_mut() {
            let mut ctx = RuleContext::new(model, key, &mut self.issues);
            hook(rule.as_mut(), &mut ctx);
        }
    }
}

impl Visitor for Dispatcher<'_> {
    fn visit_type_decl(&mut self, decl: &TypeDecl) {
        self.each(|rule, ctx| rule.visit_type_decl(ctx, decl));
        visit::walk_type_decl(self, decl);
    }

    fn visit_type_expr(&mut self, ty: &TypeExpr) {
        self.each(|rule, ctx| rule.visit_type_expr(ctx, ty));
        visit::walk_type_expr(self, ty);
    }

    fn visit_routine(&mut self, routine: &RoutineDecl) {
        self.each(|rule, ctx| rule.visit_routine(ctx, routine));
        visit::walk_routine(self, routine);
        self.each(|rule, ctx| rule.leave_routine(ctx, routine));
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        self.each(|rule, ctx| rule.visit_stmt(ctx, stmt));
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        self.each(|rule, ctx| rule.visit_expr(ctx, expr));
        visit::walk_expr(self, expr);
    }
}
