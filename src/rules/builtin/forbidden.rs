use crate::config::RuleProperties;
use crate::errors::ConfigError;
use crate::rules::{Rule, RuleContext, RuleFactory};
use crate::span::Span;
use crate::symbols::{Declaration, NameKey};
use crate::syntax::ast::{Expr, ExprKind, NodeId, TypeExpr, TypeExprKind};
use rustc_hash::FxHashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenKind {
    Method,
    Type,
    /// Any declaration.
    Identifier,
}

impl ForbiddenKind {
    fn accepts(&self, decl: &Declaration) -> bool {
        match self {
            ForbiddenKind::Method => decl.is_routine(),
            ForbiddenKind::Type => decl.is_type(),
            ForbiddenKind::Identifier => true,
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            ForbiddenKind::Method => "method",
            ForbiddenKind::Type => "type",
            ForbiddenKind::Identifier => "identifier",
        }
    }
}

/// References to declarations named in a blacklist of fully qualified
/// names such as `System.SysUtils.FreeAndNil` or `Vcl.Forms.TForm`.
#[derive(Debug, Clone)]
pub struct ForbiddenReference {
    kind: ForbiddenKind,
    blacklist: Arc<FxHashSet<NameKey>>,
    message: Option<String>,
}

impl ForbiddenReference {
    pub fn build(kind: ForbiddenKind, props: &RuleProperties) -> Result<RuleFactory, ConfigError> {
        let blacklist = props
            .list("blacklist")?
            .iter()
            .map(|name| NameKey::new(name))
            .collect();
        let rule = ForbiddenReference {
            kind,
            blacklist: Arc::new(blacklist),
            message: props.string("message")?.map(str::to_string),
        };
        Ok(Arc::new(move || Box::new(rule.clone())))
    }

    fn check(&self, ctx: &mut RuleContext, node: NodeId, span: Span) {
        let Some(decl) = ctx.model.decl_of(node) else {
            return;
        };
        if !self.kind.accepts(decl) {
            return;
        }
        let qualified = ctx.model.qualified_name(decl.id);
        if self.blacklist.contains(&NameKey::new(&qualified)) {
            let message = match &self.message {
                Some(message) => message.clone(),
                None => format!("Use of forbidden {} '{}'", self.kind.noun(), qualified),
            };
            ctx.report(span, message);
        }
    }
}

impl Rule for ForbiddenReference {
    fn visit_expr(&mut self, ctx: &mut RuleContext, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(_) | ExprKind::Member { .. } | ExprKind::Inherited(_) => {
                self.check(ctx, expr.id, expr.span)
            }
            _ => {}
        }
    }

    fn visit_type_expr(&mut self, ctx: &mut RuleContext, ty: &TypeExpr) {
        if matches!(ty.kind, TypeExprKind::Named { .. }) {
            self.check(ctx, ty.id, ty.span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check_with, lines};
    use crate::config::RuleSettings;

    const SOURCE: &str = "unit A; interface implementation\n\
        uses System.SysUtils;\n\
        procedure Run;\n\
        var O: TObject; E: Exception;\n\
        begin\n\
          O := TObject.Create;\n\
          FreeAndNil(O);\n\
          freeandnil(O);\n\
          E := Exception.Create('x');\n\
          E.Free;\n\
        end;\n\
        end.";

    #[test]
    fn test_forbidden_method() {
        let settings = RuleSettings::new()
            .property("blacklist", "System.SysUtils.FreeAndNil, System.TObject.Free");
        let issues = check_with("ForbiddenMethod", settings, &[SOURCE]);
        assert_eq!(lines(&issues), vec![Some(7), Some(8), Some(10)]);
        assert_eq!(issues[0].message, "Use of forbidden method 'System.SysUtils.FreeAndNil'");
    }

    #[test]
    fn test_forbidden_type_with_custom_message() {
        let settings = RuleSettings::new()
            .property("blacklist", "system.sysutils.exception")
            .property("message", "Raise a domain exception instead");
        let issues = check_with("ForbiddenType", settings, &[SOURCE]);
        assert_eq!(lines(&issues), vec![Some(4), Some(9)]);
        assert!(issues.iter().all(|i| i.message == "Raise a domain exception instead"));
    }

    #[test]
    fn test_forbidden_identifier_matches_any_kind() {
        let settings = RuleSettings::new().property("blacklist", "System.TObject");
        let issues = check_with("ForbiddenIdentifier", settings, &[SOURCE]);
        assert_eq!(lines(&issues), vec![Some(4), Some(6)]);
    }
}
