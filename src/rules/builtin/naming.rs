use crate::config::RuleProperties;
use crate::errors::ConfigError;
use crate::rules::{Rule, RuleContext, RuleFactory};
use crate::syntax::ast::{Expr, ExprKind, Ident, Member, StructKind, TypeDecl, TypeExpr, TypeExprKind, Visibility};
use regex::Regex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingTarget {
    Class,
    Enum,
    Interface,
    /// Non-public class fields.
    Field,
}

impl NamingTarget {
    fn default_pattern(&self) -> &'static str {
        match self {
            NamingTarget::Class | NamingTarget::Enum => "^T[A-Z]",
            NamingTarget::Interface => "^I[A-Z]",
            NamingTarget::Field => "^F[A-Z]",
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            NamingTarget::Class => "Class",
            NamingTarget::Enum => "Enumeration",
            NamingTarget::Interface => "Interface",
            NamingTarget::Field => "Field",
        }
    }
}

/// Declared names must match a regular expression.
#[derive(Debug, Clone)]
pub struct NamingConvention {
    target: NamingTarget,
    pattern: Regex,
}

impl NamingConvention {
    pub fn build(target: NamingTarget, props: &RuleProperties) -> Result<RuleFactory, ConfigError> {
        let pattern = match props.regex("pattern")? {
            Some(pattern) => pattern,
            None => Regex::new(target.default_pattern()).map_err(|e| ConfigError::InvalidRegex {
                property: "pattern".to_string(),
                message: e.to_string(),
            })?,
        };
        let rule = NamingConvention { target, pattern };
        Ok(Arc::new(move || Box::new(rule.clone())))
    }

    fn check(&self, ctx: &mut RuleContext, name: &Ident) {
        if !self.pattern.is_match(&name.name) {
            ctx.report(
                name.span,
                format!(
                    "{} name '{}' does not match '{}'",
                    self.target.noun(),
                    name.name,
                    self.pattern.as_str()
                ),
            );
        }
    }
}

impl Rule for NamingConvention {
    fn visit_type_decl(&mut self, ctx: &mut RuleContext, decl: &TypeDecl) {
        let matches_target = match (&decl.ty.kind, self.target) {
            (TypeExprKind::Struct(s), NamingTarget::Class) => s.kind == StructKind::Class,
            (TypeExprKind::Struct(s), NamingTarget::Interface) => {
                matches!(s.kind, StructKind::Interface | StructKind::DispInterface)
            }
            (TypeExprKind::Enum(_), NamingTarget::Enum) => true,
            _ => false,
        };
        if matches_target {
            self.check(ctx, &decl.name);
        }
    }

    fn visit_type_expr(&mut self, ctx: &mut RuleContext, ty: &TypeExpr) {
        if self.target != NamingTarget::Field {
            return;
        }
        let TypeExprKind::Struct(structure) = &ty.kind else {
            return;
        };
        if structure.kind != StructKind::Class {
            return;
        }
        for (member, visibility) in structure.members() {
            if let Member::Field(field) = member {
                if visibility < Visibility::Public {
                    for name in &field.names {
                        self.check(ctx, name);
                    }
                }
            }
        }
    }
}

/// References spelled with a different case than their declaration.
#[derive(Debug, Default)]
pub struct MixedNames;

impl MixedNames {
    fn check(ctx: &mut RuleContext, node: crate::syntax::ast::NodeId, spelled: &Ident) {
        let Some(decl) = ctx.model.decl_of(node) else {
            return;
        };
        if decl.name != spelled.name {
            ctx.report(
                spelled.span,
                format!("Avoid mixing names: found '{}', expected '{}'", spelled.name, decl.name),
            );
        }
    }
}

impl Rule for MixedNames {
    fn visit_expr(&mut self, ctx: &mut RuleContext, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(ident) | ExprKind::Member { member: ident, .. } => {
                Self::check(ctx, expr.id, ident)
            }
            ExprKind::Inherited(Some(ident)) => Self::check(ctx, expr.id, ident),
            _ => {}
        }
    }

    fn visit_type_expr(&mut self, ctx: &mut RuleContext, ty: &TypeExpr) {
        if let TypeExprKind::Named { path, .. } = &ty.kind {
            if let Some(last) = path.last() {
                Self::check(ctx, ty.id, last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check, check_with, lines};
    use crate::config::RuleSettings;

    const TYPES: &str = "unit A; interface\n\
        type\n\
          TGood = class\n\
          private\n\
            FGood: Integer;\n\
            bad: Integer;\n\
          public\n\
            Visible: Integer;\n\
          end;\n\
          lowerClass = class end;\n\
          TColor = (clRed, clBlue);\n\
          Shade = (shLight, shDark);\n\
          IGood = interface end;\n\
          Bad = interface end;\n\
        implementation end.";

    #[test]
    fn test_default_patterns() {
        assert_eq!(lines(&check("ClassName", TYPES)), vec![Some(10)]);
        assert_eq!(lines(&check("EnumName", TYPES)), vec![Some(12)]);
        assert_eq!(lines(&check("InterfaceName", TYPES)), vec![Some(14)]);
        let fields = check("FieldName", TYPES);
        assert_eq!(lines(&fields), vec![Some(6)]);
        assert_eq!(fields[0].message, "Field name 'bad' does not match '^F[A-Z]'");
    }

    #[test]
    fn test_custom_pattern() {
        let issues = check_with(
            "ClassName",
            RuleSettings::new().property("pattern", "^[a-z]"),
            &[TYPES],
        );
        assert_eq!(lines(&issues), vec![Some(3)]);
    }

    #[test]
    fn test_mixed_names() {
        let source = "unit A; interface implementation\n\
            procedure Run;\n\
            var Count: integer;\n\
            begin\n\
              count := 1;\n\
              Count := COUNT + 1;\n\
              Unknown := 2;\n\
            end;\n\
            end.";
        let issues = check("MixedNames", source);
        assert_eq!(lines(&issues), vec![Some(3), Some(5), Some(6)]);
        assert_eq!(issues[0].message, "Avoid mixing names: found 'integer', expected 'Integer'");
    }
}
