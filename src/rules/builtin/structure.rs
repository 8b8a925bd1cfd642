use crate::config::RuleProperties;
use crate::errors::ConfigError;
use crate::rules::{Rule, RuleContext, RuleFactory};
use crate::symbols::NameKey;
use crate::syntax::ast::{
    Decl, FileKind, Member, SourceFile, StructKind, TypeDecl, TypeExpr, TypeExprKind, Visibility,
};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// More than `max` classes declared at the top level of one file.
#[derive(Debug)]
pub struct ClassPerFile {
    max: u32,
}

impl ClassPerFile {
    pub fn build(props: &RuleProperties) -> Result<RuleFactory, ConfigError> {
        let max = props.u32("max")?.unwrap_or(1);
        Ok(Arc::new(move || Box::new(ClassPerFile { max })))
    }
}

/// Classes with a body; forward declarations, stubs and helpers do not
/// count.
fn counts_as_class(decl: &TypeDecl) -> bool {
    match &decl.ty.kind {
        TypeExprKind::Struct(structure) => {
            structure.kind == StructKind::Class && structure.has_body && structure.helper_for.is_none()
        }
        _ => false,
    }
}

impl Rule for ClassPerFile {
    fn end_file(&mut self, ctx: &mut RuleContext) {
        let names: FxHashSet<NameKey> = ctx
            .model
            .file
            .sections()
            .flat_map(|section| &section.decls)
            .filter_map(|decl| match decl {
                Decl::Types(types) => Some(types),
                _ => None,
            })
            .flatten()
            .filter(|t| counts_as_class(t))
            .map(|t| NameKey::new(&t.name.name))
            .collect();
        let count = names.len();
        if count > self.max as usize {
            ctx.report_file(format!(
                "File declares {} classes, at most {} allowed per file",
                count, self.max
            ));
        }
    }
}

/// A unit that declares nothing and runs nothing.
#[derive(Debug, Default)]
pub struct EmptyUnit;

fn is_empty_unit(file: &SourceFile) -> bool {
    file.kind == FileKind::Unit
        && file.sections().all(|section| section.decls.is_empty())
        && [&file.initialization, &file.finalization]
            .into_iter()
            .flatten()
            .all(|block| block.stmts.is_empty())
}

impl Rule for EmptyUnit {
    fn end_file(&mut self, ctx: &mut RuleContext) {
        if is_empty_unit(ctx.model.file) {
            ctx.report_file(format!(
                "Unit '{}' contains no declarations or statements",
                ctx.model.file.name.dotted()
            ));
        }
    }
}

/// Interfaces without members. A bodyless `IFoo = interface;` with no full
/// declaration in the same scope counts as empty.
#[derive(Debug, Default)]
pub struct EmptyInterface;

impl Rule for EmptyInterface {
    fn visit_type_decl(&mut self, ctx: &mut RuleContext, decl: &TypeDecl) {
        let is_interface = match &decl.ty.kind {
            TypeExprKind::Struct(structure) => {
                matches!(structure.kind, StructKind::Interface | StructKind::DispInterface)
            }
            TypeExprKind::Forward(kind) => *kind == StructKind::Interface,
            _ => false,
        };
        if !is_interface {
            return;
        }
        let Some(declaration) = ctx.model.node_decl(decl.id) else {
            return;
        };
        // Forward declarations merged into a full one point at the full
        // declaration's name.
        let is_empty = declaration
            .type_info
            .as_ref()
            .is_some_and(|info| info.is_empty_interface);
        if is_empty && declaration.span == decl.name.span {
            ctx.report(
                decl.name.span,
                format!("Interface '{}' declares no members", decl.name.name),
            );
        }
    }
}

/// Fields in an explicit `public` or `published` section of a class.
#[derive(Debug, Default)]
pub struct PublicField;

impl Rule for PublicField {
    fn visit_type_expr(&mut self, ctx: &mut RuleContext, ty: &TypeExpr) {
        let TypeExprKind::Struct(structure) = &ty.kind else {
            return;
        };
        if structure.kind != StructKind::Class {
            return;
        }
        let exposed = structure
            .sections
            .iter()
            .filter(|s| s.explicit && s.visibility >= Visibility::Public);
        for section in exposed {
            for member in &section.members {
                if let Member::Field(field) = member {
                    for name in &field.names {
                        ctx.report(
                            name.span,
                            format!(
                                "Field '{}' is {}, expose it through a property instead",
                                name.name,
                                section.visibility.as_str()
                            ),
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check, check_with, lines};
    use crate::config::RuleSettings;

    const THREE_CLASSES: &str = "unit A; interface\n\
        type\n\
          TFwd = class;\n\
          TStub = class(TObject);\n\
          TFirst = class\n\
          end;\n\
          TSecond = class(TFirst)\n\
            procedure Run;\n\
          end;\n\
          TFwd = class\n\
          end;\n\
        implementation\n\
        procedure TSecond.Run; begin end;\n\
        end.";

    #[test]
    fn test_class_per_file_reports_once() {
        let issues = check("ClassPerFile", THREE_CLASSES);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].start_line, None);
        assert!(issues[0].message.contains("3 classes"));

        let relaxed = check_with(
            "ClassPerFile",
            RuleSettings::new().property("max", "3"),
            &[THREE_CLASSES],
        );
        assert!(relaxed.is_empty());
    }

    #[test]
    fn test_class_per_file_counts_distinct_names() {
        let source = "unit A; interface\n\
            type\n\
              TDup = class end;\n\
              TOther = class end;\n\
              TDup = class end;\n\
            implementation end.";
        let issues = check("ClassPerFile", source);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.starts_with("File declares 2 classes"), "{}", issues[0].message);
    }

    #[test]
    fn test_single_class_with_forward_and_stub() {
        let source = "unit A; interface\n\
            type\n\
              TFoo = class;\n\
              TBar = class(TObject);\n\
              TFoo = class end;\n\
            implementation end.";
        assert!(check("ClassPerFile", source).is_empty());
    }

    #[test]
    fn test_empty_unit() {
        let issues = check("EmptyUnit", "unit Empty;\ninterface\nuses System.SysUtils;\nimplementation\nend.");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].start_line, None);
        assert!(check("EmptyUnit", "unit A; interface implementation initialization Randomize; end.").is_empty());
        assert!(check("EmptyUnit", "unit A; interface const C = 1; implementation end.").is_empty());
    }

    #[test]
    fn test_empty_interface_including_lone_forward() {
        let source = "unit A; interface\n\
            type\n\
              IEmpty = interface\n\
              end;\n\
              ILone = interface;\n\
              IMerged = interface;\n\
              IFull = interface\n\
                procedure Run;\n\
              end;\n\
              IMerged = interface\n\
                procedure Go;\n\
              end;\n\
            implementation end.";
        let issues = check("EmptyInterface", source);
        assert_eq!(lines(&issues), vec![Some(3), Some(5)]);
        assert!(issues[1].message.contains("ILone"));
    }

    #[test]
    fn test_public_field() {
        let source = "unit A; interface\n\
            type\n\
              TFoo = class\n\
                FImplicit: Integer;\n\
              private\n\
                FHidden: Integer;\n\
              public\n\
                Count, Size: Integer;\n\
              published\n\
                Name: string;\n\
              end;\n\
              TRec = record\n\
              public\n\
                X: Integer;\n\
              end;\n\
            implementation end.";
        let issues = check("PublicField", source);
        assert_eq!(lines(&issues), vec![Some(8), Some(8), Some(10)]);
        assert!(issues[2].message.contains("published"));
    }
}
