//! Two-phase merge of forward, stub and full declarations.
//!
//! The collector records every type declaration as a candidate; once the
//! unit is walked this pass groups candidates by scope, name and generic
//! arity and leaves one canonical declaration per logical type. Routine
//! headings are paired with their bodies as the bodies are met, using the
//! signature comparison below.

use super::declaration_phase::UnitBuilder;
use crate::diagnostics::{error_codes, Diagnostic, DiagnosticHandler};
use crate::symbols::{DeclId, NameKey, ParamInfo, ScopeId, TypeShape};
use crate::syntax::ast::{ParamGroup, RoutineHeading, TypeExpr, TypeExprKind};
use indexmap::IndexMap;

/// A type declaration awaiting the merge pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeCandidate {
    pub scope: ScopeId,
    pub decl: DeclId,
    pub arity: usize,
    pub is_forward: bool,
}

/// Unify bare forward declarations with their full declaration.
///
/// - one full declaration: forwards are absorbed into it
/// - no full declaration: the first forward stands alone; a bodyless
///   interface without a counterpart is an empty interface
/// - several full declarations: all stay declared (lookups become
///   ambiguous) and each extra one is reported
pub(crate) fn merge_types(
    builder: &mut UnitBuilder,
    candidates: &[TypeCandidate],
    handler: &dyn DiagnosticHandler,
) {
    let mut groups: IndexMap<(ScopeId, NameKey, usize), Vec<TypeCandidate>> = IndexMap::new();
    for candidate in candidates {
        let key = builder.decl(candidate.decl).key.clone();
        groups
            .entry((candidate.scope, key, candidate.arity))
            .or_default()
            .push(*candidate);
    }

    for ((scope, key, _), group) in groups {
        let (forwards, fulls): (Vec<_>, Vec<_>) = group.into_iter().partition(|c| c.is_forward);

        let canonical = match fulls.first() {
            Some(first) => first.decl,
            None => match forwards.first() {
                Some(first) => {
                    if let Some(info) = builder.decl_mut(first.decl).type_info.as_mut() {
                        info.is_forward = false;
                        info.is_empty_interface = info.shape == TypeShape::Interface;
                    }
                    first.decl
                }
                None => continue,
            },
        };

        for forward in forwards.iter().filter(|f| f.decl != canonical) {
            let span = builder.decl(forward.decl).span;
            builder.decl_mut(canonical).forward_spans.push(span);
            builder.scope_mut(scope).remove(&key, forward.decl);
            builder.redirect_nodes(forward.decl, canonical);
        }

        if let Some((first, rest)) = fulls.split_first() {
            let previous = builder.decl(first.decl).span;
            for extra in rest {
                let decl = builder.decl(extra.decl);
                handler.report(
                    Diagnostic::error(decl.span, format!("Duplicate declaration of '{}'", decl.name))
                        .with_code(error_codes::DUPLICATE_DECLARATION)
                        .with_related(previous, "Previously declared here"),
                );
            }
        }
    }
}

/// Pick the heading an implementation belongs to among routines of the
/// same name that have no body yet.
///
/// An implementation without a parameter list takes the only candidate, or
/// the parameterless one among overloads. Otherwise parameter modes and
/// type spellings must agree; a lone candidate with the right number of
/// parameters is accepted even when spellings differ (`System.Integer`
/// against `Integer` through an alias).
pub(crate) fn match_heading(
    builder: &UnitBuilder,
    candidates: &[DeclId],
    heading: &RoutineHeading,
) -> Option<DeclId> {
    let params_of = |id: &DeclId| {
        builder
            .decl(*id)
            .routine
            .as_ref()
            .map(|r| r.params.as_slice())
            .unwrap_or(&[])
    };

    if !heading.has_param_list {
        if candidates.len() == 1 {
            return candidates.first().copied();
        }
        return candidates.iter().copied().find(|id| params_of(id).is_empty());
    }

    let wanted = group_signature(&heading.params);
    let return_text = heading.return_type.as_ref().map(type_text);
    let exact = candidates.iter().copied().find(|id| {
        let same_params = param_signature(params_of(id)) == wanted;
        let same_return = match &return_text {
            Some(text) => builder
                .decl(*id)
                .routine
                .as_ref()
                .and_then(|r| r.return_type.as_ref())
                .map(type_text)
                .as_ref()
                == Some(text),
            None => true,
        };
        same_params && same_return
    });
    if exact.is_some() {
        return exact;
    }

    match candidates {
        [only] if params_of(only).len() == heading.param_count() => Some(*only),
        _ => None,
    }
}

fn group_signature(groups: &[ParamGroup]) -> Vec<(String, String)> {
    groups
        .iter()
        .flat_map(|group| {
            let ty = group.ty.as_ref().map(type_text).unwrap_or_default();
            let mode = format!("{:?}", group.mode);
            group.names.iter().map(move |_| (mode.clone(), ty.clone()))
        })
        .collect()
}

fn param_signature(params: &[ParamInfo]) -> Vec<(String, String)> {
    params
        .iter()
        .map(|p| {
            (
                format!("{:?}", p.mode),
                p.ty.as_ref().map(type_text).unwrap_or_default(),
            )
        })
        .collect()
}

/// Case-insensitive spelling of a type expression used to compare
/// signatures. Qualified names compare by their last segment.
pub(crate) fn type_text(ty: &TypeExpr) -> String {
    match &ty.kind {
        TypeExprKind::Named { path, args } => {
            let name = NameKey::new(path.last().map(|p| p.name.as_str()).unwrap_or_default());
            if args.is_empty() {
                name.to_string()
            } else {
                let args: Vec<_> = args.iter().map(type_text).collect();
                format!("{}<{}>", name, args.join(","))
            }
        }
        TypeExprKind::String { .. } => "string".to_string(),
        TypeExprKind::Pointer(inner) => format!("^{}", type_text(inner)),
        TypeExprKind::ClassOf(inner) => format!("class of {}", type_text(inner)),
        TypeExprKind::Set(inner) => format!("set of {}", type_text(inner)),
        TypeExprKind::Array { element, .. } => format!("array of {}", type_text(element)),
        TypeExprKind::ArrayOfConst => "array of const".to_string(),
        TypeExprKind::File(_) => "file".to_string(),
        TypeExprKind::Procedural(_) => "procedure".to_string(),
        TypeExprKind::Struct(_)
        | TypeExprKind::Forward(_)
        | TypeExprKind::Enum(_)
        | TypeExprKind::Subrange { .. } => "?".to_string(),
    }
}
