//! Declaration phase: scope building and declaration registration (pass 1)
//!
//! This phase handles:
//! - Registering every declaration of a unit into nested scopes (unit
//!   sections, type members, routine signatures and bodies, statement
//!   blocks with inline declarations, exception handlers, anonymous methods)
//! - Implicit declarations: `Self`, `Result`, type parameters
//! - Pairing routine bodies with their headings
//! - Resolving `uses` entries to analyzed units
//!
//! The phase only reads its own file. Everything it produces is frozen into a
//! [`UnitSymbols`] and published through the project-wide `SymbolIndex`
//! before any reference is resolved.

use super::forward_merge::{self, TypeCandidate};
use crate::diagnostics::{error_codes, Diagnostic, DiagnosticHandler};
use crate::module_resolver::UnitNames;
use crate::span::Span;
use crate::stdlib::{INTRINSIC_ROUTINES, INTRINSIC_TYPES};
use crate::symbols::{
    DeclId, DeclKind, Declaration, Implicit, IntrinsicRoutine, IntrinsicResult, NameKey, ParamInfo,
    RoutineInfo, Scope, ScopeId, ScopeKind, TypeInfo, TypeShape, UnitId, UnitSymbols, UsesEntry,
};
use crate::syntax::ast::*;
use crate::syntax::visit::{self, Visitor};
use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Mutable declaration and scope tables of the unit being collected.
pub(crate) struct UnitBuilder {
    pub unit: UnitId,
    pub decls: Vec<Declaration>,
    pub scopes: Vec<Scope>,
    pub node_decls: FxHashMap<NodeId, DeclId>,
    pub node_scopes: FxHashMap<NodeId, ScopeId>,
}

impl UnitBuilder {
    pub fn new(unit: UnitId) -> Self {
        Self {
            unit,
            decls: Vec::new(),
            scopes: Vec::new(),
            node_decls: FxHashMap::default(),
            node_scopes: FxHashMap::default(),
        }
    }

    pub fn add_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId::new(self.unit, self.scopes.len());
        self.scopes.push(Scope::new(id, kind, parent));
        id
    }

    /// Create a declaration without making it visible in any scope.
    pub fn add_decl(&mut self, name: &str, kind: DeclKind, span: Span, scope: ScopeId) -> DeclId {
        let id = DeclId::new(self.unit, self.decls.len());
        self.decls.push(Declaration::new(id, name, kind, span, scope));
        id
    }

    pub fn declare(&mut self, scope: ScopeId, decl: DeclId) {
        let key = self.decl(decl).key.clone();
        self.scope_mut(scope).declare(key, decl);
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index as usize]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.index as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index as usize]
    }

    /// Point every syntax node bound to `from` at `to`.
    pub fn redirect_nodes(&mut self, from: DeclId, to: DeclId) {
        for target in self.node_decls.values_mut() {
            if *target == from {
                *target = to;
            }
        }
    }
}

/// Collect the declarations of one parsed file.
///
/// # Parameters
///
/// - `id`: the unit's position in the project; the file may only refer to
///   its own declarations by this id
/// - `name`: unit or program name supplied by the caller
/// - `file`: the (possibly partial) syntax tree
/// - `names`: uses-clause resolver over every analyzed unit
/// - `handler`: receives semantic diagnostics (duplicates, unmatched
///   implementations, unknown units)
#[instrument(skip(path, file, names, handler), fields(path = %path.display()))]
pub fn collect_unit(
    id: UnitId,
    name: &str,
    path: &Path,
    file: &SourceFile,
    names: &UnitNames,
    handler: &dyn DiagnosticHandler,
) -> UnitSymbols {
    let mut collector = Collector::new(id, handler);
    let is_unit = file.kind == FileKind::Unit;

    let interface_scope = collector
        .builder
        .add_scope(if is_unit { ScopeKind::UnitInterface } else { ScopeKind::UnitImplementation }, None);
    let implementation_scope = if is_unit {
        collector
            .builder
            .add_scope(ScopeKind::UnitImplementation, Some(interface_scope))
    } else {
        interface_scope
    };

    let unit_decl = collector
        .builder
        .add_decl(name, DeclKind::Unit, file.name.span, interface_scope);
    debug_assert_eq!(unit_decl.index, 0);

    if NameKey::new(name).as_str() == "system" {
        collector.register_intrinsics(interface_scope);
    }

    let mut uses = Vec::new();
    for section in file.sections() {
        if let Some(clause) = &section.uses {
            for used in &clause.units {
                let dotted = used.name.dotted();
                let unit = match names.resolve(&dotted, used.path.as_deref()) {
                    Ok(unit) => Some(unit),
                    Err(err) => {
                        handler.report(
                            Diagnostic::warning(used.span, err.to_string())
                                .with_code(error_codes::UNRESOLVED_UNIT),
                        );
                        None
                    }
                };
                uses.push(UsesEntry {
                    name: dotted,
                    unit,
                    section: section.kind,
                    span: used.span,
                });
            }
        }
    }

    if let Some(section) = &file.interface {
        let scope = if is_unit { interface_scope } else { implementation_scope };
        collector.collect_decls(&section.decls, scope);
    }
    if let Some(section) = &file.implementation {
        collector.collect_decls(&section.decls, implementation_scope);
    }
    for block in [&file.initialization, &file.finalization, &file.main_block]
        .into_iter()
        .flatten()
    {
        collector.collect_block(block, implementation_scope);
    }

    let Collector {
        mut builder,
        type_candidates,
        ..
    } = collector;
    forward_merge::merge_types(&mut builder, &type_candidates, handler);

    debug!(
        decls = builder.decls.len(),
        scopes = builder.scopes.len(),
        "collected unit"
    );

    UnitSymbols {
        id,
        name: name.to_string(),
        key: NameKey::new(name),
        path: path.to_path_buf(),
        kind: file.kind,
        decls: builder.decls,
        scopes: builder.scopes,
        interface_scope,
        implementation_scope,
        uses,
        node_decls: builder.node_decls,
        node_scopes: builder.node_scopes,
    }
}

/// Convert parameter groups into one entry per declared name.
pub(crate) fn param_infos(groups: &[ParamGroup]) -> Vec<ParamInfo> {
    groups
        .iter()
        .flat_map(|group| {
            group.names.iter().map(move |name| ParamInfo {
                name: name.name.clone(),
                mode: group.mode,
                ty: group.ty.clone(),
                has_default: group.default.is_some(),
            })
        })
        .collect()
}

struct Collector<'a> {
    builder: UnitBuilder,
    handler: &'a dyn DiagnosticHandler,
    type_candidates: Vec<TypeCandidate>,
    /// Scopes entered while walking statements, innermost last.
    frames: Vec<ScopeId>,
}

impl<'a> Collector<'a> {
    fn new(unit: UnitId, handler: &'a dyn DiagnosticHandler) -> Self {
        Self {
            builder: UnitBuilder::new(unit),
            handler,
            type_candidates: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn current_frame(&self) -> Option<ScopeId> {
        self.frames.last().copied()
    }

    /// Declare `decl` in `scope`, reporting a clash with a non-overloadable
    /// declaration of the same name. Types are checked by the merge pass.
    fn declare_checked(&mut self, scope: ScopeId, decl: DeclId) {
        let new = self.builder.decl(decl);
        let clash = self
            .builder
            .scope(scope)
            .lookup(&new.key)
            .iter()
            .map(|id| self.builder.decl(*id))
            .find(|old| {
                let both_routines = old.is_routine() && new.is_routine();
                let both_types = old.is_type() && new.is_type();
                old.id != new.id && !both_routines && !both_types
            })
            .map(|old| old.span);
        if let Some(previous) = clash {
            let new = self.builder.decl(decl);
            self.handler.report(
                Diagnostic::error(new.span, format!("Duplicate declaration of '{}'", new.name))
                    .with_code(error_codes::DUPLICATE_DECLARATION)
                    .with_related(previous, "Previously declared here"),
            );
        }
        self.builder.declare(scope, decl);
    }

    fn register_intrinsics(&mut self, scope: ScopeId) {
        let mut boolean = None;
        for (name, intrinsic) in INTRINSIC_TYPES {
            let id = self
                .builder
                .add_decl(name, DeclKind::Type, Span::default(), scope);
            self.builder.decl_mut(id).type_info = Some(TypeInfo::intrinsic(*intrinsic));
            self.builder.declare(scope, id);
            if *name == "Boolean" {
                boolean = Some(id);
            }
        }
        if let Some(boolean) = boolean {
            for value in ["False", "True"] {
                let id = self
                    .builder
                    .add_decl(value, DeclKind::EnumValue, Span::default(), scope);
                self.builder.decl_mut(id).owner = Some(boolean);
                self.builder.declare(scope, id);
            }
        }
        for spec in INTRINSIC_ROUTINES {
            let id = self
                .builder
                .add_decl(spec.name, DeclKind::Routine, Span::default(), scope);
            let kind = if spec.result == IntrinsicResult::None {
                RoutineKind::Procedure
            } else {
                RoutineKind::Function
            };
            let params = spec
                .params
                .iter()
                .map(|(name, mode, optional)| ParamInfo {
                    name: name.to_string(),
                    mode: *mode,
                    ty: None,
                    has_default: *optional,
                })
                .collect();
            self.builder.decl_mut(id).routine = Some(RoutineInfo {
                kind,
                is_class_method: false,
                params,
                return_type: None,
                directives: RoutineDirectives::default(),
                type_params: Vec::new(),
                signature_scope: scope,
                body_scope: None,
                implementation_span: None,
                intrinsic: Some(IntrinsicRoutine {
                    result: spec.result,
                    variadic: spec.variadic,
                }),
            });
            self.builder.declare(scope, id);
        }
    }

    fn collect_decls(&mut self, decls: &[Decl], scope: ScopeId) {
        for decl in decls {
            match decl {
                Decl::Types(types) => {
                    for ty in types {
                        self.collect_type_decl(ty, scope, None, Visibility::Public);
                    }
                }
                Decl::Consts(consts) => {
                    for constant in consts {
                        self.collect_const(constant, scope, None, Visibility::Public);
                    }
                }
                Decl::Vars(vars) => {
                    for var in vars {
                        for name in &var.names {
                            let id = self
                                .builder
                                .add_decl(&name.name, DeclKind::Variable, name.span, scope);
                            let decl = self.builder.decl_mut(id);
                            decl.type_expr = Some(var.ty.clone());
                            decl.value = var.init.clone();
                            self.declare_checked(scope, id);
                        }
                    }
                }
                Decl::Routine(routine) => self.collect_routine(routine, scope),
                Decl::Labels(labels) => {
                    for label in labels {
                        let id = self
                            .builder
                            .add_decl(&label.name, DeclKind::Label, label.span, scope);
                        self.declare_checked(scope, id);
                    }
                }
            }
        }
    }

    fn collect_const(
        &mut self,
        constant: &ConstDecl,
        scope: ScopeId,
        owner: Option<DeclId>,
        visibility: Visibility,
    ) {
        let id = self
            .builder
            .add_decl(&constant.name.name, DeclKind::Constant, constant.name.span, scope);
        let decl = self.builder.decl_mut(id);
        decl.owner = owner;
        decl.visibility = visibility;
        decl.type_expr = constant.ty.clone();
        decl.value = Some(constant.value.clone());
        self.declare_checked(scope, id);
    }

    fn declare_type_params(&mut self, params: &[TypeParam], scope: ScopeId, owner: DeclId) -> Vec<DeclId> {
        params
            .iter()
            .map(|param| {
                let id = self.builder.add_decl(
                    &param.name.name,
                    DeclKind::TypeParameter,
                    param.name.span,
                    scope,
                );
                self.builder.decl_mut(id).owner = Some(owner);
                self.builder.declare(scope, id);
                id
            })
            .collect()
    }

    fn collect_type_decl(
        &mut self,
        td: &TypeDecl,
        scope: ScopeId,
        owner: Option<DeclId>,
        visibility: Visibility,
    ) -> DeclId {
        let id = self
            .builder
            .add_decl(&td.name.name, DeclKind::Type, td.name.span, scope);
        {
            let decl = self.builder.decl_mut(id);
            decl.owner = owner;
            decl.visibility = visibility;
        }
        self.builder.node_decls.insert(td.id, id);

        let mut info = match &td.ty.kind {
            TypeExprKind::Struct(structure) => {
                let mut info = TypeInfo::new(shape_of(structure.kind));
                info.heritage = structure.heritage.clone();
                info.helper_for = structure.helper_for.clone();
                info.has_body = structure.has_body;
                info.is_empty_interface = info.shape == TypeShape::Interface
                    && structure.has_body
                    && structure.is_empty();
                info
            }
            TypeExprKind::Forward(kind) => {
                let mut info = TypeInfo::new(shape_of(*kind));
                info.is_forward = true;
                info.has_body = false;
                info
            }
            TypeExprKind::Enum(_) => TypeInfo::new(TypeShape::Enum),
            _ => {
                self.builder.decl_mut(id).type_expr = Some(td.ty.clone());
                TypeInfo::new(TypeShape::Other)
            }
        };
        info.strong_alias = td.strong_alias;

        let needs_members = !td.type_params.is_empty()
            || matches!(td.ty.kind, TypeExprKind::Struct(_) | TypeExprKind::Enum(_));
        if needs_members {
            let members = self.builder.add_scope(ScopeKind::Type(id), Some(scope));
            info.members = Some(members);
            info.type_params = self.declare_type_params(&td.type_params, members, id);
            match &td.ty.kind {
                TypeExprKind::Struct(structure) => {
                    info.default_property = self.collect_members(structure, members, id);
                }
                TypeExprKind::Enum(values) => {
                    for value in values {
                        let value_id = self.builder.add_decl(
                            &value.name.name,
                            DeclKind::EnumValue,
                            value.name.span,
                            scope,
                        );
                        let decl = self.builder.decl_mut(value_id);
                        decl.owner = Some(id);
                        decl.visibility = visibility;
                        decl.value = value.value.clone();
                        self.builder.declare(members, value_id);
                        self.declare_checked(scope, value_id);
                    }
                }
                _ => {}
            }
        }

        let arity = info.generic_arity();
        let is_forward = info.is_forward;
        self.builder.decl_mut(id).type_info = Some(info);
        self.type_candidates.push(TypeCandidate {
            scope,
            decl: id,
            arity,
            is_forward,
        });
        self.builder.declare(scope, id);
        id
    }

    /// Register the members of a structured type. Returns the default
    /// array property, if one is declared.
    fn collect_members(&mut self, structure: &StructType, scope: ScopeId, owner: DeclId) -> Option<DeclId> {
        let mut default_property = None;
        for (member, visibility) in structure.members() {
            match member {
                Member::Field(field) => self.collect_field(field, scope, owner, visibility),
                Member::Method(method) => {
                    self.declare_routine(&method.heading, method.id, scope, Some(owner), visibility);
                }
                Member::Property(property) => {
                    let id = self.builder.add_decl(
                        &property.name.name,
                        DeclKind::Property,
                        property.name.span,
                        scope,
                    );
                    let decl = self.builder.decl_mut(id);
                    decl.owner = Some(owner);
                    decl.visibility = visibility;
                    decl.type_expr = property.ty.clone();
                    decl.is_class_member = property.is_class;
                    decl.property_params = param_infos(&property.params);
                    if property.is_default {
                        default_property = Some(id);
                    }
                    self.declare_checked(scope, id);
                }
                Member::Types(types) => {
                    for nested in types {
                        self.collect_type_decl(nested, scope, Some(owner), visibility);
                    }
                }
                Member::Consts(consts) => {
                    for constant in consts {
                        self.collect_const(constant, scope, Some(owner), visibility);
                    }
                }
            }
        }
        if let Some(variant) = &structure.variant {
            self.collect_variant(variant, scope, owner);
        }
        default_property
    }

    fn collect_field(&mut self, field: &FieldDecl, scope: ScopeId, owner: DeclId, visibility: Visibility) {
        for name in &field.names {
            let id = self
                .builder
                .add_decl(&name.name, DeclKind::Field, name.span, scope);
            let decl = self.builder.decl_mut(id);
            decl.owner = Some(owner);
            decl.visibility = visibility;
            decl.type_expr = Some(field.ty.clone());
            decl.is_class_member = field.is_class_var;
            self.declare_checked(scope, id);
        }
    }

    fn collect_variant(&mut self, variant: &VariantPart, scope: ScopeId, owner: DeclId) {
        if let Some(tag) = &variant.tag {
            let id = self
                .builder
                .add_decl(&tag.name, DeclKind::Field, tag.span, scope);
            let decl = self.builder.decl_mut(id);
            decl.owner = Some(owner);
            decl.type_expr = Some(variant.tag_type.clone());
            self.declare_checked(scope, id);
        }
        for case in &variant.cases {
            for field in &case.fields {
                self.collect_field(field, scope, owner, Visibility::Public);
            }
            if let Some(nested) = &case.nested {
                self.collect_variant(nested, scope, owner);
            }
        }
    }

    /// Register a routine heading in `scope`.
    fn declare_routine(
        &mut self,
        heading: &RoutineHeading,
        node: NodeId,
        scope: ScopeId,
        owner: Option<DeclId>,
        visibility: Visibility,
    ) -> DeclId {
        let (name, span) = heading
            .simple_name()
            .map(|ident| (ident.name.as_str(), ident.span))
            .unwrap_or(("", heading.span));
        let id = self.builder.add_decl(name, DeclKind::Routine, span, scope);
        let signature_scope = self.builder.add_scope(ScopeKind::Signature(id), Some(scope));
        let type_params = self.declare_type_params(&heading.type_params, signature_scope, id);
        {
            let decl = self.builder.decl_mut(id);
            decl.owner = owner;
            decl.visibility = visibility;
            decl.is_class_member = heading.is_class_method;
            decl.routine = Some(RoutineInfo {
                kind: heading.kind,
                is_class_method: heading.is_class_method,
                params: param_infos(&heading.params),
                return_type: heading.return_type.clone(),
                directives: heading.directives,
                type_params,
                signature_scope,
                body_scope: None,
                implementation_span: None,
                intrinsic: None,
            });
        }
        self.builder.node_decls.insert(node, id);
        self.declare_checked(scope, id);
        id
    }

    /// Register a routine found in a declaration part. Bodies are paired
    /// with an earlier heading when one exists.
    fn collect_routine(&mut self, routine: &RoutineDecl, scope: ScopeId) {
        let heading = &routine.heading;
        let Some(body) = &routine.body else {
            self.declare_routine(heading, routine.id, scope, None, Visibility::Public);
            return;
        };

        let (decl, owner) = if heading.name.len() > 1 {
            let owner_path = &heading.name[..heading.name.len() - 1];
            let owner = self.find_owner_type(owner_path, scope);
            let matched = owner.and_then(|owner| {
                let members = self.builder.decl(owner).type_info.as_ref()?.members?;
                self.match_heading(&[members], heading)
            });
            match matched {
                Some(decl) => (decl, owner),
                None => {
                    let display = heading
                        .name
                        .iter()
                        .map(|i| i.name.as_str())
                        .collect::<Vec<_>>()
                        .join(".");
                    self.handler.report(
                        Diagnostic::error(
                            heading.span,
                            format!("No declaration found for method implementation '{}'", display),
                        )
                        .with_code(error_codes::UNMATCHED_IMPLEMENTATION),
                    );
                    let (name, span) = heading
                        .simple_name()
                        .map(|ident| (ident.name.as_str(), ident.span))
                        .unwrap_or(("", heading.span));
                    let id = self.builder.add_decl(name, DeclKind::Routine, span, scope);
                    let signature_scope = self.builder.add_scope(ScopeKind::Signature(id), Some(scope));
                    let decl = self.builder.decl_mut(id);
                    decl.owner = owner;
                    decl.routine = Some(RoutineInfo {
                        kind: heading.kind,
                        is_class_method: heading.is_class_method,
                        params: param_infos(&heading.params),
                        return_type: heading.return_type.clone(),
                        directives: heading.directives,
                        type_params: Vec::new(),
                        signature_scope,
                        body_scope: None,
                        implementation_span: None,
                        intrinsic: None,
                    });
                    (id, owner)
                }
            }
        } else {
            let mut search = vec![scope];
            if let ScopeKind::UnitImplementation = self.builder.scope(scope).kind {
                search.extend(self.builder.scope(scope).parent);
            }
            match self.match_heading(&search, heading) {
                Some(decl) => (decl, None),
                None => (
                    self.declare_routine(heading, routine.id, scope, None, Visibility::Public),
                    None,
                ),
            }
        };

        self.builder.node_decls.insert(routine.id, decl);
        self.collect_body(routine, body, decl, owner, scope);
    }

    fn match_heading(&self, scopes: &[ScopeId], heading: &RoutineHeading) -> Option<DeclId> {
        let key = NameKey::new(&heading.simple_name()?.name);
        let candidates: Vec<DeclId> = scopes
            .iter()
            .flat_map(|scope| self.builder.scope(*scope).lookup(&key).iter().copied())
            .filter(|id| {
                self.builder
                    .decl(*id)
                    .routine
                    .as_ref()
                    .is_some_and(|r| r.body_scope.is_none() && r.intrinsic.is_none())
            })
            .collect();
        forward_merge::match_heading(&self.builder, &candidates, heading)
    }

    /// Find the type named by the owner part of `TOwner.Method` or
    /// `TOuter.TInner.Method`, preferring full declarations over forwards.
    fn find_owner_type(&self, path: &[Ident], scope: ScopeId) -> Option<DeclId> {
        let (first, rest) = path.split_first()?;
        let mut current = self.find_type_in_chain(&NameKey::new(&first.name), scope)?;
        for segment in rest {
            let members = self.builder.decl(current).type_info.as_ref()?.members?;
            current = self.best_type(self.builder.scope(members).lookup(&NameKey::new(&segment.name)))?;
        }
        Some(current)
    }

    fn find_type_in_chain(&self, key: &NameKey, scope: ScopeId) -> Option<DeclId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = self.builder.scope(id);
            if let Some(found) = self.best_type(scope.lookup(key)) {
                return Some(found);
            }
            current = scope.parent;
        }
        None
    }

    fn best_type(&self, candidates: &[DeclId]) -> Option<DeclId> {
        let types = candidates.iter().copied().filter(|id| self.builder.decl(*id).is_type());
        let mut fallback = None;
        for id in types {
            let info = self.builder.decl(id).type_info.as_ref();
            if info.is_some_and(|info| !info.is_forward && info.members.is_some()) {
                return Some(id);
            }
            fallback.get_or_insert(id);
        }
        fallback
    }

    /// Create the body scope of `decl` and collect everything inside it.
    fn collect_body(
        &mut self,
        routine: &RoutineDecl,
        body: &RoutineBody,
        decl: DeclId,
        owner: Option<DeclId>,
        parent: ScopeId,
    ) {
        let heading = &routine.heading;
        let body_scope = self.builder.add_scope(
            ScopeKind::Routine {
                routine: Some(decl),
                self_type: owner,
            },
            Some(parent),
        );
        self.builder.node_scopes.insert(routine.id, body_scope);

        let (params, return_type, is_static) = {
            let info = self.builder.decl_mut(decl).routine.as_mut();
            match info {
                Some(info) => {
                    info.body_scope = Some(body_scope);
                    info.implementation_span = Some(heading.span);
                    (
                        info.params.clone(),
                        info.return_type.clone(),
                        info.directives.is_static || heading.directives.is_static,
                    )
                }
                None => (Vec::new(), None, false),
            }
        };

        if let Some(owner) = owner {
            if !is_static {
                let id = self
                    .builder
                    .add_decl("Self", DeclKind::Parameter, heading.span, body_scope);
                self.builder.decl_mut(id).implicit = Some(Implicit::SelfRef {
                    owner,
                    class_method: heading.is_class_method,
                });
                self.builder.declare(body_scope, id);
            }
        }

        self.declare_type_params(&heading.type_params, body_scope, decl);

        if heading.has_param_list {
            for group in &heading.params {
                for name in &group.names {
                    let id = self
                        .builder
                        .add_decl(&name.name, DeclKind::Parameter, name.span, body_scope);
                    let param = self.builder.decl_mut(id);
                    param.type_expr = group.ty.clone();
                    param.param_mode = Some(group.mode);
                    param.value = group.default.clone();
                    self.declare_checked(body_scope, id);
                }
            }
        } else {
            let span = self.builder.decl(decl).span;
            for info in &params {
                let id = self
                    .builder
                    .add_decl(&info.name, DeclKind::Parameter, span, body_scope);
                let param = self.builder.decl_mut(id);
                param.type_expr = info.ty.clone();
                param.param_mode = Some(info.mode);
                self.builder.declare(body_scope, id);
            }
        }

        let return_type = heading.return_type.clone().or(return_type);
        if let Some(return_type) = return_type {
            let id = self
                .builder
                .add_decl("Result", DeclKind::Variable, heading.span, body_scope);
            let result = self.builder.decl_mut(id);
            result.type_expr = Some(return_type);
            result.implicit = Some(Implicit::Result { routine: decl });
            self.builder.declare(body_scope, id);
        }

        self.collect_decls(&body.decls, body_scope);
        self.collect_block(&body.block, body_scope);
    }

    /// Walk a statement block, creating scopes for inline declarations,
    /// exception handlers and anonymous methods.
    fn collect_block(&mut self, block: &Block, scope: ScopeId) {
        self.frames.push(scope);
        self.visit_block(block);
        self.frames.pop();
    }

    fn declare_inline(&mut self, var: &InlineVar, visible_from: usize) {
        let Some(scope) = self.current_frame() else {
            return;
        };
        let kind = if var.is_const {
            DeclKind::Constant
        } else {
            DeclKind::Variable
        };
        for name in &var.names {
            let id = self.builder.add_decl(&name.name, kind, name.span, scope);
            let decl = self.builder.decl_mut(id);
            decl.type_expr = var.ty.clone();
            decl.value = var.init.clone();
            decl.visible_from = visible_from;
            self.declare_checked(scope, id);
        }
    }

    fn collect_anonymous_method(&mut self, method: &AnonymousMethod) {
        let Some(parent) = self.current_frame() else {
            return;
        };
        let scope = self.builder.add_scope(
            ScopeKind::Routine {
                routine: None,
                self_type: None,
            },
            Some(parent),
        );
        self.builder.node_scopes.insert(method.id, scope);
        for group in &method.params {
            for name in &group.names {
                let id = self
                    .builder
                    .add_decl(&name.name, DeclKind::Parameter, name.span, scope);
                let param = self.builder.decl_mut(id);
                param.type_expr = group.ty.clone();
                param.param_mode = Some(group.mode);
                self.declare_checked(scope, id);
            }
        }
        if let Some(return_type) = &method.return_type {
            let id = self
                .builder
                .add_decl("Result", DeclKind::Variable, return_type.span, scope);
            self.builder.decl_mut(id).type_expr = Some(return_type.clone());
            self.builder.declare(scope, id);
        }
        self.collect_decls(&method.decls, scope);
        self.collect_block(&method.block, scope);
    }
}

fn shape_of(kind: StructKind) -> TypeShape {
    match kind {
        StructKind::Class => TypeShape::Class,
        StructKind::Interface | StructKind::DispInterface => TypeShape::Interface,
        StructKind::Record => TypeShape::Record,
        StructKind::Object => TypeShape::Object,
    }
}

fn declares_inline(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::InlineVar(_) => true,
        StmtKind::For { target, .. } | StmtKind::ForIn { target, .. } => {
            matches!(target, ForTarget::Inline(_))
        }
        StmtKind::Labeled { stmt, .. } => declares_inline(stmt),
        _ => false,
    }
}

impl Visitor for Collector<'_> {
    fn visit_block(&mut self, block: &Block) {
        if block.stmts.iter().any(declares_inline) {
            let parent = self.current_frame();
            let scope = self.builder.add_scope(ScopeKind::Block, parent);
            self.builder.node_scopes.insert(block.id, scope);
            self.frames.push(scope);
            visit::walk_block(self, block);
            self.frames.pop();
        } else {
            visit::walk_block(self, block);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::InlineVar(var) => {
                if let Some(init) = &var.init {
                    self.visit_expr(init);
                }
                self.declare_inline(var, stmt.span.end);
            }
            StmtKind::For {
                target: ForTarget::Inline(var),
                ..
            }
            | StmtKind::ForIn {
                target: ForTarget::Inline(var),
                ..
            } => {
                self.declare_inline(var, var.span.start);
                visit::walk_stmt(self, stmt);
            }
            StmtKind::Try {
                body,
                handler:
                    TryHandler::Except {
                        handlers,
                        else_branch,
                        statements,
                    },
            } => {
                for inner in body {
                    self.visit_stmt(inner);
                }
                for handler in handlers {
                    let parent = self.current_frame();
                    let scope = self.builder.add_scope(ScopeKind::Handler, parent);
                    self.builder.node_scopes.insert(handler.id, scope);
                    if let Some(name) = &handler.name {
                        let id = self
                            .builder
                            .add_decl(&name.name, DeclKind::Variable, name.span, scope);
                        self.builder.decl_mut(id).type_expr = Some(handler.ty.clone());
                        self.builder.declare(scope, id);
                    }
                    if let Some(body) = &handler.body {
                        self.frames.push(scope);
                        self.visit_stmt(body);
                        self.frames.pop();
                    }
                }
                for inner in else_branch.iter().flatten().chain(statements) {
                    self.visit_stmt(inner);
                }
            }
            _ => visit::walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if let ExprKind::AnonymousMethod(method) = &expr.kind {
            self.collect_anonymous_method(method);
        } else {
            visit::walk_expr(self, expr);
        }
    }

    // Statement walks never reach declarations except through anonymous
    // methods, which are handled above.
    fn visit_type_expr(&mut self, _ty: &TypeExpr) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnosticHandler;
    use crate::module_resolver::UnitMap;
    use crate::syntax::directives::DirectiveOptions;
    use crate::syntax::parse_source;

    fn collect(source: &str) -> (UnitSymbols, CollectingDiagnosticHandler) {
        let handler = CollectingDiagnosticHandler::new();
        let parsed = parse_source(source, &DirectiveOptions::default(), &handler);
        let mut names = UnitNames::new(&[], &UnitMap::new());
        names.register(UnitId(0), "System", Path::new("<builtin>/System.pas"));
        let name = parsed.file.name.dotted();
        names.register(UnitId(1), &name, Path::new("test.pas"));
        let symbols = collect_unit(UnitId(1), &name, Path::new("test.pas"), &parsed.file, &names, &handler);
        (symbols, handler)
    }

    fn lookup<'a>(symbols: &'a UnitSymbols, scope: ScopeId, name: &str) -> Vec<&'a Declaration> {
        symbols
            .scope(scope)
            .lookup(&NameKey::new(name))
            .iter()
            .map(|id| symbols.decl(*id))
            .collect()
    }

    #[test]
    fn test_find_type_by_qualified_name() {
        use crate::symbols::SymbolIndex;
        use std::path::PathBuf;
        use std::sync::Arc;

        let (symbols, handler) = collect(
            "unit Geo.Shapes; interface type\n  TOuter = class\n  type\n    TInner = class end;\n  end;\nimplementation\ntype THidden = class end;\nend.",
        );
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        let system = UnitSymbols::placeholder(
            UnitId(0),
            "System",
            PathBuf::from("<builtin>/System.pas"),
            FileKind::Unit,
        );
        let index = SymbolIndex::new(vec![Arc::new(system), Arc::new(symbols)]);
        let name = |qualified: &str| index.find_type(qualified).map(|id| index.qualified_name(id));
        assert_eq!(name("Geo.Shapes.TOuter").as_deref(), Some("Geo.Shapes.TOuter"));
        assert_eq!(name("geo.shapes.touter.tinner").as_deref(), Some("Geo.Shapes.TOuter.TInner"));
        assert_eq!(name("Geo.Shapes.THidden").as_deref(), Some("Geo.Shapes.THidden"));
        assert_eq!(name("Geo.TOuter"), None);
        assert_eq!(name("TOuter"), None);
    }

    #[test]
    fn test_forward_class_merges_with_full_declaration() {
        let (symbols, handler) = collect(
            "unit A; interface type\n  TFoo = class;\n  TBar = class\n    F: TFoo;\n  end;\n  TFoo = class\n    procedure Run;\n  end;\nimplementation end.",
        );
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        let foo = lookup(&symbols, symbols.interface_scope, "tfoo");
        assert_eq!(foo.len(), 1);
        assert_eq!(foo[0].forward_spans.len(), 1);
        assert_eq!(foo[0].forward_spans[0].line, 2);
        assert_eq!(foo[0].span.line, 6);
    }

    #[test]
    fn test_bodyless_interface_is_its_own_declaration() {
        let (symbols, _) = collect("unit A; interface type\n  IEmpty = interface;\nimplementation end.");
        let empty = lookup(&symbols, symbols.interface_scope, "IEmpty");
        assert_eq!(empty.len(), 1);
        let info = empty[0].type_info.as_ref().map(|i| (i.is_forward, i.is_empty_interface));
        assert_eq!(info, Some((false, true)));
    }

    #[test]
    fn test_duplicate_classes_are_kept_and_reported() {
        let (symbols, handler) = collect(
            "unit A; interface type\n  TFoo = class end;\n  TFoo = class end;\nimplementation end.",
        );
        assert_eq!(lookup(&symbols, symbols.interface_scope, "TFoo").len(), 2);
        let diagnostics = handler.get_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, Some(error_codes::DUPLICATE_DECLARATION));
        assert_eq!(diagnostics[0].span.line, 3);
    }

    #[test]
    fn test_method_body_pairs_with_heading() {
        let (symbols, handler) = collect(
            "unit A; interface type\n  TFoo = class\n    function Get(I: Integer): string;\n  end;\nimplementation\nfunction TFoo.Get(I: Integer): string;\nvar\n  L: Integer;\nbegin\n  L := I;\nend;\nend.",
        );
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        let foo = lookup(&symbols, symbols.interface_scope, "TFoo")[0];
        let members = foo.type_info.as_ref().and_then(|i| i.members);
        let get = members.map(|m| lookup(&symbols, m, "Get")).unwrap_or_default();
        assert_eq!(get.len(), 1);
        let body = get[0].routine.as_ref().and_then(|r| r.body_scope);
        let body = body.map(|b| symbols.scope(b));
        let names: Vec<_> = body
            .map(|b| b.entries().map(|(k, _)| k.as_str().to_string()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["self", "i", "result", "l"]);
    }

    #[test]
    fn test_implementation_without_parameter_list() {
        let (symbols, handler) = collect(
            "unit A; interface\nprocedure Go(X: Integer);\nimplementation\nprocedure Go;\nbegin\n  X := 1;\nend;\nend.",
        );
        assert_eq!(handler.error_count(), 0);
        let go = lookup(&symbols, symbols.interface_scope, "Go");
        assert_eq!(go.len(), 1);
        let body = go[0].routine.as_ref().and_then(|r| r.body_scope);
        let params = body.map(|b| lookup(&symbols, b, "X").len());
        assert_eq!(params, Some(1));
        assert!(lookup(&symbols, symbols.implementation_scope, "Go").is_empty());
    }

    #[test]
    fn test_unmatched_method_implementation() {
        let (_, handler) = collect(
            "unit A; interface type\n  TFoo = class end;\nimplementation\nprocedure TFoo.Missing;\nbegin\nend;\nend.",
        );
        let diagnostics = handler.get_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, Some(error_codes::UNMATCHED_IMPLEMENTATION));
        assert_eq!(diagnostics[0].span.line, 4);
    }

    #[test]
    fn test_overloads_share_a_name() {
        let (symbols, handler) = collect(
            "unit A; interface\nprocedure P(X: Integer); overload;\nprocedure P(X: string); overload;\nimplementation\nprocedure P(X: string);\nbegin\nend;\nprocedure P(X: Integer);\nbegin\nend;\nend.",
        );
        assert_eq!(handler.error_count(), 0);
        let p = lookup(&symbols, symbols.interface_scope, "p");
        assert_eq!(p.len(), 2);
        assert!(p.iter().all(|d| d.routine.as_ref().is_some_and(|r| r.has_body())));
    }

    #[test]
    fn test_inline_variables_get_block_scope() {
        let (symbols, _) = collect(
            "program P;\nbegin\n  var X := 1;\n  for var I := 0 to 2 do\n    X := X + I;\nend.",
        );
        let block = symbols
            .scopes
            .iter()
            .find(|s| s.kind == ScopeKind::Block)
            .map(|s| s.id);
        let x = block.map(|b| lookup(&symbols, b, "X")).unwrap_or_default();
        assert_eq!(x.len(), 1);
        assert!(x[0].visible_from > 0);
        let i = block.map(|b| lookup(&symbols, b, "i")).unwrap_or_default();
        assert_eq!(i.len(), 1);
    }

    #[test]
    fn test_enum_values_visible_in_enclosing_scope() {
        let (symbols, _) = collect("unit A; interface type\n  TColor = (clRed, clBlue);\nimplementation end.");
        let red = lookup(&symbols, symbols.interface_scope, "CLRED");
        assert_eq!(red.len(), 1);
        assert_eq!(red[0].kind, DeclKind::EnumValue);
        let owner = red[0].owner.map(|o| symbols.decl(o).name.as_str());
        assert_eq!(owner, Some("TColor"));
    }

    #[test]
    fn test_unresolved_unit_warning() {
        let (symbols, handler) = collect("unit A; interface uses Vcl.Forms; implementation end.");
        assert_eq!(symbols.uses.len(), 1);
        assert_eq!(symbols.uses[0].unit, None);
        assert_eq!(handler.warning_count(), 1);
    }

    #[test]
    fn test_exception_handler_scope() {
        let (symbols, _) = collect(
            "program P;\nbegin\n  try\n  except\n    on E: Exception do\n      Writeln(E.Message);\n  end;\nend.",
        );
        let handler = symbols.scopes.iter().find(|s| s.kind == ScopeKind::Handler);
        let e = handler.map(|h| lookup(&symbols, h.id, "e").len());
        assert_eq!(e, Some(1));
    }
}
