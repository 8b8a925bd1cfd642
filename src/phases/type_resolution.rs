//! Lazy, per-file resolution of declared types.
//!
//! Declarations keep their type expressions as written. A [`TypeResolver`]
//! turns them into [`TypeId`]s in the arena of the file being analyzed,
//! memoizing every declaration it touches. Cross-unit declarations are
//! resolved the same way against their own scopes, so no type information
//! is shared between workers. Cycles (`TA = TB; TB = TA;`, a class listing
//! itself as ancestor) resolve to `Unknown`.

use super::lookup::ImportUsage;
use crate::symbols::{DeclId, DeclKind, Implicit, ScopeId, SymbolIndex, TypeShape, UnitId};
use crate::syntax::ast::{
    BinaryOp, Expr, ExprKind, Literal, ParamMode, SectionKind, TypeExpr, TypeExprKind,
};
use crate::types::{
    CharKind, ClassHierarchy, IntKind, ProcSignature, RealKind, StringKind, TypeArena, TypeId,
    TypeKind,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Parameter of a routine as seen by overload resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamType {
    pub mode: ParamMode,
    /// `None` for untyped and intrinsic parameters.
    pub ty: Option<TypeId>,
    pub has_default: bool,
}

const MAX_SUBSTITUTION_DEPTH: usize = 16;

pub struct TypeResolver<'a> {
    pub(crate) index: &'a SymbolIndex,
    pub(crate) arena: TypeArena,
    decl_types: FxHashMap<DeclId, TypeId>,
    type_decl_types: FxHashMap<DeclId, TypeId>,
    in_progress: FxHashSet<DeclId>,
    hierarchy_in_progress: FxHashSet<DeclId>,
    /// Unit the resolver was created for; only lookups starting in this
    /// unit count as import usage.
    pub(crate) unit: UnitId,
    pub(crate) section: SectionKind,
    pub(crate) tracking: bool,
    pub(crate) usage: FxHashMap<UnitId, ImportUsage>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(index: &'a SymbolIndex, unit: UnitId) -> Self {
        Self {
            index,
            arena: TypeArena::new(),
            decl_types: FxHashMap::default(),
            type_decl_types: FxHashMap::default(),
            in_progress: FxHashSet::default(),
            hierarchy_in_progress: FxHashSet::default(),
            unit,
            section: SectionKind::Interface,
            tracking: false,
            usage: FxHashMap::default(),
        }
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    /// Give up the arena together with every declaration type and import
    /// usage recorded so far.
    pub(crate) fn finish(self) -> (TypeArena, FxHashMap<DeclId, TypeId>, FxHashMap<UnitId, ImportUsage>) {
        (self.arena, self.decl_types, self.usage)
    }

    /// Run `f` without recording import usage. Lazily resolved
    /// declarations are not references written in the current file.
    fn untracked<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let tracking = std::mem::replace(&mut self.tracking, false);
        let result = f(self);
        self.tracking = tracking;
        result
    }

    pub fn resolve_type_expr(&mut self, ty: &TypeExpr, scope: ScopeId) -> TypeId {
        self.resolve_type_expr_with_decl(ty, scope).0
    }

    /// Resolve a type expression, also returning the declaration a named
    /// type refers to.
    pub fn resolve_type_expr_with_decl(&mut self, ty: &TypeExpr, scope: ScopeId) -> (TypeId, Option<DeclId>) {
        match &ty.kind {
            TypeExprKind::Named { path, args } => {
                let Some(decl) = self.resolve_type_path(path, args.len(), scope) else {
                    return (TypeArena::UNKNOWN, None);
                };
                let args: Vec<TypeId> = args.iter().map(|a| self.resolve_type_expr(a, scope)).collect();
                (self.type_of_type_decl(decl, &args), Some(decl))
            }
            TypeExprKind::String { length } => {
                let kind = if length.is_some() {
                    StringKind::Short
                } else {
                    StringKind::Unicode
                };
                (self.arena.intern(TypeKind::Str(kind)), None)
            }
            TypeExprKind::ClassOf(inner) => {
                let inner = self.resolve_type_expr(inner, scope);
                (self.intern_or_unknown(inner, TypeKind::ClassRef(inner)), None)
            }
            TypeExprKind::Pointer(inner) => {
                let inner = self.resolve_type_expr(inner, scope);
                (self.arena.intern(TypeKind::Pointer(Some(inner))), None)
            }
            TypeExprKind::Array { dims, element } => {
                let element = self.resolve_type_expr(element, scope);
                for dim in dims {
                    self.resolve_type_expr(dim, scope);
                }
                (
                    self.arena.intern(TypeKind::Array {
                        element,
                        dynamic: dims.is_empty(),
                    }),
                    None,
                )
            }
            TypeExprKind::ArrayOfConst => (self.arena.intern(TypeKind::ArrayOfConst), None),
            TypeExprKind::Set(inner) => {
                let inner = self.resolve_type_expr(inner, scope);
                (self.intern_or_unknown(inner, TypeKind::Set(inner)), None)
            }
            TypeExprKind::File(_) => (self.arena.intern(TypeKind::File), None),
            TypeExprKind::Subrange { low, .. } => {
                let base = self.const_expr_type(low, scope);
                (self.intern_or_unknown(base, TypeKind::Subrange(base)), None)
            }
            TypeExprKind::Procedural(proc) => {
                let params = proc
                    .params
                    .iter()
                    .flat_map(|group| {
                        let ty = group
                            .ty
                            .as_ref()
                            .map(|t| self.resolve_type_expr(t, scope))
                            .unwrap_or(TypeArena::UNTYPED);
                        std::iter::repeat((group.mode, ty)).take(group.names.len())
                    })
                    .collect::<Vec<_>>();
                let result = proc.return_type.as_ref().map(|r| self.resolve_type_expr(r, scope));
                let signature = ProcSignature {
                    params,
                    result,
                    of_object: proc.of_object,
                    is_reference: proc.is_reference,
                };
                (self.arena.intern(TypeKind::Procedural(Box::new(signature))), None)
            }
            // Anonymous structured types and enums have no declaration to
            // name them.
            TypeExprKind::Struct(_) | TypeExprKind::Forward(_) | TypeExprKind::Enum(_) => {
                (TypeArena::UNKNOWN, None)
            }
        }
    }

    fn intern_or_unknown(&mut self, inner: TypeId, kind: TypeKind) -> TypeId {
        if self.arena.is_unknown(inner) {
            TypeArena::UNKNOWN
        } else {
            self.arena.intern(kind)
        }
    }

    /// The type a type declaration denotes, instantiated with `args`.
    pub fn type_of_type_decl(&mut self, decl: DeclId, args: &[TypeId]) -> TypeId {
        let d = self.index.decl(decl);
        if d.kind == DeclKind::TypeParameter {
            return self.arena.intern(TypeKind::TypeParam(decl));
        }
        let Some(info) = d.type_info.as_ref() else {
            return TypeArena::UNKNOWN;
        };
        if let Some(intrinsic) = info.intrinsic {
            return self.arena.intern_intrinsic(intrinsic);
        }
        let args = args.to_vec();
        match info.shape {
            TypeShape::Class => {
                self.ensure_hierarchy(decl);
                self.arena.intern(TypeKind::Class { decl, args })
            }
            TypeShape::Interface => {
                self.ensure_hierarchy(decl);
                self.arena.intern(TypeKind::Interface { decl, args })
            }
            TypeShape::Record | TypeShape::Object => self.arena.intern(TypeKind::Record { decl, args }),
            TypeShape::Enum => self.arena.intern(TypeKind::Enum(decl)),
            TypeShape::Intrinsic => TypeArena::UNKNOWN,
            TypeShape::Other => {
                if args.is_empty() {
                    if let Some(ty) = self.type_decl_types.get(&decl) {
                        return *ty;
                    }
                }
                if !self.in_progress.insert(decl) {
                    return TypeArena::UNKNOWN;
                }
                let scope = info.members.unwrap_or(d.scope);
                let strong = info.strong_alias;
                let params = info.type_params.clone();
                let target = match d.type_expr.as_ref() {
                    Some(expr) => self.untracked(|r| r.resolve_type_expr(expr, scope)),
                    None => TypeArena::UNKNOWN,
                };
                let target = if args.is_empty() {
                    target
                } else {
                    self.substitute(target, &params, &args)
                };
                let ty = if strong && !self.arena.is_unknown(target) {
                    self.arena.intern(TypeKind::Alias { decl, target })
                } else {
                    target
                };
                self.in_progress.remove(&decl);
                if args.is_empty() {
                    self.type_decl_types.insert(decl, ty);
                }
                ty
            }
        }
    }

    /// Type of the value a declaration denotes.
    pub fn decl_type(&mut self, decl: DeclId) -> TypeId {
        if let Some(ty) = self.decl_types.get(&decl) {
            return *ty;
        }
        if !self.in_progress.insert(decl) {
            return TypeArena::UNKNOWN;
        }
        let ty = self.untracked(|r| r.compute_decl_type(decl));
        self.in_progress.remove(&decl);
        self.decl_types.insert(decl, ty);
        ty
    }

    /// Record the type of a declaration inferred from its initializer.
    pub fn set_decl_type(&mut self, decl: DeclId, ty: TypeId) {
        self.decl_types.insert(decl, ty);
    }

    fn compute_decl_type(&mut self, decl: DeclId) -> TypeId {
        let d = self.index.decl(decl);
        match d.kind {
            DeclKind::Type => {
                let ty = self.type_of_type_decl(decl, &[]);
                match self.arena.get(ty) {
                    TypeKind::Class { .. } => self.arena.intern(TypeKind::ClassRef(ty)),
                    _ => ty,
                }
            }
            DeclKind::TypeParameter => self.arena.intern(TypeKind::TypeParam(decl)),
            DeclKind::EnumValue => match d.owner {
                Some(owner) => self.type_of_type_decl(owner, &[]),
                None => TypeArena::UNKNOWN,
            },
            DeclKind::Routine => self.routine_type(decl),
            DeclKind::Unit | DeclKind::Label => TypeArena::UNKNOWN,
            DeclKind::Variable
            | DeclKind::Field
            | DeclKind::Parameter
            | DeclKind::Constant
            | DeclKind::Property => {
                if let Some(Implicit::SelfRef { owner, class_method }) = d.implicit {
                    let ty = self.type_of_type_decl(owner, &[]);
                    return if class_method {
                        self.intern_or_unknown(ty, TypeKind::ClassRef(ty))
                    } else {
                        ty
                    };
                }
                if let Some(expr) = d.type_expr.as_ref() {
                    return self.resolve_type_expr(expr, d.scope);
                }
                match d.kind {
                    DeclKind::Property => self.inherited_property_type(decl),
                    DeclKind::Parameter => TypeArena::UNTYPED,
                    _ => match d.value.as_ref() {
                        Some(value) => self.const_expr_type(value, d.scope),
                        None => TypeArena::UNKNOWN,
                    },
                }
            }
        }
    }

    /// Type of a property redeclared without a type (`property Foo;`).
    fn inherited_property_type(&mut self, decl: DeclId) -> TypeId {
        let d = self.index.decl(decl);
        let Some(owner) = d.owner else {
            return TypeArena::UNKNOWN;
        };
        let key = d.key.clone();
        let ancestors = self.hierarchy(owner).ancestors;
        for ancestor in ancestors {
            let found = self.own_members(ancestor, &key);
            if let Some(property) = found
                .into_iter()
                .find(|id| self.index.decl(*id).kind == DeclKind::Property)
            {
                return self.decl_type(property);
            }
        }
        TypeArena::UNKNOWN
    }

    /// Parameter types of a routine, resolved against its signature scope.
    pub fn routine_params(&mut self, decl: DeclId) -> Vec<ParamType> {
        let Some(routine) = self.index.decl(decl).routine.as_ref() else {
            return Vec::new();
        };
        let scope = routine.signature_scope;
        routine
            .params
            .iter()
            .map(|p| ParamType {
                mode: p.mode,
                ty: p
                    .ty
                    .as_ref()
                    .map(|t| self.untracked(|r| r.resolve_type_expr(t, scope))),
                has_default: p.has_default,
            })
            .collect()
    }

    /// Declared result type of a function; `None` for procedures and
    /// intrinsics.
    pub fn routine_result(&mut self, decl: DeclId) -> Option<TypeId> {
        let routine = self.index.decl(decl).routine.as_ref()?;
        let scope = routine.signature_scope;
        let ret = routine.return_type.as_ref()?;
        Some(self.untracked(|r| r.resolve_type_expr(ret, scope)))
    }

    fn routine_type(&mut self, decl: DeclId) -> TypeId {
        let d = self.index.decl(decl);
        let of_object = d.owner.is_some();
        let params = self
            .routine_params(decl)
            .into_iter()
            .map(|p| (p.mode, p.ty.unwrap_or(TypeArena::UNTYPED)))
            .collect();
        let result = self.routine_result(decl);
        self.arena.intern(TypeKind::Procedural(Box::new(ProcSignature {
            params,
            result,
            of_object,
            is_reference: false,
        })))
    }

    /// Ancestry of a class or interface, computed once per arena.
    pub fn hierarchy(&mut self, decl: DeclId) -> ClassHierarchy {
        self.ensure_hierarchy(decl);
        self.arena.hierarchy(decl).cloned().unwrap_or_default()
    }

    pub fn ensure_hierarchy(&mut self, decl: DeclId) {
        if self.arena.has_hierarchy(decl) || !self.hierarchy_in_progress.insert(decl) {
            return;
        }
        let hierarchy = self.untracked(|r| r.compute_hierarchy(decl));
        self.arena.set_hierarchy(decl, hierarchy);
        self.hierarchy_in_progress.remove(&decl);
    }

    fn compute_hierarchy(&mut self, decl: DeclId) -> ClassHierarchy {
        let d = self.index.decl(decl);
        let Some(info) = d.type_info.as_ref() else {
            return ClassHierarchy::default();
        };
        let shape = info.shape;
        let scope = info.members.unwrap_or(d.scope);
        let heritage = info.heritage.clone();

        let mut parent = None;
        let mut interfaces = Vec::new();
        for (position, expr) in heritage.iter().enumerate() {
            let ty = self.resolve_type_expr(expr, scope);
            match self.arena.get(self.arena.underlying(ty)).clone() {
                TypeKind::Class { decl: base, .. } if position == 0 && shape == TypeShape::Class => {
                    parent = Some(base)
                }
                TypeKind::Interface { decl: base, .. } if position == 0 && shape == TypeShape::Interface => {
                    parent = Some(base)
                }
                TypeKind::Interface { decl: iface, .. } => interfaces.push(iface),
                _ => {}
            }
        }
        if parent.is_none() {
            let root = match shape {
                TypeShape::Class => self.index.system_decl("TObject"),
                TypeShape::Interface => self.index.system_decl("IInterface"),
                _ => None,
            };
            parent = root.filter(|root| *root != decl);
        }

        let mut hierarchy = ClassHierarchy::default();
        if let Some(parent) = parent {
            let inherited = self.hierarchy(parent);
            if inherited.ancestors.contains(&decl) {
                // Circular inheritance: keep the chain finite.
                return hierarchy;
            }
            hierarchy.ancestors.push(parent);
            hierarchy.ancestors.extend(inherited.ancestors);
            for iface in interfaces.clone() {
                let ancestry = self.hierarchy(iface);
                push_unique(&mut hierarchy.interfaces, iface);
                for ancestor in ancestry.ancestors {
                    push_unique(&mut hierarchy.interfaces, ancestor);
                }
            }
            for iface in inherited.interfaces {
                push_unique(&mut hierarchy.interfaces, iface);
            }
        } else {
            for iface in interfaces {
                push_unique(&mut hierarchy.interfaces, iface);
            }
        }
        hierarchy
    }

    /// Replace the type parameters `params` by `args` inside `ty`.
    pub fn substitute(&mut self, ty: TypeId, params: &[DeclId], args: &[TypeId]) -> TypeId {
        self.substitute_at(ty, params, args, 0)
    }

    fn substitute_at(&mut self, ty: TypeId, params: &[DeclId], args: &[TypeId], depth: usize) -> TypeId {
        if depth > MAX_SUBSTITUTION_DEPTH || params.is_empty() {
            return ty;
        }
        let sub = |r: &mut Self, t: TypeId| r.substitute_at(t, params, args, depth + 1);
        let kind = match self.arena.get(ty).clone() {
            TypeKind::TypeParam(param) => {
                return params
                    .iter()
                    .position(|p| *p == param)
                    .and_then(|i| args.get(i).copied())
                    .unwrap_or(ty);
            }
            TypeKind::Pointer(Some(inner)) => TypeKind::Pointer(Some(sub(self, inner))),
            TypeKind::ClassRef(inner) => TypeKind::ClassRef(sub(self, inner)),
            TypeKind::Set(inner) => TypeKind::Set(sub(self, inner)),
            TypeKind::Subrange(inner) => TypeKind::Subrange(sub(self, inner)),
            TypeKind::Array { element, dynamic } => TypeKind::Array {
                element: sub(self, element),
                dynamic,
            },
            TypeKind::Class { decl, args: inner } => TypeKind::Class {
                decl,
                args: inner.into_iter().map(|a| sub(self, a)).collect(),
            },
            TypeKind::Interface { decl, args: inner } => TypeKind::Interface {
                decl,
                args: inner.into_iter().map(|a| sub(self, a)).collect(),
            },
            TypeKind::Record { decl, args: inner } => TypeKind::Record {
                decl,
                args: inner.into_iter().map(|a| sub(self, a)).collect(),
            },
            TypeKind::Procedural(signature) => {
                let mut signature = *signature;
                for param in signature.params.iter_mut() {
                    param.1 = sub(self, param.1);
                }
                signature.result = signature.result.map(|r| sub(self, r));
                TypeKind::Procedural(Box::new(signature))
            }
            _ => return ty,
        };
        self.arena.intern(kind)
    }

    /// Apply the type arguments of `owner_type` to a member's type.
    pub fn instantiate_member(&mut self, member_type: TypeId, owner_type: TypeId) -> TypeId {
        let (decl, args) = match self.arena.get(owner_type) {
            TypeKind::Class { decl, args }
            | TypeKind::Interface { decl, args }
            | TypeKind::Record { decl, args }
                if !args.is_empty() =>
            {
                (*decl, args.clone())
            }
            _ => return member_type,
        };
        let params = self
            .index
            .decl(decl)
            .type_info
            .as_ref()
            .map(|i| i.type_params.clone())
            .unwrap_or_default();
        self.substitute(member_type, &params, &args)
    }

    pub fn literal_type(&mut self, literal: &Literal) -> TypeId {
        match literal {
            Literal::Integer(value) => {
                let kind = if i32::try_from(*value).is_ok() {
                    IntKind::Integer
                } else {
                    IntKind::Int64
                };
                self.arena.intern(TypeKind::Int(kind))
            }
            Literal::Real(_) => self.arena.intern(TypeKind::Real(RealKind::Extended)),
            Literal::String(text) if text.chars().count() == 1 => {
                self.arena.intern(TypeKind::Char(CharKind::Wide))
            }
            Literal::String(_) => self.arena.intern(TypeKind::Str(StringKind::Unicode)),
        }
    }

    /// Result type of a binary operator applied to operands of the given
    /// types. `Unknown` operands give `Unknown`.
    pub fn binary_type(&mut self, op: BinaryOp, lhs: TypeId, rhs: TypeId) -> TypeId {
        if op.is_comparison() {
            return TypeArena::BOOLEAN;
        }
        if self.arena.is_unknown(lhs) || self.arena.is_unknown(rhs) {
            return TypeArena::UNKNOWN;
        }
        let l = self.arena.get(self.arena.underlying(lhs)).clone();
        let r = self.arena.get(self.arena.underlying(rhs)).clone();
        match op {
            BinaryOp::As => rhs,
            BinaryOp::Divide => self.arena.intern(TypeKind::Real(RealKind::Extended)),
            BinaryOp::IntDiv | BinaryOp::Mod | BinaryOp::Shl | BinaryOp::Shr => lhs,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => match l {
                TypeKind::Boolean => TypeArena::BOOLEAN,
                _ => lhs,
            },
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (l, r) {
                (TypeKind::Int(a), TypeKind::Int(b)) => {
                    let wide = |k: IntKind| matches!(k, IntKind::Int64 | IntKind::UInt64);
                    let kind = if wide(a) || wide(b) {
                        IntKind::Int64
                    } else if a == b {
                        a
                    } else {
                        IntKind::Integer
                    };
                    self.arena.intern(TypeKind::Int(kind))
                }
                (TypeKind::Real(a), TypeKind::Real(b)) => {
                    let kind = if a.widens_to(b) { b } else { a };
                    self.arena.intern(TypeKind::Real(kind))
                }
                (TypeKind::Real(_), TypeKind::Int(_)) => lhs,
                (TypeKind::Int(_), TypeKind::Real(_)) => rhs,
                (TypeKind::Str(a), TypeKind::Str(b)) => {
                    let kind = if a == b { a } else { StringKind::Unicode };
                    self.arena.intern(TypeKind::Str(kind))
                }
                (TypeKind::Str(kind), TypeKind::Char(_)) | (TypeKind::Char(_), TypeKind::Str(kind)) => {
                    self.arena.intern(TypeKind::Str(kind))
                }
                (TypeKind::Char(_), TypeKind::Char(_)) => {
                    self.arena.intern(TypeKind::Str(StringKind::Unicode))
                }
                (TypeKind::Set(_), _) => lhs,
                (TypeKind::Pointer(_), TypeKind::Int(_)) => lhs,
                (TypeKind::Variant, _) | (_, TypeKind::Variant) => {
                    self.arena.intern(TypeKind::Variant)
                }
                _ => TypeArena::UNKNOWN,
            },
            _ => TypeArena::UNKNOWN,
        }
    }

    /// Type of a constant expression in a declaration, without recording
    /// any references.
    pub fn const_expr_type(&mut self, expr: &Expr, scope: ScopeId) -> TypeId {
        match &expr.kind {
            ExprKind::Literal(literal) => self.literal_type(literal),
            ExprKind::Nil => TypeArena::NIL,
            ExprKind::Paren(inner) => self.const_expr_type(inner, scope),
            ExprKind::Unary { operand, .. } => self.const_expr_type(operand, scope),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.const_expr_type(lhs, scope);
                let r = self.const_expr_type(rhs, scope);
                self.binary_type(*op, l, r)
            }
            ExprKind::SetConstructor(elements) => match elements.first() {
                Some(first) => {
                    let element = self.const_expr_type(first, scope);
                    self.intern_or_unknown(element, TypeKind::Set(element))
                }
                None => TypeArena::UNKNOWN,
            },
            ExprKind::Range { low, .. } => self.const_expr_type(low, scope),
            ExprKind::Name(ident) => {
                let key = crate::symbols::NameKey::new(&ident.name);
                let found = self.untracked(|r| r.lookup_name(scope, &key, usize::MAX));
                match found.as_ref().map(|hit| hit.decls.as_slice()) {
                    Some([single]) => self.decl_type(*single),
                    _ => TypeArena::UNKNOWN,
                }
            }
            ExprKind::Call { callee, args } if args.len() == 1 => {
                // Value cast such as `Byte(1)`.
                match &callee.kind {
                    ExprKind::Name(ident) => {
                        let path = [ident.clone()];
                        match self.untracked(|r| r.resolve_type_path(&path, 0, scope)) {
                            Some(decl) => self.type_of_type_decl(decl, &[]),
                            None => TypeArena::UNKNOWN,
                        }
                    }
                    _ => TypeArena::UNKNOWN,
                }
            }
            _ => TypeArena::UNKNOWN,
        }
    }
}

fn push_unique(list: &mut Vec<DeclId>, decl: DeclId) {
    if !list.contains(&decl) {
        list.push(decl);
    }
}
