//! Resolution phase: reference binding and expression typing (pass 2)
//!
//! This phase handles:
//! - Binding every name, member access and named type to one declaration
//!   or to `Unknown`
//! - Typing expressions, including implicit calls of parameterless
//!   functions and value casts (`TFoo(X)`)
//! - `with` statements, `Self`, `inherited` and `Result`
//! - Overload selection at call sites
//! - Inferring the type of inline variables declared without one
//! - Recording how each used unit is referenced
//!
//! A miss stops the chain: once a segment of `A.B.C` is `Unknown`, every
//! segment to its right is `Unknown` as well.

use super::lookup::ImportUsage;
use super::overload::{self, Candidate, Selection};
use super::type_resolution::TypeResolver;
use crate::symbols::{
    DeclId, DeclKind, IntrinsicResult, NameKey, ScopeId, SymbolIndex, UnitId, UnitSymbols,
};
use crate::syntax::ast::*;
use crate::types::{CharKind, IntKind, ProcSignature, TypeArena, TypeId, TypeKind};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, instrument};

/// What a reference node resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Binding {
    Decl(DeclId),
    Unknown,
}

/// Resolution results for one file. Immutable once built.
#[derive(Debug)]
pub struct Resolution {
    /// `Name`, `Member`, `Generic`, `Inherited` expressions and named type
    /// expressions.
    pub refs: FxHashMap<NodeId, Binding>,
    pub expr_types: FxHashMap<NodeId, TypeId>,
    /// Call nodes that are value casts, with the target type.
    pub casts: FxHashMap<NodeId, TypeId>,
    /// Routine references evaluated as calls without an argument list.
    pub implicit_calls: FxHashSet<NodeId>,
    pub decl_types: FxHashMap<DeclId, TypeId>,
    pub import_usage: FxHashMap<UnitId, ImportUsage>,
    pub arena: TypeArena,
}

impl Resolution {
    pub fn binding(&self, node: NodeId) -> Option<Binding> {
        self.refs.get(&node).copied()
    }

    /// Declaration a node is bound to, if it is bound to one.
    pub fn decl(&self, node: NodeId) -> Option<DeclId> {
        match self.refs.get(&node) {
            Some(Binding::Decl(decl)) => Some(*decl),
            _ => None,
        }
    }

    pub fn type_of(&self, node: NodeId) -> Option<TypeId> {
        self.expr_types.get(&node).copied()
    }

    pub fn decl_type(&self, decl: DeclId) -> Option<TypeId> {
        self.decl_types.get(&decl).copied()
    }

    pub fn cast_target(&self, node: NodeId) -> Option<TypeId> {
        self.casts.get(&node).copied()
    }

    pub fn is_implicit_call(&self, node: NodeId) -> bool {
        self.implicit_calls.contains(&node)
    }

    pub fn import_usage(&self, unit: UnitId) -> ImportUsage {
        self.import_usage.get(&unit).copied().unwrap_or_default()
    }

    pub fn bound_count(&self) -> usize {
        self.refs.values().filter(|b| matches!(b, Binding::Decl(_))).count()
    }

    pub fn unknown_count(&self) -> usize {
        self.refs.values().filter(|b| matches!(b, Binding::Unknown)).count()
    }
}

/// Resolve every reference of one file against the published index.
#[instrument(skip(index, file), fields(unit = %index.unit(unit).name))]
pub fn resolve_unit(index: &SymbolIndex, unit: UnitId, file: &SourceFile) -> Resolution {
    let symbols = index.unit(unit);
    let mut walker = Walker::new(index, symbols);

    if let Some(section) = &file.interface {
        walker.section(section, symbols.interface_scope);
    }
    if let Some(section) = &file.implementation {
        walker.section(section, symbols.implementation_scope);
    }
    walker.types.section = if file.kind == FileKind::Unit {
        SectionKind::Implementation
    } else {
        SectionKind::Main
    };
    for block in [&file.initialization, &file.finalization, &file.main_block]
        .into_iter()
        .flatten()
    {
        walker.scope = symbols.implementation_scope;
        walker.block(block);
    }

    let resolution = walker.finish();
    debug!(
        bound = resolution.bound_count(),
        unknown = resolution.unknown_count(),
        "resolved unit"
    );
    resolution
}

/// What an expression denotes before it is used as a value.
#[derive(Debug, Clone)]
enum Denot {
    Value(TypeId),
    Type(TypeId),
    /// Routines awaiting overload selection; bound once the call site is
    /// known.
    Routines { decls: Vec<DeclId>, receiver: Option<TypeId> },
    /// Indexed property used without its index yet.
    ArrayProperty { decl: DeclId, receiver: Option<TypeId> },
    Unit(UnitId),
    /// Leading segments of a dotted unit name (`Vcl` in `Vcl.Forms`).
    Namespace(String),
    Unknown,
}

struct Walker<'a> {
    types: TypeResolver<'a>,
    index: &'a SymbolIndex,
    symbols: &'a UnitSymbols,
    scope: ScopeId,
    with_stack: Vec<TypeId>,
    /// Enclosing routines with a body, innermost last.
    routines: Vec<DeclId>,
    refs: FxHashMap<NodeId, Binding>,
    expr_types: FxHashMap<NodeId, TypeId>,
    casts: FxHashMap<NodeId, TypeId>,
    implicit_calls: FxHashSet<NodeId>,
}

impl<'a> Walker<'a> {
    fn new(index: &'a SymbolIndex, symbols: &'a UnitSymbols) -> Self {
        let mut types = TypeResolver::new(index, symbols.id);
        types.tracking = true;
        Self {
            types,
            index,
            symbols,
            scope: symbols.interface_scope,
            with_stack: Vec::new(),
            routines: Vec::new(),
            refs: FxHashMap::default(),
            expr_types: FxHashMap::default(),
            casts: FxHashMap::default(),
            implicit_calls: FxHashSet::default(),
        }
    }

    fn finish(mut self) -> Resolution {
        let symbols = self.symbols;
        for decl in &symbols.decls {
            if decl.kind.is_value() {
                self.types.decl_type(decl.id);
            }
        }
        let (arena, decl_types, import_usage) = self.types.finish();
        Resolution {
            refs: self.refs,
            expr_types: self.expr_types,
            casts: self.casts,
            implicit_calls: self.implicit_calls,
            decl_types,
            import_usage,
            arena,
        }
    }

    fn bind(&mut self, node: NodeId, decl: DeclId) {
        self.refs.insert(node, Binding::Decl(decl));
    }

    fn bind_unknown(&mut self, node: NodeId) {
        self.refs.insert(node, Binding::Unknown);
    }

    // ----- declarations -----

    fn section(&mut self, section: &Section, scope: ScopeId) {
        self.types.section = section.kind;
        self.scope = scope;
        self.decls(&section.decls);
    }

    fn decls(&mut self, decls: &[Decl]) {
        for decl in decls {
            match decl {
                Decl::Types(types) => {
                    for ty in types {
                        self.type_decl(ty);
                    }
                }
                Decl::Consts(consts) => self.consts(consts),
                Decl::Vars(vars) => {
                    for var in vars {
                        self.type_expr(&var.ty);
                        if let Some(init) = &var.init {
                            self.value(init);
                        }
                    }
                }
                Decl::Routine(routine) => self.routine(routine),
                Decl::Labels(_) => {}
            }
        }
    }

    fn consts(&mut self, consts: &[ConstDecl]) {
        for constant in consts {
            if let Some(ty) = &constant.ty {
                self.type_expr(ty);
            }
            self.value(&constant.value);
        }
    }

    fn type_decl(&mut self, decl: &TypeDecl) {
        let index = self.index;
        let members = self
            .symbols
            .node_decls
            .get(&decl.id)
            .and_then(|id| index.decl(*id).type_info.as_ref())
            .and_then(|info| info.members);
        let saved = self.scope;
        if let Some(members) = members {
            self.scope = members;
        }
        for param in &decl.type_params {
            for constraint in &param.constraints {
                self.type_expr(constraint);
            }
        }
        match &decl.ty.kind {
            TypeExprKind::Struct(structure) => self.struct_type(structure),
            TypeExprKind::Forward(_) => {}
            TypeExprKind::Enum(values) => {
                for value in values.iter().filter_map(|v| v.value.as_ref()) {
                    self.value(value);
                }
            }
            _ => {
                self.type_expr(&decl.ty);
            }
        }
        self.scope = saved;
    }

    fn struct_type(&mut self, structure: &StructType) {
        for ty in structure.heritage.iter().chain(&structure.helper_for) {
            self.type_expr(ty);
        }
        for (member, _) in structure.members() {
            match member {
                Member::Field(field) => {
                    self.type_expr(&field.ty);
                }
                Member::Method(routine) => self.routine(routine),
                Member::Property(property) => {
                    for ty in property.params.iter().filter_map(|g| g.ty.as_ref()) {
                        self.type_expr(ty);
                    }
                    if let Some(ty) = &property.ty {
                        self.type_expr(ty);
                    }
                    for accessor in property.read.iter().chain(&property.write) {
                        self.accessor(accessor);
                    }
                }
                Member::Types(types) => {
                    for ty in types {
                        self.type_decl(ty);
                    }
                }
                Member::Consts(consts) => self.consts(consts),
            }
        }
        if let Some(variant) = &structure.variant {
            self.variant(variant);
        }
    }

    fn variant(&mut self, variant: &VariantPart) {
        self.type_expr(&variant.tag_type);
        for case in &variant.cases {
            for label in &case.labels {
                self.value(label);
            }
            for field in &case.fields {
                self.type_expr(&field.ty);
            }
            if let Some(nested) = &case.nested {
                self.variant(nested);
            }
        }
    }

    /// `read`/`write` specifiers name a field or method without calling it.
    fn accessor(&mut self, expr: &Expr) {
        match self.denote_recorded(expr) {
            Denot::Routines { decls, .. } => match decls.as_slice() {
                [only] => self.bind(expr.id, *only),
                _ => self.bind_unknown(expr.id),
            },
            _ => {}
        }
    }

    fn routine(&mut self, routine: &RoutineDecl) {
        let index = self.index;
        let decl = self.symbols.node_decls.get(&routine.id).copied();
        let saved = self.scope;
        if let Some(info) = decl.and_then(|d| index.decl(d).routine.as_ref()) {
            self.scope = info.signature_scope;
        }
        for group in &routine.heading.params {
            if let Some(ty) = &group.ty {
                self.type_expr(ty);
            }
            if let Some(default) = &group.default {
                self.value(default);
            }
        }
        if let Some(ty) = &routine.heading.return_type {
            self.type_expr(ty);
        }

        if let Some(body) = &routine.body {
            if let Some(scope) = self.symbols.node_scopes.get(&routine.id) {
                self.scope = *scope;
            }
            let outer_with = std::mem::take(&mut self.with_stack);
            self.routines.extend(decl);
            self.decls(&body.decls);
            if !body.is_asm {
                self.block(&body.block);
            }
            if decl.is_some() {
                self.routines.pop();
            }
            self.with_stack = outer_with;
        }
        self.scope = saved;
    }

    fn type_expr(&mut self, ty: &TypeExpr) -> TypeId {
        match &ty.kind {
            TypeExprKind::Named { args, .. } => {
                for arg in args {
                    self.type_expr(arg);
                }
            }
            TypeExprKind::ClassOf(inner) | TypeExprKind::Pointer(inner) | TypeExprKind::Set(inner) => {
                self.type_expr(inner);
            }
            TypeExprKind::Array { dims, element } => {
                for dim in dims {
                    self.type_expr(dim);
                }
                self.type_expr(element);
            }
            TypeExprKind::File(Some(inner)) => {
                self.type_expr(inner);
            }
            TypeExprKind::Subrange { low, high } => {
                self.value(low);
                self.value(high);
            }
            TypeExprKind::Procedural(proc) => {
                for param in proc.params.iter().filter_map(|g| g.ty.as_ref()) {
                    self.type_expr(param);
                }
                if let Some(ret) = &proc.return_type {
                    self.type_expr(ret);
                }
            }
            TypeExprKind::Enum(values) => {
                for value in values.iter().filter_map(|v| v.value.as_ref()) {
                    self.value(value);
                }
            }
            TypeExprKind::Struct(structure) => self.struct_type(structure),
            TypeExprKind::String { .. }
            | TypeExprKind::Forward(_)
            | TypeExprKind::ArrayOfConst
            | TypeExprKind::File(None) => {}
        }

        let (resolved, decl) = self.types.resolve_type_expr_with_decl(ty, self.scope);
        if let TypeExprKind::Named { .. } = ty.kind {
            match decl {
                Some(decl) => self.bind(ty.id, decl),
                None => self.bind_unknown(ty.id),
            }
        }
        self.expr_types.insert(ty.id, resolved);
        resolved
    }

    // ----- statements -----

    fn block(&mut self, block: &Block) {
        let saved = self.scope;
        if let Some(scope) = self.symbols.node_scopes.get(&block.id) {
            self.scope = *scope;
        }
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.scope = saved;
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Empty | StmtKind::Asm | StmtKind::Goto(_) => {}
            StmtKind::Compound(block) => self.block(block),
            StmtKind::Assign { target, value } => {
                self.value(target);
                self.value(value);
            }
            StmtKind::Expr(expr) => {
                self.value(expr);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.value(cond);
                for branch in then_branch.iter().chain(else_branch) {
                    self.stmt(branch);
                }
            }
            StmtKind::Case {
                selector,
                arms,
                else_branch,
            } => {
                self.value(selector);
                for arm in arms {
                    for label in &arm.labels {
                        self.value(label);
                    }
                    self.stmt(&arm.body);
                }
                if let Some(stmts) = else_branch {
                    self.stmts(stmts);
                }
            }
            StmtKind::While { cond, body } => {
                self.value(cond);
                self.stmt(body);
            }
            StmtKind::Repeat { body, cond } => {
                self.stmts(body);
                self.value(cond);
            }
            StmtKind::For {
                target,
                from,
                to,
                body,
                ..
            } => {
                let from_type = self.value(from);
                self.value(to);
                self.for_target(target, from_type);
                self.stmt(body);
            }
            StmtKind::ForIn {
                target,
                collection,
                body,
            } => {
                let collection_type = self.value(collection);
                let element = self.element_type(collection_type);
                self.for_target(target, element);
                self.stmt(body);
            }
            StmtKind::With { objects, body } => {
                let depth = self.with_stack.len();
                for object in objects {
                    let ty = self.value(object);
                    self.with_stack.push(ty);
                }
                self.stmt(body);
                self.with_stack.truncate(depth);
            }
            StmtKind::Try { body, handler } => {
                self.stmts(body);
                match handler {
                    TryHandler::Finally(stmts) => self.stmts(stmts),
                    TryHandler::Except {
                        handlers,
                        else_branch,
                        statements,
                    } => {
                        for handler in handlers {
                            self.except_handler(handler);
                        }
                        if let Some(stmts) = else_branch {
                            self.stmts(stmts);
                        }
                        self.stmts(statements);
                    }
                }
            }
            StmtKind::Raise { exception, at } => {
                for expr in exception.iter().chain(at) {
                    self.value(expr);
                }
            }
            StmtKind::Labeled { stmt, .. } => self.stmt(stmt),
            StmtKind::InlineVar(var) => self.inline_var(var, None),
        }
    }

    fn except_handler(&mut self, handler: &ExceptHandler) {
        let ty = self.type_expr(&handler.ty);
        let saved = self.scope;
        if let Some(scope) = self.symbols.node_scopes.get(&handler.id) {
            self.scope = *scope;
            if let Some(name) = &handler.name {
                if let Some(decl) = self.local_decl(name) {
                    self.types.set_decl_type(decl, ty);
                }
            }
        }
        if let Some(body) = &handler.body {
            self.stmt(body);
        }
        self.scope = saved;
    }

    fn for_target(&mut self, target: &ForTarget, element: TypeId) {
        match target {
            ForTarget::Existing(expr) => {
                self.value(expr);
            }
            ForTarget::Inline(var) => self.inline_var(var, Some(element)),
        }
    }

    /// Inline declarations take their type from the declaration, else from
    /// the initializer or the loop they control.
    fn inline_var(&mut self, var: &InlineVar, inferred: Option<TypeId>) {
        let init = var.init.as_ref().map(|init| self.value(init));
        let declared = var.ty.as_ref().map(|ty| self.type_expr(ty));
        if declared.is_some() {
            return;
        }
        let Some(ty) = init.or(inferred) else {
            return;
        };
        for name in &var.names {
            if let Some(decl) = self.local_decl(name) {
                self.types.set_decl_type(decl, ty);
            }
        }
    }

    /// Declaration introduced by `name` in the current scope chain.
    fn local_decl(&self, name: &Ident) -> Option<DeclId> {
        let key = NameKey::new(&name.name);
        let mut current = Some(self.scope);
        while let Some(id) = current {
            let scope = self.index.scope(id);
            if let Some(decl) = scope
                .lookup(&key)
                .iter()
                .copied()
                .find(|d| self.index.decl(*d).span == name.span)
            {
                return Some(decl);
            }
            current = scope.parent;
        }
        None
    }

    /// Element type produced by `for X in Collection`.
    fn element_type(&mut self, collection: TypeId) -> TypeId {
        let arena = &self.types.arena;
        match arena.get(arena.underlying(collection)).clone() {
            TypeKind::Array { element, .. } => element,
            TypeKind::Set(element) => element,
            TypeKind::Str(kind) => self.char_of(kind.is_ansi()),
            TypeKind::Class { .. } | TypeKind::Interface { .. } | TypeKind::Record { .. } => {
                self.enumerator_current(collection)
            }
            _ => TypeArena::UNKNOWN,
        }
    }

    /// `GetEnumerator.Current` of an enumerable type.
    fn enumerator_current(&mut self, collection: TypeId) -> TypeId {
        let Some(owner) = self.types.member_owner(collection) else {
            return TypeArena::UNKNOWN;
        };
        let routines = self.types.lookup_member(owner, &NameKey::new("GetEnumerator"));
        let candidates = self.candidates(&routines, Some(collection));
        let Selection::Unique(get_enumerator) = overload::select(&self.types.arena, &candidates, &[]) else {
            return TypeArena::UNKNOWN;
        };
        let enumerator = self.call_result(get_enumerator, Some(collection), &[]);
        let Some(enumerator_owner) = self.types.member_owner(enumerator) else {
            return TypeArena::UNKNOWN;
        };
        let current = self.types.lookup_member(enumerator_owner, &NameKey::new("Current"));
        match current.as_slice() {
            [only] => self.member_type(*only, Some(enumerator)),
            _ => TypeArena::UNKNOWN,
        }
    }

    fn char_of(&mut self, ansi: bool) -> TypeId {
        let kind = if ansi { CharKind::Ansi } else { CharKind::Wide };
        self.types.arena.intern(TypeKind::Char(kind))
    }

    // ----- expressions -----

    /// Type an expression used as a value and record it.
    fn value(&mut self, expr: &Expr) -> TypeId {
        let denoted = self.denote(expr);
        let ty = self.finish_value(expr.id, denoted);
        self.expr_types.insert(expr.id, ty);
        ty
    }

    /// Denote an expression in callee or qualifier position, recording its
    /// type when it already is a value or a type.
    fn denote_recorded(&mut self, expr: &Expr) -> Denot {
        let denoted = self.denote(expr);
        match &denoted {
            Denot::Value(ty) => {
                self.expr_types.insert(expr.id, *ty);
            }
            Denot::Type(ty) => {
                let value = self.type_value(*ty);
                self.expr_types.insert(expr.id, value);
            }
            _ => {}
        }
        denoted
    }

    /// A class type name used as a value is a class reference.
    fn type_value(&mut self, ty: TypeId) -> TypeId {
        match self.types.arena.get(ty) {
            TypeKind::Class { .. } => self.types.arena.intern(TypeKind::ClassRef(ty)),
            _ => ty,
        }
    }

    fn finish_value(&mut self, node: NodeId, denoted: Denot) -> TypeId {
        match denoted {
            Denot::Value(ty) => ty,
            Denot::Type(ty) => self.type_value(ty),
            Denot::Routines { decls, receiver } => {
                let candidates = self.candidates(&decls, receiver);
                match overload::select(&self.types.arena, &candidates, &[]) {
                    Selection::Unique(routine) => {
                        self.bind(node, routine);
                        self.implicit_calls.insert(node);
                        self.call_result(routine, receiver, &[])
                    }
                    // A routine that needs arguments, used as a procedural value.
                    _ if decls.len() == 1 => {
                        self.bind(node, decls[0]);
                        self.types.decl_type(decls[0])
                    }
                    _ => {
                        self.bind_unknown(node);
                        TypeArena::UNKNOWN
                    }
                }
            }
            Denot::ArrayProperty { decl, receiver } => self.member_type(decl, receiver),
            Denot::Unit(_) | Denot::Unknown => TypeArena::UNKNOWN,
            Denot::Namespace(_) => {
                self.bind_unknown(node);
                TypeArena::UNKNOWN
            }
        }
    }

    fn denote(&mut self, expr: &Expr) -> Denot {
        match &expr.kind {
            ExprKind::Name(ident) => self.name(expr.id, ident, expr.span.start),
            ExprKind::Member { object, member } => self.member(expr, object, member),
            ExprKind::Generic { base, args } => self.generic(expr, base, args),
            ExprKind::Call { callee, args } => Denot::Value(self.call(expr, callee, args)),
            ExprKind::Index { object, indices } => self.index_expr(object, indices),
            ExprKind::Deref(inner) => {
                let ty = self.value(inner);
                let arena = &self.types.arena;
                match arena.get(arena.underlying(ty)) {
                    TypeKind::Pointer(Some(target)) => Denot::Value(*target),
                    _ => Denot::Value(TypeArena::UNKNOWN),
                }
            }
            ExprKind::AddressOf(inner) => {
                self.address_of(inner);
                Denot::Value(self.types.arena.intern(TypeKind::Pointer(None)))
            }
            ExprKind::Unary { operand, .. } => Denot::Value(self.value(operand)),
            ExprKind::Binary { op, lhs, rhs } => Denot::Value(self.binary(*op, lhs, rhs)),
            ExprKind::Paren(inner) => Denot::Value(self.value(inner)),
            ExprKind::Literal(literal) => Denot::Value(self.types.literal_type(literal)),
            ExprKind::Nil => Denot::Value(TypeArena::NIL),
            ExprKind::SetConstructor(elements) => {
                let element_types: Vec<TypeId> = elements.iter().map(|e| self.value(e)).collect();
                match element_types.first() {
                    Some(first) if !self.types.arena.is_unknown(*first) => {
                        Denot::Value(self.types.arena.intern(TypeKind::Set(*first)))
                    }
                    _ => Denot::Value(TypeArena::UNKNOWN),
                }
            }
            ExprKind::Range { low, high } => {
                let ty = self.value(low);
                self.value(high);
                Denot::Value(ty)
            }
            ExprKind::Inherited(name) => self.inherited(expr.id, name.as_ref()),
            ExprKind::AnonymousMethod(method) => Denot::Value(self.anonymous_method(method)),
            ExprKind::Tuple(items) => {
                for item in items {
                    self.value(item);
                }
                Denot::Value(TypeArena::UNKNOWN)
            }
            ExprKind::RecordLiteral(fields) => {
                for (_, value) in fields {
                    self.value(value);
                }
                Denot::Value(TypeArena::UNKNOWN)
            }
            ExprKind::Error => Denot::Unknown,
        }
    }

    fn name(&mut self, node: NodeId, ident: &Ident, offset: usize) -> Denot {
        let key = NameKey::new(&ident.name);

        for position in (0..self.with_stack.len()).rev() {
            let ty = self.with_stack[position];
            if self.types.arena.is_unknown(ty) {
                // Any name could be a member of an unresolved `with` object.
                self.bind_unknown(node);
                return Denot::Unknown;
            }
            if let Some(owner) = self.types.member_owner(ty) {
                let found = self.types.lookup_member(owner, &key);
                if !found.is_empty() {
                    return self.classify(node, &found, Some(ty));
                }
            }
        }

        if let Some(hit) = self.types.lookup_name(self.scope, &key, offset) {
            return self.classify(node, &hit.decls, None);
        }
        if let Some(unit) = self.types.unit_qualifier(self.symbols.id, &ident.name) {
            self.types.record_usage(unit, true);
            self.bind(node, DeclId::new(unit, 0));
            return Denot::Unit(unit);
        }
        if self.is_namespace_prefix(&ident.name) {
            return Denot::Namespace(ident.name.clone());
        }
        self.bind_unknown(node);
        Denot::Unknown
    }

    /// Whether `dotted` starts the name of a used unit.
    fn is_namespace_prefix(&self, dotted: &str) -> bool {
        let prefix = format!("{}.", NameKey::new(dotted).as_str());
        self.symbols.uses.iter().any(|entry| {
            NameKey::new(&entry.name).as_str().starts_with(&prefix)
                || entry
                    .unit
                    .is_some_and(|u| self.index.unit(u).key.as_str().starts_with(&prefix))
        })
    }

    /// Turn the declarations a name resolved to into a denotation, binding
    /// the node unless overload selection has to wait for the call.
    fn classify(&mut self, node: NodeId, decls: &[DeclId], receiver: Option<TypeId>) -> Denot {
        let index = self.index;
        if decls.is_empty() {
            self.bind_unknown(node);
            return Denot::Unknown;
        }
        if decls.iter().all(|d| index.decl(*d).is_routine()) {
            return Denot::Routines {
                decls: decls.to_vec(),
                receiver,
            };
        }
        let [single] = decls else {
            self.bind_unknown(node);
            return Denot::Unknown;
        };
        let decl = index.decl(*single);
        self.bind(node, *single);
        match decl.kind {
            DeclKind::Type | DeclKind::TypeParameter => {
                Denot::Type(self.types.type_of_type_decl(*single, &[]))
            }
            DeclKind::Unit => Denot::Unit(single.unit),
            DeclKind::Property if !decl.property_params.is_empty() => Denot::ArrayProperty {
                decl: *single,
                receiver,
            },
            _ => Denot::Value(self.member_type(*single, receiver)),
        }
    }

    /// Type of a declaration seen through a (possibly generic) receiver.
    fn member_type(&mut self, decl: DeclId, receiver: Option<TypeId>) -> TypeId {
        let ty = self.types.decl_type(decl);
        match receiver {
            Some(receiver) => {
                let object = self.receiver_object(receiver);
                self.types.instantiate_member(ty, object)
            }
            None => ty,
        }
    }

    fn receiver_object(&self, receiver: TypeId) -> TypeId {
        match self.types.arena.get(receiver) {
            TypeKind::ClassRef(inner) => *inner,
            _ => receiver,
        }
    }

    fn member(&mut self, expr: &Expr, object: &Expr, member: &Ident) -> Denot {
        let key = NameKey::new(&member.name);
        match self.denote_recorded(object) {
            Denot::Unit(unit) => {
                if let Some(longer) = self.longer_unit(expr, unit) {
                    return longer;
                }
                self.types.record_usage(unit, true);
                let found = self.index.exported(unit, &member.name).to_vec();
                self.classify(expr.id, &found, None)
            }
            Denot::Namespace(prefix) => {
                let dotted = format!("{}.{}", prefix, member.name);
                if let Some(unit) = self.types.unit_qualifier(self.symbols.id, &dotted) {
                    self.types.record_usage(unit, true);
                    self.bind(expr.id, DeclId::new(unit, 0));
                    Denot::Unit(unit)
                } else if self.is_namespace_prefix(&dotted) {
                    Denot::Namespace(dotted)
                } else {
                    self.bind_unknown(expr.id);
                    Denot::Unknown
                }
            }
            Denot::Type(ty) => {
                let receiver = self.type_value(ty);
                self.member_of_value(expr.id, receiver, &key)
            }
            denoted @ Denot::Routines { .. } => {
                let ty = self.finish_value(object.id, denoted);
                self.expr_types.insert(object.id, ty);
                self.member_of_value(expr.id, ty, &key)
            }
            Denot::Value(ty) => self.member_of_value(expr.id, ty, &key),
            Denot::ArrayProperty { .. } | Denot::Unknown => {
                self.bind_unknown(expr.id);
                Denot::Unknown
            }
        }
    }

    /// `System.SysUtils` written as `Name.Member` where `System` alone is
    /// also a unit: the longer unit name wins.
    fn longer_unit(&mut self, expr: &Expr, shorter: UnitId) -> Option<Denot> {
        let path = expr.name_path()?;
        let dotted = path
            .iter()
            .map(|ident| ident.name.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let unit = self
            .types
            .unit_qualifier(self.symbols.id, &dotted)
            .filter(|unit| *unit != shorter)?;
        self.types.record_usage(unit, true);
        self.bind(expr.id, DeclId::new(unit, 0));
        Some(Denot::Unit(unit))
    }

    fn member_of_value(&mut self, node: NodeId, ty: TypeId, key: &NameKey) -> Denot {
        if self.types.arena.is_unknown(ty) {
            self.bind_unknown(node);
            return Denot::Unknown;
        }
        match self.types.member_owner(ty) {
            Some(owner) => {
                let found = self.types.lookup_member(owner, key);
                self.classify(node, &found, Some(ty))
            }
            None => {
                self.bind_unknown(node);
                Denot::Unknown
            }
        }
    }

    fn generic(&mut self, expr: &Expr, base: &Expr, args: &[TypeExpr]) -> Denot {
        let arg_types: Vec<TypeId> = args.iter().map(|arg| self.type_expr(arg)).collect();
        if let Some(path) = base.name_path() {
            let path: Vec<Ident> = path.into_iter().cloned().collect();
            if let Some(decl) = self.types.resolve_type_path(&path, args.len(), self.scope) {
                self.bind(base.id, decl);
                self.bind(expr.id, decl);
                let ty = self.types.type_of_type_decl(decl, &arg_types);
                return Denot::Type(ty);
            }
        }
        // Explicitly instantiated generic routine.
        self.denote_recorded(base)
    }

    fn call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> TypeId {
        let callee_denot = self.denote_recorded(callee);
        let arg_types: Vec<TypeId> = args.iter().map(|arg| self.value(arg)).collect();

        match callee_denot {
            Denot::Type(ty) if args.len() == 1 => {
                self.casts.insert(expr.id, ty);
                ty
            }
            Denot::Routines { decls, receiver } => {
                let candidates = self.candidates(&decls, receiver);
                match overload::select(&self.types.arena, &candidates, &arg_types) {
                    Selection::Unique(routine) => {
                        self.bind(callee.id, routine);
                        self.call_result(routine, receiver, &arg_types)
                    }
                    Selection::Ambiguous | Selection::NoMatch => {
                        self.bind_unknown(callee.id);
                        TypeArena::UNKNOWN
                    }
                }
            }
            Denot::Value(ty) => {
                let arena = &self.types.arena;
                match arena.get(arena.underlying(ty)) {
                    TypeKind::Procedural(signature) => signature.result.unwrap_or(TypeArena::VOID),
                    _ => TypeArena::UNKNOWN,
                }
            }
            Denot::Namespace(_) => {
                self.bind_unknown(callee.id);
                TypeArena::UNKNOWN
            }
            Denot::Type(_) | Denot::ArrayProperty { .. } | Denot::Unit(_) | Denot::Unknown => {
                TypeArena::UNKNOWN
            }
        }
    }

    fn candidates(&mut self, decls: &[DeclId], receiver: Option<TypeId>) -> Vec<Candidate> {
        let object = receiver.map(|r| self.receiver_object(r));
        decls
            .iter()
            .map(|decl| {
                let mut params = self.types.routine_params(*decl);
                if let Some(object) = object {
                    for param in params.iter_mut() {
                        param.ty = param.ty.map(|ty| self.types.instantiate_member(ty, object));
                    }
                }
                let variadic = self
                    .index
                    .decl(*decl)
                    .routine
                    .as_ref()
                    .and_then(|r| r.intrinsic)
                    .is_some_and(|i| i.variadic);
                Candidate {
                    decl: *decl,
                    params,
                    variadic,
                }
            })
            .collect()
    }

    fn call_result(&mut self, routine: DeclId, receiver: Option<TypeId>, args: &[TypeId]) -> TypeId {
        let index = self.index;
        let Some(info) = index.decl(routine).routine.as_ref() else {
            return TypeArena::UNKNOWN;
        };
        if info.kind == RoutineKind::Constructor {
            return match receiver {
                Some(receiver) => self.receiver_object(receiver),
                None => TypeArena::VOID,
            };
        }
        if let Some(intrinsic) = info.intrinsic {
            return match intrinsic.result {
                IntrinsicResult::None => TypeArena::VOID,
                IntrinsicResult::Type(ty) => self.types.arena.intern_intrinsic(ty),
                IntrinsicResult::FirstArg => args.first().copied().unwrap_or(TypeArena::UNKNOWN),
                IntrinsicResult::Bound => self.bound_type(args.first().copied()),
            };
        }
        match self.types.routine_result(routine) {
            Some(result) => match receiver {
                Some(receiver) => {
                    let object = self.receiver_object(receiver);
                    self.types.instantiate_member(result, object)
                }
                None => result,
            },
            None => TypeArena::VOID,
        }
    }

    /// Result of `Low`/`High`.
    fn bound_type(&mut self, arg: Option<TypeId>) -> TypeId {
        let Some(arg) = arg else {
            return TypeArena::UNKNOWN;
        };
        let arena = &self.types.arena;
        match arena.get(arena.underlying(arg)) {
            TypeKind::Array { .. } | TypeKind::Str(_) | TypeKind::ArrayOfConst => {
                self.types.arena.intern(TypeKind::Int(IntKind::Integer))
            }
            kind if kind.is_ordinal() => arg,
            _ => TypeArena::UNKNOWN,
        }
    }

    fn index_expr(&mut self, object: &Expr, indices: &[Expr]) -> Denot {
        let denoted = self.denote_recorded(object);
        for index in indices {
            self.value(index);
        }
        match denoted {
            Denot::ArrayProperty { decl, receiver } => Denot::Value(self.member_type(decl, receiver)),
            Denot::Type(_) | Denot::Unit(_) | Denot::Unknown => Denot::Unknown,
            other => {
                let ty = self.finish_value(object.id, other);
                self.expr_types.insert(object.id, ty);
                Denot::Value(self.indexed_type(ty, indices.len()))
            }
        }
    }

    fn indexed_type(&mut self, ty: TypeId, count: usize) -> TypeId {
        let mut current = ty;
        for _ in 0..count {
            let arena = &self.types.arena;
            current = match arena.get(arena.underlying(current)).clone() {
                TypeKind::Array { element, .. } => element,
                TypeKind::Str(kind) => self.char_of(kind.is_ansi()),
                TypeKind::Pointer(Some(target)) => target,
                TypeKind::Variant => current,
                TypeKind::Class { .. } | TypeKind::Interface { .. } | TypeKind::Record { .. } => {
                    // The default property consumes every index.
                    return self.default_property_type(current);
                }
                _ => return TypeArena::UNKNOWN,
            };
        }
        current
    }

    fn default_property_type(&mut self, ty: TypeId) -> TypeId {
        let Some(owner) = self.types.member_owner(ty) else {
            return TypeArena::UNKNOWN;
        };
        let chain = std::iter::once(owner).chain(self.types.hierarchy(owner).ancestors);
        let property = chain
            .filter_map(|decl| self.index.decl(decl).type_info.as_ref()?.default_property)
            .next();
        match property {
            Some(property) => self.member_type(property, Some(ty)),
            None => TypeArena::UNKNOWN,
        }
    }

    /// `@Routine` takes the routine's address without calling it.
    fn address_of(&mut self, inner: &Expr) {
        match self.denote_recorded(inner) {
            Denot::Routines { decls, .. } => match decls.as_slice() {
                [only] => self.bind(inner.id, *only),
                _ => self.bind_unknown(inner.id),
            },
            Denot::Namespace(_) => self.bind_unknown(inner.id),
            _ => {}
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> TypeId {
        match op {
            BinaryOp::Is => {
                self.value(lhs);
                self.type_operand(rhs);
                TypeArena::BOOLEAN
            }
            BinaryOp::As => {
                self.value(lhs);
                self.type_operand(rhs)
            }
            _ => {
                let l = self.value(lhs);
                let r = self.value(rhs);
                self.types.binary_type(op, l, r)
            }
        }
    }

    /// Right operand of `is`/`as`: a type name or a class reference.
    fn type_operand(&mut self, expr: &Expr) -> TypeId {
        match self.denote_recorded(expr) {
            Denot::Type(ty) => ty,
            Denot::Value(ty) => match self.types.arena.get(ty) {
                TypeKind::ClassRef(inner) => *inner,
                _ => TypeArena::UNKNOWN,
            },
            _ => TypeArena::UNKNOWN,
        }
    }

    /// `inherited Name` searches the ancestors of the enclosing method's
    /// class; bare `inherited` calls the overridden counterpart with the
    /// current parameters.
    fn inherited(&mut self, node: NodeId, name: Option<&Ident>) -> Denot {
        let index = self.index;
        let routine = self.routines.last().copied();
        let owner = routine.and_then(|r| index.decl(r).owner);
        let (Some(routine), Some(owner)) = (routine, owner) else {
            self.bind_unknown(node);
            return Denot::Unknown;
        };
        let Some(parent) = self.types.hierarchy(owner).ancestors.first().copied() else {
            self.bind_unknown(node);
            return Denot::Unknown;
        };
        let self_type = self.types.type_of_type_decl(owner, &[]);

        match name {
            Some(ident) => {
                let found = self.types.lookup_member(parent, &NameKey::new(&ident.name));
                self.classify(node, &found, Some(self_type))
            }
            None => {
                let key = index.decl(routine).key.clone();
                let found: Vec<DeclId> = self
                    .types
                    .lookup_member(parent, &key)
                    .into_iter()
                    .filter(|d| index.decl(*d).is_routine())
                    .collect();
                let args: Vec<TypeId> = self
                    .types
                    .routine_params(routine)
                    .iter()
                    .map(|p| p.ty.unwrap_or(TypeArena::UNKNOWN))
                    .collect();
                let candidates = self.candidates(&found, Some(self_type));
                match overload::select(&self.types.arena, &candidates, &args) {
                    Selection::Unique(target) => {
                        self.bind(node, target);
                        Denot::Value(self.call_result(target, Some(self_type), &args))
                    }
                    Selection::Ambiguous | Selection::NoMatch => {
                        self.bind_unknown(node);
                        Denot::Unknown
                    }
                }
            }
        }
    }

    fn anonymous_method(&mut self, method: &AnonymousMethod) -> TypeId {
        let saved = self.scope;
        if let Some(scope) = self.symbols.node_scopes.get(&method.id) {
            self.scope = *scope;
        }
        let mut params = Vec::new();
        for group in &method.params {
            let ty = match &group.ty {
                Some(ty) => self.type_expr(ty),
                None => TypeArena::UNTYPED,
            };
            params.extend(std::iter::repeat((group.mode, ty)).take(group.names.len()));
        }
        let result = method.return_type.as_ref().map(|ty| self.type_expr(ty));
        self.decls(&method.decls);
        self.block(&method.block);
        self.scope = saved;

        self.types.arena.intern(TypeKind::Procedural(Box::new(ProcSignature {
            params,
            result,
            of_object: false,
            is_reference: true,
        })))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnosticHandler;
    use crate::module_resolver::{UnitMap, UnitNames};
    use crate::phases::declaration_phase::collect_unit;
    use crate::stdlib::BUILTIN_UNITS;
    use crate::syntax::directives::DirectiveOptions;
    use crate::syntax::parse_source;
    use crate::syntax::visit::{self, Visitor};
    use crate::types::StringKind;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Parsed and collected units, builtins first.
    pub(crate) struct Project {
        pub index: SymbolIndex,
        pub files: Vec<SourceFile>,
    }

    impl Project {
        pub fn new(sources: &[&str]) -> Self {
            let handler = CollectingDiagnosticHandler::new();
            let mut units: Vec<(String, PathBuf, SourceFile)> = Vec::new();
            for builtin in BUILTIN_UNITS {
                let parsed = parse_source(builtin.source, &DirectiveOptions::default(), &handler);
                units.push((builtin.name.to_string(), PathBuf::from(builtin.path), parsed.file));
            }
            for (i, source) in sources.iter().enumerate() {
                let parsed = parse_source(source, &DirectiveOptions::default(), &handler);
                let name = parsed.file.name.dotted();
                units.push((name, PathBuf::from(format!("src/unit{}.pas", i)), parsed.file));
            }

            let mut names = UnitNames::new(&["System".to_string()], &UnitMap::new());
            for (i, (name, path, _)) in units.iter().enumerate() {
                names.register(UnitId(i as u32), name, path);
            }
            let symbols = units
                .iter()
                .enumerate()
                .map(|(i, (name, path, file))| {
                    Arc::new(collect_unit(UnitId(i as u32), name, path, file, &names, &handler))
                })
                .collect();
            Self {
                index: SymbolIndex::new(symbols),
                files: units.into_iter().map(|(_, _, file)| file).collect(),
            }
        }

        /// Resolve the n-th user source.
        pub fn resolve(&self, source: usize) -> Resolution {
            let unit = BUILTIN_UNITS.len() + source;
            resolve_unit(&self.index, UnitId(unit as u32), &self.files[unit])
        }

        pub fn file(&self, source: usize) -> &SourceFile {
            &self.files[BUILTIN_UNITS.len() + source]
        }
    }

    /// Every expression of a file, in walk order.
    pub(crate) fn expressions(file: &SourceFile) -> Vec<Expr> {
        struct Collect(Vec<Expr>);
        impl Visitor for Collect {
            fn visit_expr(&mut self, expr: &Expr) {
                self.0.push(expr.clone());
                visit::walk_expr(self, expr);
            }
        }
        let mut collect = Collect(Vec::new());
        visit::walk_file(&mut collect, file);
        collect.0
    }

    /// First name or member access spelled `name` on `line`.
    pub(crate) fn find_ref(file: &SourceFile, name: &str, line: u32) -> Expr {
        let found = expressions(file).into_iter().find(|e| {
            let spelled = match &e.kind {
                ExprKind::Name(ident) => Some(ident),
                ExprKind::Member { member, .. } => Some(member),
                _ => None,
            };
            spelled.is_some_and(|ident| ident.name.eq_ignore_ascii_case(name) && ident.span.line == line)
        });
        match found {
            Some(expr) => expr,
            None => panic!("no reference to {} on line {}", name, line),
        }
    }

    fn bound_name(project: &Project, resolution: &Resolution, expr: &Expr) -> Option<String> {
        resolution
            .decl(expr.id)
            .map(|decl| project.index.qualified_name(decl))
    }

    #[test]
    fn test_overload_exact_match_and_ambiguity() {
        let source = "unit A; interface\n\
            procedure Put(V: Integer); overload;\n\
            procedure Put(const S: string); overload;\n\
            implementation\n\
            procedure Put(V: Integer); begin end;\n\
            procedure Put(const S: string); begin end;\n\
            procedure Run;\n\
            begin\n\
              Put(1);\n\
              Put('text');\n\
              Put(Missing);\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let file = project.file(0);

        let int_call = find_ref(file, "Put", 9);
        let str_call = find_ref(file, "Put", 10);
        let unknown_call = find_ref(file, "Put", 11);
        let int_decl = resolution.decl(int_call.id);
        let str_decl = resolution.decl(str_call.id);
        assert!(int_decl.is_some());
        assert!(str_decl.is_some());
        assert_ne!(int_decl, str_decl);
        assert_eq!(resolution.binding(unknown_call.id), Some(Binding::Unknown));
    }

    #[test]
    fn test_member_lookup_searches_ancestors_then_interfaces() {
        let source = "unit A; interface\n\
            type\n\
              IRunner = interface\n\
                procedure Run;\n\
              end;\n\
              TBase = class(TInterfacedObject)\n\
                FCount: Integer;\n\
              end;\n\
              TDerived = class(TBase, IRunner)\n\
                procedure Run;\n\
              end;\n\
            implementation\n\
            procedure TDerived.Run; begin end;\n\
            procedure Use(D: TDerived);\n\
            begin\n\
              D.FCount := 1;\n\
              D.Run;\n\
              D.RefCount;\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let file = project.file(0);

        let field = find_ref(file, "FCount", 16);
        assert_eq!(bound_name(&project, &resolution, &field).as_deref(), Some("A.TBase.FCount"));
        let run = find_ref(file, "Run", 17);
        assert_eq!(bound_name(&project, &resolution, &run).as_deref(), Some("A.TDerived.Run"));
        assert!(resolution.is_implicit_call(run.id));
        let inherited_property = find_ref(file, "RefCount", 18);
        assert_eq!(
            bound_name(&project, &resolution, &inherited_property).as_deref(),
            Some("System.TInterfacedObject.RefCount")
        );
    }

    #[test]
    fn test_forward_declaration_resolves_to_one_declaration() {
        let source = "unit A; interface\n\
            type\n\
              TNode = class;\n\
              TList = class\n\
                First: TNode;\n\
              end;\n\
              TNode = class\n\
                Next: TNode;\n\
              end;\n\
            implementation\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let bound: Vec<DeclId> = resolution
            .refs
            .values()
            .filter_map(|b| match b {
                Binding::Decl(d) if project.index.decl(*d).name == "TNode" => Some(*d),
                _ => None,
            })
            .collect();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0], bound[1]);
    }

    #[test]
    fn test_unit_qualified_name_beats_local_alias() {
        let shapes = "unit Shapes; interface\n\
            type TShape = class\n\
              procedure Draw;\n\
            end;\n\
            implementation\n\
            procedure TShape.Draw; begin end;\n\
            end.";
        let main = "unit Main; interface\n\
            uses Shapes;\n\
            type TShape = Integer;\n\
            implementation\n\
            procedure Run;\n\
            var S: Shapes.TShape;\n\
            begin\n\
              S := Shapes.TShape.Create;\n\
            end;\n\
            end.";
        let project = Project::new(&[shapes, main]);
        let resolution = project.resolve(1);
        let file = project.file(1);
        let qualified = find_ref(file, "TShape", 8);
        assert_eq!(
            bound_name(&project, &resolution, &qualified).as_deref(),
            Some("Shapes.TShape")
        );
        let shapes_unit = UnitId(BUILTIN_UNITS.len() as u32);
        let usage = resolution.import_usage(shapes_unit);
        assert!(usage.qualified);
        assert!(usage.implementation);
        assert!(!usage.unqualified);
    }

    #[test]
    fn test_miss_arrests_the_whole_chain() {
        let source = "unit A; interface implementation\n\
            procedure Run;\n\
            begin\n\
              Missing.Inner.Value := 1;\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let file = project.file(0);
        for name in ["Missing", "Inner", "Value"] {
            let expr = find_ref(file, name, 4);
            assert_eq!(resolution.binding(expr.id), Some(Binding::Unknown), "{}", name);
        }
    }

    #[test]
    fn test_casts_and_implicit_calls() {
        let source = "unit A; interface implementation\n\
            function Count: Integer; begin Result := 0; end;\n\
            procedure Run;\n\
            var P: Pointer; I: NativeInt; S: string;\n\
            begin\n\
              I := NativeInt(P);\n\
              S := IntToStr(Count);\n\
              I := Count;\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let file = project.file(0);

        let cast = expressions(file)
            .into_iter()
            .find(|e| matches!(e.kind, ExprKind::Call { .. }) && e.span.line == 6);
        let cast = cast.map(|c| resolution.cast_target(c.id));
        let target = cast.flatten().map(|t| resolution.arena.get(t).clone());
        assert_eq!(target, Some(TypeKind::Int(IntKind::NativeInt)));

        let count = find_ref(file, "Count", 8);
        assert!(resolution.is_implicit_call(count.id));
        let ty = resolution.type_of(count.id).map(|t| resolution.arena.get(t).clone());
        assert_eq!(ty, Some(TypeKind::Int(IntKind::Integer)));
    }

    #[test]
    fn test_bare_inherited_targets_overridden_method() {
        let source = "unit A; interface\n\
            type\n\
              TBase = class\n\
                procedure Save(const Name: string); virtual;\n\
                procedure Save(Id: Integer); overload; virtual;\n\
              end;\n\
              TChild = class(TBase)\n\
                procedure Save(Id: Integer); override;\n\
              end;\n\
            implementation\n\
            procedure TBase.Save(const Name: string); begin end;\n\
            procedure TBase.Save(Id: Integer); begin end;\n\
            procedure TChild.Save(Id: Integer);\n\
            begin\n\
              inherited;\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let file = project.file(0);
        let inherited = expressions(file)
            .into_iter()
            .find(|e| matches!(e.kind, ExprKind::Inherited(None)));
        let target = inherited.and_then(|e| resolution.decl(e.id));
        let params = target
            .and_then(|d| project.index.decl(d).routine.as_ref())
            .map(|r| r.params.iter().map(|p| p.name.clone()).collect::<Vec<_>>());
        assert_eq!(params, Some(vec!["Id".to_string()]));
    }

    #[test]
    fn test_generic_member_substitution() {
        let source = "unit A; interface\n\
            type\n\
              TBox<T> = class\n\
                Value: T;\n\
              end;\n\
            implementation\n\
            procedure Run(B: TBox<string>);\n\
            begin\n\
              B.Value := '';\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let value = find_ref(project.file(0), "Value", 9);
        let ty = resolution.type_of(value.id).map(|t| resolution.arena.get(t).clone());
        assert_eq!(ty, Some(TypeKind::Str(StringKind::Unicode)));
    }

    #[test]
    fn test_with_statement_members_come_first() {
        let source = "unit A; interface\n\
            type\n\
              TPoint = record\n\
                X, Y: Integer;\n\
              end;\n\
            implementation\n\
            procedure Run;\n\
            var P: TPoint; X: string;\n\
            begin\n\
              with P do\n\
                X := 1;\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let x = find_ref(project.file(0), "X", 11);
        assert_eq!(bound_name(&project, &resolution, &x).as_deref(), Some("A.TPoint.X"));
    }

    #[test]
    fn test_inline_variable_takes_initializer_type() {
        let source = "unit A; interface implementation\n\
            procedure Run;\n\
            begin\n\
              var Total := 'abc';\n\
              Total := Total + 'd';\n\
              for var I := 0 to 3 do\n\
                Total := Total;\n\
            end;\n\
            end.";
        let project = Project::new(&[source]);
        let resolution = project.resolve(0);
        let file = project.file(0);
        let total = find_ref(file, "Total", 5);
        let ty = resolution.type_of(total.id).map(|t| resolution.arena.get(t).clone());
        assert_eq!(ty, Some(TypeKind::Str(StringKind::Unicode)));
        let decl = resolution.decl(total.id);
        assert!(decl.is_some_and(|d| project.index.decl(d).visible_from > 0));
    }

    #[test]
    fn test_import_usage_by_section() {
        let helpers = "unit Helpers; interface\n\
            type THelper = class end;\n\
            procedure Help;\n\
            implementation\n\
            procedure Help; begin end;\n\
            end.";
        let main = "unit Main; interface\n\
            uses Helpers;\n\
            implementation\n\
            procedure Run;\n\
            begin\n\
              Help;\n\
            end;\n\
            end.";
        let project = Project::new(&[helpers, main]);
        let resolution = project.resolve(1);
        let usage = resolution.import_usage(UnitId(BUILTIN_UNITS.len() as u32));
        assert_eq!(
            usage,
            ImportUsage {
                interface: false,
                implementation: true,
                qualified: false,
                unqualified: true,
            }
        );
    }
}
