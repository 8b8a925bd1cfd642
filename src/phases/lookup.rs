//! Name lookup over the collected scopes.
//!
//! A simple name is searched in the scope chain first (locals, then the
//! members of `Self` for method bodies, then enclosing declarations), then in
//! the used units from last to first, then in `System`. Lookup stops at the
//! first scope that declares the name unless every declaration found so far
//! is an `overload` routine, in which case outer scopes contribute more
//! candidates.

use super::type_resolution::TypeResolver;
use crate::symbols::{DeclId, DeclKind, Declaration, NameKey, ScopeId, ScopeKind, UnitId};
use crate::syntax::ast::{Ident, SectionKind};
use crate::types::{TypeId, TypeKind};
use serde::Serialize;

/// How a file references one of its used units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportUsage {
    /// Referenced from the interface section.
    pub interface: bool,
    /// Referenced from the implementation section or a program body.
    pub implementation: bool,
    /// Referenced through a unit-qualified name.
    pub qualified: bool,
    /// Referenced through a plain name.
    pub unqualified: bool,
}

impl ImportUsage {
    pub fn is_used(&self) -> bool {
        self.interface || self.implementation
    }
}

/// Declarations a name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub decls: Vec<DeclId>,
    /// Used unit the name was found in, when it came from an import.
    pub import: Option<UnitId>,
}

type DeclFilter<'f> = &'f dyn Fn(&Declaration) -> bool;

const MAX_ALIAS_DEPTH: usize = 8;

impl TypeResolver<'_> {
    /// Look up a plain name starting at `scope`. Declarations introduced
    /// after `offset` (inline variables) are not visible.
    pub fn lookup_name(&mut self, scope: ScopeId, key: &NameKey, offset: usize) -> Option<Hit> {
        self.lookup_where(scope, key, offset, &|_| true)
    }

    /// Look up a type name with the given generic arity.
    pub fn lookup_type(&mut self, scope: ScopeId, name: &str, arity: usize) -> Option<DeclId> {
        let filter = |d: &Declaration| is_type_like(d) && d.generic_arity() == arity;
        let hit = self.lookup_where(scope, &NameKey::new(name), usize::MAX, &filter)?;
        unique(&hit.decls)
    }

    fn lookup_where(&mut self, scope: ScopeId, key: &NameKey, offset: usize, filter: DeclFilter) -> Option<Hit> {
        let index = self.index;
        let mut collected = Vec::new();
        let mut from_implementation = false;
        let mut current = Some(scope);

        while let Some(id) = current {
            let s = index.scope(id);
            let found: Vec<DeclId> = match s.kind {
                ScopeKind::Type(owner) => self.lookup_member(owner, key),
                _ => s
                    .lookup(key)
                    .iter()
                    .copied()
                    .filter(|d| index.decl(*d).visible_from <= offset)
                    .collect(),
            };
            if absorb(self, &mut collected, &found, filter) {
                return Some(Hit {
                    decls: collected,
                    import: None,
                });
            }
            if let ScopeKind::Routine {
                self_type: Some(owner),
                ..
            } = s.kind
            {
                let members = self.lookup_member(owner, key);
                if absorb(self, &mut collected, &members, filter) {
                    return Some(Hit {
                        decls: collected,
                        import: None,
                    });
                }
            }
            if s.kind == ScopeKind::UnitImplementation {
                from_implementation = true;
            }
            current = s.parent;
        }

        let mut import = None;
        for unit in self.import_order(scope.unit, from_implementation) {
            let found = index.exported(unit, key.as_str()).to_vec();
            let before = collected.len();
            let done = absorb(self, &mut collected, &found, filter);
            if collected.len() > before {
                import.get_or_insert(unit);
                self.record_usage(unit, false);
            }
            if done {
                break;
            }
        }

        (!collected.is_empty()).then_some(Hit {
            decls: collected,
            import,
        })
    }

    /// Units searched for plain names, nearest first.
    fn import_order(&self, unit: UnitId, from_implementation: bool) -> Vec<UnitId> {
        let symbols = self.index.unit(unit);
        let mut order = Vec::new();
        if from_implementation {
            order.extend(
                symbols
                    .uses
                    .iter()
                    .rev()
                    .filter(|u| u.section != SectionKind::Interface)
                    .filter_map(|u| u.unit),
            );
        }
        order.extend(
            symbols
                .uses
                .iter()
                .rev()
                .filter(|u| u.section == SectionKind::Interface)
                .filter_map(|u| u.unit),
        );
        if let Some(system) = self.index.system() {
            if system != unit && !order.contains(&system) {
                order.push(system);
            }
        }
        order
    }

    /// Members named `key` of a type, searching its ancestors nearest first
    /// and then its interfaces.
    pub fn lookup_member(&mut self, owner: DeclId, key: &NameKey) -> Vec<DeclId> {
        self.lookup_member_at(owner, key, 0)
    }

    fn lookup_member_at(&mut self, owner: DeclId, key: &NameKey, depth: usize) -> Vec<DeclId> {
        let index = self.index;
        let Some(info) = index.decl(owner).type_info.as_ref() else {
            return Vec::new();
        };
        if info.members.is_none() {
            // Alias of a structured type such as `TIntList = TList<Integer>`.
            if depth >= MAX_ALIAS_DEPTH {
                return Vec::new();
            }
            let ty = self.type_of_type_decl(owner, &[]);
            return match self.member_owner(ty) {
                Some(target) if target != owner => self.lookup_member_at(target, key, depth + 1),
                _ => Vec::new(),
            };
        }

        let hierarchy = self.hierarchy(owner);
        let mut collected = Vec::new();
        let chain = std::iter::once(owner)
            .chain(hierarchy.ancestors)
            .chain(hierarchy.interfaces);
        for decl in chain {
            let found = self.own_members(decl, key);
            if absorb(self, &mut collected, &found, &|_| true) {
                break;
            }
        }
        collected
    }

    /// Members declared directly in a type, without inherited ones.
    pub(crate) fn own_members(&self, owner: DeclId, key: &NameKey) -> Vec<DeclId> {
        self.index
            .decl(owner)
            .type_info
            .as_ref()
            .and_then(|info| info.members)
            .map(|scope| self.index.scope(scope).lookup(key).to_vec())
            .unwrap_or_default()
    }

    /// Declaration whose members a value of type `ty` exposes.
    pub fn member_owner(&self, ty: TypeId) -> Option<DeclId> {
        match self.arena.get(self.arena.underlying(ty)) {
            TypeKind::Class { decl, .. }
            | TypeKind::Interface { decl, .. }
            | TypeKind::Record { decl, .. }
            | TypeKind::Enum(decl) => Some(*decl),
            TypeKind::ClassRef(inner) => self.member_owner(*inner),
            // Records are dereferenced implicitly through typed pointers.
            TypeKind::Pointer(Some(inner)) => match self.arena.get(self.arena.underlying(*inner)) {
                TypeKind::Record { decl, .. } => Some(*decl),
                _ => None,
            },
            _ => None,
        }
    }

    /// Unit named by a dotted qualifier as seen from `unit`.
    ///
    /// The qualifier may be the unit itself, a used unit as written in the
    /// uses clause, its full name, or the tail of a dotted full name
    /// (`SysUtils` for `System.SysUtils`). `System` is always available.
    pub fn unit_qualifier(&self, unit: UnitId, dotted: &str) -> Option<UnitId> {
        let key = NameKey::new(dotted);
        let symbols = self.index.unit(unit);
        if symbols.key == key {
            return Some(unit);
        }
        let suffix = format!(".{}", key.as_str());
        for entry in &symbols.uses {
            let Some(used) = entry.unit else {
                continue;
            };
            let target = &self.index.unit(used).key;
            if NameKey::new(&entry.name) == key || *target == key || target.as_str().ends_with(&suffix) {
                return Some(used);
            }
        }
        self.index.system().filter(|system| self.index.unit(*system).key == key)
    }

    /// Longest prefix of `names` (leaving at least one segment) that names a
    /// unit, with the number of segments it spans.
    pub fn unit_prefix(&self, unit: UnitId, names: &[&str]) -> Option<(UnitId, usize)> {
        (1..names.len()).rev().find_map(|len| {
            self.unit_qualifier(unit, &names[..len].join("."))
                .map(|found| (found, len))
        })
    }

    /// Resolve a possibly qualified type name. A leading type visible in
    /// scope wins over a unit of the same name.
    pub fn resolve_type_path(&mut self, path: &[Ident], arity: usize, scope: ScopeId) -> Option<DeclId> {
        let names: Vec<&str> = path.iter().map(|p| p.name.as_str()).collect();
        let (last, init) = names.split_last()?;
        if init.is_empty() {
            return self.lookup_type(scope, last, arity);
        }

        if let Some(outer) = self.lookup_type(scope, names[0], 0) {
            if let Some(found) = self.nested_type(outer, &names[1..], arity) {
                return Some(found);
            }
        }

        let (unit, used) = self.unit_prefix(scope.unit, &names)?;
        self.record_usage(unit, true);
        let first_arity = if used + 1 == names.len() { arity } else { 0 };
        let first = unique_type(self, self.index.exported(unit, names[used]), first_arity)?;
        self.nested_type(first, &names[used + 1..], arity)
    }

    fn nested_type(&mut self, outer: DeclId, rest: &[&str], arity: usize) -> Option<DeclId> {
        let mut current = outer;
        for (position, name) in rest.iter().enumerate() {
            let wanted = if position + 1 == rest.len() { arity } else { 0 };
            let members = self.lookup_member(current, &NameKey::new(name));
            current = unique_type(self, &members, wanted)?;
        }
        Some(current)
    }

    pub(crate) fn record_usage(&mut self, unit: UnitId, qualified: bool) {
        if !self.tracking || unit == self.unit {
            return;
        }
        let section = self.section;
        let usage = self.usage.entry(unit).or_default();
        match section {
            SectionKind::Interface => usage.interface = true,
            SectionKind::Implementation | SectionKind::Main => usage.implementation = true,
        }
        if qualified {
            usage.qualified = true;
        } else {
            usage.unqualified = true;
        }
    }
}

fn is_type_like(decl: &Declaration) -> bool {
    decl.is_type() || decl.kind == DeclKind::TypeParameter
}

fn unique(decls: &[DeclId]) -> Option<DeclId> {
    match decls {
        [only] => Some(*only),
        _ => None,
    }
}

fn unique_type(resolver: &TypeResolver, decls: &[DeclId], arity: usize) -> Option<DeclId> {
    let types: Vec<DeclId> = decls
        .iter()
        .copied()
        .filter(|d| {
            let decl = resolver.index.decl(*d);
            is_type_like(decl) && decl.generic_arity() == arity
        })
        .collect();
    unique(&types)
}

/// Add the declarations passing `filter` to `collected`. Returns true when
/// the search is finished, i.e. something other than an overload was found.
fn absorb(resolver: &TypeResolver, collected: &mut Vec<DeclId>, found: &[DeclId], filter: DeclFilter) -> bool {
    let mut any = false;
    let mut all_overloads = true;
    for decl in found {
        let declaration = resolver.index.decl(*decl);
        if !filter(declaration) {
            continue;
        }
        any = true;
        all_overloads &= declaration.is_overload();
        if !collected.contains(decl) {
            collected.push(*decl);
        }
    }
    any && !all_overloads
}
