use super::{DeclId, DeclKind, Declaration, NameKey, Scope, ScopeId, UnitId};
use crate::span::Span;
use crate::syntax::ast::{FileKind, NodeId, SectionKind};
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// One entry of a `uses` clause.
#[derive(Debug, Clone)]
pub struct UsesEntry {
    pub name: String,
    /// `None` when the unit is not part of the analyzed project.
    pub unit: Option<UnitId>,
    pub section: SectionKind,
    pub span: Span,
}

/// Declarations and scopes collected from one unit.
#[derive(Debug, Clone)]
pub struct UnitSymbols {
    pub id: UnitId,
    pub name: String,
    pub key: NameKey,
    pub path: PathBuf,
    pub kind: FileKind,
    pub decls: Vec<Declaration>,
    pub scopes: Vec<Scope>,
    pub interface_scope: ScopeId,
    /// Same as `interface_scope` for programs, libraries and packages.
    pub implementation_scope: ScopeId,
    pub uses: Vec<UsesEntry>,
    /// Type declarations and routines by syntax node.
    pub node_decls: FxHashMap<NodeId, DeclId>,
    /// Routine bodies, anonymous methods, blocks with inline declarations
    /// and exception handlers by syntax node.
    pub node_scopes: FxHashMap<NodeId, ScopeId>,
}

impl UnitSymbols {
    /// The declaration standing for the unit itself.
    pub fn unit_decl(&self) -> DeclId {
        DeclId::new(self.id, 0)
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index as usize]
    }

    pub fn uses_in(&self, section: SectionKind) -> impl Iterator<Item = &UsesEntry> {
        self.uses.iter().filter(move |u| u.section == section)
    }

    /// Empty placeholder for a file whose analysis could not produce
    /// declarations.
    pub fn placeholder(id: UnitId, name: &str, path: PathBuf, kind: FileKind) -> Self {
        let scope = ScopeId::new(id, 0);
        Self {
            id,
            name: name.to_string(),
            key: NameKey::new(name),
            path,
            kind,
            decls: vec![Declaration::new(
                DeclId::new(id, 0),
                name,
                DeclKind::Unit,
                Span::default(),
                scope,
            )],
            scopes: vec![Scope::new(scope, super::ScopeKind::UnitInterface, None)],
            interface_scope: scope,
            implementation_scope: scope,
            uses: Vec::new(),
            node_decls: FxHashMap::default(),
            node_scopes: FxHashMap::default(),
        }
    }
}

/// Read-only cross-unit index published once collection has finished.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    units: Vec<Arc<UnitSymbols>>,
    by_name: FxHashMap<NameKey, UnitId>,
}

impl SymbolIndex {
    pub fn new(units: Vec<Arc<UnitSymbols>>) -> Self {
        let by_name = units.iter().map(|u| (u.key.clone(), u.id)).collect();
        Self { units, by_name }
    }

    pub fn unit(&self, id: UnitId) -> &UnitSymbols {
        &self.units[id.index()]
    }

    pub fn units(&self) -> impl Iterator<Item = &UnitSymbols> {
        self.units.iter().map(|u| u.as_ref())
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn unit_by_name(&self, key: &NameKey) -> Option<UnitId> {
        self.by_name.get(key).copied()
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        self.unit(id.unit).decl(id)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        self.unit(id.unit).scope(id)
    }

    /// The `System` unit every unit implicitly uses.
    pub fn system(&self) -> Option<UnitId> {
        self.unit_by_name(&NameKey::new("System"))
    }

    /// Look up a name exported by the interface section of a unit.
    pub fn exported(&self, unit: UnitId, name: &str) -> &[DeclId] {
        let unit = self.unit(unit);
        unit.scope(unit.interface_scope).lookup(&NameKey::new(name))
    }

    pub fn system_decl(&self, name: &str) -> Option<DeclId> {
        self.system()
            .and_then(|system| self.exported(system, name).first().copied())
    }

    /// Find a type by its fully qualified name, such as
    /// `System.SysUtils.Exception` or `Shapes.TOuter.TInner`. The longest
    /// matching unit name wins.
    pub fn find_type(&self, qualified: &str) -> Option<DeclId> {
        let segments: Vec<&str> = qualified.split('.').collect();
        (1..segments.len()).rev().find_map(|split| {
            let unit = self.unit_by_name(&NameKey::new(&segments[..split].join(".")))?;
            self.find_type_in(unit, &segments[split..])
        })
    }

    fn find_type_in(&self, unit: UnitId, path: &[&str]) -> Option<DeclId> {
        let symbols = self.unit(unit);
        let (first, rest) = path.split_first()?;
        let key = NameKey::new(first);
        let mut current = [symbols.interface_scope, symbols.implementation_scope]
            .into_iter()
            .flat_map(|scope| symbols.scope(scope).lookup(&key).iter().copied())
            .find(|id| self.decl(*id).is_type())?;
        for segment in rest {
            let members = self.decl(current).type_info.as_ref()?.members?;
            current = self
                .scope(members)
                .lookup(&NameKey::new(segment))
                .iter()
                .copied()
                .find(|id| self.decl(*id).is_type())?;
        }
        Some(current)
    }

    /// Fully qualified name: unit name, then enclosing types, then the
    /// declaration's own name.
    pub fn qualified_name(&self, id: DeclId) -> String {
        let decl = self.decl(id);
        if decl.kind == DeclKind::Unit {
            return decl.name.clone();
        }
        let mut parts = vec![decl.name.as_str()];
        let mut owner = decl.owner;
        while let Some(current) = owner {
            let owner_decl = self.decl(current);
            parts.push(owner_decl.name.as_str());
            owner = owner_decl.owner;
        }
        parts.push(self.unit(id.unit).name.as_str());
        parts.reverse();
        parts.join(".")
    }
}
