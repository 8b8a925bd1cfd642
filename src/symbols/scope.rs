use super::{DeclId, NameKey, ScopeId};
use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    UnitInterface,
    /// Implementation section of a unit, or the declaration part of a
    /// program or library.
    UnitImplementation,
    /// Members of a class, interface, record or enum.
    Type(DeclId),
    /// Type parameters of a routine heading.
    Signature(DeclId),
    /// Parameters and locals of a routine body. `self_type` is set for
    /// method bodies and makes the type's members visible after the locals.
    Routine {
        routine: Option<DeclId>,
        self_type: Option<DeclId>,
    },
    /// Inline `var`/`const` declarations of a statement block.
    Block,
    /// `on E: Exception do`
    Handler,
}

/// A scope: case-insensitive names mapped to one or more declarations.
///
/// More than one declaration under a name is either an overload set or a
/// duplicate the resolver reports as ambiguous.
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    names: IndexMap<NameKey, Vec<DeclId>>,
}

impl Scope {
    pub fn new(id: ScopeId, kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            kind,
            parent,
            names: IndexMap::new(),
        }
    }

    /// Declare a name in this scope, keeping earlier declarations of the
    /// same name.
    pub fn declare(&mut self, key: NameKey, decl: DeclId) {
        let entry = self.names.entry(key).or_default();
        if !entry.contains(&decl) {
            entry.push(decl);
        }
    }

    /// Look up a name in this scope only.
    pub fn lookup(&self, key: &NameKey) -> &[DeclId] {
        self.names.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop one declaration from a name, removing the name when it was the
    /// last one.
    pub fn remove(&mut self, key: &NameKey, decl: DeclId) {
        if let Some(entry) = self.names.get_mut(key) {
            entry.retain(|d| *d != decl);
            if entry.is_empty() {
                self.names.shift_remove(key);
            }
        }
    }

    /// All names in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&NameKey, &[DeclId])> {
        self.names.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn declarations(&self) -> impl Iterator<Item = DeclId> + '_ {
        self.names.values().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::UnitId;

    fn decl(index: usize) -> DeclId {
        DeclId::new(UnitId(0), index)
    }

    #[test]
    fn test_declare_keeps_overloads_in_order() {
        let mut scope = Scope::new(ScopeId::new(UnitId(0), 0), ScopeKind::Block, None);
        scope.declare(NameKey::new("Foo"), decl(1));
        scope.declare(NameKey::new("FOO"), decl(2));
        scope.declare(NameKey::new("foo"), decl(2));
        assert_eq!(scope.lookup(&NameKey::new("fOO")), &[decl(1), decl(2)]);
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn test_remove_drops_empty_names() {
        let mut scope = Scope::new(ScopeId::new(UnitId(0), 0), ScopeKind::Block, None);
        scope.declare(NameKey::new("A"), decl(1));
        scope.declare(NameKey::new("B"), decl(2));
        scope.remove(&NameKey::new("a"), decl(1));
        assert!(scope.lookup(&NameKey::new("A")).is_empty());
        assert_eq!(scope.entries().count(), 1);
    }
}
