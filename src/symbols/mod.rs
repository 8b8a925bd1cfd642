//! Declarations, scopes and the cross-unit symbol index.
//!
//! Every unit owns its declarations and scopes in flat vectors addressed by
//! [`DeclId`] and [`ScopeId`]. After collection the per-unit tables are
//! frozen and published together as a [`SymbolIndex`] that resolution reads
//! from every worker without locking.

mod declaration;
mod index;
mod scope;

pub use declaration::{
    DeclKind, Declaration, Implicit, IntrinsicRoutine, IntrinsicResult, ParamInfo, RoutineInfo,
    TypeInfo, TypeShape,
};
pub use index::{SymbolIndex, UnitSymbols, UsesEntry};
pub use scope::{Scope, ScopeKind};

use serde::Serialize;
use std::fmt;

/// Identifier normalized for lookup.
///
/// Delphi identifiers compare case-insensitively over the full Unicode
/// range, so every scope, overload key and qualified-name segment is keyed
/// by the Unicode lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NameKey(String);

impl NameKey {
    pub fn new(name: &str) -> Self {
        NameKey(name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NameKey {
    fn from(name: &str) -> Self {
        NameKey::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId(pub u32);

impl UnitId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeclId {
    pub unit: UnitId,
    pub index: u32,
}

impl DeclId {
    pub fn new(unit: UnitId, index: usize) -> Self {
        Self {
            unit,
            index: index as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId {
    pub unit: UnitId,
    pub index: u32,
}

impl ScopeId {
    pub fn new(unit: UnitId, index: usize) -> Self {
        Self {
            unit,
            index: index as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_key_is_case_insensitive() {
        assert_eq!(NameKey::new("TStringList"), NameKey::new("tstringlist"));
        assert_eq!(NameKey::new("ÄNDERUNG"), NameKey::new("änderung"));
        assert_ne!(NameKey::new("Foo"), NameKey::new("Fooo"));
    }
}
