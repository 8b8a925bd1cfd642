use super::{CharKind, Intrinsic, StringKind, TypeId, TypeKind};
use crate::symbols::{DeclId, SymbolIndex};
use rustc_hash::FxHashMap;

/// Ancestry of a class or interface declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassHierarchy {
    /// Ancestor classes (or ancestor interfaces), nearest first.
    pub ancestors: Vec<DeclId>,
    /// Every implemented interface including inherited ones and their
    /// ancestors, in declaration order.
    pub interfaces: Vec<DeclId>,
}

/// Interning arena for the types seen while resolving one file.
///
/// Structurally equal kinds share one [`TypeId`], so identity comparison of
/// ids is type identity. Class hierarchy data is memoized next to the types
/// so compatibility predicates need nothing but the arena.
#[derive(Debug, Clone)]
pub struct TypeArena {
    kinds: Vec<TypeKind>,
    interned: FxHashMap<TypeKind, TypeId>,
    hierarchy: FxHashMap<DeclId, ClassHierarchy>,
}

impl TypeArena {
    pub const UNKNOWN: TypeId = TypeId(0);
    pub const UNTYPED: TypeId = TypeId(1);
    pub const VOID: TypeId = TypeId(2);
    pub const NIL: TypeId = TypeId(3);
    pub const BOOLEAN: TypeId = TypeId(4);

    pub fn new() -> Self {
        let mut arena = Self {
            kinds: Vec::with_capacity(64),
            interned: FxHashMap::default(),
            hierarchy: FxHashMap::default(),
        };
        for kind in [
            TypeKind::Unknown,
            TypeKind::Untyped,
            TypeKind::Void,
            TypeKind::Nil,
            TypeKind::Boolean,
        ] {
            arena.intern(kind);
        }
        arena
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(id) = self.interned.get(&kind) {
            return *id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    pub fn intern_intrinsic(&mut self, intrinsic: Intrinsic) -> TypeId {
        let kind = match intrinsic {
            Intrinsic::Int(kind) => TypeKind::Int(kind),
            Intrinsic::Boolean => TypeKind::Boolean,
            Intrinsic::Char(kind) => TypeKind::Char(kind),
            Intrinsic::Real(kind) => TypeKind::Real(kind),
            Intrinsic::Str(kind) => TypeKind::Str(kind),
            Intrinsic::Pointer => TypeKind::Pointer(None),
            Intrinsic::Variant => TypeKind::Variant,
            Intrinsic::PChar(kind) => {
                let element = self.intern(TypeKind::Char(kind));
                TypeKind::Pointer(Some(element))
            }
        };
        self.intern(kind)
    }

    pub fn get(&self, id: TypeId) -> &TypeKind {
        self.kinds.get(id.0 as usize).unwrap_or(&TypeKind::Unknown)
    }

    pub fn is_unknown(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeKind::Unknown)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Follow strong aliases and subranges down to the underlying type.
    pub fn underlying(&self, mut id: TypeId) -> TypeId {
        for _ in 0..32 {
            match self.get(id) {
                TypeKind::Alias { target, .. } | TypeKind::Subrange(target) => id = *target,
                _ => break,
            }
        }
        id
    }

    pub fn set_hierarchy(&mut self, decl: DeclId, hierarchy: ClassHierarchy) {
        self.hierarchy.insert(decl, hierarchy);
    }

    pub fn hierarchy(&self, decl: DeclId) -> Option<&ClassHierarchy> {
        self.hierarchy.get(&decl)
    }

    pub fn has_hierarchy(&self, decl: DeclId) -> bool {
        self.hierarchy.contains_key(&decl)
    }

    /// Fully qualified name of a named type, e.g. `System.Integer` or
    /// `System.SysUtils.Exception`.
    pub fn qualified_name(&self, id: TypeId, index: &SymbolIndex) -> Option<String> {
        let builtin = |name: &str| Some(format!("System.{}", name));
        match self.get(id) {
            TypeKind::Int(kind) => builtin(kind.name()),
            TypeKind::Boolean => builtin("Boolean"),
            TypeKind::Char(CharKind::Ansi) => builtin("AnsiChar"),
            TypeKind::Char(CharKind::Wide) => builtin("Char"),
            TypeKind::Real(kind) => builtin(kind.name()),
            TypeKind::Str(kind) => builtin(string_name(*kind)),
            TypeKind::Variant => builtin("Variant"),
            TypeKind::Pointer(None) => builtin("Pointer"),
            TypeKind::Pointer(Some(element)) => match self.get(*element) {
                TypeKind::Char(CharKind::Wide) => builtin("PChar"),
                TypeKind::Char(CharKind::Ansi) => builtin("PAnsiChar"),
                _ => None,
            },
            TypeKind::Class { decl, .. }
            | TypeKind::Interface { decl, .. }
            | TypeKind::Record { decl, .. }
            | TypeKind::Enum(decl)
            | TypeKind::Alias { decl, .. } => Some(index.qualified_name(*decl)),
            _ => None,
        }
    }

    /// Whether `name` designates this exact type, accepting the usual
    /// spellings of built-ins (`System.string`, `System.WideChar`).
    pub fn has_name(&self, id: TypeId, name: &str, index: &SymbolIndex) -> bool {
        let wanted = name.to_lowercase();
        let matches = |candidate: &str| candidate.to_lowercase() == wanted;
        if let Some(qualified) = self.qualified_name(id, index) {
            if matches(&qualified) {
                return true;
            }
        }
        let synonyms: &[&str] = match self.get(id) {
            TypeKind::Str(StringKind::Unicode) => &["System.string"],
            TypeKind::Char(CharKind::Wide) => &["System.WideChar"],
            TypeKind::Pointer(Some(element))
                if matches!(self.get(*element), TypeKind::Char(CharKind::Wide)) =>
            {
                &["System.PWideChar"]
            }
            _ => &[],
        };
        synonyms.iter().any(|s| matches(s))
    }

    /// Short human-readable name used in issue messages.
    pub fn display(&self, id: TypeId, index: &SymbolIndex) -> String {
        match self.get(id) {
            TypeKind::Unknown => "<unknown>".to_string(),
            TypeKind::Untyped => "<untyped>".to_string(),
            TypeKind::Void => "<void>".to_string(),
            TypeKind::Nil => "nil".to_string(),
            TypeKind::ClassRef(inner) => format!("class of {}", self.display(*inner, index)),
            TypeKind::Pointer(Some(inner)) if self.qualified_name(id, index).is_none() => {
                format!("^{}", self.display(*inner, index))
            }
            TypeKind::Set(inner) => format!("set of {}", self.display(*inner, index)),
            TypeKind::Array { element, .. } => format!("array of {}", self.display(*element, index)),
            TypeKind::ArrayOfConst => "array of const".to_string(),
            TypeKind::File => "file".to_string(),
            TypeKind::Subrange(base) => self.display(*base, index),
            TypeKind::Procedural(_) => "procedure".to_string(),
            TypeKind::TypeParam(decl) => index.decl(*decl).name.clone(),
            _ => self
                .qualified_name(id, index)
                .map(|name| name.rsplit('.').next().unwrap_or_default().to_string())
                .unwrap_or_else(|| "<type>".to_string()),
        }
    }
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

fn string_name(kind: StringKind) -> &'static str {
    match kind {
        StringKind::Unicode => "UnicodeString",
        StringKind::Ansi => "AnsiString",
        StringKind::Short => "ShortString",
        StringKind::Wide => "WideString",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntKind;

    #[test]
    fn test_interning_shares_ids() {
        let mut arena = TypeArena::new();
        let a = arena.intern(TypeKind::Int(IntKind::Integer));
        let b = arena.intern(TypeKind::Int(IntKind::Integer));
        let c = arena.intern(TypeKind::Int(IntKind::NativeInt));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arena.intern(TypeKind::Unknown), TypeArena::UNKNOWN);
        assert_eq!(arena.intern(TypeKind::Boolean), TypeArena::BOOLEAN);
    }

    #[test]
    fn test_pchar_is_pointer_to_char() {
        let mut arena = TypeArena::new();
        let pchar = arena.intern_intrinsic(Intrinsic::PChar(CharKind::Wide));
        let ch = arena.intern(TypeKind::Char(CharKind::Wide));
        assert_eq!(arena.get(pchar), &TypeKind::Pointer(Some(ch)));
        let index = SymbolIndex::default();
        assert_eq!(arena.qualified_name(pchar, &index).as_deref(), Some("System.PChar"));
        assert!(arena.has_name(pchar, "system.pwidechar", &index));
    }

    #[test]
    fn test_underlying_follows_subranges() {
        let mut arena = TypeArena::new();
        let byte = arena.intern(TypeKind::Int(IntKind::Byte));
        let sub = arena.intern(TypeKind::Subrange(byte));
        assert_eq!(arena.underlying(sub), byte);
    }
}
