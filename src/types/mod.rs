//! Type model: kinds, built-in intrinsics and the per-file interning arena.

mod arena;

pub use arena::{ClassHierarchy, TypeArena};

use crate::symbols::DeclId;
use crate::syntax::ast::ParamMode;
use serde::Serialize;

/// Interned type handle, valid within one [`TypeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u32);

/// Integer types. Pointer-sized integers are kept distinct from the
/// fixed-width ones regardless of target word size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IntKind {
    ShortInt,
    SmallInt,
    Integer,
    Int64,
    Byte,
    Word,
    Cardinal,
    UInt64,
    NativeInt,
    NativeUInt,
}

impl IntKind {
    pub fn name(&self) -> &'static str {
        match self {
            IntKind::ShortInt => "ShortInt",
            IntKind::SmallInt => "SmallInt",
            IntKind::Integer => "Integer",
            IntKind::Int64 => "Int64",
            IntKind::Byte => "Byte",
            IntKind::Word => "Word",
            IntKind::Cardinal => "Cardinal",
            IntKind::UInt64 => "UInt64",
            IntKind::NativeInt => "NativeInt",
            IntKind::NativeUInt => "NativeUInt",
        }
    }

    pub fn is_pointer_sized(&self) -> bool {
        matches!(self, IntKind::NativeInt | IntKind::NativeUInt)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            IntKind::ShortInt | IntKind::SmallInt | IntKind::Integer | IntKind::Int64 | IntKind::NativeInt
        )
    }

    /// Width in bits; `None` for pointer-sized integers.
    pub fn bits(&self) -> Option<u8> {
        match self {
            IntKind::ShortInt | IntKind::Byte => Some(8),
            IntKind::SmallInt | IntKind::Word => Some(16),
            IntKind::Integer | IntKind::Cardinal => Some(32),
            IntKind::Int64 | IntKind::UInt64 => Some(64),
            IntKind::NativeInt | IntKind::NativeUInt => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CharKind {
    Ansi,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RealKind {
    Single,
    Double,
    Extended,
    Currency,
    Comp,
}

impl RealKind {
    pub fn name(&self) -> &'static str {
        match self {
            RealKind::Single => "Single",
            RealKind::Double => "Double",
            RealKind::Extended => "Extended",
            RealKind::Currency => "Currency",
            RealKind::Comp => "Comp",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            RealKind::Single => 0,
            RealKind::Currency | RealKind::Comp => 1,
            RealKind::Double => 2,
            RealKind::Extended => 3,
        }
    }

    pub fn widens_to(&self, other: RealKind) -> bool {
        self.rank() <= other.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StringKind {
    Unicode,
    Ansi,
    Short,
    Wide,
}

impl StringKind {
    pub fn is_ansi(&self) -> bool {
        matches!(self, StringKind::Ansi | StringKind::Short)
    }
}

/// Built-in type registered in the `System` unit by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Intrinsic {
    Int(IntKind),
    Boolean,
    Char(CharKind),
    Real(RealKind),
    Str(StringKind),
    Pointer,
    PChar(CharKind),
    Variant,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProcSignature {
    pub params: Vec<(ParamMode, TypeId)>,
    pub result: Option<TypeId>,
    pub of_object: bool,
    pub is_reference: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TypeKind {
    /// Resolution failed; compatible with everything.
    Unknown,
    /// Untyped `var`/`const` parameter.
    Untyped,
    /// No value (procedure call result).
    Void,
    Nil,
    Int(IntKind),
    Boolean,
    Char(CharKind),
    Real(RealKind),
    Str(StringKind),
    /// `None` is the untyped `Pointer`.
    Pointer(Option<TypeId>),
    Variant,
    Class { decl: DeclId, args: Vec<TypeId> },
    Interface { decl: DeclId, args: Vec<TypeId> },
    /// Records and old-style objects.
    Record { decl: DeclId, args: Vec<TypeId> },
    /// `class of T`, and the value of a class type name.
    ClassRef(TypeId),
    Enum(DeclId),
    Subrange(TypeId),
    Set(TypeId),
    Array { element: TypeId, dynamic: bool },
    ArrayOfConst,
    File,
    Procedural(Box<ProcSignature>),
    /// `type TFoo = type Integer;`
    Alias { decl: DeclId, target: TypeId },
    TypeParam(DeclId),
}

impl TypeKind {
    /// Declaration behind a named structured type.
    pub fn decl(&self) -> Option<DeclId> {
        match self {
            TypeKind::Class { decl, .. }
            | TypeKind::Interface { decl, .. }
            | TypeKind::Record { decl, .. }
            | TypeKind::Enum(decl)
            | TypeKind::Alias { decl, .. }
            | TypeKind::TypeParam(decl) => Some(*decl),
            _ => None,
        }
    }

    pub fn type_args(&self) -> &[TypeId] {
        match self {
            TypeKind::Class { args, .. }
            | TypeKind::Interface { args, .. }
            | TypeKind::Record { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_ordinal(&self) -> bool {
        matches!(
            self,
            TypeKind::Int(_)
                | TypeKind::Boolean
                | TypeKind::Char(_)
                | TypeKind::Enum(_)
                | TypeKind::Subrange(_)
        )
    }
}
