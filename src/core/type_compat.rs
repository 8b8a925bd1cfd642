use crate::symbols::DeclId;
use crate::syntax::ast::ParamMode;
use crate::types::{CharKind, IntKind, StringKind, TypeArena, TypeId, TypeKind};

/// Classification of a value conversion between two types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// One side is `Unknown`; callers report nothing.
    Unknown,
    Identical,
    /// Lossless implicit conversion.
    Widening,
    /// Value may be truncated or lose precision.
    Narrowing,
    /// Crosses between a pointer-sized and a fixed-width integer
    /// representation.
    PlatformDependent,
    /// Unicode string or character data converted to an Ansi form.
    AnsiNarrowing,
    /// Implicitly convertible without a more specific classification.
    Convertible,
    Incompatible,
}

/// Quality of an argument/parameter match during overload resolution.
/// Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    Exact,
    Widening,
    Convertible,
    /// Untyped parameter or unknown argument.
    Untyped,
}

/// Type compatibility checker
///
/// Every predicate treats `Unknown` as compatible with everything so that
/// unresolved code never produces findings.
pub struct TypeCompatibility;

impl TypeCompatibility {
    pub fn is_same_type(arena: &TypeArena, a: TypeId, b: TypeId) -> bool {
        a == b || arena.is_unknown(a) || arena.is_unknown(b)
    }

    /// Check if a value of type `source` can be assigned to `target`
    pub fn is_assignable(arena: &TypeArena, source: TypeId, target: TypeId) -> bool {
        if Self::is_same_type(arena, source, target) {
            return true;
        }
        let source = arena.underlying(source);
        let target = arena.underlying(target);
        if source == target {
            return true;
        }

        match (arena.get(source), arena.get(target)) {
            (_, TypeKind::Untyped) | (TypeKind::Untyped, _) => true,
            (TypeKind::Variant, t) | (t, TypeKind::Variant) => !matches!(t, TypeKind::Void),
            (TypeKind::Void, _) | (_, TypeKind::Void) => false,

            (TypeKind::Int(_), TypeKind::Int(_) | TypeKind::Real(_)) => true,
            (TypeKind::Real(_), TypeKind::Real(_)) => true,
            (TypeKind::Boolean, TypeKind::Boolean) => true,
            (TypeKind::Char(_), TypeKind::Char(_) | TypeKind::Str(_)) => true,
            (TypeKind::Str(_), TypeKind::Str(_)) => true,
            (TypeKind::Enum(a), TypeKind::Enum(b)) => a == b,

            (
                TypeKind::Nil,
                TypeKind::Pointer(_)
                | TypeKind::Class { .. }
                | TypeKind::Interface { .. }
                | TypeKind::ClassRef(_)
                | TypeKind::Procedural(_)
                | TypeKind::Array { dynamic: true, .. }
                | TypeKind::Str(_),
            ) => true,

            (TypeKind::Pointer(_), TypeKind::Pointer(None))
            | (TypeKind::Pointer(None), TypeKind::Pointer(_)) => true,
            (TypeKind::Pointer(Some(a)), TypeKind::Pointer(Some(b))) => {
                Self::is_same_type(arena, *a, *b)
            }
            (
                TypeKind::Class { .. } | TypeKind::Interface { .. } | TypeKind::ClassRef(_),
                TypeKind::Pointer(None),
            ) => true,

            (TypeKind::Class { decl, .. }, TypeKind::Class { decl: ancestor, .. }) => {
                decl == ancestor || Self::class_descends(arena, *decl, *ancestor)
            }
            (
                TypeKind::Class { decl, .. } | TypeKind::Interface { decl, .. },
                TypeKind::Interface { decl: iface, .. },
            ) => decl == iface || Self::decl_implements(arena, *decl, *iface),
            (TypeKind::ClassRef(a), TypeKind::ClassRef(b)) => Self::is_assignable(arena, *a, *b),
            (TypeKind::Record { decl: a, .. }, TypeKind::Record { decl: b, .. }) => a == b,

            (TypeKind::Set(a), TypeKind::Set(b)) => Self::is_assignable(arena, *a, *b),
            (TypeKind::Array { element: a, .. }, TypeKind::Array { element: b, .. }) => {
                Self::is_same_type(arena, *a, *b)
            }
            (TypeKind::Array { .. }, TypeKind::ArrayOfConst) => true,
            (TypeKind::Procedural(a), TypeKind::Procedural(b)) => a.params.len() == b.params.len(),
            (TypeKind::TypeParam(_), _) | (_, TypeKind::TypeParam(_)) => true,
            _ => false,
        }
    }

    /// `ty` is a class or interface type strictly descending from
    /// `ancestor`, or implementing it when `ancestor` is an interface.
    pub fn inherits_from(arena: &TypeArena, ty: TypeId, ancestor: DeclId) -> bool {
        if arena.is_unknown(ty) {
            return true;
        }
        match Self::named_decl(arena, ty) {
            Some(decl) if decl != ancestor => {
                Self::class_descends(arena, decl, ancestor)
                    || Self::decl_implements(arena, decl, ancestor)
            }
            _ => false,
        }
    }

    pub fn implements_interface(arena: &TypeArena, ty: TypeId, iface: DeclId) -> bool {
        if arena.is_unknown(ty) {
            return true;
        }
        match Self::named_decl(arena, ty) {
            Some(decl) => decl == iface || Self::decl_implements(arena, decl, iface),
            None => false,
        }
    }

    /// Whether a class/interface declaration lies on the ancestor chain of
    /// another.
    pub fn class_descends(arena: &TypeArena, decl: DeclId, ancestor: DeclId) -> bool {
        arena
            .hierarchy(decl)
            .map(|h| h.ancestors.contains(&ancestor))
            .unwrap_or(false)
    }

    fn decl_implements(arena: &TypeArena, decl: DeclId, iface: DeclId) -> bool {
        arena
            .hierarchy(decl)
            .map(|h| h.interfaces.contains(&iface) || h.ancestors.contains(&iface))
            .unwrap_or(false)
    }

    fn named_decl(arena: &TypeArena, ty: TypeId) -> Option<DeclId> {
        match arena.get(arena.underlying(ty)) {
            TypeKind::Class { decl, .. } | TypeKind::Interface { decl, .. } => Some(*decl),
            TypeKind::ClassRef(inner) => Self::named_decl(arena, *inner),
            _ => None,
        }
    }

    /// Classify a cast or assignment from `from` to `to`.
    pub fn classify_conversion(arena: &TypeArena, from: TypeId, to: TypeId) -> Conversion {
        if arena.is_unknown(from) || arena.is_unknown(to) {
            return Conversion::Unknown;
        }
        if from == to {
            return Conversion::Identical;
        }
        let from = arena.underlying(from);
        let to = arena.underlying(to);
        if from == to {
            return Conversion::Identical;
        }

        match (arena.get(from), arena.get(to)) {
            (TypeKind::Int(a), TypeKind::Int(b)) => Self::classify_int(*a, *b),
            (TypeKind::Int(kind), t) | (t, TypeKind::Int(kind)) if Self::is_pointer_like(t) => {
                if kind.is_pointer_sized() {
                    Conversion::Convertible
                } else {
                    Conversion::PlatformDependent
                }
            }
            (TypeKind::Int(_), TypeKind::Real(_)) => Conversion::Widening,
            (TypeKind::Real(_), TypeKind::Int(_)) => Conversion::Narrowing,
            (TypeKind::Real(a), TypeKind::Real(b)) => {
                if a.widens_to(*b) {
                    Conversion::Widening
                } else {
                    Conversion::Narrowing
                }
            }
            (TypeKind::Str(a), TypeKind::Str(b)) if !a.is_ansi() && b.is_ansi() => {
                Conversion::AnsiNarrowing
            }
            (TypeKind::Char(CharKind::Wide), TypeKind::Char(CharKind::Ansi))
            | (TypeKind::Char(CharKind::Wide), TypeKind::Str(StringKind::Ansi))
            | (
                TypeKind::Str(StringKind::Unicode | StringKind::Wide),
                TypeKind::Char(CharKind::Ansi),
            ) => Conversion::AnsiNarrowing,
            (TypeKind::Pointer(Some(a)), TypeKind::Pointer(Some(b))) => {
                match (arena.get(*a), arena.get(*b)) {
                    (TypeKind::Char(CharKind::Wide), TypeKind::Char(CharKind::Ansi)) => {
                        Conversion::AnsiNarrowing
                    }
                    _ if a == b => Conversion::Identical,
                    _ => Conversion::Convertible,
                }
            }
            (TypeKind::Class { .. }, TypeKind::Class { .. })
                if Self::is_assignable(arena, from, to) =>
            {
                Conversion::Widening
            }
            _ if Self::is_assignable(arena, from, to) => Conversion::Convertible,
            _ => Conversion::Incompatible,
        }
    }

    fn classify_int(from: IntKind, to: IntKind) -> Conversion {
        match (from.bits(), to.bits()) {
            (None, None) => Conversion::Widening,
            (None, Some(_)) | (Some(_), None) => Conversion::PlatformDependent,
            (Some(a), Some(b)) => {
                let same_sign = from.is_signed() == to.is_signed();
                if (a < b && (same_sign || to.is_signed())) || (a == b && same_sign) {
                    Conversion::Widening
                } else {
                    Conversion::Narrowing
                }
            }
        }
    }

    /// Types represented as a machine pointer.
    fn is_pointer_like(kind: &TypeKind) -> bool {
        matches!(
            kind,
            TypeKind::Pointer(_)
                | TypeKind::Class { .. }
                | TypeKind::Interface { .. }
                | TypeKind::ClassRef(_)
                | TypeKind::Procedural(_)
        )
    }

    /// Assignment that silently truncates on some platform: a
    /// pointer-sized integer stored into a fixed-width one narrower than 64
    /// bits, or a 64-bit integer stored into a pointer-sized one.
    pub fn is_platform_truncation(arena: &TypeArena, from: TypeId, to: TypeId) -> bool {
        let (from, to) = (arena.underlying(from), arena.underlying(to));
        match (arena.get(from), arena.get(to)) {
            (TypeKind::Int(a), TypeKind::Int(b)) => match (a.bits(), b.bits()) {
                (None, Some(bits)) => bits < 64,
                (Some(64), None) => true,
                _ => false,
            },
            _ => false,
        }
    }

    /// Rank an argument against a parameter; `None` when it cannot match.
    pub fn match_rank(
        arena: &TypeArena,
        arg: TypeId,
        param: Option<TypeId>,
        mode: ParamMode,
    ) -> Option<MatchRank> {
        let param = match param {
            Some(param) if !matches!(arena.get(param), TypeKind::Untyped) => param,
            _ => return Some(MatchRank::Untyped),
        };
        if arena.is_unknown(arg) || arena.is_unknown(param) {
            return Some(MatchRank::Untyped);
        }
        if arg == param {
            return Some(MatchRank::Exact);
        }
        if matches!(mode, ParamMode::Var | ParamMode::Out) {
            // By-reference parameters need identical types.
            return (arena.underlying(arg) == arena.underlying(param)).then_some(MatchRank::Exact);
        }
        match Self::classify_conversion(arena, arg, param) {
            Conversion::Identical => Some(MatchRank::Exact),
            Conversion::Widening => Some(MatchRank::Widening),
            Conversion::Incompatible => None,
            Conversion::Unknown => Some(MatchRank::Untyped),
            _ if Self::is_assignable(arena, arg, param) => Some(MatchRank::Convertible),
            _ => None,
        }
    }
}
