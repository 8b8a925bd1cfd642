// Runtime library units embedded at compile time

use crate::symbols::IntrinsicResult;
use crate::syntax::ast::ParamMode;
use crate::types::{CharKind, IntKind, Intrinsic, RealKind, StringKind};

/// `System`: root classes, interfaces and basic aliases
pub const SYSTEM: &str = include_str!("system.pas");

/// `System.SysUtils`: exception hierarchy and common routines
pub const SYSUTILS: &str = include_str!("sysutils.pas");

/// A unit shipped with the analyzer rather than supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinUnit {
    pub name: &'static str,
    pub path: &'static str,
    pub source: &'static str,
}

/// Built-in units in registration order; `System` comes first.
pub const BUILTIN_UNITS: &[BuiltinUnit] = &[
    BuiltinUnit {
        name: "System",
        path: "<builtin>/System.pas",
        source: SYSTEM,
    },
    BuiltinUnit {
        name: "System.SysUtils",
        path: "<builtin>/System.SysUtils.pas",
        source: SYSUTILS,
    },
];

/// Types the compiler knows by name, registered into `System`.
pub const INTRINSIC_TYPES: &[(&str, Intrinsic)] = &[
    ("Integer", Intrinsic::Int(IntKind::Integer)),
    ("LongInt", Intrinsic::Int(IntKind::Integer)),
    ("FixedInt", Intrinsic::Int(IntKind::Integer)),
    ("Int32", Intrinsic::Int(IntKind::Integer)),
    ("ShortInt", Intrinsic::Int(IntKind::ShortInt)),
    ("Int8", Intrinsic::Int(IntKind::ShortInt)),
    ("SmallInt", Intrinsic::Int(IntKind::SmallInt)),
    ("Int16", Intrinsic::Int(IntKind::SmallInt)),
    ("Int64", Intrinsic::Int(IntKind::Int64)),
    ("Byte", Intrinsic::Int(IntKind::Byte)),
    ("UInt8", Intrinsic::Int(IntKind::Byte)),
    ("Word", Intrinsic::Int(IntKind::Word)),
    ("UInt16", Intrinsic::Int(IntKind::Word)),
    ("Cardinal", Intrinsic::Int(IntKind::Cardinal)),
    ("LongWord", Intrinsic::Int(IntKind::Cardinal)),
    ("FixedUInt", Intrinsic::Int(IntKind::Cardinal)),
    ("UInt32", Intrinsic::Int(IntKind::Cardinal)),
    ("DWORD", Intrinsic::Int(IntKind::Cardinal)),
    ("UInt64", Intrinsic::Int(IntKind::UInt64)),
    ("NativeInt", Intrinsic::Int(IntKind::NativeInt)),
    ("IntPtr", Intrinsic::Int(IntKind::NativeInt)),
    ("NativeUInt", Intrinsic::Int(IntKind::NativeUInt)),
    ("UIntPtr", Intrinsic::Int(IntKind::NativeUInt)),
    ("THandle", Intrinsic::Int(IntKind::NativeUInt)),
    ("Boolean", Intrinsic::Boolean),
    ("ByteBool", Intrinsic::Boolean),
    ("WordBool", Intrinsic::Boolean),
    ("LongBool", Intrinsic::Boolean),
    ("Char", Intrinsic::Char(CharKind::Wide)),
    ("WideChar", Intrinsic::Char(CharKind::Wide)),
    ("AnsiChar", Intrinsic::Char(CharKind::Ansi)),
    ("Single", Intrinsic::Real(RealKind::Single)),
    ("Double", Intrinsic::Real(RealKind::Double)),
    ("Real", Intrinsic::Real(RealKind::Double)),
    ("Extended", Intrinsic::Real(RealKind::Extended)),
    ("Currency", Intrinsic::Real(RealKind::Currency)),
    ("Comp", Intrinsic::Real(RealKind::Comp)),
    ("UnicodeString", Intrinsic::Str(StringKind::Unicode)),
    ("AnsiString", Intrinsic::Str(StringKind::Ansi)),
    ("RawByteString", Intrinsic::Str(StringKind::Ansi)),
    ("UTF8String", Intrinsic::Str(StringKind::Ansi)),
    ("ShortString", Intrinsic::Str(StringKind::Short)),
    ("WideString", Intrinsic::Str(StringKind::Wide)),
    ("Pointer", Intrinsic::Pointer),
    ("PChar", Intrinsic::PChar(CharKind::Wide)),
    ("PWideChar", Intrinsic::PChar(CharKind::Wide)),
    ("PAnsiChar", Intrinsic::PChar(CharKind::Ansi)),
    ("Variant", Intrinsic::Variant),
    ("OleVariant", Intrinsic::Variant),
];

pub fn intrinsic_type(name: &str) -> Option<Intrinsic> {
    INTRINSIC_TYPES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, i)| *i)
}

/// Parameter of an intrinsic routine: name, passing mode, optional.
pub type IntrinsicParam = (&'static str, ParamMode, bool);

/// Compiler-magic routine registered into `System`.
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicSpec {
    pub name: &'static str,
    pub params: &'static [IntrinsicParam],
    pub result: IntrinsicResult,
    pub variadic: bool,
}

const fn routine(
    name: &'static str,
    params: &'static [IntrinsicParam],
    result: IntrinsicResult,
) -> IntrinsicSpec {
    IntrinsicSpec {
        name,
        params,
        result,
        variadic: false,
    }
}

const fn variadic(
    name: &'static str,
    params: &'static [IntrinsicParam],
    result: IntrinsicResult,
) -> IntrinsicSpec {
    IntrinsicSpec {
        name,
        params,
        result,
        variadic: true,
    }
}

use IntrinsicResult::{Bound, FirstArg, None as NoResult, Type};
use ParamMode::{Const, Out, Var};

const INT: IntrinsicResult = Type(Intrinsic::Int(IntKind::Integer));
const INT64: IntrinsicResult = Type(Intrinsic::Int(IntKind::Int64));
const EXTENDED: IntrinsicResult = Type(Intrinsic::Real(RealKind::Extended));
const BOOL: IntrinsicResult = Type(Intrinsic::Boolean);

pub const INTRINSIC_ROUTINES: &[IntrinsicSpec] = &[
    routine("Assigned", &[("P", Const, false)], BOOL),
    routine("Inc", &[("X", Var, false), ("N", Const, true)], NoResult),
    routine("Dec", &[("X", Var, false), ("N", Const, true)], NoResult),
    routine("Length", &[("S", Const, false)], INT),
    variadic("SetLength", &[("S", Var, false), ("NewLength", Const, false)], NoResult),
    routine("High", &[("X", Const, false)], Bound),
    routine("Low", &[("X", Const, false)], Bound),
    routine("Ord", &[("X", Const, false)], INT),
    routine("Chr", &[("X", Const, false)], Type(Intrinsic::Char(CharKind::Wide))),
    routine("Succ", &[("X", Const, false)], FirstArg),
    routine("Pred", &[("X", Const, false)], FirstArg),
    routine("SizeOf", &[("X", Const, false)], INT),
    routine("Exit", &[("Result", Const, true)], NoResult),
    routine("Break", &[], NoResult),
    routine("Continue", &[], NoResult),
    routine("Halt", &[("Code", Const, true)], NoResult),
    routine("New", &[("P", Var, false)], NoResult),
    routine("Dispose", &[("P", Var, false)], NoResult),
    routine("GetMem", &[("P", Var, false), ("Size", Const, false)], NoResult),
    routine("FreeMem", &[("P", Var, false), ("Size", Const, true)], NoResult),
    routine("ReallocMem", &[("P", Var, false), ("Size", Const, false)], NoResult),
    routine("FillChar", &[("X", Var, false), ("Count", Const, false), ("Value", Const, false)], NoResult),
    routine("Move", &[("Source", Const, false), ("Dest", Var, false), ("Count", Const, false)], NoResult),
    routine("Include", &[("S", Var, false), ("E", Const, false)], NoResult),
    routine("Exclude", &[("S", Var, false), ("E", Const, false)], NoResult),
    routine("Copy", &[("S", Const, false), ("Index", Const, true), ("Count", Const, true)], FirstArg),
    routine("Delete", &[("S", Var, false), ("Index", Const, false), ("Count", Const, false)], NoResult),
    routine("Insert", &[("Source", Const, false), ("S", Var, false), ("Index", Const, false)], NoResult),
    routine("Pos", &[("SubStr", Const, false), ("S", Const, false), ("Offset", Const, true)], INT),
    variadic("Concat", &[("S1", Const, false)], Type(Intrinsic::Str(StringKind::Unicode))),
    routine("Trunc", &[("X", Const, false)], INT64),
    routine("Round", &[("X", Const, false)], INT64),
    routine("Abs", &[("X", Const, false)], FirstArg),
    routine("Sqr", &[("X", Const, false)], FirstArg),
    routine("Sqrt", &[("X", Const, false)], EXTENDED),
    routine("Sin", &[("X", Const, false)], EXTENDED),
    routine("Cos", &[("X", Const, false)], EXTENDED),
    routine("ArcTan", &[("X", Const, false)], EXTENDED),
    routine("Ln", &[("X", Const, false)], EXTENDED),
    routine("Exp", &[("X", Const, false)], EXTENDED),
    routine("Int", &[("X", Const, false)], EXTENDED),
    routine("Frac", &[("X", Const, false)], EXTENDED),
    routine("Odd", &[("X", Const, false)], BOOL),
    routine("Hi", &[("X", Const, false)], Type(Intrinsic::Int(IntKind::Byte))),
    routine("Lo", &[("X", Const, false)], Type(Intrinsic::Int(IntKind::Byte))),
    routine("Swap", &[("X", Const, false)], FirstArg),
    routine("Default", &[("T", Const, false)], FirstArg),
    routine("TypeInfo", &[("T", Const, false)], Type(Intrinsic::Pointer)),
    routine("Addr", &[("X", Var, false)], Type(Intrinsic::Pointer)),
    routine("Ptr", &[("Address", Const, false)], Type(Intrinsic::Pointer)),
    routine("Str", &[("X", Const, false), ("S", Var, false)], NoResult),
    routine("Val", &[("S", Const, false), ("V", Var, false), ("Code", Out, false)], NoResult),
    routine("Initialize", &[("V", Var, false), ("Count", Const, true)], NoResult),
    routine("Finalize", &[("V", Var, false), ("Count", Const, true)], NoResult),
    routine("UniqueString", &[("S", Var, false)], NoResult),
    routine("Assert", &[("Condition", Const, false), ("Message", Const, true)], NoResult),
    variadic("Write", &[], NoResult),
    variadic("Writeln", &[], NoResult),
    variadic("Read", &[], NoResult),
    variadic("Readln", &[], NoResult),
];
