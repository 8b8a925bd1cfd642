use super::{DeclId, NameKey, ScopeId};
use crate::span::Span;
use crate::syntax::ast::{Expr, ParamMode, RoutineDirectives, RoutineKind, TypeExpr, Visibility};
use crate::types::Intrinsic;
use serde::Serialize;

/// Kind of declared entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeclKind {
    Unit,
    Type,
    Variable,
    Field,
    Parameter,
    Constant,
    EnumValue,
    Routine,
    Property,
    TypeParameter,
    Label,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Unit => "unit",
            DeclKind::Type => "type",
            DeclKind::Variable => "variable",
            DeclKind::Field => "field",
            DeclKind::Parameter => "parameter",
            DeclKind::Constant => "constant",
            DeclKind::EnumValue => "enumValue",
            DeclKind::Routine => "routine",
            DeclKind::Property => "property",
            DeclKind::TypeParameter => "typeParameter",
            DeclKind::Label => "label",
        }
    }

    /// Declarations that denote storage read and written by statements.
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            DeclKind::Variable
                | DeclKind::Field
                | DeclKind::Parameter
                | DeclKind::Constant
                | DeclKind::EnumValue
                | DeclKind::Property
        )
    }
}

/// Structural category of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeShape {
    Class,
    Interface,
    Record,
    Object,
    Enum,
    /// Any other type expression, including aliases.
    Other,
    /// Built-in type registered from the intrinsic table.
    Intrinsic,
}

/// Extra data carried by type declarations.
#[derive(Debug, Clone, Serialize)]
pub struct TypeInfo {
    pub shape: TypeShape,
    /// Member scope of classes, interfaces, records and enums.
    pub members: Option<ScopeId>,
    /// Ancestor followed by implemented interfaces, as written.
    pub heritage: Vec<TypeExpr>,
    pub helper_for: Option<TypeExpr>,
    pub type_params: Vec<DeclId>,
    /// Still a bare `class;` / `interface;` after merging.
    pub is_forward: bool,
    /// `TFoo = class(TBar);` has no body.
    pub has_body: bool,
    /// Interface without members, including a bodyless interface that
    /// never received a full declaration.
    pub is_empty_interface: bool,
    pub strong_alias: bool,
    pub intrinsic: Option<Intrinsic>,
    pub default_property: Option<DeclId>,
}

impl TypeInfo {
    pub fn new(shape: TypeShape) -> Self {
        Self {
            shape,
            members: None,
            heritage: Vec::new(),
            helper_for: None,
            type_params: Vec::new(),
            is_forward: false,
            has_body: true,
            is_empty_interface: false,
            strong_alias: false,
            intrinsic: None,
            default_property: None,
        }
    }

    pub fn intrinsic(intrinsic: Intrinsic) -> Self {
        Self {
            intrinsic: Some(intrinsic),
            ..Self::new(TypeShape::Intrinsic)
        }
    }

    pub fn generic_arity(&self) -> usize {
        self.type_params.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamInfo {
    pub name: String,
    pub mode: ParamMode,
    /// `None` for untyped `var`/`const`/`out` parameters.
    pub ty: Option<TypeExpr>,
    pub has_default: bool,
}

/// How an intrinsic routine's result type is derived from its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntrinsicResult {
    None,
    Type(Intrinsic),
    /// Same type as the first argument (`Copy`, `Succ`, `Abs`, `Default`).
    FirstArg,
    /// Ordinal bound of the first argument (`High`, `Low`).
    Bound,
}

/// Compiler-magic routine whose parameters cannot be expressed in Pascal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntrinsicRoutine {
    pub result: IntrinsicResult,
    /// Accepts any number of trailing arguments (`Writeln`, `Format`-style).
    pub variadic: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineInfo {
    pub kind: RoutineKind,
    pub is_class_method: bool,
    pub params: Vec<ParamInfo>,
    pub return_type: Option<TypeExpr>,
    pub directives: RoutineDirectives,
    pub type_params: Vec<DeclId>,
    /// Scope holding the routine's type parameters; parameter and result
    /// types resolve from here.
    pub signature_scope: ScopeId,
    /// Scope of the routine body once a body was seen.
    pub body_scope: Option<ScopeId>,
    pub implementation_span: Option<Span>,
    pub intrinsic: Option<IntrinsicRoutine>,
}

impl RoutineInfo {
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| !p.has_default).count()
    }

    pub fn has_body(&self) -> bool {
        self.body_scope.is_some()
    }

    pub fn is_function(&self) -> bool {
        self.return_type.is_some()
            || matches!(
                self.intrinsic,
                Some(IntrinsicRoutine {
                    result: IntrinsicResult::Type(_) | IntrinsicResult::FirstArg | IntrinsicResult::Bound,
                    ..
                })
            )
    }
}

/// Declarations the compiler introduces without source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Implicit {
    /// `Self` inside a method of `owner`.
    SelfRef { owner: DeclId, class_method: bool },
    /// `Result` inside a function.
    Result { routine: DeclId },
}

/// A declared entity.
///
/// Type references are kept as written (`type_expr`) and resolved lazily
/// against the declaring scope, so the declaration tables stay independent
/// of any per-file type arena.
#[derive(Debug, Clone, Serialize)]
pub struct Declaration {
    pub id: DeclId,
    pub name: String,
    pub key: NameKey,
    pub kind: DeclKind,
    /// Span of the declaring identifier.
    pub span: Span,
    /// Scope the declaration was registered in.
    pub scope: ScopeId,
    /// Declaring type for members and enum values.
    pub owner: Option<DeclId>,
    pub visibility: Visibility,
    pub type_expr: Option<TypeExpr>,
    /// Constant value or variable initializer.
    pub value: Option<Expr>,
    pub param_mode: Option<ParamMode>,
    pub is_class_member: bool,
    /// Byte offset from which an inline variable is visible.
    pub visible_from: usize,
    /// Spans of bare forward declarations merged into this one.
    pub forward_spans: Vec<Span>,
    pub implicit: Option<Implicit>,
    pub routine: Option<RoutineInfo>,
    pub type_info: Option<TypeInfo>,
    /// Index parameters of array properties.
    pub property_params: Vec<ParamInfo>,
}

impl Declaration {
    pub fn new(id: DeclId, name: &str, kind: DeclKind, span: Span, scope: ScopeId) -> Self {
        Self {
            id,
            name: name.to_string(),
            key: NameKey::new(name),
            kind,
            span,
            scope,
            owner: None,
            visibility: Visibility::Public,
            type_expr: None,
            value: None,
            param_mode: None,
            is_class_member: false,
            visible_from: 0,
            forward_spans: Vec::new(),
            implicit: None,
            routine: None,
            type_info: None,
            property_params: Vec::new(),
        }
    }

    pub fn is_routine(&self) -> bool {
        self.kind == DeclKind::Routine
    }

    pub fn is_type(&self) -> bool {
        self.kind == DeclKind::Type
    }

    pub fn shape(&self) -> Option<TypeShape> {
        self.type_info.as_ref().map(|info| info.shape)
    }

    pub fn generic_arity(&self) -> usize {
        match (&self.type_info, &self.routine) {
            (Some(info), _) => info.generic_arity(),
            (_, Some(routine)) => routine.type_params.len(),
            _ => 0,
        }
    }

    pub fn is_overload(&self) -> bool {
        self.routine
            .as_ref()
            .map(|r| r.directives.overload)
            .unwrap_or(false)
    }
}
