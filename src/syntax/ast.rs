//! Owned syntax tree for Delphi source files.
//!
//! Nodes that later phases attach results to (expressions, type
//! expressions, type declarations, routines, blocks and exception
//! handlers) carry a [`NodeId`] unique within their file. Resolution never
//! mutates the tree; results live in side tables keyed by `NodeId`.

use crate::span::Span;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Dotted name such as a unit name `System.SysUtils`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualifiedName {
    pub parts: Vec<Ident>,
    pub span: Span,
}

impl QualifiedName {
    pub fn dotted(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn last(&self) -> Option<&Ident> {
        self.parts.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileKind {
    Unit,
    Program,
    Library,
    Package,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    pub kind: FileKind,
    pub name: QualifiedName,
    /// `interface` section of a unit.
    pub interface: Option<Section>,
    /// `implementation` section of a unit, or the declaration part of a
    /// program or library.
    pub implementation: Option<Section>,
    pub initialization: Option<Block>,
    pub finalization: Option<Block>,
    /// `begin ... end.` of a program or library.
    pub main_block: Option<Block>,
    pub span: Span,
    /// Number of node ids handed out while parsing this file.
    pub node_count: u32,
}

impl SourceFile {
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.interface.iter().chain(self.implementation.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SectionKind {
    Interface,
    Implementation,
    Main,
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub uses: Option<UsesClause>,
    pub decls: Vec<Decl>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsesClause {
    pub units: Vec<UsedUnit>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsedUnit {
    pub name: QualifiedName,
    /// `in 'path\file.pas'` in program files.
    pub path: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum Decl {
    Types(Vec<TypeDecl>),
    Consts(Vec<ConstDecl>),
    Vars(Vec<VarDecl>),
    Routine(Box<RoutineDecl>),
    Labels(Vec<Ident>),
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeParam {
    pub name: Ident,
    pub constraints: Vec<TypeExpr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeDecl {
    pub id: NodeId,
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub ty: TypeExpr,
    /// `type TFoo = type Integer;`
    pub strong_alias: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeExpr {
    pub id: NodeId,
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StructKind {
    Class,
    Interface,
    DispInterface,
    Record,
    Object,
}

#[derive(Debug, Clone, Serialize)]
pub enum TypeExprKind {
    /// `TFoo`, `System.TObject`, `TList<Integer>`
    Named {
        path: Vec<Ident>,
        args: Vec<TypeExpr>,
    },
    /// `string`, `string[20]`
    String { length: Option<Box<Expr>> },
    Struct(Box<StructType>),
    /// `TFoo = class;` / `IFoo = interface;`
    Forward(StructKind),
    ClassOf(Box<TypeExpr>),
    Pointer(Box<TypeExpr>),
    /// `array of T` (no dimensions) or `array[0..9, Boolean] of T`
    Array {
        dims: Vec<TypeExpr>,
        element: Box<TypeExpr>,
    },
    /// `array of const`
    ArrayOfConst,
    Set(Box<TypeExpr>),
    File(Option<Box<TypeExpr>>),
    Enum(Vec<EnumMember>),
    Subrange {
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Procedural(Box<ProceduralType>),
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumMember {
    pub name: Ident,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProceduralType {
    pub params: Vec<ParamGroup>,
    pub return_type: Option<TypeExpr>,
    pub of_object: bool,
    /// `reference to procedure ...`
    pub is_reference: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Visibility {
    StrictPrivate,
    Private,
    StrictProtected,
    Protected,
    Public,
    Published,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::StrictPrivate => "strict private",
            Visibility::Private => "private",
            Visibility::StrictProtected => "strict protected",
            Visibility::Protected => "protected",
            Visibility::Public => "public",
            Visibility::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructType {
    pub kind: StructKind,
    /// Ancestor followed by implemented interfaces.
    pub heritage: Vec<TypeExpr>,
    /// `class helper for TFoo`
    pub helper_for: Option<TypeExpr>,
    pub sections: Vec<VisibilitySection>,
    pub variant: Option<VariantPart>,
    /// False for `TFoo = class(TBar);`
    pub has_body: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_packed: bool,
}

impl StructType {
    pub fn members(&self) -> impl Iterator<Item = (&Member, Visibility)> {
        self.sections
            .iter()
            .flat_map(|s| s.members.iter().map(move |m| (m, s.visibility)))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.members.is_empty()) && self.variant.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VisibilitySection {
    pub visibility: Visibility,
    /// True when the section keyword was written out.
    pub explicit: bool,
    pub members: Vec<Member>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum Member {
    Field(FieldDecl),
    Method(Box<RoutineDecl>),
    Property(PropertyDecl),
    Types(Vec<TypeDecl>),
    Consts(Vec<ConstDecl>),
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDecl {
    pub names: Vec<Ident>,
    pub ty: TypeExpr,
    pub is_class_var: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantPart {
    pub tag: Option<Ident>,
    pub tag_type: TypeExpr,
    pub cases: Vec<VariantCase>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantCase {
    pub labels: Vec<Expr>,
    pub fields: Vec<FieldDecl>,
    pub nested: Option<Box<VariantPart>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyDecl {
    pub name: Ident,
    pub params: Vec<ParamGroup>,
    /// `None` for a redeclaration that only changes visibility.
    pub ty: Option<TypeExpr>,
    pub read: Option<Expr>,
    pub write: Option<Expr>,
    pub is_class: bool,
    pub is_default: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoutineKind {
    Procedure,
    Function,
    Constructor,
    Destructor,
    Operator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoutineDirectives {
    pub overload: bool,
    pub is_virtual: bool,
    pub is_dynamic: bool,
    pub is_override: bool,
    pub is_abstract: bool,
    pub reintroduce: bool,
    pub is_static: bool,
    pub forward: bool,
    pub external: bool,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineHeading {
    pub kind: RoutineKind,
    pub is_class_method: bool,
    /// `Foo`, or `TOwner.Foo` / `TOuter.TInner.Foo` in implementations.
    pub name: Vec<Ident>,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<ParamGroup>,
    /// False when the parameter list was omitted entirely.
    pub has_param_list: bool,
    pub return_type: Option<TypeExpr>,
    pub directives: RoutineDirectives,
    pub span: Span,
}

impl RoutineHeading {
    pub fn simple_name(&self) -> Option<&Ident> {
        self.name.last()
    }

    pub fn param_count(&self) -> usize {
        self.params.iter().map(|g| g.names.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineDecl {
    pub id: NodeId,
    pub heading: RoutineHeading,
    /// `None` for headings in interface sections, class bodies, forward and
    /// external routines.
    pub body: Option<RoutineBody>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineBody {
    pub decls: Vec<Decl>,
    pub block: Block,
    pub is_asm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParamMode {
    Value,
    Const,
    Var,
    Out,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamGroup {
    pub mode: ParamMode,
    pub names: Vec<Ident>,
    /// `None` for untyped `var`/`const`/`out` parameters.
    pub ty: Option<TypeExpr>,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstDecl {
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
    pub is_resource_string: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct VarDecl {
    pub names: Vec<Ident>,
    pub ty: TypeExpr,
    pub init: Option<Expr>,
    pub is_thread_var: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// `var X: Integer := 1;` / `const C = 2;` inside a statement list, and
/// `for var I := ...`.
#[derive(Debug, Clone, Serialize)]
pub struct InlineVar {
    pub names: Vec<Ident>,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub is_const: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum ForTarget {
    Existing(Expr),
    Inline(InlineVar),
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseArm {
    pub labels: Vec<Expr>,
    pub body: Box<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptHandler {
    pub id: NodeId,
    pub name: Option<Ident>,
    pub ty: TypeExpr,
    pub body: Option<Box<Stmt>>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum TryHandler {
    Finally(Vec<Stmt>),
    Except {
        handlers: Vec<ExceptHandler>,
        else_branch: Option<Vec<Stmt>>,
        /// Statements of an `except` block without `on` handlers.
        statements: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub enum StmtKind {
    Empty,
    Compound(Block),
    Assign {
        target: Expr,
        value: Expr,
    },
    /// Call or other expression used as a statement.
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Option<Box<Stmt>>,
        else_branch: Option<Box<Stmt>>,
    },
    Case {
        selector: Expr,
        arms: Vec<CaseArm>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Repeat {
        body: Vec<Stmt>,
        cond: Expr,
    },
    For {
        target: ForTarget,
        from: Expr,
        to: Expr,
        downto: bool,
        body: Box<Stmt>,
    },
    ForIn {
        target: ForTarget,
        collection: Expr,
        body: Box<Stmt>,
    },
    With {
        objects: Vec<Expr>,
        body: Box<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handler: TryHandler,
    },
    Raise {
        exception: Option<Expr>,
        at: Option<Expr>,
    },
    Goto(Ident),
    Labeled {
        label: Ident,
        stmt: Box<Stmt>,
    },
    InlineVar(InlineVar),
    Asm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Divide,
    IntDiv,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    Is,
    As,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Divide => "/",
            BinaryOp::IntDiv => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::In => "in",
            BinaryOp::Is => "is",
            BinaryOp::As => "as",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::In
                | BinaryOp::Is
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Integer(i128),
    Real(f64),
    /// Decoded value of a quoted string / control character sequence.
    String(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AnonymousMethod {
    pub id: NodeId,
    pub kind: RoutineKind,
    pub params: Vec<ParamGroup>,
    pub return_type: Option<TypeExpr>,
    pub decls: Vec<Decl>,
    pub block: Block,
}

#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    Name(Ident),
    Member {
        object: Box<Expr>,
        member: Ident,
    },
    /// Explicit type arguments: `TList<Integer>` in expression position.
    Generic {
        base: Box<Expr>,
        args: Vec<TypeExpr>,
    },
    /// Call or, when the callee turns out to be a type, a value cast.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        indices: Vec<Expr>,
    },
    Deref(Box<Expr>),
    AddressOf(Box<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Paren(Box<Expr>),
    Literal(Literal),
    Nil,
    SetConstructor(Vec<Expr>),
    /// `A..B` inside set constructors and case labels.
    Range {
        low: Box<Expr>,
        high: Box<Expr>,
    },
    /// `inherited` or `inherited Foo`.
    Inherited(Option<Ident>),
    AnonymousMethod(Box<AnonymousMethod>),
    /// `(1, 2, 3)` typed array constant.
    Tuple(Vec<Expr>),
    /// `(X: 1; Y: 2)` typed record constant.
    RecordLiteral(Vec<(Ident, Expr)>),
    /// Parse error placeholder.
    Error,
}

impl Expr {
    /// Strip any number of enclosing parentheses.
    pub fn unparenthesized(&self) -> &Expr {
        let mut expr = self;
        while let ExprKind::Paren(inner) = &expr.kind {
            expr = inner;
        }
        expr
    }

    /// Simple or dotted name as written, e.g. `Self.FItems`, when the
    /// expression consists only of names and member accesses.
    pub fn name_path(&self) -> Option<Vec<&Ident>> {
        match &self.kind {
            ExprKind::Name(ident) => Some(vec![ident]),
            ExprKind::Member { object, member } => {
                let mut path = object.name_path()?;
                path.push(member);
                Some(path)
            }
            _ => None,
        }
    }
}
