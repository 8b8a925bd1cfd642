//! Read-only view of a resolved file that queries navigate.
//!
//! Nodes are numbered in document order, with a synthetic document node at
//! index 0 whose only child is the `File` node. Every node carries a `line`
//! attribute; reference nodes also carry `resolved` and, when bound,
//! `declKind`. Expressions and value declarations keep their resolved type
//! for the type predicates.

use crate::rules::FileModel;
use crate::span::Span;
use crate::symbols::DeclId;
use crate::syntax::ast::*;
use crate::syntax::visit::{self, Visitor};
use crate::types::TypeId;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

pub type QueryNodeId = usize;

pub const DOCUMENT: QueryNodeId = 0;

#[derive(Debug, Clone)]
pub struct QueryNode {
    pub kind: &'static str,
    pub attributes: IndexMap<&'static str, String>,
    pub parent: Option<QueryNodeId>,
    pub children: Vec<QueryNodeId>,
    pub line: u32,
    pub ty: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct QueryTree {
    nodes: Vec<QueryNode>,
}

impl QueryTree {
    pub fn build(model: &FileModel) -> Self {
        let decls_by_start = model
            .symbols()
            .decls
            .iter()
            .filter(|d| d.implicit.is_none() && d.kind.is_value())
            .map(|d| (d.span.start, d.id))
            .collect();
        let mut builder = Builder {
            model,
            nodes: vec![QueryNode {
                kind: "#document",
                attributes: IndexMap::new(),
                parent: None,
                children: Vec::new(),
                line: 0,
                ty: None,
            }],
            stack: vec![DOCUMENT],
            decls_by_start,
            visibility: None,
            type_name: None,
        };
        builder.file(model.file);
        QueryTree { nodes: builder.nodes }
    }

    pub fn node(&self, id: QueryNodeId) -> &QueryNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn attribute(&self, id: QueryNodeId, name: &str) -> Option<&str> {
        self.nodes[id].attributes.get(name).map(String::as_str)
    }

    /// Text a node compares as: its name or literal value.
    pub fn string_value(&self, id: QueryNodeId) -> &str {
        self.attribute(id, "image")
            .or_else(|| self.attribute(id, "value"))
            .unwrap_or("")
    }

    pub fn descendants(&self, id: QueryNodeId, out: &mut Vec<QueryNodeId>) {
        for &child in &self.nodes[id].children {
            out.push(child);
            self.descendants(child, out);
        }
    }
}

struct Builder<'m> {
    model: &'m FileModel<'m>,
    nodes: Vec<QueryNode>,
    stack: Vec<QueryNodeId>,
    /// Value declarations keyed by the offset of their name.
    decls_by_start: FxHashMap<usize, DeclId>,
    /// Visibility of the class member being visited.
    visibility: Option<Visibility>,
    /// Name of the type declaration whose structure is being visited.
    type_name: Option<String>,
}

impl Builder<'_> {
    fn open(&mut self, kind: &'static str, span: Span) {
        let id = self.nodes.len();
        let parent = self.stack.last().copied();
        let mut attributes = IndexMap::new();
        attributes.insert("line", span.line.to_string());
        self.nodes.push(QueryNode {
            kind,
            attributes,
            parent,
            children: Vec::new(),
            line: span.line,
            ty: None,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        self.stack.push(id);
    }

    fn close(&mut self) {
        self.stack.pop();
    }

    fn current(&mut self) -> &mut QueryNode {
        let id = self.stack.last().copied().unwrap_or(DOCUMENT);
        &mut self.nodes[id]
    }

    fn attr(&mut self, name: &'static str, value: impl Into<String>) {
        self.current().attributes.insert(name, value.into());
    }

    fn name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.attr("image", name.clone());
        self.attr("name", name);
    }

    fn set_type(&mut self, ty: Option<TypeId>) {
        self.current().ty = ty;
    }

    fn bind(&mut self, node: NodeId) {
        match self.model.decl_of(node) {
            Some(decl) => {
                self.attr("resolved", "true");
                self.attr("declKind", decl.kind.as_str());
            }
            None => self.attr("resolved", "false"),
        }
    }

    fn declared_type(&self, name: &Ident) -> Option<TypeId> {
        let decl = self.decls_by_start.get(&name.span.start)?;
        self.model.resolution.decl_type(*decl)
    }

    /// Named declaration group: `name` is the first name, and each name
    /// also appears as an `Identifier` child.
    fn names(&mut self, names: &[Ident]) {
        if let Some(first) = names.first() {
            self.name(first.name.clone());
            let ty = self.declared_type(first);
            self.set_type(ty);
        }
        for name in names {
            self.open("Identifier", name.span);
            self.name(name.name.clone());
            let ty = self.declared_type(name);
            self.set_type(ty);
            self.close();
        }
    }

    fn visibility(&mut self, visibility: Visibility) {
        self.attr("visibility", visibility.as_str());
    }

    fn file(&mut self, file: &SourceFile) {
        self.open("File", file.span);
        self.name(file.name.dotted());
        self.attr(
            "kind",
            match file.kind {
                FileKind::Unit => "unit",
                FileKind::Program => "program",
                FileKind::Library => "library",
                FileKind::Package => "package",
            },
        );
        visit::walk_file(self, file);
        self.close();
    }

    fn constant(&mut self, constant: &ConstDecl) {
        self.open("ConstDecl", constant.span);
        self.names(std::slice::from_ref(&constant.name));
        if let Some(ty) = &constant.ty {
            self.visit_type_expr(ty);
        }
        self.visit_expr(&constant.value);
        self.close();
    }

    fn params(&mut self, params: &[ParamGroup]) {
        for group in params {
            self.open("Param", group.span);
            self.names(&group.names);
            self.attr(
                "kind",
                match group.mode {
                    ParamMode::Value => "value",
                    ParamMode::Const => "const",
                    ParamMode::Var => "var",
                    ParamMode::Out => "out",
                },
            );
            if let Some(ty) = &group.ty {
                self.visit_type_expr(ty);
            }
            if let Some(default) = &group.default {
                self.visit_expr(default);
            }
            self.close();
        }
    }

    fn field(&mut self, field: &FieldDecl, visibility: Visibility) {
        self.open("Field", field.span);
        self.names(&field.names);
        self.visibility(visibility);
        if field.is_class_var {
            self.attr("kind", "classVar");
        }
        self.visit_type_expr(&field.ty);
        self.close();
    }

    fn variant(&mut self, variant: &VariantPart) {
        self.visit_type_expr(&variant.tag_type);
        for case in &variant.cases {
            for field in &case.fields {
                self.field(field, Visibility::Public);
            }
            if let Some(nested) = &case.nested {
                self.variant(nested);
            }
        }
    }

    fn structure(&mut self, ty: &TypeExpr, structure: &StructType) {
        let kind = match structure.kind {
            StructKind::Class => "Class",
            StructKind::Interface | StructKind::DispInterface => "Interface",
            StructKind::Record | StructKind::Object => "Record",
        };
        let name = self.type_name.take();
        self.open(kind, ty.span);
        if let Some(name) = name {
            self.name(name);
        }
        for parent in &structure.heritage {
            self.visit_type_expr(parent);
        }
        if let Some(target) = &structure.helper_for {
            self.visit_type_expr(target);
        }
        for (member, visibility) in structure.members() {
            match member {
                Member::Field(field) => self.field(field, visibility),
                Member::Method(method) => {
                    self.visibility = Some(visibility);
                    self.visit_routine(method);
                }
                Member::Property(property) => {
                    self.open("Property", property.span);
                    self.names(std::slice::from_ref(&property.name));
                    self.visibility(visibility);
                    self.params(&property.params);
                    if let Some(ty) = &property.ty {
                        self.visit_type_expr(ty);
                    }
                    self.close();
                }
                Member::Types(types) => {
                    for nested in types {
                        self.visit_type_decl(nested);
                    }
                }
                Member::Consts(consts) => {
                    for constant in consts {
                        self.constant(constant);
                    }
                }
            }
        }
        if let Some(variant) = &structure.variant {
            self.variant(variant);
        }
        self.close();
    }

    fn statements(&mut self, kind: &'static str, stmts: &[Stmt], span: Span) {
        self.open(kind, stmts.first().map_or(span, |s| s.span));
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
        self.close();
    }

    fn try_stmt(&mut self, body: &[Stmt], handler: &TryHandler, span: Span) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
        match handler {
            TryHandler::Finally(stmts) => self.statements("Finally", stmts, span),
            TryHandler::Except {
                handlers,
                else_branch,
                statements,
            } => {
                self.open("Except", span);
                for handler in handlers {
                    self.open("Handler", handler.span);
                    if let Some(name) = &handler.name {
                        self.name(name.name.clone());
                    }
                    self.visit_type_expr(&handler.ty);
                    if let Some(body) = &handler.body {
                        self.visit_stmt(body);
                    }
                    self.close();
                }
                if let Some(stmts) = else_branch {
                    self.statements("Else", stmts, span);
                }
                for stmt in statements {
                    self.visit_stmt(stmt);
                }
                self.close();
            }
        }
    }
}

fn dotted(path: &[&Ident]) -> String {
    path.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(".")
}

impl Visitor for Builder<'_> {
    fn visit_section(&mut self, section: &Section) {
        self.open("Section", section.span);
        self.attr(
            "kind",
            match section.kind {
                SectionKind::Interface => "interface",
                SectionKind::Implementation => "implementation",
                SectionKind::Main => "main",
            },
        );
        if let Some(uses) = &section.uses {
            self.open("Uses", uses.span);
            for unit in &uses.units {
                self.open("UsedUnit", unit.span);
                self.name(unit.name.dotted());
                self.close();
            }
            self.close();
        }
        visit::walk_section(self, section);
        self.close();
    }

    fn visit_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Consts(consts) => {
                for constant in consts {
                    self.constant(constant);
                }
            }
            Decl::Vars(vars) => {
                for var in vars {
                    self.open("VarDecl", var.span);
                    self.names(&var.names);
                    self.attr("kind", if var.is_thread_var { "threadvar" } else { "var" });
                    self.visit_type_expr(&var.ty);
                    if let Some(init) = &var.init {
                        self.visit_expr(init);
                    }
                    self.close();
                }
            }
            _ => visit::walk_decl(self, decl),
        }
    }

    fn visit_type_decl(&mut self, decl: &TypeDecl) {
        self.open("TypeDecl", decl.span);
        self.name(decl.name.name.clone());
        if let Some(declaration) = self.model.node_decl(decl.id) {
            let ty = self.model.resolution.decl_type(declaration.id);
            self.set_type(ty);
        }
        self.type_name = Some(decl.name.name.clone());
        visit::walk_type_decl(self, decl);
        self.type_name = None;
        self.close();
    }

    fn visit_type_expr(&mut self, ty: &TypeExpr) {
        match &ty.kind {
            TypeExprKind::Struct(structure) => self.structure(ty, structure),
            TypeExprKind::Named { path, .. } => {
                self.open("TypeRef", ty.span);
                self.name(dotted(&path.iter().collect::<Vec<_>>()));
                self.bind(ty.id);
                let resolved = self.model.resolution.type_of(ty.id);
                self.set_type(resolved);
                visit::walk_type_expr(self, ty);
                self.close();
            }
            _ => {
                self.type_name = None;
                visit::walk_type_expr(self, ty);
            }
        }
    }

    fn visit_routine(&mut self, routine: &RoutineDecl) {
        let heading = &routine.heading;
        self.open("Routine", routine.span);
        self.name(dotted(&heading.name.iter().collect::<Vec<_>>()));
        self.attr(
            "kind",
            match heading.kind {
                RoutineKind::Procedure => "procedure",
                RoutineKind::Function => "function",
                RoutineKind::Constructor => "constructor",
                RoutineKind::Destructor => "destructor",
                RoutineKind::Operator => "operator",
            },
        );
        if let Some(visibility) = self.visibility.take() {
            self.visibility(visibility);
        }
        self.params(&heading.params);
        if let Some(ret) = &heading.return_type {
            self.visit_type_expr(ret);
        }
        if let Some(body) = &routine.body {
            for decl in &body.decls {
                self.visit_decl(decl);
            }
            self.visit_block(&body.block);
        }
        self.close();
    }

    fn visit_block(&mut self, block: &Block) {
        self.open("Block", block.span);
        visit::walk_block(self, block);
        self.close();
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        let kind = match &stmt.kind {
            StmtKind::Compound(block) => return self.visit_block(block),
            StmtKind::Empty => "Empty",
            StmtKind::Assign { .. } => "Assign",
            StmtKind::Expr(_) => "ExprStmt",
            StmtKind::If { .. } => "If",
            StmtKind::Case { .. } => "Case",
            StmtKind::While { .. } => "While",
            StmtKind::Repeat { .. } => "Repeat",
            StmtKind::For { .. } => "For",
            StmtKind::ForIn { .. } => "ForIn",
            StmtKind::With { .. } => "With",
            StmtKind::Try { .. } => "Try",
            StmtKind::Raise { .. } => "Raise",
            StmtKind::Goto(_) => "Goto",
            StmtKind::Labeled { .. } => "Labeled",
            StmtKind::InlineVar(_) => "InlineVar",
            StmtKind::Asm => "Asm",
        };
        self.open(kind, stmt.span);
        match &stmt.kind {
            StmtKind::Try { body, handler } => self.try_stmt(body, handler, stmt.span),
            StmtKind::Goto(label) | StmtKind::Labeled { label, .. } => {
                self.name(label.name.clone());
                visit::walk_stmt(self, stmt);
            }
            StmtKind::InlineVar(var) => {
                self.names(&var.names);
                self.attr("kind", if var.is_const { "const" } else { "var" });
                visit::walk_stmt(self, stmt);
            }
            StmtKind::For { downto, .. } => {
                self.attr("kind", if *downto { "downto" } else { "to" });
                visit::walk_stmt(self, stmt);
            }
            _ => visit::walk_stmt(self, stmt),
        }
        self.close();
    }

    fn visit_expr(&mut self, expr: &Expr) {
        let model = self.model;
        let resolution = &model.resolution;
        let cast = resolution.cast_target(expr.id);
        let kind = match &expr.kind {
            ExprKind::Name(_) => "Name",
            ExprKind::Member { .. } => "Member",
            ExprKind::Generic { .. } => "Generic",
            ExprKind::Call { .. } if cast.is_some() => "Cast",
            ExprKind::Call { .. } => "Call",
            ExprKind::Index { .. } => "Index",
            ExprKind::Deref(_) => "Deref",
            ExprKind::AddressOf(_) => "AddressOf",
            ExprKind::Unary { .. } => "Unary",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Paren(_) => "Paren",
            ExprKind::Literal(_) => "Literal",
            ExprKind::Nil => "Nil",
            ExprKind::SetConstructor(_) => "Set",
            ExprKind::Range { .. } => "Range",
            ExprKind::Inherited(_) => "Inherited",
            ExprKind::AnonymousMethod(_) => "AnonymousMethod",
            ExprKind::Tuple(_) => "Tuple",
            ExprKind::RecordLiteral(_) => "RecordLiteral",
            ExprKind::Error => "Error",
        };
        self.open(kind, expr.span);
        self.set_type(cast.or_else(|| resolution.type_of(expr.id)));
        match &expr.kind {
            ExprKind::Name(ident) | ExprKind::Member { member: ident, .. } => {
                self.name(ident.name.clone());
                self.bind(expr.id);
            }
            ExprKind::Inherited(ident) => {
                if let Some(ident) = ident {
                    self.name(ident.name.clone());
                }
                self.bind(expr.id);
            }
            ExprKind::Call { callee, .. } => {
                // `name` is the called member, `image` the full path.
                if let Some(path) = callee.unparenthesized().name_path() {
                    self.attr("image", dotted(&path));
                    if let Some(last) = path.last() {
                        self.attr("name", last.name.clone());
                    }
                }
                self.bind(callee.id);
            }
            ExprKind::Unary { op, .. } => self.attr("op", op.as_str()),
            ExprKind::Binary { op, .. } => self.attr("op", op.as_str()),
            ExprKind::Literal(literal) => {
                let (kind, value) = match literal {
                    Literal::Integer(v) => ("integer", v.to_string()),
                    Literal::Real(v) => ("real", v.to_string()),
                    Literal::String(v) => ("string", v.clone()),
                };
                self.attr("kind", kind);
                self.attr("value", value);
            }
            ExprKind::AnonymousMethod(method) => {
                self.attr(
                    "kind",
                    if method.kind == RoutineKind::Function { "function" } else { "procedure" },
                );
            }
            _ => {}
        }
        visit::walk_expr(self, expr);
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::resolution_phase::tests::Project;
    use crate::stdlib::BUILTIN_UNITS;
    use crate::symbols::UnitId;
    use std::path::Path;

    const SOURCE: &str = "unit A;\n\
        interface\n\
        uses System.SysUtils;\n\
        type\n\
          TShape = class\n\
          private\n\
            FSize: Integer;\n\
          public\n\
            procedure Grow(Amount: Integer);\n\
          end;\n\
        implementation\n\
        procedure TShape.Grow(Amount: Integer);\n\
        begin\n\
          FSize := FSize + Amount;\n\
          Missing(1);\n\
        end;\n\
        end.";

    fn with_tree(check: impl FnOnce(&QueryTree)) {
        let project = Project::new(&[SOURCE]);
        let resolution = project.resolve(0);
        let model = FileModel {
            path: Path::new("src/unit0.pas"),
            unit: UnitId(BUILTIN_UNITS.len() as u32),
            file: project.file(0),
            index: &project.index,
            resolution: &resolution,
        };
        check(&QueryTree::build(&model));
    }

    fn find(tree: &QueryTree, kind: &str) -> Vec<QueryNodeId> {
        let mut all = Vec::new();
        tree.descendants(DOCUMENT, &mut all);
        all.into_iter().filter(|id| tree.node(*id).kind == kind).collect()
    }

    #[test]
    fn test_structure_and_attributes() {
        with_tree(|tree| {
            let file = tree.node(DOCUMENT).children[0];
            assert_eq!(tree.node(file).kind, "File");
            assert_eq!(tree.attribute(file, "name"), Some("A"));

            let field = find(tree, "Field")[0];
            assert_eq!(tree.attribute(field, "name"), Some("FSize"));
            assert_eq!(tree.attribute(field, "visibility"), Some("private"));
            assert_eq!(tree.node(field).line, 7);
            let class = tree.node(field).parent.unwrap();
            assert_eq!(tree.node(class).kind, "Class");
            assert_eq!(tree.attribute(class, "name"), Some("TShape"));

            let routines = find(tree, "Routine");
            assert_eq!(tree.attribute(routines[0], "visibility"), Some("public"));
            assert_eq!(tree.attribute(routines[1], "name"), Some("TShape.Grow"));
            assert_eq!(tree.attribute(routines[1], "visibility"), None);
        });
    }

    #[test]
    fn test_references_and_types() {
        with_tree(|tree| {
            let binary = find(tree, "Binary")[0];
            assert_eq!(tree.attribute(binary, "op"), Some("+"));
            assert!(tree.node(binary).ty.is_some());

            let names = find(tree, "Name");
            let size = names.iter().find(|n| tree.attribute(**n, "name") == Some("FSize")).unwrap();
            assert_eq!(tree.attribute(*size, "declKind"), Some("field"));
            assert_eq!(tree.attribute(*size, "resolved"), Some("true"));

            let call = find(tree, "Call")[0];
            assert_eq!(tree.attribute(call, "name"), Some("Missing"));
            assert_eq!(tree.attribute(call, "resolved"), Some("false"));
            assert_eq!(tree.node(call).line, 15);
        });
    }

    #[test]
    fn test_document_order() {
        with_tree(|tree| {
            let mut all = Vec::new();
            tree.descendants(DOCUMENT, &mut all);
            assert!(all.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(all.len() + 1, tree.len());
        });
    }
}
