//! Read-only traversal over the syntax tree.
//!
//! Implementors override the `visit_*` hooks they care about and call the
//! matching `walk_*` function to continue into children.

use crate::syntax::ast::*;

pub trait Visitor {
    fn visit_section(&mut self, section: &Section) {
        walk_section(self, section);
    }

    fn visit_decl(&mut self, decl: &Decl) {
        walk_decl(self, decl);
    }

    fn visit_type_decl(&mut self, decl: &TypeDecl) {
        walk_type_decl(self, decl);
    }

    fn visit_type_expr(&mut self, ty: &TypeExpr) {
        walk_type_expr(self, ty);
    }

    fn visit_routine(&mut self, routine: &RoutineDecl) {
        walk_routine(self, routine);
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_file<V: Visitor + ?Sized>(v: &mut V, file: &SourceFile) {
    for section in file.sections() {
        v.visit_section(section);
    }
    for block in [&file.initialization, &file.finalization, &file.main_block]
        .into_iter()
        .flatten()
    {
        v.visit_block(block);
    }
}

pub fn walk_section<V: Visitor + ?Sized>(v: &mut V, section: &Section) {
    for decl in &section.decls {
        v.visit_decl(decl);
    }
}

pub fn walk_decl<V: Visitor + ?Sized>(v: &mut V, decl: &Decl) {
    match decl {
        Decl::Types(types) => {
            for ty in types {
                v.visit_type_decl(ty);
            }
        }
        Decl::Consts(consts) => walk_consts(v, consts),
        Decl::Vars(vars) => {
            for var in vars {
                v.visit_type_expr(&var.ty);
                if let Some(init) = &var.init {
                    v.visit_expr(init);
                }
            }
        }
        Decl::Routine(routine) => v.visit_routine(routine),
        Decl::Labels(_) => {}
    }
}

fn walk_consts<V: Visitor + ?Sized>(v: &mut V, consts: &[ConstDecl]) {
    for constant in consts {
        if let Some(ty) = &constant.ty {
            v.visit_type_expr(ty);
        }
        v.visit_expr(&constant.value);
    }
}

pub fn walk_type_decl<V: Visitor + ?Sized>(v: &mut V, decl: &TypeDecl) {
    v.visit_type_expr(&decl.ty);
}

fn walk_params<V: Visitor + ?Sized>(v: &mut V, params: &[ParamGroup]) {
    for group in params {
        if let Some(ty) = &group.ty {
            v.visit_type_expr(ty);
        }
        if let Some(default) = &group.default {
            v.visit_expr(default);
        }
    }
}

pub fn walk_type_expr<V: Visitor + ?Sized>(v: &mut V, ty: &TypeExpr) {
    match &ty.kind {
        TypeExprKind::Named { args, .. } => {
            for arg in args {
                v.visit_type_expr(arg);
            }
        }
        TypeExprKind::String { length } => {
            if let Some(length) = length {
                v.visit_expr(length);
            }
        }
        TypeExprKind::Struct(structure) => {
            for parent in &structure.heritage {
                v.visit_type_expr(parent);
            }
            if let Some(target) = &structure.helper_for {
                v.visit_type_expr(target);
            }
            for (member, _) in structure.members() {
                match member {
                    Member::Field(field) => v.visit_type_expr(&field.ty),
                    Member::Method(method) => v.visit_routine(method),
                    Member::Property(property) => {
                        walk_params(v, &property.params);
                        if let Some(ty) = &property.ty {
                            v.visit_type_expr(ty);
                        }
                    }
                    Member::Types(types) => {
                        for nested in types {
                            v.visit_type_decl(nested);
                        }
                    }
                    Member::Consts(consts) => walk_consts(v, consts),
                }
            }
            if let Some(variant) = &structure.variant {
                walk_variant(v, variant);
            }
        }
        TypeExprKind::Forward(_) | TypeExprKind::ArrayOfConst | TypeExprKind::Enum(_) => {}
        TypeExprKind::ClassOf(inner) | TypeExprKind::Pointer(inner) | TypeExprKind::Set(inner) => {
            v.visit_type_expr(inner)
        }
        TypeExprKind::Array { dims, element } => {
            for dim in dims {
                v.visit_type_expr(dim);
            }
            v.visit_type_expr(element);
        }
        TypeExprKind::File(inner) => {
            if let Some(inner) = inner {
                v.visit_type_expr(inner);
            }
        }
        TypeExprKind::Subrange { low, high } => {
            v.visit_expr(low);
            v.visit_expr(high);
        }
        TypeExprKind::Procedural(proc) => {
            walk_params(v, &proc.params);
            if let Some(ret) = &proc.return_type {
                v.visit_type_expr(ret);
            }
        }
    }
}

fn walk_variant<V: Visitor + ?Sized>(v: &mut V, variant: &VariantPart) {
    v.visit_type_expr(&variant.tag_type);
    for case in &variant.cases {
        for field in &case.fields {
            v.visit_type_expr(&field.ty);
        }
        if let Some(nested) = &case.nested {
            walk_variant(v, nested);
        }
    }
}

pub fn walk_routine<V: Visitor + ?Sized>(v: &mut V, routine: &RoutineDecl) {
    walk_params(v, &routine.heading.params);
    if let Some(ret) = &routine.heading.return_type {
        v.visit_type_expr(ret);
    }
    if let Some(body) = &routine.body {
        for decl in &body.decls {
            v.visit_decl(decl);
        }
        v.visit_block(&body.block);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &Block) {
    for stmt in &block.stmts {
        v.visit_stmt(stmt);
    }
}

fn walk_stmts<V: Visitor + ?Sized>(v: &mut V, stmts: &[Stmt]) {
    for stmt in stmts {
        v.visit_stmt(stmt);
    }
}

fn walk_inline_var<V: Visitor + ?Sized>(v: &mut V, var: &InlineVar) {
    if let Some(ty) = &var.ty {
        v.visit_type_expr(ty);
    }
    if let Some(init) = &var.init {
        v.visit_expr(init);
    }
}

fn walk_for_target<V: Visitor + ?Sized>(v: &mut V, target: &ForTarget) {
    match target {
        ForTarget::Existing(expr) => v.visit_expr(expr),
        ForTarget::Inline(var) => walk_inline_var(v, var),
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Empty | StmtKind::Goto(_) | StmtKind::Asm => {}
        StmtKind::Compound(block) => v.visit_block(block),
        StmtKind::Assign { target, value } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        StmtKind::Expr(expr) => v.visit_expr(expr),
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            v.visit_expr(cond);
            if let Some(then_branch) = then_branch {
                v.visit_stmt(then_branch);
            }
            if let Some(else_branch) = else_branch {
                v.visit_stmt(else_branch);
            }
        }
        StmtKind::Case {
            selector,
            arms,
            else_branch,
        } => {
            v.visit_expr(selector);
            for arm in arms {
                for label in &arm.labels {
                    v.visit_expr(label);
                }
                v.visit_stmt(&arm.body);
            }
            if let Some(else_branch) = else_branch {
                walk_stmts(v, else_branch);
            }
        }
        StmtKind::While { cond, body } => {
            v.visit_expr(cond);
            v.visit_stmt(body);
        }
        StmtKind::Repeat { body, cond } => {
            walk_stmts(v, body);
            v.visit_expr(cond);
        }
        StmtKind::For {
            target,
            from,
            to,
            body,
            ..
        } => {
            walk_for_target(v, target);
            v.visit_expr(from);
            v.visit_expr(to);
            v.visit_stmt(body);
        }
        StmtKind::ForIn {
            target,
            collection,
            body,
        } => {
            walk_for_target(v, target);
            v.visit_expr(collection);
            v.visit_stmt(body);
        }
        StmtKind::With { objects, body } => {
            for object in objects {
                v.visit_expr(object);
            }
            v.visit_stmt(body);
        }
        StmtKind::Try { body, handler } => {
            walk_stmts(v, body);
            match handler {
                TryHandler::Finally(stmts) => walk_stmts(v, stmts),
                TryHandler::Except {
                    handlers,
                    else_branch,
                    statements,
                } => {
                    for handler in handlers {
                        v.visit_type_expr(&handler.ty);
                        if let Some(body) = &handler.body {
                            v.visit_stmt(body);
                        }
                    }
                    if let Some(else_branch) = else_branch {
                        walk_stmts(v, else_branch);
                    }
                    walk_stmts(v, statements);
                }
            }
        }
        StmtKind::Raise { exception, at } => {
            if let Some(exception) = exception {
                v.visit_expr(exception);
            }
            if let Some(at) = at {
                v.visit_expr(at);
            }
        }
        StmtKind::Labeled { stmt, .. } => v.visit_stmt(stmt),
        StmtKind::InlineVar(var) => walk_inline_var(v, var),
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Name(_)
        | ExprKind::Literal(_)
        | ExprKind::Nil
        | ExprKind::Inherited(_)
        | ExprKind::Error => {}
        ExprKind::Member { object, .. } => v.visit_expr(object),
        ExprKind::Generic { base, args } => {
            v.visit_expr(base);
            for arg in args {
                v.visit_type_expr(arg);
            }
        }
        ExprKind::Call { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Index { object, indices } => {
            v.visit_expr(object);
            for index in indices {
                v.visit_expr(index);
            }
        }
        ExprKind::Deref(inner) | ExprKind::AddressOf(inner) | ExprKind::Paren(inner) => {
            v.visit_expr(inner)
        }
        ExprKind::Unary { operand, .. } => v.visit_expr(operand),
        ExprKind::Binary { lhs, rhs, .. } => {
            v.visit_expr(lhs);
            v.visit_expr(rhs);
        }
        ExprKind::SetConstructor(elements) | ExprKind::Tuple(elements) => {
            for element in elements {
                v.visit_expr(element);
            }
        }
        ExprKind::Range { low, high } => {
            v.visit_expr(low);
            v.visit_expr(high);
        }
        ExprKind::AnonymousMethod(method) => {
            walk_params(v, &method.params);
            if let Some(ret) = &method.return_type {
                v.visit_type_expr(ret);
            }
            for decl in &method.decls {
                v.visit_decl(decl);
            }
            v.visit_block(&method.block);
        }
        ExprKind::RecordLiteral(fields) => {
            for (_, value) in fields {
                v.visit_expr(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parser::tests::parse;

    #[derive(Default)]
    struct Counter {
        routines: usize,
        stmts: usize,
        names: Vec<String>,
    }

    impl Visitor for Counter {
        fn visit_routine(&mut self, routine: &RoutineDecl) {
            self.routines += 1;
            walk_routine(self, routine);
        }

        fn visit_stmt(&mut self, stmt: &Stmt) {
            self.stmts += 1;
            walk_stmt(self, stmt);
        }

        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::Name(ident) = &expr.kind {
                self.names.push(ident.name.clone());
            }
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_walk_reaches_nested_code() {
        let (file, _) = parse(
            "unit A; interface type TFoo = class procedure Run; end;\nimplementation\nprocedure TFoo.Run;\nbegin\n  if A then begin B := C; end;\n  Go(procedure begin D; end);\nend;\nend.",
        );
        let mut counter = Counter::default();
        walk_file(&mut counter, &file);
        assert_eq!(counter.routines, 2);
        assert_eq!(counter.stmts, 5);
        assert_eq!(counter.names, vec!["A", "B", "C", "Go", "D"]);
    }
}
