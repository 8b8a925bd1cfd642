//! Flow-sensitive detection of locals read before they are assigned.
//!
//! Each tracked local moves through `Uninitialized -> Partial -> Initialized`
//! as statements execute. Branches are analysed separately and merged with
//! the least initialized state of the paths that reach the merge point.
//! Paths ending in `Exit`, `raise`, `Break` or `Continue` do not reach it.

use crate::rules::{FileModel, Rule, RuleContext};
use crate::span::Span;
use crate::symbols::{DeclId, DeclKind, ScopeId, ScopeKind, SymbolIndex};
use crate::syntax::ast::*;
use crate::syntax::visit::{self, Visitor};
use crate::types::{StringKind, TypeKind};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct VariableInitialization;

impl Rule for VariableInitialization {
    fn visit_routine(&mut self, ctx: &mut RuleContext, routine: &RoutineDecl) {
        let Some(body) = &routine.body else {
            return;
        };
        if body.is_asm || contains_goto(&body.block) {
            return;
        }
        let model = ctx.model;
        let Some(scope) = model.symbols().node_scopes.get(&routine.id).copied() else {
            return;
        };
        let mut locals = tracked_locals(model, scope);
        // Nested routines may assign the enclosing locals at any call.
        for id in referenced_decls(model, |v| {
            for decl in &body.decls {
                if let Decl::Routine(nested) = decl {
                    v.visit_routine(nested);
                }
            }
        }) {
            locals.remove(&id);
        }
        if locals.is_empty() {
            return;
        }

        let mut flow = Flow::new(model, locals);
        let entry = Some(vec![Init::Uninitialized; flow.names.len()]);
        flow.stmts(&body.block.stmts, entry);
        for (span, local) in flow.findings {
            ctx.report(
                span,
                format!("Variable '{}' might not have been initialized", flow.names[local]),
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Init {
    Uninitialized,
    /// Some fields or elements assigned.
    Partial,
    Initialized,
}

/// Per-local state, `None` on paths that cannot reach this point.
type State = Option<Vec<Init>>;

fn join(a: State, b: State) -> State {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => Some(a.into_iter().zip(b).map(|(x, y)| x.min(y)).collect()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    /// Records and static arrays, written piecewise.
    Aggregate,
}

/// Locals declared directly in the body or in its inline blocks whose type
/// is known and not initialized by the compiler.
fn tracked_locals(model: &FileModel, body: ScopeId) -> FxHashMap<DeclId, Shape> {
    let index = model.index;
    model
        .symbols()
        .decls
        .iter()
        .filter(|d| d.kind == DeclKind::Variable && d.implicit.is_none())
        .filter(|d| in_body(index, d.scope, body))
        .filter_map(|d| {
            let ty = model.known_decl_type(d.id)?;
            let arena = model.arena();
            let shape = match arena.get(arena.underlying(ty)) {
                TypeKind::Int(_)
                | TypeKind::Boolean
                | TypeKind::Char(_)
                | TypeKind::Real(_)
                | TypeKind::Enum(_)
                | TypeKind::Subrange(_)
                | TypeKind::Set(_)
                | TypeKind::Pointer(_)
                | TypeKind::Class { .. }
                | TypeKind::ClassRef(_)
                | TypeKind::Str(StringKind::Short) => Shape::Scalar,
                TypeKind::Procedural(signature) if !signature.is_reference => Shape::Scalar,
                TypeKind::Record { .. } | TypeKind::Array { dynamic: false, .. } => Shape::Aggregate,
                // Strings, interfaces, variants and dynamic arrays start out
                // empty.
                _ => return None,
            };
            Some((d.id, shape))
        })
        .collect()
}

fn in_body(index: &SymbolIndex, mut scope: ScopeId, body: ScopeId) -> bool {
    loop {
        if scope == body {
            return true;
        }
        let current = index.scope(scope);
        match (current.kind, current.parent) {
            (ScopeKind::Block, Some(parent)) => scope = parent,
            _ => return false,
        }
    }
}

fn contains_goto(block: &Block) -> bool {
    struct Finder(bool);
    impl Visitor for Finder {
        fn visit_stmt(&mut self, stmt: &Stmt) {
            if matches!(stmt.kind, StmtKind::Goto(_) | StmtKind::Labeled { .. }) {
                self.0 = true;
            }
            visit::walk_stmt(self, stmt);
        }
    }
    let mut finder = Finder(false);
    finder.visit_block(block);
    finder.0
}

/// Declarations referenced by name anywhere the callback walks.
fn referenced_decls(model: &FileModel, walk: impl FnOnce(&mut dyn Visitor)) -> Vec<DeclId> {
    struct Names<'m> {
        model: &'m FileModel<'m>,
        found: Vec<DeclId>,
    }
    impl Visitor for Names<'_> {
        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::Name(_) = expr.kind {
                if let Some(decl) = self.model.resolution.decl(expr.id) {
                    self.found.push(decl);
                }
            }
            visit::walk_expr(self, expr);
        }
    }
    let mut names = Names {
        model,
        found: Vec::new(),
    };
    walk(&mut names);
    names.found
}

struct Flow<'m> {
    model: &'m FileModel<'m>,
    locals: FxHashMap<DeclId, usize>,
    shapes: Vec<Shape>,
    names: Vec<String>,
    reported: Vec<bool>,
    findings: Vec<(Span, usize)>,
    /// States reaching the `Break`s of each enclosing loop.
    breaks: Vec<State>,
    /// Re-running a region for its outgoing state only.
    silent: bool,
}

impl<'m> Flow<'m> {
    fn new(model: &'m FileModel<'m>, tracked: FxHashMap<DeclId, Shape>) -> Self {
        let mut tracked: Vec<_> = tracked.into_iter().collect();
        tracked.sort_by_key(|(id, _)| *id);
        let locals = tracked.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();
        let names = tracked.iter().map(|(id, _)| model.decl(*id).name.clone()).collect();
        let shapes = tracked.iter().map(|(_, shape)| *shape).collect();
        Self {
            model,
            locals,
            shapes,
            names,
            reported: vec![false; tracked.len()],
            findings: Vec::new(),
            breaks: Vec::new(),
            silent: false,
        }
    }

    fn local(&self, node: NodeId) -> Option<usize> {
        let decl = self.model.resolution.decl(node)?;
        self.locals.get(&decl).copied()
    }

    /// Local declared by an inline declaration's identifier.
    fn local_declared_at(&self, name: &Ident) -> Option<usize> {
        self.locals
            .iter()
            .find(|(id, _)| self.model.decl(**id).span == name.span)
            .map(|(_, local)| *local)
    }

    fn set(state: &mut State, local: usize, init: Init) {
        if let Some(values) = state {
            values[local] = init;
        }
    }

    fn stmts(&mut self, stmts: &[Stmt], mut state: State) -> State {
        for stmt in stmts {
            state = self.stmt(stmt, state);
        }
        state
    }

    fn stmt(&mut self, stmt: &Stmt, state: State) -> State {
        state.as_ref()?;
        match &stmt.kind {
            StmtKind::Empty | StmtKind::Asm | StmtKind::Goto(_) => state,
            StmtKind::Compound(block) => self.stmts(&block.stmts, state),
            StmtKind::Labeled { stmt, .. } => self.stmt(stmt, state),
            StmtKind::InlineVar(var) => self.inline_var(var, state),
            StmtKind::Assign { target, value } => {
                let state = self.expr(value, state);
                self.write(target, state)
            }
            StmtKind::Expr(expr) => self.call_statement(expr, state),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let state = self.expr(cond, state);
                let then_state = self.branch(then_branch.as_deref(), state.clone());
                let else_state = self.branch(else_branch.as_deref(), state);
                join(then_state, else_state)
            }
            StmtKind::Case {
                selector,
                arms,
                else_branch,
            } => {
                let state = self.expr(selector, state);
                let mut merged = match else_branch {
                    Some(stmts) => self.stmts(stmts, state.clone()),
                    None => state.clone(),
                };
                for arm in arms {
                    let arm_state = self.stmt(&arm.body, state.clone());
                    merged = join(merged, arm_state);
                }
                merged
            }
            StmtKind::While { cond, body } => {
                let state = self.expr(cond, state);
                self.breaks.push(None);
                let body_state = self.stmt(body, state.clone());
                let broken = self.breaks.pop().flatten();
                join(join(state, body_state), broken)
            }
            StmtKind::Repeat { body, cond } => {
                self.breaks.push(None);
                let body_state = self.stmts(body, state);
                let body_state = self.expr(cond, body_state);
                let broken = self.breaks.pop().flatten();
                join(body_state, broken)
            }
            StmtKind::For {
                target, from, to, body, ..
            } => {
                let state = self.expr(from, state);
                let state = self.expr(to, state);
                let state = self.for_target(target, state);
                self.loop_body(body, state)
            }
            StmtKind::ForIn {
                target,
                collection,
                body,
            } => {
                let state = self.expr(collection, state);
                let state = self.for_target(target, state);
                self.loop_body(body, state)
            }
            StmtKind::With { objects, body } => {
                let mut state = state;
                for object in objects {
                    // Members reached through `with` may write the object.
                    state = self.write_opaque(object, state);
                }
                self.stmt(body, state)
            }
            StmtKind::Try { body, handler } => self.try_stmt(body, handler, state),
            StmtKind::Raise { exception, at } => {
                let mut state = state;
                for expr in exception.iter().chain(at) {
                    state = self.expr(expr, state);
                }
                None
            }
        }
    }

    fn branch(&mut self, stmt: Option<&Stmt>, state: State) -> State {
        match stmt {
            Some(stmt) => self.stmt(stmt, state),
            None => state,
        }
    }

    /// Zero iterations are possible, so the entry state flows past the loop.
    fn loop_body(&mut self, body: &Stmt, state: State) -> State {
        self.breaks.push(None);
        let body_state = self.stmt(body, state.clone());
        let broken = self.breaks.pop().flatten();
        join(join(state, body_state), broken)
    }

    fn inline_var(&mut self, var: &InlineVar, state: State) -> State {
        let mut state = match &var.init {
            Some(init) => self.expr(init, state),
            None => state,
        };
        let init = if var.init.is_some() {
            Init::Initialized
        } else {
            Init::Uninitialized
        };
        for name in &var.names {
            if let Some(local) = self.local_declared_at(name) {
                Self::set(&mut state, local, init);
            }
        }
        state
    }

    fn for_target(&mut self, target: &ForTarget, state: State) -> State {
        match target {
            ForTarget::Existing(expr) => self.write(expr, state),
            ForTarget::Inline(var) => {
                let mut state = state;
                for name in &var.names {
                    if let Some(local) = self.local_declared_at(name) {
                        Self::set(&mut state, local, Init::Initialized);
                    }
                }
                state
            }
        }
    }

    fn try_stmt(&mut self, body: &[Stmt], handler: &TryHandler, state: State) -> State {
        let body_state = self.stmts(body, state.clone());
        // An exception may leave the body at any statement.
        let raised = join(state, body_state.clone());
        match handler {
            TryHandler::Finally(finally) => {
                self.stmts(finally, raised);
                body_state.as_ref()?;
                let silent = std::mem::replace(&mut self.silent, true);
                let out = self.stmts(finally, body_state);
                self.silent = silent;
                out
            }
            TryHandler::Except {
                handlers,
                else_branch,
                statements,
            } => {
                let mut merged = body_state;
                for handler in handlers {
                    let handled = self.branch(handler.body.as_deref(), raised.clone());
                    merged = join(merged, handled);
                }
                if let Some(stmts) = else_branch {
                    let handled = self.stmts(stmts, raised.clone());
                    merged = join(merged, handled);
                }
                if handlers.is_empty() && else_branch.is_none() {
                    let handled = self.stmts(statements, raised);
                    merged = join(merged, handled);
                }
                merged
            }
        }
    }

    /// Expression statements, including the jumps `Exit`, `Halt`, `Break`
    /// and `Continue`.
    fn call_statement(&mut self, expr: &Expr, state: State) -> State {
        let model = self.model;
        for name in ["Exit", "Halt", "Break", "Continue"] {
            if let Some(args) = model.rtl_call(expr, name) {
                let mut state = state;
                for arg in args {
                    state = self.expr(arg, state);
                }
                if name == "Break" {
                    if let Some(top) = self.breaks.last_mut() {
                        *top = join(top.take(), state);
                    }
                }
                return None;
            }
        }
        self.expr(expr, state)
    }

    fn read(&mut self, node: NodeId, span: Span, state: &State) {
        let (Some(local), Some(values)) = (self.local(node), state) else {
            return;
        };
        if values[local] == Init::Uninitialized && !self.reported[local] && !self.silent {
            self.reported[local] = true;
            self.findings.push((span, local));
        }
    }

    fn expr(&mut self, expr: &Expr, state: State) -> State {
        state.as_ref()?;
        match &expr.kind {
            ExprKind::Name(_) => {
                self.read(expr.id, expr.span, &state);
                state
            }
            ExprKind::Member { object, .. } => self.expr(object, state),
            ExprKind::Call { callee, args } => self.call(expr, callee, args, state),
            ExprKind::Index { object, indices } => {
                let state = self.expr(object, state);
                self.exprs(indices, state)
            }
            ExprKind::Deref(inner) | ExprKind::Paren(inner) => self.expr(inner, state),
            ExprKind::AddressOf(inner) => self.write_opaque(inner, state),
            ExprKind::Unary { operand, .. } => self.expr(operand, state),
            ExprKind::Binary { lhs, rhs, .. } => {
                let state = self.expr(lhs, state);
                self.expr(rhs, state)
            }
            ExprKind::Range { low, high } => {
                let state = self.expr(low, state);
                self.expr(high, state)
            }
            ExprKind::SetConstructor(items) | ExprKind::Tuple(items) => self.exprs(items, state),
            ExprKind::RecordLiteral(fields) => {
                let mut state = state;
                for (_, value) in fields {
                    state = self.expr(value, state);
                }
                state
            }
            ExprKind::AnonymousMethod(method) => {
                // Captured locals may be assigned whenever the method runs.
                let captured = referenced_decls(self.model, |v| {
                    for decl in &method.decls {
                        v.visit_decl(decl);
                    }
                    v.visit_block(&method.block);
                });
                let mut state = state;
                for decl in captured {
                    if let Some(local) = self.locals.get(&decl).copied() {
                        Self::set(&mut state, local, Init::Initialized);
                    }
                }
                state
            }
            ExprKind::Generic { .. }
            | ExprKind::Literal(_)
            | ExprKind::Nil
            | ExprKind::Inherited(_)
            | ExprKind::Error => state,
        }
    }

    fn exprs(&mut self, exprs: &[Expr], mut state: State) -> State {
        for expr in exprs {
            state = self.expr(expr, state);
        }
        state
    }

    fn call(&mut self, call: &Expr, callee: &Expr, args: &[Expr], state: State) -> State {
        let model = self.model;
        if model.resolution.cast_target(call.id).is_some() {
            return self.exprs(args, state);
        }
        let state = self.expr(callee, state);
        let Some(routine) = model.decl_of(callee.id).and_then(|d| d.routine.as_ref()) else {
            // Unknown callee: any argument might be written.
            let mut state = state;
            for arg in args {
                state = match self.root_local(arg) {
                    Some(_) => self.write_opaque(arg, state),
                    None => self.expr(arg, state),
                };
            }
            return state;
        };
        let mut state = state;
        for (i, arg) in args.iter().enumerate() {
            let mode = routine.params.get(i).map_or(ParamMode::Value, |p| p.mode);
            state = match mode {
                ParamMode::Var | ParamMode::Out => self.write_opaque(arg, state),
                ParamMode::Value | ParamMode::Const => self.expr(arg, state),
            };
        }
        state
    }

    /// Tracked local at the root of `X`, `X.F` or `X[I]`.
    fn root_local(&self, expr: &Expr) -> Option<usize> {
        let expr = expr.unparenthesized();
        match &expr.kind {
            ExprKind::Name(_) => self.local(expr.id),
            ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => self.root_local(object),
            _ => None,
        }
    }

    /// Assignment to `target`.
    fn write(&mut self, target: &Expr, state: State) -> State {
        let target = target.unparenthesized();
        match &target.kind {
            ExprKind::Name(_) => {
                let mut state = state;
                if let Some(local) = self.local(target.id) {
                    Self::set(&mut state, local, Init::Initialized);
                }
                state
            }
            ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => {
                let state = match &target.kind {
                    ExprKind::Index { indices, .. } => self.exprs(indices, state),
                    _ => state,
                };
                match self.aggregate_root(object) {
                    Some(local) => {
                        let mut state = state;
                        if let Some(values) = &mut state {
                            values[local] = values[local].max(Init::Partial);
                        }
                        state
                    }
                    None => self.expr(object, state),
                }
            }
            _ => self.expr(target, state),
        }
    }

    /// Record or static array local whose parts `expr` designates.
    fn aggregate_root(&self, expr: &Expr) -> Option<usize> {
        let expr = expr.unparenthesized();
        match &expr.kind {
            ExprKind::Name(_) => self
                .local(expr.id)
                .filter(|local| self.shapes[*local] == Shape::Aggregate),
            ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => self.aggregate_root(object),
            _ => None,
        }
    }

    /// Passed by reference or by address: assume the callee writes it.
    fn write_opaque(&mut self, expr: &Expr, state: State) -> State {
        let inner = expr.unparenthesized();
        match (&inner.kind, self.local(inner.id)) {
            (ExprKind::Name(_), Some(local)) => {
                let mut state = state;
                Self::set(&mut state, local, Init::Initialized);
                state
            }
            _ => self.write(inner, state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check, lines};

    fn issues_in(body: &str) -> Vec<Option<u32>> {
        let source = format!(
            "unit A; interface implementation\n\
             type TPoint = record X, Y: Integer; end;\n\
             procedure Fill(var V: Integer); begin V := 0; end;\n\
             procedure Take(V: Integer); begin end;\n\
             procedure Run(Flag: Boolean);\n\
             var A, B, C, D, E: Integer; O: TObject; P: TPoint; S: string;\n\
             begin\n\
             {}\n\
             end;\n\
             end.",
            body
        );
        lines(&check("VariableInitialization", &source))
    }

    #[test]
    fn test_straight_line() {
        // Body statements start on line 8.
        assert_eq!(issues_in("Take(A);\nB := 1;\nTake(B);\nTake(A);"), vec![Some(8)]);
    }

    #[test]
    fn test_branch_merge_is_conservative() {
        let body = "if Flag then A := 1;\n\
            Take(A);\n\
            if Flag then B := 1 else B := 2;\n\
            Take(B);\n\
            case Ord(Flag) of 0: C := 1; 1: C := 2; end;\n\
            Take(C);";
        assert_eq!(issues_in(body), vec![Some(9), Some(13)]);
    }

    #[test]
    fn test_dead_paths_do_not_merge() {
        let body = "if not Flag then Exit;\n\
            A := 1;\n\
            if Flag then B := 1 else raise TObject.Create;\n\
            Take(A + B);";
        assert!(issues_in(body).is_empty());
    }

    #[test]
    fn test_loops() {
        let body = "while Flag do A := 1;\n\
            Take(A);\n\
            repeat B := 1; until Flag;\n\
            Take(B);\n\
            for C := 0 to 3 do Take(C);\n\
            for D := 0 to 3 do begin E := D; Break; end;\n\
            Take(E);";
        assert_eq!(issues_in(body), vec![Some(9), Some(14)]);
    }

    #[test]
    fn test_by_reference_and_address() {
        let body = "Fill(A);\n\
            Take(A);\n\
            Mystery(B);\n\
            Take(B);\n\
            Take(Integer(@C));\n\
            Take(C);\n\
            Take(S.Length);";
        assert!(issues_in(body).is_empty());
    }

    #[test]
    fn test_record_fields_and_objects() {
        let body = "P.X := 1;\n\
            Take(P.X);\n\
            O.Free;\n\
            O := TObject.Create;\n\
            O.Free;";
        assert_eq!(issues_in(body), vec![Some(10)]);
    }

    #[test]
    fn test_try_blocks() {
        let body = "try\n\
              A := 1;\n\
            finally\n\
              Take(A);\n\
            end;\n\
            Take(A);\n\
            try\n\
              B := 1;\n\
            except\n\
              B := 2;\n\
            end;\n\
            Take(B);";
        assert_eq!(issues_in(body), vec![Some(11)]);
    }

    #[test]
    fn test_nested_routine_assignments_are_opaque() {
        let source = "unit A; interface implementation\n\
            function Run: Integer;\n\
            var Value, Other: Integer;\n\
              procedure Load;\n\
              begin\n\
                Value := 1;\n\
              end;\n\
            begin\n\
              Load;\n\
              Result := Value + Other;\n\
            end;\n\
            end.";
        assert_eq!(lines(&check("VariableInitialization", source)), vec![Some(10)]);
    }
}
